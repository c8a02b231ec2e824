//! Post-processing for extensions that publish their platform binaries
//! outside the gallery.

use std::collections::BTreeSet;
use std::path::Path;

use reqwest::Url;

use crate::asset::Asset;
use crate::error::MirrorError;
use crate::platform::Platform;
use crate::vsix;

/// Extensions whose catalog archive is only a loader; the real per-platform
/// packages are linked from the manifest inside it.
const SPLIT_PLATFORM_PACKAGES: &[&str] = &["vadimcn.vscode-lldb"];

pub(crate) fn needs_split(asset: &Asset) -> bool {
    SPLIT_PLATFORM_PACKAGES.contains(&asset.name.as_str())
}

/// Derive per-platform assets from a downloaded loader archive.
///
/// The manifest must carry a version and a `platformPackages` table; a
/// layout change in any of those aborts the run rather than silently
/// mirroring an incomplete extension. Blocking, call from `spawn_blocking`.
pub(crate) fn split_platform_packages(
    asset: &Asset,
    dest_dir: &Path,
    wanted: &BTreeSet<Platform>,
) -> Result<Vec<Asset>, MirrorError> {
    if asset.platform.is_some() {
        return Err(MirrorError::PlatformManifestChanged {
            name: asset.name.clone(),
        });
    }

    let manifest = vsix::read_manifest(&dest_dir.join(asset.vsix()))?;
    let packages = manifest.config.platform_packages;

    let (Some(version), Some(url), Some(platforms)) = (
        manifest.version,
        packages.as_ref().and_then(|packages| packages.url.clone()),
        packages.and_then(|packages| packages.platforms),
    ) else {
        return Err(MirrorError::PlatformManifestChanged {
            name: asset.name.clone(),
        });
    };

    tracing::debug!("{} url: {}", asset.name, url);
    tracing::debug!("{} version: {}", asset.name, version);
    tracing::debug!(
        "{} platforms: {:?}",
        asset.name,
        platforms.keys().collect::<Vec<_>>()
    );

    let mut assets = Vec::new();

    for (platform, package) in &platforms {
        let Ok(platform) = platform.parse::<Platform>() else {
            continue;
        };
        if !wanted.contains(&platform) {
            continue;
        }

        let uri = url
            .replace("${version}", &version)
            .replace("${platformPackage}", package);

        assets.push(Asset {
            name: asset.name.clone(),
            version: asset.version.clone(),
            engine: asset.engine.clone(),
            uri: Url::parse(&uri)?,
            timestamp: asset.timestamp,
            platform: Some(platform),
            ignore: false,
        });
    }

    Ok(assets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use pretty_assertions::assert_eq;

    fn loader_asset() -> Asset {
        Asset {
            name: "vadimcn.vscode-lldb".to_owned(),
            version: "1.10.0".to_owned(),
            engine: "^1.77.0".to_owned(),
            uri: Url::parse("https://gallery.example/lldb").unwrap(),
            timestamp: DateTime::parse_from_rfc3339("2024-03-01T12:00:00Z")
                .unwrap()
                .to_utc(),
            platform: None,
            ignore: false,
        }
    }

    fn write_loader(dir: &Path, manifest: &serde_json::Value) {
        let file = std::fs::File::create(dir.join("vadimcn.vscode-lldb-1.10.0.vsix")).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        writer
            .start_file(
                "extension/package.json",
                zip::write::SimpleFileOptions::default(),
            )
            .unwrap();
        serde_json::to_writer(&mut writer, manifest).unwrap();
        writer.finish().unwrap();
    }

    #[test]
    fn test_needs_split_matches_table() {
        assert!(needs_split(&loader_asset()));

        let mut other = loader_asset();
        other.name = "ms-python.python".to_owned();
        assert!(!needs_split(&other));
    }

    #[test]
    fn test_split_substitutes_embedded_version() {
        let dir = tempfile::tempdir().unwrap();
        // embedded version is ahead of the catalog one
        write_loader(
            dir.path(),
            &serde_json::json!({
                "version": "1.10.1",
                "config": {
                    "platformPackages": {
                        "url": "https://github.example/releases/v${version}/${platformPackage}",
                        "platforms": {
                            "linux-x64": "codelldb-x86_64-linux.vsix",
                            "win32-x64": "codelldb-x86_64-windows.vsix",
                            "freebsd-x64": "codelldb-x86_64-freebsd.vsix"
                        }
                    }
                }
            }),
        );

        let wanted = BTreeSet::from([Platform::LinuxX64]);
        let children =
            split_platform_packages(&loader_asset(), dir.path(), &wanted).unwrap();

        assert_eq!(children.len(), 1);
        let child = &children[0];
        assert_eq!(
            child.uri.as_str(),
            "https://github.example/releases/v1.10.1/codelldb-x86_64-linux.vsix"
        );
        // the mirror keeps naming by the catalog version
        assert_eq!(child.vsix(), "vadimcn.vscode-lldb-linux-x64-1.10.0.vsix");
        assert_eq!(child.engine, "^1.77.0");
        assert!(!child.ignore);
    }

    #[test]
    fn test_split_requires_platform_packages() {
        let dir = tempfile::tempdir().unwrap();
        write_loader(dir.path(), &serde_json::json!({"version": "1.10.1"}));

        let err = split_platform_packages(
            &loader_asset(),
            dir.path(),
            &BTreeSet::from([Platform::LinuxX64]),
        )
        .unwrap_err();
        assert!(matches!(err, MirrorError::PlatformManifestChanged { .. }));
    }

    #[test]
    fn test_split_requires_embedded_version() {
        let dir = tempfile::tempdir().unwrap();
        write_loader(
            dir.path(),
            &serde_json::json!({
                "config": {
                    "platformPackages": {
                        "url": "https://github.example/v${version}/${platformPackage}",
                        "platforms": {"linux-x64": "a.vsix"}
                    }
                }
            }),
        );

        let err = split_platform_packages(
            &loader_asset(),
            dir.path(),
            &BTreeSet::from([Platform::LinuxX64]),
        )
        .unwrap_err();
        assert!(matches!(err, MirrorError::PlatformManifestChanged { .. }));
    }

    #[test]
    fn test_split_rejects_platform_carrying_loader() {
        let dir = tempfile::tempdir().unwrap();
        let mut asset = loader_asset();
        asset.platform = Some(Platform::LinuxX64);

        let err = split_platform_packages(&asset, dir.path(), &BTreeSet::new()).unwrap_err();
        assert!(matches!(err, MirrorError::PlatformManifestChanged { .. }));
    }
}
