//! The plain-text `files` manifest in the mirror directory.
//!
//! The manifest doubles as configuration: `key=value` lines describe the
//! mirrored editor build, `name_extensions=( ... )` sections list archived
//! extensions and are read back as wanted identifiers on the next run.
//! Anything else in the file is preserved verbatim.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use crate::asset::Asset;
use crate::error::MirrorError;
use crate::platform::Platform;
use crate::update::CodeVersion;

/// Extension sections of the manifest, entry sets keyed by section name.
pub type Sections = BTreeMap<String, BTreeSet<String>>;

/// The `${arch}` collapsing of platform-split entries is kept around but
/// disabled, single-platform lines are easier to diff.
const GROUP_BY_PLATFORM: bool = false;

static VERSION_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bversion=(.+)\b").unwrap());
static COMMIT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bcommit=(.+)\b").unwrap());
static CHANNEL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bchannel=(.+)\b").unwrap());

static SECTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)(\w+_extensions)=\((.+?)\)").unwrap());
static SECTION_STRIP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\b\w+_extensions=\((?:.+?)\)").unwrap());
static ENTRY_VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-(\d+)\.(\d+)\.(\d+)\.vsix$").unwrap());

/// Recover the mirrored editor build from an existing manifest.
pub async fn read_code_version(file: &Path) -> Result<CodeVersion, MirrorError> {
    let content = tokio::fs::read_to_string(file).await?;
    parse_code_version(&content, file)
}

pub(crate) fn parse_code_version(content: &str, file: &Path) -> Result<CodeVersion, MirrorError> {
    Ok(CodeVersion {
        version: scalar(content, &VERSION_RE, "version", file)?,
        commit: scalar(content, &COMMIT_RE, "commit", file)?,
        channel: scalar(content, &CHANNEL_RE, "channel", file)?,
    })
}

fn scalar(
    content: &str,
    pattern: &Regex,
    key: &'static str,
    file: &Path,
) -> Result<String, MirrorError> {
    pattern
        .captures(content)
        .map(|captures| captures[1].to_owned())
        .ok_or_else(|| MirrorError::MissingManifestKey {
            key,
            file: file.to_owned(),
        })
}

/// Parse the extension sections of a manifest.
///
/// Entries may be bare identifiers or previously written vsix filenames,
/// both normalize to a casefolded identifier.
pub(crate) fn parse_sections(content: &str) -> Sections {
    let mut sections = Sections::new();

    for captures in SECTION_RE.captures_iter(content) {
        let section = sections.entry(captures[1].to_owned()).or_default();

        for line in captures[2].lines() {
            let entry = line.trim();
            if entry.is_empty() || entry.starts_with('#') {
                continue;
            }

            section.insert(normalize_entry(entry));
        }
    }

    sections
}

fn normalize_entry(entry: &str) -> String {
    let mut name = entry.replace("-${arch}", "");
    for platform in Platform::all() {
        name = name.replace(&format!("-{platform}"), "");
    }

    ENTRY_VERSION_RE.replace(&name, "").to_lowercase()
}

/// Merge editor entries into the manifest, keeping every unrelated line.
///
/// The previous manifest survives as `files.old`. Blocking, call from
/// `spawn_blocking`.
pub fn write_code_entries(file: &Path, entries: &[(&str, String)]) -> Result<(), MirrorError> {
    let existing = read_or_empty(file)?;

    let mut lines: Vec<String> = entries
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect();

    for line in existing.lines() {
        let known = entries
            .iter()
            .any(|(key, _)| line.trim_start().starts_with(&format!("{key}=")));
        if !known {
            lines.push(line.to_owned());
        }
    }

    let backup = file.with_extension("old");
    if backup.is_file() {
        std::fs::remove_file(&backup)?;
    }
    if file.is_file() {
        std::fs::rename(file, &backup)?;
    }

    std::fs::write(file, lines.join("\n") + "\n")?;

    Ok(())
}

/// Rewrite the extension sections from the final asset list, keeping all
/// non-section content. Blocking, call from `spawn_blocking`.
pub fn write_extension_sections(
    file: &Path,
    sections: &Sections,
    assets: &[Asset],
) -> Result<(), MirrorError> {
    let mut inventory = match std::fs::read_to_string(file) {
        Ok(existing) => {
            let mut kept = SECTION_STRIP_RE.replace_all(&existing, "").trim().to_owned();
            kept.push_str("\n\n");
            kept
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(err) => return Err(err.into()),
    };

    let rendered: Vec<String> = sections
        .iter()
        .map(|(name, entries)| render_section(name, entries, assets))
        .collect();

    inventory.push_str(&rendered.join("\n\n"));
    inventory.push('\n');

    std::fs::write(file, inventory)?;

    Ok(())
}

fn render_section(name: &str, entries: &BTreeSet<String>, assets: &[Asset]) -> String {
    if entries.is_empty() {
        return String::new();
    }

    let mut ordered: Vec<&Asset> = assets.iter().collect();
    ordered.sort_by_key(|asset| asset.platform.map(Platform::as_str));

    let mut wanted_names: Vec<&String> = entries.iter().collect();
    wanted_names.sort_by_key(|name| name.to_lowercase());

    let mut section = format!("{name}=(\n");

    for wanted in wanted_names {
        let wanted_lower = wanted.to_lowercase();

        // platforms of an extension may be stuck on different versions
        let platform_versions: BTreeSet<&str> = assets
            .iter()
            .filter(|asset| {
                asset.platform.is_some()
                    && !asset.ignore
                    && wanted_lower == asset.name.to_lowercase()
            })
            .map(|asset| asset.version.as_str())
            .collect();
        let all_platforms_same_version = platform_versions.len() == 1;

        for asset in &ordered {
            if asset.ignore || wanted_lower != asset.name.to_lowercase() {
                continue;
            }

            let vsix = asset.vsix();
            if let Some(platform) = asset.platform {
                if all_platforms_same_version && GROUP_BY_PLATFORM {
                    let grouped = vsix.replace(platform.as_str(), "${arch}");
                    section.push_str(&format!("  {grouped}\n"));
                    break;
                }
            }

            section.push_str(&format!("  {vsix}\n"));
        }
    }

    section.push(')');
    section
}

/// Delete archives in the mirror directory not backed by the asset list.
///
/// Blocking, call from `spawn_blocking`.
pub fn prune(directory: &Path, assets: &[Asset]) -> Result<(), MirrorError> {
    let keep: BTreeSet<String> = assets.iter().map(Asset::vsix).collect();

    for entry in std::fs::read_dir(directory)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };

        if name.ends_with(".vsix") && !keep.contains(name) {
            tracing::debug!("purge {}", name);
            std::fs::remove_file(entry.path())?;
        }
    }

    Ok(())
}

fn read_or_empty(file: &Path) -> Result<String, MirrorError> {
    match std::fs::read_to_string(file) {
        Ok(content) => Ok(content),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use pretty_assertions::assert_eq;
    use url::Url;

    fn asset(name: &str, version: &str, platform: Option<Platform>, ignore: bool) -> Asset {
        Asset {
            name: name.to_owned(),
            version: version.to_owned(),
            engine: "*".to_owned(),
            uri: Url::parse("https://example.invalid/vsix").unwrap(),
            timestamp: DateTime::parse_from_rfc3339("2024-03-01T12:00:00Z")
                .unwrap()
                .to_utc(),
            platform,
            ignore,
        }
    }

    #[test]
    fn test_parse_code_version() {
        let content = "version=1.91.1\n\
                       commit=e54c774e0add60467559eb0d1e229c6452cf8447\n\
                       channel=stable\n\
                       code_win32=VSCode-win32-x64-1.91.1.zip\n";

        let code = parse_code_version(content, Path::new("files")).unwrap();
        assert_eq!(code.version, "1.91.1");
        assert_eq!(code.commit, "e54c774e0add60467559eb0d1e229c6452cf8447");
        assert_eq!(code.channel, "stable");
    }

    #[test]
    fn test_parse_code_version_missing_key() {
        let err = parse_code_version("version=1.91.1\n", Path::new("files")).unwrap_err();
        match err {
            MirrorError::MissingManifestKey { key, .. } => assert_eq!(key, "commit"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_parse_sections_normalizes_entries() {
        let content = "version=1.91.1\n\
                       \n\
                       my_extensions=(\n\
                       \x20 # editors\n\
                       \x20 ms-python.python-2024.2.1.vsix\n\
                       \x20 rust-lang.rust-analyzer-linux-x64-0.3.1850.vsix\n\
                       \x20 Vadimcn.vscode-lldb\n\
                       \n\
                       \x20 esbenp.prettier-${arch}-10.4.0.vsix\n\
                       )\n";

        let sections = parse_sections(content);
        assert_eq!(sections.len(), 1);
        assert_eq!(
            sections["my_extensions"],
            BTreeSet::from([
                "ms-python.python".to_owned(),
                "rust-lang.rust-analyzer".to_owned(),
                "vadimcn.vscode-lldb".to_owned(),
                "esbenp.prettier".to_owned(),
            ])
        );
    }

    #[test]
    fn test_parse_sections_merges_duplicates() {
        let content = "a_extensions=(\n x.y\n)\n\na_extensions=(\n z.w\n)\n";
        let sections = parse_sections(content);
        assert_eq!(
            sections["a_extensions"],
            BTreeSet::from(["x.y".to_owned(), "z.w".to_owned()])
        );
    }

    #[test]
    fn test_write_code_entries_rewrites_known_keys() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("files");

        std::fs::write(
            &file,
            "version=1.90.0\nchannel=stable\n# a note\nall_extensions=(\n  a.b-1.0.0.vsix\n)\n",
        )
        .unwrap();

        let entries = [
            ("version", "1.91.1".to_owned()),
            ("commit", "e54c774e0add60467559eb0d1e229c6452cf8447".to_owned()),
            ("channel", "stable".to_owned()),
        ];
        write_code_entries(&file, &entries).unwrap();

        let content = std::fs::read_to_string(&file).unwrap();
        assert_eq!(
            content,
            "version=1.91.1\n\
             commit=e54c774e0add60467559eb0d1e229c6452cf8447\n\
             channel=stable\n\
             # a note\n\
             all_extensions=(\n\
             \x20 a.b-1.0.0.vsix\n\
             )\n"
        );

        let backup = std::fs::read_to_string(dir.path().join("files.old")).unwrap();
        assert!(backup.starts_with("version=1.90.0\n"));
    }

    #[test]
    fn test_write_code_entries_fresh_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("files");

        write_code_entries(&file, &[("version", "1.91.1".to_owned())]).unwrap();

        assert_eq!(
            std::fs::read_to_string(&file).unwrap(),
            "version=1.91.1\n"
        );
        assert!(!dir.path().join("files.old").exists());
    }

    #[test]
    fn test_write_sections_replaces_old_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("files");

        std::fs::write(
            &file,
            "version=1.91.1\ncommit=abc\n\nall_extensions=(\n  stale.entry-0.1.0.vsix\n)\n",
        )
        .unwrap();

        let sections = Sections::from([(
            "all_extensions".to_owned(),
            BTreeSet::from(["ms-python.python".to_owned(), "rust-lang.rust-analyzer".to_owned()]),
        )]);
        let assets = [
            asset("rust-lang.rust-analyzer", "0.3.1850", Some(Platform::LinuxX64), false),
            asset("ms-python.python", "2024.2.1", None, false),
        ];

        write_extension_sections(&file, &sections, &assets).unwrap();

        assert_eq!(
            std::fs::read_to_string(&file).unwrap(),
            "version=1.91.1\n\
             commit=abc\n\
             \n\
             all_extensions=(\n\
             \x20 ms-python.python-2024.2.1.vsix\n\
             \x20 rust-lang.rust-analyzer-linux-x64-0.3.1850.vsix\n\
             )\n"
        );
    }

    #[test]
    fn test_write_sections_orders_platformless_first() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("files");

        let sections = Sections::from([(
            "all_extensions".to_owned(),
            BTreeSet::from(["vadimcn.vscode-lldb".to_owned()]),
        )]);
        let assets = [
            asset("vadimcn.vscode-lldb", "1.10.0", Some(Platform::Win32X64), false),
            asset("vadimcn.vscode-lldb", "1.10.0", Some(Platform::LinuxX64), false),
            // the catalog archive is kept on disk but not listed
            asset("vadimcn.vscode-lldb", "1.10.0", None, true),
        ];

        write_extension_sections(&file, &sections, &assets).unwrap();

        assert_eq!(
            std::fs::read_to_string(&file).unwrap(),
            "all_extensions=(\n\
             \x20 vadimcn.vscode-lldb-linux-x64-1.10.0.vsix\n\
             \x20 vadimcn.vscode-lldb-win32-x64-1.10.0.vsix\n\
             )\n"
        );
    }

    #[test]
    fn test_write_sections_sorts_entries_casefolded() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("files");

        let sections = Sections::from([(
            "all_extensions".to_owned(),
            BTreeSet::from(["Zeta.one".to_owned(), "alpha.two".to_owned()]),
        )]);
        let assets = [
            asset("Zeta.one", "1.0.0", None, false),
            asset("alpha.two", "2.0.0", None, false),
        ];

        write_extension_sections(&file, &sections, &assets).unwrap();

        assert_eq!(
            std::fs::read_to_string(&file).unwrap(),
            "all_extensions=(\n\
             \x20 alpha.two-2.0.0.vsix\n\
             \x20 Zeta.one-1.0.0.vsix\n\
             )\n"
        );
    }

    #[test]
    fn test_roundtrip_sections() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("files");

        let sections = Sections::from([(
            "all_extensions".to_owned(),
            BTreeSet::from(["ms-python.python".to_owned()]),
        )]);
        let assets = [asset("ms-python.python", "2024.2.1", None, false)];

        write_extension_sections(&file, &sections, &assets).unwrap();

        let parsed = parse_sections(&std::fs::read_to_string(&file).unwrap());
        assert_eq!(parsed, sections);
    }

    #[test]
    fn test_prune_removes_unlisted_archives() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("keep.me-1.0.0.vsix"), b"keep").unwrap();
        std::fs::write(dir.path().join("drop.me-0.9.0.vsix"), b"drop").unwrap();
        std::fs::write(dir.path().join("files"), b"version=1.91.1\n").unwrap();

        let assets = [asset("keep.me", "1.0.0", None, false)];
        prune(dir.path(), &assets).unwrap();

        assert!(dir.path().join("keep.me-1.0.0.vsix").is_file());
        assert!(!dir.path().join("drop.me-0.9.0.vsix").exists());
        assert!(dir.path().join("files").is_file());
    }
}
