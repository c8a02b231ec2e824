//! Pick the best downloadable version of an extension per wanted platform.
//!
//! A version entry is a candidate when its flags pass the sanity check, it is
//! not a pre-release and its engine range matches the mirrored editor. Some
//! extensions publish per-platform entries for a version; once any entry of a
//! version names a platform, the platformless entries of that same version no
//! longer count for the split platforms.

use std::collections::{BTreeMap, BTreeSet};

use url::Url;

use crate::asset::Asset;
use crate::error::MirrorError;
use crate::gallery::{GalleryExtension, GalleryVersion, PROPERTY_ENGINE, PROPERTY_PRE_RELEASE};
use crate::platform::Platform;
use crate::report::MissingPlatform;
use crate::version::{VersionKey, engine_matches};

type Candidate<'a> = (&'a GalleryVersion, Option<Platform>);

/// Outcome of the selection for one extension.
#[derive(Debug)]
pub struct Selection {
    /// Chosen assets keyed by vsix filename. Platform-neutral versions
    /// produce the same filename for every target, hence a single entry.
    pub assets: BTreeMap<String, Asset>,

    /// Wanted platforms for which no version survived the filters.
    pub missing: Vec<MissingPlatform>,
}

/// Resolve the assets to mirror for `extension` against `engine`.
pub fn select_assets(
    extension: &GalleryExtension,
    engine: &str,
    wanted: &BTreeSet<Platform>,
) -> Result<Selection, MirrorError> {
    let name = extension.identifier();
    let (candidates, split_versions) = filter_versions(extension, &name, engine)?;

    let mut assets = BTreeMap::new();
    let mut missing = Vec::new();

    for target in wanted {
        match best_version(&candidates, &split_versions, *target)? {
            Some((version, platform)) => {
                let asset = to_asset(&name, version, platform)?;
                assets.insert(asset.vsix(), asset);
            }
            None => {
                let entry = MissingPlatform {
                    name: name.clone(),
                    platform: *target,
                };
                tracing::error!("missing {} for {}", entry.platform, entry.name);
                missing.push(entry);
            }
        }
    }

    Ok(Selection { assets, missing })
}

/// First pass: drop unusable versions and record which version strings are
/// split over platforms.
fn filter_versions<'a>(
    extension: &'a GalleryExtension,
    name: &str,
    engine: &str,
) -> Result<(Vec<Candidate<'a>>, BTreeSet<&'a str>), MirrorError> {
    let mut candidates = Vec::new();
    let mut split_versions = BTreeSet::new();

    for version in &extension.versions {
        // sanity check
        if version.flags != "validated" && version.flags != "none" {
            tracing::error!("offending version entry: {:#?}", version);
            return Err(MirrorError::UnexpectedVersionFlags {
                name: name.to_owned(),
                version: version.version.clone(),
                flags: version.flags.clone(),
            });
        }

        if version.property(PROPERTY_PRE_RELEASE) == Some("true") {
            continue;
        }

        let Some(pattern) = version.property(PROPERTY_ENGINE) else {
            continue;
        };
        if !engine_matches(pattern, engine)? {
            continue;
        }

        let platform = version
            .target_platform
            .as_deref()
            .map(|raw| raw.parse::<Platform>())
            .transpose()?;

        if platform.is_some() {
            split_versions.insert(version.version.as_str());
        }

        candidates.push((version, platform));
    }

    Ok((candidates, split_versions))
}

/// Second pass: keep the candidates usable for `target` and take the highest
/// version, preferring the later entry on ties.
fn best_version<'a>(
    candidates: &[Candidate<'a>],
    split_versions: &BTreeSet<&str>,
    target: Platform,
) -> Result<Option<Candidate<'a>>, MirrorError> {
    let mut best: Option<(VersionKey, Candidate<'a>)> = None;

    for &(version, platform) in candidates {
        if split_versions.contains(version.version.as_str()) && platform != Some(target) {
            continue;
        }

        let key = VersionKey::parse(&version.version)?;
        if best.as_ref().is_none_or(|(max, _)| key >= *max) {
            best = Some((key, (version, platform)));
        }
    }

    Ok(best.map(|(_, candidate)| candidate))
}

fn to_asset(
    name: &str,
    version: &GalleryVersion,
    platform: Option<Platform>,
) -> Result<Asset, MirrorError> {
    let uri = Url::parse(&format!(
        "{}/Microsoft.VisualStudio.Services.VSIXPackage",
        version.asset_uri
    ))?;

    Ok(Asset {
        name: name.to_owned(),
        version: version.version.clone(),
        engine: version
            .property(PROPERTY_ENGINE)
            .unwrap_or_default()
            .to_owned(),
        uri,
        timestamp: version.last_updated,
        platform,
        ignore: false,
    })
}
