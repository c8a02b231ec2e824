use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

use serde::Deserialize;

use crate::error::MirrorError;

/// Subset of an archive's `extension/package.json` the mirror cares about.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VsixManifest {
    pub version: Option<String>,

    /// Child identifiers of an extension pack.
    #[serde(default)]
    pub extension_pack: Vec<String>,

    #[serde(default)]
    pub config: VsixConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VsixConfig {
    pub platform_packages: Option<PlatformPackages>,
}

/// Per-platform package table of extensions that ship their binaries
/// outside the gallery. Both fields must be present for the split to work,
/// missing ones mean the publisher changed the layout.
#[derive(Debug, Clone, Deserialize)]
pub struct PlatformPackages {
    pub url: Option<String>,
    pub platforms: Option<BTreeMap<String, String>>,
}

/// Read `extension/package.json` from a downloaded archive.
///
/// Blocking, call from `spawn_blocking`.
pub fn read_manifest(path: &Path) -> Result<VsixManifest, MirrorError> {
    let file = File::open(path)?;
    let mut archive = zip::ZipArchive::new(file)?;
    let entry = archive.by_name("extension/package.json")?;

    serde_json::from_reader(entry).map_err(MirrorError::from)
}
