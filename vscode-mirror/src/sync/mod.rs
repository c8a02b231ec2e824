//! The extension sync engine.
//!
//! A run proceeds in waves: resolve a frontier of identifiers through the
//! gallery, download every selected archive, then open the archives of
//! pack-categorized extensions to collect child identifiers for the next
//! frontier. A casefolded seen-set only ever grows, so mutually referencing
//! packs cannot loop the expansion.

mod splitter;

use std::collections::{BTreeMap, BTreeSet};

use crate::asset::Asset;
use crate::download::VsixStore;
use crate::error::MirrorError;
use crate::gallery::GalleryClient;
use crate::platform::Platform;
use crate::report::SyncReport;
use crate::select;
use crate::vsix;

pub struct Mirror {
    engine: String,
    wanted: BTreeSet<Platform>,
    gallery: GalleryClient,
    store: VsixStore,
    assets: Vec<Asset>,
}

impl Mirror {
    pub fn new(
        engine: String,
        wanted: BTreeSet<Platform>,
        gallery: GalleryClient,
        store: VsixStore,
    ) -> Self {
        Self {
            engine,
            wanted,
            gallery,
            store,
            assets: Vec::new(),
        }
    }

    /// Final asset list of the run, including ignored catalog archives.
    pub fn assets(&self) -> &[Asset] {
        &self.assets
    }

    /// Download all requested extensions and their pack children.
    #[tracing::instrument(skip_all)]
    pub async fn run(
        &mut self,
        extension_ids: &BTreeSet<String>,
    ) -> Result<SyncReport, MirrorError> {
        let mut report = SyncReport::default();
        let mut all_assets: BTreeMap<String, Asset> = BTreeMap::new();

        let mut seen: BTreeSet<String> =
            extension_ids.iter().map(|id| id.to_lowercase()).collect();
        let mut frontier = extension_ids.clone();

        while !frontier.is_empty() {
            let (assets, packs) = self.find_assets(&frontier, &mut report).await?;

            self.store.ensure_all(assets.values()).await?;

            // the pack archives of this wave are on disk now, collect their
            // children for the next one
            let mut found_ids: BTreeSet<String> = BTreeSet::new();
            for pack in &packs {
                let path = self.store.directory().join(pack);
                let manifest = tokio::task::spawn_blocking(move || vsix::read_manifest(&path))
                    .await
                    .unwrap()?;

                tracing::debug!(
                    "pack {} has {} extension(s)",
                    pack,
                    manifest.extension_pack.len()
                );
                found_ids.extend(manifest.extension_pack);
            }

            all_assets.extend(assets);

            frontier = found_ids
                .into_iter()
                .filter(|id| seen.insert(id.to_lowercase()))
                .collect();
        }

        let mut final_assets: Vec<Asset> = all_assets.into_values().collect();

        // loader archives with out-of-gallery platform packages expand last;
        // the indices are fixed first so synthesized assets are not revisited
        let split: Vec<usize> = final_assets
            .iter()
            .enumerate()
            .filter(|(_, asset)| splitter::needs_split(asset))
            .map(|(index, _)| index)
            .collect();

        for index in split {
            let asset = final_assets[index].clone();
            let dest_dir = self.store.directory().to_path_buf();
            let wanted = self.wanted.clone();

            let children = tokio::task::spawn_blocking(move || {
                splitter::split_platform_packages(&asset, &dest_dir, &wanted)
            })
            .await
            .unwrap()?;

            self.store.ensure_all(&children).await?;

            final_assets[index].ignore = true;
            final_assets.extend(children);
        }

        let ignored = final_assets.iter().filter(|asset| asset.ignore).count();
        report.downloaded = final_assets.len() - ignored;
        tracing::info!("downloaded {} vsix", report.downloaded);

        let resolved: BTreeSet<String> = final_assets
            .iter()
            .map(|asset| asset.name.to_lowercase())
            .collect();
        report.not_found = extension_ids
            .iter()
            .filter(|id| !resolved.contains(&id.to_lowercase()))
            .cloned()
            .collect();

        if !report.not_found.is_empty() {
            tracing::error!("extensions not found: {:?}", report.not_found);
        }

        self.assets = final_assets;

        Ok(report)
    }

    /// Resolve one frontier of identifiers into assets and pack filenames.
    async fn find_assets(
        &self,
        extension_ids: &BTreeSet<String>,
        report: &mut SyncReport,
    ) -> Result<(BTreeMap<String, Asset>, BTreeSet<String>), MirrorError> {
        let mut assets = BTreeMap::new();
        let mut packs = BTreeSet::new();

        if extension_ids.is_empty() {
            return Ok((assets, packs));
        }

        let response = self.gallery.query(extension_ids).await?;

        for result in &response.results {
            for extension in &result.extensions {
                let selection = select::select_assets(extension, &self.engine, &self.wanted)?;

                report.missing_platforms.extend(selection.missing);

                if selection.assets.is_empty() {
                    continue;
                }

                if extension.is_pack() {
                    packs.extend(selection.assets.keys().cloned());
                }
                assets.extend(selection.assets);
            }
        }

        tracing::debug!(
            "found {} extension(s) and {} pack(s)",
            assets.len(),
            packs.len()
        );

        Ok((assets, packs))
    }
}
