use std::fs::FileTimes;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use futures::TryStreamExt as _;
use reqwest::Url;
use reqwest::redirect::Policy;

use crate::asset::Asset;
use crate::error::MirrorError;

/// Transport seam for archive downloads.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, uri: &Url) -> Result<Vec<u8>, MirrorError>;
}

/// Plain reqwest fetcher following redirects.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, MirrorError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION")
            ))
            .redirect(Policy::limited(10))
            .hickory_dns(true)
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, uri: &Url) -> Result<Vec<u8>, MirrorError> {
        let response = self
            .client
            .get(uri.clone())
            .send()
            .await?
            .error_for_status()?;

        Ok(response.bytes().await?.to_vec())
    }
}

/// Idempotent archive store over the mirror directory.
///
/// An archive that is already on disk is never fetched again; its presence
/// is the only cache criterion. Freshly written archives get their file
/// times set to the asset timestamp so the mirror reflects publication
/// dates instead of download dates.
pub struct VsixStore {
    directory: PathBuf,
    fetcher: Arc<dyn Fetcher>,
    parallelism: usize,
}

impl VsixStore {
    pub fn new(directory: PathBuf, fetcher: Arc<dyn Fetcher>, parallelism: usize) -> Self {
        Self {
            directory,
            fetcher,
            parallelism,
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Download one asset unless its archive is already present.
    #[tracing::instrument(skip_all, fields(vsix = %asset.vsix()))]
    pub async fn ensure(&self, asset: &Asset) -> Result<(), MirrorError> {
        let path = self.directory.join(asset.vsix());

        if tokio::fs::try_exists(&path).await? {
            match asset.platform {
                Some(platform) => tracing::debug!(
                    "already downloaded: {} {} ({})",
                    asset.name,
                    asset.version,
                    platform
                ),
                None => tracing::debug!("already downloaded: {} {}", asset.name, asset.version),
            }
            return Ok(());
        }

        tokio::fs::create_dir_all(&self.directory).await?;
        tracing::info!("download {}", path.display());

        let data = self.fetcher.fetch(&asset.uri).await?;

        let stamp = SystemTime::from(asset.timestamp);
        let times = FileTimes::new().set_accessed(stamp).set_modified(stamp);

        tokio::task::spawn_blocking(move || {
            std::fs::write(&path, data)?;
            std::fs::File::options()
                .write(true)
                .open(&path)?
                .set_times(times)?;

            Ok::<_, MirrorError>(())
        })
        .await
        .unwrap()?;

        Ok(())
    }

    /// Download a batch of assets with bounded parallelism.
    pub async fn ensure_all<'a>(
        &self,
        assets: impl IntoIterator<Item = &'a Asset>,
    ) -> Result<(), MirrorError> {
        futures::stream::iter(assets.into_iter().map(Ok::<_, MirrorError>))
            .try_for_each_concurrent(self.parallelism, |asset| self.ensure(asset))
            .await
    }
}

/// Canned responses for tests, counting every fetch.
#[cfg(test)]
pub(crate) struct MapFetcher {
    responses: std::collections::HashMap<String, Vec<u8>>,
    pub(crate) fetches: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl MapFetcher {
    pub(crate) fn new(responses: impl IntoIterator<Item = (String, Vec<u8>)>) -> Self {
        Self {
            responses: responses.into_iter().collect(),
            fetches: std::sync::atomic::AtomicUsize::new(0),
        }
    }
}

#[cfg(test)]
#[async_trait]
impl Fetcher for MapFetcher {
    async fn fetch(&self, uri: &Url) -> Result<Vec<u8>, MirrorError> {
        self.fetches
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);

        self.responses.get(uri.as_str()).cloned().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no canned response for {uri}"),
            )
            .into()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::Ordering;

    fn asset(name: &str, version: &str, uri: &str) -> Asset {
        Asset {
            name: name.to_owned(),
            version: version.to_owned(),
            engine: "*".to_owned(),
            uri: Url::parse(uri).unwrap(),
            timestamp: DateTime::parse_from_rfc3339("2024-03-01T12:00:00Z")
                .unwrap()
                .to_utc(),
            platform: None,
            ignore: false,
        }
    }

    #[tokio::test]
    async fn test_ensure_downloads_once() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(MapFetcher::new([(
            "https://gallery.example/a.vsix".to_owned(),
            b"archive bytes".to_vec(),
        )]));

        let store = VsixStore::new(dir.path().to_path_buf(), fetcher.clone(), 4);
        let asset = asset("example.a", "1.0.0", "https://gallery.example/a.vsix");

        store.ensure(&asset).await.unwrap();
        store.ensure(&asset).await.unwrap();

        assert_eq!(fetcher.fetches.load(Ordering::Relaxed), 1);

        let path = dir.path().join("example.a-1.0.0.vsix");
        assert_eq!(std::fs::read(&path).unwrap(), b"archive bytes");
        assert_eq!(
            std::fs::metadata(&path).unwrap().modified().unwrap(),
            SystemTime::from(asset.timestamp)
        );
    }

    #[tokio::test]
    async fn test_ensure_all_batch() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(MapFetcher::new([
            ("https://gallery.example/a.vsix".to_owned(), b"a".to_vec()),
            ("https://gallery.example/b.vsix".to_owned(), b"b".to_vec()),
        ]));

        let store = VsixStore::new(dir.path().to_path_buf(), fetcher.clone(), 2);
        let assets = [
            asset("example.a", "1.0.0", "https://gallery.example/a.vsix"),
            asset("example.b", "2.0.0", "https://gallery.example/b.vsix"),
        ];

        store.ensure_all(&assets).await.unwrap();

        assert_eq!(fetcher.fetches.load(Ordering::Relaxed), 2);
        assert!(dir.path().join("example.a-1.0.0.vsix").is_file());
        assert!(dir.path().join("example.b-2.0.0.vsix").is_file());
    }

    #[tokio::test]
    async fn test_missing_response_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(MapFetcher::new([]));
        let store = VsixStore::new(dir.path().to_path_buf(), fetcher, 4);

        let asset = asset("example.a", "1.0.0", "https://gallery.example/a.vsix");
        assert!(store.ensure(&asset).await.is_err());
        assert!(!dir.path().join("example.a-1.0.0.vsix").exists());
    }
}
