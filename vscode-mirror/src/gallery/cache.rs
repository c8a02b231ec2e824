use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::MirrorError;

/// Storage for raw gallery responses, keyed by a digest of the query body.
///
/// A cached response short-circuits the network entirely, which keeps
/// repeated runs against an unchanged identifier set offline-friendly.
#[async_trait]
pub trait QueryCache: Send + Sync {
    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>, MirrorError>;

    async fn store(&self, key: &str, query: &[u8], response: &[u8]) -> Result<(), MirrorError>;
}

/// File-backed cache living next to the downloaded archives.
///
/// Responses are always read back when present; they are only written when
/// the run asks for it, together with the query that produced them.
#[derive(Debug)]
pub struct FsQueryCache {
    directory: PathBuf,
    write: bool,
}

impl FsQueryCache {
    pub fn new(directory: PathBuf, write: bool) -> Self {
        Self { directory, write }
    }

    fn response_path(&self, key: &str) -> PathBuf {
        self.directory.join(format!("response_{key}.json"))
    }

    fn query_path(&self, key: &str) -> PathBuf {
        self.directory.join(format!("query_{key}.json"))
    }
}

#[async_trait]
impl QueryCache for FsQueryCache {
    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>, MirrorError> {
        let path = self.response_path(key);

        match tokio::fs::read(&path).await {
            Ok(data) => {
                tracing::info!("load cached response {}", path.display());
                Ok(Some(data))
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn store(&self, key: &str, query: &[u8], response: &[u8]) -> Result<(), MirrorError> {
        if !self.write {
            return Ok(());
        }

        let path = self.response_path(key);
        tokio::fs::write(self.query_path(key), query).await?;
        tokio::fs::write(&path, response).await?;
        tracing::debug!("write query and response {}", path.display());

        Ok(())
    }
}

/// In-memory cache for tests, counting how many lookups were made.
#[cfg(test)]
pub(crate) struct MemoryQueryCache {
    responses: std::sync::Mutex<std::collections::HashMap<String, Vec<u8>>>,
    pub(crate) loads: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl MemoryQueryCache {
    pub(crate) fn new() -> Self {
        Self {
            responses: std::sync::Mutex::new(std::collections::HashMap::new()),
            loads: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    pub(crate) fn seed(&self, key: String, response: Vec<u8>) {
        self.responses.lock().unwrap().insert(key, response);
    }
}

#[cfg(test)]
#[async_trait]
impl QueryCache for MemoryQueryCache {
    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>, MirrorError> {
        self.loads
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        Ok(self.responses.lock().unwrap().get(key).cloned())
    }

    async fn store(&self, key: &str, _query: &[u8], response: &[u8]) -> Result<(), MirrorError> {
        self.responses
            .lock()
            .unwrap()
            .insert(key.to_owned(), response.to_vec());
        Ok(())
    }
}
