use reqwest::StatusCode;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("an I/O error occurred: {0}")]
    GenericIo(#[from] std::io::Error),

    #[error("http client error: {0}")]
    HttpClientError(#[from] reqwest::Error),

    #[error("deserialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("invalid url: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("archive error: {0}")]
    ArchiveError(#[from] zip::result::ZipError),

    #[error("invalid timestamp: {0}")]
    TimestampError(#[from] chrono::ParseError),

    #[error("unparseable version: {0}")]
    Version(String),

    #[error("unknown target platform: {0}")]
    UnknownPlatform(String),

    #[error("version {version} of {name} has flags '{flags}', expected 'validated' or 'none'")]
    UnexpectedVersionFlags {
        name: String,
        version: String,
        flags: String,
    },

    #[error("no Location header for {0}")]
    MissingLocation(String),

    #[error("cannot extract an editor version from url {0}")]
    UnrecognizedLocation(String),

    #[error("channel mismatch: requested {requested}, got {returned}")]
    ChannelMismatch { requested: String, returned: String },

    #[error("unexpected status {status} for {url}")]
    UnexpectedStatus { url: String, status: StatusCode },

    #[error("no checksum header for {0}")]
    MissingChecksum(String),

    #[error("size mismatch for {file}: expected {expected} bytes, wrote {actual}")]
    SizeMismatch {
        file: String,
        expected: u64,
        actual: u64,
    },

    #[error("{name} no longer advertises platform packages in its manifest")]
    PlatformManifestChanged { name: String },

    #[error("{key} not found in {}", file.display())]
    MissingManifestKey { key: &'static str, file: PathBuf },

    #[error("failed to run {command}")]
    CommandFailed { command: String },

    #[error("unknown version request: {0}")]
    UnknownVersionRequest(String),
}

impl MirrorError {
    /// Exit code reported for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::UnexpectedStatus { .. }
            | Self::UnrecognizedLocation(_)
            | Self::ChannelMismatch { .. }
            | Self::SizeMismatch { .. } => 2,
            _ => 1,
        }
    }
}
