//! Editor builds from the update service.
//!
//! The service resolves `latest` or an exact version through a redirect to a
//! commit-addressed archive. The Windows archive redirect doubles as the
//! version probe, its Location header carries channel, commit and version.

use std::fs::FileTimes;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::SystemTime;

use regex::Regex;
use reqwest::header::{LAST_MODIFIED, LOCATION};
use reqwest::redirect::Policy;
use reqwest::{Client, StatusCode, Url};
use sha2::Digest as _;

use crate::error::MirrorError;

const UPDATE_URL: &str = "https://update.code.visualstudio.com";

static WIN32_ARCHIVE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/(\w+)/([a-f0-9]{40})/VSCode-win32-x64-([\d.]+)\.zip").unwrap()
});

/// A released editor build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeVersion {
    pub version: String,
    pub commit: String,
    pub channel: String,
}

/// Download urls of the editor builds to mirror, keyed by manifest entry.
pub fn editor_artifacts(code: &CodeVersion) -> Vec<(&'static str, String)> {
    let CodeVersion {
        version, channel, ..
    } = code;

    vec![
        // archives for Windows and Linux
        (
            "code_win32",
            format!("{UPDATE_URL}/{version}/win32-x64-archive/{channel}"),
        ),
        (
            "code_tar",
            format!("{UPDATE_URL}/{version}/linux-x64/{channel}"),
        ),
        (
            "code_deb",
            format!("{UPDATE_URL}/{version}/linux-deb-x64/{channel}"),
        ),
        // headless (server) build for Linux (glibc)
        (
            "server_linux",
            format!("{UPDATE_URL}/{version}/server-linux-x64/{channel}"),
        ),
        // cli for Linux
        (
            "cli_linux",
            format!("{UPDATE_URL}/{version}/cli-linux-x64/{channel}"),
        ),
    ]
}

pub(crate) fn parse_archive_location(
    location: &str,
    channel: &str,
) -> Result<CodeVersion, MirrorError> {
    let captures = WIN32_ARCHIVE_RE
        .captures(location)
        .ok_or_else(|| MirrorError::UnrecognizedLocation(location.to_owned()))?;

    if &captures[1] != channel {
        return Err(MirrorError::ChannelMismatch {
            requested: channel.to_owned(),
            returned: captures[1].to_owned(),
        });
    }

    Ok(CodeVersion {
        version: captures[3].to_owned(),
        commit: captures[2].to_owned(),
        channel: captures[1].to_owned(),
    })
}

/// Client for the update service.
///
/// Version probes must see the redirect itself, artifact payloads follow it,
/// hence the two differently configured reqwest clients.
#[derive(Debug, Clone)]
pub struct UpdateClient {
    probe_client: Client,
    archive_client: Client,
}

impl UpdateClient {
    pub fn new() -> Result<Self, MirrorError> {
        let probe_client = Client::builder()
            .user_agent(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION")
            ))
            .redirect(Policy::none())
            .hickory_dns(true)
            .build()?;

        let archive_client = Client::builder()
            .user_agent(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION")
            ))
            .redirect(Policy::limited(10))
            .hickory_dns(true)
            .build()?;

        Ok(Self {
            probe_client,
            archive_client,
        })
    }

    /// Resolve a version request (`latest` or `x.y.z`) to a released build.
    #[tracing::instrument(skip(self))]
    pub async fn resolve_version(
        &self,
        version: &str,
        channel: &str,
    ) -> Result<CodeVersion, MirrorError> {
        let url = format!("{UPDATE_URL}/{version}/win32-x64-archive/{channel}");
        let response = self.probe_client.get(&url).send().await?;

        if response.status() != StatusCode::FOUND {
            return Err(MirrorError::UnexpectedStatus {
                url,
                status: response.status(),
            });
        }

        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| MirrorError::MissingLocation(url.clone()))?;

        let code = parse_archive_location(location, channel)?;
        tracing::debug!("found: {} {} {}", code.channel, code.commit, code.version);

        Ok(code)
    }

    /// Download all artifacts of a build, returning the manifest entries.
    pub async fn download_editor(
        &self,
        code: &CodeVersion,
        dest_dir: &Path,
    ) -> Result<Vec<(&'static str, String)>, MirrorError> {
        let mut entries = vec![
            ("version", code.version.clone()),
            ("commit", code.commit.clone()),
            ("channel", code.channel.clone()),
        ];

        for (name, url) in editor_artifacts(code) {
            let filename = self.download_artifact(dest_dir, &url).await?;
            entries.push((name, filename));
        }

        Ok(entries)
    }

    /// Mirror one editor artifact, returning its file name.
    ///
    /// The file name is only known from the redirect target. An artifact
    /// already on disk is checked against the advertised checksum and
    /// fetched again when it differs.
    #[tracing::instrument(skip(self, dest_dir))]
    pub async fn download_artifact(
        &self,
        dest_dir: &Path,
        url: &str,
    ) -> Result<String, MirrorError> {
        let response = self
            .probe_client
            .head(url)
            .send()
            .await?
            .error_for_status()?;

        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| MirrorError::MissingLocation(url.to_owned()))?;

        let real_url = Url::parse(location)?;
        let filename = real_url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|name| !name.is_empty())
            .ok_or_else(|| MirrorError::UnrecognizedLocation(location.to_owned()))?
            .to_owned();

        let checksum = response
            .headers()
            .get("x-sha256")
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);

        let path = dest_dir.join(&filename);

        let mut present = tokio::fs::try_exists(&path).await?;
        if present {
            let Some(checksum) = checksum else {
                return Err(MirrorError::MissingChecksum(filename));
            };

            let digest = digest_file(path.clone()).await?;
            if digest != checksum {
                tracing::warn!("checksum mismatch, downloading {} again", filename);
                tokio::fs::remove_file(&path).await?;
                present = false;
            }
        }

        if present {
            tracing::info!("already downloaded: {}", filename);
            return Ok(filename);
        }

        tokio::fs::create_dir_all(dest_dir).await?;
        tracing::info!("downloading {}", path.display());

        let response = self
            .archive_client
            .get(real_url)
            .send()
            .await?
            .error_for_status()?;

        let expected = response.content_length();
        let last_modified = response
            .headers()
            .get(LAST_MODIFIED)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);

        let data = response.bytes().await?;

        if let Some(expected) = expected {
            if data.len() as u64 != expected {
                return Err(MirrorError::SizeMismatch {
                    file: filename,
                    expected,
                    actual: data.len() as u64,
                });
            }
        }

        let times = last_modified
            .map(|value| chrono::DateTime::parse_from_rfc2822(&value))
            .transpose()?
            .map(|stamp| {
                let stamp = SystemTime::from(stamp);
                FileTimes::new().set_accessed(stamp).set_modified(stamp)
            });

        write_artifact(path, data.to_vec(), times).await?;

        Ok(filename)
    }
}

async fn digest_file(path: PathBuf) -> Result<String, MirrorError> {
    tokio::task::spawn_blocking(move || {
        let data = std::fs::read(&path)?;
        Ok::<_, MirrorError>(hex::encode(sha2::Sha256::digest(&data)))
    })
    .await
    .unwrap()
}

async fn write_artifact(
    path: PathBuf,
    data: Vec<u8>,
    times: Option<FileTimes>,
) -> Result<(), MirrorError> {
    tokio::task::spawn_blocking(move || {
        std::fs::write(&path, data)?;

        if let Some(times) = times {
            std::fs::File::options()
                .write(true)
                .open(&path)?
                .set_times(times)?;
        }

        Ok::<_, MirrorError>(())
    })
    .await
    .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_archive_location() {
        let code = parse_archive_location(
            "https://vscode.download.prss.microsoft.com/dbazure/download/stable/\
             e54c774e0add60467559eb0d1e229c6452cf8447/VSCode-win32-x64-1.91.1.zip",
            "stable",
        )
        .unwrap();

        assert_eq!(
            code,
            CodeVersion {
                version: "1.91.1".to_owned(),
                commit: "e54c774e0add60467559eb0d1e229c6452cf8447".to_owned(),
                channel: "stable".to_owned(),
            }
        );
    }

    #[test]
    fn test_parse_rejects_unrelated_urls() {
        let err = parse_archive_location("https://example.com/nothing-to-see", "stable");
        assert!(matches!(err, Err(MirrorError::UnrecognizedLocation(_))));
    }

    #[test]
    fn test_parse_rejects_other_channel() {
        let err = parse_archive_location(
            "https://example.com/insider/0123456789abcdef0123456789abcdef01234567/VSCode-win32-x64-1.92.0.zip",
            "stable",
        );
        assert!(matches!(err, Err(MirrorError::ChannelMismatch { .. })));
    }

    #[test]
    fn test_editor_artifacts_table() {
        let code = CodeVersion {
            version: "1.91.1".to_owned(),
            commit: "e54c774e0add60467559eb0d1e229c6452cf8447".to_owned(),
            channel: "stable".to_owned(),
        };

        let artifacts = editor_artifacts(&code);
        let names: Vec<&str> = artifacts.iter().map(|(name, _)| *name).collect();
        assert_eq!(
            names,
            vec!["code_win32", "code_tar", "code_deb", "server_linux", "cli_linux"]
        );

        assert_eq!(
            artifacts[0].1,
            "https://update.code.visualstudio.com/1.91.1/win32-x64-archive/stable"
        );
        assert_eq!(
            artifacts[4].1,
            "https://update.code.visualstudio.com/1.91.1/cli-linux-x64/stable"
        );
    }
}
