use chrono::{DateTime, Utc};
use url::Url;

use crate::platform::Platform;

/// A single downloadable vsix resolved for one extension.
///
/// Platform-neutral extensions produce one asset with `platform: None`;
/// platform-split extensions produce one asset per wanted platform. Assets
/// flagged `ignore` are kept on disk but left out of the manifest.
#[derive(Debug, Clone)]
pub struct Asset {
    pub name: String,
    pub version: String,
    pub engine: String,
    pub uri: Url,
    pub timestamp: DateTime<Utc>,
    pub platform: Option<Platform>,
    pub ignore: bool,
}

impl Asset {
    /// File name of the archive in the mirror directory.
    pub fn vsix(&self) -> String {
        match self.platform {
            Some(platform) => format!("{}-{}-{}.vsix", self.name, platform, self.version),
            None => format!("{}-{}.vsix", self.name, self.version),
        }
    }
}
