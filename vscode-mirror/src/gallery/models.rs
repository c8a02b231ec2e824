use chrono::{DateTime, Utc};
use reqwest::Url;
use serde::{Deserialize, Serialize};

// Filter types and query flags of the gallery protocol, see
// https://github.com/microsoft/vscode/blob/main/src/vs/platform/extensionManagement/common/extensionGalleryService.ts

pub const FILTER_TYPE_EXTENSION_NAME: u32 = 7;
pub const FILTER_TYPE_TARGET: u32 = 8;
pub const FILTER_TYPE_EXCLUDE_WITH_FLAGS: u32 = 12;

pub const FLAG_INCLUDE_CATEGORY_AND_TAGS: u32 = 0x4;
pub const FLAG_INCLUDE_VERSION_PROPERTIES: u32 = 0x10;
pub const FLAG_INCLUDE_ASSET_URI: u32 = 0x80;
pub const FLAG_UNPUBLISHED: u32 = 0x1000;

pub const PROPERTY_ENGINE: &str = "Microsoft.VisualStudio.Code.Engine";
pub const PROPERTY_PRE_RELEASE: &str = "Microsoft.VisualStudio.Code.PreRelease";

#[derive(Debug, Clone, Serialize)]
pub struct QueryRequest {
    pub filters: Vec<QueryFilter>,
    pub flags: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryFilter {
    pub criteria: Vec<QueryCriterium>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryCriterium {
    pub filter_type: u32,
    pub value: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueryResponse {
    pub results: Vec<QueryResult>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueryResult {
    pub extensions: Vec<GalleryExtension>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GalleryExtension {
    pub publisher: GalleryPublisher,
    pub extension_name: String,
    pub versions: Vec<GalleryVersion>,

    #[serde(default)]
    pub categories: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GalleryPublisher {
    pub publisher_name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GalleryVersion {
    pub version: String,
    pub flags: String,
    pub last_updated: DateTime<Utc>,
    pub asset_uri: Url,

    #[serde(default)]
    pub target_platform: Option<String>,

    #[serde(default)]
    pub properties: Vec<GalleryProperty>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GalleryProperty {
    pub key: String,
    pub value: String,
}

impl GalleryExtension {
    /// Identifier in `publisher.name` form.
    pub fn identifier(&self) -> String {
        format!("{}.{}", self.publisher.publisher_name, self.extension_name)
    }

    /// Extension packs bundle other extensions, listed in their archive manifest.
    pub fn is_pack(&self) -> bool {
        self.categories.iter().any(|c| c == "Extension Packs")
    }
}

impl GalleryVersion {
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|property| property.key == key)
            .map(|property| property.value.as_str())
    }
}
