mod cache;
mod models;

pub use cache::*;
pub use models::*;

use std::collections::BTreeSet;
use std::sync::Arc;

use reqwest::Client;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::redirect::Policy;
use sha2::Digest as _;

use crate::error::MirrorError;

const GALLERY_URL: &str =
    "https://marketplace.visualstudio.com/_apis/public/gallery/extensionquery";

const ACCEPT_API_VERSION: &str = "application/json;api-version=3.0-preview.1";

/// Client for the extension gallery query endpoint.
#[derive(Clone)]
pub struct GalleryClient {
    client: Client,
    cache: Arc<dyn QueryCache>,
}

impl GalleryClient {
    /// Prepare the gallery client.
    pub fn new(cache: Arc<dyn QueryCache>) -> Result<Self, MirrorError> {
        let client = Client::builder()
            .user_agent(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION")
            ))
            .redirect(Policy::limited(10))
            .hickory_dns(true)
            .build()?;

        Ok(Self { client, cache })
    }

    /// Query the gallery for a set of extension identifiers.
    ///
    /// The response carries asset uris, version properties and categories
    /// for every published extension matching one of the identifiers.
    #[tracing::instrument(skip(self))]
    pub async fn query(
        &self,
        extension_ids: &BTreeSet<String>,
    ) -> Result<QueryResponse, MirrorError> {
        let body = serde_json::to_vec(&build_query(extension_ids))?;
        let key = cache_key(&body);

        let data = match self.cache.load(&key).await? {
            Some(data) => data,
            None => {
                let response = self
                    .client
                    .post(GALLERY_URL)
                    .header(CONTENT_TYPE, "application/json")
                    .header(ACCEPT, ACCEPT_API_VERSION)
                    .body(body.clone())
                    .send()
                    .await?
                    .error_for_status()?;

                let data = response.bytes().await?;
                self.cache.store(&key, &body, &data).await?;

                data.to_vec()
            }
        };

        serde_json::from_slice(&data).map_err(MirrorError::from)
    }
}

/// Build the query request for a set of identifiers.
///
/// Identifier criteria are emitted in sorted order so the same set always
/// produces the same body, and with it the same cache key.
pub(crate) fn build_query(extension_ids: &BTreeSet<String>) -> QueryRequest {
    let mut criteria = vec![
        QueryCriterium {
            filter_type: FILTER_TYPE_TARGET,
            value: "Microsoft.VisualStudio.Code".to_owned(),
        },
        QueryCriterium {
            filter_type: FILTER_TYPE_EXCLUDE_WITH_FLAGS,
            value: FLAG_UNPUBLISHED.to_string(),
        },
    ];

    criteria.extend(extension_ids.iter().map(|extension_id| QueryCriterium {
        filter_type: FILTER_TYPE_EXTENSION_NAME,
        value: extension_id.clone(),
    }));

    QueryRequest {
        filters: vec![QueryFilter { criteria }],
        flags: FLAG_INCLUDE_ASSET_URI
            | FLAG_INCLUDE_VERSION_PROPERTIES
            | FLAG_INCLUDE_CATEGORY_AND_TAGS,
    }
}

pub(crate) fn cache_key(body: &[u8]) -> String {
    hex::encode(&sha2::Sha256::digest(body)[..4])
}
