//! HTTP client for catalog actions.

use std::time::Duration;

use reqwest::Url;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

use super::types::{Envelope, Organization, PackageList};

/// Production catalog endpoint.
pub const DEFAULT_BASE_URL: &str = "https://data.gov.ro/api/3/action";

/// Request timeout; catalog responses are small but the service is slow
/// under load.
const REQUEST_TIMEOUT_SECS: u64 = 60;

/// Errors returned by the catalog client.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Network-level failure (DNS, connect, timeout, read).
    #[error("catalog request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The catalog answered with `success = false`.
    #[error("catalog error: {message} ({kind})")]
    Remote { message: String, kind: String },

    /// The response body was not the expected JSON shape.
    #[error("malformed catalog response: {0}")]
    Decode(#[from] serde_json::Error),

    /// The configured base URL or a derived action URL is invalid.
    #[error("invalid catalog URL: {0}")]
    InvalidUrl(String),
}

/// Read-only catalog client.
pub struct Client {
    http: reqwest::Client,
    base_url: String,
}

impl Client {
    /// Client against the production catalog.
    pub fn new() -> Result<Self, CatalogError> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Client against an arbitrary base URL (tests point this at a mock
    /// server).
    pub fn with_base_url(base_url: &str) -> Result<Self, CatalogError> {
        Url::parse(base_url).map_err(|e| CatalogError::InvalidUrl(e.to_string()))?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(concat!("goodata/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Newest packages of an organization, most recently modified first.
    pub async fn search(
        &self,
        organization: &str,
        limit: u32,
    ) -> Result<PackageList, CatalogError> {
        let mut url = self.action_url("package_search")?;
        url.query_pairs_mut()
            .append_pair("fq", &format!("organization:{}", organization))
            .append_pair("sort", "metadata_modified desc")
            .append_pair("rows", &limit.to_string());

        self.get_json(url).await
    }

    /// Organization details by id or name.
    pub async fn organization(&self, id: &str) -> Result<Organization, CatalogError> {
        let mut url = self.action_url("organization_show")?;
        url.query_pairs_mut().append_pair("id", id);

        self.get_json(url).await
    }

    fn action_url(&self, action: &str) -> Result<Url, CatalogError> {
        Url::parse(&format!("{}/{}", self.base_url, action))
            .map_err(|e| CatalogError::InvalidUrl(e.to_string()))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, CatalogError> {
        debug!(url = %url, "catalog request");

        let response = self.http.get(url).send().await?;
        let body = response.bytes().await?;
        let envelope: Envelope<T> = serde_json::from_slice(&body)?;

        if !envelope.success {
            let (message, kind) = match envelope.error {
                Some(error) => (error.message, error.kind),
                None => ("request failed".to_string(), "UnknownError".to_string()),
            };
            return Err(CatalogError::Remote { message, kind });
        }

        envelope.result.ok_or_else(|| {
            use serde::de::Error as _;
            CatalogError::Decode(serde_json::Error::custom(
                "successful response is missing the result field",
            ))
        })
    }
}
