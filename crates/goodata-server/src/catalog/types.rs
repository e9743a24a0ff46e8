//! Wire types for the catalog API.
//!
//! Every action returns the same envelope: `{help, success, result,
//! error?}`. Result payloads are deserialized leniently — the catalog adds
//! and drops fields over time, so everything optional defaults instead of
//! failing the whole response.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::time;

/// Response envelope shared by all catalog actions.
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    #[serde(default)]
    #[allow(dead_code)]
    pub help: Option<String>,
    pub success: bool,
    #[serde(default = "Option::default")]
    pub result: Option<T>,
    #[serde(default)]
    pub error: Option<ApiError>,
}

/// Error payload reported by the catalog when `success` is false.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ApiError {
    #[serde(default)]
    pub message: String,
    #[serde(rename = "__type", default)]
    pub kind: String,
}

/// A downloadable artifact within a package.
///
/// The `id` is stable across catalog revisions and is the primary key for
/// the local metadata mirror. Descriptors are never mutated locally.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Resource {
    pub id: Uuid,
    #[serde(default)]
    pub package_id: Option<Uuid>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub url: String,
    #[serde(default)]
    pub url_type: Option<String>,
    #[serde(default)]
    pub format: String,
    #[serde(default)]
    pub mimetype: Option<String>,
    #[serde(default)]
    pub size: Option<i64>,
    #[serde(default)]
    pub hash: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub position: Option<i32>,
    #[serde(default, deserialize_with = "time::deserialize_optional")]
    pub created: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "time::deserialize_optional")]
    pub last_modified: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "time::deserialize_optional")]
    pub cache_last_updated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub datastore_active: bool,
    #[serde(default)]
    pub revision_id: Option<Uuid>,
}

/// A versioned bundle of resources published by an organization.
#[derive(Debug, Clone, Deserialize)]
pub struct Package {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub metadata_created: Option<String>,
    #[serde(default)]
    pub metadata_modified: Option<String>,
    #[serde(default)]
    pub resources: Vec<Resource>,
}

/// Result of `package_search`.
#[derive(Debug, Clone, Deserialize)]
pub struct PackageList {
    #[serde(default)]
    pub count: i64,
    #[serde(default)]
    pub sort: Option<String>,
    #[serde(default)]
    pub results: Vec<Package>,
}

/// Result of `organization_show`.
#[derive(Debug, Clone, Deserialize)]
pub struct Organization {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub package_count: i64,
    #[serde(default)]
    pub state: String,
}
