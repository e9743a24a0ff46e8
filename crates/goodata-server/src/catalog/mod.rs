//! Read-only client for the data.gov.ro CKAN catalog.
//!
//! Only the two actions the ingestion pipeline needs are wrapped:
//! `package_search` (newest packages of an organization) and
//! `organization_show`.

mod client;
mod time;
mod types;

pub use client::{CatalogError, Client, DEFAULT_BASE_URL};
pub use time::parse_timestamp;
pub use types::{Organization, Package, PackageList, Resource};
