//! Environment configuration.
//!
//! Every variable is optional and falls back to a local-development
//! default, so `goodata-server` starts with no environment at all against
//! a stock local Postgres.

use anyhow::Result;
use goodata_common::logging::LogConfig;

use crate::db::DbConfig;

/// Settings for the externally managed OpenTelemetry collector. They are
/// parsed and surfaced here; the exporter itself is wired outside this
/// service.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub enabled: bool,
    pub otel_endpoint: String,
    pub service_name: String,
    pub service_version: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub log: LogConfig,
    pub telemetry: TelemetryConfig,
    /// Root directory of the on-disk resource store.
    pub data_dir: String,
}

impl Config {
    /// Load configuration from the environment.
    ///
    /// Variables: `GOO_DB_URL`, `GOO_LOG_LEVEL`, `GOO_LOG_TYPE`,
    /// `GOO_DATA_DIR`, `GOO_TELEMETRY_ENABLED`, and when telemetry is
    /// enabled `OTEL_ENDPOINT`, `SERVICE_NAME`, `SERVICE_VERSION`.
    pub fn load() -> Result<Self> {
        let db = DbConfig {
            url: env_or("GOO_DB_URL", &DbConfig::default().url),
            ..DbConfig::default()
        };

        let log = LogConfig::from_env()?;

        let telemetry = TelemetryConfig {
            enabled: env_or("GOO_TELEMETRY_ENABLED", "false")
                .to_lowercase()
                .parse()
                .unwrap_or(false),
            otel_endpoint: env_or("OTEL_ENDPOINT", "localhost:4317"),
            service_name: env_or("SERVICE_NAME", "goodata"),
            service_version: env_or("SERVICE_VERSION", env!("CARGO_PKG_VERSION")),
        };

        let data_dir = env_or("GOO_DATA_DIR", "data");

        Ok(Self {
            db,
            log,
            telemetry,
            data_dir,
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    // Single test: the cases share env vars and tests run in parallel.
    #[test]
    fn test_load_defaults_and_overrides() {
        std::env::remove_var("GOO_DB_URL");
        std::env::remove_var("GOO_DATA_DIR");
        std::env::remove_var("GOO_TELEMETRY_ENABLED");

        let config = Config::load().unwrap();
        assert!(config.db.url.starts_with("postgres://"));
        assert_eq!(config.data_dir, "data");
        assert!(!config.telemetry.enabled);
        assert_eq!(config.telemetry.service_name, "goodata");

        std::env::set_var("GOO_DB_URL", "postgres://example/registry");
        std::env::set_var("GOO_DATA_DIR", "/var/lib/goodata");
        std::env::set_var("GOO_TELEMETRY_ENABLED", "true");

        let config = Config::load().unwrap();
        assert_eq!(config.db.url, "postgres://example/registry");
        assert_eq!(config.data_dir, "/var/lib/goodata");
        assert!(config.telemetry.enabled);

        std::env::remove_var("GOO_DB_URL");
        std::env::remove_var("GOO_DATA_DIR");
        std::env::remove_var("GOO_TELEMETRY_ENABLED");
    }
}
