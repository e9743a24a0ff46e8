//! Shared ambient concerns for the goodata workspace.
//!
//! Currently this is the logging configuration used by every binary: a
//! small wrapper over `tracing-subscriber` that understands the
//! `GOO_LOG_LEVEL` / `GOO_LOG_TYPE` environment variables.

pub mod logging;

pub use logging::{init_logging, LogConfig, LogFormat, LogLevel};
