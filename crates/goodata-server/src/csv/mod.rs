//! Streaming reader for the registry's delimited exports.
//!
//! The upstream files are not RFC 4180 CSV: records are plain lines split
//! on a single delimiter character (`^`), with no quoting and no embedded
//! newlines. A quoting-aware parser would mangle them, so the reader stays
//! line-oriented on purpose.

mod reader;
mod source;

pub use reader::{Reader, DEFAULT_DELIMITER};
pub use source::CopySource;
