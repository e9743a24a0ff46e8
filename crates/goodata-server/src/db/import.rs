//! Staging-table import engine.
//!
//! A direct `COPY` into the target table would collide with generated
//! columns (the FTS vector on `companies`) and cannot ignore conflicts, so
//! each file is streamed into a transaction-scoped staging table first:
//!
//! 1. `CREATE TEMP TABLE <prefix>_<n> (LIKE <target> INCLUDING DEFAULTS
//!    EXCLUDING GENERATED) ON COMMIT DROP`
//! 2. `COPY` the file into the staging table
//! 3. `INSERT INTO <target> ... SELECT ... ON CONFLICT DO NOTHING`
//!
//! The whole sequence runs in a transaction nested inside the caller's, so
//! a failed file rolls back cleanly while the caller decides what to do
//! with its own transaction.

use std::collections::HashMap;

use rand::Rng;
use sqlx::{Acquire, Postgres, Transaction};
use tokio::io::AsyncBufRead;
use tracing::{debug, info};

use super::import_config::import_config;
use super::{copy, quote_ident, DbError, DbResult};
use crate::catalog::Resource;
use crate::csv::{CopySource, Reader, DEFAULT_DELIMITER};

/// Progress is logged every this many rows during the bulk copy.
const PROGRESS_ROW_INTERVAL: u64 = 10_000;

#[derive(Debug, Clone, Copy)]
pub struct ImportOutcome {
    pub rows_copied: u64,
    pub rows_inserted: u64,
}

/// Import one resource file into its target table.
///
/// # Errors
///
/// [`DbError::UnknownResource`] when the resource name has no import
/// configuration; [`DbError::Io`] when the stream fails; [`DbError::Sqlx`]
/// for staging DDL, copy or insert failures. All of them leave the inner
/// transaction rolled back and the outer transaction untouched.
pub async fn import<R>(
    tx: &mut Transaction<'_, Postgres>,
    resource: &Resource,
    data: R,
) -> DbResult<ImportOutcome>
where
    R: AsyncBufRead + Unpin + Send,
{
    let config = import_config(&resource.name)
        .ok_or_else(|| DbError::UnknownResource(resource.name.clone()))?;

    debug!(resource_name = %resource.name, "reading headers");
    let mut reader = Reader::new(data, DEFAULT_DELIMITER);
    let mut headers = reader.read_record().await?.ok_or_else(|| {
        DbError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "input ended before the header row",
        ))
    })?;

    strip_bom(&mut headers);
    normalize_headers(&mut headers, &config.columns);
    debug!(column_count = headers.len(), "headers parsed");

    let mut inner = tx.begin().await?;

    let staging = format!(
        "{}_{}",
        config.staging_prefix,
        rand::thread_rng().gen_range(0..5000)
    );
    debug!(
        staging_table = %staging,
        target_table = config.table,
        "creating staging table"
    );
    let ddl = format!(
        "CREATE TEMP TABLE {} (LIKE {} INCLUDING DEFAULTS EXCLUDING GENERATED) ON COMMIT DROP",
        quote_ident(&staging),
        quote_ident(config.table)
    );
    sqlx::query(&ddl).execute(&mut *inner).await?;

    let resource_name = resource.name.clone();
    let mut source = CopySource::new(reader).with_progress(
        move |rows| debug!(resource_name = %resource_name, rows_processed = rows, "import progress"),
        PROGRESS_ROW_INTERVAL,
    );

    debug!("copying data to staging table");
    let rows_copied = copy::copy_from(&mut *inner, &staging, &headers, &mut source).await?;

    let column_list = headers
        .iter()
        .map(|header| quote_ident(header))
        .collect::<Vec<_>>()
        .join(", ");
    let insert = format!(
        "INSERT INTO {} ({}) SELECT {} FROM {} ON CONFLICT DO NOTHING",
        quote_ident(config.table),
        column_list,
        column_list,
        quote_ident(&staging)
    );
    let result = sqlx::query(&insert).execute(&mut *inner).await?;

    inner.commit().await?;

    let outcome = ImportOutcome {
        rows_copied,
        rows_inserted: result.rows_affected(),
    };
    info!(
        resource_name = %resource.name,
        table = config.table,
        rows_copied = outcome.rows_copied,
        rows_inserted = outcome.rows_inserted,
        "import completed"
    );

    Ok(outcome)
}

/// Remove a UTF-8 BOM from the first header if present.
pub(crate) fn strip_bom(headers: &mut [String]) {
    if let Some(first) = headers.first_mut() {
        if let Some(stripped) = first.strip_prefix('\u{feff}') {
            *first = stripped.to_string();
        }
    }
}

/// Lowercase each header and substitute through the column mapping;
/// unmapped headers keep their lowercased form.
pub(crate) fn normalize_headers(headers: &mut [String], mapping: &HashMap<&str, &str>) {
    for header in headers {
        let lowered = header.to_lowercase();
        *header = match mapping.get(lowered.as_str()) {
            Some(column) => (*column).to_string(),
            None => lowered,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_bom() {
        let mut headers = vec!["\u{feff}COD".to_string(), "DENUMIRE".to_string()];
        strip_bom(&mut headers);
        assert_eq!(headers, ["COD", "DENUMIRE"]);
    }

    #[test]
    fn test_strip_bom_without_bom_is_noop() {
        let mut headers = vec!["COD".to_string()];
        strip_bom(&mut headers);
        assert_eq!(headers, ["COD"]);
    }

    #[test]
    fn test_normalize_headers_applies_mapping() {
        let mapping = HashMap::from([("cod", "code"), ("denumire", "name")]);
        let mut headers = vec!["COD".to_string(), "DENUMIRE".to_string()];
        normalize_headers(&mut headers, &mapping);
        assert_eq!(headers, ["code", "name"]);
    }

    #[test]
    fn test_normalize_headers_falls_back_to_lowercase() {
        let mapping = HashMap::from([("cod", "code")]);
        let mut headers = vec!["COD".to_string(), "NECUNOSCUT".to_string()];
        normalize_headers(&mut headers, &mapping);
        assert_eq!(headers, ["code", "necunoscut"]);
    }

    #[test]
    fn test_full_header_pipeline_for_companies() {
        let config = import_config("OD_FIRME.CSV").unwrap();
        let mut headers = vec![
            "\u{feff}DENUMIRE".to_string(),
            "CUI".to_string(),
            "COD_INMATRICULARE".to_string(),
        ];
        strip_bom(&mut headers);
        normalize_headers(&mut headers, &config.columns);
        assert_eq!(headers, ["name", "tax_id", "registration_code"]);
    }
}
