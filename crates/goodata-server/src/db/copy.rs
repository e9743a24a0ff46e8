//! Streaming bulk load via `COPY ... FROM STDIN`.
//!
//! Rows come from a [`CopySource`] and are encoded in COPY text format:
//! tab-separated fields, `\t` `\n` `\r` `\\` escaped. Empty fields are
//! sent as empty strings, never as NULL — the target columns are TEXT and
//! the upstream data uses empty for absent.

use sqlx::postgres::PgConnection;
use tokio::io::AsyncBufRead;

use super::{quote_ident, DbError, DbResult};
use crate::csv::CopySource;

/// Encoded rows are flushed to the server once the buffer reaches this
/// size.
const SEND_BUFFER_BYTES: usize = 64 * 1024;

/// Drain `source` into `table`, returning the number of rows copied.
pub async fn copy_from<R>(
    conn: &mut PgConnection,
    table: &str,
    columns: &[String],
    source: &mut CopySource<R>,
) -> DbResult<u64>
where
    R: AsyncBufRead + Unpin + Send,
{
    let column_list = columns
        .iter()
        .map(|column| quote_ident(column))
        .collect::<Vec<_>>()
        .join(", ");
    let statement = format!(
        "COPY {} ({}) FROM STDIN",
        quote_ident(table),
        column_list
    );

    let mut sink = conn.copy_in_raw(&statement).await?;
    let mut buffer = Vec::with_capacity(SEND_BUFFER_BYTES * 2);

    loop {
        let advanced = match source.advance().await {
            Ok(advanced) => advanced,
            Err(error) => {
                sink.abort("row source failed").await?;
                return Err(DbError::Io(error));
            }
        };
        if !advanced {
            break;
        }

        encode_row(source.values(), &mut buffer);
        if buffer.len() >= SEND_BUFFER_BYTES {
            sink.send(buffer.as_slice()).await?;
            buffer.clear();
        }
    }

    if !buffer.is_empty() {
        sink.send(buffer.as_slice()).await?;
    }

    let rows = sink.finish().await?;
    Ok(rows)
}

/// Append one row in COPY text format.
fn encode_row(values: &[String], buffer: &mut Vec<u8>) {
    for (index, value) in values.iter().enumerate() {
        if index > 0 {
            buffer.push(b'\t');
        }
        for &byte in value.as_bytes() {
            match byte {
                b'\\' => buffer.extend_from_slice(b"\\\\"),
                b'\t' => buffer.extend_from_slice(b"\\t"),
                b'\n' => buffer.extend_from_slice(b"\\n"),
                b'\r' => buffer.extend_from_slice(b"\\r"),
                _ => buffer.push(byte),
            }
        }
    }
    buffer.push(b'\n');
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(values: &[&str]) -> String {
        let mut buffer = Vec::new();
        let owned: Vec<String> = values.iter().map(|v| v.to_string()).collect();
        encode_row(&owned, &mut buffer);
        String::from_utf8(buffer).unwrap()
    }

    #[test]
    fn test_encode_plain_row() {
        assert_eq!(encode(&["123", "ACME SRL"]), "123\tACME SRL\n");
    }

    #[test]
    fn test_encode_empty_fields_stay_empty() {
        // Empty string, not \N: absent values in the source data are empty
        // text, and the target columns are TEXT.
        assert_eq!(encode(&["a", "", "c"]), "a\t\tc\n");
    }

    #[test]
    fn test_encode_escapes_specials() {
        assert_eq!(encode(&["a\tb", "c\nd", "e\\f"]), "a\\tb\tc\\nd\te\\\\f\n");
    }

    #[test]
    fn test_encode_diacritics_pass_through() {
        assert_eq!(encode(&["MAXIM ȘERBAN"]), "MAXIM ȘERBAN\n");
    }
}
