use tokio::io::{AsyncBufRead, AsyncBufReadExt};

/// Delimiter used by every registry export.
pub const DEFAULT_DELIMITER: char = '^';

/// Line-oriented delimited-record reader.
///
/// The first record returned is the header row. The sequence is lazy,
/// finite and not restartable.
pub struct Reader<R> {
    inner: R,
    delimiter: char,
    line: String,
}

impl<R: AsyncBufRead + Unpin> Reader<R> {
    pub fn new(inner: R, delimiter: char) -> Self {
        Self {
            inner,
            delimiter,
            line: String::new(),
        }
    }

    /// Next record, or `None` at end of input.
    pub async fn read_record(&mut self) -> std::io::Result<Option<Vec<String>>> {
        self.line.clear();
        let read = self.inner.read_line(&mut self.line).await?;
        if read == 0 {
            return Ok(None);
        }

        let line = self.line.trim_end_matches(['\r', '\n']);
        Ok(Some(
            line.split(self.delimiter).map(str::to_owned).collect(),
        ))
    }
}
