use tokio::io::AsyncBufRead;

use super::Reader;

/// Callback invoked with the running row count.
pub type ProgressCallback = Box<dyn Fn(u64) + Send>;

/// Row-at-a-time adapter over a [`Reader`], consumed by the bulk-copy
/// routine. Optionally reports progress every `interval` rows.
pub struct CopySource<R> {
    reader: Reader<R>,
    current: Vec<String>,
    rows: u64,
    progress: Option<(ProgressCallback, u64)>,
}

impl<R: AsyncBufRead + Unpin> CopySource<R> {
    pub fn new(reader: Reader<R>) -> Self {
        Self {
            reader,
            current: Vec::new(),
            rows: 0,
            progress: None,
        }
    }

    /// Invoke `callback` every `interval` rows while draining.
    pub fn with_progress(
        mut self,
        callback: impl Fn(u64) + Send + 'static,
        interval: u64,
    ) -> Self {
        self.progress = Some((Box::new(callback), interval));
        self
    }

    /// Advance to the next row. Returns `false` at end of input.
    pub async fn advance(&mut self) -> std::io::Result<bool> {
        match self.reader.read_record().await? {
            None => Ok(false),
            Some(record) => {
                self.current = record;
                self.rows += 1;
                if let Some((callback, interval)) = &self.progress {
                    if *interval > 0 && self.rows % interval == 0 {
                        callback(self.rows);
                    }
                }
                Ok(true)
            }
        }
    }

    /// Fields of the current row.
    pub fn values(&self) -> &[String] {
        &self.current
    }

    /// Rows read so far.
    pub fn rows(&self) -> u64 {
        self.rows
    }
}
