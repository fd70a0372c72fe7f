//! Trivial append-only sink, kept as the reference baseline.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use super::{AuditSink, SinkResult, normalize_line};

/// Appends each line directly to a single file, synchronously with the
/// caller. No queueing, no rotation. Useful as a baseline and in tests;
/// production callers want [`RotatingFileSink`](super::RotatingFileSink).
#[derive(Debug, Clone)]
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    /// Sink appending to the given path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl AuditSink for FileSink {
    async fn write(&self, line: &str) -> SinkResult<()> {
        let line = normalize_line(line);
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    async fn drain(&self) -> SinkResult<()> {
        Ok(())
    }

    async fn close(&self) -> SinkResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn appends_lines_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.log");
        let sink = FileSink::new(&path);

        sink.write(r#"{"n":1}"#).await.unwrap();
        sink.write(r#"{"n":2}"#).await.unwrap();
        sink.close().await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "{\"n\":1}\n{\"n\":2}\n");
    }
}
