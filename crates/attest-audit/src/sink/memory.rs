//! In-memory sink (for testing).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use super::{AuditSink, SinkResult, normalize_line};

/// Collects lines in memory instead of touching the filesystem.
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<String>>,
    closed: AtomicBool,
}

impl MemorySink {
    /// Snapshot of the accepted lines, without trailing newlines.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl AuditSink for MemorySink {
    async fn write(&self, line: &str) -> SinkResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Ok(());
        }
        let normalized = normalize_line(line);
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(normalized.trim_end().to_string());
        Ok(())
    }

    async fn drain(&self) -> SinkResult<()> {
        Ok(())
    }

    async fn close(&self) -> SinkResult<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
