//! Asynchronous rotating file sink.
//!
//! Lines are queued under a bounded high-water mark and appended by a
//! single background writer, which is the only task that touches the open
//! file handle. Rotation happens by size (timestamp-suffixed rename) and by
//! UTC calendar day (day key embedded in the live path); both policies can
//! be active at once. I/O failures are routed to a non-fatal error callback
//! and the writer keeps going.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use tokio::io::AsyncWriteExt;

use super::{AuditSink, SinkError, SinkResult, normalize_line};

/// Default rotation threshold: 50 MiB.
const DEFAULT_MAX_BYTES: u64 = 50 * 1024 * 1024;
/// Default queue capacity, in lines.
const DEFAULT_HIGH_WATER_MARK: usize = 5000;
/// Poll tick while a blocked producer waits for queue space.
const WRITE_POLL: Duration = Duration::from_millis(5);
/// Poll tick while waiting for the queue to empty.
const DRAIN_POLL: Duration = Duration::from_millis(10);

/// Policy applied when the pending-line queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackpressureMode {
    /// Suspend the producer until space frees up. No data loss.
    #[default]
    Block,
    /// Return immediately and silently discard the line.
    Drop,
}

/// Non-fatal error callback invoked from the background writer.
pub type ErrorCallback = Arc<dyn Fn(&SinkError) + Send + Sync>;

/// Construction options for [`RotatingFileSink`].
#[derive(Clone)]
pub struct RotatingSinkOptions {
    /// Base file path, e.g. `./logs/audit.log`.
    pub path: PathBuf,
    /// Size threshold in bytes before rotation. `0` disables size rotation.
    pub max_bytes: u64,
    /// Embed the UTC day in the live path and rotate on day boundaries.
    pub rotate_daily: bool,
    /// Queue capacity, in lines.
    pub high_water_mark: usize,
    /// Full-queue policy.
    pub backpressure_mode: BackpressureMode,
    /// Receiver for non-fatal I/O errors.
    pub on_error: ErrorCallback,
}

impl RotatingSinkOptions {
    /// Options with defaults for the given base path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            max_bytes: DEFAULT_MAX_BYTES,
            rotate_daily: true,
            high_water_mark: DEFAULT_HIGH_WATER_MARK,
            backpressure_mode: BackpressureMode::default(),
            on_error: Arc::new(|err| tracing::warn!("audit sink error: {err}")),
        }
    }

    /// Set the size-rotation threshold (`0` disables).
    #[must_use]
    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Enable or disable daily rotation.
    #[must_use]
    pub fn with_rotate_daily(mut self, rotate_daily: bool) -> Self {
        self.rotate_daily = rotate_daily;
        self
    }

    /// Set the queue capacity.
    #[must_use]
    pub fn with_high_water_mark(mut self, high_water_mark: usize) -> Self {
        self.high_water_mark = high_water_mark;
        self
    }

    /// Set the full-queue policy.
    #[must_use]
    pub fn with_backpressure_mode(mut self, mode: BackpressureMode) -> Self {
        self.backpressure_mode = mode;
        self
    }

    /// Set the non-fatal error callback.
    #[must_use]
    pub fn with_on_error(mut self, on_error: ErrorCallback) -> Self {
        self.on_error = on_error;
        self
    }
}

impl std::fmt::Debug for RotatingSinkOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RotatingSinkOptions")
            .field("path", &self.path)
            .field("max_bytes", &self.max_bytes)
            .field("rotate_daily", &self.rotate_daily)
            .field("high_water_mark", &self.high_water_mark)
            .field("backpressure_mode", &self.backpressure_mode)
            .finish_non_exhaustive()
    }
}

/// The open file currently receiving appends. Owned by the writer task.
struct ActiveFile {
    file: tokio::fs::File,
    path: PathBuf,
    day_key: String,
    /// Pre-existing size plus bytes written since open.
    bytes: u64,
}

struct Inner {
    opts: RotatingSinkOptions,
    queue: Mutex<VecDeque<String>>,
    /// Re-entrancy guard: at most one flush loop per sink.
    writing: AtomicBool,
    /// One-way latch; once set, `write` silently no-ops.
    closing: AtomicBool,
    stream: tokio::sync::Mutex<Option<ActiveFile>>,
}

impl Inner {
    fn queue_len(&self) -> usize {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn pop(&self) -> Option<String> {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }

    fn day_key(&self) -> String {
        if self.opts.rotate_daily {
            Utc::now().format("%Y-%m-%d").to_string()
        } else {
            String::new()
        }
    }

    /// Live path for the given day key (empty key = the base path).
    fn current_path(&self, day_key: &str) -> PathBuf {
        if day_key.is_empty() {
            return self.opts.path.clone();
        }
        let dir = self.opts.path.parent().unwrap_or_else(|| Path::new("."));
        let stem = self
            .opts
            .path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("audit");
        let ext = self
            .opts
            .path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("log");
        dir.join(format!("{stem}-{day_key}.{ext}"))
    }

    /// Open (or re-open after rotation / day change) the live file.
    async fn ensure_stream(&self, slot: &mut Option<ActiveFile>) -> SinkResult<()> {
        let day_key = self.day_key();
        if let Some(active) = slot
            && active.day_key == day_key
        {
            return Ok(());
        }

        if let Some(parent) = self.opts.path.parent()
            && !parent.as_os_str().is_empty()
        {
            let _ = tokio::fs::create_dir_all(parent).await;
        }
        if let Some(mut old) = slot.take() {
            let _ = old.file.flush().await;
        }

        let path = self.current_path(&day_key);
        let bytes = tokio::fs::metadata(&path).await.map_or(0, |m| m.len());
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        *slot = Some(ActiveFile {
            file,
            path,
            day_key,
            bytes,
        });
        Ok(())
    }

    async fn append(&self, slot: &mut Option<ActiveFile>, line: &str) -> SinkResult<()> {
        self.ensure_stream(slot).await?;
        if let Some(active) = slot.as_mut() {
            active.file.write_all(line.as_bytes()).await?;
            active.bytes = active.bytes.saturating_add(line.len() as u64);
        }
        self.maybe_rotate(slot).await;
        Ok(())
    }

    /// Rotate the live file out of the way once it reaches the threshold.
    /// The next queued write re-opens a fresh file at the live path.
    async fn maybe_rotate(&self, slot: &mut Option<ActiveFile>) {
        if self.opts.max_bytes == 0 {
            return;
        }
        let over = slot
            .as_ref()
            .is_some_and(|active| active.bytes >= self.opts.max_bytes);
        if !over {
            return;
        }
        let Some(mut active) = slot.take() else {
            return;
        };
        let _ = active.file.flush().await;
        drop(active.file);

        let rotated = rotated_path(&active.path, &rotation_stamp());
        if let Err(source) = tokio::fs::rename(&active.path, &rotated).await {
            (self.opts.on_error)(&SinkError::Rotate {
                path: active.path,
                source,
            });
        }
    }
}

/// Compact UTC timestamp for rotated file names.
fn rotation_stamp() -> String {
    Utc::now()
        .to_rfc3339_opts(SecondsFormat::Millis, true)
        .chars()
        .filter(|c| *c != ':' && *c != '.')
        .collect()
}

/// Insert the rotation stamp before the extension.
fn rotated_path(path: &Path, stamp: &str) -> PathBuf {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => path.with_extension(format!("{stamp}.{ext}")),
        None => PathBuf::from(format!("{}.{stamp}", path.display())),
    }
}

/// Single-flight background writer. Holds the stream lock for the whole
/// batch, so file appends happen in exactly queue order.
async fn flush_loop(inner: Arc<Inner>) {
    loop {
        {
            let mut slot = inner.stream.lock().await;
            while let Some(line) = inner.pop() {
                if let Err(err) = inner.append(&mut slot, &line).await {
                    (inner.opts.on_error)(&err);
                }
            }
        }
        inner.writing.store(false, Ordering::Release);
        // A producer may have queued a line between the final pop and the
        // flag store. Reclaim the writer role if so, otherwise stop.
        if inner.queue_len() == 0
            || inner
                .writing
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
        {
            return;
        }
    }
}

/// Backpressure-aware sink appending to rotating files.
///
/// See the [module docs](self) for the queueing and rotation model.
#[derive(Clone)]
pub struct RotatingFileSink {
    inner: Arc<Inner>,
}

impl RotatingFileSink {
    /// Build a sink from options. No file is opened until the first write.
    #[must_use]
    pub fn new(options: RotatingSinkOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                opts: options,
                queue: Mutex::new(VecDeque::new()),
                writing: AtomicBool::new(false),
                closing: AtomicBool::new(false),
                stream: tokio::sync::Mutex::new(None),
            }),
        }
    }

    fn spawn_writer(&self) {
        if self
            .inner
            .writing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            tokio::spawn(flush_loop(Arc::clone(&self.inner)));
        }
    }
}

impl std::fmt::Debug for RotatingFileSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RotatingFileSink")
            .field("opts", &self.inner.opts)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl AuditSink for RotatingFileSink {
    async fn write(&self, line: &str) -> SinkResult<()> {
        if self.inner.closing.load(Ordering::Acquire) {
            return Ok(());
        }
        let line = normalize_line(line);

        loop {
            if self.inner.closing.load(Ordering::Acquire) {
                return Ok(());
            }
            {
                let mut queue = self
                    .inner
                    .queue
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                if queue.len() < self.inner.opts.high_water_mark {
                    queue.push_back(line);
                    break;
                }
            }
            if self.inner.opts.backpressure_mode == BackpressureMode::Drop {
                return Ok(());
            }
            tokio::time::sleep(WRITE_POLL).await;
        }

        self.spawn_writer();
        Ok(())
    }

    async fn drain(&self) -> SinkResult<()> {
        while self.inner.writing.load(Ordering::Acquire) || self.inner.queue_len() > 0 {
            tokio::time::sleep(DRAIN_POLL).await;
        }
        Ok(())
    }

    async fn close(&self) -> SinkResult<()> {
        self.inner.closing.store(true, Ordering::Release);
        self.drain().await?;
        let mut slot = self.inner.stream.lock().await;
        if let Some(mut active) = slot.take() {
            active.file.flush().await?;
            let _ = active.file.sync_all().await;
        }
        Ok(())
    }
}
