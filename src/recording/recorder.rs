use anyhow::{Context, Result};
use chrono::Local;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::{info, warn};

/// Recording destination and rotation policy.
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    pub dir: PathBuf,
    pub prefix: String,
    /// Instrument serial number, if known when recording starts.
    pub serial_number: Option<String>,
    pub extension: String,
    /// Rotate to a fresh file once this many bytes have been written.
    pub max_file_size: u64,
}

impl RecorderConfig {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            prefix: "RTI".to_string(),
            serial_number: None,
            extension: "ens".to_string(),
            max_file_size: 16 * 1024 * 1024,
        }
    }
}

struct RecorderInner {
    writer: Option<BufWriter<File>>,
    current_path: Option<PathBuf>,
    bytes_in_file: u64,
    bytes_total: u64,
}

/// Appends ensemble bytes to size-rotated binary files.
///
/// The file is created lazily on the first write. One lock guards the
/// writer so concurrent producers (live recording vs. a playback step)
/// cannot interleave partial blocks. Dropping the recorder flushes and
/// closes the current file; an unflushed tail buffer is a data-loss bug,
/// not something left to finalization.
pub struct EnsembleRecorder {
    config: RecorderConfig,
    inner: Mutex<RecorderInner>,
}

impl EnsembleRecorder {
    pub fn new(config: RecorderConfig) -> Result<Self> {
        fs::create_dir_all(&config.dir)
            .with_context(|| format!("failed to create recording directory {:?}", config.dir))?;
        Ok(Self {
            config,
            inner: Mutex::new(RecorderInner {
                writer: None,
                current_path: None,
                bytes_in_file: 0,
                bytes_total: 0,
            }),
        })
    }

    /// Append one block of bytes to the current file, opening or rotating
    /// it first as needed. A block is never split across two files.
    pub fn record_data(&self, bytes: &[u8]) -> Result<()> {
        let mut inner = self.lock();

        let needs_rotation = inner.writer.is_some()
            && inner.bytes_in_file + bytes.len() as u64 > self.config.max_file_size;
        if needs_rotation {
            self.close_current(&mut inner)?;
        }

        if inner.writer.is_none() {
            let path = self.next_file_path()?;
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("failed to create recording file {path:?}"))?;
            info!(path = %path.display(), "recording to new file");
            inner.writer = Some(BufWriter::new(file));
            inner.current_path = Some(path);
            inner.bytes_in_file = 0;
        }

        if let Some(writer) = inner.writer.as_mut() {
            writer
                .write_all(bytes)
                .context("failed to append to recording file")?;
            inner.bytes_in_file += bytes.len() as u64;
            inner.bytes_total += bytes.len() as u64;
        }
        Ok(())
    }

    /// Flush buffered writes to disk without closing the file.
    pub fn flush(&self) -> Result<()> {
        let mut inner = self.lock();
        if let Some(writer) = inner.writer.as_mut() {
            writer.flush().context("failed to flush recording file")?;
        }
        Ok(())
    }

    /// Flush and close the current file. The next write starts a new one.
    pub fn close(&self) -> Result<Option<PathBuf>> {
        let mut inner = self.lock();
        let path = inner.current_path.clone();
        self.close_current(&mut inner)?;
        Ok(path)
    }

    /// Total bytes accepted across all files.
    pub fn bytes_written(&self) -> u64 {
        self.lock().bytes_total
    }

    pub fn current_file(&self) -> Option<PathBuf> {
        self.lock().current_path.clone()
    }

    fn close_current(&self, inner: &mut RecorderInner) -> Result<()> {
        if let Some(mut writer) = inner.writer.take() {
            writer.flush().context("failed to flush recording file on close")?;
        }
        inner.current_path = None;
        inner.bytes_in_file = 0;
        Ok(())
    }

    /// `<prefix>_<serial-or-none>_<yyyyMMddHHmmss>.<ext>`, with a numeric
    /// suffix when two files land in the same second.
    fn next_file_path(&self) -> Result<PathBuf> {
        let serial = self
            .config
            .serial_number
            .clone()
            .unwrap_or_else(|| "none".to_string());
        let timestamp = Local::now().format("%Y%m%d%H%M%S");
        let stem = format!("{}_{}_{}", self.config.prefix, serial, timestamp);

        let mut path = self.config.dir.join(format!("{stem}.{}", self.config.extension));
        let mut index = 1;
        while path.exists() {
            path = self
                .config
                .dir
                .join(format!("{stem}_{index}.{}", self.config.extension));
            index += 1;
        }
        Ok(path)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RecorderInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for EnsembleRecorder {
    fn drop(&mut self) {
        let mut inner = self.lock();
        if let Err(e) = self.close_current(&mut inner) {
            warn!("failed to flush recording on drop: {e:#}");
        }
    }
}
