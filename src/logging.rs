//! Logging core for VoxelScope
//!
//! Single writer of record for all structured events: a rotating file sink
//! plus an in-memory ring buffer consumed by the log viewer. `log()` never
//! raises; a failed disk write degrades to a best-effort stderr line.
//!
//! A `LogCore` is an explicitly constructed instance so tests can run with
//! isolated cores; `install()` additionally registers it behind the `log`
//! facade (once per process) so `log::warn!` from anywhere in the host
//! application lands in the same sink.

use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, Once, TryLockError};

use chrono::{DateTime, Local};
use log::LevelFilter;

use crate::config::LogSettings;
use crate::error::{ApplicationError, Details, ErrorCategory, ErrorSeverity};

/// Timestamp format for log entries
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Global facade-installation guard
static INSTALL_LOGGER: Once = Once::new();

/// A structured log record as kept in the ring buffer.
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub timestamp: DateTime<Local>,
    pub severity: ErrorSeverity,
    pub source: String,
    pub message: String,
    pub details: Option<Details>,
    pub error: Option<ApplicationError>,
}

impl LogRecord {
    /// Render the stable single-line file format:
    /// `timestamp | severity | source | message | [details...]`.
    fn format_line(&self) -> String {
        let mut line = format!(
            "{} | {} | {} | {}",
            self.timestamp.format(TIMESTAMP_FORMAT),
            self.severity,
            self.source,
            self.message
        );
        if let Some(details) = &self.details {
            if !details.is_empty() {
                line.push_str(&format!(" | [{}]", details));
            }
        }
        if let Some(error) = &self.error {
            line.push_str(&format!(" | error: {}", error));
        }
        line.push('\n');
        line
    }
}

struct Inner {
    settings: LogSettings,
    file: Option<File>,
    active_size: u64,
    next_seq: u32,
    buffer: VecDeque<LogRecord>,
}

/// The logging core. Owns the active file handle, rotation bookkeeping, and
/// the in-memory ring buffer, all behind one short-lived lock.
pub struct LogCore {
    inner: Mutex<Inner>,
}

impl LogCore {
    pub fn new(settings: LogSettings) -> Self {
        let capacity = settings.buffer_capacity;
        Self {
            inner: Mutex::new(Inner {
                settings,
                file: None,
                active_size: 0,
                next_seq: 1,
                buffer: VecDeque::with_capacity(capacity),
            }),
        }
    }

    /// The ring buffer must survive a panic raised while the lock was held,
    /// so a poisoned mutex is recovered rather than treated as dead.
    fn lock_inner(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(inner) => inner,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Append a plain record.
    pub fn log(&self, severity: ErrorSeverity, source: &str, message: &str) {
        self.log_with(severity, source, message, None, None);
    }

    /// Append a record with optional structured details and an attached
    /// error. Never raises; disk failures are swallowed after a best-effort
    /// stderr note.
    pub fn log_with(
        &self,
        severity: ErrorSeverity,
        source: &str,
        message: &str,
        details: Option<Details>,
        error: Option<ApplicationError>,
    ) {
        let record = LogRecord {
            timestamp: Local::now(),
            severity,
            source: source.to_string(),
            message: message.to_string(),
            details,
            error,
        };
        Self::append(&mut self.lock_inner(), record);
    }

    /// Try-lock variant for the failure trap: never waits on the logging
    /// lock, falling back to stderr if another context holds it.
    pub fn log_best_effort(&self, severity: ErrorSeverity, source: &str, message: &str) {
        let record = LogRecord {
            timestamp: Local::now(),
            severity,
            source: source.to_string(),
            message: message.to_string(),
            details: None,
            error: None,
        };
        match self.inner.try_lock() {
            Ok(mut inner) => Self::append(&mut inner, record),
            Err(TryLockError::Poisoned(poisoned)) => {
                Self::append(&mut poisoned.into_inner(), record)
            }
            Err(TryLockError::WouldBlock) => {
                let _ = io::stderr().write_all(record.format_line().as_bytes());
            }
        }
    }

    fn append(inner: &mut Inner, record: LogRecord) {
        if record.severity < inner.settings.level {
            return;
        }

        let line = record.format_line();

        if inner.settings.file_enabled {
            Self::write_to_file(inner, &line);
        }

        if inner.settings.console_enabled {
            let _ = io::stderr().write_all(line.as_bytes());
        }

        if inner.buffer.len() >= inner.settings.buffer_capacity {
            inner.buffer.pop_front();
        }
        inner.buffer.push_back(record);
    }

    fn write_to_file(inner: &mut Inner, line: &str) {
        if inner.file.is_none() {
            match Self::open_active_file(&inner.settings.file_path) {
                Ok((file, size)) => {
                    inner.file = Some(file);
                    inner.active_size = size;
                    // Resume after backups left by a previous run instead of
                    // clobbering `<path>.1`.
                    inner.next_seq = next_rotation_seq(&inner.settings.file_path);
                }
                Err(e) => {
                    let _ = writeln!(io::stderr(), "log file unavailable: {}", e);
                    return;
                }
            }
        }

        // Rotate before the write that would push the active file past the
        // threshold, so no single file exceeds threshold + one record.
        if inner.active_size >= inner.settings.rotation_threshold {
            Self::rotate(inner);
        }

        if let Some(file) = inner.file.as_mut() {
            match file.write_all(line.as_bytes()).and_then(|_| file.flush()) {
                Ok(()) => inner.active_size += line.len() as u64,
                Err(e) => {
                    let _ = writeln!(io::stderr(), "log write failed: {}", e);
                }
            }
        }
    }

    fn open_active_file(path: &Path) -> io::Result<(File, u64)> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let size = file.metadata().map(|m| m.len()).unwrap_or(0);
        Ok((file, size))
    }

    fn rotate(inner: &mut Inner) {
        inner.file = None;

        let seq = inner.next_seq;
        let rotated = rotated_path(&inner.settings.file_path, seq);
        if let Err(e) = fs::rename(&inner.settings.file_path, &rotated) {
            let _ = writeln!(io::stderr(), "log rotation failed: {}", e);
        } else {
            inner.next_seq += 1;
            // Drop the oldest backup beyond the retention count.
            if seq as usize > inner.settings.backup_count {
                let oldest = seq - inner.settings.backup_count as u32;
                let _ = fs::remove_file(rotated_path(&inner.settings.file_path, oldest));
            }
        }

        match Self::open_active_file(&inner.settings.file_path) {
            Ok((file, size)) => {
                inner.file = Some(file);
                inner.active_size = size;
            }
            Err(e) => {
                let _ = writeln!(io::stderr(), "log reopen failed: {}", e);
                inner.active_size = 0;
            }
        }
    }

    /// Snapshot of the ring buffer filtered by minimum severity, in append
    /// order.
    pub fn query(&self, min_severity: ErrorSeverity) -> Vec<LogRecord> {
        self.query_filtered(min_severity, None)
    }

    /// Snapshot filtered by severity and, optionally, by the category of the
    /// attached error.
    pub fn query_filtered(
        &self,
        min_severity: ErrorSeverity,
        category: Option<ErrorCategory>,
    ) -> Vec<LogRecord> {
        self.lock_inner()
            .buffer
            .iter()
            .filter(|r| r.severity >= min_severity)
            .filter(|r| match category {
                None => true,
                Some(c) => r.error.as_ref().map(|e| e.category()) == Some(c),
            })
            .cloned()
            .collect()
    }

    /// Set the minimum recorded severity; effective for subsequent calls.
    pub fn set_level(&self, level: ErrorSeverity) {
        self.lock_inner().settings.level = level;
    }

    pub fn set_file_enabled(&self, enabled: bool) {
        let mut inner = self.lock_inner();
        inner.settings.file_enabled = enabled;
        if !enabled {
            inner.file = None;
        }
    }

    pub fn set_console_enabled(&self, enabled: bool) {
        self.lock_inner().settings.console_enabled = enabled;
    }

    /// Point the file sink at a new path. The current handle is closed; the
    /// new file is opened on the next write, resuming that path's rotation
    /// sequence.
    pub fn set_file_path(&self, path: impl Into<PathBuf>) {
        let mut inner = self.lock_inner();
        inner.settings.file_path = path.into();
        inner.file = None;
        inner.active_size = 0;
    }

    pub fn file_path(&self) -> Option<PathBuf> {
        Some(self.lock_inner().settings.file_path.clone())
    }

    /// Flush and close the file handle. Records logged afterwards reopen it.
    pub fn shutdown(&self) {
        let mut inner = self.lock_inner();
        if let Some(file) = inner.file.as_mut() {
            let _ = file.flush();
        }
        inner.file = None;
    }

    /// Register this core behind the `log` facade. Only the first call in
    /// the process takes effect; later calls (and later cores) are ignored,
    /// matching the once-only global logger setup.
    pub fn install(self: Arc<Self>) {
        INSTALL_LOGGER.call_once(move || {
            if log::set_boxed_logger(Box::new(FacadeLogger { core: self })).is_ok() {
                log::set_max_level(LevelFilter::Trace);
            }
        });
    }
}

/// Bridge from the `log` facade into a shared `LogCore`.
struct FacadeLogger {
    core: Arc<LogCore>,
}

impl log::Log for FacadeLogger {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        // The core applies its own severity threshold on append.
        true
    }

    fn log(&self, record: &log::Record) {
        let severity = ErrorSeverity::from_log_level(record.level());
        let source = record.module_path().unwrap_or_else(|| record.target());
        self.core
            .log(severity, source, &record.args().to_string());
    }

    fn flush(&self) {
        let mut inner = self.core.lock_inner();
        if let Some(file) = inner.file.as_mut() {
            let _ = file.flush();
        }
    }
}

fn rotated_path(active: &Path, seq: u32) -> PathBuf {
    PathBuf::from(format!("{}.{}", active.display(), seq))
}

/// One past the highest `<path>.<n>` suffix already on disk, or 1 when no
/// backups exist (or the directory cannot be read).
fn next_rotation_seq(active: &Path) -> u32 {
    let (Some(parent), Some(name)) = (active.parent(), active.file_name()) else {
        return 1;
    };
    let prefix = format!("{}.", name.to_string_lossy());
    let mut max_seq = 0;
    if let Ok(entries) = fs::read_dir(parent) {
        for entry in entries.flatten() {
            let file_name = entry.file_name();
            if let Some(suffix) = file_name.to_string_lossy().strip_prefix(&prefix) {
                if let Ok(seq) = suffix.parse::<u32>() {
                    max_seq = max_seq.max(seq);
                }
            }
        }
    }
    max_seq + 1
}
