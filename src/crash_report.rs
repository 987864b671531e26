//! Crash report generation
//!
//! Serializes an `ApplicationError` plus a best-effort system snapshot to a
//! timestamped, human-readable file in the report directory. Persistence
//! failures never propagate; they degrade to a CRITICAL log record.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Local;

use crate::error::{ApplicationError, ErrorSeverity, MAX_CAUSE_DEPTH};
use crate::logging::LogCore;

/// Best-effort snapshot of the environment at crash time. Fields that could
/// not be gathered are `None` and omitted from the report body.
#[derive(Debug, Clone)]
pub struct SystemSnapshot {
    pub os: String,
    pub arch: String,
    pub app_version: String,
    pub executable: Option<String>,
    pub working_directory: Option<String>,
    pub total_memory_kb: Option<u64>,
}

impl SystemSnapshot {
    pub fn capture() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            executable: std::env::current_exe()
                .ok()
                .map(|p| p.display().to_string()),
            working_directory: std::env::current_dir()
                .ok()
                .map(|p| p.display().to_string()),
            total_memory_kb: read_total_memory_kb(),
        }
    }
}

#[cfg(target_os = "linux")]
fn read_total_memory_kb() -> Option<u64> {
    let meminfo = fs::read_to_string("/proc/meminfo").ok()?;
    let line = meminfo.lines().find(|l| l.starts_with("MemTotal:"))?;
    line.split_whitespace().nth(1)?.parse().ok()
}

#[cfg(not(target_os = "linux"))]
fn read_total_memory_kb() -> Option<u64> {
    None
}

/// Descriptor of a persisted crash report. Created once, never mutated.
#[derive(Debug, Clone)]
pub struct CrashReport {
    /// Report id derived from the creation timestamp
    pub id: String,
    pub error: ApplicationError,
    pub snapshot: SystemSnapshot,
    pub path: PathBuf,
}

/// Writes crash reports into a fixed directory.
pub struct CrashReporter {
    directory: PathBuf,
    log: Arc<LogCore>,
}

impl CrashReporter {
    pub fn new(directory: impl Into<PathBuf>, log: Arc<LogCore>) -> Self {
        Self {
            directory: directory.into(),
            log,
        }
    }

    pub fn directory(&self) -> &PathBuf {
        &self.directory
    }

    /// Persist a report for the given error. Returns `None` only when the
    /// report could not be written, in which case the persistence failure
    /// itself has been logged at CRITICAL.
    pub fn create_report(&self, error: &ApplicationError) -> Option<CrashReport> {
        let snapshot = SystemSnapshot::capture();
        let id = Local::now().format("%Y%m%d_%H%M%S_%3f").to_string();

        match self.write_report(&id, error, &snapshot) {
            Ok(path) => {
                self.log.log(
                    ErrorSeverity::Info,
                    "crash_report",
                    &format!("crash report written to {}", path.display()),
                );
                Some(CrashReport {
                    id,
                    error: error.clone(),
                    snapshot,
                    path,
                })
            }
            Err(e) => {
                self.log.log_with(
                    ErrorSeverity::Critical,
                    "crash_report",
                    &format!("failed to persist crash report: {}", e),
                    None,
                    Some(error.clone()),
                );
                None
            }
        }
    }

    fn write_report(
        &self,
        id: &str,
        error: &ApplicationError,
        snapshot: &SystemSnapshot,
    ) -> io::Result<PathBuf> {
        if !self.directory.exists() {
            fs::create_dir_all(&self.directory)?;
        }
        let path = self.directory.join(format!("crash_{}.txt", id));
        let mut file = File::create(&path)?;

        writeln!(file, "=== VoxelScope Crash Report ===")?;
        writeln!(file, "Report: {}", id)?;
        writeln!(
            file,
            "Generated: {}",
            error.timestamp().format("%Y-%m-%d %H:%M:%S")
        )?;
        writeln!(file)?;

        writeln!(file, "=== Message ===")?;
        writeln!(file, "{}", error.message())?;
        writeln!(file)?;

        writeln!(file, "=== Category ===")?;
        writeln!(file, "{}", error.category())?;
        writeln!(file)?;

        writeln!(file, "=== Severity ===")?;
        writeln!(file, "{}", error.severity())?;
        writeln!(file)?;

        if !error.details().is_empty() {
            writeln!(file, "=== Details ===")?;
            for (key, value) in error.details().iter() {
                writeln!(file, "{}: {}", key, value)?;
            }
            writeln!(file)?;
        }

        if let Some(cause) = error.cause() {
            writeln!(file, "=== Cause chain ===")?;
            for (depth, link) in cause.chain().take(MAX_CAUSE_DEPTH).enumerate() {
                writeln!(file, "{}: {}", depth, link)?;
            }
            writeln!(file)?;
        }

        writeln!(file, "=== System snapshot ===")?;
        writeln!(file, "os: {}", snapshot.os)?;
        writeln!(file, "arch: {}", snapshot.arch)?;
        writeln!(file, "app_version: {}", snapshot.app_version)?;
        if let Some(exe) = &snapshot.executable {
            writeln!(file, "executable: {}", exe)?;
        }
        if let Some(cwd) = &snapshot.working_directory {
            writeln!(file, "working_directory: {}", cwd)?;
        }
        if let Some(mem) = snapshot.total_memory_kb {
            writeln!(file, "total_memory_kb: {}", mem)?;
        }

        file.flush()?;
        Ok(path)
    }
}
