//! VoxelScope failure-handling core
//!
//! Centralized error classification, structured logging, crash reporting, and
//! device diagnostics for a desktop medical-imaging application. The crate
//! owns the shared vocabulary (`ErrorCategory`, `ErrorSeverity`,
//! `ApplicationError`), a rotating-file logging core with an in-memory ring
//! buffer, a policy-driven error handler, a crash reporter, a last-resort
//! failure trap, and a registry that tracks navigation-device health.
//!
//! Typical wiring:
//!
//! ```no_run
//! use std::sync::Arc;
//! use voxelscope::{
//!     AppConfig, CrashReporter, ErrorHandler, EventBroker, FailsafeTrap, LogCore,
//! };
//!
//! let config = AppConfig::default();
//! let log = Arc::new(LogCore::new(config.logging.clone()));
//! Arc::clone(&log).install();
//!
//! let broker = EventBroker::new();
//! let reporter = Arc::new(CrashReporter::new(
//!     config.reports.directory.clone(),
//!     Arc::clone(&log),
//! ));
//! let handler = ErrorHandler::new(Arc::clone(&log), broker.clone())
//!     .with_reporter(Arc::clone(&reporter));
//! voxelscope::failsafe::install(Arc::new(FailsafeTrap::new(
//!     Arc::clone(&log),
//!     reporter,
//!     broker.clone(),
//! )));
//! # let _ = handler;
//! ```

/// Application configuration: logging, diagnostics, and report settings
pub mod config;

/// Crash report generation with system snapshots
pub mod crash_report;

/// Device health registry and diagnostic test runner
pub mod diagnostics;

/// Error taxonomy: categories, severities, and the classified error type
pub mod error;

/// Event broker for error and device-status notifications
pub mod events;

/// Last-resort failure trap and panic hook
pub mod failsafe;

/// Policy-driven error handler
pub mod handler;

/// Rotating-file logging core with in-memory ring buffer
pub mod logging;

pub use config::{AppConfig, DiagnosticsSettings, LogSettings, ReportSettings};
pub use crash_report::{CrashReport, CrashReporter, SystemSnapshot};
pub use diagnostics::{
    ConnectionEvent, DeviceStatus, DeviceStatusSummary, DeviceType, DiagnosticResult,
    DiagnosticsRegistry,
};
pub use error::{ApplicationError, Details, ErrorCategory, ErrorSeverity};
pub use events::{AppEvent, EventBroker, EventFilter, EventKind, SubscriberId};
pub use failsafe::FailsafeTrap;
pub use handler::{ErrorHandler, ExpectedFailures, HandlerPolicy, HandlerVerdict, Notifier};
pub use logging::{LogCore, LogRecord};
