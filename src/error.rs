//! Error model for VoxelScope
//!
//! A single immutable error value carrying a category tag and severity rather
//! than a type hierarchy. Subsystems classify failures by attaching the right
//! `ErrorCategory`; routing and filtering switch on the tag.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Maximum depth rendered when unwrapping a chain of causes.
pub const MAX_CAUSE_DEPTH: usize = 8;

/// Subsystem an error originated from. Closed set; add a variant rather than
/// reusing `General` when a new subsystem needs routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCategory {
    /// Uncategorized application error
    General,
    /// File and stream I/O
    Io,
    /// DICOM import and parsing
    Dicom,
    /// Segmentation pipeline
    Segmentation,
    /// Surface generation
    Surface,
    /// Volume rendering
    Rendering,
    /// Navigation and tracking
    Navigation,
    /// Plugin loading and execution
    Plugin,
    /// Network communication
    Network,
    /// Configuration loading and validation
    Configuration,
    /// User interface
    UserInterface,
    /// Memory allocation and limits
    Memory,
    /// Performance degradation
    Performance,
    /// External hardware devices
    Hardware,
    /// Third-party library failures
    ExternalLibrary,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::General => "GENERAL",
            Self::Io => "IO",
            Self::Dicom => "DICOM",
            Self::Segmentation => "SEGMENTATION",
            Self::Surface => "SURFACE",
            Self::Rendering => "RENDERING",
            Self::Navigation => "NAVIGATION",
            Self::Plugin => "PLUGIN",
            Self::Network => "NETWORK",
            Self::Configuration => "CONFIGURATION",
            Self::UserInterface => "USER_INTERFACE",
            Self::Memory => "MEMORY",
            Self::Performance => "PERFORMANCE",
            Self::Hardware => "HARDWARE",
            Self::ExternalLibrary => "EXTERNAL_LIBRARY",
        };
        write!(f, "{}", name)
    }
}

/// Error severity, ordered ascending. The derived ordering drives severity
/// filtering ("show >= WARNING") and crash-report thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ErrorSeverity {
    /// Diagnostic detail
    Debug,
    /// Normal operation
    Info,
    /// Degraded but recoverable
    Warning,
    /// Operation failed
    Error,
    /// Application integrity at risk
    Critical,
}

impl ErrorSeverity {
    /// Map to a `log` facade level for the bridge into the global logger.
    pub fn to_log_level(self) -> log::Level {
        match self {
            Self::Debug => log::Level::Debug,
            Self::Info => log::Level::Info,
            Self::Warning => log::Level::Warn,
            Self::Error | Self::Critical => log::Level::Error,
        }
    }

    /// Map a `log` facade level onto the severity scale.
    pub fn from_log_level(level: log::Level) -> Self {
        match level {
            log::Level::Error => Self::Error,
            log::Level::Warn => Self::Warning,
            log::Level::Info => Self::Info,
            log::Level::Debug | log::Level::Trace => Self::Debug,
        }
    }
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Critical => "CRITICAL",
        };
        write!(f, "{}", name)
    }
}

/// Insertion-ordered key/value context attached to errors, log records, and
/// diagnostic results.
#[derive(Debug, Clone, Default)]
pub struct Details(Vec<(String, Value)>);

impl Details {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Insert a key/value pair. An existing key is overwritten in place so
    /// insertion order stays stable.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        if let Some(slot) = self.0.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            self.0.push((key, value));
        }
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn fmt_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl fmt::Display for Details {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pairs = self
            .0
            .iter()
            .map(|(k, v)| format!("{}={}", k, fmt_value(v)))
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "{}", pairs)
    }
}

/// Structured application error: message, category, severity, ordered detail
/// map, and an optional wrapped original cause. Immutable once constructed;
/// the `with_*` builders consume and return the value before it is handed to
/// the logging or reporting path.
#[derive(Debug, Clone)]
pub struct ApplicationError {
    message: String,
    category: ErrorCategory,
    severity: ErrorSeverity,
    details: Details,
    cause: Option<Arc<anyhow::Error>>,
    timestamp: DateTime<Local>,
}

impl ApplicationError {
    /// Create an error with default classification (`GENERAL`/`ERROR`).
    ///
    /// The error path never raises: an empty message is coerced to a
    /// placeholder instead of rejecting construction.
    pub fn new(message: impl Into<String>) -> Self {
        let message = message.into();
        let message = if message.trim().is_empty() {
            "(unspecified error)".to_string()
        } else {
            message
        };
        Self {
            message,
            category: ErrorCategory::General,
            severity: ErrorSeverity::Error,
            details: Details::new(),
            cause: None,
            timestamp: Local::now(),
        }
    }

    pub fn with_category(mut self, category: ErrorCategory) -> Self {
        self.category = category;
        self
    }

    pub fn with_severity(mut self, severity: ErrorSeverity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key, value);
        self
    }

    pub fn with_details(mut self, details: Details) -> Self {
        self.details = details;
        self
    }

    pub fn with_cause(mut self, cause: anyhow::Error) -> Self {
        self.cause = Some(Arc::new(cause));
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn category(&self) -> ErrorCategory {
        self.category
    }

    pub fn severity(&self) -> ErrorSeverity {
        self.severity
    }

    pub fn details(&self) -> &Details {
        &self.details
    }

    pub fn cause(&self) -> Option<&anyhow::Error> {
        self.cause.as_deref()
    }

    pub fn timestamp(&self) -> DateTime<Local> {
        self.timestamp
    }

    /// Render message, classification, details, and the cause chain for
    /// display and crash-report bodies. The chain is unwrapped to at most
    /// [`MAX_CAUSE_DEPTH`] entries. Deterministic and infallible.
    pub fn to_detail_string(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("Message: {}\n", self.message));
        out.push_str(&format!("Category: {}\n", self.category));
        out.push_str(&format!("Severity: {}\n", self.severity));
        if !self.details.is_empty() {
            out.push_str("Details:\n");
            for (key, value) in self.details.iter() {
                out.push_str(&format!("  {}: {}\n", key, fmt_value(value)));
            }
        }
        if let Some(cause) = self.cause.as_deref() {
            out.push_str("Caused by:\n");
            for (depth, link) in cause.chain().take(MAX_CAUSE_DEPTH).enumerate() {
                out.push_str(&format!("  {}: {}\n", depth, link));
            }
        }
        out
    }
}

impl fmt::Display for ApplicationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}/{}]", self.message, self.category, self.severity)
    }
}

impl std::error::Error for ApplicationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_deref()
            .map(|c| -> &(dyn std::error::Error + 'static) { c.as_ref() })
    }
}
