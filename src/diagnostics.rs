//! Device diagnostics registry
//!
//! Tracks the liveness of external hardware (navigation trackers, cameras,
//! serial and network links): a status state machine per device type, bounded
//! connection/diagnostic history rings, and a registry of named diagnostic
//! tests runnable on demand with a per-test timeout.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::thread;

use chrono::{DateTime, Local};
use crossbeam_channel::{bounded, RecvTimeoutError};

use crate::config::DiagnosticsSettings;
use crate::error::{ApplicationError, Details, ErrorCategory, ErrorSeverity};
use crate::events::{AppEvent, EventBroker};
use crate::logging::LogCore;

/// External hardware device classes tracked by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceType {
    /// Navigation tracker
    Tracker,
    /// Imaging camera
    Camera,
    /// Serial link
    SerialPort,
    /// Networked device
    NetworkDevice,
    /// Anything else
    Other,
}

impl DeviceType {
    /// All device classes the default registry monitors.
    pub const ALL: [DeviceType; 5] = [
        DeviceType::Tracker,
        DeviceType::Camera,
        DeviceType::SerialPort,
        DeviceType::NetworkDevice,
        DeviceType::Other,
    ];
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Tracker => "TRACKER",
            Self::Camera => "CAMERA",
            Self::SerialPort => "SERIAL_PORT",
            Self::NetworkDevice => "NETWORK_DEVICE",
            Self::Other => "OTHER",
        };
        write!(f, "{}", name)
    }
}

/// Device connection status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceStatus {
    /// Initial state before any update
    Unknown,
    /// Device is reachable
    Connected,
    /// Device reported or detected as gone
    Disconnected,
    /// Device is present but faulted
    Error,
}

impl DeviceStatus {
    /// Severity of the log record emitted when a device enters this status.
    fn log_severity(self) -> ErrorSeverity {
        match self {
            Self::Connected => ErrorSeverity::Info,
            Self::Disconnected => ErrorSeverity::Warning,
            Self::Error => ErrorSeverity::Error,
            Self::Unknown => ErrorSeverity::Debug,
        }
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unknown => "UNKNOWN",
            Self::Connected => "CONNECTED",
            Self::Disconnected => "DISCONNECTED",
            Self::Error => "ERROR",
        };
        write!(f, "{}", name)
    }
}

/// Record of a device status transition.
#[derive(Debug, Clone)]
pub struct ConnectionEvent {
    pub device: DeviceType,
    pub previous: DeviceStatus,
    pub status: DeviceStatus,
    pub message: String,
    pub details: Details,
    pub timestamp: DateTime<Local>,
}

impl fmt::Display for ConnectionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {} -> {} - {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.device,
            self.previous,
            self.status,
            self.message
        )
    }
}

/// Result of a single diagnostic test.
#[derive(Debug, Clone)]
pub struct DiagnosticResult {
    pub device: DeviceType,
    pub test_name: String,
    pub passed: bool,
    pub message: String,
    pub details: Details,
    pub timestamp: DateTime<Local>,
}

impl DiagnosticResult {
    pub fn new(
        device: DeviceType,
        test_name: impl Into<String>,
        passed: bool,
        message: impl Into<String>,
    ) -> Self {
        Self {
            device,
            test_name: test_name.into(),
            passed,
            message: message.into(),
            details: Details::new(),
            timestamp: Local::now(),
        }
    }

    pub fn with_details(mut self, details: Details) -> Self {
        self.details = details;
        self
    }
}

impl fmt::Display for DiagnosticResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = if self.passed { "PASSED" } else { "FAILED" };
        write!(
            f,
            "[{}] {} - {}: {} - {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.device,
            self.test_name,
            status,
            self.message
        )
    }
}

/// A registered diagnostic test. `Ok(message)` means passed; an `Err` is
/// recorded as a failed result with the error chain as the summary.
pub type DiagnosticTest = Arc<dyn Fn() -> anyhow::Result<String> + Send + Sync>;

/// Snapshot of one device's state for the dashboard.
#[derive(Debug, Clone)]
pub struct DeviceStatusSummary {
    pub device: DeviceType,
    pub status: DeviceStatus,
    pub last_seen: DateTime<Local>,
    pub error_count: u32,
    pub last_error: Option<ConnectionEvent>,
    pub last_diagnostic: Option<DiagnosticResult>,
}

/// Per-device-type state behind its own lock.
struct DeviceMonitor {
    status: DeviceStatus,
    last_seen: DateTime<Local>,
    connection_history: VecDeque<ConnectionEvent>,
    diagnostic_history: VecDeque<DiagnosticResult>,
    error_count: u32,
    last_error: Option<ConnectionEvent>,
    last_diagnostic: Option<DiagnosticResult>,
    tests: Vec<(String, DiagnosticTest)>,
    capacity: usize,
}

impl DeviceMonitor {
    fn new(capacity: usize) -> Self {
        Self {
            status: DeviceStatus::Unknown,
            last_seen: Local::now(),
            connection_history: VecDeque::new(),
            diagnostic_history: VecDeque::new(),
            error_count: 0,
            last_error: None,
            last_diagnostic: None,
            tests: Vec::new(),
            capacity,
        }
    }

    fn push_connection(&mut self, event: ConnectionEvent) {
        if self.connection_history.len() >= self.capacity {
            self.connection_history.pop_front();
        }
        self.connection_history.push_back(event);
    }

    fn push_diagnostic(&mut self, result: DiagnosticResult) {
        if self.diagnostic_history.len() >= self.capacity {
            self.diagnostic_history.pop_front();
        }
        self.last_diagnostic = Some(result.clone());
        self.diagnostic_history.push_back(result);
    }
}

/// Process-wide registry of device monitors. Explicitly constructed and
/// shared (`Arc`) so tests can run isolated instances.
pub struct DiagnosticsRegistry {
    monitors: HashMap<DeviceType, Mutex<DeviceMonitor>>,
    settings: DiagnosticsSettings,
    log: Arc<LogCore>,
    broker: EventBroker,
}

impl DiagnosticsRegistry {
    /// Registry monitoring every device class.
    pub fn new(settings: DiagnosticsSettings, log: Arc<LogCore>, broker: EventBroker) -> Self {
        Self::with_devices(&DeviceType::ALL, settings, log, broker)
    }

    /// Registry restricted to a subset of device classes. Updates for an
    /// unmonitored class fail fast with a configuration error.
    pub fn with_devices(
        devices: &[DeviceType],
        settings: DiagnosticsSettings,
        log: Arc<LogCore>,
        broker: EventBroker,
    ) -> Self {
        let monitors = devices
            .iter()
            .map(|d| (*d, Mutex::new(DeviceMonitor::new(settings.history_capacity))))
            .collect();
        Self {
            monitors,
            settings,
            log,
            broker,
        }
    }

    fn monitor(&self, device: DeviceType) -> Result<&Mutex<DeviceMonitor>, ApplicationError> {
        self.monitors.get(&device).ok_or_else(|| {
            ApplicationError::new(format!("device type {} is not monitored", device))
                .with_category(ErrorCategory::Configuration)
                .with_severity(ErrorSeverity::Error)
        })
    }

    /// Apply a status update. Every update is accepted and refreshes "last
    /// seen"; a `ConnectionEvent` is recorded, logged, and published only
    /// when the status actually changed.
    pub fn update_device_status(
        &self,
        device: DeviceType,
        status: DeviceStatus,
        message: &str,
        details: Details,
    ) -> Result<(), ApplicationError> {
        let monitor = self.monitor(device)?;
        let changed = {
            let mut guard = match monitor.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            guard.last_seen = Local::now();
            let previous = guard.status;
            if previous == status {
                None
            } else {
                guard.status = status;
                let event = ConnectionEvent {
                    device,
                    previous,
                    status,
                    message: message.to_string(),
                    details: details.clone(),
                    timestamp: guard.last_seen,
                };
                if status == DeviceStatus::Error {
                    guard.error_count += 1;
                    guard.last_error = Some(event.clone());
                }
                guard.push_connection(event);
                Some(previous)
            }
        };

        // Collaborators are invoked after the monitor lock is released.
        if let Some(previous) = changed {
            self.log.log_with(
                status.log_severity(),
                "diagnostics",
                &format!("{} status changed: {} -> {} - {}", device, previous, status, message),
                if details.is_empty() { None } else { Some(details) },
                None,
            );
            self.broker.publish(AppEvent::DeviceStatusChanged {
                device,
                previous,
                status,
                message: message.to_string(),
            });
        }
        Ok(())
    }

    /// Register a named diagnostic test. Re-registering a name replaces the
    /// test in place, keeping its position in the run order.
    pub fn register_test<F>(
        &self,
        device: DeviceType,
        name: &str,
        test: F,
    ) -> Result<(), ApplicationError>
    where
        F: Fn() -> anyhow::Result<String> + Send + Sync + 'static,
    {
        let monitor = self.monitor(device)?;
        let mut guard = match monitor.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let test: DiagnosticTest = Arc::new(test);
        if let Some(slot) = guard.tests.iter_mut().find(|(n, _)| n == name) {
            slot.1 = test;
        } else {
            guard.tests.push((name.to_string(), test));
        }
        Ok(())
    }

    /// Run every registered test for a device type, in registration order,
    /// each in isolation: a failing, panicking, or hung test is recorded as
    /// a failed result and does not prevent the remaining tests.
    pub fn run_diagnostics(
        &self,
        device: DeviceType,
    ) -> Result<Vec<DiagnosticResult>, ApplicationError> {
        let tests: Vec<(String, DiagnosticTest)> = {
            let guard = match self.monitor(device)?.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            guard.tests.clone()
        };

        self.log.log(
            ErrorSeverity::Info,
            "diagnostics",
            &format!("running {} diagnostic test(s) for {}", tests.len(), device),
        );

        let mut results = Vec::with_capacity(tests.len());
        for (name, test) in tests {
            let result = self.run_one(device, &name, test);
            self.add_diagnostic_result(result.clone())?;
            results.push(result);
        }
        Ok(results)
    }

    /// Execute a single test on a worker thread, bounded by the configured
    /// timeout. Non-return by the deadline is a failed "timed out" result.
    fn run_one(&self, device: DeviceType, name: &str, test: DiagnosticTest) -> DiagnosticResult {
        let (tx, rx) = bounded(1);
        let worker_test = Arc::clone(&test);
        thread::spawn(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| worker_test()));
            let _ = tx.send(outcome);
        });

        match rx.recv_timeout(self.settings.test_timeout) {
            Ok(Ok(Ok(message))) => DiagnosticResult::new(device, name, true, message),
            Ok(Ok(Err(error))) => {
                DiagnosticResult::new(device, name, false, format!("{:#}", error))
            }
            Ok(Err(payload)) => {
                let summary = panic_summary(payload.as_ref());
                DiagnosticResult::new(device, name, false, format!("test panicked: {}", summary))
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                DiagnosticResult::new(
                    device,
                    name,
                    false,
                    format!("timed out after {:?}", self.settings.test_timeout),
                )
            }
        }
    }

    /// Direct append path for externally computed results.
    pub fn add_diagnostic_result(&self, result: DiagnosticResult) -> Result<(), ApplicationError> {
        let monitor = self.monitor(result.device)?;
        {
            let mut guard = match monitor.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            guard.push_diagnostic(result.clone());
        }

        let severity = if result.passed {
            ErrorSeverity::Info
        } else {
            ErrorSeverity::Warning
        };
        self.log.log(
            severity,
            "diagnostics",
            &format!(
                "diagnostic {} {}: {}",
                result.test_name,
                if result.passed { "PASSED" } else { "FAILED" },
                result.message
            ),
        );
        Ok(())
    }

    /// Current status of a device type.
    pub fn get_status(&self, device: DeviceType) -> Result<DeviceStatus, ApplicationError> {
        let guard = match self.monitor(device)?.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Ok(guard.status)
    }

    /// Snapshot of the connection history for a device type.
    pub fn get_history(&self, device: DeviceType) -> Result<Vec<ConnectionEvent>, ApplicationError> {
        let guard = match self.monitor(device)?.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Ok(guard.connection_history.iter().cloned().collect())
    }

    /// Snapshot of the diagnostic history for a device type.
    pub fn get_diagnostic_history(
        &self,
        device: DeviceType,
    ) -> Result<Vec<DiagnosticResult>, ApplicationError> {
        let guard = match self.monitor(device)?.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Ok(guard.diagnostic_history.iter().cloned().collect())
    }

    /// Dashboard snapshot of every monitored device.
    pub fn status_summary(&self) -> Vec<DeviceStatusSummary> {
        let mut summary: Vec<DeviceStatusSummary> = self
            .monitors
            .iter()
            .map(|(device, monitor)| {
                let guard = match monitor.lock() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                DeviceStatusSummary {
                    device: *device,
                    status: guard.status,
                    last_seen: guard.last_seen,
                    error_count: guard.error_count,
                    last_error: guard.last_error.clone(),
                    last_diagnostic: guard.last_diagnostic.clone(),
                }
            })
            .collect();
        summary.sort_by_key(|s| s.device.to_string());
        summary
    }

    /// Merged connection history across all devices, ordered by timestamp.
    pub fn all_connection_history(&self) -> Vec<ConnectionEvent> {
        let mut events: Vec<ConnectionEvent> = self
            .monitors
            .values()
            .flat_map(|monitor| {
                let guard = match monitor.lock() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                guard.connection_history.iter().cloned().collect::<Vec<_>>()
            })
            .collect();
        events.sort_by_key(|e| e.timestamp);
        events
    }

    /// Merged diagnostic history across all devices, ordered by timestamp.
    pub fn all_diagnostic_history(&self) -> Vec<DiagnosticResult> {
        let mut results: Vec<DiagnosticResult> = self
            .monitors
            .values()
            .flat_map(|monitor| {
                let guard = match monitor.lock() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                guard.diagnostic_history.iter().cloned().collect::<Vec<_>>()
            })
            .collect();
        results.sort_by_key(|r| r.timestamp);
        results
    }
}

fn panic_summary(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
