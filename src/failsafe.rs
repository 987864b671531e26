//! Last-resort failure trap
//!
//! Catches failures that escaped every handler: an installed panic hook and a
//! direct `handle_failure` entry point for host-level catch blocks. The trap
//! runs with minimal assumptions about process state: it only try-locks the
//! logging core, guards against reentry, and swallows every internal error.

use std::panic::{self, PanicHookInfo};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Once, RwLock};

use lazy_static::lazy_static;

use crate::crash_report::{CrashReport, CrashReporter};
use crate::error::{ApplicationError, Details, ErrorCategory, ErrorSeverity};
use crate::events::{AppEvent, EventBroker};
use crate::handler::Notifier;
use crate::logging::LogCore;

lazy_static! {
    /// Trap reachable from the process-wide panic hook.
    static ref TRAP: RwLock<Option<Arc<FailsafeTrap>>> = RwLock::new(None);
}

static HOOK_INIT: Once = Once::new();

/// Terminal failure handler. One instance per process is registered with the
/// panic hook; explicit catch blocks may also call it directly.
pub struct FailsafeTrap {
    log: Arc<LogCore>,
    reporter: Arc<CrashReporter>,
    broker: EventBroker,
    notifier: Option<Notifier>,
    in_progress: AtomicBool,
}

impl FailsafeTrap {
    pub fn new(log: Arc<LogCore>, reporter: Arc<CrashReporter>, broker: EventBroker) -> Self {
        Self {
            log,
            reporter,
            broker,
            notifier: None,
            in_progress: AtomicBool::new(false),
        }
    }

    pub fn with_notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Handle a terminal failure. Returns the persisted crash report, or
    /// `None` when persistence failed or the trap was already processing a
    /// failure (a reentrant call is dropped after a stderr note).
    pub fn handle_failure(&self, message: &str, location: Option<&str>) -> Option<CrashReport> {
        if self.in_progress.swap(true, Ordering::SeqCst) {
            // A failure raised while handling a failure: one level only.
            eprintln!("failure trap re-entered; dropping: {}", message);
            return None;
        }
        let report = self.process(message, location);
        self.in_progress.store(false, Ordering::SeqCst);
        report
    }

    fn process(&self, message: &str, location: Option<&str>) -> Option<CrashReport> {
        self.log
            .log_best_effort(ErrorSeverity::Critical, "failsafe", message);

        let mut details = Details::new().with("trapped", true);
        if let Some(location) = location {
            details.insert("location", location);
        }
        let error = ApplicationError::new(message)
            .with_category(ErrorCategory::General)
            .with_severity(ErrorSeverity::Critical)
            .with_details(details);

        let report = self.reporter.create_report(&error);

        if let Some(notifier) = &self.notifier {
            let notify = panic::catch_unwind(std::panic::AssertUnwindSafe(|| notifier(&error)));
            if notify.is_err() {
                eprintln!("failsafe notification failed");
            }
        }

        // Best-effort publish: the panic that got us here may have been
        // raised while the broker lock was held, so never wait on it.
        let publish = panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            self.broker
                .publish_best_effort(AppEvent::ErrorOccurred(error.clone()));
        }));
        if publish.is_err() {
            eprintln!("failsafe event publication failed");
        }

        report
    }
}

/// Register a trap globally and install the process panic hook (first call
/// only). Subsequent calls replace the registered trap; the hook stays.
pub fn install(trap: Arc<FailsafeTrap>) {
    if let Ok(mut slot) = TRAP.write() {
        *slot = Some(trap);
    }
    HOOK_INIT.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            trap_panic(info);
            previous(info);
        }));
    });
}

/// Deregister the global trap. The hook remains installed but becomes a
/// pass-through to the previous hook.
pub fn uninstall() {
    if let Ok(mut slot) = TRAP.write() {
        *slot = None;
    }
}

fn trap_panic(info: &PanicHookInfo<'_>) {
    // try_read: if the trap registry is wedged, do nothing rather than
    // deadlock inside a panic.
    let trap = match TRAP.try_read() {
        Ok(slot) => slot.clone(),
        Err(_) => None,
    };
    let Some(trap) = trap else {
        return;
    };

    let message = panic_message(info);
    let location = info
        .location()
        .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()));
    trap.handle_failure(&format!("panic: {}", message), location.as_deref());
}

fn panic_message(info: &PanicHookInfo<'_>) -> String {
    let payload = info.payload();
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
