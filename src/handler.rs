//! Error handler
//!
//! Wraps an arbitrary unit of work, converts a matching failure into an
//! `ApplicationError`, and runs a fixed post-processing pipeline: log,
//! crash-report, notify, publish. Each pipeline step is best-effort; nothing
//! in the pipeline masks the original error or changes the verdict.

use std::backtrace::Backtrace;
use std::io::{self, Write};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::crash_report::CrashReporter;
use crate::error::{ApplicationError, Details, ErrorCategory, ErrorSeverity};
use crate::events::{AppEvent, EventBroker};
use crate::logging::LogCore;

/// Presentation-layer hook invoked with errors configured for display.
/// The core never renders UI itself.
pub type Notifier = Arc<dyn Fn(&ApplicationError) + Send + Sync>;

/// A matcher over raised failures.
pub type FailureMatcher = Arc<dyn Fn(&anyhow::Error) -> bool + Send + Sync>;

/// Which raised failures the handler converts and handles. Anything not
/// matched propagates to the caller unmodified.
pub enum ExpectedFailures {
    /// Handle any failure
    Any,
    /// Handle failures matched by at least one matcher
    Matching(Vec<FailureMatcher>),
}

impl ExpectedFailures {
    pub fn any() -> Self {
        Self::Any
    }

    pub fn matching(matchers: Vec<FailureMatcher>) -> Self {
        Self::Matching(matchers)
    }

    /// Matcher for a concrete failure type carried in the error chain.
    pub fn kind<E>() -> FailureMatcher
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Arc::new(|error: &anyhow::Error| error.downcast_ref::<E>().is_some())
    }

    fn matches(&self, error: &anyhow::Error) -> bool {
        match self {
            Self::Any => true,
            Self::Matching(matchers) => matchers.iter().any(|m| m(error)),
        }
    }
}

/// Configuration for one wrapped unit of work.
pub struct HandlerPolicy {
    /// Message of the resulting `ApplicationError`
    pub error_message: String,
    /// Invoke the notification callback
    pub show_dialog: bool,
    /// Forward the error to the logging core
    pub log_error: bool,
    /// Re-raise the `ApplicationError` instead of suppressing it
    pub reraise: bool,
    pub category: ErrorCategory,
    pub severity: ErrorSeverity,
    pub expected: ExpectedFailures,
}

impl HandlerPolicy {
    pub fn new(error_message: impl Into<String>) -> Self {
        Self {
            error_message: error_message.into(),
            show_dialog: true,
            log_error: true,
            reraise: false,
            category: ErrorCategory::General,
            severity: ErrorSeverity::Error,
            expected: ExpectedFailures::Any,
        }
    }

    pub fn show_dialog(mut self, show: bool) -> Self {
        self.show_dialog = show;
        self
    }

    pub fn log_error(mut self, log: bool) -> Self {
        self.log_error = log;
        self
    }

    pub fn reraise(mut self, reraise: bool) -> Self {
        self.reraise = reraise;
        self
    }

    pub fn category(mut self, category: ErrorCategory) -> Self {
        self.category = category;
        self
    }

    pub fn severity(mut self, severity: ErrorSeverity) -> Self {
        self.severity = severity;
        self
    }

    pub fn expected(mut self, expected: ExpectedFailures) -> Self {
        self.expected = expected;
        self
    }
}

/// Outcome of a handled unit of work.
#[derive(Debug)]
pub enum HandlerVerdict<T> {
    /// The unit of work completed normally
    Completed(T),
    /// A matching failure was converted and handled; this is the sentinel
    /// returned when `reraise` is off
    Suppressed(ApplicationError),
}

impl<T> HandlerVerdict<T> {
    pub fn is_suppressed(&self) -> bool {
        matches!(self, Self::Suppressed(_))
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            Self::Completed(value) => Some(value),
            Self::Suppressed(_) => None,
        }
    }
}

/// Converts failures into classified errors and drives the post-processing
/// pipeline. Collaborator hooks are injected; none are required.
pub struct ErrorHandler {
    log: Arc<LogCore>,
    broker: EventBroker,
    notifier: Option<Notifier>,
    reporter: Option<Arc<CrashReporter>>,
}

impl ErrorHandler {
    pub fn new(log: Arc<LogCore>, broker: EventBroker) -> Self {
        Self {
            log,
            broker,
            notifier: None,
            reporter: None,
        }
    }

    pub fn with_notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<CrashReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Execute a unit of work under this handler.
    ///
    /// - Success: `Ok(HandlerVerdict::Completed(value))`.
    /// - Matching failure, `reraise` off: the failure is classified and
    ///   handled; `Ok(HandlerVerdict::Suppressed(error))`.
    /// - Matching failure, `reraise` on: `Err` carrying the
    ///   `ApplicationError` (downcastable from the returned `anyhow::Error`).
    /// - Non-matching failure: `Err` with the original failure, untouched.
    pub fn run<T>(
        &self,
        policy: &HandlerPolicy,
        operation: &str,
        unit: impl FnOnce() -> anyhow::Result<T>,
    ) -> anyhow::Result<HandlerVerdict<T>> {
        match unit() {
            Ok(value) => Ok(HandlerVerdict::Completed(value)),
            Err(raised) if policy.expected.matches(&raised) => {
                let error = self.classify(policy, operation, raised);
                self.dispatch(policy, &error);
                if policy.reraise {
                    Err(anyhow::Error::new(error))
                } else {
                    Ok(HandlerVerdict::Suppressed(error))
                }
            }
            Err(unexpected) => Err(unexpected),
        }
    }

    fn classify(
        &self,
        policy: &HandlerPolicy,
        operation: &str,
        raised: anyhow::Error,
    ) -> ApplicationError {
        let details = Details::new()
            .with("operation", operation)
            .with("failure", format!("{:#}", raised))
            .with("backtrace", Backtrace::capture().to_string());
        ApplicationError::new(policy.error_message.clone())
            .with_category(policy.category)
            .with_severity(policy.severity)
            .with_details(details)
            .with_cause(raised)
    }

    /// Fixed pipeline: log, crash-report, notify, publish. A failing step is
    /// noted on stderr and the remaining steps still run.
    fn dispatch(&self, policy: &HandlerPolicy, error: &ApplicationError) {
        if policy.log_error {
            self.log.log_with(
                error.severity(),
                "error_handler",
                error.message(),
                None,
                Some(error.clone()),
            );
        }

        if error.severity() >= ErrorSeverity::Error {
            if let Some(reporter) = &self.reporter {
                let step = panic::catch_unwind(AssertUnwindSafe(|| {
                    reporter.create_report(error);
                }));
                if step.is_err() {
                    let _ = writeln!(io::stderr(), "crash reporting step failed");
                }
            }
        }

        if policy.show_dialog {
            if let Some(notifier) = &self.notifier {
                let step = panic::catch_unwind(AssertUnwindSafe(|| notifier(error)));
                if step.is_err() {
                    let _ = writeln!(io::stderr(), "notification step failed");
                }
            }
        }

        let step = panic::catch_unwind(AssertUnwindSafe(|| {
            self.broker.publish(AppEvent::ErrorOccurred(error.clone()));
        }));
        if step.is_err() {
            let _ = writeln!(io::stderr(), "event publication step failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogSettings;

    fn memory_log() -> Arc<LogCore> {
        Arc::new(LogCore::new(LogSettings {
            file_enabled: false,
            console_enabled: false,
            ..LogSettings::default()
        }))
    }

    #[test]
    fn test_success_passes_through() {
        let handler = ErrorHandler::new(memory_log(), EventBroker::new());
        let policy = HandlerPolicy::new("should not appear");
        let verdict = handler.run(&policy, "add", || Ok(2 + 2)).unwrap();
        assert_eq!(verdict.into_value(), Some(4));
    }

    #[test]
    fn test_typed_matcher_only_matches_its_kind() {
        let expected = ExpectedFailures::matching(vec![ExpectedFailures::kind::<std::io::Error>()]);
        let io_err = anyhow::Error::new(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "missing",
        ));
        let other = anyhow::anyhow!("some other failure");
        assert!(expected.matches(&io_err));
        assert!(!expected.matches(&other));
    }

    #[test]
    fn test_classified_error_carries_operation_detail() {
        let handler = ErrorHandler::new(memory_log(), EventBroker::new());
        let policy = HandlerPolicy::new("scan import failed")
            .category(ErrorCategory::Dicom)
            .severity(ErrorSeverity::Warning);
        let verdict = handler
            .run(&policy, "import_series", || {
                Err::<(), _>(anyhow::anyhow!("bad header"))
            })
            .unwrap();

        match verdict {
            HandlerVerdict::Suppressed(error) => {
                assert_eq!(error.category(), ErrorCategory::Dicom);
                assert_eq!(error.severity(), ErrorSeverity::Warning);
                assert_eq!(
                    error.details().get("operation"),
                    Some(&serde_json::Value::from("import_series"))
                );
                assert_eq!(error.cause().unwrap().to_string(), "bad header");
            }
            HandlerVerdict::Completed(_) => panic!("expected a suppressed failure"),
        }
    }
}
