//! Integration tests for the error handler: the suppression contract, the
//! reraise path, matcher selectivity, pipeline resilience, and crash-report
//! coupling.

use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tempfile::tempdir;

use voxelscope::{
    ApplicationError, CrashReporter, ErrorCategory, ErrorHandler, ErrorSeverity, EventBroker,
    EventFilter, ExpectedFailures, HandlerPolicy, HandlerVerdict, LogCore, LogSettings,
};

fn memory_log() -> Arc<LogCore> {
    Arc::new(LogCore::new(LogSettings {
        file_enabled: false,
        console_enabled: false,
        ..LogSettings::default()
    }))
}

#[test]
fn test_suppression_logs_once_notifies_once_publishes_once() {
    let log = memory_log();
    let broker = EventBroker::new();
    let (_, rx) = broker.subscribe(EventFilter::all());

    let notified = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&notified);
    let handler = ErrorHandler::new(Arc::clone(&log), broker)
        .with_notifier(Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

    let policy = HandlerPolicy::new("volume reconstruction failed");
    let verdict = handler
        .run(&policy, "reconstruct", || {
            Err::<(), _>(anyhow::anyhow!("out of slices"))
        })
        .unwrap();

    assert!(verdict.is_suppressed());
    assert_eq!(notified.load(Ordering::SeqCst), 1);
    assert_eq!(log.query(ErrorSeverity::Debug).len(), 1);
    assert_eq!(rx.try_iter().count(), 1);
}

#[test]
fn test_reraise_returns_downcastable_classified_error() {
    let handler = ErrorHandler::new(memory_log(), EventBroker::new());
    let policy = HandlerPolicy::new("segmentation failed")
        .category(ErrorCategory::Segmentation)
        .reraise(true)
        .show_dialog(false);

    let raised = handler
        .run(&policy, "segment", || {
            Err::<(), _>(anyhow::anyhow!("mask empty"))
        })
        .unwrap_err();

    let classified = raised
        .downcast_ref::<ApplicationError>()
        .expect("reraise should carry the classified error");
    assert_eq!(classified.message(), "segmentation failed");
    assert_eq!(classified.category(), ErrorCategory::Segmentation);
    assert_eq!(classified.cause().unwrap().to_string(), "mask empty");
}

#[test]
fn test_unmatched_failure_propagates_unmodified() {
    let log = memory_log();
    let handler = ErrorHandler::new(Arc::clone(&log), EventBroker::new());
    let policy = HandlerPolicy::new("disk trouble")
        .expected(ExpectedFailures::matching(vec![ExpectedFailures::kind::<
            std::io::Error,
        >()]));

    let raised = handler
        .run(&policy, "load_project", || {
            Err::<(), _>(anyhow::anyhow!("not an io failure"))
        })
        .unwrap_err();

    assert_eq!(raised.to_string(), "not an io failure");
    assert!(raised.downcast_ref::<ApplicationError>().is_none());
    // An unmatched failure is not handled, so nothing is logged.
    assert!(log.query(ErrorSeverity::Debug).is_empty());
}

#[test]
fn test_matched_typed_failure_is_handled() {
    let handler = ErrorHandler::new(memory_log(), EventBroker::new());
    let policy = HandlerPolicy::new("disk trouble")
        .show_dialog(false)
        .expected(ExpectedFailures::matching(vec![ExpectedFailures::kind::<
            std::io::Error,
        >()]));

    let verdict = handler
        .run(&policy, "load_project", || {
            Err::<(), _>(anyhow::Error::new(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "locked",
            )))
        })
        .unwrap();
    assert!(verdict.is_suppressed());
}

#[test]
fn test_panicking_notifier_does_not_break_the_pipeline() {
    let log = memory_log();
    let broker = EventBroker::new();
    let (_, rx) = broker.subscribe(EventFilter::all());

    let handler = ErrorHandler::new(Arc::clone(&log), broker)
        .with_notifier(Arc::new(|_| panic!("dialog toolkit exploded")));

    let policy = HandlerPolicy::new("export failed");
    let verdict = handler
        .run(&policy, "export_mesh", || {
            Err::<(), _>(anyhow::anyhow!("surface is open"))
        })
        .unwrap();

    // Notification failed, but the verdict, the log record, and the event
    // publication are untouched.
    assert!(verdict.is_suppressed());
    assert_eq!(log.query(ErrorSeverity::Debug).len(), 1);
    assert_eq!(rx.try_iter().count(), 1);
}

#[test]
fn test_crash_report_written_for_error_severity() {
    let dir = tempdir().expect("Failed to create temp directory");
    let log = memory_log();
    let reporter = Arc::new(CrashReporter::new(dir.path(), Arc::clone(&log)));
    let handler = ErrorHandler::new(log, EventBroker::new()).with_reporter(reporter);

    let policy = HandlerPolicy::new("renderer crashed").show_dialog(false);
    handler
        .run(&policy, "render_frame", || {
            Err::<(), _>(anyhow::anyhow!("gpu context lost"))
        })
        .unwrap();

    let reports: Vec<_> = fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with("crash_"))
        .collect();
    assert_eq!(reports.len(), 1);
    let body = fs::read_to_string(reports[0].path()).unwrap();
    assert!(body.contains("renderer crashed"));
}

#[test]
fn test_no_crash_report_below_error_severity() {
    let dir = tempdir().expect("Failed to create temp directory");
    let log = memory_log();
    let reporter = Arc::new(CrashReporter::new(dir.path(), Arc::clone(&log)));
    let handler = ErrorHandler::new(log, EventBroker::new()).with_reporter(reporter);

    let policy = HandlerPolicy::new("slice preview unavailable")
        .severity(ErrorSeverity::Warning)
        .show_dialog(false);
    handler
        .run(&policy, "preview_slice", || {
            Err::<(), _>(anyhow::anyhow!("cache miss"))
        })
        .unwrap();

    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn test_log_error_off_skips_the_log_record() {
    let log = memory_log();
    let handler = ErrorHandler::new(Arc::clone(&log), EventBroker::new());
    let policy = HandlerPolicy::new("quiet failure")
        .log_error(false)
        .show_dialog(false);

    let verdict = handler
        .run(&policy, "background_sync", || {
            Err::<(), _>(anyhow::anyhow!("offline"))
        })
        .unwrap();

    assert!(verdict.is_suppressed());
    assert!(log.query(ErrorSeverity::Debug).is_empty());
}

#[test]
fn test_verdict_value_survives_success() {
    let handler = ErrorHandler::new(memory_log(), EventBroker::new());
    let policy = HandlerPolicy::new("unused");
    let verdict = handler
        .run(&policy, "count_slices", || Ok(vec![1, 2, 3]))
        .unwrap();
    match verdict {
        HandlerVerdict::Completed(slices) => assert_eq!(slices.len(), 3),
        HandlerVerdict::Suppressed(_) => panic!("success must not be suppressed"),
    }
}
