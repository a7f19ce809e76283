//! Unit tests for log.rs
//!
//! Tests Logger trait, LogEntry, LogSeverity, DefaultLogger, the global
//! logger and the logging macros.

use crate::error::Error;
use crate::log::{
    log, log_detailed, reset_logger, set_logger, CaptureLogger, DefaultLogger, LogEntry,
    LogSeverity, Logger,
};
use serial_test::serial;
use std::time::SystemTime;

fn entry(severity: LogSeverity, file: Option<&'static str>, line: Option<u32>) -> LogEntry {
    LogEntry {
        severity,
        timestamp: SystemTime::now(),
        source: "ibl::test".to_string(),
        message: format!("{:?} message", severity),
        file,
        line,
    }
}

// ============================================================================
// LOG SEVERITY TESTS
// ============================================================================

#[test]
fn test_log_severity_ordering() {
    assert!(LogSeverity::Trace < LogSeverity::Debug);
    assert!(LogSeverity::Debug < LogSeverity::Info);
    assert!(LogSeverity::Info < LogSeverity::Warn);
    assert!(LogSeverity::Warn < LogSeverity::Error);
}

#[test]
fn test_log_severity_debug() {
    assert_eq!(format!("{:?}", LogSeverity::Trace), "Trace");
    assert_eq!(format!("{:?}", LogSeverity::Error), "Error");
}

// ============================================================================
// LOG ENTRY / DEFAULT LOGGER TESTS
// ============================================================================

#[test]
fn test_log_entry_clone() {
    let entry1 = entry(LogSeverity::Warn, Some("resource.rs"), Some(10));
    let entry2 = entry1.clone();

    assert_eq!(entry1.severity, entry2.severity);
    assert_eq!(entry1.source, entry2.source);
    assert_eq!(entry1.file, entry2.file);
    assert_eq!(entry1.line, entry2.line);
}

#[test]
fn test_default_logger_all_severities() {
    let logger = DefaultLogger;
    for severity in [
        LogSeverity::Trace,
        LogSeverity::Debug,
        LogSeverity::Info,
        LogSeverity::Warn,
        LogSeverity::Error,
    ] {
        logger.log(&entry(severity, None, None));
        logger.log(&entry(severity, Some("renderer.rs"), Some(42)));
    }
}

#[test]
fn test_format_plain_with_location() {
    let text = DefaultLogger::format_plain(&entry(LogSeverity::Error, Some("vulkan.rs"), Some(123)));
    assert!(text.contains("[ERROR]"));
    assert!(text.contains("[ibl::test]"));
    assert!(text.ends_with("(vulkan.rs:123)"));
}

#[test]
fn test_format_plain_without_location() {
    let text = DefaultLogger::format_plain(&entry(LogSeverity::Info, None, None));
    assert!(text.contains("[INFO ]"));
    assert!(text.ends_with("Info message"));
}

// ============================================================================
// GLOBAL LOGGER TESTS
// ============================================================================

#[test]
#[serial]
fn test_set_logger_redirects_output() {
    let capture = CaptureLogger::default();
    set_logger(capture.clone());

    log(LogSeverity::Info, "ibl::test", "hello".to_string());
    log_detailed(LogSeverity::Error, "ibl::test", "boom".to_string(), "x.rs", 7);

    reset_logger();

    let entries = capture.entries.lock().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].message, "hello");
    assert!(entries[0].file.is_none());
    assert_eq!(entries[1].file, Some("x.rs"));
    assert_eq!(entries[1].line, Some(7));
}

#[test]
#[serial]
fn test_reset_logger_stops_capture() {
    let capture = CaptureLogger::default();
    set_logger(capture.clone());
    reset_logger();

    log(LogSeverity::Info, "ibl::test", "not captured".to_string());
    assert!(capture.entries.lock().unwrap().is_empty());
}

// ============================================================================
// MACRO TESTS
// ============================================================================

#[test]
#[serial]
fn test_severity_macros() {
    let capture = CaptureLogger::default();
    set_logger(capture.clone());

    crate::ibl_trace!("ibl::test", "t{}", 1);
    crate::ibl_debug!("ibl::test", "d{}", 2);
    crate::ibl_info!("ibl::test", "i{}", 3);
    crate::ibl_warn!("ibl::test", "w{}", 4);
    crate::ibl_error!("ibl::test", "e{}", 5);

    reset_logger();

    let messages = capture.messages_from("ibl::test");
    assert_eq!(
        messages,
        vec![
            (LogSeverity::Trace, "t1".to_string()),
            (LogSeverity::Debug, "d2".to_string()),
            (LogSeverity::Info, "i3".to_string()),
            (LogSeverity::Warn, "w4".to_string()),
            (LogSeverity::Error, "e5".to_string()),
        ]
    );
    let last = capture.entries.lock().unwrap().last().cloned().unwrap();
    assert!(last.file.unwrap().ends_with("log_tests.rs"));
}

#[test]
#[serial]
fn test_err_macro_logs_and_builds_backend_error() {
    let capture = CaptureLogger::default();
    set_logger(capture.clone());

    let err = crate::ibl_err!("ibl::test", "fence wait failed: {}", -4);

    reset_logger();

    assert!(matches!(err, Error::BackendError(ref m) if m == "fence wait failed: -4"));
    assert_eq!(
        capture.messages_from("ibl::test"),
        vec![(LogSeverity::Error, "fence wait failed: -4".to_string())]
    );
}

#[test]
#[serial]
fn test_bail_macro_returns_early() {
    fn failing(flag: bool) -> crate::error::Result<u32> {
        if flag {
            crate::ibl_bail!("ibl::test", "bailed with {}", flag);
        }
        Ok(1)
    }

    let capture = CaptureLogger::default();
    set_logger(capture.clone());
    let ok = failing(false);
    let err = failing(true);
    reset_logger();

    assert_eq!(ok.unwrap(), 1);
    assert!(matches!(err, Err(Error::BackendError(_))));
    assert_eq!(capture.messages_from("ibl::test").len(), 1);
}
