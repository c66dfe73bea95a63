//! Unit tests for the logging functionality in the `sml-node` crate.

use sml_node::logging::{init_logger, init_logger_with_default, log_debug, log_error, log_info, log_warn};
use sml_node::util::logging::{log_capture, log_frame_hex, LogThrottle};

/// Tests that the logging helpers work after init.
#[test]
fn test_logging() {
    init_logger();
    log_error("This is an error message");
    log_warn("This is a warning message");
    log_info("This is an info message");
    log_debug("This is a debug message");
}

/// Tests that initializing twice is harmless.
#[test]
fn test_init_logger_twice() {
    init_logger();
    init_logger_with_default("debug");
}

/// Tests the capture dump helpers on short and long input.
#[test]
fn test_capture_dumps() {
    init_logger();
    log_capture(&[0x1B, 0x1B, 0x1B, 0x1B, 0x01, 0x01, 0x01, 0x01]);
    log_frame_hex("long", &[0xAA; 200]);
}

/// Tests the throttle macro against a tight cap.
#[test]
fn test_throttled_macro() {
    let mut throttle = LogThrottle::new(60_000, 1);
    for i in 0..5 {
        sml_node::log_warn_throttled!(throttle, "warning {i}");
    }
    assert_eq!(throttle.suppressed(), 4);
}
