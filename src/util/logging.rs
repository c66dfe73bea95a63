//! # Enhanced Logging Utilities
//!
//! Logging patterns for the meter node: rate limiting for decoder diagnostics
//! that can fire once per byte, hex dumps of captured SML messages, and an
//! optional tracing span per duty cycle.
//!
//! ```rust
//! use sml_node::util::logging::LogThrottle;
//!
//! // At most 5 unexpected-byte warnings per second
//! let mut throttle = LogThrottle::new(1000, 5);
//! if throttle.allow() {
//!     log::warn!("unexpected byte");
//! }
//! ```

use std::time::Instant;

/// Throttling structure for rate-limiting log messages
///
/// A garbled meter line produces one framing diagnostic per byte; the
/// throttle keeps the serial console readable.
#[derive(Debug)]
pub struct LogThrottle {
    /// Time window for throttling (in milliseconds)
    window_ms: u64,
    /// Maximum messages allowed per window
    cap: u32,
    /// Current message count in window
    count: u32,
    /// Messages suppressed since the last window rollover
    suppressed: u32,
    /// Start time of current window
    t0: Instant,
}

impl LogThrottle {
    /// Create new throttle with time window and message cap
    pub fn new(window_ms: u64, cap: u32) -> Self {
        Self {
            window_ms,
            cap,
            count: 0,
            suppressed: 0,
            t0: Instant::now(),
        }
    }

    /// Check if logging is allowed (resets counter after window expires)
    pub fn allow(&mut self) -> bool {
        let now = Instant::now();
        let elapsed_ms = now.duration_since(self.t0).as_millis() as u64;

        if elapsed_ms > self.window_ms {
            if self.suppressed > 0 {
                log::debug!("{} throttled log messages suppressed", self.suppressed);
            }
            self.t0 = now;
            self.count = 0;
            self.suppressed = 0;
        }

        self.count += 1;
        let allowed = self.count <= self.cap;
        if !allowed {
            self.suppressed += 1;
        }
        allowed
    }

    /// Number of messages suppressed in the current window
    pub fn suppressed(&self) -> u32 {
        self.suppressed
    }

    /// Reset the throttle (start new window immediately)
    pub fn reset(&mut self) {
        self.t0 = Instant::now();
        self.count = 0;
        self.suppressed = 0;
    }
}

/// Log frame data in hex format for debugging
pub fn log_frame_hex(prefix: &str, data: &[u8]) {
    const MAX_LOG_BYTES: usize = 64;

    let display_data = &data[..data.len().min(MAX_LOG_BYTES)];
    let hex_str = crate::util::hex::format_hex_compact(display_data);
    let suffix = if data.len() > MAX_LOG_BYTES {
        format!(" ... ({} bytes total)", data.len())
    } else {
        String::new()
    };

    log::debug!("{prefix}: {hex_str}{suffix}");
}

/// Log a complete captured message as the `0x1B, 0x1B, ...` listing
pub fn log_capture(data: &[u8]) {
    if log::log_enabled!(target: "sml::capture", log::Level::Trace) {
        log::trace!(
            target: "sml::capture",
            "Size: {}\n---\n{}\n---",
            data.len(),
            crate::util::hex::format_capture_listing(data, 15)
        );
    } else {
        log_frame_hex("captured message", data);
    }
}

/// Create a tracing span for one duty cycle
#[cfg(feature = "tracing")]
pub fn span_duty_cycle(cycle: u64) -> tracing::Span {
    tracing::info_span!("duty_cycle", cycle = cycle)
}

/// Fallback span creation when tracing is not available
#[cfg(not(feature = "tracing"))]
pub fn span_duty_cycle(_cycle: u64) {}

/// Log a warning with throttling
#[macro_export]
macro_rules! log_warn_throttled {
    ($throttle:expr, $($arg:tt)*) => {
        if $throttle.allow() {
            log::warn!($($arg)*);
        }
    };
}

/// Debug logging utilities for protocol analysis
pub mod debug {
    /// Log CRC validation results
    pub fn log_crc_result(expected: u16, calculated: u16, valid: bool) {
        if valid {
            log::debug!("CRC valid: {expected:04X}");
        } else {
            log::warn!("CRC mismatch: received {expected:04X}, calculated {calculated:04X}");
        }
    }
}
