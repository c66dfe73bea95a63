//! # Utility Modules
//!
//! Hex encoding for capture dumps and the logging helpers shared by the
//! decoder and the duty cycle.

pub mod hex;
pub mod logging;

pub use hex::{decode_hex, encode_hex, format_capture_listing, format_hex_compact, pretty_hex};
pub use logging::{log_capture, log_frame_hex, LogThrottle};
