//! # sml-node - SML Smart Meter to LoRaWAN Node
//!
//! The sml-node crate reads an electricity meter's SML (Smart Message
//! Language) stream from its optical interface, extracts OBIS registers such
//! as the tariff 1 import energy, and uplinks the value over LoRaWAN on a
//! low-power duty cycle.
//!
//! ## Features
//!
//! - Byte-at-a-time SML transport v1 decoder with CRC-16/X-25 validation
//! - Bounded capture of the message in progress for diagnostics
//! - OBIS register table with scaled value extraction
//! - Duty cycle scheduler: read meter, transmit, sleep
//! - Async collaborator traits for the meter line, radio and power control,
//!   with host implementations (serial port, replay, simulated meter)
//! - Support for logging and error handling
//!
//! ## Usage
//!
//! ```rust
//! use sml_node::{decode_messages, DecoderState, FieldTable, ListEntry, ObisCode, SmlFileBuilder};
//!
//! let t1: ObisCode = "1-0:1.8.1*255".parse().unwrap();
//! let file = SmlFileBuilder::meter_reading(b"METER", None, &[ListEntry::watt_hours(t1, 12345, -3)]);
//!
//! let messages = decode_messages(&file, FieldTable::default_table());
//! assert_eq!(messages.len(), 1);
//! assert_eq!(messages[0].state, DecoderState::Complete);
//! assert_eq!(messages[0].values[0], 12.345);
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod node;
pub mod sml;
pub mod util;

pub use crate::config::NodeConfig;
pub use crate::error::NodeError;
pub use crate::logging::{init_logger, init_logger_with_default, log_info};

pub use node::{
    CyclePhase, CycleReport, CycleScheduler, Credentials, HostPower, LoRaRadio, LogSignal,
    LoggingRadio, MeterSource, Payload, PowerControl, RadioEvent, RadioSettings, ReadOutcome,
    ReplaySource, SerialMeterSource, Session, SignalLine, SimulatedMeter, TxOutcome, WakeReason,
};
pub use sml::{
    CaptureBuffer, DecoderState, Extraction, FieldSpec, FieldTable, ListEntry, ObisCode, Record,
    SmlDecoder, SmlFileBuilder, SmlValue,
};

use crate::constants::{DEFAULT_CAPTURE_CAPACITY, MAX_SLOTS};

/// Outcome of one message found in a capture
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedMessage {
    /// `Complete`, `ChecksumError` or `Unexpected`
    pub state: DecoderState,
    /// Slot values after the message
    pub values: [f64; MAX_SLOTS],
    /// Captured bytes of the message
    pub bytes: usize,
}

/// Decodes a captured byte stream and reports every message that ended.
///
/// # Arguments
/// * `data` - Raw meter bytes, possibly containing several SML files
/// * `fields` - Register table applied to every message
pub fn decode_messages(data: &[u8], fields: FieldTable) -> Vec<DecodedMessage> {
    let mut session = Session::new(fields, CaptureBuffer::new(DEFAULT_CAPTURE_CAPACITY));
    let mut messages = Vec::new();
    for &byte in data {
        let state = session.feed(byte);
        if state.is_terminal() {
            messages.push(DecodedMessage {
                state,
                values: *session.values(),
                bytes: session.capture().len(),
            });
        }
    }
    messages
}
