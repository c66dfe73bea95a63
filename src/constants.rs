//! SML and Node Constants
//!
//! This module defines the wire constants of the SML transport protocol
//! (BSI TR-03109-1, SML 1.04) and the compile-time defaults of the meter node.

// ----------------------------------------------------------------------------
// SML transport layer
// ----------------------------------------------------------------------------

/// Escape byte used by the transport layer for start, end and stuffing
pub const SML_ESCAPE: u8 = 0x1B;

/// Number of escape bytes forming an escape sequence
pub const SML_ESCAPE_LEN: u8 = 4;

/// Escape bytes that announce a new message while hunting
pub const SML_START_MARKER: [u8; 3] = [SML_ESCAPE, SML_ESCAPE, SML_ESCAPE];

/// Version 1 marker byte following the start escape sequence
pub const SML_VERSION_1: u8 = 0x01;

/// Number of version bytes following the start escape sequence
pub const SML_VERSION_LEN: u8 = 4;

/// End-of-file marker following the end escape sequence
pub const SML_END_MARK: u8 = 0x1A;

/// Largest padding count a trailer may announce
pub const SML_MAX_PADDING: u8 = 3;

// ----------------------------------------------------------------------------
// SML type-length field
// ----------------------------------------------------------------------------

/// TL bit: another TL byte follows
pub const SML_TL_MORE: u8 = 0x80;

/// TL mask for the type bits
pub const SML_TL_TYPE_MASK: u8 = 0x70;

/// TL mask for the length nibble
pub const SML_TL_LENGTH_MASK: u8 = 0x0F;

pub const SML_TYPE_OCTET_STRING: u8 = 0x00;
pub const SML_TYPE_BOOLEAN: u8 = 0x40;
pub const SML_TYPE_INTEGER: u8 = 0x50;
pub const SML_TYPE_UNSIGNED: u8 = 0x60;
pub const SML_TYPE_LIST: u8 = 0x70;

/// End-of-message element and fill byte between messages
pub const SML_END_OF_MESSAGE: u8 = 0x00;

/// Maximum nesting depth of SML lists tracked by the decoder
pub const SML_MAX_DEPTH: usize = 12;

/// Bytes of leaf data the decoder keeps for the currently open lists
pub const SML_RECORD_ARENA: usize = 512;

/// Leaf elements the decoder keeps for the currently open lists
pub const SML_RECORD_FIELDS: usize = 64;

// ----------------------------------------------------------------------------
// SML list entry layout and units (DLMS/COSEM unit codes)
// ----------------------------------------------------------------------------

pub const SML_ENTRY_OBJ_NAME: usize = 0;
pub const SML_ENTRY_STATUS: usize = 1;
pub const SML_ENTRY_VAL_TIME: usize = 2;
pub const SML_ENTRY_UNIT: usize = 3;
pub const SML_ENTRY_SCALER: usize = 4;
pub const SML_ENTRY_VALUE: usize = 5;
pub const SML_ENTRY_SIGNATURE: usize = 6;

/// Number of elements of an SML_ListEntry
pub const SML_ENTRY_LEN: usize = 7;

pub const SML_UNIT_WATT: u8 = 27;
pub const SML_UNIT_WATT_HOUR: u8 = 30;

/// Length of an OBIS identifier
pub const OBIS_LEN: usize = 6;

/// 1-0:1.8.1*255, positive active energy tariff 1
pub const OBIS_ENERGY_IMPORT_T1: [u8; OBIS_LEN] = [0x01, 0x00, 0x01, 0x08, 0x01, 0xFF];

/// 1-0:1.8.0*255, positive active energy total
pub const OBIS_ENERGY_IMPORT_TOTAL: [u8; OBIS_LEN] = [0x01, 0x00, 0x01, 0x08, 0x00, 0xFF];

/// 1-0:16.7.0*255, current active power
pub const OBIS_ACTIVE_POWER: [u8; OBIS_LEN] = [0x01, 0x00, 0x10, 0x07, 0x00, 0xFF];

// ----------------------------------------------------------------------------
// Named-value slots
// ----------------------------------------------------------------------------

/// Number of named-value slots
pub const MAX_SLOTS: usize = 4;

/// Slot value before any message was framed
pub const SLOT_NOT_CAPTURED: f64 = -2.0;

/// Slot value after a message started but before its field was committed
pub const SLOT_STARTED: f64 = -3.0;

// ----------------------------------------------------------------------------
// Node defaults
// ----------------------------------------------------------------------------

/// Meter serial baud rate
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Capture buffer capacity in bytes
pub const DEFAULT_CAPTURE_CAPACITY: usize = 1024;

/// Sleep between duty cycles (5 minutes)
pub const DEFAULT_SLEEP_INTERVAL_MS: u64 = 300_000;

/// Total wait for the first meter byte of a cycle
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 5_000;

/// Delay between two polls of the meter source
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 10;

/// Upper bound for the radio to report a finished transmission
pub const DEFAULT_TX_TIMEOUT_MS: u64 = 120_000;

/// Delay between re-arming low power and entering deep sleep
pub const DEFAULT_SETTLE_DELAY_MS: u64 = 100;

/// Length of the "payload handed off" LED pulse
pub const DEFAULT_SIGNAL_PULSE_MS: u64 = 1_000;

/// Size of the transmitted payload
pub const PAYLOAD_LEN: usize = 20;

/// Field width of the formatted value inside the payload
pub const PAYLOAD_VALUE_WIDTH: usize = 10;

/// Decimals of the formatted value inside the payload
pub const PAYLOAD_VALUE_PRECISION: usize = 3;

/// LoRaWAN application port for meter uplinks
pub const DEFAULT_TX_PORT: u8 = 1;
