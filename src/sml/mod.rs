//! # SML Protocol
//!
//! Decoding side of the Smart Message Language used by German household
//! meters on their optical D0 interface:
//!
//! - [`decoder`]: byte-at-a-time transport and type-length decoder
//! - [`capture`]: bounded copy of the message in progress for diagnostics
//! - [`extractor`]: OBIS register table and value scaling
//! - [`obis`]: OBIS identifiers
//! - [`builder`]: encoder for complete SML files (simulation and tests)

pub mod builder;
pub mod capture;
pub mod decoder;
pub mod extractor;
pub mod obis;

pub use builder::{ListEntry, SmlFileBuilder, SmlValue};
pub use capture::{CaptureBuffer, CaptureError};
pub use decoder::{ChecksumCheck, DecoderState, Element, Record, SmlDecoder};
pub use extractor::{ExtractError, Extraction, FieldSpec, FieldTable};
pub use obis::{ObisCode, ObisParseError};
