//! # Decode Session
//!
//! Everything the node keeps between bytes: the decoder, the capture of the
//! message in progress, the register table and the named-value slots. The
//! scheduler owns exactly one session and feeds it every byte read from the
//! meter.
//!
//! Slot values follow the message lifecycle:
//!
//! | event            | slots                                  |
//! |------------------|----------------------------------------|
//! | boot             | all `-2` (never captured)              |
//! | start marker     | staged values cleared                  |
//! | version accepted | all `-3`                               |
//! | matching record  | value staged                           |
//! | message complete | staged values committed                |
//! | checksum error   | staged values dropped                  |
//! | unexpected byte  | staged values dropped                  |
//!
//! An end escape read without its file also looks like a start marker; the
//! slots keep their values until the version bytes confirm a new message.

use crate::constants::{MAX_SLOTS, SLOT_NOT_CAPTURED, SLOT_STARTED};
use crate::log_warn_throttled;
use crate::sml::capture::{CaptureBuffer, CaptureError};
use crate::sml::decoder::{DecoderState, SmlDecoder};
use crate::sml::extractor::FieldTable;
use crate::util::logging::{log_capture, LogThrottle};

/// Counters of one session; [`SessionStats::since`] gives per-cycle deltas
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub bytes: u64,
    pub messages_started: u64,
    pub messages_complete: u64,
    pub checksum_errors: u64,
    pub unexpected_bytes: u64,
    pub capture_overflows: u64,
    pub fields_matched: u64,
}

impl SessionStats {
    pub fn since(&self, earlier: &SessionStats) -> SessionStats {
        SessionStats {
            bytes: self.bytes.saturating_sub(earlier.bytes),
            messages_started: self.messages_started.saturating_sub(earlier.messages_started),
            messages_complete: self.messages_complete.saturating_sub(earlier.messages_complete),
            checksum_errors: self.checksum_errors.saturating_sub(earlier.checksum_errors),
            unexpected_bytes: self.unexpected_bytes.saturating_sub(earlier.unexpected_bytes),
            capture_overflows: self.capture_overflows.saturating_sub(earlier.capture_overflows),
            fields_matched: self.fields_matched.saturating_sub(earlier.fields_matched),
        }
    }
}

#[derive(Debug)]
pub struct Session {
    decoder: SmlDecoder,
    capture: CaptureBuffer,
    fields: FieldTable,
    values: [f64; MAX_SLOTS],
    staged: [Option<f64>; MAX_SLOTS],
    /// A start marker was seen but the version bytes are still outstanding
    start_pending: bool,
    stats: SessionStats,
    throttle: LogThrottle,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(FieldTable::default_table(), CaptureBuffer::default())
    }
}

impl Session {
    pub fn new(fields: FieldTable, capture: CaptureBuffer) -> Self {
        Self {
            decoder: SmlDecoder::new(),
            capture,
            fields,
            values: [SLOT_NOT_CAPTURED; MAX_SLOTS],
            staged: [None; MAX_SLOTS],
            start_pending: false,
            stats: SessionStats::default(),
            throttle: LogThrottle::new(1000, 5),
        }
    }

    /// Processes one meter byte
    pub fn feed(&mut self, byte: u8) -> DecoderState {
        self.stats.bytes += 1;

        let fields = &self.fields;
        let staged = &mut self.staged;
        let stats = &mut self.stats;
        let state = self.decoder.feed(byte, |record| {
            if let Some((slot, value)) = fields.extract(&record) {
                staged[slot] = Some(value);
                stats.fields_matched += 1;
            }
        });

        match state {
            DecoderState::Idle => {}
            DecoderState::Start => self.on_start(),
            _ => self.capture_byte(byte),
        }

        if self.start_pending && self.decoder.is_framed() {
            self.on_framed();
        }
        if state.is_terminal() {
            self.start_pending = false;
        }

        match state {
            DecoderState::Complete => self.on_complete(),
            DecoderState::ChecksumError => {
                self.stats.checksum_errors += 1;
                self.staged = [None; MAX_SLOTS];
                log::warn!("Checksum error, message discarded");
            }
            DecoderState::Unexpected => {
                self.stats.unexpected_bytes += 1;
                self.staged = [None; MAX_SLOTS];
                log_warn_throttled!(self.throttle, "Unexpected byte {byte:#04X}, message discarded");
            }
            _ => {}
        }
        state
    }

    /// Processes a run of bytes, returning the state after the last one
    pub fn feed_all(&mut self, bytes: &[u8]) -> DecoderState {
        bytes
            .iter()
            .fold(self.decoder.state(), |_, &byte| self.feed(byte))
    }

    fn on_start(&mut self) {
        self.capture.reset(self.decoder.start_marker());
        self.staged = [None; MAX_SLOTS];
        self.start_pending = true;
    }

    fn on_framed(&mut self) {
        self.start_pending = false;
        self.stats.messages_started += 1;
        self.values = [SLOT_STARTED; MAX_SLOTS];
        log::debug!("SML message start");
    }

    fn capture_byte(&mut self, byte: u8) {
        match self.capture.append(byte) {
            Ok(()) | Err(CaptureError::Suspended) => {}
            Err(CaptureError::Overflow { .. }) => self.stats.capture_overflows += 1,
        }
    }

    fn on_complete(&mut self) {
        self.stats.messages_complete += 1;
        for (slot, staged) in self.staged.iter_mut().enumerate() {
            if let Some(value) = staged.take() {
                self.values[slot] = value;
            }
        }

        log::info!("Successfully received a complete message");
        log_capture(self.capture.snapshot());
        for spec in self.fields.specs() {
            log::info!(
                "{:<12} ({})..: {:>10.3}",
                spec.label,
                spec.obis,
                self.values[spec.slot]
            );
        }
    }

    pub fn state(&self) -> DecoderState {
        self.decoder.state()
    }

    /// Current value of a slot
    pub fn value(&self, slot: usize) -> Option<f64> {
        self.values.get(slot).copied()
    }

    pub fn values(&self) -> &[f64; MAX_SLOTS] {
        &self.values
    }

    pub fn capture(&self) -> &CaptureBuffer {
        &self.capture
    }

    pub fn fields(&self) -> &FieldTable {
        &self.fields
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn decoder(&self) -> &SmlDecoder {
        &self.decoder
    }
}
