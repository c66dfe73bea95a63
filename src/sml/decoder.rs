//! # SML Byte Decoder
//!
//! A push decoder for the SML transport protocol (version 1). The meter
//! streams one SML file after another over its optical interface; the decoder
//! is fed one byte at a time and reports where that byte left it:
//!
//! ```text
//! 1B 1B 1B 1B  01 01 01 01  <messages>  00..  1B 1B 1B 1B  1A pp cL cH
//! \_ start escape + version _/            fill \_ end escape  _/ \ CRC-16/X-25
//! ```
//!
//! Messages are nested SML lists encoded with type-length bytes. Whenever a
//! list closes, its leaf elements are handed to the caller as a [`Record`]
//! (innermost list first), which is where the field extractor looks for OBIS
//! registers. The decoder never allocates: open lists keep their leaves in a
//! fixed arena that is released again when the list closes.
//!
//! ```rust
//! use sml_node::sml::decoder::{DecoderState, SmlDecoder};
//!
//! let mut decoder = SmlDecoder::new();
//! assert_eq!(decoder.advance(0x1B), DecoderState::Idle);
//! assert_eq!(decoder.advance(0x1B), DecoderState::Idle);
//! assert_eq!(decoder.advance(0x1B), DecoderState::Start);
//! assert_eq!(decoder.start_marker(), &[0x1B, 0x1B, 0x1B]);
//! ```

use crate::constants::{
    SML_END_MARK, SML_END_OF_MESSAGE, SML_ESCAPE, SML_ESCAPE_LEN, SML_MAX_DEPTH, SML_MAX_PADDING,
    SML_RECORD_ARENA, SML_RECORD_FIELDS, SML_START_MARKER, SML_TL_LENGTH_MASK, SML_TL_MORE,
    SML_TL_TYPE_MASK, SML_TYPE_BOOLEAN, SML_TYPE_INTEGER, SML_TYPE_LIST, SML_TYPE_OCTET_STRING,
    SML_TYPE_UNSIGNED, SML_VERSION_1, SML_VERSION_LEN,
};
use crc::{Crc, Digest, CRC_16_IBM_SDLC};

/// CRC-16/X-25 as used by the SML transport trailer
pub static SML_CRC: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_SDLC);

/// Full start escape; re-anchors the message when the escape run is longer
const START_ESCAPE: [u8; 4] = [SML_ESCAPE; 4];

/// Escape sequence plus first version byte, seen when a new file interrupts
/// the current one
const RESYNC_MARKER: [u8; 5] = [SML_ESCAPE, SML_ESCAPE, SML_ESCAPE, SML_ESCAPE, SML_VERSION_1];

/// Longest type-length chain accepted
const MAX_TL_BYTES: usize = 4;

/// Position of the decoder after consuming a byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecoderState {
    /// Waiting for a start escape; the byte was not part of a message.
    Idle,
    /// The byte completed a start marker; a new message begins.
    Start,
    /// The byte belongs to the message body.
    Body,
    /// The byte closed at least one list; records were reported.
    ListEnd,
    /// The byte belongs to the end escape or checksum trailer.
    Checksum,
    /// The trailer checksum matched; the message is complete.
    Complete,
    /// The byte could not be interpreted; the message was discarded.
    Unexpected,
    /// The trailer checksum did not match; the message was discarded.
    ChecksumError,
}

impl DecoderState {
    /// True for the states that end a message
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            DecoderState::Complete | DecoderState::Unexpected | DecoderState::ChecksumError
        )
    }
}

/// Checksum comparison of the last trailer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChecksumCheck {
    pub received: u16,
    pub calculated: u16,
}

impl ChecksumCheck {
    pub fn is_valid(&self) -> bool {
        self.received == self.calculated
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum ElementKind {
    #[default]
    OctetString,
    Boolean,
    Integer,
    Unsigned,
    List(u16),
    EndOfMessage,
}

#[derive(Debug, Clone, Copy, Default)]
struct FieldRef {
    kind: ElementKind,
    start: u16,
    len: u16,
    truncated: bool,
}

#[derive(Debug, Clone, Copy, Default)]
struct ListFrame {
    remaining: usize,
    count: usize,
    field_start: usize,
    arena_start: usize,
    overflow: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Hunt { escapes: u8 },
    StartEscape,
    Version { remaining: u8 },
    TypeLength,
    MoreLength { kind: u8, length: usize, tl_bytes: usize },
    Data { remaining: usize },
    Stuffing { skip: u8, resume: usize },
    BodyEscape { escapes: u8 },
    Padding,
    CrcLow,
    CrcHigh { low: u8 },
}

/// One decoded SML element of a closed list.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Element<'a> {
    /// Octet string; empty for an absent optional value (`0x01`).
    OctetString(&'a [u8]),
    Boolean(bool),
    Integer(i64),
    Unsigned(u64),
    /// A nested list with its element count.
    List(usize),
    EndOfMessage,
    /// A leaf whose data did not fit the record arena.
    Truncated,
}

impl<'a> Element<'a> {
    /// Numeric view of integer elements
    pub fn as_i128(&self) -> Option<i128> {
        match *self {
            Element::Integer(v) => Some(v as i128),
            Element::Unsigned(v) => Some(v as i128),
            _ => None,
        }
    }

    /// True for the `0x01` placeholder of an absent optional value
    pub fn is_absent(&self) -> bool {
        matches!(self, Element::OctetString(b) if b.is_empty())
    }
}

/// The leaf elements of a list that just closed.
#[derive(Debug, Clone, Copy)]
pub struct Record<'a> {
    fields: &'a [FieldRef],
    arena: &'a [u8],
    complete: bool,
}

impl<'a> Record<'a> {
    /// Number of elements
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// False when elements were dropped because the record did not fit
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn element(&self, index: usize) -> Option<Element<'a>> {
        self.fields.get(index).map(|f| self.decode(f))
    }

    pub fn elements(&self) -> impl Iterator<Item = Element<'a>> + '_ {
        self.fields.iter().map(move |f| self.decode(f))
    }

    /// Leading octet string of the record (the `objName` of a list entry)
    pub fn leading_octets(&self) -> Option<&'a [u8]> {
        match self.element(0)? {
            Element::OctetString(bytes) => Some(bytes),
            _ => None,
        }
    }

    fn decode(&self, field: &FieldRef) -> Element<'a> {
        if field.truncated {
            return Element::Truncated;
        }
        let start = field.start as usize;
        let data = &self.arena[start..start + field.len as usize];
        match field.kind {
            ElementKind::OctetString => Element::OctetString(data),
            ElementKind::Boolean => Element::Boolean(data.iter().any(|&b| b != 0)),
            ElementKind::Integer => {
                let seed: i64 = if data.first().is_some_and(|b| b & 0x80 != 0) { -1 } else { 0 };
                Element::Integer(data.iter().fold(seed, |acc, &b| (acc << 8) | b as i64))
            }
            ElementKind::Unsigned => {
                Element::Unsigned(data.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64))
            }
            ElementKind::List(count) => Element::List(count as usize),
            ElementKind::EndOfMessage => Element::EndOfMessage,
        }
    }
}

/// SML transport and type-length decoder.
pub struct SmlDecoder {
    phase: Phase,
    state: DecoderState,
    marker: &'static [u8],
    digest: Option<Digest<'static, u16>>,
    calculated_crc: u16,
    last_checksum: Option<ChecksumCheck>,
    depth: usize,
    frames: [ListFrame; SML_MAX_DEPTH],
    fields: [FieldRef; SML_RECORD_FIELDS],
    field_len: usize,
    arena: [u8; SML_RECORD_ARENA],
    arena_len: usize,
    current: FieldRef,
    data_escapes: u8,
    /// Consecutive escape bytes up to and including the last byte, whatever
    /// the phase; cleared by a completed stuffing run
    escape_run: u8,
}

impl Default for SmlDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SmlDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmlDecoder")
            .field("phase", &self.phase)
            .field("state", &self.state)
            .field("depth", &self.depth)
            .field("fields", &self.field_len)
            .field("arena", &self.arena_len)
            .field("escape_run", &self.escape_run)
            .finish()
    }
}

type ListSink<'s> = dyn FnMut(Record<'_>) + 's;

impl SmlDecoder {
    pub fn new() -> Self {
        SmlDecoder {
            phase: Phase::Hunt { escapes: 0 },
            state: DecoderState::Idle,
            marker: &SML_START_MARKER,
            digest: None,
            calculated_crc: 0,
            last_checksum: None,
            depth: 0,
            frames: [ListFrame::default(); SML_MAX_DEPTH],
            fields: [FieldRef::default(); SML_RECORD_FIELDS],
            field_len: 0,
            arena: [0; SML_RECORD_ARENA],
            arena_len: 0,
            current: FieldRef::default(),
            data_escapes: 0,
            escape_run: 0,
        }
    }

    /// State reported for the last byte
    pub fn state(&self) -> DecoderState {
        self.state
    }

    /// Bytes that formed the last start marker; the capture buffer is seeded
    /// with them
    pub fn start_marker(&self) -> &'static [u8] {
        self.marker
    }

    /// Current list nesting depth
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// True between a start marker and the end of that message
    pub fn in_message(&self) -> bool {
        !matches!(self.phase, Phase::Hunt { .. })
    }

    /// True once the start escape and all version bytes of the current
    /// message were accepted
    pub fn is_framed(&self) -> bool {
        !matches!(
            self.phase,
            Phase::Hunt { .. } | Phase::StartEscape | Phase::Version { .. }
        )
    }

    /// Checksum comparison of the most recent trailer
    pub fn last_checksum(&self) -> Option<ChecksumCheck> {
        self.last_checksum
    }

    /// Drops any message in progress and waits for the next start marker
    pub fn reset(&mut self) {
        self.clear_structure();
        self.digest = None;
        self.escape_run = 0;
        self.phase = Phase::Hunt { escapes: 0 };
        self.state = DecoderState::Idle;
    }

    /// Consumes one byte, ignoring the records of closed lists
    pub fn advance(&mut self, byte: u8) -> DecoderState {
        self.feed(byte, |_| {})
    }

    /// Consumes one byte; `on_list_end` receives every list the byte closed
    pub fn feed<F>(&mut self, byte: u8, mut on_list_end: F) -> DecoderState
    where
        F: FnMut(Record<'_>),
    {
        if self.message_checksummed() {
            if let Some(digest) = self.digest.as_mut() {
                digest.update(&[byte]);
            }
        }

        let run = self.escape_run;
        self.escape_run = if byte == SML_ESCAPE {
            run.saturating_add(1)
        } else {
            0
        };

        let state = if byte == SML_VERSION_1 && run >= SML_ESCAPE_LEN && self.interruptible() {
            // the escape run may have begun inside a truncated element or trailer
            self.resync()
        } else {
            self.step(byte, &mut on_list_end)
        };
        self.state = state;
        state
    }

    /// `1B×4 01` means a new file everywhere except in a regular header
    fn interruptible(&self) -> bool {
        !matches!(self.phase, Phase::Version { remaining } if remaining == SML_VERSION_LEN)
    }

    /// Escapes of the current run that may open the next file
    fn hunt_carry(&self) -> u8 {
        self.escape_run.min(SML_START_MARKER.len() as u8 - 1)
    }

    fn message_checksummed(&self) -> bool {
        !matches!(
            self.phase,
            Phase::Hunt { .. } | Phase::CrcLow | Phase::CrcHigh { .. }
        )
    }

    fn step(&mut self, byte: u8, sink: &mut ListSink<'_>) -> DecoderState {
        match self.phase {
            Phase::Hunt { escapes } => {
                if byte != SML_ESCAPE {
                    self.phase = Phase::Hunt { escapes: 0 };
                    return DecoderState::Idle;
                }
                let escapes = escapes + 1;
                if escapes as usize == SML_START_MARKER.len() {
                    self.begin_message(&SML_START_MARKER, Phase::StartEscape)
                } else {
                    self.phase = Phase::Hunt { escapes };
                    DecoderState::Idle
                }
            }
            Phase::StartEscape => {
                if byte == SML_ESCAPE {
                    self.phase = Phase::Version {
                        remaining: SML_VERSION_LEN,
                    };
                    DecoderState::Body
                } else {
                    self.unexpected(byte)
                }
            }
            Phase::Version { remaining } => {
                if byte == SML_ESCAPE && remaining == SML_VERSION_LEN {
                    // the last four escapes open the message
                    return self.begin_message(
                        &START_ESCAPE,
                        Phase::Version {
                            remaining: SML_VERSION_LEN,
                        },
                    );
                }
                if byte != SML_VERSION_1 {
                    return self.unexpected(byte);
                }
                self.phase = match remaining - 1 {
                    0 => Phase::TypeLength,
                    remaining => Phase::Version { remaining },
                };
                DecoderState::Body
            }
            Phase::TypeLength => self.type_length(byte, sink),
            Phase::MoreLength {
                kind,
                length,
                tl_bytes,
            } => {
                if byte & SML_TL_TYPE_MASK != 0 || tl_bytes >= MAX_TL_BYTES {
                    return self.unexpected(byte);
                }
                let length = (length << 4) | (byte & SML_TL_LENGTH_MASK) as usize;
                let tl_bytes = tl_bytes + 1;
                if byte & SML_TL_MORE != 0 {
                    self.phase = Phase::MoreLength {
                        kind,
                        length,
                        tl_bytes,
                    };
                    DecoderState::Body
                } else {
                    self.begin_element(byte, kind, length, tl_bytes, sink)
                }
            }
            Phase::Data { remaining } => self.data(byte, remaining, sink),
            Phase::Stuffing { skip, resume } => {
                if byte == SML_ESCAPE {
                    if skip == 1 {
                        self.escape_run = 0;
                    }
                    self.phase = match skip - 1 {
                        0 if resume > 0 => Phase::Data { remaining: resume },
                        0 => Phase::TypeLength,
                        skip => Phase::Stuffing { skip, resume },
                    };
                    DecoderState::Body
                } else {
                    self.unexpected(byte)
                }
            }
            Phase::BodyEscape { escapes } => {
                if escapes < SML_ESCAPE_LEN {
                    if byte != SML_ESCAPE {
                        return self.unexpected(byte);
                    }
                    self.phase = Phase::BodyEscape {
                        escapes: escapes + 1,
                    };
                    return self.escape_state();
                }
                match byte {
                    SML_END_MARK if self.depth == 0 => {
                        self.phase = Phase::Padding;
                        DecoderState::Checksum
                    }
                    SML_VERSION_1 => self.resync(),
                    _ => self.unexpected(byte),
                }
            }
            Phase::Padding => {
                if byte > SML_MAX_PADDING {
                    return self.unexpected(byte);
                }
                self.calculated_crc = self.digest.take().map_or(0, |d| d.finalize());
                self.phase = Phase::CrcLow;
                DecoderState::Checksum
            }
            Phase::CrcLow => {
                self.phase = Phase::CrcHigh { low: byte };
                DecoderState::Checksum
            }
            Phase::CrcHigh { low } => {
                let check = ChecksumCheck {
                    received: u16::from_le_bytes([low, byte]),
                    calculated: self.calculated_crc,
                };
                crate::util::logging::debug::log_crc_result(
                    check.received,
                    check.calculated,
                    check.is_valid(),
                );
                self.last_checksum = Some(check);
                self.clear_structure();
                self.phase = Phase::Hunt {
                    escapes: self.hunt_carry(),
                };
                if check.is_valid() {
                    DecoderState::Complete
                } else {
                    DecoderState::ChecksumError
                }
            }
        }
    }

    fn escape_state(&self) -> DecoderState {
        if self.depth == 0 {
            DecoderState::Checksum
        } else {
            DecoderState::Body
        }
    }

    fn type_length(&mut self, byte: u8, sink: &mut ListSink<'_>) -> DecoderState {
        if byte == SML_ESCAPE {
            self.phase = Phase::BodyEscape { escapes: 1 };
            return self.escape_state();
        }
        if byte == SML_END_OF_MESSAGE {
            if self.depth == 0 {
                // fill byte between messages
                return DecoderState::Body;
            }
            self.current = FieldRef {
                kind: ElementKind::EndOfMessage,
                start: self.arena_len as u16,
                ..FieldRef::default()
            };
            return self.finish_leaf(sink);
        }

        let kind = byte & SML_TL_TYPE_MASK;
        if self.depth == 0 && kind != SML_TYPE_LIST {
            return self.unexpected(byte);
        }
        let length = (byte & SML_TL_LENGTH_MASK) as usize;
        if byte & SML_TL_MORE != 0 {
            self.phase = Phase::MoreLength {
                kind,
                length,
                tl_bytes: 1,
            };
            return DecoderState::Body;
        }
        self.begin_element(byte, kind, length, 1, sink)
    }

    fn begin_element(
        &mut self,
        byte: u8,
        kind: u8,
        length: usize,
        tl_bytes: usize,
        sink: &mut ListSink<'_>,
    ) -> DecoderState {
        let kind = match kind {
            SML_TYPE_LIST => return self.begin_list(byte, length, sink),
            SML_TYPE_OCTET_STRING => ElementKind::OctetString,
            SML_TYPE_BOOLEAN => ElementKind::Boolean,
            SML_TYPE_INTEGER => ElementKind::Integer,
            SML_TYPE_UNSIGNED => ElementKind::Unsigned,
            _ => return self.unexpected(byte),
        };
        let Some(data_len) = length.checked_sub(tl_bytes) else {
            return self.unexpected(byte);
        };
        let valid = match kind {
            ElementKind::Boolean => data_len == 1,
            ElementKind::Integer | ElementKind::Unsigned => (1..=8).contains(&data_len),
            _ => true,
        };
        if !valid {
            return self.unexpected(byte);
        }

        self.current = FieldRef {
            kind,
            start: self.arena_len as u16,
            len: 0,
            truncated: false,
        };
        self.data_escapes = 0;
        if data_len == 0 {
            self.phase = Phase::TypeLength;
            self.finish_leaf(sink)
        } else {
            self.phase = Phase::Data {
                remaining: data_len,
            };
            DecoderState::Body
        }
    }

    fn begin_list(&mut self, byte: u8, count: usize, sink: &mut ListSink<'_>) -> DecoderState {
        self.phase = Phase::TypeLength;
        if count == 0 {
            self.current = FieldRef {
                kind: ElementKind::List(0),
                start: self.arena_len as u16,
                ..FieldRef::default()
            };
            return self.finish_leaf(sink);
        }
        if self.depth == SML_MAX_DEPTH {
            return self.unexpected(byte);
        }
        self.frames[self.depth] = ListFrame {
            remaining: count,
            count,
            field_start: self.field_len,
            arena_start: self.arena_len,
            overflow: false,
        };
        self.depth += 1;
        DecoderState::Body
    }

    fn data(&mut self, byte: u8, remaining: usize, sink: &mut ListSink<'_>) -> DecoderState {
        if self.arena_len < SML_RECORD_ARENA && !self.current.truncated {
            self.arena[self.arena_len] = byte;
            self.arena_len += 1;
            self.current.len += 1;
        } else {
            self.current.truncated = true;
        }

        self.data_escapes = if byte == SML_ESCAPE {
            self.data_escapes + 1
        } else {
            0
        };
        let stuffed = self.data_escapes == SML_ESCAPE_LEN;
        if stuffed {
            self.data_escapes = 0;
        }

        let remaining = remaining - 1;
        let state = if remaining == 0 {
            self.phase = Phase::TypeLength;
            self.finish_leaf(sink)
        } else {
            self.phase = Phase::Data { remaining };
            DecoderState::Body
        };

        if stuffed && self.in_message() {
            self.phase = Phase::Stuffing {
                skip: SML_ESCAPE_LEN,
                resume: remaining,
            };
        }
        state
    }

    fn finish_leaf(&mut self, sink: &mut ListSink<'_>) -> DecoderState {
        let leaf = self.current;
        self.push_field(leaf);
        self.element_done(sink)
    }

    fn push_field(&mut self, field: FieldRef) {
        if self.depth == 0 {
            return;
        }
        if self.field_len < SML_RECORD_FIELDS {
            self.fields[self.field_len] = field;
            self.field_len += 1;
        } else {
            self.frames[self.depth - 1].overflow = true;
        }
    }

    /// Counts one finished element against the open lists, closing (and
    /// reporting) every list it completes.
    fn element_done(&mut self, sink: &mut ListSink<'_>) -> DecoderState {
        let mut closed = false;
        while self.depth > 0 {
            let top = self.depth - 1;
            self.frames[top].remaining -= 1;
            if self.frames[top].remaining > 0 {
                break;
            }

            let frame = self.frames[top];
            sink(Record {
                fields: &self.fields[frame.field_start..self.field_len],
                arena: &self.arena[..self.arena_len],
                complete: !frame.overflow,
            });
            closed = true;

            self.field_len = frame.field_start;
            self.arena_len = frame.arena_start;
            self.depth -= 1;
            self.push_field(FieldRef {
                kind: ElementKind::List(frame.count.min(u16::MAX as usize) as u16),
                start: self.arena_len as u16,
                len: 0,
                truncated: frame.overflow,
            });
        }

        if closed {
            DecoderState::ListEnd
        } else {
            DecoderState::Body
        }
    }

    fn begin_message(&mut self, marker: &'static [u8], next: Phase) -> DecoderState {
        self.clear_structure();
        let mut digest = SML_CRC.digest();
        digest.update(marker);
        self.digest = Some(digest);
        self.marker = marker;
        self.phase = next;
        DecoderState::Start
    }

    /// A start escape plus version byte arrived inside a message: the meter
    /// began a new file, the current one is dropped.
    fn resync(&mut self) -> DecoderState {
        log::debug!("start escape inside message, re-synchronizing");
        self.begin_message(
            &RESYNC_MARKER,
            Phase::Version {
                remaining: SML_VERSION_LEN - 1,
            },
        )
    }

    fn unexpected(&mut self, byte: u8) -> DecoderState {
        self.clear_structure();
        self.digest = None;
        self.phase = Phase::Hunt {
            escapes: if byte == SML_ESCAPE { self.hunt_carry() } else { 0 },
        };
        DecoderState::Unexpected
    }

    fn clear_structure(&mut self) {
        self.depth = 0;
        self.field_len = 0;
        self.arena_len = 0;
        self.data_escapes = 0;
        self.current = FieldRef::default();
    }
}
