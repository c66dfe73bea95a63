//! # SML File Builder
//!
//! Encodes SML files the way a household meter emits them: an open response,
//! one get-list response carrying the register values, and a close response,
//! wrapped in the version 1 transport with escape stuffing, padding and the
//! trailing CRC. The simulated meter streams these files and the test suites
//! decode them back.
//!
//! ```rust
//! use sml_node::sml::builder::{ListEntry, SmlFileBuilder};
//! use sml_node::sml::obis::ObisCode;
//!
//! let t1: ObisCode = "1-0:1.8.1*255".parse().unwrap();
//! let file = SmlFileBuilder::meter_reading(b"SIM", Some(1), &[ListEntry::watt_hours(t1, 12345, -3)]);
//! assert_eq!(&file[..8], &[0x1B, 0x1B, 0x1B, 0x1B, 0x01, 0x01, 0x01, 0x01]);
//! ```

use crate::constants::{
    SML_END_MARK, SML_ENTRY_LEN, SML_END_OF_MESSAGE, SML_ESCAPE, SML_ESCAPE_LEN, SML_TYPE_INTEGER, SML_TYPE_LIST,
    SML_TYPE_OCTET_STRING, SML_TYPE_UNSIGNED, SML_UNIT_WATT, SML_UNIT_WATT_HOUR, SML_VERSION_1,
    SML_VERSION_LEN,
};
use crate::sml::decoder::SML_CRC;
use crate::sml::obis::ObisCode;

const TAG_OPEN_RESPONSE: u32 = 0x0000_0101;
const TAG_CLOSE_RESPONSE: u32 = 0x0000_0201;
const TAG_GET_LIST_RESPONSE: u32 = 0x0000_0701;

/// Choice tag of `SML_Time` for a seconds index
const TIME_SEC_INDEX: u64 = 0x01;

const ABSENT: u8 = 0x01;

/// Value of a list entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmlValue {
    Integer(i64),
    Unsigned(u64),
    Bytes(Vec<u8>),
}

/// One `SML_ListEntry`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    pub obis: ObisCode,
    pub status: Option<u64>,
    pub unit: Option<u8>,
    pub scaler: Option<i8>,
    pub value: SmlValue,
}

impl ListEntry {
    pub fn new(obis: ObisCode, value: SmlValue) -> Self {
        Self {
            obis,
            status: None,
            unit: None,
            scaler: None,
            value,
        }
    }

    /// Energy register in Wh
    pub fn watt_hours(obis: ObisCode, raw: i64, scaler: i8) -> Self {
        Self::new(obis, SmlValue::Integer(raw))
            .with_unit(SML_UNIT_WATT_HOUR)
            .with_scaler(scaler)
    }

    /// Power register in W
    pub fn watts(obis: ObisCode, raw: i64, scaler: i8) -> Self {
        Self::new(obis, SmlValue::Integer(raw))
            .with_unit(SML_UNIT_WATT)
            .with_scaler(scaler)
    }

    pub fn with_status(mut self, status: u64) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_unit(mut self, unit: u8) -> Self {
        self.unit = Some(unit);
        self
    }

    pub fn with_scaler(mut self, scaler: i8) -> Self {
        self.scaler = Some(scaler);
        self
    }

    fn encode(&self, out: &mut Vec<u8>) {
        push_list(out, SML_ENTRY_LEN);
        push_octets(out, self.obis.as_bytes());
        match self.status {
            Some(status) => push_unsigned(out, status),
            None => out.push(ABSENT),
        }
        // valTime
        out.push(ABSENT);
        match self.unit {
            Some(unit) => push_unsigned(out, unit as u64),
            None => out.push(ABSENT),
        }
        match self.scaler {
            Some(scaler) => push_integer(out, scaler as i64),
            None => out.push(ABSENT),
        }
        match &self.value {
            SmlValue::Integer(v) => push_integer(out, *v),
            SmlValue::Unsigned(v) => push_unsigned(out, *v),
            SmlValue::Bytes(b) => push_octets(out, b),
        }
        // valueSignature
        out.push(ABSENT);
    }
}

/// Builder for complete SML files
#[derive(Debug, Clone, Default)]
pub struct SmlFileBuilder {
    messages: Vec<u8>,
    transaction: u8,
}

impl SmlFileBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_response(mut self, server_id: &[u8]) -> Self {
        let mut body = Vec::new();
        push_list(&mut body, 6);
        // codepage, clientId
        body.extend_from_slice(&[ABSENT, ABSENT]);
        push_octets(&mut body, &[b'F', self.transaction]);
        push_octets(&mut body, server_id);
        // refTime, smlVersion
        body.extend_from_slice(&[ABSENT, ABSENT]);
        self.push_message(TAG_OPEN_RESPONSE, &body);
        self
    }

    pub fn get_list_response(
        mut self,
        server_id: &[u8],
        sensor_time: Option<u32>,
        entries: &[ListEntry],
    ) -> Self {
        let mut body = Vec::new();
        push_list(&mut body, 7);
        // clientId
        body.push(ABSENT);
        push_octets(&mut body, server_id);
        // listName
        body.push(ABSENT);
        match sensor_time {
            Some(seconds) => {
                push_list(&mut body, 2);
                push_unsigned(&mut body, TIME_SEC_INDEX);
                push_unsigned_width(&mut body, seconds as u64, 4);
            }
            None => body.push(ABSENT),
        }
        push_list(&mut body, entries.len());
        for entry in entries {
            entry.encode(&mut body);
        }
        // listSignature, actGatewayTime
        body.extend_from_slice(&[ABSENT, ABSENT]);
        self.push_message(TAG_GET_LIST_RESPONSE, &body);
        self
    }

    pub fn close_response(mut self) -> Self {
        let mut body = Vec::new();
        push_list(&mut body, 1);
        // globalSignature
        body.push(ABSENT);
        self.push_message(TAG_CLOSE_RESPONSE, &body);
        self
    }

    /// Wraps the messages in the transport: start sequence, stuffed body,
    /// padding, end sequence and CRC (low byte first)
    pub fn build(&self) -> Vec<u8> {
        let mut file = Vec::with_capacity(self.messages.len() + 24);
        file.extend_from_slice(&[SML_ESCAPE; SML_ESCAPE_LEN as usize]);
        file.extend_from_slice(&[SML_VERSION_1; SML_VERSION_LEN as usize]);

        let mut run = 0;
        for &byte in &self.messages {
            file.push(byte);
            run = if byte == SML_ESCAPE { run + 1 } else { 0 };
            if run == SML_ESCAPE_LEN {
                file.extend_from_slice(&[SML_ESCAPE; SML_ESCAPE_LEN as usize]);
                run = 0;
            }
        }

        let padding = (4 - file.len() % 4) % 4;
        file.resize(file.len() + padding, SML_END_OF_MESSAGE);
        file.extend_from_slice(&[SML_ESCAPE; SML_ESCAPE_LEN as usize]);
        file.push(SML_END_MARK);
        file.push(padding as u8);

        let crc = SML_CRC.checksum(&file);
        file.extend_from_slice(&crc.to_le_bytes());
        file
    }

    /// A complete meter file: open, one list of `entries`, close
    pub fn meter_reading(server_id: &[u8], sensor_time: Option<u32>, entries: &[ListEntry]) -> Vec<u8> {
        Self::new()
            .open_response(server_id)
            .get_list_response(server_id, sensor_time, entries)
            .close_response()
            .build()
    }

    fn push_message(&mut self, tag: u32, body: &[u8]) {
        let mut message = Vec::with_capacity(body.len() + 16);
        push_list(&mut message, 6);
        push_octets(&mut message, &[self.transaction]);
        // groupNo, abortOnError
        push_unsigned(&mut message, 0);
        push_unsigned(&mut message, 0);
        push_list(&mut message, 2);
        push_unsigned_width(&mut message, tag as u64, 4);
        message.extend_from_slice(body);
        let crc = SML_CRC.checksum(&message);
        push_unsigned_width(&mut message, crc as u64, 2);
        message.push(SML_END_OF_MESSAGE);

        self.messages.extend_from_slice(&message);
        self.transaction = self.transaction.wrapping_add(1);
    }
}

/// Number of TL bytes needed for a length, counting the TL bytes themselves
/// for leaves
fn tl_bytes(length: usize, counts_self: bool) -> usize {
    let mut n = 1;
    loop {
        let total = if counts_self { length + n } else { length };
        if total < 1usize << (4 * n) {
            return n;
        }
        n += 1;
    }
}

fn push_tl(out: &mut Vec<u8>, kind: u8, length: usize, counts_self: bool) {
    let n = tl_bytes(length, counts_self);
    let total = if counts_self { length + n } else { length };
    for i in (0..n).rev() {
        let nibble = ((total >> (4 * i)) & 0x0F) as u8;
        let more = if i > 0 { 0x80 } else { 0x00 };
        let kind = if i == n - 1 { kind } else { 0x00 };
        out.push(more | kind | nibble);
    }
}

fn push_list(out: &mut Vec<u8>, count: usize) {
    push_tl(out, SML_TYPE_LIST, count, false);
}

fn push_octets(out: &mut Vec<u8>, data: &[u8]) {
    push_tl(out, SML_TYPE_OCTET_STRING, data.len(), true);
    out.extend_from_slice(data);
}

fn push_unsigned_width(out: &mut Vec<u8>, value: u64, width: usize) {
    push_tl(out, SML_TYPE_UNSIGNED, width, true);
    out.extend_from_slice(&value.to_be_bytes()[8 - width..]);
}

fn push_unsigned(out: &mut Vec<u8>, value: u64) {
    let width = match value {
        0..=0xFF => 1,
        0x100..=0xFFFF => 2,
        0x1_0000..=0xFFFF_FFFF => 4,
        _ => 8,
    };
    push_unsigned_width(out, value, width);
}

fn push_integer(out: &mut Vec<u8>, value: i64) {
    let width = if i8::try_from(value).is_ok() {
        1
    } else if i16::try_from(value).is_ok() {
        2
    } else if i32::try_from(value).is_ok() {
        4
    } else {
        8
    };
    push_tl(out, SML_TYPE_INTEGER, width, true);
    out.extend_from_slice(&value.to_be_bytes()[8 - width..]);
}
