//! # OBIS Identifiers
//!
//! An OBIS code (IEC 62056-61) names one register of the meter, for example
//! `1-0:1.8.1*255` for the tariff 1 import energy. On the wire it is the
//! 6-byte `objName` octet string of an SML list entry.

use crate::constants::OBIS_LEN;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised while parsing the textual form of an OBIS code
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ObisParseError {
    #[error("expected A-B:C.D.E[*F] or 12 hex digits, got {0:?}")]
    Malformed(String),

    #[error("group value {0:?} is not a number in 0..=255")]
    InvalidGroup(String),
}

/// A 6-byte OBIS identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObisCode([u8; OBIS_LEN]);

impl ObisCode {
    pub const fn new(bytes: [u8; OBIS_LEN]) -> Self {
        ObisCode(bytes)
    }

    /// Builds a code from an SML `objName`, which must be exactly 6 bytes
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        <[u8; OBIS_LEN]>::try_from(bytes).ok().map(ObisCode)
    }

    pub fn as_bytes(&self) -> &[u8; OBIS_LEN] {
        &self.0
    }

    /// True when `bytes` is this code's wire form
    pub fn matches(&self, bytes: &[u8]) -> bool {
        bytes == self.0
    }
}

impl fmt::Display for ObisCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a}-{b}:{c}.{d}.{e}*{g}")
    }
}

fn group(value: &str) -> Result<u8, ObisParseError> {
    value
        .trim()
        .parse::<u8>()
        .map_err(|_| ObisParseError::InvalidGroup(value.to_string()))
}

impl FromStr for ObisCode {
    type Err = ObisParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let malformed = || ObisParseError::Malformed(s.to_string());

        if s.len() == OBIS_LEN * 2 && s.chars().all(|c| c.is_ascii_hexdigit()) {
            let mut bytes = [0u8; OBIS_LEN];
            hex::decode_to_slice(s, &mut bytes).map_err(|_| malformed())?;
            return Ok(ObisCode(bytes));
        }

        let (medium, rest) = s.split_once('-').ok_or_else(malformed)?;
        let (channel, rest) = rest.split_once(':').ok_or_else(malformed)?;
        let (cde, storage) = match rest.split_once('*') {
            Some((cde, f)) => (cde, group(f)?),
            None => (rest, 0xFF),
        };
        let mut parts = cde.split('.');
        let (Some(c), Some(d), Some(e), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(malformed());
        };

        Ok(ObisCode([
            group(medium)?,
            group(channel)?,
            group(c)?,
            group(d)?,
            group(e)?,
            storage,
        ]))
    }
}

impl TryFrom<String> for ObisCode {
    type Error = ObisParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ObisCode> for String {
    fn from(code: ObisCode) -> Self {
        code.to_string()
    }
}
