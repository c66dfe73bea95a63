//! Uplink payload: one register value as fixed-width ASCII.

use crate::constants::{PAYLOAD_LEN, PAYLOAD_VALUE_PRECISION, PAYLOAD_VALUE_WIDTH};
use std::fmt;

/// 20-byte payload holding the value right-aligned in 10 columns with three
/// decimals (`"    12.345"`), NUL padded
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Payload([u8; PAYLOAD_LEN]);

impl Payload {
    /// Values wider than the payload saturate to the widest run of nines
    /// with the same sign.
    pub fn from_value(value: f64) -> Self {
        let mut text = format!(
            "{:>width$.prec$}",
            value,
            width = PAYLOAD_VALUE_WIDTH,
            prec = PAYLOAD_VALUE_PRECISION
        );
        if text.len() > PAYLOAD_LEN {
            log::warn!("value {value} does not fit the {PAYLOAD_LEN}-byte payload, saturating");
            text = saturated(value.is_sign_negative());
        }
        let mut bytes = [0u8; PAYLOAD_LEN];
        bytes[..text.len()].copy_from_slice(text.as_bytes());
        Payload(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; PAYLOAD_LEN] {
        &self.0
    }

    /// Text part without the NUL padding
    pub fn value_str(&self) -> &str {
        let end = self.0.iter().position(|&b| b == 0).unwrap_or(PAYLOAD_LEN);
        std::str::from_utf8(&self.0[..end]).unwrap_or_default()
    }
}

fn saturated(negative: bool) -> String {
    let sign = if negative { "-" } else { "" };
    let digits = PAYLOAD_LEN - PAYLOAD_VALUE_PRECISION - 1 - sign.len();
    format!(
        "{sign}{}.{}",
        "9".repeat(digits),
        "9".repeat(PAYLOAD_VALUE_PRECISION)
    )
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Payload({:?})", self.value_str())
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.value_str())
    }
}
