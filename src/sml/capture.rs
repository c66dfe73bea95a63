//! # Capture Buffer
//!
//! Bounded byte store holding the raw bytes of the message in progress, from
//! the start marker to the trailer. It is only read for diagnostics, so
//! running out of room never affects decoding: the overflowing byte is
//! dropped, one warning is logged and the buffer stays suspended until the
//! next message start.

use crate::constants::DEFAULT_CAPTURE_CAPACITY;
use bytes::BytesMut;
use thiserror::Error;

/// Errors returned by [`CaptureBuffer::append`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("capture buffer full ({capacity} bytes), byte dropped")]
    Overflow { capacity: usize },

    #[error("capture suspended until the next message start")]
    Suspended,
}

#[derive(Debug, Clone)]
pub struct CaptureBuffer {
    data: BytesMut,
    capacity: usize,
    suspended: bool,
}

impl Default for CaptureBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPTURE_CAPACITY)
    }
}

impl CaptureBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            data: BytesMut::with_capacity(capacity),
            capacity,
            suspended: false,
        }
    }

    /// Clears the buffer and seeds it with the start marker bytes
    pub fn reset(&mut self, seed: &[u8]) {
        self.data.clear();
        self.suspended = false;
        let take = seed.len().min(self.capacity);
        self.data.extend_from_slice(&seed[..take]);
    }

    /// Appends one byte.
    ///
    /// The first rejected byte reports `Overflow`; later bytes of the same
    /// message report `Suspended`.
    pub fn append(&mut self, byte: u8) -> Result<(), CaptureError> {
        if self.suspended {
            return Err(CaptureError::Suspended);
        }
        if self.data.len() >= self.capacity {
            self.suspended = true;
            log::warn!(
                "Capture buffer overflow at {} bytes, capture suspended until next start",
                self.capacity
            );
            return Err(CaptureError::Overflow {
                capacity: self.capacity,
            });
        }
        self.data.extend_from_slice(&[byte]);
        Ok(())
    }

    pub fn snapshot(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }
}
