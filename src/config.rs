//! # Node Configuration
//!
//! Runtime settings of the meter node. Every field has a compile-time default
//! from [`crate::constants`], so a configuration file only needs the values
//! that differ:
//!
//! ```json
//! {
//!   "serial_port": "/dev/ttyUSB0",
//!   "sleep_interval_ms": 60000,
//!   "fields": [
//!     { "obis": "1-0:1.8.0*255", "slot": 0, "label": "Power Sum", "extraction": "watt_hours" }
//!   ]
//! }
//! ```

use crate::constants::{
    DEFAULT_BAUD_RATE, DEFAULT_CAPTURE_CAPACITY, DEFAULT_POLL_INTERVAL_MS,
    DEFAULT_READ_TIMEOUT_MS, DEFAULT_SETTLE_DELAY_MS, DEFAULT_SIGNAL_PULSE_MS,
    DEFAULT_SLEEP_INTERVAL_MS, DEFAULT_TX_TIMEOUT_MS, MAX_SLOTS,
};
use crate::error::NodeError;
use crate::node::radio::RadioSettings;
use crate::sml::extractor::{FieldSpec, FieldTable};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Serial device of the optical reading head
    pub serial_port: Option<String>,
    pub baud_rate: u32,
    pub sleep_interval_ms: u64,
    /// Total wait for the first meter byte of a cycle
    pub read_timeout_ms: u64,
    pub poll_interval_ms: u64,
    /// Keep draining while the next byte arrives within this gap; 0 stops at
    /// the first empty poll
    pub drain_idle_gap_ms: u64,
    /// Upper bound on the wait for the radio to finish an uplink
    pub tx_timeout_ms: u64,
    /// Pause between low power setup and deep sleep
    pub settle_delay_ms: u64,
    pub signal_pulse_ms: u64,
    pub capture_capacity: usize,
    /// Registers to extract; empty means the default table
    pub fields: Vec<FieldSpec>,
    /// Slot whose value is transmitted
    pub payload_slot: usize,
    pub radio: RadioSettings,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            serial_port: None,
            baud_rate: DEFAULT_BAUD_RATE,
            sleep_interval_ms: DEFAULT_SLEEP_INTERVAL_MS,
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            drain_idle_gap_ms: 0,
            tx_timeout_ms: DEFAULT_TX_TIMEOUT_MS,
            settle_delay_ms: DEFAULT_SETTLE_DELAY_MS,
            signal_pulse_ms: DEFAULT_SIGNAL_PULSE_MS,
            capture_capacity: DEFAULT_CAPTURE_CAPACITY,
            fields: Vec::new(),
            payload_slot: 0,
            radio: RadioSettings::default(),
        }
    }
}

impl NodeConfig {
    pub fn from_json_str(json: &str) -> Result<Self, NodeError> {
        let config: NodeConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, NodeError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        log::debug!("Loaded configuration from {}", path.as_ref().display());
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<(), NodeError> {
        if self.capture_capacity == 0 {
            return Err(NodeError::ConfigError("capture_capacity must be > 0".into()));
        }
        if self.poll_interval_ms == 0 {
            return Err(NodeError::ConfigError("poll_interval_ms must be > 0".into()));
        }
        if self.baud_rate == 0 {
            return Err(NodeError::ConfigError("baud_rate must be > 0".into()));
        }
        if self.payload_slot >= MAX_SLOTS {
            return Err(NodeError::ConfigError(format!(
                "payload_slot {} out of range (max {})",
                self.payload_slot,
                MAX_SLOTS - 1
            )));
        }
        self.radio.validate()?;
        self.field_table().map(|_| ())
    }

    /// Register table built from `fields`, or the default table
    pub fn field_table(&self) -> Result<FieldTable, NodeError> {
        if self.fields.is_empty() {
            Ok(FieldTable::default_table())
        } else {
            FieldTable::new(self.fields.clone())
        }
    }

    /// Number of polls that make up the read timeout
    pub fn poll_budget(&self) -> u64 {
        (self.read_timeout_ms / self.poll_interval_ms.max(1)).max(1)
    }

    pub fn sleep_interval(&self) -> Duration {
        Duration::from_millis(self.sleep_interval_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn drain_idle_gap(&self) -> Duration {
        Duration::from_millis(self.drain_idle_gap_ms)
    }

    pub fn tx_timeout(&self) -> Duration {
        Duration::from_millis(self.tx_timeout_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn signal_pulse(&self) -> Duration {
        Duration::from_millis(self.signal_pulse_ms)
    }
}
