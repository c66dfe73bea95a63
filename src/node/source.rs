//! # Meter Sources
//!
//! Byte sources feeding the decoder. The node only asks two things of the
//! meter line: how many bytes are waiting, and the next byte.
//!
//! - [`SerialMeterSource`]: the optical reading head on a serial port
//! - [`ReplaySource`]: bytes captured earlier, released in bursts
//! - [`SimulatedMeter`]: a meter pushing a fresh SML file at a fixed interval

use crate::constants::{OBIS_ACTIVE_POWER, OBIS_ENERGY_IMPORT_T1, OBIS_ENERGY_IMPORT_TOTAL};
use crate::error::NodeError;
use crate::sml::builder::{ListEntry, SmlFileBuilder};
use crate::sml::obis::ObisCode;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::time::Instant;
use tokio_serial::{SerialPort, SerialPortBuilderExt};

#[async_trait]
pub trait MeterSource: Send {
    /// Bytes that can be read without waiting
    async fn available(&mut self) -> Result<usize, NodeError>;

    /// Next byte, `None` when nothing is waiting
    async fn read_byte(&mut self) -> Result<Option<u8>, NodeError>;
}

/// Serial line settings of the reading head
#[derive(Debug, Clone)]
pub struct SerialConfig {
    pub baudrate: u32,
    pub timeout: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        SerialConfig {
            baudrate: crate::constants::DEFAULT_BAUD_RATE,
            timeout: Duration::from_millis(200),
        }
    }
}

/// Optical reading head on a serial port (8N1)
pub struct SerialMeterSource {
    port: tokio_serial::SerialStream,
    config: SerialConfig,
    pending: VecDeque<u8>,
}

impl SerialMeterSource {
    pub fn open(port_name: &str, config: SerialConfig) -> Result<Self, NodeError> {
        let port = tokio_serial::new(port_name, config.baudrate)
            .data_bits(tokio_serial::DataBits::Eight)
            .stop_bits(tokio_serial::StopBits::One)
            .parity(tokio_serial::Parity::None)
            .timeout(config.timeout)
            .open_native_async()
            .map_err(|e| NodeError::SerialPortError(e.to_string()))?;

        log::info!("Opened {port_name} at {} baud", config.baudrate);
        Ok(Self {
            port,
            config,
            pending: VecDeque::new(),
        })
    }

    async fn fill(&mut self) -> Result<(), NodeError> {
        let waiting = self
            .port
            .bytes_to_read()
            .map_err(|e| NodeError::SerialPortError(e.to_string()))? as usize;
        if waiting == 0 {
            return Ok(());
        }

        let mut buf = vec![0u8; waiting.min(256)];
        let n = tokio::time::timeout(self.config.timeout, self.port.read(&mut buf))
            .await
            .map_err(|_| NodeError::SerialPortError("read timeout".into()))?
            .map_err(|e| NodeError::SerialPortError(e.to_string()))?;
        self.pending.extend(&buf[..n]);
        Ok(())
    }
}

#[async_trait]
impl MeterSource for SerialMeterSource {
    async fn available(&mut self) -> Result<usize, NodeError> {
        if self.pending.is_empty() {
            self.fill().await?;
        }
        Ok(self.pending.len())
    }

    async fn read_byte(&mut self) -> Result<Option<u8>, NodeError> {
        if self.pending.is_empty() {
            self.fill().await?;
        }
        Ok(self.pending.pop_front())
    }
}

/// Captured bytes, released one burst at a time.
///
/// Each burst becomes available only after the previous one was drained and
/// one poll saw the line idle, the way a meter pauses between files.
#[derive(Debug, Clone, Default)]
pub struct ReplaySource {
    bursts: VecDeque<Vec<u8>>,
    current: VecDeque<u8>,
    idle_pending: bool,
    repeat: bool,
    played: Vec<Vec<u8>>,
}

impl ReplaySource {
    pub fn new(data: Vec<u8>) -> Self {
        Self::from_bursts(vec![data])
    }

    pub fn from_bursts(bursts: Vec<Vec<u8>>) -> Self {
        Self {
            bursts: bursts.into_iter().filter(|b| !b.is_empty()).collect(),
            ..Self::default()
        }
    }

    /// Start over with the first burst once all were played
    pub fn repeating(mut self) -> Self {
        self.repeat = true;
        self
    }

    /// Bursts not yet released
    pub fn remaining_bursts(&self) -> usize {
        self.bursts.len()
    }

    fn next_burst(&mut self) {
        if self.bursts.is_empty() && self.repeat {
            self.bursts = std::mem::take(&mut self.played).into();
        }
        if let Some(burst) = self.bursts.pop_front() {
            self.current.extend(&burst);
            self.played.push(burst);
        }
    }
}

#[async_trait]
impl MeterSource for ReplaySource {
    async fn available(&mut self) -> Result<usize, NodeError> {
        if self.current.is_empty() {
            if self.idle_pending {
                self.idle_pending = false;
                return Ok(0);
            }
            self.next_burst();
        }
        Ok(self.current.len())
    }

    async fn read_byte(&mut self) -> Result<Option<u8>, NodeError> {
        let byte = self.current.pop_front();
        if byte.is_some() && self.current.is_empty() {
            self.idle_pending = true;
        }
        Ok(byte)
    }
}

/// Meter pushing an SML file every `interval` with a rising energy register
#[derive(Debug)]
pub struct SimulatedMeter {
    interval: Duration,
    next_push: Instant,
    energy_raw: i64,
    increment: i64,
    power_raw: i64,
    seconds_index: u32,
    pending: VecDeque<u8>,
    files: u64,
}

impl SimulatedMeter {
    /// Energy register in 0.1 Wh steps, starting at `initial_wh`
    pub fn new(interval: Duration, initial_wh: f64) -> Self {
        Self {
            interval,
            next_push: Instant::now(),
            energy_raw: (initial_wh * 10.0).round() as i64,
            increment: 417,
            power_raw: 500,
            seconds_index: 0,
            pending: VecDeque::new(),
            files: 0,
        }
    }

    /// Files pushed so far
    pub fn files(&self) -> u64 {
        self.files
    }

    /// Value of the tariff 1 register in the last pushed file
    pub fn last_energy_wh(&self) -> f64 {
        (self.energy_raw - self.increment) as f64 / 10.0
    }

    fn push_file(&mut self) {
        let entries = [
            ListEntry::watt_hours(ObisCode::new(OBIS_ENERGY_IMPORT_TOTAL), self.energy_raw, -1)
                .with_status(0x0001_0282),
            ListEntry::watt_hours(ObisCode::new(OBIS_ENERGY_IMPORT_T1), self.energy_raw, -1),
            ListEntry::watts(ObisCode::new(OBIS_ACTIVE_POWER), self.power_raw, 0),
        ];
        let file = SmlFileBuilder::meter_reading(b"\x0ASIM", Some(self.seconds_index), &entries);
        log::trace!("simulated meter pushes {} bytes", file.len());
        self.pending.extend(file);

        self.files += 1;
        self.energy_raw += self.increment;
        self.power_raw = 400 + (self.files as i64 * 37) % 300;
        self.seconds_index = self
            .seconds_index
            .wrapping_add(self.interval.as_secs().max(1) as u32);
    }
}

#[async_trait]
impl MeterSource for SimulatedMeter {
    async fn available(&mut self) -> Result<usize, NodeError> {
        if self.pending.is_empty() && Instant::now() >= self.next_push {
            self.push_file();
            self.next_push = Instant::now() + self.interval;
        }
        Ok(self.pending.len())
    }

    async fn read_byte(&mut self) -> Result<Option<u8>, NodeError> {
        Ok(self.pending.pop_front())
    }
}
