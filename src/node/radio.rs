//! # LoRaWAN Radio Collaborator
//!
//! The node hands its payload to a LoRaWAN MAC (an LMIC-style stack on the
//! target board) and waits for the MAC's event stream. This module defines
//! that seam: the [`LoRaRadio`] trait, the MAC event set, the session
//! settings, and the activation credentials. [`LoggingRadio`] is the host
//! implementation used by the CLI; it logs every uplink and replays the
//! events a real MAC would raise.

use crate::constants::{DEFAULT_TX_PORT, PAYLOAD_LEN};
use crate::error::NodeError;
use async_trait::async_trait;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;
use zeroize::Zeroize;

bitflags! {
    /// Result flags of the last transmit/receive round
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
    pub struct TxRxFlags: u8 {
        /// Confirmed uplink was acknowledged
        const ACK    = 0x80;
        /// Confirmed uplink was not acknowledged
        const NACK   = 0x40;
        /// Downlink carried no port
        const NOPORT = 0x20;
        /// Downlink carried a port
        const PORT   = 0x10;
        /// Downlink arrived in RX1
        const DNW1   = 0x02;
        /// Downlink arrived in RX2
        const DNW2   = 0x01;
    }
}

/// Events raised by the LoRaWAN MAC
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioEvent {
    ScanTimeout,
    BeaconFound,
    BeaconMissed,
    BeaconTracked,
    Joining,
    Joined,
    JoinFailed,
    RejoinFailed,
    /// Uplink finished, including both receive windows
    TxComplete { flags: TxRxFlags, downlink: Vec<u8> },
    LostTsync,
    Reset,
    RxComplete,
    LinkDead,
    LinkAlive,
}

impl fmt::Display for RadioEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RadioEvent::ScanTimeout => "EV_SCAN_TIMEOUT",
            RadioEvent::BeaconFound => "EV_BEACON_FOUND",
            RadioEvent::BeaconMissed => "EV_BEACON_MISSED",
            RadioEvent::BeaconTracked => "EV_BEACON_TRACKED",
            RadioEvent::Joining => "EV_JOINING",
            RadioEvent::Joined => "EV_JOINED",
            RadioEvent::JoinFailed => "EV_JOIN_FAILED",
            RadioEvent::RejoinFailed => "EV_REJOIN_FAILED",
            RadioEvent::TxComplete { .. } => "EV_TXCOMPLETE",
            RadioEvent::LostTsync => "EV_LOST_TSYNC",
            RadioEvent::Reset => "EV_RESET",
            RadioEvent::RxComplete => "EV_RXCOMPLETE",
            RadioEvent::LinkDead => "EV_LINK_DEAD",
            RadioEvent::LinkAlive => "EV_LINK_ALIVE",
        };
        f.write_str(name)
    }
}

/// LoRa spreading factors usable as EU868 data rates
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SpreadingFactor {
    SF7,
    SF8,
    SF9,
    SF10,
    SF11,
    SF12,
}

impl SpreadingFactor {
    pub fn value(self) -> u32 {
        match self {
            SpreadingFactor::SF7 => 7,
            SpreadingFactor::SF8 => 8,
            SpreadingFactor::SF9 => 9,
            SpreadingFactor::SF10 => 10,
            SpreadingFactor::SF11 => 11,
            SpreadingFactor::SF12 => 12,
        }
    }

    /// Approximate time on air at 125 kHz
    pub fn time_on_air(self, payload_bytes: usize) -> Duration {
        let sf = self.value();
        let symbol_time_ms = (1u32 << sf) as f64 / 125.0;
        // preamble plus header and MAC overhead of 13 bytes
        let symbols = 8.0 + 4.25 + ((payload_bytes + 13) * 8) as f64 / sf as f64;
        Duration::from_micros((symbols * symbol_time_ms * 1000.0) as u64)
    }
}

/// MAC session parameters applied after reset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RadioSettings {
    /// Adaptive data rate
    pub adr: bool,
    /// Data rate of the second receive window (TTN uses SF9)
    pub rx2_spreading_factor: SpreadingFactor,
    /// Delay of the first receive window in seconds
    pub rx_delay_s: u8,
    pub uplink_spreading_factor: SpreadingFactor,
    pub tx_power_dbm: i8,
    /// Widening of the receive windows in percent of the maximum clock error
    pub clock_error_percent: u8,
    pub port: u8,
    pub confirmed: bool,
    /// Link check after join; TTN does not support it
    pub link_check: bool,
}

impl Default for RadioSettings {
    fn default() -> Self {
        Self {
            adr: false,
            rx2_spreading_factor: SpreadingFactor::SF9,
            rx_delay_s: 5,
            uplink_spreading_factor: SpreadingFactor::SF12,
            tx_power_dbm: 14,
            clock_error_percent: 25,
            port: DEFAULT_TX_PORT,
            confirmed: false,
            link_check: false,
        }
    }
}

impl RadioSettings {
    pub fn validate(&self) -> Result<(), NodeError> {
        if self.port == 0 || self.port > 223 {
            return Err(NodeError::ConfigError(format!(
                "LoRaWAN application port {} out of range 1..=223",
                self.port
            )));
        }
        if self.clock_error_percent > 100 {
            return Err(NodeError::ConfigError(format!(
                "clock error {}% above 100%",
                self.clock_error_percent
            )));
        }
        Ok(())
    }
}

/// Network activation credentials, wiped from memory on drop
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// Over-the-air activation (DevEUI and AppEUI little-endian, AppKey big-endian)
    Otaa {
        dev_eui: [u8; 8],
        app_eui: [u8; 8],
        app_key: [u8; 16],
    },
    /// Activation by personalization
    Abp {
        net_id: u32,
        dev_addr: u32,
        nwk_skey: [u8; 16],
        app_skey: [u8; 16],
    },
}

impl Credentials {
    /// Compiled-in OTAA placeholder; replace before deployment
    pub const fn otaa_placeholder() -> Self {
        Credentials::Otaa {
            dev_eui: [0; 8],
            app_eui: [0; 8],
            app_key: [0; 16],
        }
    }

    /// Compiled-in ABP placeholder; replace before deployment
    pub const fn abp_placeholder() -> Self {
        Credentials::Abp {
            net_id: 0x1,
            dev_addr: 0,
            nwk_skey: [0; 16],
            app_skey: [0; 16],
        }
    }

    /// True when the MAC has to join before the first uplink
    pub fn requires_join(&self) -> bool {
        matches!(self, Credentials::Otaa { .. })
    }
}

impl Zeroize for Credentials {
    fn zeroize(&mut self) {
        match self {
            Credentials::Otaa {
                dev_eui,
                app_eui,
                app_key,
            } => {
                dev_eui.zeroize();
                app_eui.zeroize();
                app_key.zeroize();
            }
            Credentials::Abp {
                net_id,
                dev_addr,
                nwk_skey,
                app_skey,
            } => {
                net_id.zeroize();
                dev_addr.zeroize();
                nwk_skey.zeroize();
                app_skey.zeroize();
            }
        }
    }
}

impl Drop for Credentials {
    fn drop(&mut self) {
        self.zeroize();
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Otaa { dev_eui, .. } => f
                .debug_struct("Otaa")
                .field("dev_eui", &hex::encode(dev_eui))
                .field("app_eui", &"<redacted>")
                .field("app_key", &"<redacted>")
                .finish(),
            Credentials::Abp { dev_addr, .. } => f
                .debug_struct("Abp")
                .field("dev_addr", &format!("{dev_addr:08X}"))
                .field("nwk_skey", &"<redacted>")
                .field("app_skey", &"<redacted>")
                .finish(),
        }
    }
}

/// LoRaWAN MAC as seen by the duty cycle
#[async_trait]
pub trait LoRaRadio: Send {
    /// Bring up the radio and the MAC runtime
    async fn initialize(&mut self) -> Result<(), NodeError>;

    /// Reset the MAC; session and pending transfers are discarded
    async fn reset_mac(&mut self) -> Result<(), NodeError>;

    async fn configure_session(
        &mut self,
        settings: &RadioSettings,
        credentials: &Credentials,
    ) -> Result<(), NodeError>;

    /// A transmit/receive round is still pending
    fn is_busy(&self) -> bool;

    /// Queue an uplink; completion is reported as [`RadioEvent::TxComplete`]
    async fn send(&mut self, port: u8, payload: &[u8], confirmed: bool) -> Result<(), NodeError>;

    /// Wait for the next MAC event
    async fn next_event(&mut self) -> RadioEvent;

    fn set_link_check(&mut self, enabled: bool);
}

/// Host radio that logs uplinks and replays the MAC's events
#[derive(Debug)]
pub struct LoggingRadio {
    events: VecDeque<RadioEvent>,
    joined: bool,
    requires_join: bool,
    link_check: bool,
    spreading_factor: SpreadingFactor,
    simulate_airtime: bool,
    pending_airtime: Duration,
    uplinks: Vec<Vec<u8>>,
}

impl Default for LoggingRadio {
    fn default() -> Self {
        Self::new()
    }
}

impl LoggingRadio {
    pub fn new() -> Self {
        Self {
            events: VecDeque::new(),
            joined: false,
            requires_join: false,
            link_check: true,
            spreading_factor: SpreadingFactor::SF12,
            simulate_airtime: true,
            pending_airtime: Duration::ZERO,
            uplinks: Vec::new(),
        }
    }

    /// Complete uplinks immediately instead of waiting for the time on air
    pub fn without_airtime(mut self) -> Self {
        self.simulate_airtime = false;
        self
    }

    /// Uplinks sent so far
    pub fn uplinks(&self) -> &[Vec<u8>] {
        &self.uplinks
    }

    pub fn link_check(&self) -> bool {
        self.link_check
    }
}

#[async_trait]
impl LoRaRadio for LoggingRadio {
    async fn initialize(&mut self) -> Result<(), NodeError> {
        log::info!("Radio initialized (host simulation)");
        Ok(())
    }

    async fn reset_mac(&mut self) -> Result<(), NodeError> {
        self.events.clear();
        self.joined = false;
        self.link_check = true;
        self.events.push_back(RadioEvent::Reset);
        Ok(())
    }

    async fn configure_session(
        &mut self,
        settings: &RadioSettings,
        credentials: &Credentials,
    ) -> Result<(), NodeError> {
        settings.validate()?;
        self.spreading_factor = settings.uplink_spreading_factor;
        self.requires_join = credentials.requires_join();
        self.joined = !self.requires_join;
        log::info!(
            "Session configured: {:?}, uplink {:?} at {} dBm, RX2 {:?}, RX delay {} s, ADR {}",
            credentials,
            settings.uplink_spreading_factor,
            settings.tx_power_dbm,
            settings.rx2_spreading_factor,
            settings.rx_delay_s,
            if settings.adr { "on" } else { "off" }
        );
        Ok(())
    }

    fn is_busy(&self) -> bool {
        self.events
            .iter()
            .any(|e| matches!(e, RadioEvent::TxComplete { .. }))
    }

    async fn send(&mut self, port: u8, payload: &[u8], confirmed: bool) -> Result<(), NodeError> {
        if payload.len() > PAYLOAD_LEN * 4 {
            return Err(NodeError::RadioError(format!(
                "payload of {} bytes too large",
                payload.len()
            )));
        }
        if !self.joined {
            self.events.push_back(RadioEvent::Joining);
            self.events.push_back(RadioEvent::Joined);
            self.joined = true;
        }

        log::info!(
            "Uplink port {port}{}: {}",
            if confirmed { " (confirmed)" } else { "" },
            crate::util::hex::format_hex_compact(payload)
        );
        self.uplinks.push(payload.to_vec());
        self.pending_airtime = self.spreading_factor.time_on_air(payload.len());
        let flags = if confirmed {
            TxRxFlags::ACK
        } else {
            TxRxFlags::empty()
        };
        self.events.push_back(RadioEvent::TxComplete {
            flags,
            downlink: Vec::new(),
        });
        Ok(())
    }

    async fn next_event(&mut self) -> RadioEvent {
        match self.events.pop_front() {
            Some(event @ RadioEvent::TxComplete { .. }) => {
                if self.simulate_airtime {
                    tokio::time::sleep(self.pending_airtime).await;
                }
                event
            }
            Some(event) => event,
            None => std::future::pending::<RadioEvent>().await,
        }
    }

    fn set_link_check(&mut self, enabled: bool) {
        self.link_check = enabled;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_debug_is_redacted() {
        let creds = Credentials::Otaa {
            dev_eui: [1; 8],
            app_eui: [2; 8],
            app_key: [0xAB; 16],
        };
        let text = format!("{creds:?}");
        assert!(text.contains("redacted"));
        assert!(!text.contains("abab"));
        assert!(!text.contains("171"));
    }

    #[test]
    fn test_credentials_zeroize() {
        let mut creds = Credentials::Abp {
            net_id: 1,
            dev_addr: 0x2601_1234,
            nwk_skey: [7; 16],
            app_skey: [9; 16],
        };
        creds.zeroize();
        assert_eq!(
            creds,
            Credentials::Abp {
                net_id: 0,
                dev_addr: 0,
                nwk_skey: [0; 16],
                app_skey: [0; 16],
            }
        );
    }

    #[test]
    fn test_time_on_air_grows_with_sf() {
        assert!(SpreadingFactor::SF12.time_on_air(20) > SpreadingFactor::SF7.time_on_air(20));
        assert!(SpreadingFactor::SF12.time_on_air(20) > Duration::from_millis(900));
    }

    #[test]
    fn test_settings_validation() {
        assert!(RadioSettings::default().validate().is_ok());
        let bad = RadioSettings {
            port: 0,
            ..RadioSettings::default()
        };
        assert!(matches!(bad.validate(), Err(NodeError::ConfigError(_))));
    }

    #[tokio::test]
    async fn test_logging_radio_otaa_flow() {
        let mut radio = LoggingRadio::new().without_airtime();
        radio.initialize().await.unwrap();
        radio.reset_mac().await.unwrap();
        assert_eq!(radio.next_event().await, RadioEvent::Reset);
        radio
            .configure_session(&RadioSettings::default(), &Credentials::otaa_placeholder())
            .await
            .unwrap();

        radio.send(1, b"    12.345", false).await.unwrap();
        assert!(radio.is_busy());
        assert_eq!(radio.next_event().await, RadioEvent::Joining);
        assert_eq!(radio.next_event().await, RadioEvent::Joined);
        assert!(matches!(
            radio.next_event().await,
            RadioEvent::TxComplete { .. }
        ));
        assert!(!radio.is_busy());
        assert_eq!(radio.uplinks().len(), 1);
    }
}
