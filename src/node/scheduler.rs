//! # Duty Cycle Scheduler
//!
//! Drives the node through its cycle:
//!
//! ```text
//! Idle -> ReadingMeter -> Transmitting -> Sleeping -> Idle
//! ```
//!
//! - **ReadingMeter**: poll the meter line until the first byte arrives or
//!   the poll budget runs out, then feed every available byte to the session.
//! - **Transmitting**: format the payload slot, hand it to the radio, pulse
//!   the signal line and wait (bounded) for the MAC to report completion.
//! - **Sleeping**: low power setup, settle delay, deep sleep.
//!
//! Nothing that goes wrong inside a cycle aborts it. Read timeouts, framing
//! and checksum errors, busy or failing radios are logged and end up in the
//! [`CycleReport`]; every cycle transmits (unless the radio is busy) and
//! every cycle sleeps exactly once. The next cycle is the retry.

use crate::config::NodeConfig;
use crate::constants::SLOT_NOT_CAPTURED;
use crate::error::NodeError;
use crate::node::payload::Payload;
use crate::node::power::{PowerControl, WakeReason};
use crate::node::radio::{Credentials, LoRaRadio, RadioEvent, TxRxFlags};
use crate::node::session::{Session, SessionStats};
use crate::node::signal::SignalLine;
use crate::node::source::MeterSource;
use crate::sml::capture::CaptureBuffer;
use crate::util::logging::span_duty_cycle;
use log::{debug, error, info, warn};
use tokio::time::{sleep, timeout, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    Idle,
    ReadingMeter,
    Transmitting,
    Sleeping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// No byte arrived within the poll budget
    TimedOut,
    /// The line was drained after `bytes` bytes
    Drained { bytes: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxOutcome {
    Completed { ack: bool, downlink: Vec<u8> },
    /// A previous uplink was still pending
    SkippedBusy,
    Failed(String),
    TimedOut,
    JoinFailed,
    RejoinFailed,
    LinkDead,
}

impl TxOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, TxOutcome::Completed { .. })
    }
}

/// What happened in one cycle
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub cycle: u64,
    pub read: ReadOutcome,
    /// Session counters accumulated during this cycle
    pub stats: SessionStats,
    pub payload: Payload,
    pub tx: TxOutcome,
    /// `None` when the sleep request itself failed
    pub wake: Option<WakeReason>,
}

pub struct CycleScheduler<S, R, P, L> {
    config: NodeConfig,
    credentials: Credentials,
    source: S,
    radio: R,
    power: P,
    signal: L,
    session: Session,
    phase: CyclePhase,
    cycles: u64,
    sleeps: u64,
}

impl<S, R, P, L> CycleScheduler<S, R, P, L>
where
    S: MeterSource,
    R: LoRaRadio,
    P: PowerControl,
    L: SignalLine,
{
    pub fn new(
        config: NodeConfig,
        credentials: Credentials,
        source: S,
        radio: R,
        power: P,
        signal: L,
    ) -> Result<Self, NodeError> {
        config.validate()?;
        let session = Session::new(
            config.field_table()?,
            CaptureBuffer::new(config.capture_capacity),
        );
        Ok(Self {
            config,
            credentials,
            source,
            radio,
            power,
            signal,
            session,
            phase: CyclePhase::Idle,
            cycles: 0,
            sleeps: 0,
        })
    }

    /// Brings up the radio session and the low power peripherals
    pub async fn boot(&mut self) -> Result<(), NodeError> {
        info!("Starting");
        self.signal.set_active(false)?;
        self.radio.initialize().await?;
        self.radio.reset_mac().await?;
        self.radio
            .configure_session(&self.config.radio, &self.credentials)
            .await?;
        self.power.begin_low_power().await?;
        Ok(())
    }

    /// Runs `max_cycles` cycles, or forever with `None`
    pub async fn run(&mut self, max_cycles: Option<u64>) -> u64 {
        let mut done = 0;
        while max_cycles.map_or(true, |max| done < max) {
            let report = self.run_cycle().await;
            debug!("cycle {} finished: {:?}", report.cycle, report);
            done += 1;
        }
        done
    }

    pub async fn run_cycle(&mut self) -> CycleReport {
        let cycle = self.cycles + 1;
        let fut = self.cycle(cycle);
        #[cfg(feature = "tracing")]
        let fut = tracing::Instrument::instrument(fut, span_duty_cycle(cycle));
        #[cfg(not(feature = "tracing"))]
        span_duty_cycle(cycle);
        fut.await
    }

    async fn cycle(&mut self, cycle: u64) -> CycleReport {
        let before = self.session.stats();

        self.phase = CyclePhase::ReadingMeter;
        info!("beginning to read SML ...");
        let read = self.read_meter().await;

        self.phase = CyclePhase::Transmitting;
        let value = self
            .session
            .value(self.config.payload_slot)
            .unwrap_or(SLOT_NOT_CAPTURED);
        let payload = Payload::from_value(value);
        let tx = self.transmit(&payload).await;

        self.phase = CyclePhase::Sleeping;
        let wake = self.sleep().await;

        self.phase = CyclePhase::Idle;
        self.cycles = cycle;
        CycleReport {
            cycle,
            read,
            stats: self.session.stats().since(&before),
            payload,
            tx,
            wake,
        }
    }

    async fn read_meter(&mut self) -> ReadOutcome {
        for _ in 0..self.config.poll_budget() {
            if self.poll_available().await > 0 {
                let bytes = self.drain().await;
                info!("end of reading SML, {bytes} bytes");
                return ReadOutcome::Drained { bytes };
            }
            sleep(self.config.poll_interval()).await;
        }
        warn!("timeout while reading after {:?}", self.config.read_timeout());
        ReadOutcome::TimedOut
    }

    async fn poll_available(&mut self) -> usize {
        match self.source.available().await {
            Ok(n) => n,
            Err(e) => {
                warn!("meter source: {e}");
                0
            }
        }
    }

    async fn drain(&mut self) -> usize {
        let mut bytes = 0;
        loop {
            while self.poll_available().await > 0 {
                match self.source.read_byte().await {
                    Ok(Some(byte)) => {
                        self.session.feed(byte);
                        bytes += 1;
                    }
                    // a source that reports data it cannot deliver ends the drain
                    Ok(None) => return bytes,
                    Err(e) => {
                        warn!("meter source: {e}");
                        return bytes;
                    }
                }
            }

            let gap = self.config.drain_idle_gap();
            if gap.is_zero() || !self.wait_for_more(gap).await {
                return bytes;
            }
        }
    }

    async fn wait_for_more(&mut self, gap: std::time::Duration) -> bool {
        let deadline = Instant::now() + gap;
        let step = self.config.poll_interval().min(gap);
        while Instant::now() < deadline {
            sleep(step).await;
            if self.poll_available().await > 0 {
                return true;
            }
        }
        false
    }

    async fn transmit(&mut self, payload: &Payload) -> TxOutcome {
        if self.radio.is_busy() {
            warn!("OP_TXRXPEND, not sending");
            return TxOutcome::SkippedBusy;
        }

        let settings = &self.config.radio;
        if let Err(e) = self
            .radio
            .send(settings.port, payload.as_bytes(), settings.confirmed)
            .await
        {
            error!("uplink failed: {e}");
            return TxOutcome::Failed(e.to_string());
        }
        info!("Packet queued: {payload:?}");
        self.pulse_signal().await;

        match timeout(self.config.tx_timeout(), self.await_completion()).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(
                    "no completion from radio within {:?}",
                    self.config.tx_timeout()
                );
                TxOutcome::TimedOut
            }
        }
    }

    async fn pulse_signal(&mut self) {
        if let Err(e) = self.signal.set_active(true) {
            warn!("signal line: {e}");
            return;
        }
        sleep(self.config.signal_pulse()).await;
        if let Err(e) = self.signal.set_active(false) {
            warn!("signal line: {e}");
        }
    }

    async fn await_completion(&mut self) -> TxOutcome {
        loop {
            let event = self.radio.next_event().await;
            info!("{event}");
            match event {
                RadioEvent::Joined => {
                    self.radio.set_link_check(self.config.radio.link_check);
                }
                RadioEvent::TxComplete { flags, downlink } => {
                    let ack = flags.contains(TxRxFlags::ACK);
                    if ack {
                        info!("Received ack");
                    }
                    if !downlink.is_empty() {
                        info!(
                            "Received {} bytes of payload: {}",
                            downlink.len(),
                            crate::util::hex::encode_hex_upper(&downlink)
                        );
                    }
                    return TxOutcome::Completed { ack, downlink };
                }
                RadioEvent::JoinFailed => return TxOutcome::JoinFailed,
                RadioEvent::RejoinFailed => return TxOutcome::RejoinFailed,
                RadioEvent::LinkDead => return TxOutcome::LinkDead,
                _ => {}
            }
        }
    }

    async fn sleep(&mut self) -> Option<WakeReason> {
        self.sleeps += 1;
        info!("going to sleep");
        if let Err(e) = self.power.begin_low_power().await {
            warn!("low power setup: {e}");
        }
        sleep(self.config.settle_delay()).await;
        match self.power.deep_sleep(self.config.sleep_interval()).await {
            Ok(reason) => Some(reason),
            Err(e) => {
                warn!("deep sleep: {e}");
                None
            }
        }
    }

    pub fn phase(&self) -> CyclePhase {
        self.phase
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Cycles completed
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Sleep requests issued
    pub fn sleeps(&self) -> u64 {
        self.sleeps
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    pub fn radio_mut(&mut self) -> &mut R {
        &mut self.radio
    }

    pub fn power(&self) -> &P {
        &self.power
    }

    pub fn signal(&self) -> &L {
        &self.signal
    }
}
