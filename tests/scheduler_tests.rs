//! Duty cycle tests with mock collaborators.

use async_trait::async_trait;
use sml_node::constants::OBIS_ENERGY_IMPORT_T1;
use sml_node::error::NodeError;
use sml_node::node::radio::TxRxFlags;
use sml_node::node::scheduler::{CyclePhase, ReadOutcome, TxOutcome};
use sml_node::sml::builder::{ListEntry, SmlFileBuilder};
use sml_node::{
    Credentials, CycleScheduler, LoRaRadio, LogSignal, LoggingRadio, MeterSource, NodeConfig,
    ObisCode, PowerControl, RadioEvent, RadioSettings, ReplaySource, WakeReason,
};
use std::collections::VecDeque;
use std::time::Duration;

#[derive(Debug, Default)]
struct MockRadio {
    /// Events raised after each send, one script per send
    scripts: VecDeque<Vec<RadioEvent>>,
    pending: VecDeque<RadioEvent>,
    busy: bool,
    fail_send: bool,
    sent: Vec<Vec<u8>>,
    calls: Vec<&'static str>,
    link_check: Option<bool>,
}

impl MockRadio {
    fn completing() -> Self {
        Self::default()
    }

    fn scripted(scripts: Vec<Vec<RadioEvent>>) -> Self {
        Self {
            scripts: scripts.into(),
            ..Self::default()
        }
    }
}

fn tx_complete() -> RadioEvent {
    RadioEvent::TxComplete {
        flags: TxRxFlags::empty(),
        downlink: Vec::new(),
    }
}

#[async_trait]
impl LoRaRadio for MockRadio {
    async fn initialize(&mut self) -> Result<(), NodeError> {
        self.calls.push("initialize");
        Ok(())
    }

    async fn reset_mac(&mut self) -> Result<(), NodeError> {
        self.calls.push("reset_mac");
        Ok(())
    }

    async fn configure_session(
        &mut self,
        _settings: &RadioSettings,
        _credentials: &Credentials,
    ) -> Result<(), NodeError> {
        self.calls.push("configure_session");
        Ok(())
    }

    fn is_busy(&self) -> bool {
        self.busy
    }

    async fn send(&mut self, _port: u8, payload: &[u8], _confirmed: bool) -> Result<(), NodeError> {
        if self.fail_send {
            return Err(NodeError::RadioError("no channel available".into()));
        }
        self.sent.push(payload.to_vec());
        let script = self.scripts.pop_front().unwrap_or_else(|| vec![tx_complete()]);
        self.pending.extend(script);
        Ok(())
    }

    async fn next_event(&mut self) -> RadioEvent {
        match self.pending.pop_front() {
            Some(event) => event,
            None => std::future::pending().await,
        }
    }

    fn set_link_check(&mut self, enabled: bool) {
        self.link_check = Some(enabled);
    }
}

#[derive(Debug, Default)]
struct MockPower {
    low_power_calls: u32,
    sleeps: Vec<Duration>,
    fail_sleep: bool,
}

#[async_trait]
impl PowerControl for MockPower {
    async fn begin_low_power(&mut self) -> Result<(), NodeError> {
        self.low_power_calls += 1;
        Ok(())
    }

    async fn deep_sleep(&mut self, duration: Duration) -> Result<WakeReason, NodeError> {
        self.sleeps.push(duration);
        if self.fail_sleep {
            return Err(NodeError::PowerError("rtc not running".into()));
        }
        Ok(WakeReason::Timer)
    }
}

fn fast_config() -> NodeConfig {
    NodeConfig {
        sleep_interval_ms: 1,
        read_timeout_ms: 20,
        poll_interval_ms: 1,
        tx_timeout_ms: 50,
        settle_delay_ms: 0,
        signal_pulse_ms: 0,
        ..NodeConfig::default()
    }
}

fn reading(raw: i64, scaler: i8) -> Vec<u8> {
    SmlFileBuilder::meter_reading(
        b"TEST",
        Some(1),
        &[ListEntry::watt_hours(ObisCode::new(OBIS_ENERGY_IMPORT_T1), raw, scaler)],
    )
}

type Scheduler = CycleScheduler<ReplaySource, MockRadio, MockPower, LogSignal>;

fn scheduler(source: ReplaySource, radio: MockRadio, power: MockPower) -> Scheduler {
    CycleScheduler::new(
        fast_config(),
        Credentials::abp_placeholder(),
        source,
        radio,
        power,
        LogSignal::new(),
    )
    .unwrap()
}

#[tokio::test]
async fn test_boot_sequence() {
    let mut node = scheduler(ReplaySource::default(), MockRadio::completing(), MockPower::default());
    node.boot().await.unwrap();
    assert_eq!(
        node.radio().calls,
        vec!["initialize", "reset_mac", "configure_session"]
    );
    assert_eq!(node.power().low_power_calls, 1);
    assert!(!node.signal().is_active());
    assert_eq!(node.phase(), CyclePhase::Idle);
}

#[tokio::test]
async fn test_cycle_transmits_decoded_value() {
    let mut node = scheduler(
        ReplaySource::new(reading(12345, -3)),
        MockRadio::completing(),
        MockPower::default(),
    );
    let report = node.run_cycle().await;

    assert!(matches!(report.read, ReadOutcome::Drained { bytes } if bytes > 0));
    assert_eq!(report.payload.value_str(), "    12.345");
    assert_eq!(report.stats.messages_complete, 1);
    assert!(report.tx.is_completed());
    assert_eq!(report.wake, Some(WakeReason::Timer));
    assert_eq!(node.radio().sent.len(), 1);
    assert_eq!(node.radio().sent[0].len(), 20);
    assert_eq!(node.power().sleeps, vec![Duration::from_millis(1)]);
    assert_eq!(node.signal().pulses(), 1);
    assert_eq!(node.phase(), CyclePhase::Idle);
}

#[tokio::test]
async fn test_read_timeout_still_transmits_and_sleeps() {
    let mut node = scheduler(ReplaySource::default(), MockRadio::completing(), MockPower::default());
    let report = node.run_cycle().await;

    assert_eq!(report.read, ReadOutcome::TimedOut);
    assert_eq!(report.payload.value_str(), "    -2.000");
    assert!(report.tx.is_completed());
    assert_eq!(node.sleeps(), 1);
    assert_eq!(node.power().sleeps.len(), 1);
}

#[tokio::test]
async fn test_checksum_error_transmits_started_sentinel() {
    let mut file = reading(12345, -3);
    let n = file.len();
    file[n - 1] ^= 0xFF;
    let mut node = scheduler(ReplaySource::new(file), MockRadio::completing(), MockPower::default());
    let report = node.run_cycle().await;

    assert_eq!(report.stats.checksum_errors, 1);
    assert_eq!(report.payload.value_str(), "    -3.000");
    assert_eq!(node.power().sleeps.len(), 1);
}

#[tokio::test]
async fn test_busy_radio_skips_send_but_sleeps() {
    let radio = MockRadio {
        busy: true,
        ..MockRadio::default()
    };
    let mut node = scheduler(ReplaySource::new(reading(1, 0)), radio, MockPower::default());
    let report = node.run_cycle().await;

    assert_eq!(report.tx, TxOutcome::SkippedBusy);
    assert!(node.radio().sent.is_empty());
    assert_eq!(node.signal().pulses(), 0);
    assert_eq!(node.power().sleeps.len(), 1);
}

#[tokio::test]
async fn test_send_failure_is_not_fatal() {
    let radio = MockRadio {
        fail_send: true,
        ..MockRadio::default()
    };
    let mut node = scheduler(ReplaySource::default(), radio, MockPower::default());
    let report = node.run_cycle().await;

    assert!(matches!(report.tx, TxOutcome::Failed(_)));
    assert_eq!(node.power().sleeps.len(), 1);
}

#[tokio::test]
async fn test_missing_completion_times_out() {
    let radio = MockRadio::scripted(vec![vec![RadioEvent::Joining]]);
    let mut node = scheduler(ReplaySource::default(), radio, MockPower::default());
    let report = node.run_cycle().await;

    assert_eq!(report.tx, TxOutcome::TimedOut);
    assert_eq!(node.power().sleeps.len(), 1);
}

#[tokio::test]
async fn test_join_disables_link_check() {
    let radio = MockRadio::scripted(vec![vec![
        RadioEvent::Joining,
        RadioEvent::Joined,
        tx_complete(),
    ]]);
    let mut node = scheduler(ReplaySource::default(), radio, MockPower::default());
    let report = node.run_cycle().await;

    assert!(report.tx.is_completed());
    assert_eq!(node.radio().link_check, Some(false));
}

#[tokio::test]
async fn test_join_failure_ends_wait() {
    let radio = MockRadio::scripted(vec![vec![RadioEvent::Joining, RadioEvent::JoinFailed]]);
    let mut node = scheduler(ReplaySource::default(), radio, MockPower::default());
    let report = node.run_cycle().await;

    assert_eq!(report.tx, TxOutcome::JoinFailed);
    assert_eq!(node.power().sleeps.len(), 1);
}

#[tokio::test]
async fn test_link_dead_ends_wait() {
    let radio = MockRadio::scripted(vec![vec![RadioEvent::LinkDead]]);
    let mut node = scheduler(ReplaySource::default(), radio, MockPower::default());
    assert_eq!(node.run_cycle().await.tx, TxOutcome::LinkDead);
}

#[tokio::test]
async fn test_ack_and_downlink_reported() {
    let radio = MockRadio::scripted(vec![vec![RadioEvent::TxComplete {
        flags: TxRxFlags::ACK | TxRxFlags::DNW1 | TxRxFlags::PORT,
        downlink: vec![0x01, 0x02],
    }]]);
    let mut node = scheduler(ReplaySource::default(), radio, MockPower::default());
    let report = node.run_cycle().await;

    assert_eq!(
        report.tx,
        TxOutcome::Completed {
            ack: true,
            downlink: vec![0x01, 0x02]
        }
    );
}

#[tokio::test]
async fn test_sleep_failure_still_completes_cycle() {
    let power = MockPower {
        fail_sleep: true,
        ..MockPower::default()
    };
    let mut node = scheduler(ReplaySource::default(), MockRadio::completing(), power);
    let report = node.run_cycle().await;

    assert_eq!(report.wake, None);
    assert_eq!(node.cycles(), 1);
    assert_eq!(node.phase(), CyclePhase::Idle);
}

#[tokio::test]
async fn test_run_sleeps_once_per_cycle_and_holds_stale_values() {
    let source = ReplaySource::from_bursts(vec![reading(1000, 0), reading(2000, 0)]);
    let mut node = scheduler(source, MockRadio::completing(), MockPower::default());
    let done = node.run(Some(3)).await;

    assert_eq!(done, 3);
    assert_eq!(node.cycles(), 3);
    assert_eq!(node.power().sleeps.len(), 3);
    let sent: Vec<String> = node
        .radio()
        .sent
        .iter()
        .map(|p| String::from_utf8_lossy(&p[..10]).into_owned())
        .collect();
    // third cycle times out and repeats the held value
    assert_eq!(sent, vec!["  1000.000", "  2000.000", "  2000.000"]);
}

/// Claims a byte is waiting but never hands one out
#[derive(Debug, Default)]
struct StuckSource {
    reads: u32,
}

#[async_trait]
impl MeterSource for StuckSource {
    async fn available(&mut self) -> Result<usize, NodeError> {
        Ok(1)
    }

    async fn read_byte(&mut self) -> Result<Option<u8>, NodeError> {
        self.reads += 1;
        Ok(None)
    }
}

#[tokio::test]
async fn test_source_without_bytes_ends_drain() {
    let config = NodeConfig {
        drain_idle_gap_ms: 5,
        ..fast_config()
    };
    let mut node = CycleScheduler::new(
        config,
        Credentials::abp_placeholder(),
        StuckSource::default(),
        MockRadio::completing(),
        MockPower::default(),
        LogSignal::new(),
    )
    .unwrap();
    let report = tokio::time::timeout(Duration::from_secs(5), node.run_cycle())
        .await
        .expect("drain did not return");

    assert_eq!(report.read, ReadOutcome::Drained { bytes: 0 });
    assert_eq!(report.payload.value_str(), "    -2.000");
    assert_eq!(node.source().reads, 1);
    assert_eq!(node.power().sleeps.len(), 1);
}

#[test]
fn test_idle_logging_radio_raises_no_event() {
    let mut radio = LoggingRadio::new();
    let mut event = tokio_test::task::spawn(radio.next_event());
    tokio_test::assert_pending!(event.poll());
}
