//! # Power Control
//!
//! Low-power entry and deep sleep. On the target the MCU stops until the RTC
//! alarm or the wake button interrupt fires; [`HostPower`] reproduces that
//! with the tokio timer and a [`WakeHandle`] standing in for the interrupt.
//!
//! A wake raised while the node is decoding does not touch any node state:
//! the permit is stored and only cuts the next sleep short.

use crate::error::NodeError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// Why a deep sleep ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeReason {
    /// The sleep interval elapsed
    Timer,
    /// An external interrupt woke the node early
    External,
}

#[async_trait]
pub trait PowerControl: Send {
    /// Re-arm the low power peripherals
    async fn begin_low_power(&mut self) -> Result<(), NodeError>;

    /// Sleep for at most `duration`
    async fn deep_sleep(&mut self, duration: Duration) -> Result<WakeReason, NodeError>;
}

#[derive(Debug, Default)]
struct WakeLatch {
    notify: Notify,
    triggered: AtomicU64,
}

/// Interrupt side of [`HostPower`]
#[derive(Debug, Clone)]
pub struct WakeHandle {
    latch: Arc<WakeLatch>,
}

impl WakeHandle {
    /// Raise the wake interrupt
    pub fn trigger(&self) {
        self.latch.triggered.fetch_add(1, Ordering::Relaxed);
        self.latch.notify.notify_one();
    }

    /// Number of wakes raised so far
    pub fn count(&self) -> u64 {
        self.latch.triggered.load(Ordering::Relaxed)
    }
}

/// Host power control built on the tokio timer
#[derive(Debug, Default)]
pub struct HostPower {
    latch: Arc<WakeLatch>,
    low_power_armed: bool,
    sleeps: u64,
}

impl HostPower {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn wake_handle(&self) -> WakeHandle {
        WakeHandle {
            latch: Arc::clone(&self.latch),
        }
    }

    /// Completed deep sleeps
    pub fn sleeps(&self) -> u64 {
        self.sleeps
    }
}

#[async_trait]
impl PowerControl for HostPower {
    async fn begin_low_power(&mut self) -> Result<(), NodeError> {
        self.low_power_armed = true;
        log::trace!("low power mode armed");
        Ok(())
    }

    async fn deep_sleep(&mut self, duration: Duration) -> Result<WakeReason, NodeError> {
        if !self.low_power_armed {
            log::warn!("deep sleep requested without low power setup");
        }
        log::debug!("deep sleep for {duration:?}");

        let reason = tokio::select! {
            _ = tokio::time::sleep(duration) => WakeReason::Timer,
            _ = self.latch.notify.notified() => WakeReason::External,
        };
        self.sleeps += 1;
        self.low_power_armed = false;
        log::debug!("woke up: {reason:?}");
        Ok(reason)
    }
}
