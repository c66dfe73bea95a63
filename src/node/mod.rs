//! # Meter Node
//!
//! The duty cycle of the battery powered meter node and the collaborators it
//! drives: the meter line, the LoRaWAN radio, power control and the signal
//! LED.

pub mod payload;
pub mod power;
pub mod radio;
pub mod scheduler;
pub mod session;
pub mod signal;
pub mod source;

pub use payload::Payload;
pub use power::{HostPower, PowerControl, WakeHandle, WakeReason};
pub use radio::{
    Credentials, LoRaRadio, LoggingRadio, RadioEvent, RadioSettings, SpreadingFactor, TxRxFlags,
};
pub use scheduler::{CyclePhase, CycleReport, CycleScheduler, ReadOutcome, TxOutcome};
pub use session::{Session, SessionStats};
pub use signal::{LogSignal, SignalLine};
pub use source::{MeterSource, ReplaySource, SerialConfig, SerialMeterSource, SimulatedMeter};
