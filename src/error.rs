//! # Node Error Handling
//!
//! This module defines the NodeError enum, which represents the errors the
//! collaborators of the meter node (serial port, radio, power control,
//! configuration) can report. Decoding problems are not errors: the decoder
//! reports them as states and the node keeps cycling.

use thiserror::Error;

/// Represents the different error types that can occur in the node crate.
#[derive(Debug, Error)]
pub enum NodeError {
    /// Indicates an error related to the serial port communication.
    #[error("Serial port error: {0}")]
    SerialPortError(String),

    /// Indicates an error reported by the radio collaborator.
    #[error("Radio error: {0}")]
    RadioError(String),

    /// Indicates an error reported by the power collaborator.
    #[error("Power control error: {0}")]
    PowerError(String),

    /// Indicates an invalid node configuration.
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// Indicates an invalid hexadecimal string was provided.
    #[error("Invalid hexadecimal string: {0}")]
    InvalidHexString(String),

    /// Indicates an invalid OBIS identifier.
    #[error("Invalid OBIS identifier: {0}")]
    InvalidObis(#[from] crate::sml::obis::ObisParseError),

    /// Wraps an I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Wraps a configuration file that is not valid JSON.
    #[error("Configuration parse error: {0}")]
    Json(#[from] serde_json::Error),
}
