//! Error types for fleet operations.

use thiserror::Error;

use crate::device::{DeviceId, TransitionError};

/// Errors returned by fleet actions, preference updates and configuration.
#[derive(Error, Debug)]
pub enum Error {
    /// No device with this id exists in the fleet
    #[error("Unknown device: {0}")]
    UnknownDevice(DeviceId),

    /// The requested action is not legal from the device's current status
    #[error("Device {device}: {source}")]
    Transition {
        device: DeviceId,
        #[source]
        source: TransitionError,
    },

    /// Preference key is not one of the known identifiers
    #[error("Unknown preference: {0}")]
    UnknownPreference(String),

    /// Preference value could not be parsed for its key
    #[error("Invalid value for {key}: {value:?}")]
    InvalidPreference { key: String, value: String },

    /// Power action name is not recognized
    #[error("Unknown action: {0}")]
    UnknownAction(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenient Result type for fleet operations.
pub type Result<T> = std::result::Result<T, Error>;
