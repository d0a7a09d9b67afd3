use std::io;
use std::str::Utf8Error;
use thiserror::Error;
use btleplug;
use reqwest;
use serde_json;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to determine path to config file")]
    NoConfigPath,

    #[error("Failed to acquire file lock on config file: {source}")]
    CanNotLock { source: io::Error },

    #[error("Failed to encode/decode config as utf-8: {source}")]
    Utf8Error { #[from] source: Utf8Error },

    #[error("Failed to read/write config file: {source}")]
    IOError { #[from] source: io::Error },

    #[error("Failed to parse/build config file: {source}")]
    JsonError { #[from] source: serde_json::Error },
}

impl ConfigError {
    pub fn is_file_not_found_error(&self) -> bool {
        match self {
            ConfigError::IOError { source } => source.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

#[derive(Error, Debug)]
pub enum AppRunError {
    #[error("Failed to start monitor (config): {source}")]
    ConfigError { #[from] source: ConfigError },

    #[error("Failed to start monitor (runtime): {source}")]
    Runtime { #[from] source: io::Error },

    #[error("Failed to start simulation: {source}")]
    Simulation { #[from] source: SimError },
}

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("Bluetooth is not available on this host")]
    PlatformUnsupported,

    #[error("No device was selected")]
    DeviceRejected,

    #[error("Error communicating with device (btleplug): {source}")]
    LinkError { #[from] source: btleplug::Error },

    #[error("Error communicating with device: {0}")]
    Transport(String),

    #[error("A connection attempt is already in progress")]
    Busy,

    #[error("The device session has been disposed")]
    Disposed,

    #[error("The connection attempt was aborted by a disconnect")]
    Aborted,
}

impl DeviceError {
    /// Transient errors reset the session status so the user may retry.
    pub fn is_transient(&self) -> bool {
        !matches!(self, DeviceError::PlatformUnsupported | DeviceError::Busy | DeviceError::Disposed | DeviceError::Aborted)
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Payload too short: expected {expected} bytes, got {actual}")]
    PayloadTooShort { expected: usize, actual: usize },
}

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Logging backend is unreachable: {source}")]
    BackendUnreachable { #[from] source: reqwest::Error },

    #[error("Logging backend rejected the event with status {status}")]
    BackendRejected { status: u16 },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LocationError {
    #[error("Location permission denied")]
    Denied,

    #[error("Location is unavailable")]
    Unavailable,
}

#[derive(Error, Debug)]
pub enum AlertError {
    #[error("Failed to deliver caregiver alert: {0}")]
    Delivery(String),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SimError {
    #[error("Disconnect real devices before starting the simulation")]
    DeviceConnected,

    #[error("The simulation is already running")]
    AlreadyRunning,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CommandError {
    #[error("Unknown command {0:?}, expected one of: cancel, toggle, share on|off, reset, status")]
    Unknown(String),

    #[error("Expected \"share on\" or \"share off\"")]
    InvalidShare,
}
