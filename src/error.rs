use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VnaError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Calibration table error: {0}")]
    Calibration(String),

    #[error("Hardware not found: {0}")]
    HardwareNotFound(String),

    #[error("Device lost: {0}")]
    DeviceLost(#[source] io::Error),

    #[error("USB transfer failed: {0}")]
    Usb(String),

    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("Sweep mismatch: {0}")]
    Mismatch(String),

    #[error("Failed to encode sweep: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("Failed to decode sweep: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, VnaError>;
