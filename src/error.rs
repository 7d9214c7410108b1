// src/error.rs

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VidsimError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("FFmpeg/FFprobe command failed: {0}")]
    Command(String),

    #[error("Failed to parse command output: {0}")]
    Parse(String),

    #[error("JSON processing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Similarity metric failed: {0}")]
    Metric(String),

    #[error("Plotting error: {0}")]
    Plot(String),

    #[error("Input error: {0}")]
    Input(String),
}

impl VidsimError {
    /// Process exit code for this error. Argument problems get their own code
    /// so callers can tell them apart from runtime failures.
    pub fn exit_status(&self) -> u8 {
        match self {
            VidsimError::Input(_) => 2,
            _ => 1,
        }
    }
}

// Define a standard Result type for the crate
pub type Result<T> = std::result::Result<T, VidsimError>;
