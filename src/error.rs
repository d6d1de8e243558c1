//! Error types for PetalMix

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PetalMixError {
    #[error("Audio device error: {0}")]
    AudioDevice(String),

    #[error("Audio format error: {0}")]
    AudioFormat(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Spatialization error: {0}")]
    Spatialization(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Invalid buffer: {0}")]
    InvalidBuffer(String),

    #[error("Voice queue is full ({0} buffers pending)")]
    QueueFull(usize),

    #[error("Invalid operation set {id} (max: {max})")]
    InvalidOperationSet { id: u32, max: u32 },

    #[error("Invalid voice handle: {0}")]
    InvalidHandle(u64),

    #[error("Engine error: {0}")]
    Engine(String),
}

pub type Result<T> = std::result::Result<T, PetalMixError>;
