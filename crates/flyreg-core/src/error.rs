//! Errors raised while building or exchanging volumes.

use thiserror::Error;

/// Errors produced by volume construction and volume I/O.
#[derive(Error, Debug)]
pub enum VolumeError {
    /// The file could not be decoded into a volume.
    #[error("Failed to decode volume: {0}")]
    Decode(String),

    /// The volume could not be encoded or written.
    #[error("Failed to encode volume: {0}")]
    Encode(String),

    /// A volume needs at least one channel.
    #[error("Volume has no channels")]
    Empty,

    /// Channels of one volume must share a grid.
    #[error("Channel {channel} has shape {actual:?}, expected {expected:?}")]
    ShapeMismatch {
        channel: usize,
        expected: [usize; 3],
        actual: [usize; 3],
    },

    /// Voxel sizes must be finite and strictly positive.
    #[error("Invalid calibration: {0}")]
    InvalidCalibration(String),
}

pub type Result<T> = std::result::Result<T, VolumeError>;
