//! Error types for AVI container

use crate::writer::WriterState;
use thiserror::Error;
use transcode_riff::{FourCC, RiffError};

/// Result type for AVI operations
pub type Result<T> = std::result::Result<T, AviError>;

/// Errors that can occur during AVI operations
#[derive(Error, Debug)]
pub enum AviError {
    /// Chunk stack failure.
    #[error("RIFF error: {0}")]
    Riff(#[from] RiffError),

    /// IO error during read/write
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The call is not valid in the writer's current state.
    #[error("{operation} is not allowed in state {state}")]
    InvalidState {
        /// Operation attempted.
        operation: &'static str,
        /// State the writer was in.
        state: WriterState,
    },

    /// Invalid stream index
    #[error("Invalid stream index: {0}")]
    InvalidStream(usize),

    /// `repeat_last_sample` on a stream with no sample yet.
    #[error("Stream {0} has no sample to repeat")]
    NothingToRepeat(usize),

    /// Without OpenDML segments the file cannot grow past the legacy limit.
    #[error("Writing {requested} bytes at offset {offset} would pass the {limit} byte AVI limit")]
    SegmentLimit {
        /// Absolute offset the write would start at.
        offset: u64,
        /// Payload length.
        requested: u64,
        /// Configured ceiling.
        limit: u64,
    },

    /// The reserved super-index space for a stream is used up.
    #[error("Super index for stream {0} is full")]
    SuperIndexFull(usize),

    /// Invalid chunk structure
    #[error("Invalid chunk '{id}': {message}")]
    InvalidChunk {
        /// Offending chunk.
        id: FourCC,
        /// What was wrong.
        message: String,
    },

    /// Insufficient data for operation
    #[error("Insufficient data: need {needed} bytes, have {available}")]
    InsufficientData {
        /// Bytes required.
        needed: usize,
        /// Bytes present.
        available: usize,
    },
}
