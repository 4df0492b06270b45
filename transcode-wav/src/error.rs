//! WAV writer error types.

use crate::writer::WriterState;
use thiserror::Error;
use transcode_riff::RiffError;

/// WAV writer errors.
#[derive(Error, Debug)]
pub enum WavError {
    /// Chunk stack error.
    #[error("RIFF error: {0}")]
    Riff(#[from] RiffError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Operation called out of sequence.
    #[error("{operation} is not allowed in state {state}")]
    InvalidState {
        /// Rejected operation.
        operation: &'static str,
        /// State the writer was in.
        state: WriterState,
    },

    /// The header cannot be written without a format record.
    #[error("No format set")]
    MissingFormat,
}

/// WAV writer result type.
pub type Result<T> = std::result::Result<T, WavError>;
