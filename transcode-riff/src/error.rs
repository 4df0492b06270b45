//! Error types for RIFF chunk handling.

use crate::fourcc::FourCC;
use thiserror::Error;

/// Result type for RIFF operations.
pub type Result<T> = std::result::Result<T, RiffError>;

/// Errors that can occur while reading or writing a RIFF structure.
///
/// A failed write leaves the nested chunk state at its last known good
/// value; callers should treat the file being written as finished.
#[derive(Error, Debug)]
pub enum RiffError {
    /// I/O error from the underlying backend.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// No backend has been bound to the stack.
    #[error("No backend bound to the chunk stack")]
    NotBound,

    /// The stack is not in write mode.
    #[error("Chunk stack is not in write mode")]
    NotWriting,

    /// The stack is not in read mode.
    #[error("Chunk stack is not in read mode")]
    NotReading,

    /// Read/write mode cannot change while chunks are open or a read is underway.
    #[error("Cannot change read/write mode: {0}")]
    ModeChange(&'static str),

    /// A chunk was started inside a chunk that cannot hold subchunks.
    #[error("Chunk '{0}' does not contain subchunks")]
    NotAContainer(FourCC),

    /// The chunk type was assigned after data had been written.
    #[error("Chunk '{0}' already holds data, its type cannot change")]
    AlreadyWritten(FourCC),

    /// The chunk data offset has not been resolved yet.
    #[error("Chunk type has not been set, data offset is unresolved")]
    Unresolved,

    /// The fixed stack depth is exhausted.
    #[error("Chunk stack is full (depth {0})")]
    StackFull(usize),

    /// Pop on an empty stack.
    #[error("Chunk stack is empty")]
    StackEmpty,

    /// The write would take the chunk past the legacy 32-bit size ceiling.
    #[error("Chunk '{tag}' would grow to {requested} bytes, over the legacy limit")]
    SizeLimit {
        /// Chunk being written.
        tag: FourCC,
        /// Chunk length the write would produce.
        requested: u64,
    },

    /// Single-pass write attempted on a chunk that already holds data.
    #[error("Chunk '{0}' was already written, single-pass writes are one shot")]
    StreamWriteReused(FourCC),

    /// The backend accepted fewer bytes than requested.
    #[error("Short write: expected {expected} bytes, wrote {written}")]
    ShortWrite {
        /// Bytes requested.
        expected: usize,
        /// Bytes accepted.
        written: usize,
    },

    /// The backend could not position itself at the requested offset.
    #[error("Seek to offset {0} failed")]
    SeekFailed(u64),

    /// A format record could not be decoded.
    #[error("Invalid format record: {0}")]
    InvalidFormat(String),
}
