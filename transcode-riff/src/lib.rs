//! RIFF chunk writing and reading
//!
//! This crate provides the nested-chunk machinery shared by the RIFF based
//! container writers (AVI and WAV). RIFF files are trees of tagged chunks:
//! an 8-byte header (tag + little-endian length) followed by the payload,
//! padded to an even length. `RIFF` and `LIST` chunks carry a further
//! 4-byte tag and hold subchunks.
//!
//! # Features
//!
//! - Bounded stack of open chunks with parent size propagation on close
//! - Patch-later writing that keeps every open header consistent
//! - Single-pass streaming writes with committed headers
//! - Placeholder lengths for chunks whose size is not known yet
//! - File and bounded in-memory backends
//! - Chunk header parsing for reading files back
//!
//! # Example
//!
//! ```
//! use transcode_riff::{containers, BufferBackend, ChunkStack, FourCC};
//!
//! let mut stack = ChunkStack::for_writing(BufferBackend::with_capacity(256), 0);
//!
//! let mut riff = stack.begin_chunk()?;
//! riff.set_as_container(containers::RIFF, FourCC::new(*b"WAVE"))?;
//! stack.push(riff)?;
//!
//! let mut data = stack.begin_chunk()?;
//! data.set_as_data(FourCC::new(*b"data"))?;
//! stack.push(data)?;
//! stack.write_top_all(&[0u8; 6])?;
//! stack.pop()?;
//! stack.pop()?;
//!
//! let bytes = stack.into_backend().map(|b| b.into_written()).unwrap_or_default();
//! assert_eq!(bytes.len(), 26);
//! # Ok::<(), transcode_riff::RiffError>(())
//! ```

mod backend;
mod batch;
mod chunk;
mod error;
mod fourcc;
pub mod format;
mod stack;

pub use backend::{Backend, BufferBackend, FileBackend};
pub use batch::{IndexBatchBuffer, BATCH_REGION_SIZE};
pub use chunk::{
    ChunkDescriptor, HeaderLength, CONTAINER_HEADER_SIZE, DATA_HEADER_SIZE, PLACEHOLDER_LENGTH,
};
pub use error::{Result, RiffError};
pub use format::{BitmapInfoHeader, WaveFormat};
pub use fourcc::{containers, FourCC};
pub use stack::{ChunkStack, DEFAULT_DEPTH, LEGACY_CHUNK_LIMIT, SEGMENT_DANGER_ZONE};
