//! WAVE Writer
//!
//! Writes single-stream RIFF WAVE files through the [`transcode_riff`]
//! chunk stack. Headers always describe the bytes written so far once
//! [`WavWriter::sync`] or a chunk close has run.
//!
//! # Example
//!
//! ```
//! use transcode_riff::{BufferBackend, WaveFormat};
//! use transcode_wav::{WavWriter, WavWriterConfig};
//!
//! let mut writer = WavWriter::new(BufferBackend::with_capacity(4096), WavWriterConfig::default());
//! writer.set_format(&WaveFormat::pcm(2, 44100, 16)).unwrap();
//! writer.begin_header().unwrap();
//! writer.begin_data().unwrap();
//! writer.write_all(&[0u8; 400]).unwrap();
//! writer.end_data().unwrap();
//! writer.finish().unwrap();
//!
//! let bytes = writer.into_backend().unwrap().into_written();
//! assert_eq!(bytes.len(), 12 + 8 + 16 + 8 + 400);
//! ```

mod error;
mod writer;

pub use error::{Result, WavError};
pub use writer::{WavWriter, WavWriterConfig, WriterState, DATA, FMT, WAVE};
