//! AVI Container Writer
//!
//! This crate writes AVI (Audio Video Interleave) files on top of the
//! [`transcode_riff`] chunk stack, including the OpenDML (AVI 2.0)
//! extensions for files larger than the classic 2 GB limit.
//!
//! # Features
//!
//! - Any number of video, audio, text and other streams
//! - Legacy `idx1` index for the first segment
//! - OpenDML super (`indx`) and standard (`ix##`) indexes
//! - Automatic rollover into `RIFF:AVIX` segments near 1 GB
//! - Single-pass streaming mode with fewer seeks
//! - Sample repetition (dropped frames) without duplicating data
//!
//! # Example
//!
//! ```
//! use transcode_avi::{AviWriter, AviWriterConfig, IndexEntry, StreamType};
//! use transcode_riff::{BitmapInfoHeader, BufferBackend, FourCC};
//!
//! let backend = BufferBackend::with_capacity(1 << 20);
//! let mut writer = AviWriter::new(backend, AviWriterConfig::default());
//!
//! let video = writer.new_stream(StreamType::Video).unwrap();
//! writer
//!     .set_format(video, BitmapInfoHeader::new(320, 240, FourCC::new(*b"MJPG")).to_bytes())
//!     .unwrap();
//!
//! writer.begin_header().unwrap();
//! writer.begin_data().unwrap();
//! writer.write_sample(video, &[0u8; 100], IndexEntry::KEYFRAME).unwrap();
//! writer.end_data().unwrap();
//! writer.finish().unwrap();
//!
//! assert_eq!(writer.stream(video).unwrap().header().length, 1);
//! ```

mod chunks;
mod error;
mod index;
mod stream;
mod types;
mod writer;

pub use chunks::{
    chunk_ids, stream_chunk_tag, ChunkType, IndexEntry, StdIndexEntry, StdIndexHeader,
    SuperIndexEntry, SuperIndexHeader, AVI_INDEX_OF_CHUNKS, AVI_INDEX_OF_INDEXES,
};
pub use error::{AviError, Result};
pub use index::{group_samples, read_legacy_index, SampleGroup, MAX_GROUP_SAMPLES, MAX_GROUP_SPAN};
pub use stream::{AviStream, SampleIndexEntry, StreamHandle};
pub use types::{AviFlags, AviHeader, OpenDmlHeader, Rect, StreamHeader, StreamType};
pub use writer::{AviWriter, AviWriterConfig, WriterState};

pub use transcode_riff::FourCC;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exports() {
        let _: fn() -> Result<()> = || Ok(());
    }

    #[test]
    fn test_fourcc() {
        let fourcc = FourCC::new(*b"RIFF");
        assert_eq!(fourcc.as_str(), "RIFF");
    }

    #[test]
    fn test_chunk_ids() {
        assert_eq!(chunk_ids::AVI.as_str(), "AVI ");
        assert_eq!(chunk_ids::AVIX.as_str(), "AVIX");
        assert_eq!(chunk_ids::MOVI.as_str(), "movi");
        assert_eq!(chunk_ids::IDX1.as_str(), "idx1");
    }
}
