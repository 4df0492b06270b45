//! Per-stream writer state and sample index

use crate::chunks::{stream_chunk_tag, ChunkType, IndexEntry};
use crate::types::{StreamHeader, StreamType};
use transcode_riff::format::{bitmap_compression, wave_block_align};
use transcode_riff::{ChunkDescriptor, FourCC};

/// Handle to a stream owned by an [`AviWriter`](crate::AviWriter).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamHandle(pub(crate) usize);

impl StreamHandle {
    /// Zero-based stream number.
    pub fn index(self) -> usize {
        self.0
    }
}

/// One written sample as recorded in the in-memory index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleIndexEntry {
    /// Bytes of this stream written before the sample
    pub stream_offset: u64,
    /// Absolute file offset of the sample data
    pub offset: u64,
    /// Sample length
    pub length: u32,
    /// idx1 flags (`IndexEntry::KEYFRAME`)
    pub flags: u32,
}

impl SampleIndexEntry {
    pub fn is_keyframe(&self) -> bool {
        self.flags & IndexEntry::KEYFRAME != 0
    }
}

/// Lifecycle of the per-stream super index reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SuperIndex {
    /// OpenDML indexing disabled or the header not written yet.
    None,
    /// `JUNK` chunk reserved in the stream header list.
    Reserved(ChunkDescriptor),
    /// Converted to `indx`; `next_entry` is relative to the chunk data.
    Active {
        chunk: ChunkDescriptor,
        entries: u32,
        next_entry: u64,
    },
    /// The reservation ran out; no further std indexes for this stream.
    Full,
}

/// Stream declared on an AVI writer.
#[derive(Debug, Clone)]
pub struct AviStream {
    index: usize,
    header: StreamHeader,
    format: Vec<u8>,
    name: Option<String>,
    chunk_tag: Option<FourCC>,
    pub(crate) samples: Vec<SampleIndexEntry>,
    pub(crate) bytes_written: u64,
    pub(crate) strh: Option<ChunkDescriptor>,
    pub(crate) super_index: SuperIndex,
}

impl AviStream {
    pub(crate) fn new(index: usize, stream_type: StreamType) -> Self {
        AviStream {
            index,
            header: StreamHeader::new(stream_type),
            format: Vec::new(),
            name: None,
            chunk_tag: None,
            samples: Vec::new(),
            bytes_written: 0,
            strh: None,
            super_index: SuperIndex::None,
        }
    }

    /// Zero-based stream number.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Stream header as it will be (or was) written.
    pub fn header(&self) -> &StreamHeader {
        &self.header
    }

    pub(crate) fn header_mut(&mut self) -> &mut StreamHeader {
        &mut self.header
    }

    /// Codec format record written into `strf`.
    pub fn format(&self) -> &[u8] {
        &self.format
    }

    pub(crate) fn set_format(&mut self, format: Vec<u8>) {
        self.format = format;
    }

    /// Stream name written into `strn`.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.name = Some(name);
    }

    pub(crate) fn set_chunk_tag(&mut self, tag: FourCC) {
        self.chunk_tag = Some(tag);
    }

    /// Tag of this stream's sample chunks.
    ///
    /// An explicit tag wins. Otherwise it is derived from the stream
    /// number and type: `##db` for uncompressed video, `##dc` for other
    /// video, `##wb` for audio and `##tx` for text.
    pub fn chunk_tag(&self) -> FourCC {
        if let Some(tag) = self.chunk_tag {
            return tag;
        }
        let chunk_type = match self.header.stream_type {
            StreamType::Video | StreamType::Interleaved => match bitmap_compression(&self.format) {
                Some(c) if c.is_null() => ChunkType::VideoUncompressed,
                _ => ChunkType::VideoCompressed,
            },
            StreamType::Audio => ChunkType::Audio,
            StreamType::Text => ChunkType::Text,
            StreamType::Midi | StreamType::Unknown(_) => ChunkType::VideoCompressed,
        };
        stream_chunk_tag(self.index, chunk_type)
    }

    /// Samples written so far.
    pub fn samples(&self) -> &[SampleIndexEntry] {
        &self.samples
    }

    /// Number of samples written so far.
    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// Payload bytes written so far, repeats included.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Whether the super index ran out of room during index emission.
    pub fn super_index_full(&self) -> bool {
        self.super_index == SuperIndex::Full
    }

    pub(crate) fn push_sample(&mut self, offset: u64, length: u32, flags: u32) {
        self.samples.push(SampleIndexEntry {
            stream_offset: self.bytes_written,
            offset,
            length,
            flags,
        });
        self.bytes_written += length as u64;
    }

    /// Duplicate the last sample entry; the new entry points at the same data.
    pub(crate) fn repeat_sample(&mut self) -> bool {
        let Some(&last) = self.samples.last() else {
            return false;
        };
        self.samples.push(SampleIndexEntry {
            stream_offset: self.bytes_written,
            ..last
        });
        self.bytes_written += last.length as u64;
        true
    }

    /// Stream length as stored in `strh`: frames for video, blocks for
    /// audio (bytes when the block alignment is unknown). A larger preset
    /// length is kept.
    pub(crate) fn computed_length(&self) -> u32 {
        let computed = match self.header.stream_type {
            t if t.is_video() => self.samples.len() as u64,
            StreamType::Audio => match wave_block_align(&self.format) {
                Some(align) if align > 0 => self.bytes_written / align as u64,
                _ => self.bytes_written,
            },
            _ => return self.header.length,
        };
        self.header.length.max(computed.min(u32::MAX as u64) as u32)
    }
}
