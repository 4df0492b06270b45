//! Chunk bookkeeping
//!
//! A [`ChunkDescriptor`] records where one chunk lives in the file and how
//! much of it has been read or written. Descriptors are plain values: the
//! [`ChunkStack`](crate::ChunkStack) copies them on push and hands the
//! finalized copy back on pop, and callers keep copies of closed chunks
//! around when they need to patch a header body later.

use crate::error::{Result, RiffError};
use crate::fourcc::{containers, FourCC};
use std::fmt;

/// Length written into the header of a chunk whose size is not known yet.
///
/// `0xFFFFFFFF` would be the natural choice, but enough readers treat the
/// field as signed that the largest positive value is used instead.
pub const PLACEHOLDER_LENGTH: u32 = 0x7FFF_FFFF;

/// Size of a plain chunk header (tag + length).
pub const DATA_HEADER_SIZE: u64 = 8;

/// Size of a container chunk header (container tag + length + tag).
pub const CONTAINER_HEADER_SIZE: u64 = 12;

/// How the length field of a chunk header is maintained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HeaderLength {
    /// The true extent is not known yet; header syncs write
    /// [`PLACEHOLDER_LENGTH`] until the chunk is closed.
    Placeholder,
    /// Header syncs write the declared length.
    #[default]
    Tracked,
    /// The final header has already been written by a single-pass write,
    /// closing the chunk does not revisit it.
    Committed,
}

/// Position and size bookkeeping for one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkDescriptor {
    pub(crate) header_offset: u64,
    pub(crate) data_offset: Option<u64>,
    pub(crate) next_chunk_offset: u64,
    pub(crate) tag: FourCC,
    pub(crate) container: Option<FourCC>,
    pub(crate) data_length: u32,
    pub(crate) read_offset: u64,
    pub(crate) write_offset: u64,
    pub(crate) write_mode: bool,
    pub(crate) length: HeaderLength,
}

impl ChunkDescriptor {
    /// New write-mode chunk whose header starts at `header_offset`.
    pub(crate) fn new_write(header_offset: u64) -> Self {
        ChunkDescriptor {
            header_offset,
            data_offset: None,
            next_chunk_offset: header_offset,
            tag: FourCC::NULL,
            container: None,
            data_length: 0,
            read_offset: 0,
            write_offset: 0,
            write_mode: true,
            length: HeaderLength::Tracked,
        }
    }

    /// Describe an arbitrary byte range as a read-only data chunk.
    ///
    /// Useful for walking nested structures that are not themselves
    /// wrapped in a chunk header.
    pub fn raw_region(offset: u64, len: u32) -> Self {
        ChunkDescriptor {
            header_offset: offset,
            data_offset: Some(offset),
            next_chunk_offset: offset + len as u64,
            tag: FourCC::NULL,
            container: None,
            data_length: len,
            read_offset: 0,
            write_offset: 0,
            write_mode: false,
            length: HeaderLength::Tracked,
        }
    }

    /// Turn this chunk into a plain data chunk tagged `tag`.
    pub fn set_as_data(&mut self, tag: FourCC) -> Result<()> {
        self.check_retype()?;
        self.tag = tag;
        self.container = None;
        self.data_offset = Some(self.header_offset + DATA_HEADER_SIZE);
        Ok(())
    }

    /// Turn this chunk into a container (`RIFF` or `LIST`) holding `tag`.
    pub fn set_as_container(&mut self, container: FourCC, tag: FourCC) -> Result<()> {
        self.check_retype()?;
        self.tag = tag;
        self.container = Some(container);
        self.data_offset = Some(self.header_offset + CONTAINER_HEADER_SIZE);
        Ok(())
    }

    fn check_retype(&self) -> Result<()> {
        if !self.write_mode {
            return Err(RiffError::NotWriting);
        }
        if self.write_offset != 0 {
            log::error!("chunk type set after data was written to '{}'", self.tag);
            return Err(RiffError::AlreadyWritten(self.tag));
        }
        Ok(())
    }

    /// Absolute offset of the chunk header.
    pub fn header_offset(&self) -> u64 {
        self.header_offset
    }

    /// Absolute offset of the chunk data, once the chunk type is known.
    pub fn data_offset(&self) -> Option<u64> {
        self.data_offset
    }

    /// Absolute offset where the next sibling chunk starts (read mode).
    pub fn next_chunk_offset(&self) -> u64 {
        self.next_chunk_offset
    }

    /// Chunk tag. For containers this is the embedded list type.
    pub fn tag(&self) -> FourCC {
        self.tag
    }

    /// Container tag (`RIFF`/`LIST`), `None` for plain data chunks.
    pub fn container(&self) -> Option<FourCC> {
        self.container
    }

    /// Whether the chunk holds subchunks.
    pub fn is_container(&self) -> bool {
        matches!(self.container, Some(c) if c == containers::RIFF || c == containers::LIST)
    }

    /// Declared data length, excluding header and pad byte.
    pub fn data_length(&self) -> u32 {
        self.data_length
    }

    /// Declared length rounded up to the next word boundary.
    pub fn aligned_length(&self) -> u64 {
        (self.data_length as u64 + 1) & !1
    }

    /// Size of the on-disk header.
    pub fn header_size(&self) -> u64 {
        if self.container.is_some() {
            CONTAINER_HEADER_SIZE
        } else {
            DATA_HEADER_SIZE
        }
    }

    /// Read cursor relative to the data start.
    pub fn read_offset(&self) -> u64 {
        self.read_offset
    }

    /// Write cursor relative to the data start.
    pub fn write_offset(&self) -> u64 {
        self.write_offset
    }

    /// Whether this chunk was created for writing.
    pub fn is_write_mode(&self) -> bool {
        self.write_mode
    }

    /// How the header length field is maintained.
    pub fn header_length(&self) -> HeaderLength {
        self.length
    }

    /// Whether the header currently carries the placeholder length.
    pub fn is_placeholder(&self) -> bool {
        self.length == HeaderLength::Placeholder
    }

    /// Absolute end of the chunk data including the pad byte.
    pub(crate) fn data_end(&self) -> Option<u64> {
        self.data_offset.map(|d| d + self.aligned_length())
    }

    /// Grow the declared length so it covers at least `len` bytes.
    pub(crate) fn cover(&mut self, len: u64) {
        if (self.data_length as u64) < len {
            self.data_length = u32::try_from(len).unwrap_or(u32::MAX);
        }
    }

    /// Encoded header bytes; the returned length is 8 or 12.
    pub(crate) fn encode_header(&self) -> ([u8; 12], usize) {
        let mut out = [0u8; 12];
        match self.container {
            Some(container) => {
                let len = match self.length {
                    HeaderLength::Placeholder => PLACEHOLDER_LENGTH,
                    // the container length covers the embedded tag
                    _ => self.data_length.saturating_add(4),
                };
                out[0..4].copy_from_slice(container.as_bytes());
                out[4..8].copy_from_slice(&len.to_le_bytes());
                out[8..12].copy_from_slice(self.tag.as_bytes());
                (out, 12)
            }
            None => {
                let len = match self.length {
                    HeaderLength::Placeholder => PLACEHOLDER_LENGTH,
                    _ => self.data_length,
                };
                out[0..4].copy_from_slice(self.tag.as_bytes());
                out[4..8].copy_from_slice(&len.to_le_bytes());
                (out, 8)
            }
        }
    }
}

impl fmt::Display for ChunkDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.container {
            Some(container) => write!(f, "'{}:{}'", container, self.tag)?,
            None => write!(f, "'{}'", self.tag)?,
        }
        match self.data_offset {
            Some(data) => write!(
                f,
                " hdr={} data={} len={} data-end={}",
                self.header_offset,
                data,
                self.data_length,
                data + self.data_length as u64
            ),
            None => write!(f, " hdr={} data=? len={}", self.header_offset, self.data_length),
        }
    }
}
