//! AVI chunk identifiers and index records

use crate::error::{AviError, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read, Write};
use transcode_riff::FourCC;

/// Well-known chunk IDs
pub mod chunk_ids {
    use transcode_riff::FourCC;

    pub const AVI: FourCC = FourCC(*b"AVI ");
    pub const AVIX: FourCC = FourCC(*b"AVIX");
    pub const HDRL: FourCC = FourCC(*b"hdrl");
    pub const AVIH: FourCC = FourCC(*b"avih");
    pub const STRL: FourCC = FourCC(*b"strl");
    pub const STRH: FourCC = FourCC(*b"strh");
    pub const STRF: FourCC = FourCC(*b"strf");
    pub const STRN: FourCC = FourCC(*b"strn");
    pub const INDX: FourCC = FourCC(*b"indx");
    pub const MOVI: FourCC = FourCC(*b"movi");
    pub const IDX1: FourCC = FourCC(*b"idx1");
    pub const JUNK: FourCC = FourCC(*b"JUNK");
    pub const ODML: FourCC = FourCC(*b"odml");
    pub const DMLH: FourCC = FourCC(*b"dmlh");
}

/// Tag of a stream chunk: `##dc`, `##db`, `##wb`, `##tx`, or `ix##` for
/// standard index chunks. Stream numbers above 99 wrap.
pub fn stream_chunk_tag(stream_num: usize, chunk_type: ChunkType) -> FourCC {
    let suffix = match chunk_type {
        ChunkType::VideoCompressed => *b"dc",
        ChunkType::VideoUncompressed => *b"db",
        ChunkType::Audio => *b"wb",
        ChunkType::Text => *b"tx",
        ChunkType::Index => *b"ix",
    };
    let tens = b'0' + ((stream_num / 10) % 10) as u8;
    let ones = b'0' + (stream_num % 10) as u8;

    // std index chunks put the stream number last
    if chunk_type == ChunkType::Index {
        FourCC([suffix[0], suffix[1], tens, ones])
    } else {
        FourCC([tens, ones, suffix[0], suffix[1]])
    }
}

/// Kind of a stream chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkType {
    /// Compressed video frame
    VideoCompressed,
    /// Uncompressed video frame
    VideoUncompressed,
    /// Audio data
    Audio,
    /// Text/subtitle
    Text,
    /// Standard index chunk
    Index,
}

/// AVI index entry (idx1 format)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    /// Chunk ID
    pub chunk_id: FourCC,
    /// Flags
    pub flags: u32,
    /// Offset from the `movi` tag
    pub offset: u32,
    /// Size of chunk data
    pub size: u32,
}

impl IndexEntry {
    /// Encoded size.
    pub const SIZE: usize = 16;

    /// Index flags
    pub const KEYFRAME: u32 = 0x10;

    /// Read from data
    pub fn read(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(AviError::InsufficientData {
                needed: Self::SIZE,
                available: data.len(),
            });
        }

        let mut cursor = Cursor::new(data);
        let mut id_bytes = [0u8; 4];
        cursor.read_exact(&mut id_bytes)?;

        Ok(IndexEntry {
            chunk_id: FourCC(id_bytes),
            flags: cursor.read_u32::<LittleEndian>()?,
            offset: cursor.read_u32::<LittleEndian>()?,
            size: cursor.read_u32::<LittleEndian>()?,
        })
    }

    /// Write to writer
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(self.chunk_id.as_bytes())?;
        writer.write_u32::<LittleEndian>(self.flags)?;
        writer.write_u32::<LittleEndian>(self.offset)?;
        writer.write_u32::<LittleEndian>(self.size)?;
        Ok(())
    }

    /// Check if this is a keyframe
    pub fn is_keyframe(&self) -> bool {
        (self.flags & Self::KEYFRAME) != 0
    }
}

/// `bIndexType` of a super index.
pub const AVI_INDEX_OF_INDEXES: u8 = 0x00;
/// `bIndexType` of a standard index.
pub const AVI_INDEX_OF_CHUNKS: u8 = 0x01;

/// Header of a standard index chunk (`ix##`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StdIndexHeader {
    /// Number of entries that follow
    pub entries_in_use: u32,
    /// Chunk tag of the indexed stream
    pub chunk_id: FourCC,
    /// Base added to every entry offset
    pub base_offset: u64,
}

impl StdIndexHeader {
    /// Encoded size.
    pub const SIZE: usize = 24;

    /// Write to writer
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.to_bytes())?;
        Ok(())
    }

    /// Encode as bytes.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[0..2].copy_from_slice(&2u16.to_le_bytes()); // wLongsPerEntry
        out[3] = AVI_INDEX_OF_CHUNKS;
        out[4..8].copy_from_slice(&self.entries_in_use.to_le_bytes());
        out[8..12].copy_from_slice(self.chunk_id.as_bytes());
        out[12..20].copy_from_slice(&self.base_offset.to_le_bytes());
        out
    }
}

/// Entry of a standard index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StdIndexEntry {
    /// Offset of the sample data from the base offset
    pub offset: u32,
    /// Sample size, bit 31 set for non-keyframes
    pub size: u32,
}

impl StdIndexEntry {
    /// Encoded size.
    pub const SIZE: usize = 8;

    /// Bit marking a sample that is not a keyframe.
    pub const DELTA_FRAME: u32 = 0x8000_0000;

    /// Entry for a sample `offset` bytes past the base.
    pub fn new(offset: u32, length: u32, keyframe: bool) -> Self {
        let size = if keyframe {
            length & !Self::DELTA_FRAME
        } else {
            length | Self::DELTA_FRAME
        };
        StdIndexEntry { offset, size }
    }

    /// Write to writer
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u32::<LittleEndian>(self.offset)?;
        writer.write_u32::<LittleEndian>(self.size)?;
        Ok(())
    }

    /// Check if this is a keyframe
    pub fn is_keyframe(&self) -> bool {
        self.size & Self::DELTA_FRAME == 0
    }
}

/// Header of a super index chunk (`indx`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuperIndexHeader {
    /// Number of entries in use
    pub entries_in_use: u32,
    /// Chunk tag of the indexed stream
    pub chunk_id: FourCC,
}

impl SuperIndexHeader {
    /// Encoded size.
    pub const SIZE: usize = 24;

    /// Write to writer
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.to_bytes())?;
        Ok(())
    }

    /// Encode as bytes; the last 12 bytes are reserved.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[0..2].copy_from_slice(&4u16.to_le_bytes()); // wLongsPerEntry
        out[3] = AVI_INDEX_OF_INDEXES;
        out[4..8].copy_from_slice(&self.entries_in_use.to_le_bytes());
        out[8..12].copy_from_slice(self.chunk_id.as_bytes());
        out
    }

    /// Read from data
    pub fn read(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(AviError::InsufficientData {
                needed: Self::SIZE,
                available: data.len(),
            });
        }
        let mut cursor = Cursor::new(&data[4..]);
        let entries_in_use = cursor.read_u32::<LittleEndian>()?;
        let mut id = [0u8; 4];
        cursor.read_exact(&mut id)?;
        Ok(SuperIndexHeader {
            entries_in_use,
            chunk_id: FourCC(id),
        })
    }
}

/// Entry of a super index, pointing at one standard index chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuperIndexEntry {
    /// Absolute offset of the `ix##` chunk header
    pub offset: u64,
    /// Size of the `ix##` chunk including its header
    pub size: u32,
    /// Number of samples the standard index covers
    pub duration: u32,
}

impl SuperIndexEntry {
    /// Encoded size.
    pub const SIZE: usize = 16;

    /// Write to writer
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u64::<LittleEndian>(self.offset)?;
        writer.write_u32::<LittleEndian>(self.size)?;
        writer.write_u32::<LittleEndian>(self.duration)?;
        Ok(())
    }

    /// Encode as bytes.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[0..8].copy_from_slice(&self.offset.to_le_bytes());
        out[8..12].copy_from_slice(&self.size.to_le_bytes());
        out[12..16].copy_from_slice(&self.duration.to_le_bytes());
        out
    }

    /// Read from data
    pub fn read(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(AviError::InsufficientData {
                needed: Self::SIZE,
                available: data.len(),
            });
        }
        let mut cursor = Cursor::new(data);
        Ok(SuperIndexEntry {
            offset: cursor.read_u64::<LittleEndian>()?,
            size: cursor.read_u32::<LittleEndian>()?,
            duration: cursor.read_u32::<LittleEndian>()?,
        })
    }
}
