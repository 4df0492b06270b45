//! AVI header records

use crate::error::{AviError, Result};
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Cursor, Read};
use transcode_riff::FourCC;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

fn check_len(data: &[u8], needed: usize) -> Result<()> {
    if data.len() < needed {
        return Err(AviError::InsufficientData {
            needed,
            available: data.len(),
        });
    }
    Ok(())
}

/// AVI main header (avih chunk)
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AviHeader {
    /// Microseconds per frame
    pub microseconds_per_frame: u32,
    /// Maximum bytes per second
    pub max_bytes_per_sec: u32,
    /// Padding granularity
    pub padding_granularity: u32,
    /// AVI flags
    pub flags: AviFlags,
    /// Total number of frames
    pub total_frames: u32,
    /// Initial frames (for interleaved files)
    pub initial_frames: u32,
    /// Number of streams
    pub streams: u32,
    /// Suggested buffer size
    pub suggested_buffer_size: u32,
    /// Video width
    pub width: u32,
    /// Video height
    pub height: u32,
}

impl AviHeader {
    /// Encoded size.
    pub const SIZE: usize = 56;

    /// Calculate frame rate in fps
    pub fn frame_rate(&self) -> f64 {
        if self.microseconds_per_frame > 0 {
            1_000_000.0 / self.microseconds_per_frame as f64
        } else {
            0.0
        }
    }

    /// Encode as little-endian bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::SIZE);
        for value in [
            self.microseconds_per_frame,
            self.max_bytes_per_sec,
            self.padding_granularity,
            self.flags.to_u32(),
            self.total_frames,
            self.initial_frames,
            self.streams,
            self.suggested_buffer_size,
            self.width,
            self.height,
            0,
            0,
            0,
            0,
        ] {
            out.extend_from_slice(&value.to_le_bytes());
        }
        out
    }

    /// Decode an `avih` payload.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        check_len(data, Self::SIZE)?;
        let mut cursor = Cursor::new(data);
        Ok(AviHeader {
            microseconds_per_frame: cursor.read_u32::<LittleEndian>()?,
            max_bytes_per_sec: cursor.read_u32::<LittleEndian>()?,
            padding_granularity: cursor.read_u32::<LittleEndian>()?,
            flags: AviFlags::from_u32(cursor.read_u32::<LittleEndian>()?),
            total_frames: cursor.read_u32::<LittleEndian>()?,
            initial_frames: cursor.read_u32::<LittleEndian>()?,
            streams: cursor.read_u32::<LittleEndian>()?,
            suggested_buffer_size: cursor.read_u32::<LittleEndian>()?,
            width: cursor.read_u32::<LittleEndian>()?,
            height: cursor.read_u32::<LittleEndian>()?,
        })
    }
}

impl Default for AviHeader {
    fn default() -> Self {
        AviHeader {
            microseconds_per_frame: 33333, // ~30 fps
            max_bytes_per_sec: 0,
            padding_granularity: 0,
            flags: AviFlags::default(),
            total_frames: 0,
            initial_frames: 0,
            streams: 0,
            suggested_buffer_size: 0,
            width: 0,
            height: 0,
        }
    }
}

/// AVI header flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AviFlags {
    /// File has an index
    pub has_index: bool,
    /// File must use index
    pub must_use_index: bool,
    /// File is interleaved
    pub is_interleaved: bool,
    /// Trust chunk type for seeking
    pub trust_chunk_type: bool,
    /// File was captured
    pub was_captured: bool,
    /// File is copyrighted
    pub is_copyrighted: bool,
}

impl AviFlags {
    pub const HAS_INDEX: u32 = 0x10;
    pub const MUST_USE_INDEX: u32 = 0x20;
    pub const IS_INTERLEAVED: u32 = 0x100;
    pub const TRUST_CK_TYPE: u32 = 0x800;
    pub const WAS_CAPTURE_FILE: u32 = 0x10000;
    pub const COPYRIGHTED: u32 = 0x20000;

    pub fn from_u32(value: u32) -> Self {
        AviFlags {
            has_index: (value & Self::HAS_INDEX) != 0,
            must_use_index: (value & Self::MUST_USE_INDEX) != 0,
            is_interleaved: (value & Self::IS_INTERLEAVED) != 0,
            trust_chunk_type: (value & Self::TRUST_CK_TYPE) != 0,
            was_captured: (value & Self::WAS_CAPTURE_FILE) != 0,
            is_copyrighted: (value & Self::COPYRIGHTED) != 0,
        }
    }

    pub fn to_u32(self) -> u32 {
        let mut value = 0u32;
        if self.has_index {
            value |= Self::HAS_INDEX;
        }
        if self.must_use_index {
            value |= Self::MUST_USE_INDEX;
        }
        if self.is_interleaved {
            value |= Self::IS_INTERLEAVED;
        }
        if self.trust_chunk_type {
            value |= Self::TRUST_CK_TYPE;
        }
        if self.was_captured {
            value |= Self::WAS_CAPTURE_FILE;
        }
        if self.is_copyrighted {
            value |= Self::COPYRIGHTED;
        }
        value
    }
}

/// Stream header (strh chunk)
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StreamHeader {
    /// Stream type (vids, auds, txts, mids)
    pub stream_type: StreamType,
    /// FourCC handler/codec
    pub handler: FourCC,
    /// Stream flags
    pub flags: u32,
    /// Priority
    pub priority: u16,
    /// Language
    pub language: u16,
    /// Initial frames
    pub initial_frames: u32,
    /// Time scale
    pub scale: u32,
    /// Rate (samples per second = rate/scale)
    pub rate: u32,
    /// Start time
    pub start: u32,
    /// Length (number of frames or audio samples). A preset value is kept
    /// when it is larger than the count computed at the end of data.
    pub length: u32,
    /// Suggested buffer size
    pub suggested_buffer_size: u32,
    /// Quality (0-10000)
    pub quality: u32,
    /// Sample size (0 for variable)
    pub sample_size: u32,
    /// Frame rectangle
    pub frame: Rect,
}

impl Default for StreamHeader {
    fn default() -> Self {
        StreamHeader {
            stream_type: StreamType::Video,
            handler: FourCC::NULL,
            flags: 0,
            priority: 0,
            language: 0,
            initial_frames: 0,
            scale: 1,
            rate: 30,
            start: 0,
            length: 0,
            suggested_buffer_size: 0,
            quality: 0,
            sample_size: 0,
            frame: Rect::default(),
        }
    }
}

impl StreamHeader {
    /// Encoded size.
    pub const SIZE: usize = 56;

    /// Default header for a stream of `stream_type`.
    pub fn new(stream_type: StreamType) -> Self {
        StreamHeader {
            stream_type,
            ..Default::default()
        }
    }

    /// Encode as little-endian bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::SIZE);
        out.extend_from_slice(&self.stream_type.to_fourcc());
        out.extend_from_slice(self.handler.as_bytes());
        out.extend_from_slice(&self.flags.to_le_bytes());
        out.extend_from_slice(&self.priority.to_le_bytes());
        out.extend_from_slice(&self.language.to_le_bytes());
        for value in [
            self.initial_frames,
            self.scale,
            self.rate,
            self.start,
            self.length,
            self.suggested_buffer_size,
            self.quality,
            self.sample_size,
        ] {
            out.extend_from_slice(&value.to_le_bytes());
        }
        for value in [self.frame.left, self.frame.top, self.frame.right, self.frame.bottom] {
            out.extend_from_slice(&value.to_le_bytes());
        }
        out
    }

    /// Decode a `strh` payload.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        check_len(data, Self::SIZE)?;
        let mut cursor = Cursor::new(data);
        let mut fcc = [0u8; 4];
        cursor.read_exact(&mut fcc)?;
        let stream_type = StreamType::from_fourcc(&fcc);
        cursor.read_exact(&mut fcc)?;
        let handler = FourCC(fcc);
        Ok(StreamHeader {
            stream_type,
            handler,
            flags: cursor.read_u32::<LittleEndian>()?,
            priority: cursor.read_u16::<LittleEndian>()?,
            language: cursor.read_u16::<LittleEndian>()?,
            initial_frames: cursor.read_u32::<LittleEndian>()?,
            scale: cursor.read_u32::<LittleEndian>()?,
            rate: cursor.read_u32::<LittleEndian>()?,
            start: cursor.read_u32::<LittleEndian>()?,
            length: cursor.read_u32::<LittleEndian>()?,
            suggested_buffer_size: cursor.read_u32::<LittleEndian>()?,
            quality: cursor.read_u32::<LittleEndian>()?,
            sample_size: cursor.read_u32::<LittleEndian>()?,
            frame: Rect {
                left: cursor.read_i16::<LittleEndian>()?,
                top: cursor.read_i16::<LittleEndian>()?,
                right: cursor.read_i16::<LittleEndian>()?,
                bottom: cursor.read_i16::<LittleEndian>()?,
            },
        })
    }
}

/// Stream type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum StreamType {
    Video,
    Audio,
    /// Interleaved DV (`iavs`)
    Interleaved,
    Text,
    Midi,
    Unknown([u8; 4]),
}

impl StreamType {
    pub fn from_fourcc(fourcc: &[u8; 4]) -> Self {
        match fourcc {
            b"vids" => StreamType::Video,
            b"auds" => StreamType::Audio,
            b"iavs" => StreamType::Interleaved,
            b"txts" => StreamType::Text,
            b"mids" => StreamType::Midi,
            _ => StreamType::Unknown(*fourcc),
        }
    }

    pub fn to_fourcc(self) -> [u8; 4] {
        match self {
            StreamType::Video => *b"vids",
            StreamType::Audio => *b"auds",
            StreamType::Interleaved => *b"iavs",
            StreamType::Text => *b"txts",
            StreamType::Midi => *b"mids",
            StreamType::Unknown(fourcc) => fourcc,
        }
    }

    /// Streams whose length is a frame count.
    pub fn is_video(self) -> bool {
        matches!(self, StreamType::Video | StreamType::Interleaved)
    }
}

/// Rectangle structure
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Rect {
    pub left: i16,
    pub top: i16,
    pub right: i16,
    pub bottom: i16,
}

/// OpenDML extended header (dmlh chunk)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpenDmlHeader {
    /// Frame count across every RIFF segment
    pub total_frames: u32,
}

impl OpenDmlHeader {
    /// Encoded size, mostly reserved space.
    pub const SIZE: usize = 248;

    /// Encode as little-endian bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = vec![0u8; Self::SIZE];
        out[0..4].copy_from_slice(&self.total_frames.to_le_bytes());
        out
    }

    /// Decode a `dmlh` payload.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        check_len(data, 4)?;
        Ok(OpenDmlHeader {
            total_frames: u32::from_le_bytes([data[0], data[1], data[2], data[3]]),
        })
    }
}
