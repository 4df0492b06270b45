//! Codec format records carried in `strf` and `fmt ` chunks.

use crate::error::{Result, RiffError};
use crate::fourcc::FourCC;
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Cursor, Read};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Video format (BITMAPINFOHEADER)
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BitmapInfoHeader {
    /// Structure size
    pub size: u32,
    /// Width in pixels
    pub width: i32,
    /// Height in pixels (negative for top-down)
    pub height: i32,
    /// Number of planes (always 1)
    pub planes: u16,
    /// Bits per pixel
    pub bit_count: u16,
    /// Compression FourCC, all zero for uncompressed RGB
    pub compression: FourCC,
    /// Image size in bytes
    pub image_size: u32,
    /// Horizontal resolution
    pub x_pels_per_meter: i32,
    /// Vertical resolution
    pub y_pels_per_meter: i32,
    /// Colors used
    pub colors_used: u32,
    /// Important colors
    pub colors_important: u32,
}

impl Default for BitmapInfoHeader {
    fn default() -> Self {
        BitmapInfoHeader {
            size: Self::SIZE as u32,
            width: 0,
            height: 0,
            planes: 1,
            bit_count: 24,
            compression: FourCC::NULL,
            image_size: 0,
            x_pels_per_meter: 0,
            y_pels_per_meter: 0,
            colors_used: 0,
            colors_important: 0,
        }
    }
}

impl BitmapInfoHeader {
    /// Encoded size.
    pub const SIZE: usize = 40;

    /// Header for a `width` x `height` picture in `compression`.
    pub fn new(width: i32, height: i32, compression: FourCC) -> Self {
        BitmapInfoHeader {
            width,
            height,
            compression,
            ..Default::default()
        }
    }

    /// Get absolute height (handles negative for top-down)
    pub fn abs_height(&self) -> u32 {
        self.height.unsigned_abs()
    }

    /// Uncompressed frames are stored in `##db` chunks.
    pub fn is_uncompressed(&self) -> bool {
        self.compression.is_null()
    }

    /// Encode as little-endian bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::SIZE);
        self.write_to(&mut out);
        out
    }

    fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.size.to_le_bytes());
        out.extend_from_slice(&self.width.to_le_bytes());
        out.extend_from_slice(&self.height.to_le_bytes());
        out.extend_from_slice(&self.planes.to_le_bytes());
        out.extend_from_slice(&self.bit_count.to_le_bytes());
        out.extend_from_slice(self.compression.as_bytes());
        out.extend_from_slice(&self.image_size.to_le_bytes());
        out.extend_from_slice(&self.x_pels_per_meter.to_le_bytes());
        out.extend_from_slice(&self.y_pels_per_meter.to_le_bytes());
        out.extend_from_slice(&self.colors_used.to_le_bytes());
        out.extend_from_slice(&self.colors_important.to_le_bytes());
    }

    /// Decode from the start of `data`.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(RiffError::InvalidFormat(format!(
                "BITMAPINFOHEADER needs {} bytes, got {}",
                Self::SIZE,
                data.len()
            )));
        }
        let mut cursor = Cursor::new(data);
        let size = cursor.read_u32::<LittleEndian>()?;
        let width = cursor.read_i32::<LittleEndian>()?;
        let height = cursor.read_i32::<LittleEndian>()?;
        let planes = cursor.read_u16::<LittleEndian>()?;
        let bit_count = cursor.read_u16::<LittleEndian>()?;
        let mut compression = [0u8; 4];
        cursor.read_exact(&mut compression)?;
        Ok(BitmapInfoHeader {
            size,
            width,
            height,
            planes,
            bit_count,
            compression: FourCC(compression),
            image_size: cursor.read_u32::<LittleEndian>()?,
            x_pels_per_meter: cursor.read_i32::<LittleEndian>()?,
            y_pels_per_meter: cursor.read_i32::<LittleEndian>()?,
            colors_used: cursor.read_u32::<LittleEndian>()?,
            colors_important: cursor.read_u32::<LittleEndian>()?,
        })
    }
}

/// Format tag values.
pub mod format_tag {
    pub const PCM: u16 = 0x0001;
    pub const IEEE_FLOAT: u16 = 0x0003;
    pub const ALAW: u16 = 0x0006;
    pub const MULAW: u16 = 0x0007;
    pub const MP3: u16 = 0x0055;
    pub const EXTENSIBLE: u16 = 0xFFFE;
}

/// Audio format (WAVEFORMAT / WAVEFORMATEX)
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct WaveFormat {
    /// Format tag
    pub format_tag: u16,
    /// Number of channels
    pub channels: u16,
    /// Samples per second
    pub samples_per_sec: u32,
    /// Average bytes per second
    pub avg_bytes_per_sec: u32,
    /// Block alignment
    pub block_align: u16,
    /// Bits per sample
    pub bits_per_sample: u16,
    /// Extra codec-specific data; `None` encodes the 16-byte PCM form
    /// without a `cbSize` field.
    pub extra_data: Option<Vec<u8>>,
}

impl Default for WaveFormat {
    fn default() -> Self {
        WaveFormat::pcm(2, 44100, 16)
    }
}

impl WaveFormat {
    /// Size of the PCM form.
    pub const PCM_SIZE: usize = 16;

    /// Size of WAVEFORMATEX without extra bytes.
    pub const EX_SIZE: usize = 18;

    /// Integer PCM with derived block alignment and byte rate.
    pub fn pcm(channels: u16, samples_per_sec: u32, bits_per_sample: u16) -> Self {
        let block_align = channels * bits_per_sample.div_ceil(8);
        WaveFormat {
            format_tag: format_tag::PCM,
            channels,
            samples_per_sec,
            avg_bytes_per_sec: samples_per_sec * block_align as u32,
            block_align,
            bits_per_sample,
            extra_data: None,
        }
    }

    /// Encoded size.
    pub fn encoded_len(&self) -> usize {
        match &self.extra_data {
            Some(extra) => Self::EX_SIZE + extra.len(),
            None => Self::PCM_SIZE,
        }
    }

    /// Encode as little-endian bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        out.extend_from_slice(&self.format_tag.to_le_bytes());
        out.extend_from_slice(&self.channels.to_le_bytes());
        out.extend_from_slice(&self.samples_per_sec.to_le_bytes());
        out.extend_from_slice(&self.avg_bytes_per_sec.to_le_bytes());
        out.extend_from_slice(&self.block_align.to_le_bytes());
        out.extend_from_slice(&self.bits_per_sample.to_le_bytes());
        if let Some(extra) = &self.extra_data {
            out.extend_from_slice(&(extra.len().min(u16::MAX as usize) as u16).to_le_bytes());
            out.extend_from_slice(extra);
        }
        out
    }

    /// Decode a PCM or WAVEFORMATEX record.
    ///
    /// A record of 18 bytes or more is read as WAVEFORMATEX and its
    /// `cbSize` must fit in the remaining bytes.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::PCM_SIZE {
            return Err(RiffError::InvalidFormat(format!(
                "WAVEFORMAT needs {} bytes, got {}",
                Self::PCM_SIZE,
                data.len()
            )));
        }
        let mut cursor = Cursor::new(data);
        let mut format = WaveFormat {
            format_tag: cursor.read_u16::<LittleEndian>()?,
            channels: cursor.read_u16::<LittleEndian>()?,
            samples_per_sec: cursor.read_u32::<LittleEndian>()?,
            avg_bytes_per_sec: cursor.read_u32::<LittleEndian>()?,
            block_align: cursor.read_u16::<LittleEndian>()?,
            bits_per_sample: cursor.read_u16::<LittleEndian>()?,
            extra_data: None,
        };
        if data.len() >= Self::EX_SIZE {
            let extra_len = cursor.read_u16::<LittleEndian>()? as usize;
            if Self::EX_SIZE + extra_len > data.len() {
                return Err(RiffError::InvalidFormat(format!(
                    "cbSize {} exceeds the {} bytes available",
                    extra_len,
                    data.len() - Self::EX_SIZE
                )));
            }
            format.extra_data = Some(data[Self::EX_SIZE..Self::EX_SIZE + extra_len].to_vec());
        }
        Ok(format)
    }

    /// Get format name
    pub fn format_name(&self) -> &'static str {
        match self.format_tag {
            format_tag::PCM => "PCM",
            format_tag::IEEE_FLOAT => "IEEE Float",
            format_tag::ALAW => "A-Law",
            format_tag::MULAW => "mu-Law",
            format_tag::MP3 => "MP3",
            format_tag::EXTENSIBLE => "Extensible",
            _ => "Unknown",
        }
    }
}

/// `nBlockAlign` of an encoded wave format, when the record is long enough.
pub fn wave_block_align(blob: &[u8]) -> Option<u16> {
    if blob.len() < 14 {
        return None;
    }
    Some(u16::from_le_bytes([blob[12], blob[13]]))
}

/// `biCompression` of an encoded bitmap header, when the record is long enough.
pub fn bitmap_compression(blob: &[u8]) -> Option<FourCC> {
    if blob.len() < 20 {
        return None;
    }
    Some(FourCC([blob[16], blob[17], blob[18], blob[19]]))
}
