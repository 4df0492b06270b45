//! WAVE writer
//!
//! Layout: `RIFF:WAVE { "fmt " , data }`. Sample bytes go straight into the
//! open `data` chunk; there is no sample index.

use crate::error::{Result, WavError};
use std::fmt;
use std::path::Path;
use transcode_riff::{containers, Backend, ChunkStack, FileBackend, FourCC, WaveFormat};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// `WAVE` form type
pub const WAVE: FourCC = FourCC(*b"WAVE");
/// Format chunk
pub const FMT: FourCC = FourCC(*b"fmt ");
/// Sample data chunk
pub const DATA: FourCC = FourCC(*b"data");

/// Writer configuration
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct WavWriterConfig {
    /// Maximum chunk nesting depth
    pub stack_depth: usize,
}

impl Default for WavWriterConfig {
    fn default() -> Self {
        WavWriterConfig { stack_depth: 32 }
    }
}

/// Writer lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    /// Waiting for a format and `begin_header`.
    Init,
    /// `fmt ` written, waiting for `begin_data`.
    Header,
    /// Inside `data`.
    Data,
    /// `data` closed, waiting for `finish`.
    Footer,
    /// Closed.
    Done,
}

impl fmt::Display for WriterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WriterState::Init => "init",
            WriterState::Header => "header",
            WriterState::Data => "data",
            WriterState::Footer => "footer",
            WriterState::Done => "done",
        };
        f.write_str(name)
    }
}

/// Single-stream WAVE writer
pub struct WavWriter<B: Backend = FileBackend> {
    stack: ChunkStack<B>,
    state: WriterState,
    format: Vec<u8>,
}

impl WavWriter<FileBackend> {
    /// Create or truncate `path`; the writer owns the file.
    pub fn create<P: AsRef<Path>>(path: P, config: WavWriterConfig) -> Result<Self> {
        let backend = FileBackend::open(path)?;
        Ok(WavWriter::new(backend, config))
    }
}

impl<B: Backend> WavWriter<B> {
    /// Writer over `backend`.
    pub fn new(backend: B, config: WavWriterConfig) -> Self {
        WavWriter {
            stack: ChunkStack::for_writing(backend, config.stack_depth),
            state: WriterState::Init,
            format: Vec::new(),
        }
    }

    fn require(&self, state: WriterState, operation: &'static str) -> Result<()> {
        if self.state != state {
            return Err(WavError::InvalidState {
                operation,
                state: self.state,
            });
        }
        Ok(())
    }

    /// Current state.
    pub fn state(&self) -> WriterState {
        self.state
    }

    /// Format record that is (or will be) written into `fmt `.
    pub fn format(&self) -> &[u8] {
        &self.format
    }

    /// Borrow the chunk stack.
    pub fn stack(&self) -> &ChunkStack<B> {
        &self.stack
    }

    /// Use `format` for the `fmt ` chunk.
    pub fn set_format(&mut self, format: &WaveFormat) -> Result<()> {
        self.require(WriterState::Init, "set_format")?;
        self.format = format.to_bytes();
        Ok(())
    }

    /// Use a raw WAVEFORMAT(EX) record for the `fmt ` chunk. The record is
    /// stored as given once its `cbSize` is found consistent.
    pub fn set_format_raw(&mut self, format: &[u8]) -> Result<()> {
        self.require(WriterState::Init, "set_format_raw")?;
        WaveFormat::from_bytes(format)?;
        self.format = format.to_vec();
        Ok(())
    }

    /// Write `RIFF:WAVE` and the `fmt ` chunk.
    pub fn begin_header(&mut self) -> Result<()> {
        self.require(WriterState::Init, "begin_header")?;
        if self.format.is_empty() {
            return Err(WavError::MissingFormat);
        }

        let mut riff = self.stack.begin_chunk()?;
        riff.set_as_container(containers::RIFF, WAVE)?;
        self.stack.push(riff)?;

        let mut fmt = self.stack.begin_chunk()?;
        fmt.set_as_data(FMT)?;
        self.stack.push(fmt)?;
        self.stack.write_top_all(&self.format)?;
        self.stack.pop()?;

        self.state = WriterState::Header;
        Ok(())
    }

    /// Open the `data` chunk.
    pub fn begin_data(&mut self) -> Result<()> {
        self.require(WriterState::Header, "begin_data")?;
        let mut data = self.stack.begin_chunk()?;
        data.set_as_data(DATA)?;
        self.stack.push(data)?;
        self.stack.sync_all_open()?;
        self.state = WriterState::Data;
        Ok(())
    }

    /// Write sample bytes at the data cursor; returns the bytes accepted.
    pub fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.require(WriterState::Data, "write")?;
        Ok(self.stack.write_top(buf)?)
    }

    /// Write all of `buf` at the data cursor.
    pub fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        self.require(WriterState::Data, "write_all")?;
        Ok(self.stack.write_top_all(buf)?)
    }

    /// Move the data cursor, clamped to the bytes written so far.
    pub fn seek(&mut self, offset: u64) -> Result<u64> {
        self.require(WriterState::Data, "seek")?;
        Ok(self.stack.seek_top(offset)?)
    }

    /// Data cursor position.
    pub fn tell(&self) -> Result<u64> {
        self.require(WriterState::Data, "tell")?;
        Ok(self.stack.tell_top().unwrap_or(0))
    }

    /// Sample bytes in the `data` chunk so far.
    pub fn data_len(&self) -> u64 {
        match self.state {
            WriterState::Data => self.stack.top().map_or(0, |c| c.data_length() as u64),
            _ => 0,
        }
    }

    /// Close the `data` chunk.
    pub fn end_data(&mut self) -> Result<()> {
        self.require(WriterState::Data, "end_data")?;
        let data = self.stack.pop()?;
        self.state = WriterState::Footer;
        log::debug!("Closed WAVE data chunk, {} bytes", data.data_length());
        Ok(())
    }

    /// Rewrite every open header with the sizes written so far.
    pub fn sync(&mut self) -> Result<()> {
        if self.stack.is_empty() {
            return Ok(());
        }
        Ok(self.stack.sync_all_open()?)
    }

    /// Close every chunk.
    pub fn finish(&mut self) -> Result<()> {
        self.require(WriterState::Footer, "finish")?;
        self.stack.flush_and_close_segment()?;
        self.state = WriterState::Done;
        Ok(())
    }

    /// Bring the file to a consistent end from whatever state it is in.
    pub fn close(&mut self) -> Result<()> {
        match self.state {
            WriterState::Init | WriterState::Done => {}
            WriterState::Header | WriterState::Data | WriterState::Footer => {
                self.stack.flush_and_close_segment()?;
            }
        }
        self.state = WriterState::Done;
        Ok(())
    }

    /// Give up the backend without closing the file.
    pub fn into_backend(mut self) -> Option<B> {
        self.state = WriterState::Done;
        self.stack.unbind()
    }
}

impl<B: Backend> Drop for WavWriter<B> {
    fn drop(&mut self) {
        if self.state == WriterState::Done || self.stack.backend().is_none() {
            return;
        }
        if let Err(e) = self.close() {
            log::warn!("Failed to close WAV writer on drop: {}", e);
        }
    }
}

impl<B: Backend> fmt::Debug for WavWriter<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WavWriter")
            .field("state", &self.state)
            .field("format_len", &self.format.len())
            .finish()
    }
}
