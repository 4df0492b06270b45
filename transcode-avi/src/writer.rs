//! AVI writer
//!
//! [`AviWriter`] sequences chunk stack calls into an AVI file, optionally
//! extended with OpenDML (AVI 2.0) segments and indexes:
//!
//! ```text
//! RIFF 'AVI '
//!   LIST 'hdrl'
//!     avih
//!     LIST 'strl'  (per stream)
//!       strh, strf, [strn], [indx reserved as JUNK]
//!     [LIST 'odml' { dmlh }]
//!   LIST 'movi'
//!     ##dc / ##db / ##wb sample chunks
//!     [ix## standard indexes]
//!   [idx1]
//! [RIFF 'AVIX' { LIST 'movi' }] ...
//! ```
//!
//! The writer moves through [`WriterState`]s; every call checks it is made
//! in the right state and fails without side effects otherwise.

use crate::chunks::chunk_ids;
use crate::error::{AviError, Result};
use crate::index::{emit_legacy_index, emit_opendml_indexes};
use crate::stream::{AviStream, StreamHandle, SuperIndex};
use crate::types::{AviHeader, OpenDmlHeader, StreamHeader, StreamType};
use std::fmt;
use std::path::Path;
use transcode_riff::{
    containers, Backend, ChunkDescriptor, ChunkStack, FileBackend, FourCC, DATA_HEADER_SIZE,
};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Writer configuration
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AviWriterConfig {
    /// Write OpenDML super and standard indexes
    pub opendml_index: bool,
    /// Write the legacy `idx1` index for the first segment
    pub legacy_index: bool,
    /// Continue in `RIFF:AVIX` segments instead of stopping near 2 GB
    pub opendml: bool,
    /// Single-pass streaming: fewer seeks, outer sizes left as
    /// placeholders until the file is finished
    pub single_pass: bool,
    /// Maximum chunk nesting depth
    pub stack_depth: usize,
    /// `movi` size at which a new segment starts
    pub segment_limit: u64,
    /// File offset a non-OpenDML file may not reach
    pub legacy_limit: u64,
    /// Bytes reserved per stream for the super index
    pub super_index_reserve: u32,
}

impl Default for AviWriterConfig {
    fn default() -> Self {
        AviWriterConfig {
            opendml_index: true,
            legacy_index: true,
            opendml: true,
            single_pass: false,
            stack_depth: 256,
            segment_limit: 0x3FF0_0000, // 1GB - 16MB
            legacy_limit: 0x7FF0_0000,  // 2GB - 16MB
            super_index_reserve: 16384,
        }
    }
}

/// Writer lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    /// Streams may be declared and configured.
    Init,
    /// Headers written, waiting for `begin_data`.
    Header,
    /// Inside `movi`, accepting samples.
    Body,
    /// Data and indexes written, waiting for `finish`.
    Footer,
    /// Closed.
    Done,
}

impl fmt::Display for WriterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WriterState::Init => "init",
            WriterState::Header => "header",
            WriterState::Body => "body",
            WriterState::Footer => "footer",
            WriterState::Done => "done",
        };
        f.write_str(name)
    }
}

/// AVI writer
pub struct AviWriter<B: Backend = FileBackend> {
    stack: ChunkStack<B>,
    config: AviWriterConfig,
    state: WriterState,
    main_header: AviHeader,
    streams: Vec<AviStream>,
    avih: Option<ChunkDescriptor>,
    dmlh: Option<ChunkDescriptor>,
    movi: Option<ChunkDescriptor>,
    segment: u32,
    legacy_index_written: bool,
}

impl AviWriter<FileBackend> {
    /// Create or truncate `path`. The writer owns the file and closes it
    /// when dropped.
    pub fn create<P: AsRef<Path>>(path: P, config: AviWriterConfig) -> Result<Self> {
        let backend = FileBackend::open(path)?;
        Ok(AviWriter::new(backend, config))
    }
}

fn open_container<B: Backend>(
    stack: &mut ChunkStack<B>,
    container: FourCC,
    tag: FourCC,
    placeholder: bool,
) -> Result<()> {
    let mut chunk = stack.begin_chunk()?;
    chunk.set_as_container(container, tag)?;
    if placeholder {
        stack.mark_placeholder(&mut chunk);
    }
    stack.push(chunk)?;
    Ok(())
}

/// Write a complete data chunk and return its closed descriptor.
fn write_data_chunk<B: Backend>(
    stack: &mut ChunkStack<B>,
    tag: FourCC,
    payload: &[u8],
) -> Result<ChunkDescriptor> {
    let mut chunk = stack.begin_chunk()?;
    chunk.set_as_data(tag)?;
    stack.push(chunk)?;
    if !payload.is_empty() {
        stack.write_top_all(payload)?;
    }
    Ok(stack.pop()?)
}

/// Rewrite the payload of an already closed chunk.
fn patch_chunk<B: Backend>(
    stack: &mut ChunkStack<B>,
    chunk: Option<ChunkDescriptor>,
    payload: &[u8],
) -> Result<()> {
    if let Some(mut chunk) = chunk {
        if chunk.data_length() as usize >= payload.len() {
            stack.seek(Some(&mut chunk), 0);
            stack.write_all(&mut chunk, payload)?;
        }
    }
    Ok(())
}

impl<B: Backend> AviWriter<B> {
    /// Writer over `backend`.
    pub fn new(backend: B, config: AviWriterConfig) -> Self {
        AviWriter {
            stack: ChunkStack::for_writing(backend, config.stack_depth),
            config,
            state: WriterState::Init,
            main_header: AviHeader::default(),
            streams: Vec::new(),
            avih: None,
            dmlh: None,
            movi: None,
            segment: 0,
            legacy_index_written: false,
        }
    }

    fn require(&self, state: WriterState, operation: &'static str) -> Result<()> {
        if self.state != state {
            return Err(AviError::InvalidState {
                operation,
                state: self.state,
            });
        }
        Ok(())
    }

    fn stream_index(&self, stream: StreamHandle) -> Result<usize> {
        if stream.0 >= self.streams.len() {
            return Err(AviError::InvalidStream(stream.0));
        }
        Ok(stream.0)
    }

    /// Current state.
    pub fn state(&self) -> WriterState {
        self.state
    }

    /// Configuration in use.
    pub fn config(&self) -> &AviWriterConfig {
        &self.config
    }

    /// Number of RIFF segments started so far (`AVI ` plus `AVIX`es).
    /// The `AVI ` segment counts from `begin_header` on.
    pub fn segment_count(&self) -> u32 {
        if self.avih.is_some() {
            self.segment + 1
        } else {
            0
        }
    }

    /// Main header as it will be (or was) written.
    pub fn main_header(&self) -> &AviHeader {
        &self.main_header
    }

    /// Edit the main header. Frame count, stream count and index flags
    /// are filled in by the writer.
    pub fn main_header_mut(&mut self) -> Result<&mut AviHeader> {
        if self.state != WriterState::Init {
            return Err(AviError::InvalidState {
                operation: "main_header_mut",
                state: self.state,
            });
        }
        Ok(&mut self.main_header)
    }

    /// Borrow the chunk stack.
    pub fn stack(&self) -> &ChunkStack<B> {
        &self.stack
    }

    /// Switch to single-pass streaming. Only possible before the header
    /// is written; the discipline then holds for the whole file.
    pub fn set_single_pass_streaming(&mut self) -> Result<()> {
        self.require(WriterState::Init, "set_single_pass_streaming")?;
        self.config.single_pass = true;
        Ok(())
    }

    /// Declare a stream.
    pub fn new_stream(&mut self, stream_type: StreamType) -> Result<StreamHandle> {
        self.require(WriterState::Init, "new_stream")?;
        let index = self.streams.len();
        self.streams.push(AviStream::new(index, stream_type));
        Ok(StreamHandle(index))
    }

    /// Declared streams.
    pub fn streams(&self) -> &[AviStream] {
        &self.streams
    }

    /// Look up a stream.
    pub fn stream(&self, stream: StreamHandle) -> Result<&AviStream> {
        let index = self.stream_index(stream)?;
        Ok(&self.streams[index])
    }

    /// Edit a stream header before it is written. `length` may be preset;
    /// the larger of it and the computed length is stored at the end of data.
    pub fn stream_header_mut(&mut self, stream: StreamHandle) -> Result<&mut StreamHeader> {
        self.require(WriterState::Init, "stream_header_mut")?;
        let index = self.stream_index(stream)?;
        Ok(self.streams[index].header_mut())
    }

    /// Set the codec format record (BITMAPINFOHEADER, WAVEFORMATEX, ...)
    /// written into the stream's `strf` chunk.
    pub fn set_format(&mut self, stream: StreamHandle, format: impl Into<Vec<u8>>) -> Result<()> {
        self.require(WriterState::Init, "set_format")?;
        let index = self.stream_index(stream)?;
        self.streams[index].set_format(format.into());
        Ok(())
    }

    /// Set the name written into the stream's `strn` chunk.
    pub fn set_name(&mut self, stream: StreamHandle, name: impl Into<String>) -> Result<()> {
        self.require(WriterState::Init, "set_name")?;
        let index = self.stream_index(stream)?;
        self.streams[index].set_name(name.into());
        Ok(())
    }

    /// Override the derived sample chunk tag.
    pub fn set_chunk_tag(&mut self, stream: StreamHandle, tag: FourCC) -> Result<()> {
        self.require(WriterState::Init, "set_chunk_tag")?;
        let index = self.stream_index(stream)?;
        self.streams[index].set_chunk_tag(tag);
        Ok(())
    }

    /// Write `RIFF:AVI` and the complete `hdrl` list.
    pub fn begin_header(&mut self) -> Result<()> {
        self.require(WriterState::Init, "begin_header")?;
        self.main_header.streams = self.streams.len() as u32;

        let stack = &mut self.stack;
        let config = &self.config;
        open_container(stack, containers::RIFF, chunk_ids::AVI, config.single_pass)?;
        open_container(stack, containers::LIST, chunk_ids::HDRL, false)?;
        let avih = write_data_chunk(stack, chunk_ids::AVIH, &self.main_header.to_bytes())?;

        for stream in self.streams.iter_mut() {
            open_container(stack, containers::LIST, chunk_ids::STRL, false)?;
            stream.strh = Some(write_data_chunk(
                stack,
                chunk_ids::STRH,
                &stream.header().to_bytes(),
            )?);
            write_data_chunk(stack, chunk_ids::STRF, stream.format())?;
            if let Some(name) = stream.name() {
                let mut payload = name.as_bytes().to_vec();
                payload.push(0);
                write_data_chunk(stack, chunk_ids::STRN, &payload)?;
            }
            if config.opendml_index {
                let reserve = vec![0u8; config.super_index_reserve as usize];
                let junk = write_data_chunk(stack, chunk_ids::JUNK, &reserve)?;
                stream.super_index = SuperIndex::Reserved(junk);
            }
            stack.pop()?;
        }

        let mut dmlh = None;
        if config.opendml {
            open_container(stack, containers::LIST, chunk_ids::ODML, false)?;
            dmlh = Some(write_data_chunk(
                stack,
                chunk_ids::DMLH,
                &OpenDmlHeader::default().to_bytes(),
            )?);
            stack.pop()?;
        }

        stack.sync_all_open()?;
        self.avih = Some(avih);
        self.dmlh = dmlh;
        self.state = WriterState::Header;
        log::debug!("Wrote AVI header with {} streams", self.streams.len());
        Ok(())
    }

    /// Close the header lists and open `movi`.
    pub fn begin_data(&mut self) -> Result<()> {
        self.require(WriterState::Header, "begin_data")?;
        while self.stack.len() > 1 {
            self.stack.pop()?;
        }
        open_container(
            &mut self.stack,
            containers::LIST,
            chunk_ids::MOVI,
            self.config.single_pass,
        )?;
        self.stack.sync_all_open()?;
        self.movi = self.stack.top().copied();
        self.state = WriterState::Body;
        Ok(())
    }

    /// Pop back to `movi` and return its current write offset.
    fn enter_movi(&mut self) -> Result<ChunkDescriptor> {
        while self.stack.len() > 2 {
            self.stack.pop()?;
        }
        match self.stack.top() {
            Some(top) if top.tag() == chunk_ids::MOVI => Ok(*top),
            Some(top) => Err(AviError::InvalidChunk {
                id: top.tag(),
                message: "expected to be inside 'movi'".into(),
            }),
            None => Err(transcode_riff::RiffError::StackEmpty.into()),
        }
    }

    /// Make room for `additional` bytes in `movi`, starting a new segment
    /// or refusing the write when the current one is full.
    fn prepare_room(&mut self, additional: u64) -> Result<()> {
        let movi = self.enter_movi()?;
        if self.config.opendml {
            if movi.write_offset() + additional >= self.config.segment_limit
                || self.stack.would_exceed_limit(additional)
            {
                self.start_segment()?;
            }
        } else {
            let offset = movi.data_offset().unwrap_or(0) + movi.write_offset();
            if offset + additional >= self.config.legacy_limit {
                return Err(AviError::SegmentLimit {
                    offset,
                    requested: additional,
                    limit: self.config.legacy_limit,
                });
            }
        }
        Ok(())
    }

    /// Close the current segment and open `RIFF:AVIX` with a new `movi`.
    fn start_segment(&mut self) -> Result<()> {
        while self.stack.len() > 1 {
            self.stack.pop()?;
        }
        self.emit_legacy_index_once()?;
        self.stack.flush_and_close_segment()?;

        let placeholder = self.config.single_pass;
        open_container(&mut self.stack, containers::RIFF, chunk_ids::AVIX, placeholder)?;
        open_container(&mut self.stack, containers::LIST, chunk_ids::MOVI, placeholder)?;
        self.stack.sync_all_open()?;
        self.movi = self.stack.top().copied();
        self.segment += 1;

        log::info!(
            "Started AVI segment {} at offset {}",
            self.segment,
            self.stack.get(0).map_or(0, |c| c.header_offset())
        );
        Ok(())
    }

    /// The legacy index only ever describes the first segment.
    fn emit_legacy_index_once(&mut self) -> Result<()> {
        if self.segment != 0 || !self.config.legacy_index || self.legacy_index_written {
            return Ok(());
        }
        if let Some(movi) = self.movi {
            emit_legacy_index(&mut self.stack, &self.streams, &movi)?;
            self.legacy_index_written = true;
        }
        Ok(())
    }

    /// Write one sample to `stream`.
    ///
    /// `flags` are idx1 flags; pass [`IndexEntry::KEYFRAME`](crate::IndexEntry::KEYFRAME)
    /// for samples that can be decoded on their own. An empty `data`
    /// writes an empty chunk.
    pub fn write_sample(&mut self, stream: StreamHandle, data: &[u8], flags: u32) -> Result<()> {
        self.require(WriterState::Body, "write_sample")?;
        let index = self.stream_index(stream)?;
        self.prepare_room(data.len() as u64)?;

        let tag = self.streams[index].chunk_tag();
        let mut chunk = self.stack.begin_chunk()?;
        chunk.set_as_data(tag)?;
        self.stack.push(chunk)?;
        let offset = chunk.data_offset().unwrap_or(0);

        if self.config.single_pass {
            self.stack.stream_write(data)?;
        } else if !data.is_empty() {
            self.stack.write_top_all(data)?;
        }
        self.stack.pop()?;

        self.streams[index].push_sample(offset, data.len() as u32, flags);
        Ok(())
    }

    /// Advance `stream` by one sample without new data: an empty chunk is
    /// written and the index repeats the previous sample.
    pub fn repeat_last_sample(&mut self, stream: StreamHandle) -> Result<()> {
        self.require(WriterState::Body, "repeat_last_sample")?;
        let index = self.stream_index(stream)?;
        if self.streams[index].sample_count() == 0 {
            return Err(AviError::NothingToRepeat(index));
        }
        self.prepare_room(DATA_HEADER_SIZE)?;

        let tag = self.streams[index].chunk_tag();
        let mut chunk = self.stack.begin_chunk()?;
        chunk.set_as_data(tag)?;
        self.stack.push(chunk)?;
        if self.config.single_pass {
            self.stack.stream_write(&[])?;
        }
        self.stack.pop()?;

        self.streams[index].repeat_sample();
        Ok(())
    }

    /// Write the indexes, close `movi` and patch the headers with the
    /// final stream lengths and frame count.
    pub fn end_data(&mut self) -> Result<()> {
        self.require(WriterState::Body, "end_data")?;

        self.enter_movi()?;
        if self.config.opendml_index {
            emit_opendml_indexes(&mut self.stack, &mut self.streams)?;
        }
        while self.stack.len() > 1 {
            self.stack.pop()?;
        }
        self.emit_legacy_index_once()?;

        self.stack.sync_all_open()?;
        self.update_headers()?;
        self.state = WriterState::Footer;
        log::debug!(
            "Finished AVI data: {} segments, {} frames",
            self.segment + 1,
            self.main_header.total_frames
        );
        Ok(())
    }

    fn update_headers(&mut self) -> Result<()> {
        if self.config.legacy_index || self.config.opendml_index {
            self.main_header.flags.has_index = true;
            self.main_header.flags.must_use_index = true;
            self.main_header.flags.is_interleaved = true;
        }

        for stream in self.streams.iter_mut() {
            let length = stream.computed_length();
            stream.header_mut().length = length;
            patch_chunk(&mut self.stack, stream.strh, &stream.header().to_bytes())?;
        }

        self.main_header.total_frames = self
            .streams
            .iter()
            .find(|s| s.header().stream_type.is_video())
            .map_or(0, |s| s.header().length);
        patch_chunk(&mut self.stack, self.avih, &self.main_header.to_bytes())?;

        let dmlh = OpenDmlHeader {
            total_frames: self.main_header.total_frames,
        };
        patch_chunk(&mut self.stack, self.dmlh, &dmlh.to_bytes())?;
        Ok(())
    }

    /// Close every chunk, writing the true size into every header.
    pub fn finish(&mut self) -> Result<()> {
        self.require(WriterState::Footer, "finish")?;
        self.stack.flush_and_close_segment()?;
        self.state = WriterState::Done;
        log::debug!("AVI file complete, {} bytes", self.stack.next_write());
        Ok(())
    }

    /// Bring the file to a consistent end from whatever state it is in.
    pub fn close(&mut self) -> Result<()> {
        match self.state {
            WriterState::Init | WriterState::Done => {}
            WriterState::Header => self.stack.flush_and_close_segment()?,
            WriterState::Body => {
                self.end_data()?;
                self.finish()?;
            }
            WriterState::Footer => self.finish()?,
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

impl<B: Backend> Drop for AviWriter<B> {
    fn drop(&mut self) {
        if self.state == WriterState::Done || self.stack.backend().is_none() {
            return;
        }
        if let Err(e) = self.close() {
            log::warn!("Failed to close AVI writer on drop: {}", e);
        }
    }
}

impl<B: Backend> fmt::Debug for AviWriter<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AviWriter")
            .field("state", &self.state)
            .field("streams", &self.streams.len())
            .field("segment", &self.segment)
            .finish()
    }
}
