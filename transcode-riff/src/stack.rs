//! Nested chunk stack
//!
//! [`ChunkStack`] keeps the chain of currently open chunks, innermost last.
//! Entry `i + 1` is always nested inside entry `i`. When writing, closing
//! a chunk extends every open ancestor so its declared length covers the
//! child, then rewrites the headers involved. A file cut short at any
//! point therefore still parses up to the last closed chunk.
//!
//! Two writing disciplines are supported:
//!
//! - patch-later: data goes through [`ChunkStack::write_top`], headers are
//!   rewritten whenever a chunk closes or [`ChunkStack::sync_all_open`] runs;
//! - single-pass: [`ChunkStack::stream_write`] commits the header and payload
//!   in one burst and closing the chunk does not seek back.
//!
//! Chunks whose extent is unknown for a long time (the outermost `RIFF`
//! of a long recording) can be marked as placeholders, in which case their
//! header carries [`PLACEHOLDER_LENGTH`](crate::PLACEHOLDER_LENGTH) until
//! they are closed.

use crate::backend::Backend;
use crate::chunk::{ChunkDescriptor, HeaderLength};
use crate::error::{Result, RiffError};
use crate::fourcc::{containers, FourCC};

/// Largest write cursor a chunk may reach: 2^31 - 2^24 bytes.
pub const LEGACY_CHUNK_LIMIT: u64 = 0x7F00_0000;

/// Distance from the outermost open chunk at which
/// [`ChunkStack::would_exceed_limit`] reports trouble.
pub const SEGMENT_DANGER_ZONE: u64 = 0x4000_0000;

/// Stack depth used when zero is requested.
pub const DEFAULT_DEPTH: usize = 32;

const MIN_DEPTH: usize = 16;
const MAX_DEPTH: usize = 512;

/// Bounded stack of open chunks over a [`Backend`].
#[derive(Debug)]
pub struct ChunkStack<B> {
    backend: Option<B>,
    chunks: Vec<ChunkDescriptor>,
    depth: usize,
    write_mode: bool,
    next_read: u64,
    next_write: u64,
    eof: bool,
}

impl<B: Backend> ChunkStack<B> {
    /// Empty, unbound stack in read mode.
    ///
    /// `depth` is clamped to 16..=512; zero selects [`DEFAULT_DEPTH`].
    pub fn new(depth: usize) -> Self {
        let depth = match depth {
            0 => DEFAULT_DEPTH,
            d => d.clamp(MIN_DEPTH, MAX_DEPTH),
        };
        ChunkStack {
            backend: None,
            chunks: Vec::with_capacity(depth),
            depth,
            write_mode: false,
            next_read: 0,
            next_write: 0,
            eof: false,
        }
    }

    /// Stack bound to `backend`, in read mode.
    pub fn with_backend(backend: B, depth: usize) -> Self {
        let mut stack = Self::new(depth);
        stack.backend = Some(backend);
        stack
    }

    /// Stack bound to `backend`, in write mode.
    pub fn for_writing(backend: B, depth: usize) -> Self {
        let mut stack = Self::with_backend(backend, depth);
        stack.write_mode = true;
        stack
    }

    /// Attach a backend, returning the previously bound one.
    ///
    /// The chunk state is reset; descriptors of the old destination
    /// make no sense for the new one.
    pub fn bind(&mut self, backend: B) -> Option<B> {
        self.reset();
        self.backend.replace(backend)
    }

    /// Detach the backend without touching any open chunk.
    pub fn unbind(&mut self) -> Option<B> {
        self.backend.take()
    }

    /// Consume the stack and return its backend.
    pub fn into_backend(self) -> Option<B> {
        self.backend
    }

    /// Borrow the bound backend.
    pub fn backend(&self) -> Option<&B> {
        self.backend.as_ref()
    }

    /// Switch between read and write mode.
    pub fn set_write_mode(&mut self, write: bool) -> Result<()> {
        if self.write_mode == write {
            return Ok(());
        }
        if !self.chunks.is_empty() {
            return Err(RiffError::ModeChange("chunks are still open"));
        }
        if write && self.next_read != 0 && !self.eof {
            return Err(RiffError::ModeChange("top-level read in progress"));
        }
        self.write_mode = write;
        Ok(())
    }

    /// Whether the stack is writing.
    pub fn is_write_mode(&self) -> bool {
        self.write_mode
    }

    /// Forget every open chunk and rewind the top-level cursors.
    /// Nothing is written.
    pub fn reset(&mut self) {
        self.chunks.clear();
        self.next_read = 0;
        self.next_write = 0;
        self.eof = false;
    }

    /// Whether no chunk is open.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Number of open chunks.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Maximum number of open chunks.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Innermost open chunk.
    pub fn top(&self) -> Option<&ChunkDescriptor> {
        self.chunks.last()
    }

    /// Open chunk at nesting level `level` (0 is outermost).
    pub fn get(&self, level: usize) -> Option<&ChunkDescriptor> {
        self.chunks.get(level)
    }

    /// Top-level end of data reached while reading.
    pub fn eof(&self) -> bool {
        self.chunks.is_empty() && self.eof
    }

    /// Top-level write cursor.
    pub fn next_write(&self) -> u64 {
        self.next_write
    }

    /// Top-level read cursor.
    pub fn next_read(&self) -> u64 {
        self.next_read
    }

    /// Absolute offset of the next unread byte in the innermost chunk.
    pub fn current_chunk_offset(&self) -> Option<u64> {
        let top = self.chunks.last()?;
        if top.read_offset + 8 > top.data_length as u64 {
            return None;
        }
        top.data_offset.map(|d| d + top.read_offset)
    }

    /// Start a chunk at the current write position.
    ///
    /// The returned descriptor has its header offset fixed; call
    /// [`ChunkDescriptor::set_as_data`] or
    /// [`ChunkDescriptor::set_as_container`] before pushing it.
    pub fn begin_chunk(&self) -> Result<ChunkDescriptor> {
        if !self.write_mode {
            return Err(RiffError::NotWriting);
        }
        let header_offset = match self.chunks.last() {
            Some(parent) => {
                if !parent.is_container() {
                    log::error!("attempt to start a chunk inside data chunk '{}'", parent.tag);
                    return Err(RiffError::NotAContainer(parent.tag));
                }
                parent.data_offset.ok_or(RiffError::Unresolved)? + parent.write_offset
            }
            None => self.next_write,
        };
        Ok(ChunkDescriptor::new_write(header_offset))
    }

    /// Open `chunk` as the new innermost chunk.
    pub fn push(&mut self, chunk: ChunkDescriptor) -> Result<()> {
        if self.chunks.len() >= self.depth {
            return Err(RiffError::StackFull(self.depth));
        }
        if chunk.write_mode && chunk.data_offset.is_none() {
            return Err(RiffError::Unresolved);
        }
        self.chunks.push(chunk);
        Ok(())
    }

    /// Close the innermost chunk and return its final descriptor.
    ///
    /// In write mode the chunk header is rewritten with its real size
    /// (unless a single-pass write already committed it), every open
    /// ancestor grows to cover it and has its header rewritten.
    pub fn pop(&mut self) -> Result<ChunkDescriptor> {
        let mut child = self.chunks.pop().ok_or(RiffError::StackEmpty)?;
        if !self.write_mode {
            return Ok(child);
        }

        // closing a chunk completes it, a placeholder must give way to the real size
        let sync = match child.length {
            HeaderLength::Committed => false,
            HeaderLength::Placeholder | HeaderLength::Tracked => {
                child.length = HeaderLength::Tracked;
                true
            }
        };
        child.cover(child.write_offset);

        let backend = self.backend.as_mut().ok_or(RiffError::NotBound)?;
        if sync {
            write_header(backend, &child)?;
            write_pad(backend, &child)?;
        }

        let mut end = child.data_end().ok_or(RiffError::Unresolved)?;
        if self.chunks.is_empty() {
            self.next_write = end;
            self.next_read = end;
            return Ok(child);
        }

        for ancestor in self.chunks.iter_mut().rev() {
            let Some(data) = ancestor.data_offset else { break };
            if end < data {
                break;
            }
            ancestor.cover(end - data);
            if ancestor.write_offset < end - data {
                ancestor.write_offset = end - data;
            }
            end = data + ancestor.aligned_length();
        }

        if sync {
            for ancestor in self.chunks.iter().rev() {
                write_header(backend, ancestor)?;
            }
        }
        Ok(child)
    }

    /// Mark `chunk` so its header carries the placeholder length until closed.
    pub fn mark_placeholder(&self, chunk: &mut ChunkDescriptor) {
        chunk.length = HeaderLength::Placeholder;
    }

    /// Position the read/write cursor of `chunk` (or of the top level).
    /// Chunk offsets are clamped to the declared length.
    pub fn seek(&mut self, chunk: Option<&mut ChunkDescriptor>, offset: u64) -> u64 {
        match chunk {
            Some(c) => {
                let offset = offset.min(c.data_length as u64);
                c.read_offset = offset;
                c.write_offset = offset;
                offset
            }
            None => {
                self.next_read = offset;
                self.next_write = offset;
                offset
            }
        }
    }

    /// Position the cursor of the innermost chunk.
    pub fn seek_top(&mut self, offset: u64) -> Result<u64> {
        let top = self.chunks.last_mut().ok_or(RiffError::StackEmpty)?;
        let offset = offset.min(top.data_length as u64);
        top.read_offset = offset;
        top.write_offset = offset;
        Ok(offset)
    }

    /// Current cursor of `chunk` (write cursor in write mode, read cursor
    /// otherwise), or of the top level.
    pub fn tell(&self, chunk: Option<&ChunkDescriptor>) -> u64 {
        match (chunk, self.write_mode) {
            (Some(c), true) => c.write_offset,
            (Some(c), false) => c.read_offset,
            (None, true) => self.next_write,
            (None, false) => self.next_read,
        }
    }

    /// Current cursor of the innermost chunk.
    pub fn tell_top(&self) -> Option<u64> {
        self.chunks.last().map(|c| self.tell(Some(c)))
    }

    /// Write into `chunk` at its write cursor, or at the top-level cursor
    /// when `chunk` is `None`. Returns the number of bytes accepted.
    pub fn write(&mut self, chunk: Option<&mut ChunkDescriptor>, buf: &[u8]) -> Result<usize> {
        if !self.write_mode {
            return Err(RiffError::NotWriting);
        }
        let backend = self.backend.as_mut().ok_or(RiffError::NotBound)?;
        match chunk {
            Some(c) => write_into(backend, c, buf),
            None => {
                seek_exact(backend, self.next_write)?;
                let n = backend.write(buf)?;
                self.next_write += n as u64;
                self.next_read = self.next_write;
                Ok(n)
            }
        }
    }

    /// Write into the innermost chunk.
    pub fn write_top(&mut self, buf: &[u8]) -> Result<usize> {
        if !self.write_mode {
            return Err(RiffError::NotWriting);
        }
        let backend = self.backend.as_mut().ok_or(RiffError::NotBound)?;
        let top = self.chunks.last_mut().ok_or(RiffError::StackEmpty)?;
        write_into(backend, top, buf)
    }

    /// Write all of `buf` into the innermost chunk, failing on a short write.
    pub fn write_top_all(&mut self, buf: &[u8]) -> Result<()> {
        let written = self.write_top(buf)?;
        if written < buf.len() {
            return Err(RiffError::ShortWrite {
                expected: buf.len(),
                written,
            });
        }
        Ok(())
    }

    /// Write all of `buf` into a detached chunk descriptor.
    pub fn write_all(&mut self, chunk: &mut ChunkDescriptor, buf: &[u8]) -> Result<()> {
        let written = self.write(Some(chunk), buf)?;
        if written < buf.len() {
            return Err(RiffError::ShortWrite {
                expected: buf.len(),
                written,
            });
        }
        Ok(())
    }

    /// Single-pass write of the whole payload of the innermost chunk.
    ///
    /// The final size is committed up front: the header and payload go out
    /// in one burst and closing the chunk will not seek back to rewrite the
    /// header. The chunk must be empty on entry. An empty `buf` produces
    /// an empty chunk.
    pub fn stream_write(&mut self, buf: &[u8]) -> Result<usize> {
        if !self.write_mode {
            return Err(RiffError::NotWriting);
        }
        let backend = self.backend.as_mut().ok_or(RiffError::NotBound)?;
        let top = self.chunks.last_mut().ok_or(RiffError::StackEmpty)?;
        if !top.write_mode {
            return Err(RiffError::NotWriting);
        }
        if top.write_offset != 0 {
            return Err(RiffError::StreamWriteReused(top.tag));
        }
        let len = buf.len() as u64;
        if len > LEGACY_CHUNK_LIMIT {
            return Err(RiffError::SizeLimit {
                tag: top.tag,
                requested: len,
            });
        }
        let data = top.data_offset.ok_or(RiffError::Unresolved)?;

        // assume the write completes
        top.write_offset = len;
        top.read_offset = len;
        top.data_length = len as u32;
        if top.length == HeaderLength::Placeholder {
            top.length = HeaderLength::Tracked;
        }

        let (header, header_len) = top.encode_header();
        seek_exact(backend, top.header_offset)?;
        let mut written = backend.write(&header[..header_len])?;
        if written == header_len && !buf.is_empty() {
            written = backend.write(buf)?;
            if written == buf.len() && len % 2 == 1 && backend.write(&[0])? < 1 {
                log::warn!("single-pass write of '{}' at {} lost its pad byte", top.tag, data);
                return Err(RiffError::ShortWrite {
                    expected: 1,
                    written: 0,
                });
            }
        } else if written < header_len {
            written = 0;
        }

        if written < buf.len() {
            top.write_offset = written as u64;
            top.read_offset = written as u64;
            top.data_length = written as u32;
            write_header(backend, top)?;
            log::warn!(
                "single-pass write of '{}' at {} cut short: {} of {} bytes",
                top.tag,
                data,
                written,
                buf.len()
            );
            return Err(RiffError::ShortWrite {
                expected: buf.len(),
                written,
            });
        }

        top.length = HeaderLength::Committed;
        Ok(buf.len())
    }

    /// Read from `chunk` (or the top level when `None`), clamped to the
    /// bytes remaining in the chunk's declared length.
    pub fn read(&mut self, chunk: Option<&mut ChunkDescriptor>, buf: &mut [u8]) -> Result<usize> {
        let backend = self.backend.as_mut().ok_or(RiffError::NotBound)?;
        match chunk {
            Some(c) => read_from(backend, c, buf),
            None => {
                seek_exact(backend, self.next_read)?;
                let n = backend.read_full(buf)?;
                self.next_read += n as u64;
                self.next_write = self.next_read;
                Ok(n)
            }
        }
    }

    /// Read from the innermost chunk.
    pub fn read_top(&mut self, buf: &mut [u8]) -> Result<usize> {
        let backend = self.backend.as_mut().ok_or(RiffError::NotBound)?;
        let top = self.chunks.last_mut().ok_or(RiffError::StackEmpty)?;
        read_from(backend, top, buf)
    }

    /// Parse the next chunk header inside `parent`, or at the top level.
    ///
    /// Returns `None` at the end of the parent's declared data, on a short
    /// read, or on an all-zero tag (treated as a logical end of data).
    /// The chunk is not pushed; push it to descend into a container.
    pub fn read_chunk(&mut self, parent: Option<&mut ChunkDescriptor>) -> Result<Option<ChunkDescriptor>> {
        if self.write_mode {
            return Err(RiffError::NotReading);
        }
        let backend = self.backend.as_mut().ok_or(RiffError::NotBound)?;
        match parent {
            Some(p) => read_child_chunk(backend, p),
            None => {
                if self.eof {
                    return Ok(None);
                }
                let offset = self.next_read;
                if backend.seek(offset)? != offset {
                    self.eof = true;
                    return Ok(None);
                }
                match parse_chunk_header(backend, offset)? {
                    ParsedHeader::Chunk(c) => {
                        self.next_read = c.next_chunk_offset;
                        self.next_write = c.next_chunk_offset;
                        Ok(Some(c))
                    }
                    ParsedHeader::End | ParsedHeader::Truncated => {
                        self.eof = true;
                        Ok(None)
                    }
                }
            }
        }
    }

    /// Parse the next chunk header inside the innermost open chunk.
    pub fn read_top_chunk(&mut self) -> Result<Option<ChunkDescriptor>> {
        if self.write_mode {
            return Err(RiffError::NotReading);
        }
        let backend = self.backend.as_mut().ok_or(RiffError::NotBound)?;
        let top = self.chunks.last_mut().ok_or(RiffError::StackEmpty)?;
        read_child_chunk(backend, top)
    }

    /// Rewrite the header of `chunk` in place.
    pub fn sync_header(&mut self, chunk: &ChunkDescriptor) -> Result<()> {
        if !self.write_mode || !chunk.write_mode {
            return Err(RiffError::NotWriting);
        }
        let backend = self.backend.as_mut().ok_or(RiffError::NotBound)?;
        write_header(backend, chunk)
    }

    /// Rewrite the header of every open chunk, innermost first. Each
    /// ancestor is first grown to cover what its open children hold.
    pub fn sync_all_open(&mut self) -> Result<()> {
        if !self.write_mode {
            return Err(RiffError::NotWriting);
        }
        let mut end: Option<u64> = None;
        for chunk in self.chunks.iter_mut().rev() {
            if let (Some(e), Some(data)) = (end, chunk.data_offset) {
                chunk.cover(e.saturating_sub(data));
            }
            end = chunk.data_end();
        }
        let backend = self.backend.as_mut().ok_or(RiffError::NotBound)?;
        for chunk in self.chunks.iter().rev() {
            write_header(backend, chunk)?;
        }
        Ok(())
    }

    /// Finalize and close every open chunk.
    ///
    /// Placeholder and committed states are dropped so the true sizes are
    /// written everywhere, then the stack is emptied and the top-level
    /// write cursor moves past the furthest extent written. Used before a
    /// new top-level segment starts and when a file is finished.
    pub fn flush_and_close_segment(&mut self) -> Result<()> {
        let mut furthest = self.next_write;
        for chunk in self.chunks.iter_mut() {
            chunk.length = HeaderLength::Tracked;
        }
        self.sync_all_open()?;
        while !self.chunks.is_empty() {
            let closed = self.pop()?;
            if let Some(end) = closed.data_end() {
                furthest = furthest.max(end);
            }
        }
        self.next_write = furthest;
        self.next_read = furthest;
        Ok(())
    }

    /// Would writing `additional` more bytes push any open chunk near 1 GB
    /// from the start of the outermost open chunk?
    pub fn would_exceed_limit(&self, additional: u64) -> bool {
        let Some(base) = self.chunks.first().and_then(|c| c.data_offset) else {
            return false;
        };
        self.chunks.iter().rev().any(|c| {
            let rel = c.data_offset.map_or(0, |d| d.saturating_sub(base));
            rel + c.write_offset + additional >= SEGMENT_DANGER_ZONE
        })
    }
}

enum ParsedHeader {
    Chunk(ChunkDescriptor),
    /// all-zero tag
    End,
    Truncated,
}

fn seek_exact<B: Backend + ?Sized>(backend: &mut B, offset: u64) -> Result<()> {
    if backend.seek(offset)? != offset {
        return Err(RiffError::SeekFailed(offset));
    }
    Ok(())
}

fn write_header<B: Backend + ?Sized>(backend: &mut B, chunk: &ChunkDescriptor) -> Result<()> {
    if chunk.data_offset.is_none() {
        return Err(RiffError::Unresolved);
    }
    let (header, len) = chunk.encode_header();
    seek_exact(backend, chunk.header_offset)?;
    let written = backend.write(&header[..len])?;
    if written < len {
        return Err(RiffError::ShortWrite {
            expected: len,
            written,
        });
    }
    Ok(())
}

fn write_pad<B: Backend + ?Sized>(backend: &mut B, chunk: &ChunkDescriptor) -> Result<()> {
    if chunk.data_length % 2 == 0 {
        return Ok(());
    }
    let data = chunk.data_offset.ok_or(RiffError::Unresolved)?;
    seek_exact(backend, data + chunk.data_length as u64)?;
    if backend.write(&[0])? < 1 {
        return Err(RiffError::ShortWrite {
            expected: 1,
            written: 0,
        });
    }
    Ok(())
}

fn write_into<B: Backend + ?Sized>(backend: &mut B, chunk: &mut ChunkDescriptor, buf: &[u8]) -> Result<usize> {
    if !chunk.write_mode {
        return Err(RiffError::NotWriting);
    }
    let data = chunk.data_offset.ok_or(RiffError::Unresolved)?;
    let requested = chunk.write_offset + buf.len() as u64;
    if requested > LEGACY_CHUNK_LIMIT {
        return Err(RiffError::SizeLimit {
            tag: chunk.tag,
            requested,
        });
    }
    seek_exact(backend, data + chunk.write_offset)?;
    let n = backend.write(buf)?;
    chunk.write_offset += n as u64;
    chunk.read_offset = chunk.write_offset;
    chunk.cover(chunk.write_offset);
    Ok(n)
}

fn read_from<B: Backend + ?Sized>(backend: &mut B, chunk: &mut ChunkDescriptor, buf: &mut [u8]) -> Result<usize> {
    let remaining = (chunk.data_length as u64).saturating_sub(chunk.read_offset);
    let len = remaining.min(buf.len() as u64) as usize;
    if len == 0 {
        return Ok(0);
    }
    let Some(data) = chunk.data_offset else {
        return Ok(0);
    };
    seek_exact(backend, data + chunk.read_offset)?;
    let n = backend.read_full(&mut buf[..len])?;
    chunk.read_offset += n as u64;
    chunk.write_offset = chunk.read_offset;
    Ok(n)
}

fn read_child_chunk<B: Backend + ?Sized>(
    backend: &mut B,
    parent: &mut ChunkDescriptor,
) -> Result<Option<ChunkDescriptor>> {
    let Some(data) = parent.data_offset else {
        return Ok(None);
    };
    if parent.read_offset + 8 > parent.data_length as u64 {
        return Ok(None);
    }
    let offset = data + parent.read_offset;
    if backend.seek(offset)? != offset {
        return Ok(None);
    }
    match parse_chunk_header(backend, offset)? {
        ParsedHeader::Chunk(c) => {
            parent.read_offset = c.next_chunk_offset - data;
            parent.write_offset = parent.read_offset;
            Ok(Some(c))
        }
        ParsedHeader::End => {
            parent.read_offset = parent.data_length as u64;
            parent.write_offset = parent.read_offset;
            Ok(None)
        }
        ParsedHeader::Truncated => Ok(None),
    }
}

/// Parse a chunk header at `offset`; the backend is already positioned there.
fn parse_chunk_header<B: Backend + ?Sized>(backend: &mut B, offset: u64) -> Result<ParsedHeader> {
    let mut buf = [0u8; 8];
    if backend.read_full(&mut buf)? < 8 {
        return Ok(ParsedHeader::Truncated);
    }

    let tag = FourCC([buf[0], buf[1], buf[2], buf[3]]);
    if tag.is_null() {
        return Ok(ParsedHeader::End);
    }
    let data_length = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);

    let mut chunk = ChunkDescriptor {
        header_offset: offset,
        data_offset: Some(offset + 8),
        next_chunk_offset: offset + 8 + ((data_length as u64 + 1) & !1),
        tag,
        container: None,
        data_length,
        read_offset: 0,
        write_offset: 0,
        write_mode: false,
        length: HeaderLength::Tracked,
    };

    if tag == containers::RIFF || tag == containers::LIST {
        // 12-byte header, the list type follows the length
        if data_length >= 4 {
            let mut sub = [0u8; 4];
            if backend.read_full(&mut sub)? < 4 {
                return Ok(ParsedHeader::Truncated);
            }
            chunk.container = Some(tag);
            chunk.tag = FourCC(sub);
            chunk.data_offset = Some(offset + 12);
            chunk.data_length = data_length - 4;
        } else {
            let mut sub = [0u8; 4];
            let want = data_length as usize;
            if backend.read_full(&mut sub[..want])? < want {
                return Ok(ParsedHeader::Truncated);
            }
            chunk.container = Some(tag);
            chunk.tag = FourCC(sub);
            chunk.data_offset = Some(offset + 8 + data_length as u64);
            chunk.data_length = 0;
        }
    }

    Ok(ParsedHeader::Chunk(chunk))
}
