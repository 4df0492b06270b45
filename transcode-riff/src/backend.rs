//! Byte-oriented destinations for the chunk stack
//!
//! The stack only needs three primitives: read, write, and an absolute
//! seek. [`FileBackend`] serves any seekable stream (usually a file),
//! [`BufferBackend`] serves a fixed-size in-memory region.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Read/seek/write primitives used by the chunk stack.
pub trait Backend {
    /// Read up to `buf.len()` bytes at the current position.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write `buf` at the current position, returning how much was accepted.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Move to an absolute offset, returning the offset actually reached.
    fn seek(&mut self, offset: u64) -> io::Result<u64>;

    /// Read until `buf` is full or the source runs dry.
    fn read_full(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut total = 0;
        while total < buf.len() {
            match self.read(&mut buf[total..])? {
                0 => break,
                n => total += n,
            }
        }
        Ok(total)
    }
}

impl<B: Backend + ?Sized> Backend for &mut B {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        (**self).write(buf)
    }

    fn seek(&mut self, offset: u64) -> io::Result<u64> {
        (**self).seek(offset)
    }
}

/// Backend over a seekable stream.
///
/// The backend owns whatever it wraps. Wrapping `&mut File` leaves the
/// file open when the backend is dropped; wrapping a `File` (for example
/// through [`FileBackend::open`]) closes it.
#[derive(Debug)]
pub struct FileBackend<T = File> {
    inner: T,
    position: Option<u64>,
    always_seek: bool,
}

impl FileBackend<File> {
    /// Create or truncate `path` and take ownership of the handle.
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Ok(FileBackend::new(file))
    }
}

impl<T: Read + Write + Seek> FileBackend<T> {
    /// Wrap a stream. Its position is treated as unknown until the first seek.
    pub fn new(inner: T) -> Self {
        FileBackend {
            inner,
            position: None,
            always_seek: false,
        }
    }

    /// Issue a real seek even when the tracked position already matches.
    pub fn set_always_seek(&mut self, always: bool) {
        self.always_seek = always;
    }

    /// Borrow the wrapped stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Unwrap the stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T: Read + Write + Seek> Backend for FileBackend<T> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let Some(pos) = self.position else {
            return Err(io::Error::new(io::ErrorKind::Other, "file position unknown"));
        };
        match self.inner.read(buf) {
            Ok(n) => {
                self.position = Some(pos + n as u64);
                Ok(n)
            }
            Err(e) => {
                self.position = None;
                Err(e)
            }
        }
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let Some(pos) = self.position else {
            return Err(io::Error::new(io::ErrorKind::Other, "file position unknown"));
        };
        match self.inner.write_all(buf) {
            Ok(()) => {
                self.position = Some(pos + buf.len() as u64);
                Ok(buf.len())
            }
            Err(e) => {
                self.position = None;
                Err(e)
            }
        }
    }

    fn seek(&mut self, offset: u64) -> io::Result<u64> {
        if !self.always_seek && self.position == Some(offset) {
            return Ok(offset);
        }
        match self.inner.seek(SeekFrom::Start(offset)) {
            Ok(pos) => {
                self.position = Some(pos);
                Ok(pos)
            }
            Err(e) => {
                self.position = None;
                Err(e)
            }
        }
    }
}

/// Backend over a bounded in-memory buffer.
///
/// Writes past the end of the buffer are cut short and seeks are clamped
/// to the buffer length.
#[derive(Debug)]
pub struct BufferBackend<B = Vec<u8>> {
    buffer: B,
    position: usize,
    high_water: usize,
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> BufferBackend<B> {
    /// Wrap a buffer. Its full length is the capacity of the backend.
    pub fn new(buffer: B) -> Self {
        BufferBackend {
            buffer,
            position: 0,
            high_water: 0,
        }
    }

    /// Buffer capacity.
    pub fn capacity(&self) -> usize {
        self.buffer.as_ref().len()
    }

    /// Furthest offset written so far.
    pub fn written_len(&self) -> usize {
        self.high_water
    }

    /// The bytes up to the furthest offset written so far.
    pub fn written(&self) -> &[u8] {
        &self.buffer.as_ref()[..self.high_water]
    }

    /// Unwrap the buffer.
    pub fn into_inner(self) -> B {
        self.buffer
    }
}

impl BufferBackend<Vec<u8>> {
    /// Zero-filled buffer of `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        BufferBackend::new(vec![0; capacity])
    }

    /// Unwrap the buffer, truncated to the written extent.
    pub fn into_written(self) -> Vec<u8> {
        let mut buffer = self.buffer;
        buffer.truncate(self.high_water);
        buffer
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> Backend for BufferBackend<B> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let data = self.buffer.as_ref();
        if self.position >= data.len() {
            return Ok(0);
        }
        let n = buf.len().min(data.len() - self.position);
        buf[..n].copy_from_slice(&data[self.position..self.position + n]);
        self.position += n;
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let data = self.buffer.as_mut();
        if self.position >= data.len() {
            return Ok(0);
        }
        let n = buf.len().min(data.len() - self.position);
        data[self.position..self.position + n].copy_from_slice(&buf[..n]);
        self.position += n;
        self.high_water = self.high_water.max(self.position);
        Ok(n)
    }

    fn seek(&mut self, offset: u64) -> io::Result<u64> {
        let len = self.buffer.as_ref().len();
        self.position = usize::try_from(offset).map_or(len, |o| o.min(len));
        Ok(self.position as u64)
    }
}
