//! Integration tests for the chunk stack over file and buffer backends.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};

use transcode_riff::{
    containers, BufferBackend, ChunkStack, FileBackend, FourCC, HeaderLength, RiffError,
    PLACEHOLDER_LENGTH,
};

fn le32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes(bytes[at..at + 4].try_into().unwrap())
}

fn open_container<B: transcode_riff::Backend>(stack: &mut ChunkStack<B>, container: FourCC, tag: &[u8; 4]) {
    let mut c = stack.begin_chunk().unwrap();
    c.set_as_container(container, FourCC::new(*tag)).unwrap();
    stack.push(c).unwrap();
}

fn open_data<B: transcode_riff::Backend>(stack: &mut ChunkStack<B>, tag: &[u8; 4]) {
    let mut c = stack.begin_chunk().unwrap();
    c.set_as_data(FourCC::new(*tag)).unwrap();
    stack.push(c).unwrap();
}

#[test]
fn test_every_close_leaves_parseable_file() {
    let mut stack = ChunkStack::for_writing(BufferBackend::with_capacity(1024), 0);
    open_container(&mut stack, containers::RIFF, b"TEST");
    open_container(&mut stack, containers::LIST, b"outr");

    for i in 0..5u8 {
        open_data(&mut stack, b"blob");
        stack.write_top_all(&vec![i; 3 + i as usize]).unwrap();
        stack.pop().unwrap();

        // a crash here must leave a file whose declared sizes cover everything written
        let snapshot = stack.backend().unwrap().written().to_vec();
        let riff_len = le32(&snapshot, 4) as usize;
        assert_eq!(riff_len + 8, snapshot.len());
        let list_len = le32(&snapshot, 16) as usize;
        assert_eq!(list_len + 20, snapshot.len());
    }
}

#[test]
fn test_placeholder_survives_until_close() {
    let mut stack = ChunkStack::for_writing(BufferBackend::with_capacity(1024), 0);
    let mut riff = stack.begin_chunk().unwrap();
    riff.set_as_container(containers::RIFF, FourCC::new(*b"AVI "))
        .unwrap();
    stack.mark_placeholder(&mut riff);
    stack.push(riff).unwrap();

    open_data(&mut stack, b"junk");
    stack.write_top_all(&[1, 2, 3, 4]).unwrap();
    stack.pop().unwrap();

    let snapshot = stack.backend().unwrap().written().to_vec();
    assert_eq!(le32(&snapshot, 4), PLACEHOLDER_LENGTH);
    assert_eq!(
        stack.top().unwrap().header_length(),
        HeaderLength::Placeholder
    );

    stack.flush_and_close_segment().unwrap();
    let bytes = stack.into_backend().unwrap().into_written();
    assert_eq!(le32(&bytes, 4), 16);
}

#[test]
fn test_segments_follow_each_other() {
    let mut stack = ChunkStack::for_writing(BufferBackend::with_capacity(1024), 0);
    open_container(&mut stack, containers::RIFF, b"AVI ");
    open_data(&mut stack, b"abcd");
    stack.write_top_all(b"12345").unwrap();
    stack.flush_and_close_segment().unwrap();
    assert_eq!(stack.next_write(), 26);

    open_container(&mut stack, containers::RIFF, b"AVIX");
    assert_eq!(stack.top().unwrap().header_offset(), 26);
    stack.flush_and_close_segment().unwrap();

    let bytes = stack.into_backend().unwrap().into_written();
    let mut reader = ChunkStack::with_backend(BufferBackend::new(bytes), 0);
    let first = reader.read_chunk(None).unwrap().unwrap();
    assert_eq!(first.tag(), FourCC::new(*b"AVI "));
    let second = reader.read_chunk(None).unwrap().unwrap();
    assert_eq!(second.tag(), FourCC::new(*b"AVIX"));
    assert_eq!(second.data_length(), 0);
    assert!(reader.read_chunk(None).unwrap().is_none());
}

#[test]
fn test_bounded_buffer_short_write() {
    let mut stack = ChunkStack::for_writing(BufferBackend::with_capacity(20), 0);
    open_container(&mut stack, containers::RIFF, b"TEST");
    open_data(&mut stack, b"data");
    let err = stack.write_top_all(&[0u8; 16]).unwrap_err();
    assert!(matches!(
        err,
        RiffError::ShortWrite {
            expected: 16,
            written: 0
        }
    ));
}

#[test]
fn test_file_backend_owned() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested.riff");

    let backend = FileBackend::open(&path).unwrap();
    let mut stack = ChunkStack::for_writing(backend, 0);
    open_container(&mut stack, containers::RIFF, b"TEST");
    open_data(&mut stack, b"note");
    stack.write_top_all(b"abc").unwrap();
    stack.pop().unwrap();
    stack.pop().unwrap();
    drop(stack);

    let bytes = std::fs::read(&path).unwrap();
    assert_eq!(bytes.len(), 24);
    assert_eq!(le32(&bytes, 4), 16);
    assert_eq!(&bytes[20..23], b"abc");
}

#[test]
fn test_file_backend_borrowed_stays_open() {
    let mut file: File = tempfile::tempfile().unwrap();
    {
        let mut stack = ChunkStack::for_writing(FileBackend::new(&mut file), 0);
        open_container(&mut stack, containers::RIFF, b"TEST");
        stack.pop().unwrap();
    }

    // the stack only borrowed the handle
    file.seek(SeekFrom::Start(0)).unwrap();
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes).unwrap();
    assert_eq!(&bytes, b"RIFF\x04\x00\x00\x00TEST");
}

#[test]
fn test_rebind_resets_state() {
    let mut stack = ChunkStack::for_writing(BufferBackend::with_capacity(64), 0);
    open_container(&mut stack, containers::RIFF, b"TEST");
    let old = stack.bind(BufferBackend::with_capacity(64));
    assert!(old.is_some());
    assert!(stack.is_empty());
    assert_eq!(stack.next_write(), 0);
    assert!(stack.unbind().is_some());
    assert!(matches!(stack.write(None, b"x"), Err(RiffError::NotBound)));
}
