#![no_main]

//! Fuzz target for RIFF chunk parsing.
//!
//! Walks arbitrary bytes as a chunk tree through a read-mode chunk stack
//! and reads `idx1` records back, looking for panics and runaway loops.

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use transcode_riff::{BufferBackend, ChunkStack};

#[derive(Arbitrary, Debug)]
struct RiffInput {
    data: Vec<u8>,
    operation: RiffOperation,
}

#[derive(Arbitrary, Debug)]
enum RiffOperation {
    /// Walk every chunk depth-first
    WalkTree { max_depth: u8 },
    /// Read payload bytes of top-level chunks
    ReadPayloads { chunk_size: u16 },
    /// Parse any `idx1` found in the first RIFF form
    ReadLegacyIndex,
    /// Seek then read inside the first chunk
    SeekAndRead { offset: u32, len: u16 },
}

fuzz_target!(|input: RiffInput| {
    // Limit input size to prevent excessive memory allocation
    if input.data.len() > 64 * 1024 {
        return;
    }
    let mut stack = ChunkStack::with_backend(BufferBackend::new(input.data), 0);

    match input.operation {
        RiffOperation::WalkTree { max_depth } => {
            let max_depth = (max_depth as usize).clamp(1, 64);
            let mut visited = 0usize;
            loop {
                let next = if stack.is_empty() {
                    stack.read_chunk(None)
                } else {
                    stack.read_top_chunk()
                };
                match next {
                    Ok(Some(chunk)) => {
                        visited += 1;
                        // every chunk advances its parent's cursor
                        assert!(visited <= 64 * 1024);
                        if chunk.is_container() && stack.len() < max_depth {
                            let _ = stack.push(chunk);
                        }
                    }
                    _ => {
                        if stack.pop().is_err() {
                            break;
                        }
                    }
                }
            }
        }

        RiffOperation::ReadPayloads { chunk_size } => {
            let mut buf = vec![0u8; chunk_size.max(1) as usize];
            while let Ok(Some(mut chunk)) = stack.read_chunk(None) {
                let mut total = 0u64;
                while let Ok(n) = stack.read(Some(&mut chunk), &mut buf) {
                    if n == 0 {
                        break;
                    }
                    total += n as u64;
                }
                assert!(total <= chunk.data_length() as u64);
            }
        }

        RiffOperation::ReadLegacyIndex => {
            if let Ok(Some(mut riff)) = stack.read_chunk(None) {
                while let Ok(Some(mut chunk)) = stack.read_chunk(Some(&mut riff)) {
                    if chunk.tag() == transcode_avi::chunk_ids::IDX1 {
                        let _ = transcode_avi::read_legacy_index(&mut stack, &mut chunk);
                    }
                }
            }
        }

        RiffOperation::SeekAndRead { offset, len } => {
            if let Ok(Some(mut chunk)) = stack.read_chunk(None) {
                let at = stack.seek(Some(&mut chunk), offset as u64);
                assert!(at <= chunk.data_length() as u64);
                let mut buf = vec![0u8; len as usize];
                let _ = stack.read(Some(&mut chunk), &mut buf);
            }
        }
    }
});
