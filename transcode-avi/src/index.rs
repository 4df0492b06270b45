//! Legacy and OpenDML index emission
//!
//! Both index flavours are built from the per-stream sample index kept by
//! the writer. Records are encoded into an [`IndexBatchBuffer`] and written
//! in bulk.
//!
//! The legacy `idx1` chunk lists every sample of the first RIFF segment,
//! interleaved across streams, with offsets relative to the `movi` tag.
//! Samples whose offset does not fit 31 bits are left out.
//!
//! OpenDML indexes are two-level. Each stream's samples are split into
//! groups of at most [`MAX_GROUP_SAMPLES`] sharing a 64-bit base offset,
//! each group becomes an `ix##` standard index chunk inside `movi`, and the
//! stream's `indx` super index (converted from the `JUNK` reservation in
//! its header list) points at every standard index.

use crate::chunks::{
    chunk_ids, stream_chunk_tag, ChunkType, IndexEntry, StdIndexEntry, StdIndexHeader,
    SuperIndexEntry, SuperIndexHeader,
};
use crate::error::{AviError, Result};
use crate::stream::{AviStream, SampleIndexEntry, SuperIndex};
use transcode_riff::{Backend, ChunkDescriptor, ChunkStack, IndexBatchBuffer, RiffError};

/// Most samples one standard index chunk may describe.
pub const MAX_GROUP_SAMPLES: usize = 2000;

/// Offsets within a standard index must stay below this distance from the base.
pub const MAX_GROUP_SPAN: u64 = 0x7FFF_0000;

/// Legacy index offsets must fit a signed 32-bit field.
const LEGACY_OFFSET_LIMIT: u64 = 0x8000_0000;

/// Smallest reservation that can be turned into a super index.
const MIN_SUPER_INDEX_RESERVE: u32 = 256;

/// A run of consecutive samples described by one standard index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleGroup {
    /// First sample of the group
    pub start: usize,
    /// One past the last sample of the group
    pub end: usize,
    /// Smallest sample offset in the group
    pub base: u64,
}

impl SampleGroup {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }
}

/// Split samples into standard index groups.
///
/// Groups are built greedily. A group ends after [`MAX_GROUP_SAMPLES`]
/// samples, or before the sample that would stretch the distance between
/// its smallest and largest offsets to [`MAX_GROUP_SPAN`] or more. Offsets
/// need not be increasing; repeated samples point back at earlier data.
pub fn group_samples(samples: &[SampleIndexEntry]) -> Vec<SampleGroup> {
    let mut groups = Vec::new();
    let mut start = 0;
    while start < samples.len() {
        let mut min = samples[start].offset;
        let mut max = min;
        let mut end = start + 1;
        while end < samples.len() && end - start < MAX_GROUP_SAMPLES {
            let offset = samples[end].offset;
            if offset > max {
                if offset - min >= MAX_GROUP_SPAN {
                    break;
                }
                max = offset;
            } else if offset < min {
                if max - offset >= MAX_GROUP_SPAN {
                    break;
                }
                min = offset;
            }
            end += 1;
        }
        groups.push(SampleGroup {
            start,
            end,
            base: min,
        });
        start = end;
    }
    groups
}

fn flush_batch<B: Backend>(stack: &mut ChunkStack<B>, batch: &mut IndexBatchBuffer) -> Result<()> {
    if !batch.pending().is_empty() {
        stack.write_top_all(batch.pending())?;
        batch.clear();
    }
    Ok(())
}

/// Write the `idx1` chunk at the current position (inside `RIFF:AVI`,
/// after `movi`). Returns the number of records written.
pub(crate) fn emit_legacy_index<B: Backend>(
    stack: &mut ChunkStack<B>,
    streams: &[AviStream],
    movi: &ChunkDescriptor,
) -> Result<usize> {
    // offsets count from the 'movi' list type, 4 bytes before the list data
    let movi_base = movi
        .data_offset()
        .ok_or(RiffError::Unresolved)?
        .saturating_sub(4);

    let mut chunk = stack.begin_chunk()?;
    chunk.set_as_data(chunk_ids::IDX1)?;
    stack.push(chunk)?;

    let tags: Vec<_> = streams.iter().map(|s| s.chunk_tag()).collect();
    let mut batch = IndexBatchBuffer::new(IndexEntry::SIZE);
    let mut written = 0usize;
    let mut skipped = 0usize;

    for slot in 0.. {
        let mut any = false;
        for (stream, tag) in streams.iter().zip(&tags) {
            let Some(sample) = stream.samples().get(slot) else {
                continue;
            };
            any = true;

            let relative = sample.offset.saturating_sub(8).saturating_sub(movi_base);
            if relative >= LEGACY_OFFSET_LIMIT {
                skipped += 1;
                continue;
            }
            if batch.is_full() {
                flush_batch(stack, &mut batch)?;
            }
            if let Some(mut record) = batch.next_record() {
                IndexEntry {
                    chunk_id: *tag,
                    flags: sample.flags,
                    offset: relative as u32,
                    size: sample.length,
                }
                .write(&mut record)?;
                written += 1;
            }
        }
        if !any {
            break;
        }
    }
    flush_batch(stack, &mut batch)?;
    stack.pop()?;

    if skipped > 0 {
        log::warn!("{} samples beyond 2 GB left out of the legacy index", skipped);
    }
    log::debug!("Wrote legacy index with {} entries", written);
    Ok(written)
}

/// Claim the next super index entry of `stream`, converting the `JUNK`
/// reservation on first use. Returns the entry offset relative to the
/// `indx` data, or `None` once the reservation is used up.
fn alloc_super_entry<B: Backend>(
    stack: &mut ChunkStack<B>,
    stream: &mut AviStream,
) -> Result<Option<u64>> {
    let tag = stream.chunk_tag();
    let (mut chunk, entries, next_entry) = match stream.super_index {
        SuperIndex::Reserved(junk) => {
            if junk.data_length() < MIN_SUPER_INDEX_RESERVE {
                stream.super_index = SuperIndex::Full;
                return Ok(None);
            }
            let mut chunk = junk;
            stack.seek(Some(&mut chunk), 0);
            chunk.set_as_data(chunk_ids::INDX)?;
            stack.sync_header(&chunk)?;
            (chunk, 1, SuperIndexHeader::SIZE as u64)
        }
        SuperIndex::Active {
            chunk,
            entries,
            next_entry,
        } => {
            if next_entry + SuperIndexEntry::SIZE as u64 > chunk.data_length() as u64 {
                stream.super_index = SuperIndex::Full;
                return Ok(None);
            }
            (chunk, entries + 1, next_entry)
        }
        SuperIndex::None | SuperIndex::Full => return Ok(None),
    };

    let header = SuperIndexHeader {
        entries_in_use: entries,
        chunk_id: tag,
    };
    stack.seek(Some(&mut chunk), 0);
    stack.write_all(&mut chunk, &header.to_bytes())?;

    stream.super_index = SuperIndex::Active {
        chunk,
        entries,
        next_entry: next_entry + SuperIndexEntry::SIZE as u64,
    };
    Ok(Some(next_entry))
}

fn write_super_entry<B: Backend>(
    stack: &mut ChunkStack<B>,
    stream: &AviStream,
    at: u64,
    entry: SuperIndexEntry,
) -> Result<()> {
    if let SuperIndex::Active { mut chunk, .. } = stream.super_index {
        stack.seek(Some(&mut chunk), at);
        stack.write_all(&mut chunk, &entry.to_bytes())?;
    }
    Ok(())
}

/// Write the standard indexes of every stream into the open `movi` list
/// and fill in the super indexes. Returns the number of `ix##` chunks.
///
/// A stream whose super index runs out of room stops being indexed; the
/// remaining streams are still processed.
pub(crate) fn emit_opendml_indexes<B: Backend>(
    stack: &mut ChunkStack<B>,
    streams: &mut [AviStream],
) -> Result<usize> {
    let mut batch = IndexBatchBuffer::new(StdIndexEntry::SIZE);
    let mut chunks = 0usize;

    for stream in streams.iter_mut() {
        if stream.samples().is_empty() || stream.super_index == SuperIndex::None {
            continue;
        }
        let tag = stream.chunk_tag();
        let ix_tag = stream_chunk_tag(stream.index(), ChunkType::Index);

        for group in group_samples(stream.samples()) {
            let Some(entry_at) = alloc_super_entry(stack, stream)? else {
                log::error!(
                    "{}, {} samples left without a standard index",
                    AviError::SuperIndexFull(stream.index()),
                    stream.sample_count() - group.start
                );
                break;
            };

            let mut chunk = stack.begin_chunk()?;
            chunk.set_as_data(ix_tag)?;
            stack.push(chunk)?;

            let header = StdIndexHeader {
                entries_in_use: group.len() as u32,
                chunk_id: tag,
                base_offset: group.base,
            };
            stack.write_top_all(&header.to_bytes())?;

            for sample in &stream.samples()[group.start..group.end] {
                if batch.is_full() {
                    flush_batch(stack, &mut batch)?;
                }
                if let Some(mut record) = batch.next_record() {
                    let relative = (sample.offset - group.base) as u32;
                    StdIndexEntry::new(relative, sample.length, sample.is_keyframe())
                        .write(&mut record)?;
                }
            }
            flush_batch(stack, &mut batch)?;
            let ix = stack.pop()?;

            write_super_entry(
                stack,
                stream,
                entry_at,
                SuperIndexEntry {
                    offset: ix.header_offset(),
                    size: ix.data_length() + 8,
                    duration: group.len() as u32,
                },
            )?;
            chunks += 1;
        }
    }

    log::debug!("Wrote {} OpenDML standard indexes", chunks);
    Ok(chunks)
}

/// Read the records of an `idx1` chunk.
///
/// `idx1` must come from a read-mode stack; its read cursor is advanced
/// to the end of the chunk. A trailing partial record is ignored.
pub fn read_legacy_index<B: Backend>(
    stack: &mut ChunkStack<B>,
    idx1: &mut ChunkDescriptor,
) -> Result<Vec<IndexEntry>> {
    if idx1.tag() != chunk_ids::IDX1 || idx1.is_container() {
        return Err(AviError::InvalidChunk {
            id: idx1.tag(),
            message: "not a legacy index chunk".into(),
        });
    }

    let mut entries = Vec::with_capacity(idx1.data_length() as usize / IndexEntry::SIZE);
    let mut batch = IndexBatchBuffer::new(IndexEntry::SIZE);
    loop {
        let n = stack.read(Some(idx1), batch.fill_region())?;
        if n == 0 {
            break;
        }
        batch.set_filled(n);
        while let Some(record) = batch.next_read_record() {
            let entry = IndexEntry::read(record)?;
            entries.push(entry);
            batch.advance_read();
        }
    }
    Ok(entries)
}
