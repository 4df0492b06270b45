//! Scratch region for batching fixed-size index records.
//!
//! Index chunks hold thousands of small records. Writing each through the
//! stack would cost a seek and a write per record, so records are encoded
//! into one reusable region and flushed in bulk.
//!
//! ```
//! use transcode_riff::IndexBatchBuffer;
//!
//! let mut batch = IndexBatchBuffer::new(16);
//! while let Some(slot) = batch.next_record() {
//!     slot.fill(0xAB);
//!     if batch.is_full() {
//!         break;
//!     }
//! }
//! assert_eq!(batch.pending().len(), batch.fence());
//! ```

/// Size of the scratch region.
pub const BATCH_REGION_SIZE: usize = 128 * 1024;

/// Reusable scratch region holding a whole number of fixed-size records.
#[derive(Debug)]
pub struct IndexBatchBuffer {
    region: Vec<u8>,
    record_size: usize,
    fence: usize,
    write_pos: usize,
    read_pos: usize,
    read_len: usize,
}

impl IndexBatchBuffer {
    /// Allocate a region for records of `record_size` bytes.
    pub fn new(record_size: usize) -> Self {
        let record_size = record_size.clamp(1, BATCH_REGION_SIZE);
        let fence = BATCH_REGION_SIZE / record_size * record_size;
        IndexBatchBuffer {
            region: vec![0; BATCH_REGION_SIZE],
            record_size,
            fence,
            write_pos: 0,
            read_pos: 0,
            read_len: 0,
        }
    }

    /// Reuse the region for a different record size. Both cursors reset.
    pub fn reinit(&mut self, record_size: usize) {
        self.record_size = record_size.clamp(1, BATCH_REGION_SIZE);
        self.fence = BATCH_REGION_SIZE / self.record_size * self.record_size;
        self.clear();
        self.read_pos = 0;
        self.read_len = 0;
    }

    /// Size of one record.
    pub fn record_size(&self) -> usize {
        self.record_size
    }

    /// End of the last whole record that fits in the region.
    pub fn fence(&self) -> usize {
        self.fence
    }

    /// Number of records the region holds.
    pub fn capacity(&self) -> usize {
        self.fence / self.record_size
    }

    /// Claim the next record slot, or `None` when the fence is reached.
    pub fn next_record(&mut self) -> Option<&mut [u8]> {
        if self.write_pos + self.record_size > self.fence {
            return None;
        }
        let start = self.write_pos;
        self.write_pos += self.record_size;
        Some(&mut self.region[start..self.write_pos])
    }

    /// Whether the write cursor has reached the fence and the batch must
    /// be flushed before the next record.
    pub fn is_full(&self) -> bool {
        self.write_pos >= self.fence
    }

    /// Number of records waiting to be flushed.
    pub fn pending_records(&self) -> usize {
        self.write_pos / self.record_size
    }

    /// Encoded records waiting to be flushed.
    pub fn pending(&self) -> &[u8] {
        &self.region[..self.write_pos]
    }

    /// Drop the pending records after a flush.
    pub fn clear(&mut self) {
        self.write_pos = 0;
    }

    /// Region to fill with raw records before reading them back.
    ///
    /// Call [`set_filled`](Self::set_filled) with the number of bytes
    /// actually placed in it.
    pub fn fill_region(&mut self) -> &mut [u8] {
        self.read_pos = 0;
        self.read_len = 0;
        &mut self.region[..self.fence]
    }

    /// Record how many bytes were placed by [`fill_region`](Self::fill_region).
    /// A trailing partial record is ignored.
    pub fn set_filled(&mut self, len: usize) {
        let len = len.min(self.fence);
        self.read_len = len - len % self.record_size;
        self.read_pos = 0;
    }

    /// Next unread record, or `None` once the filled region is consumed.
    pub fn next_read_record(&self) -> Option<&[u8]> {
        if self.read_pos + self.record_size > self.read_len {
            return None;
        }
        Some(&self.region[self.read_pos..self.read_pos + self.record_size])
    }

    /// Advance the read cursor past the current record.
    pub fn advance_read(&mut self) {
        self.read_pos = (self.read_pos + self.record_size).min(self.read_len);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fence_is_record_aligned() {
        let b = IndexBatchBuffer::new(24);
        assert_eq!(b.fence() % 24, 0);
        assert!(BATCH_REGION_SIZE - b.fence() < 24);
        assert_eq!(b.capacity(), BATCH_REGION_SIZE / 24);

        let b = IndexBatchBuffer::new(16);
        assert_eq!(b.fence(), BATCH_REGION_SIZE);
    }

    #[test]
    fn test_fill_until_full() {
        let mut b = IndexBatchBuffer::new(8);
        let mut count = 0;
        while let Some(slot) = b.next_record() {
            slot.copy_from_slice(&(count as u64).to_le_bytes());
            count += 1;
        }
        assert!(b.is_full());
        assert_eq!(count, b.capacity());
        assert_eq!(b.pending_records(), count);
        assert_eq!(&b.pending()[8..16], &1u64.to_le_bytes());

        b.clear();
        assert!(!b.is_full());
        assert!(b.pending().is_empty());
    }

    #[test]
    fn test_read_back() {
        let mut b = IndexBatchBuffer::new(4);
        let region = b.fill_region();
        region[..10].copy_from_slice(b"aaaabbbbcc");
        b.set_filled(10);

        assert_eq!(b.next_read_record(), Some(&b"aaaa"[..]));
        b.advance_read();
        assert_eq!(b.next_read_record(), Some(&b"bbbb"[..]));
        b.advance_read();
        // the partial trailing record is never returned
        assert_eq!(b.next_read_record(), None);
    }

    #[test]
    fn test_reinit() {
        let mut b = IndexBatchBuffer::new(16);
        b.next_record().unwrap();
        b.reinit(8);
        assert_eq!(b.record_size(), 8);
        assert_eq!(b.pending_records(), 0);
    }
}
