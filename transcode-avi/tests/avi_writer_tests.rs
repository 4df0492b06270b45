//! End-to-end tests: write AVI files and parse them back with a reading
//! chunk stack.

use std::fs;

use transcode_avi::{
    chunk_ids, read_legacy_index, AviError, AviHeader, AviWriter, AviWriterConfig, IndexEntry,
    StreamHeader, StreamType, SuperIndexEntry, SuperIndexHeader, WriterState,
};
use transcode_riff::{
    containers, BitmapInfoHeader, BufferBackend, ChunkDescriptor, ChunkStack, FourCC, WaveFormat,
    PLACEHOLDER_LENGTH,
};

type Reader = ChunkStack<BufferBackend<Vec<u8>>>;

fn le32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes(bytes[at..at + 4].try_into().unwrap())
}

fn buffer_writer(config: AviWriterConfig) -> AviWriter<BufferBackend> {
    AviWriter::new(BufferBackend::with_capacity(4 << 20), config)
}

fn finish(mut writer: AviWriter<BufferBackend>) -> Vec<u8> {
    writer.end_data().unwrap();
    writer.finish().unwrap();
    writer.into_backend().unwrap().into_written()
}

fn reader(bytes: Vec<u8>) -> Reader {
    ChunkStack::with_backend(BufferBackend::new(bytes), 0)
}

fn top_level(stack: &mut Reader) -> Vec<ChunkDescriptor> {
    let mut out = Vec::new();
    while let Some(c) = stack.read_chunk(None).unwrap() {
        out.push(c);
    }
    out
}

fn children(stack: &mut Reader, parent: &ChunkDescriptor) -> Vec<ChunkDescriptor> {
    let mut parent = *parent;
    let mut out = Vec::new();
    while let Some(c) = stack.read_chunk(Some(&mut parent)).unwrap() {
        out.push(c);
    }
    out
}

fn find(chunks: &[ChunkDescriptor], tag: FourCC) -> ChunkDescriptor {
    *chunks
        .iter()
        .find(|c| c.tag() == tag)
        .unwrap_or_else(|| panic!("no '{}' chunk", tag))
}

fn payload(stack: &mut Reader, chunk: &ChunkDescriptor) -> Vec<u8> {
    let mut chunk = *chunk;
    let mut out = vec![0u8; chunk.data_length() as usize];
    let mut filled = 0;
    while filled < out.len() {
        let n = stack.read(Some(&mut chunk), &mut out[filled..]).unwrap();
        assert!(n > 0, "short read in '{}'", chunk.tag());
        filled += n;
    }
    out
}

/// RIFF:AVI children, plus the strl lists inside hdrl.
fn avi_layout(stack: &mut Reader) -> (Vec<ChunkDescriptor>, Vec<ChunkDescriptor>) {
    let segments = top_level(stack);
    segment_layout(stack, &segments[0])
}

fn segment_layout(
    stack: &mut Reader,
    riff: &ChunkDescriptor,
) -> (Vec<ChunkDescriptor>, Vec<ChunkDescriptor>) {
    assert_eq!(riff.container(), Some(containers::RIFF));
    assert_eq!(riff.tag(), chunk_ids::AVI);
    let body = children(stack, riff);
    let hdrl = find(&body, chunk_ids::HDRL);
    let strls = children(stack, &hdrl)
        .into_iter()
        .filter(|c| c.tag() == chunk_ids::STRL)
        .collect();
    (body, strls)
}

fn stream_header(stack: &mut Reader, strl: &ChunkDescriptor) -> StreamHeader {
    let strh = find(&children(stack, strl), chunk_ids::STRH);
    StreamHeader::from_bytes(&payload(stack, &strh)).unwrap()
}

fn main_header(stack: &mut Reader, body: &[ChunkDescriptor]) -> AviHeader {
    let hdrl = find(body, chunk_ids::HDRL);
    let avih = find(&children(stack, &hdrl), chunk_ids::AVIH);
    AviHeader::from_bytes(&payload(stack, &avih)).unwrap()
}

fn legacy_index(stack: &mut Reader, body: &[ChunkDescriptor]) -> Vec<IndexEntry> {
    let mut idx1 = find(body, chunk_ids::IDX1);
    read_legacy_index(stack, &mut idx1).unwrap()
}

/// Walk every chunk in `start..end`, descending into RIFF and LIST, and
/// check each one fits inside its parent with a final size.
/// Returns the number of chunks visited.
fn walk_chunk_tree(bytes: &[u8], start: usize, end: usize) -> usize {
    let mut visited = 0;
    let mut offset = start;
    while offset < end {
        assert!(offset + 8 <= end, "truncated header at {}", offset);
        let len = le32(bytes, offset + 4);
        assert_ne!(len, PLACEHOLDER_LENGTH, "placeholder left at {}", offset);
        let data_end = offset + 8 + len as usize;
        let padded_end = data_end + (len as usize & 1);
        assert!(
            padded_end <= end,
            "chunk at {} ends at {}, past its parent's end {}",
            offset,
            padded_end,
            end
        );
        let tag = &bytes[offset..offset + 4];
        if tag == b"RIFF" || tag == b"LIST" {
            assert!(len >= 4, "container at {} has no form type", offset);
            visited += walk_chunk_tree(bytes, offset + 12, data_end);
        }
        visited += 1;
        offset = padded_end;
    }
    assert_eq!(offset, end);
    visited
}

fn assert_sizes_cover_file(bytes: &[u8]) {
    assert!(walk_chunk_tree(bytes, 0, bytes.len()) > 0);
}

fn video_writer(config: AviWriterConfig) -> (AviWriter<BufferBackend>, transcode_avi::StreamHandle) {
    let mut writer = buffer_writer(config);
    let video = writer.new_stream(StreamType::Video).unwrap();
    writer
        .set_format(
            video,
            BitmapInfoHeader::new(320, 240, FourCC::new(*b"MJPG")).to_bytes(),
        )
        .unwrap();
    (writer, video)
}

#[test]
fn test_zero_streams() {
    let mut writer = buffer_writer(AviWriterConfig::default());
    writer.begin_header().unwrap();
    writer.begin_data().unwrap();
    let bytes = finish(writer);
    assert_sizes_cover_file(&bytes);

    let mut stack = reader(bytes);
    let (body, strls) = avi_layout(&mut stack);
    assert!(strls.is_empty());
    let tags: Vec<_> = body.iter().map(|c| c.tag()).collect();
    assert_eq!(tags, vec![chunk_ids::HDRL, chunk_ids::MOVI, chunk_ids::IDX1]);
    assert_eq!(find(&body, chunk_ids::IDX1).data_length(), 0);

    let avih = main_header(&mut stack, &body);
    assert_eq!(avih.streams, 0);
    assert_eq!(avih.total_frames, 0);
}

#[test]
fn test_single_video_stream() {
    let (mut writer, video) = video_writer(AviWriterConfig::default());
    writer.set_name(video, "camera").unwrap();
    writer.begin_header().unwrap();
    writer.begin_data().unwrap();
    for i in 0..10u8 {
        let flags = if i == 0 { IndexEntry::KEYFRAME } else { 0 };
        writer.write_sample(video, &[i; 100], flags).unwrap();
    }
    let bytes = finish(writer);
    assert_sizes_cover_file(&bytes);

    let mut stack = reader(bytes);
    let (body, strls) = avi_layout(&mut stack);
    assert_eq!(strls.len(), 1);

    let strl = children(&mut stack, &strls[0]);
    let tags: Vec<_> = strl.iter().map(|c| c.tag()).collect();
    assert_eq!(
        tags,
        vec![chunk_ids::STRH, chunk_ids::STRF, chunk_ids::STRN, chunk_ids::INDX]
    );
    assert_eq!(payload(&mut stack, &strl[2]), b"camera\0");

    let strh = stream_header(&mut stack, &strls[0]);
    assert_eq!(strh.stream_type, StreamType::Video);
    assert_eq!(strh.length, 10);

    let avih = main_header(&mut stack, &body);
    assert_eq!(avih.streams, 1);
    assert_eq!(avih.total_frames, 10);
    assert!(avih.flags.has_index && avih.flags.must_use_index && avih.flags.is_interleaved);

    let movi = find(&body, chunk_ids::MOVI);
    let samples: Vec<_> = children(&mut stack, &movi)
        .into_iter()
        .filter(|c| c.tag() == FourCC::new(*b"00dc"))
        .collect();
    assert_eq!(samples.len(), 10);
    assert_eq!(payload(&mut stack, &samples[3]), vec![3u8; 100]);

    let index = legacy_index(&mut stack, &body);
    assert_eq!(index.len(), 10);
    assert!(index[0].is_keyframe());
    assert!(!index[1].is_keyframe());
    assert_eq!(index[0].offset, 4);
    assert_eq!(index[1].offset, 4 + 108);
    assert!(index.iter().all(|e| e.size == 100 && e.chunk_id.as_bytes() == b"00dc"));
}

#[test]
fn test_uncompressed_video_tag() {
    let mut writer = buffer_writer(AviWriterConfig::default());
    let video = writer.new_stream(StreamType::Video).unwrap();
    writer
        .set_format(video, BitmapInfoHeader::new(4, 4, FourCC::NULL).to_bytes())
        .unwrap();
    assert_eq!(writer.stream(video).unwrap().chunk_tag(), FourCC::new(*b"00db"));
}

#[test]
fn test_pcm_audio_length() {
    let mut writer = buffer_writer(AviWriterConfig::default());
    let audio = writer.new_stream(StreamType::Audio).unwrap();
    writer
        .set_format(audio, WaveFormat::pcm(2, 44100, 16).to_bytes())
        .unwrap();
    writer.begin_header().unwrap();
    writer.begin_data().unwrap();
    for _ in 0..10 {
        writer.write_sample(audio, &[0u8; 17_640], IndexEntry::KEYFRAME).unwrap();
    }
    assert_eq!(writer.stream(audio).unwrap().bytes_written(), 176_400);
    let bytes = finish(writer);

    let mut stack = reader(bytes);
    let (body, strls) = avi_layout(&mut stack);
    assert_eq!(stream_header(&mut stack, &strls[0]).length, 44_100);
    // no video stream
    assert_eq!(main_header(&mut stack, &body).total_frames, 0);

    let index = legacy_index(&mut stack, &body);
    assert_eq!(index.len(), 10);
    assert_eq!(index[0].chunk_id, FourCC::new(*b"00wb"));
}

#[test]
fn test_interleaved_index_order() {
    let (mut writer, video) = video_writer(AviWriterConfig::default());
    let audio = writer.new_stream(StreamType::Audio).unwrap();
    writer.begin_header().unwrap();
    writer.begin_data().unwrap();
    for _ in 0..3 {
        writer.write_sample(video, &[1; 10], IndexEntry::KEYFRAME).unwrap();
    }
    writer.write_sample(audio, &[2; 10], IndexEntry::KEYFRAME).unwrap();
    let bytes = finish(writer);

    let mut stack = reader(bytes);
    let (body, _) = avi_layout(&mut stack);
    let ids: Vec<_> = legacy_index(&mut stack, &body)
        .iter()
        .map(|e| e.chunk_id)
        .collect();
    assert_eq!(
        ids,
        vec![
            FourCC::new(*b"00dc"),
            FourCC::new(*b"01wb"),
            FourCC::new(*b"00dc"),
            FourCC::new(*b"00dc"),
        ]
    );
}

#[test]
fn test_repeat_last_sample() {
    let (mut writer, video) = video_writer(AviWriterConfig::default());
    writer.begin_header().unwrap();
    writer.begin_data().unwrap();
    writer.write_sample(video, &[7; 30], IndexEntry::KEYFRAME).unwrap();
    writer.repeat_last_sample(video).unwrap();
    writer.repeat_last_sample(video).unwrap();
    assert_eq!(writer.stream(video).unwrap().bytes_written(), 90);
    let bytes = finish(writer);

    let mut stack = reader(bytes);
    let (body, strls) = avi_layout(&mut stack);
    assert_eq!(stream_header(&mut stack, &strls[0]).length, 3);

    let movi = find(&body, chunk_ids::MOVI);
    let lengths: Vec<_> = children(&mut stack, &movi)
        .iter()
        .filter(|c| c.tag() == FourCC::new(*b"00dc"))
        .map(|c| c.data_length())
        .collect();
    assert_eq!(lengths, vec![30, 0, 0]);

    let index = legacy_index(&mut stack, &body);
    assert_eq!(index.len(), 3);
    assert!(index.iter().all(|e| e.offset == index[0].offset && e.size == 30));
}

#[test]
fn test_opendml_groups() {
    let (mut writer, video) = video_writer(AviWriterConfig::default());
    writer.begin_header().unwrap();
    writer.begin_data().unwrap();
    for i in 0..4500u32 {
        let flags = if i % 100 == 0 { IndexEntry::KEYFRAME } else { 0 };
        writer.write_sample(video, &[], flags).unwrap();
    }
    let bytes = finish(writer);
    assert_sizes_cover_file(&bytes);

    let mut stack = reader(bytes);
    let (body, strls) = avi_layout(&mut stack);

    let movi = find(&body, chunk_ids::MOVI);
    let ix: Vec<_> = children(&mut stack, &movi)
        .into_iter()
        .filter(|c| c.tag() == FourCC::new(*b"ix00"))
        .collect();
    let counts: Vec<_> = ix
        .iter()
        .map(|c| le32(&payload(&mut stack, c), 4))
        .collect();
    assert_eq!(counts, vec![2000, 2000, 500]);

    let first = payload(&mut stack, &ix[0]);
    assert_eq!(first[3], 1);
    assert_eq!(&first[8..12], b"00dc");
    // sample 0 is a keyframe, sample 1 is not
    assert_eq!(le32(&first, 24 + 4) & 0x8000_0000, 0);
    assert_ne!(le32(&first, 32 + 4) & 0x8000_0000, 0);

    let indx = find(&children(&mut stack, &strls[0]), chunk_ids::INDX);
    let indx = payload(&mut stack, &indx);
    let header = SuperIndexHeader::read(&indx).unwrap();
    assert_eq!(header.entries_in_use, 3);
    assert_eq!(header.chunk_id, FourCC::new(*b"00dc"));
    for (i, chunk) in ix.iter().enumerate() {
        let at = SuperIndexHeader::SIZE + i * SuperIndexEntry::SIZE;
        let entry = SuperIndexEntry::read(&indx[at..]).unwrap();
        assert_eq!(entry.offset, chunk.header_offset());
        assert_eq!(entry.size, chunk.data_length() + 8);
        assert_eq!(entry.duration, counts[i]);
    }
}

#[test]
fn test_super_index_full() {
    let config = AviWriterConfig {
        super_index_reserve: 256,
        ..AviWriterConfig::default()
    };
    let (mut writer, video) = video_writer(config);
    let audio = writer.new_stream(StreamType::Audio).unwrap();
    writer.begin_header().unwrap();
    writer.begin_data().unwrap();
    // 15 groups, room for 14 super index entries
    for _ in 0..30_000 {
        writer.write_sample(video, &[], IndexEntry::KEYFRAME).unwrap();
    }
    writer.write_sample(audio, &[0; 4], IndexEntry::KEYFRAME).unwrap();
    writer.end_data().unwrap();

    assert!(writer.stream(video).unwrap().super_index_full());
    assert!(!writer.stream(audio).unwrap().super_index_full());
    writer.finish().unwrap();
    let bytes = writer.into_backend().unwrap().into_written();

    let mut stack = reader(bytes);
    let (body, _) = avi_layout(&mut stack);
    let movi = find(&body, chunk_ids::MOVI);
    let movi = children(&mut stack, &movi);
    assert_eq!(
        movi.iter().filter(|c| c.tag() == FourCC::new(*b"ix00")).count(),
        14
    );
    assert_eq!(
        movi.iter().filter(|c| c.tag() == FourCC::new(*b"ix01")).count(),
        1
    );
}

#[test]
fn test_segment_rollover() {
    let config = AviWriterConfig {
        segment_limit: 4096,
        ..AviWriterConfig::default()
    };
    let (mut writer, video) = video_writer(config);
    writer.begin_header().unwrap();
    writer.begin_data().unwrap();
    for _ in 0..20 {
        writer.write_sample(video, &[9; 1000], IndexEntry::KEYFRAME).unwrap();
    }
    assert_eq!(writer.segment_count(), 5);
    let bytes = finish(writer);
    assert_sizes_cover_file(&bytes);

    let mut stack = reader(bytes);
    let segments = top_level(&mut stack);
    assert_eq!(segments.len(), 5);
    assert_eq!(segments[0].tag(), chunk_ids::AVI);
    assert!(segments[1..].iter().all(|s| s.tag() == chunk_ids::AVIX));

    let mut total = 0;
    for segment in &segments[1..] {
        let body = children(&mut stack, segment);
        assert!(body.iter().all(|c| c.tag() != chunk_ids::IDX1));
        let movi = find(&body, chunk_ids::MOVI);
        total += children(&mut stack, &movi)
            .iter()
            .filter(|c| c.tag() == FourCC::new(*b"00dc"))
            .count();
    }
    assert_eq!(total, 16);

    let (body, strls) = segment_layout(&mut stack, &segments[0]);
    // idx1 only covers the first segment
    assert_eq!(legacy_index(&mut stack, &body).len(), 4);
    assert_eq!(stream_header(&mut stack, &strls[0]).length, 20);
    let odml = find(&children(&mut stack, &find(&body, chunk_ids::HDRL)), chunk_ids::ODML);
    let dmlh = find(&children(&mut stack, &odml), chunk_ids::DMLH);
    assert_eq!(le32(&payload(&mut stack, &dmlh), 0), 20);
}

#[test]
fn test_legacy_limit_without_opendml() {
    let config = AviWriterConfig {
        opendml: false,
        opendml_index: false,
        legacy_limit: 4096,
        ..AviWriterConfig::default()
    };
    let (mut writer, video) = video_writer(config);
    writer.begin_header().unwrap();
    writer.begin_data().unwrap();

    let mut written = 0;
    let err = loop {
        match writer.write_sample(video, &[1; 1000], IndexEntry::KEYFRAME) {
            Ok(()) => written += 1,
            Err(e) => break e,
        }
        assert!(written < 10);
    };
    assert!(matches!(err, AviError::SegmentLimit { limit: 4096, .. }));
    assert_eq!(writer.state(), WriterState::Body);
    assert_eq!(writer.segment_count(), 1);

    let bytes = finish(writer);
    assert_sizes_cover_file(&bytes);
    let mut stack = reader(bytes);
    let (body, strls) = avi_layout(&mut stack);
    let hdrl = children(&mut stack, &find(&body, chunk_ids::HDRL));
    assert!(hdrl.iter().all(|c| c.tag() != chunk_ids::ODML));
    assert_eq!(legacy_index(&mut stack, &body).len(), written);
    let strl = children(&mut stack, &strls[0]);
    assert!(strl.iter().all(|c| c.tag() != chunk_ids::INDX && c.tag() != chunk_ids::JUNK));
}

#[test]
fn test_single_pass_streaming() {
    let (mut writer, video) = video_writer(AviWriterConfig::default());
    writer.set_single_pass_streaming().unwrap();
    assert!(writer.config().single_pass);
    writer.begin_header().unwrap();
    writer.begin_data().unwrap();
    for i in 0..5u8 {
        writer.write_sample(video, &[i; 33], IndexEntry::KEYFRAME).unwrap();
        let snapshot = writer.stack().backend().unwrap().written();
        assert_eq!(le32(snapshot, 4), PLACEHOLDER_LENGTH);
    }
    let bytes = finish(writer);
    assert_sizes_cover_file(&bytes);

    let mut stack = reader(bytes);
    let (body, strls) = avi_layout(&mut stack);
    let movi = find(&body, chunk_ids::MOVI);
    let samples: Vec<_> = children(&mut stack, &movi)
        .into_iter()
        .filter(|c| c.tag() == FourCC::new(*b"00dc"))
        .collect();
    assert_eq!(samples.len(), 5);
    assert_eq!(payload(&mut stack, &samples[4]), vec![4u8; 33]);
    assert_eq!(stream_header(&mut stack, &strls[0]).length, 5);
}

#[test]
fn test_single_pass_rollover() {
    let config = AviWriterConfig {
        single_pass: true,
        segment_limit: 4096,
        ..AviWriterConfig::default()
    };
    let (mut writer, video) = video_writer(config);
    writer.begin_header().unwrap();
    writer.begin_data().unwrap();
    let mut sent = 0u32;
    for i in 0..20u8 {
        // alternate odd and even payloads so pad bytes land on both sides
        let len = if i % 2 == 0 { 999 } else { 1000 };
        writer.write_sample(video, &vec![i; len], IndexEntry::KEYFRAME).unwrap();
        sent += 1;
        if i % 4 == 3 {
            writer.repeat_last_sample(video).unwrap();
            sent += 1;
        }
        // the open segment keeps its placeholder until it closes
        let riff = writer.stack().get(0).unwrap().header_offset() as usize;
        let snapshot = writer.stack().backend().unwrap().written();
        assert_eq!(le32(snapshot, riff + 4), PLACEHOLDER_LENGTH);
    }
    let segment_count = writer.segment_count();
    assert!(segment_count > 1);
    let bytes = finish(writer);
    assert_sizes_cover_file(&bytes);

    let mut stack = reader(bytes);
    let segments = top_level(&mut stack);
    assert_eq!(segments.len(), segment_count as usize);
    assert_eq!(segments[0].tag(), chunk_ids::AVI);
    assert!(segments[1..].iter().all(|s| s.tag() == chunk_ids::AVIX));

    let mut chunks = 0;
    let mut ix_per_segment = Vec::new();
    for segment in &segments {
        let body = children(&mut stack, segment);
        let movi = find(&body, chunk_ids::MOVI);
        let movi_children = children(&mut stack, &movi);
        chunks += movi_children
            .iter()
            .filter(|c| c.tag() == FourCC::new(*b"00dc"))
            .count();
        ix_per_segment.push(
            movi_children
                .iter()
                .filter(|c| c.tag() == FourCC::new(*b"ix00"))
                .count(),
        );
    }
    assert_eq!(chunks, sent as usize);
    // one group, indexed in the last movi
    assert_eq!(ix_per_segment.last(), Some(&1));
    assert_eq!(ix_per_segment.iter().sum::<usize>(), 1);

    let (body, strls) = segment_layout(&mut stack, &segments[0]);
    assert_eq!(stream_header(&mut stack, &strls[0]).length, sent);
    assert_eq!(main_header(&mut stack, &body).total_frames, sent);
    let indx = find(&children(&mut stack, &strls[0]), chunk_ids::INDX);
    let header = SuperIndexHeader::read(&payload(&mut stack, &indx)).unwrap();
    assert_eq!(header.entries_in_use, 1);
}

#[test]
fn test_preset_length_kept() {
    let (mut writer, video) = video_writer(AviWriterConfig::default());
    writer.stream_header_mut(video).unwrap().length = 50;
    writer.begin_header().unwrap();
    writer.begin_data().unwrap();
    writer.write_sample(video, &[0; 8], IndexEntry::KEYFRAME).unwrap();
    let bytes = finish(writer);

    let mut stack = reader(bytes);
    let (body, strls) = avi_layout(&mut stack);
    assert_eq!(stream_header(&mut stack, &strls[0]).length, 50);
    assert_eq!(main_header(&mut stack, &body).total_frames, 50);
}

#[test]
fn test_out_of_order_calls() {
    let (mut writer, video) = video_writer(AviWriterConfig::default());
    assert!(matches!(
        writer.write_sample(video, &[0; 4], 0),
        Err(AviError::InvalidState {
            state: WriterState::Init,
            ..
        })
    ));
    assert!(writer.finish().is_err());
    writer.begin_header().unwrap();
    assert!(writer.set_format(video, vec![0; 40]).is_err());
    assert!(writer.begin_header().is_err());
}

#[test]
fn test_drop_closes_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dropped.avi");
    {
        let mut writer = AviWriter::create(&path, AviWriterConfig::default()).unwrap();
        let video = writer.new_stream(StreamType::Video).unwrap();
        writer.begin_header().unwrap();
        writer.begin_data().unwrap();
        for _ in 0..3 {
            writer.write_sample(video, &[5; 11], IndexEntry::KEYFRAME).unwrap();
        }
    }

    let bytes = fs::read(&path).unwrap();
    assert_sizes_cover_file(&bytes);
    let mut stack = reader(bytes);
    let (body, strls) = avi_layout(&mut stack);
    assert_eq!(legacy_index(&mut stack, &body).len(), 3);
    assert_eq!(stream_header(&mut stack, &strls[0]).length, 3);
}
