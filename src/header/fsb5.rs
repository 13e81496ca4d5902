use super::{
    error::{ChunkError, ChunkErrorKind, HeaderError, HeaderErrorKind, StreamError, StreamErrorKind},
    fallback_name, name_or_fallback, Codec, Format, Header, Loop, Sample, MAX_SAMPLES,
};
use crate::{
    bytes::{self, bits_u64},
    read::Reader,
};
use bilge::prelude::*;
use log::warn;
use phf::phf_map;
use tap::Pipe;

pub(super) const FSB5_MAGIC: [u8; 4] = *b"FSB5";

// version 0 banks carry an extra 4-byte field before the hash
const V0_HEADER_SIZE: usize = 64;
const HEADER_SIZE: usize = 60;

// frequency codes outside this table leave the rate unspecified (0)
static FREQUENCIES: phf::Map<u8, u32> = phf_map! {
    1u8 => 8000,
    2u8 => 11000,
    3u8 => 11025,
    4u8 => 16000,
    5u8 => 22050,
    6u8 => 24000,
    7u8 => 32000,
    8u8 => 44100,
    9u8 => 48000,
};

const CHUNK_CHANNELS: u8 = 1;
const CHUNK_FREQUENCY: u8 = 2;
const CHUNK_LOOP: u8 = 3;
const CHUNK_VORBIS_DATA: u8 = 11;

pub(super) fn parse(data: &[u8]) -> Result<Header, HeaderError> {
    let mut reader = Reader::new(data);

    match reader.take(4) {
        Ok(magic) if magic == FSB5_MAGIC => Ok(()),
        Err(e) => Err(HeaderError::new_with_source(HeaderErrorKind::Magic, e)),
        _ => Err(HeaderError::new(HeaderErrorKind::Magic)),
    }?;

    let version = reader
        .le_u32()
        .map_err(HeaderError::factory(HeaderErrorKind::Version))?;

    let num_samples = reader
        .le_u32()
        .map_err(HeaderError::factory(HeaderErrorKind::SampleCount))?;

    let sample_headers_size = reader
        .le_u32()
        .map_err(HeaderError::factory(HeaderErrorKind::SampleHeadersSize))?;

    let name_table_size = reader
        .le_u32()
        .map_err(HeaderError::factory(HeaderErrorKind::NameTableSize))?;

    let data_size = reader
        .le_u32()
        .map_err(HeaderError::factory(HeaderErrorKind::DataSize))?;

    let mode = reader
        .le_u32()
        .map_err(HeaderError::factory(HeaderErrorKind::Mode))?;

    if num_samples > MAX_SAMPLES {
        return Err(HeaderError::new(HeaderErrorKind::TooManySamples {
            count: num_samples,
        }));
    }

    // an empty version 0 bank may omit the extra field
    let is_empty = num_samples == 0 && sample_headers_size == 0 && name_table_size == 0;
    let header_size = if version == 0 && !(is_empty && data.len() < V0_HEADER_SIZE) {
        V0_HEADER_SIZE
    } else {
        HEADER_SIZE
    };

    if data.len() < header_size {
        return Err(HeaderError::new(HeaderErrorKind::Truncated {
            expected: header_size,
            actual: data.len(),
        }));
    }

    // The base header is followed by the sample headers, the name table, then sample data.
    // Only the end of the name table has to fit; sample data is clamped to what is present.
    let sample_headers_end = header_size as u64 + u64::from(sample_headers_size);
    let headers_end = sample_headers_end + u64::from(name_table_size);

    if headers_end > data.len() as u64 {
        return Err(HeaderError::new(HeaderErrorKind::HeadersOverflow {
            end: headers_end,
            actual: data.len(),
        }));
    }

    // both ends lie within `data`, so they fit in usize
    let sample_headers_end = sample_headers_end as usize;
    let headers_end = headers_end as usize;
    let declared_end = headers_end.saturating_add(data_size as usize);
    let data_end = declared_end.min(data.len());

    if data_end < declared_end {
        warn!(
            "sample data is truncated: expected {data_size} bytes, found {}",
            data_end - headers_end
        );
    }

    let mut reader = Reader::bounded(data, header_size, sample_headers_end);
    let pending = parse_sample_headers(&mut reader, num_samples)?;

    let names = read_names(&data[sample_headers_end..headers_end], num_samples)?;

    let codec = Codec::from_fsb5_mode(mode);

    // Each sample's data runs until the next sample's offset, or the end of sample data
    // for the last one.
    let offsets: Vec<u64> = pending.iter().map(|sample| sample.data_offset).collect();
    let ends = offsets
        .iter()
        .skip(1)
        .map(|&offset| Some(offset))
        .chain([None]);

    let samples = pending
        .into_iter()
        .zip(ends)
        .zip(names)
        .map(|((sample, next), name)| {
            let end = next.map_or(data_end as u64, |offset| headers_end as u64 + offset)
                .min(data_end as u64);
            let start = (headers_end as u64 + sample.data_offset).min(end);

            Sample {
                name,
                range: start as usize..end as usize,
                channels: sample.channels,
                sample_rate: sample.frequency,
                codec,
                num_samples: sample.num_samples,
                stream_loop: sample.stream_loop,
                vorbis_crc32: sample.vorbis_crc32,
            }
        })
        .collect();

    Ok(Header {
        format: Format::Fsb5,
        mode,
        samples,
    })
}

#[derive(Debug)]
#[cfg_attr(test, derive(PartialEq, Eq))]
struct PendingSample {
    frequency: u32,
    channels: u16,
    data_offset: u64,
    num_samples: u32,
    stream_loop: Option<Loop>,
    vorbis_crc32: Option<u32>,
}

// Base sample header, LSB first: chunk flag (1 bit), frequency code (4), stereo flag (1),
// data offset in 16-byte units (28), sample count (30).
fn has_chunks(raw: u64) -> bool {
    bits_u64(raw, 0, 1) == 1
}

impl From<u64> for PendingSample {
    fn from(raw: u64) -> Self {
        let frequency_code = u8::try_from(bits_u64(raw, 1, 4)).unwrap_or(0);

        Self {
            frequency: FREQUENCIES.get(&frequency_code).copied().unwrap_or(0),
            channels: if bits_u64(raw, 5, 1) == 1 { 2 } else { 1 },
            data_offset: bits_u64(raw, 6, 28) * 16,
            num_samples: u32::try_from(bits_u64(raw, 34, 30)).unwrap_or(u32::MAX),
            stream_loop: None,
            vorbis_crc32: None,
        }
    }
}

fn parse_sample_headers(
    reader: &mut Reader<'_>,
    num_samples: u32,
) -> Result<Vec<PendingSample>, HeaderError> {
    // each base header is 8 bytes, so a corrupt count cannot force a huge allocation
    let mut samples = Vec::with_capacity((num_samples as usize).min(reader.remaining() / 8));

    for index in 0..num_samples {
        let raw = reader
            .le_u64()
            .map_err(StreamError::factory(index, StreamErrorKind::BaseHeader))?;

        let mut sample = PendingSample::from(raw);

        if has_chunks(raw) {
            parse_chunks(reader, &mut sample).map_err(|e| e.into_stream_err(index))?;
        }

        samples.push(sample);
    }

    Ok(samples)
}

#[bitsize(32)]
#[derive(FromBits)]
struct RawChunk {
    more_chunks: bool,
    size: u24,
    kind: u7,
}

fn parse_chunks(reader: &mut Reader<'_>, sample: &mut PendingSample) -> Result<(), ChunkError> {
    for index in 0.. {
        let chunk = reader
            .le_u32()
            .map_err(ChunkError::factory(index, ChunkErrorKind::Flag))?
            .pipe(RawChunk::from);

        let size = chunk.size().value();
        let body = reader
            .take(size as usize)
            .map_err(ChunkError::factory(index, ChunkErrorKind::Body { size }))?;

        match (chunk.kind().value(), body) {
            (CHUNK_CHANNELS, &[channels]) => sample.channels = u16::from(channels).max(1),
            (CHUNK_FREQUENCY, [_, _, _, _]) => sample.frequency = bytes::le_u32(body, 0).unwrap_or(0),
            (CHUNK_LOOP, [..]) if body.len() >= 8 => {
                sample.stream_loop = bytes::le_u32(body, 0)
                    .zip(bytes::le_u32(body, 4))
                    .and_then(|(start, end)| Loop::new(start, end));
            }
            (CHUNK_VORBIS_DATA, [..]) if body.len() >= 4 => {
                sample.vorbis_crc32 = bytes::le_u32(body, 0);
            }
            _ => {}
        }

        if !chunk.more_chunks() {
            break;
        }
    }

    Ok(())
}

// The name table starts with one 4-byte offset per sample, relative to the start of the
// table, each pointing at a NUL-terminated name. An empty table means unnamed samples.
fn read_names(table: &[u8], num_samples: u32) -> Result<Vec<Box<str>>, HeaderError> {
    if table.is_empty() {
        return Ok((0..num_samples).map(fallback_name).collect());
    }

    let offsets_size = u64::from(num_samples) * 4;
    if offsets_size > table.len() as u64 {
        return Err(HeaderError::new(HeaderErrorKind::NameOffsets {
            expected: offsets_size,
            actual: table.len(),
        }));
    }

    let mut reader = Reader::new(table);

    (0..num_samples)
        .map(|index| {
            let offset = reader
                .le_u32()
                .map_err(StreamError::factory(index, StreamErrorKind::Name))?;

            // names that start past the table are treated as empty
            let name = table.get(offset as usize..).unwrap_or_default();
            let len = name.iter().position(|&b| b == 0).unwrap_or(name.len());

            Ok(name_or_fallback(&name[..len], index))
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::super::error::{ChunkErrorKind::*, HeaderErrorKind::*, StreamErrorKind::*};
    use super::super::fixtures::{fsb5, Fsb5Sample};
    use super::{has_chunks, parse, PendingSample, RawChunk, FSB5_MAGIC};
    use crate::{
        bytes::bits_u32,
        header::{Codec, Loop},
    };

    #[test]
    fn read_magic() {
        assert!(parse(b"").is_err_and(|e| e.kind() == Magic));
        assert!(parse(b"abcd").is_err_and(|e| e.kind() == Magic));
        assert!(parse(FSB5_MAGIC.as_slice()).is_err_and(|e| e.kind() == Version));
    }

    #[test]
    fn read_base_header_fields() {
        let mut data = b"FSB5\x01\x00\x00\x00".to_vec();

        for kind in [SampleCount, SampleHeadersSize, NameTableSize, DataSize, Mode] {
            assert!(parse(&data).is_err_and(|e| e.kind() == kind));
            data.extend_from_slice(&[0; 4]);
        }
    }

    #[test]
    fn base_header_size_depends_on_version() {
        let mut data = fsb5(1, 0x0F, &[], None, &[]);
        assert_eq!(data.len(), 60);
        assert!(parse(&data).is_ok_and(|header| header.samples.is_empty()));

        data.truncate(59);
        assert!(parse(&data).is_err_and(|e| e.kind() == Truncated { expected: 60, actual: 59 }));

        let data = fsb5(0, 0x0F, &[], None, &[]);
        assert_eq!(data.len(), 64);
        assert!(parse(&data).is_ok());

        let data = fsb5(0, 0x0F, &[Fsb5Sample::new(0)], None, &[0; 16]);
        assert_eq!(data.len(), 64 + 8 + 16);
        assert_eq!(parse(&data).unwrap().samples[0].range(), 72..88);
        assert!(parse(&data[..60]).is_err_and(|e| e.kind() == Truncated { expected: 64, actual: 60 }));
    }

    #[test]
    fn zeroed_header_is_an_empty_bank() {
        let mut data = FSB5_MAGIC.to_vec();
        data.resize(60, 0);

        let header = parse(&data).unwrap();
        assert!(header.samples.is_empty());
        assert_eq!(header.mode, 0);

        // a data size alone does not need the version 0 field
        data[20..24].copy_from_slice(&16_u32.to_le_bytes());
        assert!(parse(&data).is_ok_and(|header| header.samples.is_empty()));
    }

    #[test]
    fn sample_count_is_capped() {
        let mut data = fsb5(1, 0x0F, &[], None, &[]);
        data[8..12].copy_from_slice(&1_000_001_u32.to_le_bytes());
        assert!(parse(&data).is_err_and(|e| e.kind() == TooManySamples { count: 1_000_001 }));

        // the cap is checked before the header length
        data.truncate(28);
        assert!(parse(&data).is_err_and(|e| e.kind() == TooManySamples { count: 1_000_001 }));
    }

    #[test]
    fn headers_must_fit() {
        let mut data = fsb5(1, 0x0F, &[Fsb5Sample::new(0)], None, &[0; 32]);
        data[12..16].copy_from_slice(&0xFFFF_FFFF_u32.to_le_bytes());
        assert!(parse(&data).is_err_and(|e| matches!(e.kind(), HeadersOverflow { .. })));

        let mut data = fsb5(1, 0x0F, &[Fsb5Sample::new(0)], None, &[0; 32]);
        data[16..20].copy_from_slice(&1000_u32.to_le_bytes());
        assert!(parse(&data).is_err_and(|e| matches!(e.kind(), HeadersOverflow { .. })));
    }

    #[test]
    fn missing_sample_header() {
        let mut data = fsb5(1, 0x0F, &[], None, &[]);
        data[8..12].copy_from_slice(&1_u32.to_le_bytes());
        assert!(parse(&data).is_err_and(|e| e.is_stream_err_kind(BaseHeader)));
    }

    #[test]
    fn base_sample_header_unpacks() {
        let raw = 1 | 8 << 1 | 1 << 5 | 3 << 6 | 1000 << 34;

        assert!(has_chunks(raw));
        assert_eq!(
            PendingSample::from(raw),
            PendingSample {
                frequency: 44100,
                channels: 2,
                data_offset: 48,
                num_samples: 1000,
                stream_loop: None,
                vorbis_crc32: None,
            }
        );

        let full = PendingSample::from(u64::MAX);
        assert_eq!(full.frequency, 0);
        assert_eq!(full.data_offset, 0x0FFF_FFFF * 16);
        assert_eq!(full.num_samples, 0x3FFF_FFFF);
        assert!(!has_chunks(u64::MAX - 1));
    }

    #[test]
    fn derived_chunk_parsing_works() {
        let data = 0b0001101_100001101110000000011001_0;

        let chunk = RawChunk::from(data);

        assert_eq!(chunk.more_chunks(), bits_u32(data, 0, 1) == 1);
        assert_eq!(chunk.size().value(), bits_u32(data, 1, 24));
        assert_eq!(u32::from(chunk.kind().value()), bits_u32(data, 25, 7));
    }

    #[test]
    fn base_sample_fields() {
        let mut sample = Fsb5Sample::new(0);
        sample.frequency_code = 5;
        sample.stereo = true;
        sample.num_samples = 1234;

        let data = fsb5(1, 0x0B, &[sample], None, &[0xAA; 48]);
        let header = parse(&data).unwrap();
        let sample = &header.samples[0];

        assert_eq!(header.mode, 0x0B);
        assert_eq!(sample.sample_rate(), 22050);
        assert_eq!(sample.channels(), 2);
        assert_eq!(sample.num_samples(), 1234);
        assert_eq!(sample.codec(), Codec::Mpeg);
        assert_eq!(sample.name(), "0000");
        assert_eq!(sample.size(), 48);
    }

    #[test]
    fn unknown_frequency_codes_are_unspecified() {
        for code in [0, 10, 15] {
            let mut sample = Fsb5Sample::new(0);
            sample.frequency_code = code;

            let data = fsb5(1, 0x02, &[sample], None, &[0; 16]);
            assert_eq!(parse(&data).unwrap().samples[0].sample_rate(), 0);
        }
    }

    #[test]
    fn metadata_chunks_override_base_fields() {
        let mut sample = Fsb5Sample::new(0);
        sample.chunks = vec![
            (1, vec![6]),
            (2, 96000_u32.to_le_bytes().to_vec()),
            (3, [100_u32.to_le_bytes(), 200_u32.to_le_bytes()].concat()),
            (11, [0xDEAD_BEEF_u32.to_le_bytes().as_slice(), &[0; 8]].concat()),
            // unknown chunk types are skipped
            (4, b"comment".to_vec()),
        ];

        let data = fsb5(1, 0x0F, &[sample], None, &[0; 16]);
        let header = parse(&data).unwrap();
        let sample = &header.samples[0];

        assert_eq!(sample.channels(), 6);
        assert_eq!(sample.sample_rate(), 96000);
        assert_eq!(sample.stream_loop(), Loop::new(100, 200));
        assert_eq!(sample.vorbis_crc32(), Some(0xDEAD_BEEF));
        assert_eq!(sample.codec(), Codec::Vorbis);
    }

    #[test]
    fn chunks_with_unexpected_sizes_are_ignored() {
        let mut sample = Fsb5Sample::new(0);
        sample.chunks = vec![(1, vec![6, 6]), (2, vec![1, 2]), (1, vec![0])];

        let data = fsb5(1, 0x02, &[sample], None, &[0; 16]);
        let sample = &parse(&data).unwrap().samples[0];

        // a zero channel count is clamped to mono
        assert_eq!(sample.channels(), 1);
        assert_eq!(sample.sample_rate(), 44100);
    }

    #[test]
    fn chunk_errors() {
        let mut sample = Fsb5Sample::new(0);
        sample.chunks = vec![(2, 44100_u32.to_le_bytes().to_vec())];

        let mut data = fsb5(1, 0x02, &[sample], None, &[]);
        // claim more chunks follow the only one
        data[68] |= 1;
        assert!(parse(&data).is_err_and(|e| e.is_chunk_err_kind(Flag)));

        let mut sample = Fsb5Sample::new(0);
        sample.chunks = vec![(2, 44100_u32.to_le_bytes().to_vec())];

        let mut data = fsb5(1, 0x02, &[sample], None, &[]);
        // chunk size larger than the sample header table
        data[68..72].copy_from_slice(&(100_u32 << 1 | 2 << 25).to_le_bytes());
        assert!(parse(&data).is_err_and(|e| e.is_chunk_err_kind(Body { size: 100 })));
    }

    #[test]
    fn data_ranges_follow_offsets() {
        let samples = [Fsb5Sample::new(0), Fsb5Sample::new(32), Fsb5Sample::new(96)];
        let data = fsb5(1, 0x02, &samples, None, &[0x11; 128]);
        let header = parse(&data).unwrap();

        let base = 60 + 24;
        let ranges: Vec<_> = header.samples.iter().map(|sample| sample.range()).collect();
        assert_eq!(ranges, [base..base + 32, base + 32..base + 96, base + 96..base + 128]);
    }

    #[test]
    fn data_ranges_are_clamped() {
        let samples = [Fsb5Sample::new(64), Fsb5Sample::new(32)];
        let mut data = fsb5(1, 0x02, &samples, None, &[0x11; 128]);
        // declared data size runs past the end of the file
        data.truncate(data.len() - 28);
        let header = parse(&data).unwrap();

        let base = 60 + 16;
        assert_eq!(header.samples[0].range(), base + 32..base + 32);
        assert_eq!(header.samples[1].range(), base + 32..base + 100);
        assert!(header.samples.iter().all(|sample| sample.range().end <= data.len()));
    }

    #[test]
    fn read_names() {
        let samples = [Fsb5Sample::new(0), Fsb5Sample::new(16)];
        let data = fsb5(1, 0x0F, &samples, Some(&["intro", "loop"]), &[0; 32]);
        let header = parse(&data).unwrap();

        assert_eq!(header.samples[0].name(), "intro");
        assert_eq!(header.samples[1].name(), "loop");
    }

    #[test]
    fn empty_or_unreachable_names_fall_back_to_index() {
        let samples = [Fsb5Sample::new(0), Fsb5Sample::new(16)];
        let mut data = fsb5(1, 0x0F, &samples, Some(&["", "x"]), &[0; 32]);
        // point the second name far past the table
        let table = 60 + 16;
        data[table + 4..table + 8].copy_from_slice(&0x1000_u32.to_le_bytes());
        let header = parse(&data).unwrap();

        assert_eq!(header.samples[0].name(), "0000");
        assert_eq!(header.samples[1].name(), "0001");
    }

    #[test]
    fn unterminated_name_stops_at_table_end() {
        let samples = [Fsb5Sample::new(0)];
        let mut data = fsb5(1, 0x0F, &samples, Some(&["abc"]), &[]);
        // replace the terminator with a name byte
        let last = data.len() - 1;
        data[last] = b'd';
        assert_eq!(parse(&data).unwrap().samples[0].name(), "abcd");
    }

    #[test]
    fn name_table_too_small_for_offsets() {
        let samples = [Fsb5Sample::new(0), Fsb5Sample::new(16)];
        let mut data = fsb5(1, 0x0F, &samples, None, &[]);
        data[16..20].copy_from_slice(&4_u32.to_le_bytes());
        data.extend_from_slice(&[0; 4]);

        assert!(parse(&data).is_err_and(|e| e.kind() == NameOffsets { expected: 8, actual: 4 }));
    }
}
