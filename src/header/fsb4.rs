use super::{
    error::{HeaderError, HeaderErrorKind, StreamError, StreamErrorKind},
    name_or_fallback, Codec, Format, Header, Loop, Sample, FSOUND_STEREO, MAX_SAMPLES,
};
use crate::{
    bytes,
    read::{ReadResult, Reader},
};

pub(super) const FSB4_MAGIC: [u8; 4] = *b"FSB4";

const HEADER_SIZE: usize = 48;
const SAMPLE_HEADER_SIZE: usize = 80;
const NAME_SIZE: usize = 30;

pub(super) fn parse(data: &[u8]) -> Result<Header, HeaderError> {
    if data.len() < HEADER_SIZE {
        return Err(HeaderError::new(HeaderErrorKind::Truncated {
            expected: HEADER_SIZE,
            actual: data.len(),
        }));
    }

    if data[..4] != FSB4_MAGIC {
        return Err(HeaderError::new(HeaderErrorKind::Magic));
    }

    // the length check above keeps every fixed field in range
    let field = |position| bytes::le_i32(data, position).unwrap_or_default();
    let num_samples = field(4);
    let sample_headers_size = field(8);
    let data_size = field(12);
    let mode = bytes::le_u32(data, 20).unwrap_or_default();

    let num_samples = match u32::try_from(num_samples) {
        Ok(count) if count > 0 && count <= MAX_SAMPLES => count,
        _ => {
            return Err(HeaderError::new(HeaderErrorKind::InvalidSampleCount {
                count: num_samples,
            }))
        }
    };

    let sample_headers_size = match u64::try_from(sample_headers_size) {
        Ok(size) if size > 0 && data_size >= 0 => size,
        _ => {
            return Err(HeaderError::new(HeaderErrorKind::InvalidSizes {
                sample_headers: sample_headers_size,
                data: data_size,
            }))
        }
    };

    let headers_end = HEADER_SIZE as u64 + sample_headers_size;
    if headers_end > data.len() as u64 {
        return Err(HeaderError::new(HeaderErrorKind::HeadersOverflow {
            end: headers_end,
            actual: data.len(),
        }));
    }

    let required = u64::from(num_samples) * SAMPLE_HEADER_SIZE as u64;
    if sample_headers_size < required {
        return Err(HeaderError::new(HeaderErrorKind::SampleHeadersTooSmall {
            expected: required,
            actual: sample_headers_size,
        }));
    }

    // sample data is stored back to back, in header order, right after the sample headers
    let mut offset = headers_end as usize;
    let mut samples = Vec::with_capacity(num_samples as usize);

    for index in 0..num_samples {
        let start = HEADER_SIZE + index as usize * SAMPLE_HEADER_SIZE;
        let mut reader = Reader::bounded(data, start, start + SAMPLE_HEADER_SIZE);
        let record = SampleRecord::parse(&mut reader)
            .map_err(StreamError::factory(index, StreamErrorKind::BaseHeader))?;

        let end = offset
            .checked_add(record.compressed_size as usize)
            .filter(|&end| end <= data.len())
            .ok_or_else(|| HeaderError::new(HeaderErrorKind::SampleDataOverflow { index }))?;

        let channels = if record.mode & FSOUND_STEREO != 0 {
            2
        } else {
            record.channels.max(1)
        };

        samples.push(Sample {
            name: name_or_fallback(record.name, index),
            range: offset..end,
            channels,
            sample_rate: u32::try_from(record.frequency).unwrap_or(0),
            codec: Codec::from_fsb4_mode(record.mode),
            num_samples: record.num_samples,
            stream_loop: Loop::new(record.loop_start, record.loop_end),
            vorbis_crc32: None,
        });

        offset = end;
    }

    Ok(Header {
        format: Format::Fsb4,
        mode,
        samples,
    })
}

struct SampleRecord<'data> {
    name: &'data [u8],
    num_samples: u32,
    compressed_size: u32,
    loop_start: u32,
    loop_end: u32,
    mode: u32,
    frequency: i32,
    channels: u16,
}

impl<'data> SampleRecord<'data> {
    fn parse(reader: &mut Reader<'data>) -> ReadResult<Self> {
        // record size, repeated in every record
        reader.skip(2)?;

        let name = reader.take(NAME_SIZE)?;
        let name = &name[..name.iter().position(|&b| b == 0).unwrap_or(NAME_SIZE)];

        let num_samples = reader.le_u32()?;
        let compressed_size = reader.le_u32()?;
        let loop_start = reader.le_u32()?;
        let loop_end = reader.le_u32()?;
        let mode = reader.le_u32()?;
        let frequency = reader.le_i32()?;

        // default volume, pan and priority
        reader.skip(6)?;

        let channels = reader.le_u16()?;

        Ok(Self {
            name,
            num_samples,
            compressed_size,
            loop_start,
            loop_end,
            mode,
            frequency,
            channels,
        })
    }
}
