use super::error::{WavError, WavErrorKind};
use crate::bytes::{put_u16_le, put_u32_le};

pub(crate) const FORMAT_PCM: u16 = 0x0001;
pub(crate) const FORMAT_IEEE_FLOAT: u16 = 0x0003;
pub(crate) const FORMAT_IMA_ADPCM: u16 = 0x0011;

const DEFAULT_SAMPLE_RATE: u32 = 44100;

// the RIFF size counts the "WAVE" id plus both subchunks, headers included
const WAVE_ID_SIZE: u32 = 4;
const CHUNK_HEADER_SIZE: u32 = 8;
const FMT_SIZE: u32 = 16;

/// Block layout of an ADPCM stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct AdpcmBlock {
    pub(crate) bytes_per_channel: u16,
    pub(crate) samples_per_block: u16,
}

/// Everything the "fmt " subchunk describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct WavFormat {
    pub(crate) tag: u16,
    pub(crate) channels: u16,
    pub(crate) sample_rate: u32,
    pub(crate) bits_per_sample: u16,
    pub(crate) adpcm: Option<AdpcmBlock>,
}

impl WavFormat {
    pub(crate) fn pcm(bits_per_sample: u16, channels: u16, sample_rate: u32) -> Self {
        Self {
            tag: FORMAT_PCM,
            channels,
            sample_rate,
            bits_per_sample,
            adpcm: None,
        }
    }

    pub(crate) fn float(channels: u16, sample_rate: u32) -> Self {
        Self {
            tag: FORMAT_IEEE_FLOAT,
            ..Self::pcm(32, channels, sample_rate)
        }
    }

    pub(crate) fn ima_adpcm(channels: u16, sample_rate: u32) -> Self {
        Self {
            tag: FORMAT_IMA_ADPCM,
            channels,
            sample_rate,
            bits_per_sample: 4,
            adpcm: Some(AdpcmBlock {
                bytes_per_channel: 36,
                samples_per_block: 65,
            }),
        }
    }
}

/// Wraps `data` in a canonical RIFF/WAVE file: a "fmt " subchunk describing `format`,
/// followed by a single "data" subchunk holding `data` verbatim.
///
/// A channel count of 0 is written as mono and a sample rate of 0 as 44100 Hz.
pub(crate) fn synthesize(format: &WavFormat, data: &[u8]) -> Result<Vec<u8>, WavError> {
    if format.bits_per_sample == 0 {
        return Err(WavError::new(WavErrorKind::ZeroBitDepth));
    }

    let channels = format.channels.max(1);
    let sample_rate = match format.sample_rate {
        0 => DEFAULT_SAMPLE_RATE,
        rate => rate,
    };

    let (block_align, byte_rate, extra) = match format.adpcm {
        Some(block) => {
            let block_align = block.bytes_per_channel.saturating_mul(channels);
            let byte_rate = u64::from(sample_rate) * u64::from(block_align)
                / u64::from(block.samples_per_block.max(1));

            // cbSize, then the samples per block
            let mut extra = Vec::with_capacity(4);
            put_u16_le(&mut extra, 2);
            put_u16_le(&mut extra, block.samples_per_block);

            (
                block_align,
                u32::try_from(byte_rate).unwrap_or(u32::MAX),
                extra,
            )
        }
        None => {
            let block_align = channels.saturating_mul(format.bits_per_sample) / 8;
            (
                block_align,
                sample_rate.saturating_mul(u32::from(block_align)),
                Vec::new(),
            )
        }
    };

    let too_large = || WavError::new(WavErrorKind::TooLarge { size: data.len() });
    let data_size = u32::try_from(data.len()).map_err(|_| too_large())?;
    let fmt_size = FMT_SIZE + extra.len() as u32;
    let riff_size = (WAVE_ID_SIZE + 2 * CHUNK_HEADER_SIZE + fmt_size)
        .checked_add(data_size)
        .ok_or_else(too_large)?;

    let total = riff_size as usize + CHUNK_HEADER_SIZE as usize;
    let mut buf = Vec::new();
    buf.try_reserve_exact(total)
        .map_err(WavError::allocation(total))?;

    buf.extend_from_slice(b"RIFF");
    put_u32_le(&mut buf, riff_size);
    buf.extend_from_slice(b"WAVE");

    buf.extend_from_slice(b"fmt ");
    put_u32_le(&mut buf, fmt_size);
    put_u16_le(&mut buf, format.tag);
    put_u16_le(&mut buf, channels);
    put_u32_le(&mut buf, sample_rate);
    put_u32_le(&mut buf, byte_rate);
    put_u16_le(&mut buf, block_align);
    put_u16_le(&mut buf, format.bits_per_sample);
    buf.extend_from_slice(&extra);

    buf.extend_from_slice(b"data");
    put_u32_le(&mut buf, data_size);
    buf.extend_from_slice(data);

    Ok(buf)
}
