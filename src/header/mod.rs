pub(crate) mod error;
mod fsb4;
mod fsb5;

use error::HeaderError;
use log::debug;
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    ops::Range,
};

// sample counts above this are treated as a corrupt header rather than allocated for
pub(crate) const MAX_SAMPLES: u32 = 1_000_000;

/// Layout of the bytes a [`Container`](crate::Container) was built from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Format {
    /// Unrecognized data, exposed as a single sample spanning the whole buffer.
    Raw,
    /// Legacy FSB4 sound bank with fixed-size sample headers.
    Fsb4,
    /// FSB5 sound bank with bit-packed sample headers.
    Fsb5,
}

impl Display for Format {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(match self {
            Self::Raw => "raw data",
            Self::Fsb4 => "FSB4",
            Self::Fsb5 => "FSB5",
        })
    }
}

#[derive(Debug)]
pub(crate) struct Header {
    pub(crate) format: Format,
    pub(crate) mode: u32,
    pub(crate) samples: Vec<Sample>,
}

impl Header {
    /// Picks a parser by file signature. Anything that is not FSB4 or FSB5 becomes raw data.
    pub(crate) fn parse(data: &[u8]) -> Result<Self, HeaderError> {
        let header = match data.get(..4) {
            Some(magic) if magic == fsb5::FSB5_MAGIC => fsb5::parse(data),
            Some(magic) if magic == fsb4::FSB4_MAGIC => fsb4::parse(data),
            _ => Self::raw(data),
        }?;

        debug!(
            "indexed {} bytes of {} with {} samples (mode 0x{:08x})",
            data.len(),
            header.format,
            header.samples.len(),
            header.mode
        );

        Ok(header)
    }

    fn raw(data: &[u8]) -> Result<Self, HeaderError> {
        if data.is_empty() {
            return Err(HeaderError::new(error::HeaderErrorKind::EmptyInput));
        }

        Ok(Self {
            format: Format::Raw,
            mode: 0,
            samples: vec![Sample {
                name: "raw".into(),
                range: 0..data.len(),
                channels: 1,
                sample_rate: 0,
                codec: Codec::Unknown,
                num_samples: 0,
                stream_loop: None,
                vorbis_crc32: None,
            }],
        })
    }
}

/// Names stand-in for samples without a usable name: the zero-based index, zero-padded to
/// four digits.
pub(crate) fn fallback_name(index: u32) -> Box<str> {
    format!("{index:04}").into()
}

pub(crate) fn name_or_fallback(raw: &[u8], index: u32) -> Box<str> {
    if raw.is_empty() {
        fallback_name(index)
    } else {
        String::from_utf8_lossy(raw).into()
    }
}

/// Represents known audio codecs of samples within a sound bank.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Codec {
    /// PCM with 8-bit integer samples.
    Pcm8,
    /// PCM with 16-bit integer samples.
    Pcm16,
    /// PCM with 24-bit integer samples.
    Pcm24,
    /// PCM with 32-bit integer samples.
    Pcm32,
    /// PCM with 32-bit float (IEEE 754) samples.
    PcmFloat,
    /// GC ADPCM, used in games for the GameCube, Wii and Wii U.
    GcAdpcm,
    /// IMA ADPCM, developed by the
    /// [Interactive Multimedia Association](https://en.wikipedia.org/wiki/Interactive_Multimedia_Association).
    ImaAdpcm,
    /// VAG, an ADPCM format used in games for the PS1, PS2, and PSP.
    Vag,
    /// HEVAG, an ADPCM format used in games for the PS Vita and PS4.
    HeVag,
    /// XMA, used in games for the Xbox 360.
    Xma,
    /// MPEG audio (usually layer III).
    Mpeg,
    /// CELT, developed by the [Xiph.Org Foundation](https://en.wikipedia.org/wiki/Xiph.Org_Foundation).
    Celt,
    /// ATRAC9, used in PlayStation games and debuting with the PS Vita.
    Atrac9,
    /// xWMA, used in games for Windows and Xbox systems.
    Xwma,
    /// Vorbis, developed by the [Xiph.Org Foundation](https://en.wikipedia.org/wiki/Xiph.Org_Foundation).
    Vorbis,
    /// FADPCM, an ADPCM format developed by Firelight Technologies for use with FMOD.
    FAdpcm,
    /// Opus, developed by the [Xiph.Org Foundation](https://en.wikipedia.org/wiki/Xiph.Org_Foundation).
    Opus,
    /// The header did not identify a codec.
    Unknown,
}

// FMOD codec codes run from 1 (PCM8) to 17 (Opus); 18 is one past the last
const CODEC_CODE_END: u32 = 18;

// legacy FSOUND mode bits
pub(crate) const FSOUND_8BITS: u32 = 0x0000_0008;
pub(crate) const FSOUND_STEREO: u32 = 0x0000_0040;
const FSOUND_DELTA: u32 = 0x0000_0200;
const FSOUND_IMAADPCM: u32 = 0x0040_0000;
const FSOUND_XMA: u32 = 0x0100_0000;
const FSOUND_GCADPCM: u32 = 0x0200_0000;
const FSOUND_MPEG_LAYER3: u32 = 0x1000_0000;

impl Codec {
    fn from_code(code: u32) -> Self {
        match code {
            1 => Self::Pcm8,
            2 => Self::Pcm16,
            3 => Self::Pcm24,
            4 => Self::Pcm32,
            5 => Self::PcmFloat,
            6 => Self::GcAdpcm,
            7 => Self::ImaAdpcm,
            8 => Self::Vag,
            9 => Self::HeVag,
            10 => Self::Xma,
            11 => Self::Mpeg,
            12 => Self::Celt,
            13 => Self::Atrac9,
            14 => Self::Xwma,
            15 => Self::Vorbis,
            16 => Self::FAdpcm,
            17 => Self::Opus,
            _ => Self::Unknown,
        }
    }

    /// Infers the codec from the mode field of an FSB5 base header.
    ///
    /// The low byte normally holds an FMOD codec code. Banks written by older tools carry
    /// legacy FSOUND flags instead, which are checked afterwards.
    pub(crate) fn from_fsb5_mode(mode: u32) -> Self {
        let low = mode & 0xFF;

        if low == 0x0F {
            return Self::Vorbis;
        }
        if low < CODEC_CODE_END {
            return Self::from_code(low);
        }

        if mode & FSOUND_IMAADPCM != 0 {
            Self::ImaAdpcm
        } else if mode & FSOUND_DELTA != 0 {
            Self::Mpeg
        } else if mode & FSOUND_GCADPCM != 0 {
            Self::GcAdpcm
        } else if mode & FSOUND_XMA != 0 {
            Self::Xma
        } else if mode & FSOUND_MPEG_LAYER3 != 0 {
            Self::Mpeg
        } else {
            Self::Unknown
        }
    }

    /// Infers the codec from the mode field of an FSB4 sample header.
    pub(crate) fn from_fsb4_mode(mode: u32) -> Self {
        if mode & FSOUND_IMAADPCM != 0 {
            Self::ImaAdpcm
        } else if mode & FSOUND_XMA != 0 {
            Self::Xma
        } else if mode & FSOUND_GCADPCM != 0 {
            Self::GcAdpcm
        } else if mode & (FSOUND_DELTA | FSOUND_MPEG_LAYER3) != 0 {
            Self::Mpeg
        } else if mode & FSOUND_8BITS != 0 {
            Self::Pcm8
        } else {
            Self::Pcm16
        }
    }
}

impl Display for Codec {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(match self {
            Self::Pcm8 => "PCM (8-bit, integer)",
            Self::Pcm16 => "PCM (16-bit, integer)",
            Self::Pcm24 => "PCM (24-bit, integer)",
            Self::Pcm32 => "PCM (32-bit, integer)",
            Self::PcmFloat => "PCM (32-bit, float)",
            Self::GcAdpcm => "GC ADPCM",
            Self::ImaAdpcm => "IMA ADPCM",
            Self::Vag => "VAG",
            Self::HeVag => "HEVAG",
            Self::Xma => "XMA",
            Self::Mpeg => "MPEG",
            Self::Celt => "CELT",
            Self::Atrac9 => "ATRAC9",
            Self::Xwma => "xWMA",
            Self::Vorbis => "Vorbis",
            Self::FAdpcm => "FADPCM",
            Self::Opus => "Opus",
            Self::Unknown => "unknown",
        })
    }
}

/// Loop information associated with a sample.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Loop {
    start: u32,
    end: u32,
}

impl Loop {
    /// Returns `None` for empty or inverted loops.
    pub(crate) fn new(start: u32, end: u32) -> Option<Self> {
        (end > start).then_some(Self { start, end })
    }

    /// Returns the starting position of the loop, in sample frames.
    #[must_use]
    pub fn start(&self) -> u32 {
        self.start
    }

    /// Returns the ending position of the loop, in sample frames.
    #[must_use]
    pub fn end(&self) -> u32 {
        self.end
    }
}

/// Metadata and byte range of one sample within a container.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sample {
    pub(crate) name: Box<str>,
    pub(crate) range: Range<usize>,
    pub(crate) channels: u16,
    pub(crate) sample_rate: u32,
    pub(crate) codec: Codec,
    pub(crate) num_samples: u32,
    pub(crate) stream_loop: Option<Loop>,
    pub(crate) vorbis_crc32: Option<u32>,
}

impl Sample {
    /// Returns the display name of the sample. Names are never empty but may repeat.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the byte range of the sample's data within the container.
    #[must_use]
    pub fn range(&self) -> Range<usize> {
        self.range.clone()
    }

    /// Returns the offset of the sample's data from the start of the container, in bytes.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.range.start
    }

    /// Returns the size of the sample's data, in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.range.len()
    }

    /// Returns the number of channels (at least 1).
    #[must_use]
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Returns the sample rate in Hz. 0 means the header did not specify one.
    #[must_use]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Returns the codec inferred from the container's mode flags.
    #[must_use]
    pub fn codec(&self) -> Codec {
        self.codec
    }

    /// Returns the number of sample frames reported by the header.
    #[must_use]
    pub fn num_samples(&self) -> u32 {
        self.num_samples
    }

    /// Returns the loop points, if the header defines any.
    #[must_use]
    pub fn stream_loop(&self) -> Option<Loop> {
        self.stream_loop
    }

    /// Returns the CRC32 of the Vorbis setup header used to encode this sample.
    /// Only Vorbis samples in FSB5 banks carry this value.
    #[must_use]
    pub fn vorbis_crc32(&self) -> Option<u32> {
        self.vorbis_crc32
    }
}
