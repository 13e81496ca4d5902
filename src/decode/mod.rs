pub(crate) mod discover;
pub(crate) mod error;
mod vgmstream;

use error::{DecodeError, DecodeErrorKind};
use log::{debug, warn};
use std::{fmt::Debug, num::NonZeroU32, sync::OnceLock};
use vgmstream::Vgmstream;

/// Interleaved 16-bit little-endian PCM produced by a [`Decoder`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Pcm16 {
    channels: u16,
    sample_rate: u32,
    data: Vec<u8>,
}

impl Pcm16 {
    /// Wraps decoded audio. `data` holds interleaved little-endian `i16` samples.
    #[must_use]
    pub fn new(channels: u16, sample_rate: u32, data: Vec<u8>) -> Self {
        Self {
            channels,
            sample_rate,
            data,
        }
    }

    /// Returns the number of interleaved channels.
    #[must_use]
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Returns the sample rate in Hz.
    #[must_use]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Returns the raw sample bytes.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Consumes the value, returning the raw sample bytes.
    #[must_use]
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}

/// Turns one subsong of an in-memory sound bank into PCM.
///
/// [`Container::get`](crate::Container::get) tries its decoder first and falls back to the
/// stored sample bytes when decoding fails for any reason other than memory exhaustion.
pub trait Decoder: Debug {
    /// Decodes `subsong` (1-based) of the sound bank in `bank`.
    ///
    /// # Errors
    /// Returns an error if no backend is available or the backend rejects the data.
    fn decode(&self, bank: &[u8], subsong: NonZeroU32) -> Result<Pcm16, DecodeError>;

    /// Reports whether this decoder has a working backend. Unavailable decoders are skipped
    /// by [`Container::get`](crate::Container::get) without calling [`decode`](Self::decode).
    fn is_available(&self) -> bool {
        true
    }
}

/// A [`Decoder`] that never decodes, used when no backend could be loaded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NoDecoder {
    reason: Box<str>,
}

impl NoDecoder {
    /// Creates a decoder whose every call fails with `reason`.
    #[must_use]
    pub fn new(reason: impl Into<Box<str>>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    /// Returns why no backend is available.
    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl Default for NoDecoder {
    fn default() -> Self {
        Self::new("no decoder configured")
    }
}

impl Decoder for NoDecoder {
    fn decode(&self, _bank: &[u8], _subsong: NonZeroU32) -> Result<Pcm16, DecodeError> {
        Err(DecodeError::unavailable(self.reason.clone()))
    }

    fn is_available(&self) -> bool {
        false
    }
}

/// Returns the process-wide decoder.
///
/// The first call searches for and loads `libvgmstream`; the outcome, success or failure, is
/// kept for the lifetime of the process. When loading fails the returned decoder is a
/// [`NoDecoder`] carrying the reason.
pub fn system_decoder() -> &'static (dyn Decoder + Send + Sync) {
    static SYSTEM: OnceLock<Box<dyn Decoder + Send + Sync>> = OnceLock::new();

    SYSTEM
        .get_or_init(|| match Vgmstream::load().and_then(EngineDecoder::new) {
            Ok(decoder) => {
                debug!("loaded libvgmstream (API 0x{:08x})", decoder.version);
                Box::new(decoder)
            }
            Err(e) => {
                if e.is_missing_library() {
                    debug!("libvgmstream is unavailable: {e}");
                } else {
                    warn!("found libvgmstream but cannot use it: {e}");
                }
                Box::new(NoDecoder::new(e.to_string()))
            }
        })
        .as_ref()
}

/// Output format a stream is asked to produce, applied before the stream starts.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct StreamConfig {
    pub(crate) force_pcm16: bool,
    pub(crate) ignore_loop: bool,
    pub(crate) ignore_fade: bool,
    pub(crate) loop_count: f64,
}

impl StreamConfig {
    /// Plays each subsong exactly once, as 16-bit PCM.
    pub(crate) const PCM16: Self = Self {
        force_pcm16: true,
        ignore_loop: true,
        ignore_fade: true,
        loop_count: 1.0,
    };
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SampleFormat {
    Pcm16,
    Other,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct StreamFormat {
    pub(crate) channels: u16,
    pub(crate) sample_rate: u32,
    pub(crate) sample_format: SampleFormat,
    pub(crate) play_forever: bool,
}

/// One block of rendered audio. `pcm` is only valid until the next render call.
#[derive(Debug)]
pub(crate) struct Rendered<'stream> {
    pub(crate) pcm: &'stream [u8],
    pub(crate) done: bool,
}

/// A decoding library able to open subsongs of an in-memory sound bank.
pub(crate) trait Engine {
    /// Returns the library's API version word.
    fn version(&self) -> u32;

    /// Opens `subsong` (1-based) of `bank` after applying `config`.
    fn open<'a>(
        &'a self,
        bank: &'a [u8],
        subsong: NonZeroU32,
        config: &StreamConfig,
    ) -> Result<Box<dyn EngineStream + 'a>, DecodeError>;
}

/// An open subsong. Dropping it releases every resource the engine holds for it.
pub(crate) trait EngineStream {
    fn format(&self) -> StreamFormat;

    fn render(&mut self) -> Result<Rendered<'_>, DecodeError>;
}

// only API v1 of the engine is understood
const API_VERSION_MASK: u32 = 0xFF00_0000;
const API_VERSION_1: u32 = 0x0100_0000;

// decoded output is capped to keep a corrupt or endless stream from exhausting memory
const MAX_DECODED_BYTES: usize = 256 * 1024 * 1024;
const INITIAL_CAPACITY: usize = 64 * 1024;

/// Drives an [`Engine`]: opens the subsong, checks its format, and collects every rendered
/// block into one buffer.
#[derive(Debug)]
pub(crate) struct EngineDecoder<E> {
    engine: E,
    version: u32,
    limit: usize,
}

impl<E: Engine> EngineDecoder<E> {
    pub(crate) fn new(engine: E) -> Result<Self, DecodeError> {
        let version = engine.version();

        if version & API_VERSION_MASK != API_VERSION_1 {
            return Err(DecodeError::new(DecodeErrorKind::VersionMismatch { version }));
        }

        Ok(Self {
            engine,
            version,
            limit: MAX_DECODED_BYTES,
        })
    }

    #[cfg(test)]
    fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

impl<E: Engine + Debug> Decoder for EngineDecoder<E> {
    fn decode(&self, bank: &[u8], subsong: NonZeroU32) -> Result<Pcm16, DecodeError> {
        let mut stream = self.engine.open(bank, subsong, &StreamConfig::PCM16)?;
        let format = stream.format();

        if format.play_forever {
            return Err(DecodeError::new(DecodeErrorKind::PlaysForever { subsong }));
        }
        if format.sample_format != SampleFormat::Pcm16 {
            return Err(DecodeError::new(DecodeErrorKind::NotPcm16));
        }

        let mut pcm = Vec::new();

        loop {
            if pcm.len() > self.limit {
                return Err(DecodeError::new(DecodeErrorKind::TooLarge { limit: self.limit }));
            }

            let rendered = stream.render()?;

            if !rendered.pcm.is_empty() {
                grow(&mut pcm, rendered.pcm.len())?;
                pcm.extend_from_slice(rendered.pcm);
            }

            if rendered.done {
                break;
            }
        }

        debug!(
            "decoded subsong {subsong}: {} bytes, {} channels at {} Hz",
            pcm.len(),
            format.channels,
            format.sample_rate
        );

        Ok(Pcm16::new(format.channels, format.sample_rate, pcm))
    }
}

// Capacity starts at 64 KiB and doubles until the new block fits.
fn grow(pcm: &mut Vec<u8>, additional: usize) -> Result<(), DecodeError> {
    let overflow = || DecodeError::new(DecodeErrorKind::BufferOverflow);

    let needed = pcm.len().checked_add(additional).ok_or_else(overflow)?;
    if needed <= pcm.capacity() {
        return Ok(());
    }

    let mut capacity = match pcm.capacity() {
        0 => INITIAL_CAPACITY,
        capacity => capacity,
    };
    while capacity < needed {
        capacity = capacity.checked_mul(2).ok_or_else(overflow)?;
    }

    pcm.try_reserve_exact(capacity - pcm.len())
        .map_err(DecodeError::allocation(capacity))
}
