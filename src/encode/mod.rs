pub(crate) mod error;
pub(crate) mod wav;

use crate::header::{Codec, Sample};
use wav::WavFormat;

/// Chooses a WAV layout able to carry the sample's stored bytes without transcoding.
///
/// Uncompressed PCM and IMA ADPCM get their own WAVE format tag. GameCube ADPCM has no tag
/// players accept, so its bytes are wrapped as 16-bit PCM at the hinted channels and rate.
/// Other codecs yield `None`.
pub(crate) fn wav_format(sample: &Sample) -> Option<WavFormat> {
    let channels = sample.channels();
    let sample_rate = sample.sample_rate();

    match sample.codec() {
        Codec::Pcm8 => Some(WavFormat::pcm(8, channels, sample_rate)),
        Codec::Pcm16 => Some(WavFormat::pcm(16, channels, sample_rate)),
        Codec::Pcm24 => Some(WavFormat::pcm(24, channels, sample_rate)),
        Codec::Pcm32 => Some(WavFormat::pcm(32, channels, sample_rate)),
        Codec::PcmFloat => Some(WavFormat::float(channels, sample_rate)),
        Codec::ImaAdpcm => Some(WavFormat::ima_adpcm(channels, sample_rate)),
        Codec::GcAdpcm => Some(WavFormat::pcm(16, channels, sample_rate)),
        _ => None,
    }
}
