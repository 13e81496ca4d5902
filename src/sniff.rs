use crate::bytes::bits_u32;
use std::fmt::{Display, Formatter, Result as FmtResult};

/// File extension assigned to an extracted sample.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Extension {
    /// RIFF/WAVE container.
    Wav,
    /// Ogg container.
    Ogg,
    /// Native FLAC stream.
    Flac,
    /// MPEG audio, with or without an ID3 tag.
    Mp3,
    /// Headerless Vorbis packets as stored in FSB5 banks.
    Vorbis,
    /// Anything that could not be classified.
    Bin,
}

impl Extension {
    /// Returns the extension without a leading dot, e.g. `"wav"`.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Wav => "wav",
            Self::Ogg => "ogg",
            Self::Flac => "flac",
            Self::Mp3 => "mp3",
            Self::Vorbis => "vorbis",
            Self::Bin => "bin",
        }
    }
}

impl Display for Extension {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

// only this many leading bytes are searched for an MPEG frame sync
const SCAN_LIMIT: usize = 4096;

/// Classifies `data` by magic bytes, then by looking for two back-to-back MPEG audio frames.
pub(crate) fn sniff(data: &[u8]) -> Extension {
    if data.len() < 2 {
        return Extension::Bin;
    }

    match data {
        [b'R', b'I', b'F', b'F', ..] => return Extension::Wav,
        [b'O', b'g', b'g', b'S', ..] => return Extension::Ogg,
        [b'f', b'L', b'a', b'C', ..] => return Extension::Flac,
        [b'I', b'D', b'3', ..] => return Extension::Mp3,
        _ => {}
    }

    if find_mpeg_frames(data).is_some() {
        Extension::Mp3
    } else {
        Extension::Bin
    }
}

// Returns the offset of the first frame header that is followed by a second valid header
// exactly one frame later. A lone sync pattern in arbitrary data is not enough.
fn find_mpeg_frames(data: &[u8]) -> Option<usize> {
    let limit = data.len().min(SCAN_LIMIT);

    (0..limit.saturating_sub(3)).find(|&i| {
        if data[i] != 0xFF || data[i + 1] & 0xE0 != 0xE0 {
            return false;
        }

        let remaining = data.len() - i;
        if remaining < 8 {
            return false;
        }

        let first = match mpeg_frame_size(&data[i..]) {
            Some(size) if size >= 4 && size + 4 <= remaining => size,
            _ => return false,
        };

        mpeg_frame_size(&data[i + first..]).is_some()
    })
}

// Bitrates in kbit/s, indexed by [version][layer][bitrate index].
// Versions: 0 = MPEG 2.5, 1 = reserved, 2 = MPEG 2, 3 = MPEG 1.
// Layers: 0 = reserved, 1 = layer III, 2 = layer II, 3 = layer I.
const BITRATES: [[[u16; 16]; 4]; 4] = {
    const NONE: [u16; 16] = [0; 16];
    const LOW_L23: [u16; 16] = [0, 8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160, 0];
    const LOW_L1: [u16; 16] = [
        0, 32, 48, 56, 64, 80, 96, 112, 128, 144, 160, 176, 192, 224, 256, 0,
    ];

    [
        [NONE, LOW_L23, LOW_L23, LOW_L1],
        [NONE; 4],
        [NONE, LOW_L23, LOW_L23, LOW_L1],
        [
            NONE,
            [0, 32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 0],
            [0, 32, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 384, 0],
            [0, 32, 64, 96, 128, 160, 192, 224, 256, 288, 320, 352, 384, 416, 448, 0],
        ],
    ]
};

const SAMPLE_RATES: [[u16; 4]; 4] = [
    [11025, 12000, 8000, 0],
    [0, 0, 0, 0],
    [22050, 24000, 16000, 0],
    [44100, 48000, 32000, 0],
];

const SAMPLES_PER_FRAME: [[u16; 4]; 4] = [
    [0, 576, 1152, 384],
    [0, 0, 0, 0],
    [0, 576, 1152, 384],
    [0, 1152, 1152, 384],
];

const SLOT_SIZES: [u8; 4] = [0, 1, 1, 4];

/// Computes the size in bytes of the MPEG audio frame whose header starts `data`.
///
/// Returns `None` for anything that is not a usable frame header: missing sync bits, the
/// reserved version or layer, the "bad" bitrate index, a reserved sample rate, or a frame that
/// would be empty.
fn mpeg_frame_size(data: &[u8]) -> Option<usize> {
    let header = u32::from_be_bytes(data.get(..4)?.try_into().ok()?);

    let sync = bits_u32(header, 21, 11);
    let version = bits_u32(header, 19, 2) as usize;
    let layer = bits_u32(header, 17, 2) as usize;
    let bitrate_index = bits_u32(header, 12, 4) as usize;
    let sample_rate_index = bits_u32(header, 10, 2) as usize;
    let padding = bits_u32(header, 9, 1);

    if sync != 0x7FF || version == 1 || layer == 0 || bitrate_index == 0xF {
        return None;
    }

    let bitrate = u32::from(BITRATES[version][layer][bitrate_index]) * 1000;
    let sample_rate = u32::from(SAMPLE_RATES[version][sample_rate_index]);
    let samples = u32::from(SAMPLES_PER_FRAME[version][layer]);

    if sample_rate == 0 {
        return None;
    }

    let padding = if padding == 1 {
        u32::from(SLOT_SIZES[layer])
    } else {
        0
    };

    match (samples / 8) * bitrate / sample_rate + padding {
        0 => None,
        size => Some(size as usize),
    }
}
