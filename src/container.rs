use crate::{
    decode::{error::DecodeError, system_decoder, Decoder},
    encode::{
        wav::{synthesize, WavFormat},
        wav_format,
    },
    error::{track, Error, ErrorKind},
    header::{Codec, Format, Header, Sample},
    sniff::{sniff, Extension},
};
use log::debug;
use std::{borrow::Cow, collections::HashMap, fs, num::NonZeroU32, path::Path};

/// An indexed sound bank.
///
/// The container owns a copy of the bytes it was built from. Samples are addressed by a
/// 1-based index in on-disk order, or by name through [`Container::index_of`].
#[derive(Debug)]
pub struct Container {
    data: Box<[u8]>,
    format: Format,
    mode: u32,
    samples: Box<[Sample]>,
    name_index: HashMap<Box<str>, u32>,
}

impl Container {
    /// Indexes a copy of `data`.
    ///
    /// Data starting with `FSB4` or `FSB5` is parsed as a sound bank. Anything else becomes a
    /// raw container with one sample spanning the whole buffer.
    ///
    /// # Errors
    /// Returns an error if the input is empty, a sound bank header is malformed or points
    /// outside the input, or the copy cannot be allocated.
    pub fn parse(data: &[u8]) -> Result<Self, Error> {
        track(|| {
            let mut owned = Vec::new();
            owned
                .try_reserve_exact(data.len())
                .map_err(Error::allocation(data.len()))?;
            owned.extend_from_slice(data);
            Self::build(owned)
        })
    }

    /// Indexes `data`, taking ownership of it.
    ///
    /// # Errors
    /// See [`Container::parse`].
    pub fn from_vec(data: Vec<u8>) -> Result<Self, Error> {
        track(|| Self::build(data))
    }

    /// Reads a file and indexes its contents.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, or for any reason [`Container::parse`] can.
    pub fn read_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        track(|| Self::build(fs::read(path)?))
    }

    fn build(data: Vec<u8>) -> Result<Self, Error> {
        let header = Header::parse(&data)?;

        // duplicate names resolve to the last sample carrying them
        let name_index = header
            .samples
            .iter()
            .zip(1..)
            .map(|(sample, index)| (sample.name.clone(), index))
            .collect();

        Ok(Self {
            data: data.into_boxed_slice(),
            format: header.format,
            mode: header.mode,
            samples: header.samples.into_boxed_slice(),
            name_index,
        })
    }

    /// Returns the layout the container was parsed as.
    #[must_use]
    pub fn format(&self) -> Format {
        self.format
    }

    /// Returns the bank-wide mode field from the header, or 0 for raw containers.
    #[must_use]
    pub fn mode(&self) -> u32 {
        self.mode
    }

    /// Returns the number of samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns `true` if the container holds no samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Returns every sample in index order.
    #[must_use]
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Returns the sample at a 1-based `index`.
    #[must_use]
    pub fn sample(&self, index: u32) -> Option<&Sample> {
        let position = usize::try_from(index.checked_sub(1)?).ok()?;
        self.samples.get(position)
    }

    /// Returns sample names in index order; the first name belongs to index 1.
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.samples.iter().map(Sample::name)
    }

    /// Looks up the 1-based index of the sample called `name`.
    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<u32> {
        self.name_index.get(name).copied()
    }

    /// Returns the whole name to index table.
    #[must_use]
    pub fn name_index(&self) -> &HashMap<Box<str>, u32> {
        &self.name_index
    }

    /// Returns the bytes the container was built from.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Returns the stored bytes of the sample at a 1-based `index`.
    #[must_use]
    pub fn sample_data(&self, index: u32) -> Option<&[u8]> {
        self.sample(index)
            .and_then(|sample| self.data.get(sample.range()))
    }

    /// Extracts the sample at a 1-based `index` using the [process-wide decoder](system_decoder).
    ///
    /// # Errors
    /// See [`Container::get_with`].
    pub fn get(&self, index: u32) -> Result<Extracted<'_>, Error> {
        self.get_with(index, system_decoder())
    }

    /// Extracts the sample at a 1-based `index`.
    ///
    /// For sound banks the decoder is tried first, and its PCM output is returned as a WAV
    /// file. If decoding fails the stored bytes are returned instead: as-is when they carry a
    /// recognizable signature, otherwise classified by codec, with PCM and IMA ADPCM wrapped
    /// in a WAV header. Raw containers return their whole buffer.
    ///
    /// # Errors
    /// Returns an error if `index` is out of range or a buffer cannot be allocated. Decoder
    /// failures are not errors.
    pub fn get_with(&self, index: u32, decoder: &dyn Decoder) -> Result<Extracted<'_>, Error> {
        track(|| self.extract(index, decoder))
    }

    /// Extracts the sample at a 1-based `index` with the process-wide decoder and writes it to
    /// `path`, returning the extension that suits its contents.
    ///
    /// # Errors
    /// Returns an error if extraction fails or the file cannot be written.
    pub fn save(&self, index: u32, path: impl AsRef<Path>) -> Result<Extension, Error> {
        self.save_with(index, path, system_decoder())
    }

    /// Like [`Container::save`], with a caller-chosen decoder.
    ///
    /// # Errors
    /// Returns an error if extraction fails or the file cannot be written.
    pub fn save_with(
        &self,
        index: u32,
        path: impl AsRef<Path>,
        decoder: &dyn Decoder,
    ) -> Result<Extension, Error> {
        track(|| {
            let extracted = self.extract(index, decoder)?;
            fs::write(path, extracted.data())?;
            Ok(extracted.extension())
        })
    }

    fn extract(&self, index: u32, decoder: &dyn Decoder) -> Result<Extracted<'_>, Error> {
        let (subsong, sample) = NonZeroU32::new(index)
            .zip(self.sample(index))
            .ok_or_else(|| Error::index(index, self.samples.len()))?;

        if self.format == Format::Raw {
            return Ok(Extracted::borrowed(&self.data, sniff(&self.data)));
        }

        if decoder.is_available() {
            match decoder.decode(&self.data, subsong) {
                Ok(pcm) => {
                    let format = WavFormat::pcm(16, pcm.channels(), pcm.sample_rate());
                    let wav = synthesize(&format, pcm.data())?;
                    return Ok(Extracted::owned(wav, Extension::Wav));
                }
                Err(e) if e.kind() == ErrorKind::OutOfMemory => return Err(e.into()),
                Err(e) => log_fallback(index, &e),
            }
        }

        let bytes = self.data.get(sample.range()).unwrap_or_default();

        let extension = match sniff(bytes) {
            Extension::Bin => match sample.codec() {
                Codec::Mpeg => Extension::Mp3,
                Codec::Vorbis => Extension::Vorbis,
                _ => match wav_format(sample) {
                    Some(format) => {
                        let wav = synthesize(&format, bytes)?;
                        return Ok(Extracted::owned(wav, Extension::Wav));
                    }
                    None => Extension::Bin,
                },
            },
            extension => extension,
        };

        Ok(Extracted::borrowed(bytes, extension))
    }
}

fn log_fallback(index: u32, error: &DecodeError) {
    debug!("sample {index} was not decoded, using stored bytes: {error}");
}

/// Audio extracted from a [`Container`], borrowed when it is returned as stored.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Extracted<'a> {
    data: Cow<'a, [u8]>,
    extension: Extension,
}

impl<'a> Extracted<'a> {
    fn borrowed(data: &'a [u8], extension: Extension) -> Self {
        Self {
            data: Cow::Borrowed(data),
            extension,
        }
    }

    fn owned(data: Vec<u8>, extension: Extension) -> Self {
        Self {
            data: Cow::Owned(data),
            extension,
        }
    }

    /// Returns the extracted bytes.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Returns the file extension matching the bytes.
    #[must_use]
    pub fn extension(&self) -> Extension {
        self.extension
    }

    /// Consumes the value, returning the extracted bytes.
    #[must_use]
    pub fn into_data(self) -> Cow<'a, [u8]> {
        self.data
    }
}

#[cfg(test)]
mod test {
    use super::Container;
    use crate::{
        bytes::{le_u16, le_u32},
        decode::{error::DecodeError, Decoder, NoDecoder, Pcm16},
        error::{last_error, ErrorKind},
        header::{
            fixtures::{fsb4, fsb5, Fsb4Sample, Fsb5Sample},
            Codec, Format,
        },
        sniff::Extension,
    };
    use hound::WavReader;
    use std::{borrow::Cow, cell::Cell, env, fs, io::Cursor, num::NonZeroU32, process};

    const PCM16: u32 = 2;
    const XMA: u32 = 10;
    const MPEG: u32 = 11;
    const VORBIS: u32 = 15;

    #[derive(Debug, Default)]
    struct Silence {
        seen: Cell<Option<(usize, NonZeroU32)>>,
    }

    impl Decoder for Silence {
        fn decode(&self, bank: &[u8], subsong: NonZeroU32) -> Result<Pcm16, DecodeError> {
            self.seen.set(Some((bank.len(), subsong)));
            Ok(Pcm16::new(2, 22050, vec![0; 8]))
        }
    }

    #[derive(Debug)]
    struct Exhausted;

    impl Decoder for Exhausted {
        fn decode(&self, _bank: &[u8], _subsong: NonZeroU32) -> Result<Pcm16, DecodeError> {
            let source = Vec::<u8>::new().try_reserve(usize::MAX).unwrap_err();
            Err(DecodeError::allocation(usize::MAX)(source))
        }
    }

    #[derive(Debug, Default)]
    struct Rejecting {
        available: bool,
        calls: Cell<u32>,
    }

    impl Decoder for Rejecting {
        fn decode(&self, _bank: &[u8], _subsong: NonZeroU32) -> Result<Pcm16, DecodeError> {
            self.calls.set(self.calls.get() + 1);
            Err(DecodeError::failed("unsupported codec"))
        }

        fn is_available(&self) -> bool {
            self.available
        }
    }

    fn bank(mode: u32, data: &[u8]) -> Container {
        let samples = [Fsb5Sample::new(0), Fsb5Sample::new(32)];
        Container::parse(&fsb5(1, mode, &samples, Some(&["kick", "snare"]), data)).unwrap()
    }

    #[test]
    fn fsb5_bank_is_indexed() {
        let container = bank(PCM16, &[7; 48]);

        assert_eq!(container.format(), Format::Fsb5);
        assert_eq!(container.mode(), PCM16);
        assert_eq!(container.len(), 2);
        assert_eq!(container.names().collect::<Vec<_>>(), ["kick", "snare"]);
        assert_eq!(container.index_of("snare"), Some(2));
        assert_eq!(container.index_of("hat"), None);
        assert_eq!(container.sample(1).unwrap().codec(), Codec::Pcm16);
        assert_eq!(container.sample_data(1).map(<[u8]>::len), Some(32));
        assert_eq!(container.sample_data(2).map(<[u8]>::len), Some(16));
        assert!(container.sample(0).is_none());
        assert!(container.sample(3).is_none());
    }

    #[test]
    fn duplicate_names_resolve_to_last_index() {
        let samples = [Fsb5Sample::new(0), Fsb5Sample::new(16), Fsb5Sample::new(32)];
        let data = fsb5(1, PCM16, &samples, Some(&["loop", "hit", "loop"]), &[0; 48]);
        let container = Container::from_vec(data).unwrap();

        assert_eq!(container.len(), 3);
        assert_eq!(container.name_index().len(), 2);
        assert_eq!(container.index_of("loop"), Some(3));
        assert_eq!(container.index_of("hit"), Some(2));
    }

    #[test]
    fn empty_bank_has_no_samples() {
        let container = Container::parse(&fsb5(1, PCM16, &[], None, &[])).unwrap();

        assert!(container.is_empty());
        assert!(container.name_index().is_empty());
        assert_eq!(container.names().count(), 0);
    }

    #[test]
    fn index_is_validated() {
        let container = bank(PCM16, &[0; 48]);

        for index in [0, 3] {
            assert!(container
                .get_with(index, &NoDecoder::default())
                .is_err_and(|e| e.kind() == ErrorKind::InvalidIndex));
            assert!(!last_error().is_empty());
        }
    }

    #[test]
    fn decoded_pcm_is_wrapped_as_wav() {
        let container = bank(VORBIS, &[0; 48]);
        let decoder = Silence::default();

        let extracted = container.get_with(2, &decoder).unwrap();
        assert_eq!(extracted.extension(), Extension::Wav);
        assert_eq!(
            decoder.seen.get(),
            Some((container.as_bytes().len(), NonZeroU32::new(2).unwrap()))
        );

        let spec = WavReader::new(Cursor::new(extracted.data())).unwrap().spec();
        assert_eq!(spec.channels, 2);
        assert_eq!(spec.sample_rate, 22050);
        assert_eq!(spec.bits_per_sample, 16);
        assert!(last_error().is_empty());
    }

    #[test]
    fn pcm_falls_back_to_stored_bytes_in_wav() {
        let container = bank(PCM16, &[1; 48]);

        let extracted = container.get_with(1, &NoDecoder::default()).unwrap();
        assert_eq!(extracted.extension(), Extension::Wav);
        assert_eq!(extracted.data().len(), 44 + 32);
        assert_eq!(le_u16(extracted.data(), 22), Some(1));
        assert_eq!(le_u32(extracted.data(), 24), Some(44100));
        assert_eq!(&extracted.data()[44..], [1; 32]);
    }

    #[test]
    fn signatures_win_over_codec() {
        let mut data = vec![0; 48];
        data[32..36].copy_from_slice(b"OggS");
        let container = bank(XMA, &data);

        let extracted = container.get_with(2, &NoDecoder::default()).unwrap();
        assert_eq!(extracted.extension(), Extension::Ogg);
        assert!(matches!(extracted.into_data(), Cow::Borrowed(bytes) if bytes.len() == 16));
    }

    #[test]
    fn codec_picks_extension_when_unsniffable() {
        for (mode, extension) in [
            (MPEG, Extension::Mp3),
            (VORBIS, Extension::Vorbis),
            (XMA, Extension::Bin),
        ] {
            let container = bank(mode, &[0; 48]);
            let extracted = container.get_with(1, &NoDecoder::default()).unwrap();

            assert_eq!(extracted.extension(), extension);
            assert_eq!(extracted.data(), [0; 32]);
        }
    }

    #[test]
    fn decode_failure_falls_back_to_stored_bytes() {
        let container = bank(MPEG, &[5; 48]);
        let decoder = Rejecting {
            available: true,
            ..Rejecting::default()
        };

        let error = decoder.decode(container.as_bytes(), NonZeroU32::MIN).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::DecodeFailed);

        let extracted = container.get_with(2, &decoder).unwrap();
        assert_eq!(decoder.calls.get(), 2);
        assert_eq!(extracted.extension(), Extension::Mp3);
        assert_eq!(extracted.data(), [5; 16]);
        assert!(last_error().is_empty());
    }

    #[test]
    fn unavailable_decoder_is_not_called() {
        let container = bank(MPEG, &[5; 48]);
        let decoder = Rejecting::default();

        let extracted = container.get_with(1, &decoder).unwrap();
        assert_eq!(decoder.calls.get(), 0);
        assert_eq!(extracted.extension(), Extension::Mp3);
        assert_eq!(extracted.data(), [5; 32]);
    }

    #[test]
    fn zeroed_fsb5_header_is_an_empty_bank() {
        let mut data = b"FSB5".to_vec();
        data.resize(60, 0);

        let container = Container::parse(&data).unwrap();
        assert_eq!(container.format(), Format::Fsb5);
        assert!(container.is_empty());
        assert_eq!(container.names().count(), 0);
        assert!(container.name_index().is_empty());
        assert!(last_error().is_empty());
    }

    #[test]
    fn allocation_failure_in_decoder_is_not_recovered() {
        let container = bank(PCM16, &[0; 48]);

        assert!(container
            .get_with(1, &Exhausted)
            .is_err_and(|e| e.kind() == ErrorKind::OutOfMemory));
        assert!(last_error().contains("allocate"));
    }

    #[test]
    fn raw_data_is_returned_whole() {
        let wav = Container::parse(b"RIFF\0\0\0\0WAVEfmt ").unwrap();
        assert_eq!(wav.format(), Format::Raw);
        assert_eq!(wav.names().collect::<Vec<_>>(), ["raw"]);
        assert_eq!(wav.index_of("raw"), Some(1));

        let extracted = wav.get_with(1, &Silence::default()).unwrap();
        assert_eq!(extracted.extension(), Extension::Wav);
        assert_eq!(extracted.data(), wav.as_bytes());

        let blob = Container::parse(b"hello").unwrap();
        let extracted = blob.get_with(1, &NoDecoder::default()).unwrap();
        assert_eq!(extracted.extension(), Extension::Bin);
        assert_eq!(extracted.data(), b"hello");
    }

    #[test]
    fn empty_input_is_rejected() {
        assert!(Container::parse(&[]).is_err_and(|e| e.kind() == ErrorKind::MalformedHeader));
        assert!(!last_error().is_empty());
    }

    #[test]
    fn fsb4_samples_fall_back_by_mode() {
        let data = fsb4(&[
            Fsb4Sample {
                name: "blip",
                mode: 0x08,
                frequency: 22050,
                channels: 1,
                data: &[0x80; 10],
            },
            Fsb4Sample {
                name: "boom",
                mode: 0x0200_0000,
                frequency: 32000,
                channels: 2,
                data: &[0; 20],
            },
        ]);
        let container = Container::parse(&data).unwrap();
        assert_eq!(container.format(), Format::Fsb4);

        let blip = container.get_with(1, &NoDecoder::default()).unwrap();
        let spec = WavReader::new(Cursor::new(blip.data())).unwrap().spec();
        assert_eq!(blip.extension(), Extension::Wav);
        assert_eq!(spec.bits_per_sample, 8);
        assert_eq!(spec.sample_rate, 22050);

        let boom = container.get_with(2, &NoDecoder::default()).unwrap();
        let spec = WavReader::new(Cursor::new(boom.data())).unwrap().spec();
        assert_eq!(boom.extension(), Extension::Wav);
        assert_eq!(spec.bits_per_sample, 16);
        assert_eq!(spec.channels, 2);
        assert_eq!(spec.sample_rate, 32000);
        assert_eq!(&boom.data()[boom.data().len() - 20..], [0; 20]);
    }

    #[test]
    fn fsb4_headers_past_end_are_rejected() {
        let mut data = fsb4(&[Fsb4Sample {
            name: "blip",
            mode: 0,
            frequency: 22050,
            channels: 1,
            data: &[0; 4],
        }]);
        data[8..12].copy_from_slice(&10_000_i32.to_le_bytes());

        assert!(Container::parse(&data).is_err_and(|e| e.kind() == ErrorKind::BoundsViolation));
        assert!(last_error().starts_with("failed to parse sound bank"));
    }

    #[test]
    fn save_writes_extracted_bytes() {
        let container = bank(MPEG, &[3; 48]);
        let path = env::temp_dir().join(format!("fsbx-save-{}.mp3", process::id()));

        let extension = container
            .save_with(2, &path, &NoDecoder::default())
            .unwrap();
        let written = fs::read(&path).unwrap();
        fs::remove_file(&path).unwrap();

        assert_eq!(extension, Extension::Mp3);
        assert_eq!(written, [3; 16]);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let path = env::temp_dir().join("fsbx-does-not-exist.fsb");
        assert!(Container::read_file(path).is_err_and(|e| e.kind() == ErrorKind::Io));
    }
}
