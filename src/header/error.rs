use crate::{error::ErrorKind, read::ReadError};
use std::{
    error::Error,
    fmt::{Display, Formatter, Result as FmtResult},
};

#[derive(Debug)]
pub(crate) struct HeaderError {
    kind: HeaderErrorKind,
    source: Option<HeaderErrorSource>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum HeaderErrorKind {
    EmptyInput,
    Magic,
    Version,
    SampleCount,
    TooManySamples { count: u32 },
    InvalidSampleCount { count: i32 },
    SampleHeadersSize,
    InvalidSizes { sample_headers: i32, data: i32 },
    NameTableSize,
    DataSize,
    Mode,
    Truncated { expected: usize, actual: usize },
    HeadersOverflow { end: u64, actual: usize },
    SampleHeadersTooSmall { expected: u64, actual: u64 },
    SampleDataOverflow { index: u32 },
    SampleHeader,
    NameOffsets { expected: u64, actual: usize },
}

#[derive(Debug)]
enum HeaderErrorSource {
    Read(ReadError),
    Stream(StreamError),
}

impl HeaderError {
    pub(crate) fn new(kind: HeaderErrorKind) -> Self {
        Self { kind, source: None }
    }

    pub(crate) fn new_with_source(kind: HeaderErrorKind, source: ReadError) -> Self {
        Self {
            kind,
            source: Some(HeaderErrorSource::Read(source)),
        }
    }

    pub(crate) fn factory(kind: HeaderErrorKind) -> impl FnOnce(ReadError) -> Self {
        move |source| Self::new_with_source(kind, source)
    }

    #[cfg(test)]
    pub(crate) fn kind(&self) -> HeaderErrorKind {
        self.kind
    }

    /// Separates headers that contradict themselves from headers that point outside the buffer.
    pub(crate) fn category(&self) -> ErrorKind {
        #[allow(clippy::enum_glob_use)]
        use HeaderErrorKind::*;

        match self.kind {
            EmptyInput
            | Magic
            | TooManySamples { .. }
            | InvalidSampleCount { .. }
            | InvalidSizes { .. }
            | SampleHeadersTooSmall { .. } => ErrorKind::MalformedHeader,
            Version
            | SampleCount
            | SampleHeadersSize
            | NameTableSize
            | DataSize
            | Mode
            | Truncated { .. }
            | HeadersOverflow { .. }
            | SampleDataOverflow { .. }
            | SampleHeader
            | NameOffsets { .. } => ErrorKind::BoundsViolation,
        }
    }

    #[cfg(test)]
    pub(crate) fn is_stream_err_kind(&self, kind: StreamErrorKind) -> bool {
        match &self.source {
            Some(HeaderErrorSource::Stream(e)) => e.kind == kind,
            _ => false,
        }
    }

    #[cfg(test)]
    pub(crate) fn is_chunk_err_kind(&self, kind: ChunkErrorKind) -> bool {
        match &self.source {
            Some(HeaderErrorSource::Stream(e)) => match &e.source {
                Some(StreamErrorSource::Chunk(e)) => e.kind == kind,
                _ => false,
            },
            _ => false,
        }
    }
}

impl Display for HeaderError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        #[allow(clippy::enum_glob_use)]
        use HeaderErrorKind::*;

        match self.kind {
            EmptyInput => f.write_str("input was empty"),
            Magic => f.write_str("no file signature found"),
            Version => f.write_str("failed to read file format version"),
            SampleCount => f.write_str("failed to read number of samples"),
            TooManySamples { count } => {
                f.write_str(&format!("number of samples was implausibly large ({count})"))
            }
            InvalidSampleCount { count } => {
                f.write_str(&format!("number of samples was out of range ({count})"))
            }
            SampleHeadersSize => f.write_str("failed to read size of sample headers"),
            InvalidSizes { sample_headers, data } => f.write_str(&format!(
                "size of sample headers ({sample_headers} bytes) or sample data ({data} bytes) was invalid"
            )),
            NameTableSize => f.write_str("failed to read size of name table"),
            DataSize => f.write_str("failed to read total size of sample data"),
            Mode => f.write_str("failed to read mode flags"),
            Truncated { expected, actual } => f.write_str(&format!(
                "input ({actual} bytes) was shorter than the base header ({expected} bytes)"
            )),
            HeadersOverflow { end, actual } => f.write_str(&format!(
                "headers end at byte {end}, past the end of the input ({actual} bytes)"
            )),
            SampleHeadersTooSmall { expected, actual } => f.write_str(&format!(
                "size of sample headers ({actual} bytes) was smaller than required ({expected} bytes)"
            )),
            SampleDataOverflow { index } => f.write_str(&format!(
                "data of sample at index {index} extends past the end of the input"
            )),
            SampleHeader => f.write_str("failed to parse sample header"),
            NameOffsets { expected, actual } => f.write_str(&format!(
                "name table ({actual} bytes) was too small for its offsets ({expected} bytes)"
            )),
        }
    }
}

impl Error for HeaderError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.source {
            Some(source) => match source {
                HeaderErrorSource::Read(e) => Some(e),
                HeaderErrorSource::Stream(e) => Some(e),
            },
            None => None,
        }
    }
}

#[derive(Debug)]
pub(crate) struct StreamError {
    index: u32,
    kind: StreamErrorKind,
    source: Option<StreamErrorSource>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum StreamErrorKind {
    BaseHeader,
    Name,
    Chunk,
}

#[derive(Debug)]
enum StreamErrorSource {
    Read(ReadError),
    Chunk(ChunkError),
}

impl StreamError {
    pub(crate) fn new_with_source(index: u32, kind: StreamErrorKind, source: ReadError) -> Self {
        Self {
            index,
            kind,
            source: Some(StreamErrorSource::Read(source)),
        }
    }

    pub(crate) fn factory(index: u32, kind: StreamErrorKind) -> impl FnOnce(ReadError) -> Self {
        move |source| Self::new_with_source(index, kind, source)
    }
}

impl From<StreamError> for HeaderError {
    fn from(value: StreamError) -> Self {
        Self {
            kind: HeaderErrorKind::SampleHeader,
            source: Some(HeaderErrorSource::Stream(value)),
        }
    }
}

impl Display for StreamError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        #[allow(clippy::enum_glob_use)]
        use StreamErrorKind::*;

        match self.kind {
            BaseHeader => f.write_str("failed to read sample metadata"),
            Name => f.write_str("failed to read sample name"),
            Chunk => f.write_str("failed to parse sample header chunk"),
        }?;

        f.write_str(&format!(" - sample header at index {}", self.index))
    }
}

impl Error for StreamError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.source {
            Some(source) => match source {
                StreamErrorSource::Read(e) => Some(e),
                StreamErrorSource::Chunk(e) => Some(e),
            },
            None => None,
        }
    }
}

#[derive(Debug)]
pub(crate) struct ChunkError {
    index: u32,
    kind: ChunkErrorKind,
    source: ReadError,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ChunkErrorKind {
    Flag,
    Body { size: u32 },
}

impl ChunkError {
    pub(crate) fn factory(index: u32, kind: ChunkErrorKind) -> impl FnOnce(ReadError) -> Self {
        move |source| Self {
            index,
            kind,
            source,
        }
    }

    pub(crate) fn into_stream_err(self, stream_index: u32) -> StreamError {
        StreamError {
            index: stream_index,
            kind: StreamErrorKind::Chunk,
            source: Some(StreamErrorSource::Chunk(self)),
        }
    }
}

impl Display for ChunkError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self.kind {
            ChunkErrorKind::Flag => f.write_str("failed to read chunk flag"),
            ChunkErrorKind::Body { size } => f.write_str(&format!(
                "chunk body ({size} bytes) extends past the sample headers"
            )),
        }?;

        f.write_str(&format!(" - sample header chunk at index {}", self.index))
    }
}

impl Error for ChunkError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.source)
    }
}
