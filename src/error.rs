use crate::{decode::error::DecodeError, encode::error::WavError, header::error::HeaderError};
use std::{
    cell::RefCell,
    collections::TryReserveError,
    error::Error as StdError,
    fmt::{Display, Formatter, Result as FmtResult},
    io,
};

/// Broad category of an [`Error`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The sound bank header had a bad signature or a field out of range.
    MalformedHeader,
    /// An offset or size in the sound bank pointed outside the input.
    BoundsViolation,
    /// A buffer could not be allocated.
    OutOfMemory,
    /// No decoder library could be loaded, or the one found is incompatible.
    DecoderUnavailable,
    /// The decoder was loaded but rejected or failed on the stream.
    DecodeFailed,
    /// A sample index was 0 or past the last sample.
    InvalidIndex,
    /// Reading or writing a file failed.
    Io,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(match self {
            Self::MalformedHeader => "malformed header",
            Self::BoundsViolation => "bounds violation",
            Self::OutOfMemory => "out of memory",
            Self::DecoderUnavailable => "decoder unavailable",
            Self::DecodeFailed => "decode failed",
            Self::InvalidIndex => "invalid index",
            Self::Io => "I/O error",
        })
    }
}

/// An error returned by a [`Container`](crate::Container) operation.
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    source: ErrorSource,
}

#[derive(Debug)]
enum ErrorSource {
    Header(HeaderError),
    Decode(DecodeError),
    Wav(WavError),
    Io(io::Error),
    Index { index: u32, count: usize },
    Allocation { size: usize, source: TryReserveError },
}

impl Error {
    /// Returns the category of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub(crate) fn index(index: u32, count: usize) -> Self {
        Self {
            kind: ErrorKind::InvalidIndex,
            source: ErrorSource::Index { index, count },
        }
    }

    pub(crate) fn allocation(size: usize) -> impl FnOnce(TryReserveError) -> Self {
        move |source| Self {
            kind: ErrorKind::OutOfMemory,
            source: ErrorSource::Allocation { size, source },
        }
    }
}

impl From<HeaderError> for Error {
    fn from(value: HeaderError) -> Self {
        Self {
            kind: value.category(),
            source: ErrorSource::Header(value),
        }
    }
}

impl From<DecodeError> for Error {
    fn from(value: DecodeError) -> Self {
        Self {
            kind: value.kind(),
            source: ErrorSource::Decode(value),
        }
    }
}

impl From<WavError> for Error {
    fn from(value: WavError) -> Self {
        Self {
            kind: value.category(),
            source: ErrorSource::Wav(value),
        }
    }
}

impl From<io::Error> for Error {
    fn from(value: io::Error) -> Self {
        Self {
            kind: ErrorKind::Io,
            source: ErrorSource::Io(value),
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match &self.source {
            ErrorSource::Header(_) => f.write_str("failed to parse sound bank"),
            ErrorSource::Decode(_) => f.write_str("failed to decode sample"),
            ErrorSource::Wav(_) => f.write_str("failed to build WAV file"),
            ErrorSource::Io(_) => f.write_str("failed to access file"),
            ErrorSource::Index { index, count } => f.write_str(&format!(
                "sample index {index} was out of range (bank has {count} samples)"
            )),
            ErrorSource::Allocation { size, .. } => {
                f.write_str(&format!("failed to allocate {size} bytes"))
            }
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match &self.source {
            ErrorSource::Header(e) => Some(e),
            ErrorSource::Decode(e) => Some(e),
            ErrorSource::Wav(e) => Some(e),
            ErrorSource::Io(e) => Some(e),
            ErrorSource::Allocation { source, .. } => Some(source),
            ErrorSource::Index { .. } => None,
        }
    }
}

const LAST_ERROR_CAPACITY: usize = 1023;

thread_local! {
    static LAST_ERROR: RefCell<String> = const { RefCell::new(String::new()) };
}

/// Returns the message of the most recent failed operation on this thread.
///
/// The message is empty if the last operation succeeded. It includes every error in the source
/// chain, joined by `": "`, and is cut to at most 1023 bytes.
#[must_use]
pub fn last_error() -> String {
    LAST_ERROR.with(|last| last.borrow().clone())
}

/// Runs `operation`, clearing the last error first and recording it if `operation` fails.
pub(crate) fn track<T>(operation: impl FnOnce() -> Result<T, Error>) -> Result<T, Error> {
    LAST_ERROR.with(|last| last.borrow_mut().clear());

    operation().map_err(|e| {
        let message = describe(&e);
        LAST_ERROR.with(|last| *last.borrow_mut() = message);
        e
    })
}

fn describe(error: &dyn StdError) -> String {
    let mut message = error.to_string();
    let mut source = error.source();

    while let Some(e) = source {
        message.push_str(": ");
        message.push_str(&e.to_string());
        source = e.source();
    }

    if message.len() > LAST_ERROR_CAPACITY {
        let mut end = LAST_ERROR_CAPACITY;
        while !message.is_char_boundary(end) {
            end -= 1;
        }
        message.truncate(end);
    }

    message
}
