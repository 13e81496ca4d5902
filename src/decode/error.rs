use crate::error::ErrorKind;
use std::{
    collections::TryReserveError,
    error::Error,
    fmt::{Display, Formatter, Result as FmtResult},
    num::NonZeroU32,
};

/// An error produced by a [`Decoder`](crate::Decoder).
#[derive(Debug)]
pub struct DecodeError {
    kind: DecodeErrorKind,
    source: Option<DecodeErrorSource>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum DecodeErrorKind {
    Unavailable,
    LoadLibrary,
    MissingExport { symbol: &'static str },
    VersionMismatch { version: u32 },
    Init,
    Open { subsong: NonZeroU32 },
    PlaysForever { subsong: NonZeroU32 },
    NotPcm16,
    Render,
    TooLarge { limit: usize },
    BufferOverflow,
    Allocation { size: usize },
    Failed,
}

#[derive(Debug)]
enum DecodeErrorSource {
    Library(libloading::Error),
    Allocation(TryReserveError),
    Message(Box<str>),
}

impl DecodeError {
    pub(crate) fn new(kind: DecodeErrorKind) -> Self {
        Self { kind, source: None }
    }

    pub(crate) fn library(kind: DecodeErrorKind) -> impl FnOnce(libloading::Error) -> Self {
        move |source| Self {
            kind,
            source: Some(DecodeErrorSource::Library(source)),
        }
    }

    pub(crate) fn allocation(size: usize) -> impl FnOnce(TryReserveError) -> Self {
        move |source| Self {
            kind: DecodeErrorKind::Allocation { size },
            source: Some(DecodeErrorSource::Allocation(source)),
        }
    }

    /// Creates an error reporting that no decoding backend can be used.
    pub fn unavailable(reason: impl Into<Box<str>>) -> Self {
        Self {
            kind: DecodeErrorKind::Unavailable,
            source: Some(DecodeErrorSource::Message(reason.into())),
        }
    }

    /// Creates an error reporting that a backend was present but could not decode the data.
    pub fn failed(reason: impl Into<Box<str>>) -> Self {
        Self {
            kind: DecodeErrorKind::Failed,
            source: Some(DecodeErrorSource::Message(reason.into())),
        }
    }

    /// Returns the category of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self.kind {
            DecodeErrorKind::Unavailable
            | DecodeErrorKind::LoadLibrary
            | DecodeErrorKind::MissingExport { .. }
            | DecodeErrorKind::VersionMismatch { .. } => ErrorKind::DecoderUnavailable,
            DecodeErrorKind::Allocation { .. } => ErrorKind::OutOfMemory,
            DecodeErrorKind::Init
            | DecodeErrorKind::Open { .. }
            | DecodeErrorKind::PlaysForever { .. }
            | DecodeErrorKind::NotPcm16
            | DecodeErrorKind::Render
            | DecodeErrorKind::TooLarge { .. }
            | DecodeErrorKind::BufferOverflow
            | DecodeErrorKind::Failed => ErrorKind::DecodeFailed,
        }
    }

    pub(crate) fn is_missing_library(&self) -> bool {
        self.kind == DecodeErrorKind::LoadLibrary
    }

    #[cfg(test)]
    pub(crate) fn detail(&self) -> DecodeErrorKind {
        self.kind
    }
}

impl Display for DecodeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        #[allow(clippy::enum_glob_use)]
        use DecodeErrorKind::*;

        match self.kind {
            Unavailable => f.write_str("no decoder is available"),
            LoadLibrary => f.write_str("failed to load decoder library"),
            MissingExport { symbol } => {
                f.write_str(&format!("decoder library is missing required export {symbol}"))
            }
            VersionMismatch { version } => f.write_str(&format!(
                "decoder library API version was not recognized (0x{version:08x})"
            )),
            Init => f.write_str("failed to initialize decoder"),
            Open { subsong } => f.write_str(&format!("failed to open subsong {subsong}")),
            PlaysForever { subsong } => {
                f.write_str(&format!("subsong {subsong} would play forever"))
            }
            NotPcm16 => f.write_str("decoder output was not 16-bit PCM"),
            Render => f.write_str("failed to render audio"),
            TooLarge { limit } => {
                f.write_str(&format!("decoded audio exceeded {limit} bytes"))
            }
            BufferOverflow => f.write_str("decoded audio buffer size overflowed"),
            Allocation { size } => {
                f.write_str(&format!("failed to allocate {size} bytes for decoded audio"))
            }
            Failed => f.write_str("failed to decode audio"),
        }?;

        match &self.source {
            Some(DecodeErrorSource::Message(reason)) => f.write_str(&format!(" - {reason}")),
            _ => Ok(()),
        }
    }
}

impl Error for DecodeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.source {
            Some(DecodeErrorSource::Library(e)) => Some(e),
            Some(DecodeErrorSource::Allocation(e)) => Some(e),
            Some(DecodeErrorSource::Message(_)) | None => None,
        }
    }
}
