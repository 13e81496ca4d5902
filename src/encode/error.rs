use crate::error::ErrorKind;
use std::{
    collections::TryReserveError,
    error::Error,
    fmt::{Display, Formatter, Result as FmtResult},
};

#[derive(Debug)]
pub(crate) struct WavError {
    kind: WavErrorKind,
    source: Option<TryReserveError>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum WavErrorKind {
    ZeroBitDepth,
    TooLarge { size: usize },
    Allocation { size: usize },
}

impl WavError {
    pub(crate) fn new(kind: WavErrorKind) -> Self {
        Self { kind, source: None }
    }

    pub(crate) fn allocation(size: usize) -> impl FnOnce(TryReserveError) -> Self {
        move |source| Self {
            kind: WavErrorKind::Allocation { size },
            source: Some(source),
        }
    }

    #[cfg(test)]
    pub(crate) fn kind(&self) -> WavErrorKind {
        self.kind
    }

    pub(crate) fn category(&self) -> ErrorKind {
        match self.kind {
            WavErrorKind::ZeroBitDepth => ErrorKind::MalformedHeader,
            WavErrorKind::TooLarge { .. } => ErrorKind::BoundsViolation,
            WavErrorKind::Allocation { .. } => ErrorKind::OutOfMemory,
        }
    }
}

impl Display for WavError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self.kind {
            WavErrorKind::ZeroBitDepth => f.write_str("bits per sample was 0"),
            WavErrorKind::TooLarge { size } => f.write_str(&format!(
                "sample data ({size} bytes) does not fit in a RIFF file"
            )),
            WavErrorKind::Allocation { size } => {
                f.write_str(&format!("failed to allocate {size} bytes for WAV output"))
            }
        }
    }
}

impl Error for WavError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.source {
            Some(source) => Some(source),
            None => None,
        }
    }
}
