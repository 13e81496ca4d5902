use crate::bytes;
use std::{
    error::Error,
    fmt::{Display, Formatter, Result as FmtResult},
    num::NonZeroUsize,
};

/// Cursor over a byte slice that refuses to move past `limit`.
///
/// Positions are absolute offsets into the slice, so errors can point at the exact byte
/// in the original buffer.
#[derive(Debug)]
pub(crate) struct Reader<'data> {
    data: &'data [u8],
    position: usize,
    limit: usize,
}

impl<'data> Reader<'data> {
    pub(crate) fn new(data: &'data [u8]) -> Self {
        Self {
            data,
            position: 0,
            limit: data.len(),
        }
    }

    /// Creates a reader over `data[start..limit]`. Both bounds are clamped to the slice.
    pub(crate) fn bounded(data: &'data [u8], start: usize, limit: usize) -> Self {
        let limit = limit.min(data.len());

        Self {
            data,
            position: start.min(limit),
            limit,
        }
    }

    #[cfg(test)]
    pub(crate) fn position(&self) -> usize {
        self.position
    }

    pub(crate) fn remaining(&self) -> usize {
        self.limit - self.position
    }

    fn error(&self, len: usize) -> ReadError {
        ReadError {
            position: self.position,
            needed: NonZeroUsize::new(len.saturating_sub(self.remaining()))
                .unwrap_or(NonZeroUsize::MIN),
        }
    }

    pub(crate) fn take(&mut self, len: usize) -> ReadResult<&'data [u8]> {
        if len > self.remaining() {
            return Err(self.error(len));
        }

        let data = &self.data[self.position..self.position + len];
        self.position += len;
        Ok(data)
    }

    pub(crate) fn skip(&mut self, amount: usize) -> ReadResult<()> {
        self.take(amount).map(|_| ())
    }

    // decodes a fixed-width value with one of the positional readers, bounded by `limit`
    fn read_with<T>(&mut self, len: usize, read: fn(&[u8], usize) -> Option<T>) -> ReadResult<T> {
        let value = read(&self.data[..self.limit], self.position).ok_or_else(|| self.error(len))?;
        self.position += len;
        Ok(value)
    }

    pub(crate) fn le_u16(&mut self) -> ReadResult<u16> {
        self.read_with(2, bytes::le_u16)
    }

    pub(crate) fn le_u32(&mut self) -> ReadResult<u32> {
        self.read_with(4, bytes::le_u32)
    }

    pub(crate) fn le_u64(&mut self) -> ReadResult<u64> {
        self.read_with(8, bytes::le_u64)
    }

    pub(crate) fn le_i32(&mut self) -> ReadResult<i32> {
        self.read_with(4, bytes::le_i32)
    }
}

pub(crate) type ReadResult<T> = Result<T, ReadError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ReadError {
    position: usize,
    needed: NonZeroUsize,
}

impl ReadError {
    #[cfg(test)]
    pub(crate) fn needed(&self) -> usize {
        self.needed.get()
    }
}

impl Display for ReadError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(&format!(
            "incomplete data: needed {} more bytes to read - byte position {}",
            self.needed, self.position
        ))
    }
}

impl Error for ReadError {}
