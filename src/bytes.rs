// Positional little-endian readers return `None` instead of panicking when the value
// would straddle the end of the slice.

pub(crate) fn le_u16(data: &[u8], position: usize) -> Option<u16> {
    data.get(position..position.checked_add(2)?)
        .and_then(|bytes| bytes.try_into().ok())
        .map(u16::from_le_bytes)
}

pub(crate) fn le_u32(data: &[u8], position: usize) -> Option<u32> {
    data.get(position..position.checked_add(4)?)
        .and_then(|bytes| bytes.try_into().ok())
        .map(u32::from_le_bytes)
}

pub(crate) fn le_u64(data: &[u8], position: usize) -> Option<u64> {
    data.get(position..position.checked_add(8)?)
        .and_then(|bytes| bytes.try_into().ok())
        .map(u64::from_le_bytes)
}

pub(crate) fn le_i32(data: &[u8], position: usize) -> Option<i32> {
    le_u32(data, position).map(|n| i32::from_le_bytes(n.to_le_bytes()))
}

pub(crate) fn put_u16_le(buf: &mut Vec<u8>, value: u16) {
    buf.extend_from_slice(&value.to_le_bytes());
}

pub(crate) fn put_u32_le(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_le_bytes());
}

/// Extracts `len` bits of `value` starting at bit `start` (LSB first).
///
/// A zero length or a start outside the word yields 0. A field that runs past the top of the
/// word is not an error: the remaining high bits are returned unmasked.
pub(crate) fn bits_u32(value: u32, start: u32, len: u32) -> u32 {
    if len == 0 || start >= u32::BITS {
        return 0;
    }
    if len >= u32::BITS - start {
        return value >> start;
    }
    (value >> start) & ((1 << len) - 1)
}

/// 64-bit counterpart of [`bits_u32`] with the same saturating behavior.
pub(crate) fn bits_u64(value: u64, start: u32, len: u32) -> u64 {
    if len == 0 || start >= u64::BITS {
        return 0;
    }
    if len >= u64::BITS - start {
        return value >> start;
    }
    (value >> start) & ((1 << len) - 1)
}

#[cfg(test)]
mod test {
    use super::{bits_u32, bits_u64, le_i32, le_u16, le_u32, le_u64, put_u16_le, put_u32_le};

    #[test]
    fn read_numbers() {
        let data = b"\x11\x00\x00\x00\x34\x12\x00\x00\xFF\xFF\xFF\xFF";

        assert_eq!(le_u32(data, 0), Some(17));
        assert_eq!(le_u32(data, 4), Some(4660));
        assert_eq!(le_u16(data, 4), Some(0x1234));
        assert_eq!(le_i32(data, 8), Some(-1));
        assert_eq!(le_u64(data, 0), Some(0x0000_1234_0000_0011));
    }

    #[test]
    fn reads_past_end_are_rejected() {
        let data = b"\x00\x01\x02";

        assert_eq!(le_u16(data, 1), Some(0x0201));
        assert_eq!(le_u16(data, 2), None);
        assert_eq!(le_u32(data, 0), None);
        assert_eq!(le_u64(data, 0), None);
        assert_eq!(le_u32(data, usize::MAX), None);
    }

    #[test]
    fn write_numbers() {
        let mut buf = Vec::new();
        put_u16_le(&mut buf, 0xBEEF);
        put_u32_le(&mut buf, 0x0102_0304);

        assert_eq!(buf, [0xEF, 0xBE, 0x04, 0x03, 0x02, 0x01]);
    }

    #[test]
    fn extract_bit_fields() {
        let value = 0b1011_0110_u32;

        assert_eq!(bits_u32(value, 0, 1), 0);
        assert_eq!(bits_u32(value, 1, 2), 0b11);
        assert_eq!(bits_u32(value, 4, 4), 0b1011);
        assert_eq!(bits_u64(u64::from(value) << 40, 44, 4), 0b1011);
    }

    #[test]
    fn degenerate_fields_yield_zero() {
        assert_eq!(bits_u32(u32::MAX, 0, 0), 0);
        assert_eq!(bits_u32(u32::MAX, 32, 4), 0);
        assert_eq!(bits_u64(u64::MAX, 64, 1), 0);
    }

    #[test]
    fn oversized_fields_return_remaining_high_bits() {
        assert_eq!(bits_u32(0xF000_0000, 28, 8), 0xF);
        assert_eq!(bits_u32(0x8000_0001, 0, 32), 0x8000_0001);
        assert_eq!(bits_u64(u64::MAX, 34, 40), 0x3FFF_FFFF);
        assert_eq!(bits_u64(0x1234, 0, 100), 0x1234);
    }
}
