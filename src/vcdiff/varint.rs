// VCDIFF variable-length integers (RFC 3284, Section 2).
//
// Base-128, big-endian: most-significant group first. Every byte except the
// last has bit 7 set. Sizes, lengths and addresses are read in the 32-bit
// signed range (at most 5 bytes); checksums go through the 64-bit form.

use thiserror::Error;

use super::cursor::ByteCursor;

/// Maximum encoded length of a 64-bit value (ceil(63/7) = 9, padded to 10).
pub const MAX_VARINT_LEN: usize = 10;

/// Maximum encoded length of a value in the 32-bit signed range.
pub const MAX_VARINT_LEN_32: usize = 5;

/// Largest value accepted by [`read_int32`].
pub const MAX_INT32: u64 = i32::MAX as u64;

/// Largest value accepted by [`read_int64`].
pub const MAX_INT64: u64 = i64::MAX as u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum VarIntError {
    /// The cursor ran out before a terminating byte was seen.
    #[error("varint truncated (end of data)")]
    EndOfData,
    /// Too many bytes, or a value wider than the requested range.
    #[error("malformed varint")]
    Malformed,
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Encode `num` into the tail of `buf`; returns how many trailing bytes are used.
#[inline]
pub fn encode_u64(mut num: u64, buf: &mut [u8; MAX_VARINT_LEN]) -> usize {
    let mut i = MAX_VARINT_LEN;
    loop {
        i -= 1;
        buf[i] = (num as u8 & 0x7F) | 0x80;
        num >>= 7;
        if num == 0 {
            break;
        }
    }
    buf[MAX_VARINT_LEN - 1] &= 0x7F;
    MAX_VARINT_LEN - i
}

/// Append the encoding of `num` to `out`.
#[inline]
pub fn append_u64(out: &mut Vec<u8>, num: u64) {
    let mut buf = [0u8; MAX_VARINT_LEN];
    let len = encode_u64(num, &mut buf);
    out.extend_from_slice(&buf[MAX_VARINT_LEN - len..]);
}

#[inline]
pub fn append_usize(out: &mut Vec<u8>, num: usize) {
    append_u64(out, num as u64);
}

/// Number of bytes [`append_u64`] would produce for `num`.
#[inline]
pub fn encoded_len(num: u64) -> usize {
    let bits = 64 - num.leading_zeros();
    bits.max(1).div_ceil(7) as usize
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Shared decoder: accepts at most `max_len` bytes and values up to `max`.
/// The cursor is only advanced when a complete, in-range value was read.
fn read_bounded(cur: &mut ByteCursor<'_>, max: u64, max_len: usize) -> Result<u64, VarIntError> {
    let mut probe = *cur;
    let mut val: u64 = 0;
    for _ in 0..max_len {
        let byte = probe.read_u8().ok_or(VarIntError::EndOfData)?;
        if val > (max >> 7) {
            return Err(VarIntError::Malformed);
        }
        val = (val << 7) | u64::from(byte & 0x7F);
        if byte & 0x80 == 0 {
            if val > max {
                return Err(VarIntError::Malformed);
            }
            *cur = probe;
            return Ok(val);
        }
    }
    Err(VarIntError::Malformed)
}

/// Read a value in `0..=i32::MAX` (sizes, lengths, addresses).
pub fn read_int32(cur: &mut ByteCursor<'_>) -> Result<u32, VarIntError> {
    read_bounded(cur, MAX_INT32, MAX_VARINT_LEN_32).map(|v| v as u32)
}

/// Read a value in `0..=i64::MAX`.
pub fn read_int64(cur: &mut ByteCursor<'_>) -> Result<u64, VarIntError> {
    read_bounded(cur, MAX_INT64, MAX_VARINT_LEN)
}

/// Read an unsigned 32-bit value through the 64-bit form.
///
/// Checksums are written as 64-bit varints; any of the upper 32 bits being
/// set makes the encoding malformed.
pub fn read_uint32(cur: &mut ByteCursor<'_>) -> Result<u32, VarIntError> {
    let mut probe = *cur;
    let val = read_int64(&mut probe)?;
    let narrow = u32::try_from(val).map_err(|_| VarIntError::Malformed)?;
    *cur = probe;
    Ok(narrow)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(val: u64) -> Vec<u8> {
        let mut out = Vec::new();
        append_u64(&mut out, val);
        out
    }

    #[test]
    fn roundtrip_int64() {
        let cases: &[u64] = &[0, 1, 127, 128, 255, 16383, 16384, u32::MAX as u64, MAX_INT64];
        for &val in cases {
            let bytes = encoded(val);
            assert_eq!(bytes.len(), encoded_len(val), "length for {val}");
            let mut cur = ByteCursor::new(&bytes);
            assert_eq!(read_int64(&mut cur), Ok(val));
            assert!(cur.is_empty());
        }
    }

    #[test]
    fn roundtrip_int32() {
        for &val in &[0u32, 1, 127, 128, 16384, 0x7FFF_FFFF] {
            let bytes = encoded(u64::from(val));
            assert!(bytes.len() <= MAX_VARINT_LEN_32);
            let mut cur = ByteCursor::new(&bytes);
            assert_eq!(read_int32(&mut cur), Ok(val));
        }
    }

    #[test]
    fn encoding_is_big_endian() {
        // 300 = (10)(0101100) -> 0x82 0x2C
        assert_eq!(encoded(300), vec![0x82, 0x2C]);
        assert_eq!(encoded(0), vec![0x00]);
    }

    #[test]
    fn truncated_input_restores_cursor() {
        let data = [0x05, 0x81, 0x80];
        let mut cur = ByteCursor::new(&data);
        assert_eq!(read_int32(&mut cur), Ok(5));
        let before = cur.position();
        assert_eq!(read_int32(&mut cur), Err(VarIntError::EndOfData));
        assert_eq!(cur.position(), before);
    }

    #[test]
    fn int32_rejects_values_above_signed_range() {
        let bytes = encoded(0x8000_0000);
        let mut cur = ByteCursor::new(&bytes);
        assert_eq!(read_int32(&mut cur), Err(VarIntError::Malformed));
        assert_eq!(cur.position(), 0);
    }

    #[test]
    fn int32_rejects_six_byte_encodings() {
        // Zero padded with continuation bytes past the 5-byte limit.
        let data = [0x80, 0x80, 0x80, 0x80, 0x80, 0x01];
        let mut cur = ByteCursor::new(&data);
        assert_eq!(read_int32(&mut cur), Err(VarIntError::Malformed));
    }

    #[test]
    fn int64_rejects_overflow() {
        let data = [0xFF; 11];
        let mut cur = ByteCursor::new(&data);
        assert_eq!(read_int64(&mut cur), Err(VarIntError::Malformed));
    }

    #[test]
    fn uint32_checks_upper_bits() {
        let ok = encoded(u32::MAX as u64);
        assert_eq!(read_uint32(&mut ByteCursor::new(&ok)), Ok(u32::MAX));

        let wide = encoded(1u64 << 32);
        let mut cur = ByteCursor::new(&wide);
        assert_eq!(read_uint32(&mut cur), Err(VarIntError::Malformed));
        assert_eq!(cur.position(), 0);
    }
}
