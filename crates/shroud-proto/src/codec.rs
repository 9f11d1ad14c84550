//! Primitive field codec.
//!
//! Stateless functions over a flat buffer and a cursor passed by reference.
//! Every function advances the cursor only on success, so a failed read or
//! write leaves the cursor where it was.
//!
//! Integers are fixed 4-byte little-endian on every host. Variable-length
//! fields are an `i32` element count followed by the elements.

use crate::errors::{ProtocolError, Result};

/// Size of an encoded `i32` field.
pub const INT_SIZE: usize = 4;

/// Size of one encoded UTF-16 code unit.
const CHAR_SIZE: usize = 2;

/// Write a single byte.
pub fn write_byte(buf: &mut [u8], pos: &mut usize, value: u8) -> Result<()> {
    put(buf, pos, &[value])
}

/// Read a single byte.
pub fn read_byte(buf: &[u8], pos: &mut usize) -> Result<u8> {
    let [value] = take_array::<1>(buf, pos)?;
    Ok(value)
}

/// Write a boolean as one byte (`1` for true, `0` for false).
pub fn write_bool(buf: &mut [u8], pos: &mut usize, value: bool) -> Result<()> {
    write_byte(buf, pos, u8::from(value))
}

/// Read a boolean. Any non-zero byte is `true`.
pub fn read_bool(buf: &[u8], pos: &mut usize) -> Result<bool> {
    Ok(read_byte(buf, pos)? != 0)
}

/// Write a 4-byte little-endian signed integer.
pub fn write_int(buf: &mut [u8], pos: &mut usize, value: i32) -> Result<()> {
    put(buf, pos, &value.to_le_bytes())
}

/// Read a 4-byte little-endian signed integer.
pub fn read_int(buf: &[u8], pos: &mut usize) -> Result<i32> {
    Ok(i32::from_le_bytes(take_array::<INT_SIZE>(buf, pos)?))
}

/// Write a length-prefixed byte field.
///
/// Nothing is written unless the whole field fits.
pub fn write_bytes(buf: &mut [u8], pos: &mut usize, value: &[u8]) -> Result<()> {
    let len = length_prefix(value.len())?;
    ensure_capacity(buf, *pos, INT_SIZE + value.len())?;

    write_int(buf, pos, len)?;
    put(buf, pos, value)
}

/// Read a length-prefixed byte field.
///
/// The length prefix is validated against `max_len` before allocating.
///
/// # Errors
///
/// - `ProtocolError::NegativeLength` if the prefix is negative
/// - `ProtocolError::LengthTooLarge` if the prefix exceeds `max_len`
/// - `ProtocolError::Truncated` if fewer bytes remain than the prefix claims
pub fn read_bytes(buf: &[u8], pos: &mut usize, max_len: usize) -> Result<Vec<u8>> {
    let start = *pos;
    let len = read_length(buf, pos, max_len)?;

    match take(buf, pos, len) {
        Ok(bytes) => Ok(bytes.to_vec()),
        Err(e) => {
            *pos = start;
            Err(e)
        },
    }
}

/// Write a string as a count of UTF-16 code units followed by the units.
pub fn write_string(buf: &mut [u8], pos: &mut usize, value: &str) -> Result<()> {
    let units: Vec<u16> = value.encode_utf16().collect();
    let count = length_prefix(units.len())?;
    ensure_capacity(buf, *pos, INT_SIZE + units.len() * CHAR_SIZE)?;

    write_int(buf, pos, count)?;
    for unit in units {
        put(buf, pos, &unit.to_le_bytes())?;
    }
    Ok(())
}

/// Read a string written by [`write_string`].
///
/// `max_units` caps the number of UTF-16 code units.
pub fn read_string(buf: &[u8], pos: &mut usize, max_units: usize) -> Result<String> {
    let start = *pos;
    let count = read_length(buf, pos, max_units)?;

    let raw = match take(buf, pos, count.saturating_mul(CHAR_SIZE)) {
        Ok(raw) => raw,
        Err(e) => {
            *pos = start;
            return Err(e);
        },
    };

    let units: Vec<u16> =
        raw.chunks_exact(CHAR_SIZE).map(|pair| u16::from_le_bytes([pair[0], pair[1]])).collect();

    String::from_utf16(&units).map_err(|_| {
        *pos = start;
        ProtocolError::InvalidString
    })
}

/// Read and validate a length prefix, restoring the cursor on failure.
fn read_length(buf: &[u8], pos: &mut usize, max_len: usize) -> Result<usize> {
    let start = *pos;
    let raw = read_int(buf, pos)?;

    let len = match usize::try_from(raw) {
        Ok(len) => len,
        Err(_) => {
            *pos = start;
            return Err(ProtocolError::NegativeLength(raw));
        },
    };

    if len > max_len {
        *pos = start;
        return Err(ProtocolError::LengthTooLarge { len, max: max_len });
    }

    Ok(len)
}

/// Convert a field length into the wire's `i32` prefix.
fn length_prefix(len: usize) -> Result<i32> {
    i32::try_from(len).map_err(|_| ProtocolError::LengthTooLarge { len, max: i32::MAX as usize })
}

fn ensure_capacity(buf: &[u8], pos: usize, needed: usize) -> Result<()> {
    let fits = pos.checked_add(needed).is_some_and(|end| end <= buf.len());
    if fits {
        Ok(())
    } else {
        Err(ProtocolError::BufferOverflow { offset: pos, needed, capacity: buf.len() })
    }
}

fn put(buf: &mut [u8], pos: &mut usize, bytes: &[u8]) -> Result<()> {
    ensure_capacity(buf, *pos, bytes.len())?;

    let end = *pos + bytes.len();
    buf[*pos..end].copy_from_slice(bytes);
    *pos = end;
    Ok(())
}

fn take<'a>(buf: &'a [u8], pos: &mut usize, len: usize) -> Result<&'a [u8]> {
    let available = buf.len().saturating_sub(*pos);
    let Some(bytes) = pos.checked_add(len).and_then(|end| buf.get(*pos..end)) else {
        return Err(ProtocolError::Truncated { offset: *pos, needed: len, available });
    };

    *pos += len;
    Ok(bytes)
}

fn take_array<const N: usize>(buf: &[u8], pos: &mut usize) -> Result<[u8; N]> {
    let bytes = take(buf, pos, N)?;
    let mut out = [0u8; N];
    out.copy_from_slice(bytes);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn int_is_little_endian() {
        let mut buf = [0u8; 4];
        let mut pos = 0;
        write_int(&mut buf, &mut pos, 0x0102_0304).unwrap();

        assert_eq!(buf, [0x04, 0x03, 0x02, 0x01]);
        assert_eq!(pos, 4);
    }

    #[test]
    fn bytes_field_layout() {
        let mut buf = [0u8; 16];
        let mut pos = 0;
        write_bytes(&mut buf, &mut pos, &[0xAA, 0xBB, 0xCC]).unwrap();

        assert_eq!(pos, 7);
        assert_eq!(&buf[..7], &[3, 0, 0, 0, 0xAA, 0xBB, 0xCC]);

        let mut read_pos = 0;
        let value = read_bytes(&buf, &mut read_pos, 64).unwrap();
        assert_eq!(value, vec![0xAA, 0xBB, 0xCC]);
        assert_eq!(read_pos, 7);
    }

    #[test]
    fn read_past_end_is_truncated() {
        let buf = [0x01, 0x02];
        let mut pos = 0;

        let result = read_int(&buf, &mut pos);
        assert_eq!(result, Err(ProtocolError::Truncated { offset: 0, needed: 4, available: 2 }));
        assert_eq!(pos, 0, "cursor must not move on failure");

        let mut pos = 2;
        assert!(matches!(read_byte(&buf, &mut pos), Err(ProtocolError::Truncated { .. })));
    }

    #[test]
    fn oversized_length_prefix_rejected_before_allocation() {
        let mut buf = [0u8; 8];
        let mut pos = 0;
        write_int(&mut buf, &mut pos, i32::MAX).unwrap();

        let mut read_pos = 0;
        let result = read_bytes(&buf, &mut read_pos, 1024);
        assert_eq!(result, Err(ProtocolError::LengthTooLarge { len: i32::MAX as usize, max: 1024 }));
        assert_eq!(read_pos, 0);
    }

    #[test]
    fn negative_length_prefix_rejected() {
        let mut buf = [0u8; 4];
        let mut pos = 0;
        write_int(&mut buf, &mut pos, -1).unwrap();

        let mut read_pos = 0;
        assert_eq!(read_bytes(&buf, &mut read_pos, 1024), Err(ProtocolError::NegativeLength(-1)));
    }

    #[test]
    fn length_larger_than_remaining_input_is_truncated() {
        let mut buf = [0u8; 6];
        let mut pos = 0;
        write_int(&mut buf, &mut pos, 10).unwrap();

        let mut read_pos = 0;
        let result = read_bytes(&buf, &mut read_pos, 1024);
        assert!(matches!(result, Err(ProtocolError::Truncated { needed: 10, available: 2, .. })));
        assert_eq!(read_pos, 0);
    }

    #[test]
    fn write_overflow_leaves_buffer_untouched() {
        let mut buf = [0u8; 6];
        let mut pos = 1;

        let result = write_bytes(&mut buf, &mut pos, &[1, 2, 3]);
        assert_eq!(result, Err(ProtocolError::BufferOverflow { offset: 1, needed: 7, capacity: 6 }));
        assert_eq!(pos, 1);
        assert_eq!(buf, [0u8; 6]);
    }

    #[test]
    fn bool_encoding() {
        let mut buf = [0u8; 2];
        let mut pos = 0;
        write_bool(&mut buf, &mut pos, true).unwrap();
        write_bool(&mut buf, &mut pos, false).unwrap();
        assert_eq!(buf, [1, 0]);

        let mut pos = 0;
        assert!(read_bool(&buf, &mut pos).unwrap());
        assert!(!read_bool(&buf, &mut pos).unwrap());

        let mut pos = 0;
        assert!(read_bool(&[0x7F], &mut pos).unwrap());
    }

    #[test]
    fn string_uses_utf16_code_units() {
        let mut buf = [0u8; 32];
        let mut pos = 0;
        write_string(&mut buf, &mut pos, "hé").unwrap();

        assert_eq!(&buf[..pos], &[2, 0, 0, 0, b'h', 0, 0xE9, 0]);

        let mut read_pos = 0;
        assert_eq!(read_string(&buf, &mut read_pos, 16).unwrap(), "hé");
        assert_eq!(read_pos, pos);
    }

    #[test]
    fn lone_surrogate_is_invalid_string() {
        let mut buf = [0u8; 8];
        let mut pos = 0;
        write_int(&mut buf, &mut pos, 1).unwrap();
        buf[4..6].copy_from_slice(&0xD800u16.to_le_bytes());

        let mut read_pos = 0;
        assert_eq!(read_string(&buf, &mut read_pos, 16), Err(ProtocolError::InvalidString));
        assert_eq!(read_pos, 0);
    }

    proptest! {
        #[test]
        fn mixed_fields_read_back_in_order(
            byte in any::<u8>(),
            int in any::<i32>(),
            flag in any::<bool>(),
            blob in prop::collection::vec(any::<u8>(), 0..256),
            text in "\\PC{0,32}",
        ) {
            let mut buf = vec![0u8; 1024];
            let mut pos = 0;
            write_byte(&mut buf, &mut pos, byte).unwrap();
            write_int(&mut buf, &mut pos, int).unwrap();
            write_bool(&mut buf, &mut pos, flag).unwrap();
            write_bytes(&mut buf, &mut pos, &blob).unwrap();
            write_string(&mut buf, &mut pos, &text).unwrap();
            let written = pos;

            let mut pos = 0;
            prop_assert_eq!(read_byte(&buf, &mut pos).unwrap(), byte);
            prop_assert_eq!(read_int(&buf, &mut pos).unwrap(), int);
            prop_assert_eq!(read_bool(&buf, &mut pos).unwrap(), flag);
            prop_assert_eq!(read_bytes(&buf, &mut pos, 1024).unwrap(), blob);
            prop_assert_eq!(read_string(&buf, &mut pos, 1024).unwrap(), text);
            prop_assert_eq!(pos, written);
        }

        #[test]
        fn reads_never_panic_on_arbitrary_input(
            input in prop::collection::vec(any::<u8>(), 0..64),
            start in 0usize..80,
        ) {
            let mut pos = start;
            let _ = read_bytes(&input, &mut pos, 32);
            let mut pos = start;
            let _ = read_string(&input, &mut pos, 32);
            let mut pos = start;
            let _ = read_int(&input, &mut pos);
        }
    }
}
