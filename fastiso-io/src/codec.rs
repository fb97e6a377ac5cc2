//! Fixed-width little-endian conversions between numbers and bytes

use fastiso_common::{Error, Result};

fn exact<const N: usize>(bytes: &[u8]) -> Result<[u8; N]> {
    bytes.try_into().map_err(|_| Error::SizeMismatch {
        expected: N,
        actual: bytes.len(),
    })
}

pub fn f64_to_bytes(value: f64) -> [u8; 8] {
    value.to_le_bytes()
}

pub fn bytes_to_f64(bytes: &[u8]) -> Result<f64> {
    Ok(f64::from_le_bytes(exact::<8>(bytes)?))
}

pub fn i64_to_bytes(value: i64) -> [u8; 8] {
    value.to_le_bytes()
}

pub fn bytes_to_i64(bytes: &[u8]) -> Result<i64> {
    Ok(i64::from_le_bytes(exact::<8>(bytes)?))
}

pub fn i32_to_bytes(value: i32) -> [u8; 4] {
    value.to_le_bytes()
}

pub fn bytes_to_i32(bytes: &[u8]) -> Result<i32> {
    Ok(i32::from_le_bytes(exact::<4>(bytes)?))
}

/// Test bit `position` (0 = least significant) of `byte`.
pub fn is_bit_set(byte: u8, position: u8) -> Result<bool> {
    if position > 7 {
        return Err(Error::InvalidArgument(format!(
            "bit position {position} out of range 0..=7"
        )));
    }
    Ok(byte & (1 << position) != 0)
}
