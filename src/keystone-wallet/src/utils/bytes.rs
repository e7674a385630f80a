//! Minimal big-endian parsing helpers.
//!
//! Used for the packed (non-ABI) layouts: ABI permission configs and session enable batches.

use alloy_primitives::{Address, B256};

use crate::errors::DecodeError;

fn take<'a>(bytes: &'a [u8], i: &mut usize, len: usize) -> Result<&'a [u8], DecodeError> {
    let end = i.checked_add(len).ok_or(DecodeError::Truncated)?;
    if bytes.len() < end {
        return Err(DecodeError::Truncated);
    }
    let out = &bytes[*i..end];
    *i = end;
    Ok(out)
}

fn take_array<const N: usize>(bytes: &[u8], i: &mut usize) -> Result<[u8; N], DecodeError> {
    let mut buf = [0u8; N];
    buf.copy_from_slice(take(bytes, i, N)?);
    Ok(buf)
}

pub fn read_u8(bytes: &[u8], i: &mut usize) -> Result<u8, DecodeError> {
    Ok(take_array::<1>(bytes, i)?[0])
}

pub fn read_u16_be(bytes: &[u8], i: &mut usize) -> Result<u16, DecodeError> {
    take_array(bytes, i).map(u16::from_be_bytes)
}

pub fn read_u64_be(bytes: &[u8], i: &mut usize) -> Result<u64, DecodeError> {
    take_array(bytes, i).map(u64::from_be_bytes)
}

pub fn read_u128_be(bytes: &[u8], i: &mut usize) -> Result<u128, DecodeError> {
    take_array(bytes, i).map(u128::from_be_bytes)
}

pub fn read_selector(bytes: &[u8], i: &mut usize) -> Result<[u8; 4], DecodeError> {
    take_array(bytes, i)
}

pub fn read_address(bytes: &[u8], i: &mut usize) -> Result<Address, DecodeError> {
    take(bytes, i, 20).map(Address::from_slice)
}

pub fn read_b32(bytes: &[u8], i: &mut usize) -> Result<B256, DecodeError> {
    take_array(bytes, i).map(B256::from)
}

/// Fails unless the cursor consumed the whole buffer.
pub fn expect_end(bytes: &[u8], i: usize) -> Result<(), DecodeError> {
    if i == bytes.len() {
        Ok(())
    } else {
        Err(DecodeError::TrailingBytes)
    }
}
