//! ISO/IEC 7816-4 padding: 0x80 marker followed by zero bytes
//!
//! Padding hides exact plaintext length within a block. At least one byte is
//! always appended so unpadding is unambiguous.

use coffer_core::{CofferError, CofferResult};

/// Default padding block size in bytes.
pub const DEFAULT_BLOCK_SIZE: usize = 16;

const MARKER: u8 = 0x80;

/// Pad `data` up to the next multiple of `block_size`.
pub fn pad(data: &[u8], block_size: usize) -> CofferResult<Vec<u8>> {
    if block_size == 0 {
        return Err(CofferError::config("padding block size must be positive"));
    }
    let pad_len = block_size - (data.len() % block_size);
    let mut out = Vec::with_capacity(data.len() + pad_len);
    out.extend_from_slice(data);
    out.push(MARKER);
    out.resize(data.len() + pad_len, 0);
    Ok(out)
}

/// Strip padding added by [`pad`], scanning at most one block from the end.
pub fn unpad(data: &[u8], block_size: usize) -> CofferResult<Vec<u8>> {
    if block_size == 0 {
        return Err(CofferError::config("padding block size must be positive"));
    }
    for i in 1..=block_size.min(data.len()) {
        match data[data.len() - i] {
            0x00 => continue,
            MARKER => return Ok(data[..data.len() - i].to_vec()),
            _ => break,
        }
    }
    Err(CofferError::Padding("padding marker not found".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pad_lengths() {
        assert_eq!(pad(b"", 16).unwrap().len(), 16);
        assert_eq!(pad(&[1u8; 15], 16).unwrap().len(), 16);
        assert_eq!(pad(&[1u8; 16], 16).unwrap().len(), 32);
        assert_eq!(pad(&[1u8; 17], 16).unwrap().len(), 32);
    }

    #[test]
    fn test_pad_layout() {
        let padded = pad(b"hi", 4).unwrap();
        assert_eq!(padded, vec![b'h', b'i', 0x80, 0x00]);
    }

    #[test]
    fn test_unpad_restores_input() {
        for len in 0..40 {
            let data: Vec<u8> = (0..len as u8).collect();
            let padded = pad(&data, 16).unwrap();
            assert_eq!(unpad(&padded, 16).unwrap(), data);
        }
    }

    #[test]
    fn test_trailing_marker_in_data_survives() {
        let data = vec![1, 2, 0x80, 0x00];
        let padded = pad(&data, 8).unwrap();
        assert_eq!(unpad(&padded, 8).unwrap(), data);
    }

    #[test]
    fn test_unpad_missing_marker() {
        let err = unpad(&[1, 2, 3, 0, 0], 16).unwrap_err();
        assert!(matches!(err, CofferError::Padding(_)));
    }

    #[test]
    fn test_unpad_all_zero_block() {
        assert!(matches!(unpad(&[0u8; 16], 16), Err(CofferError::Padding(_))));
        assert!(matches!(unpad(&[], 16), Err(CofferError::Padding(_))));
    }

    #[test]
    fn test_unpad_marker_beyond_block() {
        let mut data = vec![0x80];
        data.extend_from_slice(&[0u8; 16]);
        assert!(unpad(&data, 16).is_err());
    }

    #[test]
    fn test_zero_block_size_rejected() {
        assert!(pad(b"x", 0).is_err());
        assert!(unpad(b"x", 0).is_err());
    }
}
