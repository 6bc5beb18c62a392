//! Zero-pad workaround for 64-byte aligned write frames
//!
//! Device firmware mishandles a write request whose encoded frame length is
//! a multiple of 64 bytes. Such a request gets one extra `0x00` argument
//! byte, which the device then stores as part of the block. Reading the
//! block back strips the byte again.
//!
//! Unpadded data that ends in `0x00` and is exactly one byte longer than an
//! aligned length looks the same as padded data; it is stripped on read too.

use crate::frame::RequestFrame;

/// Frame length the firmware cannot handle a multiple of
pub const ALIGNMENT: usize = 64;

/// Whether a request with `arguments_len` argument bytes encodes to an
/// aligned frame
pub fn is_aligned(arguments_len: usize) -> bool {
    (arguments_len + RequestFrame::OVERHEAD) % ALIGNMENT == 0
}

/// Append the pad byte if `arguments` would produce an aligned frame
pub fn pad(mut arguments: Vec<u8>) -> Vec<u8> {
    if is_aligned(arguments.len()) {
        arguments.push(0x00);
    }
    arguments
}

/// Remove the pad byte from stored write arguments
pub fn unpad(stored: &[u8]) -> &[u8] {
    match stored.split_last() {
        Some((&0x00, rest)) if is_aligned(rest.len()) => rest,
        _ => stored,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_aligned_lengths() {
        assert!(is_aligned(59));
        assert!(is_aligned(123));
        assert!(!is_aligned(60));
        assert!(!is_aligned(0));
    }

    #[test]
    fn test_pad_aligned_arguments() {
        let padded = pad(vec![0xAA; 59]);
        assert_eq!(padded.len(), 60);
        assert_eq!(padded[59], 0x00);
        assert!(!is_aligned(padded.len()));
    }

    #[test]
    fn test_pad_leaves_other_lengths() {
        assert_eq!(pad(vec![0xAA; 58]).len(), 58);
        assert_eq!(pad(vec![0xAA; 60]).len(), 60);
    }

    #[test]
    fn test_unpad() {
        let padded = pad(vec![0xAA; 123]);
        assert_eq!(unpad(&padded), &[0xAA; 123][..]);

        // trailing zero at a non-padded length is data
        let data = [0x01, 0x00];
        assert_eq!(unpad(&data), &data[..]);
    }

    proptest! {
        #[test]
        fn prop_unpad_inverts_pad(data in proptest::collection::vec(any::<u8>(), 1..=505)) {
            let ambiguous = data.last() == Some(&0x00) && is_aligned(data.len() - 1);
            prop_assume!(!ambiguous);

            let padded = pad(data.clone());
            prop_assert!(!is_aligned(padded.len()));
            prop_assert_eq!(unpad(&padded), data.as_slice());
        }
    }
}
