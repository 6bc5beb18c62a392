//! Irreversible storage lock
//!
//! Locking is a two-step exchange. The client sends a random magic number
//! with `LOCK_REQUEST`; the device answers with an auth code. The client
//! then confirms with `LOCK_ACTIVATE`, carrying `magic XOR auth_code`.

use bytes::Bytes;

/// Create the activation key from the magic number and the device auth code
///
/// # Examples
///
/// ```
/// use chdu_core::lock;
///
/// let key = lock::activation_key(0x1234_5678, 0x0000_FFFF);
/// assert_eq!(&key[..], &0x1234_A987u32.to_le_bytes());
/// ```
pub fn activation_key(magic: u32, auth_code: u32) -> Bytes {
    Bytes::copy_from_slice(&(magic ^ auth_code).to_le_bytes())
}
