//! Protocol constants

/// Control bytes used for framing and flow control
pub mod control {
    /// Abort a multi-packet transfer
    pub const NUL: u8 = 0x00;

    /// Start of frame
    pub const STX: u8 = 0x02;

    /// End of request frame; also "last block" terminator in responses
    pub const EOT: u8 = 0x04;

    /// Positive acknowledgement
    pub const ACK: u8 = 0x06;

    /// Block terminator signalling a device-side checksum mismatch
    pub const BEL: u8 = 0x07;

    /// Negative acknowledgement, followed by one error code byte
    pub const NAK: u8 = 0x15;
}

/// Number of EOT bytes written to force the device parser to a frame boundary
pub const SOFT_RESET_LEN: usize = 525;

/// Status queries attempted while initializing a connection
pub const HANDSHAKE_ATTEMPTS: usize = 2;

/// Default number of blocks requested per bulk read command
///
/// Older firmware returned at most 127 blocks per request; newer firmware
/// accepts more, so this is only a default for the facade.
pub const DEFAULT_MAX_BLOCKS_PER_REQUEST: u32 = 127;
