//! Error types for chdu-core

use std::fmt;

use chdu_types::TriState;

/// Result type alias for chdu-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core protocol errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Frame is too short to be valid
    #[error("Frame too short: expected at least {expected} bytes, got {actual} bytes")]
    FrameTooShort {
        expected: usize,
        actual: usize,
    },

    /// Declared length does not fit the available bytes
    #[error("Declared length {declared} exceeds available {available} bytes")]
    LengthMismatch {
        declared: usize,
        available: usize,
    },

    /// Frame is not delimited by STX/EOT
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// Unknown command code
    #[error("Unknown command code: 0x{0:02X}")]
    UnknownCommand(u8),

    /// Invalid connection state transition
    #[error("Invalid connection state: {0}")]
    InvalidState(String),

    /// Arguments too large for a single frame
    #[error("Payload too large: {size} bytes (max: {max} bytes)")]
    PayloadTooLarge {
        size: usize,
        max: usize,
    },

    /// Response had a different number of blocks than the command expects
    #[error("Unexpected response block count: expected {expected}, got {actual}")]
    UnexpectedBlockCount {
        expected: u32,
        actual: usize,
    },

    /// Response payload did not match the command's layout
    #[error("Unexpected response payload for {command}: {reason}")]
    UnexpectedPayload {
        command: crate::command::CommandId,
        reason: String,
    },

    /// Business payload could not be decoded
    #[error("Payload error: {0}")]
    Types(#[from] chdu_types::Error),
}

/// Who caused a device-reported failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorOrigin {
    /// The request content was wrong; the link is healthy
    Client,
    /// The device or the link is unhealthy
    Device,
    Indeterminate,
}

/// Failure reason reported by the device after a NAK
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ErrorCode {
    Unknown = 0,
    /// Operation timeout
    Timeout = 1,
    InvalidFrame = 2,
    InvalidCommand = 3,
    /// Invalid command parameter (e.g. out of range)
    InvalidParameter = 4,
    InvalidCrc = 5,
    /// Read attempted past the end of memory
    InvalidReadAddress = 6,
    MemoryLocked = 7,
    /// SD card communication failed
    HardwareFailure = 8,
    PrinterNotReady = 9,
    /// Device is processing another request
    Busy = 10,
}

impl ErrorCode {
    pub fn origin(self) -> ErrorOrigin {
        match self {
            Self::Unknown => ErrorOrigin::Indeterminate,
            Self::InvalidCommand | Self::InvalidParameter | Self::InvalidReadAddress => {
                ErrorOrigin::Client
            }
            _ => ErrorOrigin::Device,
        }
    }

    /// Whether the failure was caused by the request, not by the device
    ///
    /// [`TriState::Unknown`] for [`ErrorCode::Unknown`].
    pub fn is_client_error(self) -> TriState {
        match self.origin() {
            ErrorOrigin::Client => TriState::True,
            ErrorOrigin::Device => TriState::False,
            ErrorOrigin::Indeterminate => TriState::Unknown,
        }
    }
}

impl From<u8> for ErrorCode {
    fn from(value: u8) -> Self {
        match value {
            1 => Self::Timeout,
            2 => Self::InvalidFrame,
            3 => Self::InvalidCommand,
            4 => Self::InvalidParameter,
            5 => Self::InvalidCrc,
            6 => Self::InvalidReadAddress,
            7 => Self::MemoryLocked,
            8 => Self::HardwareFailure,
            9 => Self::PrinterNotReady,
            10 => Self::Busy,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self, *self as u8)
    }
}
