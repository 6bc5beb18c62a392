//! High-level error types

use std::time::Duration;

use chdu_core::ErrorCode;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Core protocol error: {0}")]
    Core(#[from] chdu_core::Error),
    
    #[error("Type error: {0}")]
    Types(#[from] chdu_types::Error),
    
    /// Transport failure, with port identity and configured timeout
    #[error("Transport error on {port} (timeout {timeout:?}): {source}")]
    Transport {
        port: String,
        timeout: Duration,
        #[source]
        source: chdu_transport::Error,
    },
    
    /// Device answered NAK
    #[error("Command failed: {0}")]
    CommandFailed(ErrorCode),
    
    /// Structurally invalid response
    #[error("Unexpected response from device: {0}")]
    UnexpectedResponse(String),
    
    /// Device ended a multi-block transfer early
    #[error("Incomplete data: received {received} of {expected} blocks")]
    IncompleteData {
        received: u32,
        expected: u32,
    },
    
    #[error("Connection initialization failed: {0}")]
    Initialization(#[source] Box<Error>),
    
    #[error("Operation cancelled")]
    Cancelled,
    
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl Error {
    /// Device error code, if the device rejected the command
    pub fn error_code(&self) -> Option<ErrorCode> {
        match self {
            Self::CommandFailed(code) => Some(*code),
            _ => None,
        }
    }
    
    /// Whether the link must be torn down and re-initialized
    ///
    /// Client errors leave the link usable; device errors and framing
    /// violations do not.
    pub fn requires_reconnect(&self) -> bool {
        match self {
            Self::CommandFailed(code) => !code.is_client_error().is_true(),
            Self::UnexpectedResponse(_) | Self::IncompleteData { .. } => true,
            _ => false,
        }
    }
}
