//! Transport errors

use std::io;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Not connected")]
    NotConnected,
    
    #[error("Connection timeout")]
    ConnectionTimeout,
    
    #[error("Read timeout")]
    ReadTimeout,
    
    #[error("Write timeout")]
    WriteTimeout,
    
    #[error("Connection closed by remote")]
    ConnectionClosed,
    
    #[error("Port not found: {0}")]
    PortNotFound(String),
    
    #[error("Port busy: {0}")]
    PortBusy(String),
    
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::ConnectionTimeout | Self::ReadTimeout | Self::WriteTimeout
        )
    }
}
