//! Transport layer for CHDU devices
//!
//! The protocol engine talks to the device through [`Transport`]: raw byte
//! I/O with timeouts plus connect/disconnect notifications.
//! [`StreamTransport`] implements it for any async byte stream.

pub mod error;
pub mod stream;

pub use error::{Error, Result};
pub use stream::StreamTransport;

use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use tokio::sync::broadcast;

/// Link state notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateChange {
    Connected,
    Disconnected,
}

/// Byte transport to a single device
#[async_trait]
pub trait Transport: Send + Sync {
    /// Write all bytes
    async fn write(&mut self, data: &[u8]) -> Result<()>;
    
    /// Read available bytes into `buf` (with timeout)
    ///
    /// Returns the number of bytes read, at least one.
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize>;
    
    /// Drop any input already buffered
    async fn discard_buffers(&mut self) -> Result<()>;
    
    /// Close the link; the next I/O call reopens it
    fn disconnect(&mut self, reason: &str);
    
    /// Subscribe to connect/disconnect notifications
    fn subscribe(&self) -> broadcast::Receiver<StateChange>;
    
    /// Port identity used in diagnostics
    fn name(&self) -> String;
    
    /// Configured read timeout
    fn timeout(&self) -> Duration;
    
    /// Check if connected
    fn is_connected(&self) -> bool;
    
    /// Fill `buf` completely
    async fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.read(&mut buf[filled..]).await?;
            if n == 0 {
                return Err(Error::ConnectionClosed);
            }
            filled += n;
        }
        Ok(())
    }
    
    async fn read_one(&mut self) -> Result<u8> {
        let mut byte = [0u8; 1];
        self.read_exact(&mut byte).await?;
        Ok(byte[0])
    }
    
    async fn write_one(&mut self, byte: u8) -> Result<()> {
        self.write(&[byte]).await
    }
    
    /// Write `data`, then read exactly `response_len` bytes
    async fn write_and_read(&mut self, data: &[u8], response_len: usize) -> Result<BytesMut> {
        self.write(data).await?;
        
        let mut buf = BytesMut::zeroed(response_len);
        self.read_exact(&mut buf).await?;
        Ok(buf)
    }
}
