//! # chdu
//!
//! Client for CHDU Lite fiscal data storage devices.
//!
//! The device stores fixed-size data blocks and can print them on an
//! attached receipt printer. It talks a framed, half-duplex protocol over a
//! serial link; any async byte stream carrying that link works as a
//! transport.
//!
//! ## Quick Start
//!
//! ```no_run
//! use chdu::{BlockContent, CancellationToken, Chdu, StreamTransport};
//! use tokio::net::TcpStream;
//!
//! #[tokio::main]
//! async fn main() -> chdu::Result<()> {
//!     // Serial-over-TCP bridge in front of the device
//!     let transport = StreamTransport::new("bridge", || TcpStream::connect("10.0.0.20:4001"));
//!     let device = Chdu::new(transport);
//!     let cancel = CancellationToken::new();
//!
//!     let status = device.status(&cancel).await?;
//!     println!("{}", status);
//!
//!     let content = BlockContent::new(b"receipt #1".to_vec())?;
//!     let written = device.write_block(&content, &cancel).await?;
//!
//!     let block = device.read_block(written.address, &cancel).await?;
//!     assert_eq!(block.content(), b"receipt #1");
//!     Ok(())
//! }
//! ```

pub mod device;
pub mod engine;
pub mod error;
pub mod initializer;

#[cfg(test)]
mod testing;

// Re-exports
pub use device::Chdu;
pub use error::{Error, Result};

pub use chdu_core::{ConnectionState, ErrorCode, StoredBlock};
pub use chdu_transport::{StateChange, StreamTransport, Transport};
pub use chdu_types::{
    Block, BlockAddress, BlockContent, BlockData, BlockWriteResult, DeviceStatus, DrawerPin,
    FirmwareVersion, OffsetBlockContent, StatusFlags, TriState, Validity, VolumeInfo, WriteMode,
};
pub use tokio_util::sync::CancellationToken;
