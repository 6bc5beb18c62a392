//! # chdu-core
//!
//! Wire-level protocol primitives for CHDU Lite fiscal storage devices.
//!
//! This crate provides:
//! - Request frame encoding and response block decoding
//! - Command codes and control bytes
//! - Typed requests with their response decoding
//! - Device error codes and their classification
//! - Connection state tracking

pub mod command;
pub mod constants;
pub mod error;
pub mod frame;
pub mod lock;
pub mod padding;
pub mod request;
pub mod state;

pub use command::CommandId;
pub use error::{Error, ErrorCode, ErrorOrigin, Result};
pub use frame::{RequestFrame, ResponseMessage};
pub use request::{Request, StoredBlock};
pub use state::{ConnectionState, LinkState};
