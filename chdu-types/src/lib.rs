//! Type definitions for chdu

pub mod address;
pub mod block;
pub mod error;
pub mod state;
pub mod status;
pub mod volume;

pub use address::BlockAddress;
pub use block::{Block, BlockContent, BlockData, BlockWriteResult, DrawerPin, OffsetBlockContent, WriteMode};
pub use error::{Error, Result};
pub use state::{TriState, Validity};
pub use status::{DeviceStatus, FirmwareVersion, StatusFlags};
pub use volume::VolumeInfo;
