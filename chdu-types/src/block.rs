//! Block content and block records

use std::fmt;

use byteorder::{ByteOrder, LittleEndian};

use crate::{
    address::BlockAddress,
    error::{Error, Result},
    state::Validity,
};

/// How a block was (or is to be) written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteMode {
    /// Stored only
    Save,
    /// Stored and printed
    SaveAndPrint,
}

/// Cash drawer connector pin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DrawerPin {
    /// Connector pin 2
    A,
    /// Connector pin 5
    B,
}

/// Data of a single block, stored (and optionally printed) in full
#[derive(Clone, PartialEq, Eq)]
pub struct BlockContent(Vec<u8>);

impl BlockContent {
    pub const MIN_LEN: usize = 1;
    pub const MAX_LEN: usize = 505;

    /// # Errors
    ///
    /// Returns [`Error::Validation`] if the data is empty or longer than
    /// [`BlockContent::MAX_LEN`].
    pub fn new(data: impl Into<Vec<u8>>) -> Result<Self> {
        let data = data.into();
        check_len(data.len(), Self::MIN_LEN, Self::MAX_LEN)?;
        Ok(Self(data))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.0
    }
}

impl fmt::Debug for BlockContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockContent").field("len", &self.0.len()).finish()
    }
}

/// Data of a single block whose first `offset` bytes are stored but not printed
#[derive(Clone, PartialEq, Eq)]
pub struct OffsetBlockContent {
    offset: u16,
    data: Vec<u8>,
}

impl OffsetBlockContent {
    pub const MIN_LEN: usize = 1;
    pub const MAX_LEN: usize = 503;

    /// # Errors
    ///
    /// Returns [`Error::Validation`] if the data length is out of range or
    /// the offset points past the end of the data.
    pub fn new(offset: u16, data: impl Into<Vec<u8>>) -> Result<Self> {
        let data = data.into();
        check_len(data.len(), Self::MIN_LEN, Self::MAX_LEN)?;

        if usize::from(offset) > data.len() {
            return Err(Error::Validation(format!(
                "print offset {} exceeds content length {}",
                offset,
                data.len()
            )));
        }

        Ok(Self { offset, data })
    }

    pub fn offset(&self) -> u16 {
        self.offset
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Stored representation: 2-byte LE offset followed by the data
    pub fn to_stored_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.data.len() + 2);
        buf.extend_from_slice(&self.offset.to_le_bytes());
        buf.extend_from_slice(&self.data);
        buf
    }
}

impl fmt::Debug for OffsetBlockContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OffsetBlockContent")
            .field("offset", &self.offset)
            .field("len", &self.data.len())
            .finish()
    }
}

fn check_len(len: usize, min: usize, max: usize) -> Result<()> {
    if len < min {
        return Err(Error::Validation("block content must not be empty".into()));
    }
    if len > max {
        return Err(Error::Validation(format!(
            "block content length {} exceeds maximum of {} bytes",
            len, max
        )));
    }
    Ok(())
}

/// Content of a block read back from storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockData {
    Full(BlockContent),
    Offset(OffsetBlockContent),
}

impl BlockData {
    /// The stored data without any print offset prefix
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Full(content) => content.as_bytes(),
            Self::Offset(content) => content.as_bytes(),
        }
    }

    pub fn print_offset(&self) -> Option<u16> {
        match self {
            Self::Full(_) => None,
            Self::Offset(content) => Some(content.offset()),
        }
    }
}

/// A block read from device storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    /// Device checksum outcome
    pub validity: Validity,

    pub write_mode: WriteMode,

    pub data: BlockData,

    /// Block as read: length header, write opcode and stored arguments
    pub raw: Vec<u8>,
}

impl Block {
    pub fn content(&self) -> &[u8] {
        self.data.as_bytes()
    }
}

/// Outcome of a block write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockWriteResult {
    /// Address the block was stored at
    pub address: BlockAddress,
}

impl BlockWriteResult {
    pub const PAYLOAD_LEN: usize = 4;

    pub fn parse(payload: &[u8]) -> Result<Self> {
        if payload.len() != Self::PAYLOAD_LEN {
            return Err(Error::Parse(format!(
                "write result must be {} bytes, got {}",
                Self::PAYLOAD_LEN,
                payload.len()
            )));
        }

        Ok(Self {
            address: BlockAddress::new(LittleEndian::read_u32(payload)),
        })
    }
}
