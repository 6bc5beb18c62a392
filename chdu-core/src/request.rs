//! Typed device requests
//!
//! Each request fixes its command code and argument layout, tells the engine
//! how many response blocks to expect and decodes those blocks into a typed
//! result.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use chdu_types::{
    Block, BlockAddress, BlockContent, BlockData, BlockWriteResult, DeviceStatus, DrawerPin,
    OffsetBlockContent, Validity, VolumeInfo, WriteMode,
};

use crate::{
    command::CommandId,
    error::{Error, Result},
    frame::{RequestFrame, ResponseMessage},
    lock, padding,
};

/// A request the engine can send
pub trait Request: Send + Sync {
    /// Decoded result of the request
    type Response: Send;

    fn id(&self) -> CommandId;

    /// Argument bytes following the command code
    fn arguments(&self) -> Bytes {
        Bytes::new()
    }

    fn frame(&self) -> Result<RequestFrame> {
        RequestFrame::with_arguments(self.id(), self.arguments())
    }

    /// Number of response blocks sent after the ACK
    fn response_blocks(&self) -> u32 {
        0
    }

    /// Payload bytes to read ahead before the length header is known
    fn min_response_data_len(&self) -> usize {
        0
    }

    /// Whether every response block is confirmed with ACK (or aborted with NUL)
    fn supports_multi_packet(&self) -> bool {
        false
    }

    fn decode(&self, blocks: Vec<ResponseMessage>) -> Result<Self::Response>;
}

fn expect_blocks(expected: u32, blocks: &[ResponseMessage]) -> Result<()> {
    if blocks.len() as u64 != u64::from(expected) {
        return Err(Error::UnexpectedBlockCount {
            expected,
            actual: blocks.len(),
        });
    }
    Ok(())
}

fn single_block(blocks: Vec<ResponseMessage>) -> Result<ResponseMessage> {
    expect_blocks(1, &blocks)?;

    blocks.into_iter().next().ok_or(Error::UnexpectedBlockCount {
        expected: 1,
        actual: 0,
    })
}

/// Query device status
#[derive(Debug, Clone, Copy, Default)]
pub struct GetStatus;

impl Request for GetStatus {
    type Response = DeviceStatus;

    fn id(&self) -> CommandId {
        CommandId::ReadStatus
    }

    fn response_blocks(&self) -> u32 {
        1
    }

    fn decode(&self, blocks: Vec<ResponseMessage>) -> Result<DeviceStatus> {
        let block = single_block(blocks)?;
        Ok(DeviceStatus::parse(block.payload())?)
    }
}

/// Query logical volume information
#[derive(Debug, Clone, Copy, Default)]
pub struct GetVolumeInfo;

impl Request for GetVolumeInfo {
    type Response = VolumeInfo;

    fn id(&self) -> CommandId {
        CommandId::VolumeSerial
    }

    fn response_blocks(&self) -> u32 {
        1
    }

    fn decode(&self, blocks: Vec<ResponseMessage>) -> Result<VolumeInfo> {
        let block = single_block(blocks)?;
        Ok(VolumeInfo::parse(block.payload())?)
    }
}

/// Query the full firmware version description
#[derive(Debug, Clone, Copy, Default)]
pub struct GetFirmwareVersion;

impl Request for GetFirmwareVersion {
    type Response = String;

    fn id(&self) -> CommandId {
        CommandId::FirmwareVersion
    }

    fn response_blocks(&self) -> u32 {
        1
    }

    fn decode(&self, blocks: Vec<ResponseMessage>) -> Result<String> {
        let block = single_block(blocks)?;

        // text is NUL terminated
        let text = match block.payload().split_last() {
            Some((&0x00, rest)) => rest,
            _ => block.payload(),
        };

        Ok(String::from_utf8_lossy(text).trim().to_string())
    }
}

/// Read `count` consecutive blocks starting at `address`
#[derive(Debug, Clone, Copy)]
pub struct ReadBlocks {
    pub address: BlockAddress,
    pub count: u32,
}

impl ReadBlocks {
    /// Block opcode plus at least one content byte
    pub const MIN_BLOCK_PAYLOAD_LEN: usize = 2;

    pub fn new(address: BlockAddress, count: u32) -> Self {
        Self { address, count }
    }
}

impl Request for ReadBlocks {
    type Response = Vec<Block>;

    fn id(&self) -> CommandId {
        CommandId::ReadData
    }

    fn arguments(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(8);
        buf.put_u32_le(self.address.get());
        buf.put_u32_le(self.count);
        buf.freeze()
    }

    fn response_blocks(&self) -> u32 {
        self.count
    }

    fn min_response_data_len(&self) -> usize {
        Self::MIN_BLOCK_PAYLOAD_LEN
    }

    fn supports_multi_packet(&self) -> bool {
        true
    }

    fn decode(&self, blocks: Vec<ResponseMessage>) -> Result<Vec<Block>> {
        expect_blocks(self.count, &blocks)?;
        blocks.iter().map(decode_block).collect()
    }
}

/// Decode a stored block
///
/// The first payload byte is the command the block was written with; the
/// rest are the write arguments, possibly padded.
pub fn decode_block(message: &ResponseMessage) -> Result<Block> {
    let payload = message.payload();

    let invalid = |reason: String| Error::UnexpectedPayload {
        command: CommandId::ReadData,
        reason,
    };

    let (&opcode, stored) = payload
        .split_first()
        .filter(|_| payload.len() >= ReadBlocks::MIN_BLOCK_PAYLOAD_LEN)
        .ok_or_else(|| invalid(format!("block payload too short: {} bytes", payload.len())))?;

    let command = CommandId::try_from(opcode)
        .map_err(|_| invalid(format!("unknown block type 0x{:02X}", opcode)))?;
    let write_mode = command
        .write_mode()
        .ok_or_else(|| invalid(format!("{} is not a block type", command)))?;

    let mut stored = padding::unpad(stored);

    let data = if command == CommandId::WriteDataAndPrintWithOffset {
        if stored.len() < 2 {
            return Err(invalid("offset block without print offset".into()));
        }
        let offset = stored.get_u16_le();
        BlockData::Offset(OffsetBlockContent::new(offset, stored)?)
    } else {
        BlockData::Full(BlockContent::new(stored)?)
    };

    Ok(Block {
        validity: message.validity(),
        write_mode,
        data,
        raw: message.raw().to_vec(),
    })
}

/// Rebuild a block from bytes kept outside the device
pub trait StoredBlock: Sized {
    /// Parse `raw` as returned by [`Block::raw`]: the length header followed
    /// by the stored payload
    ///
    /// No device checksum covers these bytes, so the block is
    /// [`Validity::Unknown`].
    fn from_raw(raw: &[u8]) -> Result<Self>;
}

impl StoredBlock for Block {
    fn from_raw(raw: &[u8]) -> Result<Self> {
        let message = ResponseMessage::new(Bytes::copy_from_slice(raw), Validity::Unknown)?;
        decode_block(&message)
    }
}

/// Store one block, optionally printing it
#[derive(Debug, Clone)]
pub struct WriteBlock {
    command: CommandId,
    arguments: Bytes,
}

impl WriteBlock {
    pub fn new(content: &BlockContent, mode: WriteMode) -> Self {
        Self::with_stored_bytes(CommandId::for_write_mode(mode), content.as_bytes().to_vec())
    }

    /// Store and print, skipping the first `offset` bytes when printing
    pub fn with_offset(content: &OffsetBlockContent) -> Self {
        Self::with_stored_bytes(CommandId::WriteDataAndPrintWithOffset, content.to_stored_bytes())
    }

    fn with_stored_bytes(command: CommandId, stored: Vec<u8>) -> Self {
        Self {
            command,
            arguments: Bytes::from(padding::pad(stored)),
        }
    }
}

impl Request for WriteBlock {
    type Response = BlockWriteResult;

    fn id(&self) -> CommandId {
        self.command
    }

    fn arguments(&self) -> Bytes {
        self.arguments.clone()
    }

    fn response_blocks(&self) -> u32 {
        1
    }

    fn decode(&self, blocks: Vec<ResponseMessage>) -> Result<BlockWriteResult> {
        let block = single_block(blocks)?;
        Ok(BlockWriteResult::parse(block.payload())?)
    }
}

/// Open the cash drawer connected to `pin`
#[derive(Debug, Clone, Copy)]
pub struct OpenDrawer(pub DrawerPin);

impl Request for OpenDrawer {
    type Response = ();

    fn id(&self) -> CommandId {
        CommandId::for_drawer_pin(self.0)
    }

    fn decode(&self, blocks: Vec<ResponseMessage>) -> Result<()> {
        expect_blocks(0, &blocks)
    }
}

/// First step of the storage lock; the device answers with an auth code
#[derive(Debug, Clone, Copy)]
pub struct RequestLock {
    pub magic: u32,
}

impl Request for RequestLock {
    type Response = u32;

    fn id(&self) -> CommandId {
        CommandId::LockRequest
    }

    fn arguments(&self) -> Bytes {
        Bytes::copy_from_slice(&self.magic.to_le_bytes())
    }

    fn response_blocks(&self) -> u32 {
        1
    }

    fn decode(&self, blocks: Vec<ResponseMessage>) -> Result<u32> {
        let block = single_block(blocks)?;
        let mut auth_code = block.payload_range(0, 4)?;
        Ok(auth_code.get_u32_le())
    }
}

/// Second step of the storage lock
#[derive(Debug, Clone, Copy)]
pub struct ActivateLock {
    pub magic: u32,
    pub auth_code: u32,
}

impl Request for ActivateLock {
    type Response = ();

    fn id(&self) -> CommandId {
        CommandId::LockActivate
    }

    fn arguments(&self) -> Bytes {
        lock::activation_key(self.magic, self.auth_code)
    }

    fn decode(&self, blocks: Vec<ResponseMessage>) -> Result<()> {
        expect_blocks(0, &blocks)
    }
}
