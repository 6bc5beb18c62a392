//! Device status structures

use std::fmt;

use bitflags::bitflags;
use byteorder::{ByteOrder, LittleEndian};

use crate::{
    block::BlockContent,
    error::{Error, Result},
    state::TriState,
};

bitflags! {
    /// Status flag word reported by the device
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct StatusFlags: u16 {
        /// Storage started correctly and is ready for use
        const STORAGE_OK = 0x0001;
        const PRINTER_READY = 0x0002;
        /// Storage is locked, writes are rejected
        const DEVICE_LOCK = 0x0004;
        const RESERVED = 0x0008;
        /// RS232 printer port configuration is invalid, output is inactive
        const PRINTER_INVALID = 0x0010;
        // printer flags below are reported from firmware 1.2; bit values unconfirmed
        const PRINTER_COVER_OPEN = 0x0020;
        const PRINTER_FEED_BUTTON = 0x0040;
        const PRINTER_PAPER_LOW = 0x0080;
        const PRINTER_PAPER_END = 0x0100;
        const PRINTER_ERROR = 0x0200;
    }
}

impl StatusFlags {
    /// Flags only reported by firmware 1.2 and newer
    pub const EXTENDED: Self = Self::PRINTER_COVER_OPEN
        .union(Self::PRINTER_FEED_BUTTON)
        .union(Self::PRINTER_PAPER_LOW)
        .union(Self::PRINTER_PAPER_END)
        .union(Self::PRINTER_ERROR);

    pub const EXTENDED_SINCE: FirmwareVersion = FirmwareVersion::new(1, 2);

    /// Whether `self` is reported by firmware `version`
    pub fn is_supported_in(self, version: FirmwareVersion) -> bool {
        !self.intersects(Self::EXTENDED) || version >= Self::EXTENDED_SINCE
    }
}

/// Firmware version as reported in the status block
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FirmwareVersion {
    pub major: u8,
    pub minor: u8,
}

impl FirmwareVersion {
    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}.{}", self.major, self.minor)
    }
}

/// Device status
///
/// # Payload Layout
///
/// ```text
/// ┌───────┬───────┬───────┬────────┬────────┬────────┬────────┬────────┐
/// │ minor │ major │ flags │ serial │ total  │  free  │ block  │  baud  │
/// │  1 B  │  1 B  │  2 B  │  4 B   │  4 B   │  4 B   │  4 B   │  4 B   │
/// └───────┴───────┴───────┴────────┴────────┴────────┴────────┴────────┘
/// ```
///
/// All multi-byte values are little-endian.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceStatus {
    pub version: FirmwareVersion,
    pub flags: StatusFlags,
    serial_number: u32,
    total_blocks: u32,
    free_blocks: u32,
    block_data_size: u32,
    printer_baud_rate: u32,
}

impl DeviceStatus {
    pub const PAYLOAD_LEN: usize = 24;

    pub fn parse(payload: &[u8]) -> Result<Self> {
        if payload.len() != Self::PAYLOAD_LEN {
            return Err(Error::Parse(format!(
                "status payload must be {} bytes, got {}",
                Self::PAYLOAD_LEN,
                payload.len()
            )));
        }

        Ok(Self {
            version: FirmwareVersion::new(payload[1], payload[0]),
            flags: StatusFlags::from_bits_retain(LittleEndian::read_u16(&payload[2..4])),
            serial_number: LittleEndian::read_u32(&payload[4..8]),
            total_blocks: LittleEndian::read_u32(&payload[8..12]),
            free_blocks: LittleEndian::read_u32(&payload[12..16]),
            block_data_size: LittleEndian::read_u32(&payload[16..20]),
            printer_baud_rate: LittleEndian::read_u32(&payload[20..24]),
        })
    }

    pub fn is_storage_ready(&self) -> bool {
        self.flags.contains(StatusFlags::STORAGE_OK)
    }

    pub fn is_device_locked(&self) -> bool {
        self.flags.contains(StatusFlags::DEVICE_LOCK)
    }

    /// Storage is locked or not ready, writes are not possible
    pub fn is_read_only(&self) -> bool {
        !self.is_storage_ready() || self.is_device_locked()
    }

    pub fn is_printer_ready(&self) -> bool {
        self.flags.contains(StatusFlags::PRINTER_READY)
    }

    pub fn is_printer_initialization_invalid(&self) -> bool {
        self.flags.contains(StatusFlags::PRINTER_INVALID)
    }

    pub fn is_printer_cover_open(&self) -> TriState {
        self.gated_flag(StatusFlags::PRINTER_COVER_OPEN)
    }

    pub fn is_printer_feed_button_pressed(&self) -> TriState {
        self.gated_flag(StatusFlags::PRINTER_FEED_BUTTON)
    }

    pub fn is_printer_paper_low(&self) -> TriState {
        self.gated_flag(StatusFlags::PRINTER_PAPER_LOW)
    }

    pub fn is_printer_paper_empty(&self) -> TriState {
        self.gated_flag(StatusFlags::PRINTER_PAPER_END)
    }

    pub fn is_printer_in_error(&self) -> TriState {
        self.gated_flag(StatusFlags::PRINTER_ERROR)
    }

    fn gated_flag(&self, flag: StatusFlags) -> TriState {
        if flag.is_supported_in(self.version) {
            self.flags.contains(flag).into()
        } else {
            TriState::Unknown
        }
    }

    /// Device serial number as printed on the label
    pub fn serial_number(&self) -> String {
        self.serial_number.to_string()
    }

    /// Total capacity in blocks
    ///
    /// # Errors
    ///
    /// Returns [`Error::StorageNotReady`] if the storage flag is not set.
    pub fn total_blocks(&self) -> Result<u32> {
        self.ensure_storage_ready()?;
        Ok(self.total_blocks)
    }

    pub fn total_bytes(&self) -> Result<u64> {
        Ok(u64::from(self.total_blocks()?) * BlockContent::MAX_LEN as u64)
    }

    /// Remaining capacity in blocks (0 when storage is not ready)
    pub fn free_blocks(&self) -> u32 {
        self.free_blocks
    }

    pub fn free_bytes(&self) -> Result<u64> {
        self.ensure_storage_ready()?;
        Ok(u64::from(self.free_blocks) * BlockContent::MAX_LEN as u64)
    }

    pub fn used_blocks(&self) -> Result<u32> {
        Ok(self.total_blocks()?.saturating_sub(self.free_blocks))
    }

    pub fn used_bytes(&self) -> Result<u64> {
        Ok(u64::from(self.used_blocks()?) * BlockContent::MAX_LEN as u64)
    }

    /// Raw block size reported by the device
    ///
    /// This includes framing overhead; the usable part of a block is
    /// [`BlockContent::MAX_LEN`].
    pub fn block_data_size(&self) -> Result<u32> {
        self.ensure_storage_ready()?;
        Ok(self.block_data_size)
    }

    pub fn printer_baud_rate(&self) -> u32 {
        self.printer_baud_rate
    }

    fn ensure_storage_ready(&self) -> Result<()> {
        if !self.is_storage_ready() {
            return Err(Error::StorageNotReady);
        }
        Ok(())
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Status[FW: {}, SN: {}, flags: 0x{:04X}]",
            self.version,
            self.serial_number,
            self.flags.bits()
        )
    }
}
