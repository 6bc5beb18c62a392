//! CHDU protocol command codes

use std::fmt;

use chdu_types::{DrawerPin, WriteMode};

use crate::error::{Error, Result};

/// Protocol command codes (opcodes)
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CommandId {
    // Device information
    ReadStatus = 0x5A,
    VolumeSerial = 0x5B,
    FirmwareVersion = 0x5C,
    
    // Storage
    ReadData = 0xB1,
    WriteData = 0xB2,
    WriteDataAndPrint = 0xB3,
    WriteDataAndPrintWithOffset = 0xB4,
    
    // Cash drawer
    OpenDrawer = 0x12,
    OpenDrawer2 = 0x13,
    
    // Irreversible storage lock
    LockRequest = 0xC1,
    LockActivate = 0xC2,
}

impl CommandId {
    /// Check if this command stores a block
    pub fn is_write(self) -> bool {
        matches!(
            self,
            Self::WriteData | Self::WriteDataAndPrint | Self::WriteDataAndPrintWithOffset
        )
    }
    
    /// Write mode of a stored block written with this command
    pub fn write_mode(self) -> Option<WriteMode> {
        match self {
            Self::WriteData => Some(WriteMode::Save),
            Self::WriteDataAndPrint | Self::WriteDataAndPrintWithOffset => {
                Some(WriteMode::SaveAndPrint)
            }
            _ => None,
        }
    }
    
    /// Command used to write a full block in `mode`
    pub fn for_write_mode(mode: WriteMode) -> Self {
        match mode {
            WriteMode::Save => Self::WriteData,
            WriteMode::SaveAndPrint => Self::WriteDataAndPrint,
        }
    }
    
    pub fn for_drawer_pin(pin: DrawerPin) -> Self {
        match pin {
            DrawerPin::A => Self::OpenDrawer,
            DrawerPin::B => Self::OpenDrawer2,
        }
    }
    
    /// Get command name
    pub fn name(self) -> &'static str {
        match self {
            Self::ReadStatus => "READ_STATUS",
            Self::VolumeSerial => "VOLUME_SERIAL",
            Self::FirmwareVersion => "VERSION2",
            Self::ReadData => "READ_DATA",
            Self::WriteData => "WRITE_DATA",
            Self::WriteDataAndPrint => "WRITE_DATA_PRINT",
            Self::WriteDataAndPrintWithOffset => "WRITE_DATA_PRINT_OFFSET",
            Self::OpenDrawer => "OPEN_DRAWER",
            Self::OpenDrawer2 => "OPEN_DRAWER2",
            Self::LockRequest => "LOCK_REQUEST",
            Self::LockActivate => "LOCK_ACTIVATE",
        }
    }
}

impl From<CommandId> for u8 {
    fn from(cmd: CommandId) -> u8 {
        cmd as u8
    }
}

impl TryFrom<u8> for CommandId {
    type Error = Error;
    
    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x5A => Ok(Self::ReadStatus),
            0x5B => Ok(Self::VolumeSerial),
            0x5C => Ok(Self::FirmwareVersion),
            0xB1 => Ok(Self::ReadData),
            0xB2 => Ok(Self::WriteData),
            0xB3 => Ok(Self::WriteDataAndPrint),
            0xB4 => Ok(Self::WriteDataAndPrintWithOffset),
            0x12 => Ok(Self::OpenDrawer),
            0x13 => Ok(Self::OpenDrawer2),
            0xC1 => Ok(Self::LockRequest),
            0xC2 => Ok(Self::LockActivate),
            _ => Err(Error::UnknownCommand(value)),
        }
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(0x{:02X})", self.name(), *self as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    
    #[test]
    fn test_command_conversion() {
        assert_eq!(u8::from(CommandId::ReadStatus), 0x5A);
        assert_eq!(CommandId::try_from(0xB1).unwrap(), CommandId::ReadData);
        assert_eq!(u8::from(CommandId::FirmwareVersion), 0x5C);
    }
    
    #[test]
    fn test_write_modes() {
        assert_eq!(CommandId::WriteData.write_mode(), Some(WriteMode::Save));
        assert_eq!(
            CommandId::WriteDataAndPrintWithOffset.write_mode(),
            Some(WriteMode::SaveAndPrint)
        );
        assert_eq!(CommandId::ReadStatus.write_mode(), None);
        assert_eq!(CommandId::for_write_mode(WriteMode::SaveAndPrint), CommandId::WriteDataAndPrint);
    }
    
    #[test]
    fn test_drawer_pins() {
        assert_eq!(u8::from(CommandId::for_drawer_pin(DrawerPin::A)), 0x12);
        assert_eq!(u8::from(CommandId::for_drawer_pin(DrawerPin::B)), 0x13);
    }
    
    #[test]
    fn test_unknown_command() {
        let result = CommandId::try_from(0xFF);
        assert!(matches!(result, Err(Error::UnknownCommand(0xFF))));
    }
}
