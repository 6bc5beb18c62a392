//! Logical data volume information

use std::fmt;

use byteorder::{ByteOrder, LittleEndian};
use chrono::{DateTime, Utc};

use crate::error::{Error, Result};

/// Information about the logical data volume
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeInfo {
    /// Volume serial number
    ///
    /// Unless configured otherwise, filled with the manufacturing
    /// timestamp (Unix epoch seconds).
    pub serial_number: u32,
}

impl VolumeInfo {
    pub const MIN_PAYLOAD_LEN: usize = 4;

    pub fn parse(payload: &[u8]) -> Result<Self> {
        if payload.len() < Self::MIN_PAYLOAD_LEN {
            return Err(Error::Parse(format!(
                "volume info needs at least {} bytes, got {}",
                Self::MIN_PAYLOAD_LEN,
                payload.len()
            )));
        }

        Ok(Self {
            serial_number: LittleEndian::read_u32(&payload[..4]),
        })
    }

    /// Manufacturing date derived from the serial number
    pub fn manufacturing_date_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(i64::from(self.serial_number), 0)
    }
}

impl fmt::Display for VolumeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Volume[SN: {}]", self.serial_number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone};

    #[test]
    fn test_volume_parse() {
        let info = VolumeInfo::parse(&1_600_000_000u32.to_le_bytes()).unwrap();
        assert_eq!(info.serial_number, 1_600_000_000);

        let date = info.manufacturing_date_utc().unwrap();
        assert_eq!(date, Utc.timestamp_opt(1_600_000_000, 0).unwrap());
        assert_eq!(date.year(), 2020);
    }

    #[test]
    fn test_volume_parse_extra_bytes() {
        let info = VolumeInfo::parse(&[1, 0, 0, 0, 0xFF, 0xFF]).unwrap();
        assert_eq!(info.serial_number, 1);
    }

    #[test]
    fn test_volume_too_short() {
        assert!(VolumeInfo::parse(&[1, 2, 3]).is_err());
    }
}
