//! CHDU wire frames: request encoding and response block decoding

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fmt;

use chdu_types::Validity;

use crate::{
    command::CommandId,
    constants::control,
    error::{Error, Result},
};

/// Request frame sent to the device
///
/// # Frame Structure
///
/// ```text
/// ┌─────────┬─────────────┬─────────┬─────────────┬─────────┐
/// │   STX   │   Length    │ Command │  Arguments  │   EOT   │
/// │  0x02   │ 2 bytes LE  │  1 byte │   N bytes   │  0x04   │
/// └─────────┴─────────────┴─────────┴─────────────┴─────────┘
/// ```
///
/// Length counts the command byte plus the arguments.
///
/// # Examples
///
/// ```
/// use chdu_core::{CommandId, RequestFrame};
///
/// let frame = RequestFrame::new(CommandId::ReadStatus);
/// let encoded = frame.encode();
/// assert_eq!(&encoded[..], &[0x02, 0x01, 0x00, 0x5A, 0x04]);
///
/// let decoded = RequestFrame::decode(&encoded).unwrap();
/// assert_eq!(frame, decoded);
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct RequestFrame {
    /// Command code
    pub command: CommandId,
    
    /// Command arguments
    pub arguments: Bytes,
}

impl RequestFrame {
    /// Bytes around the arguments: STX, length, command, EOT
    pub const OVERHEAD: usize = 5;
    
    /// Maximum arguments size
    pub const MAX_ARGUMENTS_SIZE: usize = u16::MAX as usize - 1;
    
    /// Create a frame without arguments
    pub fn new(command: CommandId) -> Self {
        Self {
            command,
            arguments: Bytes::new(),
        }
    }
    
    /// Create a frame with arguments
    ///
    /// # Errors
    ///
    /// Returns [`Error::PayloadTooLarge`] if the length field cannot hold
    /// the arguments.
    pub fn with_arguments(command: CommandId, arguments: impl Into<Bytes>) -> Result<Self> {
        let arguments = arguments.into();
        
        if arguments.len() > Self::MAX_ARGUMENTS_SIZE {
            return Err(Error::PayloadTooLarge {
                size: arguments.len(),
                max: Self::MAX_ARGUMENTS_SIZE,
            });
        }
        
        Ok(Self { command, arguments })
    }
    
    /// Value of the length field: command byte plus arguments
    pub fn length_field(&self) -> u16 {
        // bounded by MAX_ARGUMENTS_SIZE on construction
        (self.arguments.len() + 1) as u16
    }
    
    /// Total encoded size
    pub fn size(&self) -> usize {
        Self::OVERHEAD + self.arguments.len()
    }
    
    /// Encode frame to bytes
    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(self.size());
        
        buf.put_u8(control::STX);
        buf.put_u16_le(self.length_field());
        buf.put_u8(self.command.into());
        buf.put_slice(&self.arguments);
        buf.put_u8(control::EOT);
        
        buf
    }
    
    /// Decode frame from bytes
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Buffer is shorter than an empty frame
    /// - Frame is not delimited by STX/EOT
    /// - Length field does not match the buffer
    /// - Command code is unknown
    pub fn decode(frame: &[u8]) -> Result<Self> {
        if frame.len() < Self::OVERHEAD {
            return Err(Error::FrameTooShort {
                expected: Self::OVERHEAD,
                actual: frame.len(),
            });
        }
        
        let mut buf = frame;
        
        let start = buf.get_u8();
        if start != control::STX {
            return Err(Error::MalformedFrame(format!("start byte 0x{:02X}", start)));
        }
        
        let declared = usize::from(buf.get_u16_le());
        if declared + 4 != frame.len() {
            return Err(Error::LengthMismatch {
                declared,
                available: frame.len() - 4,
            });
        }
        
        let command = CommandId::try_from(buf.get_u8())?;
        
        let (arguments, end) = buf.split_at(buf.len() - 1);
        if end[0] != control::EOT {
            return Err(Error::MalformedFrame(format!("end byte 0x{:02X}", end[0])));
        }
        
        Ok(Self {
            command,
            arguments: Bytes::copy_from_slice(arguments),
        })
    }
}

impl fmt::Debug for RequestFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestFrame")
            .field("command", &self.command)
            .field("length", &self.length_field())
            .field("arguments", &hex::encode(&self.arguments))
            .finish()
    }
}

impl fmt::Display for RequestFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Frame[{}](len={})", self.command, self.arguments.len())
    }
}

/// One response block as received from the device
///
/// Holds the raw block (2-byte LE length header followed by the payload)
/// and the device checksum outcome signalled by the block terminator.
#[derive(Clone, PartialEq, Eq)]
pub struct ResponseMessage {
    raw: Bytes,
    payload_len: usize,
    validity: Validity,
}

impl ResponseMessage {
    /// Length header size
    pub const HEADER_LEN: usize = 2;
    
    /// Largest payload a block can carry: block opcode, print offset and content
    pub const MAX_PAYLOAD_LEN: usize = 1 + 2 + chdu_types::BlockContent::MAX_LEN;
    
    /// Parse the payload length from the start of a raw block
    ///
    /// Returns `None` until at least [`Self::HEADER_LEN`] bytes are available.
    pub fn parse_payload_len(raw: &[u8]) -> Option<usize> {
        match raw {
            [lo, hi, ..] => Some(usize::from(u16::from_le_bytes([*lo, *hi]))),
            _ => None,
        }
    }
    
    /// # Errors
    ///
    /// Returns an error if the length header is missing or the indicated
    /// payload is longer than `raw`.
    pub fn new(raw: impl Into<Bytes>, validity: Validity) -> Result<Self> {
        let mut raw = raw.into();
        
        let payload_len = Self::parse_payload_len(&raw).ok_or(Error::FrameTooShort {
            expected: Self::HEADER_LEN,
            actual: raw.len(),
        })?;
        
        let available = raw.len() - Self::HEADER_LEN;
        if payload_len > available {
            return Err(Error::LengthMismatch {
                declared: payload_len,
                available,
            });
        }
        
        raw.truncate(Self::HEADER_LEN + payload_len);
        
        Ok(Self {
            raw,
            payload_len,
            validity,
        })
    }
    
    pub fn payload_len(&self) -> usize {
        self.payload_len
    }
    
    pub fn validity(&self) -> Validity {
        self.validity
    }
    
    pub fn payload(&self) -> &[u8] {
        &self.raw[Self::HEADER_LEN..]
    }
    
    /// Payload bytes `offset..offset + len`
    pub fn payload_range(&self, offset: usize, len: usize) -> Result<&[u8]> {
        let end = offset.checked_add(len).unwrap_or(usize::MAX);
        
        self.payload().get(offset..end).ok_or(Error::LengthMismatch {
            declared: end,
            available: self.payload_len,
        })
    }
    
    pub fn payload_at(&self, index: usize) -> Option<u8> {
        self.payload().get(index).copied()
    }
    
    /// Raw block including the length header
    pub fn raw(&self) -> &Bytes {
        &self.raw
    }
}

impl fmt::Debug for ResponseMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseMessage")
            .field("payload_len", &self.payload_len)
            .field("validity", &self.validity)
            .finish()
    }
}
