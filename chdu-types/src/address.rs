//! Block addresses

use std::fmt;

/// Address of a block in device storage
///
/// Arithmetic is checked: an operation that would leave the 32-bit address
/// space returns `None` instead of wrapping.
///
/// # Examples
///
/// ```
/// use chdu_types::BlockAddress;
///
/// let base = BlockAddress::new(100);
/// assert_eq!(base.checked_add(27), Some(BlockAddress::new(127)));
/// assert_eq!(BlockAddress::new(u32::MAX).checked_add(1), None);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct BlockAddress(u32);

impl BlockAddress {
    pub const ZERO: Self = Self(0);

    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    pub const fn get(self) -> u32 {
        self.0
    }

    /// Address `count` blocks after this one
    pub fn checked_add(self, count: u32) -> Option<Self> {
        self.0.checked_add(count).map(Self)
    }

    /// Address `count` blocks before this one
    pub fn checked_sub(self, count: u32) -> Option<Self> {
        self.0.checked_sub(count).map(Self)
    }

    /// Number of blocks from `earlier` to this address
    pub fn distance_from(self, earlier: Self) -> Option<u32> {
        self.0.checked_sub(earlier.0)
    }

    pub fn to_le_bytes(self) -> [u8; 4] {
        self.0.to_le_bytes()
    }
}

impl From<u32> for BlockAddress {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl From<BlockAddress> for u32 {
    fn from(address: BlockAddress) -> u32 {
        address.0
    }
}

impl fmt::Display for BlockAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
