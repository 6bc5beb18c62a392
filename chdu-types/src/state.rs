//! Three-valued flags

use std::fmt;

/// A flag that may be unsupported or undetermined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriState {
    True,
    False,
    /// Not reported by this firmware, or not classifiable
    Unknown,
}

impl TriState {
    /// `true` only for [`TriState::True`]
    pub fn is_true(self) -> bool {
        matches!(self, Self::True)
    }

    /// `true` only for [`TriState::False`]
    pub fn is_false(self) -> bool {
        matches!(self, Self::False)
    }

    pub fn to_option(self) -> Option<bool> {
        match self {
            Self::True => Some(true),
            Self::False => Some(false),
            Self::Unknown => None,
        }
    }
}

impl From<bool> for TriState {
    fn from(value: bool) -> Self {
        if value { Self::True } else { Self::False }
    }
}

impl fmt::Display for TriState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::True => f.write_str("yes"),
            Self::False => f.write_str("no"),
            Self::Unknown => f.write_str("unknown"),
        }
    }
}

/// Outcome of the device-side checksum of a response block
///
/// The device terminates every block with ACK/EOT when its checksum
/// passed and with BEL when it did not. Blocks rebuilt from raw stored
/// bytes never went through the device and are `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Validity {
    Valid,
    Invalid,
    Unknown,
}

impl Validity {
    pub fn is_valid(self) -> bool {
        matches!(self, Self::Valid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tristate_from_bool() {
        assert_eq!(TriState::from(true), TriState::True);
        assert_eq!(TriState::from(false), TriState::False);
    }

    #[test]
    fn test_tristate_to_option() {
        assert_eq!(TriState::True.to_option(), Some(true));
        assert_eq!(TriState::False.to_option(), Some(false));
        assert_eq!(TriState::Unknown.to_option(), None);
        assert!(!TriState::Unknown.is_true());
        assert!(!TriState::Unknown.is_false());
    }
}
