//! Contains the version information the bootloader reports back to the connecting PC.

use std::fmt;

/// Bootloader firmware version as reported by the `GetFirmwareVersion` command.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct FirmwareVersion {
    /// The major version.
    pub major: u8,

    /// The minor version.
    pub minor: u8,

    /// The sub-minor version.
    pub sub_minor: u8,
}

impl FirmwareVersion {
    /// Interprets three bytes as (major, minor, sub-minor).
    pub(crate) fn from_bytes(bytes: [u8; 3]) -> Self {
        Self {
            major: bytes[0],
            minor: bytes[1],
            sub_minor: bytes[2],
        }
    }
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.sub_minor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn displays_as_dotted_triple() {
        let version = FirmwareVersion::from_bytes([1, 2, 3]);
        assert_eq!(version.to_string(), "1.2.3");
    }

    #[test]
    fn orders_by_major_first() {
        assert!(FirmwareVersion::from_bytes([2, 0, 0]) > FirmwareVersion::from_bytes([1, 9, 9]));
    }
}
