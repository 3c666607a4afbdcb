use crate::error::{Error, Result};
use crate::frame::{MAX_READ_DATA, MAX_WRITE_DATA};

/// First address of the application flash. Everything below belongs to the bootloader.
pub const FLASH_ADDR: u16 = 0x0800;

/// Size of the application flash window in bytes.
pub const FLASH_SIZE: u16 = 0x3400;

/// Maximum number of bytes requested by a single read command.
pub const READ_CHUNK_SIZE: usize = 48;

/// Maximum number of bytes carried by a single write command.
pub const PAGE_SIZE: usize = 32;

/// Size of the 16-bit address space the protocol can reach.
const ADDRESS_SPACE: u32 = 0x1_0000;

/// The region cleared by the `EraseFlash` command, as sent on the wire.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct EraseRegion {
    /// Start address of the erase.
    pub address: u16,

    /// Size of the erase in the bootloader's erase units.
    pub units: u8,
}

impl Default for EraseRegion {
    fn default() -> Self {
        Self {
            address: 0x0800,
            units: 0x0d,
        }
    }
}

/// Geometry of the target's flash as far as the bootloader protocol is concerned.
///
/// The window `[base, base + size)` is the only area write commands are sent to. The default
/// matches the OLS bootloader.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct FlashLayout {
    /// Start of the writable window and threshold of the protected bootloader region.
    pub base: u16,

    /// Size of the writable window in bytes.
    pub size: u16,

    /// Maximum bytes per read command.
    pub read_chunk: usize,

    /// Maximum bytes per write command. Must be even.
    pub page_size: usize,

    /// Region cleared by [`Session::erase_flash`](crate::Session::erase_flash).
    pub erase: EraseRegion,
}

impl Default for FlashLayout {
    fn default() -> Self {
        Self {
            base: FLASH_ADDR,
            size: FLASH_SIZE,
            read_chunk: READ_CHUNK_SIZE,
            page_size: PAGE_SIZE,
            erase: EraseRegion::default(),
        }
    }
}

impl FlashLayout {
    /// One past the last writable address.
    pub fn top(&self) -> u32 {
        u32::from(self.base) + u32::from(self.size)
    }

    /// Checks that every chunk this layout produces fits into a frame.
    pub fn validate(&self) -> Result<()> {
        if self.read_chunk == 0 || round_even(self.read_chunk) > MAX_READ_DATA {
            return Err(Error::InvalidRequest(format!(
                "read chunk size {} does not fit a response frame",
                self.read_chunk
            )));
        }
        if self.page_size == 0 || self.page_size > MAX_WRITE_DATA {
            return Err(Error::InvalidRequest(format!(
                "page size {} does not fit a command frame",
                self.page_size
            )));
        }
        // An odd page would shift every following chunk by its pad byte
        if self.page_size % 2 != 0 {
            return Err(Error::InvalidRequest(format!(
                "page size {} is odd",
                self.page_size
            )));
        }
        if self.top() > ADDRESS_SPACE {
            return Err(Error::InvalidRequest(format!(
                "flash window 0x{:04x}+0x{:04x} exceeds 16-bit addressing",
                self.base, self.size
            )));
        }
        Ok(())
    }
}

/// Rounds a transfer length up to the next even number, as the bootloader works on 16-bit words.
pub(crate) fn round_even(length: usize) -> usize {
    length + length % 2
}

/// Rejects an area which leaves the 16-bit address space.
pub(crate) fn check_area(address: u16, length: usize) -> Result<()> {
    if u32::from(address) as usize + length > ADDRESS_SPACE as usize {
        Err(Error::InvalidRequest(format!(
            "0x{:x} bytes at 0x{:04x} exceed the address space",
            length, address
        )))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_layout_is_valid() {
        let layout = FlashLayout::default();
        assert!(layout.validate().is_ok());
        assert_eq!(layout.top(), 0x3c00);
    }

    #[test]
    fn odd_page_size_is_rejected() {
        let layout = FlashLayout {
            page_size: 31,
            ..FlashLayout::default()
        };
        assert!(matches!(layout.validate(), Err(Error::InvalidRequest(_))));
    }

    #[test]
    fn oversized_chunks_are_rejected() {
        let read = FlashLayout {
            read_chunk: MAX_READ_DATA + 1,
            ..FlashLayout::default()
        };
        assert!(read.validate().is_err());

        let write = FlashLayout {
            page_size: MAX_WRITE_DATA + 1,
            ..FlashLayout::default()
        };
        assert!(write.validate().is_err());

        let empty = FlashLayout {
            read_chunk: 0,
            ..FlashLayout::default()
        };
        assert!(empty.validate().is_err());
    }

    #[test]
    fn window_must_fit_address_space() {
        let layout = FlashLayout {
            base: 0xf000,
            size: 0x2000,
            ..FlashLayout::default()
        };
        assert!(layout.validate().is_err());
    }

    #[test]
    fn rounding_only_touches_odd_lengths() {
        assert_eq!(round_even(0), 0);
        assert_eq!(round_even(1), 2);
        assert_eq!(round_even(4), 4);
        assert_eq!(round_even(47), 48);
    }

    #[test]
    fn areas_past_the_address_space_are_rejected() {
        assert!(check_area(0xfff0, 0x10).is_ok());
        assert!(check_area(0xfff0, 0x11).is_err());
    }
}
