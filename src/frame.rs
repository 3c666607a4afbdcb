//! Binary layout of the command and response frames exchanged with the bootloader.
//!
//! Every frame is exactly [`FRAME_SIZE`] bytes long, whatever the opcode: the interrupt endpoint
//! delivering responses is configured for a single transfer size. The first two bytes are a header
//! holding the opcode and the echo id, the rest is an opcode-specific payload padded with zeroes.

use crate::error::{Error, Result};
use crate::version::FirmwareVersion;

/// Size of every command and response frame in bytes.
pub const FRAME_SIZE: usize = 64;

const OPCODE: usize = 0;
const ECHO: usize = 1;
const ADDR_LO: usize = 2;
const ADDR_HI: usize = 3;
const READ_SIZE: usize = 5;
const WRITE_FLUSH: usize = 5;
const WRITE_SIZE: usize = 6;
const WRITE_DATA: usize = 7;
const ERASE_UNITS: usize = 5;
const VERSION: usize = 2;
const READ_DATA: usize = 6;

/// Maximum number of data bytes in a `WriteFlash` command.
pub const MAX_WRITE_DATA: usize = FRAME_SIZE - WRITE_DATA;

/// Maximum number of data bytes in a `ReadFlash` response.
pub const MAX_READ_DATA: usize = FRAME_SIZE - READ_DATA;

/// Value of the flush marker when set.
const FLUSH: u8 = 0xff;

/// Commands understood by the OLS bootloader.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Opcode {
    GetFirmwareVersion = 0x00,
    ReadFlash = 0x01,
    WriteFlash = 0x02,
    EraseFlash = 0x03,
    Reset = 0xff,
}

/// Opcode-specific part of a command.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Payload<'a> {
    GetFirmwareVersion,
    ReadFlash { address: u16, size: u8 },
    WriteFlash { address: u16, flush: bool, data: &'a [u8] },
    EraseFlash { address: u16, units: u8 },
    Reset,
}

/// A command frame before serialization.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Command<'a> {
    /// Sequence number mirrored by the response.
    pub echo: u8,
    pub payload: Payload<'a>,
}

impl<'a> Command<'a> {
    pub fn new(echo: u8, payload: Payload<'a>) -> Self {
        Self { echo, payload }
    }

    pub fn opcode(&self) -> Opcode {
        match self.payload {
            Payload::GetFirmwareVersion => Opcode::GetFirmwareVersion,
            Payload::ReadFlash { .. } => Opcode::ReadFlash,
            Payload::WriteFlash { .. } => Opcode::WriteFlash,
            Payload::EraseFlash { .. } => Opcode::EraseFlash,
            Payload::Reset => Opcode::Reset,
        }
    }

    /// Serializes the command into a zero-padded frame.
    pub fn encode(&self) -> Result<[u8; FRAME_SIZE]> {
        let mut frame = [0u8; FRAME_SIZE];
        frame[OPCODE] = self.opcode() as u8;
        frame[ECHO] = self.echo;

        match self.payload {
            Payload::GetFirmwareVersion | Payload::Reset => {}
            Payload::ReadFlash { address, size } => {
                if usize::from(size) > MAX_READ_DATA {
                    return Err(Error::InvalidRequest(format!(
                        "read of {} bytes exceeds a frame",
                        size
                    )));
                }
                put_address(&mut frame, address);
                frame[READ_SIZE] = size;
            }
            Payload::WriteFlash {
                address,
                flush,
                data,
            } => {
                if data.len() > MAX_WRITE_DATA {
                    return Err(Error::InvalidRequest(format!(
                        "write of {} bytes exceeds a frame",
                        data.len()
                    )));
                }
                put_address(&mut frame, address);
                if flush {
                    frame[WRITE_FLUSH] = FLUSH;
                }
                // The size field always matches the data carried
                frame[WRITE_SIZE] = data.len() as u8;
                frame[WRITE_DATA..WRITE_DATA + data.len()].copy_from_slice(data);
            }
            Payload::EraseFlash { address, units } => {
                put_address(&mut frame, address);
                frame[ERASE_UNITS] = units;
            }
        }

        Ok(frame)
    }
}

fn put_address(frame: &mut [u8; FRAME_SIZE], address: u16) {
    let [hi, lo] = address.to_be_bytes();
    frame[ADDR_HI] = hi;
    frame[ADDR_LO] = lo;
}

/// A complete response frame.
///
/// The layout of the payload depends on the command answered, so it is read through the accessor
/// matching that command.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Response {
    frame: [u8; FRAME_SIZE],
}

impl Response {
    /// Takes a received frame, which must be complete.
    pub fn decode(frame: &[u8]) -> Result<Self> {
        if frame.len() != FRAME_SIZE {
            return Err(Error::ShortTransfer {
                expected: FRAME_SIZE,
                actual: frame.len(),
            });
        }

        let mut response = Self {
            frame: [0u8; FRAME_SIZE],
        };
        response.frame.copy_from_slice(frame);
        Ok(response)
    }

    /// Echo id of the command this response answers.
    pub fn echo(&self) -> u8 {
        self.frame[ECHO]
    }

    /// Version triple of a `GetFirmwareVersion` response.
    pub fn firmware_version(&self) -> FirmwareVersion {
        FirmwareVersion::from_bytes([
            self.frame[VERSION],
            self.frame[VERSION + 1],
            self.frame[VERSION + 2],
        ])
    }

    /// Data area of a `ReadFlash` response. Only as many bytes as requested are meaningful.
    pub fn read_data(&self) -> &[u8] {
        &self.frame[READ_DATA..]
    }
}
