//! This crate provides a way to talk to the OLS USB bootloader from the host and exposes all of its
//! commands: querying the bootloader version, reading, writing and erasing flash, and resetting
//! into the application.
//!
//! # Example: Basic flashing
//! ```rust, no_run
//! use ols_boot::{Context, Operation, OLS_PID, OLS_VID};
//! use std::fs::File;
//! use std::io::Read;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Open binary file and read contents
//! let mut file = File::open("firmware.bin")?;
//! let mut buff = Vec::new();
//! file.read_to_end(&mut buff)?;
//!
//! // Find the bootloader
//! let context = Context::new()?;
//! let mut session = context.open(OLS_VID, OLS_PID)?.session;
//!
//! println!("Bootloader version {}", session.firmware_version()?);
//! let start_address = session.layout().base;
//!
//! // Erase the application flash
//! session.erase_flash()?;
//!
//! // Program the buffer into flash, watching the progress
//! let mut write = session.write_at(buff.as_slice(), start_address);
//! let total = write.total();
//! for done in &mut write {
//!     println!("{}/{} bytes", done?, total);
//! }
//!
//! // Verify flash contents and start the application
//! session.verify(start_address, buff.as_slice())?;
//! session.reset();
//! # Ok(())
//! # }
//! ```
//!
//! Writes never touch the bootloader itself: chunks below the flash window are skipped, and a
//! chunk reaching the top of the window ends the write. See [`WriteReport`] for the outcome.
//!
//! [`WriteReport`]: struct.WriteReport.html

extern crate log;
extern crate rusb;
extern crate thiserror;

mod context;
mod error;
mod flash;
mod frame;
mod operation;
mod session;
mod transport;
mod version;

#[cfg(test)]
mod sim;

pub use context::{Context, Opened, UsbContext, OLS_PID, OLS_VID};
pub use error::{Error, OperationKind, Result};
pub use flash::{EraseRegion, FlashLayout, FLASH_ADDR, FLASH_SIZE, PAGE_SIZE, READ_CHUNK_SIZE};
pub use frame::{Command, Opcode, Payload, Response, FRAME_SIZE, MAX_READ_DATA, MAX_WRITE_DATA};
pub use operation::{Operation, Read, Write, WriteReport};
pub use session::Session;
pub use transport::{Transport, UsbTransport};
pub use version::FirmwareVersion;

/// Timeout for all usb transactions.
const TIMEOUT: std::time::Duration = std::time::Duration::from_millis(1000);
