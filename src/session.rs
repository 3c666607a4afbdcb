use log::{debug, info, trace};

use crate::error::{Error, OperationKind, Result};
use crate::flash::{check_area, round_even, FlashLayout};
use crate::frame::{Command, Payload, Response, FRAME_SIZE, MAX_WRITE_DATA};
use crate::operation::{Operation, Read, Write, WriteReport};
use crate::transport::Transport;
use crate::version::FirmwareVersion;
use crate::TIMEOUT;

/// Value of the byte padding an odd-length write to a whole word.
const PAD: u8 = 0xff;

/// A connection to a bootloader, carrying out one command at a time.
pub struct Session<D: Transport> {
    transport: D,

    /// Geometry of the target's flash.
    layout: FlashLayout,

    /// Echo id of the next command. Wraps around.
    echo: u8,
}

impl<D: Transport> Session<D> {
    /// Wraps a transport which is already set up to talk to the bootloader.
    pub fn new(transport: D, layout: FlashLayout) -> Result<Self> {
        layout.validate()?;
        Ok(Self {
            transport,
            layout,
            echo: 0,
        })
    }

    pub fn layout(&self) -> &FlashLayout {
        &self.layout
    }

    pub fn transport(&self) -> &D {
        &self.transport
    }

    fn next_echo(&mut self) -> u8 {
        let echo = self.echo;
        self.echo = self.echo.wrapping_add(1);
        echo
    }

    /// Sends a command and waits for the response answering it.
    ///
    /// A response carrying a different echo id than the command is rejected, whatever its payload.
    pub fn exchange(&mut self, command: &Command<'_>) -> Result<Response> {
        let frame = command.encode()?;
        trace!("-> {:02x?}", &frame[..]);

        let written = self.transport.send_command(&frame, TIMEOUT)?;
        if written != FRAME_SIZE {
            // ShortTransfer is reserved for responses
            debug!("Sent {} of {} command bytes", written, FRAME_SIZE);
            return Err(Error::OtherTransportError(rusb::Error::Io));
        }

        let mut buffer = [0u8; FRAME_SIZE];
        let read = self.transport.receive_response(&mut buffer, TIMEOUT)?;
        trace!("<- {:02x?}", &buffer[..read]);
        let response = Response::decode(&buffer[..read])?;

        if response.echo() != command.echo {
            return Err(Error::EchoMismatch {
                sent: command.echo,
                received: response.echo(),
            });
        }
        Ok(response)
    }

    /// Queries the bootloader's firmware version.
    pub fn firmware_version(&mut self) -> Result<FirmwareVersion> {
        let command = Command::new(self.next_echo(), Payload::GetFirmwareVersion);
        let version = self.exchange(&command)?.firmware_version();
        info!("Bootloader version {}", version);
        Ok(version)
    }

    /// Reads a single chunk of memory, starting at the given address. The chunk must not be
    /// larger than the layout's read chunk size.
    pub(crate) fn read_chunk(&mut self, address: u16, buffer: &mut [u8]) -> Result<()> {
        let command = Command::new(
            self.next_echo(),
            Payload::ReadFlash {
                address,
                size: round_even(buffer.len()) as u8,
            },
        );
        debug!("Reading {} bytes at 0x{:04x}", buffer.len(), address);

        let response = self
            .exchange(&command)
            .map_err(|error| error.during(OperationKind::Read, address))?;
        buffer.copy_from_slice(&response.read_data()[..buffer.len()]);
        Ok(())
    }

    /// Programs a single chunk into flash. An odd-length chunk is padded by one byte whose value
    /// must not be relied upon.
    pub(crate) fn write_chunk(&mut self, address: u16, data: &[u8]) -> Result<()> {
        let length = round_even(data.len());
        if length > MAX_WRITE_DATA {
            return Err(Error::InvalidRequest(format!(
                "write chunk of {} bytes exceeds a frame",
                length
            )));
        }
        let mut padded = [PAD; MAX_WRITE_DATA];
        padded[..data.len()].copy_from_slice(data);

        let command = Command::new(
            self.next_echo(),
            Payload::WriteFlash {
                address,
                flush: true,
                data: &padded[..length],
            },
        );
        debug!("Writing {} bytes at 0x{:04x}", length, address);

        self.exchange(&command)
            .map(|_| ())
            .map_err(|error| error.during(OperationKind::Write, address))
    }

    /// Prepares a chunked read into `buffer`, starting at `address`.
    pub fn read_at<'d>(&mut self, buffer: &'d mut [u8], address: u16) -> Result<Read<'d, '_, D>> {
        check_area(address, buffer.len())?;
        Ok(Read::at(self, buffer, address))
    }

    /// Reads `buffer.len()` bytes starting at `address`. On failure, the chunks read so far are
    /// left in the buffer.
    pub fn read_flash(&mut self, address: u16, buffer: &mut [u8]) -> Result<()> {
        self.read_at(buffer, address)?.execute()
    }

    /// Prepares a chunked write of `data` to `address`.
    ///
    /// Chunks starting below the flash window are skipped. A chunk reaching the top of the window
    /// ends the write, which also covers areas running past the 16-bit address space.
    pub fn write_at<'d>(&mut self, data: &'d [u8], address: u16) -> Write<'d, '_, D> {
        Write::at(self, data, address)
    }

    /// Writes `data` to flash at `address` and reports which chunks were actually sent.
    pub fn write_flash(&mut self, address: u16, data: &[u8]) -> Result<WriteReport> {
        let mut write = self.write_at(data, address);
        write.execute()?;
        Ok(write.report())
    }

    /// Erases the layout's erase region.
    pub fn erase_flash(&mut self) -> Result<()> {
        let region = self.layout.erase;
        let command = Command::new(
            self.next_echo(),
            Payload::EraseFlash {
                address: region.address,
                units: region.units,
            },
        );
        debug!(
            "Erasing 0x{:02x} units at 0x{:04x}",
            region.units, region.address
        );

        self.exchange(&command)
            .map(|_| ())
            .map_err(|error| error.during(OperationKind::Erase, region.address))
    }

    /// Reads back the memory at `address` and compares it against `data`.
    pub fn verify(&mut self, address: u16, data: &[u8]) -> Result<()> {
        let mut readback = vec![0u8; data.len()];
        self.read_flash(address, &mut readback)?;

        match data.iter().zip(&readback).position(|(a, b)| a != b) {
            None => Ok(()),
            Some(offset) => Err(Error::VerificationFailed {
                address: address + offset as u16,
                expected: data[offset],
                found: readback[offset],
            }),
        }
    }

    /// Tells the bootloader to restart into the application.
    ///
    /// No response is awaited since the device leaves the bus, and a failed send is not an error.
    /// The kernel driver is not reattached to the vanished device on teardown.
    pub fn reset(&mut self) {
        let command = Command::new(self.next_echo(), Payload::Reset);
        let transport = &mut self.transport;
        let sent = command.encode().and_then(|frame| {
            transport
                .send_command(&frame, TIMEOUT)
                .map_err(Error::from)
        });
        if let Err(error) = sent {
            debug!("Reset command not delivered: {}", error);
        }

        self.transport.forget_kernel_driver();
        info!("Bootloader reset");
    }

    /// Ends the session, releasing the device.
    pub fn close(self) {
        info!("Closing bootloader session");
    }
}
