//! An in-memory bootloader answering commands the way the device does, with injectable faults.

use std::time::Duration;

use crate::frame::FRAME_SIZE;
use crate::transport::Transport;

/// Bytes cleared per erase unit.
const ERASE_UNIT: usize = 1024;

const MEMORY_SIZE: usize = 0x1_0000;

/// A failure injected into one exchange.
#[derive(Debug, Copy, Clone)]
pub enum Fault {
    /// The control transfer fails.
    SendError(rusb::Error),

    /// The control transfer reports fewer bytes written.
    ShortCommand(usize),

    /// The interrupt transfer fails.
    ReceiveError(rusb::Error),

    /// The interrupt transfer delivers fewer bytes.
    ShortResponse(usize),

    /// The response carries the wrong echo id.
    WrongEcho,
}

pub struct SimDevice {
    flash: Vec<u8>,
    version: [u8; 3],
    commands: Vec<Vec<u8>>,
    receives: usize,
    pending: Option<[u8; FRAME_SIZE]>,
    faults: Vec<(usize, Fault)>,
    reattach: bool,
}

impl SimDevice {
    pub fn new() -> Self {
        Self {
            flash: vec![0xff; MEMORY_SIZE],
            version: [2, 1, 4],
            commands: Vec::new(),
            receives: 0,
            pending: None,
            faults: Vec::new(),
            reattach: false,
        }
    }

    /// Injects a fault into the exchange with the given zero-based index.
    pub fn with_fault(mut self, exchange: usize, fault: Fault) -> Self {
        self.faults.push((exchange, fault));
        self
    }

    /// Pretends a kernel driver was detached when the device was opened.
    pub fn with_kernel_driver(mut self) -> Self {
        self.reattach = true;
        self
    }

    pub fn flash(&self) -> &[u8] {
        &self.flash
    }

    pub fn flash_mut(&mut self) -> &mut [u8] {
        &mut self.flash
    }

    /// Every command frame sent so far, failed ones included.
    pub fn commands(&self) -> &[Vec<u8>] {
        &self.commands
    }

    /// Number of response receptions attempted.
    pub fn receives(&self) -> usize {
        self.receives
    }

    pub fn reattaches_kernel_driver(&self) -> bool {
        self.reattach
    }

    fn fault(&self, exchange: usize) -> Option<Fault> {
        self.faults
            .iter()
            .find(|(index, _)| *index == exchange)
            .map(|(_, fault)| *fault)
    }

    /// Carries out a command and builds its response, if the bootloader sends one.
    fn process(&mut self, command: &[u8]) -> Option<[u8; FRAME_SIZE]> {
        let mut response = [0u8; FRAME_SIZE];
        response[0] = command[0];
        response[1] = command[1];
        let address = usize::from(u16::from_le_bytes([command[2], command[3]]));

        match command[0] {
            0x00 => response[2..5].copy_from_slice(&self.version),
            0x01 => {
                let size = usize::from(command[5]);
                let end = (address + size).min(MEMORY_SIZE);
                response[2..6].copy_from_slice(&command[2..6]);
                response[6..6 + end - address].copy_from_slice(&self.flash[address..end]);
            }
            0x02 => {
                let size = usize::from(command[6]);
                let end = (address + size).min(MEMORY_SIZE);
                self.flash[address..end].copy_from_slice(&command[7..7 + end - address]);
            }
            0x03 => {
                let end = (address + usize::from(command[5]) * ERASE_UNIT).min(MEMORY_SIZE);
                self.flash[address..end].iter_mut().for_each(|b| *b = 0xff);
            }
            _ => return None,
        }

        Some(response)
    }
}

impl Transport for SimDevice {
    fn send_command(&mut self, frame: &[u8], _timeout: Duration) -> rusb::Result<usize> {
        let exchange = self.commands.len();
        self.commands.push(frame.to_vec());
        self.pending = None;

        match self.fault(exchange) {
            Some(Fault::SendError(error)) => Err(error),
            Some(Fault::ShortCommand(written)) => Ok(written),
            _ => {
                self.pending = self.process(frame);
                Ok(frame.len())
            }
        }
    }

    fn receive_response(&mut self, frame: &mut [u8], _timeout: Duration) -> rusb::Result<usize> {
        self.receives += 1;
        let exchange = self.commands.len().saturating_sub(1);
        let fault = self.fault(exchange);
        if let Some(Fault::ReceiveError(error)) = fault {
            return Err(error);
        }

        // A device with nothing to say lets the transfer time out
        let mut response = self.pending.take().ok_or(rusb::Error::Timeout)?;
        match fault {
            Some(Fault::ShortResponse(length)) => {
                frame[..length].copy_from_slice(&response[..length]);
                Ok(length)
            }
            Some(Fault::WrongEcho) => {
                response[1] = response[1].wrapping_add(1);
                frame.copy_from_slice(&response);
                Ok(FRAME_SIZE)
            }
            _ => {
                frame.copy_from_slice(&response);
                Ok(FRAME_SIZE)
            }
        }
    }

    fn forget_kernel_driver(&mut self) {
        self.reattach = false;
    }
}
