use std::iter::Enumerate;
use std::slice::{Chunks, ChunksMut};

use log::warn;

use super::error::Result;
use super::flash::round_even;
use super::session::Session;
use super::transport::Transport;

/// A multi-chunk operation. Each step yields the number of bytes processed so far, so the caller
/// can report progress or stop between chunks by dropping the operation.
pub trait Operation: Iterator<Item = Result<usize>> {
    fn total(&self) -> usize;

    fn execute(&mut self) -> Result<()> {
        if let Some(Err(error)) = self.last() {
            Err(error)
        } else {
            Ok(())
        }
    }
}

pub struct Read<'d, 's, D: Transport> {
    session: &'s mut Session<D>,
    address: u16,
    chunks: Enumerate<ChunksMut<'d, u8>>,
    length: usize,
    chunk_size: usize,
    done: bool,
}

impl<D: Transport> Operation for Read<'_, '_, D> {
    fn total(&self) -> usize {
        self.length
    }
}

impl<D: Transport> Iterator for Read<'_, '_, D> {
    type Item = Result<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        if let Some((i, chunk)) = self.chunks.next() {
            let offset = i * self.chunk_size;
            let address = self.address + offset as u16;
            Some(match self.session.read_chunk(address, chunk) {
                Ok(()) => Ok(offset + chunk.len()),
                Err(error) => {
                    // Ensure that the iterator is fused after an error occurs
                    self.done = true;
                    Err(error)
                }
            })
        } else {
            self.done = true;
            None
        }
    }
}

impl<'d, 's, D: Transport> Read<'d, 's, D> {
    /// The area must already be known to fit the address space.
    pub(crate) fn at(session: &'s mut Session<D>, buffer: &'d mut [u8], address: u16) -> Self {
        let chunk_size = session.layout().read_chunk;
        Self {
            session,
            address,
            chunk_size,
            length: buffer.len(),
            done: buffer.is_empty(),
            chunks: buffer.chunks_mut(chunk_size).enumerate(),
        }
    }
}

/// Outcome of a write with respect to the bootloader protection.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub struct WriteReport {
    /// Chunks actually sent to the device.
    pub chunks_sent: usize,

    /// Chunks skipped because they start below the flash window.
    pub chunks_skipped: usize,

    /// Start address of the chunk which reached the top of the flash window and ended the write.
    /// Wide enough for a chunk lying past the end of the 16-bit address space.
    pub halted_at: Option<u32>,
}

pub struct Write<'d, 's, D: Transport> {
    session: &'s mut Session<D>,
    address: u16,
    chunks: Enumerate<Chunks<'d, u8>>,
    length: usize,
    chunk_size: usize,
    report: WriteReport,
    done: bool,
}

impl<D: Transport> Operation for Write<'_, '_, D> {
    fn total(&self) -> usize {
        self.length
    }
}

impl<D: Transport> Iterator for Write<'_, '_, D> {
    type Item = Result<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let (i, chunk) = match self.chunks.next() {
            Some(next) => next,
            None => {
                self.done = true;
                return None;
            }
        };

        let offset = i * self.chunk_size;
        let address = u32::from(self.address) + offset as u32;
        let end = address + round_even(chunk.len()) as u32;
        let progress = offset + chunk.len();
        let layout = *self.session.layout();

        if address < u32::from(layout.base) {
            warn!("Protecting bootloader - skip @0x{:04x}", address);
            self.report.chunks_skipped += 1;
            return Some(Ok(progress));
        }

        if end >= layout.top() {
            warn!("Protecting bootloader - stop @0x{:04x}", address);
            self.report.halted_at = Some(address);
            self.done = true;
            return None;
        }

        // Below the window top, so the address fits 16 bits
        Some(match self.session.write_chunk(address as u16, chunk) {
            Ok(()) => {
                self.report.chunks_sent += 1;
                Ok(progress)
            }
            Err(error) => {
                self.done = true;
                Err(error)
            }
        })
    }
}

impl<'d, 's, D: Transport> Write<'d, 's, D> {
    pub(crate) fn at(session: &'s mut Session<D>, data: &'d [u8], address: u16) -> Self {
        let chunk_size = session.layout().page_size;
        Self {
            session,
            address,
            chunk_size,
            chunks: data.chunks(chunk_size).enumerate(),
            length: data.len(),
            report: WriteReport::default(),
            done: data.is_empty(),
        }
    }

    /// What has happened so far. Complete once the iterator is exhausted.
    pub fn report(&self) -> WriteReport {
        self.report
    }
}
