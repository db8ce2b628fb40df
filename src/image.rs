//! Whole card transfers.
//!
//! Moves complete card images between a [`MemCard`] and something
//! implementing [`embedded_io`] traits, in page sized pieces.

use embedded_hal::delay::DelayNs;
use embedded_io::{Read, ReadExactError, Write};

use crate::header::DeviceHeader;
use crate::memcard::memcard_device::MemCardDevice;
use crate::memcard::proto::{BLOCK_SIZE, MAX_READ_LEN, MAX_WRITE_LEN};
use crate::memcard::{Error, MemCard};
use crate::{debug, trace};

/// One read window of a transfer.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Card address of the first byte
    pub address: u32,
    /// Number of bytes
    pub len: usize,
}

/// Splits `total` bytes into consecutive, non-overlapping windows of
/// `chunk_size` bytes. The last window holds whatever is left over.
#[derive(Debug, Clone)]
pub struct ChunkPlan {
    total: usize,
    chunk_size: usize,
    offset: usize,
}

impl ChunkPlan {
    /// Number of bytes a `u32` address can reach.
    const ADDRESS_SPACE: u64 = 1 << 32;

    /// Plan a transfer of `total` bytes in windows as large as one read.
    pub fn new(total: usize) -> ChunkPlan {
        ChunkPlan::with_chunk_size(total, MAX_READ_LEN)
    }

    /// Plan a transfer of `total` bytes in windows of `chunk_size`.
    ///
    /// Card addresses are 32 bits, so anything past 4 GiB is left out of the
    /// plan.
    ///
    /// # Panics
    ///
    /// If `chunk_size` is zero.
    pub fn with_chunk_size(total: usize, chunk_size: usize) -> ChunkPlan {
        assert!(chunk_size > 0, "chunk size must not be zero");
        ChunkPlan {
            total: core::cmp::min(total as u64, Self::ADDRESS_SPACE) as usize,
            chunk_size,
            offset: 0,
        }
    }

    /// How many windows the whole plan has.
    pub fn num_chunks(&self) -> usize {
        self.total.div_ceil(self.chunk_size)
    }
}

impl Iterator for ChunkPlan {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        if self.offset >= self.total {
            return None;
        }
        let address = u32::try_from(self.offset).ok()?;
        let len = core::cmp::min(self.chunk_size, self.total - self.offset);
        let chunk = Chunk { address, len };
        self.offset += len;
        Some(chunk)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = (self.total - core::cmp::min(self.offset, self.total)).div_ceil(self.chunk_size);
        (left, Some(left))
    }
}

impl ExactSizeIterator for ChunkPlan {}

/// Errors from whole card transfers.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Clone)]
pub enum TransferError<E>
where
    E: core::fmt::Debug,
{
    /// The card or its transport failed
    Card(Error),
    /// The image sink or source failed
    Io(E),
    /// The image source ran out before the end of the card
    UnexpectedEof,
}

impl<E> From<Error> for TransferError<E>
where
    E: core::fmt::Debug,
{
    fn from(value: Error) -> TransferError<E> {
        TransferError::Card(value)
    }
}

impl<E> From<ReadExactError<E>> for TransferError<E>
where
    E: core::fmt::Debug,
{
    fn from(value: ReadExactError<E>) -> TransferError<E> {
        match value {
            ReadExactError::UnexpectedEof => TransferError::UnexpectedEof,
            ReadExactError::Other(e) => TransferError::Io(e),
        }
    }
}

impl<DEV, DELAYER> MemCard<DEV, DELAYER>
where
    DEV: MemCardDevice,
    DELAYER: DelayNs,
{
    /// Read and check the device header at the start of the card.
    pub fn read_header(&self) -> Result<DeviceHeader, Error> {
        let mut data = [0u8; DeviceHeader::LEN];
        self.read_page(0, &mut data)?;
        let header = DeviceHeader::parse(&data)?;
        debug!("Header: {:?}", header);
        Ok(header)
    }

    /// Read the header, then copy the whole card into `sink`.
    ///
    /// Nothing is written to `sink` if the header is invalid.
    pub fn dump<W>(&self, sink: &mut W) -> Result<DeviceHeader, TransferError<W::Error>>
    where
        W: Write,
    {
        let header = self.read_header()?;
        self.dump_to_sink(&header, sink)?;
        Ok(header)
    }

    /// Copy the whole card, as described by `header`, into `sink`.
    ///
    /// The card is read in 512 byte windows, in address order. The first
    /// failure stops the transfer; whatever was already written to `sink`
    /// stays there. Returns the number of bytes copied.
    pub fn dump_to_sink<W>(
        &self,
        header: &DeviceHeader,
        sink: &mut W,
    ) -> Result<usize, TransferError<W::Error>>
    where
        W: Write,
    {
        let plan = ChunkPlan::new(header.total_size());
        debug!(
            "Dumping {} bytes in {} chunks",
            header.total_size(),
            plan.num_chunks()
        );
        let mut page = [0u8; MAX_READ_LEN];
        let mut copied = 0;
        for chunk in plan {
            let data = &mut page[..chunk.len];
            self.read_page(chunk.address, data)?;
            sink.write_all(data).map_err(TransferError::Io)?;
            copied += chunk.len;
        }
        sink.flush().map_err(TransferError::Io)?;
        Ok(copied)
    }

    /// Bring the card from the `old` image to the `new` image.
    ///
    /// Both images are streamed one block at a time. Every block which
    /// differs is erased and then written from `new` in 128 byte pages.
    /// Blocks which are the same are not touched. `old` must match what is
    /// actually on the card. Returns the number of blocks rewritten.
    ///
    /// Uses one block of stack for `new` plus one page for `old`, a little
    /// over 8 KiB.
    pub fn write_diff<O, N>(
        &self,
        header: &DeviceHeader,
        old: &mut O,
        new: &mut N,
    ) -> Result<usize, TransferError<O::Error>>
    where
        O: Read,
        N: Read<Error = O::Error>,
    {
        let mut new_block = [0u8; BLOCK_SIZE];
        let mut old_page = [0u8; MAX_WRITE_LEN];
        let mut rewritten = 0;
        for block_idx in 0..header.num_blocks() {
            new.read_exact(&mut new_block)?;
            let mut changed = false;
            for new_page in new_block.chunks(MAX_WRITE_LEN) {
                old.read_exact(&mut old_page)?;
                changed |= old_page[..] != new_page[..];
            }
            if !changed {
                trace!("Block {} unchanged", block_idx);
                continue;
            }
            let base = (block_idx * BLOCK_SIZE) as u32;
            debug!("Rewriting block {} @ {:#x}", block_idx, base);
            self.erase_sector(base)?;
            for (page_idx, page) in new_block.chunks(MAX_WRITE_LEN).enumerate() {
                self.write_page(base + (page_idx * MAX_WRITE_LEN) as u32, page)?;
            }
            rewritten += 1;
        }
        Ok(rewritten)
    }
}
