//! Command framing.
//!
//! The [`CommandBuffer`] is the one scratch buffer used for every exchange
//! with the card. Each framing method writes a complete frame into the front
//! of the buffer, performs exactly one exchange and leaves the response in
//! place for the caller.

use embedded_hal::delay::DelayNs;

use super::memcard_device::MemCardDevice;
use super::proto::*;
use super::Error;
use crate::trace;

/// The reusable command buffer, sized for the longest read exchange.
pub struct CommandBuffer {
    data: [u8; COMMAND_BUFFER_LEN],
}

impl CommandBuffer {
    /// Make a new, zeroed, command buffer.
    pub const fn new() -> CommandBuffer {
        CommandBuffer {
            data: [0u8; COMMAND_BUFFER_LEN],
        }
    }

    /// The first `len` bytes of the last exchange.
    pub fn response(&self, len: usize) -> &[u8] {
        &self.data[..len]
    }

    /// Send the opening sequence.
    pub fn opening<D>(&mut self, device: &mut D) -> Result<(), Error>
    where
        D: MemCardDevice,
    {
        self.data[..OPENING_FRAME.len()].copy_from_slice(&OPENING_FRAME);
        self.exchange(device, OPENING_FRAME.len())
    }

    /// Query the status byte.
    pub fn status<D>(&mut self, device: &mut D) -> Result<Status, Error>
    where
        D: MemCardDevice,
    {
        self.data[..STATUS_FRAME.len()].copy_from_slice(&STATUS_FRAME);
        self.exchange(device, STATUS_FRAME.len())?;
        let status = Status(self.data[STATUS_OFFSET]);
        trace!("status: {:#x}", status.0);
        Ok(status)
    }

    /// Clear the status byte.
    pub fn clear_status<D>(&mut self, device: &mut D) -> Result<(), Error>
    where
        D: MemCardDevice,
    {
        self.data[0] = CMD_CLEAR_STATUS;
        self.exchange(device, 1)
    }

    /// Send the write buffer command.
    pub fn write_buffer<D>(&mut self, device: &mut D) -> Result<(), Error>
    where
        D: MemCardDevice,
    {
        self.data[0] = CMD_WRITE_BUFFER;
        self.exchange(device, 1)
    }

    /// Wake the card, then wait for it to settle.
    pub fn wake<D, DELAYER>(&mut self, device: &mut D, delayer: &mut DELAYER) -> Result<(), Error>
    where
        D: MemCardDevice,
        DELAYER: DelayNs,
    {
        self.data[0] = CMD_WAKE;
        let result = self.exchange(device, 1);
        delayer.delay_us(SETTLE_DELAY_US);
        result
    }

    /// Enable the card interrupt, then wait for it to settle.
    pub fn interrupt_enable<D, DELAYER>(
        &mut self,
        device: &mut D,
        delayer: &mut DELAYER,
    ) -> Result<(), Error>
    where
        D: MemCardDevice,
        DELAYER: DelayNs,
    {
        self.data[..INTERRUPT_ENABLE_FRAME.len()].copy_from_slice(&INTERRUPT_ENABLE_FRAME);
        let result = self.exchange(device, INTERRUPT_ENABLE_FRAME.len());
        delayer.delay_us(SETTLE_DELAY_US);
        result
    }

    /// Read `amount` bytes at `address`, returning the data with the timing
    /// pad stripped off.
    pub fn read<D>(&mut self, device: &mut D, address: u32, amount: usize) -> Result<&[u8], Error>
    where
        D: MemCardDevice,
    {
        if amount == 0 || amount > MAX_READ_LEN {
            return Err(Error::ReadSizeLimit(amount));
        }
        self.set_header(CMD_READ, address);
        let len = READ_DATA_OFFSET + amount;
        // Stale bytes from the last command must not leak onto the bus.
        self.data[HEADER_LEN..len].fill(PAD_BYTE);
        self.exchange(device, len)?;
        Ok(&self.data[READ_DATA_OFFSET..len])
    }

    /// Send one write frame carrying `data` for `address`.
    pub fn write<D>(&mut self, device: &mut D, address: u32, data: &[u8]) -> Result<(), Error>
    where
        D: MemCardDevice,
    {
        if data.len() > MAX_WRITE_LEN {
            return Err(Error::WriteSizeLimit(data.len()));
        }
        self.set_header(CMD_WRITE, address);
        let len = HEADER_LEN + data.len();
        self.data[HEADER_LEN..len].copy_from_slice(data);
        self.exchange(device, len)
    }

    /// Erase the sector containing `address`, then wait for it to settle.
    pub fn erase<D, DELAYER>(
        &mut self,
        device: &mut D,
        delayer: &mut DELAYER,
        address: u32,
    ) -> Result<(), Error>
    where
        D: MemCardDevice,
        DELAYER: DelayNs,
    {
        let [hi, lo] = PackedAddress::new(address).sector_bytes();
        self.data[..ERASE_FRAME_LEN].copy_from_slice(&[CMD_ERASE, hi, lo]);
        let result = self.exchange(device, ERASE_FRAME_LEN);
        delayer.delay_us(ERASE_DELAY_US);
        result
    }

    fn set_header(&mut self, opcode: u8, address: u32) {
        self.data[0] = opcode;
        self.data[1..HEADER_LEN].copy_from_slice(&PackedAddress::new(address).to_bytes());
    }

    fn exchange<D>(&mut self, device: &mut D, len: usize) -> Result<(), Error>
    where
        D: MemCardDevice,
    {
        trace!("exchange {:#x}, {} bytes", self.data[0], len);
        device.exchange(&mut self.data[..len])?;
        Ok(())
    }
}

impl Default for CommandBuffer {
    fn default() -> Self {
        Self::new()
    }
}
