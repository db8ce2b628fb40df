//! Constants and wire types for the memory card command protocol.
//!
//! Every command starts with a one byte opcode, usually followed by a packed
//! address. The card answers in the same exchange, so the response for byte
//! `n` of a frame is found at offset `n` of the same buffer afterwards.

// ****************************************************************************
// Opcodes
// ****************************************************************************

/// Read the status byte
pub const CMD_STATUS: u8 = 0x83;
/// Clear the status byte
pub const CMD_CLEAR_STATUS: u8 = 0x89;
/// Wake the card from sleep
pub const CMD_WAKE: u8 = 0x87;
/// Enable the card's interrupt output
pub const CMD_INTERRUPT_ENABLE: u8 = 0x01;
/// Read a run of bytes
pub const CMD_READ: u8 = 0x52;
/// Program up to one write page
pub const CMD_WRITE: u8 = 0xF2;
/// Write buffer
pub const CMD_WRITE_BUFFER: u8 = 0x82;
/// Erase one sector
pub const CMD_ERASE: u8 = 0xF1;

// ****************************************************************************
// Frames and sizes
// ****************************************************************************

/// Sent once, with the interrupt line low, before the card is polled.
pub const OPENING_FRAME: [u8; 6] = [0x00, 0x00, 0xFF, 0xFF, 0x00, 0x00];

/// Status query frame. The status byte comes back at [`STATUS_OFFSET`].
pub const STATUS_FRAME: [u8; 3] = [CMD_STATUS, 0x00, 0xFF];

/// Where the status byte sits in the response to [`STATUS_FRAME`].
pub const STATUS_OFFSET: usize = 2;

/// Interrupt enable frame.
pub const INTERRUPT_ENABLE_FRAME: [u8; 4] = [CMD_INTERRUPT_ENABLE, 0x00, 0x00, 0x00];

/// Opcode byte plus four packed address bytes.
pub const HEADER_LEN: usize = 5;

/// Filler clocked out after a read header before real data appears.
pub const TIMING_PAD_LEN: usize = 128;

/// Byte used for the timing pad and the read data region.
pub const PAD_BYTE: u8 = 0xFF;

/// Largest amount of data one read command may return.
pub const MAX_READ_LEN: usize = 0x200;

/// Largest payload one write command may carry.
pub const MAX_WRITE_LEN: usize = 0x80;

/// The erase command only carries the two upper address bytes.
pub const ERASE_FRAME_LEN: usize = 3;

/// Offset of the first data byte in a read response.
pub const READ_DATA_OFFSET: usize = HEADER_LEN + TIMING_PAD_LEN;

/// Size of the command buffer: big enough for the longest read exchange.
pub const COMMAND_BUFFER_LEN: usize = READ_DATA_OFFSET + MAX_READ_LEN;

/// Address of the read which unlocks the card for data reads.
pub const UNLOCK_ADDRESS: u32 = 0x7FEC9;

/// Length of the unlock read.
pub const UNLOCK_LEN: usize = 29;

/// Settle time after wake, interrupt enable and write commands.
pub const SETTLE_DELAY_US: u32 = 3_500;

/// Settle time after an erase command.
pub const ERASE_DELAY_US: u32 = 1_900;

/// Size of one card block. Card capacity is counted in these.
pub const BLOCK_SIZE: usize = 0x2000;

/// Blocks per megabit of declared card size.
pub const BLOCKS_PER_MB: usize = 16;

/// The largest card size (in megabits) the driver will accept.
pub const MAX_SIZE_MB: u16 = 128;

// ****************************************************************************
// Types
// ****************************************************************************

/// A byte address in the card's packed four byte representation.
///
/// The card does not use a plain big-endian address. The linear offset is
/// split as follows:
///
/// | byte | address bits |
/// |------|--------------|
/// | 0    | 24..17       |
/// | 1    | 16..9        |
/// | 2    | 8..7         |
/// | 3    | 6..0         |
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PackedAddress([u8; 4]);

impl PackedAddress {
    /// The largest linear address the packing can carry.
    pub const MAX: u32 = (1 << 25) - 1;

    /// Pack a linear byte offset.
    ///
    /// Bits above [`PackedAddress::MAX`] are dropped. Range checking against
    /// the card capacity is the caller's job.
    pub const fn new(address: u32) -> PackedAddress {
        PackedAddress([
            (address >> 17) as u8,
            (address >> 9) as u8,
            ((address >> 7) & 0x03) as u8,
            (address & 0x7F) as u8,
        ])
    }

    /// Wrap four bytes as received from (or destined for) the card.
    pub const fn from_bytes(bytes: [u8; 4]) -> PackedAddress {
        PackedAddress(bytes)
    }

    /// The four packed bytes, in wire order.
    pub const fn to_bytes(self) -> [u8; 4] {
        self.0
    }

    /// Unpack back into a linear byte offset.
    pub const fn address(self) -> u32 {
        ((self.0[0] as u32) << 17)
            | ((self.0[1] as u32) << 9)
            | (((self.0[2] & 0x03) as u32) << 7)
            | ((self.0[3] & 0x7F) as u32)
    }

    /// The two bytes which address an erase sector.
    pub const fn sector_bytes(self) -> [u8; 2] {
        [self.0[0], self.0[1]]
    }
}

/// The card status byte.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Status(pub u8);

impl Status {
    /// Bit 0: the card can take a command.
    pub const READY: u8 = 0x01;
    /// Bit 7: the card is busy with an internal operation.
    pub const BUSY: u8 = 0x80;

    /// Is the ready bit set?
    pub const fn is_ready(self) -> bool {
        (self.0 & Self::READY) != 0
    }

    /// Is the busy bit set?
    pub const fn is_busy(self) -> bool {
        (self.0 & Self::BUSY) != 0
    }

    /// Ready, and not in the middle of anything.
    pub const fn is_ready_not_busy(self) -> bool {
        self.is_ready() && !self.is_busy()
    }
}
