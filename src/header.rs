//! The device header
//!
//! The first bytes of every card describe the card: who formatted it, when,
//! and how big it is. Everything is stored big-endian.

use byteorder::{BigEndian, ByteOrder};

use crate::memcard::proto::{BLOCKS_PER_MB, BLOCK_SIZE, MAX_SIZE_MB};
use crate::memcard::Error;

/// The decoded device header, in host byte order.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DeviceHeader {
    /// Serial number, set when the card was formatted
    pub serial: [u8; 12],
    /// When the card was formatted
    pub format_time: u64,
    /// Console clock bias at format time
    pub sram_bias: u32,
    /// Console language at format time
    pub sram_language: u32,
    /// Reserved
    pub unknown1: u32,
    /// Device ID
    pub device_id: u16,
    /// Declared size, in megabits
    pub size_mb: u16,
    /// Character encoding used for names on the card
    pub encoding: u16,
}

/// The header as it sits on the card.
struct RawHeader<'a> {
    data: &'a [u8],
}

impl RawHeader<'_> {
    define_field!(serial, [u8; 12], 0);
    define_field!(format_time, u64, 12);
    define_field!(sram_bias, u32, 20);
    define_field!(sram_language, u32, 24);
    define_field!(unknown1, u32, 28);
    define_field!(device_id, u16, 32);
    define_field!(size_mb, u16, 34);
    define_field!(encoding, u16, 36);
}

impl DeviceHeader {
    /// How many bytes of the card the header takes up.
    pub const LEN: usize = 38;

    /// Decode a header from the start of the card.
    ///
    /// `data` must be the card contents from address zero (with any read
    /// timing pad already removed) and at least [`DeviceHeader::LEN`] bytes
    /// long. Headers declaring more than 128 megabits are rejected.
    pub fn parse(data: &[u8]) -> Result<DeviceHeader, Error> {
        if data.len() < Self::LEN {
            return Err(Error::HeaderTooShort(data.len()));
        }
        let raw = RawHeader { data };
        let header = DeviceHeader {
            serial: raw.serial(),
            format_time: raw.format_time(),
            sram_bias: raw.sram_bias(),
            sram_language: raw.sram_language(),
            unknown1: raw.unknown1(),
            device_id: raw.device_id(),
            size_mb: raw.size_mb(),
            encoding: raw.encoding(),
        };
        if header.size_mb > MAX_SIZE_MB {
            return Err(Error::CapacityTooLarge(header.size_mb));
        }
        Ok(header)
    }

    /// Encode the header in its on-card layout.
    pub fn to_bytes(&self) -> [u8; Self::LEN] {
        let mut data = [0u8; Self::LEN];
        data[0..12].copy_from_slice(&self.serial);
        BigEndian::write_u64(&mut data[12..20], self.format_time);
        BigEndian::write_u32(&mut data[20..24], self.sram_bias);
        BigEndian::write_u32(&mut data[24..28], self.sram_language);
        BigEndian::write_u32(&mut data[28..32], self.unknown1);
        BigEndian::write_u16(&mut data[32..34], self.device_id);
        BigEndian::write_u16(&mut data[34..36], self.size_mb);
        BigEndian::write_u16(&mut data[36..38], self.encoding);
        data
    }

    /// How many blocks the card holds.
    pub fn num_blocks(&self) -> usize {
        usize::from(self.size_mb) * BLOCKS_PER_MB
    }

    /// How many bytes the card holds. A full image is exactly this long.
    pub fn total_size(&self) -> usize {
        self.num_blocks() * BLOCK_SIZE
    }
}
