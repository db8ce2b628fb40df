//! Useful library code for tests

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use embedded_hal::{delay::DelayNs, digital::PinState};
use embedded_memcard::{
    AcquireOpts, DeviceHeader, MemCard, MemCardDevice, MemCardDeviceError, PackedAddress,
    BLOCK_SIZE,
};

/// Offset of the first data byte in a read exchange.
pub const READ_DATA_OFFSET: usize = 5 + 128;

/// Something the driver did to the card, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// One exchange, holding the bytes that were sent
    Exchange(Vec<u8>),
    /// The interrupt line was driven
    Line(PinState),
    /// A delay, in nanoseconds
    Delay(u32),
}

/// Shared between the card and the delayer so the order of everything is
/// kept.
pub type EventLog = Rc<RefCell<Vec<Event>>>;

/// A memory card living in RAM.
///
/// Answers commands the way the real card does, with flash semantics: writes
/// can only clear bits and erase sets a whole block back to `0xFF`.
pub struct FakeCard {
    pub contents: Vec<u8>,
    log: EventLog,
    statuses: VecDeque<u8>,
    idle_status: u8,
    fail_opcode: Option<u8>,
    fail_read_at: Option<u32>,
}

impl FakeCard {
    pub fn new(contents: Vec<u8>, log: EventLog) -> FakeCard {
        FakeCard {
            contents,
            log,
            statuses: VecDeque::new(),
            idle_status: 0x01,
            fail_opcode: None,
            fail_read_at: None,
        }
    }

    /// Status bytes to report, in order, before reporting `idle_status`.
    pub fn push_statuses(&mut self, statuses: &[u8]) {
        self.statuses.extend(statuses.iter().copied());
    }

    /// What to report once the scripted statuses run out.
    pub fn set_idle_status(&mut self, status: u8) {
        self.idle_status = status;
    }

    /// Fail every exchange starting with this opcode.
    pub fn fail_opcode(&mut self, opcode: u8) {
        self.fail_opcode = Some(opcode);
    }

    /// Fail reads of this address.
    pub fn fail_read_at(&mut self, address: u32) {
        self.fail_read_at = Some(address);
    }

    /// Stop failing anything.
    pub fn clear_failures(&mut self) {
        self.fail_opcode = None;
        self.fail_read_at = None;
    }

    fn address(buf: &[u8]) -> usize {
        PackedAddress::from_bytes([buf[1], buf[2], buf[3], buf[4]]).address() as usize
    }
}

impl MemCardDevice for FakeCard {
    fn exchange(&mut self, buf: &mut [u8]) -> Result<(), MemCardDeviceError> {
        self.log.borrow_mut().push(Event::Exchange(buf.to_vec()));
        if Some(buf[0]) == self.fail_opcode {
            return Err(MemCardDeviceError::Spi);
        }
        match buf[0] {
            0x83 => {
                let status = self.statuses.pop_front().unwrap_or(self.idle_status);
                buf[0] = 0xFF;
                buf[1] = 0xFF;
                buf[2] = status;
            }
            0x52 => {
                let address = Self::address(buf);
                if Some(address as u32) == self.fail_read_at {
                    return Err(MemCardDeviceError::Spi);
                }
                // Junk where the timing pad was.
                buf[..READ_DATA_OFFSET].fill(0x00);
                for (idx, b) in buf[READ_DATA_OFFSET..].iter_mut().enumerate() {
                    *b = self.contents.get(address + idx).copied().unwrap_or(0xFF);
                }
            }
            0xF2 => {
                let address = Self::address(buf);
                for (idx, b) in buf[5..].iter().enumerate() {
                    if let Some(cell) = self.contents.get_mut(address + idx) {
                        *cell &= *b;
                    }
                }
            }
            0xF1 => {
                let sector = (usize::from(buf[1]) << 17) | (usize::from(buf[2]) << 9);
                let start = sector - (sector % BLOCK_SIZE);
                let end = std::cmp::min(start + BLOCK_SIZE, self.contents.len());
                if start < end {
                    self.contents[start..end].fill(0xFF);
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn set_interrupt(&mut self, state: PinState) -> Result<(), MemCardDeviceError> {
        self.log.borrow_mut().push(Event::Line(state));
        Ok(())
    }
}

/// A delayer which doesn't wait, but notes that it was asked to.
pub struct FakeDelayer {
    log: EventLog,
}

impl DelayNs for FakeDelayer {
    fn delay_ns(&mut self, ns: u32) {
        self.log.borrow_mut().push(Event::Delay(ns));
    }
}

pub type TestCard = MemCard<FakeCard, FakeDelayer>;

/// Build a driver around a RAM card holding `contents`.
pub fn make_card(contents: Vec<u8>) -> (TestCard, EventLog) {
    make_card_with_options(contents, AcquireOpts::default())
}

/// Build a driver around a RAM card holding `contents`, with options.
pub fn make_card_with_options(contents: Vec<u8>, options: AcquireOpts) -> (TestCard, EventLog) {
    let _ = env_logger::builder().is_test(true).try_init();
    let log = EventLog::default();
    let card = FakeCard::new(contents, log.clone());
    let delayer = FakeDelayer { log: log.clone() };
    (MemCard::new_with_options(card, delayer, options), log)
}

/// The header of a freshly formatted card of `size_mb` megabits.
pub fn make_header(size_mb: u16) -> DeviceHeader {
    let mut serial = [0u8; 12];
    serial[0..3].copy_from_slice(b"ABC");
    DeviceHeader {
        serial,
        format_time: 0,
        sram_bias: 0,
        sram_language: 1,
        unknown1: 0,
        device_id: 2,
        size_mb,
        encoding: 0,
    }
}

/// A complete card image: the header followed by a recognisable pattern.
pub fn make_image(size_mb: u16) -> Vec<u8> {
    let header = make_header(size_mb);
    let mut image: Vec<u8> = (0..header.total_size())
        .map(|idx| (idx % 251) as u8 ^ (idx >> 13) as u8)
        .collect();
    image[..DeviceHeader::LEN].copy_from_slice(&header.to_bytes());
    image
}

/// All the frames sent to the card.
pub fn exchanges(log: &EventLog) -> Vec<Vec<u8>> {
    log.borrow()
        .iter()
        .filter_map(|e| match e {
            Event::Exchange(bytes) => Some(bytes.clone()),
            _ => None,
        })
        .collect()
}

/// All the frames sent to the card starting with `opcode`.
pub fn exchanges_with_opcode(log: &EventLog, opcode: u8) -> Vec<Vec<u8>> {
    exchanges(log)
        .into_iter()
        .filter(|bytes| bytes[0] == opcode)
        .collect()
}

/// Is this the frame of the one-off unlock read?
pub fn is_unlock(frame: &[u8]) -> bool {
    frame[0] == 0x52 && frame[1..5] == [0x03, 0xFF, 0x01, 0x49] && frame.len() == READ_DATA_OFFSET + 29
}

// ****************************************************************************
//
// End Of File
//
// ****************************************************************************
