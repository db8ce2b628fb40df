//! Helpers for using embedded-memcard on Linux

use embedded_hal::{delay::DelayNs, digital::PinState};
use embedded_memcard::{MemCardDevice, MemCardDeviceError, PackedAddress, BLOCK_SIZE};
use std::fs::{File, OpenOptions};
use std::io::prelude::*;
use std::io::SeekFrom;
use std::path::Path;

/// Offset of the first data byte in a read exchange.
const READ_DATA_OFFSET: usize = 5 + 128;

/// A memory card emulated on top of an image file.
///
/// Answers the card's commands with flash semantics: writes can only clear
/// bits and erase sets a whole block back to `0xFF`. The card is always
/// ready.
#[derive(Debug)]
pub struct LinuxMemCard {
    file: File,
    len: u64,
    print_frames: bool,
}

impl LinuxMemCard {
    pub fn new<P>(image_name: P, print_frames: bool) -> Result<LinuxMemCard, std::io::Error>
    where
        P: AsRef<Path>,
    {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(image_name)?;
        let len = file.metadata()?.len();
        Ok(LinuxMemCard {
            file,
            len,
            print_frames,
        })
    }

    fn address(buf: &[u8]) -> u64 {
        u64::from(PackedAddress::from_bytes([buf[1], buf[2], buf[3], buf[4]]).address())
    }

    fn read_at(&mut self, address: u64, data: &mut [u8]) -> Result<(), std::io::Error> {
        data.fill(0xFF);
        if address >= self.len {
            return Ok(());
        }
        let available = std::cmp::min(data.len() as u64, self.len - address) as usize;
        self.file.seek(SeekFrom::Start(address))?;
        self.file.read_exact(&mut data[..available])
    }

    fn write_at(&mut self, address: u64, data: &[u8]) -> Result<(), std::io::Error> {
        if address >= self.len {
            return Ok(());
        }
        let available = std::cmp::min(data.len() as u64, self.len - address) as usize;
        self.file.seek(SeekFrom::Start(address))?;
        self.file.write_all(&data[..available])
    }

    fn handle(&mut self, buf: &mut [u8]) -> Result<(), std::io::Error> {
        match buf[0] {
            0x83 if buf.len() >= 3 => buf[2] = 0x01,
            0x52 if buf.len() > READ_DATA_OFFSET => {
                let address = Self::address(buf);
                self.read_at(address, &mut buf[READ_DATA_OFFSET..])?;
            }
            0xF2 if buf.len() > 5 => {
                let address = Self::address(buf);
                let mut cells = vec![0u8; buf.len() - 5];
                self.read_at(address, &mut cells)?;
                for (cell, b) in cells.iter_mut().zip(&buf[5..]) {
                    *cell &= *b;
                }
                self.write_at(address, &cells)?;
            }
            0xF1 if buf.len() >= 3 => {
                let sector = (u64::from(buf[1]) << 17) | (u64::from(buf[2]) << 9);
                let start = sector - (sector % BLOCK_SIZE as u64);
                self.write_at(start, &[0xFF; BLOCK_SIZE])?;
            }
            _ => {}
        }
        Ok(())
    }
}

impl MemCardDevice for LinuxMemCard {
    fn exchange(&mut self, buf: &mut [u8]) -> Result<(), MemCardDeviceError> {
        if self.print_frames {
            println!("Frame {:02x?}", &buf[..std::cmp::min(buf.len(), 5)]);
        }
        self.handle(buf).map_err(|e| {
            println!("Image I/O failed: {}", e);
            MemCardDeviceError::Spi
        })
    }

    fn set_interrupt(&mut self, state: PinState) -> Result<(), MemCardDeviceError> {
        if self.print_frames {
            println!("Interrupt line {:?}", state);
        }
        Ok(())
    }
}

/// Delays using the OS.
#[derive(Debug, Clone, Copy)]
pub struct StdDelay;

impl DelayNs for StdDelay {
    fn delay_ns(&mut self, ns: u32) {
        std::thread::sleep(std::time::Duration::from_nanos(u64::from(ns)));
    }
}

/// Lets a `std::io` reader or writer be used where `embedded_io` is wanted.
#[derive(Debug)]
pub struct StdIo<T>(pub T);

impl<T> embedded_io::ErrorType for StdIo<T> {
    type Error = std::io::Error;
}

impl<T: Read> embedded_io::Read for StdIo<T> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        self.0.read(buf)
    }
}

impl<T: Write> embedded_io::Write for StdIo<T> {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        self.0.flush()
    }
}

// ****************************************************************************
//
// End Of File
//
// ****************************************************************************
