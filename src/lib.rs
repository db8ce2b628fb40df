//! # embedded-memcard
//!
//! > A flash memory card driver written in Embedded Rust
//!
//! This crate lets you read, write and erase a flash memory card of the kind
//! used by game consoles, connected over SPI with one extra interrupt line.
//! It is written in pure-Rust, is `#![no_std]` and does not use `alloc` or
//! `collections` to keep the memory footprint low. In the first instance it is
//! designed for readability and simplicity over performance.
//!
//! ## Using the crate
//!
//! You will need something that implements the [`MemCardDevice`] trait. The
//! [`SpiMemCardDevice`] wraps any `embedded_hal::spi::SpiDevice` together with
//! an `OutputPin` for the interrupt line.
//!
//! ```rust
//! use embedded_memcard::{MemCard, SpiMemCardDevice, TransferError};
//!
//! fn example<S, P, D, W>(spi: S, int: P, delay: D, dump: &mut W) -> Result<(), TransferError<W::Error>>
//! where
//!     S: embedded_hal::spi::SpiDevice,
//!     P: embedded_hal::digital::OutputPin,
//!     D: embedded_hal::delay::DelayNs,
//!     W: embedded_io::Write,
//! {
//!     let card = MemCard::new(SpiMemCardDevice::new(spi, int), delay);
//!     card.acquire()?;
//!     let header = card.read_header()?;
//!     println!("Card is {} Mbit, {} bytes", header.size_mb, header.total_size());
//!     card.dump_to_sink(&header, dump)?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! * `log`: Enabled by default. Generates log messages using the `log` crate.
//! * `defmt-log`: By turning off the default features and enabling the
//!   `defmt-log` feature you can configure this crate to log messages over defmt
//!   instead.
//! * `embassy-sync-06`: Enabled by default. Provides a [`MemCardDevice`] which
//!   shares an SPI bus through an `embassy-sync` blocking mutex.
//!
//! You cannot enable both the `log` feature and the `defmt-log` feature.

#![cfg_attr(not(test), no_std)]

#[cfg(test)]
#[macro_use]
extern crate hex_literal;

#[macro_use]
mod structure;

pub mod header;
pub mod image;
pub mod memcard;

#[doc(inline)]
pub use crate::header::DeviceHeader;

#[doc(inline)]
pub use crate::image::{Chunk, ChunkPlan, TransferError};

#[doc(inline)]
pub use crate::memcard::{AcquireOpts, CardState, Error as MemCardError, MemCard};

#[doc(inline)]
pub use crate::memcard::memcard_device::{
    MemCardDevice, MemCardDeviceError, RefCellMemCardDevice, SpiMemCardDevice,
};

#[cfg(feature = "embassy-sync-06")]
#[doc(inline)]
pub use crate::memcard::memcard_device::EmbassyMutexMemCardDevice;

#[doc(inline)]
pub use crate::memcard::proto::{PackedAddress, Status, BLOCK_SIZE};

#[cfg(all(feature = "defmt-log", feature = "log"))]
compile_error!("Cannot enable both log and defmt-log");

#[cfg(feature = "log")]
use log::{debug, trace, warn};

#[cfg(feature = "defmt-log")]
use defmt::{debug, trace, warn};

#[cfg(all(not(feature = "defmt-log"), not(feature = "log")))]
#[macro_export]
/// Like log::debug! but does nothing at all
macro_rules! debug {
    ($($arg:tt)+) => {};
}

#[cfg(all(not(feature = "defmt-log"), not(feature = "log")))]
#[macro_export]
/// Like log::trace! but does nothing at all
macro_rules! trace {
    ($($arg:tt)+) => {};
}

#[cfg(all(not(feature = "defmt-log"), not(feature = "log")))]
#[macro_export]
/// Like log::warn! but does nothing at all
macro_rules! warn {
    ($($arg:tt)+) => {};
}

// ****************************************************************************
//
// End Of File
//
// ****************************************************************************
