//! Memory card transport trait and provided implementations.

use core::cell::RefCell;

use embedded_hal::{
    digital::{OutputPin, PinState},
    spi::{SpiBus, SpiDevice},
};

/// Trait for memory cards connected via SPI plus an interrupt line.
pub trait MemCardDevice {
    /// Clock `buf` out to the card with chip select asserted, replacing its
    /// contents with the bytes the card clocked back.
    ///
    /// This is one complete exchange; chip select is released before
    /// returning, even on failure.
    fn exchange(&mut self, buf: &mut [u8]) -> Result<(), MemCardDeviceError>;

    /// Drive the interrupt line to the given level.
    fn set_interrupt(&mut self, state: PinState) -> Result<(), MemCardDeviceError>;
}

/// Errors that can occur when using the [`MemCardDevice`].
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[non_exhaustive]
pub enum MemCardDeviceError {
    /// An operation on the inner SPI bus failed.
    Spi,
    /// Setting the value of the Chip Select (CS) pin failed.
    Cs,
    /// Setting the value of the interrupt pin failed.
    Interrupt,
}

/// A memory card on an [`SpiDevice`], which handles chip select itself, plus
/// an interrupt pin.
///
/// Use this with `embedded-hal-bus` devices, or any HAL SPI device.
pub struct SpiMemCardDevice<SPI, INT> {
    spi: SPI,
    int: INT,
}

impl<SPI, INT> SpiMemCardDevice<SPI, INT> {
    /// Create a new `SpiMemCardDevice`.
    pub fn new(spi: SPI, int: INT) -> Self {
        Self { spi, int }
    }

    /// Get a temporary borrow on the underlying SPI device.
    pub fn spi<T, F>(&mut self, func: F) -> T
    where
        F: FnOnce(&mut SPI) -> T,
    {
        func(&mut self.spi)
    }

    /// Give back the SPI device and the interrupt pin.
    pub fn release(self) -> (SPI, INT) {
        (self.spi, self.int)
    }
}

impl<SPI, INT> MemCardDevice for SpiMemCardDevice<SPI, INT>
where
    SPI: SpiDevice<u8>,
    INT: OutputPin,
{
    fn exchange(&mut self, buf: &mut [u8]) -> Result<(), MemCardDeviceError> {
        self.spi
            .transfer_in_place(buf)
            .map_err(|_| MemCardDeviceError::Spi)
    }

    fn set_interrupt(&mut self, state: PinState) -> Result<(), MemCardDeviceError> {
        self.int
            .set_state(state)
            .map_err(|_| MemCardDeviceError::Interrupt)
    }
}

/// A wrapper around a SPI bus, a CS pin and an interrupt pin, using a
/// `RefCell`.
///
/// This allows sharing the bus within the same thread.
pub struct RefCellMemCardDevice<'a, BUS, CS, INT> {
    bus: &'a RefCell<BUS>,
    cs: CS,
    int: INT,
}

impl<'a, BUS, CS, INT> RefCellMemCardDevice<'a, BUS, CS, INT> {
    /// Create a new `RefCellMemCardDevice`.
    pub fn new(bus: &'a RefCell<BUS>, cs: CS, int: INT) -> Self {
        Self { bus, cs, int }
    }
}

impl<BUS, CS, INT> MemCardDevice for RefCellMemCardDevice<'_, BUS, CS, INT>
where
    BUS: SpiBus,
    CS: OutputPin,
    INT: OutputPin,
{
    fn exchange(&mut self, buf: &mut [u8]) -> Result<(), MemCardDeviceError> {
        let mut bus = self.bus.borrow_mut();
        bus_exchange(&mut *bus, &mut self.cs, buf)
    }

    fn set_interrupt(&mut self, state: PinState) -> Result<(), MemCardDeviceError> {
        self.int
            .set_state(state)
            .map_err(|_| MemCardDeviceError::Interrupt)
    }
}

#[cfg(feature = "embassy-sync-06")]
mod embassy_sync_06 {
    use core::cell::RefCell;

    use ::embassy_sync_06::blocking_mutex;

    use super::*;

    /// A wrapper around a SPI bus, a CS pin and an interrupt pin, using an
    /// `embassy-sync` blocking mutex.
    ///
    /// The bus is locked for exactly one exchange at a time. See
    /// [`blocking_mutex::Mutex`] for more details.
    pub struct EmbassyMutexMemCardDevice<'a, BUS, CS, INT, M> {
        bus: &'a blocking_mutex::Mutex<M, RefCell<BUS>>,
        cs: CS,
        int: INT,
    }

    impl<'a, BUS, CS, INT, M> EmbassyMutexMemCardDevice<'a, BUS, CS, INT, M> {
        /// Create a new `EmbassyMutexMemCardDevice`.
        pub fn new(bus: &'a blocking_mutex::Mutex<M, RefCell<BUS>>, cs: CS, int: INT) -> Self {
            Self { bus, cs, int }
        }
    }

    impl<BUS, CS, INT, M> MemCardDevice for EmbassyMutexMemCardDevice<'_, BUS, CS, INT, M>
    where
        BUS: SpiBus,
        CS: OutputPin,
        INT: OutputPin,
        M: blocking_mutex::raw::RawMutex,
    {
        fn exchange(&mut self, buf: &mut [u8]) -> Result<(), MemCardDeviceError> {
            self.bus.lock(|bus| {
                let mut bus = bus.borrow_mut();
                bus_exchange(&mut *bus, &mut self.cs, buf)
            })
        }

        fn set_interrupt(&mut self, state: PinState) -> Result<(), MemCardDeviceError> {
            self.int
                .set_state(state)
                .map_err(|_| MemCardDeviceError::Interrupt)
        }
    }
}

#[cfg(feature = "embassy-sync-06")]
pub use embassy_sync_06::*;

/// Perform one in-place exchange with CS asserted.
fn bus_exchange<BUS, CS>(bus: &mut BUS, cs: &mut CS, buf: &mut [u8]) -> Result<(), MemCardDeviceError>
where
    BUS: SpiBus,
    CS: OutputPin,
{
    cs.set_low().map_err(|_| MemCardDeviceError::Cs)?;

    let op_res = bus.transfer_in_place(buf);

    // On failure, it's important to still flush and deassert CS.
    let flush_res = bus.flush();
    let cs_res = cs.set_high();

    op_res.map_err(|_| MemCardDeviceError::Spi)?;
    flush_res.map_err(|_| MemCardDeviceError::Spi)?;
    cs_res.map_err(|_| MemCardDeviceError::Cs)?;

    Ok(())
}
