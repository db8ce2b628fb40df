//! The memory card protocol driver.
//!
//! Implements status polling, paged reads and writes and sector erase for a
//! memory card on an SPI bus with an extra interrupt line.
//!
//! This is currently optimised for readability and debugability, not
//! performance.

pub mod command;
pub mod memcard_device;
pub mod proto;

use core::cell::RefCell;

use embedded_hal::{delay::DelayNs, digital::PinState};

use command::CommandBuffer;
use memcard_device::{MemCardDevice, MemCardDeviceError};
use proto::*;

// ****************************************************************************
// Imports
// ****************************************************************************

use crate::{debug, trace, warn};

// ****************************************************************************
// Types and Implementations
// ****************************************************************************

/// Driver for a memory card on an SPI bus.
///
/// Built from a [`MemCardDevice`] implementation, which carries both the SPI
/// exchange and the interrupt line, and something that can delay.
///
/// The card must be acquired with [`MemCard::acquire`] before it can be read,
/// written or erased. Nothing acquires it implicitly.
///
/// All the APIs take `&self` - mutability is handled using an inner `RefCell`.
pub struct MemCard<DEV, DELAYER>
where
    DEV: MemCardDevice,
    DELAYER: DelayNs,
{
    inner: RefCell<MemCardInner<DEV, DELAYER>>,
}

impl<DEV, DELAYER> MemCard<DEV, DELAYER>
where
    DEV: MemCardDevice,
    DELAYER: DelayNs,
{
    /// Create a new memory card driver.
    ///
    /// The card will not be acquired at this time.
    ///
    /// Uses the default options.
    pub fn new(device: DEV, delayer: DELAYER) -> MemCard<DEV, DELAYER> {
        Self::new_with_options(device, delayer, AcquireOpts::default())
    }

    /// Create a new memory card driver with the given options.
    ///
    /// The card will not be acquired at this time.
    pub fn new_with_options(
        device: DEV,
        delayer: DELAYER,
        options: AcquireOpts,
    ) -> MemCard<DEV, DELAYER> {
        MemCard {
            inner: RefCell::new(MemCardInner {
                device,
                delayer,
                command: CommandBuffer::new(),
                state: CardState::Uninitialized,
                unlocked: false,
                options,
            }),
        }
    }

    /// Get a temporary borrow on the underlying device.
    ///
    /// The given closure will be called exactly once, and will be passed a
    /// mutable reference to the underlying device object.
    pub fn device<T, F>(&self, func: F) -> T
    where
        F: FnOnce(&mut DEV) -> T,
    {
        let mut inner = self.inner.borrow_mut();
        func(&mut inner.device)
    }

    /// Give back the device and the delayer.
    pub fn release(self) -> (DEV, DELAYER) {
        let inner = self.inner.into_inner();
        (inner.device, inner.delayer)
    }

    /// Where the card is in its start-up sequence.
    pub fn state(&self) -> CardState {
        self.inner.borrow().state
    }

    /// Poll the card until it reports ready.
    ///
    /// Sends the opening sequence with the interrupt line low, then clears
    /// and re-reads the status until the ready bit is set.
    pub fn acquire(&self) -> Result<(), Error> {
        let mut inner = self.inner.borrow_mut();
        inner.acquire()
    }

    /// Mark the card as requiring a reset.
    ///
    /// The next read, write or erase will fail until the card has been
    /// acquired again.
    pub fn mark_card_uninit(&self) {
        let mut inner = self.inner.borrow_mut();
        inner.state = CardState::Uninitialized;
        inner.unlocked = false;
    }

    /// Tell the driver the card has been acquired.
    ///
    /// This is here in case a previous instance of this object acquired the
    /// card and you know for certain the card remained powered up since.
    ///
    /// # Safety
    ///
    /// Only do this if the card has actually been polled to ready. Writing
    /// to a card which is not ready will cause data corruption.
    pub unsafe fn mark_card_as_init(&self) {
        let mut inner = self.inner.borrow_mut();
        inner.state = CardState::Ready;
    }

    /// Send the unlock read.
    ///
    /// [`MemCard::read_page`] does this by itself before the first read
    /// after [`MemCard::acquire`], so you only need this to control when it
    /// happens.
    pub fn unlock(&self) -> Result<(), Error> {
        let mut inner = self.inner.borrow_mut();
        inner.check_ready()?;
        inner.unlock()
    }

    /// Wake the card.
    pub fn wake(&self) -> Result<(), Error> {
        let mut inner = self.inner.borrow_mut();
        let inner = &mut *inner;
        inner.command.wake(&mut inner.device, &mut inner.delayer)
    }

    /// Enable the card's interrupt output.
    pub fn interrupt_enable(&self) -> Result<(), Error> {
        let mut inner = self.inner.borrow_mut();
        let inner = &mut *inner;
        inner
            .command
            .interrupt_enable(&mut inner.device, &mut inner.delayer)
    }

    /// Send the one byte write buffer command.
    pub fn write_buffer(&self) -> Result<(), Error> {
        let mut inner = self.inner.borrow_mut();
        let inner = &mut *inner;
        inner.check_ready()?;
        inner.command.write_buffer(&mut inner.device)
    }

    /// Read the card status byte.
    pub fn status(&self) -> Result<Status, Error> {
        let mut inner = self.inner.borrow_mut();
        let inner = &mut *inner;
        inner.command.status(&mut inner.device)
    }

    /// Fill `buffer` with the bytes starting at `address`.
    ///
    /// The buffer must hold between 1 and 512 bytes.
    pub fn read_page(&self, address: u32, buffer: &mut [u8]) -> Result<(), Error> {
        let mut inner = self.inner.borrow_mut();
        trace!("Read {} bytes @ {:#x}", buffer.len(), address);
        inner.read_page(address, buffer)
    }

    /// Program `data` at `address`.
    ///
    /// At most 128 bytes can be written at once. The target area must have
    /// been erased.
    pub fn write_page(&self, address: u32, data: &[u8]) -> Result<(), Error> {
        let mut inner = self.inner.borrow_mut();
        trace!("Writing {} bytes @ {:#x}", data.len(), address);
        inner.write_page(address, data)
    }

    /// Erase the sector containing `address`.
    ///
    /// No read-back is done to check the erase worked.
    pub fn erase_sector(&self, address: u32) -> Result<(), Error> {
        let mut inner = self.inner.borrow_mut();
        debug!("Erasing sector @ {:#x}", address);
        inner.erase_sector(address)
    }
}

/// Inner details for the memory card driver.
///
/// All the APIs required `&mut self`.
struct MemCardInner<DEV, DELAYER>
where
    DEV: MemCardDevice,
    DELAYER: DelayNs,
{
    device: DEV,
    delayer: DELAYER,
    command: CommandBuffer,
    state: CardState,
    unlocked: bool,
    options: AcquireOpts,
}

impl<DEV, DELAYER> MemCardInner<DEV, DELAYER>
where
    DEV: MemCardDevice,
    DELAYER: DelayNs,
{
    /// Drive the card from wherever it is to `Ready`, or to `Failed`.
    fn acquire(&mut self) -> Result<(), Error> {
        debug!("acquiring card with opts: {:?}", self.options);
        self.unlocked = false;
        self.state = CardState::ClearingStatus;
        let result = self.poll_until_ready();
        self.state = match result {
            Ok(()) => CardState::Ready,
            Err(_) => CardState::Failed,
        };
        result
    }

    fn poll_until_ready(&mut self) -> Result<(), Error> {
        self.device.set_interrupt(PinState::Low)?;
        self.command.opening(&mut self.device)?;
        let mut delay = Delay::new(self.options.acquire_retries);
        let mut _attempts: u32 = 0;
        loop {
            _attempts = _attempts.saturating_add(1);
            trace!("Clearing status, attempt: {}..", _attempts);
            self.command.clear_status(&mut self.device)?;
            let status = self.command.status(&mut self.device)?;
            if status.is_ready() {
                debug!("Card ready, status: {:#x}", status.0);
                break;
            }
            warn!("Card not ready ({:#x}), trying again..", status.0);
            delay.delay(&mut self.delayer, Error::DeviceNotReady)?;
        }
        Ok(())
    }

    /// Check the card has been acquired.
    fn check_ready(&self) -> Result<(), Error> {
        if self.state == CardState::Ready {
            Ok(())
        } else {
            Err(Error::BadState)
        }
    }

    fn unlock(&mut self) -> Result<(), Error> {
        debug!("Unlocking card");
        self.command
            .read(&mut self.device, UNLOCK_ADDRESS, UNLOCK_LEN)?;
        self.unlocked = true;
        Ok(())
    }

    fn read_page(&mut self, address: u32, buffer: &mut [u8]) -> Result<(), Error> {
        if buffer.is_empty() || buffer.len() > MAX_READ_LEN {
            return Err(Error::ReadSizeLimit(buffer.len()));
        }
        self.check_ready()?;
        if !self.unlocked {
            self.unlock()?;
        }
        let data = self
            .command
            .read(&mut self.device, address, buffer.len())?;
        buffer.copy_from_slice(data);
        Ok(())
    }

    fn write_page(&mut self, address: u32, data: &[u8]) -> Result<(), Error> {
        if data.len() > MAX_WRITE_LEN {
            return Err(Error::WriteSizeLimit(data.len()));
        }
        self.check_ready()?;
        self.device.set_interrupt(PinState::Low)?;
        self.wait_ready_not_busy()?;
        self.command.clear_status(&mut self.device)?;
        self.device.set_interrupt(PinState::High)?;
        let result = self.command.write(&mut self.device, address, data);
        self.delayer.delay_us(SETTLE_DELAY_US);
        result
    }

    fn erase_sector(&mut self, address: u32) -> Result<(), Error> {
        self.check_ready()?;
        self.command
            .erase(&mut self.device, &mut self.delayer, address)
    }

    /// Query the status until the card is ready and not busy, or we spin too
    /// many times and timeout.
    fn wait_ready_not_busy(&mut self) -> Result<(), Error> {
        let mut status = self.command.status(&mut self.device)?;
        let mut delay = Delay::new(self.options.ready_retries);
        while !status.is_ready_not_busy() {
            trace!("Waiting for card ready, status: {:#x}", status.0);
            delay.delay(&mut self.delayer, Error::DeviceNotReady)?;
            status = self.command.status(&mut self.device)?;
        }
        Ok(())
    }
}

/// Options for acquiring and driving the card.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Clone)]
pub struct AcquireOpts {
    /// How many times the status is cleared and re-read while acquiring,
    /// before giving up with `Err(Error::DeviceNotReady)`.
    ///
    /// Attempts are about 10us apart, plus the time taken on the bus.
    pub acquire_retries: u32,

    /// How many times the status is re-read waiting for the card to be ready
    /// and not busy before a write, before giving up with
    /// `Err(Error::DeviceNotReady)`.
    ///
    /// Attempts are about 10us apart, plus the time taken on the bus.
    pub ready_retries: u32,
}

impl Default for AcquireOpts {
    fn default() -> Self {
        AcquireOpts {
            acquire_retries: Delay::DEFAULT_ACQUIRE_RETRIES,
            ready_retries: Delay::DEFAULT_READY_RETRIES,
        }
    }
}

/// The start-up state of the card.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CardState {
    /// Not acquired yet, or marked as needing a reset.
    Uninitialized,
    /// Acquisition is clearing and polling the status.
    ClearingStatus,
    /// The card reported ready. Reads, writes and erases are allowed.
    Ready,
    /// Acquisition failed. Acquire again to retry.
    Failed,
}

/// The possible errors the driver can generate.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Error {
    /// We got an error from the SPI peripheral
    Transport,
    /// Couldn't set a GPIO pin
    Gpio,
    /// A read asked for this many bytes, but must be between 1 and 512
    ReadSizeLimit(usize),
    /// A write carried this many bytes, but at most 128 are allowed
    WriteSizeLimit(usize),
    /// The device header needs 38 bytes, we only had this many
    HeaderTooShort(usize),
    /// The device header declares this size in megabits, which is more than
    /// we support
    CapacityTooLarge(u16),
    /// The card did not report ready in time
    DeviceNotReady,
    /// Can't perform this operation with the card in this state
    BadState,
}

impl From<MemCardDeviceError> for Error {
    fn from(value: MemCardDeviceError) -> Error {
        match value {
            MemCardDeviceError::Interrupt | MemCardDeviceError::Cs => Error::Gpio,
            _ => Error::Transport,
        }
    }
}

/// This an object you can use to busy-wait with a timeout.
///
/// Will let you call `delay` up to `max_retries` times before `delay` returns
/// an error.
struct Delay {
    retries_left: u32,
}

impl Delay {
    /// The default number of status polls while acquiring.
    ///
    /// At ~10us each, plus the exchanges, this is well over 10ms.
    pub const DEFAULT_ACQUIRE_RETRIES: u32 = 1_000;

    /// The default number of status polls before a write.
    ///
    /// At ~10us each this is at least 500ms.
    pub const DEFAULT_READY_RETRIES: u32 = 50_000;

    /// Create a new Delay object with the given maximum number of retries.
    fn new(max_retries: u32) -> Delay {
        Delay {
            retries_left: max_retries,
        }
    }

    /// Wait for a while.
    ///
    /// Checks the retry counter first, and if we hit the max retry limit, the
    /// value `err` is returned. Otherwise we wait for 10us and then return
    /// `Ok(())`.
    fn delay<T>(&mut self, delayer: &mut T, err: Error) -> Result<(), Error>
    where
        T: DelayNs,
    {
        if self.retries_left == 0 {
            Err(err)
        } else {
            delayer.delay_us(10);
            self.retries_left -= 1;
            Ok(())
        }
    }
}

// ****************************************************************************
//
// End Of File
//
// ****************************************************************************
