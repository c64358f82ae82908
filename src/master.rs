use critical_section::CriticalSection;

pub use crate::{Error, Outcome, Status};
use crate::{
    interrupts::InterruptBridge,
    port::{Control, TwiPort},
    Config, UsageError,
};

/// Foreground half of the shared state.
#[allow(async_fn_in_trait)]
pub trait MasterBridge: InterruptBridge {
    /// Drops any leftover transaction and applies `config`.
    fn configure(&self, cs: CriticalSection, config: &Config);

    /// Installs a new transaction. `address` is the wire byte, direction bit
    /// included. Must only be called while the bus is idle.
    fn begin(
        &self,
        cs: CriticalSection,
        address: u8,
        write: &[u8],
        read_len: usize,
    ) -> Result<(), Error>;

    fn usage_error(&self, error: UsageError) -> Error;

    fn outcome(&self) -> Outcome;

    fn last_error(&self, cs: CriticalSection) -> Option<Error>;

    fn received(&self, cs: CriticalSection, buf: &mut [u8]) -> Result<usize, usize>;

    async fn completion(&self) -> Result<(), Error>;
}

/// Issues transactions on a [`Bridge`](crate::Bridge) and reports their result.
///
/// Every call returns as soon as the START condition has been requested; the
/// transfer itself runs in [`handle_interrupt`](crate::handle_interrupt).
/// Only one transaction is in flight at a time. The blocking variants spin
/// until the previous one is done, the `try_` variants refuse instead.
pub struct TwiMaster<'d, B: MasterBridge> {
    bridge: &'d B,
}

impl<'d, B: MasterBridge> TwiMaster<'d, B> {
    /// Programs the bit rate, releases SDA and enables the peripheral with its
    /// interrupt disabled.
    pub fn new(bridge: &'d B, config: Config) -> Self {
        critical_section::with(|cs| bridge.configure(cs, &config));

        let port = bridge.port();
        port.set_bit_rate(config.divider, config.prescaler);
        port.write_data(0xff);
        port.set_control(Control::IDLE);

        Self { bridge }
    }

    /// `true` while the interrupt still expects bus events.
    pub fn is_busy(&self) -> bool {
        self.bridge
            .port()
            .control()
            .contains(Control::INTERRUPT_ENABLE)
    }

    /// Outcome of the last finished transaction.
    ///
    /// While a transaction is in flight this reports [`Status::Error`]; check
    /// [`is_busy`](Self::is_busy) first.
    pub fn status(&self) -> Status {
        match self.bridge.outcome() {
            Outcome::Success => Status::Success,
            Outcome::Busy | Outcome::Error => Status::Error,
        }
    }

    pub fn outcome(&self) -> Outcome {
        self.bridge.outcome()
    }

    /// Details of the last failed transaction, if the last one failed.
    pub fn last_error(&self) -> Option<Error> {
        critical_section::with(|cs| self.bridge.last_error(cs))
    }

    /// Copies the bytes read by the last transaction into `buf`. Fails with
    /// the number of received bytes if `buf` is too short.
    pub fn received(&self, buf: &mut [u8]) -> Result<usize, usize> {
        critical_section::with(|cs| self.bridge.received(cs, buf))
    }

    /// Resolves when the transaction in flight finishes. Each result is
    /// delivered once; starting a new transaction discards an unclaimed one.
    pub async fn wait(&self) -> Result<(), Error> {
        self.bridge.completion().await
    }

    pub fn write(&self, address: u8, data: &[u8]) -> Result<(), Error> {
        self.wait_idle();
        self.start(address, Direction::Write, data, 0)
    }

    pub fn read(&self, address: u8, len: usize) -> Result<(), Error> {
        self.wait_idle();
        self.start(address, Direction::Read, &[], len)
    }

    /// Writes `data`, then reads `len` bytes after a repeated START without
    /// releasing the bus. With `len == 0` this is a plain write.
    pub fn write_read(&self, address: u8, data: &[u8], len: usize) -> Result<(), Error> {
        self.wait_idle();
        self.start(address, Direction::Write, data, len)
    }

    pub fn try_write(&self, address: u8, data: &[u8]) -> Result<(), Error> {
        self.check_idle()?;
        self.start(address, Direction::Write, data, 0)
    }

    pub fn try_read(&self, address: u8, len: usize) -> Result<(), Error> {
        self.check_idle()?;
        self.start(address, Direction::Read, &[], len)
    }

    pub fn try_write_read(&self, address: u8, data: &[u8], len: usize) -> Result<(), Error> {
        self.check_idle()?;
        self.start(address, Direction::Write, data, len)
    }

    fn wait_idle(&self) {
        while self.is_busy() {
            core::hint::spin_loop();
        }
    }

    fn check_idle(&self) -> Result<(), Error> {
        if self.is_busy() {
            Err(self.bridge.usage_error(UsageError::Busy))
        } else {
            Ok(())
        }
    }

    fn start(
        &self,
        address: u8,
        direction: Direction,
        data: &[u8],
        len: usize,
    ) -> Result<(), Error> {
        if address > 0x7f {
            return Err(self.bridge.usage_error(UsageError::InvalidAddress(address)));
        }
        // SLA+R always clocks in at least one byte.
        if matches!(direction, Direction::Read) && len == 0 {
            return Err(self.bridge.usage_error(UsageError::ZeroLengthTransfer));
        }

        debug!(
            "{:?} {:#x}: write {}, read {}",
            direction,
            address,
            data.len(),
            len
        );

        let wire = address << 1 | direction as u8;
        critical_section::with(|cs| self.bridge.begin(cs, wire, data, len))?;

        self.bridge.port().set_control(Control::START_ARMED);
        Ok(())
    }
}

/// Value of the R/W bit in the address byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
enum Direction {
    Write = 0,
    Read = 1,
}
