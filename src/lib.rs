#![cfg_attr(not(test), no_std)]

//! Interrupt-driven master for AVR-style two-wire (TWI/I2C) peripherals.
//!
//! A [`Bridge`] holds the state shared between the foreground [`TwiMaster`]
//! and the interrupt handler. Place it in a `static`, call
//! [`handle_interrupt`] from the TWI interrupt and issue transactions through
//! the master:
//!
//! ```ignore
//! static BUS: Bridge<Atmega328p, 16, 16> = Bridge::new(Atmega328p);
//!
//! #[avr_device::interrupt(atmega328p)]
//! fn TWI() {
//!     twi_async_master::handle_interrupt(&BUS);
//! }
//!
//! let twi = TwiMaster::new(&BUS, Config::default());
//! twi.write_read(0x50, &[0x00], 2)?;
//! while twi.is_busy() {}
//! ```

#[macro_use]
mod fmt;

mod bridge;
mod config;
mod interrupts;
mod master;
mod port;
mod receive_buffer;
mod send_buffer;
mod state_holder;

#[cfg(feature = "atmega328p")]
pub mod atmega328p;

#[cfg(test)]
mod mock;

pub use bridge::Bridge;
#[cfg(feature = "dump")]
pub use bridge::{StateDump, STATES_HISTORY_SIZE, STATUS_HISTORY_SIZE};
pub use config::Config;
pub use interrupts::{handle_interrupt, InterruptBridge};
pub use master::{MasterBridge, TwiMaster};
pub use port::{BusStatus, Control, Prescaler, TwiPort, STATUS_MASK};

/// Engine position, kept for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, bytemuck::NoUninit)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum State {
    Idle,
    /// START or repeated START requested, address not yet acknowledged.
    Starting,
    Writing,
    Reading,
    Failed,
}

/// Result of the current or last transaction as seen by the interrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, bytemuck::NoUninit)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Outcome {
    Busy,
    Success,
    Error,
}

/// Public two-valued result. Only meaningful once the bus is idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Status {
    Success,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum I2CError {
    /// No ACK for SLA+W or SLA+R.
    AddressNack,
    /// No ACK for a transmitted data byte.
    DataNack,
    BusError,
    /// Retry budget for arbitration loss used up.
    ArbitrationLoss,
    /// More bytes arrived than the read phase asked for.
    ReceiveOverrun,
    /// Status code outside the master-mode table.
    UnexpectedStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UsageError {
    /// A transaction is still in flight.
    Busy,
    /// Not a 7-bit address.
    InvalidAddress(u8),
    ZeroLengthTransfer,
    BufferTooSmall { requested: usize, capacity: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Reason {
    /// Failure reported by the bus; `status` is the raw status register.
    I2C { error: I2CError, status: u8 },
    /// Request refused before any bus activity.
    Usage(UsageError),
}

#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Error {
    #[cfg(feature = "dump")]
    pub dump: StateDump,
    pub reason: Reason,
}

impl Error {
    /// Raw status register captured when the bus failed.
    pub fn status(&self) -> Option<u8> {
        match self.reason {
            Reason::I2C { status, .. } => Some(status),
            Reason::Usage(_) => None,
        }
    }
}
