//! Register-level view of the two-wire peripheral.
//!
//! The engine never touches hardware directly. Everything goes through a
//! [`TwiPort`], which mirrors the four registers of an AVR-style TWI block:
//! a control word, a status code, a shared data register and the bit-rate
//! generator.

use bitflags::bitflags;

bitflags! {
    /// Control register bits. Bit positions match the AVR `TWCR` layout.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Control: u8 {
        /// Writing one clears the interrupt flag and lets the hardware run
        /// the next bus action.
        const INTERRUPT_FLAG = 1 << 7;
        /// Acknowledge the next received byte.
        const ACK = 1 << 6;
        const START = 1 << 5;
        const STOP = 1 << 4;
        const ENABLE = 1 << 2;
        /// Set while the engine expects another interrupt.
        const INTERRUPT_ENABLE = 1 << 0;
    }
}

impl Control {
    /// Peripheral enabled, interrupts off, nothing requested.
    pub const IDLE: Self = Self::ENABLE;

    /// Clear the flag and wait for the next protocol event.
    pub const ARMED: Self = Self::INTERRUPT_FLAG
        .union(Self::ENABLE)
        .union(Self::INTERRUPT_ENABLE);

    /// Request a (repeated) START and wait for it.
    pub const START_ARMED: Self = Self::ARMED.union(Self::START);

    /// Request a STOP and stop expecting interrupts.
    pub const STOP_RELEASED: Self = Self::INTERRUPT_FLAG
        .union(Self::STOP)
        .union(Self::ENABLE);
}

/// Bit-rate prescaler, the two low bits of the status register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Prescaler {
    Div1 = 0,
    Div4 = 1,
    Div16 = 2,
    Div64 = 3,
}

impl Prescaler {
    pub const fn factor(self) -> u32 {
        match self {
            Prescaler::Div1 => 1,
            Prescaler::Div4 => 4,
            Prescaler::Div16 => 16,
            Prescaler::Div64 => 64,
        }
    }
}

/// Masks the prescaler bits out of the raw status register.
pub const STATUS_MASK: u8 = 0xf8;

/// Master-mode status codes reported after each protocol event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, num_enum::TryFromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum BusStatus {
    BusError = 0x00,
    Start = 0x08,
    RepeatedStart = 0x10,
    AddressWriteAck = 0x18,
    AddressWriteNack = 0x20,
    DataSentAck = 0x28,
    DataSentNack = 0x30,
    ArbitrationLost = 0x38,
    AddressReadAck = 0x40,
    AddressReadNack = 0x48,
    DataReceivedAck = 0x50,
    DataReceivedNack = 0x58,
    NoInformation = 0xf8,
}

/// Abstract hardware port.
///
/// Implementations must perform each call as a single register access; on
/// real hardware these are volatile reads and writes. The status register must
/// be valid at interrupt entry and stay stable until the next control write.
pub trait TwiPort {
    fn set_control(&self, control: Control);

    fn control(&self) -> Control;

    /// Raw status register, prescaler bits included.
    fn status(&self) -> u8;

    fn read_data(&self) -> u8;

    fn write_data(&self, byte: u8);

    fn set_bit_rate(&self, divider: u8, prescaler: Prescaler);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_words_match_twcr_encoding() {
        assert_eq!(Control::ARMED.bits(), 0x85);
        assert_eq!(Control::START_ARMED.bits(), 0xa5);
        assert_eq!(Control::STOP_RELEASED.bits(), 0x94);
        assert_eq!((Control::ARMED | Control::ACK).bits(), 0xc5);
        assert_eq!(Control::IDLE.bits(), 0x04);
    }

    #[test]
    fn status_decoding_ignores_unknown_codes() {
        assert_eq!(BusStatus::try_from(0x58).ok(), Some(BusStatus::DataReceivedNack));
        assert_eq!(BusStatus::try_from(0x38).ok(), Some(BusStatus::ArbitrationLost));
        assert!(BusStatus::try_from(0x60).is_err());
        assert!(BusStatus::try_from(0xa8).is_err());
    }
}
