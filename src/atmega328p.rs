//! [`TwiPort`] for the ATmega328P TWI block.

use core::ptr;

use crate::port::{Control, Prescaler, TwiPort};

const TWBR: *mut u8 = 0x00b8 as *mut u8;
const TWSR: *mut u8 = 0x00b9 as *mut u8;
const TWDR: *mut u8 = 0x00bb as *mut u8;
const TWCR: *mut u8 = 0x00bc as *mut u8;

/// Memory-mapped TWI registers. Zero-sized; construct it once and hand it to
/// a [`Bridge`](crate::Bridge).
pub struct Atmega328p;

impl TwiPort for Atmega328p {
    fn set_control(&self, control: Control) {
        unsafe { ptr::write_volatile(TWCR, control.bits()) }
    }

    fn control(&self) -> Control {
        Control::from_bits_truncate(unsafe { ptr::read_volatile(TWCR) })
    }

    fn status(&self) -> u8 {
        unsafe { ptr::read_volatile(TWSR) }
    }

    fn read_data(&self) -> u8 {
        unsafe { ptr::read_volatile(TWDR) }
    }

    fn write_data(&self, byte: u8) {
        unsafe { ptr::write_volatile(TWDR, byte) }
    }

    fn set_bit_rate(&self, divider: u8, prescaler: Prescaler) {
        unsafe {
            ptr::write_volatile(TWBR, divider);
            ptr::write_volatile(TWSR, prescaler as u8);
        }
    }
}
