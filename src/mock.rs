//! Register file stand-in for host tests.

use core::cell::RefCell;
use std::vec::Vec;

use critical_section::Mutex;

use crate::port::{Control, Prescaler, TwiPort};

/// One register write as seen by the peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusOp {
    Control(Control),
    Data(u8),
    BitRate(u8, Prescaler),
}

struct Registers {
    control: Control,
    status: u8,
    data: u8,
    ops: Vec<BusOp>,
}

pub struct MockPort {
    regs: Mutex<RefCell<Registers>>,
}

impl MockPort {
    pub fn new() -> Self {
        Self {
            regs: Mutex::new(RefCell::new(Registers {
                control: Control::empty(),
                status: crate::BusStatus::NoInformation as u8,
                data: 0,
                ops: Vec::new(),
            })),
        }
    }

    pub fn set_status(&self, status: u8) {
        critical_section::with(|cs| self.regs.borrow_ref_mut(cs).status = status);
    }

    /// Byte the "slave" shifts in before the next interrupt.
    pub fn set_incoming(&self, byte: u8) {
        critical_section::with(|cs| self.regs.borrow_ref_mut(cs).data = byte);
    }

    pub fn ops(&self) -> Vec<BusOp> {
        critical_section::with(|cs| self.regs.borrow_ref(cs).ops.clone())
    }

    pub fn controls(&self) -> Vec<Control> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                BusOp::Control(c) => Some(c),
                _ => None,
            })
            .collect()
    }

    pub fn data_writes(&self) -> Vec<u8> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                BusOp::Data(b) => Some(b),
                _ => None,
            })
            .collect()
    }

    pub fn clear_ops(&self) {
        critical_section::with(|cs| self.regs.borrow_ref_mut(cs).ops.clear());
    }
}

impl TwiPort for MockPort {
    fn set_control(&self, control: Control) {
        critical_section::with(|cs| {
            let mut regs = self.regs.borrow_ref_mut(cs);
            regs.control = control;
            regs.ops.push(BusOp::Control(control));
        });
    }

    fn control(&self) -> Control {
        critical_section::with(|cs| self.regs.borrow_ref(cs).control)
    }

    fn status(&self) -> u8 {
        critical_section::with(|cs| self.regs.borrow_ref(cs).status)
    }

    fn read_data(&self) -> u8 {
        critical_section::with(|cs| self.regs.borrow_ref(cs).data)
    }

    fn write_data(&self, byte: u8) {
        critical_section::with(|cs| {
            let mut regs = self.regs.borrow_ref_mut(cs);
            regs.data = byte;
            regs.ops.push(BusOp::Data(byte));
        });
    }

    fn set_bit_rate(&self, divider: u8, prescaler: Prescaler) {
        critical_section::with(|cs| {
            self.regs
                .borrow_ref_mut(cs)
                .ops
                .push(BusOp::BitRate(divider, prescaler))
        });
    }
}
