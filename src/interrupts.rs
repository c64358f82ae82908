use critical_section::CriticalSection;

use super::{
    port::{BusStatus, Control, TwiPort, STATUS_MASK},
    I2CError, State,
};

/// What the interrupt handler needs from the shared state.
pub trait InterruptBridge {
    type Port: TwiPort;

    fn port(&self) -> &Self::Port;

    fn get_state(&self) -> State;

    fn set_state(&self, state: State);

    fn record_status(&self, status: u8);

    fn address(&self, cs: CriticalSection) -> u8;

    /// Sets the direction bit for the read phase of a combined transaction.
    fn switch_to_read(&self, cs: CriticalSection);

    fn pop_txbuf_byte(&self, cs: CriticalSection) -> Option<u8>;

    fn rxbuf_remaining(&self, cs: CriticalSection) -> usize;

    fn write_rxbuf_byte(&self, cs: CriticalSection, byte: u8) -> Result<(), ()>;

    /// Rewinds the transaction after arbitration loss. `false` once the retry
    /// budget is spent.
    fn restart(&self, cs: CriticalSection) -> bool;

    /// Publishes success. The caller still has to release the bus.
    fn complete(&self);

    /// Publishes the failure and leaves the peripheral enabled with interrupts
    /// off.
    fn fail(&self, error: I2CError, status: u8);
}

/// Arms the reception of the next byte. The ACK/NACK decision for a byte is
/// latched before it is clocked in, so the last byte is NACKed one interrupt
/// ahead.
fn arm_reception<B: InterruptBridge>(bridge: &B, cs: CriticalSection) {
    let control = if bridge.rxbuf_remaining(cs) > 1 {
        Control::ARMED | Control::ACK
    } else {
        Control::ARMED
    };

    bridge.port().set_control(control);
}

/// Advances the transaction by one protocol event. Call from the TWI
/// interrupt.
pub fn handle_interrupt<B: InterruptBridge>(bridge: &B) {
    let port = bridge.port();
    let raw = port.status();
    bridge.record_status(raw);

    let Ok(status) = BusStatus::try_from(raw & STATUS_MASK) else {
        return bridge.fail(I2CError::UnexpectedStatus, raw);
    };
    trace!("status {:?}", status);

    critical_section::with(|cs| match status {
        BusStatus::Start | BusStatus::RepeatedStart => {
            port.write_data(bridge.address(cs));
            port.set_control(Control::ARMED);
        }

        BusStatus::AddressWriteAck | BusStatus::DataSentAck => {
            if let Some(byte) = bridge.pop_txbuf_byte(cs) {
                bridge.set_state(State::Writing);
                port.write_data(byte);
                port.set_control(Control::ARMED);
            } else if bridge.rxbuf_remaining(cs) == 0 {
                bridge.complete();
                port.set_control(Control::STOP_RELEASED);
            } else {
                bridge.switch_to_read(cs);
                bridge.set_state(State::Starting);
                port.set_control(Control::START_ARMED);
            }
        }

        BusStatus::DataReceivedAck => {
            if bridge.write_rxbuf_byte(cs, port.read_data()).is_err() {
                return bridge.fail(I2CError::ReceiveOverrun, raw);
            }
            arm_reception(bridge, cs);
        }

        BusStatus::AddressReadAck => {
            bridge.set_state(State::Reading);
            arm_reception(bridge, cs);
        }

        BusStatus::DataReceivedNack => {
            if bridge.write_rxbuf_byte(cs, port.read_data()).is_err() {
                return bridge.fail(I2CError::ReceiveOverrun, raw);
            }
            bridge.complete();
            port.set_control(Control::STOP_RELEASED);
        }

        BusStatus::ArbitrationLost => {
            if bridge.restart(cs) {
                debug!("arbitration lost, restarting");
                bridge.set_state(State::Starting);
                port.set_control(Control::START_ARMED);
            } else {
                bridge.fail(I2CError::ArbitrationLoss, raw);
            }
        }

        BusStatus::AddressWriteNack | BusStatus::AddressReadNack => {
            bridge.fail(I2CError::AddressNack, raw)
        }
        BusStatus::DataSentNack => bridge.fail(I2CError::DataNack, raw),
        BusStatus::BusError => bridge.fail(I2CError::BusError, raw),
        BusStatus::NoInformation => bridge.fail(I2CError::UnexpectedStatus, raw),
    })
}

#[cfg(test)]
mod tests {
    use std::vec;
    use std::vec::Vec;

    use super::*;
    use crate::{
        master::MasterBridge,
        mock::{BusOp, MockPort},
        Bridge, Config, Outcome, Reason,
    };

    type TestBridge = Bridge<MockPort, 8, 8>;

    fn issue(bridge: &TestBridge, wire_address: u8, write: &[u8], read_len: usize) {
        critical_section::with(|cs| {
            bridge.configure(cs, &Config::default());
            bridge.begin(cs, wire_address, write, read_len).unwrap();
        });
        bridge.port().set_control(Control::START_ARMED);
    }

    fn fire(bridge: &TestBridge, status: u8) {
        bridge.port().set_status(status);
        handle_interrupt(bridge);
    }

    fn fire_rx(bridge: &TestBridge, status: u8, byte: u8) {
        bridge.port().set_incoming(byte);
        fire(bridge, status);
    }

    fn received(bridge: &TestBridge) -> Vec<u8> {
        let mut buf = [0u8; 8];
        let n = critical_section::with(|cs| bridge.received(cs, &mut buf)).unwrap();
        buf[..n].to_vec()
    }

    #[test]
    fn write_sends_address_then_bytes_then_stop() {
        let bridge = TestBridge::new(MockPort::new());
        issue(&bridge, 0xa0, &[0x01, 0x02, 0x03], 0);

        fire(&bridge, 0x08);
        fire(&bridge, 0x18);
        fire(&bridge, 0x28);
        fire(&bridge, 0x28);
        fire(&bridge, 0x28);

        assert_eq!(
            bridge.port().ops(),
            vec![
                BusOp::Control(Control::START_ARMED),
                BusOp::Data(0xa0),
                BusOp::Control(Control::ARMED),
                BusOp::Data(0x01),
                BusOp::Control(Control::ARMED),
                BusOp::Data(0x02),
                BusOp::Control(Control::ARMED),
                BusOp::Data(0x03),
                BusOp::Control(Control::ARMED),
                BusOp::Control(Control::STOP_RELEASED),
            ]
        );
        assert_eq!(bridge.outcome(), Outcome::Success);
        assert_eq!(bridge.get_state(), State::Idle);
    }

    #[test]
    fn read_acks_all_but_the_last_byte() {
        let bridge = TestBridge::new(MockPort::new());
        issue(&bridge, 0xa1, &[], 3);

        fire(&bridge, 0x08);
        fire(&bridge, 0x40);
        fire_rx(&bridge, 0x50, 0x11);
        fire_rx(&bridge, 0x50, 0x22);
        fire_rx(&bridge, 0x58, 0x33);

        assert_eq!(
            bridge.port().controls(),
            vec![
                Control::START_ARMED,
                Control::ARMED,
                Control::ARMED | Control::ACK,
                Control::ARMED | Control::ACK,
                Control::ARMED,
                Control::STOP_RELEASED,
            ]
        );
        assert_eq!(received(&bridge), [0x11, 0x22, 0x33]);
        assert_eq!(bridge.outcome(), Outcome::Success);
    }

    #[test]
    fn single_byte_read_is_nacked_right_away() {
        let bridge = TestBridge::new(MockPort::new());
        issue(&bridge, 0xa1, &[], 1);

        fire(&bridge, 0x08);
        fire(&bridge, 0x40);
        assert_eq!(bridge.port().control(), Control::ARMED);

        fire_rx(&bridge, 0x58, 0x5a);
        assert_eq!(received(&bridge), [0x5a]);
        assert_eq!(bridge.port().control(), Control::STOP_RELEASED);
    }

    #[test]
    fn write_read_uses_repeated_start_without_stop() {
        let bridge = TestBridge::new(MockPort::new());
        issue(&bridge, 0xa0, &[0x10], 2);

        fire(&bridge, 0x08);
        fire(&bridge, 0x18);
        fire(&bridge, 0x28);
        assert_eq!(bridge.port().control(), Control::START_ARMED);

        fire(&bridge, 0x10);
        fire(&bridge, 0x40);
        fire_rx(&bridge, 0x50, 0xaa);
        fire_rx(&bridge, 0x58, 0xbb);

        let ops = bridge.port().ops();
        let stops = ops
            .iter()
            .filter(|op| matches!(op, BusOp::Control(c) if c.contains(Control::STOP)))
            .count();
        assert_eq!(stops, 1);
        assert_eq!(ops.last(), Some(&BusOp::Control(Control::STOP_RELEASED)));
        assert_eq!(bridge.port().data_writes(), [0xa0, 0x10, 0xa1]);
        assert_eq!(received(&bridge), [0xaa, 0xbb]);
    }

    #[test]
    fn arbitration_loss_before_address_replays_the_transaction() {
        let bridge = TestBridge::new(MockPort::new());
        issue(&bridge, 0xa0, &[0x01, 0x02], 0);

        fire(&bridge, 0x08);
        fire(&bridge, 0x38);
        assert_eq!(bridge.port().control(), Control::START_ARMED);
        assert_eq!(bridge.get_state(), State::Starting);

        fire(&bridge, 0x08);
        fire(&bridge, 0x18);
        fire(&bridge, 0x28);
        fire(&bridge, 0x28);

        assert_eq!(bridge.port().data_writes(), [0xa0, 0xa0, 0x01, 0x02]);
        assert_eq!(bridge.outcome(), Outcome::Success);
    }

    #[test]
    fn arbitration_loss_mid_write_rewinds_the_cursor() {
        let bridge = TestBridge::new(MockPort::new());
        issue(&bridge, 0xa0, &[0x01, 0x02], 0);

        fire(&bridge, 0x08);
        fire(&bridge, 0x18);
        fire(&bridge, 0x38);
        fire(&bridge, 0x08);
        fire(&bridge, 0x18);
        fire(&bridge, 0x28);
        fire(&bridge, 0x28);

        assert_eq!(bridge.port().data_writes(), [0xa0, 0x01, 0xa0, 0x01, 0x02]);
        assert_eq!(bridge.outcome(), Outcome::Success);
    }

    #[test]
    fn arbitration_loss_in_read_phase_restores_write_direction() {
        let bridge = TestBridge::new(MockPort::new());
        issue(&bridge, 0xa0, &[0x10], 1);

        fire(&bridge, 0x08);
        fire(&bridge, 0x18);
        fire(&bridge, 0x28);
        fire(&bridge, 0x10);
        fire(&bridge, 0x38);
        fire(&bridge, 0x08);

        assert_eq!(bridge.port().data_writes(), [0xa0, 0x10, 0xa1, 0xa0]);
    }

    #[test]
    fn arbitration_loss_before_read_address_resends_sla_r() {
        let bridge = TestBridge::new(MockPort::new());
        issue(&bridge, 0xa1, &[], 2);

        fire(&bridge, 0x08);
        fire(&bridge, 0x38);
        assert_eq!(bridge.port().control(), Control::START_ARMED);

        fire(&bridge, 0x08);
        fire(&bridge, 0x40);
        fire_rx(&bridge, 0x50, 0x01);
        fire_rx(&bridge, 0x58, 0x02);

        assert_eq!(bridge.port().data_writes(), [0xa1, 0xa1]);
        assert_eq!(received(&bridge), [0x01, 0x02]);
        assert_eq!(bridge.outcome(), Outcome::Success);
    }

    #[test]
    fn retry_budget_turns_arbitration_loss_into_failure() {
        let bridge = TestBridge::new(MockPort::new());
        critical_section::with(|cs| {
            bridge.configure(cs, &Config::default().arbitration_retries(Some(1)));
            bridge.begin(cs, 0xa0, &[0x01], 0).unwrap();
        });
        bridge.port().set_control(Control::START_ARMED);

        fire(&bridge, 0x38);
        assert_eq!(bridge.outcome(), Outcome::Busy);
        fire(&bridge, 0x38);

        assert_eq!(bridge.outcome(), Outcome::Error);
        let err = critical_section::with(|cs| bridge.last_error(cs)).unwrap();
        assert_eq!(
            err.reason,
            Reason::I2C {
                error: I2CError::ArbitrationLoss,
                status: 0x38
            }
        );
    }

    #[test]
    fn address_nack_fails_and_leaves_peripheral_idle() {
        let bridge = TestBridge::new(MockPort::new());
        issue(&bridge, 0xa0, &[0x01], 0);

        fire(&bridge, 0x08);
        fire(&bridge, 0x20);

        assert_eq!(bridge.port().control(), Control::IDLE);
        assert_eq!(bridge.outcome(), Outcome::Error);
        assert_eq!(bridge.get_state(), State::Failed);
        let err = critical_section::with(|cs| bridge.last_error(cs)).unwrap();
        assert_eq!(err.status(), Some(0x20));
    }

    #[test]
    fn data_nack_is_not_retried() {
        let bridge = TestBridge::new(MockPort::new());
        issue(&bridge, 0xa0, &[0x01, 0x02], 0);

        fire(&bridge, 0x08);
        fire(&bridge, 0x18);
        fire(&bridge, 0x30);

        assert_eq!(bridge.port().data_writes(), [0xa0, 0x01]);
        assert_eq!(bridge.port().control(), Control::IDLE);
        let err = critical_section::with(|cs| bridge.last_error(cs)).unwrap();
        assert_eq!(
            err.reason,
            Reason::I2C {
                error: I2CError::DataNack,
                status: 0x30
            }
        );
    }

    #[test]
    fn unknown_status_keeps_raw_code() {
        let bridge = TestBridge::new(MockPort::new());
        issue(&bridge, 0xa0, &[0x01], 0);

        // 0x60 is a slave-receiver code, prescaler bits set
        fire(&bridge, 0x62);

        assert_eq!(bridge.port().control(), Control::IDLE);
        assert!(!bridge.port().control().contains(Control::INTERRUPT_ENABLE));
        assert!(bridge.port().control().contains(Control::ENABLE));
        let err = critical_section::with(|cs| bridge.last_error(cs)).unwrap();
        assert_eq!(
            err.reason,
            Reason::I2C {
                error: I2CError::UnexpectedStatus,
                status: 0x62
            }
        );
    }

    #[test]
    fn status_is_decoded_regardless_of_prescaler_bits() {
        let bridge = TestBridge::new(MockPort::new());
        issue(&bridge, 0xa0, &[], 0);

        fire(&bridge, 0x08 | 0x03);
        fire(&bridge, 0x18 | 0x01);

        assert_eq!(bridge.port().control(), Control::STOP_RELEASED);
        assert_eq!(bridge.outcome(), Outcome::Success);
    }

    #[test]
    fn bus_error_fails() {
        let bridge = TestBridge::new(MockPort::new());
        issue(&bridge, 0xa1, &[], 2);

        fire(&bridge, 0x08);
        fire(&bridge, 0x00);

        assert_eq!(bridge.outcome(), Outcome::Error);
        assert_eq!(bridge.port().control(), Control::IDLE);
    }

    #[cfg(feature = "dump")]
    #[test]
    fn failure_dump_carries_raw_status_history() {
        let bridge = TestBridge::new(MockPort::new());
        issue(&bridge, 0xa0, &[0x01], 0);

        fire(&bridge, 0x08);
        fire(&bridge, 0x18 | 0x02);
        fire(&bridge, 0x30);

        let err = critical_section::with(|cs| bridge.last_error(cs)).unwrap();
        let history = err.dump.status_history;
        let n = history.len();
        assert_eq!(history[n - 3..], [0x08, 0x1a, 0x30]);
        assert!(history[..n - 3].iter().all(|&code| code == 0xf8));
        assert_eq!(err.dump.current_state, State::Failed);
    }
}
