use core::cell::RefCell;

use critical_section::{CriticalSection, Mutex};
use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, channel};
#[cfg(feature = "dump")]
use heapless::Deque;

use super::{
    interrupts::InterruptBridge,
    master::MasterBridge,
    port::{Control, TwiPort},
    receive_buffer::ReceiveBuffer,
    send_buffer::SendBuffer,
    state_holder::StateHolder,
    Config, Error, I2CError, Outcome, Reason, State, UsageError,
};

pub const STATES_HISTORY_SIZE: usize = 5;
#[cfg(feature = "dump")]
pub const STATUS_HISTORY_SIZE: usize = 8;

#[cfg(feature = "dump")]
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StateDump {
    pub state_history: [State; STATES_HISTORY_SIZE],
    pub current_state: State,
    /// Raw status codes, oldest first.
    pub status_history: [u8; STATUS_HISTORY_SIZE],
}

pub type CompletionChannel = channel::Channel<CriticalSectionRawMutex, Result<(), Error>, 1>;

/// Target address and cursors of the transaction in flight.
struct Transaction<const TXBUFSIZE: usize, const RXBUFSIZE: usize> {
    /// Wire address, direction bit included.
    address: u8,
    /// Address as issued, restored when arbitration forces a restart.
    initial_address: u8,
    send_buffer: SendBuffer<TXBUFSIZE>,
    receive_buffer: ReceiveBuffer<RXBUFSIZE>,
    retries: u8,
    retry_limit: Option<u8>,
}

impl<const TXBUFSIZE: usize, const RXBUFSIZE: usize> Transaction<TXBUFSIZE, RXBUFSIZE> {
    const fn new() -> Self {
        Self {
            address: 0,
            initial_address: 0,
            send_buffer: SendBuffer::new(),
            receive_buffer: ReceiveBuffer::new(),
            retries: 0,
            retry_limit: None,
        }
    }
}

/// State shared between the foreground master and the interrupt handler.
///
/// One instance per peripheral, normally a `static`. `TXBUFSIZE` and
/// `RXBUFSIZE` bound the write and read phases of a single transaction.
pub struct Bridge<P: TwiPort, const TXBUFSIZE: usize, const RXBUFSIZE: usize> {
    port: P,
    channel: CompletionChannel,

    transaction: Mutex<RefCell<Transaction<TXBUFSIZE, RXBUFSIZE>>>,
    last_error: Mutex<RefCell<Option<Error>>>,

    state_holder: StateHolder<STATES_HISTORY_SIZE>,
    #[cfg(feature = "dump")]
    status_history: Mutex<RefCell<Deque<u8, STATUS_HISTORY_SIZE>>>,
}

#[cfg(feature = "dump")]
fn deque_into_array<T: Copy, const N: usize>(d: &Deque<T, N>, arr: &mut [T; N]) {
    let n = d.len();
    let (a, b) = d.as_slices();
    let s = N - n;

    arr[s..s + a.len()].copy_from_slice(a);
    arr[s + a.len()..].copy_from_slice(b);
}

impl<P: TwiPort, const TXBUFSIZE: usize, const RXBUFSIZE: usize> Bridge<P, TXBUFSIZE, RXBUFSIZE> {
    pub const fn new(port: P) -> Self {
        Self {
            port,
            channel: CompletionChannel::new(),
            transaction: Mutex::new(RefCell::new(Transaction::new())),
            last_error: Mutex::new(RefCell::new(None)),
            state_holder: StateHolder::new(),
            #[cfg(feature = "dump")]
            status_history: Mutex::new(RefCell::new(Deque::new())),
        }
    }

    fn make_error(&self, reason: Reason) -> Error {
        Error {
            #[cfg(feature = "dump")]
            dump: self.dump_state(),
            reason,
        }
    }

    fn send_channel(&self, result: Result<(), Error>) {
        if self.channel.try_send(result).is_err() {
            warn!("completion channel full, result dropped");
        }
    }

    #[cfg(feature = "dump")]
    pub fn dump_state(&self) -> StateDump {
        let mut states = [State::Idle; STATES_HISTORY_SIZE];
        let mut codes = [crate::BusStatus::NoInformation as u8; STATUS_HISTORY_SIZE];

        critical_section::with(|cs| {
            let states_deque = self.state_holder.get_history(cs);
            deque_into_array(&states_deque, &mut states);

            let codes_deque = self.status_history.borrow_ref(cs);
            deque_into_array(&codes_deque, &mut codes);
        });

        StateDump {
            state_history: states,
            current_state: self.get_state(),
            status_history: codes,
        }
    }
}

impl<P: TwiPort, const TXBUFSIZE: usize, const RXBUFSIZE: usize> InterruptBridge
    for Bridge<P, TXBUFSIZE, RXBUFSIZE>
{
    type Port = P;

    fn port(&self) -> &P {
        &self.port
    }

    fn get_state(&self) -> State {
        self.state_holder.get_state()
    }

    fn set_state(&self, state: State) {
        trace!("state {:?}", state);
        self.state_holder.set_state(state)
    }

    #[cfg_attr(not(feature = "dump"), allow(unused_variables))]
    fn record_status(&self, status: u8) {
        #[cfg(feature = "dump")]
        critical_section::with(|cs| {
            let mut h = self.status_history.borrow_ref_mut(cs);
            if h.is_full() {
                h.pop_front();
            }
            let _ = h.push_back(status);
        });
    }

    fn address(&self, cs: CriticalSection) -> u8 {
        self.transaction.borrow_ref(cs).address
    }

    fn switch_to_read(&self, cs: CriticalSection) {
        self.transaction.borrow_ref_mut(cs).address |= 0x01;
    }

    fn pop_txbuf_byte(&self, cs: CriticalSection) -> Option<u8> {
        self.transaction.borrow_ref_mut(cs).send_buffer.next()
    }

    fn rxbuf_remaining(&self, cs: CriticalSection) -> usize {
        self.transaction.borrow_ref(cs).receive_buffer.remaining()
    }

    fn write_rxbuf_byte(&self, cs: CriticalSection, byte: u8) -> Result<(), ()> {
        self.transaction
            .borrow_ref_mut(cs)
            .receive_buffer
            .write_byte(byte)
    }

    fn restart(&self, cs: CriticalSection) -> bool {
        let mut t = self.transaction.borrow_ref_mut(cs);

        if let Some(limit) = t.retry_limit {
            if t.retries >= limit {
                return false;
            }
        }

        t.retries = t.retries.saturating_add(1);
        t.address = t.initial_address;
        t.send_buffer.rewind();
        t.receive_buffer.reset();
        true
    }

    fn complete(&self) {
        self.state_holder.set_outcome(Outcome::Success);
        self.set_state(State::Idle);
        self.send_channel(Ok(()));
    }

    fn fail(&self, error: I2CError, status: u8) {
        warn!("transaction failed: {:?}, status {:#x}", error, status);

        self.set_state(State::Failed);
        let err = self.make_error(Reason::I2C { error, status });

        critical_section::with(|cs| self.last_error.borrow(cs).replace(Some(err)));
        self.state_holder.set_outcome(Outcome::Error);
        self.port.set_control(Control::IDLE);

        self.send_channel(Err(err));
    }
}

impl<P: TwiPort, const TXBUFSIZE: usize, const RXBUFSIZE: usize> MasterBridge
    for Bridge<P, TXBUFSIZE, RXBUFSIZE>
{
    fn configure(&self, cs: CriticalSection, config: &Config) {
        let mut t = self.transaction.borrow_ref_mut(cs);
        t.send_buffer.reset();
        t.receive_buffer.clear();
        t.retries = 0;
        t.retry_limit = config.arbitration_retries;
    }

    fn begin(
        &self,
        cs: CriticalSection,
        address: u8,
        write: &[u8],
        read_len: usize,
    ) -> Result<(), Error> {
        let mut t = self.transaction.borrow_ref_mut(cs);

        if let Err(capacity) = t.send_buffer.load(write) {
            return Err(self.usage_error(UsageError::BufferTooSmall {
                requested: write.len(),
                capacity,
            }));
        }
        if let Err(capacity) = t.receive_buffer.expect(read_len) {
            t.send_buffer.reset();
            return Err(self.usage_error(UsageError::BufferTooSmall {
                requested: read_len,
                capacity,
            }));
        }

        t.address = address;
        t.initial_address = address;
        t.retries = 0;
        drop(t);

        // A result nobody waited for belongs to the previous transaction.
        while self.channel.try_receive().is_ok() {}
        self.last_error.borrow(cs).replace(None);

        self.state_holder.set_outcome(Outcome::Busy);
        self.set_state(State::Starting);
        Ok(())
    }

    fn usage_error(&self, error: UsageError) -> Error {
        self.make_error(Reason::Usage(error))
    }

    fn outcome(&self) -> Outcome {
        self.state_holder.get_outcome()
    }

    fn last_error(&self, cs: CriticalSection) -> Option<Error> {
        *self.last_error.borrow_ref(cs)
    }

    fn received(&self, cs: CriticalSection, buf: &mut [u8]) -> Result<usize, usize> {
        self.transaction.borrow_ref(cs).receive_buffer.read(buf)
    }

    async fn completion(&self) -> Result<(), Error> {
        self.channel.receive().await
    }
}
