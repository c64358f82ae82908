use atomic::{Atomic, Ordering};

#[cfg(feature = "dump")]
use core::cell::{Ref, RefCell};
#[cfg(feature = "dump")]
use critical_section::{CriticalSection, Mutex};
#[cfg(feature = "dump")]
use heapless::Deque;

use crate::{Outcome, State};

/// Engine state and transaction outcome, readable from both contexts without
/// a critical section.
pub struct StateHolder<const HISTORY_SIZE: usize> {
    #[cfg(feature = "dump")]
    history: Mutex<RefCell<Deque<State, HISTORY_SIZE>>>,
    state: Atomic<State>,
    outcome: Atomic<Outcome>,
}

impl<const HISTORY_SIZE: usize> StateHolder<HISTORY_SIZE> {
    pub const fn new() -> Self {
        Self {
            #[cfg(feature = "dump")]
            history: Mutex::new(RefCell::new(Deque::new())),
            state: Atomic::new(State::Idle),
            outcome: Atomic::new(Outcome::Success),
        }
    }

    pub fn set_state(&self, state: State) {
        if self.get_state() == state {
            return;
        }

        #[cfg(feature = "dump")]
        self.add_state_in_history(state);
        self.state.store(state, Ordering::SeqCst);
    }

    pub fn get_state(&self) -> State {
        self.state.load(Ordering::SeqCst)
    }

    pub fn set_outcome(&self, outcome: Outcome) {
        self.outcome.store(outcome, Ordering::Release);
    }

    pub fn get_outcome(&self) -> Outcome {
        self.outcome.load(Ordering::Acquire)
    }

    #[cfg(feature = "dump")]
    pub fn get_history<'cs>(
        &'cs self,
        cs: CriticalSection<'cs>,
    ) -> Ref<'cs, Deque<State, HISTORY_SIZE>> {
        self.history.borrow_ref(cs)
    }

    #[cfg(feature = "dump")]
    fn add_state_in_history(&self, state: State) {
        critical_section::with(|cs| {
            let mut h = self.history.borrow_ref_mut(cs);
            if h.is_full() {
                h.pop_front();
            }
            let _ = h.push_back(state);
        });
    }
}
