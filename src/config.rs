use fugit::HertzU32;

use crate::Prescaler;

/// Bus clock and retry settings applied by [`TwiMaster::new`](crate::TwiMaster::new).
///
/// SCL frequency is `cpu / (16 + 2 * divider * prescaler)`.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    /// Bit-rate register value.
    pub divider: u8,
    pub prescaler: Prescaler,
    /// How often a transaction may restart after losing arbitration before it
    /// fails. `None` retries forever.
    pub arbitration_retries: Option<u8>,
}

impl Default for Config {
    /// 100 kHz on a 16 MHz core.
    fn default() -> Self {
        Self {
            divider: 72,
            prescaler: Prescaler::Div1,
            arbitration_retries: None,
        }
    }
}

impl Config {
    pub const fn new(divider: u8, prescaler: Prescaler) -> Self {
        Self {
            divider,
            prescaler,
            arbitration_retries: None,
        }
    }

    /// Picks the smallest prescaler whose divider fits for the requested SCL
    /// rate. The resulting rate never exceeds `scl`.
    ///
    /// # Panics
    ///
    /// If `scl` is faster than `cpu / 16` or too slow to reach even with the
    /// largest prescaler.
    pub fn from_frequency(cpu: HertzU32, scl: HertzU32) -> Self {
        let cpu = cpu.to_Hz();
        let scl = scl.to_Hz();

        assert!(scl > 0, "SCL frequency must not be zero");
        assert!(scl <= cpu / 16, "SCL frequency is too high for this core clock");

        // Round the period up so the bus never runs faster than asked.
        let periods = cpu.div_ceil(scl);
        let steps = (periods - 16).div_ceil(2);

        for prescaler in [
            Prescaler::Div1,
            Prescaler::Div4,
            Prescaler::Div16,
            Prescaler::Div64,
        ] {
            let divider = steps.div_ceil(prescaler.factor());
            if divider <= u8::MAX as u32 {
                return Self::new(divider as u8, prescaler);
            }
        }

        panic!("SCL frequency is too low for this core clock");
    }

    #[must_use]
    pub fn arbitration_retries(mut self, retries: Option<u8>) -> Self {
        self.arbitration_retries = retries;
        self
    }

    /// SCL frequency this configuration produces on a `cpu` clock.
    pub fn scl_frequency(&self, cpu: HertzU32) -> HertzU32 {
        let periods = 16 + 2 * self.divider as u32 * self.prescaler.factor();
        HertzU32::from_raw(cpu.to_Hz() / periods)
    }
}
