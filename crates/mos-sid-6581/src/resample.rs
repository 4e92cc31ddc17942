//! Cycle clock to host sample rate conversion.
//!
//! A fixed-point fractional accumulator: every SID cycle adds the output
//! rate, and a sample is due each time the sum passes the chip clock.
//! Integer arithmetic keeps the sample positions identical across runs
//! and snapshot restores.

use emu_core::{SaveState, StateError};

/// Decides on which cycles an output sample is taken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateConverter {
    clock_hz: u32,
    sample_rate: u32,
    accumulator: u32,
}

impl RateConverter {
    /// `clock_hz` is the chip clock (985 248 Hz PAL, 1 022 727 Hz NTSC).
    #[must_use]
    pub fn new(clock_hz: u32, sample_rate: u32) -> Self {
        Self {
            clock_hz: clock_hz.max(1),
            sample_rate: sample_rate.clamp(1, clock_hz.max(1)),
            accumulator: 0,
        }
    }

    /// Advance one cycle. Returns true when a sample is due.
    pub fn clock(&mut self) -> bool {
        self.accumulator += self.sample_rate;
        if self.accumulator >= self.clock_hz {
            self.accumulator -= self.clock_hz;
            true
        } else {
            false
        }
    }

    #[must_use]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    #[must_use]
    pub fn clock_hz(&self) -> u32 {
        self.clock_hz
    }
}

/// Only the phase accumulator is saved; both rates come from the machine.
impl SaveState for RateConverter {
    type State = u32;

    fn save_state(&self) -> u32 {
        self.accumulator
    }

    fn load_state(&mut self, accumulator: u32) -> Result<(), StateError> {
        if accumulator >= self.clock_hz {
            return Err(StateError::InvalidValue {
                field: "sid.resampler",
                value: u64::from(accumulator),
            });
        }
        self.accumulator = accumulator;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_second_yields_exact_sample_count() {
        let mut rc = RateConverter::new(985_248, 48_000);
        let samples = (0..985_248).filter(|_| rc.clock()).count();
        assert_eq!(samples, 48_000);
    }

    #[test]
    fn samples_are_evenly_spaced() {
        let mut rc = RateConverter::new(1_000_000, 250_000);
        let due: Vec<bool> = (0..8).map(|_| rc.clock()).collect();
        assert_eq!(due, [false, false, false, true, false, false, false, true]);
    }

    #[test]
    fn restored_phase_must_be_below_the_clock() {
        let mut rc = RateConverter::new(1_000_000, 250_000);
        rc.clock();
        let saved = rc.save_state();
        let mut other = RateConverter::new(1_000_000, 250_000);
        assert_eq!(other.load_state(saved), Ok(()));
        assert_eq!(other, rc);
        assert!(other.load_state(1_000_000).is_err());
    }
}
