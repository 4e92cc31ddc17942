//! Time base: tick counts and crystal frequency.

use std::time::Duration;

/// A count of clock ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Ticks(pub u64);

impl Ticks {
    pub const ZERO: Self = Self(0);

    #[must_use]
    pub const fn new(count: u64) -> Self {
        Self(count)
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl core::ops::Add for Ticks {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl core::ops::Sub for Ticks {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }
}

/// Crystal-derived clock rate of a system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MasterClock {
    /// Clock frequency in Hz (e.g. `985_248` for a PAL C64 CPU).
    pub frequency_hz: u64,
}

impl MasterClock {
    #[must_use]
    pub const fn new(frequency_hz: u64) -> Self {
        Self { frequency_hz }
    }

    /// Wall-clock time taken by `ticks` at this frequency.
    #[must_use]
    pub fn duration_of(&self, ticks: Ticks) -> Duration {
        let nanos = u128::from(ticks.get()) * 1_000_000_000 / u128::from(self.frequency_hz);
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pal_frame_duration() {
        let clock = MasterClock::new(985_248);
        let frame = clock.duration_of(Ticks::new(19_656));
        assert_eq!(frame.as_micros(), 19_950);
    }

    #[test]
    fn ticks_subtraction_saturates() {
        assert_eq!(Ticks::new(3) - Ticks::new(5), Ticks::ZERO);
    }
}
