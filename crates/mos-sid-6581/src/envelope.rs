//! SID ADSR envelope generator.
//!
//! Each voice has an independent envelope generator with four phases:
//! Attack, Decay, Sustain, Release. A 15-bit rate counter sets the step
//! speed of each phase; decay and release additionally pass through an
//! exponential counter whose period changes at fixed level thresholds.

use emu_core::{SaveState, StateError};
use serde::{Deserialize, Serialize};

/// Rate counter periods (CPU cycles per step) for the 16 rate settings.
/// Attack 0 = 2 ms to full level, 15 = 8 s. Decay and release use the
/// same periods; the exponential counter stretches them by up to 30x.
const RATE_PERIODS: [u16; 16] = [
    9, 32, 63, 95, 149, 220, 267, 313, 392, 977, 1954, 3126, 3907, 11_720, 19_532, 31_251,
];

/// Sustain levels: 4-bit value x 17 gives 0x00..0xFF.
const SUSTAIN_LEVELS: [u8; 16] = [
    0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xAA, 0xBB, 0xCC, 0xDD, 0xEE,
    0xFF,
];

/// Envelope phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Attack,
    Decay,
    Sustain,
    Release,
}

/// ADSR envelope generator for one SID voice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Current envelope output level (0-255).
    pub level: u8,
    pub phase: Phase,
    rate_counter: u16,
    exp_counter: u8,
    exp_period: u8,
    /// Attack register (4-bit).
    pub attack: u8,
    /// Decay register (4-bit).
    pub decay: u8,
    /// Sustain register (4-bit).
    pub sustain: u8,
    /// Release register (4-bit).
    pub release: u8,
    prev_gate: bool,
}

impl Envelope {
    #[must_use]
    pub fn new() -> Self {
        Self {
            level: 0,
            phase: Phase::Release,
            rate_counter: 0,
            exp_counter: 0,
            exp_period: 1,
            attack: 0,
            decay: 0,
            sustain: 0,
            release: 0,
            prev_gate: false,
        }
    }

    /// Clock the envelope generator once per CPU cycle.
    ///
    /// `gate` is the gate bit of the voice control register. A rising
    /// edge restarts attack from the current level, so re-triggering a
    /// releasing note does not click down to zero first.
    pub fn clock(&mut self, gate: bool) {
        if gate && !self.prev_gate {
            self.phase = Phase::Attack;
        } else if !gate && self.prev_gate {
            self.phase = Phase::Release;
        }
        self.prev_gate = gate;

        let rate_period = match self.phase {
            Phase::Attack => RATE_PERIODS[self.attack as usize],
            Phase::Decay => RATE_PERIODS[self.decay as usize],
            Phase::Sustain => {
                // Lowering the sustain register mid-note resumes the decay.
                if self.level > SUSTAIN_LEVELS[self.sustain as usize] {
                    self.phase = Phase::Decay;
                }
                return;
            }
            Phase::Release => RATE_PERIODS[self.release as usize],
        };

        self.rate_counter = self.rate_counter.wrapping_add(1);
        if self.rate_counter < rate_period {
            return;
        }
        self.rate_counter = 0;

        match self.phase {
            Phase::Attack => {
                self.level = self.level.saturating_add(1);
                if self.level == 0xFF {
                    self.phase = Phase::Decay;
                }
                self.update_exp_period();
            }
            Phase::Decay => {
                if !self.exp_step() {
                    return;
                }
                let sustain_level = SUSTAIN_LEVELS[self.sustain as usize];
                if self.level > sustain_level {
                    self.level -= 1;
                    self.update_exp_period();
                }
                if self.level <= sustain_level {
                    self.phase = Phase::Sustain;
                }
            }
            Phase::Sustain => {}
            Phase::Release => {
                if self.exp_step() && self.level > 0 {
                    self.level -= 1;
                    self.update_exp_period();
                }
            }
        }
    }

    /// Advance the exponential counter; true when a level step is due.
    fn exp_step(&mut self) -> bool {
        self.exp_counter = self.exp_counter.wrapping_add(1);
        if self.exp_counter < self.exp_period {
            return false;
        }
        self.exp_counter = 0;
        true
    }

    /// Piecewise-exponential curve: the period lengthens as the level
    /// falls through $5D, $36, $1A, $0E and $06.
    fn update_exp_period(&mut self) {
        self.exp_period = match self.level {
            0x5E..=0xFF => 1,
            0x37..=0x5D => 2,
            0x1B..=0x36 => 4,
            0x0F..=0x1A => 8,
            0x07..=0x0E => 16,
            0x01..=0x06 => 30,
            0x00 => 1,
        };
    }
}

impl Default for Envelope {
    fn default() -> Self {
        Self::new()
    }
}

impl SaveState for Envelope {
    type State = Self;

    fn save_state(&self) -> Self {
        self.clone()
    }

    fn load_state(&mut self, state: Self) -> Result<(), StateError> {
        *self = Self {
            exp_period: state.exp_period.max(1),
            attack: state.attack & 0x0F,
            decay: state.decay & 0x0F,
            sustain: state.sustain & 0x0F,
            release: state.release & 0x0F,
            ..state
        };
        Ok(())
    }
}
