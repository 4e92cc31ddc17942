//! SID voice: oscillator and waveform generation.
//!
//! Each of the three SID voices has a 24-bit phase accumulator clocked at
//! the CPU rate, four selectable waveforms, ring modulation, hard sync,
//! and a test bit that holds the oscillator at zero.

use emu_core::{SaveState, StateError};
use serde::{Deserialize, Serialize};

/// Noise LFSR seed value (matches real 6581 power-on state).
const NOISE_LFSR_SEED: u32 = 0x7F_FFFF;

/// Control register bits.
pub const GATE: u8 = 0x01;
pub const SYNC: u8 = 0x02;
pub const RING: u8 = 0x04;
pub const TEST: u8 = 0x08;

/// A single SID voice oscillator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voice {
    /// 24-bit phase accumulator.
    pub accumulator: u32,
    /// 16-bit frequency register (`freq_lo | freq_hi << 8`).
    pub frequency: u16,
    /// 12-bit pulse width register (`pw_lo | pw_hi << 8`).
    pub pulse_width: u16,
    /// Control register ($04/$0B/$12).
    pub control: u8,
    /// 23-bit noise LFSR.
    pub noise_lfsr: u32,
    /// Bit 19 of the accumulator before the last clock.
    prev_bit19: bool,
}

impl Voice {
    #[must_use]
    pub fn new() -> Self {
        Self {
            accumulator: 0,
            frequency: 0,
            pulse_width: 0,
            control: 0,
            noise_lfsr: NOISE_LFSR_SEED,
            prev_bit19: false,
        }
    }

    /// Step the phase accumulator by the frequency register.
    ///
    /// If the test bit is set, hold the accumulator at 0 and reset the
    /// noise LFSR.
    pub fn clock_accumulator(&mut self) {
        self.prev_bit19 = self.accumulator & (1 << 19) != 0;
        if self.control & TEST != 0 {
            self.accumulator = 0;
            self.noise_lfsr = NOISE_LFSR_SEED;
            return;
        }

        self.accumulator = self.accumulator.wrapping_add(u32::from(self.frequency)) & 0x00FF_FFFF;
    }

    /// Clock the noise LFSR when bit 19 of the accumulator has a rising edge.
    pub fn clock_noise(&mut self) {
        let bit19 = self.accumulator & (1 << 19) != 0;
        if bit19 && !self.prev_bit19 {
            // Feedback: bit 17 XOR bit 22
            let feedback = ((self.noise_lfsr >> 17) ^ (self.noise_lfsr >> 22)) & 1;
            self.noise_lfsr = ((self.noise_lfsr << 1) | feedback) & 0x7F_FFFF;
        }
    }

    /// Apply hard sync: if the sync source's MSB had a rising edge,
    /// reset this voice's accumulator.
    pub fn apply_sync(&mut self, source_prev_msb: bool, source_curr_msb: bool) {
        if self.control & SYNC != 0 && source_curr_msb && !source_prev_msb {
            self.accumulator = 0;
        }
    }

    /// Compute the 12-bit waveform output.
    ///
    /// `ring_mod_source_msb` is the MSB of the ring-modulation source voice's
    /// accumulator (voice 3 for voice 1, etc.). Selecting several waveforms
    /// ANDs their outputs together.
    #[must_use]
    pub fn waveform_output(&self, ring_mod_source_msb: bool) -> u16 {
        let waveform_bits = (self.control >> 4) & 0x0F;
        if waveform_bits == 0 {
            return 0;
        }

        let mut output: u16 = 0xFFF;

        // Triangle
        if waveform_bits & 0x01 != 0 {
            let mut tri = self.accumulator;
            if self.control & RING != 0 && ring_mod_source_msb {
                tri ^= 0x0080_0000;
            }
            // Fold: if MSB set, invert lower 23 bits
            let val = if tri & 0x0080_0000 != 0 {
                (tri ^ 0x007F_FFFF) >> 11
            } else {
                tri >> 11
            };
            output &= (val & 0xFFF) as u16;
        }

        // Sawtooth
        if waveform_bits & 0x02 != 0 {
            output &= ((self.accumulator >> 12) & 0xFFF) as u16;
        }

        // Pulse (test bit forces the output high)
        if waveform_bits & 0x04 != 0 {
            let acc12 = ((self.accumulator >> 12) & 0xFFF) as u16;
            let high = self.control & TEST != 0 || acc12 >= self.pulse_width & 0xFFF;
            output &= if high { 0xFFF } else { 0x000 };
        }

        // Noise: LFSR bits 20,18,14,11,9,5,2,0 become output bits 11..4
        if waveform_bits & 0x08 != 0 {
            let lfsr = self.noise_lfsr;
            let noise12 = (((lfsr >> 20) & 1) << 11)
                | (((lfsr >> 18) & 1) << 10)
                | (((lfsr >> 14) & 1) << 9)
                | (((lfsr >> 11) & 1) << 8)
                | (((lfsr >> 9) & 1) << 7)
                | (((lfsr >> 5) & 1) << 6)
                | (((lfsr >> 2) & 1) << 5)
                | ((lfsr & 1) << 4);
            output &= noise12 as u16;
        }

        output
    }

    /// MSB of the accumulator (bit 23).
    #[must_use]
    pub fn msb(&self) -> bool {
        self.accumulator & 0x0080_0000 != 0
    }

    #[must_use]
    pub fn gate(&self) -> bool {
        self.control & GATE != 0
    }
}

impl Default for Voice {
    fn default() -> Self {
        Self::new()
    }
}

impl SaveState for Voice {
    type State = Self;

    fn save_state(&self) -> Self {
        self.clone()
    }

    fn load_state(&mut self, state: Self) -> Result<(), StateError> {
        *self = Self {
            accumulator: state.accumulator & 0x00FF_FFFF,
            pulse_width: state.pulse_width & 0x0FFF,
            noise_lfsr: state.noise_lfsr & 0x7F_FFFF,
            ..state
        };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sawtooth_follows_accumulator_top_bits() {
        let mut voice = Voice::new();
        voice.control = 0x20;
        voice.accumulator = 0x00AB_C000;
        assert_eq!(voice.waveform_output(false), 0xABC);
    }

    #[test]
    fn pulse_compares_against_width() {
        let mut voice = Voice::new();
        voice.control = 0x40;
        voice.pulse_width = 0x800;
        voice.accumulator = 0x007F_F000;
        assert_eq!(voice.waveform_output(false), 0x000);
        voice.accumulator = 0x0080_0000;
        assert_eq!(voice.waveform_output(false), 0xFFF);
    }

    #[test]
    fn ring_modulation_flips_triangle() {
        let mut voice = Voice::new();
        voice.control = 0x10 | RING;
        voice.accumulator = 0x0010_0000;
        let plain = voice.waveform_output(false);
        let ringed = voice.waveform_output(true);
        assert_eq!(plain, 0x200);
        assert_eq!(ringed, 0xFFF - 0x200);
    }

    #[test]
    fn test_bit_holds_accumulator() {
        let mut voice = Voice::new();
        voice.frequency = 0x1000;
        voice.control = TEST;
        voice.clock_accumulator();
        assert_eq!(voice.accumulator, 0);
        voice.control = 0;
        voice.clock_accumulator();
        assert_eq!(voice.accumulator, 0x1000);
    }

    #[test]
    fn noise_clocks_on_bit19_rise() {
        let mut voice = Voice::new();
        voice.frequency = 0x8000;
        let seed = voice.noise_lfsr;
        for _ in 0..16 {
            voice.clock_accumulator();
            voice.clock_noise();
        }
        // 16 * $8000 = $80000: bit 19 has just risen once
        assert_ne!(voice.noise_lfsr, seed);
    }
}
