//! IEC serial bus between the C64 and the 1541.
//!
//! Three open-collector lines: ATN, CLK, DATA. Each participant pulls a
//! line low independently; a line reads high only when nobody pulls it.
//!
//! C64 side (CIA2 port A):
//!   Output: bit 3 = ATN OUT, bit 4 = CLK OUT, bit 5 = DATA OUT
//!           (1 = pull the line low, through inverting drivers)
//!   Input:  bit 6 = CLK IN, bit 7 = DATA IN (0 = line low)

use emu_core::{SaveState, StateError};
use serde::{Deserialize, Serialize};

const C64: usize = 0;
const DRIVE: usize = 1;

/// IEC serial bus with two participants: C64 and drive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IecBus {
    /// ATN pull-down: [c64, drive].
    atn_pulls: [bool; 2],
    clk_pulls: [bool; 2],
    data_pulls: [bool; 2],
}

impl IecBus {
    /// All lines released (high).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Release every line, as on power-on.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Drive the C64's pulls from the CIA2 port A output.
    pub fn set_c64_port(&mut self, pa: u8) {
        self.atn_pulls[C64] = pa & 0x08 != 0;
        self.clk_pulls[C64] = pa & 0x10 != 0;
        self.data_pulls[C64] = pa & 0x20 != 0;
    }

    /// CIA2 port A input bits 6/7 as seen by the C64. Other bits high.
    #[must_use]
    pub fn c64_pins(&self) -> u8 {
        let mut pins = 0x3F;
        if self.clk() {
            pins |= 0x40;
        }
        if self.data() {
            pins |= 0x80;
        }
        pins
    }

    pub fn set_drive_clk(&mut self, pull_low: bool) {
        self.clk_pulls[DRIVE] = pull_low;
    }

    pub fn set_drive_data(&mut self, pull_low: bool) {
        self.data_pulls[DRIVE] = pull_low;
    }

    /// Drop every pull the drive holds (drive removed or reset).
    pub fn release_drive(&mut self) {
        self.atn_pulls[DRIVE] = false;
        self.clk_pulls[DRIVE] = false;
        self.data_pulls[DRIVE] = false;
    }

    // --- Line state (true = high) ---

    #[must_use]
    pub fn atn(&self) -> bool {
        !self.atn_pulls.iter().any(|&p| p)
    }

    #[must_use]
    pub fn clk(&self) -> bool {
        !self.clk_pulls.iter().any(|&p| p)
    }

    #[must_use]
    pub fn data(&self) -> bool {
        !self.data_pulls.iter().any(|&p| p)
    }
}

impl SaveState for IecBus {
    type State = Self;

    fn save_state(&self) -> Self {
        self.clone()
    }

    fn load_state(&mut self, state: Self) -> Result<(), StateError> {
        *self = state;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_start_high() {
        let bus = IecBus::new();
        assert!(bus.atn());
        assert!(bus.clk());
        assert!(bus.data());
        assert_eq!(bus.c64_pins(), 0xFF);
    }

    #[test]
    fn c64_port_pulls_lines() {
        let mut bus = IecBus::new();
        bus.set_c64_port(0x08);
        assert!(!bus.atn());
        assert!(bus.clk());
        assert!(bus.data());

        bus.set_c64_port(0x30);
        assert!(bus.atn());
        assert!(!bus.clk());
        assert!(!bus.data());
        assert_eq!(bus.c64_pins(), 0x3F);
    }

    #[test]
    fn both_pull_low_still_low() {
        let mut bus = IecBus::new();
        bus.set_c64_port(0x10);
        bus.set_drive_clk(true);
        assert!(!bus.clk());
        // C64 lets go, drive still holds it
        bus.set_c64_port(0x00);
        assert!(!bus.clk());
        bus.set_drive_clk(false);
        assert!(bus.clk());
    }

    #[test]
    fn drive_data_shows_on_c64_pins() {
        let mut bus = IecBus::new();
        bus.set_drive_data(true);
        assert_eq!(bus.c64_pins() & 0xC0, 0x40);
        bus.release_drive();
        assert!(bus.data());
    }

    #[test]
    fn snapshot_restores_pulls() {
        let mut bus = IecBus::new();
        bus.set_c64_port(0x28);
        bus.set_drive_clk(true);
        let bytes = emu_core::encode(&bus.save_state()).expect("encodes");

        let mut restored = IecBus::new();
        restored
            .load_state(emu_core::decode(&bytes).expect("decodes"))
            .expect("load");
        assert!(!restored.atn());
        assert!(!restored.clk());
        assert!(!restored.data());
    }
}
