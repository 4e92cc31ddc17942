//! 1541 drive bus: address decoding for the drive's internal 6502.
//!
//! Address map:
//!   $0000-$07FF: 2KB RAM (mirrored through $17FF)
//!   $1800-$180F: VIA1, IEC serial bus interface (mirrored in $1800-$1BFF)
//!   $1C00-$1C0F: VIA2, disk controller (mirrored in $1C00-$1FFF)
//!   $C000-$FFFF: 16KB ROM
//!
//! $2000-$BFFF is not decoded and reads back the high address byte.

use std::sync::Arc;

use emu_core::{Bus, SaveState, StateError, restore_block};
use serde::{Deserialize, Serialize};
use mos_via_6522::Via6522;

/// 1541 drive bus.
#[derive(Debug, Clone)]
pub struct Drive1541Bus {
    ram: Box<[u8; 2048]>,
    rom: Arc<[u8]>,
    /// VIA1: IEC serial bus interface.
    pub via1: Via6522,
    /// VIA2: disk controller.
    pub via2: Via6522,
}

impl Drive1541Bus {
    /// ROM size is checked by the caller.
    #[must_use]
    pub fn new(rom: Arc<[u8]>) -> Self {
        Self {
            ram: Box::new([0; 2048]),
            rom,
            via1: Via6522::new(),
            via2: Via6522::new(),
        }
    }

    #[must_use]
    pub fn rom(&self) -> &[u8] {
        &self.rom
    }

    #[must_use]
    pub fn ram(&self) -> &[u8] {
        &self.ram[..]
    }

    /// Read without side effects, for the disassembler.
    #[must_use]
    pub fn peek(&self, addr: u16) -> u8 {
        match addr {
            0x0000..=0x17FF => self.ram[usize::from(addr & 0x07FF)],
            0x1800..=0x1BFF => self.via1.peek((addr & 0x0F) as u8),
            0x1C00..=0x1FFF => self.via2.peek((addr & 0x0F) as u8),
            0xC000..=0xFFFF => self.rom[usize::from(addr - 0xC000)],
            _ => (addr >> 8) as u8,
        }
    }

    pub fn reset(&mut self) {
        self.via1.reset();
        self.via2.reset();
    }
}

impl Bus for Drive1541Bus {
    fn read(&mut self, addr: u16) -> u8 {
        match addr {
            0x1800..=0x1BFF => self.via1.read((addr & 0x0F) as u8),
            0x1C00..=0x1FFF => self.via2.read((addr & 0x0F) as u8),
            _ => self.peek(addr),
        }
    }

    fn write(&mut self, addr: u16, value: u8) {
        match addr {
            0x0000..=0x17FF => self.ram[usize::from(addr & 0x07FF)] = value,
            0x1800..=0x1BFF => self.via1.write((addr & 0x0F) as u8, value),
            0x1C00..=0x1FFF => self.via2.write((addr & 0x0F) as u8, value),
            _ => {}
        }
    }
}

/// Drive RAM and both VIAs. The DOS ROM is not saved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Drive1541BusState {
    ram: Vec<u8>,
    via1: Via6522,
    via2: Via6522,
}

impl SaveState for Drive1541Bus {
    type State = Drive1541BusState;

    fn save_state(&self) -> Drive1541BusState {
        Drive1541BusState {
            ram: self.ram.to_vec(),
            via1: self.via1.save_state(),
            via2: self.via2.save_state(),
        }
    }

    fn load_state(&mut self, state: Drive1541BusState) -> Result<(), StateError> {
        restore_block("drive.ram", &state.ram, &mut self.ram[..])?;
        self.via1.load_state(state.via1)?;
        self.via2.load_state(state.via2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_bus() -> Drive1541Bus {
        Drive1541Bus::new(vec![0xEA; 16384].into())
    }

    #[test]
    fn ram_mirrors() {
        let mut bus = make_bus();
        bus.write(0x0100, 0xCD);
        assert_eq!(bus.read(0x0100), 0xCD);
        assert_eq!(bus.read(0x0900), 0xCD);
        assert_eq!(bus.read(0x1100), 0xCD);
    }

    #[test]
    fn rom_read_only() {
        let mut rom = vec![0; 16384];
        rom[0] = 0x42;
        rom[16383] = 0xFF;
        let mut bus = Drive1541Bus::new(rom.into());
        assert_eq!(bus.read(0xC000), 0x42);
        assert_eq!(bus.read(0xFFFF), 0xFF);
        bus.write(0xC000, 0x00);
        assert_eq!(bus.read(0xC000), 0x42);
    }

    #[test]
    fn via_registers_mirror() {
        let mut bus = make_bus();
        bus.write(0x1803, 0xAA);
        assert_eq!(bus.read(0x1803), 0xAA);
        assert_eq!(bus.read(0x1813), 0xAA);
        bus.write(0x1C03, 0x55);
        assert_eq!(bus.read(0x1FF3), 0x55);
        assert_eq!(bus.read(0x1803), 0xAA);
    }

    #[test]
    fn undecoded_space_reads_high_byte() {
        let mut bus = make_bus();
        assert_eq!(bus.read(0x4000), 0x40);
        bus.write(0x4000, 0x12);
        assert_eq!(bus.peek(0x4000), 0x40);
    }
}
