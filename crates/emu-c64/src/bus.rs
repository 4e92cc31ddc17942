//! C64 bus: memory and I/O routing.
//!
//! Implements `emu_core::Bus` for the 6510. Addresses go through the bank
//! configuration in [`C64Memory`]; when it answers I/O, the address is
//! decoded onto the chips:
//!
//!   $D000-$D3FF  VIC-II (64 registers, mirrored)
//!   $D400-$D7FF  SID (32 registers, mirrored)
//!   $D800-$DBFF  colour RAM (upper nybble open)
//!   $DC00-$DCFF  CIA1: keyboard, joysticks, IRQ
//!   $DD00-$DDFF  CIA2: VIC bank, IEC bus, NMI
//!   $DE00-$DFFF  cartridge I/O1/I/O2
//!
//! Unanswered reads return the last byte the VIC fetched.

use emu_core::{Bus, SaveState, StateError};
use mos_sid_6581::{Sid6581, SidModel, SidState};
use serde::{Deserialize, Serialize};

use crate::cartridge::Cartridge;
use crate::cia::{Cia, CiaState};
use crate::config::C64Model;
use crate::iec::IecBus;
use crate::input::{self, ControlPorts};
use crate::keyboard::KeyboardMatrix;
use crate::memory::{C64Memory, MemoryState};
use crate::vic::{Vic, VicState};

/// The C64 bus. Owns every chip the 6510 can address.
#[derive(Debug, Clone)]
pub struct C64Bus {
    pub memory: C64Memory,
    pub vic: Vic,
    pub sid: Sid6581,
    pub cia1: Cia,
    pub cia2: Cia,
    pub keyboard: KeyboardMatrix,
    pub ports: ControlPorts,
    pub iec: IecBus,
}

impl C64Bus {
    #[must_use]
    pub fn new(memory: C64Memory, model: C64Model, sid_model: SidModel, sample_rate: u32) -> Self {
        let cpu_freq = model.cpu_frequency();
        let tod_period = cpu_freq / model.mains_hz();
        let mut bus = Self {
            memory,
            vic: Vic::new(model),
            sid: Sid6581::new(sid_model, cpu_freq, sample_rate),
            cia1: Cia::new("cia1", tod_period),
            cia2: Cia::new("cia2", tod_period),
            keyboard: KeyboardMatrix::new(),
            ports: ControlPorts::default(),
            iec: IecBus::new(),
        };
        bus.update_pins();
        bus
    }

    /// Power-on reset of every chip on the bus. Held keys and joystick
    /// switches are the host's and stay as they are.
    pub fn reset(&mut self) {
        self.memory.reset();
        self.vic.reset();
        self.sid.reset();
        self.cia1.reset();
        self.cia2.reset();
        self.iec.reset();
        self.update_pins();
    }

    /// Propagate CIA outputs to everything wired to them: keyboard and
    /// joysticks on CIA1, VIC bank and IEC lines on CIA2, paddle select
    /// into the SID.
    pub fn update_pins(&mut self) {
        self.update_cia1_pins();
        let pa = self.cia2.port_a_output();
        self.vic.set_bank(!pa & 0x03);
        self.iec.set_c64_port(pa);
        self.cia2.pins_a = self.iec.c64_pins();
        let (x, y) = self.ports.selected_paddles(self.cia1.port_a_output());
        self.sid.set_paddles(x, y);
    }

    fn update_cia1_pins(&mut self) {
        let (pa, pb) = input::cia1_pins(
            self.cia1.port_a_output(),
            self.cia1.port_b_output(),
            &self.keyboard,
            &self.ports,
        );
        self.cia1.pins_a = pa;
        self.cia1.pins_b = pb;
    }

    /// IRQ line: VIC-II or CIA1.
    #[must_use]
    pub fn irq_line(&self) -> bool {
        self.vic.irq_active() || self.cia1.irq_active()
    }

    /// NMI line: CIA2, the RESTORE key or a cartridge freeze button.
    #[must_use]
    pub fn nmi_line(&self) -> bool {
        self.cia2.irq_active()
            || self.keyboard.restore()
            || self.memory.cartridge().is_some_and(|c| c.nmi_active())
    }

    /// Read as the CPU would, without side effects.
    #[must_use]
    pub fn peek(&self, addr: u16) -> u8 {
        if let Some(value) = self.memory.cpu_read(addr) {
            return value;
        }
        match addr {
            0xD000..=0xD3FF => self.vic.peek((addr & 0x3F) as u8),
            0xD400..=0xD7FF => self.sid.read((addr & 0x1F) as u8),
            0xD800..=0xDBFF => self.colour_read(addr),
            0xDC00..=0xDCFF => self.cia1.peek((addr & 0x0F) as u8),
            0xDD00..=0xDDFF => self.cia2.peek((addr & 0x0F) as u8),
            _ => self.open_read(addr, |cart| cart.peek_io(addr)),
        }
    }

    fn colour_read(&self, addr: u16) -> u8 {
        self.memory.colour_read(addr - 0xD800) | (self.vic.last_fetch() & 0xF0)
    }

    fn open_read(&self, addr: u16, io: impl FnOnce(&Cartridge) -> Option<u8>) -> u8 {
        let open = self.vic.last_fetch();
        if !(0xDE00..=0xDFFF).contains(&addr) {
            return open;
        }
        self.memory.cartridge().and_then(io).unwrap_or(open)
    }
}

impl Bus for C64Bus {
    fn read(&mut self, addr: u16) -> u8 {
        if let Some(value) = self.memory.cpu_read(addr) {
            return value;
        }
        match addr {
            0xD000..=0xD3FF => self.vic.read((addr & 0x3F) as u8),
            0xD400..=0xD7FF => self.sid.read((addr & 0x1F) as u8),
            0xD800..=0xDBFF => self.colour_read(addr),
            0xDC00..=0xDCFF => {
                self.update_cia1_pins();
                self.cia1.read((addr & 0x0F) as u8)
            }
            0xDD00..=0xDDFF => {
                self.cia2.pins_a = self.iec.c64_pins();
                self.cia2.read((addr & 0x0F) as u8)
            }
            0xDE00..=0xDFFF => {
                let open = self.vic.last_fetch();
                self.memory
                    .cartridge_mut()
                    .and_then(|cart| cart.read_io(addr))
                    .unwrap_or(open)
            }
            _ => self.vic.last_fetch(),
        }
    }

    fn write(&mut self, addr: u16, value: u8) {
        let io = (0xD000..=0xDFFF).contains(&addr) && self.memory.cpu_read(addr).is_none();
        if !io {
            self.memory.cpu_write(addr, value);
            return;
        }
        match addr {
            0xD000..=0xD3FF => self.vic.write((addr & 0x3F) as u8, value),
            0xD400..=0xD7FF => self.sid.write((addr & 0x1F) as u8, value),
            0xD800..=0xDBFF => self.memory.colour_write(addr - 0xD800, value),
            0xDC00..=0xDCFF => {
                self.cia1.write((addr & 0x0F) as u8, value);
                self.update_pins();
            }
            0xDD00..=0xDDFF => {
                self.cia2.write((addr & 0x0F) as u8, value);
                self.update_pins();
            }
            _ => {
                if let Some(cart) = self.memory.cartridge_mut() {
                    cart.write_io(addr, value);
                }
            }
        }
    }
}

/// Chip records in snapshot order: memory, VIC, SID, CIA1, CIA2, keyboard,
/// control ports, IEC.
/// Every chip on the C64 side of the bus, in snapshot order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct C64BusState {
    memory: MemoryState,
    vic: VicState,
    sid: SidState,
    cia1: CiaState,
    cia2: CiaState,
    keyboard: KeyboardMatrix,
    ports: ControlPorts,
    iec: IecBus,
}

impl SaveState for C64Bus {
    type State = C64BusState;

    fn save_state(&self) -> C64BusState {
        C64BusState {
            memory: self.memory.save_state(),
            vic: self.vic.save_state(),
            sid: self.sid.save_state(),
            cia1: self.cia1.save_state(),
            cia2: self.cia2.save_state(),
            keyboard: self.keyboard.save_state(),
            ports: self.ports.save_state(),
            iec: self.iec.save_state(),
        }
    }

    fn load_state(&mut self, state: C64BusState) -> Result<(), StateError> {
        self.memory.load_state(state.memory)?;
        self.vic.load_state(state.vic)?;
        self.sid.load_state(state.sid)?;
        self.cia1.load_state(state.cia1)?;
        self.cia2.load_state(state.cia2)?;
        self.keyboard.load_state(state.keyboard)?;
        self.ports.load_state(state.ports)?;
        self.iec.load_state(state.iec)?;
        self.update_pins();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{ControlPort, joy};
    use crate::keyboard::C64Key;

    fn make_bus() -> C64Bus {
        let kernal = vec![0xEE; 8192];
        let basic = vec![0xBB; 8192];
        let chargen = vec![0xCC; 4096];
        let memory = C64Memory::new(&basic, &kernal, &chargen);
        C64Bus::new(memory, C64Model::C64Pal, SidModel::Mos6581, 48_000)
    }

    #[test]
    fn ram_and_roms() {
        let mut bus = make_bus();
        bus.write(0x8000, 0xAB);
        assert_eq!(bus.read(0x8000), 0xAB);
        assert_eq!(bus.read(0xA000), 0xBB);
        assert_eq!(bus.read(0xE000), 0xEE);
        // Writes under ROM land in RAM
        bus.write(0xA000, 0x12);
        assert_eq!(bus.memory.ram_read(0xA000), 0x12);
    }

    #[test]
    fn vic_registers_mirror() {
        let mut bus = make_bus();
        bus.write(0xD020, 0x06);
        assert_eq!(bus.read(0xD020) & 0x0F, 0x06);
        assert_eq!(bus.read(0xD060) & 0x0F, 0x06);
    }

    #[test]
    fn colour_ram_low_nybble() {
        let mut bus = make_bus();
        bus.write(0xD800, 0xF5);
        assert_eq!(bus.read(0xD800) & 0x0F, 0x05);
    }

    #[test]
    fn io_switched_out_reads_char_rom() {
        let mut bus = make_bus();
        bus.write(0x0001, 0x33);
        assert_eq!(bus.read(0xD000), 0xCC);
        bus.write(0x0001, 0x34);
        bus.write(0xD020, 0x42);
        assert_eq!(bus.memory.ram_read(0xD020), 0x42);
    }

    #[test]
    fn cia2_selects_vic_bank() {
        let mut bus = make_bus();
        bus.write(0xDD02, 0x03);
        bus.write(0xDD00, 0x01);
        assert_eq!(bus.vic.bank(), 2);
    }

    #[test]
    fn keyboard_scan_through_cia1() {
        let mut bus = make_bus();
        bus.keyboard.set(C64Key::A, true);
        let (col, row) = C64Key::A.matrix();
        bus.write(0xDC02, 0xFF);
        bus.write(0xDC03, 0x00);
        bus.write(0xDC00, !(1 << col));
        assert_eq!(bus.read(0xDC01), !(1 << row));
        bus.write(0xDC00, 0xFF);
        assert_eq!(bus.read(0xDC01), 0xFF);
    }

    #[test]
    fn joystick_two_on_port_a() {
        let mut bus = make_bus();
        bus.ports.set_joystick(ControlPort::Two, joy::FIRE | joy::UP);
        assert_eq!(bus.read(0xDC00) & 0x1F, 0x1F & !(joy::FIRE | joy::UP));
    }

    #[test]
    fn iec_lines_follow_cia2() {
        let mut bus = make_bus();
        bus.write(0xDD02, 0x3F);
        bus.write(0xDD00, 0x08);
        assert!(!bus.iec.atn());
        // CLK out pulls CLK in low
        bus.write(0xDD00, 0x10);
        assert!(bus.iec.atn());
        assert_eq!(bus.read(0xDD00) & 0x40, 0);
    }

    #[test]
    fn interrupt_lines() {
        let mut bus = make_bus();
        assert!(!bus.irq_line());
        assert!(!bus.nmi_line());
        bus.keyboard.set_restore(true);
        assert!(bus.nmi_line());
    }

    #[test]
    fn unmapped_io_reads_open_bus() {
        let mut bus = make_bus();
        assert_eq!(bus.read(0xDE00), bus.vic.last_fetch());
        assert_eq!(bus.peek(0xDF00), bus.vic.last_fetch());
    }
}
