//! C64 memory subsystem.
//!
//! 64K RAM with ROMs, I/O and cartridge windows overlaid by the PLA. The
//! overlay is chosen by five lines: LORAM, HIRAM and CHAREN from the 6510
//! port at $00/$01, and EXROM/GAME from the expansion port.
//!
//! | Config            | $8000 | $A000 | $D000    | $E000  |
//! |-------------------|-------|-------|----------|--------|
//! | HIRAM+LORAM       | RAM   | BASIC | I/O/CHAR | KERNAL |
//! | HIRAM only        | RAM   | RAM   | I/O/CHAR | KERNAL |
//! | LORAM only        | RAM   | RAM   | I/O/CHAR | RAM    |
//! | neither           | RAM   | RAM   | RAM      | RAM    |
//! | 8K cartridge      | ROML when HIRAM+LORAM             |
//! | 16K cartridge     | ROML when HIRAM+LORAM, ROMH when HIRAM |
//! | Ultimax           | ROML  | open  | I/O      | ROMH   |
//!
//! The VIC-II sees its own 16K bank and reads character ROM at
//! $1000-$1FFF in banks 0 and 2.

use std::sync::Arc;

use emu_core::{SaveState, StateError, restore_block};
use serde::{Deserialize, Serialize};

use crate::cartridge::Cartridge;

/// What answers a CPU access at a given address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Ram,
    Basic,
    Kernal,
    CharRom,
    Io,
    RomL,
    RomH,
    /// Nothing drives the bus (Ultimax holes).
    Open,
}

/// The five bank select lines. EXROM and GAME are pin levels
/// (`true` = high, no cartridge).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BankConfig {
    pub loram: bool,
    pub hiram: bool,
    pub charen: bool,
    pub game: bool,
    pub exrom: bool,
}

impl BankConfig {
    /// From the effective 6510 port value and the cartridge lines.
    #[must_use]
    pub const fn new(port: u8, game: bool, exrom: bool) -> Self {
        Self {
            loram: port & 0x01 != 0,
            hiram: port & 0x02 != 0,
            charen: port & 0x04 != 0,
            game,
            exrom,
        }
    }

    /// The lines packed as `EXROM GAME CHAREN HIRAM LORAM`.
    #[must_use]
    pub const fn bits(self) -> u8 {
        (self.exrom as u8) << 4
            | (self.game as u8) << 3
            | (self.charen as u8) << 2
            | (self.hiram as u8) << 1
            | self.loram as u8
    }

    #[must_use]
    pub const fn is_ultimax(self) -> bool {
        !self.game && self.exrom
    }

    /// Decode one address. Pure over the five lines and the address.
    #[must_use]
    pub const fn source(self, addr: u16) -> Source {
        if self.is_ultimax() {
            return match addr {
                0x0000..=0x0FFF => Source::Ram,
                0x8000..=0x9FFF => Source::RomL,
                0xD000..=0xDFFF => Source::Io,
                0xE000..=0xFFFF => Source::RomH,
                _ => Source::Open,
            };
        }

        let cartridge = !self.exrom;
        match addr {
            0x8000..=0x9FFF if cartridge && self.loram && self.hiram => Source::RomL,
            0xA000..=0xBFFF if cartridge && !self.game && self.hiram => Source::RomH,
            0xA000..=0xBFFF if self.loram && self.hiram => Source::Basic,
            0xD000..=0xDFFF if self.loram || self.hiram => {
                if self.charen {
                    Source::Io
                } else {
                    Source::CharRom
                }
            }
            0xE000..=0xFFFF if self.hiram => Source::Kernal,
            _ => Source::Ram,
        }
    }
}

/// Port bits read back from the outside world when configured as inputs:
/// pull-ups on the bank lines and the motor line, sense on bit 4.
const PORT_PULLUPS: u8 = 0x27;
const CASSETTE_SENSE: u8 = 0x10;
const CASSETTE_MOTOR: u8 = 0x20;

/// C64 memory: RAM, ROMs, colour RAM, the 6510 port and the cartridge.
#[derive(Debug, Clone)]
pub struct C64Memory {
    ram: Box<[u8; 0x10000]>,
    basic_rom: Arc<[u8]>,
    kernal_rom: Arc<[u8]>,
    char_rom: Arc<[u8]>,
    /// 4-bit colour RAM at $D800-$DBFF.
    colour_ram: [u8; 1024],
    port_ddr: u8,
    port_data: u8,
    /// A datasette button is held down (sense line low).
    play_pressed: bool,
    cartridge: Option<Cartridge>,
}

impl C64Memory {
    /// ROM sizes are checked by the caller.
    #[must_use]
    pub fn new(basic: &[u8], kernal: &[u8], chargen: &[u8]) -> Self {
        Self {
            ram: Box::new([0; 0x10000]),
            basic_rom: Arc::from(basic),
            kernal_rom: Arc::from(kernal),
            char_rom: Arc::from(chargen),
            colour_ram: [0; 1024],
            port_ddr: 0x2F,
            port_data: 0x37,
            play_pressed: false,
            cartridge: None,
        }
    }

    /// Swap in new ROM images. RAM is untouched.
    pub fn set_roms(&mut self, basic: &[u8], kernal: &[u8], chargen: &[u8]) {
        self.basic_rom = Arc::from(basic);
        self.kernal_rom = Arc::from(kernal);
        self.char_rom = Arc::from(chargen);
    }

    /// Power-on: RAM pattern, port defaults, cartridge lines reset.
    pub fn reset(&mut self) {
        // Power-up RAM holds alternating $00/$FF runs of 64 bytes.
        for (i, byte) in self.ram.iter_mut().enumerate() {
            *byte = if i & 0x40 == 0 { 0x00 } else { 0xFF };
        }
        self.colour_ram = [0; 1024];
        self.port_ddr = 0x2F;
        self.port_data = 0x37;
        if let Some(cart) = &mut self.cartridge {
            cart.reset();
        }
    }

    /// Port value seen by the PLA and read back at $01.
    #[must_use]
    pub fn effective_port(&self) -> u8 {
        let inputs = PORT_PULLUPS | if self.play_pressed { 0 } else { CASSETTE_SENSE };
        (self.port_data & self.port_ddr) | (inputs & !self.port_ddr)
    }

    #[must_use]
    pub fn bank_config(&self) -> BankConfig {
        let (game, exrom) = self
            .cartridge
            .as_ref()
            .map_or((true, true), |c| (c.game(), c.exrom()));
        BankConfig::new(self.effective_port(), game, exrom)
    }

    /// Datasette motor: driven by port bit 5, active low.
    #[must_use]
    pub fn cassette_motor_on(&self) -> bool {
        self.port_ddr & CASSETTE_MOTOR != 0 && self.port_data & CASSETTE_MOTOR == 0
    }

    pub fn set_play_pressed(&mut self, pressed: bool) {
        self.play_pressed = pressed;
    }

    /// CPU read of everything except I/O. Returns `None` for I/O and open
    /// addresses, which the bus resolves.
    #[must_use]
    pub fn cpu_read(&self, addr: u16) -> Option<u8> {
        match addr {
            0x0000 => return Some(self.port_ddr),
            0x0001 => return Some(self.effective_port()),
            _ => {}
        }
        let offset = |base: u16| usize::from(addr - base);
        match self.bank_config().source(addr) {
            Source::Ram => Some(self.ram[usize::from(addr)]),
            Source::Basic => Some(self.basic_rom[offset(0xA000)]),
            Source::Kernal => Some(self.kernal_rom[offset(0xE000)]),
            Source::CharRom => Some(self.char_rom[offset(0xD000)]),
            Source::RomL => Some(self.cartridge.as_ref().map_or(0xFF, |c| c.read_roml(addr & 0x1FFF))),
            Source::RomH => Some(self.cartridge.as_ref().map_or(0xFF, |c| c.read_romh(addr & 0x1FFF))),
            Source::Io | Source::Open => None,
        }
    }

    /// CPU write of everything except I/O.
    pub fn cpu_write(&mut self, addr: u16, value: u8) {
        match addr {
            0x0000 => {
                self.port_ddr = value;
                return;
            }
            0x0001 => {
                self.port_data = value;
                return;
            }
            _ => {}
        }
        let config = self.bank_config();
        match config.source(addr) {
            Source::Open | Source::Io => {}
            Source::RomL => {
                if let Some(cart) = &mut self.cartridge {
                    cart.write_roml(addr & 0x1FFF, value);
                }
                if !config.is_ultimax() {
                    self.ram[usize::from(addr)] = value;
                }
            }
            Source::RomH if config.is_ultimax() => {}
            _ => self.ram[usize::from(addr)] = value,
        }
    }

    /// 6510 port latches as `(ddr, data)`.
    #[must_use]
    pub fn port_registers(&self) -> (u8, u8) {
        (self.port_ddr, self.port_data)
    }

    /// VIC-II read within its 16K bank.
    #[must_use]
    pub fn vic_read(&self, vic_bank: u8, addr: u16) -> u8 {
        let addr = addr & 0x3FFF;
        if let Some(cart) = &self.cartridge {
            if !cart.game() && cart.exrom() && addr >= 0x3000 {
                return cart.read_romh(0x1000 | (addr & 0x0FFF));
            }
        }
        if vic_bank & 1 == 0 && (0x1000..0x2000).contains(&addr) {
            self.char_rom[usize::from(addr - 0x1000)]
        } else {
            self.ram[usize::from(vic_bank & 3) << 14 | usize::from(addr)]
        }
    }

    /// Colour RAM nybble (0-$3FF).
    #[must_use]
    pub fn colour_read(&self, offset: u16) -> u8 {
        self.colour_ram[usize::from(offset & 0x3FF)] & 0x0F
    }

    pub fn colour_write(&mut self, offset: u16, value: u8) {
        self.colour_ram[usize::from(offset & 0x3FF)] = value & 0x0F;
    }

    #[must_use]
    pub fn ram_read(&self, addr: u16) -> u8 {
        self.ram[usize::from(addr)]
    }

    /// Direct RAM write, bypassing banking.
    pub fn ram_write(&mut self, addr: u16, value: u8) {
        self.ram[usize::from(addr)] = value;
    }

    #[must_use]
    pub fn ram(&self) -> &[u8; 0x10000] {
        &self.ram
    }

    #[must_use]
    pub fn cartridge(&self) -> Option<&Cartridge> {
        self.cartridge.as_ref()
    }

    pub fn cartridge_mut(&mut self) -> Option<&mut Cartridge> {
        self.cartridge.as_mut()
    }

    pub fn set_cartridge(&mut self, cartridge: Option<Cartridge>) {
        self.cartridge = cartridge;
    }
}

/// RAM and the 6510 port. ROMs and the cartridge image are not saved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryState {
    ram: Vec<u8>,
    colour_ram: Vec<u8>,
    port_ddr: u8,
    port_data: u8,
    play_pressed: bool,
}

impl SaveState for C64Memory {
    type State = MemoryState;

    fn save_state(&self) -> MemoryState {
        MemoryState {
            ram: self.ram.to_vec(),
            colour_ram: self.colour_ram.to_vec(),
            port_ddr: self.port_ddr,
            port_data: self.port_data,
            play_pressed: self.play_pressed,
        }
    }

    fn load_state(&mut self, state: MemoryState) -> Result<(), StateError> {
        restore_block("memory.ram", &state.ram, &mut self.ram[..])?;
        restore_block("memory.colour_ram", &state.colour_ram, &mut self.colour_ram)?;
        self.port_ddr = state.port_ddr;
        self.port_data = state.port_data;
        self.play_pressed = state.play_pressed;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cartridge::{chip, crt_header, parse_crt};

    fn make_memory() -> C64Memory {
        let mut basic = vec![0xBA; 8192];
        basic[0] = 0xB0;
        let mut kernal = vec![0xE0; 8192];
        kernal[0x1FFF] = 0xEF;
        let mut chargen = vec![0xC0; 4096];
        chargen[0] = 0xC1;
        C64Memory::new(&basic, &kernal, &chargen)
    }

    const fn cfg(port: u8) -> BankConfig {
        BankConfig::new(port, true, true)
    }

    #[test]
    fn default_map_without_cartridge() {
        let c = cfg(0x07);
        assert_eq!(c.source(0x0800), Source::Ram);
        assert_eq!(c.source(0x8000), Source::Ram);
        assert_eq!(c.source(0xA000), Source::Basic);
        assert_eq!(c.source(0xC000), Source::Ram);
        assert_eq!(c.source(0xD000), Source::Io);
        assert_eq!(c.source(0xE000), Source::Kernal);
    }

    #[test]
    fn port_combinations() {
        assert_eq!(cfg(0x03).source(0xD000), Source::CharRom);
        assert_eq!(cfg(0x06).source(0xA000), Source::Ram);
        assert_eq!(cfg(0x06).source(0xE000), Source::Kernal);
        assert_eq!(cfg(0x05).source(0xD000), Source::Io);
        assert_eq!(cfg(0x05).source(0xE000), Source::Ram);
        assert_eq!(cfg(0x01).source(0xD000), Source::CharRom);
        for port in [0x00, 0x04] {
            for addr in [0xA000, 0xD000, 0xE000] {
                assert_eq!(cfg(port).source(addr), Source::Ram);
            }
        }
    }

    #[test]
    fn cartridge_modes() {
        let eight_k = BankConfig::new(0x07, true, false);
        assert_eq!(eight_k.source(0x8000), Source::RomL);
        assert_eq!(eight_k.source(0xA000), Source::Basic);
        assert_eq!(BankConfig::new(0x06, true, false).source(0x8000), Source::Ram);

        let sixteen_k = BankConfig::new(0x07, false, false);
        assert_eq!(sixteen_k.source(0x8000), Source::RomL);
        assert_eq!(sixteen_k.source(0xA000), Source::RomH);
        assert_eq!(BankConfig::new(0x06, false, false).source(0xA000), Source::RomH);

        let ultimax = BankConfig::new(0x00, false, true);
        assert!(ultimax.is_ultimax());
        assert_eq!(ultimax.source(0x0FFF), Source::Ram);
        assert_eq!(ultimax.source(0x1000), Source::Open);
        assert_eq!(ultimax.source(0x8000), Source::RomL);
        assert_eq!(ultimax.source(0xA000), Source::Open);
        assert_eq!(ultimax.source(0xD000), Source::Io);
        assert_eq!(ultimax.source(0xFFFC), Source::RomH);
    }

    #[test]
    fn rom_reads_follow_port() {
        let mut mem = make_memory();
        assert_eq!(mem.cpu_read(0xA000), Some(0xB0));
        assert_eq!(mem.cpu_read(0xFFFF), Some(0xEF));
        assert_eq!(mem.cpu_read(0xD000), None);

        mem.cpu_write(0xA000, 0x11);
        assert_eq!(mem.cpu_read(0xA000), Some(0xB0), "ROM shadows the write");
        mem.cpu_write(0x0001, 0x36);
        assert_eq!(mem.cpu_read(0xA000), Some(0x11));

        mem.cpu_write(0x0001, 0x33);
        assert_eq!(mem.cpu_read(0xD000), Some(0xC1));
    }

    #[test]
    fn port_inputs_float_high() {
        let mut mem = make_memory();
        mem.cpu_write(0x0000, 0x00);
        mem.cpu_write(0x0001, 0x00);
        assert_eq!(mem.cpu_read(0x0001), Some(0x37));
        mem.set_play_pressed(true);
        assert_eq!(mem.cpu_read(0x0001), Some(0x27));
    }

    #[test]
    fn cassette_motor_is_active_low() {
        let mut mem = make_memory();
        assert!(!mem.cassette_motor_on());
        mem.cpu_write(0x0001, 0x17);
        assert!(mem.cassette_motor_on());
    }

    #[test]
    fn vic_sees_char_rom_in_banks_0_and_2() {
        let mut mem = make_memory();
        mem.ram_write(0x1000, 0x55);
        mem.ram_write(0x5000, 0x66);
        assert_eq!(mem.vic_read(0, 0x1000), 0xC1);
        assert_eq!(mem.vic_read(2, 0x1000), 0xC1);
        assert_eq!(mem.vic_read(1, 0x1000), 0x66);
        mem.ram_write(0xC123, 0x77);
        assert_eq!(mem.vic_read(3, 0x0123), 0x77);
    }

    #[test]
    fn ultimax_cartridge_maps_romh_for_cpu_and_vic() {
        let mut mem = make_memory();
        let mut romh = vec![0u8; 8192];
        romh[0x1FFC] = 0x34;
        romh[0x1005] = 0x99;
        let mut crt = crt_header(0, 1, 0);
        crt.extend(chip(0, 0xE000, &romh));
        mem.set_cartridge(Some(parse_crt(&crt).expect("valid CRT")));

        assert!(mem.bank_config().is_ultimax());
        assert_eq!(mem.cpu_read(0xFFFC), Some(0x34));
        assert_eq!(mem.cpu_read(0x4000), None);
        mem.cpu_write(0x4000, 0x12);
        assert_eq!(mem.ram_read(0x4000), 0x00);
        assert_eq!(mem.vic_read(0, 0x3005), 0x99);
    }

    #[test]
    fn colour_ram_is_four_bits() {
        let mut mem = make_memory();
        mem.colour_write(0x3FF, 0xAB);
        assert_eq!(mem.colour_read(0x3FF), 0x0B);
    }

    #[test]
    fn reset_fills_power_on_pattern() {
        let mut mem = make_memory();
        mem.reset();
        assert_eq!(mem.ram_read(0x0000), 0x00);
        assert_eq!(mem.ram_read(0x0040), 0xFF);
        assert_eq!(mem.ram_read(0x0080), 0x00);
    }
}
