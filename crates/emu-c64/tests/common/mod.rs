//! Synthetic ROM images shared by the integration tests.

#![allow(dead_code)]

use emu_c64::{C64, C64Config, RomSet};

/// A KERNAL image holding `code` at $E000, padded with NOPs, with the
/// reset vector pointing at $E000.
pub fn kernal_with(code: &[u8]) -> Vec<u8> {
    let mut kernal = vec![0xEA; 8192];
    kernal[..code.len()].copy_from_slice(code);
    kernal[0x1FFC] = 0x00;
    kernal[0x1FFD] = 0xE0;
    kernal
}

/// A 1541 ROM that parks the drive CPU in `JMP $C000`.
pub fn idle_drive_rom() -> Vec<u8> {
    let mut rom = vec![0xEA; 16384];
    rom[..3].copy_from_slice(&[0x4C, 0x00, 0xC0]);
    rom[0x3FFC] = 0x00;
    rom[0x3FFD] = 0xC0;
    rom
}

pub fn config(kernal: Vec<u8>, drive: bool) -> C64Config {
    C64Config {
        roms: RomSet {
            basic: vec![0; 8192],
            kernal,
            chargen: vec![0; 4096],
            drive: drive.then(idle_drive_rom),
        },
        ..C64Config::default()
    }
}

pub fn machine(code: &[u8], drive: bool) -> C64 {
    C64::new(&config(kernal_with(code), drive)).expect("valid ROMs")
}
