//! CRT cartridge images and their bank switching hardware.
//!
//! A CRT file is a 64-byte header (signature, hardware type, initial
//! EXROM/GAME levels, name) followed by CHIP packets, each carrying one
//! ROM bank and its load address.
//!
//! Supported hardware:
//! - Type 0 (Normal): 8K, 16K or Ultimax, no bank switching.
//! - Type 1 (Action Replay): 4x8K banks, 8K RAM, freeze button.
//! - Type 4 (Simons' BASIC): 16K; reading $DE00 selects 8K mode, writing
//!   selects 16K mode.
//! - Type 5 (Ocean): up to 64x8K banks selected via $DE00.
//! - Type 10 (Fun Play / Power Play): 16x8K banks, scrambled bank bits.
//! - Type 19 (Magic Desk): up to 128x8K banks, bit 7 switches it off.
//! - Type 32 (EasyFlash): 64 dual banks, 256 bytes RAM at $DF00.
//!
//! EXROM and GAME are stored as pin levels: `true` is high (inactive).

use std::fmt;
use std::sync::Arc;

use emu_core::{SaveState, StateError, restore_block};
use serde::{Deserialize, Serialize};

const CRT_SIGNATURE: &[u8; 16] = b"C64 CARTRIDGE   ";
const CHIP_SIGNATURE: &[u8; 4] = b"CHIP";

/// A CRT image was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrtError {
    TooShort,
    BadSignature,
    BadHeaderLength(u32),
    UnsupportedType(u16),
    BadChip { offset: usize },
    BadLoadAddress { offset: usize, address: u16 },
    NoChips,
}

impl fmt::Display for CrtError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooShort => write!(f, "CRT file too short for header"),
            Self::BadSignature => write!(f, "invalid CRT signature"),
            Self::BadHeaderLength(len) => write!(f, "invalid CRT header length {len}"),
            Self::UnsupportedType(id) => write!(f, "unsupported CRT type {id}"),
            Self::BadChip { offset } => write!(f, "malformed CHIP packet at offset {offset}"),
            Self::BadLoadAddress { offset, address } => {
                write!(f, "unexpected CHIP load address ${address:04X} at offset {offset}")
            }
            Self::NoChips => write!(f, "CRT file contains no CHIP packets"),
        }
    }
}

impl std::error::Error for CrtError {}

/// Cartridge hardware type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CartridgeType {
    Normal,
    ActionReplay,
    SimonsBasic,
    Ocean,
    FunPlay,
    MagicDesk,
    EasyFlash,
}

impl CartridgeType {
    fn from_id(id: u16) -> Option<Self> {
        Some(match id {
            0 => Self::Normal,
            1 => Self::ActionReplay,
            4 => Self::SimonsBasic,
            5 => Self::Ocean,
            10 => Self::FunPlay,
            19 => Self::MagicDesk,
            32 => Self::EasyFlash,
            _ => return None,
        })
    }

    fn ram_size(self) -> usize {
        match self {
            Self::ActionReplay => 8192,
            Self::EasyFlash => 256,
            _ => 0,
        }
    }
}

/// ROM banks of a cartridge. Shared between machine clones.
#[derive(Debug, Default)]
struct Banks {
    roml: Vec<Vec<u8>>,
    romh: Vec<Vec<u8>>,
}

fn bank_byte(banks: &[Vec<u8>], bank: usize, offset: u16) -> Option<u8> {
    banks.get(bank)?.get(usize::from(offset)).copied()
}

/// A cartridge plugged into the expansion port.
#[derive(Debug, Clone)]
pub struct Cartridge {
    cart_type: CartridgeType,
    name: String,
    banks: Arc<Banks>,
    initial_exrom: bool,
    initial_game: bool,
    exrom: bool,
    game: bool,
    bank: u8,
    /// Last value written to the control register.
    control: u8,
    /// Hardware switched itself off until the next reset.
    disabled: bool,
    /// Action Replay freeze in progress.
    freeze: bool,
    ram: Vec<u8>,
}

impl Cartridge {
    #[must_use]
    pub fn cart_type(&self) -> CartridgeType {
        self.cart_type
    }

    /// Name from the CRT header.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// EXROM pin level (`false` = asserted).
    #[must_use]
    pub fn exrom(&self) -> bool {
        self.exrom
    }

    /// GAME pin level (`false` = asserted).
    #[must_use]
    pub fn game(&self) -> bool {
        self.game
    }

    #[must_use]
    pub fn bank(&self) -> u8 {
        self.bank
    }

    /// NMI output. Only the Action Replay freeze drives it.
    #[must_use]
    pub fn nmi_active(&self) -> bool {
        self.freeze
    }

    /// Power-on state: lines back to the header values, bank 0.
    pub fn reset(&mut self) {
        self.exrom = self.initial_exrom;
        self.game = self.initial_game;
        self.bank = 0;
        self.control = 0;
        self.disabled = false;
        self.freeze = false;
        if self.cart_type == CartridgeType::EasyFlash {
            // Boot jumper holds GAME low until $DE02 is written.
            self.game = false;
            self.exrom = true;
        }
    }

    /// Press the freeze button (Action Replay only): Ultimax mode and NMI
    /// until the freeze routine acknowledges through $DE00 bit 6.
    pub fn press_freeze(&mut self) {
        if self.cart_type == CartridgeType::ActionReplay {
            self.freeze = true;
            self.disabled = false;
            self.exrom = true;
            self.game = false;
            self.bank = 0;
        }
    }

    fn ar_ram_enabled(&self) -> bool {
        self.cart_type == CartridgeType::ActionReplay && self.control & 0x20 != 0
    }

    /// Read ROML ($8000-$9FFF, offset 0-$1FFF).
    #[must_use]
    pub fn read_roml(&self, offset: u16) -> u8 {
        if self.ar_ram_enabled() {
            return self.ram[usize::from(offset & 0x1FFF)];
        }
        bank_byte(&self.banks.roml, usize::from(self.bank), offset).unwrap_or(0xFF)
    }

    /// Read ROMH ($A000-$BFFF, or $E000-$FFFF in Ultimax mode).
    #[must_use]
    pub fn read_romh(&self, offset: u16) -> u8 {
        let bank = match self.cart_type {
            CartridgeType::Normal | CartridgeType::SimonsBasic => 0,
            _ => usize::from(self.bank),
        };
        bank_byte(&self.banks.romh, bank, offset)
            .or_else(|| {
                // Single-chip bank switchers mirror ROML into the ROMH window.
                if self.banks.romh.is_empty() {
                    bank_byte(&self.banks.roml, bank, offset)
                } else {
                    None
                }
            })
            .unwrap_or(0xFF)
    }

    /// CPU write into the ROML window; only lands in cartridge RAM.
    pub fn write_roml(&mut self, offset: u16, value: u8) {
        if self.ar_ram_enabled() {
            self.ram[usize::from(offset & 0x1FFF)] = value;
        }
    }

    /// Write to I/O1/I/O2 ($DE00-$DFFF).
    pub fn write_io(&mut self, addr: u16, value: u8) {
        let io1 = addr & 0xFF00 == 0xDE00;
        match self.cart_type {
            CartridgeType::Normal => {}
            CartridgeType::ActionReplay => {
                if io1 && !self.disabled {
                    self.control = value;
                    self.bank = (value >> 3) & 0x03;
                    self.game = value & 0x01 == 0;
                    self.exrom = value & 0x02 != 0;
                    if value & 0x40 != 0 {
                        self.freeze = false;
                    }
                    if value & 0x04 != 0 {
                        self.disabled = true;
                        self.exrom = true;
                        self.game = true;
                    }
                } else if !io1 && self.ar_ram_enabled() {
                    self.ram[0x1F00 + usize::from(addr & 0xFF)] = value;
                }
            }
            CartridgeType::SimonsBasic => {
                if io1 {
                    self.game = false;
                }
            }
            CartridgeType::Ocean => {
                if io1 {
                    self.bank = value & 0x3F;
                }
            }
            CartridgeType::FunPlay => {
                if io1 {
                    if value & 0xC6 == 0x86 {
                        self.exrom = true;
                        self.game = true;
                    } else {
                        self.bank = ((value >> 3) & 0x07) | ((value & 0x01) << 3);
                        self.exrom = false;
                    }
                }
            }
            CartridgeType::MagicDesk => {
                if io1 {
                    self.bank = value & 0x7F;
                    self.exrom = value & 0x80 != 0;
                }
            }
            CartridgeType::EasyFlash => match addr {
                0xDE00 => self.bank = value & 0x3F,
                0xDE02 => {
                    self.control = value;
                    let game_asserted = if value & 0x04 != 0 {
                        value & 0x01 != 0
                    } else {
                        true
                    };
                    self.game = !game_asserted;
                    self.exrom = value & 0x02 == 0;
                }
                0xDF00..=0xDFFF => self.ram[usize::from(addr & 0xFF)] = value,
                _ => {}
            },
        }
        log::debug!(
            "cartridge I/O ${addr:04X} = ${value:02X}: bank {} EXROM {} GAME {}",
            self.bank,
            u8::from(self.exrom),
            u8::from(self.game)
        );
    }

    /// Read from I/O1/I/O2. `None` when the cartridge does not drive the
    /// bus there.
    pub fn read_io(&mut self, addr: u16) -> Option<u8> {
        if self.cart_type == CartridgeType::SimonsBasic && addr & 0xFF00 == 0xDE00 {
            self.game = true;
        }
        self.peek_io(addr)
    }

    /// Side-effect free variant of [`Self::read_io`].
    #[must_use]
    pub fn peek_io(&self, addr: u16) -> Option<u8> {
        let io2 = addr & 0xFF00 == 0xDF00;
        match self.cart_type {
            CartridgeType::EasyFlash if io2 => Some(self.ram[usize::from(addr & 0xFF)]),
            CartridgeType::ActionReplay if io2 && !self.disabled => {
                let offset = 0x1F00 | (addr & 0xFF);
                if self.ar_ram_enabled() {
                    Some(self.ram[usize::from(offset)])
                } else {
                    bank_byte(&self.banks.roml, usize::from(self.bank), offset)
                }
            }
            _ => None,
        }
    }
}

/// Banking latches and cartridge RAM. The ROM image stays plugged in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartridgeState {
    exrom: bool,
    game: bool,
    bank: u8,
    control: u8,
    disabled: bool,
    freeze: bool,
    ram: Vec<u8>,
}

impl SaveState for Cartridge {
    type State = CartridgeState;

    fn save_state(&self) -> CartridgeState {
        CartridgeState {
            exrom: self.exrom,
            game: self.game,
            bank: self.bank,
            control: self.control,
            disabled: self.disabled,
            freeze: self.freeze,
            ram: self.ram.clone(),
        }
    }

    fn load_state(&mut self, state: CartridgeState) -> Result<(), StateError> {
        restore_block("cartridge.ram", &state.ram, &mut self.ram)?;
        self.exrom = state.exrom;
        self.game = state.game;
        self.bank = state.bank;
        self.control = state.control;
        self.disabled = state.disabled;
        self.freeze = state.freeze;
        Ok(())
    }
}

fn be_u16(data: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([data[offset], data[offset + 1]])
}

fn be_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

fn store(banks: &mut Vec<Vec<u8>>, bank: usize, data: Vec<u8>) {
    if banks.len() <= bank {
        banks.resize(bank + 1, Vec::new());
    }
    banks[bank] = data;
}

/// Parse a CRT image.
pub fn parse_crt(data: &[u8]) -> Result<Cartridge, CrtError> {
    if data.len() < 0x40 {
        return Err(CrtError::TooShort);
    }
    if &data[0..16] != CRT_SIGNATURE {
        return Err(CrtError::BadSignature);
    }
    let header_len = be_u32(data, 0x10);
    if header_len < 0x20 || header_len as usize > data.len() {
        return Err(CrtError::BadHeaderLength(header_len));
    }
    let type_id = be_u16(data, 0x16);
    let cart_type = CartridgeType::from_id(type_id).ok_or(CrtError::UnsupportedType(type_id))?;
    let exrom = data[0x18] != 0;
    let game = data[0x19] != 0;

    let name_bytes = &data[0x20..0x40];
    let end = name_bytes.iter().position(|&b| b == 0).unwrap_or(name_bytes.len());
    let name = String::from_utf8_lossy(&name_bytes[..end]).trim().to_string();

    let mut banks = Banks::default();
    let mut offset = header_len as usize;
    while offset + 0x10 <= data.len() {
        if &data[offset..offset + 4] != CHIP_SIGNATURE {
            return Err(CrtError::BadChip { offset });
        }
        let chip_len = be_u32(data, offset + 4) as usize;
        let bank = usize::from(be_u16(data, offset + 0x0A));
        let address = be_u16(data, offset + 0x0C);
        let size = usize::from(be_u16(data, offset + 0x0E));
        let rom_start = offset + 0x10;
        if chip_len < 0x10 || offset + chip_len > data.len() || rom_start + size > data.len() {
            return Err(CrtError::BadChip { offset });
        }
        let rom = &data[rom_start..rom_start + size];

        match address {
            // 16K chips at $8000 are split across both windows.
            0x8000 if size > 0x2000 => {
                store(&mut banks.roml, bank, rom[..0x2000].to_vec());
                store(&mut banks.romh, bank, rom[0x2000..].to_vec());
            }
            0x8000 => store(&mut banks.roml, bank, rom.to_vec()),
            0xA000 | 0xE000 => store(&mut banks.romh, bank, rom.to_vec()),
            _ => return Err(CrtError::BadLoadAddress { offset, address }),
        }
        offset += chip_len;
    }

    if banks.roml.is_empty() && banks.romh.is_empty() {
        return Err(CrtError::NoChips);
    }

    let mut cart = Cartridge {
        cart_type,
        name,
        banks: Arc::new(banks),
        initial_exrom: exrom,
        initial_game: game,
        exrom,
        game,
        bank: 0,
        control: 0,
        disabled: false,
        freeze: false,
        ram: vec![0; cart_type.ram_size()],
    };
    cart.reset();
    Ok(cart)
}

/// CRT header for tests.
#[cfg(test)]
pub(crate) fn crt_header(cart_type: u16, exrom: u8, game: u8) -> Vec<u8> {
    let mut header = Vec::new();
    header.extend_from_slice(CRT_SIGNATURE);
    header.extend_from_slice(&0x40u32.to_be_bytes());
    header.extend_from_slice(&[0x01, 0x00]);
    header.extend_from_slice(&cart_type.to_be_bytes());
    header.push(exrom);
    header.push(game);
    header.extend_from_slice(&[0; 6]);
    let name = b"Test Cart";
    header.extend_from_slice(name);
    header.extend_from_slice(&[0u8; 32][..32 - name.len()]);
    assert_eq!(header.len(), 0x40);
    header
}

/// CHIP packet for tests.
#[cfg(test)]
pub(crate) fn chip(bank: u16, load: u16, rom: &[u8]) -> Vec<u8> {
    let mut chip = Vec::new();
    chip.extend_from_slice(CHIP_SIGNATURE);
    chip.extend_from_slice(&(0x10 + rom.len() as u32).to_be_bytes());
    chip.extend_from_slice(&[0x00, 0x00]);
    chip.extend_from_slice(&bank.to_be_bytes());
    chip.extend_from_slice(&load.to_be_bytes());
    chip.extend_from_slice(&(rom.len() as u16).to_be_bytes());
    chip.extend_from_slice(rom);
    chip
}
