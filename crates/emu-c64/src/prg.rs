//! PRG file loader.
//!
//! A PRG file is the simplest C64 binary format: a 2-byte little-endian
//! load address followed by the data bytes. The data is copied into RAM
//! from the load address; anything past $FFFF is dropped.

use std::fmt;

use crate::memory::C64Memory;

/// Start of BASIC program text.
pub const BASIC_START: u16 = 0x0801;

/// Zero-page pointers the KERNAL LOAD routine leaves pointing past the
/// program: VARTAB, ARYTAB, STREND and the end-of-load address.
const END_POINTERS: [u16; 4] = [0x2D, 0x2F, 0x31, 0xAE];

/// A PRG image was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrgError {
    /// Fewer than three bytes: no load address or no data.
    TooShort(usize),
}

impl fmt::Display for PrgError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooShort(n) => write!(f, "PRG needs a load address and data, got {n} bytes"),
        }
    }
}

impl std::error::Error for PrgError {}

/// Where a program landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadedPrg {
    pub start: u16,
    /// One past the last byte written (wraps to $0000 for a program
    /// ending at $FFFF).
    pub end: u16,
}

/// Split a PRG into load address and data without touching memory.
pub fn parse_prg(data: &[u8]) -> Result<(u16, &[u8]), PrgError> {
    if data.len() < 3 {
        return Err(PrgError::TooShort(data.len()));
    }
    Ok((u16::from_le_bytes([data[0], data[1]]), &data[2..]))
}

/// Copy a PRG into RAM. Programs loaded at $0801 also get the BASIC end
/// pointers set so `RUN` finds them.
pub fn load_prg(memory: &mut C64Memory, data: &[u8]) -> Result<LoadedPrg, PrgError> {
    let (start, body) = parse_prg(data)?;
    let room = 0x10000 - usize::from(start);
    let body = &body[..body.len().min(room)];
    for (i, &byte) in body.iter().enumerate() {
        memory.ram_write(start.wrapping_add(i as u16), byte);
    }
    let end = start.wrapping_add(body.len() as u16);
    if start == BASIC_START {
        let [lo, hi] = end.to_le_bytes();
        for ptr in END_POINTERS {
            memory.ram_write(ptr, lo);
            memory.ram_write(ptr + 1, hi);
        }
    }
    Ok(LoadedPrg { start, end })
}
