//! 6502 CPU registers.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::Status;
use crate::flags::{I, U};

/// 6502 register set.
///
/// - A: 8-bit accumulator
/// - X, Y: 8-bit index registers
/// - S: 8-bit stack pointer (stack is at $0100-$01FF)
/// - PC: 16-bit program counter
/// - P: 8-bit processor status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registers {
    pub a: u8,
    pub x: u8,
    pub y: u8,
    /// Stack pointer (next free location).
    pub s: u8,
    pub pc: u16,
    pub p: Status,
}

impl Default for Registers {
    fn default() -> Self {
        Self::new()
    }
}

impl Registers {
    /// Registers as they stand after a completed reset sequence.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            a: 0,
            x: 0,
            y: 0,
            s: 0xFD,
            pc: 0,
            p: Status(U | I),
        }
    }

    /// Push a value onto the stack, return the address written.
    pub fn push(&mut self) -> u16 {
        let addr = 0x0100 | u16::from(self.s);
        self.s = self.s.wrapping_sub(1);
        addr
    }

    /// Pop a value from the stack, return the address to read.
    pub fn pop(&mut self) -> u16 {
        self.s = self.s.wrapping_add(1);
        0x0100 | u16::from(self.s)
    }

    /// Current stack address without modifying S.
    #[must_use]
    pub const fn stack_addr(&self) -> u16 {
        0x0100 | (self.s as u16)
    }
}

/// One-line register dump, e.g. `PC=C000 A=00 X=00 Y=00 S=FD P=nv-bdIzc`.
impl fmt::Display for Registers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PC={:04X} A={:02X} X={:02X} Y={:02X} S={:02X} P={}",
            self.pc, self.a, self.x, self.y, self.s, self.p
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_and_pop_wrap_within_page_one() {
        let mut regs = Registers::new();
        regs.s = 0x00;
        assert_eq!(regs.push(), 0x0100);
        assert_eq!(regs.s, 0xFF);
        assert_eq!(regs.pop(), 0x0100);
        assert_eq!(regs.s, 0x00);
    }

    #[test]
    fn display_formats_all_registers() {
        let mut regs = Registers::new();
        regs.pc = 0xC000;
        regs.a = 0x42;
        assert_eq!(regs.to_string(), "PC=C000 A=42 X=00 Y=00 S=FD P=nv-bdIzc");
    }
}
