//! 6502 processor status register (P).

use std::fmt;

use serde::{Deserialize, Serialize};

/// Carry.
pub const C: u8 = 0x01;

/// Zero.
pub const Z: u8 = 0x02;

/// Interrupt disable - when set, IRQ is ignored.
pub const I: u8 = 0x04;

/// Decimal mode - BCD arithmetic for ADC/SBC.
pub const D: u8 = 0x08;

/// Break - only exists in the pushed copy of P.
/// Set when BRK/PHP push status, clear when IRQ/NMI push it.
pub const B: u8 = 0x10;

/// Unused bit - always reads as 1.
pub const U: u8 = 0x20;

/// Overflow.
pub const V: u8 = 0x40;

/// Negative.
pub const N: u8 = 0x80;

/// Processor status register.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status(pub u8);

impl Status {
    /// Create a new status register with the unused bit set.
    #[must_use]
    pub const fn new() -> Self {
        Self(U)
    }

    /// Create status from a pulled byte. B has no storage in the chip.
    #[must_use]
    pub const fn from_byte(value: u8) -> Self {
        Self((value | U) & !B)
    }

    /// Value pushed by BRK and PHP.
    #[must_use]
    pub const fn to_byte_brk(self) -> u8 {
        self.0 | U | B
    }

    /// Value pushed by IRQ and NMI.
    #[must_use]
    pub const fn to_byte_irq(self) -> u8 {
        (self.0 | U) & !B
    }

    #[must_use]
    pub const fn is_set(self, flag: u8) -> bool {
        self.0 & flag != 0
    }

    pub fn set(&mut self, flag: u8) {
        self.0 |= flag;
    }

    pub fn clear(&mut self, flag: u8) {
        self.0 &= !flag;
    }

    /// Set or clear a flag based on condition.
    pub fn set_if(&mut self, flag: u8, condition: bool) {
        if condition {
            self.set(flag);
        } else {
            self.clear(flag);
        }
    }

    /// Update N and Z flags based on a value.
    pub fn update_nz(&mut self, value: u8) {
        self.set_if(N, value & 0x80 != 0);
        self.set_if(Z, value == 0);
    }
}

/// Debugger notation: upper case for set flags, e.g. `Nv-bdIzC`.
impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(u8, char); 8] = [
            (N, 'N'),
            (V, 'V'),
            (U, '-'),
            (B, 'B'),
            (D, 'D'),
            (I, 'I'),
            (Z, 'Z'),
            (C, 'C'),
        ];
        for (flag, name) in NAMES {
            let c = if flag == U || self.is_set(flag) {
                name
            } else {
                name.to_ascii_lowercase()
            };
            write!(f, "{c}")?;
        }
        Ok(())
    }
}
