//! Opcode table and disassembler.
//!
//! The table drives both the debugger's disassembly and the CPU's
//! knowledge of which micro-steps are bus writes (a write cycle cannot be
//! stalled by RDY).

use std::fmt;

/// 6502 addressing modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressingMode {
    Implied,
    Accumulator,
    Immediate,
    ZeroPage,
    ZeroPageX,
    ZeroPageY,
    Absolute,
    AbsoluteX,
    AbsoluteY,
    Indirect,
    /// `(zp,X)`
    IndexedIndirect,
    /// `(zp),Y`
    IndirectIndexed,
    Relative,
}

impl AddressingMode {
    /// Operand bytes following the opcode.
    #[must_use]
    pub const fn operand_len(self) -> u8 {
        match self {
            Self::Implied | Self::Accumulator => 0,
            Self::Immediate
            | Self::ZeroPage
            | Self::ZeroPageX
            | Self::ZeroPageY
            | Self::IndexedIndirect
            | Self::IndirectIndexed
            | Self::Relative => 1,
            Self::Absolute | Self::AbsoluteX | Self::AbsoluteY | Self::Indirect => 2,
        }
    }
}

/// How an instruction touches its memory operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Access {
    Read,
    Write,
    Rmw,
    Other,
}

#[derive(Clone, Copy)]
pub(crate) struct OpInfo {
    pub mnemonic: &'static str,
    pub mode: AddressingMode,
    pub access: Access,
}

const fn op(mnemonic: &'static str, mode: AddressingMode, access: Access) -> OpInfo {
    OpInfo {
        mnemonic,
        mode,
        access,
    }
}

use Access::{Other as O, Read as R, Rmw as M, Write as W};
use AddressingMode::{
    Absolute as ABS, AbsoluteX as ABX, AbsoluteY as ABY, Accumulator as ACC, Immediate as IMM,
    Implied as IMP, IndexedIndirect as IZX, Indirect as IND, IndirectIndexed as IZY,
    Relative as REL, ZeroPage as ZP, ZeroPageX as ZPX, ZeroPageY as ZPY,
};

#[rustfmt::skip]
pub(crate) const OPCODES: [OpInfo; 256] = [
    // 0x00
    op("BRK", IMP, O), op("ORA", IZX, R), op("JAM", IMP, O), op("SLO", IZX, M),
    op("NOP", ZP, R),  op("ORA", ZP, R),  op("ASL", ZP, M),  op("SLO", ZP, M),
    op("PHP", IMP, O), op("ORA", IMM, R), op("ASL", ACC, O), op("ANC", IMM, R),
    op("NOP", ABS, R), op("ORA", ABS, R), op("ASL", ABS, M), op("SLO", ABS, M),
    // 0x10
    op("BPL", REL, O), op("ORA", IZY, R), op("JAM", IMP, O), op("SLO", IZY, M),
    op("NOP", ZPX, R), op("ORA", ZPX, R), op("ASL", ZPX, M), op("SLO", ZPX, M),
    op("CLC", IMP, O), op("ORA", ABY, R), op("NOP", IMP, O), op("SLO", ABY, M),
    op("NOP", ABX, R), op("ORA", ABX, R), op("ASL", ABX, M), op("SLO", ABX, M),
    // 0x20
    op("JSR", ABS, O), op("AND", IZX, R), op("JAM", IMP, O), op("RLA", IZX, M),
    op("BIT", ZP, R),  op("AND", ZP, R),  op("ROL", ZP, M),  op("RLA", ZP, M),
    op("PLP", IMP, O), op("AND", IMM, R), op("ROL", ACC, O), op("ANC", IMM, R),
    op("BIT", ABS, R), op("AND", ABS, R), op("ROL", ABS, M), op("RLA", ABS, M),
    // 0x30
    op("BMI", REL, O), op("AND", IZY, R), op("JAM", IMP, O), op("RLA", IZY, M),
    op("NOP", ZPX, R), op("AND", ZPX, R), op("ROL", ZPX, M), op("RLA", ZPX, M),
    op("SEC", IMP, O), op("AND", ABY, R), op("NOP", IMP, O), op("RLA", ABY, M),
    op("NOP", ABX, R), op("AND", ABX, R), op("ROL", ABX, M), op("RLA", ABX, M),
    // 0x40
    op("RTI", IMP, O), op("EOR", IZX, R), op("JAM", IMP, O), op("SRE", IZX, M),
    op("NOP", ZP, R),  op("EOR", ZP, R),  op("LSR", ZP, M),  op("SRE", ZP, M),
    op("PHA", IMP, O), op("EOR", IMM, R), op("LSR", ACC, O), op("ALR", IMM, R),
    op("JMP", ABS, O), op("EOR", ABS, R), op("LSR", ABS, M), op("SRE", ABS, M),
    // 0x50
    op("BVC", REL, O), op("EOR", IZY, R), op("JAM", IMP, O), op("SRE", IZY, M),
    op("NOP", ZPX, R), op("EOR", ZPX, R), op("LSR", ZPX, M), op("SRE", ZPX, M),
    op("CLI", IMP, O), op("EOR", ABY, R), op("NOP", IMP, O), op("SRE", ABY, M),
    op("NOP", ABX, R), op("EOR", ABX, R), op("LSR", ABX, M), op("SRE", ABX, M),
    // 0x60
    op("RTS", IMP, O), op("ADC", IZX, R), op("JAM", IMP, O), op("RRA", IZX, M),
    op("NOP", ZP, R),  op("ADC", ZP, R),  op("ROR", ZP, M),  op("RRA", ZP, M),
    op("PLA", IMP, O), op("ADC", IMM, R), op("ROR", ACC, O), op("ARR", IMM, R),
    op("JMP", IND, O), op("ADC", ABS, R), op("ROR", ABS, M), op("RRA", ABS, M),
    // 0x70
    op("BVS", REL, O), op("ADC", IZY, R), op("JAM", IMP, O), op("RRA", IZY, M),
    op("NOP", ZPX, R), op("ADC", ZPX, R), op("ROR", ZPX, M), op("RRA", ZPX, M),
    op("SEI", IMP, O), op("ADC", ABY, R), op("NOP", IMP, O), op("RRA", ABY, M),
    op("NOP", ABX, R), op("ADC", ABX, R), op("ROR", ABX, M), op("RRA", ABX, M),
    // 0x80
    op("NOP", IMM, R), op("STA", IZX, W), op("NOP", IMM, R), op("SAX", IZX, W),
    op("STY", ZP, W),  op("STA", ZP, W),  op("STX", ZP, W),  op("SAX", ZP, W),
    op("DEY", IMP, O), op("NOP", IMM, R), op("TXA", IMP, O), op("ANE", IMM, R),
    op("STY", ABS, W), op("STA", ABS, W), op("STX", ABS, W), op("SAX", ABS, W),
    // 0x90
    op("BCC", REL, O), op("STA", IZY, W), op("JAM", IMP, O), op("SHA", IZY, W),
    op("STY", ZPX, W), op("STA", ZPX, W), op("STX", ZPY, W), op("SAX", ZPY, W),
    op("TYA", IMP, O), op("STA", ABY, W), op("TXS", IMP, O), op("TAS", ABY, W),
    op("SHY", ABX, W), op("STA", ABX, W), op("SHX", ABY, W), op("SHA", ABY, W),
    // 0xA0
    op("LDY", IMM, R), op("LDA", IZX, R), op("LDX", IMM, R), op("LAX", IZX, R),
    op("LDY", ZP, R),  op("LDA", ZP, R),  op("LDX", ZP, R),  op("LAX", ZP, R),
    op("TAY", IMP, O), op("LDA", IMM, R), op("TAX", IMP, O), op("LXA", IMM, R),
    op("LDY", ABS, R), op("LDA", ABS, R), op("LDX", ABS, R), op("LAX", ABS, R),
    // 0xB0
    op("BCS", REL, O), op("LDA", IZY, R), op("JAM", IMP, O), op("LAX", IZY, R),
    op("LDY", ZPX, R), op("LDA", ZPX, R), op("LDX", ZPY, R), op("LAX", ZPY, R),
    op("CLV", IMP, O), op("LDA", ABY, R), op("TSX", IMP, O), op("LAS", ABY, R),
    op("LDY", ABX, R), op("LDA", ABX, R), op("LDX", ABY, R), op("LAX", ABY, R),
    // 0xC0
    op("CPY", IMM, R), op("CMP", IZX, R), op("NOP", IMM, R), op("DCP", IZX, M),
    op("CPY", ZP, R),  op("CMP", ZP, R),  op("DEC", ZP, M),  op("DCP", ZP, M),
    op("INY", IMP, O), op("CMP", IMM, R), op("DEX", IMP, O), op("SBX", IMM, R),
    op("CPY", ABS, R), op("CMP", ABS, R), op("DEC", ABS, M), op("DCP", ABS, M),
    // 0xD0
    op("BNE", REL, O), op("CMP", IZY, R), op("JAM", IMP, O), op("DCP", IZY, M),
    op("NOP", ZPX, R), op("CMP", ZPX, R), op("DEC", ZPX, M), op("DCP", ZPX, M),
    op("CLD", IMP, O), op("CMP", ABY, R), op("NOP", IMP, O), op("DCP", ABY, M),
    op("NOP", ABX, R), op("CMP", ABX, R), op("DEC", ABX, M), op("DCP", ABX, M),
    // 0xE0
    op("CPX", IMM, R), op("SBC", IZX, R), op("NOP", IMM, R), op("ISC", IZX, M),
    op("CPX", ZP, R),  op("SBC", ZP, R),  op("INC", ZP, M),  op("ISC", ZP, M),
    op("INX", IMP, O), op("SBC", IMM, R), op("NOP", IMP, O), op("SBC", IMM, R),
    op("CPX", ABS, R), op("SBC", ABS, R), op("INC", ABS, M), op("ISC", ABS, M),
    // 0xF0
    op("BEQ", REL, O), op("SBC", IZY, R), op("JAM", IMP, O), op("ISC", IZY, M),
    op("NOP", ZPX, R), op("SBC", ZPX, R), op("INC", ZPX, M), op("ISC", ZPX, M),
    op("SED", IMP, O), op("SBC", ABY, R), op("NOP", IMP, O), op("ISC", ABY, M),
    op("NOP", ABX, R), op("SBC", ABX, R), op("INC", ABX, M), op("ISC", ABX, M),
];

/// Mnemonic for an opcode (undocumented opcodes use their common names).
#[must_use]
pub fn mnemonic(opcode: u8) -> &'static str {
    OPCODES[opcode as usize].mnemonic
}

/// Total instruction length in bytes, opcode included.
#[must_use]
pub fn instruction_length(opcode: u8) -> u8 {
    1 + OPCODES[opcode as usize].mode.operand_len()
}

/// Whether micro-step `cycle` (1 = first cycle after the opcode fetch) of
/// `opcode` is a bus write. BRK-style interrupt sequences are handled by
/// the CPU, which knows whether it is running BRK, IRQ, NMI or reset.
pub(crate) fn is_write_cycle(opcode: u8, cycle: u8) -> bool {
    let info = OPCODES[opcode as usize];
    match opcode {
        0x00 => return (2..=4).contains(&cycle),
        0x08 | 0x48 => return cycle == 2,
        0x20 => return cycle == 3 || cycle == 4,
        _ => {}
    }
    match info.access {
        Access::Write => cycle == write_cycle(info.mode),
        Access::Rmw => {
            let first = write_cycle(info.mode) + 1;
            cycle == first || cycle == first + 1
        }
        Access::Read | Access::Other => false,
    }
}

/// Cycle on which a store writes its operand; RMW's dummy write comes one
/// cycle later because of its extra read.
const fn write_cycle(mode: AddressingMode) -> u8 {
    match mode {
        AddressingMode::ZeroPage => 2,
        AddressingMode::ZeroPageX | AddressingMode::ZeroPageY | AddressingMode::Absolute => 3,
        AddressingMode::AbsoluteX | AddressingMode::AbsoluteY => 4,
        AddressingMode::IndexedIndirect | AddressingMode::IndirectIndexed => 5,
        _ => 0,
    }
}

/// One disassembled instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisassembledLine {
    pub address: u16,
    /// Raw bytes; only the first `length` are meaningful.
    pub bytes: [u8; 3],
    pub length: u8,
    /// Instruction text, e.g. `LDA ($FB),Y`.
    pub text: String,
}

impl fmt::Display for DisassembledLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${:04X}  ", self.address)?;
        for i in 0..3 {
            if i < usize::from(self.length) {
                write!(f, "{:02X} ", self.bytes[i])?;
            } else {
                write!(f, "   ")?;
            }
        }
        write!(f, " {}", self.text)
    }
}

/// Disassemble the instruction at `address`.
///
/// `peek` must read memory without side effects. Returns the instruction
/// text and its length in bytes.
pub fn disassemble(peek: impl Fn(u16) -> u8, address: u16) -> (String, u8) {
    let line = disassemble_line(&peek, address);
    (line.text, line.length)
}

/// Disassemble `count` consecutive instructions starting at `address`.
pub fn disassemble_range(
    peek: impl Fn(u16) -> u8,
    address: u16,
    count: usize,
) -> Vec<DisassembledLine> {
    let mut lines = Vec::with_capacity(count);
    let mut addr = address;
    for _ in 0..count {
        let line = disassemble_line(&peek, addr);
        addr = addr.wrapping_add(u16::from(line.length));
        lines.push(line);
    }
    lines
}

fn disassemble_line(peek: &impl Fn(u16) -> u8, address: u16) -> DisassembledLine {
    let opcode = peek(address);
    let info = OPCODES[opcode as usize];
    let length = instruction_length(opcode);
    let lo = peek(address.wrapping_add(1));
    let hi = peek(address.wrapping_add(2));
    let word = u16::from_le_bytes([lo, hi]);

    let operand = match info.mode {
        AddressingMode::Implied => String::new(),
        AddressingMode::Accumulator => "A".to_string(),
        AddressingMode::Immediate => format!("#${lo:02X}"),
        AddressingMode::ZeroPage => format!("${lo:02X}"),
        AddressingMode::ZeroPageX => format!("${lo:02X},X"),
        AddressingMode::ZeroPageY => format!("${lo:02X},Y"),
        AddressingMode::Absolute => format!("${word:04X}"),
        AddressingMode::AbsoluteX => format!("${word:04X},X"),
        AddressingMode::AbsoluteY => format!("${word:04X},Y"),
        AddressingMode::Indirect => format!("(${word:04X})"),
        AddressingMode::IndexedIndirect => format!("(${lo:02X},X)"),
        AddressingMode::IndirectIndexed => format!("(${lo:02X}),Y"),
        AddressingMode::Relative => {
            let target = address.wrapping_add(2).wrapping_add(lo as i8 as u16);
            format!("${target:04X}")
        }
    };

    let text = if operand.is_empty() {
        info.mnemonic.to_string()
    } else {
        format!("{} {operand}", info.mnemonic)
    };

    DisassembledLine {
        address,
        bytes: [opcode, lo, hi],
        length,
        text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn mem(bytes: &[u8]) -> impl Fn(u16) -> u8 + '_ {
        move |addr| bytes.get(addr as usize).copied().unwrap_or(0)
    }

    #[test]
    fn formats_each_addressing_mode() {
        let cases: &[(&[u8], &str, u8)] = &[
            (&[0xA9, 0x42], "LDA #$42", 2),
            (&[0x8D, 0x20, 0xD0], "STA $D020", 3),
            (&[0xB1, 0xFB], "LDA ($FB),Y", 2),
            (&[0xA1, 0x10], "LDA ($10,X)", 2),
            (&[0x6C, 0xFC, 0xFF], "JMP ($FFFC)", 3),
            (&[0x0A], "ASL A", 1),
            (&[0xEA], "NOP", 1),
            (&[0xB6, 0x80], "LDX $80,Y", 2),
            (&[0xA7, 0x02], "LAX $02", 2),
            (&[0x02], "JAM", 1),
        ];
        for &(bytes, text, len) in cases {
            assert_eq!(disassemble(mem(bytes), 0), (text.to_string(), len));
        }
    }

    #[test]
    fn branch_target_is_resolved() {
        // BNE -2 at $0000 loops to itself.
        assert_eq!(disassemble(mem(&[0xD0, 0xFE]), 0).0, "BNE $0000");
    }

    #[test]
    fn range_walks_instruction_lengths() {
        let program = [0xA9, 0x01, 0x8D, 0x00, 0x04, 0x60];
        let lines = disassemble_range(mem(&program), 0, 3);
        let addrs: Vec<u16> = lines.iter().map(|l| l.address).collect();
        assert_eq!(addrs, vec![0, 2, 5]);
        assert_eq!(lines[2].text, "RTS");
        assert_eq!(lines[1].to_string(), "$0002  8D 00 04  STA $0400");
    }

    #[test]
    fn write_cycles_follow_addressing_mode() {
        // STA abs writes on its 4th cycle (3rd after the fetch).
        assert!(is_write_cycle(0x8D, 3));
        assert!(!is_write_cycle(0x8D, 2));
        // INC abs,X writes twice at the end of 7 cycles.
        assert!(is_write_cycle(0xFE, 5));
        assert!(is_write_cycle(0xFE, 6));
        assert!(!is_write_cycle(0xFE, 4));
        // DCP (zp),Y: the illegal RMW form is 8 cycles long.
        assert!(is_write_cycle(0xD3, 6));
        assert!(is_write_cycle(0xD3, 7));
        assert!(!is_write_cycle(0xA9, 1));
    }
}
