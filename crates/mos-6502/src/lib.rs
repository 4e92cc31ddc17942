//! Cycle-stepped NMOS 6502 CPU.
//!
//! The 6502 performs one bus access per cycle. Each `tick()` advances
//! exactly one cycle; instructions are explicit micro-step state machines
//! so execution can stop, be inspected or be snapshotted between any two
//! cycles. All 256 opcodes are implemented, including the undocumented
//! ones with their real bus access patterns.

mod breakpoints;
mod cpu;
mod disasm;
pub mod flags;
mod registers;

pub use breakpoints::{BreakpointState, Breakpoints};
pub use cpu::{CpuFault, CpuState, Mos6502};
pub use disasm::{AddressingMode, DisassembledLine, disassemble, disassemble_range, instruction_length, mnemonic};
pub use flags::Status;
pub use registers::Registers;
