//! 6502 CPU implementation.
//!
//! Cycle-stepped emulation where each `tick()` performs exactly one bus
//! access. Instructions are broken into their component cycles, including
//! the dummy reads and writes real silicon performs, because software on
//! the C64 and 1541 can observe them (I/O registers with read side
//! effects, RMW double writes to interrupt acknowledge registers).

use std::fmt;

use emu_core::{Bus, Cpu, Observable, SaveState, StateError, Value};
use serde::{Deserialize, Serialize};

use crate::breakpoints::Breakpoints;
use crate::disasm;
use crate::flags::{C, D, I, N, V, Z};
use crate::{Registers, Status};

/// Internal state tracking instruction execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
enum State {
    /// Next tick fetches an opcode (or starts an interrupt sequence).
    FetchOpcode,
    /// Executing instruction cycles.
    Execute,
    /// Locked up by a JAM opcode until reset.
    Jammed,
    /// Stopped after an internal error (see [`CpuFault`]).
    Faulted,
}

/// What the shared BRK micro-sequence is servicing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
enum Sequence {
    Brk,
    Irq,
    Nmi,
    Reset,
}

/// The CPU reached a micro-step with no defined behaviour.
///
/// This is an emulator bug, never a property of the program being run.
/// The CPU stops; its state is left intact for inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuFault {
    pub opcode: u8,
    /// Micro-step index that had no implementation.
    pub cycle: u8,
    /// Address of the faulting instruction.
    pub pc: u16,
}

impl fmt::Display for CpuFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "no micro-step {} for opcode ${:02X} ({}) at ${:04X}",
            self.cycle,
            self.opcode,
            disasm::mnemonic(self.opcode),
            self.pc
        )
    }
}

impl std::error::Error for CpuFault {}

/// The MOS 6502 CPU (NMOS, as in the 6510 and the 1541).
#[derive(Debug, Clone)]
pub struct Mos6502 {
    /// CPU registers.
    pub regs: Registers,

    state: State,

    /// Current opcode being executed.
    opcode: u8,

    /// Current cycle within the instruction (0 = opcode fetch).
    cycle: u8,

    /// Temporary address register for addressing modes.
    addr: u16,

    /// Temporary data register; also the page-cross flag while indexing.
    data: u8,

    /// Zero page pointer, or the unindexed high byte for SHA/SHX/SHY/TAS.
    pointer: u8,

    sequence: Sequence,

    /// Vector chosen for the running interrupt sequence.
    vector: u16,

    /// Address of the instruction currently executing.
    instruction_pc: u16,

    /// IRQ input level as driven by the machine.
    irq_line: bool,

    /// NMI input level, for edge detection.
    nmi_line: bool,

    /// NMI edge seen and not yet serviced.
    nmi_edge: bool,

    /// Interrupt poll results, sampled at the start of each execute cycle.
    irq_poll: bool,
    nmi_poll: bool,

    fault: Option<CpuFault>,

    breakpoints: Breakpoints,

    /// Total cycles executed.
    total_cycles: u64,
}

impl Default for Mos6502 {
    fn default() -> Self {
        Self::new()
    }
}

impl Mos6502 {
    /// Create a 6502 ready to fetch at PC = 0 (tests set PC directly).
    /// Call [`Cpu::reset`] to run the reset sequence through $FFFC.
    #[must_use]
    pub fn new() -> Self {
        Self {
            regs: Registers::new(),
            state: State::FetchOpcode,
            opcode: 0,
            cycle: 0,
            addr: 0,
            data: 0,
            pointer: 0,
            sequence: Sequence::Brk,
            vector: 0xFFFE,
            instruction_pc: 0,
            irq_line: false,
            nmi_line: false,
            nmi_edge: false,
            irq_poll: false,
            nmi_poll: false,
            fault: None,
            breakpoints: Breakpoints::new(),
            total_cycles: 0,
        }
    }

    /// True between instructions: the next tick fetches an opcode.
    #[must_use]
    pub fn is_instruction_complete(&self) -> bool {
        self.state == State::FetchOpcode
    }

    /// True if a JAM opcode has locked the CPU.
    #[must_use]
    pub fn is_jammed(&self) -> bool {
        self.state == State::Jammed
    }

    /// The internal fault that stopped the CPU, if any.
    #[must_use]
    pub fn fault(&self) -> Option<CpuFault> {
        self.fault
    }

    /// Opcode of the instruction in progress (or last executed).
    #[must_use]
    pub fn opcode(&self) -> u8 {
        self.opcode
    }

    /// Micro-step index within the current instruction.
    #[must_use]
    pub fn micro_step(&self) -> u8 {
        self.cycle
    }

    #[must_use]
    pub fn total_cycles(&self) -> u64 {
        self.total_cycles
    }

    /// Whether the next tick performs a bus write. Writes are not held
    /// off by RDY, so the machine only stalls the CPU on read cycles.
    #[must_use]
    pub fn next_cycle_is_write(&self) -> bool {
        self.state == State::Execute
            && !(self.opcode == 0x00 && self.sequence == Sequence::Reset)
            && disasm::is_write_cycle(self.opcode, self.cycle)
    }

    /// Pulse the SO (set overflow) input. The 1541 wires its byte-ready
    /// line here.
    pub fn set_overflow(&mut self) {
        self.regs.p.set(V);
    }

    #[must_use]
    pub fn breakpoints(&self) -> &Breakpoints {
        &self.breakpoints
    }

    pub fn breakpoints_mut(&mut self) -> &mut Breakpoints {
        &mut self.breakpoints
    }

    /// Check the breakpoint set at an instruction boundary.
    ///
    /// Returns false mid-instruction, so a breakpoint can never split an
    /// instruction.
    pub fn breakpoint_hit(&mut self) -> bool {
        self.is_instruction_complete() && self.breakpoints.hit(self.regs.pc)
    }

    /// Execute one CPU cycle.
    fn execute_cycle<B: Bus>(&mut self, bus: &mut B) {
        self.total_cycles += 1;

        match self.state {
            State::FetchOpcode => {
                if self.nmi_poll {
                    self.nmi_poll = false;
                    self.nmi_edge = false;
                    self.begin_interrupt(bus, Sequence::Nmi);
                    return;
                }
                if self.irq_poll {
                    self.begin_interrupt(bus, Sequence::Irq);
                    return;
                }

                self.instruction_pc = self.regs.pc;
                self.opcode = bus.read(self.regs.pc);
                self.regs.pc = self.regs.pc.wrapping_add(1);
                self.cycle = 1;
                self.state = State::Execute;
            }
            State::Execute => {
                self.poll_interrupts();
                self.execute_instruction(bus);
            }
            State::Jammed => {
                let _ = bus.read(0xFFFF);
            }
            State::Faulted => {}
        }
    }

    /// Sample the interrupt inputs. The result taken on an instruction's
    /// last cycle decides whether the next fetch becomes an interrupt,
    /// which gives CLI/SEI/PLP their one-instruction delay.
    fn poll_interrupts(&mut self) {
        self.irq_poll = self.irq_line && !self.regs.p.is_set(I);
        self.nmi_poll = self.nmi_edge;
    }

    /// Replace the opcode fetch with the hardware interrupt sequence.
    fn begin_interrupt<B: Bus>(&mut self, bus: &mut B, sequence: Sequence) {
        // Opcode fetch happens but is discarded; PC does not advance.
        let _ = bus.read(self.regs.pc);
        self.instruction_pc = self.regs.pc;
        self.sequence = sequence;
        self.opcode = 0x00;
        self.cycle = 1;
        self.state = State::Execute;
    }

    /// Record an internal fault and stop.
    fn raise_fault(&mut self) {
        let fault = CpuFault {
            opcode: self.opcode,
            cycle: self.cycle,
            pc: self.instruction_pc,
        };
        log::error!("6502 fault: {fault}");
        self.fault = Some(fault);
        self.state = State::Faulted;
    }

    /// Execute one cycle of the current instruction.
    fn execute_instruction<B: Bus>(&mut self, bus: &mut B) {
        let x = self.regs.x;
        let y = self.regs.y;
        match self.opcode {
            // BRK / IRQ / NMI / reset sequence - 7 cycles
            0x00 => self.op_brk(bus),
            // ORA (zp,X) - 6 cycles
            0x01 => self.addr_izx(bus, Self::do_ora),
            // JAM
            0x02 => self.op_jam(bus),
            // SLO (zp,X) - 8 cycles
            0x03 => self.addr_izx_rmw(bus, Self::do_slo),
            // NOP zp - 3 cycles
            0x04 => self.addr_zp(bus, Self::do_nop_read),
            // ORA zp - 3 cycles
            0x05 => self.addr_zp(bus, Self::do_ora),
            // ASL zp - 5 cycles
            0x06 => self.addr_zp_rmw(bus, Self::do_asl),
            // SLO zp - 5 cycles
            0x07 => self.addr_zp_rmw(bus, Self::do_slo),
            // PHP - 3 cycles
            0x08 => self.op_push(bus, |cpu| cpu.regs.p.to_byte_brk()),
            // ORA imm - 2 cycles
            0x09 => self.addr_imm(bus, Self::do_ora),
            // ASL A - 2 cycles
            0x0A => self.op_implied(bus, |cpu| cpu.regs.a = cpu.do_asl(cpu.regs.a)),
            // ANC imm - 2 cycles
            0x0B => self.addr_imm(bus, Self::do_anc),
            // NOP abs - 4 cycles
            0x0C => self.addr_abs(bus, Self::do_nop_read),
            // ORA abs - 4 cycles
            0x0D => self.addr_abs(bus, Self::do_ora),
            // ASL abs - 6 cycles
            0x0E => self.addr_abs_rmw(bus, Self::do_asl),
            // SLO abs - 6 cycles
            0x0F => self.addr_abs_rmw(bus, Self::do_slo),

            // BPL rel - 2/3/4 cycles
            0x10 => self.op_branch(bus, !self.regs.p.is_set(N)),
            // ORA (zp),Y - 5/6 cycles
            0x11 => self.addr_izy(bus, Self::do_ora),
            0x12 => self.op_jam(bus),
            // SLO (zp),Y - 8 cycles
            0x13 => self.addr_izy_rmw(bus, Self::do_slo),
            // NOP zp,X - 4 cycles
            0x14 => self.addr_zpi(bus, x, Self::do_nop_read),
            0x15 => self.addr_zpi(bus, x, Self::do_ora),
            0x16 => self.addr_zpi_rmw(bus, x, Self::do_asl),
            0x17 => self.addr_zpi_rmw(bus, x, Self::do_slo),
            // CLC - 2 cycles
            0x18 => self.op_implied(bus, |cpu| cpu.regs.p.clear(C)),
            // ORA abs,Y - 4/5 cycles
            0x19 => self.addr_absi(bus, y, Self::do_ora),
            // NOP - 2 cycles
            0x1A => self.op_implied(bus, |_| {}),
            // SLO abs,Y - 7 cycles
            0x1B => self.addr_absi_rmw(bus, y, Self::do_slo),
            // NOP abs,X - 4/5 cycles
            0x1C => self.addr_absi(bus, x, Self::do_nop_read),
            0x1D => self.addr_absi(bus, x, Self::do_ora),
            // ASL abs,X - 7 cycles
            0x1E => self.addr_absi_rmw(bus, x, Self::do_asl),
            0x1F => self.addr_absi_rmw(bus, x, Self::do_slo),

            // JSR abs - 6 cycles
            0x20 => self.op_jsr(bus),
            0x21 => self.addr_izx(bus, Self::do_and),
            0x22 => self.op_jam(bus),
            // RLA (zp,X) - 8 cycles
            0x23 => self.addr_izx_rmw(bus, Self::do_rla),
            // BIT zp - 3 cycles
            0x24 => self.addr_zp(bus, Self::do_bit),
            0x25 => self.addr_zp(bus, Self::do_and),
            0x26 => self.addr_zp_rmw(bus, Self::do_rol),
            0x27 => self.addr_zp_rmw(bus, Self::do_rla),
            // PLP - 4 cycles
            0x28 => self.op_pull(bus, |cpu, v| cpu.regs.p = Status::from_byte(v)),
            0x29 => self.addr_imm(bus, Self::do_and),
            0x2A => self.op_implied(bus, |cpu| cpu.regs.a = cpu.do_rol(cpu.regs.a)),
            0x2B => self.addr_imm(bus, Self::do_anc),
            0x2C => self.addr_abs(bus, Self::do_bit),
            0x2D => self.addr_abs(bus, Self::do_and),
            0x2E => self.addr_abs_rmw(bus, Self::do_rol),
            0x2F => self.addr_abs_rmw(bus, Self::do_rla),

            // BMI rel
            0x30 => self.op_branch(bus, self.regs.p.is_set(N)),
            0x31 => self.addr_izy(bus, Self::do_and),
            0x32 => self.op_jam(bus),
            0x33 => self.addr_izy_rmw(bus, Self::do_rla),
            0x34 => self.addr_zpi(bus, x, Self::do_nop_read),
            0x35 => self.addr_zpi(bus, x, Self::do_and),
            0x36 => self.addr_zpi_rmw(bus, x, Self::do_rol),
            0x37 => self.addr_zpi_rmw(bus, x, Self::do_rla),
            // SEC
            0x38 => self.op_implied(bus, |cpu| cpu.regs.p.set(C)),
            0x39 => self.addr_absi(bus, y, Self::do_and),
            0x3A => self.op_implied(bus, |_| {}),
            0x3B => self.addr_absi_rmw(bus, y, Self::do_rla),
            0x3C => self.addr_absi(bus, x, Self::do_nop_read),
            0x3D => self.addr_absi(bus, x, Self::do_and),
            0x3E => self.addr_absi_rmw(bus, x, Self::do_rol),
            0x3F => self.addr_absi_rmw(bus, x, Self::do_rla),

            // RTI - 6 cycles
            0x40 => self.op_rti(bus),
            0x41 => self.addr_izx(bus, Self::do_eor),
            0x42 => self.op_jam(bus),
            // SRE (zp,X) - 8 cycles
            0x43 => self.addr_izx_rmw(bus, Self::do_sre),
            0x44 => self.addr_zp(bus, Self::do_nop_read),
            0x45 => self.addr_zp(bus, Self::do_eor),
            0x46 => self.addr_zp_rmw(bus, Self::do_lsr),
            0x47 => self.addr_zp_rmw(bus, Self::do_sre),
            // PHA - 3 cycles
            0x48 => self.op_push(bus, |cpu| cpu.regs.a),
            0x49 => self.addr_imm(bus, Self::do_eor),
            0x4A => self.op_implied(bus, |cpu| cpu.regs.a = cpu.do_lsr(cpu.regs.a)),
            // ALR imm - 2 cycles
            0x4B => self.addr_imm(bus, Self::do_alr),
            // JMP abs - 3 cycles
            0x4C => self.op_jmp_abs(bus),
            0x4D => self.addr_abs(bus, Self::do_eor),
            0x4E => self.addr_abs_rmw(bus, Self::do_lsr),
            0x4F => self.addr_abs_rmw(bus, Self::do_sre),

            // BVC rel
            0x50 => self.op_branch(bus, !self.regs.p.is_set(V)),
            0x51 => self.addr_izy(bus, Self::do_eor),
            0x52 => self.op_jam(bus),
            0x53 => self.addr_izy_rmw(bus, Self::do_sre),
            0x54 => self.addr_zpi(bus, x, Self::do_nop_read),
            0x55 => self.addr_zpi(bus, x, Self::do_eor),
            0x56 => self.addr_zpi_rmw(bus, x, Self::do_lsr),
            0x57 => self.addr_zpi_rmw(bus, x, Self::do_sre),
            // CLI
            0x58 => self.op_implied(bus, |cpu| cpu.regs.p.clear(I)),
            0x59 => self.addr_absi(bus, y, Self::do_eor),
            0x5A => self.op_implied(bus, |_| {}),
            0x5B => self.addr_absi_rmw(bus, y, Self::do_sre),
            0x5C => self.addr_absi(bus, x, Self::do_nop_read),
            0x5D => self.addr_absi(bus, x, Self::do_eor),
            0x5E => self.addr_absi_rmw(bus, x, Self::do_lsr),
            0x5F => self.addr_absi_rmw(bus, x, Self::do_sre),

            // RTS - 6 cycles
            0x60 => self.op_rts(bus),
            0x61 => self.addr_izx(bus, Self::do_adc),
            0x62 => self.op_jam(bus),
            // RRA (zp,X) - 8 cycles
            0x63 => self.addr_izx_rmw(bus, Self::do_rra),
            0x64 => self.addr_zp(bus, Self::do_nop_read),
            0x65 => self.addr_zp(bus, Self::do_adc),
            0x66 => self.addr_zp_rmw(bus, Self::do_ror),
            0x67 => self.addr_zp_rmw(bus, Self::do_rra),
            // PLA - 4 cycles
            0x68 => self.op_pull(bus, |cpu, v| {
                cpu.regs.a = v;
                cpu.regs.p.update_nz(v);
            }),
            0x69 => self.addr_imm(bus, Self::do_adc),
            0x6A => self.op_implied(bus, |cpu| cpu.regs.a = cpu.do_ror(cpu.regs.a)),
            // ARR imm - 2 cycles
            0x6B => self.addr_imm(bus, Self::do_arr),
            // JMP (ind) - 5 cycles
            0x6C => self.op_jmp_ind(bus),
            0x6D => self.addr_abs(bus, Self::do_adc),
            0x6E => self.addr_abs_rmw(bus, Self::do_ror),
            0x6F => self.addr_abs_rmw(bus, Self::do_rra),

            // BVS rel
            0x70 => self.op_branch(bus, self.regs.p.is_set(V)),
            0x71 => self.addr_izy(bus, Self::do_adc),
            0x72 => self.op_jam(bus),
            0x73 => self.addr_izy_rmw(bus, Self::do_rra),
            0x74 => self.addr_zpi(bus, x, Self::do_nop_read),
            0x75 => self.addr_zpi(bus, x, Self::do_adc),
            0x76 => self.addr_zpi_rmw(bus, x, Self::do_ror),
            0x77 => self.addr_zpi_rmw(bus, x, Self::do_rra),
            // SEI
            0x78 => self.op_implied(bus, |cpu| cpu.regs.p.set(I)),
            0x79 => self.addr_absi(bus, y, Self::do_adc),
            0x7A => self.op_implied(bus, |_| {}),
            0x7B => self.addr_absi_rmw(bus, y, Self::do_rra),
            0x7C => self.addr_absi(bus, x, Self::do_nop_read),
            0x7D => self.addr_absi(bus, x, Self::do_adc),
            0x7E => self.addr_absi_rmw(bus, x, Self::do_ror),
            0x7F => self.addr_absi_rmw(bus, x, Self::do_rra),

            // NOP imm - 2 cycles
            0x80 | 0x82 | 0x89 | 0xC2 | 0xE2 => self.addr_imm(bus, Self::do_nop_read),
            // STA (zp,X) - 6 cycles
            0x81 => self.addr_izx_w(bus, |cpu| cpu.regs.a),
            // SAX (zp,X) - 6 cycles
            0x83 => self.addr_izx_w(bus, |cpu| cpu.regs.a & cpu.regs.x),
            0x84 => self.addr_zp_w(bus, |cpu| cpu.regs.y),
            0x85 => self.addr_zp_w(bus, |cpu| cpu.regs.a),
            0x86 => self.addr_zp_w(bus, |cpu| cpu.regs.x),
            0x87 => self.addr_zp_w(bus, |cpu| cpu.regs.a & cpu.regs.x),
            // DEY
            0x88 => self.op_implied(bus, |cpu| {
                cpu.regs.y = cpu.regs.y.wrapping_sub(1);
                cpu.regs.p.update_nz(cpu.regs.y);
            }),
            // TXA
            0x8A => self.op_implied(bus, |cpu| {
                cpu.regs.a = cpu.regs.x;
                cpu.regs.p.update_nz(cpu.regs.a);
            }),
            // ANE imm - 2 cycles (unstable; $EE magic constant)
            0x8B => self.addr_imm(bus, Self::do_ane),
            0x8C => self.addr_abs_w(bus, |cpu| cpu.regs.y),
            0x8D => self.addr_abs_w(bus, |cpu| cpu.regs.a),
            0x8E => self.addr_abs_w(bus, |cpu| cpu.regs.x),
            0x8F => self.addr_abs_w(bus, |cpu| cpu.regs.a & cpu.regs.x),

            // BCC rel
            0x90 => self.op_branch(bus, !self.regs.p.is_set(C)),
            // STA (zp),Y - 6 cycles
            0x91 => self.addr_izy_w(bus, |cpu| cpu.regs.a),
            0x92 => self.op_jam(bus),
            // SHA (zp),Y - 6 cycles
            0x93 => self.addr_izy_unstable(bus, |cpu| cpu.regs.a & cpu.regs.x),
            0x94 => self.addr_zpi_w(bus, x, |cpu| cpu.regs.y),
            0x95 => self.addr_zpi_w(bus, x, |cpu| cpu.regs.a),
            0x96 => self.addr_zpi_w(bus, y, |cpu| cpu.regs.x),
            0x97 => self.addr_zpi_w(bus, y, |cpu| cpu.regs.a & cpu.regs.x),
            // TYA
            0x98 => self.op_implied(bus, |cpu| {
                cpu.regs.a = cpu.regs.y;
                cpu.regs.p.update_nz(cpu.regs.a);
            }),
            // STA abs,Y - 5 cycles
            0x99 => self.addr_absi_w(bus, y, |cpu| cpu.regs.a),
            // TXS (no flags)
            0x9A => self.op_implied(bus, |cpu| cpu.regs.s = cpu.regs.x),
            // TAS abs,Y - 5 cycles
            0x9B => self.addr_absi_unstable(bus, y, |cpu| {
                cpu.regs.s = cpu.regs.a & cpu.regs.x;
                cpu.regs.s
            }),
            // SHY abs,X - 5 cycles
            0x9C => self.addr_absi_unstable(bus, x, |cpu| cpu.regs.y),
            0x9D => self.addr_absi_w(bus, x, |cpu| cpu.regs.a),
            // SHX abs,Y - 5 cycles
            0x9E => self.addr_absi_unstable(bus, y, |cpu| cpu.regs.x),
            // SHA abs,Y - 5 cycles
            0x9F => self.addr_absi_unstable(bus, y, |cpu| cpu.regs.a & cpu.regs.x),

            0xA0 => self.addr_imm(bus, Self::do_ldy),
            0xA1 => self.addr_izx(bus, Self::do_lda),
            0xA2 => self.addr_imm(bus, Self::do_ldx),
            // LAX (zp,X) - 6 cycles
            0xA3 => self.addr_izx(bus, Self::do_lax),
            0xA4 => self.addr_zp(bus, Self::do_ldy),
            0xA5 => self.addr_zp(bus, Self::do_lda),
            0xA6 => self.addr_zp(bus, Self::do_ldx),
            0xA7 => self.addr_zp(bus, Self::do_lax),
            // TAY
            0xA8 => self.op_implied(bus, |cpu| {
                cpu.regs.y = cpu.regs.a;
                cpu.regs.p.update_nz(cpu.regs.y);
            }),
            0xA9 => self.addr_imm(bus, Self::do_lda),
            // TAX
            0xAA => self.op_implied(bus, |cpu| {
                cpu.regs.x = cpu.regs.a;
                cpu.regs.p.update_nz(cpu.regs.x);
            }),
            // LXA imm - 2 cycles (unstable; $EE magic constant)
            0xAB => self.addr_imm(bus, Self::do_lxa),
            0xAC => self.addr_abs(bus, Self::do_ldy),
            0xAD => self.addr_abs(bus, Self::do_lda),
            0xAE => self.addr_abs(bus, Self::do_ldx),
            0xAF => self.addr_abs(bus, Self::do_lax),

            // BCS rel
            0xB0 => self.op_branch(bus, self.regs.p.is_set(C)),
            0xB1 => self.addr_izy(bus, Self::do_lda),
            0xB2 => self.op_jam(bus),
            0xB3 => self.addr_izy(bus, Self::do_lax),
            0xB4 => self.addr_zpi(bus, x, Self::do_ldy),
            0xB5 => self.addr_zpi(bus, x, Self::do_lda),
            0xB6 => self.addr_zpi(bus, y, Self::do_ldx),
            0xB7 => self.addr_zpi(bus, y, Self::do_lax),
            // CLV
            0xB8 => self.op_implied(bus, |cpu| cpu.regs.p.clear(V)),
            0xB9 => self.addr_absi(bus, y, Self::do_lda),
            // TSX
            0xBA => self.op_implied(bus, |cpu| {
                cpu.regs.x = cpu.regs.s;
                cpu.regs.p.update_nz(cpu.regs.x);
            }),
            // LAS abs,Y - 4/5 cycles
            0xBB => self.addr_absi(bus, y, Self::do_las),
            0xBC => self.addr_absi(bus, x, Self::do_ldy),
            0xBD => self.addr_absi(bus, x, Self::do_lda),
            0xBE => self.addr_absi(bus, y, Self::do_ldx),
            0xBF => self.addr_absi(bus, y, Self::do_lax),

            0xC0 => self.addr_imm(bus, Self::do_cpy),
            0xC1 => self.addr_izx(bus, Self::do_cmp),
            // DCP (zp,X) - 8 cycles
            0xC3 => self.addr_izx_rmw(bus, Self::do_dcp),
            0xC4 => self.addr_zp(bus, Self::do_cpy),
            0xC5 => self.addr_zp(bus, Self::do_cmp),
            0xC6 => self.addr_zp_rmw(bus, Self::do_dec),
            0xC7 => self.addr_zp_rmw(bus, Self::do_dcp),
            // INY
            0xC8 => self.op_implied(bus, |cpu| {
                cpu.regs.y = cpu.regs.y.wrapping_add(1);
                cpu.regs.p.update_nz(cpu.regs.y);
            }),
            0xC9 => self.addr_imm(bus, Self::do_cmp),
            // DEX
            0xCA => self.op_implied(bus, |cpu| {
                cpu.regs.x = cpu.regs.x.wrapping_sub(1);
                cpu.regs.p.update_nz(cpu.regs.x);
            }),
            // SBX imm - 2 cycles
            0xCB => self.addr_imm(bus, Self::do_sbx),
            0xCC => self.addr_abs(bus, Self::do_cpy),
            0xCD => self.addr_abs(bus, Self::do_cmp),
            0xCE => self.addr_abs_rmw(bus, Self::do_dec),
            0xCF => self.addr_abs_rmw(bus, Self::do_dcp),

            // BNE rel
            0xD0 => self.op_branch(bus, !self.regs.p.is_set(Z)),
            0xD1 => self.addr_izy(bus, Self::do_cmp),
            0xD2 => self.op_jam(bus),
            0xD3 => self.addr_izy_rmw(bus, Self::do_dcp),
            0xD4 => self.addr_zpi(bus, x, Self::do_nop_read),
            0xD5 => self.addr_zpi(bus, x, Self::do_cmp),
            0xD6 => self.addr_zpi_rmw(bus, x, Self::do_dec),
            0xD7 => self.addr_zpi_rmw(bus, x, Self::do_dcp),
            // CLD
            0xD8 => self.op_implied(bus, |cpu| cpu.regs.p.clear(D)),
            0xD9 => self.addr_absi(bus, y, Self::do_cmp),
            0xDA => self.op_implied(bus, |_| {}),
            0xDB => self.addr_absi_rmw(bus, y, Self::do_dcp),
            0xDC => self.addr_absi(bus, x, Self::do_nop_read),
            0xDD => self.addr_absi(bus, x, Self::do_cmp),
            0xDE => self.addr_absi_rmw(bus, x, Self::do_dec),
            0xDF => self.addr_absi_rmw(bus, x, Self::do_dcp),

            0xE0 => self.addr_imm(bus, Self::do_cpx),
            0xE1 => self.addr_izx(bus, Self::do_sbc),
            // ISC (zp,X) - 8 cycles
            0xE3 => self.addr_izx_rmw(bus, Self::do_isc),
            0xE4 => self.addr_zp(bus, Self::do_cpx),
            0xE5 => self.addr_zp(bus, Self::do_sbc),
            0xE6 => self.addr_zp_rmw(bus, Self::do_inc),
            0xE7 => self.addr_zp_rmw(bus, Self::do_isc),
            // INX
            0xE8 => self.op_implied(bus, |cpu| {
                cpu.regs.x = cpu.regs.x.wrapping_add(1);
                cpu.regs.p.update_nz(cpu.regs.x);
            }),
            // SBC imm ($EB is an undocumented alias)
            0xE9 | 0xEB => self.addr_imm(bus, Self::do_sbc),
            // NOP
            0xEA => self.op_implied(bus, |_| {}),
            0xEC => self.addr_abs(bus, Self::do_cpx),
            0xED => self.addr_abs(bus, Self::do_sbc),
            0xEE => self.addr_abs_rmw(bus, Self::do_inc),
            0xEF => self.addr_abs_rmw(bus, Self::do_isc),

            // BEQ rel
            0xF0 => self.op_branch(bus, self.regs.p.is_set(Z)),
            0xF1 => self.addr_izy(bus, Self::do_sbc),
            0xF2 => self.op_jam(bus),
            0xF3 => self.addr_izy_rmw(bus, Self::do_isc),
            0xF4 => self.addr_zpi(bus, x, Self::do_nop_read),
            0xF5 => self.addr_zpi(bus, x, Self::do_sbc),
            0xF6 => self.addr_zpi_rmw(bus, x, Self::do_inc),
            0xF7 => self.addr_zpi_rmw(bus, x, Self::do_isc),
            // SED
            0xF8 => self.op_implied(bus, |cpu| cpu.regs.p.set(D)),
            0xF9 => self.addr_absi(bus, y, Self::do_sbc),
            0xFA => self.op_implied(bus, |_| {}),
            0xFB => self.addr_absi_rmw(bus, y, Self::do_isc),
            0xFC => self.addr_absi(bus, x, Self::do_nop_read),
            0xFD => self.addr_absi(bus, x, Self::do_sbc),
            0xFE => self.addr_absi_rmw(bus, x, Self::do_inc),
            0xFF => self.addr_absi_rmw(bus, x, Self::do_isc),
        }
    }

    /// Finish current instruction and return to opcode fetch.
    fn finish(&mut self) {
        self.state = State::FetchOpcode;
        self.cycle = 0;
    }

    /// Fetch the byte at PC and advance PC.
    fn fetch<B: Bus>(&mut self, bus: &mut B) -> u8 {
        let value = bus.read(self.regs.pc);
        self.regs.pc = self.regs.pc.wrapping_add(1);
        value
    }

    // ========================================================================
    // Addressing mode helpers - read operations
    // ========================================================================

    /// Immediate addressing: operand is next byte.
    fn addr_imm<B: Bus>(&mut self, bus: &mut B, op: fn(&mut Self, u8)) {
        if self.cycle == 1 {
            self.data = self.fetch(bus);
            op(self, self.data);
            self.finish();
        } else {
            self.raise_fault();
        }
    }

    /// Zero page addressing.
    fn addr_zp<B: Bus>(&mut self, bus: &mut B, op: fn(&mut Self, u8)) {
        match self.cycle {
            1 => {
                self.addr = u16::from(self.fetch(bus));
                self.cycle = 2;
            }
            2 => {
                self.data = bus.read(self.addr);
                op(self, self.data);
                self.finish();
            }
            _ => self.raise_fault(),
        }
    }

    /// Zero page indexed (zp,X or zp,Y). The sum wraps within page zero.
    fn addr_zpi<B: Bus>(&mut self, bus: &mut B, index: u8, op: fn(&mut Self, u8)) {
        match self.cycle {
            1 => {
                self.pointer = self.fetch(bus);
                self.cycle = 2;
            }
            2 => {
                // Dummy read of the unindexed address while adding
                let _ = bus.read(u16::from(self.pointer));
                self.addr = u16::from(self.pointer.wrapping_add(index));
                self.cycle = 3;
            }
            3 => {
                self.data = bus.read(self.addr);
                op(self, self.data);
                self.finish();
            }
            _ => self.raise_fault(),
        }
    }

    /// Absolute addressing.
    fn addr_abs<B: Bus>(&mut self, bus: &mut B, op: fn(&mut Self, u8)) {
        match self.cycle {
            1 => {
                self.addr = u16::from(self.fetch(bus));
                self.cycle = 2;
            }
            2 => {
                self.addr |= u16::from(self.fetch(bus)) << 8;
                self.cycle = 3;
            }
            3 => {
                self.data = bus.read(self.addr);
                op(self, self.data);
                self.finish();
            }
            _ => self.raise_fault(),
        }
    }

    /// Cycle 2 of abs,X / abs,Y: fetch the high byte and add the index to
    /// the low byte only. Sets `data` to 1 if the page must be fixed up.
    fn index_absolute<B: Bus>(&mut self, bus: &mut B, index: u8) {
        let hi = self.fetch(bus);
        self.pointer = hi;
        let (lo, carry) = (self.addr as u8).overflowing_add(index);
        self.addr = u16::from(lo) | (u16::from(hi) << 8);
        self.data = u8::from(carry);
    }

    /// Absolute indexed (abs,X or abs,Y) with the page-cross penalty.
    fn addr_absi<B: Bus>(&mut self, bus: &mut B, index: u8, op: fn(&mut Self, u8)) {
        match self.cycle {
            1 => {
                self.addr = u16::from(self.fetch(bus));
                self.cycle = 2;
            }
            2 => {
                self.index_absolute(bus, index);
                self.cycle = 3;
            }
            3 => {
                if self.data != 0 {
                    // Page crossed - dummy read from the unfixed address
                    let _ = bus.read(self.addr);
                    self.addr = self.addr.wrapping_add(0x100);
                    self.cycle = 4;
                } else {
                    self.data = bus.read(self.addr);
                    op(self, self.data);
                    self.finish();
                }
            }
            4 => {
                self.data = bus.read(self.addr);
                op(self, self.data);
                self.finish();
            }
            _ => self.raise_fault(),
        }
    }

    /// Indexed indirect (zp,X) addressing.
    fn addr_izx<B: Bus>(&mut self, bus: &mut B, op: fn(&mut Self, u8)) {
        match self.cycle {
            1..=4 => self.izx_pointer(bus),
            5 => {
                self.data = bus.read(self.addr);
                op(self, self.data);
                self.finish();
            }
            _ => self.raise_fault(),
        }
    }

    /// Cycles 1-4 of (zp,X): fetch pointer, dummy read, read address.
    fn izx_pointer<B: Bus>(&mut self, bus: &mut B) {
        match self.cycle {
            1 => {
                self.pointer = self.fetch(bus);
            }
            2 => {
                let _ = bus.read(u16::from(self.pointer));
                self.pointer = self.pointer.wrapping_add(self.regs.x);
            }
            3 => {
                self.addr = u16::from(bus.read(u16::from(self.pointer)));
            }
            _ => {
                // High byte wraps within page zero
                self.addr |= u16::from(bus.read(u16::from(self.pointer.wrapping_add(1)))) << 8;
            }
        }
        self.cycle += 1;
    }

    /// Cycles 1-3 of (zp),Y: fetch pointer and base address, add Y to the
    /// low byte. Sets `data` to 1 on page cross.
    fn izy_pointer<B: Bus>(&mut self, bus: &mut B) {
        match self.cycle {
            1 => {
                self.pointer = self.fetch(bus);
            }
            2 => {
                self.addr = u16::from(bus.read(u16::from(self.pointer)));
            }
            _ => {
                let hi = bus.read(u16::from(self.pointer.wrapping_add(1)));
                self.pointer = hi;
                let (lo, carry) = (self.addr as u8).overflowing_add(self.regs.y);
                self.addr = u16::from(lo) | (u16::from(hi) << 8);
                self.data = u8::from(carry);
            }
        }
        self.cycle += 1;
    }

    /// Indirect indexed (zp),Y addressing.
    fn addr_izy<B: Bus>(&mut self, bus: &mut B, op: fn(&mut Self, u8)) {
        match self.cycle {
            1..=3 => self.izy_pointer(bus),
            4 => {
                if self.data != 0 {
                    let _ = bus.read(self.addr);
                    self.addr = self.addr.wrapping_add(0x100);
                    self.cycle = 5;
                } else {
                    self.data = bus.read(self.addr);
                    op(self, self.data);
                    self.finish();
                }
            }
            5 => {
                self.data = bus.read(self.addr);
                op(self, self.data);
                self.finish();
            }
            _ => self.raise_fault(),
        }
    }

    // ========================================================================
    // Addressing mode helpers - write operations
    // ========================================================================

    /// Zero page write.
    fn addr_zp_w<B: Bus>(&mut self, bus: &mut B, val: fn(&Self) -> u8) {
        match self.cycle {
            1 => {
                self.addr = u16::from(self.fetch(bus));
                self.cycle = 2;
            }
            2 => {
                bus.write(self.addr, val(self));
                self.finish();
            }
            _ => self.raise_fault(),
        }
    }

    /// Zero page indexed write.
    fn addr_zpi_w<B: Bus>(&mut self, bus: &mut B, index: u8, val: fn(&Self) -> u8) {
        match self.cycle {
            1 => {
                self.pointer = self.fetch(bus);
                self.cycle = 2;
            }
            2 => {
                let _ = bus.read(u16::from(self.pointer));
                self.addr = u16::from(self.pointer.wrapping_add(index));
                self.cycle = 3;
            }
            3 => {
                bus.write(self.addr, val(self));
                self.finish();
            }
            _ => self.raise_fault(),
        }
    }

    /// Absolute write.
    fn addr_abs_w<B: Bus>(&mut self, bus: &mut B, val: fn(&Self) -> u8) {
        match self.cycle {
            1 => {
                self.addr = u16::from(self.fetch(bus));
                self.cycle = 2;
            }
            2 => {
                self.addr |= u16::from(self.fetch(bus)) << 8;
                self.cycle = 3;
            }
            3 => {
                bus.write(self.addr, val(self));
                self.finish();
            }
            _ => self.raise_fault(),
        }
    }

    /// Absolute indexed write (always 5 cycles, always a dummy read).
    fn addr_absi_w<B: Bus>(&mut self, bus: &mut B, index: u8, val: fn(&Self) -> u8) {
        match self.cycle {
            1 => {
                self.addr = u16::from(self.fetch(bus));
                self.cycle = 2;
            }
            2 => {
                self.index_absolute(bus, index);
                self.cycle = 3;
            }
            3 => {
                let _ = bus.read(self.addr);
                if self.data != 0 {
                    self.addr = self.addr.wrapping_add(0x100);
                }
                self.cycle = 4;
            }
            4 => {
                bus.write(self.addr, val(self));
                self.finish();
            }
            _ => self.raise_fault(),
        }
    }

    /// (zp,X) write.
    fn addr_izx_w<B: Bus>(&mut self, bus: &mut B, val: fn(&Self) -> u8) {
        match self.cycle {
            1..=4 => self.izx_pointer(bus),
            5 => {
                bus.write(self.addr, val(self));
                self.finish();
            }
            _ => self.raise_fault(),
        }
    }

    /// (zp),Y write (always 6 cycles).
    fn addr_izy_w<B: Bus>(&mut self, bus: &mut B, val: fn(&Self) -> u8) {
        match self.cycle {
            1..=3 => self.izy_pointer(bus),
            4 => {
                let _ = bus.read(self.addr);
                if self.data != 0 {
                    self.addr = self.addr.wrapping_add(0x100);
                }
                self.cycle = 5;
            }
            5 => {
                bus.write(self.addr, val(self));
                self.finish();
            }
            _ => self.raise_fault(),
        }
    }

    /// SHA/SHX/SHY/TAS abs,X / abs,Y: the stored value is ANDed with the
    /// base address high byte + 1, and on a page cross that value also
    /// replaces the high byte of the target address.
    fn addr_absi_unstable<B: Bus>(&mut self, bus: &mut B, index: u8, val: fn(&mut Self) -> u8) {
        match self.cycle {
            1 => {
                self.addr = u16::from(self.fetch(bus));
                self.cycle = 2;
            }
            2 => {
                self.index_absolute(bus, index);
                self.cycle = 3;
            }
            3 => {
                let _ = bus.read(self.addr);
                self.cycle = 4;
            }
            4 => {
                self.store_unstable(bus, val);
                self.finish();
            }
            _ => self.raise_fault(),
        }
    }

    /// SHA (zp),Y.
    fn addr_izy_unstable<B: Bus>(&mut self, bus: &mut B, val: fn(&mut Self) -> u8) {
        match self.cycle {
            1..=3 => self.izy_pointer(bus),
            4 => {
                let _ = bus.read(self.addr);
                self.cycle = 5;
            }
            5 => {
                self.store_unstable(bus, val);
                self.finish();
            }
            _ => self.raise_fault(),
        }
    }

    fn store_unstable<B: Bus>(&mut self, bus: &mut B, val: fn(&mut Self) -> u8) {
        let value = val(self) & self.pointer.wrapping_add(1);
        if self.data != 0 {
            self.addr = (self.addr & 0x00FF) | (u16::from(value) << 8);
        }
        bus.write(self.addr, value);
    }

    // ========================================================================
    // Addressing mode helpers - read-modify-write operations
    // ========================================================================

    /// The last three cycles every RMW shares: read, write back the
    /// unmodified value, write the result.
    fn rmw_tail<B: Bus>(&mut self, bus: &mut B, first: u8, op: fn(&mut Self, u8) -> u8) {
        match self.cycle - first {
            0 => {
                self.data = bus.read(self.addr);
                self.cycle += 1;
            }
            1 => {
                bus.write(self.addr, self.data);
                self.data = op(self, self.data);
                self.cycle += 1;
            }
            _ => {
                bus.write(self.addr, self.data);
                self.finish();
            }
        }
    }

    /// Zero page read-modify-write - 5 cycles.
    fn addr_zp_rmw<B: Bus>(&mut self, bus: &mut B, op: fn(&mut Self, u8) -> u8) {
        match self.cycle {
            1 => {
                self.addr = u16::from(self.fetch(bus));
                self.cycle = 2;
            }
            2..=4 => self.rmw_tail(bus, 2, op),
            _ => self.raise_fault(),
        }
    }

    /// Zero page indexed read-modify-write - 6 cycles.
    fn addr_zpi_rmw<B: Bus>(&mut self, bus: &mut B, index: u8, op: fn(&mut Self, u8) -> u8) {
        match self.cycle {
            1 => {
                self.pointer = self.fetch(bus);
                self.cycle = 2;
            }
            2 => {
                let _ = bus.read(u16::from(self.pointer));
                self.addr = u16::from(self.pointer.wrapping_add(index));
                self.cycle = 3;
            }
            3..=5 => self.rmw_tail(bus, 3, op),
            _ => self.raise_fault(),
        }
    }

    /// Absolute read-modify-write - 6 cycles.
    fn addr_abs_rmw<B: Bus>(&mut self, bus: &mut B, op: fn(&mut Self, u8) -> u8) {
        match self.cycle {
            1 => {
                self.addr = u16::from(self.fetch(bus));
                self.cycle = 2;
            }
            2 => {
                self.addr |= u16::from(self.fetch(bus)) << 8;
                self.cycle = 3;
            }
            3..=5 => self.rmw_tail(bus, 3, op),
            _ => self.raise_fault(),
        }
    }

    /// Absolute indexed read-modify-write - always 7 cycles.
    fn addr_absi_rmw<B: Bus>(&mut self, bus: &mut B, index: u8, op: fn(&mut Self, u8) -> u8) {
        match self.cycle {
            1 => {
                self.addr = u16::from(self.fetch(bus));
                self.cycle = 2;
            }
            2 => {
                self.index_absolute(bus, index);
                self.cycle = 3;
            }
            3 => {
                let _ = bus.read(self.addr);
                if self.data != 0 {
                    self.addr = self.addr.wrapping_add(0x100);
                }
                self.cycle = 4;
            }
            4..=6 => self.rmw_tail(bus, 4, op),
            _ => self.raise_fault(),
        }
    }

    /// (zp,X) read-modify-write - 8 cycles (undocumented opcodes only).
    fn addr_izx_rmw<B: Bus>(&mut self, bus: &mut B, op: fn(&mut Self, u8) -> u8) {
        match self.cycle {
            1..=4 => self.izx_pointer(bus),
            5..=7 => self.rmw_tail(bus, 5, op),
            _ => self.raise_fault(),
        }
    }

    /// (zp),Y read-modify-write - 8 cycles (undocumented opcodes only).
    fn addr_izy_rmw<B: Bus>(&mut self, bus: &mut B, op: fn(&mut Self, u8) -> u8) {
        match self.cycle {
            1..=3 => self.izy_pointer(bus),
            4 => {
                let _ = bus.read(self.addr);
                if self.data != 0 {
                    self.addr = self.addr.wrapping_add(0x100);
                }
                self.cycle = 5;
            }
            5..=7 => self.rmw_tail(bus, 5, op),
            _ => self.raise_fault(),
        }
    }

    // ========================================================================
    // ALU operations
    // ========================================================================

    fn do_lda(&mut self, val: u8) {
        self.regs.a = val;
        self.regs.p.update_nz(val);
    }

    fn do_ldx(&mut self, val: u8) {
        self.regs.x = val;
        self.regs.p.update_nz(val);
    }

    fn do_ldy(&mut self, val: u8) {
        self.regs.y = val;
        self.regs.p.update_nz(val);
    }

    fn do_ora(&mut self, val: u8) {
        self.regs.a |= val;
        self.regs.p.update_nz(self.regs.a);
    }

    fn do_and(&mut self, val: u8) {
        self.regs.a &= val;
        self.regs.p.update_nz(self.regs.a);
    }

    fn do_eor(&mut self, val: u8) {
        self.regs.a ^= val;
        self.regs.p.update_nz(self.regs.a);
    }

    fn do_nop_read(&mut self, _val: u8) {}

    fn do_adc(&mut self, val: u8) {
        if self.regs.p.is_set(D) {
            self.do_adc_decimal(val);
        } else {
            self.do_adc_binary(val);
        }
    }

    fn do_adc_binary(&mut self, val: u8) {
        let a = self.regs.a;
        let carry = u16::from(self.regs.p.is_set(C));
        let sum = u16::from(a) + u16::from(val) + carry;
        let result = sum as u8;

        self.regs.p.set_if(C, sum > 0xFF);
        self.regs
            .p
            .set_if(V, (a ^ result) & (val ^ result) & 0x80 != 0);
        self.regs.a = result;
        self.regs.p.update_nz(result);
    }

    /// NMOS decimal add: Z comes from the binary sum, N and V from the
    /// intermediate high nybble before its decimal adjust.
    fn do_adc_decimal(&mut self, val: u8) {
        let a = u16::from(self.regs.a);
        let v = u16::from(val);
        let carry = u16::from(self.regs.p.is_set(C));

        let mut lo = (a & 0x0F) + (v & 0x0F) + carry;
        let mut hi = (a >> 4) + (v >> 4);
        if lo > 9 {
            lo += 6;
        }
        if lo > 0x0F {
            hi += 1;
        }

        self.regs.p.set_if(Z, (a + v + carry) & 0xFF == 0);
        self.regs.p.set_if(N, hi & 0x08 != 0);
        self.regs
            .p
            .set_if(V, ((hi << 4) ^ a) & 0x80 != 0 && (a ^ v) & 0x80 == 0);

        if hi > 9 {
            hi += 6;
        }
        self.regs.p.set_if(C, hi > 0x0F);
        self.regs.a = ((hi << 4) | (lo & 0x0F)) as u8;
    }

    fn do_sbc(&mut self, val: u8) {
        if self.regs.p.is_set(D) {
            self.do_sbc_decimal(val);
        } else {
            // SBC is ADC with inverted operand
            self.do_adc_binary(!val);
        }
    }

    /// NMOS decimal subtract: all flags come from the binary result.
    fn do_sbc_decimal(&mut self, val: u8) {
        let a = self.regs.a;
        let borrow = i16::from(!self.regs.p.is_set(C));

        let bin_result = i16::from(a) - i16::from(val) - borrow;
        self.regs.p.set_if(C, bin_result >= 0);
        self.regs.p.set_if(Z, (bin_result as u8) == 0);
        self.regs.p.set_if(N, bin_result & 0x80 != 0);
        self.regs.p.set_if(
            V,
            (i16::from(a) ^ bin_result) & (i16::from(a) ^ i16::from(val)) & 0x80 != 0,
        );

        let mut lo = i16::from(a & 0x0F) - i16::from(val & 0x0F) - borrow;
        let mut hi = i16::from(a >> 4) - i16::from(val >> 4);
        if lo < 0 {
            lo -= 6;
            hi -= 1;
        }
        if hi < 0 {
            hi -= 6;
        }

        self.regs.a = ((hi << 4) as u8) | ((lo & 0x0F) as u8);
    }

    fn compare(&mut self, reg: u8, val: u8) {
        self.regs.p.set_if(C, reg >= val);
        self.regs.p.update_nz(reg.wrapping_sub(val));
    }

    fn do_cmp(&mut self, val: u8) {
        self.compare(self.regs.a, val);
    }

    fn do_cpx(&mut self, val: u8) {
        self.compare(self.regs.x, val);
    }

    fn do_cpy(&mut self, val: u8) {
        self.compare(self.regs.y, val);
    }

    fn do_bit(&mut self, val: u8) {
        self.regs.p.set_if(Z, self.regs.a & val == 0);
        self.regs.p.set_if(N, val & 0x80 != 0);
        self.regs.p.set_if(V, val & 0x40 != 0);
    }

    fn do_asl(&mut self, val: u8) -> u8 {
        self.regs.p.set_if(C, val & 0x80 != 0);
        let result = val << 1;
        self.regs.p.update_nz(result);
        result
    }

    fn do_lsr(&mut self, val: u8) -> u8 {
        self.regs.p.set_if(C, val & 0x01 != 0);
        let result = val >> 1;
        self.regs.p.update_nz(result);
        result
    }

    fn do_rol(&mut self, val: u8) -> u8 {
        let carry = u8::from(self.regs.p.is_set(C));
        self.regs.p.set_if(C, val & 0x80 != 0);
        let result = (val << 1) | carry;
        self.regs.p.update_nz(result);
        result
    }

    fn do_ror(&mut self, val: u8) -> u8 {
        let carry = if self.regs.p.is_set(C) { 0x80 } else { 0 };
        self.regs.p.set_if(C, val & 0x01 != 0);
        let result = (val >> 1) | carry;
        self.regs.p.update_nz(result);
        result
    }

    fn do_inc(&mut self, val: u8) -> u8 {
        let result = val.wrapping_add(1);
        self.regs.p.update_nz(result);
        result
    }

    fn do_dec(&mut self, val: u8) -> u8 {
        let result = val.wrapping_sub(1);
        self.regs.p.update_nz(result);
        result
    }

    // ========================================================================
    // Undocumented ALU operations
    // ========================================================================

    fn do_slo(&mut self, val: u8) -> u8 {
        let result = self.do_asl(val);
        self.do_ora(result);
        result
    }

    fn do_rla(&mut self, val: u8) -> u8 {
        let result = self.do_rol(val);
        self.do_and(result);
        result
    }

    fn do_sre(&mut self, val: u8) -> u8 {
        let result = self.do_lsr(val);
        self.do_eor(result);
        result
    }

    fn do_rra(&mut self, val: u8) -> u8 {
        let result = self.do_ror(val);
        self.do_adc(result);
        result
    }

    fn do_dcp(&mut self, val: u8) -> u8 {
        let result = val.wrapping_sub(1);
        self.do_cmp(result);
        result
    }

    fn do_isc(&mut self, val: u8) -> u8 {
        let result = val.wrapping_add(1);
        self.do_sbc(result);
        result
    }

    fn do_lax(&mut self, val: u8) {
        self.regs.a = val;
        self.regs.x = val;
        self.regs.p.update_nz(val);
    }

    fn do_las(&mut self, val: u8) {
        let result = val & self.regs.s;
        self.regs.a = result;
        self.regs.x = result;
        self.regs.s = result;
        self.regs.p.update_nz(result);
    }

    fn do_anc(&mut self, val: u8) {
        self.do_and(val);
        self.regs.p.set_if(C, self.regs.a & 0x80 != 0);
    }

    fn do_alr(&mut self, val: u8) {
        self.regs.a = self.do_lsr(self.regs.a & val);
    }

    fn do_arr(&mut self, val: u8) {
        let t = self.regs.a & val;
        let carry_in = if self.regs.p.is_set(C) { 0x80 } else { 0 };
        let mut result = (t >> 1) | carry_in;

        if self.regs.p.is_set(D) {
            self.regs.p.set_if(N, carry_in != 0);
            self.regs.p.set_if(Z, result == 0);
            self.regs.p.set_if(V, (t ^ result) & 0x40 != 0);
            if (t & 0x0F) + (t & 0x01) > 0x05 {
                result = (result & 0xF0) | (result.wrapping_add(0x06) & 0x0F);
            }
            if u16::from(t & 0xF0) + u16::from(t & 0x10) > 0x50 {
                self.regs.p.set(C);
                result = result.wrapping_add(0x60);
            } else {
                self.regs.p.clear(C);
            }
        } else {
            self.regs.p.update_nz(result);
            self.regs.p.set_if(C, result & 0x40 != 0);
            self.regs
                .p
                .set_if(V, ((result >> 6) ^ (result >> 5)) & 0x01 != 0);
        }
        self.regs.a = result;
    }

    fn do_sbx(&mut self, val: u8) {
        let ax = self.regs.a & self.regs.x;
        self.regs.p.set_if(C, ax >= val);
        self.regs.x = ax.wrapping_sub(val);
        self.regs.p.update_nz(self.regs.x);
    }

    fn do_ane(&mut self, val: u8) {
        self.regs.a = (self.regs.a | 0xEE) & self.regs.x & val;
        self.regs.p.update_nz(self.regs.a);
    }

    fn do_lxa(&mut self, val: u8) {
        let result = (self.regs.a | 0xEE) & val;
        self.regs.a = result;
        self.regs.x = result;
        self.regs.p.update_nz(result);
    }

    // ========================================================================
    // Individual instruction implementations
    // ========================================================================

    /// BRK and the hardware interrupt/reset sequences share one micro-code.
    /// Reset enters at cycle 0 (one extra dummy read) and turns the three
    /// stack pushes into reads.
    fn op_brk<B: Bus>(&mut self, bus: &mut B) {
        match self.cycle {
            0 => {
                let _ = bus.read(self.regs.pc);
                self.cycle = 1;
            }
            1 => {
                // BRK skips its padding byte; interrupts re-read PC
                let _ = bus.read(self.regs.pc);
                if self.sequence == Sequence::Brk {
                    self.regs.pc = self.regs.pc.wrapping_add(1);
                }
                self.cycle = 2;
            }
            2 => {
                self.push_or_read(bus, (self.regs.pc >> 8) as u8);
                self.cycle = 3;
            }
            3 => {
                self.push_or_read(bus, self.regs.pc as u8);
                self.cycle = 4;
            }
            4 => {
                let status = if self.sequence == Sequence::Brk {
                    self.regs.p.to_byte_brk()
                } else {
                    self.regs.p.to_byte_irq()
                };
                self.push_or_read(bus, status);
                self.regs.p.set(I);
                self.vector = match self.sequence {
                    Sequence::Reset => 0xFFFC,
                    Sequence::Nmi => 0xFFFA,
                    // An NMI arriving during BRK/IRQ hijacks the vector
                    Sequence::Brk | Sequence::Irq if self.nmi_edge => {
                        self.nmi_edge = false;
                        self.nmi_poll = false;
                        0xFFFA
                    }
                    Sequence::Brk | Sequence::Irq => 0xFFFE,
                };
                self.cycle = 5;
            }
            5 => {
                self.addr = u16::from(bus.read(self.vector));
                self.cycle = 6;
            }
            6 => {
                self.addr |= u16::from(bus.read(self.vector.wrapping_add(1))) << 8;
                self.regs.pc = self.addr;
                self.sequence = Sequence::Brk;
                self.finish();
            }
            _ => self.raise_fault(),
        }
    }

    fn push_or_read<B: Bus>(&mut self, bus: &mut B, value: u8) {
        let addr = self.regs.push();
        if self.sequence == Sequence::Reset {
            let _ = bus.read(addr);
        } else {
            bus.write(addr, value);
        }
    }

    /// JAM/KIL: the CPU stops fetching until reset.
    fn op_jam<B: Bus>(&mut self, bus: &mut B) {
        match self.cycle {
            1 => {
                let _ = bus.read(self.regs.pc);
                self.cycle = 2;
            }
            2 => {
                let _ = bus.read(0xFFFF);
                log::warn!(
                    "6502 jammed by opcode ${:02X} at ${:04X}",
                    self.opcode,
                    self.instruction_pc
                );
                self.state = State::Jammed;
            }
            _ => self.raise_fault(),
        }
    }

    fn op_rti<B: Bus>(&mut self, bus: &mut B) {
        match self.cycle {
            1 => {
                let _ = bus.read(self.regs.pc);
                self.cycle = 2;
            }
            2 => {
                let _ = bus.read(self.regs.stack_addr());
                self.cycle = 3;
            }
            3 => {
                let addr = self.regs.pop();
                self.regs.p = Status::from_byte(bus.read(addr));
                self.cycle = 4;
            }
            4 => {
                let addr = self.regs.pop();
                self.addr = u16::from(bus.read(addr));
                self.cycle = 5;
            }
            5 => {
                let addr = self.regs.pop();
                self.addr |= u16::from(bus.read(addr)) << 8;
                self.regs.pc = self.addr;
                self.finish();
            }
            _ => self.raise_fault(),
        }
    }

    fn op_rts<B: Bus>(&mut self, bus: &mut B) {
        match self.cycle {
            1 => {
                let _ = bus.read(self.regs.pc);
                self.cycle = 2;
            }
            2 => {
                let _ = bus.read(self.regs.stack_addr());
                self.cycle = 3;
            }
            3 => {
                let addr = self.regs.pop();
                self.addr = u16::from(bus.read(addr));
                self.cycle = 4;
            }
            4 => {
                let addr = self.regs.pop();
                self.addr |= u16::from(bus.read(addr)) << 8;
                self.cycle = 5;
            }
            5 => {
                // RTS returns to the pulled address + 1
                let _ = bus.read(self.addr);
                self.regs.pc = self.addr.wrapping_add(1);
                self.finish();
            }
            _ => self.raise_fault(),
        }
    }

    fn op_jsr<B: Bus>(&mut self, bus: &mut B) {
        match self.cycle {
            1 => {
                self.addr = u16::from(self.fetch(bus));
                self.cycle = 2;
            }
            2 => {
                // Internal operation (stack read)
                let _ = bus.read(self.regs.stack_addr());
                self.cycle = 3;
            }
            3 => {
                let addr = self.regs.push();
                bus.write(addr, (self.regs.pc >> 8) as u8);
                self.cycle = 4;
            }
            4 => {
                let addr = self.regs.push();
                bus.write(addr, self.regs.pc as u8);
                self.cycle = 5;
            }
            5 => {
                self.addr |= u16::from(bus.read(self.regs.pc)) << 8;
                self.regs.pc = self.addr;
                self.finish();
            }
            _ => self.raise_fault(),
        }
    }

    fn op_jmp_abs<B: Bus>(&mut self, bus: &mut B) {
        match self.cycle {
            1 => {
                self.addr = u16::from(self.fetch(bus));
                self.cycle = 2;
            }
            2 => {
                self.addr |= u16::from(bus.read(self.regs.pc)) << 8;
                self.regs.pc = self.addr;
                self.finish();
            }
            _ => self.raise_fault(),
        }
    }

    fn op_jmp_ind<B: Bus>(&mut self, bus: &mut B) {
        match self.cycle {
            1 => {
                self.addr = u16::from(self.fetch(bus));
                self.cycle = 2;
            }
            2 => {
                self.addr |= u16::from(self.fetch(bus)) << 8;
                self.cycle = 3;
            }
            3 => {
                self.data = bus.read(self.addr);
                self.cycle = 4;
            }
            4 => {
                // The pointer's high byte never carries into the next page
                let hi_addr = (self.addr & 0xFF00) | (self.addr.wrapping_add(1) & 0x00FF);
                let hi = bus.read(hi_addr);
                self.regs.pc = u16::from(self.data) | (u16::from(hi) << 8);
                self.finish();
            }
            _ => self.raise_fault(),
        }
    }

    fn op_branch<B: Bus>(&mut self, bus: &mut B, taken: bool) {
        match self.cycle {
            1 => {
                self.data = self.fetch(bus);
                if taken {
                    self.cycle = 2;
                } else {
                    self.finish();
                }
            }
            2 => {
                let _ = bus.read(self.regs.pc);
                let new_pc = self.regs.pc.wrapping_add(self.data as i8 as u16);
                if (new_pc ^ self.regs.pc) & 0xFF00 != 0 {
                    self.addr = new_pc;
                    self.cycle = 3;
                } else {
                    self.regs.pc = new_pc;
                    self.finish();
                }
            }
            3 => {
                // Page boundary crossed: read from the unfixed address
                let _ = bus.read((self.regs.pc & 0xFF00) | (self.addr & 0x00FF));
                self.regs.pc = self.addr;
                self.finish();
            }
            _ => self.raise_fault(),
        }
    }

    /// PHA/PHP - 3 cycles.
    fn op_push<B: Bus>(&mut self, bus: &mut B, val: fn(&Self) -> u8) {
        match self.cycle {
            1 => {
                let _ = bus.read(self.regs.pc);
                self.cycle = 2;
            }
            2 => {
                let addr = self.regs.push();
                bus.write(addr, val(self));
                self.finish();
            }
            _ => self.raise_fault(),
        }
    }

    /// PLA/PLP - 4 cycles.
    fn op_pull<B: Bus>(&mut self, bus: &mut B, apply: fn(&mut Self, u8)) {
        match self.cycle {
            1 => {
                let _ = bus.read(self.regs.pc);
                self.cycle = 2;
            }
            2 => {
                let _ = bus.read(self.regs.stack_addr());
                self.cycle = 3;
            }
            3 => {
                let addr = self.regs.pop();
                let value = bus.read(addr);
                apply(self, value);
                self.finish();
            }
            _ => self.raise_fault(),
        }
    }

    /// Single-byte implied/accumulator instructions - 2 cycles.
    fn op_implied<B: Bus>(&mut self, bus: &mut B, apply: fn(&mut Self)) {
        if self.cycle == 1 {
            let _ = bus.read(self.regs.pc);
            apply(self);
            self.finish();
        } else {
            self.raise_fault();
        }
    }
}

// ============================================================================
// Trait implementations
// ============================================================================

impl Cpu for Mos6502 {
    type Registers = Registers;

    fn tick<B: Bus>(&mut self, bus: &mut B) {
        self.execute_cycle(bus);
    }

    /// The instruction being executed, or the next one at a boundary.
    fn pc(&self) -> u16 {
        if self.state == State::FetchOpcode {
            self.regs.pc
        } else {
            self.instruction_pc
        }
    }

    fn registers(&self) -> Self::Registers {
        self.regs
    }

    fn is_halted(&self) -> bool {
        matches!(self.state, State::Jammed | State::Faulted)
    }

    fn set_irq(&mut self, asserted: bool) {
        self.irq_line = asserted;
    }

    fn set_nmi(&mut self, asserted: bool) {
        if asserted && !self.nmi_line {
            self.nmi_edge = true;
        }
        self.nmi_line = asserted;
    }

    /// Start the 7-cycle reset sequence. A, X, Y and breakpoints are kept;
    /// S ends at $FD and I is set.
    fn reset(&mut self) {
        self.regs.s = 0x00;
        self.state = State::Execute;
        self.sequence = Sequence::Reset;
        self.opcode = 0x00;
        self.cycle = 0;
        self.addr = 0;
        self.data = 0;
        self.pointer = 0;
        self.irq_line = false;
        self.nmi_line = false;
        self.nmi_edge = false;
        self.irq_poll = false;
        self.nmi_poll = false;
        self.fault = None;
        self.instruction_pc = self.regs.pc;
    }
}

/// Snapshot image of a [`Mos6502`]. Breakpoints are a debugger setting
/// and stay with the live CPU.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuState {
    regs: Registers,
    state: State,
    opcode: u8,
    cycle: u8,
    addr: u16,
    data: u8,
    pointer: u8,
    sequence: Sequence,
    vector: u16,
    instruction_pc: u16,
    irq_line: bool,
    nmi_line: bool,
    nmi_edge: bool,
    irq_poll: bool,
    nmi_poll: bool,
    fault: Option<CpuFault>,
    total_cycles: u64,
}

impl SaveState for Mos6502 {
    type State = CpuState;

    fn save_state(&self) -> CpuState {
        CpuState {
            regs: self.regs,
            state: self.state,
            opcode: self.opcode,
            cycle: self.cycle,
            addr: self.addr,
            data: self.data,
            pointer: self.pointer,
            sequence: self.sequence,
            vector: self.vector,
            instruction_pc: self.instruction_pc,
            irq_line: self.irq_line,
            nmi_line: self.nmi_line,
            nmi_edge: self.nmi_edge,
            irq_poll: self.irq_poll,
            nmi_poll: self.nmi_poll,
            fault: self.fault,
            total_cycles: self.total_cycles,
        }
    }

    fn load_state(&mut self, s: CpuState) -> Result<(), StateError> {
        if s.state == State::Faulted && s.fault.is_none() {
            return Err(StateError::InvalidValue {
                field: "cpu.fault",
                value: 0,
            });
        }
        self.regs = s.regs;
        self.state = s.state;
        self.opcode = s.opcode;
        self.cycle = s.cycle;
        self.addr = s.addr;
        self.data = s.data;
        self.pointer = s.pointer;
        self.sequence = s.sequence;
        self.vector = s.vector;
        self.instruction_pc = s.instruction_pc;
        self.irq_line = s.irq_line;
        self.nmi_line = s.nmi_line;
        self.nmi_edge = s.nmi_edge;
        self.irq_poll = s.irq_poll;
        self.nmi_poll = s.nmi_poll;
        self.fault = s.fault;
        self.total_cycles = s.total_cycles;
        Ok(())
    }
}

impl Observable for Mos6502 {
    fn query(&self, path: &str) -> Option<Value> {
        match path {
            "pc" => Some(self.pc().into()),
            "a" => Some(self.regs.a.into()),
            "x" => Some(self.regs.x.into()),
            "y" => Some(self.regs.y.into()),
            "s" | "sp" => Some(self.regs.s.into()),
            "p" | "status" => Some(self.regs.p.0.into()),
            "flags" => Some(self.regs.p.to_string().into()),
            "flags.c" => Some(self.regs.p.is_set(C).into()),
            "flags.z" => Some(self.regs.p.is_set(Z).into()),
            "flags.i" => Some(self.regs.p.is_set(I).into()),
            "flags.d" => Some(self.regs.p.is_set(D).into()),
            "flags.v" => Some(self.regs.p.is_set(V).into()),
            "flags.n" => Some(self.regs.p.is_set(N).into()),
            "opcode" => Some(self.opcode.into()),
            "micro_step" => Some(self.cycle.into()),
            "cycle" => Some(Value::U64(self.total_cycles)),
            "jammed" => Some(self.is_jammed().into()),
            "halted" => Some(self.is_halted().into()),
            "registers" => {
                let [pcl, pch] = self.regs.pc.to_le_bytes();
                Some(Value::Bytes(vec![
                    self.regs.a,
                    self.regs.x,
                    self.regs.y,
                    self.regs.s,
                    pcl,
                    pch,
                    self.regs.p.0,
                ]))
            }
            _ => None,
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        &[
            "pc",
            "a",
            "x",
            "y",
            "s",
            "p",
            "flags",
            "flags.c",
            "flags.z",
            "flags.i",
            "flags.d",
            "flags.v",
            "flags.n",
            "opcode",
            "micro_step",
            "cycle",
            "jammed",
            "halted",
            "registers",
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use emu_core::SimpleBus;

    fn run_until_boundary(cpu: &mut Mos6502, bus: &mut SimpleBus) -> u32 {
        let mut cycles = 0;
        loop {
            cpu.tick(bus);
            cycles += 1;
            if cpu.is_instruction_complete() || cycles > 16 {
                return cycles;
            }
        }
    }

    #[test]
    fn lda_immediate() {
        let mut cpu = Mos6502::new();
        let mut bus = SimpleBus::new();
        bus.load(0x0000, &[0xA9, 0x42]);

        cpu.tick(&mut bus);
        cpu.tick(&mut bus);

        assert_eq!(cpu.regs.a, 0x42);
        assert_eq!(cpu.regs.pc, 0x0002);
        assert!(cpu.is_instruction_complete());
    }

    #[test]
    fn reset_sequence_loads_vector_in_seven_cycles() {
        let mut cpu = Mos6502::new();
        let mut bus = SimpleBus::new();
        bus.load(0xFFFC, &[0x00, 0xE0]);
        cpu.regs.s = 0x42;

        cpu.reset();
        let cycles = run_until_boundary(&mut cpu, &mut bus);

        assert_eq!(cycles, 7);
        assert_eq!(cpu.regs.pc, 0xE000);
        assert_eq!(cpu.regs.s, 0xFD);
        assert!(cpu.regs.p.is_set(I));
        // No stack writes during reset
        assert_eq!(bus.peek(0x0100), 0);
    }

    #[test]
    fn irq_waits_for_instruction_boundary_and_pushes_b_clear() {
        let mut cpu = Mos6502::new();
        let mut bus = SimpleBus::new();
        bus.load(0xFFFE, &[0x00, 0x30]);
        // CLI; NOP; NOP
        bus.load(0x0200, &[0x58, 0xEA, 0xEA]);
        cpu.regs.pc = 0x0200;
        cpu.set_irq(true);

        // CLI executes, then one more instruction runs before the IRQ.
        run_until_boundary(&mut cpu, &mut bus);
        assert_eq!(cpu.regs.pc, 0x0201);
        run_until_boundary(&mut cpu, &mut bus);
        assert_eq!(cpu.regs.pc, 0x0202);
        let cycles = run_until_boundary(&mut cpu, &mut bus);

        assert_eq!(cycles, 7);
        assert_eq!(cpu.regs.pc, 0x3000);
        let pushed_p = bus.peek(0x01FB);
        assert_eq!(pushed_p & 0x10, 0, "IRQ pushes B clear");
        assert_eq!(bus.peek(0x01FC), 0x02);
        assert_eq!(bus.peek(0x01FD), 0x02);
    }

    #[test]
    fn nmi_is_edge_triggered() {
        let mut cpu = Mos6502::new();
        let mut bus = SimpleBus::new();
        bus.load(0xFFFA, &[0x00, 0x40]);
        bus.load(0x4000, &[0xEA, 0xEA, 0xEA, 0xEA]);
        bus.load(0x0200, &[0xEA, 0xEA]);
        cpu.regs.pc = 0x0200;

        cpu.set_nmi(true);
        run_until_boundary(&mut cpu, &mut bus);
        run_until_boundary(&mut cpu, &mut bus);
        assert_eq!(cpu.regs.pc, 0x4000);

        // Line still asserted: no second NMI.
        run_until_boundary(&mut cpu, &mut bus);
        assert_eq!(cpu.regs.pc, 0x4001);
    }

    #[test]
    fn jam_locks_cpu() {
        let mut cpu = Mos6502::new();
        let mut bus = SimpleBus::new();
        bus.load(0x0000, &[0x02, 0xEA]);

        for _ in 0..10 {
            cpu.tick(&mut bus);
        }

        assert!(cpu.is_jammed());
        assert!(cpu.is_halted());
        assert_eq!(cpu.fault(), None);
        assert_eq!(cpu.pc(), 0x0000);
    }

    #[test]
    fn impossible_micro_step_faults() {
        let mut cpu = Mos6502::new();
        let mut bus = SimpleBus::new();
        cpu.state = State::Execute;
        cpu.opcode = 0xA9;
        cpu.cycle = 9;
        cpu.instruction_pc = 0x1234;

        cpu.tick(&mut bus);

        assert_eq!(
            cpu.fault(),
            Some(CpuFault {
                opcode: 0xA9,
                cycle: 9,
                pc: 0x1234
            })
        );
        assert!(cpu.is_halted());
    }

    #[test]
    fn state_round_trips_mid_instruction() {
        let mut cpu = Mos6502::new();
        let mut bus = SimpleBus::new();
        bus.load(0x0000, &[0xEE, 0x00, 0x10]);
        cpu.tick(&mut bus);
        cpu.tick(&mut bus);

        let bytes = emu_core::encode(&cpu.save_state()).expect("encodes");

        let mut restored = Mos6502::new();
        restored
            .load_state(emu_core::decode(&bytes).expect("state decodes"))
            .expect("valid state");
        assert_eq!(restored.save_state(), cpu.save_state());
        assert_eq!(restored.micro_step(), 2);
    }

    #[test]
    fn unknown_execution_state_is_rejected() {
        let bytes = emu_core::encode(&Mos6502::new().save_state()).expect("encodes");
        let mut corrupt = bytes.clone();
        // Registers take 7 bytes; the execution-state tag follows as a u32.
        corrupt[7] = 9;
        assert_eq!(
            emu_core::decode::<CpuState>(&corrupt),
            Err(StateError::InvalidValue {
                field: "enum tag",
                value: 9
            })
        );
    }

    #[test]
    fn breakpoint_only_hits_at_boundary() {
        let mut cpu = Mos6502::new();
        let mut bus = SimpleBus::new();
        bus.load(0x0000, &[0xA9, 0x01, 0xA9, 0x02]);
        cpu.breakpoints_mut().add(0x0002);

        assert!(!cpu.breakpoint_hit());
        cpu.tick(&mut bus);
        assert!(!cpu.breakpoint_hit());
        cpu.tick(&mut bus);
        assert!(cpu.breakpoint_hit());
        assert_eq!(cpu.pc(), 0x0002);
    }
}
