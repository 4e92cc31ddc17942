//! Klaus Dormann's 6502 functional and decimal tests.
//!
//! Both binaries load at $0000 and end in a branch-to-self trap. The
//! functional test succeeds when it traps at $3469; the decimal test
//! leaves its error flag at $000B.

use emu_core::{Cpu, SimpleBus};
use mos_6502::Mos6502;

/// Step instruction by instruction until PC stops moving. Returns the trap
/// address, or `None` if the instruction limit is hit.
fn run_to_trap(cpu: &mut Mos6502, bus: &mut SimpleBus, limit: u64) -> Option<u16> {
    let mut prev_pc = None;
    for _ in 0..limit {
        let pc = cpu.pc();
        if prev_pc == Some(pc) {
            return Some(pc);
        }
        prev_pc = Some(pc);

        cpu.tick(bus);
        while !cpu.is_instruction_complete() {
            cpu.tick(bus);
            if cpu.is_halted() {
                return Some(cpu.pc());
            }
        }
    }
    None
}

fn load(path: &str, start: u16) -> (Mos6502, SimpleBus) {
    let binary = std::fs::read(path)
        .unwrap_or_else(|e| panic!("{path} not found ({e}) - download from Klaus Dormann's repository"));
    let mut bus = SimpleBus::new();
    bus.load(0x0000, &binary);
    let mut cpu = Mos6502::new();
    cpu.regs.pc = start;
    (cpu, bus)
}

#[test]
#[ignore = "requires tests/data/6502_functional_test.bin"]
fn dormann_functional() {
    let (mut cpu, mut bus) = load("tests/data/6502_functional_test.bin", 0x0400);
    let trap = run_to_trap(&mut cpu, &mut bus, 100_000_000);
    assert_eq!(trap, Some(0x3469), "functional test trapped early");
}

#[test]
#[ignore = "requires tests/data/6502_decimal_test.bin"]
fn dormann_decimal() {
    let (mut cpu, mut bus) = load("tests/data/6502_decimal_test.bin", 0x0200);
    assert!(run_to_trap(&mut cpu, &mut bus, 50_000_000).is_some());
    assert_eq!(
        bus.peek(0x000B),
        0,
        "decimal test failed: N1=${:02X} N2=${:02X} got A=${:02X} want ${:02X}",
        bus.peek(0x00),
        bus.peek(0x01),
        bus.peek(0x04),
        bus.peek(0x06)
    );
}
