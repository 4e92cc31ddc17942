//! Integration tests using Tom Harte's `SingleStepTests` for the 6502.
//!
//! 256 opcode files x 10,000 cases, each checking registers, memory and the
//! exact sequence of bus accesses for one instruction. JAM opcodes are
//! skipped: the data models a lock-up pattern this core does not replay.
//!
//! Test data lives in `test-data/65x02/6502/v1/XX.json`.

use std::fs;
use std::path::Path;

use emu_core::{Cpu, SimpleBus};
use mos_6502::{Mos6502, Status};
use serde::Deserialize;

const JAM_OPCODES: [u8; 12] = [
    0x02, 0x12, 0x22, 0x32, 0x42, 0x52, 0x62, 0x72, 0x92, 0xB2, 0xD2, 0xF2,
];

#[derive(Deserialize)]
struct TestCase {
    name: String,
    initial: CpuState,
    #[serde(rename = "final")]
    final_state: CpuState,
    cycles: Vec<(u16, u8, String)>,
}

#[derive(Deserialize)]
struct CpuState {
    pc: u16,
    s: u8,
    a: u8,
    x: u8,
    y: u8,
    p: u8,
    ram: Vec<(u16, u8)>,
}

fn setup(cpu: &mut Mos6502, bus: &mut SimpleBus, state: &CpuState) {
    for &(addr, value) in &state.ram {
        bus.load(addr, &[value]);
    }
    cpu.regs.pc = state.pc;
    cpu.regs.s = state.s;
    cpu.regs.a = state.a;
    cpu.regs.x = state.x;
    cpu.regs.y = state.y;
    cpu.regs.p = Status::from_byte(state.p);
}

fn compare(cpu: &Mos6502, bus: &SimpleBus, test: &TestCase) -> Vec<String> {
    let expected = &test.final_state;
    let mut errors = Vec::new();

    let regs = [
        ("PC", cpu.regs.pc, expected.pc),
        ("S", cpu.regs.s.into(), expected.s.into()),
        ("A", cpu.regs.a.into(), expected.a.into()),
        ("X", cpu.regs.x.into(), expected.x.into()),
        ("Y", cpu.regs.y.into(), expected.y.into()),
    ];
    for (name, got, want) in regs {
        if got != want {
            errors.push(format!("{name}: got ${got:04X}, want ${want:04X}"));
        }
    }

    // B has no storage; the data sets it freely in P.
    let actual_p = cpu.regs.p.0 & !0x10;
    let expected_p = (expected.p | 0x20) & !0x10;
    if actual_p != expected_p {
        errors.push(format!("P: got ${actual_p:02X}, want ${expected_p:02X}"));
    }

    for &(addr, want) in &expected.ram {
        let got = bus.peek(addr);
        if got != want {
            errors.push(format!("RAM[${addr:04X}]: got ${got:02X}, want ${want:02X}"));
        }
    }

    for (i, (&(addr, value, write), (want_addr, want_value, kind))) in
        bus.access_log().iter().zip(&test.cycles).enumerate()
    {
        let want_write = kind == "write";
        if addr != *want_addr || value != *want_value || write != want_write {
            errors.push(format!(
                "cycle {i}: got {addr:04X}={value:02X} {}, want {want_addr:04X}={want_value:02X} {kind}",
                if write { "write" } else { "read" }
            ));
            break;
        }
    }

    errors
}

#[test]
#[ignore = "requires test-data/65x02 - run with --ignored"]
fn run_all() {
    let test_dir = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../..")
        .join("test-data/65x02/6502/v1");

    if !test_dir.exists() {
        eprintln!("Test data not found at {}", test_dir.display());
        return;
    }

    let mut total_pass = 0u64;
    let mut total_fail = 0u64;

    for opcode in (0..=0xFF_u8).filter(|op| !JAM_OPCODES.contains(op)) {
        let path = test_dir.join(format!("{opcode:02x}.json"));
        if !path.exists() {
            continue;
        }

        let data = fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("Failed to read {}: {e}", path.display()));
        let tests: Vec<TestCase> = serde_json::from_str(&data)
            .unwrap_or_else(|e| panic!("Failed to parse {}: {e}", path.display()));

        let mut file_fail = 0u32;
        for test in &tests {
            let mut cpu = Mos6502::new();
            let mut bus = SimpleBus::new();
            setup(&mut cpu, &mut bus, &test.initial);
            bus.start_logging();

            for _ in 0..test.cycles.len() {
                cpu.tick(&mut bus);
            }

            let errors = compare(&cpu, &bus, test);
            if errors.is_empty() {
                total_pass += 1;
            } else {
                total_fail += 1;
                file_fail += 1;
                if file_fail <= 3 {
                    println!("  FAIL ${opcode:02X} [{}]: {}", test.name, errors.join(", "));
                }
            }
        }
    }

    println!("SingleStepTests: {total_pass} passed, {total_fail} failed");
    assert_eq!(total_fail, 0, "{total_fail} tests failed");
}
