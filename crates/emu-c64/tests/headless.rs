//! The `emu-c64` binary on synthetic ROMs.

mod common;

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use pretty_assertions::assert_eq;

fn write_roms(dir: &Path, kernal: &[u8]) {
    fs::write(dir.join("kernal.rom"), kernal).expect("write kernal");
    fs::write(dir.join("basic.rom"), vec![0; 8192]).expect("write basic");
    fs::write(dir.join("char.rom"), vec![0; 4096]).expect("write chargen");
}

fn emu(dir: &Path, extra: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_emu-c64"))
        .current_dir(dir)
        .args(["--kernal", "kernal.rom", "--basic", "basic.rom", "--char", "char.rom"])
        .args(extra)
        .output()
        .expect("binary runs")
}

#[test]
fn stops_at_breakpoint_and_saves_outputs() {
    let dir = tempfile::tempdir().expect("temp dir");
    // $E000: INX; INX; JMP $E000
    write_roms(dir.path(), &common::kernal_with(&[0xE8, 0xE8, 0x4C, 0x00, 0xE0]));

    let out = emu(
        dir.path(),
        &[
            "--break", "$E001", "--screenshot", "shot.png", "--wav", "sid.wav",
            "--snapshot-out", "state.c64s",
        ],
    );
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("breakpoint at $E001"), "{stdout}");
    assert!(stdout.contains("PC=E001"), "{stdout}");

    let png = fs::read(dir.path().join("shot.png")).expect("screenshot written");
    assert_eq!(&png[1..4], b"PNG");
    let snap = fs::read(dir.path().join("state.c64s")).expect("snapshot written");
    assert_eq!(&snap[..4], b"C64S");
    assert!(dir.path().join("sid.wav").exists());
}

#[test]
fn resumes_from_a_snapshot() {
    let dir = tempfile::tempdir().expect("temp dir");
    write_roms(dir.path(), &common::kernal_with(&[0xE8, 0x4C, 0x00, 0xE0]));

    let first = emu(dir.path(), &["--frames", "3", "--snapshot-out", "a.c64s"]);
    assert!(first.status.success());
    assert!(String::from_utf8_lossy(&first.stdout).contains("frames=3"));

    let second = emu(dir.path(), &["--snapshot-in", "a.c64s", "--frames", "2"]);
    assert!(second.status.success(), "{}", String::from_utf8_lossy(&second.stderr));
    assert!(String::from_utf8_lossy(&second.stdout).contains("frames=5"));
}

#[test]
fn missing_rom_fails() {
    let dir = tempfile::tempdir().expect("temp dir");
    let out = Command::new(env!("CARGO_BIN_EXE_emu-c64"))
        .current_dir(dir.path())
        .args(["--kernal", "nope.rom"])
        .output()
        .expect("binary runs");
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("basic"));
}
