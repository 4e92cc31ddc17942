//! Headless Commodore 64 runner.
//!
//! Builds a machine from ROM files, mounts media, runs a number of frames
//! and reports the final CPU registers. Optionally saves a screenshot, a
//! WAV dump of the SID output and a snapshot.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use emu_c64::capture::{WavRecorder, save_png};
use emu_c64::{C64, C64Config, C64Model, RomSet, StopReason};
use log::info;
use mos_sid_6581::SidModel;

const USAGE: &str = "\
Usage: emu-c64 --kernal <file> --basic <file> --char <file> [OPTIONS]

Options:
  --drive-rom <file>     1541 DOS ROM (attaches a drive)
  --disk <file>          D64 or G64 image (needs --drive-rom)
  --prg <file>           Inject a PRG, P00 or T64 (first entry) into RAM
  --cart <file>          CRT cartridge
  --tape <file>          TAP image (PLAY pressed)
  --snapshot-in <file>   Restore a snapshot before running
  --frames <n>           Frames to run [default: 200]
  --break <addr>         Stop at an address ($C000, 0xC000 or 49152)
  --type <text>          Type text (\\n for RETURN)
  --screenshot <file>    Save the final frame as PNG
  --wav <file>           Record SID output as WAV
  --snapshot-out <file>  Save a snapshot when done
  --ntsc                 NTSC machine (default PAL)
  --8580                 8580 SID (default 6581)";

#[derive(Debug, Default, PartialEq, Eq)]
struct CliArgs {
    kernal: Option<PathBuf>,
    basic: Option<PathBuf>,
    chargen: Option<PathBuf>,
    drive_rom: Option<PathBuf>,
    disk: Option<PathBuf>,
    prg: Option<PathBuf>,
    cart: Option<PathBuf>,
    tape: Option<PathBuf>,
    snapshot_in: Option<PathBuf>,
    frames: u32,
    breakpoint: Option<u16>,
    type_text: Option<String>,
    screenshot: Option<PathBuf>,
    wav: Option<PathBuf>,
    snapshot_out: Option<PathBuf>,
    ntsc: bool,
    sid_8580: bool,
}

fn parse_address(text: &str) -> Option<u16> {
    if let Some(hex) = text
        .strip_prefix('$')
        .or_else(|| text.strip_prefix("0x"))
        .or_else(|| text.strip_prefix("0X"))
    {
        u16::from_str_radix(hex, 16).ok()
    } else {
        text.parse().ok()
    }
}

/// Parse the command line. `Ok(None)` means help was requested.
fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Option<CliArgs>> {
    let mut cli = CliArgs {
        frames: 200,
        ..CliArgs::default()
    };
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        let mut value = || {
            args.next()
                .ok_or_else(|| anyhow!("{arg} needs a value"))
        };
        match arg.as_str() {
            "--kernal" => cli.kernal = Some(value()?.into()),
            "--basic" => cli.basic = Some(value()?.into()),
            "--char" => cli.chargen = Some(value()?.into()),
            "--drive-rom" => cli.drive_rom = Some(value()?.into()),
            "--disk" => cli.disk = Some(value()?.into()),
            "--prg" => cli.prg = Some(value()?.into()),
            "--cart" => cli.cart = Some(value()?.into()),
            "--tape" => cli.tape = Some(value()?.into()),
            "--snapshot-in" => cli.snapshot_in = Some(value()?.into()),
            "--frames" => {
                let text = value()?;
                cli.frames = text
                    .parse()
                    .with_context(|| format!("invalid frame count {text:?}"))?;
            }
            "--break" => {
                let text = value()?;
                let addr = parse_address(&text).ok_or_else(|| anyhow!("invalid address {text:?}"))?;
                cli.breakpoint = Some(addr);
            }
            "--type" => cli.type_text = Some(value()?.replace("\\n", "\n")),
            "--screenshot" => cli.screenshot = Some(value()?.into()),
            "--wav" => cli.wav = Some(value()?.into()),
            "--snapshot-out" => cli.snapshot_out = Some(value()?.into()),
            "--ntsc" => cli.ntsc = true,
            "--8580" => cli.sid_8580 = true,
            "--help" | "-h" => return Ok(None),
            other => bail!("unknown argument {other:?}\n\n{USAGE}"),
        }
    }
    Ok(Some(cli))
}

fn read(path: &Path, what: &str) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("cannot read {what} {}", path.display()))
}

fn required(path: Option<&Path>, what: &str) -> Result<Vec<u8>> {
    let path = path.ok_or_else(|| anyhow!("--{what} is required\n\n{USAGE}"))?;
    read(path, what)
}

fn build_config(cli: &CliArgs) -> Result<C64Config> {
    let roms = RomSet {
        basic: required(cli.basic.as_deref(), "basic")?,
        kernal: required(cli.kernal.as_deref(), "kernal")?,
        chargen: required(cli.chargen.as_deref(), "char")?,
        drive: cli
            .drive_rom
            .as_ref()
            .map(|p| read(p, "drive ROM"))
            .transpose()?,
    };
    Ok(C64Config {
        model: if cli.ntsc {
            C64Model::C64Ntsc
        } else {
            C64Model::C64Pal
        },
        sid_model: if cli.sid_8580 {
            SidModel::Mos8580
        } else {
            SidModel::Mos6581
        },
        roms,
        ..C64Config::default()
    })
}

fn mount_media(c64: &mut C64, cli: &CliArgs) -> Result<()> {
    if let Some(path) = &cli.cart {
        c64.insert_cartridge(&read(path, "cartridge")?)
            .with_context(|| format!("cartridge {}", path.display()))?;
    }
    if let Some(path) = &cli.disk {
        let warnings = c64
            .insert_disk(&read(path, "disk")?)
            .with_context(|| format!("disk {}", path.display()))?;
        for w in &warnings {
            eprintln!("disk: half-track {}: {:?}", w.half_track, w.errors);
        }
    }
    if let Some(path) = &cli.tape {
        c64.insert_tape(&read(path, "tape")?)
            .with_context(|| format!("tape {}", path.display()))?;
        c64.press_play();
    }
    if let Some(path) = &cli.snapshot_in {
        c64.restore(&read(path, "snapshot")?)
            .with_context(|| format!("snapshot {}", path.display()))?;
    }
    if let Some(path) = &cli.prg {
        let loaded = c64
            .load_program_file(&read(path, "program")?)
            .with_context(|| format!("program {}", path.display()))?;
        eprintln!("PRG loaded at ${:04X}-${:04X}", loaded.start, loaded.end);
    }
    Ok(())
}

fn run(cli: &CliArgs) -> Result<()> {
    let config = build_config(cli)?;
    let mut c64 = C64::new(&config)?;
    mount_media(&mut c64, cli)?;

    if let Some(text) = &cli.type_text {
        c64.type_text(text);
    }
    if let Some(addr) = cli.breakpoint {
        c64.add_breakpoint(addr);
    }
    let mut wav = cli
        .wav
        .as_ref()
        .map(|p| WavRecorder::create(p, c64.sample_rate()))
        .transpose()
        .context("cannot create WAV file")?;

    let mut stop = None;
    for _ in 0..cli.frames {
        let reason = c64.run_frame()?;
        if let Some(wav) = &mut wav {
            wav.push(&c64.take_audio())?;
        } else {
            c64.take_audio();
        }
        if reason != StopReason::FrameComplete {
            stop = Some(reason);
            break;
        }
    }

    match stop {
        Some(StopReason::Breakpoint(addr)) => println!("breakpoint at ${addr:04X}"),
        Some(StopReason::Jammed) => println!("CPU jammed at ${:04X}", c64.pc()),
        Some(reason) => println!("stopped: {reason:?}"),
        None => {}
    }
    println!("{}", c64.registers());
    println!("cycles={} frames={}", c64.cycles(), c64.frames());

    if let Some(path) = &cli.screenshot {
        save_png(
            path,
            c64.framebuffer_width(),
            c64.framebuffer_height(),
            c64.framebuffer(),
        )
        .with_context(|| format!("cannot write screenshot {}", path.display()))?;
        info!("screenshot saved to {}", path.display());
    }
    if let Some(wav) = wav {
        let samples = wav.samples();
        wav.finalize()?;
        info!("{samples} audio samples written");
    }
    if let Some(path) = &cli.snapshot_out {
        let snap = c64.capture().context("cannot capture snapshot")?;
        fs::write(path, snap)
            .with_context(|| format!("cannot write snapshot {}", path.display()))?;
        info!("snapshot saved to {}", path.display());
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let Some(cli) = parse_args(std::env::args().skip(1))? else {
        println!("{USAGE}");
        return Ok(());
    };
    run(&cli)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn parses_all_options() {
        let cli = parse_args(args(&[
            "--kernal", "k.rom", "--basic", "b.rom", "--char", "c.rom", "--frames", "5",
            "--break", "$0810", "--type", "RUN\\n", "--ntsc",
        ]))
        .expect("valid")
        .expect("not help");
        assert_eq!(cli.kernal, Some(PathBuf::from("k.rom")));
        assert_eq!(cli.frames, 5);
        assert_eq!(cli.breakpoint, Some(0x0810));
        assert_eq!(cli.type_text.as_deref(), Some("RUN\n"));
        assert!(cli.ntsc);
    }

    #[test]
    fn address_forms() {
        assert_eq!(parse_address("$C000"), Some(0xC000));
        assert_eq!(parse_address("0xc000"), Some(0xC000));
        assert_eq!(parse_address("49152"), Some(0xC000));
        assert_eq!(parse_address("$10000"), None);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(parse_args(args(&["--frames"])).is_err());
        assert!(parse_args(args(&["--frames", "many"])).is_err());
        assert!(parse_args(args(&["--bogus"])).is_err());
        assert!(matches!(parse_args(args(&["--help"])), Ok(None)));
    }
}
