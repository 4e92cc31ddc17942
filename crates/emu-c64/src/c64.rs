//! Top-level C64 system.
//!
//! The master clock ticks at CPU cycle rate (985,248 Hz PAL, 1,022,727 Hz
//! NTSC). Every chip advances once per tick, in a fixed order, so two
//! machines fed the same inputs stay cycle-for-cycle identical.
//!
//! # Tick order
//!
//! 1. VIC-II: advance the beam, render 8 pixels, drive BA
//! 2. CPU: one bus access, unless BA holds off a read
//! 3. CIA1 (IRQ source), then CIA2 (NMI source)
//! 4. SID: oscillators, envelopes, filter, resampler
//! 5. Datasette: pulse edges onto the CIA1 FLAG pin
//! 6. IEC bus and one 1541 cycle
//! 7. Merge the IRQ and NMI lines for the CPU's next cycle

#![allow(clippy::cast_possible_truncation)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use emu_core::{Cpu, Observable, SaveState, StateError, Value};
use log::{debug, error, info, trace, warn};
use mos_6502::{BreakpointState, CpuState, DisassembledLine, Mos6502, Registers, disassemble_range};
use serde::{Deserialize, Serialize};

use crate::analysis::TrackAnalysis;
use crate::bus::{C64Bus, C64BusState};
use crate::cartridge::{CartridgeState, parse_crt};
use crate::config::{C64Config, C64Model, RomSet};
use crate::disk::{Disk, DiskError, TrackWarning};
use crate::drive1541::{Drive1541, DriveState};
use crate::error::{C64Error, MediaError};
use crate::input::{ControlPort, InputQueue, MouseModel};
use crate::keyboard::C64Key;
use crate::memory::{BankConfig, C64Memory};
use crate::p00::{self, P00File};
use crate::prg::{self, LoadedPrg};
use crate::snapshot::{self, SnapshotHeader};
use crate::t64::{self, T64Archive};
use crate::tap::TapImage;
use crate::tape::{Datasette, DatasetteState};

/// What happened during one [`C64::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StepOutcome {
    /// The CPU finished an instruction this cycle and will fetch an opcode
    /// next.
    pub instruction_boundary: bool,
    /// The VIC-II wrapped to the top of the frame.
    pub frame_complete: bool,
    /// The CPU is locked by a JAM opcode.
    pub jammed: bool,
}

/// Why [`C64::run`] or [`C64::run_frame`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// [`C64::halt`] or [`HaltHandle::halt`] was called.
    Halted,
    /// An enabled (or soft) breakpoint matched the PC.
    Breakpoint(u16),
    /// The CPU executed a JAM opcode.
    Jammed,
    /// `run_frame` reached the end of a video frame.
    FrameComplete,
}

/// Chips whose registers [`C64::register_dump`] can read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Chip {
    Vic,
    Sid,
    Cia1,
    Cia2,
    Via1,
    Via2,
}

/// One executed instruction in the trace ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceEntry {
    /// Machine cycle count when the instruction was reached.
    pub cycle: u64,
    pub pc: u16,
    pub bytes: [u8; 3],
    pub length: u8,
    pub a: u8,
    pub x: u8,
    pub y: u8,
    pub s: u8,
    pub p: u8,
}

/// Cross-thread halt request and running flag.
///
/// Clones share the same flags, so a handle taken before the machine moves
/// to another thread still stops it.
#[derive(Debug, Clone, Default)]
pub struct HaltHandle {
    requested: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
}

impl HaltHandle {
    /// Ask the run loop to stop at the next instruction boundary.
    pub fn halt(&self) {
        self.requested.store(true, Ordering::Release);
    }

    /// A `run` or `run_frame` call is in progress.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn take_request(&self) -> bool {
        self.requested.swap(false, Ordering::AcqRel)
    }

    pub(crate) fn clear_request(&self) {
        self.requested.store(false, Ordering::Release);
    }
}

/// Sets the running flag for the lifetime of a run loop.
struct RunningGuard(Arc<AtomicBool>);

impl RunningGuard {
    fn new(flag: &Arc<AtomicBool>) -> Self {
        flag.store(true, Ordering::Release);
        Self(Arc::clone(flag))
    }
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// C64 system.
#[derive(Debug, Clone)]
pub struct C64 {
    cpu: Mos6502,
    bus: C64Bus,
    /// 1541 on the IEC bus (present only if a drive ROM was supplied).
    drive: Option<Drive1541>,
    tape: Datasette,
    model: C64Model,
    /// Master clock: CPU cycles since power-on. Reset does not rewind it.
    cycles: u64,
    /// Completed video frames.
    frames: u64,
    /// Timed keyboard events (typed text).
    input: InputQueue,
    trace: VecDeque<TraceEntry>,
    trace_len: usize,
    trace_enabled: bool,
    halt: HaltHandle,
}

impl C64 {
    /// Build a powered-on machine. The CPU starts its reset sequence
    /// through the KERNAL vector on the first cycles.
    pub fn new(config: &C64Config) -> Result<Self, C64Error> {
        config.roms.validate()?;
        let roms = &config.roms;
        let memory = C64Memory::new(&roms.basic, &roms.kernal, &roms.chargen);
        let bus = C64Bus::new(memory, config.model, config.sid_model, config.sample_rate);
        let drive = roms
            .drive
            .as_deref()
            .map(|rom| Drive1541::new(Arc::from(rom), config.model.cpu_frequency()));
        info!(
            "C64 {:?} created, SID {:?}, drive {}",
            config.model,
            config.sid_model,
            if drive.is_some() { "attached" } else { "absent" }
        );

        let mut c64 = Self {
            cpu: Mos6502::new(),
            bus,
            drive,
            tape: Datasette::new(),
            model: config.model,
            cycles: 0,
            frames: 0,
            input: InputQueue::new(),
            trace: VecDeque::with_capacity(config.trace_len),
            trace_len: config.trace_len,
            trace_enabled: false,
            halt: HaltHandle::default(),
        };
        c64.power_on();
        Ok(c64)
    }

    fn power_on(&mut self) {
        self.bus.reset();
        self.bus.memory.set_play_pressed(self.tape.is_playing());
        self.cpu.reset();
        if let Some(drive) = &mut self.drive {
            drive.reset();
        }
    }

    /// Power-on reset of every chip. Breakpoints, ROMs and inserted media
    /// stay; the cycle counter keeps counting.
    pub fn reset(&mut self) {
        info!("C64 reset at cycle {}", self.cycles);
        self.power_on();
    }

    /// Replace the ROM set and reset. A drive is attached or removed to
    /// match `roms.drive`; an inserted disk moves to the new drive.
    pub fn load_roms(&mut self, roms: RomSet) -> Result<(), C64Error> {
        roms.validate()?;
        self.bus.memory.set_roms(&roms.basic, &roms.kernal, &roms.chargen);
        let disk = self.drive.take().and_then(|mut d| d.eject_disk());
        self.drive = roms.drive.map(|rom| {
            let mut drive = Drive1541::new(Arc::from(rom), self.model.cpu_frequency());
            if let Some(disk) = disk {
                drive.insert_disk(disk);
            }
            drive
        });
        info!("ROMs loaded");
        self.reset();
        Ok(())
    }

    // ----- scheduler -----

    /// Advance the whole machine by exactly one CPU cycle.
    pub fn step(&mut self) -> Result<StepOutcome, C64Error> {
        let ba_low = self.bus.vic.tick(&self.bus.memory);

        // RDY only holds off reads; writes in progress complete.
        let mut instruction_boundary = false;
        if !(ba_low && !self.cpu.next_cycle_is_write()) {
            self.cpu.tick(&mut self.bus);
            instruction_boundary = self.cpu.is_instruction_complete();
            if instruction_boundary && self.trace_enabled {
                self.record_trace();
            }
        }

        // Interrupt lines are level-merged below; the edge bits are only
        // traced.
        let cia1_raised = self.bus.cia1.tick();
        let cia2_raised = self.bus.cia2.tick();
        if cia1_raised | cia2_raised != 0 {
            trace!(
                "cycle {}: CIA1 ICR +${cia1_raised:02X}, CIA2 ICR +${cia2_raised:02X}",
                self.cycles
            );
        }
        self.bus.sid.tick();

        let edge = self.tape.tick(self.bus.memory.cassette_motor_on());
        self.bus.cia1.set_flag(!edge);

        if let Some(drive) = &mut self.drive {
            drive.run_host_cycle(&mut self.bus.iec);
            self.bus.cia2.pins_a = self.bus.iec.c64_pins();
        }

        self.cpu.set_irq(self.bus.irq_line());
        self.cpu.set_nmi(self.bus.nmi_line());

        self.cycles += 1;
        let frame_complete = self.bus.vic.take_frame_complete();
        if frame_complete {
            self.frames += 1;
            self.input.process(self.frames, &mut self.bus.keyboard);
        }

        if let Some(fault) = self.cpu.fault() {
            error!("CPU fault at cycle {}: {fault}", self.cycles);
            return Err(C64Error::Internal(fault));
        }

        Ok(StepOutcome {
            instruction_boundary,
            frame_complete,
            jammed: self.cpu.is_jammed(),
        })
    }

    /// Run cycles until the CPU is back at an instruction boundary.
    pub fn step_instruction(&mut self) -> Result<StepOutcome, C64Error> {
        loop {
            let outcome = self.step()?;
            if outcome.instruction_boundary || outcome.jammed {
                return Ok(outcome);
            }
        }
    }

    /// Run until halted, a breakpoint matches or the CPU jams.
    pub fn run(&mut self) -> Result<StopReason, C64Error> {
        self.run_loop(false)
    }

    /// Run to the first instruction boundary after the current video frame
    /// completes. Breakpoints, halts and JAMs stop it earlier.
    pub fn run_frame(&mut self) -> Result<StopReason, C64Error> {
        self.run_loop(true)
    }

    fn run_loop(&mut self, one_frame: bool) -> Result<StopReason, C64Error> {
        let _running = RunningGuard::new(&self.halt.running);
        let mut frame_done = false;
        loop {
            let outcome = self.step()?;
            if outcome.jammed {
                warn!("CPU jammed at ${:04X}", self.cpu.pc());
                return Ok(StopReason::Jammed);
            }
            frame_done |= outcome.frame_complete;
            if !outcome.instruction_boundary {
                continue;
            }
            if self.cpu.breakpoint_hit() {
                let pc = self.cpu.pc();
                debug!("breakpoint at ${pc:04X}, cycle {}", self.cycles);
                return Ok(StopReason::Breakpoint(pc));
            }
            if self.halt.take_request() {
                return Ok(StopReason::Halted);
            }
            if one_frame && frame_done {
                return Ok(StopReason::FrameComplete);
            }
        }
    }

    /// Ask a running `run` to stop at the next instruction boundary.
    pub fn halt(&self) {
        self.halt.halt();
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.halt.is_running()
    }

    /// A handle that can halt this machine from another thread.
    #[must_use]
    pub fn halt_handle(&self) -> HaltHandle {
        self.halt.clone()
    }

    // ----- breakpoints -----

    pub fn add_breakpoint(&mut self, address: u16) {
        self.cpu.breakpoints_mut().add(address);
    }

    pub fn remove_breakpoint(&mut self, address: u16) -> bool {
        self.cpu.breakpoints_mut().remove(address)
    }

    pub fn toggle_breakpoint(&mut self, address: u16) -> Option<BreakpointState> {
        self.cpu.breakpoints_mut().toggle(address)
    }

    #[must_use]
    pub fn breakpoint(&self, address: u16) -> Option<BreakpointState> {
        self.cpu.breakpoints().get(address)
    }

    /// One-shot breakpoint, cleared when hit (run to address).
    pub fn set_soft_breakpoint(&mut self, address: u16) {
        self.cpu.breakpoints_mut().set_soft(address);
    }

    pub fn breakpoints(&self) -> impl Iterator<Item = (u16, BreakpointState)> + '_ {
        self.cpu.breakpoints().iter()
    }

    pub fn clear_breakpoints(&mut self) {
        self.cpu.breakpoints_mut().clear();
    }

    // ----- inspection -----

    #[must_use]
    pub fn registers(&self) -> Registers {
        self.cpu.registers()
    }

    /// PC of the instruction in progress, or of the next one at a boundary.
    #[must_use]
    pub fn pc(&self) -> u16 {
        self.cpu.pc()
    }

    #[must_use]
    pub fn cpu(&self) -> &Mos6502 {
        &self.cpu
    }

    #[must_use]
    pub fn bus(&self) -> &C64Bus {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut C64Bus {
        &mut self.bus
    }

    #[must_use]
    pub fn model(&self) -> C64Model {
        self.model
    }

    #[must_use]
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    #[must_use]
    pub fn frames(&self) -> u64 {
        self.frames
    }

    #[must_use]
    pub fn bank_config(&self) -> BankConfig {
        self.bus.memory.bank_config()
    }

    /// Read memory as the CPU sees it, without side effects.
    #[must_use]
    pub fn peek(&self, addr: u16) -> u8 {
        self.bus.peek(addr)
    }

    /// Disassemble `count` instructions from `address` through the CPU's
    /// view of memory.
    #[must_use]
    pub fn disassemble(&self, address: u16, count: usize) -> Vec<DisassembledLine> {
        disassemble_range(|a| self.bus.peek(a), address, count)
    }

    /// Side-effect free register file of one chip. `None` for the VIAs
    /// when no drive is attached.
    #[must_use]
    pub fn register_dump(&self, chip: Chip) -> Option<Vec<u8>> {
        let dump = match chip {
            Chip::Vic => (0..0x2F).map(|r| self.bus.vic.peek(r)).collect(),
            Chip::Sid => (0..0x20).map(|r| self.bus.sid.read(r)).collect(),
            Chip::Cia1 => (0..0x10).map(|r| self.bus.cia1.peek(r)).collect(),
            Chip::Cia2 => (0..0x10).map(|r| self.bus.cia2.peek(r)).collect(),
            Chip::Via1 => {
                let via = &self.drive.as_ref()?.bus().via1;
                (0..0x10).map(|r| via.peek(r)).collect()
            }
            Chip::Via2 => {
                let via = &self.drive.as_ref()?.bus().via2;
                (0..0x10).map(|r| via.peek(r)).collect()
            }
        };
        Some(dump)
    }

    /// Record instructions into the trace ring.
    pub fn set_trace_enabled(&mut self, enabled: bool) {
        self.trace_enabled = enabled;
        if !enabled {
            self.trace.clear();
        }
    }

    /// Traced instructions, oldest first.
    pub fn trace(&self) -> impl Iterator<Item = &TraceEntry> {
        self.trace.iter()
    }

    fn record_trace(&mut self) {
        if self.trace_len == 0 {
            return;
        }
        if self.trace.len() == self.trace_len {
            self.trace.pop_front();
        }
        let regs = self.cpu.regs;
        let pc = regs.pc;
        let length = mos_6502::instruction_length(self.bus.peek(pc));
        let mut bytes = [0; 3];
        for (i, byte) in bytes.iter_mut().enumerate().take(usize::from(length)) {
            *byte = self.bus.peek(pc.wrapping_add(i as u16));
        }
        self.trace.push_back(TraceEntry {
            cycle: self.cycles,
            pc,
            bytes,
            length,
            a: regs.a,
            x: regs.x,
            y: regs.y,
            s: regs.s,
            p: regs.p.0,
        });
    }

    // ----- video and audio -----

    /// The current frame (ARGB32), filled as the beam moves.
    #[must_use]
    pub fn framebuffer(&self) -> &[u32] {
        self.bus.vic.framebuffer()
    }

    #[must_use]
    pub fn framebuffer_width(&self) -> u32 {
        self.bus.vic.framebuffer_width()
    }

    #[must_use]
    pub fn framebuffer_height(&self) -> u32 {
        self.bus.vic.framebuffer_height()
    }

    /// Drain the SID output buffer.
    pub fn take_audio(&mut self) -> Vec<i16> {
        self.bus.sid.take_samples()
    }

    #[must_use]
    pub fn sample_rate(&self) -> u32 {
        self.bus.sid.sample_rate()
    }

    // ----- input -----

    pub fn set_key(&mut self, key: C64Key, pressed: bool) {
        self.bus.keyboard.set(key, pressed);
    }

    pub fn release_all_keys(&mut self) {
        self.bus.keyboard.release_all();
    }

    /// RESTORE is wired to the NMI line, not the matrix.
    pub fn set_restore(&mut self, pressed: bool) {
        self.bus.keyboard.set_restore(pressed);
    }

    /// Joystick switches (`input::joy` bits, set = pressed).
    pub fn set_joystick(&mut self, port: ControlPort, switches: u8) {
        self.bus.ports.set_joystick(port, switches);
    }

    pub fn set_paddles(&mut self, port: ControlPort, x: u8, y: u8) {
        self.bus.ports.set_paddles(port, x, y);
        self.bus.update_pins();
    }

    /// Plug a mouse into `port`. Its buttons share the joystick switches
    /// and a 1351 takes over the port's pots.
    pub fn attach_mouse(&mut self, port: ControlPort, model: MouseModel) {
        self.bus.ports.attach_mouse(port, model);
        self.bus.update_pins();
    }

    pub fn detach_mouse(&mut self, port: ControlPort) {
        self.bus.ports.detach_mouse(port);
        self.bus.update_pins();
    }

    /// Move the mouse on `port` by a host delta (positive `dy` is down).
    /// Ignored with no mouse attached.
    pub fn move_mouse(&mut self, port: ControlPort, dx: i32, dy: i32) {
        if let Some(mouse) = self.bus.ports.mouse_mut(port) {
            mouse.move_by(dx, dy);
            self.bus.update_pins();
        }
    }

    pub fn set_mouse_buttons(&mut self, port: ControlPort, left: bool, right: bool) {
        if let Some(mouse) = self.bus.ports.mouse_mut(port) {
            mouse.set_buttons(left, right);
            self.bus.update_pins();
        }
    }

    /// Queue text as timed key presses, starting next frame. Returns the
    /// frame by which the last key is released.
    pub fn type_text(&mut self, text: &str) -> u64 {
        self.input.enqueue_text(text, self.frames + 1)
    }

    #[must_use]
    pub fn input_queue(&self) -> &InputQueue {
        &self.input
    }

    // ----- media -----

    /// Inject a PRG straight into RAM.
    pub fn load_prg(&mut self, data: &[u8]) -> Result<LoadedPrg, C64Error> {
        let loaded = prg::load_prg(&mut self.bus.memory, data).map_err(MediaError::from)?;
        info!("PRG loaded at ${:04X}-${:04X}", loaded.start, loaded.end);
        Ok(loaded)
    }

    /// Load entry `index` of a T64 archive into RAM.
    pub fn load_t64(&mut self, data: &[u8], index: usize) -> Result<LoadedPrg, C64Error> {
        let archive = T64Archive::parse(data).map_err(MediaError::from)?;
        let prg = archive.prg(index).map_err(MediaError::from)?;
        if let Some(entry) = archive.entries().get(index) {
            info!("T64 \"{}\" entry {index} \"{}\"", archive.name(), entry.name);
        }
        self.load_prg(&prg)
    }

    /// Load any single-program file: a T64 archive (first entry), a P00
    /// container or a bare PRG, told apart by signature.
    pub fn load_program_file(&mut self, data: &[u8]) -> Result<LoadedPrg, C64Error> {
        if t64::is_t64(data) {
            return self.load_t64(data, 0);
        }
        if p00::is_p00(data) {
            let file = P00File::parse(data).map_err(MediaError::from)?;
            info!("P00 \"{}\"", file.name());
            return self.load_prg(file.prg());
        }
        self.load_prg(data)
    }

    /// Insert a D64 or G64 image. The disk is mounted even when tracks
    /// fail analysis; those come back as warnings.
    pub fn insert_disk(&mut self, data: &[u8]) -> Result<Vec<TrackWarning>, C64Error> {
        if self.drive.is_none() {
            return Err(DiskError::NoDrive.into());
        }
        let disk = Disk::from_image(data)?;
        self.insert_disk_image(disk)
    }

    /// Mount an already decoded disk.
    pub fn insert_disk_image(&mut self, disk: Disk) -> Result<Vec<TrackWarning>, C64Error> {
        let drive = self.drive.as_mut().ok_or(DiskError::NoDrive)?;
        let warnings = disk.warnings();
        drive.insert_disk(disk);
        info!("disk inserted, {} track warning(s)", warnings.len());
        Ok(warnings)
    }

    pub fn eject_disk(&mut self) -> Option<Disk> {
        let disk = self.drive.as_mut()?.eject_disk();
        if disk.is_some() {
            info!("disk ejected");
        }
        disk
    }

    #[must_use]
    pub fn drive(&self) -> Option<&Drive1541> {
        self.drive.as_ref()
    }

    pub fn drive_mut(&mut self) -> Option<&mut Drive1541> {
        self.drive.as_mut()
    }

    fn disk(&self) -> Result<&Disk, DiskError> {
        self.drive
            .as_ref()
            .ok_or(DiskError::NoDrive)?
            .disk()
            .ok_or(DiskError::NoDisk)
    }

    /// Decode one full track of the inserted disk without touching it.
    pub fn analyze_track(&self, track: u8) -> Result<TrackAnalysis, C64Error> {
        Ok(self.disk()?.analyze_track(track)?)
    }

    /// Every half-track of the inserted disk that fails analysis.
    pub fn disk_warnings(&self) -> Result<Vec<TrackWarning>, C64Error> {
        Ok(self.disk()?.warnings())
    }

    pub fn export_d64(&self) -> Result<Vec<u8>, C64Error> {
        Ok(self.disk()?.to_d64())
    }

    pub fn export_g64(&self) -> Result<Vec<u8>, C64Error> {
        Ok(self.disk()?.to_g64())
    }

    /// Plug in a CRT cartridge and reset.
    pub fn insert_cartridge(&mut self, data: &[u8]) -> Result<(), C64Error> {
        let cart = parse_crt(data).map_err(MediaError::from)?;
        info!("cartridge inserted: {:?} \"{}\"", cart.cart_type(), cart.name());
        self.bus.memory.set_cartridge(Some(cart));
        self.reset();
        Ok(())
    }

    /// Pull the cartridge and reset.
    pub fn remove_cartridge(&mut self) {
        if self.bus.memory.cartridge().is_some() {
            info!("cartridge removed");
        }
        self.bus.memory.set_cartridge(None);
        self.reset();
    }

    /// Press the cartridge freeze button, if it has one.
    pub fn press_freeze(&mut self) {
        if let Some(cart) = self.bus.memory.cartridge_mut() {
            cart.press_freeze();
        }
    }

    /// Insert a TAP image, rewound and stopped.
    pub fn insert_tape(&mut self, data: &[u8]) -> Result<(), C64Error> {
        let image = TapImage::parse(data).map_err(MediaError::from)?;
        self.tape.insert(image);
        self.bus.memory.set_play_pressed(false);
        Ok(())
    }

    pub fn detach_tape(&mut self) -> Option<TapImage> {
        self.bus.memory.set_play_pressed(false);
        let image = self.tape.eject();
        if image.is_some() {
            info!("tape detached");
        }
        image
    }

    pub fn press_play(&mut self) {
        self.tape.play();
        self.bus.memory.set_play_pressed(self.tape.is_playing());
    }

    pub fn stop_tape(&mut self) {
        self.tape.stop();
        self.bus.memory.set_play_pressed(false);
    }

    #[must_use]
    pub fn tape(&self) -> &Datasette {
        &self.tape
    }

    // ----- snapshots -----

    /// Serialise the whole machine, inserted disk included. Breakpoints,
    /// ROMs, cartridge ROM banks and the tape image are not saved.
    pub fn capture(&self) -> Result<Vec<u8>, C64Error> {
        let state = MachineState {
            model: self.model.tag(),
            frames: self.frames,
            cpu: self.cpu.save_state(),
            bus: self.bus.save_state(),
            cartridge: self.bus.memory.cartridge().map(SaveState::save_state),
            tape: self.tape.save_state(),
            drive: self.drive.as_ref().map(SaveState::save_state),
        };
        let mut out = SnapshotHeader {
            version: snapshot::VERSION,
            cycles: self.cycles,
        }
        .encode()?;
        out.extend(emu_core::encode(&state)?);
        debug!("snapshot captured, {} bytes", out.len());
        Ok(out)
    }

    /// Restore a snapshot taken by [`capture`](Self::capture). The machine
    /// is left untouched unless the whole snapshot decodes.
    pub fn restore(&mut self, data: &[u8]) -> Result<(), C64Error> {
        let (header, body) = SnapshotHeader::parse(data)?;
        let state: MachineState = emu_core::decode(body)?;
        let mut next = self.clone();
        next.load_records(state)?;
        next.cycles = header.cycles;
        next.trace.clear();
        *self = next;
        info!("snapshot restored at cycle {}", self.cycles);
        Ok(())
    }

    fn load_records(&mut self, state: MachineState) -> Result<(), StateError> {
        if state.model != self.model.tag() {
            return Err(StateError::InvalidValue {
                field: "machine.model",
                value: u64::from(state.model),
            });
        }
        expect_present(
            "machine.cartridge",
            state.cartridge.is_some(),
            self.bus.memory.cartridge().is_some(),
        )?;
        expect_present("machine.drive", state.drive.is_some(), self.drive.is_some())?;

        self.frames = state.frames;
        self.cpu.load_state(state.cpu)?;
        self.bus.load_state(state.bus)?;
        if let (Some(cart), Some(saved)) = (self.bus.memory.cartridge_mut(), state.cartridge) {
            cart.load_state(saved)?;
        }
        self.tape.load_state(state.tape)?;
        if let (Some(drive), Some(saved)) = (&mut self.drive, state.drive) {
            drive.load_state(saved)?;
        }
        self.bus.update_pins();
        Ok(())
    }
}

/// Snapshot body, in record order.
#[derive(Serialize, Deserialize)]
struct MachineState {
    model: u8,
    frames: u64,
    cpu: CpuState,
    bus: C64BusState,
    cartridge: Option<CartridgeState>,
    tape: DatasetteState,
    drive: Option<DriveState>,
}

/// Cartridge and drive presence must match the machine being restored
/// into: their ROMs are not carried in the snapshot.
fn expect_present(field: &'static str, saved: bool, present: bool) -> Result<(), StateError> {
    if saved == present {
        Ok(())
    } else {
        Err(StateError::InvalidValue {
            field,
            value: u64::from(saved),
        })
    }
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

impl Observable for C64 {
    fn query(&self, path: &str) -> Option<Value> {
        if let Some(rest) = path.strip_prefix("cpu.") {
            self.cpu.query(rest)
        } else if let Some(rest) = path.strip_prefix("vic.") {
            self.bus.vic.query(rest)
        } else if let Some(rest) = path.strip_prefix("sid.") {
            self.bus.sid.query(rest)
        } else if let Some(rest) = path.strip_prefix("cia1.") {
            self.bus.cia1.query(rest)
        } else if let Some(rest) = path.strip_prefix("cia2.") {
            self.bus.cia2.query(rest)
        } else if let Some(rest) = path.strip_prefix("drive.") {
            self.drive.as_ref()?.query(rest)
        } else if let Some(rest) = path.strip_prefix("memory.") {
            parse_address(rest).map(|a| Value::U8(self.bus.peek(a)))
        } else {
            match path {
                "cycles" => Some(self.cycles.into()),
                "frames" => Some(self.frames.into()),
                "bank" => Some(self.bus.memory.effective_port().into()),
                "tape.position" => Some(Value::U64(self.tape.position() as u64)),
                "tape.playing" => Some(self.tape.is_playing().into()),
                "cartridge" => Some(
                    self.bus
                        .memory
                        .cartridge()
                        .map_or_else(String::new, |c| c.name().to_string())
                        .into(),
                ),
                _ => None,
            }
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        &[
            "cpu.<6502 paths>",
            "vic.<VIC-II paths>",
            "sid.<SID paths>",
            "cia1.<CIA paths>",
            "cia2.<CIA paths>",
            "drive.<1541 paths>",
            "memory.<address>",
            "cycles",
            "frames",
            "bank",
            "tape.position",
            "tape.playing",
            "cartridge",
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vic;

    /// KERNAL whose reset vector points at `$E000`, filled with `code`
    /// followed by NOPs.
    fn kernal_with(code: &[u8]) -> Vec<u8> {
        let mut kernal = vec![0xEA; 8192];
        kernal[..code.len()].copy_from_slice(code);
        kernal[0x1FFC] = 0x00;
        kernal[0x1FFD] = 0xE0;
        kernal
    }

    fn config(kernal: Vec<u8>) -> C64Config {
        C64Config {
            roms: RomSet {
                basic: vec![0; 8192],
                kernal,
                chargen: vec![0; 4096],
                drive: None,
            },
            ..C64Config::default()
        }
    }

    fn make_c64(code: &[u8]) -> C64 {
        C64::new(&config(kernal_with(code))).expect("valid ROMs")
    }

    #[test]
    fn rejects_wrong_rom_size() {
        let mut cfg = config(kernal_with(&[]));
        cfg.roms.kernal.truncate(100);
        assert!(matches!(
            C64::new(&cfg),
            Err(C64Error::Media(MediaError::RomSize { found: 100, .. }))
        ));
    }

    #[test]
    fn reset_sequence_reaches_vector() {
        let mut c64 = make_c64(&[]);
        let outcome = c64.step_instruction().expect("no fault");
        assert!(outcome.instruction_boundary);
        assert_eq!(c64.pc(), 0xE000);
        assert_eq!(c64.cycles(), 7);
        assert_eq!(c64.registers().s, 0xFD);
    }

    #[test]
    fn step_advances_one_cycle() {
        let mut c64 = make_c64(&[]);
        c64.step().expect("no fault");
        assert_eq!(c64.cycles(), 1);
        assert_eq!(c64.cpu().total_cycles(), 1);
        assert!(!c64.cpu().is_instruction_complete());
    }

    #[test]
    fn run_frame_takes_one_frame() {
        let mut c64 = make_c64(&[0x4C, 0x00, 0xE0]);
        assert_eq!(c64.run_frame(), Ok(StopReason::FrameComplete));
        assert_eq!(c64.frames(), 1);
        let per_frame = u64::from(C64Model::C64Pal.cycles_per_frame());
        let first = c64.cycles();
        c64.run_frame().expect("no fault");
        let second = c64.cycles() - first;
        // Stops at the first boundary after the wrap: within one instruction
        assert!(second.abs_diff(per_frame) < 8, "frame took {second} cycles");
    }

    #[test]
    fn breakpoint_stops_before_instruction() {
        // $E000: LDA #$42; NOP; NOP; JMP $E000
        let mut c64 = make_c64(&[0xA9, 0x42, 0xEA, 0xEA, 0x4C, 0x00, 0xE0]);
        c64.add_breakpoint(0xE003);
        assert_eq!(c64.run(), Ok(StopReason::Breakpoint(0xE003)));
        assert_eq!(c64.pc(), 0xE003);
        assert_eq!(c64.registers().a, 0x42);
        assert!(c64.cpu().is_instruction_complete());

        // Resuming leaves the breakpoint behind and comes round again
        assert_eq!(c64.run(), Ok(StopReason::Breakpoint(0xE003)));
    }

    #[test]
    fn disabled_breakpoint_is_ignored() {
        let mut c64 = make_c64(&[0xEA, 0xEA, 0x4C, 0x00, 0xE0]);
        c64.add_breakpoint(0xE001);
        assert_eq!(c64.toggle_breakpoint(0xE001), Some(BreakpointState::Disabled));
        c64.add_breakpoint(0xE002);
        assert_eq!(c64.run(), Ok(StopReason::Breakpoint(0xE002)));
        assert!(c64.remove_breakpoint(0xE002));
        assert_eq!(c64.breakpoints().count(), 1);
    }

    #[test]
    fn soft_breakpoint_fires_once() {
        let mut c64 = make_c64(&[0xEA, 0xEA, 0x4C, 0x00, 0xE0]);
        c64.set_soft_breakpoint(0xE001);
        assert_eq!(c64.run(), Ok(StopReason::Breakpoint(0xE001)));
        c64.halt();
        assert_eq!(c64.run(), Ok(StopReason::Halted));
    }

    #[test]
    fn halt_stops_at_boundary() {
        let mut c64 = make_c64(&[0x4C, 0x00, 0xE0]);
        assert!(!c64.is_running());
        c64.halt();
        assert_eq!(c64.run(), Ok(StopReason::Halted));
        assert!(c64.cpu().is_instruction_complete());
        assert!(!c64.is_running());
    }

    #[test]
    fn jam_stops_the_run() {
        let mut c64 = make_c64(&[0xEA, 0x02]);
        assert_eq!(c64.run(), Ok(StopReason::Jammed));
        assert!(c64.cpu().is_jammed());
        // The rest of the machine keeps its clock
        let before = c64.cycles();
        c64.step().expect("no fault");
        assert_eq!(c64.cycles(), before + 1);
    }

    #[test]
    fn reset_keeps_breakpoints_and_cycles() {
        let mut c64 = make_c64(&[0xEA, 0x4C, 0x00, 0xE0]);
        c64.add_breakpoint(0xE001);
        c64.run().expect("no fault");
        let cycles = c64.cycles();
        c64.reset();
        assert_eq!(c64.cycles(), cycles);
        assert_eq!(c64.breakpoint(0xE001), Some(BreakpointState::Enabled));
        assert_eq!(c64.run(), Ok(StopReason::Breakpoint(0xE001)));
    }

    #[test]
    fn trace_records_instructions() {
        let mut c64 = make_c64(&[0xA9, 0x01, 0xEA, 0x4C, 0x00, 0xE0]);
        c64.set_trace_enabled(true);
        for _ in 0..4 {
            c64.step_instruction().expect("no fault");
        }
        let pcs: Vec<u16> = c64.trace().map(|t| t.pc).collect();
        assert_eq!(pcs, vec![0xE000, 0xE002, 0xE003, 0xE000]);
        let lda = c64.trace().next().expect("entry");
        assert_eq!(lda.length, 2);
        assert_eq!(&lda.bytes[..2], &[0xA9, 0x01]);
    }

    #[test]
    fn trace_ring_is_bounded() {
        let mut cfg = config(kernal_with(&[0x4C, 0x00, 0xE0]));
        cfg.trace_len = 4;
        let mut c64 = C64::new(&cfg).expect("valid ROMs");
        c64.set_trace_enabled(true);
        for _ in 0..20 {
            c64.step_instruction().expect("no fault");
        }
        assert_eq!(c64.trace().count(), 4);
    }

    #[test]
    fn disassemble_through_cpu_view() {
        let c64 = make_c64(&[0xA9, 0x42, 0x4C, 0x00, 0xE0]);
        let lines = c64.disassemble(0xE000, 2);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].text, "LDA #$42");
        assert_eq!(lines[1].address, 0xE002);
    }

    #[test]
    fn register_dumps() {
        let mut c64 = make_c64(&[]);
        assert_eq!(c64.register_dump(Chip::Vic).map(|d| d.len()), Some(0x2F));
        assert_eq!(c64.register_dump(Chip::Cia1).map(|d| d.len()), Some(16));
        assert_eq!(c64.register_dump(Chip::Via1), None);
        c64.bus_mut().sid.write(0x18, 0x0F);
        assert!(c64.register_dump(Chip::Sid).is_some());
    }

    #[test]
    fn framebuffer_dimensions() {
        let c64 = make_c64(&[]);
        assert_eq!(c64.framebuffer_width(), vic::FB_WIDTH);
        assert_eq!(
            c64.framebuffer().len(),
            c64.framebuffer_width() as usize * c64.framebuffer_height() as usize
        );
    }

    #[test]
    fn no_drive_rejects_disk() {
        let mut c64 = make_c64(&[]);
        assert_eq!(
            c64.insert_disk(&[0; 174_848]),
            Err(C64Error::Disk(DiskError::NoDrive))
        );
        assert!(matches!(c64.analyze_track(18), Err(C64Error::Disk(DiskError::NoDrive))));
    }

    #[test]
    fn bad_media_is_rejected() {
        let mut c64 = make_c64(&[]);
        assert!(matches!(c64.load_prg(&[1]), Err(C64Error::Media(MediaError::Prg(_)))));
        assert!(matches!(c64.insert_tape(b"nope"), Err(C64Error::Media(MediaError::Tap(_)))));
        assert!(matches!(
            c64.insert_cartridge(&[0; 16]),
            Err(C64Error::Media(MediaError::Crt(_)))
        ));
    }

    #[test]
    fn play_button_reaches_the_port() {
        let mut c64 = make_c64(&[]);
        let mut tap = b"C64-TAPE-RAW".to_vec();
        tap.extend_from_slice(&[1, 0, 0, 0, 1, 0, 0, 0, 0x30]);
        c64.insert_tape(&tap).expect("valid TAP");
        assert_ne!(c64.bus().memory.effective_port() & 0x10, 0);
        c64.press_play();
        assert_eq!(c64.bus().memory.effective_port() & 0x10, 0);
        c64.stop_tape();
        assert_ne!(c64.bus().memory.effective_port() & 0x10, 0);
    }

    #[test]
    fn observable_paths() {
        let mut c64 = make_c64(&[]);
        c64.step_instruction().expect("no fault");
        assert_eq!(c64.query("cpu.pc"), Some(Value::U16(0xE000)));
        assert_eq!(c64.query("cycles"), Some(Value::U64(7)));
        c64.bus_mut().memory.ram_write(0x1234, 0x56);
        assert_eq!(c64.query("memory.$1234"), Some(Value::U8(0x56)));
        assert_eq!(c64.query("memory.0x1234"), Some(Value::U8(0x56)));
        assert!(c64.query("vic.raster_line").is_some());
        assert_eq!(c64.query("drive.half_track"), None);
        assert_eq!(c64.query("nonsense"), None);
    }

    #[test]
    fn capture_restore_round_trip() {
        let mut c64 = make_c64(&[0xE8, 0xC8, 0x4C, 0x00, 0xE0]);
        for _ in 0..1234 {
            c64.step().expect("no fault");
        }
        let snap = c64.capture().expect("capture");
        assert_eq!(&snap[..4], b"C64S");

        let mut other = make_c64(&[0xE8, 0xC8, 0x4C, 0x00, 0xE0]);
        other.restore(&snap).expect("restore");
        assert_eq!(other.registers(), c64.registers());
        assert_eq!(other.cycles(), c64.cycles());
        assert_eq!(other.capture().expect("capture"), snap);
    }

    #[test]
    fn restore_rejects_newer_version_untouched() {
        let mut c64 = make_c64(&[]);
        c64.step_instruction().expect("no fault");
        let mut snap = c64.capture().expect("capture");
        snap[4] = 3;
        let before = c64.capture().expect("capture");
        assert_eq!(
            c64.restore(&snap),
            Err(C64Error::UnsupportedVersion {
                found: 3,
                supported: 2
            })
        );
        assert_eq!(c64.capture().expect("capture"), before);
    }

    #[test]
    fn restore_rejects_truncated_body() {
        let mut c64 = make_c64(&[]);
        let snap = c64.capture().expect("capture");
        let before = snap.clone();
        assert_eq!(c64.restore(&snap[..snap.len() - 10]), Err(C64Error::Truncated));
        assert_eq!(c64.capture().expect("capture"), before);
    }

    #[test]
    fn restore_rejects_other_model() {
        let pal = make_c64(&[]);
        let mut cfg = config(kernal_with(&[]));
        cfg.model = C64Model::C64Ntsc;
        let mut ntsc = C64::new(&cfg).expect("valid ROMs");
        assert!(matches!(
            ntsc.restore(&pal.capture().expect("capture")),
            Err(C64Error::Snapshot(StateError::InvalidValue { field: "machine.model", .. }))
        ));
    }
}
