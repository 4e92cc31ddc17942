//! 1541 floppy disk drive emulation.
//!
//! The 1541 contains its own 6502 CPU running at ~1 MHz, 2KB RAM,
//! 16KB ROM, and two MOS 6522 VIAs:
//!
//!   VIA1 ($1800): IEC serial bus interface
//!     Port B: bit 0 = DATA IN, bit 1 = DATA OUT, bit 2 = CLK IN,
//!             bit 3 = CLK OUT, bit 4 = ATN ACK, bits 5-6 = device
//!             address jumpers, bit 7 = ATN IN. Inputs are inverted:
//!             1 = line low.
//!     CA1:    ATN IN
//!
//!   VIA2 ($1C00): Disk controller
//!     Port A: GCR data byte from/to the head
//!     Port B: bit 0-1 = stepper motor phase
//!             bit 2 = motor on
//!             bit 3 = LED
//!             bit 4 = write protect sense (0 = protected)
//!             bit 5-6 = density select
//!             bit 7 = SYNC detect (0 = in sync)
//!     CA1:    byte ready
//!     CA2:    byte ready enable (SOE), also routed to the CPU SO pin
//!     CB2:    read/write mode (0 = write)
//!
//! The drive runs off its own 1 MHz crystal. Against the host clock it
//! is paced by a fractional accumulator: every host cycle adds 1,000,000
//! and a drive cycle runs for each host frequency's worth accumulated.
//! Bit cells are timed with a 16 MHz accumulator: each drive cycle adds
//! 16 ticks and a bit is transferred whenever a zone's ticks-per-bit is
//! reached.

use std::sync::Arc;

use emu_core::{Bus, Cpu, Observable, SaveState, StateError, Value, check_below};
use log::debug;
use mos_6502::{CpuState, Mos6502};
use serde::{Deserialize, Serialize};

use crate::disk::{Disk, HALF_TRACKS, Track};
use crate::drive1541_bus::{Drive1541Bus, Drive1541BusState};
use crate::gcr;
use crate::iec::IecBus;

/// Half-track the head rests on at power-on (track 18).
const START_HALF_TRACK: u8 = 35;

/// Drive CPU clock.
pub const DRIVE_FREQUENCY: u32 = 1_000_000;

/// 16 MHz ticks per 1 MHz drive cycle.
const TICKS_PER_CYCLE: u32 = 16;

/// 1541 floppy disk drive.
#[derive(Debug, Clone)]
pub struct Drive1541 {
    cpu: Mos6502,
    bus: Drive1541Bus,
    disk: Option<Disk>,
    /// Clock of the machine driving [`run_host_cycle`](Self::run_host_cycle).
    host_frequency: u32,
    /// Drive-clock credit in units of 1/`host_frequency` drive cycles.
    clock_credit: u64,
    /// Head position, 1-84.
    half_track: u8,
    /// Last stepper phase driven on VIA2 PB0-1.
    stepper_phase: u8,
    motor_on: bool,
    led_on: bool,
    /// Bit under the head within the current half-track.
    bit_pos: usize,
    /// 16 MHz ticks towards the next bit cell.
    ticks: u32,
    /// Last ten bits read, for SYNC detection and the data latch.
    read_shift: u16,
    write_shift: u8,
    /// Bits since the last byte boundary.
    bit_count: u8,
    sync: bool,
    /// Byte-ready is held low for one cycle.
    byte_ready: bool,
    write_mode: bool,
}

impl Drive1541 {
    /// A drive with the given 16 KB DOS ROM, starting its reset sequence.
    /// `host_frequency` is the clock [`run_host_cycle`](Self::run_host_cycle)
    /// is called at; zero is treated as 1:1.
    #[must_use]
    pub fn new(rom: Arc<[u8]>, host_frequency: u32) -> Self {
        let mut cpu = Mos6502::new();
        cpu.reset();
        Self {
            cpu,
            bus: Drive1541Bus::new(rom),
            disk: None,
            host_frequency: if host_frequency == 0 { DRIVE_FREQUENCY } else { host_frequency },
            clock_credit: 0,
            half_track: START_HALF_TRACK,
            stepper_phase: 0,
            motor_on: false,
            led_on: false,
            bit_pos: 0,
            ticks: 0,
            read_shift: 0,
            write_shift: 0,
            bit_count: 0,
            sync: false,
            byte_ready: false,
            write_mode: false,
        }
    }

    /// Reset the drive electronics. The head and the disk stay where they
    /// are.
    pub fn reset(&mut self) {
        self.cpu.reset();
        self.bus.reset();
        self.motor_on = false;
        self.led_on = false;
        self.clock_credit = 0;
        self.ticks = 0;
        self.read_shift = 0;
        self.bit_count = 0;
        self.sync = false;
        self.byte_ready = false;
        self.write_mode = false;
    }

    /// Swap in a fully built disk.
    pub fn insert_disk(&mut self, disk: Disk) {
        self.disk = Some(disk);
        self.wrap_bit_pos();
    }

    /// Remove the disk and hand it back.
    pub fn eject_disk(&mut self) -> Option<Disk> {
        self.sync = false;
        self.disk.take()
    }

    #[must_use]
    pub fn has_disk(&self) -> bool {
        self.disk.is_some()
    }

    #[must_use]
    pub fn disk(&self) -> Option<&Disk> {
        self.disk.as_ref()
    }

    pub fn disk_mut(&mut self) -> Option<&mut Disk> {
        self.disk.as_mut()
    }

    #[must_use]
    pub fn half_track(&self) -> u8 {
        self.half_track
    }

    /// Whole track under the head (half-tracks round up).
    #[must_use]
    pub fn track(&self) -> u8 {
        self.half_track.div_ceil(2)
    }

    #[must_use]
    pub fn bit_position(&self) -> usize {
        self.bit_pos
    }

    #[must_use]
    pub fn motor_on(&self) -> bool {
        self.motor_on
    }

    #[must_use]
    pub fn led_on(&self) -> bool {
        self.led_on
    }

    /// Write-protect sense. Reads protected with no disk inserted.
    #[must_use]
    pub fn write_protected(&self) -> bool {
        self.disk.as_ref().is_none_or(Disk::is_write_protected)
    }

    #[must_use]
    pub fn cpu(&self) -> &Mos6502 {
        &self.cpu
    }

    #[must_use]
    pub fn bus(&self) -> &Drive1541Bus {
        &self.bus
    }

    /// Move the head one half-track inward. No-op at half-track 84.
    pub fn step_inward(&mut self) {
        if self.half_track < HALF_TRACKS {
            self.move_head(self.half_track + 1);
        }
    }

    /// Move the head one half-track outward. No-op at half-track 1.
    pub fn step_outward(&mut self) {
        if self.half_track > 1 {
            self.move_head(self.half_track - 1);
        }
    }

    fn current_track(&self) -> Option<&Track> {
        self.disk.as_ref().and_then(|d| d.half_track(self.half_track).ok())
    }

    fn current_len(&self) -> usize {
        self.current_track().map_or(0, Track::bit_len)
    }

    fn move_head(&mut self, half_track: u8) {
        let old_len = self.current_len();
        self.half_track = half_track;
        let new_len = self.current_len();
        // Keep the same angular position on the new track.
        if old_len != 0 && new_len != 0 {
            self.bit_pos = self.bit_pos * new_len / old_len;
        }
        self.wrap_bit_pos();
        debug!("1541 head at half-track {half_track}");
    }

    fn wrap_bit_pos(&mut self) {
        let len = self.current_len();
        self.bit_pos = if len == 0 { 0 } else { self.bit_pos % len };
    }

    /// Advance the drive by one host-clock cycle. Runs zero, one or two
    /// drive cycles depending on the accumulated credit and returns how
    /// many ran.
    pub fn run_host_cycle(&mut self, iec: &mut IecBus) -> u32 {
        self.clock_credit += u64::from(DRIVE_FREQUENCY);
        let period = u64::from(self.host_frequency);
        let mut ran = 0;
        while self.clock_credit >= period {
            self.clock_credit -= period;
            self.tick(iec);
            ran += 1;
        }
        ran
    }

    /// Tick the drive for one of its own cycles.
    ///
    /// Reads the IEC lines, ticks the CPU and VIAs, drives the IEC lines
    /// back and moves the disk under the head.
    pub fn tick(&mut self, iec: &mut IecBus) {
        let atn_asserted = !iec.atn();
        self.update_via1_from_iec(iec, atn_asserted);

        self.cpu
            .set_irq(self.bus.via1.irq_active() || self.bus.via2.irq_active());
        self.cpu.tick(&mut self.bus);
        self.bus.via1.tick();
        self.bus.via2.tick();

        self.update_iec_from_via1(iec, atn_asserted);
        self.update_mechanics();

        if self.byte_ready {
            self.byte_ready = false;
            self.bus.via2.set_ca1(true);
        }
        self.rotate();
        self.update_via2_pins();
    }

    /// VIA1 port B inputs. Device address jumpers (PB5-6) read 0 for
    /// device 8.
    fn update_via1_from_iec(&mut self, iec: &IecBus, atn_asserted: bool) {
        let mut pins = 0x1A;
        if !iec.data() {
            pins |= 0x01;
        }
        if !iec.clk() {
            pins |= 0x04;
        }
        if atn_asserted {
            pins |= 0x80;
        }
        self.bus.via1.pins_b = pins;
        self.bus.via1.set_ca1(atn_asserted);
    }

    /// VIA1 outputs onto the bus. DATA is also pulled while ATN IN and
    /// ATN ACK disagree, which answers an ATN before the ROM does.
    fn update_iec_from_via1(&mut self, iec: &mut IecBus, atn_asserted: bool) {
        let pb = self.bus.via1.orb() & self.bus.via1.ddr_b();
        let atn_ack = pb & 0x10 != 0;
        iec.set_drive_data(pb & 0x02 != 0 || atn_asserted != atn_ack);
        iec.set_drive_clk(pb & 0x08 != 0);
    }

    /// Motor, LED, stepper and read/write mode from VIA2.
    fn update_mechanics(&mut self) {
        let pb = self.bus.via2.orb() & self.bus.via2.ddr_b();
        self.motor_on = pb & 0x04 != 0;
        self.led_on = pb & 0x08 != 0;

        let phase = pb & 0x03;
        if phase != self.stepper_phase {
            match phase.wrapping_sub(self.stepper_phase) & 0x03 {
                1 => self.step_inward(),
                3 => self.step_outward(),
                _ => {}
            }
            self.stepper_phase = phase;
        }

        let write_mode = !self.bus.via2.cb2_output();
        if write_mode != self.write_mode {
            self.write_mode = write_mode;
            self.bit_count = 0;
            self.read_shift = 0;
            if write_mode {
                self.write_shift = self.bus.via2.port_a_output();
            }
        }
    }

    fn update_via2_pins(&mut self) {
        let mut pins = 0x6F;
        if !self.write_protected() {
            pins |= 0x10;
        }
        if !self.sync {
            pins |= 0x80;
        }
        self.bus.via2.pins_b = pins;
    }

    /// Pulse byte-ready while SOE is high: VIA2 CA1 and the CPU SO pin.
    fn signal_byte_ready(&mut self) {
        if self.bus.via2.ca2_output() {
            self.bus.via2.set_ca1(false);
            self.byte_ready = true;
            self.cpu.set_overflow();
        }
    }

    /// Advance the disk by one drive cycle's worth of 16 MHz ticks.
    fn rotate(&mut self) {
        if !self.motor_on {
            return;
        }
        let half_track = self.half_track;
        let Some(disk) = self.disk.as_mut() else {
            return;
        };
        let Ok(track) = disk.half_track(half_track) else {
            return;
        };
        let zone = if track.is_empty() {
            gcr::half_track_zone(half_track)
        } else {
            track.zone()
        };

        self.ticks += TICKS_PER_CYCLE;
        let per_bit = gcr::ticks_per_bit(zone);
        if self.ticks < per_bit {
            return;
        }
        self.ticks -= per_bit;

        if self.write_mode {
            self.write_bit(zone);
        } else {
            self.read_bit();
        }
    }

    fn read_bit(&mut self) {
        let Some(track) = self.current_track() else {
            return;
        };
        let bit = track.bit(self.bit_pos);
        let len = track.bit_len();
        self.advance(len);

        self.read_shift = (self.read_shift << 1 | u16::from(bit)) & 0x3FF;
        if self.read_shift == 0x3FF {
            self.sync = true;
            self.bit_count = 0;
            return;
        }
        self.sync = false;
        self.bit_count += 1;
        if self.bit_count == 8 {
            self.bit_count = 0;
            self.bus.via2.pins_a = self.read_shift as u8;
            self.signal_byte_ready();
        }
    }

    fn write_bit(&mut self, zone: u8) {
        let bit = self.write_shift & 0x80 != 0;
        self.write_shift <<= 1;

        let half_track = self.half_track;
        let bit_pos = self.bit_pos;
        let mut len = 0;
        if let Some(disk) = self.disk.as_mut() {
            if !disk.is_write_protected() {
                if let Ok(track) = disk.half_track_mut(half_track) {
                    // Writing onto an unrecorded half-track lays down a
                    // fresh rotation first.
                    if track.is_empty() {
                        *track = Track::from_bytes(vec![0x55; gcr::track_bytes(zone)], zone);
                    }
                    track.set_bit(bit_pos, bit);
                    len = track.bit_len();
                }
                disk.mark_modified();
            } else {
                len = disk.half_track(half_track).map_or(0, Track::bit_len);
            }
        }
        self.advance(len);

        self.bit_count += 1;
        if self.bit_count == 8 {
            self.bit_count = 0;
            self.write_shift = self.bus.via2.port_a_output();
            self.signal_byte_ready();
        }
    }

    fn advance(&mut self, len: usize) {
        self.bit_pos = if len == 0 { 0 } else { (self.bit_pos + 1) % len };
    }

    /// Drive memory as the drive CPU sees it, without side effects.
    #[must_use]
    pub fn peek(&self, addr: u16) -> u8 {
        self.bus.peek(addr)
    }
}

/// Snapshot image of a [`Drive1541`], including the inserted disk. The DOS
/// ROM and the host clock are not saved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriveState {
    cpu: CpuState,
    bus: Drive1541BusState,
    disk: Option<Disk>,
    clock_credit: u64,
    half_track: u8,
    stepper_phase: u8,
    motor_on: bool,
    led_on: bool,
    bit_pos: u64,
    ticks: u32,
    read_shift: u16,
    write_shift: u8,
    bit_count: u8,
    sync: bool,
    byte_ready: bool,
    write_mode: bool,
}

impl SaveState for Drive1541 {
    type State = DriveState;

    fn save_state(&self) -> DriveState {
        DriveState {
            cpu: self.cpu.save_state(),
            bus: self.bus.save_state(),
            disk: self.disk.clone(),
            clock_credit: self.clock_credit,
            half_track: self.half_track,
            stepper_phase: self.stepper_phase,
            motor_on: self.motor_on,
            led_on: self.led_on,
            bit_pos: self.bit_pos as u64,
            ticks: self.ticks,
            read_shift: self.read_shift,
            write_shift: self.write_shift,
            bit_count: self.bit_count,
            sync: self.sync,
            byte_ready: self.byte_ready,
            write_mode: self.write_mode,
        }
    }

    /// The saved disk replaces whatever is inserted, including no disk.
    fn load_state(&mut self, s: DriveState) -> Result<(), StateError> {
        if !(1..=HALF_TRACKS).contains(&s.half_track) {
            return Err(StateError::InvalidValue {
                field: "drive.half_track",
                value: u64::from(s.half_track),
            });
        }
        check_below("drive.stepper_phase", u64::from(s.stepper_phase), 4)?;
        check_below("drive.bit_count", u64::from(s.bit_count), 8)?;
        check_below(
            "drive.clock_credit",
            s.clock_credit,
            u64::from(self.host_frequency),
        )?;
        if let Some(disk) = &s.disk {
            disk.check_state()?;
        }
        self.cpu.load_state(s.cpu)?;
        self.bus.load_state(s.bus)?;
        self.disk = s.disk;
        self.clock_credit = s.clock_credit;
        self.half_track = s.half_track;
        self.stepper_phase = s.stepper_phase;
        self.motor_on = s.motor_on;
        self.led_on = s.led_on;
        self.bit_pos = usize::try_from(s.bit_pos).unwrap_or(0);
        self.ticks = s.ticks;
        self.read_shift = s.read_shift & 0x3FF;
        self.write_shift = s.write_shift;
        self.bit_count = s.bit_count;
        self.sync = s.sync;
        self.byte_ready = s.byte_ready;
        self.write_mode = s.write_mode;
        self.wrap_bit_pos();
        Ok(())
    }
}

impl Observable for Drive1541 {
    fn query(&self, path: &str) -> Option<Value> {
        if let Some(rest) = path.strip_prefix("cpu.") {
            return self.cpu.query(rest);
        }
        if let Some(rest) = path.strip_prefix("via1.") {
            return self.bus.via1.query(rest);
        }
        if let Some(rest) = path.strip_prefix("via2.") {
            return self.bus.via2.query(rest);
        }
        if let Some(hex) = path.strip_prefix("memory.$") {
            let addr = u16::from_str_radix(hex, 16).ok()?;
            return Some(self.peek(addr).into());
        }
        match path {
            "half_track" => Some(self.half_track.into()),
            "track" => Some(self.track().into()),
            "bit_position" => Some(Value::U64(self.bit_pos as u64)),
            "motor" => Some(self.motor_on.into()),
            "led" => Some(self.led_on.into()),
            "write_protect" => Some(self.write_protected().into()),
            "disk" => Some(self.has_disk().into()),
            "sync" => Some(self.sync.into()),
            "write_mode" => Some(self.write_mode.into()),
            _ => None,
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        &[
            "half_track",
            "track",
            "bit_position",
            "motor",
            "led",
            "write_protect",
            "disk",
            "sync",
            "write_mode",
            "cpu.<reg>",
            "via1.<reg>",
            "via2.<reg>",
            "memory.$XXXX",
        ]
    }
}
