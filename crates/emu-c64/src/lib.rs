//! Cycle-stepped Commodore 64 emulation core.
//!
//! The C64 master clock ticks at CPU cycle rate (985,248 Hz PAL, 1,022,727
//! Hz NTSC). VIC-II, CPU, both CIAs, SID, datasette and the 1541 advance
//! once per tick in a fixed order. One PAL frame is 312 raster lines x 63
//! cycles = 19,656 CPU cycles.
//!
//! The host drives a [`C64`] directly or through a [`C64Runner`] on a
//! worker thread, and can capture and restore the whole machine as a
//! versioned snapshot.

pub mod analysis;
mod bus;
mod c64;
pub mod capture;
pub mod cartridge;
mod cia;
pub mod config;
pub mod d64;
pub mod disk;
pub mod drive1541;
mod drive1541_bus;
pub mod error;
pub mod g64;
pub mod gcr;
pub mod iec;
pub mod input;
mod keyboard;
mod memory;
pub mod p00;
pub mod palette;
pub mod prg;
pub mod runner;
pub mod snapshot;
pub mod t64;
pub mod tap;
pub mod tape;
pub mod vic;

pub use analysis::{TrackAnalysis, TrackError};
pub use bus::C64Bus;
pub use c64::{C64, Chip, HaltHandle, StepOutcome, StopReason, TraceEntry};
pub use cia::Cia;
pub use config::{C64Config, C64Model, RomKind, RomSet};
pub use d64::D64;
pub use disk::{Disk, DiskError, TrackWarning};
pub use drive1541::Drive1541;
pub use error::{C64Error, MediaError};
pub use input::{ControlPort, InputQueue, MouseModel};
pub use keyboard::{C64Key, KeyboardMatrix};
pub use memory::{BankConfig, C64Memory, Source};
pub use runner::{C64Runner, Command, Event, Frame};
pub use vic::Vic;

pub use mos_6502::{BreakpointState, DisassembledLine, Registers};
pub use mos_sid_6581::SidModel;
