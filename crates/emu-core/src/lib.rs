//! Core traits and types for cycle-stepped emulation.
//!
//! Everything ticks at the CPU clock. Chips talk to each other through a
//! [`Bus`] and boolean signal lines, never through direct references.

mod bus;
mod clock;
mod cpu;
mod observable;
mod state;

pub use bus::{Bus, SimpleBus};
pub use clock::{MasterClock, Ticks};
pub use cpu::Cpu;
pub use observable::{Observable, Value};
pub use state::{SaveState, StateError, check_below, decode, encode, restore_block};
