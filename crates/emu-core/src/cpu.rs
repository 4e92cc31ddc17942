//! CPU core trait.

use crate::Bus;

/// A CPU core.
///
/// CPUs take the bus by reference in `tick` because they access memory on
/// specific cycles, and the bus is shared with other chips (DMA, video).
/// Interrupt inputs are levels that the machine drives once per cycle
/// after merging every source onto the line.
pub trait Cpu {
    /// The type used for register inspection.
    type Registers;

    /// Advance the CPU by one clock cycle (exactly one bus access).
    fn tick<B: Bus>(&mut self, bus: &mut B);

    /// Address of the next instruction to execute.
    fn pc(&self) -> u16;

    /// Returns a copy of all registers for inspection.
    fn registers(&self) -> Self::Registers;

    /// Returns true if the CPU has stopped executing (jammed or faulted).
    fn is_halted(&self) -> bool;

    /// Drive the maskable interrupt line (`true` = asserted).
    fn set_irq(&mut self, asserted: bool);

    /// Drive the non-maskable interrupt line (`true` = asserted).
    ///
    /// NMI is edge-triggered: only the transition to asserted matters.
    fn set_nmi(&mut self, asserted: bool);

    /// Apply the hardware reset sequence.
    fn reset(&mut self);
}
