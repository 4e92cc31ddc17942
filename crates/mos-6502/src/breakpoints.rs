//! Execution breakpoints.
//!
//! A breakpoint is consulted only when the CPU sits at an instruction
//! boundary with its PC on the breakpoint address. Disabled breakpoints
//! stay in the set but never stop execution.

use std::collections::BTreeMap;

/// State of a breakpoint in the set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakpointState {
    Enabled,
    Disabled,
}

/// Breakpoints keyed by address, plus one optional one-shot "run to"
/// address that removes itself when hit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Breakpoints {
    points: BTreeMap<u16, BreakpointState>,
    soft: Option<u16>,
}

impl Breakpoints {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an enabled breakpoint (re-enables an existing one).
    pub fn add(&mut self, address: u16) {
        self.points.insert(address, BreakpointState::Enabled);
    }

    /// Remove a breakpoint. Returns false if none was set.
    pub fn remove(&mut self, address: u16) -> bool {
        self.points.remove(&address).is_some()
    }

    /// Flip between enabled and disabled. Returns the new state, or
    /// `None` if there is no breakpoint at `address`.
    pub fn toggle(&mut self, address: u16) -> Option<BreakpointState> {
        let state = self.points.get_mut(&address)?;
        *state = match *state {
            BreakpointState::Enabled => BreakpointState::Disabled,
            BreakpointState::Disabled => BreakpointState::Enabled,
        };
        Some(*state)
    }

    /// Enable or disable an existing breakpoint. Returns false if absent.
    pub fn set_enabled(&mut self, address: u16, enabled: bool) -> bool {
        match self.points.get_mut(&address) {
            Some(state) => {
                *state = if enabled {
                    BreakpointState::Enabled
                } else {
                    BreakpointState::Disabled
                };
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn get(&self, address: u16) -> Option<BreakpointState> {
        self.points.get(&address).copied()
    }

    #[must_use]
    pub fn is_enabled(&self, address: u16) -> bool {
        self.get(address) == Some(BreakpointState::Enabled)
    }

    /// All breakpoints in address order.
    pub fn iter(&self) -> impl Iterator<Item = (u16, BreakpointState)> + '_ {
        self.points.iter().map(|(&a, &s)| (a, s))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty() && self.soft.is_none()
    }

    pub fn clear(&mut self) {
        self.points.clear();
        self.soft = None;
    }

    /// Set the one-shot "run to" address, replacing any previous one.
    pub fn set_soft(&mut self, address: u16) {
        self.soft = Some(address);
    }

    #[must_use]
    pub fn soft(&self) -> Option<u16> {
        self.soft
    }

    /// Check `pc` at an instruction boundary. A matching soft breakpoint is
    /// consumed.
    pub fn hit(&mut self, pc: u16) -> bool {
        if self.soft == Some(pc) {
            self.soft = None;
            return true;
        }
        self.is_enabled(pc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggle_flips_state_and_ignores_absent() {
        let mut bps = Breakpoints::new();
        bps.add(0x0810);
        assert_eq!(bps.toggle(0x0810), Some(BreakpointState::Disabled));
        assert!(!bps.hit(0x0810));
        assert_eq!(bps.toggle(0x0810), Some(BreakpointState::Enabled));
        assert!(bps.hit(0x0810));
        assert_eq!(bps.toggle(0x1234), None);
    }

    #[test]
    fn soft_breakpoint_fires_once() {
        let mut bps = Breakpoints::new();
        bps.set_soft(0xC000);
        assert!(bps.hit(0xC000));
        assert!(!bps.hit(0xC000));
        assert!(bps.is_empty());
    }

    #[test]
    fn remove_reports_presence() {
        let mut bps = Breakpoints::new();
        bps.add(0x1000);
        assert!(bps.remove(0x1000));
        assert!(!bps.remove(0x1000));
        assert_eq!(bps.get(0x1000), None);
    }
}
