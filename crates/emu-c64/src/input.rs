//! Controller ports and scripted input.
//!
//! - Joysticks: five switches per port, active low on CIA1. Port 1 shares
//!   PB with the keyboard rows, port 2 shares PA with the columns.
//! - Paddles: two pots per port, read through the SID. CIA1 PA bits 6/7
//!   select which port the SID's POTX/POTY see.
//! - Mice: a 1350 reports movement as joystick directions; a 1351 reports
//!   its position modulo 64 on the pots. Both buttons close port switches.
//! - [`InputQueue`]: frame-stamped key events for typing text into a
//!   running machine.

use std::collections::VecDeque;

use emu_core::{SaveState, StateError};
use serde::{Deserialize, Serialize};

use crate::keyboard::{C64Key, KeyboardMatrix, char_to_keys};

/// Joystick switch bits, as they appear on the CIA port lines.
pub mod joy {
    pub const UP: u8 = 0x01;
    pub const DOWN: u8 = 0x02;
    pub const LEFT: u8 = 0x04;
    pub const RIGHT: u8 = 0x08;
    pub const FIRE: u8 = 0x10;
}

/// Controller port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlPort {
    One,
    Two,
}

/// Commodore mouse variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MouseModel {
    /// Joystick mode mouse: each move closes the matching direction switch.
    Mouse1350,
    /// Proportional mouse read through POTX/POTY.
    Mouse1351,
}

/// A mouse plugged into a control port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mouse {
    model: MouseModel,
    /// Position counters in mouse steps. Y grows upwards.
    x: i64,
    y: i64,
    left: bool,
    right: bool,
    /// Direction switches closed by the last move (1350 only).
    directions: u8,
}

impl Mouse {
    #[must_use]
    pub fn new(model: MouseModel) -> Self {
        Self {
            model,
            x: 0,
            y: 0,
            left: false,
            right: false,
            directions: 0,
        }
    }

    #[must_use]
    pub fn model(&self) -> MouseModel {
        self.model
    }

    pub fn set_buttons(&mut self, left: bool, right: bool) {
        self.left = left;
        self.right = right;
    }

    /// Move by a host delta in screen orientation (positive `dy` is down).
    /// A zero move opens the 1350's direction switches again.
    pub fn move_by(&mut self, dx: i32, dy: i32) {
        self.x = self.x.wrapping_add(i64::from(dx));
        self.y = self.y.wrapping_sub(i64::from(dy));
        let mut directions = 0;
        if dx < 0 {
            directions |= joy::LEFT;
        } else if dx > 0 {
            directions |= joy::RIGHT;
        }
        if dy < 0 {
            directions |= joy::UP;
        } else if dy > 0 {
            directions |= joy::DOWN;
        }
        self.directions = directions;
    }

    /// Switches this mouse closes, active high (`joy::*` bits).
    #[must_use]
    pub fn switches(&self) -> u8 {
        let fire = if self.left { joy::FIRE } else { 0 };
        match self.model {
            MouseModel::Mouse1350 => fire | self.directions,
            MouseModel::Mouse1351 if self.right => fire | joy::UP,
            MouseModel::Mouse1351 => fire,
        }
    }

    /// POTX/POTY as the SID samples them.
    #[must_use]
    pub fn pots(&self) -> (u8, u8) {
        match self.model {
            // The 1350 right button shorts POTX.
            MouseModel::Mouse1350 => (if self.right { 0 } else { 0xFF }, 0xFF),
            // Bits 1-6 carry the position, bit 0 is noise and reads 0.
            MouseModel::Mouse1351 => (Self::pot_bits(self.x), Self::pot_bits(self.y)),
        }
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn pot_bits(position: i64) -> u8 {
        ((position & 0x3F) as u8) << 1
    }
}

/// Switch and pot latches for both control ports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlPorts {
    /// Switches closed, active high (`joy::*` bits).
    joysticks: [u8; 2],
    /// POTX/POTY per port. 255 with nothing connected.
    paddles: [[u8; 2]; 2],
    /// A mouse takes over the port's pots and shares its switches.
    mice: [Option<Mouse>; 2],
}

impl Default for ControlPorts {
    fn default() -> Self {
        Self {
            joysticks: [0; 2],
            paddles: [[0xFF; 2]; 2],
            mice: [None, None],
        }
    }
}

impl ControlPorts {
    fn index(port: ControlPort) -> usize {
        match port {
            ControlPort::One => 0,
            ControlPort::Two => 1,
        }
    }

    /// Replace the switch state of one port (`joy::*` bits).
    pub fn set_joystick(&mut self, port: ControlPort, switches: u8) {
        self.joysticks[Self::index(port)] = switches & 0x1F;
    }

    #[must_use]
    pub fn joystick(&self, port: ControlPort) -> u8 {
        self.joysticks[Self::index(port)]
    }

    /// Every switch closed on a port: joystick and mouse together.
    #[must_use]
    pub fn switches(&self, port: ControlPort) -> u8 {
        let i = Self::index(port);
        self.joysticks[i] | self.mice[i].as_ref().map_or(0, Mouse::switches)
    }

    /// Plug a fresh mouse into `port`, replacing any mouse already there.
    pub fn attach_mouse(&mut self, port: ControlPort, model: MouseModel) {
        self.mice[Self::index(port)] = Some(Mouse::new(model));
    }

    pub fn detach_mouse(&mut self, port: ControlPort) -> Option<Mouse> {
        self.mice[Self::index(port)].take()
    }

    #[must_use]
    pub fn mouse(&self, port: ControlPort) -> Option<&Mouse> {
        self.mice[Self::index(port)].as_ref()
    }

    pub fn mouse_mut(&mut self, port: ControlPort) -> Option<&mut Mouse> {
        self.mice[Self::index(port)].as_mut()
    }

    pub fn set_paddles(&mut self, port: ControlPort, x: u8, y: u8) {
        self.paddles[Self::index(port)] = [x, y];
    }

    /// Pot values the SID sees for the CIA1 PA output. PA6 low-to-high
    /// selects port 1, PA7 selects port 2.
    #[must_use]
    pub fn selected_paddles(&self, pa: u8) -> (u8, u8) {
        let i = match pa >> 6 {
            0b01 => 0,
            0b10 => 1,
            _ => return (0xFF, 0xFF),
        };
        match &self.mice[i] {
            Some(mouse) => mouse.pots(),
            None => (self.paddles[i][0], self.paddles[i][1]),
        }
    }

    /// Open every joystick switch and mouse button.
    pub fn release_all(&mut self) {
        self.joysticks = [0; 2];
        for mouse in self.mice.iter_mut().flatten() {
            mouse.set_buttons(false, false);
        }
    }
}

impl SaveState for ControlPorts {
    type State = Self;

    fn save_state(&self) -> Self {
        self.clone()
    }

    fn load_state(&mut self, state: Self) -> Result<(), StateError> {
        *self = state;
        Ok(())
    }
}

/// Resolve the CIA1 port pins from what the CIA drives, the keyboard and
/// both control ports. Returns the `(pa, pb)` pin levels, active low.
#[must_use]
pub fn cia1_pins(pa_out: u8, pb_out: u8, keyboard: &KeyboardMatrix, ports: &ControlPorts) -> (u8, u8) {
    let pa = pa_out & !ports.switches(ControlPort::Two);
    let pb = pb_out & !ports.switches(ControlPort::One);
    (pa & keyboard.scan_columns(pb), pb & keyboard.scan_rows(pa))
}

/// A scheduled key transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputEvent {
    pub frame: u64,
    pub key: C64Key,
    pub pressed: bool,
}

/// Frame-stamped key events, kept sorted by frame.
#[derive(Debug, Clone, Default)]
pub struct InputQueue {
    events: VecDeque<InputEvent>,
}

impl InputQueue {
    /// Frames a typed key is held down.
    pub const HOLD_FRAMES: u64 = 3;
    /// Frames between typed keys.
    pub const GAP_FRAMES: u64 = 3;

    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: InputEvent) {
        let pos = self
            .events
            .iter()
            .position(|e| e.frame > event.frame)
            .unwrap_or(self.events.len());
        self.events.insert(pos, event);
    }

    /// Press `key` at `frame` and release it `hold` frames later.
    pub fn enqueue_key(&mut self, key: C64Key, frame: u64, hold: u64) {
        self.push(InputEvent {
            frame,
            key,
            pressed: true,
        });
        self.push(InputEvent {
            frame: frame + hold,
            key,
            pressed: false,
        });
    }

    /// Type `text` starting at `frame`. Characters with no key are skipped.
    /// Returns the first frame after the last key is released.
    pub fn enqueue_text(&mut self, text: &str, frame: u64) -> u64 {
        let mut frame = frame;
        for ch in text.chars() {
            let keys = char_to_keys(ch);
            if keys.is_empty() {
                continue;
            }
            for key in keys {
                self.enqueue_key(key, frame, Self::HOLD_FRAMES);
            }
            frame += Self::HOLD_FRAMES + Self::GAP_FRAMES;
        }
        frame
    }

    /// Apply every event due at or before `frame`.
    pub fn process(&mut self, frame: u64, keyboard: &mut KeyboardMatrix) {
        while self.events.front().is_some_and(|e| e.frame <= frame) {
            if let Some(event) = self.events.pop_front() {
                keyboard.set(event.key, event.pressed);
            }
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joystick_two_pulls_port_a() {
        let kbd = KeyboardMatrix::new();
        let mut ports = ControlPorts::default();
        ports.set_joystick(ControlPort::Two, joy::FIRE | joy::UP);
        let (pa, pb) = cia1_pins(0xFF, 0xFF, &kbd, &ports);
        assert_eq!(pa, 0xFF & !0x11);
        assert_eq!(pb, 0xFF);
    }

    #[test]
    fn joystick_one_pulls_port_b() {
        let kbd = KeyboardMatrix::new();
        let mut ports = ControlPorts::default();
        ports.set_joystick(ControlPort::One, joy::LEFT);
        let (_, pb) = cia1_pins(0xFF, 0xFF, &kbd, &ports);
        assert_eq!(pb, !joy::LEFT);
    }

    #[test]
    fn keyboard_scan_through_pins() {
        let mut kbd = KeyboardMatrix::new();
        kbd.set(C64Key::Return, true);
        let ports = ControlPorts::default();
        // KERNAL scan: PA drives column 0 low, PB is all input.
        let (_, pb) = cia1_pins(!0x01, 0xFF, &kbd, &ports);
        assert_eq!(pb, !0x02);
        let (_, pb) = cia1_pins(!0x02, 0xFF, &kbd, &ports);
        assert_eq!(pb, 0xFF);
    }

    #[test]
    fn joystick_two_acts_as_column_select() {
        // Port 2 held down pulls PA low, which reads as a pressed key in
        // that column even when the CIA drives all columns high.
        let mut kbd = KeyboardMatrix::new();
        kbd.set(C64Key::N3, true);
        let mut ports = ControlPorts::default();
        ports.set_joystick(ControlPort::Two, joy::DOWN);
        let (_, pb) = cia1_pins(0xFF, 0xFF, &kbd, &ports);
        assert_eq!(pb, !0x01);
    }

    #[test]
    fn paddle_selection_follows_pa() {
        let mut ports = ControlPorts::default();
        ports.set_paddles(ControlPort::One, 10, 20);
        ports.set_paddles(ControlPort::Two, 30, 40);
        assert_eq!(ports.selected_paddles(0x40), (10, 20));
        assert_eq!(ports.selected_paddles(0x80), (30, 40));
        assert_eq!(ports.selected_paddles(0xC0), (0xFF, 0xFF));
    }

    #[test]
    fn mouse_1351_reports_position_on_the_pots() {
        let mut ports = ControlPorts::default();
        ports.set_paddles(ControlPort::One, 10, 20);
        ports.attach_mouse(ControlPort::One, MouseModel::Mouse1351);
        assert_eq!(ports.selected_paddles(0x40), (0, 0));

        let mouse = ports.mouse_mut(ControlPort::One).expect("attached");
        mouse.move_by(5, 3);
        // Up on screen counts the pot up.
        assert_eq!(ports.selected_paddles(0x40), (10, 122));
        ports.mouse_mut(ControlPort::One).expect("attached").move_by(60, 0);
        assert_eq!(ports.selected_paddles(0x40), (2, 122));

        ports.detach_mouse(ControlPort::One);
        assert_eq!(ports.selected_paddles(0x40), (10, 20));
    }

    #[test]
    fn mouse_1351_buttons_close_fire_and_up() {
        let kbd = KeyboardMatrix::new();
        let mut ports = ControlPorts::default();
        ports.attach_mouse(ControlPort::One, MouseModel::Mouse1351);
        ports
            .mouse_mut(ControlPort::One)
            .expect("attached")
            .set_buttons(true, true);
        let (_, pb) = cia1_pins(0xFF, 0xFF, &kbd, &ports);
        assert_eq!(pb, !(joy::FIRE | joy::UP));

        ports.release_all();
        let (_, pb) = cia1_pins(0xFF, 0xFF, &kbd, &ports);
        assert_eq!(pb, 0xFF);
    }

    #[test]
    fn mouse_1350_moves_read_as_directions() {
        let kbd = KeyboardMatrix::new();
        let mut ports = ControlPorts::default();
        ports.attach_mouse(ControlPort::Two, MouseModel::Mouse1350);
        let mouse = ports.mouse_mut(ControlPort::Two).expect("attached");
        mouse.move_by(-3, 2);
        mouse.set_buttons(true, false);
        let (pa, _) = cia1_pins(0xFF, 0xFF, &kbd, &ports);
        assert_eq!(pa, !(joy::LEFT | joy::DOWN | joy::FIRE));
        assert_eq!(ports.selected_paddles(0x80), (0xFF, 0xFF));

        let mouse = ports.mouse_mut(ControlPort::Two).expect("attached");
        mouse.move_by(0, 0);
        mouse.set_buttons(false, true);
        let (pa, _) = cia1_pins(0xFF, 0xFF, &kbd, &ports);
        assert_eq!(pa, 0xFF);
        // The right button grounds POTX.
        assert_eq!(ports.selected_paddles(0x80), (0, 0xFF));
    }

    #[test]
    fn queue_applies_events_in_frame_order() {
        let mut queue = InputQueue::new();
        let mut kbd = KeyboardMatrix::new();
        queue.enqueue_key(C64Key::A, 5, 3);
        assert_eq!(queue.len(), 2);

        queue.process(4, &mut kbd);
        assert!(!kbd.is_pressed(C64Key::A));
        queue.process(5, &mut kbd);
        assert!(kbd.is_pressed(C64Key::A));
        queue.process(8, &mut kbd);
        assert!(!kbd.is_pressed(C64Key::A));
        assert!(queue.is_empty());
    }

    #[test]
    fn text_is_spaced_out() {
        let mut queue = InputQueue::new();
        let next = queue.enqueue_text("A~B", 0);
        assert_eq!(next, 12);
        assert_eq!(queue.len(), 4);
    }
}
