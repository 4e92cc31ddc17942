//! C64 keyboard matrix.
//!
//! 64 keys on an 8x8 matrix between CIA1 port A (columns) and port B
//! (rows). Pulling a PA line low makes the pressed keys in that column
//! pull their PB lines low. The matrix is passive, so the scan also works
//! backwards: driving PB low shows up on PA.
//!
//! RESTORE is not on the matrix. It drives the NMI line directly.

use emu_core::{SaveState, StateError};
use serde::{Deserialize, Serialize};

/// A key on the C64 keyboard.
///
/// | PA | PB0 | PB1 | PB2  | PB3  | PB4   | PB5 | PB6 | PB7   |
/// |----|-----|-----|------|------|-------|-----|-----|-------|
/// | 0  | DEL | RET | →    | F7   | F1    | F3  | F5  | ↓     |
/// | 1  | 3   | W   | A    | 4    | Z     | S   | E   | LSHFT |
/// | 2  | 5   | R   | D    | 6    | C     | F   | T   | X     |
/// | 3  | 7   | Y   | G    | 8    | B     | H   | U   | V     |
/// | 4  | 9   | I   | J    | 0    | M     | K   | O   | N     |
/// | 5  | +   | P   | L    | -    | .     | :   | @   | ,     |
/// | 6  | £   | *   | ;    | HOME | RSHFT | =   | ↑   | /     |
/// | 7  | 1   | ←   | CTRL | 2    | SPC   | C=  | Q   | STOP  |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum C64Key {
    Delete,
    Return,
    CursorRight,
    F7,
    F1,
    F3,
    F5,
    CursorDown,
    N3,
    W,
    A,
    N4,
    Z,
    S,
    E,
    LShift,
    N5,
    R,
    D,
    N6,
    C,
    F,
    T,
    X,
    N7,
    Y,
    G,
    N8,
    B,
    H,
    U,
    V,
    N9,
    I,
    J,
    N0,
    M,
    K,
    O,
    N,
    Plus,
    P,
    L,
    Minus,
    Period,
    Colon,
    At,
    Comma,
    Pound,
    Asterisk,
    Semicolon,
    Home,
    RShift,
    Equals,
    UpArrow,
    Slash,
    N1,
    LeftArrow,
    Ctrl,
    N2,
    Space,
    Commodore,
    Q,
    RunStop,
}

impl C64Key {
    /// Every key, in matrix order.
    pub const ALL: [C64Key; 64] = [
        Self::Delete,
        Self::Return,
        Self::CursorRight,
        Self::F7,
        Self::F1,
        Self::F3,
        Self::F5,
        Self::CursorDown,
        Self::N3,
        Self::W,
        Self::A,
        Self::N4,
        Self::Z,
        Self::S,
        Self::E,
        Self::LShift,
        Self::N5,
        Self::R,
        Self::D,
        Self::N6,
        Self::C,
        Self::F,
        Self::T,
        Self::X,
        Self::N7,
        Self::Y,
        Self::G,
        Self::N8,
        Self::B,
        Self::H,
        Self::U,
        Self::V,
        Self::N9,
        Self::I,
        Self::J,
        Self::N0,
        Self::M,
        Self::K,
        Self::O,
        Self::N,
        Self::Plus,
        Self::P,
        Self::L,
        Self::Minus,
        Self::Period,
        Self::Colon,
        Self::At,
        Self::Comma,
        Self::Pound,
        Self::Asterisk,
        Self::Semicolon,
        Self::Home,
        Self::RShift,
        Self::Equals,
        Self::UpArrow,
        Self::Slash,
        Self::N1,
        Self::LeftArrow,
        Self::Ctrl,
        Self::N2,
        Self::Space,
        Self::Commodore,
        Self::Q,
        Self::RunStop,
    ];

    /// `(column, row)`: the PA bit that selects the key and the PB bit it
    /// pulls low.
    #[must_use]
    pub const fn matrix(self) -> (u8, u8) {
        let index = self as u8;
        (index >> 3, index & 7)
    }

    /// Key by name, as accepted on the command line (`"RETURN"`, `"A"`,
    /// `"F1"`, `"SPACE"`...).
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        let upper = name.to_ascii_uppercase();
        let key = match upper.as_str() {
            "DEL" | "DELETE" => Self::Delete,
            "RETURN" | "ENTER" => Self::Return,
            "RIGHT" => Self::CursorRight,
            "DOWN" => Self::CursorDown,
            "F1" => Self::F1,
            "F3" => Self::F3,
            "F5" => Self::F5,
            "F7" => Self::F7,
            "LSHIFT" => Self::LShift,
            "RSHIFT" => Self::RShift,
            "HOME" => Self::Home,
            "CTRL" => Self::Ctrl,
            "SPACE" => Self::Space,
            "CBM" | "COMMODORE" => Self::Commodore,
            "STOP" | "RUNSTOP" => Self::RunStop,
            _ => {
                let mut chars = upper.chars();
                let (Some(ch), None) = (chars.next(), chars.next()) else {
                    return None;
                };
                return char_to_keys(ch).last().copied();
            }
        };
        Some(key)
    }
}

/// Keys needed to type a character: one key, or shift plus a key.
///
/// Letters map to the unshifted keys (the C64 boots in upper case).
#[must_use]
pub fn char_to_keys(ch: char) -> Vec<C64Key> {
    use C64Key as K;
    let key = match ch.to_ascii_uppercase() {
        'A' => K::A,
        'B' => K::B,
        'C' => K::C,
        'D' => K::D,
        'E' => K::E,
        'F' => K::F,
        'G' => K::G,
        'H' => K::H,
        'I' => K::I,
        'J' => K::J,
        'K' => K::K,
        'L' => K::L,
        'M' => K::M,
        'N' => K::N,
        'O' => K::O,
        'P' => K::P,
        'Q' => K::Q,
        'R' => K::R,
        'S' => K::S,
        'T' => K::T,
        'U' => K::U,
        'V' => K::V,
        'W' => K::W,
        'X' => K::X,
        'Y' => K::Y,
        'Z' => K::Z,
        '0' => K::N0,
        '1' => K::N1,
        '2' => K::N2,
        '3' => K::N3,
        '4' => K::N4,
        '5' => K::N5,
        '6' => K::N6,
        '7' => K::N7,
        '8' => K::N8,
        '9' => K::N9,
        ' ' => K::Space,
        '\n' => K::Return,
        '.' => K::Period,
        ',' => K::Comma,
        ':' => K::Colon,
        ';' => K::Semicolon,
        '=' => K::Equals,
        '/' => K::Slash,
        '+' => K::Plus,
        '-' => K::Minus,
        '*' => K::Asterisk,
        '@' => K::At,
        '"' => return vec![K::LShift, K::N2],
        '!' => return vec![K::LShift, K::N1],
        '#' => return vec![K::LShift, K::N3],
        '$' => return vec![K::LShift, K::N4],
        '%' => return vec![K::LShift, K::N5],
        '&' => return vec![K::LShift, K::N6],
        '\'' => return vec![K::LShift, K::N7],
        '(' => return vec![K::LShift, K::N8],
        ')' => return vec![K::LShift, K::N9],
        '<' => return vec![K::LShift, K::Comma],
        '>' => return vec![K::LShift, K::Period],
        '?' => return vec![K::LShift, K::Slash],
        '[' => return vec![K::LShift, K::Colon],
        ']' => return vec![K::LShift, K::Semicolon],
        _ => return Vec::new(),
    };
    vec![key]
}

/// The 8x8 matrix plus the RESTORE key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyboardMatrix {
    /// `columns[c]` has bit `r` set when the key at (c, r) is down.
    columns: [u8; 8],
    restore: bool,
}

impl KeyboardMatrix {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_key(&mut self, column: u8, row: u8, pressed: bool) {
        if column < 8 && row < 8 {
            let bits = &mut self.columns[usize::from(column)];
            if pressed {
                *bits |= 1 << row;
            } else {
                *bits &= !(1 << row);
            }
        }
    }

    pub fn set(&mut self, key: C64Key, pressed: bool) {
        let (column, row) = key.matrix();
        self.set_key(column, row, pressed);
    }

    #[must_use]
    pub fn is_pressed(&self, key: C64Key) -> bool {
        let (column, row) = key.matrix();
        self.columns[usize::from(column)] & (1 << row) != 0
    }

    /// PB levels for the PA levels driven by CIA1 (active low both ways).
    #[must_use]
    pub fn scan_rows(&self, pa: u8) -> u8 {
        let mut rows = 0;
        for (column, &bits) in self.columns.iter().enumerate() {
            if pa & (1 << column) == 0 {
                rows |= bits;
            }
        }
        !rows
    }

    /// PA levels for the PB levels driven by CIA1.
    #[must_use]
    pub fn scan_columns(&self, pb: u8) -> u8 {
        let mut columns = 0;
        for (column, &bits) in self.columns.iter().enumerate() {
            if !pb & bits != 0 {
                columns |= 1 << column;
            }
        }
        !columns
    }

    pub fn set_restore(&mut self, pressed: bool) {
        self.restore = pressed;
    }

    #[must_use]
    pub fn restore(&self) -> bool {
        self.restore
    }

    pub fn release_all(&mut self) {
        self.columns = [0; 8];
        self.restore = false;
    }
}

impl SaveState for KeyboardMatrix {
    type State = Self;

    fn save_state(&self) -> Self {
        self.clone()
    }

    fn load_state(&mut self, state: Self) -> Result<(), StateError> {
        *self = state;
        Ok(())
    }
}
