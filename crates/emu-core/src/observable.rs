//! Read-only inspection of component state.
//!
//! Debugger views read chips through dotted query paths (`cpu.pc`,
//! `vic.line`, `cia1.timer_a`). Queries never affect emulation state:
//! implementors must not go through side-effecting register reads.

use std::collections::HashMap;
use std::fmt;

/// A dynamically-typed value for state queries.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Boolean value.
    Bool(bool),
    /// 8-bit unsigned integer.
    U8(u8),
    /// 16-bit unsigned integer.
    U16(u16),
    /// 32-bit unsigned integer.
    U32(u32),
    /// 64-bit unsigned integer.
    U64(u64),
    /// 8-bit signed integer.
    I8(i8),
    /// 16-bit signed integer (audio samples).
    I16(i16),
    /// Raw register or memory dump.
    Bytes(Vec<u8>),
    /// String value.
    String(String),
    /// Array of values.
    Array(Vec<Value>),
    /// Map of string keys to values.
    Map(HashMap<String, Value>),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(v) => write!(f, "{v}"),
            Value::U8(v) => write!(f, "{v:#04X}"),
            Value::U16(v) => write!(f, "{v:#06X}"),
            Value::U32(v) => write!(f, "{v:#010X}"),
            Value::U64(v) => write!(f, "{v}"),
            Value::I8(v) => write!(f, "{v}"),
            Value::I16(v) => write!(f, "{v}"),
            Value::Bytes(bytes) => {
                for (i, b) in bytes.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{b:02X}")?;
                }
                Ok(())
            }
            Value::String(v) => write!(f, "{v}"),
            Value::Array(arr) => {
                write!(f, "[")?;
                for (i, v) in arr.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, "]")
            }
            Value::Map(map) => {
                write!(f, "{{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<u8> for Value {
    fn from(v: u8) -> Self {
        Value::U8(v)
    }
}

impl From<u16> for Value {
    fn from(v: u16) -> Self {
        Value::U16(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::U32(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::U64(v)
    }
}

impl From<i8> for Value {
    fn from(v: i8) -> Self {
        Value::I8(v)
    }
}

impl From<i16> for Value {
    fn from(v: i16) -> Self {
        Value::I16(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl Value {
    /// Numeric view of integer and boolean values.
    #[must_use]
    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            Value::Bool(v) => Some(u64::from(v)),
            Value::U8(v) => Some(u64::from(v)),
            Value::U16(v) => Some(u64::from(v)),
            Value::U32(v) => Some(u64::from(v)),
            Value::U64(v) => Some(v),
            _ => None,
        }
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

/// A component whose state can be inspected between cycles.
pub trait Observable {
    /// Query a specific property by path.
    ///
    /// Paths are hierarchical, separated by dots:
    /// - `pc` - Program counter
    /// - `flags.z` - Zero flag
    /// - `registers` - raw register dump as [`Value::Bytes`]
    ///
    /// Returns `None` if the path is not recognised.
    fn query(&self, path: &str) -> Option<Value>;

    /// List all available query paths.
    ///
    /// Returns paths that can be passed to `query()`.
    fn query_paths(&self) -> &'static [&'static str];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_display_as_hex_dump() {
        assert_eq!(Value::Bytes(vec![0x00, 0xAB, 0x10]).to_string(), "00 AB 10");
    }

    #[test]
    fn numeric_view() {
        assert_eq!(Value::from(0x1234u16).as_u64(), Some(0x1234));
        assert_eq!(Value::from(true).as_u64(), Some(1));
        assert_eq!(Value::from("x").as_u64(), None);
    }
}
