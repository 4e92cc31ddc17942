//! State codec for snapshots.
//!
//! Every chip exposes a plain serde image of its registers and internal
//! latches ([`SaveState::State`]). A machine gathers those images into one
//! value and [`encode`]s it with bincode: fixed-width little-endian
//! integers, fields in declaration order, no self-description. The reader
//! must therefore know the layout from the snapshot version, so any change
//! to a state struct needs a version bump in the machine's snapshot header.

use std::fmt;
use std::io;

use bincode::{ErrorKind, Options};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Upper bound on an encoded body. Guards allocations against corrupt
/// length prefixes.
const SIZE_LIMIT: u64 = 64 << 20;

/// Error encoding or decoding a state stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    /// The stream ended before every field was decoded.
    Truncated,
    /// A field held a value outside its valid range.
    InvalidValue {
        /// Name of the field.
        field: &'static str,
        /// The raw value found.
        value: u64,
    },
    /// A fixed-size block had the wrong length.
    InvalidLength {
        field: &'static str,
        expected: usize,
        found: usize,
    },
    /// Data remained after the last record.
    TrailingBytes(usize),
    /// The stream exceeds the size limit.
    TooLarge,
    /// Any other codec failure.
    Codec(String),
}

impl fmt::Display for StateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated => write!(f, "state truncated"),
            Self::InvalidValue { field, value } => {
                write!(f, "invalid value {value} for field {field}")
            }
            Self::InvalidLength {
                field,
                expected,
                found,
            } => write!(f, "{field} holds {found} bytes, expected {expected}"),
            Self::TrailingBytes(n) => write!(f, "{n} unexpected trailing bytes"),
            Self::TooLarge => write!(f, "state exceeds {SIZE_LIMIT} bytes"),
            Self::Codec(msg) => write!(f, "state codec: {msg}"),
        }
    }
}

impl std::error::Error for StateError {}

impl From<bincode::Error> for StateError {
    fn from(err: bincode::Error) -> Self {
        match *err {
            ErrorKind::Io(ref e) if e.kind() == io::ErrorKind::UnexpectedEof => Self::Truncated,
            ErrorKind::InvalidBoolEncoding(value) => Self::InvalidValue {
                field: "bool",
                value: u64::from(value),
            },
            ErrorKind::InvalidTagEncoding(tag) => Self::InvalidValue {
                field: "enum tag",
                value: tag as u64,
            },
            ErrorKind::SizeLimit => Self::TooLarge,
            other => Self::Codec(other.to_string()),
        }
    }
}

/// A component whose complete internal state can be saved and restored.
pub trait SaveState {
    /// Serializable image of the component.
    type State: Serialize + DeserializeOwned;

    /// Capture this component's state.
    fn save_state(&self) -> Self::State;

    /// Replace this component's state, validating ranges the image cannot
    /// express.
    ///
    /// On error the component may be partially updated; callers restore
    /// into a scratch copy and only swap it in when every record decoded.
    fn load_state(&mut self, state: Self::State) -> Result<(), StateError>;
}

fn options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_little_endian()
        .with_limit(SIZE_LIMIT)
}

/// Encode a state image.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, StateError> {
    Ok(options().serialize(value)?)
}

/// Decode a state image. The whole of `data` must be consumed.
pub fn decode<T: DeserializeOwned>(data: &[u8]) -> Result<T, StateError> {
    let mut rest = data;
    let value = options().deserialize_from(&mut rest)?;
    if rest.is_empty() {
        Ok(value)
    } else {
        Err(StateError::TrailingBytes(rest.len()))
    }
}

/// Copy a saved block into a fixed-size buffer.
pub fn restore_block(field: &'static str, saved: &[u8], out: &mut [u8]) -> Result<(), StateError> {
    if saved.len() != out.len() {
        return Err(StateError::InvalidLength {
            field,
            expected: out.len(),
            found: saved.len(),
        });
    }
    out.copy_from_slice(saved);
    Ok(())
}

/// Fail unless `value` is below `limit`.
pub fn check_below(field: &'static str, value: u64, limit: u64) -> Result<(), StateError> {
    if value < limit {
        Ok(())
    } else {
        Err(StateError::InvalidValue { field, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Regs {
        a: u16,
        b: u32,
        flag: bool,
        ram: Vec<u8>,
    }

    fn regs() -> Regs {
        Regs {
            a: 0x1234,
            b: 0xDEAD_BEEF,
            flag: true,
            ram: vec![9, 8, 7],
        }
    }

    #[test]
    fn fields_are_fixed_width_little_endian() {
        let bytes = encode(&regs()).expect("encodes");
        assert_eq!(
            bytes,
            vec![0x34, 0x12, 0xEF, 0xBE, 0xAD, 0xDE, 1, 3, 0, 0, 0, 0, 0, 0, 0, 9, 8, 7]
        );
        assert_eq!(decode::<Regs>(&bytes), Ok(regs()));
    }

    #[test]
    fn truncation_is_reported() {
        let bytes = encode(&regs()).expect("encodes");
        assert_eq!(decode::<Regs>(&bytes[..5]), Err(StateError::Truncated));
    }

    #[test]
    fn bool_rejects_other_values() {
        let mut bytes = encode(&regs()).expect("encodes");
        bytes[6] = 2;
        assert_eq!(
            decode::<Regs>(&bytes),
            Err(StateError::InvalidValue {
                field: "bool",
                value: 2
            })
        );
    }

    #[test]
    fn trailing_data_is_rejected() {
        let mut bytes = encode(&regs()).expect("encodes");
        bytes.extend_from_slice(&[0, 0]);
        assert_eq!(decode::<Regs>(&bytes), Err(StateError::TrailingBytes(2)));
    }

    #[test]
    fn oversized_length_prefix_is_rejected() {
        let mut bytes = encode(&regs()).expect("encodes");
        bytes[7..15].copy_from_slice(&u64::MAX.to_le_bytes());
        assert!(decode::<Regs>(&bytes).is_err());
    }

    #[test]
    fn blocks_keep_their_size() {
        let mut ram = [0u8; 4];
        assert_eq!(restore_block("ram", &[1, 2, 3, 4], &mut ram), Ok(()));
        assert_eq!(ram, [1, 2, 3, 4]);
        assert_eq!(
            restore_block("ram", &[1, 2], &mut ram),
            Err(StateError::InvalidLength {
                field: "ram",
                expected: 4,
                found: 2
            })
        );
        assert_eq!(check_below("phase", 3, 4), Ok(()));
        assert_eq!(
            check_below("phase", 4, 4),
            Err(StateError::InvalidValue {
                field: "phase",
                value: 4
            })
        );
    }
}
