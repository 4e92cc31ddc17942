//! P00 (PC64) program container.
//!
//! A P00 file wraps exactly one PRG so the original 16-character C64 name
//! survives on host file systems.
//!
//! # Layout
//!
//! - Bytes 0-7: signature "C64File\0"
//! - Bytes 8-24: C64 file name, zero padded
//! - Byte 25: REL record size (0 for programs)
//! - Bytes 26-: the PRG, load address first

use std::fmt;

use crate::t64::petscii_name;

const SIGNATURE: &[u8; 8] = b"C64File\0";
const HEADER_LEN: usize = 0x1A;

/// A P00 file was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum P00Error {
    /// No room for the header, a load address and one data byte.
    TooShort(usize),
    BadSignature,
}

impl fmt::Display for P00Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooShort(len) => write!(f, "P00 file too short ({len} bytes)"),
            Self::BadSignature => write!(f, "missing C64File signature"),
        }
    }
}

impl std::error::Error for P00Error {}

/// A parsed P00 file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct P00File<'a> {
    raw_name: &'a [u8],
    prg: &'a [u8],
}

impl<'a> P00File<'a> {
    pub fn parse(data: &'a [u8]) -> Result<Self, P00Error> {
        if data.len() < 8 || &data[..8] != SIGNATURE {
            return Err(P00Error::BadSignature);
        }
        if data.len() < HEADER_LEN + 3 {
            return Err(P00Error::TooShort(data.len()));
        }
        Ok(Self {
            raw_name: &data[8..25],
            prg: &data[HEADER_LEN..],
        })
    }

    /// The C64 name of the wrapped program.
    #[must_use]
    pub fn name(&self) -> String {
        petscii_name(self.raw_name)
    }

    /// The wrapped PRG, ready for [`crate::prg::load_prg`].
    #[must_use]
    pub fn prg(&self) -> &'a [u8] {
        self.prg
    }

    #[must_use]
    pub fn load_address(&self) -> u16 {
        u16::from_le_bytes([self.prg[0], self.prg[1]])
    }
}

#[must_use]
pub fn is_p00(data: &[u8]) -> bool {
    data.len() >= 8 && &data[..8] == SIGNATURE
}
