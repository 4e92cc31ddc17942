//! Error taxonomy for the machine.
//!
//! Media problems are rejected before anything is applied, snapshot
//! problems before restore begins, and a CPU fault is the only fatal
//! runtime error.

use std::fmt;

use emu_core::StateError;
use mos_6502::CpuFault;

use crate::cartridge::CrtError;
use crate::config::RomKind;
use crate::disk::DiskError;
use crate::p00::P00Error;
use crate::prg::PrgError;
use crate::t64::T64Error;
use crate::tap::TapError;

/// A ROM, disk, cartridge, tape or program image was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaError {
    RomSize {
        rom: RomKind,
        expected: usize,
        found: usize,
    },
    /// Neither a D64 (by size) nor a G64 (by signature).
    UnknownImage,
    D64Size(usize),
    G64Format(&'static str),
    Crt(CrtError),
    Tap(TapError),
    Prg(PrgError),
    T64(T64Error),
    P00(P00Error),
}

impl fmt::Display for MediaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RomSize {
                rom,
                expected,
                found,
            } => write!(
                f,
                "{} ROM must be {expected} bytes, got {found}",
                rom.name()
            ),
            Self::UnknownImage => write!(f, "unrecognised disk image"),
            Self::D64Size(size) => write!(f, "invalid D64 size: {size} bytes"),
            Self::G64Format(reason) => write!(f, "invalid G64 image: {reason}"),
            Self::Crt(e) => write!(f, "cartridge: {e}"),
            Self::Tap(e) => write!(f, "tape: {e}"),
            Self::Prg(e) => write!(f, "program: {e}"),
            Self::T64(e) => write!(f, "tape archive: {e}"),
            Self::P00(e) => write!(f, "program: {e}"),
        }
    }
}

impl std::error::Error for MediaError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Crt(e) => Some(e),
            Self::Tap(e) => Some(e),
            Self::Prg(e) => Some(e),
            Self::T64(e) => Some(e),
            Self::P00(e) => Some(e),
            _ => None,
        }
    }
}

impl From<CrtError> for MediaError {
    fn from(e: CrtError) -> Self {
        Self::Crt(e)
    }
}

impl From<TapError> for MediaError {
    fn from(e: TapError) -> Self {
        Self::Tap(e)
    }
}

impl From<PrgError> for MediaError {
    fn from(e: PrgError) -> Self {
        Self::Prg(e)
    }
}

impl From<T64Error> for MediaError {
    fn from(e: T64Error) -> Self {
        Self::T64(e)
    }
}

impl From<P00Error> for MediaError {
    fn from(e: P00Error) -> Self {
        Self::P00(e)
    }
}

/// Errors surfaced by the machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum C64Error {
    /// The CPU reached a state with no defined behaviour. The run loop
    /// stops; the machine stays inspectable and capturable.
    Internal(CpuFault),
    Media(MediaError),
    Disk(DiskError),
    /// Snapshot written by a newer core.
    UnsupportedVersion { found: u16, supported: u16 },
    /// Snapshot does not start with the expected magic.
    BadMagic,
    /// Snapshot ended early.
    Truncated,
    /// Snapshot record failed to decode.
    Snapshot(StateError),
}

impl fmt::Display for C64Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Internal(fault) => write!(f, "internal CPU fault: {fault}"),
            Self::Media(e) => write!(f, "{e}"),
            Self::Disk(e) => write!(f, "{e}"),
            Self::UnsupportedVersion { found, supported } => write!(
                f,
                "snapshot version {found} is newer than supported version {supported}"
            ),
            Self::BadMagic => write!(f, "not a C64 snapshot"),
            Self::Truncated => write!(f, "snapshot truncated"),
            Self::Snapshot(e) => write!(f, "snapshot: {e}"),
        }
    }
}

impl std::error::Error for C64Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Internal(e) => Some(e),
            Self::Media(e) => Some(e),
            Self::Disk(e) => Some(e),
            Self::Snapshot(e) => Some(e),
            _ => None,
        }
    }
}

impl From<MediaError> for C64Error {
    fn from(e: MediaError) -> Self {
        Self::Media(e)
    }
}

impl From<DiskError> for C64Error {
    fn from(e: DiskError) -> Self {
        Self::Disk(e)
    }
}

impl From<StateError> for C64Error {
    fn from(e: StateError) -> Self {
        match e {
            StateError::Truncated => Self::Truncated,
            other => Self::Snapshot(other),
        }
    }
}
