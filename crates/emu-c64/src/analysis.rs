//! Read-only decoding of a half-track's GCR stream into sector records.
//!
//! The stream is scanned twice around so blocks that straddle the index
//! position are found. Sectors are assigned from the first header block
//! onwards for one rotation: a data block belongs to the header before it.

use std::fmt;

use crate::d64::SECTOR_SIZE;
use crate::disk::Track;
use crate::gcr::{self, DATA_ID, HEADER_ID, SECTOR_BYTES};

/// Bits in a GCR-encoded header block (8 raw bytes).
const HEADER_BITS: usize = 8 * 10;
/// Bits in a GCR-encoded data block (260 raw bytes).
const DATA_BITS: usize = 260 * 10;

/// A structural problem on a track. Bit offsets are positions in the
/// stream, measured from its start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackError {
    /// Nothing recorded, or no sync mark anywhere.
    NoSync,
    /// Sync marks exist but none is followed by a header block.
    NoHeader,
    /// The stream is shorter than its sectors need.
    ShortTrack { bits: usize, expected: usize },
    /// A sync mark is followed by something other than $07 or $08
    /// (`None` when the GCR itself is invalid).
    InvalidBlockId { bit: usize, id: Option<u8> },
    /// A header names a sector that cannot exist on this track.
    InvalidSectorNumber { bit: usize, sector: Option<u8> },
    HeaderChecksum { sector: u8, bit: usize },
    DataChecksum { sector: u8, bit: usize },
    /// Neither header nor data found.
    MissingSector(u8),
    /// Header found but no data block follows it.
    MissingData(u8),
    /// A second header for a sector already seen this rotation. The first
    /// one wins.
    DuplicateSector { sector: u8, bit: usize },
}

impl fmt::Display for TrackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoSync => write!(f, "no sync mark"),
            Self::NoHeader => write!(f, "no sector header block"),
            Self::ShortTrack { bits, expected } => {
                write!(f, "track holds {bits} bits, sectors need {expected}")
            }
            Self::InvalidBlockId { bit, id: Some(id) } => {
                write!(f, "invalid block id ${id:02X} at bit {bit}")
            }
            Self::InvalidBlockId { bit, id: None } => write!(f, "undecodable block id at bit {bit}"),
            Self::InvalidSectorNumber { bit, sector: Some(s) } => {
                write!(f, "header at bit {bit} names sector {s}")
            }
            Self::InvalidSectorNumber { bit, sector: None } => {
                write!(f, "header at bit {bit} has an undecodable sector number")
            }
            Self::HeaderChecksum { sector, bit } => {
                write!(f, "sector {sector}: header checksum mismatch at bit {bit}")
            }
            Self::DataChecksum { sector, bit } => {
                write!(f, "sector {sector}: data checksum mismatch at bit {bit}")
            }
            Self::MissingSector(sector) => write!(f, "sector {sector} not found"),
            Self::MissingData(sector) => write!(f, "sector {sector} has no data block"),
            Self::DuplicateSector { sector, bit } => {
                write!(f, "sector {sector} repeated at bit {bit}")
            }
        }
    }
}

/// Where a block sits in the stream. `end_bit` may run past the stream
/// length when the block wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    pub start_bit: usize,
    pub end_bit: usize,
    pub checksum_ok: bool,
}

/// One sector found on the track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectorInfo {
    pub sector: u8,
    /// Track number recorded in the header.
    pub track: u8,
    pub header: Option<BlockInfo>,
    pub data: Option<BlockInfo>,
}

impl SectorInfo {
    /// Header and data both present with matching checksums.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.header.is_some_and(|h| h.checksum_ok) && self.data.is_some_and(|d| d.checksum_ok)
    }

    /// The D64 error byte that describes this sector.
    #[must_use]
    pub fn error_code(&self) -> u8 {
        match (self.header, self.data) {
            (None, _) => 0x02,
            (Some(h), _) if !h.checksum_ok => 0x09,
            (Some(_), None) => 0x04,
            (Some(_), Some(d)) if !d.checksum_ok => 0x05,
            _ => 0x01,
        }
    }
}

/// Result of decoding one half-track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackAnalysis {
    pub half_track: u8,
    pub bit_len: usize,
    /// Sectors the track should hold for its zone.
    pub expected_sectors: u8,
    /// Sectors found, by sector number.
    pub sectors: Vec<SectorInfo>,
    pub errors: Vec<TrackError>,
}

impl TrackAnalysis {
    #[must_use]
    pub fn valid_sectors(&self) -> usize {
        self.sectors.iter().filter(|s| s.is_valid()).count()
    }

    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

fn sectors_in_zone(zone: u8) -> u8 {
    [21, 19, 18, 17][usize::from(zone & 3)]
}

fn read_byte(track: &Track, pos: usize) -> Option<u8> {
    gcr::decode_byte(track.bits10(pos))
}

fn read_bytes(track: &Track, pos: usize, count: usize) -> Vec<Option<u8>> {
    (0..count).map(|i| read_byte(track, pos + i * 10)).collect()
}

fn header_checksum_ok(raw: &[Option<u8>]) -> bool {
    match raw[1..6] {
        [Some(sum), Some(s), Some(t), Some(id2), Some(id1)] => sum == s ^ t ^ id2 ^ id1,
        _ => false,
    }
}

fn data_checksum_ok(raw: &[Option<u8>]) -> bool {
    let mut sum = 0u8;
    for byte in &raw[1..=SECTOR_SIZE] {
        match byte {
            Some(b) => sum ^= b,
            None => return false,
        }
    }
    raw[SECTOR_SIZE + 1] == Some(sum)
}

/// Decode a half-track. Never modifies the stream.
#[must_use]
pub fn analyze(half_track: u8, track: &Track) -> TrackAnalysis {
    let len = track.bit_len();
    let expected = sectors_in_zone(gcr::half_track_zone(half_track));
    let mut result = TrackAnalysis {
        half_track,
        bit_len: len,
        expected_sectors: expected,
        sectors: Vec::new(),
        errors: Vec::new(),
    };
    if len == 0 {
        result.errors.push(TrackError::NoSync);
        return result;
    }
    let needed = usize::from(expected) * SECTOR_BYTES * 8;
    if len < needed {
        result.errors.push(TrackError::ShortTrack {
            bits: len,
            expected: needed,
        });
    }

    // A block starts at the first zero after ten or more ones.
    let mut marks = Vec::new();
    let mut ones = 0usize;
    for i in 0..2 * len {
        let bit = track.bit(i);
        if !bit && ones >= 10 {
            marks.push(i);
        }
        ones = if bit { ones + 1 } else { 0 };
    }
    if marks.is_empty() {
        result.errors.push(TrackError::NoSync);
        return result;
    }

    let Some(start) = marks
        .iter()
        .copied()
        .find(|&m| m < len && read_byte(track, m) == Some(HEADER_ID))
    else {
        result.errors.push(TrackError::NoHeader);
        return result;
    };

    let mut slots: Vec<SectorInfo> = (0..expected)
        .map(|sector| SectorInfo {
            sector,
            track: 0,
            header: None,
            data: None,
        })
        .collect();
    let mut current: Option<usize> = None;

    for &mark in marks.iter().filter(|&&m| m >= start && m < start + len) {
        let bit = mark % len;
        match read_byte(track, mark) {
            Some(HEADER_ID) => {
                let raw = read_bytes(track, mark, 8);
                match raw[2] {
                    Some(sector) if sector < expected => {
                        let slot = &mut slots[usize::from(sector)];
                        if slot.header.is_some() {
                            result.errors.push(TrackError::DuplicateSector { sector, bit });
                            current = None;
                            continue;
                        }
                        slot.header = Some(BlockInfo {
                            start_bit: bit,
                            end_bit: bit + HEADER_BITS,
                            checksum_ok: header_checksum_ok(&raw),
                        });
                        slot.track = raw[3].unwrap_or(0);
                        current = Some(usize::from(sector));
                    }
                    sector => {
                        result.errors.push(TrackError::InvalidSectorNumber { bit, sector });
                        current = None;
                    }
                }
            }
            Some(DATA_ID) => {
                if let Some(slot) = current.take().map(|s| &mut slots[s]) {
                    let raw = read_bytes(track, mark, SECTOR_SIZE + 2);
                    slot.data = Some(BlockInfo {
                        start_bit: bit,
                        end_bit: bit + DATA_BITS,
                        checksum_ok: data_checksum_ok(&raw),
                    });
                }
            }
            id => result.errors.push(TrackError::InvalidBlockId { bit, id }),
        }
    }

    for slot in slots {
        match (slot.header, slot.data) {
            (None, _) => {
                result.errors.push(TrackError::MissingSector(slot.sector));
                continue;
            }
            (Some(header), data) => {
                if !header.checksum_ok {
                    result.errors.push(TrackError::HeaderChecksum {
                        sector: slot.sector,
                        bit: header.start_bit,
                    });
                }
                match data {
                    None => result.errors.push(TrackError::MissingData(slot.sector)),
                    Some(d) if !d.checksum_ok => result.errors.push(TrackError::DataChecksum {
                        sector: slot.sector,
                        bit: d.start_bit,
                    }),
                    Some(_) => {}
                }
            }
        }
        result.sectors.push(slot);
    }
    result
}

/// The 256 data bytes of a sector, whether or not its checksum matches.
/// `None` when the data block is missing or holds invalid GCR.
#[must_use]
pub fn read_data(track: &Track, info: &SectorInfo) -> Option<[u8; SECTOR_SIZE]> {
    let block = info.data?;
    let mut out = [0u8; SECTOR_SIZE];
    for (i, byte) in out.iter_mut().enumerate() {
        *byte = read_byte(track, block.start_bit + (i + 1) * 10)?;
    }
    Some(out)
}
