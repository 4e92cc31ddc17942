//! D64 disk image parser.
//!
//! A D64 image holds 35 (or 40) tracks with variable sectors per track:
//!   Tracks  1-17: 21 sectors (zone 0)
//!   Tracks 18-24: 19 sectors (zone 1)
//!   Tracks 25-30: 18 sectors (zone 2)
//!   Tracks 31-40: 17 sectors (zone 3)
//!
//! 35 tracks: 683 sectors x 256 bytes = 174,848 bytes, optionally followed
//! by one error byte per sector. 40-track images hold 768 sectors.

use crate::error::MediaError;
use crate::gcr::{self, SectorFault};

/// Bytes per sector.
pub const SECTOR_SIZE: usize = 256;

const SECTORS_35: usize = 683;
const SECTORS_40: usize = 768;

/// Sectors per track, indexed by track number (index 0 unused).
const SECTORS_PER_TRACK: [u8; 41] = [
    0, // track 0 doesn't exist
    21, 21, 21, 21, 21, 21, 21, 21, 21, 21, 21, 21, 21, 21, 21, 21, 21, // 1-17
    19, 19, 19, 19, 19, 19, 19, // 18-24
    18, 18, 18, 18, 18, 18, // 25-30
    17, 17, 17, 17, 17, // 31-35
    17, 17, 17, 17, 17, // 36-40
];

/// Byte offset of the first sector of each track.
const TRACK_OFFSETS: [usize; 41] = {
    let mut offsets = [0usize; 41];
    let mut track = 1;
    let mut offset = 0;
    while track < 41 {
        offsets[track] = offset;
        offset += SECTORS_PER_TRACK[track] as usize * SECTOR_SIZE;
        track += 1;
    }
    offsets
};

/// A parsed D64 disk image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct D64 {
    data: Vec<u8>,
    tracks: u8,
    /// One byte per sector when the image carries error info.
    errors: Option<Vec<u8>>,
}

impl D64 {
    /// Whether `len` is one of the four D64 sizes.
    #[must_use]
    pub fn is_d64_size(len: usize) -> bool {
        Self::layout(len).is_some()
    }

    /// `(tracks, has_errors)` for an image size.
    fn layout(len: usize) -> Option<(u8, bool)> {
        match len {
            n if n == SECTORS_35 * SECTOR_SIZE => Some((35, false)),
            n if n == SECTORS_35 * (SECTOR_SIZE + 1) => Some((35, true)),
            n if n == SECTORS_40 * SECTOR_SIZE => Some((40, false)),
            n if n == SECTORS_40 * (SECTOR_SIZE + 1) => Some((40, true)),
            _ => None,
        }
    }

    /// Parse a D64 image from raw bytes.
    pub fn from_bytes(data: &[u8]) -> Result<Self, MediaError> {
        let (tracks, has_errors) = Self::layout(data.len()).ok_or(MediaError::D64Size(data.len()))?;
        let sectors = Self::total_sectors(tracks);
        let (blocks, errors) = data.split_at(sectors * SECTOR_SIZE);
        Ok(Self {
            data: blocks.to_vec(),
            tracks,
            errors: has_errors.then(|| errors.to_vec()),
        })
    }

    /// A zero-filled image.
    #[must_use]
    pub fn blank(tracks: u8) -> Self {
        let tracks = if tracks > 35 { 40 } else { 35 };
        Self {
            data: vec![0; Self::total_sectors(tracks) * SECTOR_SIZE],
            tracks,
            errors: None,
        }
    }

    fn total_sectors(tracks: u8) -> usize {
        if tracks > 35 { SECTORS_40 } else { SECTORS_35 }
    }

    /// Number of sectors on a track (1-40). 0 for invalid track numbers.
    #[must_use]
    pub fn sectors_per_track(track: u8) -> u8 {
        SECTORS_PER_TRACK.get(usize::from(track)).copied().unwrap_or(0)
    }

    /// Index of a sector counted from track 1 sector 0.
    #[must_use]
    pub fn sector_index(track: u8, sector: u8) -> Option<usize> {
        if track == 0 || sector >= Self::sectors_per_track(track) {
            return None;
        }
        Some(TRACK_OFFSETS[usize::from(track)] / SECTOR_SIZE + usize::from(sector))
    }

    /// Byte offset of a sector within the image.
    #[must_use]
    pub fn sector_offset(track: u8, sector: u8) -> Option<usize> {
        Self::sector_index(track, sector).map(|i| i * SECTOR_SIZE)
    }

    #[must_use]
    pub fn tracks(&self) -> u8 {
        self.tracks
    }

    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.errors.is_some()
    }

    fn contains(&self, track: u8) -> bool {
        (1..=self.tracks).contains(&track)
    }

    /// Read a 256-byte sector.
    #[must_use]
    pub fn read_sector(&self, track: u8, sector: u8) -> Option<&[u8]> {
        if !self.contains(track) {
            return None;
        }
        let offset = Self::sector_offset(track, sector)?;
        Some(&self.data[offset..offset + SECTOR_SIZE])
    }

    /// Write 256 bytes to a sector. Returns `false` for invalid
    /// track/sector or wrong length.
    pub fn write_sector(&mut self, track: u8, sector: u8, data: &[u8]) -> bool {
        if data.len() != SECTOR_SIZE || !self.contains(track) {
            return false;
        }
        let Some(offset) = Self::sector_offset(track, sector) else {
            return false;
        };
        self.data[offset..offset + SECTOR_SIZE].copy_from_slice(data);
        true
    }

    /// Error byte for a sector. 1 (no error) when the image has none.
    #[must_use]
    pub fn error_code(&self, track: u8, sector: u8) -> u8 {
        match (&self.errors, Self::sector_index(track, sector)) {
            (Some(errors), Some(index)) => errors.get(index).copied().unwrap_or(1),
            _ => 1,
        }
    }

    /// Set a sector's error byte, adding an error table if needed.
    pub fn set_error_code(&mut self, track: u8, sector: u8, code: u8) {
        if !self.contains(track) {
            return;
        }
        let Some(index) = Self::sector_index(track, sector) else {
            return;
        };
        let total = Self::total_sectors(self.tracks);
        let errors = self.errors.get_or_insert_with(|| vec![1; total]);
        errors[index] = code;
    }

    /// Disk ID from the BAM (track 18, sector 0, bytes $A2-$A3).
    #[must_use]
    pub fn disk_id(&self) -> [u8; 2] {
        self.read_sector(18, 0).map_or([0; 2], |bam| [bam[0xA2], bam[0xA3]])
    }

    /// GCR stream for one track, with error bytes turned into on-disk
    /// defects.
    #[must_use]
    pub fn encode_track(&self, track: u8) -> Vec<u8> {
        let id = self.disk_id();
        gcr::encode_track(track, Self::sectors_per_track(track), id, |sector| {
            let mut data = [0u8; SECTOR_SIZE];
            if let Some(src) = self.read_sector(track, sector) {
                data.copy_from_slice(src);
            }
            (data, SectorFault::from_error_code(self.error_code(track, sector)))
        })
    }

    /// Image bytes, with the error table appended when present.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = self.data.clone();
        if let Some(errors) = &self.errors {
            out.extend_from_slice(errors);
        }
        out
    }
}
