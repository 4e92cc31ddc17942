//! Floppy disk as the 1541 head sees it: one GCR bitstream per half-track.
//!
//! Half-track `2t - 1` holds track `t`; even half-tracks sit between two
//! tracks and are empty on disks built from D64 images. Sector contents
//! are never stored separately: reading a sector decodes the stream.

use std::fmt;

use emu_core::StateError;
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::analysis::{self, TrackAnalysis, TrackError};
use crate::d64::{D64, SECTOR_SIZE};
use crate::error::MediaError;
use crate::g64;
use crate::gcr;

/// Half-tracks under the head's travel.
pub const HALF_TRACKS: u8 = 84;

/// Whole tracks addressable by sector operations.
pub const MAX_TRACK: u8 = 42;

/// Drive and disk errors that are not image format problems.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiskError {
    /// The machine was built without a 1541 ROM.
    NoDrive,
    NoDisk,
    /// Track or half-track outside the head's range.
    TrackOutOfRange(u8),
}

impl fmt::Display for DiskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoDrive => write!(f, "no drive attached"),
            Self::NoDisk => write!(f, "no disk inserted"),
            Self::TrackOutOfRange(track) => write!(f, "track {track} out of range"),
        }
    }
}

impl std::error::Error for DiskError {}

/// Structural problems found on one half-track when a disk is inserted.
/// The disk is still usable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackWarning {
    pub half_track: u8,
    pub errors: Vec<TrackError>,
}

/// GCR bitstream of one half-track, most significant bit first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    bytes: Vec<u8>,
    bit_len: usize,
    zone: u8,
}

impl Track {
    /// A stream of whole bytes.
    #[must_use]
    pub fn from_bytes(bytes: Vec<u8>, zone: u8) -> Self {
        let bit_len = bytes.len() * 8;
        Self {
            bytes,
            bit_len,
            zone: zone & 3,
        }
    }

    #[must_use]
    pub fn bit_len(&self) -> usize {
        self.bit_len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bit_len == 0
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Speed zone the stream was recorded at (0 = outermost).
    #[must_use]
    pub fn zone(&self) -> u8 {
        self.zone
    }

    /// Bit at `pos`, wrapping around the rotation. Empty tracks read 0.
    #[must_use]
    pub fn bit(&self, pos: usize) -> bool {
        if self.bit_len == 0 {
            return false;
        }
        let pos = pos % self.bit_len;
        self.bytes[pos / 8] & (0x80 >> (pos % 8)) != 0
    }

    pub fn set_bit(&mut self, pos: usize, value: bool) {
        if self.bit_len == 0 {
            return;
        }
        let pos = pos % self.bit_len;
        let mask = 0x80 >> (pos % 8);
        if value {
            self.bytes[pos / 8] |= mask;
        } else {
            self.bytes[pos / 8] &= !mask;
        }
    }

    /// Ten bits starting at `pos`, right-aligned.
    #[must_use]
    pub fn bits10(&self, pos: usize) -> u16 {
        (0..10).fold(0, |acc, i| acc << 1 | u16::from(self.bit(pos + i)))
    }
}

/// A complete disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Disk {
    /// Index `half_track - 1`.
    tracks: Vec<Track>,
    write_protected: bool,
    modified: bool,
}

impl Default for Disk {
    fn default() -> Self {
        Self::blank()
    }
}

impl Disk {
    /// An unformatted disk: every half-track empty.
    #[must_use]
    pub fn blank() -> Self {
        Self {
            tracks: vec![Track::default(); usize::from(HALF_TRACKS)],
            write_protected: false,
            modified: false,
        }
    }

    /// GCR-encode every track of a D64 image.
    #[must_use]
    pub fn from_d64(d64: &D64) -> Self {
        let mut disk = Self::blank();
        for track in 1..=d64.tracks() {
            disk.tracks[usize::from(2 * track - 2)] =
                Track::from_bytes(d64.encode_track(track), gcr::speed_zone(track));
        }
        disk
    }

    /// Build from a D64 or G64 image, picked by signature and size. The
    /// disk is only returned once every track is in place.
    pub fn from_image(data: &[u8]) -> Result<Self, MediaError> {
        let disk = if g64::is_g64(data) {
            g64::parse(data)?
        } else if D64::is_d64_size(data.len()) {
            Self::from_d64(&D64::from_bytes(data)?)
        } else {
            return Err(MediaError::UnknownImage);
        };
        info!("Disk image decoded ({} bytes)", data.len());
        Ok(disk)
    }

    pub(crate) fn from_tracks(tracks: Vec<Track>) -> Self {
        let mut disk = Self::blank();
        for (slot, track) in disk.tracks.iter_mut().zip(tracks) {
            *slot = track;
        }
        disk
    }

    fn check_half_track(half_track: u8) -> Result<usize, DiskError> {
        if (1..=HALF_TRACKS).contains(&half_track) {
            Ok(usize::from(half_track - 1))
        } else {
            Err(DiskError::TrackOutOfRange(half_track))
        }
    }

    fn check_track(track: u8) -> Result<u8, DiskError> {
        if (1..=MAX_TRACK).contains(&track) {
            Ok(2 * track - 1)
        } else {
            Err(DiskError::TrackOutOfRange(track))
        }
    }

    pub fn half_track(&self, half_track: u8) -> Result<&Track, DiskError> {
        Ok(&self.tracks[Self::check_half_track(half_track)?])
    }

    pub fn half_track_mut(&mut self, half_track: u8) -> Result<&mut Track, DiskError> {
        let index = Self::check_half_track(half_track)?;
        Ok(&mut self.tracks[index])
    }

    pub(crate) fn mark_modified(&mut self) {
        self.modified = true;
    }

    /// Shape checks for a disk decoded from a snapshot.
    pub(crate) fn check_state(&self) -> Result<(), StateError> {
        if self.tracks.len() != usize::from(HALF_TRACKS) {
            return Err(StateError::InvalidLength {
                field: "disk.tracks",
                expected: usize::from(HALF_TRACKS),
                found: self.tracks.len(),
            });
        }
        for track in &self.tracks {
            emu_core::check_below("disk.track.zone", u64::from(track.zone), 4)?;
            if track.bit_len > track.bytes.len() * 8 {
                return Err(StateError::InvalidValue {
                    field: "disk.track.bit_len",
                    value: track.bit_len as u64,
                });
            }
        }
        Ok(())
    }

    /// Decode the stream of a whole track (1-42) without touching it.
    pub fn analyze_track(&self, track: u8) -> Result<TrackAnalysis, DiskError> {
        self.analyze_half_track(Self::check_track(track)?)
    }

    pub fn analyze_half_track(&self, half_track: u8) -> Result<TrackAnalysis, DiskError> {
        Ok(analysis::analyze(half_track, self.half_track(half_track)?))
    }

    /// Analyse every recorded half-track and collect the ones with errors.
    #[must_use]
    pub fn warnings(&self) -> Vec<TrackWarning> {
        let mut warnings = Vec::new();
        for half_track in 1..=HALF_TRACKS {
            let track = &self.tracks[usize::from(half_track - 1)];
            if track.is_empty() {
                continue;
            }
            let result = analysis::analyze(half_track, track);
            if !result.errors.is_empty() {
                warn!(
                    "Half-track {half_track}: {} error(s), {} valid sector(s)",
                    result.errors.len(),
                    result.valid_sectors()
                );
                warnings.push(TrackWarning {
                    half_track,
                    errors: result.errors,
                });
            }
        }
        warnings
    }

    /// Decode one sector from the stream.
    #[must_use]
    pub fn read_sector(&self, track: u8, sector: u8) -> Option<[u8; SECTOR_SIZE]> {
        let half_track = Self::check_track(track).ok()?;
        let stream = self.half_track(half_track).ok()?;
        let info = analysis::analyze(half_track, stream)
            .sectors
            .into_iter()
            .find(|s| s.sector == sector)?;
        analysis::read_data(stream, &info)
    }

    /// Decode every sector back into a D64 image. Tracks 36-40 are
    /// included when any of them is recorded. An error table is appended
    /// when any sector fails to decode.
    #[must_use]
    pub fn to_d64(&self) -> Vec<u8> {
        let extended = (36u8..=40).any(|t| !self.tracks[usize::from(2 * t - 2)].is_empty());
        let mut d64 = D64::blank(if extended { 40 } else { 35 });
        for track in 1..=d64.tracks() {
            let half_track = 2 * track - 1;
            let result = analysis::analyze(half_track, &self.tracks[usize::from(half_track - 1)]);
            for sector in 0..D64::sectors_per_track(track) {
                let info = result.sectors.iter().find(|s| s.sector == sector);
                let data = info.and_then(|info| analysis::read_data(&self.tracks[usize::from(half_track - 1)], info));
                if let Some(data) = data {
                    d64.write_sector(track, sector, &data);
                }
                let code = info.map_or(0x02, analysis::SectorInfo::error_code);
                if code != 0x01 {
                    d64.set_error_code(track, sector, code);
                }
            }
        }
        d64.to_bytes()
    }

    /// Raw G64 image of every half-track.
    #[must_use]
    pub fn to_g64(&self) -> Vec<u8> {
        g64::export(&self.tracks)
    }

    #[must_use]
    pub fn is_write_protected(&self) -> bool {
        self.write_protected
    }

    pub fn set_write_protected(&mut self, protected: bool) {
        self.write_protected = protected;
    }

    /// Whether the drive has written to the disk since it was built.
    #[must_use]
    pub fn is_modified(&self) -> bool {
        self.modified
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_shape_is_checked() {
        let mut disk = Disk::blank();
        assert_eq!(disk.check_state(), Ok(()));
        disk.tracks.truncate(3);
        assert_eq!(
            disk.check_state(),
            Err(StateError::InvalidLength {
                field: "disk.tracks",
                expected: 84,
                found: 3
            })
        );

        let mut disk = Disk::blank();
        disk.tracks[0] = Track {
            bytes: vec![0x55; 4],
            bit_len: 40,
            zone: 0,
        };
        assert_eq!(
            disk.check_state(),
            Err(StateError::InvalidValue {
                field: "disk.track.bit_len",
                value: 40
            })
        );
    }

    fn formatted() -> D64 {
        let mut d64 = D64::blank(35);
        let mut bam = [0u8; 256];
        bam[0xA2] = b'4';
        bam[0xA3] = b'2';
        d64.write_sector(18, 0, &bam);
        d64
    }

    #[test]
    fn tracks_land_on_odd_half_tracks() {
        let disk = Disk::from_d64(&formatted());
        assert!(!disk.half_track(1).expect("in range").is_empty());
        assert!(disk.half_track(2).expect("in range").is_empty());
        assert!(!disk.half_track(69).expect("in range").is_empty());
        assert!(disk.half_track(71).expect("in range").is_empty());
        assert_eq!(disk.half_track(35).expect("in range").zone(), 1);
    }

    #[test]
    fn half_track_bounds() {
        let disk = Disk::blank();
        assert_eq!(disk.half_track(0), Err(DiskError::TrackOutOfRange(0)));
        assert_eq!(disk.half_track(85), Err(DiskError::TrackOutOfRange(85)));
        assert!(disk.half_track(84).is_ok());
        assert!(disk.analyze_track(43).is_err());
    }

    #[test]
    fn bits_wrap_around() {
        let mut track = Track::from_bytes(vec![0x80, 0x01], 0);
        assert!(track.bit(0));
        assert!(track.bit(15));
        assert!(track.bit(16));
        track.set_bit(17, true);
        assert_eq!(track.bytes(), &[0xC0, 0x01]);
        assert!(!Track::default().bit(5));
    }

    #[test]
    fn sectors_decode_from_stream() {
        let mut d64 = formatted();
        let mut block = [0u8; 256];
        for (i, b) in block.iter_mut().enumerate() {
            *b = i as u8;
        }
        d64.write_sector(17, 20, &block);
        let disk = Disk::from_d64(&d64);
        assert_eq!(disk.read_sector(17, 20), Some(block));
        assert_eq!(disk.read_sector(17, 21), None);
    }

    #[test]
    fn clean_disk_has_no_warnings() {
        let disk = Disk::from_d64(&formatted());
        assert!(disk.warnings().is_empty());
    }

    #[test]
    fn error_bytes_become_warnings() {
        let mut d64 = formatted();
        d64.set_error_code(18, 5, 0x05);
        let disk = Disk::from_d64(&d64);
        let warnings = disk.warnings();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].half_track, 35);
    }

    #[test]
    fn d64_export_matches_source() {
        let mut d64 = formatted();
        d64.write_sector(1, 0, &[0xEE; 256]);
        let disk = Disk::from_d64(&d64);
        assert_eq!(disk.to_d64(), d64.to_bytes());
    }

    #[test]
    fn forty_track_export_keeps_the_extended_tracks() {
        let mut d64 = D64::blank(40);
        d64.write_sector(38, 4, &[0x5A; 256]);
        let disk = Disk::from_d64(&d64);
        let exported = D64::from_bytes(&disk.to_d64()).expect("valid D64");
        assert_eq!(exported.tracks(), 40);
        assert_eq!(disk.to_d64(), d64.to_bytes());

        // A 35-track disk stays 35 tracks.
        assert_eq!(Disk::from_d64(&formatted()).to_d64().len(), 174_848);
    }

    #[test]
    fn d64_export_carries_error_codes() {
        let mut d64 = formatted();
        d64.set_error_code(20, 2, 0x05);
        let exported = D64::from_bytes(&Disk::from_d64(&d64).to_d64()).expect("valid");
        assert_eq!(exported.error_code(20, 2), 0x05);
        assert_eq!(exported.error_code(20, 3), 0x01);
    }

    #[test]
    fn unknown_image_rejected() {
        assert_eq!(Disk::from_image(&[0; 1000]), Err(MediaError::UnknownImage));
    }
}
