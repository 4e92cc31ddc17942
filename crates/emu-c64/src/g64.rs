//! G64 raw GCR images.
//!
//! Layout (all values little-endian):
//!   $0000: "GCR-1541" signature
//!   $0008: version (0)
//!   $0009: number of half-track entries (usually 84)
//!   $000A: maximum track size in bytes (u16)
//!   $000C: track offset table (u32 per half-track, 0 = not recorded)
//!   then:  speed zone table (u32 per half-track, 3 = outermost)
//!   Track data: u16 length followed by that many GCR bytes.
//!
//! Speed table entries above 3 point at per-byte speed maps, which are
//! not supported; those tracks take the zone of their track number.

use crate::disk::{Disk, HALF_TRACKS, Track};
use crate::error::MediaError;
use crate::gcr;

const SIGNATURE: &[u8; 8] = b"GCR-1541";
const HEADER_LEN: usize = 12;
/// Track size written by the 1541 in zone 0, used as the minimum slot
/// size on export.
const DEFAULT_TRACK_SIZE: usize = 7928;

/// Whether the data starts with the G64 signature.
#[must_use]
pub fn is_g64(data: &[u8]) -> bool {
    data.starts_with(SIGNATURE)
}

fn u16_at(data: &[u8], pos: usize) -> Option<usize> {
    let bytes = data.get(pos..pos + 2)?;
    Some(usize::from(u16::from_le_bytes([bytes[0], bytes[1]])))
}

fn u32_at(data: &[u8], pos: usize) -> Option<usize> {
    let bytes = data.get(pos..pos + 4)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize)
}

/// Parse a G64 image into a disk. Every track is checked before the disk
/// is returned.
pub fn parse(data: &[u8]) -> Result<Disk, MediaError> {
    if !is_g64(data) {
        return Err(MediaError::G64Format("missing GCR-1541 signature"));
    }
    if data.len() < HEADER_LEN {
        return Err(MediaError::G64Format("truncated header"));
    }
    if data[8] != 0 {
        return Err(MediaError::G64Format("unsupported version"));
    }
    let entries = usize::from(data[9]);
    if entries == 0 || entries > usize::from(HALF_TRACKS) {
        return Err(MediaError::G64Format("bad track count"));
    }
    let max_size = u16_at(data, 10).ok_or(MediaError::G64Format("truncated header"))?;
    let speed_table = HEADER_LEN + entries * 4;

    let mut tracks = Vec::with_capacity(entries);
    for index in 0..entries {
        let half_track = index as u8 + 1;
        let offset = u32_at(data, HEADER_LEN + index * 4).ok_or(MediaError::G64Format("truncated offset table"))?;
        let speed = u32_at(data, speed_table + index * 4).ok_or(MediaError::G64Format("truncated speed table"))?;
        if offset == 0 {
            tracks.push(Track::default());
            continue;
        }
        let len = u16_at(data, offset).ok_or(MediaError::G64Format("track offset out of range"))?;
        if len > max_size.max(DEFAULT_TRACK_SIZE) {
            return Err(MediaError::G64Format("track longer than maximum size"));
        }
        let bytes = data
            .get(offset + 2..offset + 2 + len)
            .ok_or(MediaError::G64Format("track data out of range"))?;
        let zone = match speed {
            0..=3 => 3 - speed as u8,
            _ => gcr::half_track_zone(half_track),
        };
        tracks.push(Track::from_bytes(bytes.to_vec(), zone));
    }
    Ok(Disk::from_tracks(tracks))
}

/// Write every half-track into a G64 image.
#[must_use]
pub fn export(tracks: &[Track]) -> Vec<u8> {
    let entries = tracks.len().min(usize::from(HALF_TRACKS));
    let max_size = tracks
        .iter()
        .map(|t| t.bytes().len())
        .max()
        .unwrap_or(0)
        .max(DEFAULT_TRACK_SIZE);
    let data_start = HEADER_LEN + entries * 8;

    let mut out = Vec::with_capacity(data_start + entries * (max_size + 2));
    out.extend_from_slice(SIGNATURE);
    out.push(0);
    out.push(entries as u8);
    out.extend_from_slice(&(max_size as u16).to_le_bytes());

    let mut offset = data_start;
    let mut offsets = Vec::with_capacity(entries);
    for track in &tracks[..entries] {
        if track.is_empty() {
            offsets.push(0u32);
        } else {
            offsets.push(offset as u32);
            offset += max_size + 2;
        }
    }
    for o in &offsets {
        out.extend_from_slice(&o.to_le_bytes());
    }
    for track in &tracks[..entries] {
        out.extend_from_slice(&(3 - u32::from(track.zone())).to_le_bytes());
    }
    for track in tracks[..entries].iter().filter(|t| !t.is_empty()) {
        let bytes = track.bytes();
        out.extend_from_slice(&(bytes.len() as u16).to_le_bytes());
        out.extend_from_slice(bytes);
        out.resize(out.len() + max_size - bytes.len(), 0x00);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::d64::D64;

    #[test]
    fn export_then_parse_keeps_streams() {
        let disk = Disk::from_d64(&D64::blank(35));
        let image = disk.to_g64();
        assert!(is_g64(&image));
        assert_eq!(image[9], 84);
        let parsed = parse(&image).expect("valid G64");
        assert_eq!(parsed, disk);
    }

    #[test]
    fn speed_table_is_inverted_zone() {
        let disk = Disk::from_d64(&D64::blank(35));
        let image = disk.to_g64();
        let speed_table = HEADER_LEN + 84 * 4;
        assert_eq!(u32_at(&image, speed_table), Some(3));
        assert_eq!(u32_at(&image, speed_table + 68 * 4), Some(0));
    }

    #[test]
    fn rejects_bad_headers() {
        assert!(matches!(parse(b"GCR-1541"), Err(MediaError::G64Format(_))));
        let mut image = Disk::blank().to_g64();
        image[8] = 1;
        assert_eq!(parse(&image), Err(MediaError::G64Format("unsupported version")));
    }

    #[test]
    fn rejects_out_of_range_track() {
        let mut image = Disk::from_d64(&D64::blank(35)).to_g64();
        image[HEADER_LEN..HEADER_LEN + 4].copy_from_slice(&0x00FF_FFFFu32.to_le_bytes());
        assert!(matches!(parse(&image), Err(MediaError::G64Format(_))));
    }
}
