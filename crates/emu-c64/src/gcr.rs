//! GCR (Group Code Recording) encoding for 1541 tracks.
//!
//! Every 4 bits are mapped to a 5-bit pattern with no more than two
//! consecutive zeros, so ten one-bits in a row can only be a sync mark.
//!
//! Each sector on disk consists of:
//!   - Sync mark: 5 bytes of $FF (40 one-bits)
//!   - Header block: 10 GCR bytes (8 raw → 10 GCR)
//!   - Header gap: 9 bytes of $55
//!   - Sync mark: 5 bytes of $FF
//!   - Data block: 325 GCR bytes (260 raw → 325 GCR)
//!   - Tail gap: 8-17 bytes of $55, depending on the zone
//!
//! Speed zones, numbered from the outside in. The drive's 16 MHz clock is
//! divided down to one bit cell per 52/56/60/64 ticks:
//!   Zone 0 (tracks  1-17): 52 ticks/bit, 7693 bytes per rotation
//!   Zone 1 (tracks 18-24): 56 ticks/bit, 7143 bytes
//!   Zone 2 (tracks 25-30): 60 ticks/bit, 6667 bytes
//!   Zone 3 (tracks 31-42): 64 ticks/bit, 6250 bytes

/// 4-bit to 5-bit GCR encoding table.
const GCR_ENCODE: [u8; 16] = [
    0x0A, 0x0B, 0x12, 0x13, 0x0E, 0x0F, 0x16, 0x17,
    0x09, 0x19, 0x1A, 0x1B, 0x0D, 0x1D, 0x1E, 0x15,
];

/// 5-bit to 4-bit GCR decoding table. Invalid codes map to $FF.
const GCR_DECODE: [u8; 32] = [
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, // 00-07: invalid
    0xFF, 0x08, 0x00, 0x01, 0xFF, 0x0C, 0x04, 0x05, // 08-0F
    0xFF, 0xFF, 0x02, 0x03, 0xFF, 0x0F, 0x06, 0x07, // 10-17
    0xFF, 0x09, 0x0A, 0x0B, 0xFF, 0x0D, 0x0E, 0xFF, // 18-1F
];

/// Raw block identifiers following a sync mark.
pub const HEADER_ID: u8 = 0x08;
pub const DATA_ID: u8 = 0x07;

/// Sync + header + gap + sync + data, without the tail gap.
pub const SECTOR_BYTES: usize = 5 + 10 + 9 + 5 + 325;

/// GCR bytes per rotation, per zone.
const TRACK_BYTES: [usize; 4] = [7693, 7143, 6667, 6250];

/// Gap after each sector's data block, per zone.
const TAIL_GAP: [usize; 4] = [8, 17, 12, 9];

/// 16 MHz ticks per bit cell, per zone.
const TICKS_PER_BIT: [u32; 4] = [52, 56, 60, 64];

/// Speed zone (0 = outermost) of a whole track number.
#[must_use]
pub fn speed_zone(track: u8) -> u8 {
    match track {
        0..=17 => 0,
        18..=24 => 1,
        25..=30 => 2,
        _ => 3,
    }
}

/// Speed zone of a half-track (1-84). Half-track `2t - 1` is track `t`.
#[must_use]
pub fn half_track_zone(half_track: u8) -> u8 {
    speed_zone(half_track.div_ceil(2))
}

/// Nominal GCR bytes per rotation for a zone.
#[must_use]
pub fn track_bytes(zone: u8) -> usize {
    TRACK_BYTES[usize::from(zone & 3)]
}

/// 16 MHz ticks per bit cell for a zone.
#[must_use]
pub fn ticks_per_bit(zone: u8) -> u32 {
    TICKS_PER_BIT[usize::from(zone & 3)]
}

/// Decode one 5-bit code into a nybble.
#[must_use]
pub fn decode_nybble(code: u8) -> Option<u8> {
    match GCR_DECODE[usize::from(code & 0x1F)] {
        0xFF => None,
        n => Some(n),
    }
}

/// Decode ten GCR bits (right-aligned) into a byte.
#[must_use]
pub fn decode_byte(bits: u16) -> Option<u8> {
    let hi = decode_nybble((bits >> 5) as u8)?;
    let lo = decode_nybble(bits as u8)?;
    Some((hi << 4) | lo)
}

/// Encode a byte into ten GCR bits (right-aligned).
#[must_use]
pub fn encode_byte(value: u8) -> u16 {
    u16::from(GCR_ENCODE[usize::from(value >> 4)]) << 5 | u16::from(GCR_ENCODE[usize::from(value & 0x0F)])
}

/// Decode 5 GCR bytes into 4 raw bytes.
///
/// Returns `None` if any GCR nybble is invalid.
#[must_use]
pub fn decode_gcr_group(input: &[u8; 5]) -> Option<[u8; 4]> {
    let bits = input.iter().fold(0u64, |acc, &b| acc << 8 | u64::from(b));
    let mut out = [0u8; 4];
    for (i, byte) in out.iter_mut().enumerate() {
        *byte = decode_byte((bits >> (30 - i * 10)) as u16 & 0x3FF)?;
    }
    Some(out)
}

/// Encode 4 raw bytes into 5 GCR bytes.
///
/// Four bytes = eight nybbles = 40 GCR bits = 5 GCR bytes.
#[must_use]
pub fn encode_gcr_group(input: &[u8; 4]) -> [u8; 5] {
    let bits = input
        .iter()
        .fold(0u64, |acc, &b| acc << 10 | u64::from(encode_byte(b)));
    let mut out = [0u8; 5];
    for (i, byte) in out.iter_mut().enumerate() {
        *byte = (bits >> (32 - i * 8)) as u8;
    }
    out
}

fn encode_groups(raw: &[u8], out: &mut Vec<u8>) {
    for chunk in raw.chunks_exact(4) {
        out.extend_from_slice(&encode_gcr_group(&[chunk[0], chunk[1], chunk[2], chunk[3]]));
    }
}

/// XOR of every byte.
#[must_use]
pub fn xor_checksum(data: &[u8]) -> u8 {
    data.iter().fold(0, |acc, &b| acc ^ b)
}

/// Deliberate defects carried by D64 error bytes, reproduced in the GCR
/// stream so copy protection checks see them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SectorFault {
    #[default]
    None,
    /// Error 20: header block id is not $08.
    HeaderNotFound,
    /// Error 21: both sync marks are missing.
    NoSync,
    /// Error 22: data block id is not $07.
    DataNotFound,
    /// Error 23: data checksum inverted.
    DataChecksum,
    /// Error 27: header checksum inverted.
    HeaderChecksum,
    /// Error 29: disk id in the header inverted.
    IdMismatch,
}

impl SectorFault {
    /// From a D64 error byte. Codes with no on-disk effect map to `None`.
    #[must_use]
    pub fn from_error_code(code: u8) -> Self {
        match code {
            0x02 => Self::HeaderNotFound,
            0x03 => Self::NoSync,
            0x04 => Self::DataNotFound,
            0x05 => Self::DataChecksum,
            0x09 => Self::HeaderChecksum,
            0x0B => Self::IdMismatch,
            _ => Self::None,
        }
    }
}

/// Encode a sector's header block.
///
/// Raw header: $08, checksum, sector, track, id2, id1, $0F, $0F.
fn encode_header(track: u8, sector: u8, disk_id: [u8; 2], fault: SectorFault, out: &mut Vec<u8>) {
    let checksum = sector ^ track ^ disk_id[0] ^ disk_id[1];
    let (id1, id2) = if fault == SectorFault::IdMismatch {
        (disk_id[0] ^ 0xFF, disk_id[1] ^ 0xFF)
    } else {
        (disk_id[0], disk_id[1])
    };
    let raw = [
        if fault == SectorFault::HeaderNotFound { 0x00 } else { HEADER_ID },
        if fault == SectorFault::HeaderChecksum { checksum ^ 0xFF } else { checksum },
        sector,
        track,
        id2,
        id1,
        0x0F,
        0x0F,
    ];
    encode_groups(&raw, out);
}

/// Encode a sector's data block.
///
/// Raw: $07, 256 data bytes, checksum, $00, $00 = 260 bytes → 325 GCR bytes.
fn encode_data_block(data: &[u8; 256], fault: SectorFault, out: &mut Vec<u8>) {
    let checksum = xor_checksum(data);
    let mut raw = Vec::with_capacity(260);
    raw.push(if fault == SectorFault::DataNotFound { 0x00 } else { DATA_ID });
    raw.extend_from_slice(data);
    raw.push(if fault == SectorFault::DataChecksum { checksum ^ 0xFF } else { checksum });
    raw.extend_from_slice(&[0x00, 0x00]);
    encode_groups(&raw, out);
}

/// Encode a complete sector (sync + header + gap + sync + data + gap).
pub fn encode_sector(
    track: u8,
    sector: u8,
    data: &[u8; 256],
    disk_id: [u8; 2],
    fault: SectorFault,
    tail_gap: usize,
    out: &mut Vec<u8>,
) {
    let sync = if fault == SectorFault::NoSync { 0x00 } else { 0xFF };
    out.extend_from_slice(&[sync; 5]);
    encode_header(track, sector, disk_id, fault, out);
    out.extend_from_slice(&[0x55; 9]);
    out.extend_from_slice(&[sync; 5]);
    encode_data_block(data, fault, out);
    out.extend(std::iter::repeat_n(0x55, tail_gap));
}

/// Encode a whole track. `sector` supplies the data and fault of each
/// sector in turn. The result is padded with gap bytes to one rotation.
pub fn encode_track(
    track: u8,
    sectors: u8,
    disk_id: [u8; 2],
    mut sector: impl FnMut(u8) -> ([u8; 256], SectorFault),
) -> Vec<u8> {
    let zone = usize::from(speed_zone(track));
    let mut out = Vec::with_capacity(TRACK_BYTES[zone]);
    for s in 0..sectors {
        let (data, fault) = sector(s);
        encode_sector(track, s, &data, disk_id, fault, TAIL_GAP[zone], &mut out);
    }
    if out.len() < TRACK_BYTES[zone] {
        out.resize(TRACK_BYTES[zone], 0x55);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gcr_group_encode_known_values() {
        // All GCR(0) = 01010 repeated
        assert_eq!(encode_gcr_group(&[0x00; 4]), [0x52, 0x94, 0xA5, 0x29, 0x4A]);
        // All GCR(F) = 10101 repeated
        assert_eq!(encode_gcr_group(&[0xFF; 4]), [0xAD, 0x6B, 0x5A, 0xD6, 0xB5]);
    }

    #[test]
    fn group_decodes_back() {
        let raw = [0x08, 0x12, 0xA5, 0x3C];
        assert_eq!(decode_gcr_group(&encode_gcr_group(&raw)), Some(raw));
        assert_eq!(decode_gcr_group(&[0; 5]), None);
    }

    #[test]
    fn every_byte_has_a_valid_code() {
        for value in 0..=255u8 {
            let bits = encode_byte(value);
            assert!(bits < 0x400);
            assert_eq!(decode_byte(bits), Some(value));
        }
    }

    #[test]
    fn codes_never_hold_three_zeros() {
        for value in 0..=255u8 {
            let bits = encode_byte(value);
            for shift in 0..8 {
                assert_ne!((bits >> shift) & 0x7, 0, "value {value:02X}");
            }
        }
    }

    #[test]
    fn sector_layout() {
        let mut encoded = Vec::new();
        encode_sector(1, 0, &[0; 256], [0x41, 0x42], SectorFault::None, 9, &mut encoded);

        assert_eq!(&encoded[0..5], &[0xFF; 5]);
        assert_eq!(&encoded[15..24], &[0x55; 9]);
        assert_eq!(&encoded[24..29], &[0xFF; 5]);
        assert_eq!(&encoded[354..363], &[0x55; 9]);
        assert_eq!(encoded.len(), SECTOR_BYTES + 9);

        let header = decode_gcr_group(&[encoded[5], encoded[6], encoded[7], encoded[8], encoded[9]]);
        assert_eq!(header, Some([0x08, 0x41 ^ 0x42 ^ 1, 0, 1]));
    }

    #[test]
    fn faults_change_the_stream() {
        let mut clean = Vec::new();
        encode_sector(18, 3, &[7; 256], [0x41, 0x42], SectorFault::None, 9, &mut clean);
        let mut no_sync = Vec::new();
        encode_sector(18, 3, &[7; 256], [0x41, 0x42], SectorFault::NoSync, 9, &mut no_sync);
        // Header sync at 0..5, data sync at 24..29; everything else matches.
        assert_eq!(&no_sync[0..5], &[0; 5]);
        assert_eq!(&no_sync[24..29], &[0; 5]);
        assert_eq!(&clean[24..29], &[0xFF; 5]);
        assert_eq!(&no_sync[5..24], &clean[5..24]);
        assert_eq!(&no_sync[29..], &clean[29..]);

        let mut bad_data = Vec::new();
        encode_sector(18, 3, &[7; 256], [0x41, 0x42], SectorFault::DataChecksum, 9, &mut bad_data);
        assert_eq!(&bad_data[..29], &clean[..29]);
        assert_ne!(bad_data, clean);
    }

    #[test]
    fn track_length_matches_zone() {
        let blank = |_| ([0u8; 256], SectorFault::None);
        assert_eq!(encode_track(1, 21, [0, 0], blank).len(), 7693);
        assert_eq!(encode_track(18, 19, [0, 0], blank).len(), 7143);
        assert_eq!(encode_track(25, 18, [0, 0], blank).len(), 6667);
        assert_eq!(encode_track(35, 17, [0, 0], blank).len(), 6250);
    }

    #[test]
    fn speed_zone_values() {
        assert_eq!(speed_zone(1), 0);
        assert_eq!(speed_zone(17), 0);
        assert_eq!(speed_zone(18), 1);
        assert_eq!(speed_zone(24), 1);
        assert_eq!(speed_zone(25), 2);
        assert_eq!(speed_zone(30), 2);
        assert_eq!(speed_zone(31), 3);
        assert_eq!(speed_zone(40), 3);
        assert_eq!(half_track_zone(35), 1);
        assert_eq!(half_track_zone(34), 0);
    }

    #[test]
    fn error_codes_map_to_faults() {
        assert_eq!(SectorFault::from_error_code(0x01), SectorFault::None);
        assert_eq!(SectorFault::from_error_code(0x05), SectorFault::DataChecksum);
        assert_eq!(SectorFault::from_error_code(0x0F), SectorFault::None);
    }
}
