//! T64 tape archive reader.
//!
//! A T64 file is a container of program files, not a tape signal. Each
//! entry turns into a PRG that loads straight into RAM.
//!
//! # Header (64 bytes)
//!
//! - Bytes 0-31: description, starting "C64" ("C64 tape image file" or
//!   "C64S tape file")
//! - Bytes 32-33: version
//! - Bytes 34-35: directory slots (LE u16)
//! - Bytes 36-37: slots in use (LE u16, often wrong)
//! - Bytes 40-63: archive name, padded with spaces
//!
//! # Directory entry (32 bytes each, from offset 64)
//!
//! - Byte 0: entry type (0 = free, 1 = normal file, 3 = memory snapshot)
//! - Byte 1: C64 file type
//! - Bytes 2-3: start address (LE u16)
//! - Bytes 4-5: end address, exclusive (LE u16)
//! - Bytes 8-11: offset of the data in the archive (LE u32)
//! - Bytes 16-31: file name, padded with spaces or $A0
//!
//! Many tools write a bogus end address. The data of an entry is therefore
//! cut at the next entry's data or at the end of the file.

use std::fmt;

const SIGNATURE: &[u8; 3] = b"C64";
const HEADER_LEN: usize = 64;
const ENTRY_LEN: usize = 32;

/// A T64 archive was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum T64Error {
    /// Shorter than the 64-byte header.
    TooShort(usize),
    BadSignature,
    /// No directory entry holds a file.
    Empty,
    /// An entry's data starts outside the archive.
    BadOffset { entry: usize, offset: usize },
    /// Asked for an entry the directory does not have.
    NoSuchEntry(usize),
}

impl fmt::Display for T64Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooShort(len) => write!(f, "T64 file too short for header ({len} bytes)"),
            Self::BadSignature => write!(f, "missing C64 tape archive signature"),
            Self::Empty => write!(f, "T64 archive holds no files"),
            Self::BadOffset { entry, offset } => {
                write!(f, "T64 entry {entry} points past the archive (offset {offset})")
            }
            Self::NoSuchEntry(n) => write!(f, "T64 archive has no entry {n}"),
        }
    }
}

impl std::error::Error for T64Error {}

/// One file in the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct T64Entry {
    /// File name with padding stripped, PETSCII mapped to ASCII.
    pub name: String,
    /// Load address.
    pub start: u16,
    offset: usize,
    len: usize,
}

impl T64Entry {
    /// Bytes of program data.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// A parsed T64 archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct T64Archive {
    name: String,
    entries: Vec<T64Entry>,
    data: Vec<u8>,
}

impl T64Archive {
    /// Parse a T64 archive. Free directory slots are skipped.
    pub fn parse(data: &[u8]) -> Result<Self, T64Error> {
        if data.len() < HEADER_LEN {
            return Err(T64Error::TooShort(data.len()));
        }
        if &data[..3] != SIGNATURE {
            return Err(T64Error::BadSignature);
        }
        let slots = usize::from(u16::from_le_bytes([data[34], data[35]])).max(1);
        let name = petscii_name(&data[40..64]);

        let mut raw = Vec::new();
        for slot in 0..slots {
            let at = HEADER_LEN + slot * ENTRY_LEN;
            let Some(entry) = data.get(at..at + ENTRY_LEN) else {
                break;
            };
            if entry[0] == 0 {
                continue;
            }
            let start = u16::from_le_bytes([entry[2], entry[3]]);
            let end = u16::from_le_bytes([entry[4], entry[5]]);
            let offset = u32::from_le_bytes([entry[8], entry[9], entry[10], entry[11]]) as usize;
            if offset >= data.len() {
                return Err(T64Error::BadOffset {
                    entry: slot,
                    offset,
                });
            }
            let declared = if end > start {
                usize::from(end - start)
            } else {
                usize::MAX
            };
            raw.push((petscii_name(&entry[16..32]), start, offset, declared));
        }
        if raw.is_empty() {
            return Err(T64Error::Empty);
        }

        let offsets: Vec<usize> = raw.iter().map(|&(_, _, offset, _)| offset).collect();
        let entries = raw
            .into_iter()
            .map(|(name, start, offset, declared)| {
                let limit = offsets
                    .iter()
                    .copied()
                    .filter(|&o| o > offset)
                    .min()
                    .unwrap_or(data.len());
                T64Entry {
                    name,
                    start,
                    offset,
                    len: declared.min(limit - offset),
                }
            })
            .collect();
        Ok(Self {
            name,
            entries,
            data: data.to_vec(),
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn entries(&self) -> &[T64Entry] {
        &self.entries
    }

    /// Entry `index` as a PRG: load address followed by the data.
    pub fn prg(&self, index: usize) -> Result<Vec<u8>, T64Error> {
        let entry = self.entries.get(index).ok_or(T64Error::NoSuchEntry(index))?;
        let mut prg = Vec::with_capacity(entry.len + 2);
        prg.extend_from_slice(&entry.start.to_le_bytes());
        prg.extend_from_slice(&self.data[entry.offset..entry.offset + entry.len]);
        Ok(prg)
    }
}

/// Header check without parsing the directory.
#[must_use]
pub fn is_t64(data: &[u8]) -> bool {
    data.len() >= HEADER_LEN && &data[..3] == SIGNATURE
}

/// Strip space and shifted-space padding; map anything outside printable
/// ASCII to '?'.
pub(crate) fn petscii_name(raw: &[u8]) -> String {
    let raw = raw.split(|&b| b == 0).next().unwrap_or_default();
    let end = raw
        .iter()
        .rposition(|&b| b != b' ' && b != 0xA0)
        .map_or(0, |i| i + 1);
    raw[..end]
        .iter()
        .map(|&b| if (0x20..0x7F).contains(&b) { char::from(b) } else { '?' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn header(slots: u16, used: u16) -> Vec<u8> {
        let mut data = vec![0u8; HEADER_LEN];
        data[..19].copy_from_slice(b"C64 tape image file");
        data[32] = 0x01;
        data[33] = 0x01;
        data[34..36].copy_from_slice(&slots.to_le_bytes());
        data[36..38].copy_from_slice(&used.to_le_bytes());
        data[40..64].copy_from_slice(b"DEMO TAPE               ");
        data
    }

    fn entry(name: &[u8], start: u16, end: u16, offset: u32) -> Vec<u8> {
        let mut e = vec![0u8; ENTRY_LEN];
        e[0] = 1;
        e[1] = 0x82;
        e[2..4].copy_from_slice(&start.to_le_bytes());
        e[4..6].copy_from_slice(&end.to_le_bytes());
        e[8..12].copy_from_slice(&offset.to_le_bytes());
        e[16..32].fill(0x20);
        e[16..16 + name.len()].copy_from_slice(name);
        e
    }

    #[test]
    fn entries_become_prgs() {
        let mut data = header(2, 2);
        data.extend(entry(b"FIRST", 0x0801, 0x0804, 128));
        data.extend(entry(b"SECOND", 0xC000, 0xC002, 131));
        data.extend_from_slice(&[1, 2, 3, 9, 8]);

        let t64 = T64Archive::parse(&data).expect("valid archive");
        assert_eq!(t64.name(), "DEMO TAPE");
        assert_eq!(t64.entries().len(), 2);
        assert_eq!(t64.entries()[1].name, "SECOND");
        assert_eq!(t64.prg(0), Ok(vec![0x01, 0x08, 1, 2, 3]));
        assert_eq!(t64.prg(1), Ok(vec![0x00, 0xC0, 9, 8]));
        assert_eq!(t64.prg(2), Err(T64Error::NoSuchEntry(2)));
    }

    #[test]
    fn bogus_end_address_is_cut_at_the_file_end() {
        // A common converter bug writes $C3C6 as the end address.
        let mut data = header(1, 1);
        data.extend(entry(b"GAME", 0x0801, 0xC3C6, 96));
        data.extend_from_slice(&[0xA9, 0x00, 0x60]);

        let t64 = T64Archive::parse(&data).expect("valid archive");
        assert_eq!(t64.entries()[0].len(), 3);
        assert_eq!(t64.prg(0), Ok(vec![0x01, 0x08, 0xA9, 0x00, 0x60]));
    }

    #[test]
    fn free_slots_are_skipped() {
        let mut data = header(3, 1);
        data.extend(vec![0u8; ENTRY_LEN]);
        data.extend(entry(b"ONLY", 0x1000, 0x1001, 160));
        data.extend(vec![0u8; ENTRY_LEN]);
        data.push(0x42);

        let t64 = T64Archive::parse(&data).expect("valid archive");
        assert_eq!(t64.entries().len(), 1);
        assert_eq!(t64.prg(0), Ok(vec![0x00, 0x10, 0x42]));
    }

    #[test]
    fn rejects_bad_archives() {
        assert_eq!(T64Archive::parse(&[0; 10]), Err(T64Error::TooShort(10)));
        assert_eq!(T64Archive::parse(&[0; 64]), Err(T64Error::BadSignature));
        let empty = header(1, 0);
        assert_eq!(T64Archive::parse(&empty), Err(T64Error::Empty));

        let mut data = header(1, 1);
        data.extend(entry(b"LOST", 0x0801, 0x0810, 4000));
        assert_eq!(
            T64Archive::parse(&data),
            Err(T64Error::BadOffset {
                entry: 0,
                offset: 4000
            })
        );
    }

    #[test]
    fn names_drop_padding() {
        assert_eq!(petscii_name(b"HELLO\xA0\xA0  "), "HELLO");
        assert_eq!(petscii_name(b"A\x93B\0junk"), "A?B");
    }
}
