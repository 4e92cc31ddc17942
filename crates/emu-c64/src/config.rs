//! C64 configuration: video standard, SID revision, ROM images and queue
//! sizes.
//!
//! Everything the core needs arrives through [`C64Config`]; there are no
//! built-in ROMs or global defaults beyond [`Default`].

use mos_sid_6581::SidModel;

use crate::error::MediaError;

/// C64 video standard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum C64Model {
    /// PAL C64 with the 6569 VIC-II.
    #[default]
    C64Pal,
    /// NTSC C64 with the 6567R8 VIC-II.
    C64Ntsc,
}

impl C64Model {
    /// CPU clock in Hz.
    #[must_use]
    pub const fn cpu_frequency(self) -> u32 {
        match self {
            Self::C64Pal => 985_248,
            Self::C64Ntsc => 1_022_727,
        }
    }

    #[must_use]
    pub const fn raster_lines(self) -> u16 {
        match self {
            Self::C64Pal => 312,
            Self::C64Ntsc => 263,
        }
    }

    #[must_use]
    pub const fn cycles_per_line(self) -> u8 {
        match self {
            Self::C64Pal => 63,
            Self::C64Ntsc => 65,
        }
    }

    /// CPU cycles in one video frame.
    #[must_use]
    pub const fn cycles_per_frame(self) -> u32 {
        self.raster_lines() as u32 * self.cycles_per_line() as u32
    }

    /// Power line frequency feeding the CIA TOD clocks.
    #[must_use]
    pub const fn mains_hz(self) -> u32 {
        match self {
            Self::C64Pal => 50,
            Self::C64Ntsc => 60,
        }
    }

    pub(crate) const fn tag(self) -> u8 {
        match self {
            Self::C64Pal => 0,
            Self::C64Ntsc => 1,
        }
    }
}

/// Which ROM image a size error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RomKind {
    Basic,
    Kernal,
    Chargen,
    Drive,
}

impl RomKind {
    /// Required image size in bytes.
    #[must_use]
    pub const fn expected_size(self) -> usize {
        match self {
            Self::Basic | Self::Kernal => 8192,
            Self::Chargen => 4096,
            Self::Drive => 16_384,
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Basic => "BASIC",
            Self::Kernal => "KERNAL",
            Self::Chargen => "character",
            Self::Drive => "1541",
        }
    }
}

/// ROM images for the machine and (optionally) the 1541.
#[derive(Debug, Clone, Default)]
pub struct RomSet {
    pub basic: Vec<u8>,
    pub kernal: Vec<u8>,
    pub chargen: Vec<u8>,
    /// 1541 DOS ROM. No drive is attached when absent.
    pub drive: Option<Vec<u8>>,
}

impl RomSet {
    /// Check every image against its required size.
    pub fn validate(&self) -> Result<(), MediaError> {
        check(RomKind::Basic, &self.basic)?;
        check(RomKind::Kernal, &self.kernal)?;
        check(RomKind::Chargen, &self.chargen)?;
        if let Some(drive) = &self.drive {
            check(RomKind::Drive, drive)?;
        }
        Ok(())
    }
}

fn check(rom: RomKind, data: &[u8]) -> Result<(), MediaError> {
    if data.len() == rom.expected_size() {
        Ok(())
    } else {
        Err(MediaError::RomSize {
            rom,
            expected: rom.expected_size(),
            found: data.len(),
        })
    }
}

/// Configuration for a C64 instance.
#[derive(Debug, Clone)]
pub struct C64Config {
    pub model: C64Model,
    pub sid_model: SidModel,
    pub roms: RomSet,
    /// Host audio sample rate in Hz.
    pub sample_rate: u32,
    /// Frames the runner may queue before it starts dropping.
    pub frame_queue: usize,
    /// Audio blocks the runner may queue before it starts dropping.
    pub audio_queue: usize,
    /// Instruction trace ring buffer length.
    pub trace_len: usize,
}

impl Default for C64Config {
    fn default() -> Self {
        Self {
            model: C64Model::C64Pal,
            sid_model: SidModel::Mos6581,
            roms: RomSet::default(),
            sample_rate: 48_000,
            frame_queue: 2,
            audio_queue: 16,
            trace_len: 256,
        }
    }
}
