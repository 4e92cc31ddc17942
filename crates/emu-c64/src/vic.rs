//! VIC-II 6569 (PAL) / 6567R8 (NTSC) video chip.
//!
//! Cycle-stepped: every call to [`Vic::tick`] is one CPU cycle, does the
//! memory accesses the chip makes in that cycle and renders 8 pixels.
//!
//! # Timing
//!
//! Cycles are numbered from 1 as in the usual VIC-II timing charts.
//!
//! - PAL: 312 lines x 63 cycles, NTSC: 263 lines x 65 cycles
//! - c-accesses (video matrix) on bad lines in cycles 15-54, BA low 12-54
//! - g-accesses (bitmap/char data) in cycles 16-55
//! - sprite pointer/data accesses from cycle 58 (PAL) into the next line
//! - raster compare on cycle 1, cycle 2 for line 0
//!
//! # Coordinates
//!
//! The pixels drawn in cycle `c` have X = (c - 13) * 8 .. +7, so the
//! 40-column window starts at X = 24 as sprite coordinates do.
//!
//! # Framebuffer
//!
//! 400 pixels wide (cycles 11-60), 272 lines on PAL (from line 16) and
//! 235 on NTSC (from line 28).

use emu_core::{Observable, SaveState, StateError, Value, restore_block};
use serde::{Deserialize, Serialize};

use crate::config::C64Model;
use crate::memory::C64Memory;
use crate::palette::PALETTE;

/// Framebuffer width in pixels.
pub const FB_WIDTH: u32 = 400;

const FIRST_VISIBLE_CYCLE: u8 = 11;
const LAST_VISIBLE_CYCLE: u8 = 60;

/// Framebuffer column of X = 0.
const FB_X_OFFSET: i32 = 16;

/// Bad lines are possible in this raster range.
const FIRST_DMA_LINE: u16 = 0x30;
const LAST_DMA_LINE: u16 = 0xF7;

/// IRQ bits in $D019/$D01A.
pub mod irq {
    pub const RASTER: u8 = 0x01;
    pub const SPRITE_BACKGROUND: u8 = 0x02;
    pub const SPRITE_SPRITE: u8 = 0x04;
    pub const LIGHTPEN: u8 = 0x08;
}

/// VIC-II chip.
#[derive(Debug, Clone)]
pub struct Vic {
    model: C64Model,

    /// Registers ($D000-$D03F).
    regs: [u8; 0x40],

    /// Current raster line.
    raster_line: u16,
    /// Cycle about to be executed (1-based).
    cycle: u8,
    /// Raster compare value ($D012 + bit 7 of $D011).
    raster_compare: u16,

    irq_status: u8,
    irq_enable: u8,

    /// DEN was set during some cycle of line $30.
    den_latch: bool,
    bad_line: bool,
    /// Display state (true) or idle state (false).
    display_state: bool,
    vc: u16,
    vcbase: u16,
    rc: u8,
    vmli: usize,
    /// Video matrix line buffer: screen code | colour << 8.
    matrix: [u16; 40],

    main_border: bool,
    vertical_border: bool,

    /// Graphics sequencer: byte being shifted out, pixels since load,
    /// and the matrix entry it belongs to.
    gfx_data: u8,
    gfx_pos: u8,
    gfx_cdata: u16,
    /// g-access result waiting for the XSCROLL pixel to load.
    pending: Option<(u8, u16)>,

    sprite_dma: u8,
    sprite_display: u8,
    /// Y-expansion flip-flops.
    sprite_exp: u8,
    mc: [u8; 8],
    mcbase: [u8; 8],
    /// 24-bit sprite data for the next displayed line.
    sprite_data: [u32; 8],

    /// $D01E, cleared on read.
    sprite_sprite_collision: u8,
    /// $D01F, cleared on read.
    sprite_bg_collision: u8,

    ba_low: bool,
    /// Last byte the VIC read; what the CPU sees on open I/O.
    last_fetch: u8,
    /// VIC-II bank (0-3) from CIA2 port A.
    bank: u8,

    frame_complete: bool,
    /// ARGB32 framebuffer.
    framebuffer: Vec<u32>,
}

impl Vic {
    #[must_use]
    pub fn new(model: C64Model) -> Self {
        let height = Self::visible_lines(model);
        Self {
            model,
            regs: [0; 0x40],
            raster_line: 0,
            cycle: 1,
            raster_compare: 0,
            irq_status: 0,
            irq_enable: 0,
            den_latch: false,
            bad_line: false,
            display_state: false,
            vc: 0,
            vcbase: 0,
            rc: 0,
            vmli: 0,
            matrix: [0; 40],
            main_border: true,
            vertical_border: true,
            gfx_data: 0,
            gfx_pos: 8,
            gfx_cdata: 0,
            pending: None,
            sprite_dma: 0,
            sprite_display: 0,
            sprite_exp: 0xFF,
            mc: [0; 8],
            mcbase: [0; 8],
            sprite_data: [0; 8],
            sprite_sprite_collision: 0,
            sprite_bg_collision: 0,
            ba_low: false,
            last_fetch: 0xFF,
            bank: 0,
            frame_complete: false,
            framebuffer: vec![0xFF00_0000; FB_WIDTH as usize * height as usize],
        }
    }

    /// Power-on state for the same video standard.
    pub fn reset(&mut self) {
        let bank = self.bank;
        *self = Self::new(self.model);
        self.bank = bank;
    }

    const fn first_visible_line(model: C64Model) -> u16 {
        match model {
            C64Model::C64Pal => 16,
            C64Model::C64Ntsc => 28,
        }
    }

    const fn visible_lines(model: C64Model) -> u16 {
        match model {
            C64Model::C64Pal => 272,
            C64Model::C64Ntsc => 235,
        }
    }

    fn cycles_per_line(&self) -> u8 {
        self.model.cycles_per_line()
    }

    /// Cycle of sprite `n`'s pointer access.
    fn sprite_fetch_cycle(&self, n: usize) -> u8 {
        let n = n as u8;
        if n < 3 {
            match self.model {
                C64Model::C64Pal => 58 + 2 * n,
                C64Model::C64Ntsc => 60 + 2 * n,
            }
        } else {
            2 * n - 5
        }
    }

    /// Tick the VIC-II for one CPU cycle.
    ///
    /// Returns `true` while BA is low: the CPU must stop at its next read.
    pub fn tick(&mut self, memory: &C64Memory) -> bool {
        let c = self.cycle;
        let line = self.raster_line;

        // Raster compare.
        if ((c == 1 && line != 0) || (c == 2 && line == 0)) && line == self.raster_compare {
            self.irq_status |= irq::RASTER;
        }
        if c == 1 && line == 0 {
            self.vcbase = 0;
            self.den_latch = false;
        }

        if line == FIRST_DMA_LINE && self.regs[0x11] & 0x10 != 0 {
            self.den_latch = true;
        }
        self.bad_line = self.den_latch
            && (FIRST_DMA_LINE..=LAST_DMA_LINE).contains(&line)
            && (line & 7) == u16::from(self.regs[0x11] & 0x07);
        if self.bad_line {
            self.display_state = true;
        }

        self.sprite_exp |= !self.regs[0x17];
        match c {
            14 => {
                self.vc = self.vcbase;
                self.vmli = 0;
                if self.bad_line {
                    self.rc = 0;
                }
            }
            15 => self.advance_mcbase(2),
            16 => {
                self.advance_mcbase(1);
                for n in 0..8 {
                    if self.mcbase[n] == 63 {
                        self.sprite_dma &= !(1 << n);
                    }
                }
            }
            55 => {
                self.sprite_exp ^= self.regs[0x17];
                self.check_sprite_dma();
            }
            56 => self.check_sprite_dma(),
            58 => {
                for n in 0..8 {
                    let bit = 1 << n;
                    self.mc[n] = self.mcbase[n];
                    if self.sprite_dma & bit == 0 {
                        self.sprite_display &= !bit;
                    } else if u16::from(self.regs[1 + n * 2]) == line & 0xFF {
                        self.sprite_display |= bit;
                    }
                }
                if self.rc == 7 {
                    self.vcbase = self.vc;
                    self.display_state = self.bad_line;
                }
                if self.display_state {
                    self.rc = (self.rc + 1) & 7;
                }
            }
            _ => {}
        }

        for n in 0..8 {
            if self.sprite_fetch_cycle(n) == c {
                self.fetch_sprite(n, memory);
            }
        }
        if (16..=55).contains(&c) {
            self.g_access(memory);
        }
        if self.bad_line && (15..=54).contains(&c) {
            self.c_access(memory);
        }

        self.ba_low = (self.bad_line && (12..=54).contains(&c)) || self.sprite_ba(c);

        if (FIRST_VISIBLE_CYCLE..=LAST_VISIBLE_CYCLE).contains(&c) {
            self.draw_cycle(c);
        }

        if c == self.cycles_per_line() {
            self.check_vertical_border(line);
        }

        self.cycle += 1;
        if self.cycle > self.cycles_per_line() {
            self.cycle = 1;
            self.raster_line += 1;
            if self.raster_line >= self.model.raster_lines() {
                self.raster_line = 0;
                self.frame_complete = true;
            }
        }

        self.ba_low
    }

    fn advance_mcbase(&mut self, step: u8) {
        for n in 0..8 {
            let bit = 1 << n;
            if self.sprite_dma & bit != 0 && self.sprite_exp & bit != 0 {
                self.mcbase[n] = (self.mcbase[n] + step) & 0x3F;
            }
        }
    }

    fn check_sprite_dma(&mut self) {
        for n in 0..8 {
            let bit = 1 << n;
            if self.regs[0x15] & bit != 0
                && self.sprite_dma & bit == 0
                && u16::from(self.regs[1 + n * 2]) == self.raster_line & 0xFF
            {
                self.sprite_dma |= bit;
                self.mcbase[n] = 0;
                self.sprite_data[n] = 0;
                if self.regs[0x17] & bit != 0 {
                    self.sprite_exp &= !bit;
                }
            }
        }
    }

    /// BA is low from three cycles before a sprite's pointer access
    /// through the cycle after it.
    fn sprite_ba(&self, c: u8) -> bool {
        let cycles = i32::from(self.cycles_per_line());
        (0..8).any(|n| {
            self.sprite_dma & (1 << n) != 0 && {
                let p = i32::from(self.sprite_fetch_cycle(n));
                (i32::from(c) - p + 3).rem_euclid(cycles) <= 4
            }
        })
    }

    fn fetch_sprite(&mut self, n: usize, memory: &C64Memory) {
        if self.sprite_dma & (1 << n) == 0 {
            return;
        }
        let pointer = memory.vic_read(self.bank, self.screen_base() | 0x03F8 | n as u16);
        let base = u16::from(pointer) << 6;
        let mut data = 0u32;
        for _ in 0..3 {
            let byte = memory.vic_read(self.bank, base | u16::from(self.mc[n]));
            data = (data << 8) | u32::from(byte);
            self.mc[n] = (self.mc[n] + 1) & 0x3F;
        }
        self.sprite_data[n] = data;
        self.last_fetch = (data & 0xFF) as u8;
    }

    fn c_access(&mut self, memory: &C64Memory) {
        if self.vmli >= self.matrix.len() {
            return;
        }
        let screen = memory.vic_read(self.bank, self.screen_base() | self.vc);
        let colour = memory.colour_read(self.vc);
        self.matrix[self.vmli] = u16::from(screen) | u16::from(colour) << 8;
    }

    fn g_access(&mut self, memory: &C64Memory) {
        let ecm = self.regs[0x11] & 0x40 != 0;
        let (addr, cdata) = if self.display_state {
            let cdata = self.matrix[self.vmli.min(39)];
            let addr = if self.regs[0x11] & 0x20 != 0 {
                self.bitmap_base() | (self.vc << 3) | u16::from(self.rc)
            } else {
                self.char_base() | ((cdata & 0xFF) << 3) | u16::from(self.rc)
            };
            self.vc = (self.vc + 1) & 0x3FF;
            self.vmli += 1;
            (addr, cdata)
        } else {
            (0x3FFF, 0)
        };
        let addr = if ecm { addr & 0x39FF } else { addr };
        let data = memory.vic_read(self.bank, addr);
        self.last_fetch = data;
        self.pending = Some((data, cdata));
    }

    /// Colour index and foreground flag of the next graphics pixel.
    fn graphics_pixel(&self) -> (u8, bool) {
        let ecm = self.regs[0x11] & 0x40 != 0;
        let bmm = self.regs[0x11] & 0x20 != 0;
        let mcm = self.regs[0x16] & 0x10 != 0;
        let screen = (self.gfx_cdata & 0xFF) as u8;
        let colour = (self.gfx_cdata >> 8) as u8 & 0x0F;
        let (bit, pair) = if self.gfx_pos < 8 {
            (
                (self.gfx_data >> (7 - self.gfx_pos)) & 1,
                (self.gfx_data >> (6 - (self.gfx_pos & 6))) & 3,
            )
        } else {
            (0, 0)
        };
        let bg0 = self.regs[0x21] & 0x0F;

        let (index, foreground) = match (bmm, mcm) {
            (false, false) if ecm => {
                if bit != 0 {
                    (colour, true)
                } else {
                    (self.regs[0x21 + usize::from(screen >> 6)] & 0x0F, false)
                }
            }
            (false, false) => {
                if bit != 0 {
                    (colour, true)
                } else {
                    (bg0, false)
                }
            }
            (false, true) if colour & 0x08 == 0 => {
                if bit != 0 {
                    (colour & 0x07, true)
                } else {
                    (bg0, false)
                }
            }
            (false, true) => match pair {
                0 => (bg0, false),
                1 => (self.regs[0x22] & 0x0F, false),
                2 => (self.regs[0x23] & 0x0F, true),
                _ => (colour & 0x07, true),
            },
            (true, false) => {
                if bit != 0 {
                    (screen >> 4, true)
                } else {
                    (screen & 0x0F, false)
                }
            }
            (true, true) => match pair {
                0 => (bg0, false),
                1 => (screen >> 4, false),
                2 => (screen & 0x0F, true),
                _ => (colour, true),
            },
        };
        let invalid = ecm && (bmm || mcm);
        (if invalid { 0 } else { index }, foreground)
    }

    /// Colour of sprite `n` at `x`, if it covers that pixel.
    fn sprite_pixel(&self, n: usize, x: i32) -> Option<u8> {
        let bit = 1u8 << n;
        let sx = i32::from(self.regs[n * 2]) | if self.regs[0x10] & bit != 0 { 256 } else { 0 };
        let line_width = i32::from(self.cycles_per_line()) * 8;
        let mut offset = (x - sx).rem_euclid(line_width);
        if self.regs[0x1D] & bit != 0 {
            offset /= 2;
        }
        if offset >= 24 {
            return None;
        }
        let data = self.sprite_data[n];
        if self.regs[0x1C] & bit != 0 {
            match (data >> (22 - (offset & !1))) & 3 {
                0 => None,
                1 => Some(self.regs[0x25] & 0x0F),
                2 => Some(self.regs[0x27 + n] & 0x0F),
                _ => Some(self.regs[0x26] & 0x0F),
            }
        } else if (data >> (23 - offset)) & 1 != 0 {
            Some(self.regs[0x27 + n] & 0x0F)
        } else {
            None
        }
    }

    /// Border flip-flop compares for the pixel at `x`.
    fn check_horizontal_border(&mut self, x: i32) {
        let csel = self.regs[0x16] & 0x08 != 0;
        let (left, right) = if csel { (24, 344) } else { (31, 335) };
        if x == right {
            self.main_border = true;
        } else if x == left {
            self.check_vertical_border(self.raster_line);
            if !self.vertical_border {
                self.main_border = false;
            }
        }
    }

    fn check_vertical_border(&mut self, line: u16) {
        let rsel = self.regs[0x11] & 0x08 != 0;
        let (top, bottom) = if rsel { (51, 251) } else { (55, 247) };
        if line == bottom {
            self.vertical_border = true;
        } else if line == top && self.regs[0x11] & 0x10 != 0 {
            self.vertical_border = false;
        }
    }

    /// Run the pixel pipeline for the 8 pixels of cycle `c`.
    fn draw_cycle(&mut self, c: u8) {
        let first_line = Self::first_visible_line(self.model);
        let visible = self.raster_line >= first_line
            && self.raster_line < first_line + Self::visible_lines(self.model);
        let row = usize::from(self.raster_line.wrapping_sub(first_line)) * FB_WIDTH as usize;

        let xscroll = self.regs[0x16] & 0x07;
        let sprites_before = self.sprite_sprite_collision;
        let background_before = self.sprite_bg_collision;
        let x0 = (i32::from(c) - 13) * 8;

        for i in 0..8u8 {
            let x = x0 + i32::from(i);
            if i == xscroll {
                if let Some((data, cdata)) = self.pending.take() {
                    self.gfx_data = data;
                    self.gfx_cdata = cdata;
                    self.gfx_pos = 0;
                }
            }
            self.check_horizontal_border(x);

            let (mut colour, foreground) = self.graphics_pixel();
            self.gfx_pos = (self.gfx_pos + 1).min(8);

            let mut covered = 0u8;
            let mut top = None;
            for n in 0..8 {
                if self.sprite_display & (1 << n) == 0 {
                    continue;
                }
                if let Some(sprite_colour) = self.sprite_pixel(n, x) {
                    covered |= 1 << n;
                    if top.is_none() {
                        top = Some((n, sprite_colour));
                    }
                }
            }
            if covered.count_ones() >= 2 {
                self.sprite_sprite_collision |= covered;
            }
            if covered != 0 && foreground {
                self.sprite_bg_collision |= covered;
            }
            if let Some((n, sprite_colour)) = top {
                let behind = self.regs[0x1B] & (1 << n) != 0;
                if !(behind && foreground) {
                    colour = sprite_colour;
                }
            }
            if self.main_border {
                colour = self.regs[0x20] & 0x0F;
            }

            if visible {
                let fb_x = (x + FB_X_OFFSET) as usize;
                self.framebuffer[row + fb_x] = PALETTE[usize::from(colour)];
            }
        }

        if sprites_before == 0 && self.sprite_sprite_collision != 0 {
            self.irq_status |= irq::SPRITE_SPRITE;
        }
        if background_before == 0 && self.sprite_bg_collision != 0 {
            self.irq_status |= irq::SPRITE_BACKGROUND;
        }
    }

    /// Screen memory base address within the VIC-II 16K bank.
    fn screen_base(&self) -> u16 {
        u16::from(self.regs[0x18] >> 4) << 10
    }

    /// Character memory base address within the VIC-II 16K bank.
    fn char_base(&self) -> u16 {
        u16::from((self.regs[0x18] >> 1) & 0x07) << 11
    }

    /// Bitmap memory base address within the VIC-II 16K bank.
    fn bitmap_base(&self) -> u16 {
        if self.regs[0x18] & 0x08 != 0 {
            0x2000
        } else {
            0x0000
        }
    }

    /// Read a VIC-II register.
    ///
    /// `&mut self` because $D01E/$D01F are clear-on-read.
    pub fn read(&mut self, reg: u8) -> u8 {
        let value = self.peek(reg);
        match reg & 0x3F {
            0x1E => self.sprite_sprite_collision = 0,
            0x1F => self.sprite_bg_collision = 0,
            _ => {}
        }
        value
    }

    /// Read a VIC-II register without side effects.
    #[must_use]
    pub fn peek(&self, reg: u8) -> u8 {
        match reg & 0x3F {
            0x11 => {
                let raster_hi = if self.raster_line & 0x100 != 0 {
                    0x80
                } else {
                    0x00
                };
                (self.regs[0x11] & 0x7F) | raster_hi
            }
            0x12 => (self.raster_line & 0xFF) as u8,
            0x16 => self.regs[0x16] | 0xC0,
            0x18 => self.regs[0x18] | 0x01,
            0x19 => {
                let any_active = if self.irq_active() { 0x80 } else { 0x00 };
                self.irq_status | 0x70 | any_active
            }
            0x1A => self.irq_enable | 0xF0,
            0x1E => self.sprite_sprite_collision,
            0x1F => self.sprite_bg_collision,
            r @ 0x20..=0x2E => self.regs[r as usize] | 0xF0,
            r @ 0x00..=0x1D => self.regs[r as usize],
            _ => 0xFF,
        }
    }

    /// Write a VIC-II register.
    pub fn write(&mut self, reg: u8, value: u8) {
        let r = reg & 0x3F;
        match r {
            0x11 | 0x12 => {
                self.regs[r as usize] = value;
                let old = self.raster_compare;
                self.raster_compare = if r == 0x11 {
                    (self.raster_compare & 0x00FF) | (u16::from(value & 0x80) << 1)
                } else {
                    (self.raster_compare & 0x0100) | u16::from(value)
                };
                if self.raster_compare != old && self.raster_compare == self.raster_line {
                    self.irq_status |= irq::RASTER;
                }
            }
            0x19 => self.irq_status &= !value & 0x0F,
            0x1A => self.irq_enable = value & 0x0F,
            0x1E | 0x1F => {}
            0x00..=0x2E => self.regs[r as usize] = value,
            _ => {}
        }
    }

    /// Check if the VIC-II has an active IRQ.
    #[must_use]
    pub fn irq_active(&self) -> bool {
        (self.irq_status & self.irq_enable & 0x0F) != 0
    }

    /// BA as of the last tick.
    #[must_use]
    pub fn ba_low(&self) -> bool {
        self.ba_low
    }

    /// Last byte fetched by the VIC.
    #[must_use]
    pub fn last_fetch(&self) -> u8 {
        self.last_fetch
    }

    /// Set the VIC-II bank (0-3) from CIA2 port A bits 0-1 (inverted).
    pub fn set_bank(&mut self, bank: u8) {
        self.bank = bank & 0x03;
    }

    #[must_use]
    pub fn bank(&self) -> u8 {
        self.bank
    }

    #[must_use]
    pub fn model(&self) -> C64Model {
        self.model
    }

    /// Reference to the framebuffer (ARGB32).
    #[must_use]
    pub fn framebuffer(&self) -> &[u32] {
        &self.framebuffer
    }

    #[must_use]
    pub const fn framebuffer_width(&self) -> u32 {
        FB_WIDTH
    }

    #[must_use]
    pub const fn framebuffer_height(&self) -> u32 {
        Self::visible_lines(self.model) as u32
    }

    /// Check and clear the frame-complete flag.
    pub fn take_frame_complete(&mut self) -> bool {
        std::mem::take(&mut self.frame_complete)
    }

    #[must_use]
    pub fn raster_line(&self) -> u16 {
        self.raster_line
    }

    /// Cycle the next tick executes (1-based).
    #[must_use]
    pub fn raster_cycle(&self) -> u8 {
        self.cycle
    }

    #[must_use]
    pub fn is_bad_line(&self) -> bool {
        self.bad_line
    }
}

/// Snapshot image of a [`Vic`]. The model and framebuffer are not saved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VicState {
    regs: Vec<u8>,
    raster_line: u16,
    cycle: u8,
    raster_compare: u16,
    irq_status: u8,
    irq_enable: u8,
    den_latch: bool,
    bad_line: bool,
    display_state: bool,
    vc: u16,
    vcbase: u16,
    rc: u8,
    vmli: u8,
    matrix: Vec<u16>,
    main_border: bool,
    vertical_border: bool,
    gfx_data: u8,
    gfx_pos: u8,
    gfx_cdata: u16,
    pending: Option<(u8, u16)>,
    sprite_dma: u8,
    sprite_display: u8,
    sprite_exp: u8,
    mc: [u8; 8],
    mcbase: [u8; 8],
    sprite_data: [u32; 8],
    sprite_sprite_collision: u8,
    sprite_bg_collision: u8,
    ba_low: bool,
    last_fetch: u8,
    bank: u8,
    frame_complete: bool,
}

impl SaveState for Vic {
    type State = VicState;

    fn save_state(&self) -> VicState {
        VicState {
            regs: self.regs.to_vec(),
            raster_line: self.raster_line,
            cycle: self.cycle,
            raster_compare: self.raster_compare,
            irq_status: self.irq_status,
            irq_enable: self.irq_enable,
            den_latch: self.den_latch,
            bad_line: self.bad_line,
            display_state: self.display_state,
            vc: self.vc,
            vcbase: self.vcbase,
            rc: self.rc,
            vmli: self.vmli as u8,
            matrix: self.matrix.to_vec(),
            main_border: self.main_border,
            vertical_border: self.vertical_border,
            gfx_data: self.gfx_data,
            gfx_pos: self.gfx_pos,
            gfx_cdata: self.gfx_cdata,
            pending: self.pending,
            sprite_dma: self.sprite_dma,
            sprite_display: self.sprite_display,
            sprite_exp: self.sprite_exp,
            mc: self.mc,
            mcbase: self.mcbase,
            sprite_data: self.sprite_data,
            sprite_sprite_collision: self.sprite_sprite_collision,
            sprite_bg_collision: self.sprite_bg_collision,
            ba_low: self.ba_low,
            last_fetch: self.last_fetch,
            bank: self.bank,
            frame_complete: self.frame_complete,
        }
    }

    fn load_state(&mut self, s: VicState) -> Result<(), StateError> {
        if s.raster_line >= self.model.raster_lines() {
            return Err(StateError::InvalidValue {
                field: "vic.raster_line",
                value: u64::from(s.raster_line),
            });
        }
        if s.cycle == 0 || s.cycle > self.cycles_per_line() {
            return Err(StateError::InvalidValue {
                field: "vic.cycle",
                value: u64::from(s.cycle),
            });
        }
        emu_core::check_below("vic.vmli", u64::from(s.vmli), 41)?;
        restore_block("vic.regs", &s.regs, &mut self.regs)?;
        if s.matrix.len() != self.matrix.len() {
            return Err(StateError::InvalidLength {
                field: "vic.matrix",
                expected: self.matrix.len(),
                found: s.matrix.len(),
            });
        }
        self.matrix.copy_from_slice(&s.matrix);
        self.raster_line = s.raster_line;
        self.cycle = s.cycle;
        self.raster_compare = s.raster_compare & 0x1FF;
        self.irq_status = s.irq_status & 0x0F;
        self.irq_enable = s.irq_enable & 0x0F;
        self.den_latch = s.den_latch;
        self.bad_line = s.bad_line;
        self.display_state = s.display_state;
        self.vc = s.vc & 0x3FF;
        self.vcbase = s.vcbase & 0x3FF;
        self.rc = s.rc & 7;
        self.vmli = usize::from(s.vmli);
        self.main_border = s.main_border;
        self.vertical_border = s.vertical_border;
        self.gfx_data = s.gfx_data;
        self.gfx_pos = s.gfx_pos.min(8);
        self.gfx_cdata = s.gfx_cdata;
        self.pending = s.pending;
        self.sprite_dma = s.sprite_dma;
        self.sprite_display = s.sprite_display;
        self.sprite_exp = s.sprite_exp;
        self.mc = s.mc.map(|c| c & 0x3F);
        self.mcbase = s.mcbase.map(|c| c & 0x3F);
        self.sprite_data = s.sprite_data.map(|d| d & 0x00FF_FFFF);
        self.sprite_sprite_collision = s.sprite_sprite_collision;
        self.sprite_bg_collision = s.sprite_bg_collision;
        self.ba_low = s.ba_low;
        self.last_fetch = s.last_fetch;
        self.bank = s.bank & 3;
        self.frame_complete = s.frame_complete;
        Ok(())
    }
}

impl Observable for Vic {
    fn query(&self, path: &str) -> Option<Value> {
        match path {
            "raster_line" => Some(self.raster_line.into()),
            "raster_cycle" => Some(self.cycle.into()),
            "raster_compare" => Some(self.raster_compare.into()),
            "irq_status" => Some(self.irq_status.into()),
            "irq_enable" => Some(self.irq_enable.into()),
            "bad_line" => Some(self.bad_line.into()),
            "display_state" => Some(self.display_state.into()),
            "ba_low" => Some(self.ba_low.into()),
            "vc" => Some(self.vc.into()),
            "rc" => Some(self.rc.into()),
            "bank" => Some(self.bank.into()),
            "sprite_dma" => Some(self.sprite_dma.into()),
            "sprite_display" => Some(self.sprite_display.into()),
            "border" => Some(self.main_border.into()),
            "registers" => Some(Value::Bytes((0..0x2F).map(|r| self.peek(r)).collect())),
            _ => None,
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        &[
            "raster_line",
            "raster_cycle",
            "raster_compare",
            "irq_status",
            "irq_enable",
            "bad_line",
            "display_state",
            "ba_low",
            "vc",
            "rc",
            "bank",
            "sprite_dma",
            "sprite_display",
            "border",
            "registers",
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAL_LINES: u16 = 312;
    const PAL_CYCLES: u8 = 63;
    /// PAL framebuffer row of raster line 0.
    const FIRST_LINE: u16 = 16;

    fn make_vic_and_memory(chargen_fill: u8) -> (Vic, C64Memory) {
        let kernal = vec![0; 8192];
        let basic = vec![0; 8192];
        let chargen = vec![chargen_fill; 4096];
        (Vic::new(C64Model::C64Pal), C64Memory::new(&basic, &kernal, &chargen))
    }

    /// Tick until `cycle` of `line` has executed.
    fn run_through(vic: &mut Vic, memory: &C64Memory, line: u16, cycle: u8) {
        while !(vic.raster_line() == line && vic.raster_cycle() == cycle) {
            vic.tick(memory);
        }
        vic.tick(memory);
    }

    fn pixel(vic: &Vic, line: u16, x: i32) -> u32 {
        let row = usize::from(line - FIRST_LINE) * FB_WIDTH as usize;
        vic.framebuffer()[row + (x + FB_X_OFFSET) as usize]
    }

    fn standard_screen(vic: &mut Vic) {
        vic.write(0x11, 0x1B);
        vic.write(0x16, 0x08);
        vic.write(0x18, 0x14);
    }

    #[test]
    fn initial_state() {
        let mut vic = Vic::new(C64Model::C64Pal);
        assert_eq!(vic.raster_line(), 0);
        assert_eq!(vic.raster_cycle(), 1);
        assert!(!vic.irq_active());
        assert!(!vic.take_frame_complete());
    }

    #[test]
    fn raster_advances() {
        let (mut vic, memory) = make_vic_and_memory(0);
        for _ in 0..PAL_CYCLES {
            vic.tick(&memory);
        }
        assert_eq!(vic.raster_line(), 1);
        assert_eq!(vic.raster_cycle(), 1);
    }

    #[test]
    fn frame_complete_after_full_frame() {
        let (mut vic, memory) = make_vic_and_memory(0);
        for _ in 0..u32::from(PAL_LINES) * u32::from(PAL_CYCLES) {
            vic.tick(&memory);
        }
        assert!(vic.take_frame_complete());
        assert!(!vic.take_frame_complete());
    }

    #[test]
    fn ntsc_geometry() {
        let memory = make_vic_and_memory(0).1;
        let mut vic = Vic::new(C64Model::C64Ntsc);
        assert_eq!(vic.framebuffer().len(), 400 * 235);
        for _ in 0..263 * 65 {
            vic.tick(&memory);
        }
        assert!(vic.take_frame_complete());
        assert_eq!(vic.raster_line(), 0);
    }

    #[test]
    fn raster_irq_on_first_cycle() {
        let (mut vic, memory) = make_vic_and_memory(0);
        vic.write(0x12, 1);
        vic.write(0x1A, irq::RASTER);

        for _ in 0..PAL_CYCLES {
            vic.tick(&memory);
        }
        assert!(!vic.irq_active());
        vic.tick(&memory);
        assert!(vic.irq_active());
        assert_eq!(vic.peek(0x19), 0xF1);

        vic.write(0x19, irq::RASTER);
        assert!(!vic.irq_active());
    }

    #[test]
    fn raster_irq_line_zero_on_second_cycle() {
        let (mut vic, memory) = make_vic_and_memory(0);
        vic.write(0x12, 5);
        vic.write(0x1A, irq::RASTER);
        vic.write(0x19, 0x0F);
        vic.write(0x12, 0);
        // Writing the current line as compare value fires at once.
        assert!(vic.irq_active());
        vic.write(0x19, irq::RASTER);

        for _ in 0..u32::from(PAL_LINES) * u32::from(PAL_CYCLES) {
            vic.tick(&memory);
        }
        vic.write(0x19, irq::RASTER);
        vic.tick(&memory);
        assert!(!vic.irq_active());
        vic.tick(&memory);
        assert!(vic.irq_active());
    }

    #[test]
    fn bad_line_pulls_ba_low() {
        let (mut vic, memory) = make_vic_and_memory(0);
        standard_screen(&mut vic);
        // YSCROLL = 3: first bad line is $33.
        run_through(&mut vic, &memory, 0x33, 11);
        assert!(!vic.ba_low());
        vic.tick(&memory);
        assert!(vic.ba_low());
        assert!(vic.is_bad_line());
        run_through(&mut vic, &memory, 0x33, 54);
        assert!(vic.ba_low());
        vic.tick(&memory);
        assert!(!vic.ba_low());

        run_through(&mut vic, &memory, 0x34, 20);
        assert!(!vic.is_bad_line());
        assert!(!vic.ba_low());
    }

    #[test]
    fn no_bad_lines_without_den() {
        let (mut vic, memory) = make_vic_and_memory(0);
        vic.write(0x11, 0x0B);
        run_through(&mut vic, &memory, 0x33, 20);
        assert!(!vic.is_bad_line());
        assert!(!vic.ba_low());
    }

    #[test]
    fn register_read_write() {
        let mut vic = Vic::new(C64Model::C64Pal);
        vic.write(0x20, 0x06);
        assert_eq!(vic.read(0x20), 0xF6);
        vic.write(0x21, 0x01);
        assert_eq!(vic.read(0x21), 0xF1);
        vic.write(0x16, 0x08);
        assert_eq!(vic.read(0x16), 0xC8);
        assert_eq!(vic.read(0x1A), 0xF0);
        assert_eq!(vic.read(0x2F), 0xFF);
        assert_eq!(vic.read(0x3F), 0xFF);
    }

    #[test]
    fn bank_selection() {
        let mut vic = Vic::new(C64Model::C64Pal);
        vic.set_bank(2);
        assert_eq!(vic.bank(), 2);
        vic.set_bank(5);
        assert_eq!(vic.bank(), 1);
    }

    #[test]
    fn bitmap_base_selection() {
        let mut vic = Vic::new(C64Model::C64Pal);
        vic.write(0x18, 0x14);
        assert_eq!(vic.bitmap_base(), 0x0000);
        vic.write(0x18, 0x1C);
        assert_eq!(vic.bitmap_base(), 0x2000);
    }

    #[test]
    fn border_and_text_pixels() {
        let (mut vic, mut memory) = make_vic_and_memory(0xFF);
        standard_screen(&mut vic);
        vic.write(0x20, 0x0E);
        vic.write(0x21, 0x06);
        memory.colour_write(0, 0x01);

        run_through(&mut vic, &memory, 0x33, 20);
        assert_eq!(pixel(&vic, 0x33, 23), PALETTE[14]);
        // Char 0 of row 0 is solid with colour white.
        assert_eq!(pixel(&vic, 0x33, 24), PALETTE[1]);
        assert_eq!(pixel(&vic, 0x33, 31), PALETTE[1]);
        // Column 1 has colour RAM 0: black foreground.
        assert_eq!(pixel(&vic, 0x33, 32), PALETTE[0]);
    }

    #[test]
    fn sprite_renders_on_line_after_y() {
        let (mut vic, mut memory) = make_vic_and_memory(0);
        standard_screen(&mut vic);
        vic.write(0x15, 0x01);
        vic.write(0x00, 172);
        vic.write(0x01, 100);
        vic.write(0x27, 0x01);

        memory.ram_write(0x07F8, 0x80);
        memory.ram_write(0x2000, 0xFF);
        memory.ram_write(0x2001, 0xFF);
        memory.ram_write(0x2002, 0xFF);

        run_through(&mut vic, &memory, 100, 40);
        assert_ne!(pixel(&vic, 100, 172), PALETTE[1]);

        run_through(&mut vic, &memory, 101, 40);
        let white = PALETTE[1];
        assert_eq!(pixel(&vic, 101, 172), white);
        assert_eq!(pixel(&vic, 101, 195), white);
        assert_ne!(pixel(&vic, 101, 196), white);
    }

    #[test]
    fn sprite_dma_steals_cycles() {
        let (mut vic, memory) = make_vic_and_memory(0);
        vic.write(0x15, 0x01);
        vic.write(0x01, 100);
        run_through(&mut vic, &memory, 100, 54);
        assert!(!vic.ba_low());
        vic.tick(&memory);
        assert!(vic.ba_low());
        run_through(&mut vic, &memory, 100, 59);
        assert!(vic.ba_low());
        vic.tick(&memory);
        assert!(!vic.ba_low());
    }

    #[test]
    fn sprite_is_21_lines_tall() {
        let (mut vic, mut memory) = make_vic_and_memory(0);
        standard_screen(&mut vic);
        vic.write(0x15, 0x01);
        vic.write(0x00, 100);
        vic.write(0x01, 100);
        vic.write(0x27, 0x01);
        memory.ram_write(0x07F8, 0x80);
        for i in 0..63 {
            memory.ram_write(0x2000 + i, 0x80);
        }

        run_through(&mut vic, &memory, 123, 40);
        let white = PALETTE[1];
        for line in 101..=121 {
            assert_eq!(pixel(&vic, line, 100), white, "line {line}");
        }
        assert_ne!(pixel(&vic, 122, 100), white);
        assert_ne!(pixel(&vic, 100, 100), white);
    }

    #[test]
    fn y_expanded_sprite_is_42_lines_tall() {
        let (mut vic, mut memory) = make_vic_and_memory(0);
        standard_screen(&mut vic);
        vic.write(0x15, 0x01);
        vic.write(0x17, 0x01);
        vic.write(0x00, 100);
        vic.write(0x01, 100);
        vic.write(0x27, 0x01);
        memory.ram_write(0x07F8, 0x80);
        for i in 0..63 {
            memory.ram_write(0x2000 + i, 0x80);
        }

        run_through(&mut vic, &memory, 144, 40);
        let white = PALETTE[1];
        assert_eq!(pixel(&vic, 101, 100), white);
        assert_eq!(pixel(&vic, 142, 100), white);
        assert_ne!(pixel(&vic, 143, 100), white);
    }

    #[test]
    fn collision_register_clear_on_read() {
        let mut vic = Vic::new(C64Model::C64Pal);
        vic.sprite_sprite_collision = 0x05;
        vic.sprite_bg_collision = 0x0A;

        assert_eq!(vic.read(0x1E), 0x05);
        assert_eq!(vic.read(0x1E), 0x00);
        assert_eq!(vic.read(0x1F), 0x0A);
        assert_eq!(vic.read(0x1F), 0x00);
    }

    #[test]
    fn collision_peek_does_not_clear() {
        let mut vic = Vic::new(C64Model::C64Pal);
        vic.sprite_sprite_collision = 0x03;
        assert_eq!(vic.peek(0x1E), 0x03);
        assert_eq!(vic.peek(0x1E), 0x03);
        assert_eq!(vic.read(0x1E), 0x03);
        assert_eq!(vic.read(0x1E), 0x00);
    }

    #[test]
    fn invalid_mode_renders_black() {
        let (mut vic, memory) = make_vic_and_memory(0xFF);
        vic.write(0x11, 0x7B);
        vic.write(0x16, 0x08);
        vic.write(0x20, 0x06);
        vic.write(0x21, 0x01);

        run_through(&mut vic, &memory, 0x33, 25);
        assert_eq!(pixel(&vic, 0x33, 40), PALETTE[0]);
    }

    #[test]
    fn ecm_selects_background() {
        let (mut vic, mut memory) = make_vic_and_memory(0x00);
        vic.write(0x11, 0x5B);
        vic.write(0x16, 0x08);
        vic.write(0x18, 0x14);
        vic.write(0x21, 0x00);
        vic.write(0x22, 0x02);
        vic.write(0x23, 0x05);
        vic.write(0x24, 0x06);
        for (i, code) in [0x00, 0x40, 0x80, 0xC0].into_iter().enumerate() {
            memory.ram_write(0x0400 + i as u16, code);
        }

        run_through(&mut vic, &memory, 0x33, 25);
        assert_eq!(pixel(&vic, 0x33, 24), PALETTE[0]);
        assert_eq!(pixel(&vic, 0x33, 32), PALETTE[2]);
        assert_eq!(pixel(&vic, 0x33, 40), PALETTE[5]);
        assert_eq!(pixel(&vic, 0x33, 48), PALETTE[6]);
    }

    #[test]
    fn mcm_text_bit3_selects_mode() {
        let kernal = vec![0; 8192];
        let basic = vec![0; 8192];
        let mut chargen = vec![0x00; 4096];
        chargen[0] = 0b1010_1010;
        let mut memory = C64Memory::new(&basic, &kernal, &chargen);
        let mut vic = Vic::new(C64Model::C64Pal);

        vic.write(0x11, 0x1B);
        vic.write(0x16, 0x18);
        vic.write(0x18, 0x14);
        vic.write(0x21, 0x00);
        vic.write(0x22, 0x02);
        vic.write(0x23, 0x05);
        memory.colour_write(0, 0x0F);
        memory.colour_write(1, 0x01);

        run_through(&mut vic, &memory, 0x33, 25);
        // Multicolour cell: pair %10 is $D023.
        assert_eq!(pixel(&vic, 0x33, 24), PALETTE[5]);
        assert_eq!(pixel(&vic, 0x33, 25), PALETTE[5]);
        // Hires cell: alternating white and background.
        assert_eq!(pixel(&vic, 0x33, 32), PALETTE[1]);
        assert_eq!(pixel(&vic, 0x33, 33), PALETTE[0]);
    }

    #[test]
    fn xscroll_shifts_graphics() {
        let (mut vic, mut memory) = make_vic_and_memory(0xFF);
        standard_screen(&mut vic);
        vic.write(0x16, 0x0B);
        memory.colour_write(0, 0x01);
        run_through(&mut vic, &memory, 0x33, 25);
        assert_eq!(pixel(&vic, 0x33, 26), PALETTE[0]);
        assert_eq!(pixel(&vic, 0x33, 27), PALETTE[1]);
        assert_eq!(pixel(&vic, 0x33, 34), PALETTE[1]);
        assert_eq!(pixel(&vic, 0x33, 35), PALETTE[0]);
    }

    #[test]
    fn sprite_mcm_bit_pairs() {
        let (mut vic, mut memory) = make_vic_and_memory(0);
        standard_screen(&mut vic);
        vic.write(0x15, 0x01);
        vic.write(0x1C, 0x01);
        vic.write(0x00, 172);
        vic.write(0x01, 100);
        vic.write(0x25, 0x02);
        vic.write(0x27, 0x05);
        vic.write(0x26, 0x06);
        memory.ram_write(0x07F8, 0x80);
        memory.ram_write(0x2000, 0b01_10_11_00);

        run_through(&mut vic, &memory, 101, 40);
        assert_eq!(pixel(&vic, 101, 172), PALETTE[2]);
        assert_eq!(pixel(&vic, 101, 173), PALETTE[2]);
        assert_eq!(pixel(&vic, 101, 174), PALETTE[5]);
        assert_eq!(pixel(&vic, 101, 176), PALETTE[6]);
        assert_eq!(pixel(&vic, 101, 178), PALETTE[0]);
    }

    #[test]
    fn sprite_sprite_collision() {
        let (mut vic, mut memory) = make_vic_and_memory(0);
        standard_screen(&mut vic);
        vic.write(0x15, 0x03);
        vic.write(0x00, 172);
        vic.write(0x01, 100);
        vic.write(0x02, 180);
        vic.write(0x03, 100);
        vic.write(0x1A, irq::SPRITE_SPRITE);
        memory.ram_write(0x07F8, 0x80);
        memory.ram_write(0x07F9, 0x80);
        memory.ram_write(0x2000, 0xFF);
        memory.ram_write(0x2001, 0xFF);
        memory.ram_write(0x2002, 0xFF);

        run_through(&mut vic, &memory, 101, 40);
        assert!(vic.irq_active());
        assert_eq!(vic.read(0x1E) & 0x03, 0x03);
        assert_eq!(vic.read(0x1E), 0x00);
    }

    #[test]
    fn sprite_bg_collision() {
        let (mut vic, mut memory) = make_vic_and_memory(0xFF);
        standard_screen(&mut vic);
        vic.write(0x15, 0x01);
        vic.write(0x00, 24);
        vic.write(0x01, 0x33);
        memory.ram_write(0x07F8, 0x80);
        memory.ram_write(0x2000, 0xFF);

        run_through(&mut vic, &memory, 0x34, 20);
        assert_eq!(vic.read(0x1F) & 0x01, 0x01);
    }

    #[test]
    fn sprite_behind_foreground() {
        let (mut vic, mut memory) = make_vic_and_memory(0xFF);
        standard_screen(&mut vic);
        vic.write(0x15, 0x01);
        vic.write(0x1B, 0x01);
        vic.write(0x00, 24);
        vic.write(0x01, 0x33);
        vic.write(0x27, 0x02);
        memory.colour_write(0, 0x01);
        memory.ram_write(0x07F8, 0x80);
        memory.ram_write(0x2000, 0xFF);

        run_through(&mut vic, &memory, 0x34, 20);
        assert_eq!(pixel(&vic, 0x34, 24), PALETTE[1]);
    }

    #[test]
    fn snapshot_round_trip() {
        let (mut vic, memory) = make_vic_and_memory(0);
        standard_screen(&mut vic);
        run_through(&mut vic, &memory, 0x40, 30);

        let bytes = emu_core::encode(&vic.save_state()).expect("encodes");

        let mut restored = Vic::new(C64Model::C64Pal);
        restored
            .load_state(emu_core::decode(&bytes).expect("decodes"))
            .expect("valid state");
        assert_eq!(restored.raster_line(), 0x40);
        assert_eq!(restored.raster_cycle(), 31);
        assert_eq!(restored.query("vc"), vic.query("vc"));
    }

    #[test]
    fn snapshot_rejects_bad_raster_line() {
        let mut vic = Vic::new(C64Model::C64Ntsc);
        let mut pal = Vic::new(C64Model::C64Pal);
        pal.raster_line = 300;
        let result = vic.load_state(pal.save_state());
        assert!(matches!(result, Err(StateError::InvalidValue { .. })));
    }

    #[test]
    fn snapshot_rejects_short_register_file() {
        let mut vic = Vic::new(C64Model::C64Pal);
        let mut state = vic.save_state();
        state.regs.truncate(0x2F);
        assert_eq!(
            vic.load_state(state),
            Err(StateError::InvalidLength {
                field: "vic.regs",
                expected: 0x40,
                found: 0x2F
            })
        );
    }
}
