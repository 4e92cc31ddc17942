//! CIA 6526 Complex Interface Adapter.
//!
//! Two identical CIAs in the C64:
//! - CIA1 ($DC00-$DC0F): keyboard scanning, joystick, Timer A/B → IRQ
//! - CIA2 ($DD00-$DD0F): VIC-II bank, serial bus, Timer A/B → NMI
//!
//! # Registers (per CIA)
//!
//! | Reg | Read               | Write              |
//! |-----|--------------------|--------------------|
//! | $x0 | Port A pins        | Port A data        |
//! | $x1 | Port B pins        | Port B data        |
//! | $x2 | Port A DDR         | Port A DDR         |
//! | $x3 | Port B DDR         | Port B DDR         |
//! | $x4 | Timer A low (cnt)  | Timer A low (latch)|
//! | $x5 | Timer A high (cnt) | Timer A high (latch)|
//! | $x6 | Timer B low (cnt)  | Timer B low (latch)|
//! | $x7 | Timer B high (cnt) | Timer B high (latch)|
//! | $x8 | TOD 10ths          | TOD/alarm 10ths    |
//! | $x9 | TOD seconds        | TOD/alarm seconds  |
//! | $xA | TOD minutes        | TOD/alarm minutes  |
//! | $xB | TOD hours          | TOD/alarm hours    |
//! | $xC | Serial shift reg   | Serial shift reg   |
//! | $xD | ICR (read/clear)   | ICR (set/clear mask)|
//! | $xE | Control reg A      | Control reg A      |
//! | $xF | Control reg B      | Control reg B      |
//!
//! Port reads return the pin levels: the output latch wherever the DDR
//! drives, wired-AND with whatever the outside world pulls low through
//! [`Cia::pins_a`] and [`Cia::pins_b`].

use emu_core::{Observable, SaveState, StateError, Value};
use serde::{Deserialize, Serialize};

/// ICR flag bits.
pub mod icr {
    pub const TIMER_A: u8 = 0x01;
    pub const TIMER_B: u8 = 0x02;
    pub const ALARM: u8 = 0x04;
    pub const SERIAL: u8 = 0x08;
    pub const FLAG: u8 = 0x10;
}

/// Time-of-day clock: BCD tenths, seconds, minutes and hours (bit 7 = PM).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
struct Tod {
    tenths: u8,
    seconds: u8,
    minutes: u8,
    hours: u8,
}

impl Tod {
    fn get(self, index: u8) -> u8 {
        match index {
            0 => self.tenths,
            1 => self.seconds,
            2 => self.minutes,
            _ => self.hours,
        }
    }

    fn set(&mut self, index: u8, value: u8) {
        match index {
            0 => self.tenths = value & 0x0F,
            1 => self.seconds = value & 0x7F,
            2 => self.minutes = value & 0x7F,
            _ => self.hours = value & 0x9F,
        }
    }

    /// Advance by one tenth of a second.
    fn advance(&mut self) {
        self.tenths = (self.tenths + 1) & 0x0F;
        if self.tenths < 10 {
            return;
        }
        self.tenths = 0;
        let (seconds, carry) = bcd_increment(self.seconds, 0x59);
        self.seconds = seconds;
        if !carry {
            return;
        }
        let (minutes, carry) = bcd_increment(self.minutes, 0x59);
        self.minutes = minutes;
        if !carry {
            return;
        }
        let pm = self.hours & 0x80;
        let hour = self.hours & 0x1F;
        self.hours = match hour {
            0x11 => 0x12 | (pm ^ 0x80),
            0x12 => 0x01 | pm,
            _ => bcd_increment(hour, 0x12).0 | pm,
        };
    }
}

/// Increment a two-digit BCD value, wrapping to zero after `max`.
fn bcd_increment(value: u8, max: u8) -> (u8, bool) {
    if value >= max {
        return (0, true);
    }
    let mut lo = (value & 0x0F) + 1;
    let mut hi = value >> 4;
    if lo > 9 {
        lo = 0;
        hi += 1;
    }
    ((hi << 4) | lo, false)
}

/// CIA 6526 instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cia {
    #[serde(skip)]
    label: &'static str,

    /// Port A output register.
    port_a: u8,
    /// Port B output register.
    port_b: u8,
    /// Port A data direction register (1 = output).
    ddr_a: u8,
    /// Port B data direction register (1 = output).
    ddr_b: u8,
    /// External pull-downs on port A (0 = pulled low).
    pub pins_a: u8,
    /// External pull-downs on port B (0 = pulled low).
    pub pins_b: u8,

    timer_a: u16,
    timer_a_latch: u16,
    timer_b: u16,
    timer_b_latch: u16,
    /// Force-load strobes, applied on the next tick.
    force_load_a: bool,
    force_load_b: bool,
    /// PB6/PB7 toggle outputs.
    pb6_toggle: bool,
    pb7_toggle: bool,
    /// PB6/PB7 pulse outputs, high for the cycle after an underflow.
    pb6_pulse: bool,
    pb7_pulse: bool,

    tod: Tod,
    alarm: Tod,
    tod_latch: Tod,
    tod_latched: bool,
    tod_halted: bool,
    /// CPU cycles per mains pulse on the TOD pin.
    tod_period: u32,
    tod_cycle: u32,
    /// Mains pulses since the last tenth.
    tod_pulses: u8,

    sdr: u8,
    /// Timer A underflows left before the shift register has sent its byte.
    sdr_shifts: u8,
    /// A byte written in output mode waiting to be sent.
    sdr_pending: bool,

    /// Interrupt control: status flags (bits 0-4).
    icr_status: u8,
    /// Interrupt control: enable mask (bits 0-4).
    icr_mask: u8,
    /// Last level seen on FLAG.
    flag_level: bool,

    /// Control register A.
    cra: u8,
    /// Control register B.
    crb: u8,
}

impl Cia {
    /// `tod_period` is the number of CPU cycles between mains pulses.
    #[must_use]
    pub fn new(label: &'static str, tod_period: u32) -> Self {
        Self {
            label,
            port_a: 0,
            port_b: 0,
            ddr_a: 0,
            ddr_b: 0,
            pins_a: 0xFF,
            pins_b: 0xFF,
            timer_a: 0xFFFF,
            timer_a_latch: 0xFFFF,
            timer_b: 0xFFFF,
            timer_b_latch: 0xFFFF,
            force_load_a: false,
            force_load_b: false,
            pb6_toggle: false,
            pb7_toggle: false,
            pb6_pulse: false,
            pb7_pulse: false,
            tod: Tod {
                hours: 0x01,
                ..Tod::default()
            },
            alarm: Tod::default(),
            tod_latch: Tod::default(),
            tod_latched: false,
            tod_halted: false,
            tod_period: tod_period.max(1),
            tod_cycle: 0,
            tod_pulses: 0,
            sdr: 0,
            sdr_shifts: 0,
            sdr_pending: false,
            icr_status: 0,
            icr_mask: 0,
            flag_level: true,
            cra: 0,
            crb: 0,
        }
    }

    /// Power-on state. The TOD keeps its divider but restarts at 1:00.
    pub fn reset(&mut self) {
        let pins = (self.pins_a, self.pins_b);
        *self = Self::new(self.label, self.tod_period);
        (self.pins_a, self.pins_b) = pins;
    }

    /// Tick the CIA for one CPU cycle. Returns the ICR bits raised during
    /// this cycle. The interrupt output itself is the level reported by
    /// [`irq_active`](Self::irq_active).
    #[must_use]
    pub fn tick(&mut self) -> u8 {
        let before = self.icr_status;
        self.pb6_pulse = false;
        self.pb7_pulse = false;

        if self.force_load_a {
            self.timer_a = self.timer_a_latch;
            self.force_load_a = false;
        }
        let mut underflow_a = false;
        if self.cra & 0x01 != 0 && self.cra & 0x20 == 0 {
            if self.timer_a == 0 {
                underflow_a = true;
                self.icr_status |= icr::TIMER_A;
                self.timer_a = self.timer_a_latch;
                self.pb6_toggle = !self.pb6_toggle;
                self.pb6_pulse = true;
                if self.cra & 0x08 != 0 {
                    self.cra &= !0x01;
                }
                self.shift_out();
            } else {
                self.timer_a -= 1;
            }
        }

        if self.force_load_b {
            self.timer_b = self.timer_b_latch;
            self.force_load_b = false;
        }
        if self.crb & 0x01 != 0 {
            // CNT is not driven by anything on the C64, so mode %01 never
            // counts and mode %11 behaves like %10.
            let count = match (self.crb >> 5) & 0x03 {
                0b00 => true,
                0b01 => false,
                _ => underflow_a,
            };
            if count {
                if self.timer_b == 0 {
                    self.icr_status |= icr::TIMER_B;
                    self.timer_b = self.timer_b_latch;
                    self.pb7_toggle = !self.pb7_toggle;
                    self.pb7_pulse = true;
                    if self.crb & 0x08 != 0 {
                        self.crb &= !0x01;
                    }
                } else {
                    self.timer_b -= 1;
                }
            }
        }

        self.tod_cycle += 1;
        if self.tod_cycle >= self.tod_period {
            self.tod_cycle = 0;
            self.tod_pulse();
        }

        self.icr_status & !before
    }

    fn shift_out(&mut self) {
        if self.cra & 0x40 == 0 {
            return;
        }
        if self.sdr_shifts == 0 {
            if self.sdr_pending {
                self.sdr_pending = false;
                self.sdr_shifts = 16;
            }
            return;
        }
        self.sdr_shifts -= 1;
        if self.sdr_shifts == 0 {
            self.icr_status |= icr::SERIAL;
            if self.sdr_pending {
                self.sdr_pending = false;
                self.sdr_shifts = 16;
            }
        }
    }

    /// One pulse from the mains-frequency TOD input.
    pub fn tod_pulse(&mut self) {
        if self.tod_halted {
            return;
        }
        self.tod_pulses += 1;
        let divider = if self.cra & 0x80 != 0 { 5 } else { 6 };
        if self.tod_pulses < divider {
            return;
        }
        self.tod_pulses = 0;
        self.tod.advance();
        if self.tod == self.alarm {
            self.icr_status |= icr::ALARM;
        }
    }

    /// Drive the FLAG input. A falling edge sets ICR bit 4.
    pub fn set_flag(&mut self, level: bool) {
        if self.flag_level && !level {
            self.icr_status |= icr::FLAG;
        }
        self.flag_level = level;
    }

    /// Check if the CIA has an active IRQ/NMI.
    #[must_use]
    pub fn irq_active(&self) -> bool {
        (self.icr_status & self.icr_mask & 0x1F) != 0
    }

    fn icr_value(&self) -> u8 {
        let any = if self.irq_active() { 0x80 } else { 0x00 };
        self.icr_status | any
    }

    /// Register value without side effects.
    #[must_use]
    pub fn peek(&self, reg: u8) -> u8 {
        match reg & 0x0F {
            0x00 => self.port_a_output() & self.pins_a,
            0x01 => self.port_b_output() & self.pins_b,
            0x02 => self.ddr_a,
            0x03 => self.ddr_b,
            0x04 => self.timer_a as u8,
            0x05 => (self.timer_a >> 8) as u8,
            0x06 => self.timer_b as u8,
            0x07 => (self.timer_b >> 8) as u8,
            r @ 0x08..=0x0B => {
                let tod = if self.tod_latched {
                    self.tod_latch
                } else {
                    self.tod
                };
                tod.get(r - 0x08)
            }
            0x0C => self.sdr,
            0x0D => self.icr_value(),
            0x0E => self.cra & !0x10,
            _ => self.crb & !0x10,
        }
    }

    /// Read a register. Reading the ICR clears it; reading the TOD hours
    /// latches the clock until the tenths are read.
    pub fn read(&mut self, reg: u8) -> u8 {
        match reg & 0x0F {
            0x08 => {
                let value = self.peek(reg);
                self.tod_latched = false;
                value
            }
            0x0B => {
                if !self.tod_latched {
                    self.tod_latch = self.tod;
                    self.tod_latched = true;
                }
                self.tod_latch.hours
            }
            0x0D => {
                let value = self.icr_value();
                self.icr_status = 0;
                value
            }
            _ => self.peek(reg),
        }
    }

    /// Write a CIA register.
    pub fn write(&mut self, reg: u8, value: u8) {
        match reg & 0x0F {
            0x00 => self.port_a = value,
            0x01 => self.port_b = value,
            0x02 => self.ddr_a = value,
            0x03 => self.ddr_b = value,
            0x04 => {
                self.timer_a_latch = (self.timer_a_latch & 0xFF00) | u16::from(value);
            }
            0x05 => {
                self.timer_a_latch = (self.timer_a_latch & 0x00FF) | (u16::from(value) << 8);
                if self.cra & 0x01 == 0 {
                    self.timer_a = self.timer_a_latch;
                    // One-shot: a high-byte write starts the timer.
                    if self.cra & 0x08 != 0 {
                        self.cra |= 0x01;
                    }
                }
            }
            0x06 => {
                self.timer_b_latch = (self.timer_b_latch & 0xFF00) | u16::from(value);
            }
            0x07 => {
                self.timer_b_latch = (self.timer_b_latch & 0x00FF) | (u16::from(value) << 8);
                if self.crb & 0x01 == 0 {
                    self.timer_b = self.timer_b_latch;
                    if self.crb & 0x08 != 0 {
                        self.crb |= 0x01;
                    }
                }
            }
            r @ 0x08..=0x0B => {
                let index = r - 0x08;
                if self.crb & 0x80 != 0 {
                    self.alarm.set(index, value);
                } else {
                    self.tod.set(index, value);
                    match index {
                        0 => self.tod_halted = false,
                        3 => self.tod_halted = true,
                        _ => {}
                    }
                }
            }
            0x0C => {
                self.sdr = value;
                if self.cra & 0x40 != 0 {
                    self.sdr_pending = true;
                }
            }
            0x0D => {
                if value & 0x80 != 0 {
                    self.icr_mask |= value & 0x1F;
                } else {
                    self.icr_mask &= !(value & 0x1F);
                }
            }
            0x0E => {
                if value & 0x01 != 0 && self.cra & 0x01 == 0 {
                    self.pb6_toggle = true;
                }
                if value & 0x10 != 0 {
                    self.force_load_a = true;
                }
                if (value ^ self.cra) & 0x40 != 0 {
                    self.sdr_shifts = 0;
                    self.sdr_pending = false;
                }
                self.cra = value & !0x10;
            }
            _ => {
                if value & 0x01 != 0 && self.crb & 0x01 == 0 {
                    self.pb7_toggle = true;
                }
                if value & 0x10 != 0 {
                    self.force_load_b = true;
                }
                self.crb = value & !0x10;
            }
        }
    }

    /// Port A as driven by the CIA: output bits from the latch, inputs
    /// float high.
    #[must_use]
    pub fn port_a_output(&self) -> u8 {
        (self.port_a & self.ddr_a) | !self.ddr_a
    }

    /// Port B as driven by the CIA, including timer outputs on PB6/PB7.
    #[must_use]
    pub fn port_b_output(&self) -> u8 {
        let mut value = (self.port_b & self.ddr_b) | !self.ddr_b;
        if self.cra & 0x02 != 0 {
            let high = if self.cra & 0x04 != 0 {
                self.pb6_toggle
            } else {
                self.pb6_pulse
            };
            value = (value & !0x40) | if high { 0x40 } else { 0 };
        }
        if self.crb & 0x02 != 0 {
            let high = if self.crb & 0x04 != 0 {
                self.pb7_toggle
            } else {
                self.pb7_pulse
            };
            value = (value & !0x80) | if high { 0x80 } else { 0 };
        }
        value
    }

    #[must_use]
    pub fn label(&self) -> &'static str {
        self.label
    }

    #[must_use]
    pub fn timer_a(&self) -> u16 {
        self.timer_a
    }

    #[must_use]
    pub fn timer_b(&self) -> u16 {
        self.timer_b
    }

    #[must_use]
    pub fn icr_status(&self) -> u8 {
        self.icr_status
    }

    #[must_use]
    pub fn icr_mask(&self) -> u8 {
        self.icr_mask
    }
}

/// A CIA's snapshot image is the chip itself. The label and the mains
/// period belong to the machine and survive a restore.
pub type CiaState = Cia;

impl SaveState for Cia {
    type State = Self;

    fn save_state(&self) -> Self {
        self.clone()
    }

    fn load_state(&mut self, state: Self) -> Result<(), StateError> {
        if state.tod_cycle >= self.tod_period {
            return Err(StateError::InvalidValue {
                field: "cia.tod_cycle",
                value: u64::from(state.tod_cycle),
            });
        }
        *self = Self {
            label: self.label,
            tod_period: self.tod_period,
            icr_status: state.icr_status & 0x1F,
            icr_mask: state.icr_mask & 0x1F,
            ..state
        };
        Ok(())
    }
}

impl Observable for Cia {
    fn query(&self, path: &str) -> Option<Value> {
        match path {
            "port_a" => Some(self.peek(0x00).into()),
            "port_b" => Some(self.peek(0x01).into()),
            "ddra" => Some(self.ddr_a.into()),
            "ddrb" => Some(self.ddr_b.into()),
            "timer_a" => Some(self.timer_a.into()),
            "timer_a_latch" => Some(self.timer_a_latch.into()),
            "timer_b" => Some(self.timer_b.into()),
            "timer_b_latch" => Some(self.timer_b_latch.into()),
            "tod" => Some(Value::Bytes(vec![
                self.tod.hours,
                self.tod.minutes,
                self.tod.seconds,
                self.tod.tenths,
            ])),
            "icr_status" => Some(self.icr_status.into()),
            "icr_mask" => Some(self.icr_mask.into()),
            "cra" => Some(self.cra.into()),
            "crb" => Some(self.crb.into()),
            "irq" => Some(self.irq_active().into()),
            "registers" => Some(Value::Bytes((0..16).map(|r| self.peek(r)).collect())),
            _ => None,
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        &[
            "port_a",
            "port_b",
            "ddra",
            "ddrb",
            "timer_a",
            "timer_a_latch",
            "timer_b",
            "timer_b_latch",
            "tod",
            "icr_status",
            "icr_mask",
            "cra",
            "crb",
            "irq",
            "registers",
        ]
    }
}
