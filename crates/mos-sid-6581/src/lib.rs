//! MOS 6581/8580 SID (Sound Interface Device) emulator.
//!
//! The SID has three voices, each with a 24-bit phase-accumulator oscillator,
//! four waveform generators, an ADSR envelope, and a shared multi-mode
//! state-variable filter. Everything ticks at the CPU rate; a
//! [`RateConverter`] picks the cycles on which an output sample is taken.
//!
//! # Register map (29 registers, $D400-$D41C)
//!
//! | Addr | Register          |
//! |------|-------------------|
//! | $00  | Voice 1 freq lo   |
//! | $01  | Voice 1 freq hi   |
//! | $02  | Voice 1 PW lo     |
//! | $03  | Voice 1 PW hi     |
//! | $04  | Voice 1 control   |
//! | $05  | Voice 1 AD        |
//! | $06  | Voice 1 SR        |
//! | $07-$0D | Voice 2 (same layout) |
//! | $0E-$14 | Voice 3 (same layout) |
//! | $15  | Filter cutoff lo  |
//! | $16  | Filter cutoff hi  |
//! | $17  | Filter routing + resonance |
//! | $18  | Volume + filter mode |
//! | $19  | Paddle X (read-only) |
//! | $1A  | Paddle Y (read-only) |
//! | $1B  | OSC3 output (read-only) |
//! | $1C  | ENV3 output (read-only) |

mod envelope;
mod filter;
mod resample;
mod voice;

use emu_core::{Observable, SaveState, StateError, Value};
use serde::{Deserialize, Serialize};

pub use envelope::{Envelope, Phase};
pub use filter::Filter;
pub use resample::RateConverter;
pub use voice::Voice;

/// Cycles a value written to the bus stays readable from a write-only
/// register before the data lines float back to zero.
const BUS_VALUE_TTL: u32 = 0x2000;

/// Chip revision. The filter curves differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SidModel {
    #[default]
    Mos6581,
    Mos8580,
}

/// MOS 6581/8580 SID chip.
#[derive(Debug, Clone)]
pub struct Sid6581 {
    /// Three voices.
    pub voices: [Voice; 3],
    /// Three envelope generators (one per voice).
    pub envelopes: [Envelope; 3],
    /// Multi-mode filter.
    pub filter: Filter,
    /// 4-bit master volume (0-15).
    pub volume: u8,
    /// Voice 3 mute (bit 7 of $D418): voice 3 leaves the mix but keeps
    /// running as a modulation source.
    pub voice3_off: bool,

    model: SidModel,

    /// Last value driven on the data bus and how long it lingers.
    bus_value: u8,
    bus_value_ttl: u32,

    /// POTX/POTY as latched from the selected paddle pair.
    pot_x: u8,
    pot_y: u8,

    converter: RateConverter,
    /// Output samples waiting to be drained.
    buffer: Vec<i16>,
}

impl Sid6581 {
    /// Create a new SID chip.
    ///
    /// `cpu_frequency` is the master clock rate in Hz (985,248 for PAL C64).
    /// `output_sample_rate` is the audio output rate in Hz (typically 48,000).
    #[must_use]
    pub fn new(model: SidModel, cpu_frequency: u32, output_sample_rate: u32) -> Self {
        Self {
            voices: [Voice::new(), Voice::new(), Voice::new()],
            envelopes: [Envelope::new(), Envelope::new(), Envelope::new()],
            filter: Filter::new(model),
            volume: 0,
            voice3_off: false,
            model,
            bus_value: 0,
            bus_value_ttl: 0,
            pot_x: 0xFF,
            pot_y: 0xFF,
            converter: RateConverter::new(cpu_frequency, output_sample_rate),
            buffer: Vec::with_capacity(output_sample_rate as usize / 50 + 1),
        }
    }

    #[must_use]
    pub fn model(&self) -> SidModel {
        self.model
    }

    pub fn set_model(&mut self, model: SidModel) {
        self.model = model;
        self.filter.set_model(model);
    }

    /// Power-on state. Keeps model, clock and sample rate; pending samples
    /// are discarded.
    pub fn reset(&mut self) {
        let (clock_hz, sample_rate) = (self.converter.clock_hz(), self.converter.sample_rate());
        let (pot_x, pot_y) = (self.pot_x, self.pot_y);
        *self = Self::new(self.model, clock_hz, sample_rate);
        self.pot_x = pot_x;
        self.pot_y = pot_y;
    }

    /// Latch paddle positions for POTX/POTY.
    pub fn set_paddles(&mut self, x: u8, y: u8) {
        self.pot_x = x;
        self.pot_y = y;
    }

    /// Read a SID register (addr 0x00-0x1F).
    ///
    /// Write-only registers return the last value written to the chip,
    /// until it fades from the bus.
    #[must_use]
    pub fn read(&self, addr: u8) -> u8 {
        match addr & 0x1F {
            0x19 => self.pot_x,
            0x1A => self.pot_y,
            // OSC3: top 8 bits of voice 3 waveform output
            0x1B => (self.voices[2].waveform_output(self.voices[1].msb()) >> 4) as u8,
            // ENV3: voice 3 envelope level
            0x1C => self.envelopes[2].level,
            _ => {
                if self.bus_value_ttl > 0 {
                    self.bus_value
                } else {
                    0
                }
            }
        }
    }

    /// Write a SID register (addr 0x00-0x1F).
    pub fn write(&mut self, addr: u8, value: u8) {
        self.bus_value = value;
        self.bus_value_ttl = BUS_VALUE_TTL;

        let reg = addr & 0x1F;
        match reg {
            0x00..=0x14 => {
                let n = usize::from(reg / 7);
                let voice = &mut self.voices[n];
                let envelope = &mut self.envelopes[n];
                match reg % 7 {
                    0 => voice.frequency = (voice.frequency & 0xFF00) | u16::from(value),
                    1 => voice.frequency = (voice.frequency & 0x00FF) | (u16::from(value) << 8),
                    2 => voice.pulse_width = (voice.pulse_width & 0x0F00) | u16::from(value),
                    3 => {
                        voice.pulse_width =
                            (voice.pulse_width & 0x00FF) | ((u16::from(value) & 0x0F) << 8);
                    }
                    4 => voice.control = value,
                    5 => {
                        envelope.attack = value >> 4;
                        envelope.decay = value & 0x0F;
                    }
                    _ => {
                        envelope.sustain = value >> 4;
                        envelope.release = value & 0x0F;
                    }
                }
            }
            // Filter cutoff lo (bits 0-2 only)
            0x15 => {
                self.filter.cutoff = (self.filter.cutoff & 0x7F8) | u16::from(value & 0x07);
            }
            // Filter cutoff hi (bits 3-10)
            0x16 => {
                self.filter.cutoff = (self.filter.cutoff & 0x007) | (u16::from(value) << 3);
            }
            // Filter routing ($D417): resonance (hi nibble), routing (lo nibble)
            0x17 => {
                self.filter.resonance = value >> 4;
                self.filter.routing = value & 0x07;
                self.filter.ext_in = value & 0x08 != 0;
            }
            // Volume + filter mode ($D418)
            0x18 => {
                self.volume = value & 0x0F;
                self.filter.mode = value & 0x70;
                self.voice3_off = value & 0x80 != 0;
            }
            // $19-$1F: read-only, writes only touch the bus value
            _ => {}
        }
    }

    /// Ring modulation / sync source for each voice: the previous voice.
    const SOURCE: [usize; 3] = [2, 0, 1];

    /// Tick the SID one CPU cycle.
    ///
    /// Clocks all three oscillators, applies sync, clocks the envelopes
    /// and the filter, and records an output sample when one is due.
    pub fn tick(&mut self) {
        let prev_msb = [
            self.voices[0].msb(),
            self.voices[1].msb(),
            self.voices[2].msb(),
        ];

        for voice in &mut self.voices {
            voice.clock_accumulator();
            voice.clock_noise();
        }

        // Hard sync: voice 3 -> 1, 1 -> 2, 2 -> 3
        for i in 0..3 {
            let src = Self::SOURCE[i];
            let curr = self.voices[src].msb();
            self.voices[i].apply_sync(prev_msb[src], curr);
        }

        for (voice, envelope) in self.voices.iter().zip(self.envelopes.iter_mut()) {
            envelope.clock(voice.gate());
        }

        let (filtered, _) = self.voice_mix();
        self.filter.clock(filtered);

        self.bus_value_ttl = self.bus_value_ttl.saturating_sub(1);

        if self.converter.clock() {
            let sample = self.read_sample();
            self.buffer.push(sample);
        }
    }

    /// Voice amplitudes summed into (filter input, direct path).
    fn voice_mix(&self) -> (f32, f32) {
        let mut filtered_sum = 0.0;
        let mut direct_sum = 0.0;

        for i in 0..3 {
            let ring_msb = self.voices[Self::SOURCE[i]].msb();
            let waveform = self.voices[i].waveform_output(ring_msb);

            // Centre the 12-bit waveform around 0 (-2048..+2047), scale by envelope
            let centred = f32::from(waveform.cast_signed() - 2048);
            let amplitude = centred * f32::from(self.envelopes[i].level) / 255.0;

            if self.filter.voice_routed(i) {
                filtered_sum += amplitude;
            } else if !(i == 2 && self.voice3_off) {
                direct_sum += amplitude;
            }
        }
        (filtered_sum, direct_sum)
    }

    /// The chip's current output as a signed 16-bit sample.
    ///
    /// Pure: it reads oscillator, envelope and filter state and changes
    /// nothing, so it can be called any number of times per cycle.
    #[must_use]
    pub fn read_sample(&self) -> i16 {
        let (_, direct) = self.voice_mix();
        let mixed = (self.filter.output() + direct) * f32::from(self.volume) / 15.0;
        // 3 voices x 2048 peak amplitude
        let normalised = mixed / 6144.0;
        (normalised.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16
    }

    /// Take the audio output buffer (drains it).
    pub fn take_samples(&mut self) -> Vec<i16> {
        std::mem::take(&mut self.buffer)
    }

    /// Number of samples in the output buffer.
    #[must_use]
    pub fn samples_len(&self) -> usize {
        self.buffer.len()
    }

    #[must_use]
    pub fn sample_rate(&self) -> u32 {
        self.converter.sample_rate()
    }
}

/// Snapshot image of a [`Sid6581`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SidState {
    voices: [Voice; 3],
    envelopes: [Envelope; 3],
    filter: Filter,
    volume: u8,
    voice3_off: bool,
    bus_value: u8,
    bus_value_ttl: u32,
    pot_x: u8,
    pot_y: u8,
    resampler: u32,
}

impl SaveState for Sid6581 {
    type State = SidState;

    fn save_state(&self) -> SidState {
        SidState {
            voices: self.voices.clone(),
            envelopes: self.envelopes.clone(),
            filter: self.filter.save_state(),
            volume: self.volume,
            voice3_off: self.voice3_off,
            bus_value: self.bus_value,
            bus_value_ttl: self.bus_value_ttl,
            pot_x: self.pot_x,
            pot_y: self.pot_y,
            resampler: self.converter.save_state(),
        }
    }

    /// Pending output samples are not part of the state and are dropped.
    fn load_state(&mut self, state: SidState) -> Result<(), StateError> {
        for (voice, saved) in self.voices.iter_mut().zip(state.voices) {
            voice.load_state(saved)?;
        }
        for (envelope, saved) in self.envelopes.iter_mut().zip(state.envelopes) {
            envelope.load_state(saved)?;
        }
        self.filter.load_state(state.filter)?;
        self.volume = state.volume & 0x0F;
        self.voice3_off = state.voice3_off;
        self.bus_value = state.bus_value;
        self.bus_value_ttl = state.bus_value_ttl;
        self.pot_x = state.pot_x;
        self.pot_y = state.pot_y;
        self.converter.load_state(state.resampler)?;
        self.buffer.clear();
        Ok(())
    }
}

impl Observable for Sid6581 {
    fn query(&self, path: &str) -> Option<Value> {
        if let Some(rest) = path.strip_prefix("voice") {
            let (n, field) = rest.split_once('.')?;
            let n: usize = n.parse().ok()?;
            let i = n.checked_sub(1).filter(|&i| i < 3)?;
            let voice = &self.voices[i];
            let envelope = &self.envelopes[i];
            return match field {
                "frequency" => Some(voice.frequency.into()),
                "pulse_width" => Some(voice.pulse_width.into()),
                "control" => Some(voice.control.into()),
                "accumulator" => Some(voice.accumulator.into()),
                "envelope" => Some(envelope.level.into()),
                "phase" => Some(format!("{:?}", envelope.phase).into()),
                _ => None,
            };
        }
        match path {
            "volume" => Some(self.volume.into()),
            "filter.cutoff" => Some(self.filter.cutoff.into()),
            "filter.resonance" => Some(self.filter.resonance.into()),
            "filter.mode" => Some(self.filter.mode.into()),
            "filter.routing" => Some(self.filter.routing.into()),
            "model" => Some(format!("{:?}", self.model).into()),
            "sample" => Some(self.read_sample().into()),
            "osc3" => Some(self.read(0x1B).into()),
            "env3" => Some(self.read(0x1C).into()),
            _ => None,
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        &[
            "voice<n>.frequency",
            "voice<n>.pulse_width",
            "voice<n>.control",
            "voice<n>.accumulator",
            "voice<n>.envelope",
            "voice<n>.phase",
            "volume",
            "filter.cutoff",
            "filter.resonance",
            "filter.mode",
            "filter.routing",
            "model",
            "sample",
            "osc3",
            "env3",
        ]
    }
}
