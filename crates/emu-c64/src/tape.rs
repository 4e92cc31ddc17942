//! Datasette: plays a TAP image into the CIA1 FLAG input.
//!
//! The deck needs PLAY pressed (cassette sense line on the processor port)
//! and the motor switched on through port bit 5. While both hold, each
//! pulse ends with a falling edge on the read line.

use emu_core::{SaveState, StateError};
use serde::{Deserialize, Serialize};
use log::info;

use crate::tap::TapImage;

/// Virtual datasette.
#[derive(Debug, Clone, Default)]
pub struct Datasette {
    image: Option<TapImage>,
    /// Index of the pulse being played.
    pulse_index: usize,
    /// Cycles left in the current pulse.
    countdown: u32,
    playing: bool,
}

impl Datasette {
    /// An empty deck.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a tape, rewound and stopped.
    pub fn insert(&mut self, image: TapImage) {
        info!("tape inserted: {} pulses", image.pulses().len());
        self.image = Some(image);
        self.rewind();
        self.playing = false;
    }

    /// Remove the tape.
    pub fn eject(&mut self) -> Option<TapImage> {
        self.playing = false;
        self.rewind();
        self.image.take()
    }

    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.image.is_some()
    }

    pub fn rewind(&mut self) {
        self.pulse_index = 0;
        self.countdown = 0;
    }

    /// Press PLAY. Ignored without a tape.
    pub fn play(&mut self) {
        self.playing = self.image.is_some();
    }

    /// Press STOP.
    pub fn stop(&mut self) {
        self.playing = false;
    }

    /// PLAY is held down.
    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Pulses played so far.
    #[must_use]
    pub fn position(&self) -> usize {
        self.pulse_index
    }

    /// The tape has run out.
    #[must_use]
    pub fn at_end(&self) -> bool {
        self.image
            .as_ref()
            .is_none_or(|t| self.pulse_index >= t.pulses().len() && self.countdown == 0)
    }

    /// Advance one CPU cycle. Returns `true` on the cycle a pulse ends,
    /// when the read line falls.
    pub fn tick(&mut self, motor_on: bool) -> bool {
        if !self.playing || !motor_on {
            return false;
        }
        let Some(image) = self.image.as_ref() else {
            return false;
        };
        if self.countdown == 0 {
            let Some(&pulse) = image.pulses().get(self.pulse_index) else {
                return false;
            };
            self.pulse_index += 1;
            self.countdown = pulse.max(1);
        }
        self.countdown -= 1;
        self.countdown == 0
    }
}

/// The tape position. The image itself is not saved; a restored position
/// is clamped to the inserted tape.
/// Transport position of a [`Datasette`]. The tape itself stays in the
/// deck across a restore.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetteState {
    pulse_index: u64,
    countdown: u32,
    playing: bool,
}

impl SaveState for Datasette {
    type State = DatasetteState;

    fn save_state(&self) -> DatasetteState {
        DatasetteState {
            pulse_index: self.pulse_index as u64,
            countdown: self.countdown,
            playing: self.playing,
        }
    }

    fn load_state(&mut self, state: DatasetteState) -> Result<(), StateError> {
        let len = self.image.as_ref().map_or(0, |t| t.pulses().len());
        self.pulse_index = usize::try_from(state.pulse_index).map_or(len, |i| i.min(len));
        self.countdown = if self.image.is_some() { state.countdown } else { 0 };
        self.playing = state.playing && self.image.is_some();
        Ok(())
    }
}
