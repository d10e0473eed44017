use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Pulses per quarter note. Also written as the division field of exported
/// MIDI files.
pub const PPQ: u32 = 96;

/// Tempo in beats (quarter notes) per minute.
///
/// `bpm` must lie in `MIN_BPM..=60_000_000`: below [`Tempo::MIN_BPM`] the
/// microseconds-per-quarter value no longer fits the 24-bit MIDI tempo field
/// and the encoder keeps only its low 24 bits. Project files and the CLI
/// reject such tempos; `Tempo::new` itself does not check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tempo {
    bpm: u32,
}

impl Tempo {
    pub const DEFAULT_BPM: u32 = 120;
    /// Slowest tempo whose microseconds per quarter fit in 24 bits.
    pub const MIN_BPM: u32 = 4;

    pub const fn new(bpm: u32) -> Self {
        Self { bpm }
    }

    pub fn bpm(self) -> u32 {
        self.bpm
    }

    pub fn quarter_note_seconds(self) -> f64 {
        60.0 / self.bpm as f64
    }

    pub fn ticks_to_seconds(self, ticks: u32) -> f64 {
        (ticks as f64 / PPQ as f64) * self.quarter_note_seconds()
    }

    pub fn tick_duration(self, ticks: u32) -> Duration {
        Duration::from_secs_f64(self.ticks_to_seconds(ticks))
    }

    pub fn microseconds_per_quarter(self) -> u32 {
        60_000_000 / self.bpm
    }
}

impl Default for Tempo {
    fn default() -> Self {
        Self::new(Self::DEFAULT_BPM)
    }
}

impl fmt::Display for Tempo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} BPM", self.bpm)
    }
}
