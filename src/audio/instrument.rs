use serde::{Deserialize, Serialize};
use std::f32::consts::PI;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Waveform {
    #[default]
    Sine,
    Square,
    Sawtooth,
    Triangle,
}

impl Waveform {
    /// One sample at `phase` in `[0, 1)`, in `[-1, 1]`.
    pub fn sample(self, phase: f32) -> f32 {
        match self {
            Waveform::Sine => (phase * 2.0 * PI).sin(),
            Waveform::Square => {
                if phase < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
            Waveform::Sawtooth => phase * 2.0 - 1.0,
            Waveform::Triangle => 1.0 - 4.0 * (phase - 0.5).abs(),
        }
    }
}

/// Settings the audio thread reads on every buffer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthConfig {
    pub waveform: Waveform,
    pub volume: f32,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            waveform: Waveform::Sine,
            volume: 1.0,
        }
    }
}
