use super::Waveform;

/// Gain of a full-velocity tone at its onset.
pub const PEAK_GAIN: f32 = 0.3;
/// Gain an exponential decay reaches at the end of a tone.
pub const FLOOR_GAIN: f32 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToneEnvelope {
    /// Linear gain at time zero, scaled by velocity.
    pub start: f32,
    /// Seconds
    pub duration: f32,
}

impl ToneEnvelope {
    pub fn new(velocity: u8, duration: f32) -> Self {
        Self {
            start: velocity as f32 / 127.0 * PEAK_GAIN,
            duration,
        }
    }

    /// Exponential ramp from `start` to `FLOOR_GAIN` over the duration,
    /// silent afterwards.
    pub fn level_at(&self, time: f32) -> f32 {
        if time >= self.duration || self.start <= 0.0 {
            return 0.0;
        }
        self.start * (FLOOR_GAIN / self.start).powf(time / self.duration)
    }
}

#[derive(Debug, Clone)]
pub struct Voice {
    pub frequency: f32,
    pub envelope: ToneEnvelope,
    phase: f32,
    elapsed: f32,
}

impl Voice {
    pub fn new(frequency: f32, duration: f32, velocity: u8) -> Self {
        Self {
            frequency,
            envelope: ToneEnvelope::new(velocity, duration),
            phase: 0.0,
            elapsed: 0.0,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.elapsed >= self.envelope.duration
    }

    pub fn render_sample(&mut self, waveform: Waveform, sample_rate: f32) -> f32 {
        if self.is_finished() {
            return 0.0;
        }
        let sample = waveform.sample(self.phase) * self.envelope.level_at(self.elapsed);

        self.phase += self.frequency / sample_rate;
        if self.phase >= 1.0 {
            self.phase -= 1.0;
        }
        self.elapsed += 1.0 / sample_rate;
        sample
    }
}
