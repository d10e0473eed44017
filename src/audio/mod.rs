mod backend;
mod instrument;
mod voice;

pub use backend::CpalToneSink;
pub use instrument::{SynthConfig, Waveform};
pub use voice::{FLOOR_GAIN, PEAK_GAIN, ToneEnvelope, Voice};

use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

pub fn midi_to_freq(note: u8) -> f32 {
    440.0 * 2.0_f32.powf((note as f32 - 69.0) / 12.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ToneHandle(u64);

impl ToneHandle {
    pub const fn from_raw(id: u64) -> Self {
        Self(id)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToneSinkError {
    #[error("audio backend error: {0}")]
    Backend(String),
    #[error("tone queue is full")]
    QueueFull,
    #[error("tone sink is closed")]
    Closed,
}

/// Something that can sound a single tone and silence it early.
///
/// Cancelling a tone that already ended on its own must succeed.
pub trait ToneSink: Send + Sync {
    fn play(
        &self,
        frequency_hz: f32,
        duration_seconds: f64,
        velocity: u8,
    ) -> Result<ToneHandle, ToneSinkError>;

    fn cancel(&self, handle: ToneHandle) -> Result<(), ToneSinkError>;
}

/// Reports tones through `tracing` instead of sounding them.
#[derive(Debug, Default)]
pub struct LoggingToneSink {
    next_id: AtomicU64,
}

impl LoggingToneSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ToneSink for LoggingToneSink {
    fn play(
        &self,
        frequency_hz: f32,
        duration_seconds: f64,
        velocity: u8,
    ) -> Result<ToneHandle, ToneSinkError> {
        let handle = ToneHandle(self.next_id.fetch_add(1, Ordering::Relaxed));
        tracing::info!(
            tone = handle.0,
            "tone {:.2} Hz for {:.3}s at velocity {}",
            frequency_hz,
            duration_seconds,
            velocity
        );
        Ok(handle)
    }

    fn cancel(&self, handle: ToneHandle) -> Result<(), ToneSinkError> {
        tracing::debug!(tone = handle.0, "tone cancelled");
        Ok(())
    }
}
