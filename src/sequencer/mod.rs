//! # Playback
//!
//! Walks a document in real time: each note or chord is handed to a
//! [`ToneSink`](crate::audio::ToneSink), then the sequencer waits for the
//! item's duration on a [`Clock`](crate::timing::Clock) before moving on.
//!
//! ## States
//! - **Idle** - nothing scheduled; `start` is allowed.
//! - **Running** - exactly one timer is pending at any time, either for the
//!   current item or for the pause between two passes when looping.
//!
//! `stop` cancels the pending timer and every tone still sounding and goes
//! straight back to Idle. Looping runs are capped at [`MAX_CYCLES`] passes.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use chordline::audio::LoggingToneSink;
//! use chordline::document::{Document, NoteEvent};
//! use chordline::sequencer::{NoopListener, Sequencer};
//! use chordline::timing::{ManualClock, Tempo};
//!
//! let mut doc = Document::new();
//! doc.push_note(NoteEvent::new(60, 100, 96).unwrap()).unwrap();
//!
//! let clock = Arc::new(ManualClock::new());
//! let sequencer = Sequencer::new(Arc::new(NoopListener));
//! sequencer
//!     .start(&doc, Tempo::new(120), false, Arc::new(LoggingToneSink::new()), clock.clone())
//!     .unwrap();
//! assert!(sequencer.is_playing());
//!
//! clock.run_until_idle();
//! assert!(!sequencer.is_playing());
//! assert_eq!(sequencer.cycle_count(), 1);
//! ```

mod player;
mod progress;
mod state;

#[cfg(test)]
mod tests;

pub use player::{Sequencer, preview};
pub use progress::{
    ChannelListener, NoopListener, PlaybackUpdate, ProgressListener, RunOutcome, RunSummary,
    StepProgress,
};
pub use state::CancellationToken;

use std::time::Duration;
use thiserror::Error;

/// Passes a looping run may play before it is stopped.
pub const MAX_CYCLES: u32 = 1000;

/// Silence between two passes of a looping run.
pub const INTER_CYCLE_PAUSE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SequencerError {
    #[error("nothing to play: the document is empty")]
    EmptyDocument,
    #[error("playback is already running")]
    AlreadyRunning,
}
