use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use super::{MAX_CYCLES, RunOutcome};
use crate::audio::{ToneHandle, ToneSink};
use crate::document::SequenceItem;
use crate::timing::{Clock, Tempo, TimerHandle};

/// Shared stop flag for one playback run. Timer callbacks check it before
/// touching any sequencer state.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Everything a run needs that does not change while it plays.
#[derive(Clone)]
pub(crate) struct Run {
    pub generation: u64,
    pub items: Arc<[SequenceItem]>,
    pub tempo: Tempo,
    pub sink: Arc<dyn ToneSink>,
    pub clock: Arc<dyn Clock>,
    pub token: CancellationToken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Cursor {
    /// About to begin a pass over the document.
    CycleStart,
    /// Next item to sound.
    Item(usize),
    /// Inside the pause between two passes.
    Resting,
}

/// What the step function does next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Step {
    Play { index: usize, cycle: u32 },
    Rest(Duration),
    Finish(RunOutcome),
}

pub(crate) struct PlaybackState {
    pub is_playing: bool,
    /// Set by `stop` and kept after the run goes idle, so it tells whether
    /// the last run was cut short. Cleared when the next run begins.
    pub stop_requested: bool,
    pub loop_enabled: bool,
    pub cycle_count: u32,
    pub current_index: usize,
    pub pending_timers: HashMap<u64, TimerHandle>,
    pub pending_tones: Vec<ToneHandle>,
    pub cursor: Cursor,
    pub generation: u64,
    pub run: Option<Run>,
    next_ticket: u64,
}

impl PlaybackState {
    pub fn new() -> Self {
        Self {
            is_playing: false,
            stop_requested: false,
            loop_enabled: false,
            cycle_count: 0,
            current_index: 0,
            pending_timers: HashMap::new(),
            pending_tones: Vec::new(),
            cursor: Cursor::CycleStart,
            generation: 0,
            run: None,
            next_ticket: 0,
        }
    }

    /// Enters the running state for a new run and returns its generation.
    pub fn begin(&mut self, mut run: Run, loop_enabled: bool) -> u64 {
        self.generation += 1;
        run.generation = self.generation;
        self.is_playing = true;
        self.stop_requested = false;
        self.loop_enabled = loop_enabled;
        self.cycle_count = 0;
        self.current_index = 0;
        self.cursor = Cursor::CycleStart;
        self.run = Some(run);
        self.generation
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.is_playing && self.generation == generation
    }

    pub fn next_ticket(&mut self) -> u64 {
        self.next_ticket += 1;
        self.next_ticket
    }

    /// Advances the cursor to the next observable action.
    pub fn next_step(&mut self, len: usize, rest: Duration) -> Step {
        loop {
            match self.cursor {
                Cursor::CycleStart => {
                    if self.cycle_count >= MAX_CYCLES {
                        return Step::Finish(RunOutcome::LoopLimitExceeded);
                    }
                    self.cycle_count += 1;
                    self.cursor = Cursor::Item(0);
                }
                Cursor::Item(index) if index < len => {
                    self.current_index = index;
                    self.cursor = Cursor::Item(index + 1);
                    return Step::Play {
                        index,
                        cycle: self.cycle_count,
                    };
                }
                Cursor::Item(_) => {
                    if !self.loop_enabled {
                        return Step::Finish(RunOutcome::Completed);
                    }
                    self.cursor = Cursor::Resting;
                    return Step::Rest(rest);
                }
                Cursor::Resting => {
                    if !self.loop_enabled {
                        return Step::Finish(RunOutcome::Completed);
                    }
                    self.cursor = Cursor::CycleStart;
                }
            }
        }
    }

    /// Drops the run and empties both pending sets. The cycle count is kept
    /// so it can be read after the run ends.
    pub fn reset_idle(&mut self) -> Option<Run> {
        self.is_playing = false;
        self.current_index = 0;
        self.cursor = Cursor::CycleStart;
        self.pending_timers.clear();
        self.pending_tones.clear();
        self.run.take()
    }
}
