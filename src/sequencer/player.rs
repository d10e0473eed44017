use parking_lot::ReentrantMutex;
use std::cell::RefCell;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::progress::{ProgressListener, RunOutcome, RunSummary, StepProgress};
use super::state::{CancellationToken, PlaybackState, Run, Step};
use super::{INTER_CYCLE_PAUSE, SequencerError};
use crate::audio::{ToneHandle, ToneSink, midi_to_freq};
use crate::document::{Document, SequenceItem};
use crate::timing::{Clock, Tempo};

/// Plays a document through a tone sink, one item per clock step.
///
/// All state sits behind a re-entrant lock: a step holds it while it sounds
/// tones and notifies the listener, so a `stop` from another thread waits for
/// the step to finish, while a `stop` from inside the listener goes through.
pub struct Sequencer {
    shared: Arc<Shared>,
}

struct Shared {
    state: ReentrantMutex<RefCell<PlaybackState>>,
    listener: Arc<dyn ProgressListener>,
}

impl Sequencer {
    pub fn new(listener: Arc<dyn ProgressListener>) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: ReentrantMutex::new(RefCell::new(PlaybackState::new())),
                listener,
            }),
        }
    }

    /// Starts playing `document` from its first item. The first item sounds
    /// before this returns; the rest follow from `clock` callbacks.
    pub fn start(
        &self,
        document: &Document,
        tempo: Tempo,
        loop_enabled: bool,
        sink: Arc<dyn ToneSink>,
        clock: Arc<dyn Clock>,
    ) -> Result<(), SequencerError> {
        let guard = self.shared.state.lock();
        let generation = {
            let mut state = guard.borrow_mut();
            if state.is_playing {
                return Err(SequencerError::AlreadyRunning);
            }
            if document.is_empty() {
                return Err(SequencerError::EmptyDocument);
            }
            let run = Run {
                generation: 0,
                items: document.items().into(),
                tempo,
                sink,
                clock,
                token: CancellationToken::new(),
            };
            state.begin(run, loop_enabled)
        };

        info!(
            items = document.len(),
            looping = loop_enabled,
            "playback started at {}",
            tempo
        );
        self.shared.advance(generation, None);
        Ok(())
    }

    /// Cancels the current run. Returns false, after logging, when nothing
    /// is playing.
    pub fn stop(&self) -> bool {
        self.shared.stop()
    }

    pub fn is_playing(&self) -> bool {
        self.shared.state.lock().borrow().is_playing
    }

    /// Passes started by the current or most recent run.
    pub fn cycle_count(&self) -> u32 {
        self.shared.state.lock().borrow().cycle_count
    }

    pub fn current_index(&self) -> usize {
        self.shared.state.lock().borrow().current_index
    }

    pub fn loop_enabled(&self) -> bool {
        self.shared.state.lock().borrow().loop_enabled
    }

    /// Takes effect at the end of the current pass.
    pub fn set_loop_enabled(&self, enabled: bool) {
        self.shared.state.lock().borrow_mut().loop_enabled = enabled;
    }
}

impl Drop for Sequencer {
    fn drop(&mut self) {
        if self.is_playing() {
            self.shared.stop();
        }
    }
}

impl Shared {
    fn stop(&self) -> bool {
        let guard = self.state.lock();
        let (run, timers, tones) = {
            let mut state = guard.borrow_mut();
            if !state.is_playing {
                warn!("stop requested but nothing is playing");
                return false;
            }
            state.stop_requested = true;
            let timers: Vec<_> = state.pending_timers.drain().map(|(_, h)| h).collect();
            let tones = std::mem::take(&mut state.pending_tones);
            (state.reset_idle(), timers, tones)
        };

        let cycles = guard.borrow().cycle_count;
        if let Some(run) = run {
            run.token.cancel();
            for timer in timers {
                run.clock.cancel(timer);
            }
            for tone in tones {
                if let Err(e) = run.sink.cancel(tone) {
                    warn!(tone = tone.raw(), "failed to cancel tone: {}", e);
                }
            }
        }

        info!(cycles, "playback stopped");
        true
    }

    /// Runs one step of the run identified by `generation`. `ticket` names
    /// the timer that woke us, if any.
    fn advance(self: &Arc<Self>, generation: u64, ticket: Option<u64>) {
        let guard = self.state.lock();
        let (step, run) = {
            let mut state = guard.borrow_mut();
            if !state.is_current(generation) {
                return;
            }
            let Some(run) = state.run.clone() else {
                return;
            };
            if let Some(ticket) = ticket {
                state.pending_timers.remove(&ticket);
                // The previous step's tones have run their full length.
                state.pending_tones.clear();
            }
            (state.next_step(run.items.len(), INTER_CYCLE_PAUSE), run)
        };

        match step {
            Step::Play { index, cycle } => {
                let item = &run.items[index];
                let tones = sound_item(item, run.tempo, run.sink.as_ref());
                guard.borrow_mut().pending_tones.extend(tones);

                debug!(index, cycle, "step");
                self.listener.on_step(&StepProgress {
                    index,
                    total: run.items.len(),
                    cycle,
                });

                // The listener may have stopped us.
                if run.token.is_cancelled() {
                    return;
                }
                self.schedule(&guard, &run, run.tempo.tick_duration(item.duration_ticks()));
            }
            Step::Rest(pause) => {
                debug!("pausing before the next pass");
                self.schedule(&guard, &run, pause);
            }
            Step::Finish(outcome) => {
                let cycles_played = {
                    let mut state = guard.borrow_mut();
                    let timers: Vec<_> = state.pending_timers.drain().map(|(_, h)| h).collect();
                    for timer in timers {
                        run.clock.cancel(timer);
                    }
                    state.reset_idle();
                    state.cycle_count
                };

                let summary = RunSummary {
                    cycles_played,
                    was_stopped: outcome == RunOutcome::LoopLimitExceeded,
                    outcome,
                };
                match outcome {
                    RunOutcome::Completed => info!(cycles_played, "playback finished"),
                    RunOutcome::LoopLimitExceeded => {
                        warn!(cycles_played, "loop limit reached, playback stopped")
                    }
                }
                self.listener.on_finish(&summary);
            }
        }
    }

    fn schedule(self: &Arc<Self>, guard: &RefCell<PlaybackState>, run: &Run, delay: Duration) {
        let ticket = guard.borrow_mut().next_ticket();
        let weak: Weak<Shared> = Arc::downgrade(self);
        let token = run.token.clone();
        let generation = run.generation;

        let handle = run.clock.after(
            delay,
            Box::new(move || {
                if token.is_cancelled() {
                    return;
                }
                if let Some(shared) = weak.upgrade() {
                    shared.advance(generation, Some(ticket));
                }
            }),
        );
        guard.borrow_mut().pending_timers.insert(ticket, handle);
    }
}

fn sound_item(item: &SequenceItem, tempo: Tempo, sink: &dyn ToneSink) -> Vec<ToneHandle> {
    let seconds = tempo.ticks_to_seconds(item.duration_ticks());
    let mut handles = Vec::new();
    let mut play = |pitch: u8, velocity: u8| match sink.play(midi_to_freq(pitch), seconds, velocity) {
        Ok(handle) => handles.push(handle),
        Err(e) => warn!(pitch, "tone skipped: {}", e),
    };

    match item {
        SequenceItem::Note(note) => play(note.pitch, note.velocity),
        SequenceItem::Chord(chord) => {
            for tone in &chord.tones {
                play(tone.pitch, tone.velocity);
            }
        }
    }
    handles
}

/// Sounds one item right away, outside of any run.
pub fn preview(item: &SequenceItem, tempo: Tempo, sink: &dyn ToneSink) -> Vec<ToneHandle> {
    sound_item(item, tempo, sink)
}
