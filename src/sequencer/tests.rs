use super::*;
use crate::audio::{ToneHandle, ToneSink, ToneSinkError, midi_to_freq};
use crate::document::{ChordEvent, ChordTone, Document, NoteEvent, SequenceItem};
use crate::timing::{Clock, ManualClock, Tempo, ThreadClock, TimerCallback, TimerHandle};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;

#[derive(Default)]
struct RecordingSink {
    played: Mutex<Vec<(ToneHandle, f32, f64, u8)>>,
    cancelled: Mutex<Vec<ToneHandle>>,
    next_id: AtomicU64,
    failing_velocity: Option<u8>,
    fail_cancel: bool,
}

impl RecordingSink {
    fn played_count(&self) -> usize {
        self.played.lock().len()
    }

    fn handles(&self) -> Vec<ToneHandle> {
        self.played.lock().iter().map(|p| p.0).collect()
    }
}

impl ToneSink for RecordingSink {
    fn play(
        &self,
        frequency_hz: f32,
        duration_seconds: f64,
        velocity: u8,
    ) -> Result<ToneHandle, ToneSinkError> {
        if self.failing_velocity == Some(velocity) {
            return Err(ToneSinkError::Backend("device unplugged".into()));
        }
        let handle = ToneHandle::from_raw(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.played
            .lock()
            .push((handle, frequency_hz, duration_seconds, velocity));
        Ok(handle)
    }

    fn cancel(&self, handle: ToneHandle) -> Result<(), ToneSinkError> {
        self.cancelled.lock().push(handle);
        if self.fail_cancel {
            return Err(ToneSinkError::Closed);
        }
        Ok(())
    }
}

#[derive(Default)]
struct RecordingListener {
    steps: Mutex<Vec<StepProgress>>,
    finishes: Mutex<Vec<RunSummary>>,
    stop_after: Option<usize>,
    sequencer: OnceLock<Weak<Sequencer>>,
}

impl ProgressListener for RecordingListener {
    fn on_step(&self, progress: &StepProgress) {
        let seen = {
            let mut steps = self.steps.lock();
            steps.push(*progress);
            steps.len()
        };
        if self.stop_after == Some(seen) {
            if let Some(sequencer) = self.sequencer.get().and_then(Weak::upgrade) {
                assert!(sequencer.stop());
            }
        }
    }

    fn on_finish(&self, summary: &RunSummary) {
        self.finishes.lock().push(*summary);
    }
}

fn note(pitch: u8, velocity: u8, duration_ticks: u32) -> NoteEvent {
    NoteEvent {
        pitch,
        velocity,
        duration_ticks,
    }
}

fn chord(pitches: &[u8], duration_ticks: u32) -> ChordEvent {
    ChordEvent {
        tones: pitches
            .iter()
            .map(|&pitch| ChordTone {
                pitch,
                velocity: 90,
            })
            .collect(),
        duration_ticks,
    }
}

fn scale(len: u8) -> Document {
    let mut doc = Document::new();
    for i in 0..len {
        doc.push_note(note(60 + i, 100, 96)).unwrap();
    }
    doc
}

/// Keeps every callback for the test to run by hand and ignores `cancel`,
/// like a timer thread that already took a callback off its queue.
#[derive(Default)]
struct HeldClock {
    callbacks: Mutex<Vec<TimerCallback>>,
    next_id: AtomicU64,
}

impl HeldClock {
    fn take(&self) -> Vec<TimerCallback> {
        std::mem::take(&mut *self.callbacks.lock())
    }
}

impl Clock for HeldClock {
    fn after(&self, _delay: Duration, callback: TimerCallback) -> TimerHandle {
        self.callbacks.lock().push(callback);
        TimerHandle::from_raw(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    fn cancel(&self, _handle: TimerHandle) {}
}

struct Rig {
    sequencer: Arc<Sequencer>,
    listener: Arc<RecordingListener>,
    sink: Arc<RecordingSink>,
    clock: Arc<ManualClock>,
}

impl Rig {
    fn new() -> Self {
        Self::with(RecordingListener::default(), RecordingSink::default())
    }

    fn with(listener: RecordingListener, sink: RecordingSink) -> Self {
        let listener = Arc::new(listener);
        let sequencer = Arc::new(Sequencer::new(listener.clone()));
        let _ = listener.sequencer.set(Arc::downgrade(&sequencer));
        Self {
            sequencer,
            listener,
            sink: Arc::new(sink),
            clock: Arc::new(ManualClock::new()),
        }
    }

    fn start(&self, doc: &Document, looping: bool) -> Result<(), SequencerError> {
        self.sequencer.start(
            doc,
            Tempo::new(120),
            looping,
            self.sink.clone(),
            self.clock.clone(),
        )
    }

    fn steps(&self) -> Vec<StepProgress> {
        self.listener.steps.lock().clone()
    }

    fn finishes(&self) -> Vec<RunSummary> {
        self.listener.finishes.lock().clone()
    }
}

#[test]
fn empty_document_is_rejected_without_state_change() {
    let rig = Rig::new();
    assert_eq!(
        rig.start(&Document::new(), false),
        Err(SequencerError::EmptyDocument)
    );
    assert!(!rig.sequencer.is_playing());
    assert_eq!(rig.sequencer.cycle_count(), 0);
    assert_eq!(rig.clock.pending(), 0);
    assert!(rig.steps().is_empty());
}

#[test]
fn second_start_is_rejected_while_running() {
    let rig = Rig::new();
    rig.start(&scale(3), false).unwrap();
    assert_eq!(rig.start(&scale(1), true), Err(SequencerError::AlreadyRunning));
    assert!(rig.sequencer.is_playing());
    assert!(!rig.sequencer.loop_enabled());
    assert_eq!(rig.steps().len(), 1);
}

#[test]
fn first_item_sounds_before_start_returns() {
    let rig = Rig::new();
    rig.start(&scale(2), false).unwrap();
    assert_eq!(rig.sink.played_count(), 1);
    assert_eq!(
        rig.steps(),
        vec![StepProgress {
            index: 0,
            total: 2,
            cycle: 1
        }]
    );
    assert_eq!(rig.clock.pending(), 1);
    assert_eq!(rig.sequencer.current_index(), 0);
}

#[test]
fn single_pass_reports_every_item_and_one_completion() {
    let rig = Rig::new();
    let mut doc = Document::new();
    doc.push_note(note(60, 100, 96)).unwrap();
    doc.push_chord(chord(&[60, 64, 67], 192)).unwrap();
    doc.push_note(note(72, 110, 96)).unwrap();

    rig.start(&doc, false).unwrap();
    rig.clock.run_until_idle();

    let steps = rig.steps();
    assert_eq!(steps.len(), 3);
    for (i, step) in steps.iter().enumerate() {
        assert_eq!(step.index, i);
        assert_eq!(step.total, 3);
        assert_eq!(step.cycle, 1);
    }
    assert_eq!(
        rig.finishes(),
        vec![RunSummary {
            cycles_played: 1,
            was_stopped: false,
            outcome: RunOutcome::Completed,
        }]
    );
    assert_eq!(rig.sink.played_count(), 5);
    assert_eq!(rig.clock.now(), Duration::from_secs(2));
    assert!(!rig.sequencer.is_playing());
    assert_eq!(rig.sequencer.cycle_count(), 1);
}

#[test]
fn tones_use_pitch_frequency_velocity_and_tempo() {
    let rig = Rig::new();
    let mut doc = Document::new();
    doc.push_chord(chord(&[60, 64], 192)).unwrap();
    rig.start(&doc, false).unwrap();

    let played = rig.sink.played.lock().clone();
    assert_eq!(played.len(), 2);
    assert_eq!(played[0].1, midi_to_freq(60));
    assert_eq!(played[1].1, midi_to_freq(64));
    assert!(played.iter().all(|p| p.2 == 1.0 && p.3 == 90));
}

#[test]
fn stop_cancels_timer_and_sounding_tones() {
    let rig = Rig::new();
    let mut doc = Document::new();
    doc.push_chord(chord(&[48, 52, 55], 384)).unwrap();
    doc.push_note(note(60, 100, 96)).unwrap();

    rig.start(&doc, false).unwrap();
    let sounding = rig.sink.handles();
    assert_eq!(sounding.len(), 3);

    assert!(rig.sequencer.stop());
    assert!(!rig.sequencer.is_playing());
    assert_eq!(*rig.sink.cancelled.lock(), sounding);
    assert_eq!(rig.clock.pending(), 0);

    assert_eq!(rig.clock.run_until_idle(), 0);
    assert_eq!(rig.sink.played_count(), 3);
    assert_eq!(rig.steps().len(), 1);
    assert!(rig.finishes().is_empty());
}

#[test]
fn stop_while_idle_is_a_no_op() {
    let rig = Rig::new();
    assert!(!rig.sequencer.stop());
    rig.start(&scale(1), false).unwrap();
    rig.clock.run_until_idle();
    assert!(!rig.sequencer.stop());
    assert_eq!(rig.finishes().len(), 1);
}

#[test]
fn stop_from_progress_callback_ends_the_run() {
    let listener = RecordingListener {
        stop_after: Some(2),
        ..Default::default()
    };
    let rig = Rig::with(listener, RecordingSink::default());
    rig.start(&scale(5), false).unwrap();
    rig.clock.run_until_idle();

    assert_eq!(rig.steps().len(), 2);
    assert_eq!(rig.sink.played_count(), 2);
    assert_eq!(rig.sink.cancelled.lock().len(), 1);
    assert!(rig.finishes().is_empty());
    assert!(!rig.sequencer.is_playing());
    assert_eq!(rig.clock.pending(), 0);
}

#[test]
fn stale_timer_from_stopped_run_does_nothing() {
    let rig = Rig::new();
    rig.start(&scale(3), false).unwrap();
    rig.sequencer.stop();
    rig.start(&scale(2), false).unwrap();
    assert_eq!(rig.sequencer.cycle_count(), 1);

    rig.clock.run_until_idle();
    // 1 step from the first run, 2 from the second
    assert_eq!(rig.steps().len(), 3);
    assert_eq!(rig.finishes().len(), 1);
}

#[test]
fn looping_pauses_between_passes() {
    let rig = Rig::new();
    rig.start(&scale(1), true).unwrap();

    // note ends at 0.5s, pause until 1.0s
    rig.clock.advance(Duration::from_millis(999));
    assert_eq!(rig.steps().len(), 1);
    rig.clock.advance(Duration::from_millis(1));
    assert_eq!(
        rig.steps().last(),
        Some(&StepProgress {
            index: 0,
            total: 1,
            cycle: 2
        })
    );
    assert_eq!(rig.sequencer.cycle_count(), 2);
    assert!(rig.sequencer.stop());
}

#[test]
fn endless_loop_hits_the_cycle_cap() {
    let rig = Rig::new();
    rig.start(&scale(2), true).unwrap();
    rig.clock.run_until_idle();

    let steps = rig.steps();
    assert_eq!(steps.len(), 2 * MAX_CYCLES as usize);
    assert_eq!(steps.last().map(|s| s.cycle), Some(MAX_CYCLES));
    assert_eq!(
        rig.finishes(),
        vec![RunSummary {
            cycles_played: MAX_CYCLES,
            was_stopped: true,
            outcome: RunOutcome::LoopLimitExceeded,
        }]
    );
    assert!(!rig.sequencer.is_playing());
}

#[test]
fn turning_loop_off_finishes_after_the_current_pass() {
    let rig = Rig::new();
    rig.start(&scale(2), true).unwrap();
    rig.clock.advance(Duration::from_millis(2500));
    assert_eq!(rig.sequencer.cycle_count(), 2);

    rig.sequencer.set_loop_enabled(false);
    rig.clock.run_until_idle();
    assert_eq!(
        rig.finishes(),
        vec![RunSummary {
            cycles_played: 2,
            was_stopped: false,
            outcome: RunOutcome::Completed,
        }]
    );
    assert_eq!(rig.steps().len(), 4);
}

#[test]
fn tone_failures_skip_the_sound_but_not_the_step() {
    let sink = RecordingSink {
        failing_velocity: Some(1),
        ..Default::default()
    };
    let rig = Rig::with(RecordingListener::default(), sink);
    let mut doc = Document::new();
    doc.push_note(note(60, 1, 96)).unwrap();
    doc.push_note(note(62, 100, 96)).unwrap();

    rig.start(&doc, false).unwrap();
    rig.clock.run_until_idle();

    assert_eq!(rig.steps().len(), 2);
    assert_eq!(rig.sink.played_count(), 1);
    assert_eq!(rig.finishes()[0].outcome, RunOutcome::Completed);
}

#[test]
fn cancel_failures_do_not_block_stop() {
    let sink = RecordingSink {
        fail_cancel: true,
        ..Default::default()
    };
    let rig = Rig::with(RecordingListener::default(), sink);
    let mut doc = Document::new();
    doc.push_chord(chord(&[60, 64], 96)).unwrap();
    rig.start(&doc, false).unwrap();

    assert!(rig.sequencer.stop());
    assert_eq!(rig.sink.cancelled.lock().len(), 2);
    assert!(!rig.sequencer.is_playing());
    assert_eq!(rig.clock.pending(), 0);
}

#[test]
fn finished_tones_are_not_cancelled_on_stop() {
    let rig = Rig::new();
    rig.start(&scale(3), false).unwrap();
    rig.clock.fire_next();
    assert_eq!(rig.sink.played_count(), 2);

    rig.sequencer.stop();
    let cancelled = rig.sink.cancelled.lock().clone();
    assert_eq!(cancelled, vec![rig.sink.handles()[1]]);
}

#[test]
fn preview_sounds_every_chord_tone() {
    let sink = RecordingSink::default();
    let handles = preview(
        &SequenceItem::Chord(chord(&[60, 64, 67], 96)),
        Tempo::new(60),
        &sink,
    );
    assert_eq!(handles.len(), 3);
    assert!(sink.played.lock().iter().all(|p| p.2 == 1.0));
}

#[test]
fn stop_from_another_thread_silences_a_real_clock() {
    let (listener, updates) = ChannelListener::new();
    let sequencer = Sequencer::new(Arc::new(listener));
    let sink = Arc::new(RecordingSink::default());
    let clock = Arc::new(ThreadClock::new().unwrap());

    // 10ms per quarter note
    sequencer
        .start(&scale(50), Tempo::new(6000), false, sink.clone(), clock)
        .unwrap();

    for _ in 0..3 {
        let update = updates.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(matches!(update, PlaybackUpdate::Step(_)));
    }
    assert!(sequencer.stop());

    let played = sink.played_count();
    while updates.try_recv().is_ok() {}
    std::thread::sleep(Duration::from_millis(100));

    assert_eq!(sink.played_count(), played);
    assert!(updates.try_recv().is_err());
    assert!(played < 50);
}

#[test]
fn stop_during_the_pause_between_passes() {
    let rig = Rig::new();
    rig.start(&scale(1), true).unwrap();

    // note ends at 0.5s, the pause runs until 1.0s
    rig.clock.advance(Duration::from_millis(600));
    assert_eq!(rig.clock.pending(), 1);

    assert!(rig.sequencer.stop());
    assert_eq!(rig.clock.pending(), 0);
    assert_eq!(rig.clock.run_until_idle(), 0);

    assert_eq!(rig.steps().len(), 1);
    assert_eq!(rig.sink.played_count(), 1);
    assert!(rig.sink.cancelled.lock().is_empty());
    assert!(rig.finishes().is_empty());
    assert!(!rig.sequencer.is_playing());
}

#[test]
fn timer_firing_after_stop_is_ignored() {
    let rig = Rig::new();
    let clock = Arc::new(HeldClock::default());
    let start = |doc: &Document| {
        rig.sequencer
            .start(doc, Tempo::new(120), false, rig.sink.clone(), clock.clone())
    };

    start(&scale(3)).unwrap();
    assert!(rig.sequencer.stop());
    let late = clock.take();
    assert_eq!(late.len(), 1);

    start(&scale(3)).unwrap();
    for callback in late {
        callback();
    }

    assert_eq!(rig.steps().len(), 2);
    assert_eq!(rig.sink.played_count(), 2);
    assert_eq!(rig.sequencer.current_index(), 0);
    assert!(rig.sequencer.is_playing());
    assert!(rig.finishes().is_empty());
}
