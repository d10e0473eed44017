use crossbeam::channel::{self, Receiver, Sender};

/// Sent once per sounded item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepProgress {
    pub index: usize,
    pub total: usize,
    pub cycle: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    /// The cycle cap was hit while looping.
    LoopLimitExceeded,
}

/// Sent when a run ends by itself. An explicit `stop()` sends nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub cycles_played: u32,
    pub was_stopped: bool,
    pub outcome: RunOutcome,
}

/// Receives playback progress. Both methods run on whichever thread drives
/// the step, with the sequencer lock held, so they may call back into the
/// sequencer (`stop`, accessors) but must not block on another thread that
/// does.
pub trait ProgressListener: Send + Sync {
    fn on_step(&self, _progress: &StepProgress) {}
    fn on_finish(&self, _summary: &RunSummary) {}
}

pub struct NoopListener;

impl ProgressListener for NoopListener {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackUpdate {
    Step(StepProgress),
    Finished(RunSummary),
}

/// Forwards progress to a channel, for consumers on another thread.
pub struct ChannelListener {
    update_tx: Sender<PlaybackUpdate>,
}

impl ChannelListener {
    pub fn new() -> (Self, Receiver<PlaybackUpdate>) {
        let (update_tx, update_rx) = channel::unbounded();
        (Self { update_tx }, update_rx)
    }
}

impl ProgressListener for ChannelListener {
    fn on_step(&self, progress: &StepProgress) {
        let _ = self.update_tx.send(PlaybackUpdate::Step(*progress));
    }

    fn on_finish(&self, summary: &RunSummary) {
        let _ = self.update_tx.send(PlaybackUpdate::Finished(*summary));
    }
}
