mod clock;
mod tempo;

pub use clock::{Clock, ManualClock, ThreadClock, TimerCallback, TimerHandle};
pub use tempo::{PPQ, Tempo};
