pub mod audio;
pub mod document;
pub mod events;
pub mod midi;
pub mod project;
pub mod sequencer;
pub mod timing;

pub use document::{ChordEvent, Document, NoteEvent, SequenceItem};
pub use project::Project;
pub use sequencer::Sequencer;
pub use timing::Tempo;
