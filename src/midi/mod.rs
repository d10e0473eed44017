//! Standard MIDI File export.
//!
//! The whole document becomes a single track at 96 ticks per quarter note:
//! a tempo meta-event, then each note or chord in order, then end-of-track.

mod encoder;
pub mod vlq;

pub use encoder::{HEADER, HEADER_LEN, TRACK_HEADER_LEN, encode, track_events};

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EncodeError {
    #[error("nothing to export: the document is empty")]
    EmptyDocument,
}
