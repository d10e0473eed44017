use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::timing::Tempo;

pub const MAX_MIDI_VALUE: u8 = 127;

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocumentError {
    #[error("a chord needs at least 2 distinct pitches, found {found}")]
    ChordTooSmall { found: usize },
    #[error("pitch {0} is already in the chord")]
    DuplicatePitch(u8),
    #[error("index {index} is out of range for {len} items")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("operation needs at least {needed} items, found {found}")]
    NotEnoughItems { needed: usize, found: usize },
    #[error("pitch {0} is outside 0-127")]
    PitchOutOfRange(u8),
    #[error("velocity {0} is outside 0-127")]
    VelocityOutOfRange(u8),
    #[error("duration must be at least one tick")]
    ZeroDuration,
}

/// Common note lengths at 96 ticks per quarter note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoteValue {
    Whole,
    Half,
    Quarter,
    Eighth,
    Sixteenth,
}

impl NoteValue {
    pub fn ticks(self) -> u32 {
        match self {
            NoteValue::Whole => 384,
            NoteValue::Half => 192,
            NoteValue::Quarter => 96,
            NoteValue::Eighth => 48,
            NoteValue::Sixteenth => 24,
        }
    }
}

/// Scientific pitch name of a MIDI note number, e.g. 60 -> "C4".
pub fn note_name(pitch: u8) -> String {
    let octave = (pitch / 12) as i8 - 1;
    format!("{}{}", NOTE_NAMES[(pitch % 12) as usize], octave)
}

fn check_pitch(pitch: u8) -> Result<(), DocumentError> {
    if pitch > MAX_MIDI_VALUE {
        return Err(DocumentError::PitchOutOfRange(pitch));
    }
    Ok(())
}

fn check_velocity(velocity: u8) -> Result<(), DocumentError> {
    if velocity > MAX_MIDI_VALUE {
        return Err(DocumentError::VelocityOutOfRange(velocity));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteEvent {
    pub pitch: u8,
    pub velocity: u8,
    pub duration_ticks: u32,
}

impl NoteEvent {
    pub fn new(pitch: u8, velocity: u8, duration_ticks: u32) -> Result<Self, DocumentError> {
        let note = Self {
            pitch,
            velocity,
            duration_ticks,
        };
        note.validate()?;
        Ok(note)
    }

    pub fn validate(&self) -> Result<(), DocumentError> {
        check_pitch(self.pitch)?;
        check_velocity(self.velocity)?;
        if self.duration_ticks == 0 {
            return Err(DocumentError::ZeroDuration);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChordTone {
    pub pitch: u8,
    pub velocity: u8,
}

/// Pitches sounded together. Tones keep insertion order; the first tone is
/// the one whose note-off carries the duration in an exported file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChordEvent {
    pub tones: Vec<ChordTone>,
    pub duration_ticks: u32,
}

impl ChordEvent {
    pub fn distinct_pitches(&self) -> usize {
        let mut pitches: Vec<u8> = self.tones.iter().map(|t| t.pitch).collect();
        pitches.sort_unstable();
        pitches.dedup();
        pitches.len()
    }

    pub fn validate(&self) -> Result<(), DocumentError> {
        for tone in &self.tones {
            check_pitch(tone.pitch)?;
            check_velocity(tone.velocity)?;
        }
        if self.duration_ticks == 0 {
            return Err(DocumentError::ZeroDuration);
        }
        let found = self.distinct_pitches();
        if found != self.tones.len() {
            let mut seen = Vec::with_capacity(self.tones.len());
            for tone in &self.tones {
                if seen.contains(&tone.pitch) {
                    return Err(DocumentError::DuplicatePitch(tone.pitch));
                }
                seen.push(tone.pitch);
            }
        }
        if found < 2 {
            return Err(DocumentError::ChordTooSmall { found });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SequenceItem {
    Note(NoteEvent),
    Chord(ChordEvent),
}

impl SequenceItem {
    pub fn duration_ticks(&self) -> u32 {
        match self {
            SequenceItem::Note(note) => note.duration_ticks,
            SequenceItem::Chord(chord) => chord.duration_ticks,
        }
    }

    pub fn validate(&self) -> Result<(), DocumentError> {
        match self {
            SequenceItem::Note(note) => note.validate(),
            SequenceItem::Chord(chord) => chord.validate(),
        }
    }

    /// "C4" for a note, "C4 + E4 + G4" for a chord.
    pub fn label(&self) -> String {
        match self {
            SequenceItem::Note(note) => note_name(note.pitch),
            SequenceItem::Chord(chord) => chord
                .tones
                .iter()
                .map(|t| note_name(t.pitch))
                .collect::<Vec<_>>()
                .join(" + "),
        }
    }
}

impl From<NoteEvent> for SequenceItem {
    fn from(note: NoteEvent) -> Self {
        SequenceItem::Note(note)
    }
}

impl From<ChordEvent> for SequenceItem {
    fn from(chord: ChordEvent) -> Self {
        SequenceItem::Chord(chord)
    }
}

/// The ordered list of notes and chords being edited.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document {
    items: Vec<SequenceItem>,
}

impl Document {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Builds a document, checking every item the same way the editing
    /// operations do.
    pub fn from_items(items: Vec<SequenceItem>) -> Result<Self, DocumentError> {
        let document = Self { items };
        document.validate()?;
        Ok(document)
    }

    pub fn validate(&self) -> Result<(), DocumentError> {
        self.items.iter().try_for_each(SequenceItem::validate)
    }

    pub fn items(&self) -> &[SequenceItem] {
        &self.items
    }

    pub fn get(&self, index: usize) -> Option<&SequenceItem> {
        self.items.get(index)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn push_note(&mut self, note: NoteEvent) -> Result<(), DocumentError> {
        note.validate()?;
        self.items.push(SequenceItem::Note(note));
        Ok(())
    }

    pub fn push_chord(&mut self, chord: ChordEvent) -> Result<(), DocumentError> {
        chord.validate()?;
        self.items.push(SequenceItem::Chord(chord));
        Ok(())
    }

    pub fn remove(&mut self, index: usize) -> Result<SequenceItem, DocumentError> {
        if index >= self.items.len() {
            return Err(DocumentError::IndexOutOfRange {
                index,
                len: self.items.len(),
            });
        }
        Ok(self.items.remove(index))
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn reverse(&mut self) -> Result<(), DocumentError> {
        if self.items.len() < 2 {
            return Err(DocumentError::NotEnoughItems {
                needed: 2,
                found: self.items.len(),
            });
        }
        self.items.reverse();
        Ok(())
    }

    pub fn total_ticks(&self) -> u64 {
        self.items.iter().map(|i| i.duration_ticks() as u64).sum()
    }

    pub fn total_seconds(&self, tempo: Tempo) -> f64 {
        self.items
            .iter()
            .map(|i| tempo.ticks_to_seconds(i.duration_ticks()))
            .sum()
    }
}

/// Formats a running time as "1m 4s", or "12s" under a minute.
pub fn format_duration(seconds: f64) -> String {
    let whole = seconds.max(0.0) as u64;
    let (minutes, seconds) = (whole / 60, whole % 60);
    if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

/// Collects tones one at a time before they are committed as a chord.
#[derive(Debug, Clone, Default)]
pub struct ChordBuilder {
    tones: Vec<ChordTone>,
}

impl ChordBuilder {
    pub fn new() -> Self {
        Self { tones: Vec::new() }
    }

    pub fn add(&mut self, pitch: u8, velocity: u8) -> Result<(), DocumentError> {
        check_pitch(pitch)?;
        check_velocity(velocity)?;
        if self.tones.iter().any(|t| t.pitch == pitch) {
            return Err(DocumentError::DuplicatePitch(pitch));
        }
        self.tones.push(ChordTone { pitch, velocity });
        Ok(())
    }

    pub fn remove(&mut self, index: usize) -> Result<ChordTone, DocumentError> {
        if index >= self.tones.len() {
            return Err(DocumentError::IndexOutOfRange {
                index,
                len: self.tones.len(),
            });
        }
        Ok(self.tones.remove(index))
    }

    pub fn clear(&mut self) {
        self.tones.clear();
    }

    pub fn tones(&self) -> &[ChordTone] {
        &self.tones
    }

    pub fn len(&self) -> usize {
        self.tones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tones.is_empty()
    }

    /// Takes the collected tones as a chord, leaving the builder empty.
    /// On error the tones stay so the caller can keep editing.
    pub fn build(&mut self, duration_ticks: u32) -> Result<ChordEvent, DocumentError> {
        if self.tones.len() < 2 {
            return Err(DocumentError::ChordTooSmall {
                found: self.tones.len(),
            });
        }
        if duration_ticks == 0 {
            return Err(DocumentError::ZeroDuration);
        }
        Ok(ChordEvent {
            tones: std::mem::take(&mut self.tones),
            duration_ticks,
        })
    }
}
