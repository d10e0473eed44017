use super::{EncodeError, vlq};
use crate::document::SequenceItem;
use crate::events::{Event, MetaEvent, TrackEvent};
use crate::timing::{PPQ, Tempo};

pub const HEADER_LEN: usize = 14;
pub const TRACK_HEADER_LEN: usize = 8;

/// `MThd`, length 6, format 0, one track, division 96.
#[rustfmt::skip]
pub const HEADER: [u8; HEADER_LEN] = [
    b'M', b'T', b'h', b'd',
    0x00, 0x00, 0x00, 0x06,
    0x00, 0x00,
    0x00, 0x01,
    (PPQ >> 8) as u8, PPQ as u8,
];

/// Flattens the document into the exact event list written to the track.
///
/// Every note-on sits at delta 0. A chord's first note-off carries the whole
/// duration and the remaining note-offs follow at delta 0, so all tones of a
/// chord end together. A chord with no tones contributes nothing.
pub fn track_events(items: &[SequenceItem], tempo: Tempo) -> Vec<TrackEvent> {
    let mut events = Vec::with_capacity(items.len() * 2 + 2);
    events.push(TrackEvent::new(
        0,
        Event::Meta(MetaEvent::SetTempo {
            microseconds_per_quarter: tempo.microseconds_per_quarter(),
        }),
    ));

    for item in items {
        match item {
            SequenceItem::Note(note) => {
                events.push(TrackEvent::new(0, Event::note_on(note.pitch, note.velocity)));
                events.push(TrackEvent::new(
                    note.duration_ticks,
                    Event::note_off(note.pitch),
                ));
            }
            SequenceItem::Chord(chord) => {
                let Some((first, rest)) = chord.tones.split_first() else {
                    continue;
                };
                for tone in &chord.tones {
                    events.push(TrackEvent::new(0, Event::note_on(tone.pitch, tone.velocity)));
                }
                events.push(TrackEvent::new(
                    chord.duration_ticks,
                    Event::note_off(first.pitch),
                ));
                for tone in rest {
                    events.push(TrackEvent::new(0, Event::note_off(tone.pitch)));
                }
            }
        }
    }

    events.push(TrackEvent::new(0, Event::Meta(MetaEvent::EndOfTrack)));
    events
}

/// Encodes the document as a complete Standard MIDI File.
pub fn encode(items: &[SequenceItem], tempo: Tempo) -> Result<Vec<u8>, EncodeError> {
    if items.is_empty() {
        return Err(EncodeError::EmptyDocument);
    }

    let mut track = Vec::new();
    for event in track_events(items, tempo) {
        vlq::write(event.delta_ticks, &mut track);
        event.event.write_to(&mut track);
    }

    let mut out = Vec::with_capacity(HEADER_LEN + TRACK_HEADER_LEN + track.len());
    out.extend_from_slice(&HEADER);
    out.extend_from_slice(b"MTrk");
    out.extend_from_slice(&(track.len() as u32).to_be_bytes());
    out.extend_from_slice(&track);
    Ok(out)
}
