/// One event of the exported track, with the delta time that precedes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackEvent {
    pub delta_ticks: u32,
    pub event: Event,
}

impl TrackEvent {
    pub fn new(delta_ticks: u32, event: Event) -> Self {
        Self { delta_ticks, event }
    }
}

/// Channel messages. Everything is written on channel 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiMessage {
    NoteOn { pitch: u8, velocity: u8 },
    NoteOff { pitch: u8 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaEvent {
    SetTempo { microseconds_per_quarter: u32 },
    EndOfTrack,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Midi(MidiMessage),
    Meta(MetaEvent),
}

pub const NOTE_ON: u8 = 0x90;
pub const NOTE_OFF: u8 = 0x80;
pub const META: u8 = 0xFF;
pub const META_SET_TEMPO: u8 = 0x51;
pub const META_END_OF_TRACK: u8 = 0x2F;

const DATA_MASK: u8 = 0x7F;

impl Event {
    pub fn note_on(pitch: u8, velocity: u8) -> Self {
        Event::Midi(MidiMessage::NoteOn { pitch, velocity })
    }

    pub fn note_off(pitch: u8) -> Self {
        Event::Midi(MidiMessage::NoteOff { pitch })
    }

    /// Appends the event bytes, without its delta time. Data bytes keep only
    /// their low 7 bits so they can never be read as a status byte.
    pub fn write_to(&self, out: &mut Vec<u8>) {
        match *self {
            Event::Midi(MidiMessage::NoteOn { pitch, velocity }) => {
                out.extend_from_slice(&[NOTE_ON, pitch & DATA_MASK, velocity & DATA_MASK]);
            }
            Event::Midi(MidiMessage::NoteOff { pitch }) => {
                out.extend_from_slice(&[NOTE_OFF, pitch & DATA_MASK, 0x00]);
            }
            Event::Meta(MetaEvent::SetTempo {
                microseconds_per_quarter,
            }) => {
                let [_, hi, mid, lo] = (microseconds_per_quarter & 0xFF_FFFF).to_be_bytes();
                out.extend_from_slice(&[META, META_SET_TEMPO, 0x03, hi, mid, lo]);
            }
            Event::Meta(MetaEvent::EndOfTrack) => {
                out.extend_from_slice(&[META, META_END_OF_TRACK, 0x00]);
            }
        }
    }
}
