// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use midly::{live::LiveEvent, MidiMessage};

mod midir;

pub use self::midir::{list_devices, Input};

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Errors raised while talking to MIDI hardware.
#[derive(Debug, thiserror::Error)]
pub enum MidiError {
    #[error("no MIDI input found matching {0:?}")]
    NotFound(String),

    #[error("unable to initialize MIDI: {0}")]
    Init(#[from] ::midir::InitError),

    #[error("unable to read MIDI port info: {0}")]
    PortInfo(#[from] ::midir::PortInfoError),

    #[error("unable to connect to MIDI input {device}: {reason}")]
    Connect { device: String, reason: String },
}

/// A parsed note-on: the note identity plus an intensity in [0,1].
#[derive(Clone, Debug, PartialEq)]
pub struct NoteOn {
    pub note: String,
    pub intensity: f32,
}

/// Parses a raw MIDI message. Anything other than a note-on yields None,
/// including malformed bytes. A note-on with velocity 0 is returned with
/// intensity 0 and left for the dispatcher to ignore.
pub fn parse_note_on(raw: &[u8]) -> Option<NoteOn> {
    match LiveEvent::parse(raw).ok()? {
        LiveEvent::Midi {
            message: MidiMessage::NoteOn { key, vel },
            ..
        } => Some(NoteOn {
            note: note_name(key.as_int()),
            intensity: f32::from(vel.as_int()) / 127.0,
        }),
        _ => None,
    }
}

/// Names a MIDI note number, with middle C (60) as C4.
pub fn note_name(note: u8) -> String {
    let octave = i32::from(note / 12) - 1;
    format!("{}{}", NOTE_NAMES[usize::from(note % 12)], octave)
}

/// Parses a note identity: a MIDI note number ("60") or a name with an
/// optional sharp or flat ("C4", "F#3", "Eb-1").
pub fn parse_note(note: &str) -> Option<u8> {
    let note = note.trim();
    if let Ok(number) = note.parse::<u8>() {
        return (number <= 127).then_some(number);
    }

    let mut chars = note.chars();
    let pitch_class: i32 = match chars.next()?.to_ascii_uppercase() {
        'C' => 0,
        'D' => 2,
        'E' => 4,
        'F' => 5,
        'G' => 7,
        'A' => 9,
        'B' => 11,
        _ => return None,
    };
    let rest = chars.as_str();
    let (accidental, octave) = match rest.strip_prefix('#') {
        Some(octave) => (1, octave),
        None => match rest.strip_prefix('b') {
            Some(octave) => (-1, octave),
            None => (0, rest),
        },
    };
    let octave: i32 = octave.parse().ok()?;

    let number = (octave + 1) * 12 + pitch_class + accidental;
    u8::try_from(number).ok().filter(|n| *n <= 127)
}

/// Normalizes a note identity to its canonical name.
pub fn normalize_note(note: &str) -> Option<String> {
    parse_note(note).map(note_name)
}
