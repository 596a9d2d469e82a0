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
use std::fmt;

use midir::{MidiInput, MidiInputConnection};
use parking_lot::Mutex;
use tracing::{debug, info, span, Level};

use super::{parse_note_on, MidiError, NoteOn};

/// Lists the names of all MIDI input ports.
pub fn list_devices() -> Result<Vec<String>, MidiError> {
    let input = MidiInput::new("padbank input listing")?;
    let mut names = input
        .ports()
        .iter()
        .map(|port| input.port_name(port))
        .collect::<Result<Vec<String>, _>>()?;
    names.sort();
    Ok(names)
}

/// A live connection to a MIDI input port that hands parsed note-ons to a
/// handler. The handler runs on midir's delivery thread.
pub struct Input {
    name: String,
    connection: Mutex<Option<MidiInputConnection<()>>>,
}

impl Input {
    /// Connects to the first input port whose name contains `device` and
    /// starts delivering note-ons to `handler`.
    pub fn connect<F>(device: &str, mut handler: F) -> Result<Input, MidiError>
    where
        F: FnMut(NoteOn) + Send + 'static,
    {
        let span = span!(Level::INFO, "connect input (midir)");
        let _enter = span.enter();

        let input = MidiInput::new("padbank input")?;
        let mut found = None;
        for port in input.ports() {
            let name = input.port_name(&port)?;
            if name.contains(device) {
                found = Some((name, port));
                break;
            }
        }
        let (name, port) = found.ok_or_else(|| MidiError::NotFound(device.to_string()))?;

        let connection = input
            .connect(
                &port,
                "padbank input watcher",
                move |_, raw_event, _| match parse_note_on(raw_event) {
                    Some(note_on) => {
                        debug!(note = note_on.note, intensity = note_on.intensity, "Note on");
                        handler(note_on);
                    }
                    None => debug!(event = ?raw_event, "Ignoring MIDI event"),
                },
                (),
            )
            .map_err(|e| MidiError::Connect {
                device: name.clone(),
                reason: e.to_string(),
            })?;

        info!(device = name, "Watching MIDI input");
        Ok(Input {
            name,
            connection: Mutex::new(Some(connection)),
        })
    }

    /// Returns the name of the connected port.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stops delivering events. Safe to call more than once.
    pub fn close(&self) {
        if let Some(connection) = self.connection.lock().take() {
            connection.close();
            info!(device = self.name, "Stopped watching MIDI input");
        }
    }
}

impl fmt::Display for Input {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Input)", self.name)
    }
}

impl Drop for Input {
    fn drop(&mut self) {
        self.close();
    }
}
