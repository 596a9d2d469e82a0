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
use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::error::ConfigError;
use crate::midi;

/// A YAML representation of one trigger: a clip plus the inputs that fire it.
#[derive(Deserialize, Clone, Debug)]
pub struct Trigger {
    /// The logical name of the trigger. Unique within a config.
    name: String,

    /// The clip to play, relative to the samples path unless absolute.
    file: String,

    /// The key bound for the polling source.
    key: Option<String>,

    /// The note identity bound for the MIDI source, as a name ("C2", "F#3")
    /// or a MIDI note number.
    note: Option<String>,
}

impl Trigger {
    /// New will create a new trigger configuration.
    pub fn new(name: &str, file: &str, key: Option<&str>, note: Option<&str>) -> Trigger {
        Trigger {
            name: name.to_string(),
            file: file.to_string(),
            key: key.map(str::to_string),
            note: note.map(str::to_string),
        }
    }

    /// Returns the name of the trigger.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the clip path, resolved against `base` when relative.
    pub fn file(&self, base: &Path) -> PathBuf {
        let file = Path::new(&self.file);
        if file.is_absolute() {
            file.to_path_buf()
        } else {
            base.join(file)
        }
    }

    /// Returns the bound key, if any.
    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    /// Returns the bound note normalized to its name (60 becomes "C4").
    pub fn note(&self) -> Result<Option<String>, ConfigError> {
        match &self.note {
            Some(note) => midi::normalize_note(note)
                .map(Some)
                .ok_or_else(|| ConfigError::InvalidNote {
                    trigger: self.name.clone(),
                    note: note.clone(),
                }),
            None => Ok(None),
        }
    }
}
