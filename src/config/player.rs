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
use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

use config::{Config, File};
use serde::Deserialize;

use super::{audio::Audio, error::ConfigError, midi::Midi, trigger::Trigger};
use crate::trigger::PollPolicy;

const DEFAULT_FRAME_RATE: u32 = 60;

/// The configuration for the sample trigger host.
#[derive(Deserialize, Clone, Debug)]
pub struct Player {
    /// The audio output configuration.
    audio: Audio,

    /// The MIDI input configuration.
    midi: Option<Midi>,

    /// How many triggers a single poll may fire (default: single).
    poll_policy: Option<PollPolicy>,

    /// How many times per second key state is polled (default: 60).
    frame_rate: Option<u32>,

    /// Where relative clip paths are resolved from (default: the config file's directory).
    samples_path: Option<String>,

    /// The triggers, in the order they are checked.
    triggers: Vec<Trigger>,

    /// The directory of the file this config was read from.
    #[serde(skip)]
    base_path: PathBuf,
}

impl Player {
    /// New will create a new player configuration.
    pub fn new(audio: Audio, midi: Option<Midi>, triggers: Vec<Trigger>) -> Player {
        Player {
            audio,
            midi,
            poll_policy: None,
            frame_rate: None,
            samples_path: None,
            triggers,
            base_path: PathBuf::new(),
        }
    }

    /// Parse and validate a player config from a YAML file.
    pub fn deserialize(path: &Path) -> Result<Player, ConfigError> {
        let mut player = Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize::<Player>()?;
        player.base_path = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        player.validate()?;
        Ok(player)
    }

    /// Returns the audio configuration.
    pub fn audio(&self) -> &Audio {
        &self.audio
    }

    /// Returns the MIDI configuration.
    pub fn midi(&self) -> Option<&Midi> {
        self.midi.as_ref()
    }

    /// Returns the poll policy.
    pub fn poll_policy(&self) -> PollPolicy {
        self.poll_policy.unwrap_or_default()
    }

    /// Returns the polling frame rate.
    pub fn frame_rate(&self) -> u32 {
        self.frame_rate.unwrap_or(DEFAULT_FRAME_RATE)
    }

    /// Returns the directory clip paths are resolved from.
    pub fn samples_path(&self) -> PathBuf {
        match &self.samples_path {
            Some(samples_path) => {
                let samples_path = Path::new(samples_path);
                if samples_path.is_absolute() {
                    samples_path.to_path_buf()
                } else {
                    self.base_path.join(samples_path)
                }
            }
            None => self.base_path.clone(),
        }
    }

    /// Returns the triggers in check order.
    pub fn triggers(&self) -> &[Trigger] {
        &self.triggers
    }

    /// Rejects configs that are well-formed YAML but can't be run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.audio.validate()?;
        if self.frame_rate() == 0 {
            return Err(ConfigError::InvalidValue {
                field: "frame_rate",
                reason: "must be positive".to_string(),
            });
        }

        let mut names = HashSet::new();
        let mut keys = HashSet::new();
        let mut notes = HashSet::new();
        for trigger in &self.triggers {
            if !names.insert(trigger.name()) {
                return Err(ConfigError::DuplicateTrigger {
                    kind: "name",
                    value: trigger.name().to_string(),
                });
            }
            if let Some(key) = trigger.key() {
                if !keys.insert(key) {
                    return Err(ConfigError::DuplicateTrigger {
                        kind: "key",
                        value: key.to_string(),
                    });
                }
            }
            if let Some(note) = trigger.note()? {
                if !notes.insert(note.clone()) {
                    return Err(ConfigError::DuplicateTrigger {
                        kind: "note",
                        value: note,
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(yaml: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("padbank.yaml");
        std::fs::write(&path, yaml).unwrap();
        (dir, path)
    }

    #[test]
    fn test_full_config() {
        let (dir, path) = write_config(
            r#"
audio:
  device: mock-device
  sample_rate: 48000
  buffer: 5ms
midi:
  device: Pad Controller
poll_policy: multi
frame_rate: 30
samples_path: clips
triggers:
  - name: kick
    file: kick.wav
    key: "1"
    note: C2
  - name: snare
    file: snare.wav
    key: "2"
    note: 38
"#,
        );

        let player = Player::deserialize(&path).unwrap();
        assert_eq!(player.audio().device(), "mock-device");
        assert_eq!(player.audio().sample_rate(), 48000);
        assert_eq!(player.midi().map(|m| m.device()), Some("Pad Controller"));
        assert_eq!(player.poll_policy(), PollPolicy::Multi);
        assert_eq!(player.frame_rate(), 30);
        assert_eq!(player.samples_path(), dir.path().join("clips"));
        assert_eq!(player.triggers().len(), 2);
        assert_eq!(player.triggers()[0].note().unwrap(), Some("C2".to_string()));
        assert_eq!(player.triggers()[1].note().unwrap(), Some("D2".to_string()));
    }

    #[test]
    fn test_defaults() {
        let (dir, path) = write_config(
            r#"
audio:
  device: default
triggers:
  - name: kick
    file: kick.wav
"#,
        );

        let player = Player::deserialize(&path).unwrap();
        assert!(player.midi().is_none());
        assert_eq!(player.poll_policy(), PollPolicy::Single);
        assert_eq!(player.frame_rate(), 60);
        assert_eq!(player.samples_path(), dir.path());
    }

    #[test]
    fn test_duplicate_name() {
        let (_dir, path) = write_config(
            r#"
audio:
  device: default
triggers:
  - name: kick
    file: kick.wav
  - name: kick
    file: kick2.wav
"#,
        );
        assert!(matches!(
            Player::deserialize(&path),
            Err(ConfigError::DuplicateTrigger { kind: "name", .. })
        ));
    }

    #[test]
    fn test_duplicate_note_after_normalization() {
        let (_dir, path) = write_config(
            r#"
audio:
  device: default
triggers:
  - name: kick
    file: kick.wav
    note: C4
  - name: snare
    file: snare.wav
    note: 60
"#,
        );
        assert!(matches!(
            Player::deserialize(&path),
            Err(ConfigError::DuplicateTrigger { kind: "note", .. })
        ));
    }

    #[test]
    fn test_duplicate_key() {
        let (_dir, path) = write_config(
            r#"
audio:
  device: default
triggers:
  - name: kick
    file: kick.wav
    key: a
  - name: snare
    file: snare.wav
    key: a
"#,
        );
        assert!(matches!(
            Player::deserialize(&path),
            Err(ConfigError::DuplicateTrigger { kind: "key", .. })
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            Player::deserialize(Path::new("/definitely/not/padbank.yaml")),
            Err(ConfigError::Load(_))
        ));
    }
}
