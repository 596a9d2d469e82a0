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

//! The registry of pre-loaded clips.
//!
//! Every clip is decoded fully into memory before any trigger can fire, so
//! playback never touches the disk.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::audio::sample_source::{can_adapt, SampleBuffer, SampleSourceError};
use crate::config;

/// Clips indexed by trigger name. Several names may share one buffer when
/// they point at the same file.
#[derive(Default)]
pub struct SampleBank {
    clips: HashMap<String, Arc<SampleBuffer>>,
}

impl SampleBank {
    /// Creates an empty bank.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads every `(name, path)` entry. Files are decoded in parallel and
    /// each distinct file only once. Fails on the first clip that can't be
    /// decoded. Clips that won't play on the output format are still loaded,
    /// with a warning.
    pub fn load(
        entries: &[(String, PathBuf)],
        output_rate: u32,
        output_channels: u16,
    ) -> Result<SampleBank, SampleSourceError> {
        let mut resolved: Vec<(&str, PathBuf)> = Vec::with_capacity(entries.len());
        let mut unique: Vec<PathBuf> = Vec::new();
        for (name, path) in entries {
            let canonical = path
                .canonicalize()
                .map_err(|e| SampleSourceError::Decode {
                    path: path.clone(),
                    reason: e.to_string(),
                })?;
            if !unique.contains(&canonical) {
                unique.push(canonical.clone());
            } else {
                debug!(name, path = ?canonical, "Sharing already loaded clip");
            }
            resolved.push((name.as_str(), canonical));
        }

        let loaded: HashMap<PathBuf, Arc<SampleBuffer>> = unique
            .into_par_iter()
            .map(|path| -> Result<(PathBuf, Arc<SampleBuffer>), SampleSourceError> {
                let buffer = SampleBuffer::load(&path)?;
                Ok((path, Arc::new(buffer)))
            })
            .collect::<Result<_, SampleSourceError>>()?;

        let mut bank = SampleBank::new();
        for (name, path) in resolved {
            if let Some(buffer) = loaded.get(&path) {
                if buffer.sample_rate() != output_rate {
                    warn!(
                        name,
                        clip_rate = buffer.sample_rate(),
                        output_rate,
                        "Clip sample rate differs from output, it will play at the wrong speed"
                    );
                }
                if !can_adapt(buffer.channel_count(), output_channels) {
                    warn!(
                        name,
                        clip_channels = buffer.channel_count(),
                        output_channels,
                        "Clip channel layout can't play on this output, triggering it will fail"
                    );
                }
                bank.insert(name, buffer.clone());
            }
        }

        info!(
            clips = bank.len(),
            files = loaded.len(),
            memory_bytes = bank.total_memory_usage(),
            "Sample bank loaded"
        );
        Ok(bank)
    }

    /// Loads every clip named by the player config.
    pub fn from_config(player: &config::Player) -> Result<SampleBank, SampleSourceError> {
        let base = player.samples_path();
        let entries: Vec<(String, PathBuf)> = player
            .triggers()
            .iter()
            .map(|trigger| (trigger.name().to_string(), trigger.file(&base)))
            .collect();
        SampleBank::load(
            &entries,
            player.audio().sample_rate(),
            player.audio().channels(),
        )
    }

    /// Adds or replaces a clip.
    pub fn insert(&mut self, name: &str, buffer: Arc<SampleBuffer>) {
        self.clips.insert(name.to_string(), buffer);
    }

    /// Gets the clip registered under `name`.
    pub fn get(&self, name: &str) -> Option<&Arc<SampleBuffer>> {
        self.clips.get(name)
    }

    /// The number of names in the bank.
    pub fn len(&self) -> usize {
        self.clips.len()
    }

    /// Returns true if the bank holds no clips.
    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }

    /// The names in the bank, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.clips.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Names whose clip can't play on a `channels`-channel output, sorted.
    pub fn unplayable(&self, channels: u16) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .clips
            .iter()
            .filter(|(_, clip)| !can_adapt(clip.channel_count(), channels))
            .map(|(name, _)| name.as_str())
            .collect();
        names.sort_unstable();
        names
    }

    /// Memory held by distinct clips, in bytes.
    pub fn total_memory_usage(&self) -> usize {
        let mut seen: Vec<*const SampleBuffer> = Vec::new();
        self.clips
            .values()
            .filter(|buffer| {
                let ptr = Arc::as_ptr(buffer);
                if seen.contains(&ptr) {
                    false
                } else {
                    seen.push(ptr);
                    true
                }
            })
            .map(|buffer| buffer.memory_size())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::write_wav;

    #[test]
    fn test_load_and_share() {
        let dir = tempfile::tempdir().unwrap();
        let kick = dir.path().join("kick.wav");
        let snare = dir.path().join("snare.wav");
        write_wav(&kick, 1, 44100, &[0.5; 100]).unwrap();
        write_wav(&snare, 2, 44100, &[0.25; 200]).unwrap();

        let bank = SampleBank::load(
            &[
                ("kick".to_string(), kick.clone()),
                ("snare".to_string(), snare),
                ("kick-again".to_string(), kick),
            ],
            44100,
            2,
        )
        .unwrap();

        assert_eq!(bank.len(), 3);
        assert!(!bank.is_empty());
        assert_eq!(bank.names(), vec!["kick", "kick-again", "snare"]);

        let kick = bank.get("kick").unwrap();
        assert!(Arc::ptr_eq(kick, bank.get("kick-again").unwrap()));
        assert_eq!(kick.samples().len(), 100);
        assert_eq!(bank.get("snare").unwrap().channel_count(), 2);
        assert_eq!(bank.total_memory_usage(), 300 * std::mem::size_of::<f32>());
        assert!(bank.unplayable(2).is_empty());
    }

    #[test]
    fn test_missing_clip_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = SampleBank::load(
            &[("ghost".to_string(), dir.path().join("ghost.wav"))],
            44100,
            2,
        );
        assert!(matches!(result, Err(SampleSourceError::Decode { .. })));
    }

    #[test]
    fn test_corrupt_clip_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corrupt.wav");
        std::fs::write(&path, b"RIFF but not really").unwrap();
        let result = SampleBank::load(&[("corrupt".to_string(), path)], 44100, 2);
        assert!(result.is_err());
    }

    #[test]
    fn test_mismatched_rate_still_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("slow.wav");
        write_wav(&path, 1, 22050, &[0.1; 10]).unwrap();
        let bank = SampleBank::load(&[("slow".to_string(), path)], 44100, 2).unwrap();
        assert_eq!(bank.get("slow").unwrap().sample_rate(), 22050);
    }

    #[test]
    fn test_mismatched_layout_still_loads() {
        let dir = tempfile::tempdir().unwrap();
        let mono = dir.path().join("mono.wav");
        let stereo = dir.path().join("stereo.wav");
        let surround = dir.path().join("surround.wav");
        write_wav(&mono, 1, 44100, &[0.1; 10]).unwrap();
        write_wav(&stereo, 2, 44100, &[0.1; 20]).unwrap();
        write_wav(&surround, 3, 44100, &[0.1; 30]).unwrap();

        let entries = [
            ("mono".to_string(), mono),
            ("stereo".to_string(), stereo),
            ("surround".to_string(), surround),
        ];
        let bank = SampleBank::load(&entries, 44100, 1).unwrap();
        assert_eq!(bank.len(), 3);
        assert_eq!(bank.unplayable(1), vec!["stereo", "surround"]);
        assert_eq!(bank.unplayable(2), vec!["surround"]);
    }
}
