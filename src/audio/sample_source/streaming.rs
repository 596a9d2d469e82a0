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
use std::path::Path;

use super::decoder::FileDecoder;
use super::error::SampleSourceError;
use super::traits::VoiceSource;

/// A voice that decodes straight from a file while it plays. Pulls may touch
/// the filesystem, so latency-sensitive triggers should prefer cached voices.
pub struct StreamingVoice {
    /// The live decode stream. Released as soon as it runs dry.
    decoder: Option<FileDecoder>,
    channel_count: u16,
    sample_rate: u32,
}

impl StreamingVoice {
    /// Opens a decode stream over the file at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SampleSourceError> {
        let decoder = FileDecoder::open(path)?;
        Ok(Self {
            channel_count: decoder.channel_count(),
            sample_rate: decoder.sample_rate(),
            decoder: Some(decoder),
        })
    }
}

impl VoiceSource for StreamingVoice {
    fn pull(&mut self, output: &mut [f32]) -> Result<usize, SampleSourceError> {
        let Some(decoder) = self.decoder.as_mut() else {
            return Ok(0);
        };

        let read = match decoder.read(output) {
            Ok(read) => read,
            Err(e) => {
                self.decoder = None;
                return Err(e);
            }
        };
        if read < output.len() {
            self.decoder = None;
        }
        Ok(read)
    }

    fn channel_count(&self) -> u16 {
        self.channel_count
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn is_finished(&self) -> bool {
        self.decoder.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::write_wav;

    #[test]
    fn test_streams_then_releases() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stream.wav");
        let samples: Vec<f32> = (0..300).map(|i| i as f32 / 300.0).collect();
        write_wav(&path, 2, 44100, &samples).unwrap();

        let mut voice = StreamingVoice::open(&path).unwrap();
        assert_eq!(voice.channel_count(), 2);
        assert!(!voice.is_finished());

        let mut collected = Vec::new();
        let mut chunk = [0.0f32; 128];
        loop {
            let read = voice.pull(&mut chunk).unwrap();
            collected.extend_from_slice(&chunk[..read]);
            if read < chunk.len() {
                break;
            }
        }
        assert_eq!(collected, samples);
        assert!(voice.is_finished());
        assert_eq!(voice.pull(&mut chunk).unwrap(), 0);
    }

    #[test]
    fn test_open_failure() {
        assert!(StreamingVoice::open("/missing/stream.wav").is_err());
    }
}
