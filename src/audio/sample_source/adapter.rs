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
use super::error::SampleSourceError;
use super::traits::VoiceSource;

/// Returns true if a `from`-channel source can play on a `to`-channel output.
pub fn can_adapt(from: u16, to: u16) -> bool {
    from == to || (from, to) == (1, 2)
}

/// Reshapes `source` to produce `target_channels` interleaved channels.
///
/// Matching layouts pass through untouched and mono is duplicated into stereo.
/// Everything else is refused; this is not a general remixer.
pub fn adapt(
    source: Box<dyn VoiceSource>,
    target_channels: u16,
) -> Result<Box<dyn VoiceSource>, SampleSourceError> {
    match (source.channel_count(), target_channels) {
        (from, to) if from == to => Ok(source),
        (1, 2) => Ok(Box::new(MonoToStereo::new(source))),
        (from, to) => Err(SampleSourceError::UnsupportedChannelLayout { from, to }),
    }
}

/// Duplicates every sample of a mono source into a left/right pair.
///
/// Pulls of odd length are served exactly: a frame split by the end of the
/// output keeps its right sample for the start of the next pull.
pub struct MonoToStereo<S: VoiceSource> {
    source: S,
    pending: Option<f32>,
}

impl<S: VoiceSource> MonoToStereo<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            pending: None,
        }
    }
}

impl<S: VoiceSource> VoiceSource for MonoToStereo<S> {
    fn pull(&mut self, output: &mut [f32]) -> Result<usize, SampleSourceError> {
        if output.is_empty() {
            return Ok(0);
        }

        let mut written = 0;
        if let Some(sample) = self.pending.take() {
            output[0] = sample;
            written = 1;
        }

        let rest = &mut output[written..];
        let frames = rest.len().div_ceil(2);
        // Read mono into the front, then spread it backwards so nothing is
        // overwritten before it has been copied.
        let read = self.source.pull(&mut rest[..frames])?;
        for i in (0..read).rev() {
            let sample = rest[i];
            rest[2 * i] = sample;
            match rest.get_mut(2 * i + 1) {
                Some(right) => *right = sample,
                None => self.pending = Some(sample),
            }
        }

        Ok(written + (read * 2).min(rest.len()))
    }

    fn channel_count(&self) -> u16 {
        2
    }

    fn sample_rate(&self) -> u32 {
        self.source.sample_rate()
    }

    fn is_finished(&self) -> bool {
        self.pending.is_none() && self.source.is_finished()
    }

    fn position(&self) -> Option<usize> {
        self.source.position()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::audio::sample_source::{CachedVoice, SampleBuffer};

    fn voice(samples: Vec<f32>, channels: u16) -> Box<dyn VoiceSource> {
        Box::new(CachedVoice::new(Arc::new(
            SampleBuffer::new(samples, channels, 44100).unwrap(),
        )))
    }

    #[test]
    fn test_mono_to_stereo() {
        let mut adapted = adapt(voice(vec![1.0, 2.0, 3.0], 1), 2).unwrap();
        assert_eq!(adapted.channel_count(), 2);

        let mut output = [0.0f32; 8];
        assert_eq!(adapted.pull(&mut output).unwrap(), 6);
        assert_eq!(&output[..6], &[1.0, 1.0, 2.0, 2.0, 3.0, 3.0]);
        assert!(adapted.is_finished());
    }

    #[test]
    fn test_mono_to_stereo_chunked() {
        let mono: Vec<f32> = (0..101).map(|i| i as f32).collect();
        let mut adapted = adapt(voice(mono.clone(), 1), 2).unwrap();

        let mut collected = Vec::new();
        let mut chunk = [0.0f32; 10];
        loop {
            let read = adapted.pull(&mut chunk).unwrap();
            collected.extend_from_slice(&chunk[..read]);
            if read < chunk.len() {
                break;
            }
        }

        let expected: Vec<f32> = mono.iter().flat_map(|&s| [s, s]).collect();
        assert_eq!(collected.len(), 2 * mono.len());
        assert_eq!(collected, expected);
    }

    #[test]
    fn test_mono_to_stereo_odd_pulls() {
        let mono: Vec<f32> = (0..10).map(|i| i as f32).collect();
        let mut adapted = adapt(voice(mono.clone(), 1), 2).unwrap();

        let mut collected = Vec::new();
        let mut chunk = [0.0f32; 7];
        for _ in 0..2 {
            assert_eq!(adapted.pull(&mut chunk).unwrap(), 7);
            collected.extend_from_slice(&chunk);
            assert!(!adapted.is_finished());
        }

        // 20 stereo samples in total, 14 already delivered.
        assert_eq!(adapted.pull(&mut chunk).unwrap(), 6);
        collected.extend_from_slice(&chunk[..6]);
        assert!(adapted.is_finished());

        let expected: Vec<f32> = mono.iter().flat_map(|&s| [s, s]).collect();
        assert_eq!(collected, expected);
    }

    #[test]
    fn test_split_frame_keeps_voice_alive() {
        let mut adapted = adapt(voice(vec![0.5], 1), 2).unwrap();

        let mut one = [0.0f32; 1];
        assert_eq!(adapted.pull(&mut one).unwrap(), 1);
        assert_eq!(one, [0.5]);
        assert!(!adapted.is_finished());

        assert_eq!(adapted.pull(&mut one).unwrap(), 1);
        assert_eq!(one, [0.5]);
        assert!(adapted.is_finished());
    }

    #[test]
    fn test_same_layout_passthrough() {
        let mut adapted = adapt(voice(vec![0.1, 0.2, 0.3, 0.4], 2), 2).unwrap();
        let mut output = [0.0f32; 4];
        assert_eq!(adapted.pull(&mut output).unwrap(), 4);
        assert_eq!(output, [0.1, 0.2, 0.3, 0.4]);
    }

    #[test]
    fn test_unsupported_layouts() {
        for (from, to) in [(2u16, 1u16), (1, 4), (6, 2)] {
            let samples = vec![0.0; from as usize * 4];
            assert!(!can_adapt(from, to));
            match adapt(voice(samples, from), to) {
                Err(SampleSourceError::UnsupportedChannelLayout { from: f, to: t }) => {
                    assert_eq!((f, t), (from, to));
                }
                _ => panic!("expected unsupported layout for {} -> {}", from, to),
            }
        }
    }
}
