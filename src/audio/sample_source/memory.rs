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
use std::sync::Arc;

use super::buffer::SampleBuffer;
use super::error::SampleSourceError;
use super::traits::VoiceSource;

/// A voice reading sequentially from a shared in-memory clip. Any number of
/// cached voices can share one buffer, each with its own cursor.
pub struct CachedVoice {
    buffer: Arc<SampleBuffer>,
    /// Offset of the next sample to hand out.
    cursor: usize,
}

impl CachedVoice {
    /// Creates a voice positioned at the start of `buffer`.
    pub fn new(buffer: Arc<SampleBuffer>) -> Self {
        Self { buffer, cursor: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buffer.samples().len() - self.cursor
    }
}

impl VoiceSource for CachedVoice {
    fn pull(&mut self, output: &mut [f32]) -> Result<usize, SampleSourceError> {
        let to_copy = self.remaining().min(output.len());
        output[..to_copy]
            .copy_from_slice(&self.buffer.samples()[self.cursor..self.cursor + to_copy]);
        self.cursor += to_copy;
        Ok(to_copy)
    }

    fn channel_count(&self) -> u16 {
        self.buffer.channel_count()
    }

    fn sample_rate(&self) -> u32 {
        self.buffer.sample_rate()
    }

    fn is_finished(&self) -> bool {
        self.cursor >= self.buffer.samples().len()
    }

    fn position(&self) -> Option<usize> {
        Some(self.cursor)
    }
}
