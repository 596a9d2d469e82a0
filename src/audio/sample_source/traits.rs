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

/// A pull-based producer of interleaved audio samples. Every playing voice, and
/// the mixer itself, reads through this one capability.
pub trait VoiceSource: Send {
    /// Fills `output` with up to `output.len()` interleaved samples and returns
    /// how many were written. Writing fewer than requested signals end-of-data.
    ///
    /// Callers must request whole frames (a multiple of `channel_count()`).
    fn pull(&mut self, output: &mut [f32]) -> Result<usize, SampleSourceError>;

    /// Get the number of interleaved channels produced by this source.
    fn channel_count(&self) -> u16;

    /// Get the sample rate of this source.
    fn sample_rate(&self) -> u32;

    /// Returns true once the source has nothing left to produce.
    fn is_finished(&self) -> bool;

    /// The current read position in samples of the underlying clip, if the
    /// source has one.
    fn position(&self) -> Option<usize> {
        None
    }
}

/// Lets a boxed source be wrapped by adapters that are generic over `VoiceSource`.
impl VoiceSource for Box<dyn VoiceSource> {
    fn pull(&mut self, output: &mut [f32]) -> Result<usize, SampleSourceError> {
        (**self).pull(output)
    }

    fn channel_count(&self) -> u16 {
        (**self).channel_count()
    }

    fn sample_rate(&self) -> u32 {
        (**self).sample_rate()
    }

    fn is_finished(&self) -> bool {
        (**self).is_finished()
    }

    fn position(&self) -> Option<usize> {
        (**self).position()
    }
}
