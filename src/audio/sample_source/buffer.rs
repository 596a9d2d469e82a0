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
use std::time::Duration;

use tracing::{debug, info};

use super::decoder::FileDecoder;
use super::error::SampleSourceError;

/// Size of each read while pulling a whole clip into memory.
const LOAD_CHUNK_SAMPLES: usize = 16384;

/// A fully decoded, immutable audio clip held in memory.
#[derive(Debug)]
pub struct SampleBuffer {
    /// Interleaved samples.
    samples: Vec<f32>,
    channel_count: u16,
    sample_rate: u32,
}

impl SampleBuffer {
    /// Creates a sample buffer from interleaved samples. The sample count must be
    /// a whole number of frames.
    pub fn new(
        samples: Vec<f32>,
        channel_count: u16,
        sample_rate: u32,
    ) -> Result<Self, SampleSourceError> {
        if channel_count == 0 {
            return Err(SampleSourceError::InvalidBuffer(
                "channel count must be positive".to_string(),
            ));
        }
        if sample_rate == 0 {
            return Err(SampleSourceError::InvalidBuffer(
                "sample rate must be positive".to_string(),
            ));
        }
        if samples.len() % channel_count as usize != 0 {
            return Err(SampleSourceError::InvalidBuffer(format!(
                "{} samples is not a whole number of {}-channel frames",
                samples.len(),
                channel_count
            )));
        }

        Ok(Self {
            samples,
            channel_count,
            sample_rate,
        })
    }

    /// Decodes the entire clip at `path` into memory at its native channel
    /// count and sample rate. No resampling is done.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, SampleSourceError> {
        let path = path.as_ref();
        debug!(path = ?path, "Decoding sample into memory");

        let mut decoder = FileDecoder::open(path)?;
        let channel_count = decoder.channel_count();
        let sample_rate = decoder.sample_rate();

        let mut samples = Vec::with_capacity(
            decoder
                .frames()
                .map(|frames| frames as usize * channel_count as usize)
                .unwrap_or(LOAD_CHUNK_SAMPLES),
        );
        let mut chunk = vec![0.0f32; LOAD_CHUNK_SAMPLES];
        loop {
            let read = decoder.read(&mut chunk)?;
            samples.extend_from_slice(&chunk[..read]);
            if read < chunk.len() {
                break;
            }
        }

        // A truncated final packet can leave a partial frame behind.
        let whole = samples.len() - samples.len() % channel_count as usize;
        samples.truncate(whole);
        samples.shrink_to_fit();

        let loaded = Self::new(samples, channel_count, sample_rate).map_err(|e| {
            SampleSourceError::Decode {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }
        })?;

        info!(
            path = ?path,
            channels = channel_count,
            sample_rate,
            duration_ms = loaded.duration().as_millis(),
            memory_kb = loaded.memory_size() / 1024,
            "Sample loaded"
        );

        Ok(loaded)
    }

    /// The interleaved samples.
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn channel_count(&self) -> u16 {
        self.channel_count
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of frames (samples per channel).
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channel_count as usize
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate as f64)
    }

    /// Returns the memory size in bytes.
    pub fn memory_size(&self) -> usize {
        self.samples.len() * std::mem::size_of::<f32>()
    }
}
