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
use std::time::Duration;

use duration_string::DurationString;
use serde::Deserialize;

use super::error::ConfigError;
use crate::audio::mixer::{DEFAULT_MAX_PULL, DEFAULT_MAX_VOICES};

const DEFAULT_SAMPLE_RATE: u32 = 44100;
const DEFAULT_CHANNELS: u16 = 2;
const DEFAULT_BUFFER: Duration = Duration::from_millis(10);

/// A YAML representation of the audio configuration.
#[derive(Deserialize, Clone, Debug)]
pub struct Audio {
    /// The audio device. "default" picks the host default, names starting
    /// with "mock" pick the mock device.
    device: String,

    /// Output sample rate in Hz (default: 44100).
    sample_rate: Option<u32>,

    /// Output channel count (default: 2).
    channels: Option<u16>,

    /// Buffer period to request from the device on the low-latency path (default: 10ms).
    buffer: Option<String>,

    /// The largest pull the mixer serves without chunking, in samples (default: 4096).
    max_pull: Option<usize>,

    /// Cap on concurrently playing voices (default: 64).
    max_voices: Option<usize>,

    /// Priority for the audio callback thread, 0-99.
    thread_priority: Option<u8>,

    /// Whether to try SCHED_FIFO for the callback thread (default: true).
    realtime: Option<bool>,
}

impl Audio {
    /// New will create a new Audio configuration.
    pub fn new(device: &str) -> Audio {
        Audio {
            device: device.to_string(),
            sample_rate: None,
            channels: None,
            buffer: None,
            max_pull: None,
            max_voices: None,
            thread_priority: None,
            realtime: None,
        }
    }

    /// Sets the output format. Used when building configs outside of YAML.
    pub fn with_format(mut self, sample_rate: u32, channels: u16) -> Audio {
        self.sample_rate = Some(sample_rate);
        self.channels = Some(channels);
        self
    }

    /// Returns the device from the configuration.
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Returns the output sample rate (default: 44100).
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE)
    }

    /// Returns the output channel count (default: 2).
    pub fn channels(&self) -> u16 {
        self.channels.unwrap_or(DEFAULT_CHANNELS)
    }

    /// Returns the requested buffer period (default: 10ms).
    pub fn buffer(&self) -> Result<Duration, ConfigError> {
        match &self.buffer {
            Some(buffer) => DurationString::from_string(buffer.clone())
                .map(Into::into)
                .map_err(|e| ConfigError::InvalidDuration {
                    value: buffer.clone(),
                    reason: e.to_string(),
                }),
            None => Ok(DEFAULT_BUFFER),
        }
    }

    /// Returns the buffer period converted to frames at the output rate. Never zero.
    pub fn buffer_frames(&self) -> Result<u32, ConfigError> {
        let frames = self.buffer()?.as_secs_f64() * f64::from(self.sample_rate());
        Ok((frames.round() as u32).max(1))
    }

    /// Returns the mixer scratch size in samples (default: 4096).
    pub fn max_pull(&self) -> usize {
        self.max_pull.unwrap_or(DEFAULT_MAX_PULL)
    }

    /// Returns the cap on concurrently playing voices (default: 64).
    pub fn max_voices(&self) -> usize {
        self.max_voices.unwrap_or(DEFAULT_MAX_VOICES)
    }

    /// Returns the configured callback thread priority, if any.
    pub fn thread_priority(&self) -> Option<u8> {
        self.thread_priority
    }

    /// Returns whether realtime scheduling should be attempted (default: true).
    pub fn realtime(&self) -> bool {
        self.realtime.unwrap_or(true)
    }

    /// Checks values that would otherwise fail much later at device open.
    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_rate() == 0 {
            return Err(ConfigError::InvalidValue {
                field: "audio.sample_rate",
                reason: "must be positive".to_string(),
            });
        }
        if self.channels() == 0 {
            return Err(ConfigError::InvalidValue {
                field: "audio.channels",
                reason: "must be positive".to_string(),
            });
        }
        if self.max_pull() == 0 {
            return Err(ConfigError::InvalidValue {
                field: "audio.max_pull",
                reason: "must be positive".to_string(),
            });
        }
        if self.max_voices() == 0 {
            return Err(ConfigError::InvalidValue {
                field: "audio.max_voices",
                reason: "must be positive".to_string(),
            });
        }
        self.buffer()?;
        Ok(())
    }
}
