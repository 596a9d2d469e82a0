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
use std::path::PathBuf;

/// Error types for sample source operations
#[derive(Debug, thiserror::Error)]
pub enum SampleSourceError {
    #[error("Unable to decode {path}: {reason}")]
    Decode { path: PathBuf, reason: String },

    #[error("Unsupported channel layout: {from} channel(s) -> {to} channel(s)")]
    UnsupportedChannelLayout { from: u16, to: u16 },

    #[error("Voice limit reached ({max_voices} playing)")]
    VoiceLimit { max_voices: usize },

    #[error("Invalid sample buffer: {0}")]
    InvalidBuffer(String),

    #[error("Audio file error: {0}")]
    AudioError(#[from] symphonia::core::errors::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl SampleSourceError {
    /// Returns true if this error means the clip could not be read or decoded.
    pub fn is_decode_error(&self) -> bool {
        matches!(
            self,
            SampleSourceError::Decode { .. }
                | SampleSourceError::AudioError(_)
                | SampleSourceError::IoError(_)
        )
    }
}
