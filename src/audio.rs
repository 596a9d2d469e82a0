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
use std::{fmt, sync::Arc};

use tracing::warn;

use crate::config;

pub mod cpal;
pub mod mixer;
pub mod mock;
pub mod sample_source;
pub mod thread_priority;

pub use mixer::Mixer;

/// The callback a device invokes to fill each output buffer with interleaved
/// f32 samples.
pub type PullCallback = Box<dyn FnMut(&mut [f32]) + Send + 'static>;

/// How large a buffer to ask the device for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferRequest {
    /// A fixed period in frames. The low-latency path.
    Fixed(u32),
    /// Whatever the backend prefers. Usually higher latency, but widely supported.
    Default,
}

/// The stream shape requested when opening an output connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamRequest {
    pub sample_rate: u32,
    pub channels: u16,
    pub buffer: BufferRequest,
}

/// An output device that can open stream connections.
pub trait Device: fmt::Display + Send + Sync {
    /// Opens a connection for the requested stream. Nothing plays until the
    /// returned handle is started.
    fn open(&self, request: &StreamRequest) -> Result<Box<dyn DeviceHandle>, DeviceError>;
}

/// A live connection to an output device.
pub trait DeviceHandle: Send {
    /// Starts the device's callback loop, which invokes `callback` once per
    /// device buffer until the handle is closed.
    fn start(&mut self, callback: PullCallback) -> Result<(), DeviceError>;

    /// Stops the callback loop and releases the connection. Safe to call more
    /// than once.
    fn close(&mut self);
}

/// Errors raised while finding, opening or running an output device.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("no output device found with name {0}")]
    NotFound(String),

    #[error("no default output device available")]
    NoDefaultDevice,

    #[error("device {device} does not support {channels} channel(s) at {sample_rate}Hz")]
    UnsupportedFormat {
        device: String,
        channels: u16,
        sample_rate: u32,
    },

    #[error("device connection is closed")]
    Closed,

    #[error("output thread error: {0}")]
    Thread(String),

    #[error("error building output stream: {0}")]
    Build(#[from] ::cpal::BuildStreamError),

    #[error("error starting output stream: {0}")]
    Play(#[from] ::cpal::PlayStreamError),

    #[error("error querying device configurations: {0}")]
    SupportedConfigs(#[from] ::cpal::SupportedStreamConfigsError),

    #[error("error listing devices: {0}")]
    Devices(#[from] ::cpal::DevicesError),

    #[error("error reading device name: {0}")]
    Name(#[from] ::cpal::DeviceNameError),

    #[error("audio host unavailable: {0}")]
    Host(#[from] ::cpal::HostUnavailable),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// One way of reaching an output: a device plus the buffer size to ask for.
#[derive(Clone)]
pub struct OutputPath {
    pub device: Arc<dyn Device>,
    pub buffer: BufferRequest,
}

impl fmt::Display for OutputPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.buffer {
            BufferRequest::Fixed(frames) => write!(f, "{} ({} frame buffer)", self.device, frames),
            BufferRequest::Default => write!(f, "{} (default buffer)", self.device),
        }
    }
}

/// Lists devices known to cpal.
pub fn list_devices() -> Result<Vec<Box<dyn Device>>, DeviceError> {
    cpal::Device::list()
}

/// Gets a device with the given name. Names starting with "mock" produce a
/// mock device that consumes audio on a timer without any hardware.
pub fn get_device(config: &config::Audio) -> Result<Arc<dyn Device>, DeviceError> {
    let device = config.device();
    if device.starts_with("mock") {
        return Ok(Arc::new(mock::Device::clocked(device)));
    };

    Ok(Arc::new(cpal::Device::get(config)?))
}

/// Builds the ordered list of output paths to try: the configured device with
/// a small fixed buffer first, then the same device with the backend default,
/// then the system default device.
pub fn output_paths(
    config: &config::Audio,
    primary_frames: u32,
) -> Result<Vec<OutputPath>, DeviceError> {
    let mut paths = Vec::new();

    match get_device(config) {
        Ok(device) => {
            paths.push(OutputPath {
                device: device.clone(),
                buffer: BufferRequest::Fixed(primary_frames),
            });
            paths.push(OutputPath {
                device,
                buffer: BufferRequest::Default,
            });
        }
        Err(e) => warn!(
            device = config.device(),
            error = %e,
            "Configured output device unavailable"
        ),
    }

    if config.device() != cpal::DEFAULT_DEVICE && !config.device().starts_with("mock") {
        match cpal::Device::default_output(config) {
            Ok(device) => paths.push(OutputPath {
                device: Arc::new(device),
                buffer: BufferRequest::Default,
            }),
            Err(e) => warn!(error = %e, "System default output device unavailable"),
        }
    }

    if paths.is_empty() {
        return Err(DeviceError::NoDefaultDevice);
    }
    Ok(paths)
}
