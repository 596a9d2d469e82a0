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
use std::{path::Path, sync::Arc};

use parking_lot::Mutex;
use tracing::{debug, info, span, warn, Level};

use crate::audio::{
    self,
    sample_source::{CachedVoice, SampleBuffer, SampleSourceError, StreamingVoice},
    DeviceError, DeviceHandle, Mixer, OutputPath, StreamRequest,
};
use crate::config;

/// Errors raised by the playback engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("every output path failed: {}", join_errors(.0))]
    AllPathsFailed(Vec<DeviceError>),

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Source(#[from] SampleSourceError),

    #[error(transparent)]
    Config(#[from] config::ConfigError),

    #[error("playback engine has been shut down")]
    Stopped,
}

fn join_errors(errors: &[DeviceError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// The fixed output format of an engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OutputFormat {
    pub sample_rate: u32,
    pub channels: u16,
    /// The mixer's scratch size in samples.
    pub max_pull: usize,
    /// Cap on concurrently playing voices.
    pub max_voices: usize,
}

/// Owns the one output connection and the mixer it pulls from.
///
/// Built once by the host and passed around explicitly. Play calls are safe
/// from any thread; the device's callback thread is the only thing that pulls.
pub struct PlaybackEngine {
    mixer: Arc<Mixer>,
    handle: Mutex<Option<Box<dyn DeviceHandle>>>,
    output: String,
}

impl PlaybackEngine {
    /// Opens the first output path that works and starts pulling from a new
    /// mixer. Each failed path is logged and the next is tried.
    pub fn new(paths: &[OutputPath], format: OutputFormat) -> Result<PlaybackEngine, EngineError> {
        let span = span!(Level::INFO, "playback engine");
        let _enter = span.enter();

        let mut errors = Vec::new();
        for path in paths {
            let request = StreamRequest {
                sample_rate: format.sample_rate,
                channels: format.channels,
                buffer: path.buffer,
            };
            let mixer = Arc::new(Mixer::with_max_voices(
                format.channels,
                format.sample_rate,
                format.max_pull,
                format.max_voices,
            ));

            match Self::start(path, &request, mixer.clone()) {
                Ok(handle) => {
                    info!(output = %path, "Playback engine started");
                    return Ok(PlaybackEngine {
                        mixer,
                        handle: Mutex::new(Some(handle)),
                        output: path.to_string(),
                    });
                }
                Err(e) => {
                    warn!(output = %path, error = %e, "Output path failed, trying the next one");
                    errors.push(e);
                }
            }
        }

        Err(EngineError::AllPathsFailed(errors))
    }

    /// Builds an engine for the configured device, with fallbacks.
    pub fn from_config(config: &config::Audio) -> Result<PlaybackEngine, EngineError> {
        let paths = audio::output_paths(config, config.buffer_frames()?)?;
        PlaybackEngine::new(
            &paths,
            OutputFormat {
                sample_rate: config.sample_rate(),
                channels: config.channels(),
                max_pull: config.max_pull(),
                max_voices: config.max_voices(),
            },
        )
    }

    fn start(
        path: &OutputPath,
        request: &StreamRequest,
        mixer: Arc<Mixer>,
    ) -> Result<Box<dyn DeviceHandle>, DeviceError> {
        let mut handle = path.device.open(request)?;
        handle.start(Box::new(move |output: &mut [f32]| {
            mixer.pull(output);
        }))?;
        Ok(handle)
    }

    /// Plays a cached clip from the start. The same buffer may be playing any
    /// number of times at once; each call is an independent voice.
    pub fn play_cached(&self, buffer: &Arc<SampleBuffer>, gain: f32) -> Result<(), EngineError> {
        self.ensure_running()?;
        self.mixer
            .add_voice(Box::new(CachedVoice::new(buffer.clone())), gain)?;
        Ok(())
    }

    /// Streams a file from disk. Decoding happens on the callback thread, so
    /// prefer cached clips where latency matters.
    pub fn play_file<P: AsRef<Path>>(&self, path: P, gain: f32) -> Result<(), EngineError> {
        self.ensure_running()?;
        let voice = StreamingVoice::open(path.as_ref())?;
        debug!(path = ?path.as_ref(), gain, "Streaming file");
        self.mixer.add_voice(Box::new(voice), gain)?;
        Ok(())
    }

    /// Releases the output connection. Later calls do nothing.
    pub fn shutdown(&self) {
        if let Some(mut handle) = self.handle.lock().take() {
            handle.close();
            info!(output = self.output, "Playback engine shut down");
        }
    }

    /// Returns true until the engine has been shut down.
    pub fn is_running(&self) -> bool {
        self.handle.lock().is_some()
    }

    /// The mixer this engine pulls from.
    pub fn mixer(&self) -> &Arc<Mixer> {
        &self.mixer
    }

    /// A description of the output path in use.
    pub fn output(&self) -> &str {
        &self.output
    }

    fn ensure_running(&self) -> Result<(), EngineError> {
        if self.is_running() {
            Ok(())
        } else {
            Err(EngineError::Stopped)
        }
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{mixer::DEFAULT_MAX_VOICES, mock, BufferRequest};

    fn format(channels: u16) -> OutputFormat {
        OutputFormat {
            sample_rate: 44100,
            channels,
            max_pull: 1024,
            max_voices: DEFAULT_MAX_VOICES,
        }
    }

    fn path(device: &mock::Device, buffer: BufferRequest) -> OutputPath {
        OutputPath {
            device: Arc::new(device.clone()),
            buffer,
        }
    }

    fn constant_buffer(value: f32, frames: usize) -> Arc<SampleBuffer> {
        Arc::new(SampleBuffer::new(vec![value; frames], 1, 44100).unwrap())
    }

    #[test]
    fn test_primary_path_used_when_available() {
        let device = mock::Device::manual("mock-primary");
        let engine = PlaybackEngine::new(
            &[
                path(&device, BufferRequest::Fixed(441)),
                path(&device, BufferRequest::Default),
            ],
            format(2),
        )
        .unwrap();

        assert!(engine.is_running());
        assert_eq!(device.open_count(), 1);
        assert_eq!(
            device.last_request().map(|r| r.buffer),
            Some(BufferRequest::Fixed(441))
        );
    }

    #[test]
    fn test_falls_back_when_primary_fails() {
        let device = mock::Device::manual("mock-fallback").fail_fixed();
        let engine = PlaybackEngine::new(
            &[
                path(&device, BufferRequest::Fixed(441)),
                path(&device, BufferRequest::Default),
            ],
            format(2),
        )
        .unwrap();

        assert!(engine.is_running());
        assert_eq!(
            device.last_request().map(|r| r.buffer),
            Some(BufferRequest::Default)
        );
    }

    #[test]
    fn test_all_paths_failed() {
        let device = mock::Device::manual("mock-broken").fail_open();
        let result = PlaybackEngine::new(
            &[
                path(&device, BufferRequest::Fixed(441)),
                path(&device, BufferRequest::Default),
            ],
            format(2),
        );

        match result {
            Err(EngineError::AllPathsFailed(errors)) => assert_eq!(errors.len(), 2),
            _ => panic!("expected every path to fail"),
        }
    }

    #[test]
    fn test_play_cached_reaches_device() {
        let device = mock::Device::manual("mock-play");
        let engine =
            PlaybackEngine::new(&[path(&device, BufferRequest::Fixed(64))], format(2)).unwrap();

        let clip = constant_buffer(0.5, 100);
        engine.play_cached(&clip, 0.5).unwrap();
        engine.play_cached(&clip, 0.5).unwrap();
        assert_eq!(engine.mixer().active_voices(), 2);

        let output = device.pull(8);
        assert!(output.iter().all(|s| (*s - 0.5).abs() < 1e-6));
    }

    #[test]
    fn test_play_file_streams() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("clip.wav");
        crate::testutil::write_wav(&file, 1, 44100, &[0.25; 32]).unwrap();

        let device = mock::Device::manual("mock-stream");
        let engine =
            PlaybackEngine::new(&[path(&device, BufferRequest::Fixed(64))], format(1)).unwrap();
        engine.play_file(&file, 1.0).unwrap();

        let output = device.pull(64);
        assert!(output[..32].iter().all(|s| (*s - 0.25).abs() < 1e-6));
        assert!(output[32..].iter().all(|s| *s == 0.0));
        assert_eq!(engine.mixer().active_voices(), 0);
    }

    #[test]
    fn test_play_missing_file() {
        let device = mock::Device::manual("mock-missing");
        let engine =
            PlaybackEngine::new(&[path(&device, BufferRequest::Fixed(64))], format(2)).unwrap();
        assert!(matches!(
            engine.play_file("/definitely/not/here.wav", 1.0),
            Err(EngineError::Source(_))
        ));
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let device = mock::Device::manual("mock-shutdown");
        let engine =
            PlaybackEngine::new(&[path(&device, BufferRequest::Fixed(64))], format(2)).unwrap();

        engine.shutdown();
        assert!(!engine.is_running());
        assert!(device.is_closed());
        engine.shutdown();

        let clip = constant_buffer(0.5, 10);
        assert!(matches!(
            engine.play_cached(&clip, 1.0),
            Err(EngineError::Stopped)
        ));
    }
}
