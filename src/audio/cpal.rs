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
use std::{fmt, thread};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SizedSample};
use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, error, info, span, warn, Level};

use super::thread_priority::{configure_audio_thread_priority, ThreadPrioritySettings};
use super::{BufferRequest, DeviceError, DeviceHandle, PullCallback, StreamRequest};
use crate::{audio::Device as AudioDevice, config};

/// The device name that selects the host's default output device.
pub const DEFAULT_DEVICE: &str = "default";

/// Frames converted per pass for devices that don't take f32 directly.
const CONVERSION_FRAMES: usize = 2048;

/// Preference order when a device supports several sample formats.
const FORMAT_PREFERENCE: [cpal::SampleFormat; 4] = [
    cpal::SampleFormat::F32,
    cpal::SampleFormat::I32,
    cpal::SampleFormat::I16,
    cpal::SampleFormat::U16,
];

/// A small wrapper around a cpal::Device.
pub struct Device {
    /// The name of the device.
    name: String,
    /// The maximum number of channels the device supports.
    max_channels: u16,
    /// The host ID of the device.
    host_id: cpal::HostId,
    /// The underlying cpal device.
    device: cpal::Device,
    /// Priority applied to the callback thread once it starts.
    priority: ThreadPrioritySettings,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Channels={}) ({})",
            self.name,
            self.max_channels,
            self.host_id.name()
        )
    }
}

impl Device {
    /// Lists cpal devices and produces the Device trait.
    pub fn list() -> Result<Vec<Box<dyn AudioDevice>>, DeviceError> {
        Ok(Device::list_cpal_devices(ThreadPrioritySettings::default())?
            .into_iter()
            .map(|device| {
                let device: Box<dyn AudioDevice> = Box::new(device);
                device
            })
            .collect())
    }

    /// Lists cpal devices that have at least one output configuration.
    fn list_cpal_devices(priority: ThreadPrioritySettings) -> Result<Vec<Device>, DeviceError> {
        // Suppress noisy backend output here.
        let _shh_stdout = shh::stdout()?;
        let _shh_stderr = shh::stderr()?;

        let mut devices: Vec<Device> = Vec::new();
        for host_id in cpal::available_hosts() {
            let host_devices = match cpal::host_from_id(host_id)?.output_devices() {
                Ok(host_devices) => host_devices,
                Err(e) => {
                    error!(
                        err = e.to_string(),
                        host = host_id.name(),
                        "Unable to list devices for host"
                    );
                    continue;
                }
            };

            for device in host_devices {
                let Ok(output_configs) = device.supported_output_configs() else {
                    continue;
                };
                let max_channels = output_configs
                    .map(|config| config.channels())
                    .max()
                    .unwrap_or(0);

                if max_channels > 0 {
                    devices.push(Device {
                        name: device.name()?,
                        max_channels,
                        host_id,
                        device,
                        priority,
                    })
                }
            }
        }

        devices.sort_by_key(|device| device.name.to_string());
        Ok(devices)
    }

    /// Gets the given cpal device. "default" picks the host's default output.
    pub fn get(config: &config::Audio) -> Result<Device, DeviceError> {
        let name = config.device();
        if name == DEFAULT_DEVICE {
            return Device::default_output(config);
        }

        let priority = ThreadPrioritySettings::from_config(config);
        Device::list_cpal_devices(priority)?
            .into_iter()
            .find(|device| device.name.trim() == name)
            .ok_or_else(|| DeviceError::NotFound(name.to_string()))
    }

    /// Gets the default output device of the default host.
    pub fn default_output(config: &config::Audio) -> Result<Device, DeviceError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or(DeviceError::NoDefaultDevice)?;
        let max_channels = device
            .supported_output_configs()?
            .map(|config| config.channels())
            .max()
            .unwrap_or(0);

        Ok(Device {
            name: device.name()?,
            max_channels,
            host_id: host.id(),
            device,
            priority: ThreadPrioritySettings::from_config(config),
        })
    }

    /// Finds a supported configuration for the request, preferring float output.
    fn choose_config(
        &self,
        request: &StreamRequest,
    ) -> Result<(cpal::StreamConfig, cpal::SampleFormat), DeviceError> {
        let sample_rate = cpal::SampleRate(request.sample_rate);
        let candidates: Vec<cpal::SupportedStreamConfigRange> = self
            .device
            .supported_output_configs()?
            .filter(|config| {
                config.channels() == request.channels
                    && config.min_sample_rate() <= sample_rate
                    && config.max_sample_rate() >= sample_rate
            })
            .collect();

        let supported = FORMAT_PREFERENCE
            .iter()
            .find_map(|format| {
                candidates
                    .iter()
                    .find(|config| config.sample_format() == *format)
            })
            .ok_or_else(|| DeviceError::UnsupportedFormat {
                device: self.name.clone(),
                channels: request.channels,
                sample_rate: request.sample_rate,
            })?;

        let buffer_size = match request.buffer {
            BufferRequest::Fixed(frames) => match supported.buffer_size() {
                cpal::SupportedBufferSize::Range { min, max } => {
                    cpal::BufferSize::Fixed(frames.clamp(*min, *max))
                }
                cpal::SupportedBufferSize::Unknown => cpal::BufferSize::Fixed(frames),
            },
            BufferRequest::Default => cpal::BufferSize::Default,
        };

        Ok((
            cpal::StreamConfig {
                channels: request.channels,
                sample_rate,
                buffer_size,
            },
            supported.sample_format(),
        ))
    }
}

impl AudioDevice for Device {
    fn open(&self, request: &StreamRequest) -> Result<Box<dyn DeviceHandle>, DeviceError> {
        let span = span!(Level::INFO, "open output (cpal)");
        let _enter = span.enter();

        let (config, sample_format) = self.choose_config(request)?;
        info!(
            device = self.name,
            channels = config.channels,
            sample_rate = config.sample_rate.0,
            buffer = ?config.buffer_size,
            format = ?sample_format,
            "Opened output device"
        );

        Ok(Box::new(Handle {
            name: self.name.clone(),
            device: self.device.clone(),
            config,
            sample_format,
            priority: self.priority,
            stop_tx: None,
            output_thread: None,
        }))
    }
}

/// A running (or ready to run) cpal output stream.
///
/// cpal streams cannot move between threads on every platform, so the stream
/// lives on a dedicated thread that owns it until the handle is closed.
struct Handle {
    name: String,
    device: cpal::Device,
    config: cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    priority: ThreadPrioritySettings,
    /// Dropping this sender tells the output thread to drop the stream.
    stop_tx: Option<Sender<()>>,
    output_thread: Option<thread::JoinHandle<()>>,
}

impl DeviceHandle for Handle {
    fn start(&mut self, callback: PullCallback) -> Result<(), DeviceError> {
        if self.output_thread.is_some() {
            return Err(DeviceError::Thread("stream already started".to_string()));
        }

        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<(), DeviceError>>(1);
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
        let device = self.device.clone();
        let config = self.config.clone();
        let sample_format = self.sample_format;
        let priority = self.priority;

        let output_thread = thread::Builder::new()
            .name("padbank-output".to_string())
            .spawn(move || {
                run_stream(device, config, sample_format, priority, callback, ready_tx, stop_rx)
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                info!(device = self.name, "Output stream started");
                self.stop_tx = Some(stop_tx);
                self.output_thread = Some(output_thread);
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = output_thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = output_thread.join();
                Err(DeviceError::Thread(
                    "output thread exited before the stream started".to_string(),
                ))
            }
        }
    }

    fn close(&mut self) {
        drop(self.stop_tx.take());
        if let Some(thread) = self.output_thread.take() {
            if thread.join().is_err() {
                warn!(device = self.name, "Output thread panicked");
            }
            info!(device = self.name, "Output stream closed");
        }
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        self.close();
    }
}

/// Builds and plays the stream, reports the outcome, then keeps the stream
/// alive until the stop channel disconnects.
fn run_stream(
    device: cpal::Device,
    config: cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    priority: ThreadPrioritySettings,
    callback: PullCallback,
    ready_tx: Sender<Result<(), DeviceError>>,
    stop_rx: Receiver<()>,
) {
    let channels = config.channels as usize;
    let err_fn = |err: cpal::StreamError| error!("cpal output stream error: {}", err);

    let stream_result = match sample_format {
        cpal::SampleFormat::F32 => device.build_output_stream(
            &config,
            create_f32_callback(callback, priority),
            err_fn,
            None,
        ),
        cpal::SampleFormat::I32 => device.build_output_stream(
            &config,
            create_converting_callback::<i32>(callback, priority, channels),
            err_fn,
            None,
        ),
        cpal::SampleFormat::I16 => device.build_output_stream(
            &config,
            create_converting_callback::<i16>(callback, priority, channels),
            err_fn,
            None,
        ),
        _ => device.build_output_stream(
            &config,
            create_converting_callback::<u16>(callback, priority, channels),
            err_fn,
            None,
        ),
    };

    let stream = match stream_result {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready_tx.send(Err(e.into()));
            return;
        }
    };
    if let Err(e) = stream.play() {
        let _ = ready_tx.send(Err(e.into()));
        return;
    }
    let _ = ready_tx.send(Ok(()));

    // Blocks until the handle sends or drops the stop sender.
    let _ = stop_rx.recv();
    debug!("Stopping output stream");
    drop(stream);
}

/// f32 callback: the mixer writes straight into the device buffer.
fn create_f32_callback(
    mut pull: PullCallback,
    priority: ThreadPrioritySettings,
) -> impl FnMut(&mut [f32], &cpal::OutputCallbackInfo) + Send + 'static {
    let mut priority_set = false;
    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
        configure_audio_thread_priority(priority, &mut priority_set);
        pull(data);
    }
}

/// Integer callback: mix into a preallocated f32 scratch and convert.
fn create_converting_callback<T>(
    mut pull: PullCallback,
    priority: ThreadPrioritySettings,
    channels: usize,
) -> impl FnMut(&mut [T], &cpal::OutputCallbackInfo) + Send + 'static
where
    T: SizedSample + FromSample<f32>,
{
    let mut scratch = vec![0.0f32; CONVERSION_FRAMES * channels.max(1)];
    let mut priority_set = false;
    move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
        configure_audio_thread_priority(priority, &mut priority_set);
        for out in data.chunks_mut(scratch.len()) {
            let mixed = &mut scratch[..out.len()];
            pull(mixed);
            for (dst, &src) in out.iter_mut().zip(mixed.iter()) {
                *dst = T::from_sample(src);
            }
        }
    }
}
