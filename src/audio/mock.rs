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
use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use crossbeam_channel::{RecvTimeoutError, Sender};
use parking_lot::Mutex;
use tracing::{info, span, Level};

use super::{BufferRequest, DeviceError, DeviceHandle, PullCallback, StreamRequest};

/// Frames per period when the request leaves the buffer size to the device.
const DEFAULT_PERIOD_FRAMES: u32 = 512;

/// State shared between a mock device and the handles it opens.
#[derive(Default)]
struct Shared {
    callback: Mutex<Option<PullCallback>>,
    last_request: Mutex<Option<StreamRequest>>,
    running: AtomicBool,
    closed: AtomicBool,
    opens: AtomicUsize,
}

/// A mock device. Doesn't play anything, but drives the pull callback either
/// on its own clock thread or by hand from tests.
#[derive(Clone)]
pub struct Device {
    name: String,
    clocked: bool,
    fail_fixed: bool,
    fail_open: bool,
    shared: Arc<Shared>,
}

impl Device {
    /// A mock device that pulls from its callback at the buffer cadence, the
    /// way a real device would.
    pub fn clocked(name: &str) -> Device {
        Device {
            name: name.to_string(),
            clocked: true,
            fail_fixed: false,
            fail_open: false,
            shared: Arc::new(Shared::default()),
        }
    }

    /// A mock device that only pulls when told to via [`Device::pull`].
    pub fn manual(name: &str) -> Device {
        Device {
            clocked: false,
            ..Device::clocked(name)
        }
    }

    /// Refuse fixed-size buffer requests, forcing callers onto a fallback.
    pub fn fail_fixed(mut self) -> Device {
        self.fail_fixed = true;
        self
    }

    /// Refuse every open request.
    pub fn fail_open(mut self) -> Device {
        self.fail_open = true;
        self
    }

    /// Invokes the installed callback once for `len` samples and returns what
    /// it wrote. Silence if nothing has been started.
    pub fn pull(&self, len: usize) -> Vec<f32> {
        let mut buffer = vec![0.0; len];
        if let Some(callback) = self.shared.callback.lock().as_mut() {
            callback(&mut buffer);
        }
        buffer
    }

    /// Returns true while a started handle is open.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Returns true once a handle has been closed.
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// The last request that was successfully opened.
    pub fn last_request(&self) -> Option<StreamRequest> {
        *self.shared.last_request.lock()
    }

    /// How many times this device has been opened successfully.
    pub fn open_count(&self) -> usize {
        self.shared.opens.load(Ordering::Acquire)
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name)
    }
}

impl super::Device for Device {
    fn open(&self, request: &StreamRequest) -> Result<Box<dyn DeviceHandle>, DeviceError> {
        let span = span!(Level::INFO, "open output (mock)");
        let _enter = span.enter();

        if self.fail_open || (self.fail_fixed && matches!(request.buffer, BufferRequest::Fixed(_)))
        {
            return Err(DeviceError::UnsupportedFormat {
                device: self.name.clone(),
                channels: request.channels,
                sample_rate: request.sample_rate,
            });
        }

        *self.shared.last_request.lock() = Some(*request);
        self.shared.opens.fetch_add(1, Ordering::AcqRel);
        info!(device = self.name, request = ?request, "Opened mock output");

        Ok(Box::new(Handle {
            shared: self.shared.clone(),
            request: *request,
            clocked: self.clocked,
            stop_tx: None,
            clock_thread: None,
        }))
    }
}

struct Handle {
    shared: Arc<Shared>,
    request: StreamRequest,
    clocked: bool,
    stop_tx: Option<Sender<()>>,
    clock_thread: Option<thread::JoinHandle<()>>,
}

impl DeviceHandle for Handle {
    fn start(&mut self, callback: PullCallback) -> Result<(), DeviceError> {
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(DeviceError::Closed);
        }
        *self.shared.callback.lock() = Some(callback);
        self.shared.running.store(true, Ordering::Release);

        if self.clocked {
            let frames = match self.request.buffer {
                BufferRequest::Fixed(frames) => frames.max(1),
                BufferRequest::Default => DEFAULT_PERIOD_FRAMES,
            };
            let period = Duration::from_secs_f64(
                f64::from(frames) / f64::from(self.request.sample_rate.max(1)),
            );
            let len = frames as usize * usize::from(self.request.channels);
            let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
            let shared = self.shared.clone();

            self.clock_thread = Some(
                thread::Builder::new()
                    .name("padbank-mock-clock".to_string())
                    .spawn(move || {
                        let mut buffer = vec![0.0f32; len];
                        loop {
                            match stop_rx.recv_timeout(period) {
                                Err(RecvTimeoutError::Timeout) => {
                                    if let Some(callback) = shared.callback.lock().as_mut() {
                                        callback(&mut buffer);
                                    }
                                }
                                _ => return,
                            }
                        }
                    })?,
            );
            self.stop_tx = Some(stop_tx);
        }
        Ok(())
    }

    fn close(&mut self) {
        drop(self.stop_tx.take());
        if let Some(thread) = self.clock_thread.take() {
            let _ = thread.join();
        }
        if self.shared.running.swap(false, Ordering::AcqRel) {
            self.shared.closed.store(true, Ordering::Release);
            *self.shared.callback.lock() = None;
        }
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::Device as _;
    use crate::testutil::eventually;

    fn request(buffer: BufferRequest) -> StreamRequest {
        StreamRequest {
            sample_rate: 44100,
            channels: 2,
            buffer,
        }
    }

    #[test]
    fn test_manual_pull_drives_callback() {
        let device = Device::manual("mock-manual");
        let mut handle = device.open(&request(BufferRequest::Fixed(64))).unwrap();
        assert_eq!(device.pull(4), vec![0.0; 4]);

        handle.start(Box::new(|out: &mut [f32]| out.fill(0.5))).unwrap();
        assert!(device.is_running());
        assert_eq!(device.pull(4), vec![0.5; 4]);

        handle.close();
        assert!(!device.is_running());
        assert!(device.is_closed());
        assert_eq!(device.pull(4), vec![0.0; 4]);

        // Closing twice is harmless.
        handle.close();
        assert!(device.is_closed());
    }

    #[test]
    fn test_fail_fixed_accepts_default() {
        let device = Device::manual("mock-fixed").fail_fixed();
        assert!(device.open(&request(BufferRequest::Fixed(64))).is_err());
        assert!(device.open(&request(BufferRequest::Default)).is_ok());
        assert_eq!(device.open_count(), 1);
        assert_eq!(
            device.last_request().map(|r| r.buffer),
            Some(BufferRequest::Default)
        );
    }

    #[test]
    fn test_clocked_device_pulls_on_its_own() {
        let device = Device::clocked("mock-clocked");
        let mut handle = device.open(&request(BufferRequest::Fixed(32))).unwrap();
        let pulls = Arc::new(AtomicUsize::new(0));
        let counter = pulls.clone();
        handle
            .start(Box::new(move |out: &mut [f32]| {
                assert_eq!(out.len(), 64);
                counter.fetch_add(1, Ordering::Relaxed);
            }))
            .unwrap();

        eventually(
            || pulls.load(Ordering::Relaxed) >= 3,
            "clocked mock never pulled",
        );
        handle.close();
        let after_close = pulls.load(Ordering::Relaxed);
        thread::sleep(Duration::from_millis(20));
        assert_eq!(pulls.load(Ordering::Relaxed), after_close);
    }
}
