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
// Core audio mixing logic shared by every output backend.
use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, error, warn};

use crate::audio::sample_source::{adapt, SampleSourceError, VoiceSource};

/// Default size of the mixer's scratch buffer, in samples.
pub const DEFAULT_MAX_PULL: usize = 4096;

/// Default cap on concurrently playing voices.
pub const DEFAULT_MAX_VOICES: usize = 64;

/// Sums any number of concurrently playing voices into one output stream.
///
/// Producers hand new voices over a lock-free channel. Only the consumer
/// (the audio callback) touches the active set, so adding a voice never waits
/// on mixing and mixing never waits on a producer.
pub struct Mixer {
    /// Number of output channels.
    num_channels: u16,
    /// Output sample rate.
    sample_rate: u32,
    /// Voices added but not yet picked up by a pull.
    incoming_tx: Sender<ActiveVoice>,
    incoming_rx: Receiver<ActiveVoice>,
    /// Consumer-side state.
    state: Mutex<MixState>,
    /// Voices added and not yet retired, including ones still in flight.
    active: AtomicUsize,
    /// Cap on `active`. The active set is allocated to this size up front.
    max_voices: usize,
}

/// A voice in the mixer paired with its gain.
pub struct ActiveVoice {
    source: Box<dyn VoiceSource>,
    gain: f32,
}

struct MixState {
    voices: Vec<ActiveVoice>,
    /// Per-voice read buffer, allocated once. Always a whole number of frames.
    scratch: Vec<f32>,
}

impl Mixer {
    /// Creates a new mixer. `max_pull` sizes the scratch buffer; larger pulls
    /// are mixed in several passes rather than allocating. Playback is capped
    /// at [`DEFAULT_MAX_VOICES`] voices.
    pub fn new(num_channels: u16, sample_rate: u32, max_pull: usize) -> Self {
        Self::with_max_voices(num_channels, sample_rate, max_pull, DEFAULT_MAX_VOICES)
    }

    /// Creates a new mixer that plays at most `max_voices` voices at once.
    pub fn with_max_voices(
        num_channels: u16,
        sample_rate: u32,
        max_pull: usize,
        max_voices: usize,
    ) -> Self {
        let max_voices = max_voices.max(1);
        let num_channels = num_channels.max(1);
        let frame = num_channels as usize;
        let scratch_len = (max_pull / frame).max(1) * frame;
        let (incoming_tx, incoming_rx) = crossbeam_channel::unbounded();

        Self {
            num_channels,
            sample_rate,
            incoming_tx,
            incoming_rx,
            state: Mutex::new(MixState {
                voices: Vec::with_capacity(max_voices),
                scratch: vec![0.0; scratch_len],
            }),
            active: AtomicUsize::new(0),
            max_voices,
        }
    }

    /// Adapts `source` to the mixer's channel layout and queues it for
    /// playback at `gain`, which is clamped to [0, 1].
    ///
    /// Refused with [`SampleSourceError::VoiceLimit`] when the mixer is full.
    /// Playing voices are never cut short to make room.
    pub fn add_voice(
        &self,
        source: Box<dyn VoiceSource>,
        gain: f32,
    ) -> Result<(), SampleSourceError> {
        if source.sample_rate() != self.sample_rate {
            warn!(
                source_rate = source.sample_rate(),
                output_rate = self.sample_rate,
                "Voice sample rate differs from output, playing without resampling"
            );
        }

        let source = adapt(source, self.num_channels)?;
        let gain = clamp_gain(gain);

        // Reserve a slot before sending, so the active set never outgrows
        // its preallocated capacity.
        let reserved = self
            .active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |active| {
                (active < self.max_voices).then_some(active + 1)
            });
        if reserved.is_err() {
            warn!(max_voices = self.max_voices, "Voice limit reached, not playing");
            return Err(SampleSourceError::VoiceLimit {
                max_voices: self.max_voices,
            });
        }

        if let Err(e) = self.incoming_tx.send(ActiveVoice { source, gain }) {
            self.active.fetch_sub(1, Ordering::AcqRel);
            error!(error = %e, "Failed to hand voice to mixer");
            return Ok(());
        }

        debug!(gain, "Voice added");
        Ok(())
    }

    /// Mixes every active voice into `output` and returns `output.len()`.
    ///
    /// The output is zeroed first and voices are summed without normalization,
    /// so loud passages may exceed [-1, 1]. A voice that returns short, reports
    /// finished or fails is retired after contributing what it produced.
    /// Never allocates.
    pub fn pull(&self, output: &mut [f32]) -> usize {
        output.fill(0.0);

        let mut state = self.state.lock();
        let MixState { voices, scratch } = &mut *state;
        while let Ok(voice) = self.incoming_rx.try_recv() {
            voices.push(voice);
        }

        let mut retired = 0;
        for chunk in output.chunks_mut(scratch.len()) {
            if voices.is_empty() {
                break;
            }
            let requested = chunk.len();
            let voice_buffer = &mut scratch[..requested];

            voices.retain_mut(|voice| {
                let read = match voice.source.pull(voice_buffer) {
                    Ok(read) => read.min(requested),
                    Err(_) => 0,
                };
                for (out, sample) in chunk[..read].iter_mut().zip(&voice_buffer[..read]) {
                    *out += sample * voice.gain;
                }

                let keep = read == requested && !voice.source.is_finished();
                if !keep {
                    retired += 1;
                }
                keep
            });
        }

        if retired > 0 {
            self.active.fetch_sub(retired, Ordering::AcqRel);
        }
        output.len()
    }

    /// The number of voices added and not yet retired.
    pub fn active_voices(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// The most voices that may play at once.
    pub fn max_voices(&self) -> usize {
        self.max_voices
    }

    /// The read position of every active voice that has one. Picks up any
    /// queued voices first, so a voice added just before this call reports 0.
    pub fn voice_positions(&self) -> Vec<usize> {
        let mut state = self.state.lock();
        while let Ok(voice) = self.incoming_rx.try_recv() {
            state.voices.push(voice);
        }
        state
            .voices
            .iter()
            .filter_map(|voice| voice.source.position())
            .collect()
    }

    /// Gets the number of output channels
    pub fn num_channels(&self) -> u16 {
        self.num_channels
    }

    /// Gets the sample rate
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

/// A mixer is itself a source, so mixers can be nested.
impl VoiceSource for Mixer {
    fn pull(&mut self, output: &mut [f32]) -> Result<usize, SampleSourceError> {
        Ok(Mixer::pull(self, output))
    }

    fn channel_count(&self) -> u16 {
        self.num_channels
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn is_finished(&self) -> bool {
        false
    }
}

fn clamp_gain(gain: f32) -> f32 {
    if gain.is_nan() {
        0.0
    } else {
        gain.clamp(0.0, 1.0)
    }
}
