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
    collections::HashSet,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::{
    audio::sample_source::SampleBuffer,
    config,
    engine::{EngineError, PlaybackEngine},
    midi,
    samples::SampleBank,
};

/// How many bound keys a single poll may fire.
#[derive(Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PollPolicy {
    /// Only the first active binding, in binding order, fires per poll.
    #[default]
    Single,
    /// Every active binding fires.
    Multi,
}

/// The current state of the polled inputs.
pub trait KeyState {
    /// Returns true if `key` is currently active.
    fn is_down(&self, key: &str) -> bool;
}

impl KeyState for HashSet<String> {
    fn is_down(&self, key: &str) -> bool {
        self.contains(key)
    }
}

/// One trigger identity: the clip it plays and the inputs bound to it.
#[derive(Clone)]
pub struct Binding {
    name: String,
    key: Option<String>,
    /// Canonical note name, as produced by [`midi::note_name`].
    note: Option<String>,
    buffer: Arc<SampleBuffer>,
}

impl Binding {
    /// Creates a binding. The note, if given, is normalized; an unparseable
    /// note leaves the binding reachable by key only.
    pub fn new(
        name: &str,
        key: Option<&str>,
        note: Option<&str>,
        buffer: Arc<SampleBuffer>,
    ) -> Binding {
        Binding {
            name: name.to_string(),
            key: key.map(str::to_string),
            note: note.and_then(midi::normalize_note),
            buffer,
        }
    }

    /// Returns the name of the binding.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the bound key.
    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    /// Returns the bound note name.
    pub fn note(&self) -> Option<&str> {
        self.note.as_deref()
    }
}

/// Maps key and note events onto cached clips and plays them.
pub struct TriggerDispatcher {
    engine: Arc<PlaybackEngine>,
    bindings: Vec<Binding>,
    policy: PollPolicy,
    /// Set whenever anything fires; cleared by the host once per frame.
    fired: AtomicBool,
}

impl TriggerDispatcher {
    /// Creates a dispatcher with no bindings.
    pub fn new(engine: Arc<PlaybackEngine>, policy: PollPolicy) -> TriggerDispatcher {
        TriggerDispatcher {
            engine,
            bindings: Vec::new(),
            policy,
            fired: AtomicBool::new(false),
        }
    }

    /// Creates a dispatcher bound to every trigger in the config, in config order.
    pub fn from_config(
        engine: Arc<PlaybackEngine>,
        player: &config::Player,
        bank: &SampleBank,
    ) -> Result<TriggerDispatcher, config::ConfigError> {
        let mut dispatcher = TriggerDispatcher::new(engine, player.poll_policy());
        for trigger in player.triggers() {
            let Some(buffer) = bank.get(trigger.name()) else {
                continue;
            };
            let note = trigger.note()?;
            dispatcher.bind(Binding::new(
                trigger.name(),
                trigger.key(),
                note.as_deref(),
                buffer.clone(),
            ));
        }
        info!(
            bindings = dispatcher.bindings.len(),
            policy = ?dispatcher.policy,
            "Trigger dispatcher ready"
        );
        Ok(dispatcher)
    }

    /// Appends a binding. Bindings are checked in the order they were added.
    pub fn bind(&mut self, binding: Binding) {
        self.bindings.push(binding);
    }

    /// Returns the bindings in check order.
    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    /// Returns the poll policy.
    pub fn policy(&self) -> PollPolicy {
        self.policy
    }

    /// Fires bindings whose key is down, at full gain. Returns how many fired.
    ///
    /// A binding that fails to play does not stop the others under
    /// [`PollPolicy::Multi`]; the first failure is returned once every held
    /// key has been tried.
    pub fn poll(&self, keys: &dyn KeyState) -> Result<usize, EngineError> {
        let mut fired = 0;
        let mut first_error = None;
        for binding in &self.bindings {
            let Some(key) = binding.key.as_deref() else {
                continue;
            };
            if !keys.is_down(key) {
                continue;
            }

            match self.fire(binding, 1.0) {
                Ok(()) => fired += 1,
                Err(e) => {
                    warn!(trigger = binding.name, error = %e, "Trigger failed to play");
                    first_error.get_or_insert(e);
                }
            }
            if self.policy == PollPolicy::Single {
                break;
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(fired),
        }
    }

    /// Handles a note-on. Fires the first binding for `note` at a gain equal
    /// to `intensity`. Zero, negative and NaN intensities are note-offs and
    /// unknown notes are ignored; both return false.
    pub fn note_on(&self, note: &str, intensity: f32) -> Result<bool, EngineError> {
        if intensity.is_nan() || intensity <= 0.0 {
            return Ok(false);
        }
        let Some(note) = midi::normalize_note(note) else {
            debug!(note, "Ignoring unrecognized note");
            return Ok(false);
        };
        let Some(binding) = self
            .bindings
            .iter()
            .find(|binding| binding.note.as_deref() == Some(note.as_str()))
        else {
            debug!(note, "No trigger bound to note");
            return Ok(false);
        };

        self.fire(binding, intensity)?;
        Ok(true)
    }

    /// Returns whether anything fired since the last call, and resets the flag.
    pub fn take_frame_feedback(&self) -> bool {
        self.fired.swap(false, Ordering::AcqRel)
    }

    fn fire(&self, binding: &Binding, gain: f32) -> Result<(), EngineError> {
        self.engine.play_cached(&binding.buffer, gain)?;
        self.fired.store(true, Ordering::Release);
        debug!(trigger = binding.name, gain, "Triggered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::sample_source::SampleSourceError;
    use crate::audio::{mock, BufferRequest, OutputPath};
    use crate::engine::OutputFormat;

    fn engine() -> (mock::Device, Arc<PlaybackEngine>) {
        let device = mock::Device::manual("mock-trigger");
        let engine = PlaybackEngine::new(
            &[OutputPath {
                device: Arc::new(device.clone()),
                buffer: BufferRequest::Fixed(64),
            }],
            OutputFormat {
                sample_rate: 44100,
                channels: 1,
                max_pull: 256,
                max_voices: 16,
            },
        )
        .unwrap();
        (device, Arc::new(engine))
    }

    fn clip(value: f32) -> Arc<SampleBuffer> {
        Arc::new(SampleBuffer::new(vec![value; 1000], 1, 44100).unwrap())
    }

    fn dispatcher(policy: PollPolicy) -> (mock::Device, TriggerDispatcher) {
        let (device, engine) = engine();
        let mut dispatcher = TriggerDispatcher::new(engine, policy);
        dispatcher.bind(Binding::new("kick", Some("1"), Some("C2"), clip(0.1)));
        dispatcher.bind(Binding::new("snare", Some("2"), Some("38"), clip(0.2)));
        dispatcher.bind(Binding::new("hat", Some("3"), None, clip(0.4)));
        (device, dispatcher)
    }

    fn keys(keys: &[&str]) -> HashSet<String> {
        keys.iter().map(|k| k.to_string()).collect()
    }

    #[test]
    fn test_single_policy_first_match_wins() {
        let (device, dispatcher) = dispatcher(PollPolicy::Single);
        assert_eq!(dispatcher.poll(&keys(&["3", "2"])).unwrap(), 1);

        // Only the snare fired: it comes before the hat in binding order.
        let output = device.pull(4);
        assert!(output.iter().all(|s| (*s - 0.2).abs() < 1e-6));
    }

    #[test]
    fn test_multi_policy_fires_all() {
        let (device, dispatcher) = dispatcher(PollPolicy::Multi);
        assert_eq!(dispatcher.poll(&keys(&["1", "2", "3"])).unwrap(), 3);

        let output = device.pull(4);
        assert!(output.iter().all(|s| (*s - 0.7).abs() < 1e-6));
    }

    #[test]
    fn test_multi_policy_failure_does_not_silence_other_keys() {
        let (device, engine) = engine();
        let mut dispatcher = TriggerDispatcher::new(engine, PollPolicy::Multi);
        let stereo = Arc::new(SampleBuffer::new(vec![0.3; 1000], 2, 44100).unwrap());
        dispatcher.bind(Binding::new("wide", Some("0"), None, stereo));
        dispatcher.bind(Binding::new("kick", Some("1"), None, clip(0.1)));
        dispatcher.bind(Binding::new("hat", Some("3"), None, clip(0.4)));

        let result = dispatcher.poll(&keys(&["0", "1", "3"]));
        assert!(matches!(
            result,
            Err(EngineError::Source(
                SampleSourceError::UnsupportedChannelLayout { from: 2, to: 1 }
            ))
        ));

        // The stereo clip can't play on a mono output, but the others did.
        assert_eq!(dispatcher.engine.mixer().active_voices(), 2);
        assert!(dispatcher.take_frame_feedback());
        let output = device.pull(4);
        assert!(output.iter().all(|s| (*s - 0.5).abs() < 1e-6));
    }

    #[test]
    fn test_poll_nothing_down() {
        let (_device, dispatcher) = dispatcher(PollPolicy::Single);
        assert_eq!(dispatcher.poll(&keys(&["z"])).unwrap(), 0);
        assert!(!dispatcher.take_frame_feedback());
    }

    #[test]
    fn test_note_on_uses_intensity_as_gain() {
        let (device, dispatcher) = dispatcher(PollPolicy::Single);
        assert!(dispatcher.note_on("36", 0.5).unwrap());

        let output = device.pull(4);
        assert!(output.iter().all(|s| (*s - 0.05).abs() < 1e-6));
    }

    #[test]
    fn test_note_on_normalizes_identity() {
        let (_device, dispatcher) = dispatcher(PollPolicy::Single);
        assert_eq!(dispatcher.bindings()[1].note(), Some("D2"));
        assert!(dispatcher.note_on("D2", 1.0).unwrap());
    }

    #[test]
    fn test_note_off_and_unknown_ignored() {
        let (_device, dispatcher) = dispatcher(PollPolicy::Single);
        assert!(!dispatcher.note_on("C2", 0.0).unwrap());
        assert!(!dispatcher.note_on("C2", f32::NAN).unwrap());
        assert!(!dispatcher.note_on("C2", -1.0).unwrap());
        assert!(!dispatcher.note_on("A7", 1.0).unwrap());
        assert!(!dispatcher.note_on("garbage", 1.0).unwrap());
        assert!(!dispatcher.take_frame_feedback());
    }

    #[test]
    fn test_frame_feedback_resets() {
        let (_device, dispatcher) = dispatcher(PollPolicy::Single);
        dispatcher.poll(&keys(&["1"])).unwrap();
        assert!(dispatcher.take_frame_feedback());
        assert!(!dispatcher.take_frame_feedback());

        dispatcher.note_on("C2", 1.0).unwrap();
        assert!(dispatcher.take_frame_feedback());
    }

    #[test]
    fn test_retrigger_is_polyphonic() {
        let (_device, dispatcher) = dispatcher(PollPolicy::Single);
        dispatcher.poll(&keys(&["1"])).unwrap();
        dispatcher.poll(&keys(&["1"])).unwrap();
        assert_eq!(dispatcher.engine.mixer().active_voices(), 2);
    }

    #[test]
    fn test_stopped_engine_surfaces_error() {
        let (_device, dispatcher) = dispatcher(PollPolicy::Single);
        dispatcher.engine.shutdown();
        assert!(matches!(
            dispatcher.poll(&keys(&["1"])),
            Err(EngineError::Stopped)
        ));
    }
}
