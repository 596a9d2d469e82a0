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
use std::{collections::HashSet, error::Error, path::Path, sync::Arc, time::Duration};

use tokio::{sync::mpsc, time::MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::{
    config,
    controller::{Driver, Event},
    engine::PlaybackEngine,
    midi,
    samples::SampleBank,
    trigger::TriggerDispatcher,
};

/// Runs the trigger loop: polls key state once per frame, feeds MIDI note-ons
/// straight to the dispatcher, and shuts the engine down on exit.
pub struct Host {
    engine: Arc<PlaybackEngine>,
    dispatcher: Arc<TriggerDispatcher>,
    frame_rate: u32,
    midi_device: Option<String>,
}

impl Host {
    pub fn new(
        engine: Arc<PlaybackEngine>,
        dispatcher: Arc<TriggerDispatcher>,
        frame_rate: u32,
        midi_device: Option<String>,
    ) -> Host {
        Host {
            engine,
            dispatcher,
            frame_rate: frame_rate.max(1),
            midi_device,
        }
    }

    /// Loads the config at `path`, every clip it names, and opens the output.
    pub fn from_config(path: &Path) -> Result<Host, Box<dyn Error>> {
        let player = config::load(path)?;
        let bank = SampleBank::from_config(&player)?;
        let engine = Arc::new(PlaybackEngine::from_config(player.audio())?);
        let dispatcher = Arc::new(TriggerDispatcher::from_config(
            engine.clone(),
            &player,
            &bank,
        )?);

        Ok(Host::new(
            engine,
            dispatcher,
            player.frame_rate(),
            player.midi().map(|midi| midi.device().to_string()),
        ))
    }

    /// The engine this host plays through.
    pub fn engine(&self) -> &Arc<PlaybackEngine> {
        &self.engine
    }

    /// Runs one frame: fires bindings for `keys` and reports whether anything
    /// fired since the previous frame, from either source.
    pub fn frame(&self, keys: &HashSet<String>) -> bool {
        if let Err(e) = self.dispatcher.poll(keys) {
            warn!(error = %e, "Unable to dispatch key triggers");
        }
        self.dispatcher.take_frame_feedback()
    }

    /// Runs until the driver sends quit or Ctrl-C arrives.
    pub async fn run(self, driver: Arc<dyn Driver>) -> Result<(), Box<dyn Error>> {
        let midi_input = self.midi_device.as_deref().and_then(|device| {
            let dispatcher = self.dispatcher.clone();
            match midi::Input::connect(device, move |note_on| {
                if let Err(e) = dispatcher.note_on(&note_on.note, note_on.intensity) {
                    warn!(error = %e, "Unable to dispatch note trigger");
                }
            }) {
                Ok(input) => Some(input),
                Err(e) => {
                    warn!(error = %e, "MIDI input unavailable, continuing with keys only");
                    None
                }
            }
        });

        let (events_tx, mut events_rx) = mpsc::channel::<Event>(16);
        // The driver thread is never joined; it may be parked on a blocking read.
        let _driver_thread = driver.monitor_events(events_tx);
        let mut keys_open = true;

        let mut ticker =
            tokio::time::interval(Duration::from_secs_f64(1.0 / f64::from(self.frame_rate)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        info!(frame_rate = self.frame_rate, output = self.engine.output(), "Host running");
        let mut pressed: HashSet<String> = HashSet::new();
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if self.frame(&pressed) {
                        debug!("Trigger fired this frame");
                    }
                    pressed.clear();
                }
                event = events_rx.recv(), if keys_open => match event {
                    Some(Event::Keys(keys)) => pressed.extend(keys),
                    Some(Event::Quit) => {
                        info!("Quit requested");
                        break;
                    }
                    None => {
                        info!("Keyboard input closed, waiting for Ctrl-C");
                        keys_open = false;
                    }
                },
                result = &mut ctrl_c => {
                    if let Err(e) = result {
                        warn!(error = %e, "Unable to listen for Ctrl-C");
                    }
                    info!("Interrupted");
                    break;
                }
            }
        }

        if let Some(input) = midi_input {
            input.close();
        }
        self.engine.shutdown();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{io, thread};

    use tokio::sync::mpsc::Sender;

    use super::*;
    use crate::audio::{mock, sample_source::SampleBuffer, BufferRequest, OutputPath};
    use crate::engine::OutputFormat;
    use crate::trigger::{Binding, PollPolicy};

    struct ScriptedDriver {
        events: Vec<Event>,
    }

    impl Driver for ScriptedDriver {
        fn monitor_events(
            &self,
            events_tx: Sender<Event>,
        ) -> thread::JoinHandle<Result<(), io::Error>> {
            let events = self.events.clone();
            thread::spawn(move || {
                for event in events {
                    thread::sleep(Duration::from_millis(100));
                    if events_tx.blocking_send(event).is_err() {
                        break;
                    }
                }
                Ok(())
            })
        }
    }

    fn host() -> (mock::Device, Host) {
        let device = mock::Device::manual("mock-host");
        let engine = Arc::new(
            PlaybackEngine::new(
                &[OutputPath {
                    device: Arc::new(device.clone()),
                    buffer: BufferRequest::Fixed(64),
                }],
                OutputFormat {
                    sample_rate: 44100,
                    channels: 2,
                    max_pull: 512,
                    max_voices: 16,
                },
            )
            .unwrap(),
        );
        let clip = Arc::new(SampleBuffer::new(vec![0.5; 44100], 1, 44100).unwrap());
        let mut dispatcher = TriggerDispatcher::new(engine.clone(), PollPolicy::Single);
        dispatcher.bind(Binding::new("kick", Some("k"), Some("C2"), clip));
        (device, Host::new(engine, Arc::new(dispatcher), 100, None))
    }

    #[test]
    fn test_frame_reports_feedback() {
        let (_device, host) = host();
        let keys: HashSet<String> = ["k".to_string()].into_iter().collect();
        assert!(host.frame(&keys));
        assert!(!host.frame(&HashSet::new()));
        assert_eq!(host.engine().mixer().active_voices(), 1);
    }

    #[tokio::test]
    async fn test_run_until_quit() {
        let (device, host) = host();
        let engine = host.engine().clone();
        let driver = Arc::new(ScriptedDriver {
            events: vec![Event::Keys(vec!["k".to_string()]), Event::Quit],
        });

        host.run(driver).await.unwrap();

        assert_eq!(engine.mixer().active_voices(), 1);
        assert!(!engine.is_running());
        assert!(device.is_closed());
    }
}
