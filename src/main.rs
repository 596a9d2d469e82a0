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
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{crate_version, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use padbank::audio::sample_source::FileDecoder;
use padbank::controller::keyboard;
use padbank::engine::PlaybackEngine;
use padbank::host::Host;
use padbank::samples::SampleBank;
use padbank::{audio, config, midi};

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A low-latency sample trigger for keys and MIDI pads."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lists the available audio output devices.
    Devices {},
    /// Lists the available MIDI input devices.
    MidiDevices {},
    /// Loads every clip in the given config and reports on it.
    Verify {
        /// The path to the player config.
        config_path: PathBuf,
    },
    /// Starts the trigger host.
    Start {
        /// The path to the player config.
        config_path: PathBuf,
    },
    /// Plays a single file through the given device and exits when it ends.
    Play {
        /// The device name to play through.
        device_name: String,
        /// The file to play.
        file: PathBuf,
        /// The gain to play at, from 0 to 1.
        #[arg(short, long, default_value_t = 1.0)]
        gain: f32,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Devices {} => {
            let devices = audio::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::MidiDevices {} => {
            let devices = midi::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::Verify { config_path } => {
            let player = config::load(&config_path)?;
            let bank = SampleBank::from_config(&player)?;

            println!("Triggers (count: {}):", player.triggers().len());
            for trigger in player.triggers() {
                let Some(clip) = bank.get(trigger.name()) else {
                    continue;
                };
                println!(
                    "- {} (key={}, note={}): {:.3}s, {} channel(s), {}Hz",
                    trigger.name(),
                    trigger.key().unwrap_or("-"),
                    trigger.note()?.as_deref().unwrap_or("-"),
                    clip.duration().as_secs_f64(),
                    clip.channel_count(),
                    clip.sample_rate(),
                );
            }
            println!("\nMemory: {} bytes", bank.total_memory_usage());

            let unplayable = bank.unplayable(player.audio().channels());
            if !unplayable.is_empty() {
                println!(
                    "\nCan't play on {} output channel(s): {}",
                    player.audio().channels(),
                    unplayable.join(", ")
                );
            }
        }
        Commands::Start { config_path } => {
            let host = Host::from_config(&config_path)?;
            host.run(Arc::new(keyboard::Driver::new())).await?;
        }
        Commands::Play {
            device_name,
            file,
            gain,
        } => {
            let sample_rate = FileDecoder::open(&file)?.sample_rate();
            let audio = config::Audio::new(&device_name).with_format(sample_rate, 2);
            let engine = PlaybackEngine::from_config(&audio)?;
            info!(output = engine.output(), file = ?file, "Playing file");
            engine.play_file(&file, gain)?;

            let ctrl_c = tokio::signal::ctrl_c();
            tokio::pin!(ctrl_c);
            let mut ticker = tokio::time::interval(Duration::from_millis(10));
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if engine.mixer().active_voices() == 0 {
                            break;
                        }
                    }
                    _ = &mut ctrl_c => break,
                }
            }
            engine.shutdown();
        }
    }

    Ok(())
}
