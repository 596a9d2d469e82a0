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
use std::{io, thread};

use tokio::sync::mpsc::Sender;
use tracing::{debug, info, span, Level};

use super::Event;

const QUIT: &str = "quit";
const EXIT: &str = "exit";

/// A controller that reads key presses from stdin, one line at a time.
/// Every non-whitespace character on a line is a key press.
#[derive(Default)]
pub struct Driver {}

impl Driver {
    pub fn new() -> Driver {
        Driver {}
    }

    /// Reads one line and sends the resulting event. Returns false once the
    /// input is exhausted or nobody is listening any more.
    fn monitor_io<R, W>(
        events_tx: &Sender<Event>,
        mut reader: R,
        mut writer: W,
    ) -> Result<bool, io::Error>
    where
        R: io::BufRead,
        W: io::Write,
    {
        write!(writer, "Keys ({} to stop): ", QUIT)?;
        writer.flush()?;
        let mut input: String = String::default();
        if reader.read_line(&mut input)? == 0 {
            return Ok(false);
        }

        let event = match input.trim().to_lowercase().as_str() {
            QUIT | EXIT => Event::Quit,
            _ => {
                let keys: Vec<String> = input
                    .chars()
                    .filter(|c| !c.is_whitespace())
                    .map(String::from)
                    .collect();
                if keys.is_empty() {
                    return Ok(true);
                }
                Event::Keys(keys)
            }
        };
        debug!(event = ?event, "Keyboard input");
        Ok(events_tx.blocking_send(event).is_ok())
    }
}

impl super::Driver for Driver {
    fn monitor_events(
        &self,
        events_tx: Sender<Event>,
    ) -> thread::JoinHandle<Result<(), io::Error>> {
        thread::spawn(move || {
            let span = span!(Level::INFO, "keyboard driver");
            let _enter = span.enter();

            info!("Keyboard driver started.");

            while Self::monitor_io(&events_tx, io::stdin().lock(), io::stdout())? {}

            info!("Keyboard driver stopped.");
            Ok(())
        })
    }
}
