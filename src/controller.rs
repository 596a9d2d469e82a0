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
use std::{io, thread::JoinHandle};

use tokio::sync::mpsc::Sender;

pub mod keyboard;

/// Controller events that drive the trigger host.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    /// These keys went down. They count as held for the next poll only.
    Keys(Vec<String>),

    /// Shut the host down.
    Quit,
}

pub trait Driver: Send + Sync + 'static {
    /// Starts watching the input in the background and sends events until
    /// the input ends or the receiver goes away.
    fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>>;
}
