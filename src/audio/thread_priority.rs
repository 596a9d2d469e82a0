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

use thread_priority::{set_current_thread_priority, ThreadPriority, ThreadPriorityValue};
use tracing::{info, warn};

use crate::config;

/// Default priority for the audio callback thread when nothing else is set.
const DEFAULT_CALLBACK_THREAD_PRIORITY: u8 = 70;

/// Overrides the callback thread priority (0-99).
const PRIORITY_ENV: &str = "PADBANK_THREAD_PRIORITY";

/// Disables SCHED_FIFO scheduling for the callback thread when truthy.
const DISABLE_RT_ENV: &str = "PADBANK_DISABLE_RT_AUDIO";

/// How the audio callback thread should be scheduled. Resolved once when a
/// device is opened so the callback never reads the environment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ThreadPrioritySettings {
    pub priority: u8,
    pub realtime: bool,
}

impl Default for ThreadPrioritySettings {
    fn default() -> Self {
        ThreadPrioritySettings {
            priority: callback_thread_priority(None),
            realtime: rt_audio_enabled(true),
        }
    }
}

impl ThreadPrioritySettings {
    /// Resolves settings from the audio config, letting the environment win.
    pub fn from_config(config: &config::Audio) -> Self {
        ThreadPrioritySettings {
            priority: callback_thread_priority(config.thread_priority()),
            realtime: rt_audio_enabled(config.realtime()),
        }
    }
}

/// Picks the callback priority: the environment, then the configured value,
/// then the default. Out-of-range values are ignored.
pub fn callback_thread_priority(configured: Option<u8>) -> u8 {
    std::env::var(PRIORITY_ENV)
        .ok()
        .and_then(|v| v.parse::<u8>().ok())
        .filter(|n| *n < 100)
        .or(configured.filter(|n| *n < 100))
        .unwrap_or(DEFAULT_CALLBACK_THREAD_PRIORITY)
}

pub(crate) fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .ok()
        .map(|v| {
            v == "1"
                || v.eq_ignore_ascii_case("true")
                || v.eq_ignore_ascii_case("yes")
                || v.eq_ignore_ascii_case("on")
        })
        .unwrap_or(false)
}

/// Returns whether we should attempt RT (SCHED_FIFO) scheduling for the audio callback thread.
pub fn rt_audio_enabled(configured: bool) -> bool {
    configured && !env_flag(DISABLE_RT_ENV)
}

/// Applies the settings to the current thread. Runs once per thread; later
/// calls return immediately.
pub fn configure_audio_thread_priority(settings: ThreadPrioritySettings, priority_set: &mut bool) {
    if *priority_set {
        return;
    }
    *priority_set = true;

    let Ok(value) = ThreadPriorityValue::try_from(settings.priority) else {
        warn!(priority = settings.priority, "Invalid audio thread priority");
        return;
    };
    let tp = ThreadPriority::Crossplatform(value);
    let _ = set_current_thread_priority(tp);

    #[cfg(unix)]
    if settings.realtime {
        use thread_priority::unix::{
            set_thread_priority_and_policy, thread_native_id, RealtimeThreadSchedulePolicy,
            ThreadSchedulePolicy,
        };
        let tid = thread_native_id();
        match set_thread_priority_and_policy(
            tid,
            tp,
            ThreadSchedulePolicy::Realtime(RealtimeThreadSchedulePolicy::Fifo),
        ) {
            Ok(()) => {
                info!("Enabled RT SCHED_FIFO for audio callback thread");
            }
            Err(e) => {
                warn!(
                    error = %e,
                    "Failed to set RT SCHED_FIFO for audio callback thread"
                );
            }
        }
    }
}
