// Copyright (C) 2025 Michael Wilson <mike@mdwn.dev>
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
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use thread_priority::{set_current_thread_priority, ThreadPriority, ThreadPriorityValue};
use tracing::{info, warn};

/// How long stop paths wait for a worker thread before giving up on it.
pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Default priority for the DMX output thread when MUSIC_AUTO_SHOW_THREAD_PRIORITY is unset.
const DEFAULT_OUTPUT_THREAD_PRIORITY: u8 = 70;

/// Outputs the given duration in a minutes:seconds format.
pub fn duration_minutes_seconds(duration: Duration) -> String {
    let minutes = duration.as_secs() / 60;
    let secs = duration.as_secs() - minutes * 60;
    format!("{}:{:02}", minutes, secs)
}

/// Joins the thread, giving up once the timeout has elapsed. Returns the thread's result if it
/// was joined. A thread that doesn't finish in time is detached and left to exit on its own.
pub fn join_with_timeout<T>(handle: JoinHandle<T>, timeout: Duration, name: &str) -> Option<T> {
    let deadline = Instant::now() + timeout;
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            warn!(thread = name, "Thread did not stop in time, detaching.");
            return None;
        }
        thread::sleep(Duration::from_millis(5));
    }
    match handle.join() {
        Ok(result) => Some(result),
        Err(_) => {
            warn!(thread = name, "Thread panicked while stopping.");
            None
        }
    }
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

/// Reads MUSIC_AUTO_SHOW_THREAD_PRIORITY (0-99), falling back to the default.
fn output_thread_priority() -> Option<ThreadPriorityValue> {
    std::env::var("MUSIC_AUTO_SHOW_THREAD_PRIORITY")
        .ok()
        .and_then(|v| v.parse::<u8>().ok())
        .filter(|n| *n < 100)
        .or(Some(DEFAULT_OUTPUT_THREAD_PRIORITY))
        .and_then(|n| ThreadPriorityValue::try_from(n).ok())
}

/// Raises the priority of the calling thread so frame pacing isn't disturbed by the rest of
/// the process. Best effort: failures are logged and ignored. Opt out with
/// MUSIC_AUTO_SHOW_NO_RT=1.
pub fn raise_current_thread_priority(thread_name: &str) {
    if env_flag("MUSIC_AUTO_SHOW_NO_RT") {
        return;
    }
    let Some(priority) = output_thread_priority() else {
        return;
    };
    match set_current_thread_priority(ThreadPriority::Crossplatform(priority)) {
        Ok(()) => info!(thread = thread_name, "Raised thread priority"),
        Err(e) => warn!(
            thread = thread_name,
            err = format!("{:?}", e),
            "Unable to raise thread priority"
        ),
    }
}
