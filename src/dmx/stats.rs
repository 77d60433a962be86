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
use std::time::{Duration, Instant};

use super::break_method::BreakMethod;

/// Consecutive failures before the first warning.
const WARN_AFTER: u64 = 10;

/// Once warned, an error is logged every this many consecutive failures.
const ERROR_EVERY: u64 = 100;

const FPS_WINDOW: Duration = Duration::from_secs(1);

/// A snapshot of the transmitter's health.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TransmitterStats {
    pub port: Option<String>,
    pub frames_sent: u64,
    pub errors: u64,
    pub consecutive_errors: u64,
    pub last_error: Option<String>,
    pub break_method: Option<BreakMethod>,
    pub target_fps: u32,
    /// Measured over the last full one second window.
    pub actual_fps: f64,
}

/// How loudly a failure should be reported.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Escalation {
    Quiet,
    Warn,
    Error,
}

/// Accumulates transmitter statistics from the output loop.
pub(crate) struct StatsTracker {
    stats: TransmitterStats,
    window_start: Option<Instant>,
    window_frames: u64,
}

impl StatsTracker {
    pub fn new(target_fps: u32) -> StatsTracker {
        StatsTracker {
            stats: TransmitterStats {
                target_fps,
                ..Default::default()
            },
            window_start: None,
            window_frames: 0,
        }
    }

    pub fn stats(&self) -> TransmitterStats {
        self.stats.clone()
    }

    pub fn set_port(&mut self, port: Option<String>) {
        self.stats.port = port;
    }

    pub fn set_break_method(&mut self, method: Option<BreakMethod>) {
        self.stats.break_method = method;
    }

    pub fn set_target_fps(&mut self, fps: u32) {
        self.stats.target_fps = fps;
    }

    /// Clears the running counters, e.g. when the output loop restarts.
    pub fn reset_rate(&mut self) {
        self.window_start = None;
        self.window_frames = 0;
        self.stats.actual_fps = 0.0;
    }

    /// Records a successful frame. Returns the number of consecutive failures this success
    /// ended, so the caller can log a recovery.
    pub fn record_success(&mut self, now: Instant) -> u64 {
        let recovered = self.stats.consecutive_errors;
        self.stats.frames_sent += 1;
        self.stats.consecutive_errors = 0;

        let start = *self.window_start.get_or_insert(now);
        self.window_frames += 1;
        let elapsed = now.duration_since(start);
        if elapsed >= FPS_WINDOW {
            self.stats.actual_fps = self.window_frames as f64 / elapsed.as_secs_f64();
            self.window_start = Some(now);
            self.window_frames = 0;
        }
        recovered
    }

    /// Records a failed frame and reports whether it should be logged.
    pub fn record_failure(&mut self, error: String) -> Escalation {
        self.stats.errors += 1;
        self.stats.consecutive_errors += 1;
        self.stats.last_error = Some(error);

        match self.stats.consecutive_errors {
            WARN_AFTER => Escalation::Warn,
            n if n % ERROR_EVERY == 0 => Escalation::Error,
            _ => Escalation::Quiet,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_escalation_thresholds() {
        let mut tracker = StatsTracker::new(40);
        let levels: Vec<_> = (0..300)
            .map(|_| tracker.record_failure("boom".to_string()))
            .collect();

        assert!(levels[..9].iter().all(|l| *l == Escalation::Quiet));
        assert_eq!(Escalation::Warn, levels[9]);
        assert_eq!(Escalation::Error, levels[99]);
        assert_eq!(Escalation::Error, levels[199]);
        assert_eq!(
            3,
            levels.iter().filter(|l| **l == Escalation::Error).count()
        );
        assert_eq!(300, tracker.stats().consecutive_errors);

        assert_eq!(300, tracker.record_success(Instant::now()));
        let stats = tracker.stats();
        assert_eq!(0, stats.consecutive_errors);
        assert_eq!(300, stats.errors);
        assert_eq!(1, stats.frames_sent);
        assert_eq!(Some("boom".to_string()), stats.last_error);

        // The count restarts after a success.
        for _ in 0..9 {
            assert_eq!(
                Escalation::Quiet,
                tracker.record_failure("again".to_string())
            );
        }
        assert_eq!(Escalation::Warn, tracker.record_failure("again".to_string()));
    }

    #[test]
    fn test_actual_fps_window() {
        let mut tracker = StatsTracker::new(40);
        let start = Instant::now();
        for i in 0..=40 {
            tracker.record_success(start + Duration::from_millis(25 * i));
        }
        let fps = tracker.stats().actual_fps;
        assert!((fps - 41.0).abs() < 0.01, "fps was {}", fps);
    }
}
