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
use std::time::Duration;

/// The fallback beat length when the tempo is unknown or nonsense.
pub const DEFAULT_BEAT_INTERVAL: Duration = Duration::from_millis(500);

pub const BEATS_PER_BAR: u64 = 4;

/// Seconds per beat at the given tempo.
pub fn beat_interval(tempo: f64) -> f64 {
    if tempo.is_finite() && tempo > 0.0 {
        60.0 / tempo
    } else {
        DEFAULT_BEAT_INTERVAL.as_secs_f64()
    }
}

/// Where we are within the current beat and bar.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BeatPosition {
    /// 0-1 within the current beat.
    pub beat_position: f64,
    /// 0-1 within the current 4-beat bar.
    pub bar_position: f64,
    pub estimated_beat: u64,
    pub estimated_bar: u64,
}

/// Counts beats and converts the time since the last beat into beat and bar positions.
///
/// The tempo used for the position is the one in effect when the beat fired. A tempo refresh
/// that lands mid-beat only takes effect from the next beat, so positions never jump backwards
/// within a beat.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BeatClock {
    beat_count: u64,
    latched_tempo: f64,
}

impl BeatClock {
    pub fn new(tempo: f64) -> BeatClock {
        BeatClock {
            beat_count: 0,
            latched_tempo: tempo,
        }
    }

    /// Records a beat. Must be called exactly once per detected beat.
    pub fn on_beat(&mut self, tempo: f64) {
        self.beat_count += 1;
        self.latched_tempo = tempo;
    }

    pub fn beat_count(&self) -> u64 {
        self.beat_count
    }

    pub fn latched_tempo(&self) -> f64 {
        self.latched_tempo
    }

    pub fn position(&self, time_since_beat: f64) -> BeatPosition {
        let beat_position = if time_since_beat.is_finite() {
            (time_since_beat / beat_interval(self.latched_tempo)).clamp(0.0, 1.0)
        } else {
            0.0
        };
        BeatPosition {
            beat_position,
            bar_position: ((self.beat_count % BEATS_PER_BAR) as f64 + beat_position)
                / BEATS_PER_BAR as f64,
            estimated_beat: self.beat_count,
            estimated_bar: self.beat_count / BEATS_PER_BAR,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_beat_interval_fallback() {
        assert_eq!(0.5, beat_interval(120.0));
        assert_eq!(0.5, beat_interval(0.0));
        assert_eq!(0.5, beat_interval(-10.0));
        assert_eq!(0.5, beat_interval(f64::NAN));
        assert_eq!(1.0, beat_interval(60.0));
    }

    #[test]
    fn test_positions() {
        let mut clock = BeatClock::new(120.0);
        for _ in 0..6 {
            clock.on_beat(120.0);
        }
        let position = clock.position(0.25);
        assert_eq!(0.5, position.beat_position);
        assert_eq!((2.0 + 0.5) / 4.0, position.bar_position);
        assert_eq!(6, position.estimated_beat);
        assert_eq!(1, position.estimated_bar);

        assert_eq!(1.0, clock.position(3.0).beat_position);
        assert_eq!(0.0, clock.position(-1.0).beat_position);
        assert_eq!(0.0, clock.position(f64::INFINITY).beat_position);
    }

    #[test]
    fn test_tempo_is_latched_at_beat() {
        let mut clock = BeatClock::new(120.0);
        clock.on_beat(120.0);
        // A later tempo change doesn't move the position until the next beat.
        assert_eq!(0.5, clock.position(0.25).beat_position);
        clock.on_beat(60.0);
        assert_eq!(0.25, clock.position(0.25).beat_position);
        assert_eq!(60.0, clock.latched_tempo());
    }
}
