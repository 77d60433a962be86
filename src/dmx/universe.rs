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
use std::sync::Arc;

use parking_lot::Mutex;

/// A DMX universe is 512 channels.
pub const UNIVERSE_SIZE: usize = 512;

/// A frame on the wire is the start code followed by every channel.
pub const FRAME_SIZE: usize = UNIVERSE_SIZE + 1;

/// The null start code used for dimmer data.
pub const START_CODE: u8 = 0x00;

/// A universe shared between the effects engine and the transmitter.
pub type SharedUniverse = Arc<Mutex<Universe>>;

/// A DMX universe: the start code at byte 0 followed by 512 channel bytes. Channels are
/// addressed 1-512, so channel N lives at byte N and the start code can never be overwritten.
#[derive(Clone, Debug, PartialEq)]
pub struct Universe {
    frame: [u8; FRAME_SIZE],
}

impl Default for Universe {
    fn default() -> Self {
        Self::new()
    }
}

impl Universe {
    /// Creates a new, dark universe.
    pub fn new() -> Universe {
        Universe {
            frame: [0; FRAME_SIZE],
        }
    }

    /// Creates a new universe wrapped for sharing between threads.
    pub fn shared() -> SharedUniverse {
        Arc::new(Mutex::new(Universe::new()))
    }

    /// Sets a channel (1-512). Returns false if the channel is out of range.
    pub fn set_channel(&mut self, channel: u16, value: u8) -> bool {
        match usize::from(channel) {
            index @ 1..=UNIVERSE_SIZE => {
                self.frame[index] = value;
                true
            }
            _ => false,
        }
    }

    /// Sets a channel from an arbitrary computed level, clamping it into 0-255. Non-finite
    /// levels are written as 0.
    pub fn set_level(&mut self, channel: u16, level: f64) -> bool {
        let value = if level.is_finite() {
            level.round().clamp(f64::from(u8::MIN), f64::from(u8::MAX)) as u8
        } else {
            0
        };
        self.set_channel(channel, value)
    }

    /// Sets consecutive channels starting at the given channel. Values that would fall past
    /// channel 512 are dropped. Returns the number of channels written.
    pub fn set_channels(&mut self, start: u16, values: &[u8]) -> usize {
        values
            .iter()
            .zip(start..)
            .take_while(|(_, channel)| usize::from(*channel) <= UNIVERSE_SIZE)
            .filter(|(value, channel)| self.set_channel(*channel, **value))
            .count()
    }

    /// Gets the value of a channel (1-512).
    pub fn channel(&self, channel: u16) -> Option<u8> {
        match usize::from(channel) {
            index @ 1..=UNIVERSE_SIZE => Some(self.frame[index]),
            _ => None,
        }
    }

    /// The 512 channel values, without the start code.
    pub fn channels(&self) -> &[u8] {
        &self.frame[1..]
    }

    /// The full frame as it goes on the wire.
    pub fn frame(&self) -> &[u8; FRAME_SIZE] {
        &self.frame
    }

    /// Sets every channel to 0.
    pub fn blackout(&mut self) {
        self.frame[1..].fill(u8::MIN);
    }

    /// Sets every channel to 255.
    pub fn full_on(&mut self) {
        self.frame[1..].fill(u8::MAX);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_start_code_is_untouchable() {
        let mut universe = Universe::new();
        assert!(!universe.set_channel(0, 255));
        assert!(!universe.set_channel(513, 255));
        universe.full_on();
        assert_eq!(START_CODE, universe.frame()[0]);
        assert!(universe.channels().iter().all(|v| *v == 255));
        universe.blackout();
        assert_eq!(START_CODE, universe.frame()[0]);
        assert!(universe.channels().iter().all(|v| *v == 0));
    }

    #[test]
    fn test_channel_addressing() {
        let mut universe = Universe::new();
        assert!(universe.set_channel(1, 10));
        assert!(universe.set_channel(512, 20));
        assert_eq!([0, 10], universe.frame()[0..2]);
        assert_eq!(20, universe.frame()[512]);
        assert_eq!(Some(10), universe.channel(1));
        assert_eq!(None, universe.channel(0));
    }

    #[test]
    fn test_levels_clamp() {
        let mut universe = Universe::new();
        universe.set_level(1, -40.0);
        universe.set_level(2, 300.0);
        universe.set_level(3, f64::NAN);
        universe.set_level(4, 127.6);
        universe.set_level(5, f64::INFINITY);
        assert_eq!([0, 0, 255, 0, 128, 0], universe.frame()[0..6]);
    }

    #[test]
    fn test_set_channels_stops_at_end() {
        let mut universe = Universe::new();
        assert_eq!(3, universe.set_channels(1, &[1, 2, 3]));
        assert_eq!(2, universe.set_channels(511, &[9, 9, 9, 9]));
        assert_eq!([0, 1, 2, 3], universe.frame()[0..4]);
        assert_eq!([9, 9], universe.frame()[511..513]);
    }
}
