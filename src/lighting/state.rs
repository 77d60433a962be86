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
use super::color::{hsv_to_rgb, to_channel};

/// Every channel-semantic value a fixture can take. Values are raw DMX levels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FixtureState {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
    pub white: u8,
    pub amber: u8,
    pub uv: u8,
    pub dimmer: u8,
    pub strobe: u8,
    pub pan: u8,
    pub tilt: u8,
    pub pan_fine: u8,
    pub tilt_fine: u8,
    /// Pan/tilt motor speed, 0 fastest.
    pub pt_speed: u8,
    pub color_macro: u8,
    pub effect: u8,
    pub effect_speed: u8,
    pub gobo: u8,
    pub prism: u8,
    pub zoom: u8,
    pub focus: u8,
    pub iris: u8,
}

impl Default for FixtureState {
    fn default() -> Self {
        FixtureState {
            red: 0,
            green: 0,
            blue: 0,
            white: 0,
            amber: 0,
            uv: 0,
            dimmer: u8::MAX,
            strobe: 0,
            pan: 128,
            tilt: 128,
            pan_fine: 0,
            tilt_fine: 0,
            pt_speed: 0,
            color_macro: 0,
            effect: 0,
            effect_speed: 0,
            gobo: 0,
            prism: 0,
            zoom: 0,
            focus: 0,
            iris: 0,
        }
    }
}

/// One step of exponential smoothing on a channel value. Always moves at least one step toward
/// the target unless the factor freezes the channel, so the value can't stall short of it.
fn smooth_channel(previous: u8, target: u8, factor: f64) -> u8 {
    if factor >= 1.0 || previous == target {
        return previous;
    }
    let factor = factor.max(0.0);
    let next = f64::from(previous) * factor + f64::from(target) * (1.0 - factor);
    let next = next.round().clamp(0.0, 255.0) as u8;
    if next != previous {
        next
    } else if target > previous {
        previous + 1
    } else {
        previous - 1
    }
}

impl FixtureState {
    pub fn rgb(&self) -> (u8, u8, u8) {
        (self.red, self.green, self.blue)
    }

    pub fn set_rgb(&mut self, red: u8, green: u8, blue: u8) {
        self.red = red;
        self.green = green;
        self.blue = blue;
    }

    /// Sets red, green and blue from hue/saturation/value.
    pub fn set_from_hsv(&mut self, h: f64, s: f64, v: f64) {
        let (r, g, b) = hsv_to_rgb(h, s, v);
        self.set_rgb(to_channel(r), to_channel(g), to_channel(b));
    }

    /// Sets the dimmer from a 0-1 level.
    pub fn set_brightness(&mut self, level: f64) {
        self.dimmer = to_channel(level);
    }

    /// Scales RGB and the dimmer by the given factor (0-1).
    pub fn fade(&mut self, factor: f64) {
        let factor = if factor.is_finite() {
            factor.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let scale = |value: u8| (f64::from(value) * factor) as u8;
        self.red = scale(self.red);
        self.green = scale(self.green);
        self.blue = scale(self.blue);
        self.dimmer = scale(self.dimmer);
    }

    /// Zeroes every light-emitting value. Position is left alone.
    pub fn blackout(&mut self) {
        self.red = 0;
        self.green = 0;
        self.blue = 0;
        self.white = 0;
        self.amber = 0;
        self.uv = 0;
        self.dimmer = 0;
        self.strobe = 0;
        self.effect = 0;
        self.effect_speed = 0;
    }

    /// Returns true if every light-emitting value is zero.
    pub fn is_dark(&self) -> bool {
        [
            self.red,
            self.green,
            self.blue,
            self.white,
            self.amber,
            self.uv,
            self.dimmer,
            self.strobe,
            self.effect,
        ]
        .iter()
        .all(|v| *v == 0)
    }

    /// Moves this (smoothed) state one tick toward the live state. Color and dimmer values are
    /// smoothed, everything else is copied.
    pub fn smooth_toward(&mut self, live: &FixtureState, factor: f64) {
        let factor = if factor.is_finite() { factor } else { 0.0 };
        let red = smooth_channel(self.red, live.red, factor);
        let green = smooth_channel(self.green, live.green, factor);
        let blue = smooth_channel(self.blue, live.blue, factor);
        let white = smooth_channel(self.white, live.white, factor);
        let amber = smooth_channel(self.amber, live.amber, factor);
        let uv = smooth_channel(self.uv, live.uv, factor);
        let dimmer = smooth_channel(self.dimmer, live.dimmer, factor);
        *self = FixtureState {
            red,
            green,
            blue,
            white,
            amber,
            uv,
            dimmer,
            ..*live
        };
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_defaults() {
        let state = FixtureState::default();
        assert_eq!(255, state.dimmer);
        assert_eq!((128, 128), (state.pan, state.tilt));
        assert_eq!((0, 0, 0), state.rgb());
    }

    #[test]
    fn test_smoothing_converges_monotonically() {
        for factor in [0.0, 0.3, 0.9, 0.99] {
            let mut smoothed = FixtureState::default();
            smoothed.blackout();
            let mut live = FixtureState::default();
            live.set_rgb(255, 40, 200);

            let mut previous = smoothed;
            for _ in 0..2000 {
                smoothed.smooth_toward(&live, factor);
                assert!(smoothed.red >= previous.red);
                assert!(smoothed.green >= previous.green);
                assert!(smoothed.dimmer >= previous.dimmer);
                previous = smoothed;
            }
            assert_eq!(live.rgb(), smoothed.rgb(), "factor {}", factor);
            assert_eq!(255, smoothed.dimmer);

            live.blackout();
            for _ in 0..2000 {
                smoothed.smooth_toward(&live, factor);
                assert!(smoothed.red <= previous.red);
                previous = smoothed;
            }
            assert!(smoothed.is_dark());
        }
    }

    #[test]
    fn test_smoothing_copies_discrete_channels() {
        let mut smoothed = FixtureState::default();
        let mut live = FixtureState::default();
        live.pan = 10;
        live.tilt = 250;
        live.strobe = 200;
        live.gobo = 3;
        live.red = 255;
        smoothed.smooth_toward(&live, 0.5);
        assert_eq!((10, 250), (smoothed.pan, smoothed.tilt));
        assert_eq!(200, smoothed.strobe);
        assert_eq!(3, smoothed.gobo);
        assert_eq!(128, smoothed.red);
    }

    #[test]
    fn test_frozen_smoothing() {
        let mut smoothed = FixtureState::default();
        let mut live = FixtureState::default();
        live.red = 255;
        smoothed.smooth_toward(&live, 1.0);
        assert_eq!(0, smoothed.red);
    }

    #[test]
    fn test_blackout_keeps_position() {
        let mut state = FixtureState::default();
        state.set_from_hsv(0.0, 1.0, 1.0);
        state.pan = 40;
        state.strobe = 100;
        state.blackout();
        assert!(state.is_dark());
        assert_eq!(40, state.pan);
    }

    #[test]
    fn test_fade() {
        let mut state = FixtureState::default();
        state.set_rgb(200, 100, 50);
        state.fade(0.5);
        assert_eq!((100, 50, 25), state.rgb());
        assert_eq!(127, state.dimmer);
        state.fade(f64::NAN);
        assert_eq!((0, 0, 0), state.rgb());
    }
}
