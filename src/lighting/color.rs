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
use std::f64::consts::PI;

use crate::audio::Rgb;

/// Converts a hue/saturation/value triple (each 0-1) to RGB components in 0-1. The hue wraps,
/// so 1.25 is the same as 0.25.
pub fn hsv_to_rgb(h: f64, s: f64, v: f64) -> (f64, f64, f64) {
    let h = wrap_hue(h);
    let s = s.clamp(0.0, 1.0);
    let v = v.clamp(0.0, 1.0);
    if s == 0.0 {
        return (v, v, v);
    }

    let sector = (h * 6.0).floor();
    let f = h * 6.0 - sector;
    let p = v * (1.0 - s);
    let q = v * (1.0 - s * f);
    let t = v * (1.0 - s * (1.0 - f));

    match sector as u8 % 6 {
        0 => (v, t, p),
        1 => (q, v, p),
        2 => (p, v, t),
        3 => (p, q, v),
        4 => (t, p, v),
        _ => (v, p, q),
    }
}

/// Gets the hue (0-1) of an RGB color. Greys have hue 0.
pub fn rgb_to_hue(color: Rgb) -> f64 {
    let r = f64::from(color.r) / 255.0;
    let g = f64::from(color.g) / 255.0;
    let b = f64::from(color.b) / 255.0;
    let max = r.max(g).max(b);
    let delta = max - r.min(g).min(b);
    if delta == 0.0 {
        return 0.0;
    }

    let sixths = if max == r {
        ((g - b) / delta).rem_euclid(6.0)
    } else if max == g {
        (b - r) / delta + 2.0
    } else {
        (r - g) / delta + 4.0
    };
    wrap_hue(sixths / 6.0)
}

/// Wraps a hue into 0-1. Non-finite hues become 0.
pub fn wrap_hue(h: f64) -> f64 {
    if !h.is_finite() {
        return 0.0;
    }
    let wrapped = h.rem_euclid(1.0);
    // rem_euclid can round up to exactly 1.0 for tiny negative inputs.
    if wrapped >= 1.0 {
        0.0
    } else {
        wrapped
    }
}

/// The signed distance from one hue to another, going the shorter way around the wheel.
/// The result is in -0.5..=0.5.
pub fn hue_delta(from: f64, to: f64) -> f64 {
    let diff = wrap_hue(to) - wrap_hue(from);
    if diff > 0.5 {
        diff - 1.0
    } else if diff < -0.5 {
        diff + 1.0
    } else {
        diff
    }
}

/// Interpolates between two hues along the shorter arc.
pub fn lerp_hue(from: f64, to: f64, t: f64) -> f64 {
    wrap_hue(from + hue_delta(from, to) * t.clamp(0.0, 1.0))
}

pub fn ease_out_cubic(t: f64) -> f64 {
    let t = t.clamp(0.0, 1.0);
    1.0 - (1.0 - t).powi(3)
}

pub fn ease_in_out_sine(t: f64) -> f64 {
    let t = t.clamp(0.0, 1.0);
    -((PI * t).cos() - 1.0) / 2.0
}

/// Converts a 0-1 level to a channel value, truncating like the rest of the engine does.
pub fn to_channel(level: f64) -> u8 {
    if level.is_finite() {
        (level * 255.0).clamp(0.0, 255.0) as u8
    } else {
        0
    }
}

impl Rgb {
    /// Builds a color from hue/saturation/value.
    pub fn from_hsv(h: f64, s: f64, v: f64) -> Rgb {
        let (r, g, b) = hsv_to_rgb(h, s, v);
        Rgb::new(to_channel(r), to_channel(g), to_channel(b))
    }

    /// Gets the hue of this color.
    pub fn hue(&self) -> f64 {
        rgb_to_hue(*self)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_primaries() {
        assert_eq!(Rgb::new(255, 0, 0), Rgb::from_hsv(0.0, 1.0, 1.0));
        assert_eq!(Rgb::new(0, 255, 0), Rgb::from_hsv(1.0 / 3.0, 1.0, 1.0));
        assert_eq!(Rgb::new(0, 0, 255), Rgb::from_hsv(2.0 / 3.0, 1.0, 1.0));
        assert_eq!(Rgb::new(255, 0, 0), Rgb::from_hsv(1.0, 1.0, 1.0));
        assert_eq!(Rgb::new(127, 127, 127), Rgb::from_hsv(0.3, 0.0, 0.5));
    }

    #[test]
    fn test_hue_wraps() {
        assert_eq!(Rgb::from_hsv(0.25, 1.0, 1.0), Rgb::from_hsv(1.25, 1.0, 1.0));
        assert_eq!(Rgb::from_hsv(0.75, 1.0, 1.0), Rgb::from_hsv(-0.25, 1.0, 1.0));
        assert_eq!(0.0, wrap_hue(f64::NAN));
    }

    #[test]
    fn test_rgb_to_hue() {
        assert!(close(0.0, Rgb::new(255, 0, 0).hue()));
        assert!(close(1.0 / 3.0, Rgb::new(0, 255, 0).hue()));
        assert!(close(2.0 / 3.0, Rgb::new(0, 0, 255).hue()));
        assert!(close(5.0 / 6.0, Rgb::new(255, 0, 255).hue()));
        assert_eq!(0.0, Rgb::new(40, 40, 40).hue());
    }

    #[test]
    fn test_hue_delta_takes_short_way() {
        assert!(close(0.2, hue_delta(0.9, 0.1)));
        assert!(close(-0.2, hue_delta(0.1, 0.9)));
        assert!(close(0.3, hue_delta(0.2, 0.5)));
        assert!(close(0.0, lerp_hue(0.9, 0.1, 0.5)));
    }

    #[test]
    fn test_easing_endpoints() {
        assert_eq!(0.0, ease_out_cubic(0.0));
        assert_eq!(1.0, ease_out_cubic(1.0));
        assert_eq!(1.0, ease_out_cubic(7.0));
        assert!(close(0.0, ease_in_out_sine(0.0)));
        assert!(close(1.0, ease_in_out_sine(1.0)));
        assert!(close(0.5, ease_in_out_sine(0.5)));
    }

    #[test]
    fn test_to_channel() {
        assert_eq!(255, to_channel(1.0));
        assert_eq!(127, to_channel(0.5));
        assert_eq!(0, to_channel(-1.0));
        assert_eq!(255, to_channel(4.0));
        assert_eq!(0, to_channel(f64::NAN));
    }
}
