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
use crate::config::{ChannelDef, ChannelFunction};
use crate::dmx::Universe;

use super::state::FixtureState;

/// Dimmer values below this are treated as off on a combined dimmer/strobe channel.
const DIMMER_OFF_BELOW: u8 = 5;

/// Dimmer values at or above this are treated as fully open.
const DIMMER_OPEN_FROM: u8 = 250;

/// Resolves the value of a single channel from a fixture's state.
pub fn resolve_channel(channel: &ChannelDef, state: &FixtureState) -> u8 {
    if let Some(fixed) = channel.fixed {
        return fixed;
    }

    match channel.function {
        ChannelFunction::None | ChannelFunction::Maintenance => 0,
        ChannelFunction::Dimmer => state.dimmer,
        ChannelFunction::Red => state.red,
        ChannelFunction::Green => state.green,
        ChannelFunction::Blue => state.blue,
        ChannelFunction::White => state.white,
        ChannelFunction::Amber => state.amber,
        ChannelFunction::Uv => state.uv,
        ChannelFunction::Pan => state.pan,
        ChannelFunction::PanFine => state.pan_fine,
        ChannelFunction::Tilt => state.tilt,
        ChannelFunction::TiltFine => state.tilt_fine,
        ChannelFunction::PanTiltSpeed => state.pt_speed,
        ChannelFunction::PanTiltSpeedInverted => u8::MAX - state.pt_speed,
        ChannelFunction::Strobe => state.strobe,
        ChannelFunction::ColorMacro | ChannelFunction::ColorWheel => state.color_macro,
        ChannelFunction::Effect => state.effect,
        ChannelFunction::EffectSpeed => state.effect_speed,
        ChannelFunction::Gobo => state.gobo,
        ChannelFunction::Prism => state.prism,
        ChannelFunction::Zoom => state.zoom,
        ChannelFunction::Focus => state.focus,
        ChannelFunction::Iris => state.iris,
        ChannelFunction::DimmerStrobe => dimmer_strobe(channel, state.dimmer, state.strobe),
    }
}

/// Resolves a channel that carries off, dimmer, strobe and open in named sub-ranges. Falls back
/// to the raw dimmer when the sub-range it needs isn't declared.
fn dimmer_strobe(channel: &ChannelDef, dimmer: u8, strobe: u8) -> u8 {
    let range = if dimmer < DIMMER_OFF_BELOW {
        channel.capability("off").map(|off| off.min)
    } else if strobe > 0 {
        channel.capability("strobe").map(|range| {
            let span = f64::from(range.max) - f64::from(range.min);
            range.min + (span * f64::from(strobe) / 255.0) as u8
        })
    } else if dimmer >= DIMMER_OPEN_FROM {
        channel.capability("open").map(|open| open.min)
    } else {
        channel.capability("dimmer").map(|range| {
            let span = f64::from(range.max) - f64::from(range.min);
            let fraction = f64::from(dimmer - DIMMER_OFF_BELOW)
                / f64::from(DIMMER_OPEN_FROM - 1 - DIMMER_OFF_BELOW);
            range.min + (span * fraction).round() as u8
        })
    };
    range.unwrap_or(dimmer)
}

/// Writes a fixture's resolved channels into the universe. Channels that would land outside the
/// universe are skipped. Returns the number of channels written.
pub fn write_fixture(
    universe: &mut Universe,
    start_channel: u16,
    channels: &[ChannelDef],
    state: &FixtureState,
) -> usize {
    channels
        .iter()
        .filter(|channel| {
            let address = start_channel
                .checked_add(channel.offset)
                .and_then(|end| end.checked_sub(1));
            let Some(address) = address else {
                return false;
            };
            universe.set_channel(address, resolve_channel(channel, state))
        })
        .count()
}

#[cfg(test)]
mod test {
    use super::*;

    fn combined() -> ChannelDef {
        ChannelDef::new(1, ChannelFunction::DimmerStrobe)
            .with_capability("off", 0, 7)
            .with_capability("dimmer", 8, 134)
            .with_capability("strobe", 135, 239)
            .with_capability("open", 240, 255)
    }

    fn state(dimmer: u8, strobe: u8) -> FixtureState {
        FixtureState {
            dimmer,
            strobe,
            ..Default::default()
        }
    }

    #[test]
    fn test_fixed_value_wins() {
        let channel = ChannelDef::new(1, ChannelFunction::Red).with_fixed(42);
        let mut state = FixtureState::default();
        state.red = 255;
        assert_eq!(42, resolve_channel(&channel, &state));

        let maintenance = ChannelDef::new(1, ChannelFunction::Maintenance);
        assert_eq!(0, resolve_channel(&maintenance, &state));
    }

    #[test]
    fn test_combined_dimmer_strobe() {
        let channel = combined();
        // Off wins over strobe.
        assert_eq!(0, resolve_channel(&channel, &state(4, 200)));
        assert_eq!(240, resolve_channel(&channel, &state(250, 0)));
        assert_eq!(240, resolve_channel(&channel, &state(255, 0)));
        assert_eq!(8, resolve_channel(&channel, &state(5, 0)));
        assert_eq!(134, resolve_channel(&channel, &state(249, 0)));
        assert_eq!(135, resolve_channel(&channel, &state(255, 1)));
        assert_eq!(239, resolve_channel(&channel, &state(255, 255)));
        assert_eq!(187, resolve_channel(&channel, &state(128, 128)));
    }

    #[test]
    fn test_combined_missing_ranges_use_raw_dimmer() {
        let channel = ChannelDef::new(1, ChannelFunction::DimmerStrobe);
        assert_eq!(3, resolve_channel(&channel, &state(3, 0)));
        assert_eq!(100, resolve_channel(&channel, &state(100, 0)));
        assert_eq!(251, resolve_channel(&channel, &state(251, 50)));
    }

    #[test]
    fn test_speed_polarity() {
        let mut state = FixtureState::default();
        state.pt_speed = 10;
        let normal = ChannelDef::new(1, ChannelFunction::PanTiltSpeed);
        let inverted = ChannelDef::new(1, ChannelFunction::PanTiltSpeedInverted);
        assert_eq!(10, resolve_channel(&normal, &state));
        assert_eq!(245, resolve_channel(&inverted, &state));
    }

    #[test]
    fn test_write_fixture_addresses() {
        let mut universe = Universe::new();
        let mut state = FixtureState::default();
        state.set_rgb(1, 2, 3);
        let channels = vec![
            ChannelDef::new(1, ChannelFunction::Red),
            ChannelDef::new(2, ChannelFunction::Green),
            ChannelDef::new(3, ChannelFunction::Blue),
        ];
        assert_eq!(3, write_fixture(&mut universe, 10, &channels, &state));
        assert_eq!(Some(1), universe.channel(10));
        assert_eq!(Some(2), universe.channel(11));
        assert_eq!(Some(3), universe.channel(12));

        // Only the first channel fits.
        assert_eq!(1, write_fixture(&mut universe, 512, &channels, &state));
        assert_eq!(Some(1), universe.channel(512));
        assert_eq!(0, universe.frame()[0]);
    }
}
