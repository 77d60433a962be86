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
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// The semantic function of a single fixture channel.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ChannelFunction {
    /// An unused channel. Always resolves to 0 unless fixed.
    None,
    Dimmer,
    Red,
    Green,
    Blue,
    White,
    Amber,
    Uv,
    Pan,
    PanFine,
    Tilt,
    TiltFine,
    /// Pan/tilt motor speed where 0 is fastest.
    PanTiltSpeed,
    /// Pan/tilt motor speed where 255 is fastest.
    PanTiltSpeedInverted,
    Strobe,
    ColorMacro,
    ColorWheel,
    Effect,
    EffectSpeed,
    Gobo,
    Prism,
    Zoom,
    Focus,
    Iris,
    /// A single channel that carries shutter, dimmer and strobe in named sub-ranges.
    DimmerStrobe,
    /// Reset/lamp control channels. Always resolves to 0 unless fixed.
    Maintenance,
}

impl ChannelFunction {
    /// Returns true if the channel drives the pan axis.
    pub fn is_pan(&self) -> bool {
        matches!(self, ChannelFunction::Pan | ChannelFunction::PanFine)
    }

    /// Returns true if the channel drives the tilt axis.
    pub fn is_tilt(&self) -> bool {
        matches!(self, ChannelFunction::Tilt | ChannelFunction::TiltFine)
    }
}

/// A named sub-range of DMX values on one channel, e.g. "strobe" on 135-239.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct CapabilityRange {
    /// The name of the range. Matched case-insensitively.
    pub label: String,
    pub min: u8,
    pub max: u8,
}

/// A single channel of a fixture profile.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct ChannelDef {
    /// 1-based offset from the fixture's start channel.
    pub offset: u16,

    /// What this channel does.
    pub function: ChannelFunction,

    /// A literal value that is always written, regardless of the fixture's state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed: Option<u8>,

    /// Named sub-ranges of this channel.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub capabilities: Vec<CapabilityRange>,
}

impl ChannelDef {
    /// Creates a channel with no fixed value and no sub-ranges.
    pub fn new(offset: u16, function: ChannelFunction) -> ChannelDef {
        ChannelDef {
            offset,
            function,
            fixed: None,
            capabilities: Vec::new(),
        }
    }

    /// Pins this channel to a literal value.
    pub fn with_fixed(mut self, value: u8) -> ChannelDef {
        self.fixed = Some(value);
        self
    }

    /// Adds a named sub-range to this channel.
    pub fn with_capability(mut self, label: &str, min: u8, max: u8) -> ChannelDef {
        self.capabilities.push(CapabilityRange {
            label: label.to_string(),
            min,
            max,
        });
        self
    }

    /// Looks up a sub-range by name.
    pub fn capability(&self, label: &str) -> Option<&CapabilityRange> {
        self.capabilities
            .iter()
            .find(|range| range.label.eq_ignore_ascii_case(label))
    }
}

/// A named template mapping channel offsets to semantic functions for one fixture model.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct FixtureProfile {
    /// A human readable description of the fixture model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,

    /// The channels of the fixture.
    channels: Vec<ChannelDef>,
}

impl FixtureProfile {
    /// Creates a new profile.
    pub fn new(description: Option<&str>, channels: Vec<ChannelDef>) -> FixtureProfile {
        FixtureProfile {
            description: description.map(str::to_string),
            channels,
        }
    }

    /// Gets the description.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Gets the channels.
    pub fn channels(&self) -> &[ChannelDef] {
        &self.channels
    }
}

/// The profiles that are always available, keyed by name.
pub fn builtin_profiles() -> HashMap<String, FixtureProfile> {
    use ChannelFunction::*;

    let mut profiles = HashMap::new();
    profiles.insert(
        "generic_rgb".to_string(),
        FixtureProfile::new(
            Some("3 channel RGB par"),
            vec![
                ChannelDef::new(1, Red),
                ChannelDef::new(2, Green),
                ChannelDef::new(3, Blue),
            ],
        ),
    );
    profiles.insert(
        "generic_rgbw".to_string(),
        FixtureProfile::new(
            Some("4 channel RGBW par"),
            vec![
                ChannelDef::new(1, Red),
                ChannelDef::new(2, Green),
                ChannelDef::new(3, Blue),
                ChannelDef::new(4, White),
            ],
        ),
    );
    profiles.insert(
        "generic_rgb_dimmer".to_string(),
        FixtureProfile::new(
            Some("5 channel dimmer/RGB/strobe par"),
            vec![
                ChannelDef::new(1, Dimmer),
                ChannelDef::new(2, Red),
                ChannelDef::new(3, Green),
                ChannelDef::new(4, Blue),
                ChannelDef::new(5, Strobe),
            ],
        ),
    );
    profiles.insert(
        "moving_head_basic".to_string(),
        FixtureProfile::new(
            Some("14 channel RGBW moving head"),
            vec![
                ChannelDef::new(1, Pan),
                ChannelDef::new(2, PanFine),
                ChannelDef::new(3, Tilt),
                ChannelDef::new(4, TiltFine),
                ChannelDef::new(5, PanTiltSpeed),
                ChannelDef::new(6, Dimmer),
                ChannelDef::new(7, Strobe),
                ChannelDef::new(8, Red),
                ChannelDef::new(9, Green),
                ChannelDef::new(10, Blue),
                ChannelDef::new(11, White),
                ChannelDef::new(12, Gobo),
                ChannelDef::new(13, Prism),
                ChannelDef::new(14, Maintenance).with_fixed(0),
            ],
        ),
    );
    profiles.insert(
        "moving_head_combined_dimmer".to_string(),
        FixtureProfile::new(
            Some("9 channel moving head with a shared dimmer/strobe channel"),
            vec![
                ChannelDef::new(1, Pan),
                ChannelDef::new(2, Tilt),
                ChannelDef::new(3, PanTiltSpeed),
                ChannelDef::new(4, DimmerStrobe)
                    .with_capability("off", 0, 7)
                    .with_capability("dimmer", 8, 134)
                    .with_capability("strobe", 135, 239)
                    .with_capability("open", 240, 255),
                ChannelDef::new(5, Red),
                ChannelDef::new(6, Green),
                ChannelDef::new(7, Blue),
                ChannelDef::new(8, White),
                ChannelDef::new(9, ColorMacro).with_fixed(0),
            ],
        ),
    );
    profiles
}

#[cfg(test)]
mod test {
    use config::{Config, File, FileFormat};

    use super::*;

    #[test]
    fn test_profile_deserialize() {
        let yaml = r#"
            description: Cheap par
            channels:
              - offset: 1
                function: dimmer_strobe
                capabilities:
                  - label: "off"
                    min: 0
                    max: 9
                  - label: Strobe
                    min: 10
                    max: 200
              - offset: 2
                function: color_macro
                fixed: 0
              - offset: 3
                function: pan_tilt_speed_inverted
        "#;

        let profile: FixtureProfile = Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(Some("Cheap par"), profile.description());
        assert_eq!(3, profile.channels().len());
        assert_eq!(ChannelFunction::DimmerStrobe, profile.channels()[0].function);
        assert_eq!(
            Some(10),
            profile.channels()[0].capability("strobe").map(|c| c.min)
        );
        assert_eq!(Some(0), profile.channels()[1].fixed);
        assert_eq!(
            ChannelFunction::PanTiltSpeedInverted,
            profile.channels()[2].function
        );
    }

    #[test]
    fn test_builtin_profiles_are_contiguous() {
        for (name, profile) in builtin_profiles() {
            for (i, channel) in profile.channels().iter().enumerate() {
                assert_eq!(
                    i as u16 + 1,
                    channel.offset,
                    "profile {} has a gap at channel {}",
                    name,
                    i
                );
            }
        }
    }

    #[test]
    fn test_axis_helpers() {
        assert!(ChannelFunction::PanFine.is_pan());
        assert!(!ChannelFunction::PanFine.is_tilt());
        assert!(ChannelFunction::Tilt.is_tilt());
        assert!(!ChannelFunction::Dimmer.is_pan());
    }
}
