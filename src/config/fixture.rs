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
use serde::{Deserialize, Serialize};

use super::profile::ChannelDef;

pub const DEFAULT_INTENSITY_SCALE: f64 = 1.0;
pub const DEFAULT_STROBE_SPEED: u8 = 128;

/// A YAML representation of a single patched fixture.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct Fixture {
    /// The unique name of the fixture.
    name: String,

    /// The profile this fixture uses. Ignored when channels are given inline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    profile: Option<String>,

    /// Inline channel definitions for fixtures that don't have a profile.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    channels: Option<Vec<ChannelDef>>,

    /// The first DMX channel of the fixture (1-512).
    start_channel: u16,

    /// Order of the fixture in the rig, 0 being leftmost.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    position: Option<u32>,

    /// Per-fixture brightness multiplier (0-1).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    intensity_scale: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pan_min: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pan_max: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tilt_min: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tilt_max: Option<u8>,

    /// Forces a constant strobe value on this fixture.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    strobe_enabled: Option<bool>,

    /// The strobe value used when strobe is enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    strobe_speed: Option<u8>,
}

impl Fixture {
    /// Creates a fixture patched with the given profile.
    pub fn new(name: &str, profile: &str, start_channel: u16) -> Fixture {
        Fixture {
            name: name.to_string(),
            profile: Some(profile.to_string()),
            channels: None,
            start_channel,
            position: None,
            intensity_scale: None,
            pan_min: None,
            pan_max: None,
            tilt_min: None,
            tilt_max: None,
            strobe_enabled: None,
            strobe_speed: None,
        }
    }

    /// Creates a fixture with inline channel definitions.
    pub fn with_channels(name: &str, start_channel: u16, channels: Vec<ChannelDef>) -> Fixture {
        Fixture {
            profile: None,
            channels: Some(channels),
            ..Fixture::new(name, "", start_channel)
        }
    }

    pub fn at_position(mut self, position: u32) -> Fixture {
        self.position = Some(position);
        self
    }

    pub fn scaled(mut self, intensity_scale: f64) -> Fixture {
        self.intensity_scale = Some(intensity_scale);
        self
    }

    pub fn with_pan_limits(mut self, min: u8, max: u8) -> Fixture {
        self.pan_min = Some(min);
        self.pan_max = Some(max);
        self
    }

    pub fn with_tilt_limits(mut self, min: u8, max: u8) -> Fixture {
        self.tilt_min = Some(min);
        self.tilt_max = Some(max);
        self
    }

    pub fn with_strobe(mut self, speed: u8) -> Fixture {
        self.strobe_enabled = Some(true);
        self.strobe_speed = Some(speed);
        self
    }

    /// Gets the fixture name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Gets the profile name.
    pub fn profile(&self) -> Option<&str> {
        self.profile.as_deref().filter(|profile| !profile.is_empty())
    }

    /// Gets the inline channels, if any.
    pub fn channels(&self) -> Option<&[ChannelDef]> {
        self.channels.as_deref()
    }

    /// Gets the start channel.
    pub fn start_channel(&self) -> u16 {
        self.start_channel
    }

    /// Gets the position of the fixture in the rig.
    pub fn position(&self) -> u32 {
        self.position.unwrap_or(0)
    }

    /// Gets the intensity scale.
    pub fn intensity_scale(&self) -> f64 {
        self.intensity_scale.unwrap_or(DEFAULT_INTENSITY_SCALE)
    }

    pub fn pan_min(&self) -> u8 {
        self.pan_min.unwrap_or(u8::MIN)
    }

    pub fn pan_max(&self) -> u8 {
        self.pan_max.unwrap_or(u8::MAX)
    }

    pub fn tilt_min(&self) -> u8 {
        self.tilt_min.unwrap_or(u8::MIN)
    }

    pub fn tilt_max(&self) -> u8 {
        self.tilt_max.unwrap_or(u8::MAX)
    }

    /// Gets the constant strobe value if strobe is enabled for this fixture.
    pub fn forced_strobe(&self) -> Option<u8> {
        self.strobe_enabled
            .unwrap_or(false)
            .then(|| self.strobe_speed.unwrap_or(DEFAULT_STROBE_SPEED))
    }
}
