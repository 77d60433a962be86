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
use std::collections::{HashMap, HashSet};
use std::path::Path;

use config::{Config, File};
use serde::{Deserialize, Serialize};

use super::audio::Audio;
use super::dmx::Dmx;
use super::effects::Effects;
use super::error::ConfigError;
use super::fixture::Fixture;
use super::profile::{builtin_profiles, ChannelDef, FixtureProfile};

/// The highest DMX channel in a universe.
const MAX_DMX_CHANNEL: u32 = 512;

/// The complete configuration of a show.
#[derive(Deserialize, Serialize, Clone, Debug, Default)]
pub struct Show {
    /// The name of the show.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,

    /// DMX output settings.
    #[serde(default)]
    dmx: Dmx,

    /// Audio capture settings.
    #[serde(default)]
    audio: Audio,

    /// Effects parameters.
    #[serde(default)]
    effects: Effects,

    /// The patched fixtures, in order.
    #[serde(default)]
    fixtures: Vec<Fixture>,

    /// Additional fixture profiles. These override built-in profiles with the same name.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    profiles: HashMap<String, FixtureProfile>,
}

impl Show {
    /// Creates a show from its parts.
    pub fn new(effects: Effects, fixtures: Vec<Fixture>) -> Show {
        Show {
            effects,
            fixtures,
            ..Default::default()
        }
    }

    /// Parses and validates a show from a YAML file.
    pub fn deserialize(path: &Path) -> Result<Show, ConfigError> {
        let show = Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize::<Show>()?;
        show.validate()?;
        Ok(show)
    }

    /// Renders the effective configuration as YAML.
    pub fn to_yaml(&self) -> Result<String, serde_yml::Error> {
        serde_yml::to_string(self)
    }

    /// Gets the show name.
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or("Untitled show")
    }

    pub fn dmx(&self) -> &Dmx {
        &self.dmx
    }

    pub fn audio(&self) -> &Audio {
        &self.audio
    }

    pub fn effects(&self) -> &Effects {
        &self.effects
    }

    pub fn fixtures(&self) -> &[Fixture] {
        &self.fixtures
    }

    /// Replaces the DMX settings.
    pub fn set_dmx(&mut self, dmx: Dmx) {
        self.dmx = dmx;
    }

    /// Replaces the audio settings.
    pub fn set_audio(&mut self, audio: Audio) {
        self.audio = audio;
    }

    /// Replaces the effects parameters.
    pub fn set_effects(&mut self, effects: Effects) {
        self.effects = effects;
    }

    /// Adds a fixture to the end of the patch.
    pub fn add_fixture(&mut self, fixture: Fixture) {
        self.fixtures.push(fixture);
    }

    /// Removes the fixture with the given name. Returns true if it existed.
    pub fn remove_fixture(&mut self, name: &str) -> bool {
        let before = self.fixtures.len();
        self.fixtures.retain(|fixture| fixture.name() != name);
        before != self.fixtures.len()
    }

    /// Adds or replaces a profile.
    pub fn add_profile(&mut self, name: &str, profile: FixtureProfile) {
        self.profiles.insert(name.to_string(), profile);
    }

    /// The profile catalog: built-in profiles overlaid with the show's own.
    pub fn profile_catalog(&self) -> HashMap<String, FixtureProfile> {
        let mut catalog = builtin_profiles();
        catalog.extend(self.profiles.clone());
        catalog
    }

    /// Resolves the channel list of a fixture against the catalog.
    pub fn resolve_channels(
        fixture: &Fixture,
        catalog: &HashMap<String, FixtureProfile>,
    ) -> Result<Vec<ChannelDef>, ConfigError> {
        if let Some(channels) = fixture.channels() {
            return Ok(channels.to_vec());
        }
        let profile_name = fixture.profile().ok_or_else(|| {
            ConfigError::validation(format!(
                "fixture {} has neither a profile nor inline channels",
                fixture.name()
            ))
        })?;
        catalog
            .get(profile_name)
            .map(|profile| profile.channels().to_vec())
            .ok_or_else(|| {
                ConfigError::validation(format!(
                    "fixture {} references unknown profile {}",
                    fixture.name(),
                    profile_name
                ))
            })
    }

    /// Verifies the show describes a patch that fits in one universe.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.dmx.validate()?;
        self.audio.validate()?;
        self.effects.validate()?;

        let catalog = self.profile_catalog();
        let mut names = HashSet::new();
        for fixture in &self.fixtures {
            if !names.insert(fixture.name()) {
                return Err(ConfigError::validation(format!(
                    "duplicate fixture name {}",
                    fixture.name()
                )));
            }
            validate_fixture(fixture, &Self::resolve_channels(fixture, &catalog)?)?;
        }
        Ok(())
    }
}

fn validate_fixture(fixture: &Fixture, channels: &[ChannelDef]) -> Result<(), ConfigError> {
    let start = u32::from(fixture.start_channel());
    if !(1..=MAX_DMX_CHANNEL).contains(&start) {
        return Err(ConfigError::validation(format!(
            "fixture {} start channel {} is outside 1-512",
            fixture.name(),
            start
        )));
    }
    for channel in channels {
        let resolved = start + u32::from(channel.offset);
        if channel.offset == 0 || resolved - 1 > MAX_DMX_CHANNEL {
            return Err(ConfigError::validation(format!(
                "fixture {} channel offset {} resolves outside 1-512",
                fixture.name(),
                channel.offset
            )));
        }
        for range in &channel.capabilities {
            if range.min > range.max {
                return Err(ConfigError::validation(format!(
                    "fixture {} channel offset {} has an inverted {} range",
                    fixture.name(),
                    channel.offset,
                    range.label
                )));
            }
        }
    }
    if fixture.pan_min() > fixture.pan_max() || fixture.tilt_min() > fixture.tilt_max() {
        return Err(ConfigError::validation(format!(
            "fixture {} has inverted pan/tilt limits",
            fixture.name()
        )));
    }
    let scale = fixture.intensity_scale();
    if !scale.is_finite() || !(0.0..=1.0).contains(&scale) {
        return Err(ConfigError::validation(format!(
            "fixture {} intensity_scale must be between 0 and 1",
            fixture.name()
        )));
    }
    Ok(())
}
