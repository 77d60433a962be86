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

use super::error::ConfigError;
use crate::lighting::{MovementMode, VisualizationMode};

/// Global effects parameters. These can be changed live between engine ticks, so unlike the
/// rest of the configuration they are plain fields with defaults filled in at parse time.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct Effects {
    /// How audio is mapped to color and brightness.
    pub mode: VisualizationMode,

    /// How moving heads move.
    pub movement_mode: MovementMode,

    /// Overall brightness multiplier (0-1).
    pub intensity: f64,

    /// Color change speed multiplier (0.1-10).
    pub color_speed: f64,

    /// Onset sensitivity (0-1). 0.5 is neutral.
    pub beat_sensitivity: f64,

    /// Output smoothing (0 none, 1 frozen).
    pub smooth_factor: f64,

    /// Auto-strobe when a drop is detected.
    pub strobe_on_drop: bool,

    /// Enables pan/tilt movement.
    pub movement_enabled: bool,

    /// Movement speed (0-1).
    pub movement_speed: f64,
}

impl Default for Effects {
    fn default() -> Self {
        Effects {
            mode: VisualizationMode::default(),
            movement_mode: MovementMode::default(),
            intensity: 1.0,
            color_speed: 1.0,
            beat_sensitivity: 0.5,
            smooth_factor: 0.3,
            strobe_on_drop: false,
            movement_enabled: true,
            movement_speed: 0.5,
        }
    }
}

fn check_range(name: &str, value: f64, min: f64, max: f64) -> Result<(), ConfigError> {
    if !value.is_finite() || value < min || value > max {
        return Err(ConfigError::validation(format!(
            "effects {} must be between {} and {}, got {}",
            name, min, max, value
        )));
    }
    Ok(())
}

impl Effects {
    /// Verifies every parameter is inside its documented range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range("intensity", self.intensity, 0.0, 1.0)?;
        check_range("color_speed", self.color_speed, 0.1, 10.0)?;
        check_range("beat_sensitivity", self.beat_sensitivity, 0.0, 1.0)?;
        check_range("smooth_factor", self.smooth_factor, 0.0, 1.0)?;
        check_range("movement_speed", self.movement_speed, 0.0, 1.0)
    }
}
