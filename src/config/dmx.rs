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

/// The default DMX frame rate.
pub const DEFAULT_DMX_FPS: u32 = 40;

/// The highest frame rate a full 512 channel DMX frame can sustain.
pub const MAX_DMX_FPS: u32 = 44;

/// A YAML representation of the DMX output configuration.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
pub struct Dmx {
    /// The serial port to use. Auto-detected when absent.
    port: Option<String>,

    /// The number of frames per second to transmit.
    fps: Option<u32>,
}

impl Dmx {
    /// Creates a new DMX configuration.
    pub fn new(port: Option<String>, fps: Option<u32>) -> Dmx {
        Dmx { port, fps }
    }

    /// Gets the configured serial port, if any.
    pub fn port(&self) -> Option<&str> {
        self.port.as_deref().filter(|port| !port.is_empty())
    }

    /// Gets the frame rate.
    pub fn fps(&self) -> u32 {
        self.fps.unwrap_or(DEFAULT_DMX_FPS)
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        let fps = self.fps();
        if !(1..=MAX_DMX_FPS).contains(&fps) {
            return Err(ConfigError::validation(format!(
                "dmx fps must be between 1 and {}, got {}",
                MAX_DMX_FPS, fps
            )));
        }
        Ok(())
    }
}
