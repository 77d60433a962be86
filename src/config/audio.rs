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

/// The default number of samples per analysis frame.
pub const DEFAULT_BUFFER_SIZE: usize = 1024;

/// The default capture sample rate.
pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

/// A YAML representation of the audio capture configuration.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
pub struct Audio {
    /// The input device name. The host default input is used when absent. A name starting
    /// with "mock" selects the simulated analyzer.
    device: Option<String>,

    /// The number of mono samples per analysis frame.
    buffer_size: Option<usize>,

    /// The sample rate to request from the device.
    sample_rate: Option<u32>,
}

impl Audio {
    /// Creates a new audio configuration.
    pub fn new(
        device: Option<String>,
        buffer_size: Option<usize>,
        sample_rate: Option<u32>,
    ) -> Audio {
        Audio {
            device,
            buffer_size,
            sample_rate,
        }
    }

    /// Gets the input device name.
    pub fn device(&self) -> Option<&str> {
        self.device.as_deref()
    }

    /// Gets the analysis buffer size.
    pub fn buffer_size(&self) -> usize {
        self.buffer_size.unwrap_or(DEFAULT_BUFFER_SIZE)
    }

    /// Gets the sample rate.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE)
    }

    /// Returns true if the simulated analyzer should be used.
    pub fn is_mock(&self) -> bool {
        self.device().is_some_and(|device| device.starts_with("mock"))
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        let buffer_size = self.buffer_size();
        if !(64..=16384).contains(&buffer_size) {
            return Err(ConfigError::validation(format!(
                "audio buffer_size must be between 64 and 16384, got {}",
                buffer_size
            )));
        }
        if !(8000..=192000).contains(&self.sample_rate()) {
            return Err(ConfigError::validation(format!(
                "audio sample_rate must be between 8000 and 192000, got {}",
                self.sample_rate()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_defaults() {
        let audio = Audio::default();
        assert_eq!(1024, audio.buffer_size());
        assert_eq!(44100, audio.sample_rate());
        assert!(!audio.is_mock());
        assert!(audio.validate().is_ok());
    }

    #[test]
    fn test_mock_device() {
        assert!(Audio::new(Some("mock-input".into()), None, None).is_mock());
    }

    #[test]
    fn test_invalid_buffer() {
        assert!(Audio::new(None, Some(8), None).validate().is_err());
    }
}
