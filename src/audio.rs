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
use std::fmt;
use std::sync::Arc;

use crate::config;
use crate::playsync::Subscription;

pub mod analyzer;
pub mod beat_clock;
pub mod capture;
pub mod error;
pub mod features;
pub mod mock;
pub mod tempo;

pub use self::beat_clock::{beat_interval, BeatClock, BeatPosition};
pub use self::error::AnalysisError;
pub use self::features::FeatureExtractor;

/// An RGB color, e.g. from album art.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub fn new(r: u8, g: u8, b: u8) -> Rgb {
        Rgb { r, g, b }
    }
}

/// Perceptual features of the incoming audio. The 0-1 fields are each normalized against
/// their own recent peak.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioFeatures {
    pub energy: f64,
    pub rms: f64,
    /// 20-250 Hz.
    pub bass: f64,
    /// 250-4000 Hz.
    pub mid: f64,
    /// 4000-16000 Hz.
    pub high: f64,
    /// Beats per minute.
    pub tempo: f64,
    pub beat_detected: bool,
    pub onset_detected: bool,
    /// Seconds.
    pub time_since_beat: f64,
    pub beat_confidence: f64,
    pub danceability: f64,
    pub valence: f64,
}

impl Default for AudioFeatures {
    fn default() -> Self {
        AudioFeatures {
            energy: 0.0,
            rms: 0.0,
            bass: 0.0,
            mid: 0.0,
            high: 0.0,
            tempo: features::DEFAULT_TEMPO,
            beat_detected: false,
            onset_detected: false,
            time_since_beat: 0.0,
            beat_confidence: 0.0,
            danceability: 0.5,
            valence: 0.5,
        }
    }
}

fn unit(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

impl AudioFeatures {
    /// A copy with every value finite and in its documented range.
    pub fn sanitized(&self) -> AudioFeatures {
        AudioFeatures {
            energy: unit(self.energy),
            rms: unit(self.rms),
            bass: unit(self.bass),
            mid: unit(self.mid),
            high: unit(self.high),
            tempo: if self.tempo.is_finite() && self.tempo > 0.0 {
                self.tempo
            } else {
                features::DEFAULT_TEMPO
            },
            beat_detected: self.beat_detected,
            onset_detected: self.onset_detected,
            time_since_beat: if self.time_since_beat.is_finite() {
                self.time_since_beat.max(0.0)
            } else {
                0.0
            },
            beat_confidence: unit(self.beat_confidence),
            danceability: unit(self.danceability),
            valence: unit(self.valence),
        }
    }
}

/// Track metadata and palette from an external provider. Display only.
#[derive(Clone, Debug, PartialEq)]
pub struct TrackInfo {
    pub track_name: Option<String>,
    pub artist_name: Option<String>,
    pub is_playing: bool,
    pub palette: Vec<Rgb>,
}

impl Default for TrackInfo {
    fn default() -> Self {
        TrackInfo {
            track_name: None,
            artist_name: None,
            is_playing: true,
            palette: Vec::new(),
        }
    }
}

/// One analysis tick: the features plus beat tracking and display data.
#[derive(Clone, Debug, PartialEq)]
pub struct AnalysisData {
    pub features: AudioFeatures,
    /// 0-1 within the current beat.
    pub beat_position: f64,
    /// 0-1 within the current 4-beat bar.
    pub bar_position: f64,
    pub section_intensity: f64,
    pub estimated_beat: u64,
    pub estimated_bar: u64,
    pub track_name: Option<String>,
    pub artist_name: Option<String>,
    pub is_playing: bool,
    /// Ordered palette colors, if a metadata provider supplied any.
    pub palette: Vec<Rgb>,
    /// 100-point envelope of the last frame, 0-1.
    pub waveform: Vec<f64>,
    /// 32 log-spaced bands from 20 Hz to 16 kHz, 0-1.
    pub spectrum: Vec<f64>,
    /// The most recent normalized onset strengths, oldest first.
    pub onset_history: Vec<f64>,
}

impl Default for AnalysisData {
    fn default() -> Self {
        AnalysisData {
            features: AudioFeatures::default(),
            beat_position: 0.0,
            bar_position: 0.0,
            section_intensity: 0.5,
            estimated_beat: 0,
            estimated_bar: 0,
            track_name: None,
            artist_name: None,
            is_playing: true,
            palette: Vec::new(),
            waveform: Vec::new(),
            spectrum: Vec::new(),
            onset_history: Vec::new(),
        }
    }
}

impl AnalysisData {
    /// Seconds per beat, 0.5 if the tempo is unknown.
    pub fn beat_interval(&self) -> f64 {
        beat_interval(self.features.tempo)
    }

    /// 60-180 BPM mapped onto 0-1.
    pub fn normalized_tempo(&self) -> f64 {
        unit((self.features.tempo - 60.0) / 120.0)
    }

    /// Merges in track metadata.
    pub fn with_track_info(mut self, info: &TrackInfo) -> AnalysisData {
        self.track_name = info.track_name.clone();
        self.artist_name = info.artist_name.clone();
        self.is_playing = info.is_playing;
        self.palette = info.palette.clone();
        self
    }
}

/// A source of analysis snapshots at a steady cadence.
pub trait Analyzer: fmt::Display + Send + Sync {
    /// Starts capture and publishing.
    fn start(&self) -> Result<(), AnalysisError>;

    /// Stops publishing. Safe to call more than once.
    fn stop(&self);

    /// Registers a new subscriber. Dropping the receiver unregisters it.
    fn subscribe(&self) -> Subscription<AnalysisData>;

    /// The most recently published snapshot.
    fn latest(&self) -> AnalysisData;

    /// Sets beat sensitivity, 0-1.
    fn set_sensitivity(&self, sensitivity: f64);

    /// Sets the track metadata merged into every snapshot.
    fn set_track_info(&self, info: TrackInfo);
}

/// Gets the analyzer for the given audio configuration. Devices named "mock..." get the
/// simulated analyzer.
pub fn get_analyzer(config: &config::Audio) -> Result<Arc<dyn Analyzer>, AnalysisError> {
    if config.is_mock() {
        return Ok(Arc::new(mock::Analyzer::new(config.device().unwrap_or("mock"))));
    }
    Ok(Arc::new(analyzer::LiveAnalyzer::new(config.clone())))
}

/// Lists the names of the available input devices.
pub fn list_devices() -> Result<Vec<String>, AnalysisError> {
    capture::list_input_devices()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_sanitized() {
        let features = AudioFeatures {
            energy: f64::NAN,
            bass: 3.0,
            mid: -1.0,
            tempo: f64::INFINITY,
            time_since_beat: f64::NAN,
            ..Default::default()
        }
        .sanitized();
        assert_eq!(0.0, features.energy);
        assert_eq!(1.0, features.bass);
        assert_eq!(0.0, features.mid);
        assert_eq!(120.0, features.tempo);
        assert_eq!(0.0, features.time_since_beat);
    }

    #[test]
    fn test_derived_accessors() {
        let mut data = AnalysisData::default();
        assert_eq!(0.5, data.beat_interval());
        assert_eq!(0.5, data.normalized_tempo());
        data.features.tempo = 0.0;
        assert_eq!(0.5, data.beat_interval());
        assert_eq!(0.0, data.normalized_tempo());
        data.features.tempo = 240.0;
        assert_eq!(1.0, data.normalized_tempo());
    }

    #[test]
    fn test_get_mock_analyzer() {
        let config = config::Audio::new(Some("mock-device".to_string()), None, None);
        let analyzer = get_analyzer(&config).unwrap();
        assert_eq!("mock-device (simulated)", analyzer.to_string());
    }
}
