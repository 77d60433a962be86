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
use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, span, Level};

use super::analyzer::{run_every, Publisher, PUBLISH_INTERVAL};
use super::error::AnalysisError;
use super::{AnalysisData, AudioFeatures, Rgb, TrackInfo};
use crate::playsync::{CancelHandle, Subscription};
use crate::util::{join_with_timeout, DEFAULT_JOIN_TIMEOUT};

/// The tempo of the simulated music.
pub const SIMULATED_TEMPO: f64 = 128.0;

const SIMULATED_TRACK: &str = "Simulated Audio";
const WAVEFORM_POINTS: usize = 100;
const SPECTRUM_BANDS: usize = 32;
const ONSET_POINTS: usize = 64;
const PALETTE_SIZE: usize = 5;

/// Generates plausible analysis data from a clock: a steady 128 BPM beat, slowly drifting
/// energy and bands, and a rotating palette.
pub struct Simulation {
    rng: StdRng,
    last_beat: f64,
    beat_count: u64,
}

impl Default for Simulation {
    fn default() -> Self {
        Self::new()
    }
}

impl Simulation {
    pub fn new() -> Simulation {
        Simulation::with_rng(StdRng::from_entropy())
    }

    /// A simulation with reproducible noise.
    pub fn seeded(seed: u64) -> Simulation {
        Simulation::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Simulation {
        Simulation {
            rng,
            last_beat: 0.0,
            beat_count: 0,
        }
    }

    /// Produces the snapshot for the given number of seconds since the simulation started.
    pub fn tick(&mut self, elapsed: f64) -> AnalysisData {
        let interval = 60.0 / SIMULATED_TEMPO;
        let mut since_beat = (elapsed - self.last_beat).max(0.0);
        let beat = since_beat >= interval;
        if beat {
            self.last_beat = elapsed;
            self.beat_count += 1;
            since_beat = 0.0;
        }

        let base_energy = 0.5 + 0.3 * (elapsed * 0.2).sin();
        let beat_pulse = 0.2 * (1.0 - since_beat / interval);
        let energy = base_energy + beat_pulse;
        let bass = 0.6 + 0.3 * (elapsed * 0.5).sin();
        let mid = 0.5 + 0.2 * (elapsed * 0.7).sin();
        let high = 0.4 + 0.2 * (elapsed * 1.1).sin();
        let beat_position = since_beat / interval;

        AnalysisData {
            features: AudioFeatures {
                energy,
                rms: energy * 0.1,
                bass,
                mid,
                high,
                tempo: SIMULATED_TEMPO,
                beat_detected: beat,
                onset_detected: beat,
                time_since_beat: since_beat,
                beat_confidence: 0.9,
                danceability: 0.7 + 0.1 * (elapsed * 0.1).sin(),
                valence: 0.6 + 0.2 * (elapsed * 0.15).sin(),
            },
            beat_position,
            bar_position: ((self.beat_count % 4) as f64 + beat_position) / 4.0,
            section_intensity: base_energy + beat_pulse * 0.5,
            estimated_beat: self.beat_count,
            estimated_bar: self.beat_count / 4,
            track_name: Some(SIMULATED_TRACK.to_string()),
            artist_name: None,
            is_playing: true,
            palette: palette((elapsed * 0.1) % 1.0),
            waveform: self.waveform(elapsed, beat_position, base_energy),
            spectrum: self.spectrum(elapsed, beat_position, bass, mid, high),
            onset_history: onset_history(elapsed, interval),
        }
    }

    fn waveform(&mut self, elapsed: f64, beat_position: f64, energy: f64) -> Vec<f64> {
        let beat_factor = 1.0 - beat_position * 0.5;
        (0..WAVEFORM_POINTS)
            .map(|i| {
                let t = elapsed * 10.0 + i as f64 * 0.1;
                let wave = 0.3 * (t * 2.0).sin() + 0.2 * (t * 5.0).sin() + 0.1 * (t * 13.0).sin();
                let wave = wave + self.rng.gen_range(-0.1..0.1);
                (wave.abs() * energy * beat_factor).clamp(0.0, 1.0)
            })
            .collect()
    }

    fn spectrum(
        &mut self,
        elapsed: f64,
        beat_position: f64,
        bass: f64,
        mid: f64,
        high: f64,
    ) -> Vec<f64> {
        let beat_factor = 1.0 - beat_position * 0.3;
        (0..SPECTRUM_BANDS)
            .map(|i| {
                let pos = i as f64 / (SPECTRUM_BANDS - 1) as f64;
                let base = if pos < 0.33 {
                    bass * (1.0 - pos * 3.0) + mid * pos * 3.0
                } else if pos < 0.66 {
                    let blend = (pos - 0.33) * 3.0;
                    mid * (1.0 - blend) + high * blend
                } else {
                    high * (1.0 - (pos - 0.66) * 1.5)
                };
                let wave = 0.2 * (elapsed * 5.0 + i as f64 * 0.5).sin();
                let noise = self.rng.gen_range(-0.05..0.05);
                ((base + wave + noise) * beat_factor).clamp(0.0, 1.0)
            })
            .collect()
    }
}

fn onset_history(elapsed: f64, interval: f64) -> Vec<f64> {
    (0..ONSET_POINTS)
        .map(|i| {
            let t = elapsed - (ONSET_POINTS - i) as f64 * PUBLISH_INTERVAL.as_secs_f64();
            let phase = t.rem_euclid(interval) / interval;
            let onset = if phase < 0.1 {
                0.8 + 0.2 * (phase * PI / 0.1).sin()
            } else {
                0.3 * (1.0 - (phase - 0.1) / 0.9) + 0.2
            };
            (onset + 0.05 * (t * 20.0 + i as f64).sin()).clamp(0.0, 1.0)
        })
        .collect()
}

fn palette(base_hue: f64) -> Vec<Rgb> {
    (0..PALETTE_SIZE)
        .map(|i| Rgb::from_hsv(base_hue + i as f64 * 0.15, 0.8, 0.9))
        .collect()
}

struct Worker {
    cancel_handle: CancelHandle,
    handle: JoinHandle<()>,
}

/// An analyzer that publishes simulated data, for running a show without a sound card.
pub struct Analyzer {
    name: String,
    publisher: Arc<Publisher>,
    track_info: Arc<Mutex<Option<TrackInfo>>>,
    worker: Mutex<Option<Worker>>,
}

impl Analyzer {
    pub fn new(name: &str) -> Analyzer {
        Analyzer {
            name: name.to_string(),
            publisher: Arc::new(Publisher::new()),
            track_info: Arc::new(Mutex::new(None)),
            worker: Mutex::new(None),
        }
    }
}

impl fmt::Display for Analyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (simulated)", self.name)
    }
}

impl super::Analyzer for Analyzer {
    fn start(&self) -> Result<(), AnalysisError> {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return Ok(());
        }
        info!(device = self.name, tempo = SIMULATED_TEMPO, "Starting simulated analysis");

        let cancel_handle = CancelHandle::new();
        let handle = {
            let publisher = self.publisher.clone();
            let track_info = self.track_info.clone();
            let cancel_handle = cancel_handle.clone();
            thread::spawn(move || {
                let span = span!(Level::INFO, "simulated analysis");
                let _enter = span.enter();

                let mut simulation = Simulation::new();
                let started = Instant::now();
                run_every(PUBLISH_INTERVAL, &cancel_handle, || {
                    let data = simulation.tick(started.elapsed().as_secs_f64());
                    let data = match track_info.lock().as_ref() {
                        Some(info) => data.with_track_info(info),
                        None => data,
                    };
                    publisher.publish(data);
                });
            })
        };

        *worker = Some(Worker {
            cancel_handle,
            handle,
        });
        Ok(())
    }

    fn stop(&self) {
        let Some(worker) = self.worker.lock().take() else {
            return;
        };
        worker.cancel_handle.cancel();
        join_with_timeout(worker.handle, DEFAULT_JOIN_TIMEOUT, "simulated analysis");
        info!(device = self.name, "Stopped simulated analysis");
    }

    fn subscribe(&self) -> Subscription<AnalysisData> {
        self.publisher.subscribe()
    }

    fn latest(&self) -> AnalysisData {
        self.publisher.latest()
    }

    fn set_sensitivity(&self, sensitivity: f64) {
        // Simulated beats are fixed; nothing to tune.
        debug!(sensitivity, "Ignoring sensitivity for simulated analysis");
    }

    fn set_track_info(&self, info: TrackInfo) {
        *self.track_info.lock() = Some(info);
    }
}

impl Drop for Analyzer {
    fn drop(&mut self) {
        super::Analyzer::stop(self);
    }
}
