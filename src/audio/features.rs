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
use std::collections::VecDeque;
use std::ops::Range;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use super::beat_clock::{beat_interval, BeatClock};
use super::error::AnalysisError;
use super::tempo::{self, RefreshThrottle, TempoHistory, ANALYSIS_WINDOW_SECS};
use super::{AnalysisData, AudioFeatures};

/// The tempo assumed until the first estimate lands.
pub const DEFAULT_TEMPO: f64 = 120.0;

pub const DEFAULT_SENSITIVITY: f64 = 0.5;

const RMS_DECAY: f64 = 0.9995;
const BAND_DECAY: f64 = 0.999;
const PEAK_FLOOR: f64 = 0.01;
const BAND_GAIN: f64 = 1.1;
const ENERGY_GAIN: f64 = 1.2;

const ONSET_RISE: f64 = 1.3;
const ONSET_COOLDOWN_SECS: f64 = 0.08;
const ONSET_TIMES_LEN: usize = 32;
const ONSET_STRENGTH_LEN: usize = 64;

const ENERGY_HISTORY_LEN: usize = 10;
const BAND_HISTORY_LEN: usize = 5;

const WAVEFORM_POINTS: usize = 100;
const SPECTRUM_BANDS: usize = 32;

/// Bass, mid and high, in Hz.
const BANDS: [(f64, f64); 3] = [(20.0, 250.0), (250.0, 4000.0), (4000.0, 16000.0)];
const SPECTRUM_RANGE: (f64, f64) = (20.0, 16000.0);

/// Maps beat sensitivity (0-1) to the normalized RMS an onset must clear. 0.5 gives 0.3.
pub fn onset_threshold(sensitivity: f64) -> f64 {
    let sensitivity = if sensitivity.is_finite() {
        sensitivity.clamp(0.0, 1.0)
    } else {
        DEFAULT_SENSITIVITY
    };
    0.3 + (0.5 - sensitivity) * 0.2
}

/// Clamps into 0-1, mapping anything non-finite to 0.
fn unit(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

fn mean(values: &VecDeque<f64>) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn push_bounded(values: &mut VecDeque<f64>, value: f64, len: usize) {
    if values.len() == len {
        values.pop_front();
    }
    values.push_back(value);
}

/// Tracks a decaying peak so levels normalize to recent loudness.
#[derive(Clone, Copy, Debug)]
struct PeakTracker {
    peak: f64,
    decay: f64,
}

impl PeakTracker {
    fn new(decay: f64) -> PeakTracker {
        PeakTracker {
            peak: PEAK_FLOOR,
            decay,
        }
    }

    fn update(&mut self, value: f64) -> f64 {
        if value > self.peak {
            self.peak = value;
        } else {
            self.peak *= self.decay;
        }
        self.peak = self.peak.max(PEAK_FLOOR);
        self.peak
    }
}

/// Fixed-size ring of the most recent raw samples, for the heavy tempo estimate.
struct SampleRing {
    samples: Vec<f32>,
    next: usize,
    filled: usize,
}

impl SampleRing {
    fn new(capacity: usize) -> SampleRing {
        SampleRing {
            samples: vec![0.0; capacity.max(1)],
            next: 0,
            filled: 0,
        }
    }

    fn push(&mut self, frame: &[f32]) {
        let capacity = self.samples.len();
        for sample in frame {
            self.samples[self.next] = *sample;
            self.next = (self.next + 1) % capacity;
        }
        self.filled = (self.filled + frame.len()).min(capacity);
    }

    /// Oldest first.
    fn ordered(&self) -> Vec<f32> {
        let capacity = self.samples.len();
        let start = (self.next + capacity - self.filled) % capacity;
        (0..self.filled)
            .map(|i| self.samples[(start + i) % capacity])
            .collect()
    }
}

/// All of the mutable extraction state. Lives behind the extractor's lock.
struct State {
    features: AudioFeatures,
    clock: BeatClock,

    frame: Vec<f32>,
    fft_buffer: Vec<Complex<f32>>,
    fft_scratch: Vec<Complex<f32>>,
    power: Vec<f64>,

    rms_peak: PeakTracker,
    band_peaks: [PeakTracker; 3],
    energy_history: VecDeque<f64>,
    band_history: [VecDeque<f64>; 3],

    threshold: f64,
    prev_smoothed: f64,
    last_onset: Option<f64>,
    onset_times: VecDeque<f64>,
    onset_strength: VecDeque<f64>,

    last_beat: Option<f64>,
    beat_latched: bool,
    onset_latched: bool,

    ring: SampleRing,
    tempo_history: TempoHistory,
    throttle: RefreshThrottle,

    waveform: Vec<f64>,
    spectrum: Vec<f64>,
}

/// Turns fixed-size mono audio frames into a running set of audio features.
///
/// `ingest` is cheap and runs on the capture path. The heavy tempo estimate runs separately
/// through `refresh_tempo`, which only holds the lock to copy audio out and to write the
/// result back.
pub struct FeatureExtractor {
    sample_rate: u32,
    buffer_size: usize,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    band_bins: [Range<usize>; 3],
    spectrum_bins: Vec<Range<usize>>,
    epoch: Instant,
    state: Mutex<State>,
}

impl FeatureExtractor {
    pub fn new(sample_rate: u32, buffer_size: usize) -> FeatureExtractor {
        let sample_rate = sample_rate.max(1);
        let buffer_size = buffer_size.max(2);
        let fft = FftPlanner::<f32>::new().plan_fft_forward(buffer_size);
        let scratch_len = fft.get_inplace_scratch_len();

        // Hann window.
        let window = (0..buffer_size)
            .map(|i| {
                let phase = 2.0 * std::f32::consts::PI * i as f32 / (buffer_size - 1) as f32;
                0.5 * (1.0 - phase.cos())
            })
            .collect();

        let bin_hz = f64::from(sample_rate) / buffer_size as f64;
        let bins = buffer_size / 2 + 1;
        // Bins whose center frequency falls in [low, high).
        let band_bins = BANDS.map(|(low, high)| {
            let start = ((low / bin_hz).ceil() as usize).min(bins);
            let end = ((high / bin_hz).ceil() as usize).min(bins);
            start..end.max(start)
        });

        let (low, high) = SPECTRUM_RANGE;
        let ratio = (high / low).powf(1.0 / SPECTRUM_BANDS as f64);
        let spectrum_bins = (0..SPECTRUM_BANDS)
            .map(|i| {
                let start = ((low * ratio.powi(i as i32) / bin_hz) as usize).min(bins - 1);
                let end = ((low * ratio.powi(i as i32 + 1) / bin_hz) as usize).min(bins);
                start..end.max(start + 1)
            })
            .collect();

        let ring_len = (f64::from(sample_rate) * ANALYSIS_WINDOW_SECS) as usize;

        FeatureExtractor {
            sample_rate,
            buffer_size,
            fft,
            window,
            band_bins,
            spectrum_bins,
            epoch: Instant::now(),
            state: Mutex::new(State {
                features: AudioFeatures::default(),
                clock: BeatClock::new(DEFAULT_TEMPO),
                frame: vec![0.0; buffer_size],
                fft_buffer: vec![Complex::new(0.0, 0.0); buffer_size],
                fft_scratch: vec![Complex::new(0.0, 0.0); scratch_len],
                power: vec![0.0; bins],
                rms_peak: PeakTracker::new(RMS_DECAY),
                band_peaks: [PeakTracker::new(BAND_DECAY); 3],
                energy_history: VecDeque::with_capacity(ENERGY_HISTORY_LEN),
                band_history: std::array::from_fn(|_| VecDeque::with_capacity(BAND_HISTORY_LEN)),
                threshold: onset_threshold(DEFAULT_SENSITIVITY),
                prev_smoothed: 0.0,
                last_onset: None,
                onset_times: VecDeque::with_capacity(ONSET_TIMES_LEN),
                onset_strength: VecDeque::with_capacity(ONSET_STRENGTH_LEN),
                last_beat: None,
                beat_latched: false,
                onset_latched: false,
                ring: SampleRing::new(ring_len),
                tempo_history: TempoHistory::new(),
                throttle: RefreshThrottle::default(),
                waveform: vec![0.0; WAVEFORM_POINTS],
                spectrum: vec![0.0; SPECTRUM_BANDS],
            }),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Seconds since the extractor was created, on the clock `ingest` uses.
    pub fn now(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    /// Sets how eagerly onsets are detected, 0-1.
    pub fn set_sensitivity(&self, sensitivity: f64) {
        self.state.lock().threshold = onset_threshold(sensitivity);
    }

    /// Ingests one frame of mono audio, timestamped now.
    pub fn ingest(&self, frame: &[f32]) {
        self.ingest_at(frame, self.now());
    }

    /// Ingests one frame of mono audio captured at `t` seconds. Short frames are padded with
    /// silence, long ones truncated.
    pub fn ingest_at(&self, frame: &[f32], t: f64) {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        state.frame.fill(0.0);
        for (dst, src) in state.frame.iter_mut().zip(frame) {
            *dst = if src.is_finite() { *src } else { 0.0 };
        }
        state.ring.push(&state.frame);

        let rms = (state
            .frame
            .iter()
            .map(|s| f64::from(*s) * f64::from(*s))
            .sum::<f64>()
            / self.buffer_size as f64)
            .sqrt();
        let max_rms = state.rms_peak.update(rms);
        let normalized = rms / max_rms;

        // Onsets.
        let onset = normalized > state.threshold
            && normalized > state.prev_smoothed * ONSET_RISE
            && state
                .last_onset
                .map_or(true, |last| t - last >= ONSET_COOLDOWN_SECS);
        state.prev_smoothed = 0.7 * normalized + 0.3 * state.prev_smoothed;
        if onset {
            state.last_onset = Some(t);
            push_bounded(&mut state.onset_times, t, ONSET_TIMES_LEN);
        }
        push_bounded(
            &mut state.onset_strength,
            unit(normalized),
            ONSET_STRENGTH_LEN,
        );

        // Beats.
        let tempo = state.features.tempo;
        let last_beat = *state.last_beat.get_or_insert(t);
        let since_beat = (t - last_beat).max(0.0);
        let interval = beat_interval(tempo);
        let beat = since_beat >= 0.9 * interval && (onset || since_beat >= interval);
        if beat {
            state.last_beat = Some(t);
            state.clock.on_beat(tempo);
        }

        // Bands.
        for ((sample, window), bin) in state
            .frame
            .iter()
            .zip(&self.window)
            .zip(state.fft_buffer.iter_mut())
        {
            *bin = Complex::new(sample * window, 0.0);
        }
        self.fft
            .process_with_scratch(&mut state.fft_buffer, &mut state.fft_scratch);
        for (power, bin) in state.power.iter_mut().zip(&state.fft_buffer) {
            *power = f64::from(bin.norm_sqr());
        }
        for band in 0..BANDS.len() {
            let raw: f64 = state.power[self.band_bins[band].clone()].iter().sum();
            let peak = state.band_peaks[band].update(raw);
            let value = unit(raw / peak * BAND_GAIN);
            push_bounded(&mut state.band_history[band], value, BAND_HISTORY_LEN);
        }
        push_bounded(&mut state.energy_history, rms, ENERGY_HISTORY_LEN);

        self.update_display(state, max_rms);

        let features = &mut state.features;
        features.rms = unit(rms);
        features.energy = unit(mean(&state.energy_history) / max_rms * ENERGY_GAIN);
        features.bass = unit(mean(&state.band_history[0]));
        features.mid = unit(mean(&state.band_history[1]));
        features.high = unit(mean(&state.band_history[2]));
        features.beat_detected = beat;
        features.onset_detected = onset;
        features.time_since_beat = if beat { 0.0 } else { since_beat };

        features.danceability = unit(match regularity(&state.onset_times) {
            Some(regularity) => regularity * 0.7 + features.bass * 0.3 + 0.1,
            None => features.bass * 0.5 + features.energy * 0.3 + 0.2,
        });
        let band_sum = features.bass + features.mid + features.high;
        if band_sum > 0.0 {
            features.valence = unit((features.mid + 2.0 * features.high) / (band_sum + 0.001));
        }

        state.beat_latched |= beat;
        state.onset_latched |= onset;
    }

    fn update_display(&self, state: &mut State, max_rms: f64) {
        let chunk = (self.buffer_size / WAVEFORM_POINTS).max(1);
        let waveform_scale = (max_rms * 3.0).max(0.01);
        for (i, point) in state.waveform.iter_mut().enumerate() {
            let start = i * chunk;
            *point = state
                .frame
                .get(start..(start + chunk).min(self.buffer_size))
                .map(|chunk| {
                    let peak = chunk.iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
                    unit(f64::from(peak) / waveform_scale)
                })
                .unwrap_or(0.0);
        }

        let spectrum_scale = (max_rms * max_rms * 10.0).max(0.001);
        for (value, bins) in state.spectrum.iter_mut().zip(&self.spectrum_bins) {
            let band = &state.power[bins.clone()];
            let average = band.iter().sum::<f64>() / band.len().max(1) as f64;
            *value = unit(average / spectrum_scale);
        }
    }

    /// A copy of the current features.
    pub fn snapshot(&self) -> AudioFeatures {
        self.state.lock().features.sanitized()
    }

    /// The full analysis snapshot as of the last ingested frame.
    pub fn analysis(&self) -> AnalysisData {
        let state = self.state.lock();
        Self::build_analysis(&state, state.features.clone())
    }

    /// Like `analysis`, but reports any beat or onset since the last call and then clears
    /// them, so a beat between two calls is seen exactly once.
    pub fn take_analysis(&self) -> AnalysisData {
        let mut state = self.state.lock();
        let mut features = state.features.clone();
        features.beat_detected = state.beat_latched;
        features.onset_detected = state.onset_latched;
        state.beat_latched = false;
        state.onset_latched = false;
        Self::build_analysis(&state, features)
    }

    fn build_analysis(state: &State, features: AudioFeatures) -> AnalysisData {
        let features = features.sanitized();
        let position = state.clock.position(features.time_since_beat);
        let beat_pulse = if features.beat_detected {
            1.0 - position.beat_position
        } else {
            0.0
        };
        AnalysisData {
            section_intensity: unit(features.energy * 0.7 + beat_pulse * 0.3),
            beat_position: position.beat_position,
            bar_position: position.bar_position,
            estimated_beat: position.estimated_beat,
            estimated_bar: position.estimated_bar,
            waveform: state.waveform.clone(),
            spectrum: state.spectrum.clone(),
            onset_history: state.onset_strength.iter().copied().collect(),
            features,
            ..Default::default()
        }
    }

    /// Runs the heavy tempo estimate if it's due. Returns the accepted estimate, if any.
    ///
    /// Audio is copied out under the lock and analyzed without it. Fewer than two seconds of
    /// audio is reported as `InsufficientAudioBuffer`, which callers should treat as a skip.
    pub fn refresh_tempo(&self, now: f64) -> Result<Option<f64>, AnalysisError> {
        let (samples, onsets) = {
            let mut state = self.state.lock();
            if !state.throttle.refresh_due(now) {
                return Ok(None);
            }
            state.throttle.mark(now);
            let need = (f64::from(self.sample_rate) * ANALYSIS_WINDOW_SECS) as usize;
            if state.ring.filled < need {
                return Err(AnalysisError::InsufficientAudioBuffer {
                    have: state.ring.filled,
                    need,
                });
            }
            (
                state.ring.ordered(),
                state.onset_times.iter().copied().collect::<Vec<_>>(),
            )
        };

        let estimate = tempo::estimate_autocorrelation(&samples, self.sample_rate)?
            .or_else(|| tempo::estimate_from_onsets(&onsets));

        if let Some(bpm) = estimate {
            let mut state = self.state.lock();
            state.tempo_history.push(bpm);
            if let Some(median) = state.tempo_history.median() {
                state.features.tempo = median;
            }
            state.features.beat_confidence = state.tempo_history.confidence();
        }
        Ok(estimate)
    }
}

/// 1 - min(1, coefficient of variation) of the inter-onset intervals, once there are at least
/// three onsets.
fn regularity(onset_times: &VecDeque<f64>) -> Option<f64> {
    if onset_times.len() < 3 {
        return None;
    }
    let intervals: Vec<f64> = onset_times
        .iter()
        .zip(onset_times.iter().skip(1))
        .map(|(a, b)| b - a)
        .collect();
    let n = intervals.len() as f64;
    let average = intervals.iter().sum::<f64>() / n;
    if average <= 0.0 {
        return None;
    }
    let variance = intervals
        .iter()
        .map(|i| (i - average).powi(2))
        .sum::<f64>()
        / n;
    Some(1.0 - (variance.sqrt() / average).min(1.0))
}
