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

use super::error::AnalysisError;

pub const MIN_BPM: f64 = 60.0;
pub const MAX_BPM: f64 = 200.0;

/// Samples per onset envelope point.
pub const HOP_SIZE: usize = 512;

/// Seconds of trailing audio the heavy estimator looks at.
pub const ANALYSIS_WINDOW_SECS: f64 = 2.0;

/// Minimum time between heavy refreshes, in seconds.
pub const REFRESH_INTERVAL_SECS: f64 = 1.0;

/// Estimates kept for the median.
const HISTORY_LEN: usize = 8;

/// Normalized autocorrelation below this is treated as "no periodicity".
const MIN_CORRELATION: f64 = 0.1;

/// Onset intervals needed before the fallback estimate is trusted.
const MIN_ONSET_INTERVALS: usize = 4;

/// Folds a tempo into the 60-200 BPM range by doubling or halving it.
pub fn correct_octave(bpm: f64) -> Option<f64> {
    if !bpm.is_finite() || bpm <= 0.0 {
        return None;
    }
    let mut bpm = bpm;
    while bpm < MIN_BPM {
        bpm *= 2.0;
    }
    while bpm > MAX_BPM {
        bpm /= 2.0;
    }
    Some(bpm)
}

fn accept(bpm: f64) -> Option<f64> {
    correct_octave(bpm).filter(|bpm| (MIN_BPM..=MAX_BPM).contains(bpm))
}

/// Half-wave rectified first difference of per-hop RMS.
pub fn onset_envelope(samples: &[f32], hop: usize) -> Vec<f64> {
    let hop = hop.max(1);
    let rms: Vec<f64> = samples
        .chunks_exact(hop)
        .map(|chunk| {
            let sum: f64 = chunk.iter().map(|s| f64::from(*s) * f64::from(*s)).sum();
            (sum / hop as f64).sqrt()
        })
        .collect();
    rms.windows(2).map(|w| (w[1] - w[0]).max(0.0)).collect()
}

/// Triangular smoothing so onsets that straddle a hop boundary still line up with their
/// neighbors.
fn smooth(envelope: &[f64]) -> Vec<f64> {
    const KERNEL: [f64; 5] = [1.0, 2.0, 3.0, 2.0, 1.0];
    let weight: f64 = KERNEL.iter().sum();
    (0..envelope.len())
        .map(|i| {
            KERNEL
                .iter()
                .enumerate()
                .filter_map(|(k, w)| {
                    (i + k)
                        .checked_sub(2)
                        .and_then(|j| envelope.get(j))
                        .map(|v| v * w)
                })
                .sum::<f64>()
                / weight
        })
        .collect()
}

/// Estimates the tempo of the given audio by autocorrelating its onset envelope. Returns
/// Ok(None) if there's no clear periodicity between 60 and 200 BPM.
pub fn estimate_autocorrelation(
    samples: &[f32],
    sample_rate: u32,
) -> Result<Option<f64>, AnalysisError> {
    let need = (f64::from(sample_rate) * ANALYSIS_WINDOW_SECS) as usize;
    if samples.len() < need {
        return Err(AnalysisError::InsufficientAudioBuffer {
            have: samples.len(),
            need,
        });
    }

    let envelope = smooth(&onset_envelope(samples, HOP_SIZE));
    let mean = envelope.iter().sum::<f64>() / envelope.len().max(1) as f64;
    let centered: Vec<f64> = envelope.iter().map(|v| v - mean).collect();
    let energy: f64 = centered.iter().map(|v| v * v).sum();
    if energy <= f64::EPSILON {
        return Ok(None);
    }

    let frame_rate = f64::from(sample_rate) / HOP_SIZE as f64;
    let min_lag = (60.0 / MAX_BPM * frame_rate).floor().max(1.0) as usize;
    let max_lag = ((60.0 / MIN_BPM * frame_rate).ceil() as usize).min(centered.len() - 1);
    if min_lag >= max_lag {
        return Ok(None);
    }

    let correlation = |lag: usize| -> f64 {
        centered
            .iter()
            .zip(&centered[lag..])
            .map(|(a, b)| a * b)
            .sum::<f64>()
            / energy
    };

    let scores: Vec<f64> = (min_lag - 1..=max_lag + 1)
        .map(|lag| if lag < centered.len() { correlation(lag) } else { 0.0 })
        .collect();
    // scores[i] is the correlation at lag min_lag - 1 + i.
    let Some((peak, score)) = scores[1..scores.len() - 1]
        .iter()
        .enumerate()
        .map(|(i, score)| (i + 1, *score))
        .max_by(|a, b| a.1.total_cmp(&b.1))
    else {
        return Ok(None);
    };
    if score < MIN_CORRELATION {
        return Ok(None);
    }

    // Parabolic interpolation around the peak for sub-hop precision.
    let (left, right) = (scores[peak - 1], scores[peak + 1]);
    let denominator = left - 2.0 * score + right;
    let offset = if denominator.abs() > f64::EPSILON {
        (0.5 * (left - right) / denominator).clamp(-0.5, 0.5)
    } else {
        0.0
    };
    let lag = (min_lag - 1 + peak) as f64 + offset;
    Ok(accept(60.0 * frame_rate / lag))
}

/// Estimates the tempo from the average of the most recent onset intervals.
pub fn estimate_from_onsets(onset_times: &[f64]) -> Option<f64> {
    if onset_times.len() < MIN_ONSET_INTERVALS + 1 {
        return None;
    }
    let recent = &onset_times[onset_times.len() - (MIN_ONSET_INTERVALS + 1)..];
    let intervals: Vec<f64> = recent.windows(2).map(|w| w[1] - w[0]).collect();
    let average = intervals.iter().sum::<f64>() / intervals.len() as f64;
    if average <= 0.0 {
        return None;
    }
    accept(60.0 / average)
}

/// The last few accepted tempo estimates. The current tempo is their median.
#[derive(Clone, Debug)]
pub struct TempoHistory {
    estimates: VecDeque<f64>,
}

impl Default for TempoHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl TempoHistory {
    pub fn new() -> TempoHistory {
        TempoHistory {
            estimates: VecDeque::with_capacity(HISTORY_LEN),
        }
    }

    pub fn push(&mut self, bpm: f64) {
        if self.estimates.len() == HISTORY_LEN {
            self.estimates.pop_front();
        }
        self.estimates.push_back(bpm);
    }

    pub fn len(&self) -> usize {
        self.estimates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.estimates.is_empty()
    }

    pub fn median(&self) -> Option<f64> {
        if self.estimates.is_empty() {
            return None;
        }
        let mut sorted: Vec<f64> = self.estimates.iter().copied().collect();
        sorted.sort_by(f64::total_cmp);
        let mid = sorted.len() / 2;
        Some(if sorted.len() % 2 == 0 {
            (sorted[mid - 1] + sorted[mid]) / 2.0
        } else {
            sorted[mid]
        })
    }

    /// How much the estimates agree: 1 - min(1, stddev / median). Zero until there are at
    /// least two estimates.
    pub fn confidence(&self) -> f64 {
        let Some(median) = self.median().filter(|_| self.estimates.len() >= 2) else {
            return 0.0;
        };
        let n = self.estimates.len() as f64;
        let mean = self.estimates.iter().sum::<f64>() / n;
        let variance = self.estimates.iter().map(|e| (e - mean).powi(2)).sum::<f64>() / n;
        if median <= 0.0 {
            return 0.0;
        }
        1.0 - (variance.sqrt() / median).min(1.0)
    }
}

/// Throttles the heavy estimate to once per refresh interval.
#[derive(Clone, Debug, Default)]
pub struct RefreshThrottle {
    last_attempt: Option<f64>,
}

impl RefreshThrottle {
    pub fn refresh_due(&self, now: f64) -> bool {
        self.last_attempt
            .map_or(true, |last| now - last >= REFRESH_INTERVAL_SECS)
    }

    pub fn mark(&mut self, now: f64) {
        self.last_attempt = Some(now);
    }
}
