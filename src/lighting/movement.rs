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
//! Pan/tilt movement. Every mode produces a target position per fixture; the fixture's actual
//! position then eases toward the target at a per-mode rate.
//!
//! Factors below are fractions of half the axis range, measured from the axis center.
//!
//! The continuous modes advance a phase by a fixed 25 ms step per tick:
//!
//! - circle: the phase turns at 0.08·speed·(0.7 + energy·0.6) revolutions per second, offset
//!   by 60° per rig position. Radius is 0.5·speed plus a beat pulse of 0.3·bass that decays in
//!   a third of a second. Pan follows cos, tilt follows 0.7·sin.
//! - figure_8: 0.06·speed·(0.6 + energy·0.5) rev/s, 45° per position. Size 0.6·speed·(0.8 +
//!   energy·0.2). Pan is cos(φ)·size, tilt is (sin(2φ)·0.5 + 0.2)·size.
//! - ballyhoo: 0.12·speed·(0.8 + energy·0.4) rev/s, 90° per position. Pan is sin(φ)·0.85·speed,
//!   tilt lags 45° at 0.6 of the pan size and lifts by 0.2·energy. A beat with bass > 0.7
//!   mirrors the phase.
//! - crazy: independent pan and tilt phases at 0.18 and 0.23 rev/s, times speed·(0.5 +
//!   energy·1.5), each a sine plus a detuned harmonic, mapped over the full min..max range.
//!   Beats and bars randomly mirror or jump the phases.
//!
//! The beat-driven modes:
//!
//! - fan: bars alternate the spread between 0.9 (even) and 0.2 (odd), eased at 0.08·speed per
//!   tick. Pan is the rig position mapped to -1..1 times spread·speed·0.85, tilt is (0.3 −
//!   spread·0.4)·speed, plus 0.2·bass on a beat with bass > 0.4.
//! - chase: a single active fixture advances on every beat and visits one of eight accent
//!   positions; the rest sit slightly spread around the center.
//! - strobe_position: every beat jumps to one of eight extreme positions, picked by beat, bar
//!   and rig position, with jitter above 0.6 energy.
use std::f64::consts::{PI, TAU};
use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::color::ease_in_out_sine;
use super::state::FixtureState;
use crate::audio::AnalysisData;

/// How moving heads move.
#[derive(Deserialize, Clone, Copy, Serialize, Debug, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MovementMode {
    /// Small adjustments on bars.
    Subtle,
    /// Pan on bars, tilt on energetic beats.
    #[default]
    Standard,
    /// Full range, moving on most beats.
    Dramatic,
    /// Steps around the walls and corners of a room.
    WallWash,
    /// Slow continuous side-to-side sweep.
    Sweep,
    /// Random positions on some beats.
    Random,
    /// Continuous circles that widen on bass beats.
    Circle,
    /// Continuous figure eight, faster with energy.
    #[serde(rename = "figure_8")]
    Figure8,
    /// Fast sweeping arcs, mirrored on heavy beats.
    Ballyhoo,
    /// Spreads the rig out and pulls it together on alternating bars.
    Fan,
    /// One fixture at a time moves to an accent position on each beat.
    Chase,
    /// Jumps to an extreme position on every beat.
    StrobePosition,
    /// Chaotic independent pan and tilt across the full range.
    Crazy,
}

impl MovementMode {
    pub const ALL: [MovementMode; 13] = [
        MovementMode::Subtle,
        MovementMode::Standard,
        MovementMode::Dramatic,
        MovementMode::WallWash,
        MovementMode::Sweep,
        MovementMode::Random,
        MovementMode::Circle,
        MovementMode::Figure8,
        MovementMode::Ballyhoo,
        MovementMode::Fan,
        MovementMode::Chase,
        MovementMode::StrobePosition,
        MovementMode::Crazy,
    ];

    /// Per-tick easing rates (pan, tilt) toward the target at full speed.
    pub fn interpolation_rates(&self) -> (f64, f64) {
        match self {
            MovementMode::Subtle => (0.06, 0.06),
            MovementMode::Standard => (0.12, 0.15),
            MovementMode::Dramatic => (0.18, 0.22),
            MovementMode::WallWash => (0.08, 0.10),
            MovementMode::Sweep => (0.05, 0.05),
            MovementMode::Random => (0.10, 0.12),
            MovementMode::Circle => (0.15, 0.15),
            MovementMode::Figure8 => (0.12, 0.12),
            MovementMode::Ballyhoo => (0.25, 0.25),
            MovementMode::Fan => (0.10, 0.12),
            MovementMode::Chase => (0.20, 0.22),
            MovementMode::StrobePosition => (0.45, 0.45),
            MovementMode::Crazy => (0.55, 0.55),
        }
    }

    /// The pan/tilt speed channel value (0 fastest) for the given movement speed.
    pub fn motor_speed(&self, speed: f64) -> u8 {
        let slowest = match self {
            MovementMode::Sweep | MovementMode::Subtle | MovementMode::Figure8 => 60.0,
            MovementMode::Dramatic
            | MovementMode::StrobePosition
            | MovementMode::Ballyhoo
            | MovementMode::Crazy => 10.0,
            MovementMode::Circle | MovementMode::Chase => 20.0,
            _ => 30.0,
        };
        (slowest * (1.0 - speed.clamp(0.0, 1.0))) as u8
    }
}

impl fmt::Display for MovementMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MovementMode::Subtle => "subtle",
            MovementMode::Standard => "standard",
            MovementMode::Dramatic => "dramatic",
            MovementMode::WallWash => "wall_wash",
            MovementMode::Sweep => "sweep",
            MovementMode::Random => "random",
            MovementMode::Circle => "circle",
            MovementMode::Figure8 => "figure_8",
            MovementMode::Ballyhoo => "ballyhoo",
            MovementMode::Fan => "fan",
            MovementMode::Chase => "chase",
            MovementMode::StrobePosition => "strobe_position",
            MovementMode::Crazy => "crazy",
        };
        write!(f, "{}", name)
    }
}

/// The nominal tick length the continuous modes advance by.
const STEP: f64 = 0.025;

const SUBTLE_PAN: [f64; 8] = [0.0, 0.1, -0.05, 0.08, -0.1, 0.05, -0.08, 0.0];
const SUBTLE_TILT: [f64; 8] = [0.2, 0.3, 0.15, 0.35, 0.25, 0.1, 0.3, 0.2];
const STANDARD_PAN: [f64; 8] = [0.0, 0.5, 0.2, -0.4, 0.4, -0.5, -0.2, 0.0];
const STANDARD_TILT: [f64; 8] = [0.4, -0.2, 0.2, -0.4, 0.3, -0.1, 0.25, -0.3];
const DRAMATIC_PAN: [f64; 8] = [0.0, 0.9, -0.7, 0.5, -0.9, 0.7, -0.5, 0.8];
const DRAMATIC_TILT: [f64; 8] = [0.8, -0.6, 0.5, -0.8, 0.9, -0.4, 0.6, -0.7];
const WALLS: [(f64, f64); 8] = [
    (-0.9, 0.7),
    (-0.9, 0.3),
    (-0.5, 0.9),
    (0.0, 0.8),
    (0.0, 0.4),
    (0.5, 0.9),
    (0.9, 0.3),
    (0.9, 0.7),
];
const CHASE_POINTS: [(f64, f64); 8] = [
    (0.8, 0.6),
    (0.5, 0.8),
    (0.0, 0.7),
    (-0.5, 0.8),
    (-0.8, 0.6),
    (-0.6, 0.3),
    (0.0, 0.2),
    (0.6, 0.3),
];
const STROBE_POINTS: [(f64, f64); 8] = [
    (0.9, 0.9),
    (-0.9, 0.9),
    (0.0, -0.5),
    (0.7, 0.0),
    (-0.7, 0.0),
    (0.9, -0.3),
    (-0.9, -0.3),
    (0.0, 0.9),
];

/// The travel limits of one axis.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct Axis {
    pub min: u8,
    pub max: u8,
}

impl Axis {
    pub fn new(min: u8, max: u8) -> Axis {
        Axis { min, max }
    }

    fn range(&self) -> f64 {
        f64::from(self.max) - f64::from(self.min)
    }

    fn center(&self) -> f64 {
        (f64::from(self.max) + f64::from(self.min)) / 2.0
    }

    fn clamp(&self, value: f64) -> f64 {
        if value.is_finite() {
            value.clamp(f64::from(self.min), f64::from(self.max))
        } else {
            self.center()
        }
    }
}

/// Per-fixture movement memory.
#[derive(Clone, Debug, Default)]
pub(crate) struct Motion {
    target_pan: Option<f64>,
    target_tilt: Option<f64>,
    pan: Option<f64>,
    tilt: Option<f64>,
    beats_since_move: u32,
    wall_index: usize,
    sweep_phase: f64,
    sweep_reverse: bool,
    orbit_phase: f64,
    orbit_pulse: f64,
    fan_spread: Option<f64>,
    fan_target: Option<f64>,
    crazy_phases: Option<(f64, f64)>,
}

impl Motion {
    /// The current pan/tilt targets, if any have been set.
    pub fn targets(&self) -> (Option<f64>, Option<f64>) {
        (self.target_pan, self.target_tilt)
    }
}

/// Movement state shared across the rig.
#[derive(Debug, Default)]
pub(crate) struct Choreography {
    chase_index: usize,
}

/// The rig-wide view of one tick.
pub(crate) struct Cue<'a> {
    pub data: &'a AnalysisData,
    pub beat: bool,
    pub bar: bool,
    pub speed: f64,
    pub fixture_count: usize,
    chase_index: usize,
}

impl Choreography {
    /// Advances rig-wide movement state and returns the cue for this tick.
    pub fn cue<'a>(
        &mut self,
        mode: MovementMode,
        data: &'a AnalysisData,
        beat: bool,
        bar: bool,
        speed: f64,
        fixture_count: usize,
    ) -> Cue<'a> {
        if mode == MovementMode::Chase && beat {
            self.chase_index = (self.chase_index + 1) % fixture_count.max(1);
        }
        Cue {
            data,
            beat,
            bar,
            speed: speed.clamp(0.0, 1.0),
            fixture_count,
            chase_index: self.chase_index,
        }
    }
}

/// A fixture with at least one movement axis.
pub(crate) struct Mover<'a> {
    pub position: u32,
    pub pan: Option<Axis>,
    pub tilt: Option<Axis>,
    pub motion: &'a mut Motion,
    pub state: &'a mut FixtureState,
}

impl Mover<'_> {
    /// Aims pan a factor of half its range away from center.
    fn aim_pan(&mut self, factor: f64) {
        if let Some(axis) = self.pan {
            self.motion.target_pan = Some(axis.clamp(axis.center() + factor * axis.range() / 2.0));
        }
    }

    /// Aims tilt a factor of half its range away from center.
    fn aim_tilt(&mut self, factor: f64) {
        if let Some(axis) = self.tilt {
            self.motion.target_tilt =
                Some(axis.clamp(axis.center() + factor * axis.range() / 2.0));
        }
    }

    /// Aims pan at a fraction of its full range above min.
    fn place_pan(&mut self, fraction: f64) {
        if let Some(axis) = self.pan {
            self.motion.target_pan = Some(axis.clamp(f64::from(axis.min) + fraction * axis.range()));
        }
    }

    fn place_tilt(&mut self, fraction: f64) {
        if let Some(axis) = self.tilt {
            self.motion.target_tilt =
                Some(axis.clamp(f64::from(axis.min) + fraction * axis.range()));
        }
    }

    fn position(&self) -> f64 {
        f64::from(self.position)
    }

    /// Eases the actual position toward the targets.
    fn ease(&mut self, mode: MovementMode, speed: f64) {
        let speed_factor = 0.5 + speed * 0.5;
        let (pan_rate, tilt_rate) = mode.interpolation_rates();

        if let Some(axis) = self.pan {
            let target = self.motion.target_pan.unwrap_or(axis.center());
            let current = self.motion.pan.unwrap_or(f64::from(self.state.pan));
            let next = axis.clamp(current + (target - current) * pan_rate * speed_factor);
            self.motion.pan = Some(next);
            (self.state.pan, self.state.pan_fine) = split_fine(next);
        }
        if let Some(axis) = self.tilt {
            let target = self.motion.target_tilt.unwrap_or(axis.center());
            let current = self.motion.tilt.unwrap_or(f64::from(self.state.tilt));
            let next = axis.clamp(current + (target - current) * tilt_rate * speed_factor);
            self.motion.tilt = Some(next);
            (self.state.tilt, self.state.tilt_fine) = split_fine(next);
        }
        self.state.pt_speed = mode.motor_speed(speed);
    }
}

/// Splits a position into coarse and fine channel values.
fn split_fine(position: f64) -> (u8, u8) {
    let coarse = position.floor().clamp(0.0, 255.0);
    let fine = ((position - coarse) * 255.0).clamp(0.0, 255.0);
    (coarse as u8, fine as u8)
}

fn pick(table: &[f64; 8], index: u64) -> f64 {
    table[(index % 8) as usize]
}

/// Moves one fixture for this tick: updates its targets and eases pan/tilt toward them.
pub(crate) fn move_fixture<R: Rng>(mode: MovementMode, cue: &Cue, mut mover: Mover, rng: &mut R) {
    if cue.beat {
        mover.motion.beats_since_move = mover.motion.beats_since_move.saturating_add(1);
    }

    match mode {
        MovementMode::Subtle => subtle(cue, &mut mover),
        MovementMode::Standard => standard(cue, &mut mover),
        MovementMode::Dramatic => dramatic(cue, &mut mover),
        MovementMode::WallWash => wall_wash(cue, &mut mover),
        MovementMode::Sweep => sweep(cue, &mut mover),
        MovementMode::Random => random(cue, &mut mover, rng),
        MovementMode::Circle => circle(cue, &mut mover),
        MovementMode::Figure8 => figure_8(cue, &mut mover),
        MovementMode::Ballyhoo => ballyhoo(cue, &mut mover),
        MovementMode::Fan => fan(cue, &mut mover),
        MovementMode::Chase => chase(cue, &mut mover),
        MovementMode::StrobePosition => strobe_position(cue, &mut mover, rng),
        MovementMode::Crazy => crazy(cue, &mut mover, rng),
    }

    mover.ease(mode, cue.speed);
}

fn subtle(cue: &Cue, mover: &mut Mover) {
    if cue.bar {
        let bar = cue.data.estimated_bar;
        mover.aim_pan(pick(&SUBTLE_PAN, bar) * cue.speed * 0.3);
        mover.aim_tilt(pick(&SUBTLE_TILT, bar) * cue.speed * 0.5);
    }
}

fn standard(cue: &Cue, mover: &mut Mover) {
    let features = &cue.data.features;
    if cue.bar {
        let factor = pick(&STANDARD_PAN, cue.data.estimated_bar);
        mover.aim_pan(factor * cue.speed * (0.5 + features.energy * 0.5));
    }

    let due = features.energy > 0.25 || mover.motion.beats_since_move >= 4;
    if cue.beat && due && mover.tilt.is_some() {
        let factor = pick(&STANDARD_TILT, cue.data.estimated_beat);
        mover.aim_tilt(factor * cue.speed * (0.5 + features.bass * 0.5));
        mover.motion.beats_since_move = 0;
    }
}

fn dramatic(cue: &Cue, mover: &mut Mover) {
    let features = &cue.data.features;
    if cue.bar || (cue.beat && features.energy > 0.5) {
        let index = cue.data.estimated_bar * 4 + cue.data.estimated_beat;
        mover.aim_pan(pick(&DRAMATIC_PAN, index) * cue.speed);
    }

    let due = features.energy > 0.3 || mover.motion.beats_since_move >= 2;
    if cue.beat && due && mover.tilt.is_some() {
        let factor = pick(&DRAMATIC_TILT, cue.data.estimated_beat);
        mover.aim_tilt(factor * cue.speed * (0.7 + features.bass * 0.3));
        mover.motion.beats_since_move = 0;
    }
}

fn wall_wash(cue: &Cue, mover: &mut Mover) {
    if cue.bar {
        let index = (mover.motion.wall_index + 1) % WALLS.len();
        mover.motion.wall_index = index;
        let offset = (mover.position as usize * 2) % WALLS.len();
        let (pan, tilt) = WALLS[(index + offset) % WALLS.len()];
        mover.aim_pan(pan * cue.speed);
        mover.aim_tilt(tilt * cue.speed);
    }

    let bass = cue.data.features.bass;
    if let (true, Some(axis)) = (cue.beat && bass > 0.6, mover.tilt) {
        let current = mover.motion.target_tilt.unwrap_or(axis.center());
        let kick = axis.range() / 2.0 * 0.1 * bass;
        mover.motion.target_tilt = Some((current + kick).min(f64::from(axis.max)));
    }
}

fn sweep(cue: &Cue, mover: &mut Mover) {
    let mut step = STEP * 0.03 * cue.speed;
    if cue.data.features.energy > 0.6 {
        step *= 1.3;
    }

    let motion = &mut *mover.motion;
    let mut phase = motion.sweep_phase + if motion.sweep_reverse { -step } else { step };
    if phase >= 1.0 {
        phase = 1.0;
        motion.sweep_reverse = true;
    } else if phase <= 0.0 {
        phase = 0.0;
        motion.sweep_reverse = false;
    }
    motion.sweep_phase = phase;

    let tilt_phase = (phase + mover.position() * 0.25).rem_euclid(1.0);
    mover.aim_pan((ease_in_out_sine(phase) * 2.0 - 1.0) * 0.85);
    mover.aim_tilt(0.3 + ease_in_out_sine(tilt_phase) * 0.5);
}

fn random<R: Rng>(cue: &Cue, mover: &mut Mover, rng: &mut R) {
    let energy = cue.data.features.energy;
    if cue.beat && rng.gen::<f64>() < 0.4 + energy * 0.4 {
        mover.aim_pan(rng.gen_range(-0.9..=0.9) * cue.speed);
        mover.aim_tilt(rng.gen_range(-0.3..=0.9) * cue.speed);
        mover.motion.beats_since_move = 0;
    }
}

/// Advances the shared orbit phase by the given number of revolutions per second.
fn orbit(mover: &mut Mover, revolutions: f64) -> f64 {
    let phase = (mover.motion.orbit_phase + STEP * revolutions * TAU).rem_euclid(TAU);
    mover.motion.orbit_phase = phase;
    phase
}

fn circle(cue: &Cue, mover: &mut Mover) {
    let features = &cue.data.features;
    let phase = orbit(mover, 0.08 * cue.speed * (0.7 + features.energy * 0.6))
        + mover.position() * PI / 3.0;

    if cue.beat {
        mover.motion.orbit_pulse = 1.0;
    }
    let pulse = (mover.motion.orbit_pulse - STEP * 3.0).max(0.0);
    mover.motion.orbit_pulse = pulse;

    let size = 0.5 * cue.speed + pulse * 0.3 * features.bass;
    mover.aim_pan(phase.cos() * size);
    mover.aim_tilt(phase.sin() * size * 0.7);
}

fn figure_8(cue: &Cue, mover: &mut Mover) {
    let energy = cue.data.features.energy;
    let phase =
        orbit(mover, 0.06 * cue.speed * (0.6 + energy * 0.5)) + mover.position() * PI / 4.0;
    let size = 0.6 * cue.speed * (0.8 + energy * 0.2);
    mover.aim_pan(phase.cos() * size);
    mover.aim_tilt((2.0 * phase).sin() * 0.5 * size + 0.2 * size);
}

fn ballyhoo(cue: &Cue, mover: &mut Mover) {
    let features = &cue.data.features;
    let base = orbit(mover, 0.12 * cue.speed * (0.8 + features.energy * 0.4));
    let phase = base + mover.position() * PI / 2.0;
    let size = 0.85 * cue.speed;
    mover.aim_pan(phase.sin() * size);
    mover.aim_tilt((phase + PI / 4.0).sin() * size * 0.6 + 0.2 * features.energy);

    if cue.beat && features.bass > 0.7 {
        mover.motion.orbit_phase = TAU - base;
    }
}

fn fan(cue: &Cue, mover: &mut Mover) {
    let bass = cue.data.features.bass;
    let mut target = mover.motion.fan_target.unwrap_or(0.5);
    if cue.bar {
        target = if cue.data.estimated_bar % 2 == 0 { 0.9 } else { 0.2 };
        mover.motion.fan_target = Some(target);
    }
    let spread = mover.motion.fan_spread.unwrap_or(0.5);
    let spread = spread + (target - spread) * 0.08 * cue.speed;
    mover.motion.fan_spread = Some(spread);

    let spot = if cue.fixture_count > 1 {
        (mover.position() / (cue.fixture_count - 1) as f64 * 2.0 - 1.0).clamp(-1.0, 1.0)
    } else {
        0.0
    };
    mover.aim_pan(spot * spread * cue.speed * 0.85);

    let pulse = if cue.beat && bass > 0.4 { bass * 0.2 } else { 0.0 };
    mover.aim_tilt((0.3 - spread * 0.4 + pulse) * cue.speed);
}

fn chase(cue: &Cue, mover: &mut Mover) {
    let count = cue.fixture_count.max(1);
    if mover.position as usize % count == cue.chase_index {
        let index = (cue.chase_index + cue.data.estimated_bar as usize) % CHASE_POINTS.len();
        let (pan, tilt) = CHASE_POINTS[index];
        mover.aim_pan(pan * cue.speed);
        mover.aim_tilt(tilt * cue.speed);
    } else {
        let spread = (mover.position() / count.saturating_sub(1).max(1) as f64 - 0.5) * 0.3;
        mover.aim_pan(spread * cue.speed);
        mover.aim_tilt(0.2 * cue.speed);
    }
}

fn strobe_position<R: Rng>(cue: &Cue, mover: &mut Mover, rng: &mut R) {
    if !cue.beat {
        return;
    }
    let index = cue.data.estimated_beat + u64::from(mover.position) * 3 + cue.data.estimated_bar;
    let (mut pan, mut tilt) = STROBE_POINTS[(index % 8) as usize];
    if cue.data.features.energy > 0.6 {
        pan += rng.gen_range(-0.2..=0.2);
        tilt += rng.gen_range(-0.1..=0.2);
    }
    mover.aim_pan(pan.clamp(-1.0, 1.0) * cue.speed);
    mover.aim_tilt(tilt.clamp(-1.0, 1.0) * cue.speed);
    mover.motion.beats_since_move = 0;
}

fn crazy<R: Rng>(cue: &Cue, mover: &mut Mover, rng: &mut R) {
    let features = &cue.data.features;
    let boost = cue.speed * (0.5 + features.energy * 1.5);
    let (mut pan, mut tilt) = match mover.motion.crazy_phases {
        Some(phases) => phases,
        None => (rng.gen_range(0.0..TAU), rng.gen_range(0.0..TAU)),
    };
    pan += STEP * 0.18 * boost * TAU;
    tilt += STEP * 0.23 * boost * TAU;

    if cue.beat {
        let roll = rng.gen::<f64>();
        if features.bass > 0.7 && roll < 0.4 {
            pan = TAU - pan;
        }
        if features.energy > 0.6 && roll < 0.5 {
            pan += rng.gen_range(0.5..1.5);
            tilt += rng.gen_range(0.3..1.0);
        }
        if roll < 0.25 {
            pan = rng.gen_range(0.0..TAU);
            tilt = rng.gen_range(0.0..TAU);
        }
    }
    if cue.bar && rng.gen::<f64>() < 0.3 {
        tilt = TAU - tilt;
    }
    let (pan, tilt) = (pan.rem_euclid(TAU), tilt.rem_euclid(TAU));
    mover.motion.crazy_phases = Some((pan, tilt));
    mover.motion.beats_since_move = 0;

    let offset = mover.position() * PI * 0.7;
    let pan_wave = ((pan + offset).sin() + (pan * 2.7 + offset).sin() * 0.3) / 1.3;
    let tilt_wave = ((tilt + offset * 0.5).sin() + (tilt * 1.9).cos() * 0.4) / 1.4;
    mover.place_pan((pan_wave + 1.0) / 2.0);
    mover.place_tilt((tilt_wave + 1.0) / 2.0);
}

#[cfg(test)]
mod test {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    struct Head {
        motion: Motion,
        state: FixtureState,
        position: u32,
    }

    fn run(
        mode: MovementMode,
        heads: &mut [Head],
        data: &AnalysisData,
        beat: bool,
        bar: bool,
        speed: f64,
        rng: &mut StdRng,
    ) {
        let mut choreography = Choreography::default();
        run_with(&mut choreography, mode, heads, data, beat, bar, speed, rng);
    }

    #[allow(clippy::too_many_arguments)]
    fn run_with(
        choreography: &mut Choreography,
        mode: MovementMode,
        heads: &mut [Head],
        data: &AnalysisData,
        beat: bool,
        bar: bool,
        speed: f64,
        rng: &mut StdRng,
    ) {
        let cue = choreography.cue(mode, data, beat, bar, speed, heads.len());
        for head in heads.iter_mut() {
            let mover = Mover {
                position: head.position,
                pan: Some(Axis::new(40, 200)),
                tilt: Some(Axis::new(10, 120)),
                motion: &mut head.motion,
                state: &mut head.state,
            };
            move_fixture(mode, &cue, mover, rng);
        }
    }

    fn heads(count: u32) -> Vec<Head> {
        (0..count)
            .map(|position| Head {
                motion: Motion::default(),
                state: FixtureState::default(),
                position,
            })
            .collect()
    }

    #[test]
    fn test_mode_names_match_config() {
        for mode in MovementMode::ALL {
            let yaml = serde_yml::to_string(&mode).unwrap();
            assert_eq!(mode.to_string(), yaml.trim());
        }
    }

    #[test]
    fn test_every_mode_stays_within_limits() {
        let mut rng = StdRng::seed_from_u64(5);
        for mode in MovementMode::ALL {
            let mut rig = heads(4);
            let mut choreography = Choreography::default();
            for i in 0..3000u64 {
                let mut data = AnalysisData::default();
                data.features.energy = rng.gen();
                data.features.bass = rng.gen();
                data.estimated_beat = i / 20;
                data.estimated_bar = i / 80;
                let beat = i % 20 == 0;
                let bar = i % 80 == 0;
                let speed = (i % 11) as f64 / 10.0;
                run_with(&mut choreography, mode, &mut rig, &data, beat, bar, speed, &mut rng);
                for head in &rig {
                    assert!(
                        (40..=200).contains(&head.state.pan),
                        "{} pan {}",
                        mode,
                        head.state.pan
                    );
                    assert!(
                        (10..=120).contains(&head.state.tilt),
                        "{} tilt {}",
                        mode,
                        head.state.tilt
                    );
                    let (pan, tilt) = head.motion.targets();
                    assert!(pan.map_or(true, |p| (40.0..=200.0).contains(&p)), "{}", mode);
                    assert!(tilt.map_or(true, |t| (10.0..=120.0).contains(&t)), "{}", mode);
                }
            }
        }
    }

    #[test]
    fn test_subtle_moves_on_bars_only() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut rig = heads(1);
        let data = AnalysisData {
            estimated_bar: 1,
            ..Default::default()
        };
        run(MovementMode::Subtle, &mut rig, &data, true, false, 1.0, &mut rng);
        assert_eq!((None, None), rig[0].motion.targets());

        run(MovementMode::Subtle, &mut rig, &data, false, true, 1.0, &mut rng);
        // Center 120 plus 0.1 of half the 160 range, scaled by 0.3.
        let (pan, tilt) = rig[0].motion.targets();
        assert!((pan.unwrap() - 122.4).abs() < 1e-9);
        assert!((tilt.unwrap() - (65.0 + 0.3 * 55.0 * 0.5)).abs() < 1e-9);
    }

    #[test]
    fn test_position_eases_toward_target() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut rig = heads(1);
        let data = AnalysisData::default();
        run(MovementMode::Subtle, &mut rig, &data, false, true, 1.0, &mut rng);
        let mut previous = 128.0;
        for _ in 0..500 {
            run(MovementMode::Subtle, &mut rig, &data, false, false, 1.0, &mut rng);
            let pan = f64::from(rig[0].state.pan);
            assert!(pan <= previous);
            previous = pan;
        }
        // Bar 0 is the center of both tables' pan column.
        assert_eq!(120, rig[0].state.pan);
    }

    #[test]
    fn test_motor_speed() {
        assert_eq!(30, MovementMode::Sweep.motor_speed(0.5));
        assert_eq!(5, MovementMode::Crazy.motor_speed(0.5));
        assert_eq!(20, MovementMode::Circle.motor_speed(0.0));
        assert_eq!(15, MovementMode::Standard.motor_speed(0.5));
        assert_eq!(0, MovementMode::Standard.motor_speed(1.0));
    }

    #[test]
    fn test_standard_tilt_waits_for_energy_or_four_beats() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut rig = heads(1);
        let mut data = AnalysisData::default();
        for beat in 1..=3 {
            data.estimated_beat = beat;
            run(MovementMode::Standard, &mut rig, &data, true, false, 1.0, &mut rng);
            assert_eq!(None, rig[0].motion.targets().1);
        }
        data.estimated_beat = 4;
        run(MovementMode::Standard, &mut rig, &data, true, false, 1.0, &mut rng);
        assert!(rig[0].motion.targets().1.is_some());
    }

    #[test]
    fn test_wall_wash_kick_capped() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut rig = heads(1);
        let mut data = AnalysisData::default();
        data.features.bass = 1.0;
        for _ in 0..50 {
            run(MovementMode::WallWash, &mut rig, &data, true, false, 1.0, &mut rng);
        }
        assert_eq!(Some(120.0), rig[0].motion.targets().1);
    }

    #[test]
    fn test_chase_advances_once_per_beat() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut choreography = Choreography::default();
        let mut rig = heads(4);
        let data = AnalysisData::default();
        run_with(
            &mut choreography,
            MovementMode::Chase,
            &mut rig,
            &data,
            true,
            false,
            1.0,
            &mut rng,
        );
        assert_eq!(1, choreography.chase_index);
        // The active head is pointed at the first accent, the rest sit low.
        let active = rig[1].motion.targets();
        let idle = rig[0].motion.targets();
        assert!((active.1.unwrap() - 109.0).abs() < 1e-9);
        assert!((idle.1.unwrap() - 76.0).abs() < 1e-9);
    }

    #[test]
    fn test_fan_alternates_on_bars() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut rig = heads(3);
        let mut data = AnalysisData::default();
        run(MovementMode::Fan, &mut rig, &data, false, true, 1.0, &mut rng);
        for _ in 0..200 {
            run(MovementMode::Fan, &mut rig, &data, false, false, 1.0, &mut rng);
        }
        let wide = rig[2].motion.targets().0.unwrap() - rig[0].motion.targets().0.unwrap();

        data.estimated_bar = 1;
        run(MovementMode::Fan, &mut rig, &data, false, true, 1.0, &mut rng);
        for _ in 0..200 {
            run(MovementMode::Fan, &mut rig, &data, false, false, 1.0, &mut rng);
        }
        let narrow = rig[2].motion.targets().0.unwrap() - rig[0].motion.targets().0.unwrap();
        assert!(wide > narrow * 3.0, "{} vs {}", wide, narrow);
    }

    #[test]
    fn test_pan_only_fixture() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut motion = Motion::default();
        let mut state = FixtureState::default();
        let data = AnalysisData::default();
        let cue = Choreography::default().cue(MovementMode::Circle, &data, false, false, 1.0, 1);
        move_fixture(
            MovementMode::Circle,
            &cue,
            Mover {
                position: 0,
                pan: Some(Axis::new(0, 255)),
                tilt: None,
                motion: &mut motion,
                state: &mut state,
            },
            &mut rng,
        );
        assert!(motion.targets().0.is_some());
        assert_eq!(None, motion.targets().1);
        assert_eq!(128, state.tilt);
    }
}
