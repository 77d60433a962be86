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

use rand::seq::{index, SliceRandom};
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::color::{ease_out_cubic, hue_delta, lerp_hue, to_channel, wrap_hue};
use super::state::FixtureState;
use crate::audio::AnalysisData;
use crate::config::Effects;

/// How analysis is mapped onto color and brightness.
#[derive(Deserialize, Clone, Copy, Serialize, Debug, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum VisualizationMode {
    /// Energy drives brightness, mids drift the hue, beats pulse.
    #[default]
    Energy,
    /// Fixtures split into bass, mid and high thirds.
    FrequencySplit,
    /// Flash on beats, change color on bars.
    BeatPulse,
    /// Tempo-synced trip around the color wheel.
    ColorCycle,
    /// A rainbow rolling across the rig.
    RainbowWave,
    /// White strobe hit on every beat.
    StrobeBeat,
    /// A random third of the rig flashes on every beat.
    RandomFlash,
}

impl VisualizationMode {
    pub const ALL: [VisualizationMode; 7] = [
        VisualizationMode::Energy,
        VisualizationMode::FrequencySplit,
        VisualizationMode::BeatPulse,
        VisualizationMode::ColorCycle,
        VisualizationMode::RainbowWave,
        VisualizationMode::StrobeBeat,
        VisualizationMode::RandomFlash,
    ];
}

impl fmt::Display for VisualizationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VisualizationMode::Energy => "energy",
            VisualizationMode::FrequencySplit => "frequency_split",
            VisualizationMode::BeatPulse => "beat_pulse",
            VisualizationMode::ColorCycle => "color_cycle",
            VisualizationMode::RainbowWave => "rainbow_wave",
            VisualizationMode::StrobeBeat => "strobe_beat",
            VisualizationMode::RandomFlash => "random_flash",
        };
        write!(f, "{}", name)
    }
}

const DEFAULT_BEAT_HUES: [f64; 5] = [0.0, 0.15, 0.55, 0.75, 0.9];
const CYCLE_BEATS: u64 = 32;
const DROP_STROBE: u8 = 180;
const BEAT_STROBE: u8 = 200;

/// Everything a visualization needs to know about the current tick.
pub(crate) struct Tick<'a> {
    pub data: &'a AnalysisData,
    pub effects: &'a Effects,
    pub beat: bool,
    pub bar: bool,
    /// Seconds since the engine started.
    pub elapsed: f64,
    /// True while the auto-strobe window after a drop is open.
    pub drop_active: bool,
    /// Hues of the analysis palette, in order.
    pub palette_hues: &'a [f64],
}

/// A fixture as seen by a visualization. Targets are passed sorted by rig position.
pub(crate) struct Target<'a> {
    pub position: u32,
    /// Fixture intensity scale times the global intensity.
    pub scale: f64,
    pub state: &'a mut FixtureState,
}

/// Color state that carries across ticks.
#[derive(Debug, Default)]
pub(crate) struct ColorMemory {
    current_hue: f64,
    pulse: f64,
    palette_index: usize,
}

impl ColorMemory {
    pub fn current_hue(&self) -> f64 {
        self.current_hue
    }
}

fn paint(state: &mut FixtureState, hue: f64, saturation: f64, brightness: f64) {
    state.set_from_hsv(hue, saturation, brightness);
    state.set_brightness(brightness);
}

/// Runs the visualization for one tick.
pub(crate) fn render<R: Rng>(
    mode: VisualizationMode,
    tick: &Tick,
    memory: &mut ColorMemory,
    targets: &mut [Target],
    rng: &mut R,
) {
    match mode {
        VisualizationMode::Energy => energy(tick, memory, targets),
        VisualizationMode::FrequencySplit => frequency_split(tick, targets),
        VisualizationMode::BeatPulse => beat_pulse(tick, targets),
        VisualizationMode::ColorCycle => color_cycle(tick, targets),
        VisualizationMode::RainbowWave => rainbow_wave(tick, targets),
        VisualizationMode::StrobeBeat => strobe_beat(tick, targets),
        VisualizationMode::RandomFlash => random_flash(tick, targets, rng),
    }
}

fn energy(tick: &Tick, memory: &mut ColorMemory, targets: &mut [Target]) {
    let features = &tick.data.features;

    let target_hue = if tick.palette_hues.is_empty() {
        let drift = tick.elapsed * 0.03 * tick.effects.color_speed;
        let shift = if tick.bar { 0.25 } else { 0.0 };
        wrap_hue(drift + features.mid * 0.2 + shift)
    } else {
        if tick.bar {
            memory.palette_index += 1;
        }
        memory.palette_index %= tick.palette_hues.len();
        wrap_hue(tick.palette_hues[memory.palette_index] + features.mid * 0.08)
    };
    memory.current_hue = wrap_hue(memory.current_hue + hue_delta(memory.current_hue, target_hue) * 0.1);

    if tick.beat {
        memory.pulse = 0.3 + features.bass * 0.4;
    } else {
        memory.pulse *= 1.0 - ease_out_cubic(tick.data.beat_position);
    }

    let brightness = (0.3 + features.energy * 0.5 + memory.pulse).min(1.0);
    let saturation = 0.6 + features.energy * 0.4;
    let strobe = if tick.drop_active && tick.effects.strobe_on_drop {
        DROP_STROBE
    } else {
        0
    };

    for target in targets {
        paint(target.state, memory.current_hue, saturation, brightness * target.scale);
        target.state.strobe = strobe;
    }
}

fn frequency_split(tick: &Tick, targets: &mut [Target]) {
    let features = &tick.data.features;
    let third = (targets.len() / 3).max(1);

    for (i, target) in targets.iter_mut().enumerate() {
        let (band, hue) = if i < third {
            (features.bass, features.bass * 0.1)
        } else if i < third * 2 {
            (features.mid, 0.25 + features.mid * 0.15)
        } else {
            (features.high, 0.6 + features.high * 0.15)
        };
        let mut intensity = (0.3 + band * 0.7) * target.scale;
        if tick.beat {
            intensity = (intensity + 0.2).min(1.0);
        }
        paint(target.state, hue, 0.9, intensity);
    }
}

fn beat_pulse(tick: &Tick, targets: &mut [Target]) {
    let bar = tick.data.estimated_bar as usize;
    let base_hue = if tick.palette_hues.is_empty() {
        DEFAULT_BEAT_HUES[bar % DEFAULT_BEAT_HUES.len()]
    } else {
        tick.palette_hues[bar % tick.palette_hues.len()]
    };
    let decay = 1.0 - ease_out_cubic(tick.data.beat_position);

    for target in targets {
        let (hue, brightness) = if tick.beat {
            (base_hue + f64::from(target.position) * 0.05, target.scale)
        } else {
            (base_hue, target.scale * decay * 0.8)
        };
        paint(target.state, hue, 0.85, brightness);
    }
}

fn color_cycle(tick: &Tick, targets: &mut [Target]) {
    let data = tick.data;
    let base_hue = if tick.palette_hues.is_empty() {
        ((data.estimated_beat % CYCLE_BEATS) as f64 + data.beat_position) / CYCLE_BEATS as f64
    } else {
        let hues = tick.palette_hues;
        let current = data.estimated_bar as usize % hues.len();
        lerp_hue(hues[current], hues[(current + 1) % hues.len()], data.beat_position)
    };

    let pulse = if tick.beat {
        0.2
    } else {
        0.2 * (1.0 - data.beat_position)
    };
    let base_brightness = 0.4 + data.features.energy * 0.4 + pulse;
    let count = targets.len().max(1) as f64;

    for target in targets {
        let hue = base_hue + f64::from(target.position) / count * 0.3;
        paint(target.state, hue, 0.9, base_brightness * target.scale);
    }
}

fn rainbow_wave(tick: &Tick, targets: &mut [Target]) {
    let wave = (tick.elapsed * 0.5 * tick.effects.color_speed).rem_euclid(1.0);
    let base_brightness = 0.3 + tick.data.features.energy * 0.5;
    let count = targets.len().max(1) as f64;

    for (i, target) in targets.iter_mut().enumerate() {
        let phase = wave + i as f64 / count;
        let mut brightness =
            base_brightness * (0.5 + 0.5 * (phase * 2.0 * PI).sin()) * target.scale;
        if tick.beat {
            brightness = (brightness + 0.15).min(1.0);
        }
        target.state.set_from_hsv(phase, 0.85, brightness.max(0.1));
        target.state.set_brightness(brightness);
    }
}

fn strobe_beat(tick: &Tick, targets: &mut [Target]) {
    let beat_position = tick.data.beat_position;
    let decay = (1.0 - beat_position * 3.0).max(0.0);

    for target in targets {
        if tick.beat {
            target.state.set_rgb(u8::MAX, u8::MAX, u8::MAX);
            target.state.set_brightness(target.scale);
            target.state.strobe = BEAT_STROBE;
        } else {
            let level = to_channel(decay * target.scale);
            target.state.set_rgb(level, level, level);
            target.state.dimmer = level;
            target.state.strobe = if beat_position < 0.3 { BEAT_STROBE } else { 0 };
        }
    }
}

fn random_flash<R: Rng>(tick: &Tick, targets: &mut [Target], rng: &mut R) {
    let count = targets.len();
    let mut flashing = vec![false; count];
    let mut hue = 0.0;
    if tick.beat && count > 0 {
        for i in index::sample(rng, count, (count / 3).max(1)) {
            flashing[i] = true;
        }
        hue = match tick.palette_hues.choose(rng) {
            Some(hue) => *hue,
            None => rng.gen(),
        };
    }

    let decay = (1.0 - tick.data.beat_position * 2.5).max(0.0);
    for (target, flash) in targets.iter_mut().zip(flashing) {
        if flash {
            paint(target.state, hue, 1.0, target.scale);
        } else {
            target.state.fade(decay);
        }
    }
}

#[cfg(test)]
mod test {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    struct Rig {
        states: Vec<FixtureState>,
        memory: ColorMemory,
        rng: StdRng,
    }

    impl Rig {
        fn new(count: usize) -> Rig {
            Rig {
                states: vec![FixtureState::default(); count],
                memory: ColorMemory::default(),
                rng: StdRng::seed_from_u64(11),
            }
        }

        fn render(&mut self, mode: VisualizationMode, tick: &Tick, scale: f64) {
            let mut targets: Vec<Target> = self
                .states
                .iter_mut()
                .enumerate()
                .map(|(i, state)| Target {
                    position: i as u32,
                    scale,
                    state,
                })
                .collect();
            render(mode, tick, &mut self.memory, &mut targets, &mut self.rng);
        }
    }

    fn tick<'a>(data: &'a AnalysisData, effects: &'a Effects, beat: bool) -> Tick<'a> {
        Tick {
            data,
            effects,
            beat,
            bar: false,
            elapsed: 0.0,
            drop_active: false,
            palette_hues: &[],
        }
    }

    #[test]
    fn test_mode_names_match_config() {
        for mode in VisualizationMode::ALL {
            let yaml = serde_yml::to_string(&mode).unwrap();
            assert_eq!(mode.to_string(), yaml.trim());
        }
    }

    #[test]
    fn test_strobe_beat_flash_and_decay() {
        let effects = Effects::default();
        let mut rig = Rig::new(1);
        let data = AnalysisData::default();
        rig.render(VisualizationMode::StrobeBeat, &tick(&data, &effects, true), 0.8);
        assert_eq!((255, 255, 255), rig.states[0].rgb());
        assert_eq!(204, rig.states[0].dimmer);
        assert_eq!(200, rig.states[0].strobe);

        let data = AnalysisData {
            beat_position: 0.2,
            ..Default::default()
        };
        rig.render(VisualizationMode::StrobeBeat, &tick(&data, &effects, false), 1.0);
        assert_eq!(102, rig.states[0].red);
        assert_eq!(200, rig.states[0].strobe);

        let data = AnalysisData {
            beat_position: 0.6,
            ..Default::default()
        };
        rig.render(VisualizationMode::StrobeBeat, &tick(&data, &effects, false), 1.0);
        assert!(rig.states[0].is_dark());
    }

    #[test]
    fn test_frequency_split_thirds() {
        let effects = Effects::default();
        let mut data = AnalysisData::default();
        data.features.bass = 1.0;
        let mut rig = Rig::new(6);
        rig.render(VisualizationMode::FrequencySplit, &tick(&data, &effects, false), 1.0);

        // Bass fixtures are at full, red-orange.
        assert_eq!(255, rig.states[0].dimmer);
        assert_eq!(255, rig.states[1].dimmer);
        assert!(rig.states[0].red > rig.states[0].blue);
        // Mid and high fixtures sit at the 0.3 floor.
        for state in &rig.states[2..] {
            assert_eq!(76, state.dimmer);
        }
    }

    #[test]
    fn test_frequency_split_single_fixture() {
        let effects = Effects::default();
        let mut data = AnalysisData::default();
        data.features.bass = 0.5;
        let mut rig = Rig::new(1);
        rig.render(VisualizationMode::FrequencySplit, &tick(&data, &effects, false), 1.0);
        assert_eq!(165, rig.states[0].dimmer);
    }

    #[test]
    fn test_beat_pulse_uses_palette_by_bar() {
        let effects = Effects::default();
        let data = AnalysisData {
            estimated_bar: 1,
            ..Default::default()
        };
        let hues = [0.0, 2.0 / 3.0];
        let tick = Tick {
            palette_hues: &hues,
            ..tick(&data, &effects, false)
        };
        let mut rig = Rig::new(1);
        rig.render(VisualizationMode::BeatPulse, &tick, 1.0);
        let state = rig.states[0];
        assert!(state.blue > state.red && state.blue > state.green);
        assert_eq!(204, state.dimmer);
    }

    #[test]
    fn test_energy_hue_eases_toward_target() {
        let effects = Effects::default();
        let data = AnalysisData::default();
        let hues = [0.5];
        let tick = Tick {
            palette_hues: &hues,
            ..tick(&data, &effects, false)
        };
        let mut rig = Rig::new(1);
        rig.render(VisualizationMode::Energy, &tick, 1.0);
        assert!((rig.memory.current_hue() - 0.05).abs() < 1e-9);
        for _ in 0..200 {
            rig.render(VisualizationMode::Energy, &tick, 1.0);
        }
        assert!((rig.memory.current_hue() - 0.5).abs() < 1e-3);
    }

    #[test]
    fn test_energy_pulse_decays() {
        let effects = Effects::default();
        let mut data = AnalysisData::default();
        data.features.bass = 1.0;
        let mut rig = Rig::new(1);
        rig.render(VisualizationMode::Energy, &tick(&data, &effects, true), 1.0);
        // 0.3 base plus a 0.7 pulse.
        assert_eq!(255, rig.states[0].dimmer);

        data.beat_position = 1.0;
        rig.render(VisualizationMode::Energy, &tick(&data, &effects, false), 1.0);
        assert_eq!(76, rig.states[0].dimmer);
    }

    #[test]
    fn test_energy_drop_strobe_needs_flag() {
        let data = AnalysisData::default();
        let mut rig = Rig::new(1);
        let effects = Effects::default();
        let tick_off = Tick {
            drop_active: true,
            ..tick(&data, &effects, false)
        };
        rig.render(VisualizationMode::Energy, &tick_off, 1.0);
        assert_eq!(0, rig.states[0].strobe);

        let effects = Effects {
            strobe_on_drop: true,
            ..Default::default()
        };
        let tick_on = Tick {
            drop_active: true,
            ..tick(&data, &effects, false)
        };
        rig.render(VisualizationMode::Energy, &tick_on, 1.0);
        assert_eq!(DROP_STROBE, rig.states[0].strobe);
    }

    #[test]
    fn test_random_flash_picks_a_third() {
        let effects = Effects::default();
        let data = AnalysisData::default();
        let mut rig = Rig::new(9);
        for state in &mut rig.states {
            state.blackout();
        }
        rig.render(VisualizationMode::RandomFlash, &tick(&data, &effects, true), 1.0);
        let lit = rig.states.iter().filter(|s| !s.is_dark()).count();
        assert_eq!(3, lit);

        let data = AnalysisData {
            beat_position: 0.5,
            ..Default::default()
        };
        rig.render(VisualizationMode::RandomFlash, &tick(&data, &effects, false), 1.0);
        assert!(rig.states.iter().all(|s| s.is_dark()));
    }

    #[test]
    fn test_rainbow_wave_spreads_hues() {
        let effects = Effects::default();
        let mut data = AnalysisData::default();
        data.features.energy = 1.0;
        let mut rig = Rig::new(3);
        rig.render(VisualizationMode::RainbowWave, &tick(&data, &effects, false), 1.0);
        assert_ne!(rig.states[0].rgb(), rig.states[1].rgb());
        assert_ne!(rig.states[1].rgb(), rig.states[2].rgb());
    }

    #[test]
    fn test_color_cycle_full_turn_every_eight_bars() {
        let effects = Effects::default();
        let mut rig = Rig::new(1);
        let data = AnalysisData {
            estimated_beat: 0,
            ..Default::default()
        };
        rig.render(VisualizationMode::ColorCycle, &tick(&data, &effects, false), 1.0);
        let first = rig.states[0].rgb();
        let data = AnalysisData {
            estimated_beat: 32,
            ..Default::default()
        };
        rig.render(VisualizationMode::ColorCycle, &tick(&data, &effects, false), 1.0);
        assert_eq!(first, rig.states[0].rgb());
    }

    #[test]
    fn test_empty_rig() {
        let effects = Effects::default();
        let data = AnalysisData::default();
        let mut rig = Rig::new(0);
        for mode in VisualizationMode::ALL {
            rig.render(mode, &tick(&data, &effects, true), 1.0);
        }
    }
}
