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
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info};

use super::movement::{move_fixture, Axis, Choreography, Motion, Mover};
use super::resolve::write_fixture;
use super::state::FixtureState;
use super::visualization::{render, ColorMemory, Target, Tick};
use crate::audio::features::DEFAULT_TEMPO;
use crate::audio::{AnalysisData, Rgb};
use crate::config::{ChannelDef, ConfigError, Effects, Fixture, Show};
use crate::dmx::SharedUniverse;

/// About one second of history at 40 ticks per second.
const ENERGY_HISTORY: usize = 40;
const ENERGY_WINDOW: usize = 10;
const DROP_RISE: f64 = 0.3;
const DROP_MIN_ENERGY: f64 = 0.6;
const BUILDUP_RISE: f64 = 0.1;
const DROP_STROBE_WINDOW: f64 = 0.5;
const DROP_REARM: f64 = 2.0;
const DROP_STROBE: u8 = 200;

/// A stable handle to a fixture inside the engine. Handles are never reused, even after the
/// fixture is removed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FixtureId(usize);

struct FixtureRecord {
    fixture: Fixture,
    channels: Vec<ChannelDef>,
    pan: Option<Axis>,
    tilt: Option<Axis>,
    live: FixtureState,
    smoothed: FixtureState,
    motion: Motion,
}

impl FixtureRecord {
    fn new(fixture: Fixture, channels: Vec<ChannelDef>) -> FixtureRecord {
        let mut record = FixtureRecord {
            fixture,
            channels,
            pan: None,
            tilt: None,
            live: FixtureState::default(),
            smoothed: FixtureState::default(),
            motion: Motion::default(),
        };
        record.repatch();
        record
    }

    /// Recomputes which axes the fixture can move on from its channels and limits.
    fn repatch(&mut self) {
        let fixture = &self.fixture;
        self.pan = self
            .channels
            .iter()
            .any(|c| c.function.is_pan())
            .then(|| Axis::new(fixture.pan_min(), fixture.pan_max()));
        self.tilt = self
            .channels
            .iter()
            .any(|c| c.function.is_tilt())
            .then(|| Axis::new(fixture.tilt_min(), fixture.tilt_max()));
    }
}

/// Rolling energy history used to spot drops and buildups.
#[derive(Debug, Default)]
struct DropDetector {
    history: VecDeque<f64>,
    strobe_until: Option<f64>,
    last_drop: Option<f64>,
    buildup: bool,
}

impl DropDetector {
    fn window_average(&self, skip_newest: usize) -> f64 {
        self.history
            .iter()
            .rev()
            .skip(skip_newest)
            .take(ENERGY_WINDOW)
            .sum::<f64>()
            / ENERGY_WINDOW as f64
    }

    /// Records a sample. Returns true if a drop fired on this sample.
    fn push(&mut self, energy: f64, now: f64) -> bool {
        self.history.push_back(energy);
        while self.history.len() > ENERGY_HISTORY {
            self.history.pop_front();
        }
        if self.history.len() < ENERGY_WINDOW * 2 {
            self.buildup = false;
            return false;
        }

        let rise = self.window_average(0) - self.window_average(ENERGY_WINDOW);
        self.buildup = rise > BUILDUP_RISE;

        let armed = self.last_drop.map_or(true, |last| now - last >= DROP_REARM);
        if armed && rise > DROP_RISE && energy > DROP_MIN_ENERGY {
            self.last_drop = Some(now);
            self.strobe_until = Some(now + DROP_STROBE_WINDOW);
            return true;
        }
        false
    }

    fn strobe_active(&self, now: f64) -> bool {
        self.strobe_until.is_some_and(|until| now < until)
    }
}

/// Turns analysis snapshots into fixture states and writes them into the universe.
pub struct EffectsEngine {
    effects: Effects,
    records: Vec<Option<FixtureRecord>>,
    ids: HashMap<String, FixtureId>,
    universe: SharedUniverse,
    colors: ColorMemory,
    choreography: Choreography,
    drops: DropDetector,
    last_beat: u64,
    last_bar: u64,
    last_tempo: f64,
    /// Time of the most recent tick, in seconds since start.
    last_tick: f64,
    blackout: bool,
    started: Instant,
    rng: StdRng,
}

impl EffectsEngine {
    /// Creates an engine for the show, writing into the given universe.
    pub fn new(show: &Show, universe: SharedUniverse) -> Result<EffectsEngine, ConfigError> {
        let mut engine = EffectsEngine {
            effects: show.effects().clone(),
            records: Vec::new(),
            ids: HashMap::new(),
            universe,
            colors: ColorMemory::default(),
            choreography: Choreography::default(),
            drops: DropDetector::default(),
            last_beat: 0,
            last_bar: 0,
            last_tempo: DEFAULT_TEMPO,
            last_tick: 0.0,
            blackout: false,
            started: Instant::now(),
            rng: StdRng::from_entropy(),
        };
        engine.update_config(show)?;
        Ok(engine)
    }

    /// Makes the random modes reproducible.
    pub fn reseed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    /// Applies a new show configuration. The show is validated first; on error nothing changes.
    /// Fixtures that still exist keep their state, new ones start from defaults, and removed
    /// ones have their channels zeroed.
    pub fn update_config(&mut self, show: &Show) -> Result<(), ConfigError> {
        show.validate()?;
        let catalog = show.profile_catalog();
        let mut patch = Vec::with_capacity(show.fixtures().len());
        for fixture in show.fixtures() {
            patch.push((fixture.clone(), Show::resolve_channels(fixture, &catalog)?));
        }

        let keep: Vec<&str> = show.fixtures().iter().map(Fixture::name).collect();
        let removed: Vec<String> = self
            .ids
            .keys()
            .filter(|name| !keep.contains(&name.as_str()))
            .cloned()
            .collect();
        for name in &removed {
            if let Some(record) = self.ids.remove(name).and_then(|id| self.records[id.0].take()) {
                let mut universe = self.universe.lock();
                for channel in &record.channels {
                    let address = record
                        .fixture
                        .start_channel()
                        .checked_add(channel.offset)
                        .and_then(|end| end.checked_sub(1));
                    if let Some(address) = address {
                        universe.set_channel(address, 0);
                    }
                }
            }
        }

        let mut added = 0;
        for (fixture, channels) in patch {
            match self.ids.get(fixture.name()).copied() {
                Some(id) => {
                    if let Some(record) = self.records[id.0].as_mut() {
                        record.fixture = fixture;
                        record.channels = channels;
                        record.repatch();
                    }
                }
                None => {
                    let id = FixtureId(self.records.len());
                    self.ids.insert(fixture.name().to_string(), id);
                    self.records.push(Some(FixtureRecord::new(fixture, channels)));
                    added += 1;
                }
            }
        }

        self.effects = show.effects().clone();
        info!(
            fixtures = self.ids.len(),
            added,
            removed = removed.len(),
            "Applied show configuration"
        );
        Ok(())
    }

    /// Replaces the effect settings. Invalid settings are rejected and the old ones kept.
    pub fn set_effects(&mut self, effects: Effects) -> Result<(), ConfigError> {
        effects.validate()?;
        debug!(
            mode = %effects.mode,
            movement = %effects.movement_mode,
            "Effects updated"
        );
        self.effects = effects;
        Ok(())
    }

    pub fn effects(&self) -> &Effects {
        &self.effects
    }

    pub fn universe(&self) -> SharedUniverse {
        self.universe.clone()
    }

    /// Looks up the handle of a fixture by name.
    pub fn fixture_id(&self, name: &str) -> Option<FixtureId> {
        self.ids.get(name).copied()
    }

    /// The smoothed (output) state of a fixture.
    pub fn fixture_state(&self, id: FixtureId) -> Option<&FixtureState> {
        self.records
            .get(id.0)
            .and_then(Option::as_ref)
            .map(|record| &record.smoothed)
    }

    /// The smoothed state of every fixture, keyed by name.
    pub fn fixture_states(&self) -> HashMap<String, FixtureState> {
        self.records
            .iter()
            .flatten()
            .map(|record| (record.fixture.name().to_string(), record.smoothed))
            .collect()
    }

    pub fn fixture_count(&self) -> usize {
        self.ids.len()
    }

    pub fn is_blackout(&self) -> bool {
        self.blackout
    }

    /// True while the automatic strobe window after a drop is open.
    pub fn drop_active(&self) -> bool {
        self.drops.strobe_active(self.last_tick)
    }

    /// True while the energy trend is rising.
    pub fn buildup(&self) -> bool {
        self.drops.buildup
    }

    /// Darkens every fixture immediately and holds it dark until [EffectsEngine::unblackout].
    /// Pan and tilt stay where they are.
    pub fn blackout(&mut self) {
        info!("Blackout on");
        self.blackout = true;
        for record in self.records.iter_mut().flatten() {
            record.live.blackout();
            record.smoothed.blackout();
        }
        self.write_universe();
    }

    /// Resumes normal processing. Fixtures fade back up through smoothing.
    pub fn unblackout(&mut self) {
        info!("Blackout off");
        self.blackout = false;
    }

    /// Processes one analysis snapshot, timed from engine creation.
    pub fn process(&mut self, data: &AnalysisData) -> HashMap<String, FixtureState> {
        let elapsed = self.started.elapsed();
        self.process_at(data, elapsed)
    }

    /// Processes one analysis snapshot at the given time since the engine started, writes the
    /// result into the universe and returns the smoothed fixture states.
    pub fn process_at(
        &mut self,
        data: &AnalysisData,
        elapsed: Duration,
    ) -> HashMap<String, FixtureState> {
        if self.blackout {
            self.write_universe();
            return self.fixture_states();
        }

        let now = elapsed.as_secs_f64();
        self.last_tick = now;
        let data = self.sanitize(data);

        let beat = data.estimated_beat != self.last_beat;
        let bar = data.estimated_bar != self.last_bar;
        self.last_beat = data.estimated_beat;
        self.last_bar = data.estimated_bar;

        if self.drops.push(data.features.energy, now) {
            debug!(energy = data.features.energy, "Drop detected");
        }
        let drop_active = self.drops.strobe_active(now);

        for record in self.records.iter_mut().flatten() {
            record.live.strobe = 0;
        }

        let palette_hues: Vec<f64> = data.palette.iter().map(Rgb::hue).collect();
        let tick = Tick {
            data: &data,
            effects: &self.effects,
            beat,
            bar,
            elapsed: now,
            drop_active,
            palette_hues: &palette_hues,
        };
        let intensity = self.effects.intensity;
        let mut targets: Vec<Target> = self
            .records
            .iter_mut()
            .flatten()
            .map(|record| Target {
                position: record.fixture.position(),
                scale: record.fixture.intensity_scale() * intensity,
                state: &mut record.live,
            })
            .collect();
        targets.sort_by_key(|target| target.position);
        render(
            self.effects.mode,
            &tick,
            &mut self.colors,
            &mut targets,
            &mut self.rng,
        );
        drop(targets);

        if self.effects.movement_enabled {
            let cue = self.choreography.cue(
                self.effects.movement_mode,
                &data,
                beat,
                bar,
                self.effects.movement_speed,
                self.ids.len(),
            );
            for record in self.records.iter_mut().flatten() {
                if record.pan.is_none() && record.tilt.is_none() {
                    continue;
                }
                let mover = Mover {
                    position: record.fixture.position(),
                    pan: record.pan,
                    tilt: record.tilt,
                    motion: &mut record.motion,
                    state: &mut record.live,
                };
                move_fixture(self.effects.movement_mode, &cue, mover, &mut self.rng);
            }
        }

        let drop_strobe = self.effects.strobe_on_drop && drop_active;
        let smooth_factor = self.effects.smooth_factor;
        for record in self.records.iter_mut().flatten() {
            if drop_strobe {
                record.live.strobe = DROP_STROBE;
            }
            if let Some(speed) = record.fixture.forced_strobe() {
                record.live.strobe = speed;
            }
            record.smoothed.smooth_toward(&record.live, smooth_factor);
        }

        self.write_universe();
        self.fixture_states()
    }

    /// Copies the snapshot fields the lighting layer reads, with every value finite and in range.
    /// A missing tempo falls back to the last valid one.
    fn sanitize(&mut self, data: &AnalysisData) -> AnalysisData {
        let mut features = data.features.sanitized();
        let tempo = data.features.tempo;
        if tempo.is_finite() && tempo > 0.0 {
            self.last_tempo = tempo;
        } else {
            features.tempo = self.last_tempo;
        }
        let fraction = |value: f64| {
            if value.is_finite() {
                value.clamp(0.0, 1.0)
            } else {
                0.0
            }
        };
        AnalysisData {
            features,
            beat_position: fraction(data.beat_position),
            bar_position: fraction(data.bar_position),
            section_intensity: fraction(data.section_intensity),
            estimated_beat: data.estimated_beat,
            estimated_bar: data.estimated_bar,
            track_name: None,
            artist_name: None,
            is_playing: data.is_playing,
            palette: data.palette.clone(),
            waveform: Vec::new(),
            spectrum: Vec::new(),
            onset_history: Vec::new(),
        }
    }

    fn write_universe(&self) {
        let mut universe = self.universe.lock();
        for record in self.records.iter().flatten() {
            write_fixture(
                &mut universe,
                record.fixture.start_channel(),
                &record.channels,
                &record.smoothed,
            );
        }
    }
}

#[cfg(test)]
mod tests;
