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
use std::time::Duration;

use crate::audio::AnalysisData;
use crate::config::{Effects, Fixture, Show};
use crate::dmx::{SharedUniverse, Universe};
use crate::lighting::engine::EffectsEngine;
use crate::lighting::VisualizationMode;

/// Tick length of the analysis publisher.
pub(crate) const TICK: Duration = Duration::from_millis(25);

/// Effects with smoothing and movement turned off so every tick lands on the output.
pub(crate) fn instant_effects(mode: VisualizationMode) -> Effects {
    Effects {
        mode,
        smooth_factor: 0.0,
        movement_enabled: false,
        ..Default::default()
    }
}

/// A row of five channel dimmer/RGB/strobe pars patched back to back from channel 1.
pub(crate) fn par_row(count: u16) -> Vec<Fixture> {
    (0..count)
        .map(|i| {
            Fixture::new(&format!("par{}", i + 1), "generic_rgb_dimmer", 1 + i * 5)
                .at_position(u32::from(i))
        })
        .collect()
}

pub(crate) fn create_test_engine(show: &Show) -> (EffectsEngine, SharedUniverse) {
    let universe = Universe::shared();
    let mut engine = EffectsEngine::new(show, universe.clone()).expect("valid show");
    engine.reseed(7);
    (engine, universe)
}

/// An analysis snapshot at the given beat count and position in the beat.
pub(crate) fn snapshot(beat: u64, beat_position: f64, energy: f64) -> AnalysisData {
    let mut data = AnalysisData {
        beat_position,
        estimated_beat: beat,
        estimated_bar: beat / 4,
        is_playing: true,
        ..Default::default()
    };
    data.features.energy = energy;
    data.features.bass = energy;
    data.features.tempo = 120.0;
    data
}

/// Reads a channel, treating addresses outside the universe as a test failure.
pub(crate) fn channel(universe: &SharedUniverse, address: u16) -> u8 {
    universe
        .lock()
        .channel(address)
        .unwrap_or_else(|| panic!("channel {} out of range", address))
}
