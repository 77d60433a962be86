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

use crate::config::{Effects, Fixture, Show};
use crate::lighting::engine::tests::common::{
    channel, create_test_engine, instant_effects, par_row, snapshot, TICK,
};
use crate::lighting::{MovementMode, VisualizationMode};

#[test]
fn test_blackout_holds_across_process() {
    let show = Show::new(instant_effects(VisualizationMode::Energy), par_row(3));
    let (mut engine, universe) = create_test_engine(&show);
    engine.process_at(&snapshot(1, 0.0, 1.0), Duration::ZERO);
    assert!(channel(&universe, 1) > 0);

    engine.blackout();
    assert!(engine.is_blackout());
    assert!(universe.lock().channels()[..15].iter().all(|v| *v == 0));

    for beat in 2..20 {
        let states = engine.process_at(&snapshot(beat, 0.0, 1.0), TICK * beat as u32);
        assert!(states.values().all(|state| state.is_dark()));
        assert!(universe.lock().channels()[..15].iter().all(|v| *v == 0));
    }
}

#[test]
fn test_blackout_bypasses_smoothing() {
    let effects = Effects {
        smooth_factor: 0.9,
        ..instant_effects(VisualizationMode::Energy)
    };
    let show = Show::new(effects, par_row(1));
    let (mut engine, universe) = create_test_engine(&show);
    for beat in 1..40 {
        engine.process_at(&snapshot(beat, 0.0, 1.0), TICK * beat as u32);
    }
    engine.blackout();
    assert_eq!(0, channel(&universe, 1));
    assert_eq!(0, channel(&universe, 2));
}

#[test]
fn test_unblackout_fades_back_up() {
    let effects = Effects {
        smooth_factor: 0.5,
        ..instant_effects(VisualizationMode::Energy)
    };
    let show = Show::new(effects, par_row(1));
    let (mut engine, universe) = create_test_engine(&show);
    engine.blackout();
    engine.unblackout();
    assert!(!engine.is_blackout());

    let mut previous = 0;
    for tick in 1..20u32 {
        engine.process_at(&snapshot(1, 0.0, 1.0), TICK * tick);
        let dimmer = channel(&universe, 1);
        assert!(dimmer >= previous);
        previous = dimmer;
    }
    assert_eq!(255, previous);
}

#[test]
fn test_blackout_keeps_position() {
    let effects = Effects {
        movement_enabled: true,
        movement_mode: MovementMode::Dramatic,
        ..instant_effects(VisualizationMode::Energy)
    };
    let show = Show::new(effects, vec![Fixture::new("head", "moving_head_basic", 1)]);
    let (mut engine, universe) = create_test_engine(&show);
    for tick in 1..60u32 {
        engine.process_at(&snapshot(u64::from(tick / 5), 0.0, 0.9), TICK * tick);
    }
    let pan = channel(&universe, 1);
    let tilt = channel(&universe, 3);

    engine.blackout();
    engine.process_at(&snapshot(20, 0.0, 0.9), TICK * 60);
    assert_eq!(pan, channel(&universe, 1));
    assert_eq!(tilt, channel(&universe, 3));
    assert_eq!(0, channel(&universe, 6));
}
