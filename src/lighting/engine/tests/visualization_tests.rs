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
fn test_strobe_beat_flash_then_dark() {
    let effects = Effects {
        intensity: 0.5,
        ..instant_effects(VisualizationMode::StrobeBeat)
    };
    let show = Show::new(
        effects,
        vec![Fixture::new("par", "generic_rgb_dimmer", 1).scaled(0.8)],
    );
    let (mut engine, universe) = create_test_engine(&show);

    let states = engine.process_at(&snapshot(1, 0.0, 0.5), Duration::ZERO);
    let par = states["par"];
    assert_eq!((255, 255, 255), par.rgb());
    assert_eq!(102, par.dimmer);
    assert_eq!(102, channel(&universe, 1));
    assert_eq!(255, channel(&universe, 2));
    assert_eq!(200, channel(&universe, 5));

    // 300ms into a 500ms beat.
    let states = engine.process_at(&snapshot(1, 0.6, 0.5), Duration::from_millis(300));
    let par = states["par"];
    assert_eq!((0, 0, 0), par.rgb());
    assert_eq!(0, par.dimmer);
    assert_eq!(0, par.strobe);
    assert_eq!(0, channel(&universe, 1));
    assert_eq!(0, channel(&universe, 5));
}

#[test]
fn test_every_mode_fills_the_rig() {
    for mode in VisualizationMode::ALL {
        let show = Show::new(instant_effects(mode), par_row(6));
        let (mut engine, _) = create_test_engine(&show);
        for beat in 1..8 {
            engine.process_at(&snapshot(beat, 0.0, 0.8), TICK * 20 * beat as u32);
        }
        let states = engine.process_at(&snapshot(8, 0.0, 0.8), TICK * 160);
        assert_eq!(6, states.len(), "{}", mode);
        assert!(states.values().any(|state| !state.is_dark()), "{}", mode);
    }
}

#[test]
fn test_fixed_channels_win() {
    let show = Show::new(
        instant_effects(VisualizationMode::Energy),
        vec![Fixture::new("head", "moving_head_basic", 10)],
    );
    let (mut engine, universe) = create_test_engine(&show);
    engine.process_at(&snapshot(1, 0.0, 1.0), Duration::ZERO);

    // Maintenance is pinned to 0 whatever the state says.
    assert_eq!(0, channel(&universe, 23));
    assert!(channel(&universe, 15) > 0);
}

#[test]
fn test_movement_stays_inside_limits_on_the_wire() {
    let effects = Effects {
        movement_enabled: true,
        movement_mode: MovementMode::Crazy,
        movement_speed: 1.0,
        ..instant_effects(VisualizationMode::Energy)
    };
    let show = Show::new(
        effects,
        vec![Fixture::new("head", "moving_head_basic", 1)
            .with_pan_limits(40, 200)
            .with_tilt_limits(60, 180)],
    );
    let (mut engine, universe) = create_test_engine(&show);
    let mut elapsed = Duration::ZERO;
    for tick in 0..400u64 {
        engine.process_at(&snapshot(tick / 20 + 1, 0.0, 0.9), elapsed);
        elapsed += TICK;
        let pan = channel(&universe, 1);
        let tilt = channel(&universe, 3);
        assert!((40..=200).contains(&pan), "pan {}", pan);
        assert!((60..=180).contains(&tilt), "tilt {}", tilt);
    }
}

#[test]
fn test_movement_disabled_leaves_heads_centered() {
    let show = Show::new(
        instant_effects(VisualizationMode::Energy),
        vec![Fixture::new("head", "moving_head_basic", 1)],
    );
    let (mut engine, universe) = create_test_engine(&show);
    for beat in 1..10 {
        engine.process_at(&snapshot(beat, 0.0, 1.0), TICK * beat as u32);
    }
    assert_eq!(128, channel(&universe, 1));
    assert_eq!(128, channel(&universe, 3));
}
