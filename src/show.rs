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
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::RecvTimeoutError;
use parking_lot::Mutex;
use tracing::{info, span, warn, Level};

pub mod error;

pub use self::error::ShowError;

use crate::audio::{self, mock, AnalysisData, Analyzer};
use crate::config::{self, Effects};
use crate::dmx::{
    SerialLink, SimulatedLink, Transmitter, TransmitterState, TransmitterStats, Universe,
};
use crate::lighting::EffectsEngine;
use crate::playsync::{CancelHandle, Subscription};
use crate::util::{join_with_timeout, DEFAULT_JOIN_TIMEOUT};

/// How long the engine thread waits for a snapshot before checking for cancellation.
const RECEIVE_TIMEOUT: Duration = Duration::from_millis(100);

/// How the show picks its inputs and outputs.
#[derive(Clone, Debug, Default)]
pub struct Options {
    /// Use the simulated analyzer instead of capturing audio.
    pub simulate_audio: bool,
    /// Fall back to a simulated DMX link if the serial port can't be opened.
    pub simulate_dmx_on_failure: bool,
    /// Overrides the port from the show file.
    pub port: Option<String>,
}

/// A point-in-time view of a running show.
#[derive(Clone, Debug)]
pub struct ShowStatus {
    pub running: bool,
    pub blackout: bool,
    pub simulated_dmx: bool,
    pub transmitter_state: TransmitterState,
    pub transmitter: TransmitterStats,
    pub tempo: f64,
    pub energy: f64,
    pub beat: u64,
    pub drop_active: bool,
    pub buildup: bool,
    pub fixtures: usize,
}

struct Worker {
    cancel_handle: CancelHandle,
    join_handle: JoinHandle<()>,
}

/// Ties an analyzer, the effects engine and a DMX transmitter together.
pub struct Show {
    config: Mutex<config::Show>,
    analyzer: Arc<dyn Analyzer>,
    engine: Arc<Mutex<EffectsEngine>>,
    transmitter: Mutex<Transmitter>,
    simulated_dmx: bool,
    /// Blackout as last set through the runtime controls, as opposed to the one stop leaves.
    operator_blackout: Mutex<bool>,
    worker: Mutex<Option<Worker>>,
}

impl Show {
    /// Builds a show from its configuration, opening the audio input and the DMX port.
    pub fn new(config: config::Show, options: &Options) -> Result<Show, ShowError> {
        config.validate()?;
        let analyzer: Arc<dyn Analyzer> = if options.simulate_audio {
            Arc::new(mock::Analyzer::new(config.name()))
        } else {
            audio::get_analyzer(config.audio())?
        };

        let port = options.port.as_deref().or(config.dmx().port());
        let mut transmitter = Transmitter::new(config.dmx().fps())?;
        let simulated_dmx = match transmitter.open(port) {
            Ok(()) => false,
            Err(e) if options.simulate_dmx_on_failure => {
                warn!(
                    err = e.to_string(),
                    "Unable to open DMX port, continuing with a simulated link"
                );
                transmitter.open_with_link(Box::new(SimulatedLink::new("simulated")))?;
                true
            }
            Err(e) => return Err(e.into()),
        };

        Self::assemble(config, analyzer, transmitter, simulated_dmx)
    }

    /// Builds a show over an already constructed analyzer and DMX link.
    pub fn with_parts(
        config: config::Show,
        analyzer: Arc<dyn Analyzer>,
        link: Box<dyn SerialLink>,
    ) -> Result<Show, ShowError> {
        config.validate()?;
        let mut transmitter = Transmitter::new(config.dmx().fps())?;
        transmitter.open_with_link(link)?;
        Self::assemble(config, analyzer, transmitter, false)
    }

    fn assemble(
        config: config::Show,
        analyzer: Arc<dyn Analyzer>,
        transmitter: Transmitter,
        simulated_dmx: bool,
    ) -> Result<Show, ShowError> {
        let engine = EffectsEngine::new(&config, transmitter.universe())?;
        info!(
            show = config.name(),
            analyzer = %analyzer,
            fixtures = config.fixtures().len(),
            "Show ready"
        );
        Ok(Show {
            config: Mutex::new(config),
            analyzer,
            engine: Arc::new(Mutex::new(engine)),
            transmitter: Mutex::new(transmitter),
            simulated_dmx,
            operator_blackout: Mutex::new(false),
            worker: Mutex::new(None),
        })
    }

    /// Starts analysis, the engine thread and DMX output.
    pub fn start(&self) -> Result<(), ShowError> {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return Err(ShowError::AlreadyRunning);
        }

        let sensitivity = {
            let mut engine = self.engine.lock();
            // Lift the blackout left by a previous stop unless the operator asked for it.
            if engine.is_blackout() && !*self.operator_blackout.lock() {
                engine.unblackout();
            }
            engine.effects().beat_sensitivity
        };
        self.analyzer.set_sensitivity(sensitivity);
        let receiver = self.analyzer.subscribe();
        self.analyzer.start()?;
        if let Err(e) = self.transmitter.lock().start() {
            self.analyzer.stop();
            return Err(e.into());
        }

        let cancel_handle = CancelHandle::new();
        let join_handle = {
            let cancel_handle = cancel_handle.clone();
            let engine = self.engine.clone();
            thread::spawn(move || drive_engine(engine, receiver, cancel_handle))
        };
        *worker = Some(Worker {
            cancel_handle,
            join_handle,
        });
        info!("Show started");
        Ok(())
    }

    /// Stops everything and leaves the rig dark. Safe to call more than once.
    pub fn stop(&self) {
        let Some(worker) = self.worker.lock().take() else {
            return;
        };
        worker.cancel_handle.cancel();
        join_with_timeout(worker.join_handle, DEFAULT_JOIN_TIMEOUT, "effects engine");
        self.analyzer.stop();

        // The output thread sends the dark universe once more as it stops.
        self.engine.lock().blackout();
        let mut transmitter = self.transmitter.lock();
        if transmitter.state() == TransmitterState::Running {
            if let Err(e) = transmitter.stop() {
                warn!(err = e.to_string(), "Unable to stop DMX output");
            }
        }
        info!("Show stopped");
    }

    pub fn is_running(&self) -> bool {
        self.worker.lock().is_some()
    }

    /// Turns blackout on or off. The setting survives a stop and start.
    pub fn set_blackout(&self, blackout: bool) {
        *self.operator_blackout.lock() = blackout;
        let mut engine = self.engine.lock();
        if blackout {
            engine.blackout();
        } else {
            engine.unblackout();
        }
    }

    /// Flips blackout, returning the new setting.
    pub fn toggle_blackout(&self) -> bool {
        let blackout = !self.engine.lock().is_blackout();
        self.set_blackout(blackout);
        blackout
    }

    /// Applies a new show configuration to the running show. Audio and DMX settings only take
    /// effect on the next start of the process.
    pub fn update_config(&self, new: config::Show) -> Result<(), ShowError> {
        self.engine.lock().update_config(&new)?;
        self.analyzer.set_sensitivity(new.effects().beat_sensitivity);

        let mut config = self.config.lock();
        if config.dmx() != new.dmx() || config.audio() != new.audio() {
            warn!("Audio and DMX changes apply after a restart");
        }
        *config = new;
        Ok(())
    }

    /// Changes the effect settings live.
    pub fn set_effects(&self, effects: Effects) -> Result<(), ShowError> {
        self.engine.lock().set_effects(effects.clone())?;
        self.analyzer.set_sensitivity(effects.beat_sensitivity);
        self.config.lock().set_effects(effects);
        Ok(())
    }

    /// The current configuration, including live changes.
    pub fn config(&self) -> config::Show {
        self.config.lock().clone()
    }

    /// The current DMX universe contents.
    pub fn universe(&self) -> Universe {
        self.transmitter.lock().universe().lock().clone()
    }

    pub fn status(&self) -> ShowStatus {
        let latest = self.analyzer.latest();
        let (blackout, drop_active, buildup, fixtures) = {
            let engine = self.engine.lock();
            (
                engine.is_blackout(),
                engine.drop_active(),
                engine.buildup(),
                engine.fixture_count(),
            )
        };
        let transmitter = self.transmitter.lock();
        ShowStatus {
            running: self.is_running(),
            blackout,
            simulated_dmx: self.simulated_dmx,
            transmitter_state: transmitter.state(),
            transmitter: transmitter.stats(),
            tempo: latest.features.tempo,
            energy: latest.features.energy,
            beat: latest.estimated_beat,
            drop_active,
            buildup,
            fixtures,
        }
    }
}

impl Drop for Show {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Feeds analysis snapshots through the engine until cancelled.
fn drive_engine(
    engine: Arc<Mutex<EffectsEngine>>,
    receiver: Subscription<AnalysisData>,
    cancel_handle: CancelHandle,
) {
    let span = span!(Level::INFO, "effects engine");
    let _enter = span.enter();

    while !cancel_handle.is_cancelled() {
        match receiver.recv_timeout(RECEIVE_TIMEOUT) {
            Ok(data) => {
                engine.lock().process(&data);
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                warn!("Analyzer went away, stopping the engine");
                return;
            }
        }
    }
}
