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
use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info, span, warn, Level};

use super::capture;
use super::error::AnalysisError;
use super::features::{FeatureExtractor, DEFAULT_SENSITIVITY};
use super::{AnalysisData, Analyzer, TrackInfo};
use crate::config;
use crate::playsync::{Broadcast, CancelHandle, Subscription};
use crate::util::{join_with_timeout, DEFAULT_JOIN_TIMEOUT};

/// How often snapshots are published (40 Hz).
pub const PUBLISH_INTERVAL: Duration = Duration::from_millis(25);

/// How often the tempo worker checks whether a refresh is due.
const TEMPO_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Fans snapshots out to subscribers and remembers the latest one.
pub(crate) struct Publisher {
    broadcast: Broadcast<AnalysisData>,
    latest: Mutex<AnalysisData>,
}

impl Publisher {
    pub fn new() -> Publisher {
        Publisher {
            broadcast: Broadcast::new(),
            latest: Mutex::new(AnalysisData::default()),
        }
    }

    pub fn publish(&self, data: AnalysisData) {
        self.broadcast.publish(&data);
        *self.latest.lock() = data;
    }

    pub fn subscribe(&self) -> Subscription<AnalysisData> {
        self.broadcast.subscribe()
    }

    pub fn latest(&self) -> AnalysisData {
        self.latest.lock().clone()
    }
}

/// Runs `tick` every interval until cancelled. The interval is measured from the start of
/// each tick, so slow ticks don't accumulate drift.
pub(crate) fn run_every(interval: Duration, cancel_handle: &CancelHandle, mut tick: impl FnMut()) {
    loop {
        let started = Instant::now();
        tick();
        let remaining = interval.saturating_sub(started.elapsed());
        if cancel_handle.wait_timeout(remaining) {
            return;
        }
    }
}

struct Workers {
    cancel_handle: CancelHandle,
    handles: Vec<(&'static str, JoinHandle<()>)>,
}

/// Analyzes a live input device.
pub struct LiveAnalyzer {
    config: config::Audio,
    publisher: Arc<Publisher>,
    track_info: Arc<Mutex<TrackInfo>>,
    sensitivity: Mutex<f64>,
    extractor: Mutex<Option<Arc<FeatureExtractor>>>,
    workers: Mutex<Option<Workers>>,
}

impl LiveAnalyzer {
    pub fn new(config: config::Audio) -> LiveAnalyzer {
        LiveAnalyzer {
            config,
            publisher: Arc::new(Publisher::new()),
            track_info: Arc::new(Mutex::new(TrackInfo::default())),
            sensitivity: Mutex::new(DEFAULT_SENSITIVITY),
            extractor: Mutex::new(None),
            workers: Mutex::new(None),
        }
    }
}

impl fmt::Display for LiveAnalyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (live)", self.config.device().unwrap_or("default input"))
    }
}

impl Analyzer for LiveAnalyzer {
    fn start(&self) -> Result<(), AnalysisError> {
        let mut workers = self.workers.lock();
        if workers.is_some() {
            return Ok(());
        }

        let input = capture::negotiate(&self.config)?;
        let extractor = Arc::new(FeatureExtractor::new(
            input.sample_rate(),
            self.config.buffer_size(),
        ));
        extractor.set_sensitivity(*self.sensitivity.lock());
        info!(
            device = self.config.device().unwrap_or("default input"),
            sample_rate = input.sample_rate(),
            buffer_size = self.config.buffer_size(),
            "Starting audio analysis"
        );

        let cancel_handle = CancelHandle::new();
        let capture = capture::spawn(input, extractor.clone(), cancel_handle.clone())?;

        let tempo = {
            let extractor = extractor.clone();
            let cancel_handle = cancel_handle.clone();
            thread::spawn(move || {
                let span = span!(Level::INFO, "tempo analysis");
                let _enter = span.enter();
                run_every(TEMPO_POLL_INTERVAL, &cancel_handle, || {
                    match extractor.refresh_tempo(extractor.now()) {
                        Ok(Some(bpm)) => debug!(bpm, "Tempo estimate"),
                        Ok(None) | Err(AnalysisError::InsufficientAudioBuffer { .. }) => {}
                        Err(e) => warn!(err = e.to_string(), "Tempo analysis failed"),
                    }
                });
            })
        };

        let publisher = {
            let extractor = extractor.clone();
            let publisher = self.publisher.clone();
            let track_info = self.track_info.clone();
            let cancel_handle = cancel_handle.clone();
            thread::spawn(move || {
                let span = span!(Level::INFO, "analysis publisher");
                let _enter = span.enter();
                run_every(PUBLISH_INTERVAL, &cancel_handle, || {
                    let data = extractor.take_analysis().with_track_info(&track_info.lock());
                    publisher.publish(data);
                });
            })
        };

        *self.extractor.lock() = Some(extractor);
        *workers = Some(Workers {
            cancel_handle,
            handles: vec![
                ("audio capture", capture),
                ("tempo analysis", tempo),
                ("analysis publisher", publisher),
            ],
        });
        Ok(())
    }

    fn stop(&self) {
        let Some(workers) = self.workers.lock().take() else {
            return;
        };
        workers.cancel_handle.cancel();
        for (name, handle) in workers.handles {
            join_with_timeout(handle, DEFAULT_JOIN_TIMEOUT, name);
        }
        self.extractor.lock().take();
        info!("Stopped audio analysis");
    }

    fn subscribe(&self) -> Subscription<AnalysisData> {
        self.publisher.subscribe()
    }

    fn latest(&self) -> AnalysisData {
        self.publisher.latest()
    }

    fn set_sensitivity(&self, sensitivity: f64) {
        *self.sensitivity.lock() = sensitivity;
        if let Some(extractor) = self.extractor.lock().as_ref() {
            extractor.set_sensitivity(sensitivity);
        }
    }

    fn set_track_info(&self, info: TrackInfo) {
        *self.track_info.lock() = info;
    }
}

impl Drop for LiveAnalyzer {
    fn drop(&mut self) {
        self.stop();
    }
}
