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
use tracing::{debug, error, info, span, warn, Level};

use super::break_method::BreakMethod;
use super::discovery;
use super::error::DmxError;
use super::link::{SerialLink, SerialPortLink};
use super::stats::{Escalation, StatsTracker, TransmitterStats};
use super::universe::{SharedUniverse, Universe, FRAME_SIZE};
use crate::config::dmx::MAX_DMX_FPS;
use crate::playsync::CancelHandle;
use crate::util::{join_with_timeout, raise_current_thread_priority, DEFAULT_JOIN_TIMEOUT};

/// Where the transmitter is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransmitterState {
    Closed,
    Open,
    Running,
}

impl fmt::Display for TransmitterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TransmitterState::Closed => "closed",
            TransmitterState::Open => "open",
            TransmitterState::Running => "running",
        })
    }
}

/// The link and its break method. Owned by whoever is sending: the transmitter while idle,
/// the output thread while running.
struct Driver {
    link: Box<dyn SerialLink>,
    method: BreakMethod,
}

impl Driver {
    /// Sends one full frame: break, mark-after-break, start code and channels.
    fn send(&mut self, frame: &[u8; FRAME_SIZE]) -> Result<(), DmxError> {
        if let Err(e) = self.method.generate(self.link.as_mut()) {
            if self.method == BreakMethod::BaudRateSwitch {
                return Err(DmxError::BreakSignalFailure {
                    method: self.method,
                    reason: e.to_string(),
                });
            }
            warn!(
                port = self.link.name(),
                from = %self.method,
                err = e.to_string(),
                "Break method failed, switching to baud rate switch for the rest of the session"
            );
            self.method = BreakMethod::BaudRateSwitch;
            self.method
                .generate(self.link.as_mut())
                .map_err(|e| DmxError::BreakSignalFailure {
                    method: BreakMethod::BaudRateSwitch,
                    reason: e.to_string(),
                })?;
        }
        self.link.write_all(frame)?;
        self.link.flush()?;
        Ok(())
    }
}

/// Drives a DMX universe out of a serial line at a fixed frame rate.
pub struct Transmitter {
    fps: u32,
    universe: SharedUniverse,
    state: TransmitterState,
    /// Present while open and idle. Moved into the output thread while running.
    driver: Option<Driver>,
    stats: Arc<Mutex<StatsTracker>>,
    cancel_handle: CancelHandle,
    join_handle: Option<JoinHandle<Driver>>,
}

impl Transmitter {
    /// Creates a closed transmitter with its own universe.
    pub fn new(fps: u32) -> Result<Transmitter, DmxError> {
        Self::with_universe(fps, Universe::shared())
    }

    /// Creates a closed transmitter that sends the given universe.
    pub fn with_universe(fps: u32, universe: SharedUniverse) -> Result<Transmitter, DmxError> {
        if fps == 0 || fps > MAX_DMX_FPS {
            return Err(DmxError::InvalidFps(fps));
        }
        Ok(Transmitter {
            fps,
            universe,
            state: TransmitterState::Closed,
            driver: None,
            stats: Arc::new(Mutex::new(StatsTracker::new(fps))),
            cancel_handle: CancelHandle::new(),
            join_handle: None,
        })
    }

    fn expect_state(&self, expected: TransmitterState) -> Result<(), DmxError> {
        if self.state != expected {
            return Err(DmxError::InvalidState {
                expected,
                actual: self.state,
            });
        }
        Ok(())
    }

    /// Opens the given serial port, or the best detected one if no port is given.
    pub fn open(&mut self, port: Option<&str>) -> Result<(), DmxError> {
        self.expect_state(TransmitterState::Closed)?;
        let path = match port {
            Some(port) => port.to_string(),
            None => discovery::detect()?.name,
        };
        let link = SerialPortLink::open(&path)?;
        self.open_with_link(Box::new(link))
    }

    /// Opens the transmitter over an already constructed link.
    pub fn open_with_link(&mut self, link: Box<dyn SerialLink>) -> Result<(), DmxError> {
        self.open_with_priority(link, BreakMethod::platform_priority())
    }

    /// Opens over the link, keeping the first break method that works in the given order.
    pub(crate) fn open_with_priority(
        &mut self,
        mut link: Box<dyn SerialLink>,
        priority: [BreakMethod; 3],
    ) -> Result<(), DmxError> {
        self.expect_state(TransmitterState::Closed)?;

        let mut failure = None;
        let mut selected = None;
        for method in priority {
            match method.generate(link.as_mut()) {
                Ok(()) => {
                    selected = Some(method);
                    break;
                }
                Err(e) => {
                    debug!(method = %method, err = e.to_string(), "Break method probe failed");
                    failure = Some(DmxError::BreakSignalFailure {
                        method,
                        reason: e.to_string(),
                    });
                }
            }
        }
        let Some(method) = selected else {
            return Err(failure.unwrap_or(DmxError::BreakSignalFailure {
                method: BreakMethod::BaudRateSwitch,
                reason: "no break methods to probe".to_string(),
            }));
        };

        let port = link.name();
        info!(port, method = %method, fps = self.fps, "Opened DMX transmitter");
        {
            let mut stats = self.stats.lock();
            stats.set_port(Some(port));
            stats.set_break_method(Some(method));
        }
        self.driver = Some(Driver { link, method });
        self.state = TransmitterState::Open;
        Ok(())
    }

    /// Starts the output loop.
    pub fn start(&mut self) -> Result<(), DmxError> {
        self.expect_state(TransmitterState::Open)?;
        let Some(mut driver) = self.driver.take() else {
            return Err(DmxError::InvalidState {
                expected: TransmitterState::Open,
                actual: TransmitterState::Closed,
            });
        };

        self.cancel_handle = CancelHandle::new();
        let cancel_handle = self.cancel_handle.clone();
        let universe = self.universe.clone();
        let stats = self.stats.clone();
        let fps = self.fps;
        stats.lock().reset_rate();

        self.join_handle = Some(thread::spawn(move || {
            let span = span!(Level::INFO, "dmx output");
            let _enter = span.enter();
            raise_current_thread_priority("dmx output");

            let interval = Duration::from_secs(1) / fps;
            while !cancel_handle.is_cancelled() {
                let started = Instant::now();
                send_frame(&mut driver, &universe, &stats);
                if let Some(remaining) = interval.checked_sub(started.elapsed()) {
                    spin_sleep::sleep(remaining);
                }
            }
            // The universe as it stands at stop goes out once more.
            send_frame(&mut driver, &universe, &stats);
            driver
        }));

        self.state = TransmitterState::Running;
        info!(fps, "Started DMX output");
        Ok(())
    }

    /// Stops the output loop. The port stays open.
    pub fn stop(&mut self) -> Result<(), DmxError> {
        self.expect_state(TransmitterState::Running)?;
        self.cancel_handle.cancel();

        let driver = self
            .join_handle
            .take()
            .and_then(|handle| join_with_timeout(handle, DEFAULT_JOIN_TIMEOUT, "dmx output"));
        match driver {
            Some(driver) => {
                self.driver = Some(driver);
                self.state = TransmitterState::Open;
                info!("Stopped DMX output");
            }
            None => {
                error!("DMX output thread did not return its port, closing");
                self.state = TransmitterState::Closed;
            }
        }
        Ok(())
    }

    /// Stops output if needed and releases the port.
    pub fn close(&mut self) {
        if self.state == TransmitterState::Running {
            let _ = self.stop();
        }
        if self.driver.take().is_some() {
            info!("Closed DMX transmitter");
        }
        self.state = TransmitterState::Closed;
    }

    /// Sends the current universe immediately. Only valid while open and idle; a running
    /// transmitter sends on its own.
    pub fn send_now(&mut self) -> Result<(), DmxError> {
        if self.state == TransmitterState::Running {
            return Ok(());
        }
        self.expect_state(TransmitterState::Open)?;
        let frame = *self.universe.lock().frame();
        let Some(driver) = self.driver.as_mut() else {
            return Err(DmxError::InvalidState {
                expected: TransmitterState::Open,
                actual: TransmitterState::Closed,
            });
        };

        let result = driver.send(&frame);
        let mut stats = self.stats.lock();
        stats.set_break_method(Some(driver.method));
        match result {
            Ok(()) => {
                stats.record_success(Instant::now());
                Ok(())
            }
            Err(e) => {
                stats.record_failure(e.to_string());
                Err(e)
            }
        }
    }

    pub fn state(&self) -> TransmitterState {
        self.state
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }

    pub fn stats(&self) -> TransmitterStats {
        self.stats.lock().stats()
    }

    /// The universe this transmitter sends.
    pub fn universe(&self) -> SharedUniverse {
        self.universe.clone()
    }

    pub fn set_channel(&self, channel: u16, value: u8) -> bool {
        self.universe.lock().set_channel(channel, value)
    }

    pub fn set_channels(&self, start: u16, values: &[u8]) -> usize {
        self.universe.lock().set_channels(start, values)
    }

    pub fn blackout(&self) {
        self.universe.lock().blackout();
    }

    pub fn full_on(&self) {
        self.universe.lock().full_on();
    }

    /// A copy of the 512 channel values.
    pub fn channels(&self) -> Vec<u8> {
        self.universe.lock().channels().to_vec()
    }
}

/// Sends one snapshot of the universe and records the outcome, escalating repeated failures.
fn send_frame(driver: &mut Driver, universe: &SharedUniverse, stats: &Mutex<StatsTracker>) {
    let frame = *universe.lock().frame();
    let result = driver.send(&frame);

    let mut tracker = stats.lock();
    tracker.set_break_method(Some(driver.method));
    match result {
        Ok(()) => {
            let recovered = tracker.record_success(Instant::now());
            drop(tracker);
            if recovered > 0 {
                info!(failures = recovered, "DMX output recovered");
            }
        }
        Err(e) => {
            let escalation = tracker.record_failure(e.to_string());
            let failures = tracker.stats().consecutive_errors;
            drop(tracker);
            match escalation {
                Escalation::Quiet => {}
                Escalation::Warn => {
                    warn!(failures, err = e.to_string(), "DMX frames are failing")
                }
                Escalation::Error => {
                    error!(failures, err = e.to_string(), "DMX frames still failing")
                }
            }
        }
    }
}

impl Drop for Transmitter {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod test {
    use std::thread;
    use std::time::Duration;

    use serial_test::serial;

    use super::*;
    use crate::dmx::break_method::MIN_BREAK;
    use crate::dmx::link::SimulatedLink;

    fn simulated(fps: u32) -> (Transmitter, crate::dmx::link::SimulatedLinkHandle) {
        let link = SimulatedLink::new("sim");
        let handle = link.handle();
        let mut transmitter = Transmitter::new(fps).unwrap();
        transmitter.open_with_link(Box::new(link)).unwrap();
        (transmitter, handle)
    }

    #[test]
    fn test_invalid_fps() {
        assert!(matches!(
            Transmitter::new(0),
            Err(DmxError::InvalidFps(0))
        ));
        assert!(matches!(
            Transmitter::new(45),
            Err(DmxError::InvalidFps(45))
        ));
    }

    #[test]
    fn test_state_machine() {
        let mut transmitter = Transmitter::new(40).unwrap();
        assert!(matches!(
            transmitter.start(),
            Err(DmxError::InvalidState {
                expected: TransmitterState::Open,
                actual: TransmitterState::Closed
            })
        ));
        assert!(transmitter.stop().is_err());
        assert!(transmitter.send_now().is_err());

        transmitter
            .open_with_link(Box::new(SimulatedLink::new("sim")))
            .unwrap();
        assert_eq!(TransmitterState::Open, transmitter.state());
        assert!(transmitter
            .open_with_link(Box::new(SimulatedLink::new("sim")))
            .is_err());

        transmitter.start().unwrap();
        assert_eq!(TransmitterState::Running, transmitter.state());
        transmitter.stop().unwrap();
        assert_eq!(TransmitterState::Open, transmitter.state());

        // The port comes back from the output thread and can be restarted.
        transmitter.start().unwrap();
        transmitter.close();
        assert_eq!(TransmitterState::Closed, transmitter.state());
    }

    #[test]
    #[serial]
    fn test_frame_rate_and_break_timing() {
        let (mut transmitter, handle) = simulated(40);
        transmitter.set_channel(1, 99);
        transmitter.start().unwrap();
        thread::sleep(Duration::from_millis(1000));
        transmitter.stop().unwrap();

        let frames = handle.frames();
        assert!((36..=44).contains(&frames), "sent {} frames", frames);
        assert!(handle.min_break().unwrap() >= MIN_BREAK);

        let frame = handle.last_frame().unwrap();
        assert_eq!(FRAME_SIZE, frame.len());
        assert_eq!(0, frame[0]);
        assert_eq!(99, frame[1]);

        let stats = transmitter.stats();
        assert_eq!(frames, stats.frames_sent);
        assert_eq!(40, stats.target_fps);
        assert_eq!(Some("sim".to_string()), stats.port);
    }

    #[test]
    #[serial]
    fn test_stop_flushes_final_frame() {
        let (mut transmitter, handle) = simulated(40);
        transmitter.set_channel(1, 200);
        transmitter.start().unwrap();
        thread::sleep(Duration::from_millis(100));

        transmitter.blackout();
        transmitter.stop().unwrap();
        let frame = handle.last_frame().unwrap();
        assert!(frame.iter().all(|v| *v == 0));
        assert_eq!(handle.frames(), transmitter.stats().frames_sent);
    }

    #[test]
    fn test_probe_picks_first_working_method() {
        let link = SimulatedLink::new("sim");
        link.handle().fail_break_condition(true);
        let mut transmitter = Transmitter::new(40).unwrap();
        transmitter
            .open_with_priority(Box::new(link), BreakMethod::priority_for(true))
            .unwrap();
        assert_eq!(
            Some(BreakMethod::BaudRateSwitch),
            transmitter.stats().break_method
        );
    }

    #[test]
    fn test_probe_all_fail() {
        let link = SimulatedLink::new("sim");
        let handle = link.handle();
        handle.fail_break_condition(true);
        handle.fail_baud_switch(true);
        handle.fail_timed_break(true);
        let mut transmitter = Transmitter::new(40).unwrap();
        assert!(matches!(
            transmitter.open_with_link(Box::new(link)),
            Err(DmxError::BreakSignalFailure { .. })
        ));
        assert_eq!(TransmitterState::Closed, transmitter.state());
    }

    #[test]
    fn test_fallback_is_permanent() {
        let link = SimulatedLink::new("sim");
        let handle = link.handle();
        let mut transmitter = Transmitter::new(40).unwrap();
        transmitter
            .open_with_priority(Box::new(link), BreakMethod::priority_for(true))
            .unwrap();
        assert_eq!(
            Some(BreakMethod::BreakCondition),
            transmitter.stats().break_method
        );

        handle.fail_break_condition(true);
        transmitter.send_now().unwrap();
        assert_eq!(
            Some(BreakMethod::BaudRateSwitch),
            transmitter.stats().break_method
        );

        handle.fail_break_condition(false);
        transmitter.send_now().unwrap();
        assert_eq!(
            Some(BreakMethod::BaudRateSwitch),
            transmitter.stats().break_method
        );
        assert_eq!(0, transmitter.stats().errors);
        assert_eq!(2, handle.frames());
    }

    #[test]
    fn test_send_failures_are_counted() {
        let (mut transmitter, handle) = simulated(40);
        handle.fail_writes(true);
        assert!(transmitter.send_now().is_err());
        assert!(transmitter.send_now().is_err());
        let stats = transmitter.stats();
        assert_eq!(2, stats.errors);
        assert_eq!(2, stats.consecutive_errors);
        assert!(stats.last_error.is_some());

        handle.fail_writes(false);
        transmitter.send_now().unwrap();
        assert_eq!(0, transmitter.stats().consecutive_errors);
    }

    #[test]
    fn test_immediate_controls() {
        let transmitter = Transmitter::new(40).unwrap();
        transmitter.full_on();
        assert!(transmitter.channels().iter().all(|v| *v == 255));
        transmitter.blackout();
        assert!(transmitter.channels().iter().all(|v| *v == 0));
        assert_eq!(2, transmitter.set_channels(511, &[1, 2, 3]));
        assert!(!transmitter.set_channel(513, 1));
        assert_eq!(0, transmitter.universe().lock().frame()[0]);
    }
}
