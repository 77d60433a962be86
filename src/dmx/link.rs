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
use std::io::{self, Write};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use tracing::{debug, warn};

use super::break_method::DMX_BAUD;
use super::error::DmxError;
use super::universe::FRAME_SIZE;

/// The shortest break most OS timed-break calls can produce.
const MIN_TIMED_BREAK: Duration = Duration::from_millis(1);

/// Everything the transmitter needs from a serial line. Implemented by real ports and by the
/// in-memory simulation.
pub trait SerialLink: Send {
    /// The name of the port, for logging and statistics.
    fn name(&self) -> String;

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()>;

    fn flush(&mut self) -> io::Result<()>;

    fn baud_rate(&self) -> io::Result<u32>;

    fn set_baud_rate(&mut self, baud_rate: u32) -> io::Result<()>;

    /// Drives the line low until clear_break is called.
    fn set_break(&mut self) -> io::Result<()>;

    fn clear_break(&mut self) -> io::Result<()>;

    /// Holds the line low for at least the given duration. The default implementation uses a
    /// plain sleep, so the break is never shorter than a millisecond.
    fn timed_break(&mut self, duration: Duration) -> io::Result<()> {
        self.set_break()?;
        std::thread::sleep(duration.max(MIN_TIMED_BREAK));
        self.clear_break()
    }
}

/// A link over an OS serial port.
pub struct SerialPortLink {
    name: String,
    port: Box<dyn SerialPort>,
}

impl SerialPortLink {
    /// Opens the port at 250000 baud, 8N2, with no flow control.
    pub fn open(path: &str) -> Result<SerialPortLink, DmxError> {
        let mut port = serialport::new(path, DMX_BAUD)
            .data_bits(DataBits::Eight)
            .stop_bits(StopBits::Two)
            .parity(Parity::None)
            .flow_control(FlowControl::None)
            .timeout(Duration::from_millis(100))
            .open()
            .map_err(|e| open_error(path, e))?;

        // Some adapters gate their line driver on these. Not every driver supports them.
        if let Err(e) = port.write_request_to_send(true) {
            debug!(port = path, err = e.to_string(), "Unable to set RTS");
        }
        if let Err(e) = port.write_data_terminal_ready(true) {
            debug!(port = path, err = e.to_string(), "Unable to set DTR");
        }

        Ok(SerialPortLink {
            name: path.to_string(),
            port,
        })
    }
}

fn open_error(path: &str, e: serialport::Error) -> DmxError {
    match e.kind() {
        serialport::ErrorKind::Io(io::ErrorKind::PermissionDenied) => DmxError::PermissionDenied {
            port: path.to_string(),
        },
        serialport::ErrorKind::NoDevice | serialport::ErrorKind::Io(io::ErrorKind::NotFound) => {
            warn!(port = path, "Serial device does not exist");
            DmxError::DeviceNotFound
        }
        _ => DmxError::Open {
            port: path.to_string(),
            reason: e.to_string(),
        },
    }
}

impl SerialLink for SerialPortLink {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.port.write_all(bytes)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port.flush()
    }

    fn baud_rate(&self) -> io::Result<u32> {
        Ok(self.port.baud_rate()?)
    }

    fn set_baud_rate(&mut self, baud_rate: u32) -> io::Result<()> {
        Ok(self.port.set_baud_rate(baud_rate)?)
    }

    fn set_break(&mut self) -> io::Result<()> {
        Ok(self.port.set_break()?)
    }

    fn clear_break(&mut self) -> io::Result<()> {
        Ok(self.port.clear_break()?)
    }
}

struct SimulatedState {
    baud_rate: u32,
    frames: u64,
    last_frame: Option<Vec<u8>>,
    break_count: u64,
    min_break: Option<Duration>,
    break_started: Option<Instant>,
    fail_writes: bool,
    fail_break_condition: bool,
    fail_baud_switch: bool,
    fail_timed_break: bool,
}

impl SimulatedState {
    fn record_break(&mut self, low: Duration) {
        self.break_count += 1;
        self.min_break = Some(self.min_break.map_or(low, |min| min.min(low)));
    }
}

fn injected(what: &str) -> io::Error {
    io::Error::other(format!("simulated {} failure", what))
}

/// An in-memory serial line. It records every frame and break it sees, and failures can be
/// injected through its handle.
pub struct SimulatedLink {
    name: String,
    state: Arc<Mutex<SimulatedState>>,
}

/// Inspects and manipulates a simulated link after it has been handed to a transmitter.
#[derive(Clone)]
pub struct SimulatedLinkHandle {
    state: Arc<Mutex<SimulatedState>>,
}

impl SimulatedLink {
    pub fn new(name: &str) -> SimulatedLink {
        SimulatedLink {
            name: name.to_string(),
            state: Arc::new(Mutex::new(SimulatedState {
                baud_rate: DMX_BAUD,
                frames: 0,
                last_frame: None,
                break_count: 0,
                min_break: None,
                break_started: None,
                fail_writes: false,
                fail_break_condition: false,
                fail_baud_switch: false,
                fail_timed_break: false,
            })),
        }
    }

    pub fn handle(&self) -> SimulatedLinkHandle {
        SimulatedLinkHandle {
            state: self.state.clone(),
        }
    }
}

impl SimulatedLinkHandle {
    /// Number of full frames written at line rate.
    pub fn frames(&self) -> u64 {
        self.state.lock().frames
    }

    /// The most recent full frame, start code included.
    pub fn last_frame(&self) -> Option<Vec<u8>> {
        self.state.lock().last_frame.clone()
    }

    pub fn break_count(&self) -> u64 {
        self.state.lock().break_count
    }

    /// The shortest break seen so far.
    pub fn min_break(&self) -> Option<Duration> {
        self.state.lock().min_break
    }

    pub fn fail_writes(&self, fail: bool) {
        self.state.lock().fail_writes = fail;
    }

    pub fn fail_break_condition(&self, fail: bool) {
        self.state.lock().fail_break_condition = fail;
    }

    pub fn fail_baud_switch(&self, fail: bool) {
        self.state.lock().fail_baud_switch = fail;
    }

    pub fn fail_timed_break(&self, fail: bool) {
        self.state.lock().fail_timed_break = fail;
    }
}

impl SerialLink for SimulatedLink {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        let mut state = self.state.lock();
        if state.fail_writes {
            return Err(injected("write"));
        }
        if state.baud_rate != DMX_BAUD {
            // A zero byte holds the line low for its start bit and eight data bits.
            if bytes.first() == Some(&0x00) {
                let low = Duration::from_secs_f64(9.0 / f64::from(state.baud_rate));
                state.record_break(low);
            }
            return Ok(());
        }
        if bytes.len() == FRAME_SIZE {
            state.frames += 1;
            state.last_frame = Some(bytes.to_vec());
        }
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn baud_rate(&self) -> io::Result<u32> {
        Ok(self.state.lock().baud_rate)
    }

    fn set_baud_rate(&mut self, baud_rate: u32) -> io::Result<()> {
        let mut state = self.state.lock();
        if state.fail_baud_switch && baud_rate != DMX_BAUD {
            return Err(injected("baud rate switch"));
        }
        state.baud_rate = baud_rate;
        Ok(())
    }

    fn set_break(&mut self) -> io::Result<()> {
        let mut state = self.state.lock();
        if state.fail_break_condition {
            return Err(injected("break condition"));
        }
        state.break_started = Some(Instant::now());
        Ok(())
    }

    fn clear_break(&mut self) -> io::Result<()> {
        let mut state = self.state.lock();
        if let Some(started) = state.break_started.take() {
            state.record_break(started.elapsed());
        }
        Ok(())
    }

    fn timed_break(&mut self, duration: Duration) -> io::Result<()> {
        if self.state.lock().fail_timed_break {
            return Err(injected("timed break"));
        }
        let low = duration.max(MIN_TIMED_BREAK);
        spin_sleep::sleep(low);
        self.state.lock().record_break(low);
        Ok(())
    }
}
