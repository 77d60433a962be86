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
use std::io;

use super::break_method::BreakMethod;
use super::transmitter::TransmitterState;

/// Errors raised by the DMX transmission layer.
#[derive(Debug, thiserror::Error)]
pub enum DmxError {
    /// No serial port matched, or the requested port doesn't exist.
    #[error("no DMX serial device found")]
    DeviceNotFound,

    /// The port exists but the process isn't allowed to open it.
    #[error("permission denied opening {port}")]
    PermissionDenied { port: String },

    /// Opening or configuring the port failed for another reason.
    #[error("unable to open {port}: {reason}")]
    Open { port: String, reason: String },

    /// A break-generation strategy failed. Retriable through the fallback chain.
    #[error("{method} break failed: {reason}")]
    BreakSignalFailure { method: BreakMethod, reason: String },

    /// A frame write timed out.
    #[error("timed out sending DMX frame")]
    SendTimeout,

    /// A frame write failed.
    #[error("error sending DMX frame: {0}")]
    SendFailure(String),

    /// The transmitter was driven out of order, e.g. started before being opened.
    #[error("transmitter is {actual}, expected {expected}")]
    InvalidState {
        expected: TransmitterState,
        actual: TransmitterState,
    },

    #[error("fps must be between 1 and 44, got {0}")]
    InvalidFps(u32),
}

impl From<io::Error> for DmxError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => DmxError::SendTimeout,
            _ => DmxError::SendFailure(e.to_string()),
        }
    }
}
