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
use std::io;
use std::time::Duration;

use super::link::SerialLink;

/// The DMX512 line rate.
pub const DMX_BAUD: u32 = 250_000;

/// The baud rate used to stretch a single 0x00 byte into a break. Nine low bit-times at this
/// rate is roughly 117us.
pub const BREAK_BAUD: u32 = 76_800;

/// The break length we emit. The standard minimum is 88us.
pub const BREAK_DURATION: Duration = Duration::from_micros(176);

/// The mark-after-break length we emit. The standard minimum is 8us.
pub const MARK_AFTER_BREAK: Duration = Duration::from_micros(12);

/// Shortest break a receiver is required to accept.
pub const MIN_BREAK: Duration = Duration::from_micros(88);

/// The ways a break can be put on the line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BreakMethod {
    /// Drop the baud rate and send a zero byte. Works on nearly every adapter.
    BaudRateSwitch,
    /// Assert the break condition directly and time it ourselves.
    BreakCondition,
    /// The port's own timed break. Coarse, usually a millisecond or more.
    BreakFunction,
}

impl fmt::Display for BreakMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BreakMethod::BaudRateSwitch => "baud rate switch",
            BreakMethod::BreakCondition => "break condition",
            BreakMethod::BreakFunction => "break function",
        })
    }
}

impl BreakMethod {
    /// Probe order for the platform we're running on.
    pub fn platform_priority() -> [BreakMethod; 3] {
        Self::priority_for(cfg!(target_os = "linux"))
    }

    /// Probe order: Linux handles the break condition reliably, elsewhere the baud rate switch
    /// is the safer first choice.
    pub fn priority_for(linux: bool) -> [BreakMethod; 3] {
        if linux {
            [
                BreakMethod::BreakCondition,
                BreakMethod::BaudRateSwitch,
                BreakMethod::BreakFunction,
            ]
        } else {
            [
                BreakMethod::BaudRateSwitch,
                BreakMethod::BreakCondition,
                BreakMethod::BreakFunction,
            ]
        }
    }

    /// Puts a break followed by a mark-after-break on the line. On return the link is back at
    /// the DMX baud rate and ready for the start code.
    pub fn generate(self, link: &mut dyn SerialLink) -> io::Result<()> {
        match self {
            BreakMethod::BaudRateSwitch => {
                link.set_baud_rate(BREAK_BAUD)?;
                let result = link.write_all(&[0x00]).and_then(|_| link.flush());
                // Always try to get back to line rate, even if the write failed.
                let restored = link.set_baud_rate(DMX_BAUD);
                result?;
                restored?;
            }
            BreakMethod::BreakCondition => {
                link.set_break()?;
                spin_sleep::sleep(BREAK_DURATION);
                link.clear_break()?;
            }
            BreakMethod::BreakFunction => link.timed_break(BREAK_DURATION)?,
        }
        spin_sleep::sleep(MARK_AFTER_BREAK);
        Ok(())
    }
}
