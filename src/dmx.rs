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
//! DMX512 output over a serial line.

pub mod break_method;
pub mod discovery;
pub mod error;
pub mod link;
pub mod stats;
pub mod transmitter;
pub mod universe;

pub use self::break_method::BreakMethod;
pub use self::discovery::{MatchRank, PortCandidate};
pub use self::error::DmxError;
pub use self::link::{SerialLink, SerialPortLink, SimulatedLink, SimulatedLinkHandle};
pub use self::stats::TransmitterStats;
pub use self::transmitter::{Transmitter, TransmitterState};
pub use self::universe::{SharedUniverse, Universe, FRAME_SIZE, UNIVERSE_SIZE};
