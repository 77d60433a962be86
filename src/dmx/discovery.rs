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

use serialport::SerialPortType;
use tracing::{debug, info};

use super::error::DmxError;

const FTDI_VID: u16 = 0x0403;
const FT232R_PID: u16 = 0x6001;

/// A serial port as seen by discovery.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PortCandidate {
    pub name: String,
    pub vid: Option<u16>,
    pub pid: Option<u16>,
    pub description: Option<String>,
}

/// How good a match a port is for a DMX interface. Lower ranks are better.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum MatchRank {
    /// An FT232R, the chip behind Enttec Open DMX style interfaces.
    Ft232r = 1,
    /// Any other FTDI device.
    Ftdi = 2,
    /// The device describes itself as DMX.
    DmxDescription = 3,
    /// A generic USB serial device.
    UsbSerial = 4,
    /// A plain COM port. Windows only.
    ComPort = 5,
}

impl fmt::Display for MatchRank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            MatchRank::Ft232r => "FT232R (Open DMX compatible)",
            MatchRank::Ftdi => "FTDI",
            MatchRank::DmxDescription => "DMX device",
            MatchRank::UsbSerial => "USB serial",
            MatchRank::ComPort => "COM port",
        };
        write!(f, "{} ({})", *self as u8, label)
    }
}

impl PortCandidate {
    /// Ranks this candidate on the current platform.
    pub fn rank(&self) -> Option<MatchRank> {
        self.rank_for(cfg!(windows))
    }

    /// Ranks this candidate. Returns None if the port doesn't look like it could be a DMX
    /// interface at all.
    pub fn rank_for(&self, windows: bool) -> Option<MatchRank> {
        let description = self
            .description
            .as_deref()
            .map(str::to_ascii_uppercase)
            .unwrap_or_default();

        if self.vid == Some(FTDI_VID) && self.pid == Some(FT232R_PID) {
            return Some(MatchRank::Ft232r);
        }
        if self.vid == Some(FTDI_VID) || description.contains("FTDI") || description.contains("FT232")
        {
            return Some(MatchRank::Ftdi);
        }
        if description.contains("DMX") {
            return Some(MatchRank::DmxDescription);
        }
        let usb_names = ["ttyUSB", "ttyACM", "usbserial", "usbmodem"];
        if self.vid.is_some() || usb_names.iter().any(|n| self.name.contains(n)) {
            return Some(MatchRank::UsbSerial);
        }
        if windows && self.name.to_ascii_uppercase().starts_with("COM") {
            return Some(MatchRank::ComPort);
        }
        None
    }
}

/// Orders ranked candidates best first. Ties keep their enumeration order.
pub fn ranked(candidates: Vec<PortCandidate>, windows: bool) -> Vec<(MatchRank, PortCandidate)> {
    let mut ranked: Vec<_> = candidates
        .into_iter()
        .filter_map(|c| c.rank_for(windows).map(|rank| (rank, c)))
        .collect();
    ranked.sort_by_key(|(rank, _)| *rank);
    ranked
}

/// Picks the best candidate.
pub fn best_candidate(candidates: Vec<PortCandidate>, windows: bool) -> Option<PortCandidate> {
    ranked(candidates, windows)
        .into_iter()
        .next()
        .map(|(_, candidate)| candidate)
}

/// Enumerates the serial ports on this machine.
pub fn available() -> Vec<PortCandidate> {
    match serialport::available_ports() {
        Ok(ports) => ports
            .into_iter()
            .map(|port| match port.port_type {
                SerialPortType::UsbPort(usb) => {
                    let description = match (usb.manufacturer, usb.product) {
                        (Some(m), Some(p)) => Some(format!("{} {}", m, p)),
                        (m, p) => m.or(p),
                    };
                    PortCandidate {
                        name: port.port_name,
                        vid: Some(usb.vid),
                        pid: Some(usb.pid),
                        description,
                    }
                }
                _ => PortCandidate {
                    name: port.port_name,
                    ..Default::default()
                },
            })
            .collect(),
        Err(e) => {
            debug!(err = e.to_string(), "Unable to enumerate serial ports");
            Vec::new()
        }
    }
}

/// Finds the most likely DMX interface on this machine.
pub fn detect() -> Result<PortCandidate, DmxError> {
    let candidate = best_candidate(available(), cfg!(windows)).ok_or(DmxError::DeviceNotFound)?;
    info!(
        port = candidate.name,
        description = candidate.description.as_deref().unwrap_or(""),
        "Detected DMX interface"
    );
    Ok(candidate)
}

#[cfg(test)]
mod test {
    use super::*;

    fn port(name: &str, vid: Option<u16>, pid: Option<u16>, description: &str) -> PortCandidate {
        PortCandidate {
            name: name.to_string(),
            vid,
            pid,
            description: (!description.is_empty()).then(|| description.to_string()),
        }
    }

    #[test]
    fn test_rank_order() {
        let candidates = vec![
            port("COM3", None, None, ""),
            port("/dev/ttyACM0", None, None, ""),
            port("/dev/ttyS0", None, None, "uDMX interface"),
            port("/dev/ttyUSB1", Some(0x0403), Some(0x6010), ""),
            port("/dev/ttyUSB0", Some(0x0403), Some(0x6001), ""),
            port("/dev/ttyS1", None, None, ""),
        ];

        let names: Vec<_> = ranked(candidates, true)
            .into_iter()
            .map(|(_, c)| c.name)
            .collect();
        assert_eq!(
            vec![
                "/dev/ttyUSB0",
                "/dev/ttyUSB1",
                "/dev/ttyS0",
                "/dev/ttyACM0",
                "COM3"
            ],
            names
        );
    }

    #[test]
    fn test_com_ports_only_on_windows() {
        let com = port("COM3", None, None, "");
        assert_eq!(Some(MatchRank::ComPort), com.rank_for(true));
        assert_eq!(None, com.rank_for(false));
    }

    #[test]
    fn test_description_matching() {
        assert_eq!(
            Some(MatchRank::Ftdi),
            port("/dev/cu.x", None, None, "FT232R USB UART").rank_for(false)
        );
        assert_eq!(
            Some(MatchRank::DmxDescription),
            port("/dev/cu.x", None, None, "Open dmx").rank_for(false)
        );
        assert_eq!(
            Some(MatchRank::UsbSerial),
            port("/dev/cu.usbserial-A1", None, None, "").rank_for(false)
        );
    }

    #[test]
    fn test_no_candidate() {
        assert!(best_candidate(vec![port("/dev/ttyS0", None, None, "")], false).is_none());
        assert!(best_candidate(Vec::new(), true).is_none());
    }
}
