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
use crate::audio::AnalysisError;
use crate::config::ConfigError;
use crate::dmx::DmxError;

/// Errors raised while assembling or driving a show.
#[derive(Debug, thiserror::Error)]
pub enum ShowError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Dmx(#[from] DmxError),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error("show is already running")]
    AlreadyRunning,
}
