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
/// Errors raised while capturing or analyzing audio.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    /// Not enough audio has been collected for the heavy tempo estimate yet. Callers skip the
    /// refresh and try again later.
    #[error("need {need} samples for tempo analysis, have {have}")]
    InsufficientAudioBuffer { have: usize, need: usize },

    #[error("no audio input device found")]
    NoInputDevice,

    /// The capture stream couldn't be created or failed while running.
    #[error("audio stream error: {0}")]
    Stream(String),
}
