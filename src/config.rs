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
pub mod audio;
pub mod dmx;
pub mod effects;
pub mod error;
pub mod fixture;
pub mod profile;
pub mod show;

pub use self::audio::Audio;
pub use self::dmx::Dmx;
pub use self::effects::Effects;
pub use self::error::ConfigError;
pub use self::fixture::Fixture;
pub use self::profile::{
    builtin_profiles, CapabilityRange, ChannelDef, ChannelFunction, FixtureProfile,
};
pub use self::show::Show;
