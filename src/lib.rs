/*
 * This file is part of mbp-fanctl.
 *
 * Copyright (C) 2025 mbp-fanctl contributors
 *
 * mbp-fanctl is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * mbp-fanctl is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with mbp-fanctl. If not, see <https://www.gnu.org/licenses/>.
 */

//! mbp-fanctl - Fan control daemon for Apple SMC hardware on Linux
//!
//! This library reads the SMC temperature sensors through hwmon, turns them
//! into a cooling demand via named profiles, and drives every fan to a
//! matching speed, handing the fans back to the firmware on shutdown.

pub mod error;
pub mod smc;
pub mod hwmon;
pub mod config;
pub mod profile;
pub mod control;
pub mod supervisor;
pub mod service;

pub use error::{FanctlError, Result};
