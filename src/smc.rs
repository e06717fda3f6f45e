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

//! Attribute access for the SMC fans and temperature sensors.
//!
//! Fans and sensors are plain data. All hardware access goes through the
//! [`AttributeIo`] trait, which the sysfs-backed [`SmcDevice`] implements.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::error::{FanctlError, Result};

/// Lowest speed the controller will ever request, in RPM
pub const DEFAULT_FAN_MIN_SPEED: u32 = 1000;
/// Highest speed the controller will ever request, in RPM
pub const DEFAULT_FAN_MAX_SPEED: u32 = 7500;

/// Sensor `input` attributes are reported in millidegrees Celsius
const MILLIDEGREES_PER_DEGREE: f64 = 1000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmcKind {
    Fan,
    Temp,
}

impl SmcKind {
    pub fn prefix(self) -> &'static str {
        match self {
            SmcKind::Fan => "fan",
            SmcKind::Temp => "temp",
        }
    }
}

/// Read/write access to one named attribute of a fan or sensor.
#[cfg_attr(test, mockall::automock)]
pub trait AttributeIo {
    fn read_attribute(&self, kind: SmcKind, id: &str, attr: &str) -> Result<String>;
    fn write_attribute(&self, kind: SmcKind, id: &str, attr: &str, value: &str) -> Result<()>;
}

/// An applesmc hwmon directory, e.g. `/sys/class/hwmon/hwmon3/device`.
#[derive(Debug, Clone)]
pub struct SmcDevice {
    path: PathBuf,
}

impl SmcDevice {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn attribute_path(&self, kind: SmcKind, id: &str, attr: &str) -> PathBuf {
        self.path.join(format!("{}{}_{}", kind.prefix(), id, attr))
    }
}

impl AttributeIo for SmcDevice {
    fn read_attribute(&self, kind: SmcKind, id: &str, attr: &str) -> Result<String> {
        let path = self.attribute_path(kind, id, attr);
        let mut s = String::new();
        fs::File::open(&path)
            .and_then(|mut f| f.read_to_string(&mut s))
            .map_err(|source| FanctlError::AttributeRead { path, source })?;
        Ok(s.trim().to_string())
    }

    fn write_attribute(&self, kind: SmcKind, id: &str, attr: &str, value: &str) -> Result<()> {
        let path = self.attribute_path(kind, id, attr);
        fs::write(&path, value).map_err(|source| FanctlError::AttributeWrite { path, source })
    }
}

fn parse_attribute<T: std::str::FromStr>(
    io: &dyn AttributeIo,
    kind: SmcKind,
    id: &str,
    attr: &str,
) -> Result<T> {
    let raw = io.read_attribute(kind, id, attr)?;
    raw.parse::<T>().map_err(|_| FanctlError::AttributeParse {
        path: PathBuf::from(format!("{}{}_{}", kind.prefix(), id, attr)),
        value: raw,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct Fan {
    pub id: String,
    pub min_speed: u32,
    pub max_speed: u32,
}

impl Fan {
    pub fn new(id: impl Into<String>) -> Self {
        Self::with_bounds(id, DEFAULT_FAN_MIN_SPEED, DEFAULT_FAN_MAX_SPEED)
    }

    pub fn with_bounds(id: impl Into<String>, min_speed: u32, max_speed: u32) -> Self {
        Self { id: id.into(), min_speed, max_speed }
    }

    /// Map a normalized demand onto this fan's speed window.
    pub fn target_speed(&self, demand: f64) -> u32 {
        let min = self.min_speed as f64;
        let max = self.max_speed as f64;
        let target = min + (max - min) * demand;
        // NaN falls through clamp unchanged, the cast then saturates it to 0
        // and the integer clamp lifts it back to min_speed.
        (target.clamp(min, max) as u32).clamp(self.min_speed, self.max_speed)
    }

    pub fn current_speed(&self, io: &dyn AttributeIo) -> Result<u32> {
        parse_attribute(io, SmcKind::Fan, &self.id, "input")
    }

    pub fn set_speed(&self, io: &dyn AttributeIo, speed: u32) -> Result<()> {
        io.write_attribute(SmcKind::Fan, &self.id, "output", &speed.to_string())
    }

    pub fn set_manual(&self, io: &dyn AttributeIo) -> Result<()> {
        io.write_attribute(SmcKind::Fan, &self.id, "manual", "1")
    }

    pub fn set_automatic(&self, io: &dyn AttributeIo) -> Result<()> {
        io.write_attribute(SmcKind::Fan, &self.id, "manual", "0")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TempSensor {
    pub id: String,
    pub label: String,
}

impl TempSensor {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self { id: id.into(), label: label.into() }
    }

    /// Build a sensor from its index, reading the label from the SMC.
    pub fn probe(io: &dyn AttributeIo, id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        let label = io.read_attribute(SmcKind::Temp, &id, "label")?;
        Ok(Self { id, label })
    }

    /// Current temperature in degrees Celsius.
    pub fn temperature(&self, io: &dyn AttributeIo) -> Result<f64> {
        let milli: i64 = parse_attribute(io, SmcKind::Temp, &self.id, "input")?;
        Ok(milli as f64 / MILLIDEGREES_PER_DEGREE)
    }
}
