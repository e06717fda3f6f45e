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

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::info;

use crate::error::{FanctlError, Result};
use crate::profile::AGGREGATE_PROFILE;
use crate::smc::{TempSensor, DEFAULT_FAN_MAX_SPEED, DEFAULT_FAN_MIN_SPEED};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/mbp-fanctl.conf";

#[derive(Debug, Copy, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ProfileBounds {
    pub floor: f64,
    pub ceiling: f64,
}

fn default_fan_min_speed() -> u32 { DEFAULT_FAN_MIN_SPEED }
fn default_fan_max_speed() -> u32 { DEFAULT_FAN_MAX_SPEED }

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Profile table, ordered by name. The order is the selector's tie-break.
    pub profiles: BTreeMap<String, ProfileBounds>,
    /// Sensor labels ignored at discovery
    #[serde(default)]
    pub blacklist: Vec<String>,
    /// Sensors below this temperature do not count towards the `AVG` profile
    pub min_temp: f64,
    /// Smallest demand change that re-actuates the fans
    pub min_delta: f64,
    /// Seconds between control cycles
    pub loop_sleep_time: f64,
    #[serde(default = "default_fan_min_speed")]
    pub fan_min_speed: u32,
    #[serde(default = "default_fan_max_speed")]
    pub fan_max_speed: u32,
}

pub fn config_path() -> PathBuf {
    PathBuf::from(DEFAULT_CONFIG_PATH)
}

impl Config {
    pub fn parse(data: &str) -> Result<Self> {
        let cfg: Config = serde_json::from_str(data)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn loop_interval(&self) -> Duration {
        Duration::from_secs_f64(self.loop_sleep_time)
    }

    /// Checks that do not need hardware: bounds ordering and scalar ranges.
    pub fn validate(&self) -> Result<()> {
        if self.profiles.is_empty() {
            return Err(FanctlError::invalid_config("profiles", "at least one profile is required"));
        }
        for (name, bounds) in &self.profiles {
            let field = format!("profiles.{}", name);
            if name.is_empty() {
                return Err(FanctlError::invalid_config("profiles", "profile name must not be empty"));
            }
            if !(bounds.floor.is_finite() && bounds.ceiling.is_finite()) {
                return Err(FanctlError::invalid_config(field, "floor and ceiling must be finite"));
            }
            if bounds.ceiling <= bounds.floor {
                return Err(FanctlError::invalid_config(
                    field,
                    format!("ceiling ({}) must be greater than floor ({})", bounds.ceiling, bounds.floor),
                ));
            }
        }
        if !self.min_temp.is_finite() {
            return Err(FanctlError::invalid_config("min_temp", "must be finite"));
        }
        if !(self.min_delta.is_finite() && self.min_delta >= 0.0) {
            return Err(FanctlError::invalid_config("min_delta", "must be a non-negative number"));
        }
        if !(self.loop_sleep_time.is_finite() && self.loop_sleep_time > 0.0) {
            return Err(FanctlError::invalid_config("loop_sleep_time", "must be a positive number of seconds"));
        }
        if self.fan_min_speed >= self.fan_max_speed {
            return Err(FanctlError::invalid_config(
                "fan_min_speed",
                format!("must be below fan_max_speed ({})", self.fan_max_speed),
            ));
        }
        Ok(())
    }

    /// Every tracking profile must name a discovered, non-blacklisted sensor.
    pub fn validate_against_sensors(&self, sensors: &[TempSensor]) -> Result<()> {
        for name in self.profiles.keys() {
            if name == AGGREGATE_PROFILE {
                continue;
            }
            if !sensors.iter().any(|s| &s.label == name) {
                return Err(FanctlError::invalid_config(
                    format!("profiles.{}", name),
                    "no sensor with this label was found",
                ));
            }
        }
        Ok(())
    }

    pub fn log_summary(&self) {
        info!(
            count = self.profiles.len(),
            profiles = ?self.profiles.keys().collect::<Vec<_>>(),
            "Loaded profiles"
        );
        info!(count = self.blacklist.len(), blacklist = ?self.blacklist, "Loaded blacklist");
        info!(
            min_temp = self.min_temp,
            min_delta = self.min_delta,
            loop_sleep_time = self.loop_sleep_time,
            fan_min_speed = self.fan_min_speed,
            fan_max_speed = self.fan_max_speed,
            "Loaded settings"
        );
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let data = fs::read_to_string(path).map_err(|source| FanctlError::ConfigRead {
        path: path.to_path_buf(),
        source,
    })?;
    Config::parse(&data)
}
