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

//! Profiles turn temperatures into a normalized cooling demand.
//!
//! A profile either tracks the sensor whose label equals the profile name, or,
//! for the profile named [`AGGREGATE_PROFILE`], averages every sensor at or
//! above the configured minimum temperature. The demand is the position of
//! that temperature between the profile's floor and ceiling, clamped to [0, 1].

use tracing::debug;

use crate::config::Config;
use crate::error::{FanctlError, Result};
use crate::smc::{AttributeIo, TempSensor};

/// Name of the profile that averages all qualifying sensors
pub const AGGREGATE_PROFILE: &str = "AVG";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileKind {
    /// Mean of every sensor at or above `min_temp`
    Aggregate,
    /// The sensor labelled with the profile name
    Sensor,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    pub name: String,
    pub floor: f64,
    pub ceiling: f64,
    pub kind: ProfileKind,
}

impl Profile {
    pub fn new(name: impl Into<String>, floor: f64, ceiling: f64) -> Self {
        let name = name.into();
        let kind = if name == AGGREGATE_PROFILE { ProfileKind::Aggregate } else { ProfileKind::Sensor };
        Self { name, floor, ceiling, kind }
    }
}

/// Profiles in selector order (lexicographic by name).
pub fn profiles_from_config(cfg: &Config) -> Vec<Profile> {
    cfg.profiles
        .iter()
        .map(|(name, b)| Profile::new(name.clone(), b.floor, b.ceiling))
        .collect()
}

/// One sensor's temperature for the current cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorReading {
    pub label: String,
    pub temp: f64,
}

impl SensorReading {
    pub fn new(label: impl Into<String>, temp: f64) -> Self {
        Self { label: label.into(), temp }
    }
}

/// Read every sensor once. Any failing read aborts the cycle.
pub fn read_sensors(io: &dyn AttributeIo, sensors: &[TempSensor]) -> Result<Vec<SensorReading>> {
    sensors
        .iter()
        .map(|s| Ok(SensorReading::new(s.label.clone(), s.temperature(io)?)))
        .collect()
}

pub fn normalize(value: f64, floor: f64, ceiling: f64) -> f64 {
    let window = ceiling - floor;
    // min before max so a NaN ratio lands on full cooling
    ((value - floor) / window).min(1.0).max(0.0)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    pub demand: f64,
    pub temperature: f64,
}

/// Evaluate one profile against this cycle's readings.
///
/// Returns `Ok(None)` when an aggregate profile has no sensor at or above
/// `min_temp`: the profile then contributes no demand this cycle.
pub fn evaluate(profile: &Profile, readings: &[SensorReading], min_temp: f64) -> Result<Option<Evaluation>> {
    let temperature = match profile.kind {
        ProfileKind::Aggregate => {
            let qualifying: Vec<f64> = readings
                .iter()
                .map(|r| r.temp)
                .filter(|t| *t >= min_temp)
                .collect();
            if qualifying.is_empty() {
                debug!(profile = %profile.name, min_temp, "No sensor qualifies for aggregate");
                return Ok(None);
            }
            qualifying.iter().sum::<f64>() / qualifying.len() as f64
        }
        ProfileKind::Sensor => readings
            .iter()
            .find(|r| r.label == profile.name)
            .map(|r| r.temp)
            .ok_or_else(|| {
                FanctlError::invalid_config(
                    format!("profiles.{}", profile.name),
                    "no sensor with this label was found",
                )
            })?,
    };

    Ok(Some(Evaluation {
        demand: normalize(temperature, profile.floor, profile.ceiling),
        temperature,
    }))
}

/// The profile that currently asks for the most cooling.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub profile: String,
    pub demand: f64,
    pub temperature: f64,
}

/// Pick the profile with the highest demand.
///
/// A profile must beat the running maximum strictly, starting from 0.0, so
/// ties go to the earlier profile and a cycle where every demand is 0.0
/// selects nothing.
pub fn select(profiles: &[Profile], readings: &[SensorReading], min_temp: f64) -> Result<Option<Selection>> {
    let mut best: Option<Selection> = None;
    let mut best_demand = 0.0;

    for profile in profiles {
        let Some(eval) = evaluate(profile, readings, min_temp)? else { continue };
        debug!(
            profile = %profile.name,
            demand = eval.demand,
            temp = eval.temperature,
            "Evaluated profile"
        );
        if eval.demand > best_demand {
            best_demand = eval.demand;
            best = Some(Selection {
                profile: profile.name.clone(),
                demand: eval.demand,
                temperature: eval.temperature,
            });
        }
    }
    Ok(best)
}
