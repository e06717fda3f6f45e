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

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{FanctlError, Result};
use crate::smc::{Fan, SmcDevice, TempSensor};

pub const HWMON_DIR: &str = "/sys/class/hwmon";
pub const SMC_DRIVER_NAME: &str = "applesmc";

/// Everything the controller takes over at startup.
#[derive(Debug, Clone)]
pub struct Inventory {
    pub smc: SmcDevice,
    pub fans: Vec<Fan>,
    pub sensors: Vec<TempSensor>,
}

fn read_trimmed<P: AsRef<Path>>(p: P) -> io::Result<String> {
    let mut s = String::new();
    fs::File::open(p)?.read_to_string(&mut s)?;
    Ok(s.trim().to_string())
}

pub fn extract_index(fname: &str, prefix: &str, suffix: &str) -> Option<usize> {
    if fname.starts_with(prefix) && fname.ends_with(suffix) && fname.len() > prefix.len() + suffix.len() {
        let mid = &fname[prefix.len()..fname.len() - suffix.len()];
        mid.parse().ok()
    } else {
        None
    }
}

/// Sorted indices of every `<prefix>N<suffix>` file in `dir`.
fn indices_with(dir: &Path, prefix: &str, suffix: &str) -> io::Result<Vec<usize>> {
    let mut out: Vec<usize> = fs::read_dir(dir)?
        .flatten()
        .filter_map(|ent| extract_index(&ent.file_name().to_string_lossy(), prefix, suffix))
        .collect();
    out.sort_unstable();
    out.dedup();
    Ok(out)
}

/// Locate the applesmc attribute directory below a hwmon root.
///
/// Older kernels expose the driver name in `hwmonX/device/name`, newer ones
/// in `hwmonX/name`; the directory holding the matching `name` file is the
/// one carrying the fan and temperature attributes.
pub fn find_smc_path(root: &Path) -> Option<PathBuf> {
    let mut entries: Vec<PathBuf> = fs::read_dir(root)
        .ok()?
        .flatten()
        .map(|ent| ent.path())
        .filter(|p| {
            p.file_name()
                .and_then(|s| s.to_str())
                .map(|s| s.starts_with("hwmon"))
                .unwrap_or(false)
        })
        .collect();
    entries.sort();

    for hwmon in entries {
        for dir in [hwmon.join("device"), hwmon.clone()] {
            match read_trimmed(dir.join("name")) {
                Ok(name) if name == SMC_DRIVER_NAME => return Some(dir),
                Ok(name) => debug!(path = %dir.display(), name = %name, "Skipping hwmon chip"),
                Err(_) => {}
            }
        }
    }
    None
}

/// Enumerate fans from their `fanN_max` attributes.
pub fn get_fans(smc: &SmcDevice, min_speed: u32, max_speed: u32) -> Result<Vec<Fan>> {
    let indices = indices_with(smc.path(), "fan", "_max").map_err(|source| FanctlError::AttributeRead {
        path: smc.path().to_path_buf(),
        source,
    })?;
    Ok(indices
        .into_iter()
        .map(|idx| Fan::with_bounds(idx.to_string(), min_speed, max_speed))
        .collect())
}

/// Enumerate sensors from their `tempN_label` attributes, dropping blacklisted labels.
///
/// Each kept sensor is read once so an unreadable sensor fails at startup
/// instead of in the middle of the control loop.
pub fn get_sensors(smc: &SmcDevice, blacklist: &[String]) -> Result<Vec<TempSensor>> {
    let indices = indices_with(smc.path(), "temp", "_label").map_err(|source| FanctlError::AttributeRead {
        path: smc.path().to_path_buf(),
        source,
    })?;

    let mut sensors = Vec::new();
    for idx in indices {
        let sensor = TempSensor::probe(smc, idx.to_string())?;
        if blacklist.iter().any(|b| b == &sensor.label) {
            info!(sensor = %sensor.label, "Ignoring sensor because of blacklist");
            continue;
        }
        let temp = sensor.temperature(smc)?;
        debug!(sensor = %sensor.label, id = %sensor.id, temp, "Found sensor");
        sensors.push(sensor);
    }
    Ok(sensors)
}

/// Find the SMC and enumerate its fans and sensors.
pub fn discover(root: &Path, blacklist: &[String], min_speed: u32, max_speed: u32) -> Result<Inventory> {
    let path = find_smc_path(root).ok_or_else(|| FanctlError::SmcNotFound(root.to_path_buf()))?;
    info!(path = %path.display(), "Found applesmc");
    let smc = SmcDevice::new(path);

    let fans = get_fans(&smc, min_speed, max_speed)?;
    if fans.is_empty() {
        return Err(FanctlError::NoFans(smc.path().to_path_buf()));
    }
    info!(count = fans.len(), "Found fans");

    let sensors = get_sensors(&smc, blacklist)?;
    if sensors.is_empty() {
        return Err(FanctlError::NoSensors(smc.path().to_path_buf()));
    }
    info!(count = sensors.len(), "Found sensors");

    Ok(Inventory { smc, fans, sensors })
}
