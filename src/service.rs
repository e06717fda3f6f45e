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

use std::convert::Infallible;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, error, info};

use crate::config::Config;
use crate::control::{Actuation, Controller};
use crate::error::Result;
use crate::hwmon::Inventory;
use crate::profile::{self, Profile};
use crate::smc::{AttributeIo, Fan, SmcDevice, TempSensor};
use crate::supervisor::{FanOwnership, ShutdownToken};

/// Longest uninterrupted sleep; bounds how late a signal is noticed
const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Everything the control loop needs, built once at startup.
pub struct ControllerContext<I: AttributeIo> {
    pub io: I,
    pub fans: Vec<Fan>,
    pub sensors: Vec<TempSensor>,
    pub profiles: Vec<Profile>,
    pub min_temp: f64,
    pub min_delta: f64,
    pub interval: Duration,
}

impl ControllerContext<SmcDevice> {
    /// Combine the loaded config with the discovered hardware.
    pub fn from_inventory(config: &Config, inventory: Inventory) -> Result<Self> {
        Self::new(inventory.smc, inventory.fans, inventory.sensors, config)
    }
}

impl<I: AttributeIo> ControllerContext<I> {
    pub fn new(io: I, fans: Vec<Fan>, sensors: Vec<TempSensor>, config: &Config) -> Result<Self> {
        config.validate_against_sensors(&sensors)?;
        Ok(Self {
            io,
            fans,
            sensors,
            profiles: profile::profiles_from_config(config),
            min_temp: config.min_temp,
            min_delta: config.min_delta,
            interval: config.loop_interval(),
        })
    }

    /// Read, select and actuate once.
    pub fn run_cycle(&self, controller: &mut Controller, token: &ShutdownToken) -> Result<Actuation> {
        token.check()?;
        let readings = profile::read_sensors(&self.io, &self.sensors)?;
        let selection = profile::select(&self.profiles, &readings, self.min_temp)?;
        let out = controller.apply(selection.as_ref(), &self.fans, &self.io, token)?;
        if let Actuation::Held { delta } = out {
            debug!(delta, last_demand = controller.last_demand(), "Below hysteresis threshold");
        }
        Ok(out)
    }

    /// Take the fans and drive them until a signal or a fault.
    ///
    /// Never returns `Ok`. Whatever the error, every fan has been handed back
    /// to automatic control by the time it is returned.
    pub fn run(&self, token: &ShutdownToken) -> Result<Infallible> {
        let ownership = FanOwnership::take(&self.io, &self.fans, token)?;
        let mut controller = Controller::new(self.min_delta);
        info!(
            profiles = self.profiles.len(),
            interval_ms = self.interval.as_millis() as u64,
            "Control loop started"
        );

        let err = loop {
            if let Err(e) = self.run_cycle(&mut controller, token) {
                break e;
            }
            if let Err(e) = sleep_until_next_cycle(self.interval, token) {
                break e;
            }
        };

        if err.is_interrupt() {
            info!(reason = %err, "Caught signal, setting fans to automatic");
        } else {
            error!(error = %err, "Control loop failed, setting fans to automatic");
        }
        // The release error is already logged per fan; the cause wins.
        let _ = ownership.release();
        Err(err)
    }
}

/// Sleep for `interval` in short slices, waking early on a pending signal.
pub fn sleep_until_next_cycle(interval: Duration, token: &ShutdownToken) -> Result<()> {
    let deadline = Instant::now() + interval;
    loop {
        token.check()?;
        let now = Instant::now();
        if now >= deadline {
            return Ok(());
        }
        thread::sleep((deadline - now).min(SLEEP_SLICE));
    }
}
