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

//! Hysteresis and actuation.
//!
//! The controller remembers the last demand it applied. A new demand only
//! reaches the fans once it differs from that by at least `min_delta`; every
//! fan then receives the same normalized demand mapped onto its speed window.

use tracing::info;

use crate::error::Result;
use crate::profile::Selection;
use crate::smc::{AttributeIo, Fan};
use crate::supervisor::ShutdownToken;

/// Profile name reported when nothing is selected and fans ramp down
pub const IDLE_PROFILE: &str = "idle";

#[derive(Debug, Clone, PartialEq)]
pub enum Actuation {
    /// Change below the hysteresis threshold, nothing written
    Held { delta: f64 },
    /// Fans written; one target speed per fan, in fan order
    Applied { targets: Vec<u32> },
}

#[derive(Debug, Clone)]
pub struct Controller {
    last_demand: f64,
    min_delta: f64,
}

impl Controller {
    pub fn new(min_delta: f64) -> Self {
        Self { last_demand: 0.0, min_delta }
    }

    pub fn last_demand(&self) -> f64 {
        self.last_demand
    }

    pub fn min_delta(&self) -> f64 {
        self.min_delta
    }

    /// Apply this cycle's winning profile to every fan.
    ///
    /// `None` means no profile asked for cooling and counts as an idle demand
    /// of 0.0. The token is checked before each fan write; on interruption
    /// `last_demand` is left untouched.
    pub fn apply(
        &mut self,
        selection: Option<&Selection>,
        fans: &[Fan],
        io: &dyn AttributeIo,
        token: &ShutdownToken,
    ) -> Result<Actuation> {
        let demand = selection.map(|s| s.demand).unwrap_or(0.0).clamp(0.0, 1.0);
        let delta = (self.last_demand - demand).abs();
        // Idle only ever ramps down; with nothing to ramp down it is a no-op.
        if delta < self.min_delta || (selection.is_none() && delta == 0.0) {
            return Ok(Actuation::Held { delta });
        }

        info!(
            profile = selection.map(|s| s.profile.as_str()).unwrap_or(IDLE_PROFILE),
            from = self.last_demand,
            to = demand,
            temp = ?selection.map(|s| s.temperature),
            "Acting upon profile"
        );

        let mut targets = Vec::with_capacity(fans.len());
        for fan in fans {
            token.check()?;
            let target = fan.target_speed(demand);
            let current = fan.current_speed(io)?;
            info!(fan = %fan.id, from = current, to = target, "Setting fan speed");
            fan.set_speed(io, target)?;
            targets.push(target);
        }

        self.last_demand = demand;
        Ok(Actuation::Applied { targets })
    }
}
