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

//! Unified error handling for mbp-fanctl
//!
//! Every fallible operation in the crate returns [`FanctlError`]. The variants
//! follow the failure taxonomy of the controller: discovery, configuration,
//! attribute I/O and cancellation.

use std::io;
use std::path::PathBuf;

/// Result type alias using FanctlError
pub type Result<T> = std::result::Result<T, FanctlError>;

/// Exit status for every fatal condition that is not a signal
pub const EXIT_FAILURE: i32 = 1;

#[derive(thiserror::Error, Debug)]
pub enum FanctlError {
    // ============================================================================
    // Discovery Errors
    // ============================================================================
    #[error("Unable to find applesmc under {0}, is the module loaded?")]
    SmcNotFound(PathBuf),

    #[error("Unable to find any fans in {0}")]
    NoFans(PathBuf),

    #[error("Unable to find any sensors in {0}")]
    NoSensors(PathBuf),

    // ============================================================================
    // Attribute I/O Errors
    // ============================================================================
    #[error("Failed to read {path}: {source}")]
    AttributeRead {
        path: PathBuf,
        source: io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    AttributeWrite {
        path: PathBuf,
        source: io::Error,
    },

    #[error("Unexpected value {value:?} in {path}")]
    AttributeParse {
        path: PathBuf,
        value: String,
    },

    // ============================================================================
    // Configuration Errors
    // ============================================================================
    #[error("Failed to read config {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        source: io::Error,
    },

    #[error("Failed to parse config: {0}")]
    ConfigParse(#[from] serde_json::Error),

    #[error("Invalid configuration value for {field}: {reason}")]
    InvalidConfig {
        field: String,
        reason: String,
    },

    // ============================================================================
    // Lifecycle
    // ============================================================================
    #[error("Interrupted by signal {0}")]
    Interrupted(i32),

    #[error("Failed to install handler for signal {signal}: {source}")]
    SignalSetup {
        signal: i32,
        source: io::Error,
    },

    #[error("Failed to start signal watcher: {0}")]
    SignalWatcher(#[source] io::Error),
}

impl FanctlError {
    /// Create an invalid configuration error
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Process exit status for this error.
    ///
    /// A signal-triggered shutdown propagates the signal number; everything
    /// else is a plain failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Interrupted(signal) => *signal,
            _ => EXIT_FAILURE,
        }
    }

    pub fn is_interrupt(&self) -> bool {
        matches!(self, Self::Interrupted(_))
    }
}
