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

//! Fail-safe supervision of fan ownership.
//!
//! # Safety model
//! - Signal handlers only hand the signal number to a watcher thread, which
//!   records it in the token; neither touches hardware.
//! - The control loop checks the [`ShutdownToken`] before every fan write and
//!   unwinds to the release path as soon as a signal is pending.
//! - [`FanOwnership`] puts every fan back into automatic mode on `release()`,
//!   and from `Drop` on any other way out (early return, panic unwind).
//! - Handlers are installed before the first fan is switched to manual mode.

use std::io;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::thread;

use signal_hook::iterator::Signals;
use tracing::{debug, error, info, warn};

use crate::error::{FanctlError, Result};
use crate::smc::{AttributeIo, Fan};

/// Catchable signals whose default action ends the process.
///
/// Fault signals (SIGSEGV, SIGBUS, SIGFPE, SIGILL, SIGTRAP, SIGSYS, SIGABRT)
/// are raised synchronously by the faulting code and are left alone; stop and
/// ignore-by-default signals do not end the process.
pub fn termination_signals() -> Vec<libc::c_int> {
    let mut signals = vec![
        libc::SIGHUP,
        libc::SIGINT,
        libc::SIGQUIT,
        libc::SIGPIPE,
        libc::SIGALRM,
        libc::SIGTERM,
        libc::SIGUSR1,
        libc::SIGUSR2,
        libc::SIGSTKFLT,
        libc::SIGXCPU,
        libc::SIGXFSZ,
        libc::SIGVTALRM,
        libc::SIGPROF,
        libc::SIGIO,
        libc::SIGPWR,
    ];
    signals.extend(libc::SIGRTMIN()..=libc::SIGRTMAX());
    signals
}

/// Cooperative cancellation flag carrying the terminating signal number.
#[derive(Clone, Debug, Default)]
pub struct ShutdownToken {
    flag: Arc<AtomicI32>,
}

impl ShutdownToken {
    /// Token that only fires through [`ShutdownToken::request`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `signal` unless one is already pending; the first one wins.
    pub fn request(&self, signal: i32) {
        let _ = self.flag.compare_exchange(0, signal, Ordering::SeqCst, Ordering::SeqCst);
    }

    pub fn pending(&self) -> Option<i32> {
        match self.flag.load(Ordering::SeqCst) {
            0 => None,
            signal => Some(signal),
        }
    }

    /// `Err(Interrupted)` once a signal has been recorded.
    pub fn check(&self) -> Result<()> {
        match self.pending() {
            Some(signal) => Err(FanctlError::Interrupted(signal)),
            None => Ok(()),
        }
    }
}

/// Arm the termination handlers and return the token they feed.
///
/// A watcher thread forwards each delivered signal into the token; the
/// handlers themselves never touch hardware.
pub fn install_signal_handlers() -> Result<ShutdownToken> {
    let signals = termination_signals();
    let mut watcher = Signals::new(std::iter::empty::<libc::c_int>())
        .map_err(FanctlError::SignalWatcher)?;
    for &signal in &signals {
        watcher
            .add_signal(signal)
            .map_err(|source| FanctlError::SignalSetup { signal, source })?;
    }

    let token = ShutdownToken::new();
    let forward = token.clone();
    thread::Builder::new()
        .name("signal-watcher".to_string())
        .spawn(move || {
            for signal in watcher.forever() {
                debug!(signal, "Signal received");
                forward.request(signal);
            }
        })
        .map_err(FanctlError::SignalWatcher)?;

    debug!(count = signals.len(), "Signal handlers installed");
    Ok(token)
}

/// Put every fan back under firmware control.
///
/// Keeps going past individual failures so one broken fan cannot strand the
/// others in manual mode; the first error is returned.
pub fn release_all(io: &dyn AttributeIo, fans: &[Fan]) -> Result<()> {
    let mut first_err = None;
    for fan in fans {
        match fan.set_automatic(io) {
            Ok(()) => debug!(fan = %fan.id, "Fan set to automatic"),
            Err(e) => {
                error!(fan = %fan.id, error = %e, "Failed to set fan to automatic");
                first_err.get_or_insert(e);
            }
        }
    }
    match first_err {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Manual-mode ownership of the fans. While this value lives the controller
/// is in the controlling state; dropping it releases the fans.
pub struct FanOwnership<'a> {
    io: &'a dyn AttributeIo,
    fans: &'a [Fan],
    released: bool,
}

impl<'a> FanOwnership<'a> {
    /// Switch every fan to manual mode.
    ///
    /// If a signal arrives or a write fails part-way, the fans already taken
    /// are released before the error is returned.
    pub fn take(io: &'a dyn AttributeIo, fans: &'a [Fan], token: &ShutdownToken) -> Result<Self> {
        let ownership = Self { io, fans, released: false };
        for fan in fans {
            token.check()?;
            fan.set_manual(io)?;
            debug!(fan = %fan.id, "Fan set to manual");
        }
        info!(count = fans.len(), "Took manual control of fans");
        Ok(ownership)
    }

    pub fn fans(&self) -> &[Fan] {
        self.fans
    }

    pub fn release(mut self) -> Result<()> {
        self.released = true;
        let res = release_all(self.io, self.fans);
        if res.is_ok() {
            info!(count = self.fans.len(), "Fans returned to automatic control");
        }
        res
    }
}

impl Drop for FanOwnership<'_> {
    fn drop(&mut self) {
        if !self.released {
            warn!("Fan ownership dropped without release, setting fans to automatic");
            let _ = release_all(self.io, self.fans);
        }
    }
}
