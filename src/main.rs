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

use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::{error, info};

use mbp_fanctl::config::{config_path, load_config};
use mbp_fanctl::error::{FanctlError, EXIT_FAILURE};
use mbp_fanctl::hwmon::{self, HWMON_DIR};
use mbp_fanctl::service::ControllerContext;
use mbp_fanctl::supervisor::install_signal_handlers;

const VERSION: &str = env!("CARGO_PKG_VERSION");

struct Args {
    config: PathBuf,
    hwmon_dir: PathBuf,
}

fn print_help() {
    eprintln!("mbp-fanctl {} - Apple SMC fan control daemon", VERSION);
    eprintln!();
    eprintln!("USAGE:");
    eprintln!("    mbp-fanctl [OPTIONS]");
    eprintln!();
    eprintln!("OPTIONS:");
    eprintln!("    -c, --config PATH    Config file (default {})", config_path().display());
    eprintln!("        --hwmon-dir PATH hwmon root to scan (default {})", HWMON_DIR);
    eprintln!("    -v, --version        Print version");
    eprintln!("    -h, --help           Print this help");
    eprintln!();
    eprintln!("ENVIRONMENT:");
    eprintln!("    MBP_FANCTL_LOG       Log level (trace, debug, info, warn, error)");
}

fn parse_args() -> Args {
    let argv: Vec<String> = std::env::args().collect();
    let mut args = Args { config: config_path(), hwmon_dir: PathBuf::from(HWMON_DIR) };

    let mut i = 1;
    while i < argv.len() {
        match argv[i].as_str() {
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            "-v" | "--version" => {
                println!("mbp-fanctl {}", VERSION);
                std::process::exit(0);
            }
            flag @ ("-c" | "--config" | "--hwmon-dir") => {
                i += 1;
                let Some(value) = argv.get(i) else {
                    eprintln!("Error: {} requires a path argument", flag);
                    std::process::exit(EXIT_FAILURE);
                };
                if flag == "--hwmon-dir" {
                    args.hwmon_dir = PathBuf::from(value);
                } else {
                    args.config = PathBuf::from(value);
                }
            }
            arg => {
                eprintln!("Unknown argument: {}", arg);
                print_help();
                std::process::exit(EXIT_FAILURE);
            }
        }
        i += 1;
    }
    args
}

/// Journald when running under systemd, stdout otherwise.
fn init_logging() {
    use tracing_subscriber::prelude::*;

    let log_level = std::env::var("MBP_FANCTL_LOG").unwrap_or_else(|_| "info".to_string());

    if Path::new("/run/systemd/journal/socket").exists() {
        match tracing_journald::layer() {
            Ok(journald_layer) => {
                tracing_subscriber::registry()
                    .with(journald_layer)
                    .with(tracing_subscriber::EnvFilter::new(&log_level))
                    .init();
                return;
            }
            Err(e) => eprintln!("Failed to create journald layer: {}, falling back to stdout", e),
        }
    }
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_env_filter(&log_level)
        .init();
}

fn main() {
    let args = parse_args();
    init_logging();
    info!("mbp-fanctl {} starting", VERSION);

    // SAFETY: geteuid has no preconditions and only returns the effective uid.
    if unsafe { libc::geteuid() } != 0 {
        error!("mbp-fanctl requires root privileges to control fans");
        std::process::exit(EXIT_FAILURE);
    }

    if let Err(e) = run(&args) {
        let cause = e.downcast_ref::<FanctlError>();
        if !cause.is_some_and(FanctlError::is_interrupt) {
            error!("{:#}", e);
        }
        std::process::exit(cause.map(FanctlError::exit_code).unwrap_or(EXIT_FAILURE));
    }
}

/// Only returns on failure; fans are back in automatic mode by then.
fn run(args: &Args) -> anyhow::Result<()> {
    let config = load_config(&args.config)
        .with_context(|| format!("loading config {}", args.config.display()))?;
    config.log_summary();

    let inventory = hwmon::discover(&args.hwmon_dir, &config.blacklist, config.fan_min_speed, config.fan_max_speed)
        .context("discovering applesmc")?;
    let ctx = ControllerContext::from_inventory(&config, inventory).context("checking profiles")?;

    // Handlers must be armed before the first fan goes manual.
    let token = install_signal_handlers()?;

    match ctx.run(&token) {
        Ok(never) => match never {},
        Err(e) => Err(e.into()),
    }
}
