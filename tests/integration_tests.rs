/*
 * Integration tests for mbp-fanctl
 *
 * These tests build a fake applesmc hwmon tree on disk and drive the whole
 * controller through it: discovery, config validation, the control loop and
 * the fail-safe release.
 */

use std::fs;
use std::path::Path;
use std::thread;
use std::time::Duration;

use mbp_fanctl::config::Config;
use mbp_fanctl::control::{Actuation, Controller};
use mbp_fanctl::hwmon::discover;
use mbp_fanctl::service::ControllerContext;
use mbp_fanctl::smc::{AttributeIo, SmcDevice, SmcKind};
use mbp_fanctl::supervisor::ShutdownToken;
use mbp_fanctl::{FanctlError, Result};
use tempfile::TempDir;

const CONFIG: &str = r#"{
    "profiles": {
        "AVG": { "floor": 30, "ceiling": 70 },
        "CPU": { "floor": 40, "ceiling": 80 }
    },
    "blacklist": ["Ts0S"],
    "min_temp": 0,
    "min_delta": 0.05,
    "loop_sleep_time": 0.02
}"#;

fn write_sensor(dir: &Path, idx: usize, label: &str, milli: i64) {
    fs::write(dir.join(format!("temp{}_label", idx)), label).unwrap();
    fs::write(dir.join(format!("temp{}_input", idx)), milli.to_string()).unwrap();
}

fn write_fan(dir: &Path, idx: usize) {
    fs::write(dir.join(format!("fan{}_max", idx)), "6200").unwrap();
    fs::write(dir.join(format!("fan{}_min", idx)), "1200").unwrap();
    fs::write(dir.join(format!("fan{}_input", idx)), "1999").unwrap();
    fs::write(dir.join(format!("fan{}_output", idx)), "1200").unwrap();
    fs::write(dir.join(format!("fan{}_manual", idx)), "0").unwrap();
}

/// CPU at 55°C, GPU at 40°C and a blacklisted sensor that would skew the average
fn mock_smc_root() -> TempDir {
    let root = TempDir::new().unwrap();
    let smc = root.path().join("hwmon2").join("device");
    fs::create_dir_all(&smc).unwrap();
    fs::write(smc.join("name"), "applesmc\n").unwrap();
    write_fan(&smc, 1);
    write_fan(&smc, 2);
    write_sensor(&smc, 1, "CPU", 55000);
    write_sensor(&smc, 2, "GPU", 40000);
    write_sensor(&smc, 3, "Ts0S", 95000);
    root
}

fn smc_dir(root: &TempDir) -> std::path::PathBuf {
    root.path().join("hwmon2").join("device")
}

fn read(root: &TempDir, file: &str) -> String {
    fs::read_to_string(smc_dir(root).join(file)).unwrap().trim().to_string()
}

fn context(root: &TempDir) -> ControllerContext<SmcDevice> {
    let cfg = Config::parse(CONFIG).unwrap();
    let inv = discover(root.path(), &cfg.blacklist, cfg.fan_min_speed, cfg.fan_max_speed).unwrap();
    ControllerContext::from_inventory(&cfg, inv).unwrap()
}

/// Wraps the real SMC and raises a signal right after a chosen write.
struct SignalAfterWrite {
    inner: SmcDevice,
    token: ShutdownToken,
    attr: &'static str,
    value: Option<&'static str>,
    fan: &'static str,
}

impl AttributeIo for SignalAfterWrite {
    fn read_attribute(&self, kind: SmcKind, id: &str, attr: &str) -> Result<String> {
        self.inner.read_attribute(kind, id, attr)
    }

    fn write_attribute(&self, kind: SmcKind, id: &str, attr: &str, value: &str) -> Result<()> {
        self.inner.write_attribute(kind, id, attr, value)?;
        if id == self.fan && attr == self.attr && self.value.map_or(true, |v| v == value) {
            self.token.request(libc::SIGTERM);
        }
        Ok(())
    }
}

fn wrapped_context(root: &TempDir, token: ShutdownToken, attr: &'static str, value: Option<&'static str>, fan: &'static str) -> ControllerContext<SignalAfterWrite> {
    let cfg = Config::parse(CONFIG).unwrap();
    let inv = discover(root.path(), &cfg.blacklist, cfg.fan_min_speed, cfg.fan_max_speed).unwrap();
    let io = SignalAfterWrite { inner: inv.smc, token, attr, value, fan };
    ControllerContext::new(io, inv.fans, inv.sensors, &cfg).unwrap()
}

#[test]
fn test_discovery_applies_blacklist() {
    let root = mock_smc_root();
    let ctx = context(&root);
    let labels: Vec<&str> = ctx.sensors.iter().map(|s| s.label.as_str()).collect();
    assert_eq!(labels, vec!["CPU", "GPU"]);
    assert_eq!(ctx.fans.len(), 2);
}

#[test]
fn test_profile_for_blacklisted_sensor_is_rejected() {
    let root = mock_smc_root();
    let data = CONFIG.replace("\"CPU\": { \"floor\": 40", "\"Ts0S\": { \"floor\": 40");
    let cfg = Config::parse(&data).unwrap();
    let inv = discover(root.path(), &cfg.blacklist, cfg.fan_min_speed, cfg.fan_max_speed).unwrap();
    assert!(matches!(
        ControllerContext::from_inventory(&cfg, inv),
        Err(FanctlError::InvalidConfig { .. })
    ));
}

#[test]
fn test_single_cycle_drives_fans() {
    let root = mock_smc_root();
    let ctx = context(&root);
    let mut ctl = Controller::new(ctx.min_delta);
    let token = ShutdownToken::new();

    // AVG: (55 + 40) / 2 = 47.5 -> 0.4375 beats CPU at 0.375
    let out = ctx.run_cycle(&mut ctl, &token).unwrap();
    assert_eq!(out, Actuation::Applied { targets: vec![3843, 3843] });
    assert_eq!(read(&root, "fan1_output"), "3843");
    assert_eq!(read(&root, "fan2_output"), "3843");

    // small drift stays below min_delta
    fs::write(smc_dir(&root).join("temp1_input"), "56000").unwrap();
    let out = ctx.run_cycle(&mut ctl, &token).unwrap();
    assert!(matches!(out, Actuation::Held { .. }));
    assert_eq!(ctl.last_demand(), 0.4375);

    // everything cools below every floor: fans ramp back to the minimum
    fs::write(smc_dir(&root).join("temp1_input"), "20000").unwrap();
    fs::write(smc_dir(&root).join("temp2_input"), "20000").unwrap();
    let out = ctx.run_cycle(&mut ctl, &token).unwrap();
    assert_eq!(out, Actuation::Applied { targets: vec![1000, 1000] });
    assert_eq!(ctl.last_demand(), 0.0);
}

#[test]
fn test_cold_start_does_nothing() {
    let root = mock_smc_root();
    fs::write(smc_dir(&root).join("temp1_input"), "25000").unwrap();
    fs::write(smc_dir(&root).join("temp2_input"), "25000").unwrap();
    let ctx = context(&root);
    let mut ctl = Controller::new(ctx.min_delta);

    let out = ctx.run_cycle(&mut ctl, &ShutdownToken::new()).unwrap();
    assert_eq!(out, Actuation::Held { delta: 0.0 });
    assert_eq!(read(&root, "fan1_output"), "1200");
    assert_eq!(ctl.last_demand(), 0.0);
}

#[test]
fn test_run_until_signal_releases_fans() {
    let root = mock_smc_root();
    let ctx = context(&root);
    let token = ShutdownToken::new();
    let signaller = token.clone();

    let stopper = thread::spawn(move || {
        thread::sleep(Duration::from_millis(200));
        signaller.request(libc::SIGINT);
    });
    let err = ctx.run(&token).unwrap_err();
    stopper.join().unwrap();

    assert!(matches!(err, FanctlError::Interrupted(s) if s == libc::SIGINT));
    assert_eq!(err.exit_code(), libc::SIGINT);
    assert_eq!(read(&root, "fan1_output"), "3843");
    assert_eq!(read(&root, "fan1_manual"), "0");
    assert_eq!(read(&root, "fan2_manual"), "0");
}

#[test]
fn test_signal_before_manual_mode() {
    let root = mock_smc_root();
    let ctx = context(&root);
    let token = ShutdownToken::new();
    token.request(libc::SIGTERM);

    let err = ctx.run(&token).unwrap_err();
    assert_eq!(err.exit_code(), libc::SIGTERM);
    assert_eq!(read(&root, "fan1_manual"), "0");
    assert_eq!(read(&root, "fan2_manual"), "0");
    assert_eq!(read(&root, "fan1_output"), "1200");
}

#[test]
fn test_signal_between_manual_and_first_actuation() {
    let root = mock_smc_root();
    let token = ShutdownToken::new();
    let ctx = wrapped_context(&root, token.clone(), "manual", Some("1"), "2");

    let err = ctx.run(&token).unwrap_err();
    assert!(err.is_interrupt());
    assert_eq!(read(&root, "fan1_output"), "1200");
    assert_eq!(read(&root, "fan2_output"), "1200");
    assert_eq!(read(&root, "fan1_manual"), "0");
    assert_eq!(read(&root, "fan2_manual"), "0");
}

#[test]
fn test_signal_mid_actuation() {
    let root = mock_smc_root();
    let token = ShutdownToken::new();
    let ctx = wrapped_context(&root, token.clone(), "output", None, "1");

    let err = ctx.run(&token).unwrap_err();
    assert!(err.is_interrupt());
    // fan 1 was written, fan 2 never was
    assert_eq!(read(&root, "fan1_output"), "3843");
    assert_eq!(read(&root, "fan2_output"), "1200");
    assert_eq!(read(&root, "fan1_manual"), "0");
    assert_eq!(read(&root, "fan2_manual"), "0");
}

#[test]
fn test_sensor_vanishing_is_fatal_and_releases() {
    let root = mock_smc_root();
    let ctx = context(&root);
    fs::remove_file(smc_dir(&root).join("temp2_input")).unwrap();

    let err = ctx.run(&ShutdownToken::new()).unwrap_err();
    assert!(matches!(err, FanctlError::AttributeRead { .. }));
    assert_eq!(err.exit_code(), 1);
    assert_eq!(read(&root, "fan1_manual"), "0");
    assert_eq!(read(&root, "fan2_manual"), "0");
}

#[test]
fn test_shipped_config_is_valid() {
    let cfg = Config::parse(include_str!("../dist/mbp-fanctl.conf")).unwrap();
    assert!(cfg.profiles.contains_key("AVG"));
    assert_eq!(cfg.loop_interval(), Duration::from_secs(2));
}
