use assert_cmd::cargo::cargo_bin_cmd;
use oec_core::ClusterConfig;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

const SMALL_CLUSTER: &str = r#"
[platform]
horizon = 2.0
steps = 4
finite_elements = 2

[wind_farm]
horizon = 6.0
steps = 4

[scheduler]
horizon = 3.0
steps = 3

[cascade]
scheduler_period = 2
"#;

fn small_config(dir: &Path) -> PathBuf {
    let path = dir.join("cluster.toml");
    fs::write(&path, SMALL_CLUSTER).unwrap();
    path
}

#[test]
fn oec_config_prints_defaults() {
    let output = cargo_bin_cmd!("oec").arg("config").output().unwrap();
    assert!(output.status.success());
    let text = String::from_utf8(output.stdout).unwrap();
    assert!(text.contains("[platform]"));
    assert_eq!(ClusterConfig::from_toml_str(&text).unwrap(), ClusterConfig::default());
}

#[test]
fn oec_config_round_trips_through_file() {
    let dir = tempdir().unwrap();
    let input = small_config(dir.path());
    let written = dir.path().join("effective.toml");

    cargo_bin_cmd!("oec")
        .args(["config", "--config", input.to_str().unwrap(), "-o", written.to_str().unwrap()])
        .assert()
        .success();

    let reloaded = ClusterConfig::from_toml_path(&written).unwrap();
    assert_eq!(reloaded, ClusterConfig::from_toml_str(SMALL_CLUSTER).unwrap());
    assert_eq!(reloaded.platform.steps, 4);
    assert_eq!(reloaded.gtg, ClusterConfig::default().gtg);
}

#[test]
fn oec_rejects_invalid_config() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bad.toml");
    fs::write(&path, "[platform]\nsteps = 1\n").unwrap();

    cargo_bin_cmd!("oec")
        .args(["solve", "platform", "--config", path.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("platform.steps"));
}

#[test]
fn oec_solve_platform_at_rest() {
    let dir = tempdir().unwrap();
    let config = small_config(dir.path());

    let output = cargo_bin_cmd!("oec")
        .args(["solve", "platform", "--config", config.to_str().unwrap()])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let summary: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(summary["layer"], "platform");
    assert_eq!(summary["status"], "optimal");
    assert_eq!(summary["held"], false);
    assert_eq!(summary["action"].as_array().unwrap().len(), 3);
    assert_eq!(summary["state"].as_array().unwrap().len(), 8);
    assert!(summary["solve_time_ms"].as_f64().unwrap() >= 0.0);
}

#[test]
fn oec_solve_rejects_wrong_state_length() {
    let dir = tempdir().unwrap();
    let config = small_config(dir.path());

    cargo_bin_cmd!("oec")
        .args([
            "solve",
            "platform",
            "--config",
            config.to_str().unwrap(),
            "--state",
            "0,0,0",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("expected 8"));
}

#[test]
fn oec_solve_wind_farm_checks_setpoint_count() {
    cargo_bin_cmd!("oec")
        .args(["solve", "wind-farm", "--wind-speed", "10", "--setpoints", "0.1,0.2"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--setpoints expects 5 values, got 2"));
}

#[test]
fn oec_simulate_writes_one_line_per_tick() {
    let dir = tempdir().unwrap();
    let config = small_config(dir.path());
    let out = dir.path().join("ticks.jsonl");

    cargo_bin_cmd!("oec")
        .args([
            "simulate",
            "--config",
            config.to_str().unwrap(),
            "--wind",
            "10,11",
            "--ticks",
            "3",
            "--volume",
            "0.3,0.3",
            "--output",
            out.to_str().unwrap(),
        ])
        .assert()
        .success();

    let contents = fs::read_to_string(&out).unwrap();
    let ticks: Vec<Value> = contents.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
    assert_eq!(ticks.len(), 3);
    let speeds: Vec<f64> = ticks.iter().map(|t| t["wind_speed"].as_f64().unwrap()).collect();
    assert_eq!(speeds, vec![10.0, 11.0, 11.0]);
    for (i, tick) in ticks.iter().enumerate() {
        assert_eq!(tick["tick"], i);
        if i % 2 == 0 {
            assert_eq!(tick["scheduler"]["layer"], "scheduler");
        } else {
            assert!(tick.get("scheduler").is_none());
        }
        assert_eq!(tick["wind_farm"]["layer"], "wind_farm");
        assert_eq!(tick["platforms"].as_array().unwrap().len(), 2);
    }
}
