use oec_core::{ClusterConfig, ConfigError, Kilowatts};
use std::io::Write;

#[test]
fn test_round_trip_through_file() {
    let mut config = ClusterConfig::default();
    config.grid.max_delivered_kw = Kilowatts(12_000.0);
    config.platform.steps = 12;

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(config.to_toml().unwrap().as_bytes()).unwrap();

    let loaded = ClusterConfig::from_toml_path(file.path()).unwrap();
    assert_eq!(loaded, config);
}

#[test]
fn test_missing_file_reports_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.toml");
    let err = ClusterConfig::from_toml_path(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
    assert!(err.to_string().contains("absent.toml"));
}

#[test]
fn test_invalid_values_rejected_on_load() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[battery]\nefficiency = 1.5").unwrap();
    let err = ClusterConfig::from_toml_path(file.path()).unwrap_err();
    assert!(err.to_string().contains("battery.efficiency"));
}
