use nodewatch::config::{Config, Parity};
use nodewatch::link::FramingMode;
use tempfile::tempdir;

#[tokio::test]
async fn default_file_round_trips_and_validates() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nodewatch.toml");
    let path = path.to_str().unwrap();

    Config::create_default(path).await.unwrap();
    let config = Config::load(path).await.unwrap();
    config.validate().unwrap();

    assert_eq!(config.serial.baud_rate, 9600);
    assert_eq!(config.monitor.sweep_interval_ms, Some(3000));
    assert_eq!(config.monitor.desync_threshold, 4);

    let task = config.monitor.task_config().unwrap();
    assert_eq!(task.options.registry_capacity, 256);
    assert!(task.sweep_interval.is_some());
}

#[tokio::test]
async fn partial_file_fills_in_defaults() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("partial.toml");
    std::fs::write(
        &path,
        r#"
[serial]
port = "COM4"
parity = "even"

[monitor]
framing = "resync"
registry_capacity = 16
"#,
    )
    .unwrap();

    let config = Config::load(path.to_str().unwrap()).await.unwrap();
    config.validate().unwrap();
    assert_eq!(config.serial.port, "COM4");
    assert_eq!(config.serial.parity, Parity::Even);
    assert_eq!(config.serial.stop_bits, 1);
    assert_eq!(config.monitor.framing, FramingMode::Resync);
    assert_eq!(config.monitor.registry_capacity, 16);
    assert_eq!(config.logging.level, "info");
}

#[tokio::test]
async fn zero_sweep_interval_fails_validation() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bad.toml");
    std::fs::write(&path, "[monitor]\nsweep_interval_ms = 0\n").unwrap();

    let config = Config::load(path.to_str().unwrap()).await.unwrap();
    let err = config.validate().unwrap_err().to_string();
    assert!(err.contains("sweep_interval_ms"), "{err}");
    assert!(config.monitor.task_config().is_err());
}

#[tokio::test]
async fn malformed_toml_is_reported() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("broken.toml");
    std::fs::write(&path, "[serial\nport = ").unwrap();

    let err = Config::load(path.to_str().unwrap()).await.unwrap_err();
    assert!(err.to_string().contains("Failed to parse"));
}

#[tokio::test]
async fn missing_file_is_reported() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("absent.toml");
    let err = Config::load(path.to_str().unwrap()).await.unwrap_err();
    assert!(err.to_string().contains("Failed to read"));
}

#[tokio::test]
async fn missing_file_falls_back_to_defaults() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("absent.toml");
    let config = Config::load_or_default(path.to_str().unwrap()).await.unwrap();
    assert_eq!(config.monitor.registry_capacity, 256);
    assert_eq!(config.monitor.framing, FramingMode::Fixed);
}

#[tokio::test]
async fn broken_file_is_not_replaced_by_defaults() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bad.toml");
    std::fs::write(
        &path,
        "[monitor]\nregistry_capacity = 1\nframing = \"Resync\"\n",
    )
    .unwrap();

    let err = Config::load_or_default(path.to_str().unwrap())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Failed to parse"), "{err}");
}

#[tokio::test]
async fn zero_capacity_loads_but_fails_validation() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("empty_registry.toml");
    std::fs::write(&path, "[monitor]\nregistry_capacity = 0\n").unwrap();

    let config = Config::load_or_default(path.to_str().unwrap()).await.unwrap();
    let err = config.validate().unwrap_err().to_string();
    assert!(err.contains("registry_capacity"), "{err}");
}
