use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use dogbot_follower::config::FollowerConfig;
use dogbot_follower::TurnPolarity;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "FOLLOWER_CONFIG",
        "FOLLOWER_SERVER_ADDR",
        "FOLLOWER_INPUT_URI",
        "FOLLOWER_NETWORK",
        "FOLLOWER_THRESHOLD",
        "FOLLOWER_ERROR_BAND",
        "FOLLOWER_DWELL_MS",
        "FOLLOWER_GRAB_AREA",
        "FOLLOWER_AREA_LOG",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "input": {
            "uri": "detections.jsonl",
            "width": 1920,
            "height": 1080,
            "target_fps": 15,
            "network": "ssd-inception-v2",
            "overlay": "box",
            "threshold": 0.6
        },
        "server": {
            "addr": "10.0.0.7:9000",
            "retry_backoff_ms": 500,
            "heartbeat_interval_ms": 250
        },
        "policy": {
            "error_band": 100,
            "dwell_ms": 300,
            "grab_area": 180000,
            "turn_polarity": "inverted"
        },
        "report_detections": false,
        "area_log": "run/area.txt"
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("FOLLOWER_CONFIG", file.path());
    std::env::set_var("FOLLOWER_SERVER_ADDR", "127.0.0.1:8080");
    std::env::set_var("FOLLOWER_DWELL_MS", "250");

    let cfg = FollowerConfig::load().expect("load config");

    assert_eq!(cfg.input.uri, "detections.jsonl");
    assert_eq!((cfg.input.width, cfg.input.height), (1920, 1080));
    assert_eq!(cfg.input.target_fps, 15);
    assert_eq!(cfg.input.network, "ssd-inception-v2");
    assert_eq!(cfg.input.overlay, "box");
    assert_eq!(cfg.input.detection_threshold, 0.6);
    assert_eq!(cfg.transport.server_addr, "127.0.0.1:8080");
    assert_eq!(cfg.transport.retry_backoff, Duration::from_millis(500));
    assert_eq!(cfg.transport.heartbeat_interval, Duration::from_millis(250));
    assert_eq!(cfg.transport.send_timeout, Duration::from_secs(3));
    assert_eq!(cfg.policy.error_band, 100.0);
    assert_eq!(cfg.policy.dwell, Duration::from_millis(250));
    assert_eq!(cfg.policy.grab_area, Some(180_000.0));
    assert_eq!(cfg.policy.turn_polarity, TurnPolarity::Inverted);
    assert!(!cfg.report_detections);
    assert_eq!(cfg.area_log, Some(PathBuf::from("run/area.txt")));

    clear_env();
}

#[test]
fn loads_toml_config_and_disables_optional_features() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp config");
    let toml = r#"
        area_log = ""

        [server]
        addr = "robot.local:8080"

        [policy]
        error_band = 120.0
        grab_area = 90000.0
    "#;
    std::io::Write::write_all(&mut file, toml.as_bytes()).expect("write config");

    std::env::set_var("FOLLOWER_CONFIG", file.path());
    std::env::set_var("FOLLOWER_GRAB_AREA", "off");

    let cfg = FollowerConfig::load().expect("load config");

    assert_eq!(cfg.transport.server_addr, "robot.local:8080");
    assert_eq!(cfg.policy.error_band, 120.0);
    assert_eq!(cfg.policy.grab_area, None);
    assert_eq!(cfg.policy.dwell, Duration::from_millis(200));
    assert_eq!(cfg.area_log, None);
    assert_eq!(cfg.input.uri, "stub://target");

    clear_env();
}

#[test]
fn rejects_invalid_env_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("FOLLOWER_THRESHOLD", "high");
    assert!(FollowerConfig::load().is_err());
    clear_env();

    std::env::set_var("FOLLOWER_THRESHOLD", "1.5");
    assert!(FollowerConfig::load().is_err());
    clear_env();

    std::env::set_var("FOLLOWER_DWELL_MS", "0");
    assert!(FollowerConfig::load().is_err());

    clear_env();
}
