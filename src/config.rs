use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::area_log::DEFAULT_AREA_LOG_PATH;
use crate::ingest::{
    SourceSettings, DEFAULT_DETECTION_THRESHOLD, DEFAULT_FRAME_HEIGHT, DEFAULT_FRAME_WIDTH,
    DEFAULT_NETWORK, DEFAULT_OVERLAY, DEFAULT_TARGET_FPS,
};
use crate::policy::{PolicyConfig, TurnPolarity, DEFAULT_DWELL, DEFAULT_ERROR_BAND};
use crate::transport::{
    TransportConfig, DEFAULT_CONNECT_TIMEOUT, DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_RECV_TIMEOUT,
    DEFAULT_RETRY_BACKOFF, DEFAULT_SEND_TIMEOUT, DEFAULT_SERVER_ADDR,
};

const DEFAULT_INPUT_URI: &str = "stub://target";

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct FollowerConfigFile {
    input: Option<InputConfigFile>,
    server: Option<ServerConfigFile>,
    policy: Option<PolicyConfigFile>,
    report_detections: Option<bool>,
    area_log: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct InputConfigFile {
    uri: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    target_fps: Option<u32>,
    network: Option<String>,
    overlay: Option<String>,
    threshold: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ServerConfigFile {
    addr: Option<String>,
    connect_timeout_ms: Option<u64>,
    retry_backoff_ms: Option<u64>,
    send_timeout_ms: Option<u64>,
    recv_timeout_ms: Option<u64>,
    heartbeat_interval_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PolicyConfigFile {
    error_band: Option<f32>,
    dwell_ms: Option<u64>,
    grab_area: Option<f32>,
    turn_polarity: Option<TurnPolarity>,
}

/// Runtime configuration for the `follower` daemon.
///
/// Layering: defaults, then the file named by `FOLLOWER_CONFIG` (JSON, or
/// TOML for a `.toml` extension), then `FOLLOWER_*` environment variables.
/// Command-line flags are applied on top by the binary.
#[derive(Debug, Clone)]
pub struct FollowerConfig {
    pub input: SourceSettings,
    pub transport: TransportConfig,
    pub policy: PolicyConfig,
    pub report_detections: bool,
    /// `None` disables the area log.
    pub area_log: Option<PathBuf>,
}

impl FollowerConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("FOLLOWER_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from an explicit file, still honouring environment overrides.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut cfg = Self::from_file(read_config_file(path)?);
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: FollowerConfigFile) -> Self {
        let input = file.input.unwrap_or_default();
        let server = file.server.unwrap_or_default();
        let policy = file.policy.unwrap_or_default();
        Self {
            input: SourceSettings {
                uri: input.uri.unwrap_or_else(|| DEFAULT_INPUT_URI.to_string()),
                width: input.width.unwrap_or(DEFAULT_FRAME_WIDTH),
                height: input.height.unwrap_or(DEFAULT_FRAME_HEIGHT),
                target_fps: input.target_fps.unwrap_or(DEFAULT_TARGET_FPS),
                detection_threshold: input.threshold.unwrap_or(DEFAULT_DETECTION_THRESHOLD),
                network: input.network.unwrap_or_else(|| DEFAULT_NETWORK.to_string()),
                overlay: input.overlay.unwrap_or_else(|| DEFAULT_OVERLAY.to_string()),
            },
            transport: TransportConfig {
                server_addr: server
                    .addr
                    .unwrap_or_else(|| DEFAULT_SERVER_ADDR.to_string()),
                connect_timeout: millis_or(server.connect_timeout_ms, DEFAULT_CONNECT_TIMEOUT),
                retry_backoff: millis_or(server.retry_backoff_ms, DEFAULT_RETRY_BACKOFF),
                send_timeout: millis_or(server.send_timeout_ms, DEFAULT_SEND_TIMEOUT),
                recv_timeout: millis_or(server.recv_timeout_ms, DEFAULT_RECV_TIMEOUT),
                heartbeat_interval: millis_or(
                    server.heartbeat_interval_ms,
                    DEFAULT_HEARTBEAT_INTERVAL,
                ),
            },
            policy: PolicyConfig {
                error_band: policy.error_band.unwrap_or(DEFAULT_ERROR_BAND),
                dwell: millis_or(policy.dwell_ms, DEFAULT_DWELL),
                grab_area: policy.grab_area,
                turn_polarity: policy.turn_polarity.unwrap_or_default(),
            },
            report_detections: file.report_detections.unwrap_or(true),
            area_log: match file.area_log {
                Some(path) if path.trim().is_empty() => None,
                Some(path) => Some(PathBuf::from(path)),
                None => Some(PathBuf::from(DEFAULT_AREA_LOG_PATH)),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(addr) = env_nonempty("FOLLOWER_SERVER_ADDR") {
            self.transport.server_addr = addr;
        }
        if let Some(uri) = env_nonempty("FOLLOWER_INPUT_URI") {
            self.input.uri = uri;
        }
        if let Some(network) = env_nonempty("FOLLOWER_NETWORK") {
            self.input.network = network;
        }
        if let Some(threshold) = env_nonempty("FOLLOWER_THRESHOLD") {
            self.input.detection_threshold = threshold
                .parse()
                .map_err(|_| anyhow!("FOLLOWER_THRESHOLD must be a number between 0 and 1"))?;
        }
        if let Some(band) = env_nonempty("FOLLOWER_ERROR_BAND") {
            self.policy.error_band = band
                .parse()
                .map_err(|_| anyhow!("FOLLOWER_ERROR_BAND must be a number of pixels"))?;
        }
        if let Some(dwell) = env_nonempty("FOLLOWER_DWELL_MS") {
            let ms: u64 = dwell
                .parse()
                .map_err(|_| anyhow!("FOLLOWER_DWELL_MS must be an integer number of milliseconds"))?;
            self.policy.dwell = Duration::from_millis(ms);
        }
        if let Ok(area) = std::env::var("FOLLOWER_GRAB_AREA") {
            self.policy.grab_area = match area.trim() {
                "" | "off" | "none" => None,
                value => Some(
                    value
                        .parse()
                        .map_err(|_| anyhow!("FOLLOWER_GRAB_AREA must be an area in px² or 'off'"))?,
                ),
            };
        }
        if let Ok(path) = std::env::var("FOLLOWER_AREA_LOG") {
            self.area_log = match path.trim() {
                "" | "off" => None,
                value => Some(PathBuf::from(value)),
            };
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.transport.server_addr.trim().is_empty() {
            return Err(anyhow!("server address must not be empty"));
        }
        if self.input.width == 0 || self.input.height == 0 {
            return Err(anyhow!("frame width and height must be greater than zero"));
        }
        if !(0.0..=1.0).contains(&self.input.detection_threshold) {
            return Err(anyhow!("detection threshold must be within 0..=1"));
        }
        if !(self.policy.error_band.is_finite() && self.policy.error_band >= 0.0) {
            return Err(anyhow!("error band must be a non-negative number of pixels"));
        }
        if self.policy.dwell.is_zero() {
            return Err(anyhow!("dwell interval must be greater than zero"));
        }
        if let Some(area) = self.policy.grab_area {
            if !(area.is_finite() && area > 0.0) {
                return Err(anyhow!("grab area must be greater than zero"));
            }
        }
        for (name, value) in [
            ("connect timeout", self.transport.connect_timeout),
            ("send timeout", self.transport.send_timeout),
            ("receive timeout", self.transport.recv_timeout),
            ("heartbeat interval", self.transport.heartbeat_interval),
        ] {
            if value.is_zero() {
                return Err(anyhow!("{} must be greater than zero", name));
            }
        }
        Ok(())
    }
}

impl Default for FollowerConfig {
    fn default() -> Self {
        Self::from_file(FollowerConfigFile::default())
    }
}

fn read_config_file(path: &Path) -> Result<FollowerConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg: FollowerConfigFile = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn millis_or(value: Option<u64>, default: Duration) -> Duration {
    value.map(Duration::from_millis).unwrap_or(default)
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_field_setup() {
        let cfg = FollowerConfig::default();
        assert_eq!(cfg.transport.server_addr, "192.168.50.100:8080");
        assert_eq!(cfg.transport.retry_backoff, Duration::from_secs(3));
        assert_eq!(cfg.transport.heartbeat_interval, Duration::from_millis(200));
        assert_eq!(cfg.policy.error_band, 150.0);
        assert_eq!(cfg.policy.dwell, Duration::from_millis(200));
        assert_eq!(cfg.policy.grab_area, None);
        assert_eq!((cfg.input.width, cfg.input.height), (1280, 720));
        assert_eq!(cfg.area_log, Some(PathBuf::from("area.txt")));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn validate_rejects_out_of_range_values() {
        let mut cfg = FollowerConfig::default();
        cfg.input.detection_threshold = 1.5;
        assert!(cfg.validate().is_err());

        let mut cfg = FollowerConfig::default();
        cfg.policy.dwell = Duration::ZERO;
        assert!(cfg.validate().is_err());

        let mut cfg = FollowerConfig::default();
        cfg.transport.server_addr = " ".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn unknown_file_keys_are_rejected() {
        let parsed: std::result::Result<FollowerConfigFile, _> =
            serde_json::from_str(r#"{"servr": {"addr": "x"}}"#);
        assert!(parsed.is_err());
    }
}
