use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::shared::constants::{APP_DIR_NAME, CONFIG_FILE_NAME};
use crate::shared::recognition_policy::RecognitionPolicy;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("missing required config value: {0}")]
    Missing(&'static str),
    #[error("service_url must be an http(s) URL, got '{0}'")]
    InvalidUrl(String),
    #[error("invalid recognition policy: {0}")]
    InvalidPolicy(String),
    #[error("could not determine config directory")]
    NoConfigDir,
}

/// Connection settings for a Tello drone command port.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct DeviceSettings {
    /// Drone command address, `192.168.10.1:8889` on the drone's own
    /// access point.
    pub address: String,
    #[serde(default = "default_reply_timeout_ms")]
    pub reply_timeout_ms: u64,
}

fn default_reply_timeout_ms() -> u64 {
    2000
}

/// On-disk layout. Every field is optional so that validation can name
/// exactly which required value is absent.
#[derive(Deserialize)]
struct RawConfig {
    #[serde(default, alias = "FaceKey")]
    subscription_key: Option<String>,
    #[serde(default, alias = "FaceGroupID")]
    person_group_id: Option<String>,
    #[serde(default, alias = "ServiceURL")]
    service_url: Option<String>,
    #[serde(default)]
    policy: RecognitionPolicy,
    #[serde(default)]
    device: Option<DeviceSettings>,
}

/// Validated face service configuration, built once at start-up and passed
/// to the clients that need it.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    pub subscription_key: String,
    pub person_group_id: String,
    /// Base URL without a trailing slash.
    pub service_url: String,
    pub policy: RecognitionPolicy,
    pub device: Option<DeviceSettings>,
}

impl ServiceConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_json(&json)
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_json::from_str(json)?;

        let subscription_key = required(raw.subscription_key, "subscription_key")?;
        let person_group_id = required(raw.person_group_id, "person_group_id")?;
        let service_url = required(raw.service_url, "service_url")?;

        if !(service_url.starts_with("https://") || service_url.starts_with("http://")) {
            return Err(ConfigError::InvalidUrl(service_url));
        }
        raw.policy.validate().map_err(ConfigError::InvalidPolicy)?;

        Ok(Self {
            subscription_key,
            person_group_id,
            service_url: service_url.trim_end_matches('/').to_string(),
            policy: raw.policy,
            device: raw.device,
        })
    }

    /// `<config dir>/FaceSpotter/config.json` for the current platform.
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|d| d.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
            .ok_or(ConfigError::NoConfigDir)
    }
}

fn required(value: Option<String>, name: &'static str) -> Result<String, ConfigError> {
    match value.map(|v| v.trim().to_string()) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ConfigError::Missing(name)),
    }
}
