use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use serde_yaml;
use anyhow::{anyhow, Context, Result};
use dotenvy::dotenv;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000/api/";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 200;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_TANK_CAPACITY: f64 = 200.0;
pub const DEFAULT_DISPLAY_RANGE: f64 = 200.0;
pub const DEFAULT_TRANSITION_MS: u64 = 200;
pub const DEFAULT_STOP_TAG_ID: i64 = 1;
pub const DEFAULT_STOP_VALUE: f64 = 0.0;
pub const DEFAULT_WINDOW_TITLE: &str = "Kora SCADA HMI";

/// Name of the settings file looked up next to Cargo.toml when no --config is given.
pub const SETTINGS_FILE_NAME: &str = "kora_hmi.yaml";

/// Resolved runtime settings for one HMI station.
#[derive(Debug, Clone, PartialEq)]
pub struct HmiSettings {
    pub base_url: String,
    pub poll_interval_ms: u64,
    pub request_timeout_ms: u64,
    pub tank_capacity: f64,
    pub display_range: f64,
    pub transition_ms: u64,
    pub stop_tag_id: i64,
    pub stop_value: f64,
    pub window_title: String,
}

impl Default for HmiSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            tank_capacity: DEFAULT_TANK_CAPACITY,
            display_range: DEFAULT_DISPLAY_RANGE,
            transition_ms: DEFAULT_TRANSITION_MS,
            stop_tag_id: DEFAULT_STOP_TAG_ID,
            stop_value: DEFAULT_STOP_VALUE,
            window_title: DEFAULT_WINDOW_TITLE.to_string(),
        }
    }
}

impl HmiSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn transition(&self) -> Duration {
        Duration::from_millis(self.transition_ms)
    }

    /// Reject settings the gauge or poller cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(anyhow!("base_url must not be empty"));
        }
        if self.poll_interval_ms == 0 {
            return Err(anyhow!("poll_interval_ms must be greater than zero"));
        }
        if self.request_timeout_ms == 0 {
            return Err(anyhow!("request_timeout_ms must be greater than zero"));
        }
        if !(self.tank_capacity.is_finite() && self.tank_capacity > 0.0) {
            return Err(anyhow!("tank_capacity must be a positive number, got {}", self.tank_capacity));
        }
        if !(self.display_range.is_finite() && self.display_range > 0.0) {
            return Err(anyhow!("display_range must be a positive number, got {}", self.display_range));
        }
        Ok(())
    }

    fn apply(&mut self, overrides: &SettingsOverrides) {
        if let Some(v) = &overrides.base_url { self.base_url = v.clone(); }
        if let Some(v) = overrides.poll_interval_ms { self.poll_interval_ms = v; }
        if let Some(v) = overrides.request_timeout_ms { self.request_timeout_ms = v; }
        if let Some(v) = overrides.tank_capacity { self.tank_capacity = v; }
        if let Some(v) = overrides.display_range { self.display_range = v; }
        if let Some(v) = overrides.transition_ms { self.transition_ms = v; }
        if let Some(v) = overrides.stop_tag_id { self.stop_tag_id = v; }
        if let Some(v) = overrides.stop_value { self.stop_value = v; }
        if let Some(v) = &overrides.window_title { self.window_title = v.clone(); }
    }
}

/// One block of optional keys, as written in kora_hmi.yaml.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct SettingsOverrides {
    pub base_url: Option<String>,
    pub poll_interval_ms: Option<u64>,
    pub request_timeout_ms: Option<u64>,
    pub tank_capacity: Option<f64>,
    pub display_range: Option<f64>,
    pub transition_ms: Option<u64>,
    pub stop_tag_id: Option<i64>,
    pub stop_value: Option<f64>,
    pub window_title: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct SettingsFile {
    #[serde(default)]
    pub default: SettingsOverrides,
    #[serde(default)]
    pub hosts: HashMap<String, SettingsOverrides>, // hostname -> overrides
}

/// Parse a settings document and resolve it for `hostname`.
/// Host block wins over the `default` block.
pub fn settings_from_yaml(yaml: &str, hostname: &str) -> Result<HmiSettings> {
    let file: SettingsFile = if yaml.trim().is_empty() {
        SettingsFile::default()
    } else {
        serde_yaml::from_str(yaml)?
    };
    let mut settings = HmiSettings::default();
    settings.apply(&file.default);
    if let Some(host) = file.hosts.get(hostname) {
        log::debug!(target: "config_loader", "Applying host overrides for '{}'", hostname);
        settings.apply(host);
    }
    Ok(settings)
}

fn default_settings_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join(SETTINGS_FILE_NAME)
}

fn read_settings_file(path: &Path, hostname: &str) -> Result<HmiSettings> {
    let mut file = File::open(path)
        .map_err(|e| anyhow!("Failed to open settings file at {:?}: {}", path, e))?;
    let mut yaml = String::new();
    file.read_to_string(&mut yaml)?;
    settings_from_yaml(&yaml, hostname)
        .with_context(|| format!("Invalid settings file {:?}", path))
}

/// Apply `KORA_API_BASE_URL` / `KORA_POLL_INTERVAL_MS` on top of file settings.
pub fn apply_env_overrides(settings: &mut HmiSettings) -> Result<()> {
    if let Ok(url) = env::var("KORA_API_BASE_URL") {
        settings.base_url = url;
    }
    if let Ok(ms) = env::var("KORA_POLL_INTERVAL_MS") {
        settings.poll_interval_ms = ms.trim().parse()
            .map_err(|e| anyhow!("KORA_POLL_INTERVAL_MS must be an integer, got '{}': {}", ms, e))?;
    }
    Ok(())
}

/// Load settings for this machine.
///
/// An explicit `config_path` must exist. Without one, kora_hmi.yaml next to
/// Cargo.toml is used if present, otherwise built-in defaults.
pub fn load_settings(config_path: Option<&Path>) -> Result<HmiSettings> {
    let _ = dotenv();
    let hostname = gethostname::gethostname().to_string_lossy().to_string();

    let mut settings = match config_path {
        Some(path) => read_settings_file(path, &hostname)?,
        None => {
            let path = default_settings_path();
            if path.exists() {
                read_settings_file(&path, &hostname)?
            } else {
                log::info!(target: "config_loader", "No {} found, using built-in defaults", SETTINGS_FILE_NAME);
                HmiSettings::default()
            }
        }
    };
    apply_env_overrides(&mut settings)?;
    settings.validate()?;

    log::info!(target: "config_loader", "HmiSettings: base_url={}, poll={}ms, capacity={} (hostname={})",
        settings.base_url, settings.poll_interval_ms, settings.tank_capacity, hostname);
    Ok(settings)
}
