//! Configuration vault – reads/writes `~/.armview/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use armview_state::StoreConfig;
use armview_types::protocol::ARM_STATE_CHANGED;
use serde::{Deserialize, Serialize};

/// Persisted user configuration stored in `~/.armview/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// WebSocket URL of the kinematic service.  Empty selects the built-in
    /// fixture service.
    #[serde(default)]
    pub remote_url: String,

    /// Pause before the first bootstrap request, in milliseconds.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    /// Topic carrying live arm state updates.
    #[serde(default = "default_state_topic")]
    pub state_topic: String,
}

fn default_settle_delay_ms() -> u64 {
    500
}
fn default_state_topic() -> String {
    ARM_STATE_CHANGED.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            remote_url: String::new(),
            settle_delay_ms: default_settle_delay_ms(),
            state_topic: default_state_topic(),
        }
    }
}

impl Config {
    /// Whether the remote service or the in-process fixture is used.
    pub fn uses_fixture(&self) -> bool {
        self.remote_url.trim().is_empty()
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            settle_delay: Duration::from_millis(self.settle_delay_ms),
            state_topic: self.state_topic.clone(),
        }
    }
}

/// Return the path to `~/.armview/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".armview").join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    let mut cfg = read_from(path)?;
    if let Some(cfg) = cfg.as_mut() {
        apply_env_overrides(cfg);
    }
    Ok(cfg)
}

/// Parse the file at `path` as-is, without environment overrides.
pub(crate) fn read_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    toml::from_str(&raw)
        .map(Some)
        .map_err(|e| format!("Failed to parse config: {}", e))
}

/// Apply `ARMVIEW_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `ARMVIEW_REMOTE_URL` | `remote_url` |
/// | `ARMVIEW_SETTLE_DELAY_MS` | `settle_delay_ms` |
/// | `ARMVIEW_STATE_TOPIC` | `state_topic` |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("ARMVIEW_REMOTE_URL") {
        cfg.remote_url = v;
    }
    if let Ok(v) = std::env::var("ARMVIEW_SETTLE_DELAY_MS")
        && let Ok(ms) = v.parse::<u64>()
    {
        cfg.settle_delay_ms = ms;
    }
    if let Ok(v) = std::env::var("ARMVIEW_STATE_TOPIC")
        && !v.is_empty()
    {
        cfg.state_topic = v;
    }
}

/// Save the config to disk, creating `~/.armview/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| f.write_all(raw.as_bytes()))
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}
