use crate::compose::{DATETIME_PLACEHOLDER, DEFAULT_TICKET_TEMPLATE};
use crate::conversation::WritePolicy;
use anyhow::{Context, Result, bail};
use chrono_tz::Tz;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

const DEFAULT_CONFIG_PATH: &str = "config.toml";
const CONFIG_PATH_ENV: &str = "TICKET_CHAT_CONFIG";
pub const DEFAULT_STORAGE_KEY: &str = "chat_messages";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    File,
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    storage: StorageConfig,
    persistence: PersistenceConfig,
    display: DisplayConfig,
    script: ScriptConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct StorageConfig {
    backend: StorageBackend,
    data_dir: String,
    key: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            data_dir: "data".to_string(),
            key: DEFAULT_STORAGE_KEY.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct PersistenceConfig {
    retry_attempts: u32,
    retry_delay_ms: u64,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            retry_attempts: 2,
            retry_delay_ms: 200,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct DisplayConfig {
    timezone: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct ScriptConfig {
    ticket_template: String,
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            ticket_template: DEFAULT_TICKET_TEMPLATE.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub backend: StorageBackend,
    pub data_dir: PathBuf,
    pub storage_key: String,
    pub retry_attempts: u32,
    pub retry_delay: Duration,
    pub display_timezone: Option<Tz>,
    pub ticket_template: String,
}

impl Default for Config {
    fn default() -> Self {
        let storage = StorageConfig::default();
        let persistence = PersistenceConfig::default();
        Self {
            backend: storage.backend,
            data_dir: storage.data_dir.into(),
            storage_key: storage.key,
            retry_attempts: persistence.retry_attempts,
            retry_delay: Duration::from_millis(persistence.retry_delay_ms),
            display_timezone: None,
            ticket_template: ScriptConfig::default().ticket_template,
        }
    }
}

impl Config {
    fn from_config_file(config_file: ConfigFile) -> Result<Self> {
        if config_file.storage.key.trim().is_empty() {
            bail!("storage.key must not be empty");
        }

        let display_timezone = match config_file.display.timezone.as_deref() {
            Some(name) => Some(
                name.parse::<Tz>()
                    .map_err(|e| anyhow::anyhow!("{}", e))
                    .with_context(|| format!("Unknown display timezone: {}", name))?,
            ),
            None => None,
        };

        if !config_file
            .script
            .ticket_template
            .contains(DATETIME_PLACEHOLDER)
        {
            warn!(
                "script.ticket_template has no {} placeholder; scripted messages will not show the purchase time",
                DATETIME_PLACEHOLDER
            );
        }

        Ok(Self {
            backend: config_file.storage.backend,
            data_dir: config_file.storage.data_dir.into(),
            storage_key: config_file.storage.key,
            retry_attempts: config_file.persistence.retry_attempts,
            retry_delay: Duration::from_millis(config_file.persistence.retry_delay_ms),
            display_timezone,
            ticket_template: config_file.script.ticket_template,
        })
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config_file: ConfigFile =
            toml::from_str(content).context("Failed to parse config file")?;
        Self::from_config_file(config_file)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml(&content)
    }

    pub fn load() -> Result<Self> {
        let path: PathBuf = std::env::var(CONFIG_PATH_ENV)
            .unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into())
            .into();

        if !path.exists() {
            info!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        Self::from_file(&path)
    }

    pub fn write_policy(&self) -> WritePolicy {
        WritePolicy {
            retry_attempts: self.retry_attempts,
            retry_delay: self.retry_delay,
        }
    }
}
