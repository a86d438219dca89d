use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::position::DEFAULT_MIN_GAP;

/// Environment variable that points at an alternative config file
pub const CONFIG_ENV: &str = "UMLBOARD_CONFIG";
/// Environment variable that overrides the database location
pub const DATABASE_ENV: &str = "UMLBOARD_DB";

const DEFAULT_PLANTUML_SERVER: &str = "https://www.plantuml.com/plantuml";

/// User settings, stored as YAML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Database file; the extension selects the backend
    pub database_path: Option<PathBuf>,
    /// Base URL of the PlantUML server used for previews
    pub plantuml_server: String,
    /// Idle time before editor content is saved
    pub autosave_delay_ms: u64,
    /// Smallest neighbor gap before a list is respaced
    pub min_position_gap: f64,
    pub render_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            plantuml_server: DEFAULT_PLANTUML_SERVER.to_string(),
            autosave_delay_ms: 600,
            min_position_gap: DEFAULT_MIN_GAP,
            render_timeout_secs: 10,
        }
    }
}

impl AppConfig {
    /// Loads the config from the provided path
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: AppConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path.as_ref()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads the config from its usual location, falling back to defaults
    /// when no file exists yet
    pub fn load_or_default() -> Result<Self> {
        let path = get_config_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load(path)
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize config")
    }

    /// Save the config to the specified path
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.validate()?;
        let content = self.to_yaml()?;

        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(&path, content)
            .with_context(|| format!("Failed to write config to {:?}", path.as_ref()))?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let server = url::Url::parse(&self.plantuml_server)
            .with_context(|| format!("Invalid PlantUML server URL: {}", self.plantuml_server))?;
        if !matches!(server.scheme(), "http" | "https") {
            anyhow::bail!(
                "PlantUML server must be an http(s) URL, got {}",
                self.plantuml_server
            );
        }
        if !(self.min_position_gap > 0.0 && self.min_position_gap.is_finite()) {
            anyhow::bail!(
                "min_position_gap must be a positive number, got {}",
                self.min_position_gap
            );
        }
        Ok(())
    }

    pub fn autosave_delay(&self) -> Duration {
        Duration::from_millis(self.autosave_delay_ms)
    }

    pub fn render_timeout(&self) -> Duration {
        Duration::from_secs(self.render_timeout_secs)
    }
}

/// Gets the umlboard config directory
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir().context("Failed to determine config directory")?;
    Ok(config_dir.join("umlboard"))
}

/// Gets the path to the config file
pub fn get_config_path() -> Result<PathBuf> {
    if let Ok(path) = env::var(CONFIG_ENV) {
        return Ok(PathBuf::from(path));
    }
    Ok(get_config_dir()?.join("config.yaml"))
}

/// Default database location when nothing else is configured
pub fn default_database_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir().context("Failed to determine data directory")?;
    Ok(data_dir.join("umlboard").join("umlboard.db"))
}

/// Determines the database file to use based on the available information
pub fn determine_database_path(cli_option: Option<&Path>, config: &AppConfig) -> Result<PathBuf> {
    // Priority 1: explicit command line option
    if let Some(path) = cli_option {
        return Ok(path.to_path_buf());
    }

    // Priority 2: environment variable
    if let Ok(path) = env::var(DATABASE_ENV) {
        if !path.is_empty() {
            return Ok(PathBuf::from(path));
        }
    }

    // Priority 3: config file
    if let Some(path) = &config.database_path {
        return Ok(path.clone());
    }

    default_database_path()
}
