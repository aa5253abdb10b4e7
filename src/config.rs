use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::logging::LogConfig;
use crate::prediction::DEFAULT_ROLLING_WINDOW;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application metadata
    pub metadata: ConfigMetadata,

    /// Storage and artifact locations
    #[serde(default)]
    pub settings: AppSettings,

    /// Recovery prediction tuning
    #[serde(default)]
    pub prediction: PredictionSettings,

    /// Logging output
    #[serde(default)]
    pub logging: LogConfig,
}

/// Configuration metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigMetadata {
    /// Configuration format version
    pub version: String,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last modification timestamp
    pub updated_at: DateTime<Utc>,
}

/// Paths used by the CLI
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// SQLite database file
    pub database_path: PathBuf,

    /// Directory holding the model artifact, or its `latest/` subdirectory
    pub model_dir: PathBuf,

    /// Per-user head CSV (user_id,bias,slope), loaded by `liftrs heads`
    pub heads_csv: Option<PathBuf>,

    /// User assumed when a command omits `--user`
    pub default_user: Option<String>,
}

/// Prediction service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictionSettings {
    /// Number of most recent log rows averaged into rolling features
    pub rolling_window: usize,

    /// Refuse to predict until the morning check-in is logged
    pub require_checkin: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        let now = Utc::now();

        AppConfig {
            metadata: ConfigMetadata {
                version: "1.0".to_string(),
                created_at: now,
                updated_at: now,
            },
            settings: AppSettings::default(),
            prediction: PredictionSettings::default(),
            logging: LogConfig::default(),
        }
    }
}

impl Default for AppSettings {
    fn default() -> Self {
        let base = AppConfig::base_dir();
        AppSettings {
            database_path: base.join("liftrs.db"),
            model_dir: base.join("models"),
            heads_csv: None,
            default_user: None,
        }
    }
}

impl Default for PredictionSettings {
    fn default() -> Self {
        PredictionSettings {
            rolling_window: DEFAULT_ROLLING_WINDOW,
            require_checkin: true,
        }
    }
}

impl AppConfig {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: AppConfig = toml::from_str(&content)
            .with_context(|| "Failed to parse TOML configuration")?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        self.metadata.updated_at = Utc::now();

        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
        }

        let toml_content = toml::to_string_pretty(self)
            .with_context(|| "Failed to serialize configuration to TOML")?;

        fs::write(&path, toml_content)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        Ok(())
    }

    /// `~/.liftrs`, or `./.liftrs` without a home directory
    pub fn base_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".liftrs")
    }

    /// Get default configuration file path
    pub fn default_config_path() -> PathBuf {
        Self::base_dir().join("config.toml")
    }

    /// Load an explicit path, or the default path falling back to defaults
    ///
    /// A missing explicit file is an error. A missing default file is not,
    /// but a default file that exists and fails to parse still is.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from_file(path);
        }

        let config_path = Self::default_config_path();
        if config_path.exists() {
            Self::load_from_file(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.prediction.rolling_window == 0 {
            bail!("prediction.rolling_window must be at least 1");
        }
        Ok(())
    }
}
