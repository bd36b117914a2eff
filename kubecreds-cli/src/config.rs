//! CLI configuration handling.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use kubecreds_core::ContextOptions;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CliConfig {
    /// Path to the configuration file that was loaded.
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Logging level.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Options passed to every credential context.
    #[serde(flatten)]
    pub context: ContextOptions,
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            config_path: PathBuf::new(),
            log_level: default_log_level(),
            context: ContextOptions::default(),
        }
    }
}

/// Load configuration from the default location or fall back to defaults.
pub fn load_config() -> Result<CliConfig> {
    let config_path = project_dirs()
        .map(|d| d.config_dir().join("kubecreds.toml"))
        .unwrap_or_else(|| PathBuf::from("kubecreds.toml"));
    load_config_from(&config_path)
}

/// Load configuration from `path`; a missing file yields defaults.
pub fn load_config_from(path: &Path) -> Result<CliConfig> {
    let mut config = if path.exists() {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {:?}", path))?;
        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config from {:?}", path))?
    } else {
        CliConfig::default()
    };

    config.config_path = path.to_path_buf();
    Ok(config)
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "raibid-labs", "kubecreds")
}
