use std::fs;
use std::path::PathBuf;
use directories::ProjectDirs;
use crate::common::config::Config;
use crate::common::error::{FingerprintError, Result};

const DEV_BASE_DIR: &str = "./dev_data";
const DEV_CONFIG_FILE: &str = "configs/fpbridge.toml";
const CONFIG_FILE_NAME: &str = "fpbridge.toml";
pub const TEMPLATE_EXTENSION: &str = "fpt";
pub const HELPER_BINARY: &str = "fpbridge-helper";

#[derive(Debug, Clone)]
pub enum RunMode {
    Development(PathBuf),
    System,
}

/// Resolves config and data locations for the selected run mode.
#[derive(Debug, Clone)]
pub struct DataPaths {
    mode: RunMode,
}

impl DataPaths {
    pub fn new(dev: bool) -> Self {
        let mode = if dev {
            RunMode::Development(PathBuf::from(DEV_BASE_DIR))
        } else {
            RunMode::System
        };
        Self { mode }
    }

    pub fn is_development(&self) -> bool {
        matches!(self.mode, RunMode::Development(_))
    }

    pub fn config_file(&self) -> Result<PathBuf> {
        match &self.mode {
            RunMode::Development(_) => Ok(PathBuf::from(DEV_CONFIG_FILE)),
            RunMode::System => Ok(project_dirs()?.config_dir().join(CONFIG_FILE_NAME)),
        }
    }

    /// The configured override wins over the mode default.
    pub fn templates_dir(&self, config: &Config) -> Result<PathBuf> {
        if let Some(dir) = &config.storage.templates_dir {
            return Ok(dir.clone());
        }
        match &self.mode {
            RunMode::Development(base) => Ok(base.join("templates")),
            RunMode::System => Ok(project_dirs()?.data_dir().join("templates")),
        }
    }

    /// Creates the templates directory if needed and returns it.
    pub fn ensure_templates_dir(&self, config: &Config) -> Result<PathBuf> {
        let dir = self.templates_dir(config)?;
        fs::create_dir_all(&dir)?;
        if self.is_development() {
            tracing::debug!("Using dev template directory: {:?}", dir);
        }
        Ok(dir)
    }

    pub fn load_config(&self, explicit: Option<&std::path::Path>) -> Result<Config> {
        match explicit {
            Some(path) => Config::load_from_path(path),
            None => Config::load_or_default(&self.config_file()?),
        }
    }
}

/// Default helper location: next to the running executable.
pub fn sibling_helper_path() -> Result<PathBuf> {
    let exe = std::env::current_exe()?;
    let dir = exe
        .parent()
        .ok_or_else(|| FingerprintError::Config("Failed to get binary directory".into()))?;
    Ok(dir.join(HELPER_BINARY))
}

fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("com", "fpbridge", "FingerprintBridge")
        .ok_or_else(|| FingerprintError::Storage("Failed to get project dirs".into()))
}
