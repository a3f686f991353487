use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use crate::common::error::{FingerprintError, Result};

/// 0.001% false accept rate on the `PROBABILITY_ONE` score scale.
pub const DEFAULT_FAR_THRESHOLD: i32 = 21474;

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub reader: ReaderConfig,
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub enrollment: EnrollmentConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ReaderConfig {
    #[serde(default = "default_capture_timeout")]
    pub capture_timeout_ms: u64,
    #[serde(default = "default_min_quality")]
    pub min_quality: f32,
    #[serde(default = "default_presence_threshold")]
    pub presence_threshold: f32,
    /// Requested frame size, 0 keeps the device default.
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    #[serde(default)]
    pub warmup_frames: u32,
}

fn default_capture_timeout() -> u64 { 10_000 }
fn default_min_quality() -> f32 { 0.5 }
fn default_presence_threshold() -> f32 { 0.15 }

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            capture_timeout_ms: default_capture_timeout(),
            min_quality: default_min_quality(),
            presence_threshold: default_presence_threshold(),
            width: 0,
            height: 0,
            warmup_frames: 0,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MatchingConfig {
    /// Dissimilarity scores strictly below this value are matches.
    /// 21474 = 0.001% FAR, 214748 = 0.01%, 2147483 = 0.1%.
    #[serde(default = "default_far_threshold")]
    pub far_threshold: i32,
}

fn default_far_threshold() -> i32 { DEFAULT_FAR_THRESHOLD }

impl Default for MatchingConfig {
    fn default() -> Self {
        Self { far_threshold: default_far_threshold() }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EnrollmentConfig {
    #[serde(default = "default_required_samples")]
    pub required_samples: usize,
    #[serde(default = "default_max_attempts")]
    pub max_attempts_per_sample: u32,
}

fn default_required_samples() -> usize { 4 }
fn default_max_attempts() -> u32 { 3 }

impl Default for EnrollmentConfig {
    fn default() -> Self {
        Self {
            required_samples: default_required_samples(),
            max_attempts_per_sample: default_max_attempts(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct StorageConfig {
    #[serde(default)]
    pub templates_dir: Option<PathBuf>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServiceConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub helper_path: Option<PathBuf>,
    #[serde(default = "default_helper_timeout")]
    pub helper_timeout_secs: u64,
    #[serde(default = "default_device_lock_timeout")]
    pub device_lock_timeout_ms: u64,
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_host() -> String { "127.0.0.1".to_string() }
fn default_port() -> u16 { 5000 }
fn default_helper_timeout() -> u64 { 120 }
fn default_device_lock_timeout() -> u64 { 15_000 }

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            helper_path: None,
            helper_timeout_secs: default_helper_timeout(),
            device_lock_timeout_ms: default_device_lock_timeout(),
            cors_origins: Vec::new(),
        }
    }
}

impl ServiceConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String { "info".to_string() }

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level() }
    }
}

impl Config {
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(FingerprintError::Config(format!(
                "Config file not found: {}", path.display()
            )));
        }

        tracing::debug!("Loading config from: {}", path.display());
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Missing files fall back to defaults; the helper must answer even unconfigured.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load_from_path(path)
        } else {
            tracing::debug!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)
            .map_err(|e| FingerprintError::Config(format!("Config parse error: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.reader.capture_timeout_ms < 1 || self.reader.capture_timeout_ms > 60_000 {
            return Err(FingerprintError::Config(format!(
                "Capture timeout must be between 1 and 60000 ms, got {}",
                self.reader.capture_timeout_ms
            )));
        }
        if !(0.0..=1.0).contains(&self.reader.min_quality) {
            return Err(FingerprintError::Config(format!(
                "Minimum quality must be between 0.0 and 1.0, got {}",
                self.reader.min_quality
            )));
        }
        if !(0.0..=1.0).contains(&self.reader.presence_threshold) {
            return Err(FingerprintError::Config(format!(
                "Presence threshold must be between 0.0 and 1.0, got {}",
                self.reader.presence_threshold
            )));
        }
        if self.reader.width > 4096 || self.reader.height > 4096 {
            return Err(FingerprintError::Config(format!(
                "Frame size must not exceed 4096x4096, got {}x{}",
                self.reader.width, self.reader.height
            )));
        }

        if self.matching.far_threshold <= 0 {
            return Err(FingerprintError::Config(format!(
                "FAR threshold must be positive, got {}",
                self.matching.far_threshold
            )));
        }

        if self.enrollment.required_samples < 1 || self.enrollment.required_samples > 10 {
            return Err(FingerprintError::Config(format!(
                "Required samples must be between 1 and 10, got {}",
                self.enrollment.required_samples
            )));
        }
        if self.enrollment.max_attempts_per_sample < 1 || self.enrollment.max_attempts_per_sample > 10 {
            return Err(FingerprintError::Config(format!(
                "Attempts per sample must be between 1 and 10, got {}",
                self.enrollment.max_attempts_per_sample
            )));
        }

        if self.service.helper_timeout_secs < 1 {
            return Err(FingerprintError::Config(
                "Helper timeout must be at least 1 second".into()
            ));
        }

        if self.logging.level.parse::<tracing::Level>().is_err() {
            return Err(FingerprintError::Config(format!(
                "Unknown log level '{}'", self.logging.level
            )));
        }

        Ok(())
    }

    pub fn log_level(&self) -> tracing::Level {
        self.logging.level.parse().unwrap_or(tracing::Level::INFO)
    }
}
