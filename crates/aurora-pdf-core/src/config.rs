use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Error;

/// The only media type accepted at intake.
pub const PDF_MEDIA_TYPE: &str = "application/pdf";

/// Default maximum size of a single file (30 MiB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 30 * 1024 * 1024;

/// Default maximum number of files in one intake batch.
pub const DEFAULT_MAX_FILES: usize = 20;

/// Prefix for environment overrides, e.g. `AURORA_PDF__LIMITS__MAX_FILES=5`.
pub const ENV_PREFIX: &str = "AURORA_PDF";

/// Default seconds between sweeps of finished jobs
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

/// Default seconds a finished job stays in the ledger
pub const DEFAULT_RETENTION_SECS: u64 = 15 * 60;

/// How a rotate request combines with a page's existing rotation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RotationPolicy {
    /// The requested angle replaces the current rotation.
    #[default]
    Absolute,
    /// The requested angle is added to the current rotation.
    Additive,
}

impl RotationPolicy {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "absolute" | "set" => Some(Self::Absolute),
            "additive" | "add" | "relative" => Some(Self::Additive),
            _ => None,
        }
    }
}

/// Compression effort for the compress operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionLevel {
    Low,
    #[default]
    Medium,
    High,
}

impl CompressionLevel {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" | "recommended" => Some(Self::Medium),
            "high" | "extreme" => Some(Self::High),
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// Intake limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum bytes per file
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    /// Maximum files per batch
    #[serde(default = "default_max_files")]
    pub max_files: usize,

    /// Accepted media type
    #[serde(default = "default_media_type")]
    pub media_type: String,
}

const fn default_max_file_size() -> u64 {
    DEFAULT_MAX_FILE_SIZE
}

const fn default_max_files() -> usize {
    DEFAULT_MAX_FILES
}

fn default_media_type() -> String {
    PDF_MEDIA_TYPE.to_string()
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_file_size: default_max_file_size(),
            max_files: default_max_files(),
            media_type: default_media_type(),
        }
    }
}

/// Pipeline behaviour
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Delay after each progress step in milliseconds (0 = none)
    #[serde(default)]
    pub progress_pacing_ms: u64,

    /// Rotation policy used when a request does not pick one
    #[serde(default)]
    pub rotation_policy: RotationPolicy,

    /// Compression level used when a request does not pick one
    #[serde(default)]
    pub compression: CompressionLevel,
}

/// Job ledger housekeeping
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    /// Interval for sweeping finished jobs in seconds (0 = never)
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// How long a completed or failed job is kept before a sweep drops it
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,
}

const fn default_sweep_interval_secs() -> u64 {
    DEFAULT_SWEEP_INTERVAL_SECS
}

const fn default_retention_secs() -> u64 {
    DEFAULT_RETENTION_SECS
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval_secs(),
            retention_secs: default_retention_secs(),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub limits: LimitsConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub jobs: JobsConfig,
}

impl AppConfig {
    /// Load configuration from file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::ConfigLoad(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| Error::ConfigLoad(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from default locations, layered lowest to highest priority:
    /// `~/.config/aurora-pdf/config.toml`, `./config.toml`, then
    /// `AURORA_PDF__*` environment variables.
    pub fn load() -> Self {
        let user_config = crate::util::config_dir()
            .map(|dir| dir.join("aurora-pdf").join("config.toml"));

        match Self::load_layered(user_config.as_deref(), Path::new("config.toml")) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Failed to load configuration, using defaults: {}", e);
                Self::default()
            }
        }
    }

    fn load_layered(user_config: Option<&Path>, local_config: &Path) -> Result<Self, Error> {
        let mut builder = config::Config::builder();

        for path in user_config.into_iter().chain(std::iter::once(local_config)) {
            if path.exists() {
                tracing::debug!("Loading config layer {}", path.display());
                builder = builder.add_source(config::File::from(PathBuf::from(path)).required(false));
            }
        }

        let config: Self = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(config::Config::try_deserialize)
            .map_err(|e| Error::ConfigLoad(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make intake impossible.
    pub fn validate(&self) -> Result<(), Error> {
        if self.limits.max_file_size == 0 {
            return Err(Error::ConfigInvalid {
                field: "limits.max_file_size".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.limits.max_files == 0 {
            return Err(Error::ConfigInvalid {
                field: "limits.max_files".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.limits.media_type.trim().is_empty() {
            return Err(Error::ConfigInvalid {
                field: "limits.media_type".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.limits.max_file_size, 30 * 1024 * 1024);
        assert_eq!(config.limits.max_files, 20);
        assert_eq!(config.limits.media_type, "application/pdf");
        assert_eq!(config.pipeline.rotation_policy, RotationPolicy::Absolute);
        assert_eq!(config.pipeline.progress_pacing_ms, 0);
        assert_eq!(config.jobs.sweep_interval_secs, DEFAULT_SWEEP_INTERVAL_SECS);
        assert_eq!(config.jobs.retention_secs, DEFAULT_RETENTION_SECS);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [limits]
            max_files = 5

            [pipeline]
            rotation_policy = "additive"
            "#,
        )
        .unwrap();

        assert_eq!(config.limits.max_files, 5);
        assert_eq!(config.limits.max_file_size, DEFAULT_MAX_FILE_SIZE);
        assert_eq!(config.pipeline.rotation_policy, RotationPolicy::Additive);
        assert_eq!(config.pipeline.compression, CompressionLevel::Medium);
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[pipeline]\nprogress_pacing_ms = 25\n").unwrap();

        let config = AppConfig::from_file(&path).unwrap();
        assert_eq!(config.pipeline.progress_pacing_ms, 25);
    }

    #[test]
    fn test_from_file_rejects_zero_limits() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[limits]\nmax_files = 0\n").unwrap();

        let result = AppConfig::from_file(&path);
        assert!(matches!(result, Err(Error::ConfigInvalid { .. })));
    }

    #[test]
    fn test_layered_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("config.toml");
        std::fs::write(&local, "[jobs]\nsweep_interval_secs = 5\n").unwrap();

        let config = AppConfig::load_layered(None, &local).unwrap();
        assert_eq!(config.jobs.sweep_interval_secs, 5);
        assert_eq!(config.jobs.retention_secs, DEFAULT_RETENTION_SECS);
        assert_eq!(config.limits.max_files, DEFAULT_MAX_FILES);
    }

    #[test]
    fn test_policy_and_level_names() {
        assert_eq!(RotationPolicy::from_name("Additive"), Some(RotationPolicy::Additive));
        assert_eq!(RotationPolicy::from_name("absolute"), Some(RotationPolicy::Absolute));
        assert_eq!(RotationPolicy::from_name("spin"), None);
        assert_eq!(CompressionLevel::from_name("HIGH"), Some(CompressionLevel::High));
        assert_eq!(CompressionLevel::from_name("recommended"), Some(CompressionLevel::Medium));
        assert_eq!(CompressionLevel::Low.as_str(), "low");
    }
}
