use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::jobs::QueueConfig;
use crate::pipeline::PipelineConfig;
use crate::provider::ProviderConfig;
use crate::retry::RetryPolicy;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Root data directory (~/.local/share/veil)
    pub data_dir: PathBuf,
    /// Persisted user settings
    pub settings_file: PathBuf,
    /// Default destination for anonymized documents
    pub output_dir: PathBuf,
}

impl Config {
    /// Load configuration or use defaults
    pub fn load_or_default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("veil");
        Self::at(data_dir)
    }

    /// Configuration rooted at an explicit data directory.
    pub fn at(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            settings_file: data_dir.join("settings.json"),
            output_dir: data_dir.join("output"),
            data_dir,
        }
    }

    /// Ensure all required directories exist
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        std::fs::create_dir_all(&self.output_dir)?;
        Ok(())
    }
}

/// User settings, stored as JSON in [`Config::settings_file`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Rewriting provider. `None` falls back to API keys in the environment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderConfig>,
    pub pipeline: PipelineSettings,
    pub queue: QueueSettings,
}

impl Settings {
    /// Load settings, falling back to defaults if the file is missing or
    /// cannot be parsed.
    pub fn load(path: &Path) -> Self {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Self::default(),
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Failed to read settings, using defaults"
                );
                return Self::default();
            }
        };

        match serde_json::from_str(&contents) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Invalid settings file, using defaults"
                );
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self).context("Failed to serialize settings")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write settings to {}", path.display()))?;
        Ok(())
    }

    /// Configured provider, or one picked from environment API keys.
    pub fn resolve_provider(&self) -> Option<ProviderConfig> {
        self.provider.clone().or_else(ProviderConfig::from_env)
    }
}

/// Pipeline tuning as stored on disk. Delays are in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub redact_chunk_size: usize,
    pub verify_chunk_size: usize,
    pub chunk_delay_ms: u64,
    pub pass_delay_ms: u64,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub min_output_ratio: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        let config = PipelineConfig::default();
        Self {
            redact_chunk_size: config.redact_chunk_size,
            verify_chunk_size: config.verify_chunk_size,
            chunk_delay_ms: config.chunk_delay.as_millis() as u64,
            pass_delay_ms: config.pass_delay.as_millis() as u64,
            max_retries: config.retry.max_retries,
            retry_base_delay_ms: config.retry.base_delay.as_millis() as u64,
            min_output_ratio: config.min_output_ratio,
            temperature: config.temperature,
        }
    }
}

impl PipelineSettings {
    pub fn to_config(&self) -> PipelineConfig {
        PipelineConfig {
            redact_chunk_size: self.redact_chunk_size.max(1),
            verify_chunk_size: self.verify_chunk_size.max(1),
            chunk_delay: Duration::from_millis(self.chunk_delay_ms),
            pass_delay: Duration::from_millis(self.pass_delay_ms),
            min_output_ratio: self.min_output_ratio.clamp(0.0, 1.0),
            temperature: self.temperature,
            retry: RetryPolicy::new(
                self.max_retries,
                Duration::from_millis(self.retry_base_delay_ms),
            ),
        }
    }
}

/// Queue tuning as stored on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueSettings {
    pub capacity: usize,
    pub job_delay_ms: u64,
}

impl Default for QueueSettings {
    fn default() -> Self {
        let config = QueueConfig::default();
        Self {
            capacity: config.capacity,
            job_delay_ms: config.job_delay.as_millis() as u64,
        }
    }
}

impl QueueSettings {
    pub fn to_config(&self) -> QueueConfig {
        QueueConfig {
            capacity: self.capacity,
            job_delay: Duration::from_millis(self.job_delay_ms),
        }
    }
}
