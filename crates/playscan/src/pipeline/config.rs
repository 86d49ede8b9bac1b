use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::config::{AiConfig, Config};
use crate::error::ConfigError;
use crate::secrets::resolve_secret_optional;

/// Immutable settings shared by every component of a run, built once at startup.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub max_file_size_bytes: u64,
    pub max_pages_per_document: u32,
    pub max_files_per_job: u32,
    /// `0` disables the soft deadline.
    pub soft_timeout_ms: u64,
    pub require_ai_consent: bool,
    pub allow_local_ocr_fallback: bool,
    pub render_scale: f32,
    pub ocr_languages: Vec<String>,
    pub ai: AiConfig,
    /// Remote AI counts as configured only when a key resolved.
    pub ai_api_key: Option<SecretString>,
    pub blob_root: PathBuf,
    pub scenes_directory: Option<PathBuf>,
    pub database_path: PathBuf,
    pub stale_threshold: Duration,
    pub sweep_batch_limit: u32,
    pub sweep_interval: Duration,
}

impl PipelineConfig {
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let ai_api_key = resolve_secret_optional(
            config.ai.api_key.as_deref(),
            config.ai.api_key_file.as_deref(),
            config.ai.api_key_env_var.as_deref(),
        )?;
        if ai_api_key.is_none() {
            tracing::info!(
                "No remote AI key configured, remote vision and structuring unavailable"
            );
        }

        let playscan_home = dirs::home_dir()
            .map(|h| h.join(".playscan"))
            .unwrap_or_else(|| PathBuf::from(".playscan"));

        Ok(Self {
            max_file_size_bytes: config.limits.max_file_size_bytes,
            max_pages_per_document: config.limits.max_pages_per_document,
            max_files_per_job: config.limits.max_files_per_job,
            soft_timeout_ms: config.limits.soft_timeout_ms,
            require_ai_consent: config.consent.require_ai_consent,
            allow_local_ocr_fallback: config.consent.allow_local_ocr_fallback,
            render_scale: config.render.scale,
            ocr_languages: config.ocr.languages.clone(),
            ai: config.ai.clone(),
            ai_api_key,
            blob_root: config
                .storage
                .blob_root
                .as_ref()
                .map(PathBuf::from)
                .unwrap_or_else(|| playscan_home.join("blobs")),
            scenes_directory: config.storage.scenes_directory.as_ref().map(PathBuf::from),
            database_path: config
                .storage
                .database_path
                .as_ref()
                .map(PathBuf::from)
                .or_else(crate::db::default_database_path)
                .unwrap_or_else(|| playscan_home.join("data").join("playscan.db")),
            stale_threshold: Duration::from_secs(config.sweeper.stale_threshold_secs),
            sweep_batch_limit: config.sweeper.batch_limit,
            sweep_interval: Duration::from_secs(config.sweeper.interval_secs),
        })
    }

    pub fn remote_ai_configured(&self) -> bool {
        self.ai_api_key.is_some()
    }
}

impl Default for PipelineConfig {
    /// Defaults of [`Config`] without any remote AI key. Used by tests and
    /// embedders that wire components by hand.
    fn default() -> Self {
        let config = Config::default();
        Self {
            max_file_size_bytes: config.limits.max_file_size_bytes,
            max_pages_per_document: config.limits.max_pages_per_document,
            max_files_per_job: config.limits.max_files_per_job,
            soft_timeout_ms: config.limits.soft_timeout_ms,
            require_ai_consent: config.consent.require_ai_consent,
            allow_local_ocr_fallback: config.consent.allow_local_ocr_fallback,
            render_scale: config.render.scale,
            ocr_languages: config.ocr.languages.clone(),
            ai: config.ai,
            ai_api_key: None,
            blob_root: PathBuf::from("blobs"),
            scenes_directory: None,
            database_path: PathBuf::from("playscan.db"),
            stale_threshold: Duration::from_secs(config.sweeper.stale_threshold_secs),
            sweep_batch_limit: config.sweeper.batch_limit,
            sweep_interval: Duration::from_secs(config.sweeper.interval_secs),
        }
    }
}
