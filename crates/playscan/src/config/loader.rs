use std::path::Path;

use crate::config::schema::Config;
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../../../schema/config-v1.json");

/// Environment variables that override limit and consent settings.
pub const ENV_MAX_FILE_SIZE_BYTES: &str = "PLAYSCAN_MAX_FILE_SIZE_BYTES";
pub const ENV_MAX_PAGES_PER_DOCUMENT: &str = "PLAYSCAN_MAX_PAGES_PER_DOCUMENT";
pub const ENV_REQUIRE_AI_CONSENT: &str = "PLAYSCAN_REQUIRE_AI_CONSENT";
pub const ENV_ALLOW_LOCAL_OCR_FALLBACK: &str = "PLAYSCAN_ALLOW_LOCAL_OCR_FALLBACK";
pub const ENV_SOFT_TIMEOUT_MS: &str = "PLAYSCAN_SOFT_TIMEOUT_MS";

/// Loads a config file and applies `PLAYSCAN_*` environment overrides.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mut config = load_config_from_str(&content)?;
    apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;
    validate_config(&config)?;
    Ok(config)
}

/// Defaults plus environment overrides, for running without a config file.
pub fn load_default_config() -> Result<Config, ConfigError> {
    let mut config = Config::default();
    apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;
    validate_config(&config)?;
    Ok(config)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: Config = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

/// Applies overrides looked up through `lookup` (normally `std::env::var`).
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = lookup(ENV_MAX_FILE_SIZE_BYTES) {
        config.limits.max_file_size_bytes = parse_env(ENV_MAX_FILE_SIZE_BYTES, &v)?;
    }
    if let Some(v) = lookup(ENV_MAX_PAGES_PER_DOCUMENT) {
        config.limits.max_pages_per_document = parse_env(ENV_MAX_PAGES_PER_DOCUMENT, &v)?;
    }
    if let Some(v) = lookup(ENV_REQUIRE_AI_CONSENT) {
        config.consent.require_ai_consent = parse_env_bool(ENV_REQUIRE_AI_CONSENT, &v)?;
    }
    if let Some(v) = lookup(ENV_ALLOW_LOCAL_OCR_FALLBACK) {
        config.consent.allow_local_ocr_fallback =
            parse_env_bool(ENV_ALLOW_LOCAL_OCR_FALLBACK, &v)?;
    }
    if let Some(v) = lookup(ENV_SOFT_TIMEOUT_MS) {
        config.limits.soft_timeout_ms = parse_env(ENV_SOFT_TIMEOUT_MS, &v)?;
    }
    Ok(())
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| ConfigError::InvalidEnvOverride {
            name: name.to_string(),
            value: value.to_string(),
        })
}

fn parse_env_bool(name: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidEnvOverride {
            name: name.to_string(),
            value: value.to_string(),
        }),
    }
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    if config.limits.max_file_size_bytes == 0 {
        return Err(ConfigError::Validation {
            message: "limits.max_file_size_bytes must be positive".to_string(),
        });
    }
    if config.limits.max_pages_per_document == 0 {
        return Err(ConfigError::Validation {
            message: "limits.max_pages_per_document must be positive".to_string(),
        });
    }
    if config.limits.max_files_per_job == 0 {
        return Err(ConfigError::Validation {
            message: "limits.max_files_per_job must be positive".to_string(),
        });
    }

    if !(config.render.scale > 0.0 && config.render.scale <= 8.0) {
        return Err(ConfigError::Validation {
            message: format!("render.scale must be in (0, 8], got {}", config.render.scale),
        });
    }

    let base_url = config.ai.base_url.trim();
    if !(base_url.starts_with("https://") || base_url.starts_with("http://")) {
        return Err(ConfigError::Validation {
            message: format!("ai.base_url must be an http(s) URL, got '{}'", base_url),
        });
    }

    if config.ocr.languages.iter().any(|l| l.trim().is_empty()) {
        return Err(ConfigError::Validation {
            message: "ocr.languages must not contain empty entries".to_string(),
        });
    }

    Ok(())
}
