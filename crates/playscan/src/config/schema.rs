use serde::{Deserialize, Serialize};

/// On-disk configuration (`playscan.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub consent: ConsentConfig,
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub ocr: OcrConfig,
    #[serde(default)]
    pub ai: AiConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub sweeper: SweeperConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            limits: LimitsConfig::default(),
            consent: ConsentConfig::default(),
            render: RenderConfig::default(),
            ocr: OcrConfig::default(),
            ai: AiConfig::default(),
            storage: StorageConfig::default(),
            sweeper: SweeperConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_max_file_size")]
    pub max_file_size_bytes: u64,
    #[serde(default = "default_max_pages")]
    pub max_pages_per_document: u32,
    #[serde(default = "default_max_files")]
    pub max_files_per_job: u32,
    /// Cumulative soft deadline per run. `0` disables the check.
    #[serde(default = "default_soft_timeout_ms")]
    pub soft_timeout_ms: u64,
}

fn default_max_file_size() -> u64 {
    20 * 1024 * 1024
}

fn default_max_pages() -> u32 {
    20
}

fn default_max_files() -> u32 {
    10
}

fn default_soft_timeout_ms() -> u64 {
    240_000
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_file_size_bytes: default_max_file_size(),
            max_pages_per_document: default_max_pages(),
            max_files_per_job: default_max_files(),
            soft_timeout_ms: default_soft_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsentConfig {
    /// Reject submissions that did not consent to remote AI processing.
    #[serde(default = "default_true")]
    pub require_ai_consent: bool,
    /// Fall back to local OCR when the remote vision service is not usable.
    #[serde(default = "default_true")]
    pub allow_local_ocr_fallback: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ConsentConfig {
    fn default() -> Self {
        Self {
            require_ai_consent: true,
            allow_local_ocr_fallback: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Rasterization scale relative to 72 DPI.
    #[serde(default = "default_scale")]
    pub scale: f32,
}

fn default_scale() -> f32 {
    2.0
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            scale: default_scale(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrConfig {
    #[serde(default = "default_languages")]
    pub languages: Vec<String>,
}

fn default_languages() -> Vec<String> {
    vec!["eng".to_string()]
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            languages: default_languages(),
        }
    }
}

/// Remote AI service (OpenAI-compatible chat completions API).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_vision_model")]
    pub vision_model: String,
    #[serde(default = "default_text_model")]
    pub text_model: String,
    /// Inline API key. Prefer `api_key_file` or `api_key_env_var`.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_key_file: Option<String>,
    #[serde(default = "default_api_key_env_var")]
    pub api_key_env_var: Option<String>,
    /// Hard timeout for each remote call.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    /// Raw text beyond this many characters is cut before structuring.
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_vision_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_text_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_api_key_env_var() -> Option<String> {
    Some("PLAYSCAN_AI_API_KEY".to_string())
}

fn default_request_timeout_ms() -> u64 {
    60_000
}

fn default_temperature() -> f32 {
    0.1
}

fn default_max_output_tokens() -> u32 {
    8192
}

fn default_max_input_chars() -> usize {
    60_000
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            vision_model: default_vision_model(),
            text_model: default_text_model(),
            api_key: None,
            api_key_file: None,
            api_key_env_var: default_api_key_env_var(),
            request_timeout_ms: default_request_timeout_ms(),
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
            max_input_chars: default_max_input_chars(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory that blob paths (`<owner>/<file>`) resolve against.
    #[serde(default)]
    pub blob_root: Option<String>,
    /// Where `create`-mode imports write committed scenes.
    #[serde(default)]
    pub scenes_directory: Option<String>,
    /// Defaults to `~/.playscan/data/playscan.db`.
    #[serde(default)]
    pub database_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweeperConfig {
    #[serde(default = "default_stale_threshold_secs")]
    pub stale_threshold_secs: u64,
    #[serde(default = "default_batch_limit")]
    pub batch_limit: u32,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

fn default_stale_threshold_secs() -> u64 {
    600
}

fn default_batch_limit() -> u32 {
    10
}

fn default_interval_secs() -> u64 {
    300
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            stale_threshold_secs: default_stale_threshold_secs(),
            batch_limit: default_batch_limit(),
            interval_secs: default_interval_secs(),
        }
    }
}
