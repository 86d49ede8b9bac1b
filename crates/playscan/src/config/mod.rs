pub mod loader;
pub mod schema;

pub use loader::{apply_env_overrides, load_config, load_config_from_str, load_default_config};
pub use schema::{
    AiConfig, Config, ConsentConfig, LimitsConfig, OcrConfig, RenderConfig, StorageConfig,
    SweeperConfig,
};
