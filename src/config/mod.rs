// Configuration management module
// TOML configuration for the embedding provider and search defaults

pub mod settings;


pub use settings::{
    BASE_DIR_ENV_VAR, Config, ConfigError, DEFAULT_EMBEDDING_DIMENSION, OllamaConfig,
    SearchConfig,
};

/// Resolve the base directory, preferring an explicit override
#[inline]
pub fn resolve_base_dir(
    explicit: Option<std::path::PathBuf>,
) -> Result<std::path::PathBuf, ConfigError> {
    match explicit {
        Some(dir) => Ok(dir),
        None => Config::default_base_dir(),
    }
}
