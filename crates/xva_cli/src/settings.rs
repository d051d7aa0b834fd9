//! Layered run configuration: TOML file, then `XVA_` environment overrides.

use std::path::Path;

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat, Map};
use xva_engine::config::XvaRunnerConfig;

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "XVA";

/// Separator between nested keys in environment variable names.
pub const ENV_SEPARATOR: &str = "__";

/// Loads a run configuration from `path` with overrides from the process
/// environment, and validates it.
pub fn load(path: &Path) -> Result<XvaRunnerConfig> {
    load_with_env(path, None)
}

/// Like [`load`], reading overrides from `env` instead of the process
/// environment when given.
pub fn load_with_env(path: &Path, env: Option<Map<String, String>>) -> Result<XvaRunnerConfig> {
    let settings = Config::builder()
        .add_source(File::from(path).format(FileFormat::Toml))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator(ENV_SEPARATOR)
                .try_parsing(true)
                .source(env),
        )
        .build()
        .with_context(|| format!("reading configuration {}", path.display()))?;

    let config: XvaRunnerConfig = settings
        .try_deserialize()
        .with_context(|| format!("parsing configuration {}", path.display()))?;
    config.validate()?;
    Ok(config)
}
