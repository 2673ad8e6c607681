//! CLI configuration loading.

use std::path::Path;

use anyhow::Context;
use lathe_core::OrchestratorConfig;

/// Load orchestrator configuration.
///
/// Configuration precedence:
/// 1. Environment variables (`LATHE_DATABASE`, `LATHE_LOG_DIR`, `LATHE_MODEL_DIR`)
/// 2. The file given with `--config`, or else the local file (./lathe.toml)
///    over the global file (~/.lathe/config.toml)
/// 3. Defaults
pub fn load_config(path: Option<&Path>) -> anyhow::Result<OrchestratorConfig> {
    let Some(path) = path else {
        return OrchestratorConfig::discover_and_load().context("Failed to load configuration");
    };

    let mut config = OrchestratorConfig::load_from_file(path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
    config.apply_env_overrides(|key| std::env::var(key).ok());
    config.validate().context("Invalid configuration")?;
    Ok(config)
}
