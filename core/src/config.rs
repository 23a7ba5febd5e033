//! Hook configuration, loaded from TOML.
//!
//! ```toml
//! skip_dirs = ["/opt/runtime/lib/"]
//! recursion_limit = 2000
//! ```

use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

use crate::vm::DEFAULT_RECURSION_LIMIT;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HookConfig {
    /// Filename prefixes whose units are never handed to the inner callback.
    pub skip_dirs: Vec<String>,
    pub recursion_limit: usize,
}

impl Default for HookConfig {
    fn default() -> Self {
        Self {
            skip_dirs: Vec::new(),
            recursion_limit: DEFAULT_RECURSION_LIMIT,
        }
    }
}

impl HookConfig {
    pub fn from_toml_str(src: &str) -> anyhow::Result<Self> {
        let config: HookConfig = toml::from_str(src).context("invalid hook config")?;
        anyhow::ensure!(config.recursion_limit > 0, "recursion_limit must be positive");
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let src = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        Self::from_toml_str(&src).with_context(|| format!("loading {}", path.display()))
    }
}
