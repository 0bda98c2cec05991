mod env;
mod types;


pub use types::*;

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, bail};

impl Config {
    /// Load configuration from a TOML file, falling back to defaults when the
    /// file does not exist. Env overrides are applied separately, after
    /// logging is up, so invalid values can be reported.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        toml::from_str::<Self>(&content)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    /// # Errors
    ///
    /// Returns an error for an empty backend list, a zero debounce window or
    /// duplicate backend names.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.backends.is_empty() {
            bail!("at least one [[backends]] entry is required");
        }
        if self.index.debounce_ms == 0 {
            bail!("index.debounce_ms must be greater than zero");
        }
        let mut seen = HashSet::new();
        for backend in &self.backends {
            if backend.name.trim().is_empty() {
                bail!("backend name must not be empty");
            }
            if !seen.insert(backend.name.as_str()) {
                bail!("duplicate backend name: {}", backend.name);
            }
        }
        Ok(())
    }
}
