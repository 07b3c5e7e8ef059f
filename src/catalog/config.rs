//! Catalog configuration: where to read extra model entries from.

use std::env;
use std::path::{Path, PathBuf};

use config::{Config, File, FileFormat};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ModelCatalog, ModelEntry};
use crate::error::{Result, UsageError};

/// Environment variable naming a TOML catalog file.
pub const CATALOG_ENV_VAR: &str = "TOKENLEDGER_CATALOG";

/// Environment variable that, when truthy, drops the built-in entries.
pub const CATALOG_REPLACE_ENV_VAR: &str = "TOKENLEDGER_CATALOG_REPLACE";

/// On-disk catalog layout.
///
/// ```toml
/// replace_builtin = false
///
/// [[models]]
/// id = "gpt-4"
/// context_window = 8192
/// prompt_price_per_1k = 0.03
/// completion_price_per_1k = 0.06
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogFile {
    /// Ignore the built-in models and use only the file's entries
    #[serde(default)]
    pub replace_builtin: bool,
    #[serde(default)]
    pub models: Vec<ModelEntry>,
}

impl CatalogFile {
    /// Snapshot of a catalog, suitable for writing back out as TOML.
    pub fn from_catalog(catalog: &ModelCatalog) -> Self {
        Self {
            replace_builtin: false,
            models: catalog.entries().into_iter().cloned().collect(),
        }
    }

    /// Render as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| UsageError::Configuration(format!("failed to render catalog: {}", e)))
    }
}

/// Configuration for building the model catalog.
#[derive(Debug, Clone, Default)]
pub struct CatalogConfig {
    /// Optional TOML file with extra or overriding entries.
    pub path: Option<PathBuf>,
    /// Drop the built-in entries before applying the file.
    pub replace_builtin: bool,
}

impl CatalogConfig {
    /// Create a config with no catalog file (built-ins only).
    pub fn new() -> Self {
        Self::default()
    }

    /// Build config from environment variables.
    pub fn from_env() -> Self {
        Self::from_vars(
            env::var(CATALOG_ENV_VAR).ok(),
            env::var(CATALOG_REPLACE_ENV_VAR).ok(),
        )
    }

    fn from_vars(path: Option<String>, replace: Option<String>) -> Self {
        let path = path
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .map(PathBuf::from);
        let replace_builtin = replace
            .map(|value| matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);
        Self {
            path,
            replace_builtin,
        }
    }

    /// Set the catalog file path.
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Set whether built-in entries are dropped.
    pub fn with_replace_builtin(mut self, replace: bool) -> Self {
        self.replace_builtin = replace;
        self
    }

    /// Build the catalog: built-ins, then the file's entries on top.
    pub fn load(&self) -> Result<ModelCatalog> {
        let Some(path) = &self.path else {
            return Ok(ModelCatalog::builtin());
        };

        let file = read_catalog_file(path)?;
        let mut catalog = if self.replace_builtin || file.replace_builtin {
            ModelCatalog::empty()
        } else {
            ModelCatalog::builtin()
        };

        let count = file.models.len();
        for entry in file.models {
            catalog.insert(entry)?;
        }
        debug!(path = %path.display(), entries = count, "loaded model catalog file");

        Ok(catalog)
    }
}

fn read_catalog_file(path: &Path) -> Result<CatalogFile> {
    let settings = Config::builder()
        .add_source(File::from(path).format(FileFormat::Toml).required(true))
        .build()
        .map_err(|e| {
            UsageError::Configuration(format!(
                "failed to read catalog {}: {}",
                path.display(),
                e
            ))
        })?;

    settings.try_deserialize().map_err(|e| {
        UsageError::Configuration(format!("invalid catalog {}: {}", path.display(), e))
    })
}
