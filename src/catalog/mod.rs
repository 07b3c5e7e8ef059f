//! Static model catalog: context windows and per-1K token prices.
//!
//! The catalog is built once at startup (built-in defaults, optionally
//! extended by a TOML file, see [`CatalogConfig`]) and then shared read-only,
//! typically behind an `Arc`, by the budget calculator and the cost
//! estimator.

mod config;

pub use config::{CatalogConfig, CatalogFile, CATALOG_ENV_VAR, CATALOG_REPLACE_ENV_VAR};

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, UsageError};

/// Context window and pricing for a single model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelEntry {
    /// Model identifier as sent to the provider (e.g. "gpt-4")
    pub id: String,
    /// Total tokens the model accepts (prompt + completion)
    pub context_window: u64,
    /// Price per 1K prompt tokens (USD)
    pub prompt_price_per_1k: f64,
    /// Price per 1K completion tokens (USD)
    pub completion_price_per_1k: f64,
}

impl ModelEntry {
    /// Create a new catalog entry.
    pub fn new(
        id: impl Into<String>,
        context_window: u64,
        prompt_price_per_1k: f64,
        completion_price_per_1k: f64,
    ) -> Self {
        Self {
            id: id.into(),
            context_window,
            prompt_price_per_1k,
            completion_price_per_1k,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(UsageError::Configuration(
                "catalog entry with empty model id".to_string(),
            ));
        }
        if self.context_window == 0 {
            return Err(UsageError::Configuration(format!(
                "model '{}' has a zero context window",
                self.id
            )));
        }
        for (label, price) in [
            ("prompt", self.prompt_price_per_1k),
            ("completion", self.completion_price_per_1k),
        ] {
            if !price.is_finite() || price < 0.0 {
                return Err(UsageError::Configuration(format!(
                    "model '{}' has an invalid {} price: {}",
                    self.id, label, price
                )));
            }
        }
        Ok(())
    }
}

/// Read-only table of known models keyed by id.
#[derive(Debug, Clone, Default)]
pub struct ModelCatalog {
    entries: HashMap<String, ModelEntry>,
}

impl ModelCatalog {
    /// Create an empty catalog.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Catalog of the OpenAI chat models the agent runs against.
    pub fn builtin() -> Self {
        let entries = [
            ModelEntry::new("gpt-3.5-turbo", 4_096, 0.0015, 0.002),
            ModelEntry::new("gpt-3.5-turbo-16k", 16_384, 0.003, 0.004),
            ModelEntry::new("gpt-3.5-turbo-0613", 4_096, 0.0015, 0.002),
            ModelEntry::new("gpt-3.5-turbo-16k-0613", 16_384, 0.003, 0.004),
            ModelEntry::new("gpt-4", 8_192, 0.03, 0.06),
            ModelEntry::new("gpt-4-0613", 8_192, 0.03, 0.06),
            ModelEntry::new("gpt-4-32k", 32_768, 0.06, 0.12),
            ModelEntry::new("gpt-4-turbo", 128_000, 0.01, 0.03),
            ModelEntry::new("gpt-4o", 128_000, 0.005, 0.015),
            ModelEntry::new("gpt-4o-mini", 128_000, 0.00015, 0.0006),
        ];

        Self {
            entries: entries
                .into_iter()
                .map(|entry| (entry.id.clone(), entry))
                .collect(),
        }
    }

    /// Build a catalog from explicit entries, validating each one.
    ///
    /// Later entries replace earlier ones with the same id.
    pub fn from_entries(entries: impl IntoIterator<Item = ModelEntry>) -> Result<Self> {
        let mut catalog = Self::empty();
        for entry in entries {
            catalog.insert(entry)?;
        }
        Ok(catalog)
    }

    /// Add or replace an entry.
    pub fn insert(&mut self, entry: ModelEntry) -> Result<()> {
        entry.validate()?;
        self.entries.insert(entry.id.clone(), entry);
        Ok(())
    }

    /// Look up a model, failing with a configuration error if it is unknown.
    pub fn get(&self, model_id: &str) -> Result<&ModelEntry> {
        self.entries
            .get(model_id)
            .ok_or_else(|| UsageError::unknown_model(model_id))
    }

    /// Context window for a model.
    pub fn context_window(&self, model_id: &str) -> Result<u64> {
        self.get(model_id).map(|entry| entry.context_window)
    }

    /// `(prompt, completion)` price per 1K tokens for a model.
    pub fn pricing(&self, model_id: &str) -> Result<(f64, f64)> {
        self.get(model_id)
            .map(|entry| (entry.prompt_price_per_1k, entry.completion_price_per_1k))
    }

    pub fn contains(&self, model_id: &str) -> bool {
        self.entries.contains_key(model_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries sorted by model id.
    pub fn entries(&self) -> Vec<&ModelEntry> {
        let mut entries: Vec<_> = self.entries.values().collect();
        entries.sort_by(|a, b| a.id.cmp(&b.id));
        entries
    }
}
