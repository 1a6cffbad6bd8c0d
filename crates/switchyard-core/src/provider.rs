//! Provider directory definitions
//!
//! Routing targets name providers and models by id. The directory is how the
//! routing layer checks that a target exists, is enabled, and does not point
//! back at the proxy itself.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::types::TargetRef;

/// Lookup of upstream providers by id
pub trait ProviderDirectory: Send + Sync {
    /// Get a provider by id
    fn provider(&self, provider_id: &str) -> Option<ProviderEntry>;

    /// Resolve a target to its provider and model, if both exist
    fn lookup(&self, target: &TargetRef) -> Option<(ProviderEntry, ModelEntry)> {
        let provider = self.provider(&target.provider_id)?;
        let model = provider.model(&target.model_id)?.clone();
        Some((provider, model))
    }
}

/// An upstream AI provider as configured in the application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderEntry {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Base endpoint requests are sent to
    pub base_url: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub models: Vec<ModelEntry>,
}

impl ProviderEntry {
    /// Find a model of this provider by id
    pub fn model(&self, model_id: &str) -> Option<&ModelEntry> {
        self.models.iter().find(|m| m.id == model_id)
    }
}

/// A model offered by a provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelEntry {
    pub id: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Whether the model handles function calling natively
    #[serde(default = "default_true")]
    pub supports_tools: bool,
}

impl ModelEntry {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            enabled: true,
            supports_tools: true,
        }
    }
}

/// Directory backed by a fixed list of providers
#[derive(Debug, Clone, Default)]
pub struct StaticProviderDirectory {
    providers: HashMap<String, ProviderEntry>,
}

impl StaticProviderDirectory {
    pub fn new(providers: impl IntoIterator<Item = ProviderEntry>) -> Self {
        Self {
            providers: providers
                .into_iter()
                .map(|p| (p.id.clone(), p))
                .collect(),
        }
    }

    /// Number of known providers
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl ProviderDirectory for StaticProviderDirectory {
    fn provider(&self, provider_id: &str) -> Option<ProviderEntry> {
        self.providers.get(provider_id).cloned()
    }
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests;
