//! Value types shared by the routing table and the key registry

use serde::{Deserialize, Serialize};
use std::fmt;

/// One upstream (provider, model) pair an alias can route to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetRef {
    /// Provider identifier in the provider directory
    pub provider_id: String,
    /// Model identifier within that provider
    pub model_id: String,
}

impl TargetRef {
    pub fn new(provider_id: impl Into<String>, model_id: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            model_id: model_id.into(),
        }
    }
}

impl fmt::Display for TargetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.provider_id, self.model_id)
    }
}

/// A bearer credential accepted by the proxy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyKey {
    /// Descriptive name shown to the user
    pub name: String,
    /// The token itself (e.g. "cs-xxxx"); immutable once issued
    pub token: String,
}

impl ProxyKey {
    /// Token prefix safe to show in logs
    pub fn redacted(&self) -> String {
        let prefix = self.token.get(..5).unwrap_or(&self.token);
        format!("{}******", prefix)
    }
}
