//! Proxy access keys
//!
//! Keys are independent of groups. Order is insertion order and only matters
//! for display and for revoking by index.

use rand::Rng;
use rand::distr::Alphanumeric;
use serde::{Deserialize, Serialize};
use switchyard_core::{Error, ProxyKey, Result};
use tracing::{debug, info, warn};

/// Prefix of every issued token
pub const TOKEN_PREFIX: &str = "cs-";

/// Total token length, prefix included
pub const TOKEN_LEN: usize = 64;

/// Generate a fresh random token
pub fn generate_token() -> String {
    let body: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LEN - TOKEN_PREFIX.len())
        .map(char::from)
        .collect();
    format!("{}{}", TOKEN_PREFIX, body)
}

/// Which key to revoke
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySelector {
    Index(usize),
    Token(String),
}

impl From<&str> for KeySelector {
    /// Digits select by index, anything else by token
    fn from(raw: &str) -> Self {
        let raw = raw.trim();
        match raw.parse::<usize>() {
            Ok(index) => KeySelector::Index(index),
            Err(_) => KeySelector::Token(raw.to_string()),
        }
    }
}

/// Ordered list of proxy keys
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyRegistry {
    keys: Vec<ProxyKey>,
}

impl KeyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keys(&self) -> &[ProxyKey] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Issue a new key and return its token
    pub fn issue(&mut self, name: &str) -> Result<String> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::validation("name", "key name must not be empty"));
        }

        let mut token = generate_token();
        while self.keys.iter().any(|k| k.token == token) {
            token = generate_token();
        }

        let key = ProxyKey {
            name: name.to_string(),
            token: token.clone(),
        };
        info!("Issued proxy key '{}' ({})", key.name, key.redacted());
        self.keys.push(key);
        Ok(token)
    }

    /// Remove a key
    pub fn revoke(&mut self, selector: &KeySelector) -> Result<ProxyKey> {
        let index = match selector {
            KeySelector::Index(index) if *index < self.keys.len() => *index,
            KeySelector::Index(index) => {
                return Err(Error::NotFound(format!("key #{}", index)));
            }
            KeySelector::Token(token) => self
                .keys
                .iter()
                .position(|k| k.token == *token)
                .ok_or_else(|| Error::NotFound("key with the given token".to_string()))?,
        };

        let removed = self.keys.remove(index);
        info!("Revoked proxy key '{}' ({})", removed.name, removed.redacted());
        Ok(removed)
    }

    /// Check a presented token, returning the matching key
    pub fn authenticate(&self, token: &str) -> Result<&ProxyKey> {
        let token = token.trim();
        if token.is_empty() {
            return Err(Error::validation("token", "no token presented"));
        }
        if self.keys.is_empty() {
            warn!("Rejected request: no proxy keys configured");
            return Err(Error::NotFound("no proxy keys configured".to_string()));
        }

        match self.keys.iter().find(|k| k.token == token) {
            Some(key) => {
                debug!("Authenticated proxy key '{}'", key.name);
                Ok(key)
            }
            None => {
                let prefix = token.get(..5).unwrap_or(token);
                warn!("Rejected unknown proxy token {}******", prefix);
                Err(Error::NotFound("unknown proxy token".to_string()))
            }
        }
    }
}

impl From<Vec<ProxyKey>> for KeyRegistry {
    fn from(keys: Vec<ProxyKey>) -> Self {
        Self { keys }
    }
}

impl From<KeyRegistry> for Vec<ProxyKey> {
    fn from(registry: KeyRegistry) -> Self {
        registry.keys
    }
}
