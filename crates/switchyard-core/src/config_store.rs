//! Configuration store trait
//!
//! The `ConfigStore` trait is the key-value persistence channel behind the
//! routing configuration. Each aggregate (routing table, policy groups, active
//! group pointer, proxy keys) is stored as one JSON value under a fixed key.

use async_trait::async_trait;
use dashmap::DashMap;
use futures::stream::{self, BoxStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::broadcast;

use crate::Result;

/// Storage keys used by the routing configuration
pub mod keys {
    /// Routing table: `group -> alias -> [target]`
    pub const ROUTING_TABLE: &str = "chat_completion_proxy";
    /// Policy group list
    pub const POLICY_GROUPS: &str = "proxy_groups";
    /// Active group name (string or null)
    pub const ACTIVE_GROUP: &str = "active_proxy_group";
    /// Proxy access keys
    pub const PROXY_KEYS: &str = "chat_completion_proxy_keys";

    /// Every key the routing configuration owns
    pub const ALL: [&str; 4] = [ROUTING_TABLE, POLICY_GROUPS, ACTIVE_GROUP, PROXY_KEYS];
}

/// Type alias for configuration change streams
pub type ConfigChangeStream<'a> = BoxStream<'a, Result<ConfigChange>>;

/// Configuration change notification
#[derive(Debug, Clone)]
pub struct ConfigChange {
    /// Key that changed, if the store can tell
    pub key: Option<String>,

    /// Timestamp of the change
    pub timestamp: chrono::DateTime<chrono::Utc>,

    /// Store version after the change
    pub version: u32,
}

/// Configuration store trait
///
/// Implementations:
/// - `MemoryConfigStore`: in-process map (tests, embedding)
/// - `FileConfigStore`: YAML/TOML/JSON document on disk
///
/// # Example
/// ```no_run
/// # use switchyard_core::config_store::{ConfigStore, keys};
/// # async fn example(store: &dyn ConfigStore) -> switchyard_core::Result<()> {
/// let table = store.get(keys::ROUTING_TABLE).await?;
/// store.set(keys::ACTIVE_GROUP, serde_json::json!("work")).await?;
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Read the value stored under `key`, `None` if it was never written
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>>;

    /// Durably store `value` under `key`
    async fn set(&self, key: &str, value: serde_json::Value) -> Result<()>;

    /// Store several keys together
    ///
    /// Either every entry is stored or, on error, none is.
    async fn set_many(&self, entries: Vec<(String, serde_json::Value)>) -> Result<()>;

    /// Watch for configuration changes
    ///
    /// The stream emits whenever the stored configuration is modified,
    /// including by other processes where the store supports it.
    async fn watch_changes(&self) -> Result<ConfigChangeStream<'_>>;

    /// Current store version (incremented on each write)
    fn version(&self) -> u32;
}

/// In-memory `ConfigStore`
#[derive(Debug, Clone)]
pub struct MemoryConfigStore {
    values: Arc<DashMap<String, serde_json::Value>>,
    version: Arc<AtomicU32>,
    changes: broadcast::Sender<ConfigChange>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(64);
        Self {
            values: Arc::new(DashMap::new()),
            version: Arc::new(AtomicU32::new(0)),
            changes,
        }
    }

    fn bump(&self, key: Option<String>) {
        let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!("Memory store at version {} (key: {:?})", version, key);
        // No subscribers is not an error
        let _ = self.changes.send(ConfigChange {
            key,
            timestamp: chrono::Utc::now(),
            version,
        });
    }
}

impl Default for MemoryConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>> {
        Ok(self.values.get(key).map(|v| v.value().clone()))
    }

    async fn set(&self, key: &str, value: serde_json::Value) -> Result<()> {
        self.values.insert(key.to_string(), value);
        self.bump(Some(key.to_string()));
        Ok(())
    }

    async fn set_many(&self, entries: Vec<(String, serde_json::Value)>) -> Result<()> {
        let key = match entries.as_slice() {
            [(only, _)] => Some(only.clone()),
            _ => None,
        };
        for (k, v) in entries {
            self.values.insert(k, v);
        }
        self.bump(key);
        Ok(())
    }

    async fn watch_changes(&self) -> Result<ConfigChangeStream<'_>> {
        let rx = self.changes.subscribe();
        let stream = stream::unfold(rx, |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(change) => return Some((Ok(change), rx)),
                    // A slow watcher only needs to know that something changed
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        });
        Ok(Box::pin(stream))
    }

    fn version(&self) -> u32 {
        self.version.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_memory_store_round_trip() {
        let store = MemoryConfigStore::new();
        assert!(store.get(keys::ACTIVE_GROUP).await.unwrap().is_none());

        store
            .set(keys::ACTIVE_GROUP, serde_json::json!("work"))
            .await
            .unwrap();

        assert_eq!(
            store.get(keys::ACTIVE_GROUP).await.unwrap(),
            Some(serde_json::json!("work"))
        );
        assert_eq!(store.version(), 1);
    }

    #[tokio::test]
    async fn test_memory_store_set_many_bumps_once() {
        let store = MemoryConfigStore::new();
        store
            .set_many(vec![
                (keys::POLICY_GROUPS.to_string(), serde_json::json!([])),
                (keys::ROUTING_TABLE.to_string(), serde_json::json!({})),
            ])
            .await
            .unwrap();

        assert_eq!(store.version(), 1);
        assert!(store.get(keys::POLICY_GROUPS).await.unwrap().is_some());
        assert!(store.get(keys::ROUTING_TABLE).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_memory_store_watch() {
        let store = MemoryConfigStore::new();
        let mut changes = store.watch_changes().await.unwrap();

        store
            .set(keys::PROXY_KEYS, serde_json::json!([]))
            .await
            .unwrap();

        let change = changes.next().await.unwrap().unwrap();
        assert_eq!(change.key.as_deref(), Some(keys::PROXY_KEYS));
        assert_eq!(change.version, 1);
    }

    #[test]
    fn test_config_change_creation() {
        let change = ConfigChange {
            key: Some(keys::ROUTING_TABLE.to_string()),
            timestamp: chrono::Utc::now(),
            version: 1,
        };

        assert!(change.key.is_some());
        assert_eq!(change.version, 1);
    }
}
