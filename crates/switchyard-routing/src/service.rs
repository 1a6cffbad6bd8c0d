//! Proxy configuration service
//!
//! Owns the routing table, the policy book and the key registry behind
//! `tokio` read-write locks. Every mutation works on a copy of the current
//! state, persists the copy and only then swaps it in, so a failed write
//! leaves memory untouched. Locks are always taken in the order
//! policies, routes, keys.

use futures::StreamExt;
use serde::Serialize;
use std::sync::Arc;
use switchyard_core::config_store::keys as store_keys;
use switchyard_core::{
    ConfigStore, Error, GroupId, PolicyGroup, ProviderDirectory, ProxyKey, Result, TargetRef,
    ToolCompatMode,
};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::batch::BatchFields;
use crate::keys::{KeyRegistry, KeySelector};
use crate::policy_book::{PolicyBook, RESERVED_GROUP_NAME};
use crate::resolver::{ResolvedRoute, resolve_route};
use crate::routing_table::{AliasEdit, RenameReport, RoutingTable};
use crate::validation::TargetValidator;

/// Default listening URL of the proxy
pub const DEFAULT_PROXY_ENDPOINT: &str = "http://127.0.0.1:11434";

/// Service settings
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Group name that routes to the active group
    pub switch_path: String,
    /// The proxy's own listening URL, used to reject self-routing targets
    pub proxy_endpoint: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            switch_path: RESERVED_GROUP_NAME.to_string(),
            proxy_endpoint: DEFAULT_PROXY_ENDPOINT.to_string(),
        }
    }
}

/// Result of a policy group update
#[derive(Debug, Clone, PartialEq)]
pub struct GroupUpdate {
    pub group: PolicyGroup,
    /// Set when the update renamed the group
    pub rename: Option<RenameReport>,
}

struct Snapshot {
    policies: PolicyBook,
    routes: RoutingTable,
    keys: KeyRegistry,
}

pub struct ProxyConfigService {
    store: Arc<dyn ConfigStore>,
    validator: TargetValidator,
    switch_path: String,
    policies: RwLock<PolicyBook>,
    routes: RwLock<RoutingTable>,
    keys: RwLock<KeyRegistry>,
}

impl ProxyConfigService {
    /// Create a service with empty state
    pub fn new(
        store: Arc<dyn ConfigStore>,
        directory: Arc<dyn ProviderDirectory>,
        config: ServiceConfig,
    ) -> Self {
        let policies = PolicyBook::new().with_switch_path(config.switch_path.clone());
        Self {
            store,
            validator: TargetValidator::new(directory, &config.proxy_endpoint),
            switch_path: config.switch_path,
            policies: RwLock::new(policies),
            routes: RwLock::new(RoutingTable::new()),
            keys: RwLock::new(KeyRegistry::new()),
        }
    }

    /// Create a service from the state in `store`
    ///
    /// Keys that were never written load as empty state.
    pub async fn load(
        store: Arc<dyn ConfigStore>,
        directory: Arc<dyn ProviderDirectory>,
        config: ServiceConfig,
    ) -> Result<Self> {
        let service = Self::new(store, directory, config);
        service.reload().await?;
        Ok(service)
    }

    /// Re-read all state from the store
    pub async fn reload(&self) -> Result<()> {
        // Hold every lock while reading so no mutation lands in between
        let mut policies = self.policies.write().await;
        let mut routes = self.routes.write().await;
        let mut keys = self.keys.write().await;

        let snapshot = self.read_snapshot().await?;

        info!(
            "Loaded {} policy groups, {} routing groups ({} aliases), {} keys",
            snapshot.policies.len(),
            snapshot.routes.len(),
            snapshot.routes.alias_count(),
            snapshot.keys.len()
        );

        *policies = snapshot.policies;
        *routes = snapshot.routes;
        *keys = snapshot.keys;
        Ok(())
    }

    async fn read_snapshot(&self) -> Result<Snapshot> {
        let groups: Vec<PolicyGroup> = self.read_key(store_keys::POLICY_GROUPS).await?;
        let active: Option<String> = self.read_key(store_keys::ACTIVE_GROUP).await?;
        let routes: RoutingTable = self.read_key(store_keys::ROUTING_TABLE).await?;
        let keys: Vec<ProxyKey> = self.read_key(store_keys::PROXY_KEYS).await?;

        let policies =
            PolicyBook::from_parts(groups, active).with_switch_path(self.switch_path.clone());
        for problem in policies.problems() {
            warn!("Stored policy groups: {}", problem);
        }

        Ok(Snapshot {
            policies,
            routes,
            keys: KeyRegistry::from(keys),
        })
    }

    async fn read_key<T>(&self, key: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned + Default,
    {
        match self.store.get(key).await? {
            Some(serde_json::Value::Null) | None => {
                debug!("Store key '{}' is empty", key);
                Ok(T::default())
            }
            Some(value) => serde_json::from_value(value).map_err(|e| {
                error!("Stored value under '{}' is malformed: {}", key, e);
                Error::Store(format!("malformed value under '{}': {}", key, e))
            }),
        }
    }

    /// Reload whenever the store reports a change
    ///
    /// Runs until the change stream ends.
    pub fn watch_store(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let store = self.store.clone();
            let mut changes = match store.watch_changes().await {
                Ok(changes) => changes,
                Err(e) => {
                    error!("Failed to watch config store: {}", e);
                    return;
                }
            };

            while let Some(change) = changes.next().await {
                match change {
                    Ok(change) if change.version == store.version() => {
                        debug!("Config store changed (version {})", change.version);
                        if let Err(e) = self.reload().await {
                            error!("Failed to reload configuration: {}", e);
                        }
                    }
                    Ok(change) => {
                        debug!("Skipping stale change notification v{}", change.version);
                    }
                    Err(e) => warn!("Config watch error: {}", e),
                }
            }
            debug!("Config store watch ended");
        })
    }

    async fn persist(&self, entries: Vec<(String, serde_json::Value)>) -> Result<()> {
        let keys: Vec<String> = entries.iter().map(|(k, _)| k.clone()).collect();
        let result = match <[_; 1]>::try_from(entries) {
            Ok([(key, value)]) => self.store.set(&key, value).await,
            Err(entries) => self.store.set_many(entries).await,
        };
        if let Err(e) = &result {
            error!("Failed to persist {:?}: {}", keys, e);
        }
        result
    }

    pub fn switch_path(&self) -> &str {
        &self.switch_path
    }

    pub fn validator(&self) -> &TargetValidator {
        &self.validator
    }

    // ---- Reads ----

    pub async fn policy_groups(&self) -> Vec<PolicyGroup> {
        self.policies.read().await.groups().to_vec()
    }

    pub async fn policy_group(&self, id: GroupId) -> Option<PolicyGroup> {
        self.policies.read().await.get(id).cloned()
    }

    pub async fn active_group(&self) -> Option<String> {
        self.policies.read().await.active().map(str::to_string)
    }

    /// Snapshot of the routing table
    pub async fn routing_table(&self) -> RoutingTable {
        self.routes.read().await.clone()
    }

    pub async fn keys(&self) -> Vec<ProxyKey> {
        self.keys.read().await.keys().to_vec()
    }

    /// Resolve a request's group and alias
    pub async fn resolve(&self, group: &str, alias: &str) -> Result<ResolvedRoute> {
        let policies = self.policies.read().await;
        let routes = self.routes.read().await;
        resolve_route(&routes, &policies, &self.switch_path, group, alias)
    }

    // ---- Policy groups ----

    pub async fn create_group(&self, group: PolicyGroup) -> Result<PolicyGroup> {
        let mut policies = self.policies.write().await;
        let mut next = policies.clone();
        let created = next.create(group)?.clone();

        self.persist(vec![groups_entry(&next)?]).await?;
        *policies = next;
        Ok(created)
    }

    /// Update a group, moving its routing aliases when the name changes
    pub async fn update_group(&self, group: PolicyGroup) -> Result<GroupUpdate> {
        let id = group.id;
        let mut policies = self.policies.write().await;
        let mut next = policies.clone();

        let Some(old_name) = next.update(group)? else {
            self.persist(vec![groups_entry(&next)?]).await?;
            *policies = next;
            return Ok(GroupUpdate {
                group: self.updated(&policies, id)?,
                rename: None,
            });
        };

        let updated = self.updated(&next, id)?;
        let mut routes = self.routes.write().await;
        let mut next_routes = routes.clone();
        let report = next_routes.rename_group(&old_name, &updated.name);
        for conflict in &report.conflicts {
            warn!("Rename of '{}': {}", old_name, conflict);
        }

        self.persist(vec![
            groups_entry(&next)?,
            active_entry(&next),
            routes_entry(&next_routes)?,
        ])
        .await?;

        *policies = next;
        *routes = next_routes;
        Ok(GroupUpdate {
            group: updated,
            rename: Some(report),
        })
    }

    fn updated(&self, book: &PolicyBook, id: GroupId) -> Result<PolicyGroup> {
        book.get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("policy group {}", id)))
    }

    /// Rename a group
    pub async fn rename_group(&self, id: GroupId, new_name: &str) -> Result<GroupUpdate> {
        let mut group = self
            .policy_group(id)
            .await
            .ok_or_else(|| Error::NotFound(format!("policy group {}", id)))?;
        group.name = new_name.to_string();
        self.update_group(group).await
    }

    /// Delete a policy group; its routing aliases stay routable
    pub async fn delete_group(&self, id: GroupId) -> Result<PolicyGroup> {
        let mut policies = self.policies.write().await;
        let mut next = policies.clone();
        let removed = next.delete(id)?;

        self.persist(vec![groups_entry(&next)?]).await?;
        *policies = next;
        Ok(removed)
    }

    /// Remove the routing aliases of a group that has no policy group
    pub async fn purge_orphaned_aliases(&self, group: &str) -> Result<usize> {
        let policies = self.policies.read().await;
        if policies.find_by_name(group).is_some() {
            return Err(Error::validation(
                "group",
                format!("'{}' still has a policy group", group),
            ));
        }

        let mut routes = self.routes.write().await;
        if !routes.contains_group(group) {
            return Ok(0);
        }
        let mut next = routes.clone();
        let removed = next.remove_group(group);

        self.persist(vec![routes_entry(&next)?]).await?;
        *routes = next;
        info!("Purged {} orphaned aliases of '{}'", removed, group);
        Ok(removed)
    }

    pub async fn set_active(&self, name: &str) -> Result<()> {
        let mut policies = self.policies.write().await;
        let mut next = policies.clone();
        next.set_active(name)?;

        self.persist(vec![active_entry(&next)]).await?;
        *policies = next;
        Ok(())
    }

    pub async fn clear_active(&self) -> Result<Option<String>> {
        let mut policies = self.policies.write().await;
        let mut next = policies.clone();
        let previous = next.clear_active();

        self.persist(vec![active_entry(&next)]).await?;
        *policies = next;
        Ok(previous)
    }

    pub async fn cycle_tool_compat_mode(&self, id: GroupId) -> Result<ToolCompatMode> {
        let mut policies = self.policies.write().await;
        let mut next = policies.clone();
        let mode = next.cycle_tool_compat_mode(id)?;

        self.persist(vec![groups_entry(&next)?]).await?;
        *policies = next;
        Ok(mode)
    }

    /// Apply `fields` to every group in `ids`, or to none
    pub async fn batch_update(&self, ids: &[GroupId], fields: &BatchFields) -> Result<usize> {
        let mut policies = self.policies.write().await;
        let mut next = policies.clone();
        let updated = next.batch_update(ids, fields)?;

        self.persist(vec![groups_entry(&next)?]).await?;
        *policies = next;
        Ok(updated)
    }

    /// Batch update with every field copied from the `template` group
    pub async fn batch_from_template(&self, ids: &[GroupId], template: GroupId) -> Result<usize> {
        let fields = {
            let policies = self.policies.read().await;
            let template = policies
                .get(template)
                .ok_or_else(|| Error::NotFound(format!("template group {}", template)))?;
            BatchFields::from_template(template)
        };
        self.batch_update(ids, &fields).await
    }

    // ---- Routing table ----

    /// Create or replace an alias
    ///
    /// The switch path cannot hold aliases of its own, since resolution
    /// always substitutes the active group for it.
    pub async fn upsert_alias(&self, edit: AliasEdit) -> Result<()> {
        let group = edit.group.trim();
        if group.eq_ignore_ascii_case(RESERVED_GROUP_NAME)
            || group.eq_ignore_ascii_case(&self.switch_path)
        {
            return Err(Error::validation(
                "group",
                format!("'{}' is reserved for the switch path", group),
            ));
        }

        let mut routes = self.routes.write().await;
        let mut next = routes.clone();
        next.upsert_alias(edit, &self.validator)?;

        self.persist(vec![routes_entry(&next)?]).await?;
        *routes = next;
        Ok(())
    }

    pub async fn remove_alias(&self, group: &str, alias: &str) -> Result<Vec<TargetRef>> {
        let mut routes = self.routes.write().await;
        let mut next = routes.clone();
        let removed = next.remove_alias(group, alias)?;

        self.persist(vec![routes_entry(&next)?]).await?;
        *routes = next;
        info!("Removed alias {}/{}", group, alias);
        Ok(removed)
    }

    // ---- Keys ----

    /// Issue a key; the token is only ever returned here
    pub async fn issue_key(&self, name: &str) -> Result<String> {
        let mut keys = self.keys.write().await;
        let mut next = keys.clone();
        let token = next.issue(name)?;

        self.persist(vec![keys_entry(&next)?]).await?;
        *keys = next;
        Ok(token)
    }

    pub async fn revoke_key(&self, selector: &KeySelector) -> Result<ProxyKey> {
        let mut keys = self.keys.write().await;
        let mut next = keys.clone();
        let removed = next.revoke(selector)?;

        self.persist(vec![keys_entry(&next)?]).await?;
        *keys = next;
        Ok(removed)
    }

    pub async fn authenticate(&self, token: &str) -> Result<ProxyKey> {
        self.keys.read().await.authenticate(token).cloned()
    }
}

impl std::fmt::Debug for ProxyConfigService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyConfigService")
            .field("switch_path", &self.switch_path)
            .field("validator", &self.validator)
            .finish_non_exhaustive()
    }
}

fn entry<T: Serialize + ?Sized>(key: &str, value: &T) -> Result<(String, serde_json::Value)> {
    Ok((key.to_string(), serde_json::to_value(value)?))
}

fn groups_entry(book: &PolicyBook) -> Result<(String, serde_json::Value)> {
    entry(store_keys::POLICY_GROUPS, book.groups())
}

fn active_entry(book: &PolicyBook) -> (String, serde_json::Value) {
    let value = book
        .active()
        .map(|name| serde_json::Value::String(name.to_string()))
        .unwrap_or(serde_json::Value::Null);
    (store_keys::ACTIVE_GROUP.to_string(), value)
}

fn routes_entry(table: &RoutingTable) -> Result<(String, serde_json::Value)> {
    entry(store_keys::ROUTING_TABLE, table)
}

fn keys_entry(keys: &KeyRegistry) -> Result<(String, serde_json::Value)> {
    entry(store_keys::PROXY_KEYS, keys)
}
