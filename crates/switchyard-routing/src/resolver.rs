//! Route resolution
//!
//! Joins the routing table and the policy book by group name for one
//! incoming request. Resolution is pure: callers hand in snapshots and get
//! back an owned `ResolvedRoute`.

use serde::Serialize;
use switchyard_core::{Error, Result, TargetRef};
use tracing::{debug, warn};

use crate::overlay::Overlay;
use crate::policy_book::PolicyBook;
use crate::routing_table::RoutingTable;

/// Targets and overlay for one `(group, alias)` request
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedRoute {
    /// Effective group name after switch path substitution
    pub group: String,
    pub alias: String,
    /// Every target of the alias, in configured order
    pub targets: Vec<TargetRef>,
    pub overlay: Overlay,
    /// Whether the request came in on the switch path
    pub via_switch: bool,
}

impl ResolvedRoute {
    /// First configured target
    pub fn primary(&self) -> Option<&TargetRef> {
        self.targets.first()
    }
}

/// Resolve `alias` in `group`
///
/// When `group` is the switch path the active group pointer supplies the
/// effective group. A disabled policy group never serves traffic; a routing
/// group without a policy group gets the default overlay.
pub fn resolve_route(
    table: &RoutingTable,
    policies: &PolicyBook,
    switch_path: &str,
    group: &str,
    alias: &str,
) -> Result<ResolvedRoute> {
    let via_switch = group.eq_ignore_ascii_case(switch_path);

    let effective = if via_switch {
        policies.active().ok_or_else(|| {
            warn!("Switch path requested for alias '{}' but no group is active", alias);
            Error::NotFound("no active group".to_string())
        })?
    } else {
        group
    };

    let overlay = match policies.find_by_name(effective) {
        Some(policy) if policy.disabled => {
            warn!("Policy group '{}' is disabled", policy.name);
            return Err(Error::NotFound(format!("group '{}' is disabled", effective)));
        }
        Some(policy) => Overlay::from(policy),
        None => {
            debug!("No policy group named '{}', using default overlay", effective);
            Overlay::default()
        }
    };

    let targets = table.get(effective, alias).ok_or_else(|| {
        warn!("No alias '{}' in group '{}'", alias, effective);
        Error::NotFound(format!("alias '{}' in group '{}'", alias, effective))
    })?;

    debug!(
        "Resolved {}/{} to {} targets{}",
        effective,
        alias,
        targets.len(),
        if via_switch { " via switch" } else { "" }
    );

    Ok(ResolvedRoute {
        group: effective.to_string(),
        alias: alias.to_string(),
        targets: targets.to_vec(),
        overlay,
        via_switch,
    })
}
