//! Policy group manager
//!
//! Owns the policy group list and the active group pointer. Group names are
//! unique ignoring case, and the switch path name is reserved because it
//! selects the active group instead of naming one.

use switchyard_core::policy::sanitize_prompt_replace;
use switchyard_core::{Error, GroupId, PolicyGroup, Result, ToolCompatMode};
use tracing::{debug, info, warn};

use crate::batch::BatchFields;

/// Name reserved for the wildcard switch path
pub const RESERVED_GROUP_NAME: &str = "switch";

/// Policy groups plus the active group pointer
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PolicyBook {
    groups: Vec<PolicyGroup>,
    active: Option<String>,
    /// Extra reserved name when the switch path is configured differently
    switch_path: Option<String>,
}

impl PolicyBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a book from stored state
    pub fn from_parts(groups: Vec<PolicyGroup>, active: Option<String>) -> Self {
        Self {
            groups,
            active,
            switch_path: None,
        }
    }

    /// Also reserve `switch_path` as a group name
    pub fn with_switch_path(mut self, switch_path: impl Into<String>) -> Self {
        let switch_path = switch_path.into();
        if !switch_path.eq_ignore_ascii_case(RESERVED_GROUP_NAME) {
            self.switch_path = Some(switch_path);
        }
        self
    }

    /// All groups in insertion order
    pub fn groups(&self) -> &[PolicyGroup] {
        &self.groups
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn get(&self, id: GroupId) -> Option<&PolicyGroup> {
        self.groups.iter().find(|g| g.id == id)
    }

    /// Find a group by name, ignoring case
    pub fn find_by_name(&self, name: &str) -> Option<&PolicyGroup> {
        self.groups.iter().find(|g| g.is_named(name))
    }

    /// Name the active group pointer holds, if any
    pub fn active(&self) -> Option<&str> {
        self.active.as_deref()
    }

    fn is_reserved(&self, name: &str) -> bool {
        name.eq_ignore_ascii_case(RESERVED_GROUP_NAME)
            || self
                .switch_path
                .as_deref()
                .is_some_and(|path| name.eq_ignore_ascii_case(path))
    }

    /// Normalize and validate a group against the others
    ///
    /// `self_id` is excluded from the uniqueness check on update.
    fn prepare(&self, mut group: PolicyGroup, self_id: Option<GroupId>) -> Result<PolicyGroup> {
        group.name = group.name.trim().to_string();

        if group.name.is_empty() {
            return Err(Error::validation("name", "group name must not be empty"));
        }
        if self.is_reserved(&group.name) {
            return Err(Error::validation(
                "name",
                format!("'{}' is reserved for the switch path", group.name),
            ));
        }
        if self
            .groups
            .iter()
            .any(|g| Some(g.id) != self_id && g.is_named(&group.name))
        {
            return Err(Error::validation(
                "name",
                format!("a group named '{}' already exists", group.name),
            ));
        }
        validate_temperature_ratio(group.temperature_ratio)?;

        group.prompt_replace = sanitize_prompt_replace(&group.prompt_replace);
        group.model_injection_condition = group
            .model_injection_condition
            .filter(|c| !c.trim().is_empty());

        Ok(group)
    }

    /// Add a new group, assigning it a fresh id
    pub fn create(&mut self, mut group: PolicyGroup) -> Result<&PolicyGroup> {
        group.id = GroupId::new();
        let group = self.prepare(group, None)?;
        info!("Created policy group '{}' ({})", group.name, group.id);
        self.groups.push(group);
        Ok(&self.groups[self.groups.len() - 1])
    }

    /// Replace an existing group
    ///
    /// Returns the previous name when the update renamed the group, so the
    /// caller can cascade the rename to the routing table.
    pub fn update(&mut self, group: PolicyGroup) -> Result<Option<String>> {
        let index = self
            .position(group.id)
            .ok_or_else(|| Error::NotFound(format!("policy group {}", group.id)))?;

        let group = self.prepare(group, Some(self.groups[index].id))?;
        let new_name = group.name.clone();
        let old_name = std::mem::replace(&mut self.groups[index], group).name;

        if old_name == new_name {
            debug!("Updated policy group '{}'", new_name);
            return Ok(None);
        }

        info!("Renamed policy group '{}' to '{}'", old_name, new_name);
        if self
            .active
            .as_deref()
            .is_some_and(|active| active.eq_ignore_ascii_case(&old_name))
        {
            self.active = Some(new_name);
        }
        Ok(Some(old_name))
    }

    /// Remove a group
    ///
    /// Routing-table aliases under its name are not touched.
    pub fn delete(&mut self, id: GroupId) -> Result<PolicyGroup> {
        let index = self
            .position(id)
            .ok_or_else(|| Error::NotFound(format!("policy group {}", id)))?;
        let removed = self.groups.remove(index);

        if self
            .active
            .as_deref()
            .is_some_and(|active| removed.is_named(active))
        {
            warn!(
                "Deleted policy group '{}' is still the active group",
                removed.name
            );
        }
        info!("Deleted policy group '{}' ({})", removed.name, removed.id);
        Ok(removed)
    }

    /// Point the switch path at `name`
    ///
    /// The name does not have to match an existing group yet.
    pub fn set_active(&mut self, name: &str) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::validation("name", "active group name must not be empty"));
        }
        if self.is_reserved(name) {
            return Err(Error::validation(
                "name",
                "the switch path cannot point at itself",
            ));
        }

        if self.find_by_name(name).is_none() {
            warn!("Active group '{}' has no policy group yet", name);
        }

        let previous = self.active.replace(name.to_string());
        info!("Active group changed from {:?} to '{}'", previous, name);
        Ok(())
    }

    /// Clear the active group pointer
    pub fn clear_active(&mut self) -> Option<String> {
        self.active.take()
    }

    /// Advance a group's tool-compat mode one step and return the new mode
    pub fn cycle_tool_compat_mode(&mut self, id: GroupId) -> Result<ToolCompatMode> {
        let group = self
            .groups
            .iter_mut()
            .find(|g| g.id == id)
            .ok_or_else(|| Error::NotFound(format!("policy group {}", id)))?;

        group.tool_compat_mode = group.tool_compat_mode.next();
        debug!(
            "Tool compat mode of '{}' is now {}",
            group.name, group.tool_compat_mode
        );
        Ok(group.tool_compat_mode)
    }

    /// Apply the enabled fields to every listed group
    ///
    /// All ids are checked before anything changes; an unknown id fails the
    /// whole batch and leaves every group as it was.
    pub fn batch_update(&mut self, ids: &[GroupId], fields: &BatchFields) -> Result<usize> {
        if ids.is_empty() {
            return Err(Error::validation("ids", "no groups selected"));
        }
        if fields.is_empty() {
            return Err(Error::validation("fields", "no fields selected"));
        }
        if let Some(ratio) = fields.temperature_ratio {
            validate_temperature_ratio(ratio)?;
        }

        let mut indices = Vec::with_capacity(ids.len());
        for id in ids {
            let index = self
                .position(*id)
                .ok_or_else(|| Error::NotFound(format!("policy group {}", id)))?;
            if !indices.contains(&index) {
                indices.push(index);
            }
        }

        let fields = fields.sanitized();
        for index in &indices {
            fields.apply_to(&mut self.groups[*index]);
        }

        info!(
            "Batch updated {} policy groups ({} fields)",
            indices.len(),
            fields.enabled_count()
        );
        Ok(indices.len())
    }

    /// Rule violations in groups that did not pass through `create`/`update`
    ///
    /// Stored groups are loaded as they are; a hand-edited store can hold
    /// reserved names, names that clash ignoring case or an out-of-range
    /// temperature ratio.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        for (index, group) in self.groups.iter().enumerate() {
            if group.name.trim().is_empty() {
                problems.push(format!("group {} has an empty name", group.id));
            } else if self.is_reserved(group.name.trim()) {
                problems.push(format!(
                    "group '{}' uses a name reserved for the switch path",
                    group.name
                ));
            }
            if self.groups[..index].iter().any(|g| g.is_named(&group.name)) {
                problems.push(format!(
                    "group '{}' duplicates another group's name",
                    group.name
                ));
            }
            if validate_temperature_ratio(group.temperature_ratio).is_err() {
                problems.push(format!(
                    "group '{}' has temperature ratio {} outside [0, 1]",
                    group.name, group.temperature_ratio
                ));
            }
        }
        problems
    }

    fn position(&self, id: GroupId) -> Option<usize> {
        self.groups.iter().position(|g| g.id == id)
    }
}

fn validate_temperature_ratio(ratio: f32) -> Result<()> {
    if (0.0..=1.0).contains(&ratio) {
        Ok(())
    } else {
        Err(Error::validation(
            "temperatureRatio",
            format!("must be between 0 and 1, got {}", ratio),
        ))
    }
}
