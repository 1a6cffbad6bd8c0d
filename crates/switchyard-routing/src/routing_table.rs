//! Routing table
//!
//! Maps `group name -> alias name -> ordered targets`. Groups here are joined to
//! policy groups by name only, ignoring ASCII case; a routing group may exist
//! without a policy group and vice versa.
//!
//! Invariants:
//! - alias names are unique within a group (case-sensitive)
//! - every alias holds at least one target, without duplicates
//! - a group with no aliases is not kept in the table

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use switchyard_core::{AliasConflict, Error, Result, TargetRef};
use tracing::{debug, info};

use crate::validation::TargetValidator;

type AliasMap = IndexMap<String, Vec<TargetRef>>;

/// A create-or-edit request for one alias
#[derive(Debug, Clone)]
pub struct AliasEdit {
    /// Group the alias belongs to
    pub group: String,
    /// Alias name after the edit
    pub name: String,
    /// Current name when the edit renames an existing alias
    pub rename_from: Option<String>,
    /// Ordered targets; duplicates are dropped
    pub targets: Vec<TargetRef>,
}

impl AliasEdit {
    pub fn new(group: impl Into<String>, name: impl Into<String>, targets: Vec<TargetRef>) -> Self {
        Self {
            group: group.into(),
            name: name.into(),
            rename_from: None,
            targets,
        }
    }

    /// Mark this edit as a rename of `previous`
    pub fn renaming(mut self, previous: impl Into<String>) -> Self {
        self.rename_from = Some(previous.into());
        self
    }
}

/// Outcome of moving a routing group to a new name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenameReport {
    pub from: String,
    pub to: String,
    /// Number of aliases moved
    pub moved: usize,
    /// Aliases that already existed under the new name and were overwritten
    pub conflicts: Vec<AliasConflict>,
}

/// Routing table of group aliases
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoutingTable {
    groups: IndexMap<String, AliasMap>,
}

impl RoutingTable {
    /// Create a new empty routing table
    pub fn new() -> Self {
        Self::default()
    }

    /// Targets of `alias` in `group`
    pub fn get(&self, group: &str, alias: &str) -> Option<&[TargetRef]> {
        self.groups
            .get(group)
            .and_then(|aliases| aliases.get(alias))
            .map(Vec::as_slice)
    }

    /// All aliases of a group, in insertion order
    pub fn group(&self, group: &str) -> Option<&IndexMap<String, Vec<TargetRef>>> {
        self.groups.get(group)
    }

    /// Iterate over `(group, aliases)` pairs
    pub fn groups(&self) -> impl Iterator<Item = (&str, &IndexMap<String, Vec<TargetRef>>)> {
        self.groups.iter().map(|(name, aliases)| (name.as_str(), aliases))
    }

    pub fn contains_group(&self, group: &str) -> bool {
        self.groups.contains_key(group)
    }

    /// Number of groups
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Total number of aliases across all groups
    pub fn alias_count(&self) -> usize {
        self.groups.values().map(IndexMap::len).sum()
    }

    /// Create or replace an alias
    ///
    /// Targets are validated and deduplicated. When the edit renames an
    /// alias, the new name must not already belong to a different alias of
    /// the same group; the renamed alias keeps its position.
    pub fn upsert_alias(&mut self, edit: AliasEdit, validator: &TargetValidator) -> Result<()> {
        let group = edit.group.trim();
        let name = edit.name.trim();

        if group.is_empty() {
            return Err(Error::validation("group", "group name must not be empty"));
        }
        if name.is_empty() {
            return Err(Error::validation("name", "alias name must not be empty"));
        }

        let targets = validator.validate(&edit.targets)?;

        let previous = edit
            .rename_from
            .as_deref()
            .map(str::trim)
            .filter(|prev| *prev != name);

        let aliases = self.groups.get(group);
        if let Some(previous) = previous {
            let exists = |n: &str| aliases.is_some_and(|a| a.contains_key(n));
            if !exists(previous) {
                return Err(Error::NotFound(format!(
                    "alias '{}' in group '{}'",
                    previous, group
                )));
            }
            if exists(name) {
                return Err(Error::validation(
                    "name",
                    format!("alias '{}' already exists in group '{}'", name, group),
                ));
            }
        }

        let aliases = self.groups.entry(group.to_string()).or_default();
        match previous.and_then(|prev| aliases.get_index_of(prev).map(|i| (prev, i))) {
            Some((prev, index)) => {
                // Rename in place so the alias keeps its position
                aliases.insert(name.to_string(), targets);
                let last = aliases.len() - 1;
                aliases.move_index(last, index);
                aliases.shift_remove(prev);
                info!("Renamed alias {}/{} to {}", group, prev, name);
            }
            None => {
                aliases.insert(name.to_string(), targets);
                debug!("Stored alias {}/{}", group, name);
            }
        }

        Ok(())
    }

    /// Remove an alias, dropping its group when it was the last one
    pub fn remove_alias(&mut self, group: &str, alias: &str) -> Result<Vec<TargetRef>> {
        let aliases = self
            .groups
            .get_mut(group)
            .ok_or_else(|| Error::NotFound(format!("group '{}'", group)))?;

        let targets = aliases
            .shift_remove(alias)
            .ok_or_else(|| Error::NotFound(format!("alias '{}' in group '{}'", alias, group)))?;

        if aliases.is_empty() {
            self.groups.shift_remove(group);
            debug!("Routing group '{}' is empty and was dropped", group);
        }

        Ok(targets)
    }

    /// Remove a whole routing group, returning how many aliases it held
    pub fn remove_group(&mut self, group: &str) -> usize {
        self.groups
            .shift_remove(group)
            .map(|aliases| aliases.len())
            .unwrap_or(0)
    }

    /// Move every alias of `from` to `to`
    ///
    /// Every routing group whose name matches `from` ignoring ASCII case is
    /// moved, since policy groups join to routing groups that way. Aliases
    /// already present under `to` are overwritten by the ones being moved;
    /// each overwrite is reported as a conflict. The move is computed before
    /// the table is touched, so the table is never left half-moved.
    pub fn rename_group(&mut self, from: &str, to: &str) -> RenameReport {
        let mut report = RenameReport {
            from: from.to_string(),
            to: to.to_string(),
            ..RenameReport::default()
        };

        if from == to {
            return report;
        }

        let sources: Vec<&String> = self
            .groups
            .keys()
            .filter(|name| name.eq_ignore_ascii_case(from) && name.as_str() != to)
            .collect();
        if sources.is_empty() {
            return report;
        }

        let mut merged = self.groups.get(to).cloned().unwrap_or_default();
        for source in &sources {
            for (alias, targets) in &self.groups[source.as_str()] {
                if merged.insert(alias.clone(), targets.clone()).is_some() {
                    report.conflicts.push(AliasConflict {
                        group: to.to_string(),
                        alias: alias.clone(),
                    });
                }
                report.moved += 1;
            }
        }

        let sources: Vec<String> = sources.into_iter().cloned().collect();
        for source in &sources {
            self.groups.shift_remove(source);
        }
        self.groups.insert(to.to_string(), merged);

        info!(
            "Moved {} aliases from routing group '{}' to '{}' ({} overwritten)",
            report.moved,
            from,
            to,
            report.conflicts.len()
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use switchyard_core::{ModelEntry, ProviderEntry, StaticProviderDirectory};

    fn validator() -> TargetValidator {
        let directory = StaticProviderDirectory::new(vec![ProviderEntry {
            id: "p1".to_string(),
            name: "p1".to_string(),
            base_url: "https://api.example.com/v1".to_string(),
            enabled: true,
            models: vec![
                ModelEntry::new("gpt-4"),
                ModelEntry::new("gpt-4o"),
                ModelEntry::new("mini"),
            ],
        }]);
        TargetValidator::new(Arc::new(directory), "http://127.0.0.1:11434")
    }

    fn t(model: &str) -> TargetRef {
        TargetRef::new("p1", model)
    }

    fn table_with(entries: &[(&str, &str, &str)]) -> RoutingTable {
        let v = validator();
        let mut table = RoutingTable::new();
        for (group, alias, model) in entries {
            table
                .upsert_alias(AliasEdit::new(*group, *alias, vec![t(model)]), &v)
                .unwrap();
        }
        table
    }

    #[test]
    fn test_upsert_and_get() {
        let table = table_with(&[("default", "gpt", "gpt-4")]);
        assert_eq!(table.get("default", "gpt"), Some(&[t("gpt-4")][..]));
        assert_eq!(table.get("default", "GPT"), None);
        assert_eq!(table.len(), 1);
        assert_eq!(table.alias_count(), 1);
    }

    #[test]
    fn test_upsert_rejects_empty_targets_and_names() {
        let v = validator();
        let mut table = RoutingTable::new();

        let err = table
            .upsert_alias(AliasEdit::new("default", "gpt", vec![]), &v)
            .unwrap_err();
        assert_eq!(err.field(), Some("targets"));

        let err = table
            .upsert_alias(AliasEdit::new("default", " ", vec![t("gpt-4")]), &v)
            .unwrap_err();
        assert_eq!(err.field(), Some("name"));

        let err = table
            .upsert_alias(AliasEdit::new("", "gpt", vec![t("gpt-4")]), &v)
            .unwrap_err();
        assert_eq!(err.field(), Some("group"));

        assert!(table.is_empty());
    }

    #[test]
    fn test_same_alias_name_in_different_groups() {
        let table = table_with(&[("a", "gpt", "gpt-4"), ("b", "gpt", "mini")]);
        assert_eq!(table.get("a", "gpt"), Some(&[t("gpt-4")][..]));
        assert_eq!(table.get("b", "gpt"), Some(&[t("mini")][..]));
    }

    #[test]
    fn test_rename_alias_keeps_position() {
        let v = validator();
        let mut table = table_with(&[
            ("g", "first", "gpt-4"),
            ("g", "second", "gpt-4o"),
            ("g", "third", "mini"),
        ]);

        table
            .upsert_alias(
                AliasEdit::new("g", "renamed", vec![t("gpt-4o")]).renaming("second"),
                &v,
            )
            .unwrap();

        let names: Vec<_> = table.group("g").unwrap().keys().cloned().collect();
        assert_eq!(names, vec!["first", "renamed", "third"]);
        assert!(table.get("g", "second").is_none());
    }

    #[test]
    fn test_rename_alias_collision_rejected() {
        let v = validator();
        let mut table = table_with(&[("g", "a", "gpt-4"), ("g", "b", "mini")]);

        let err = table
            .upsert_alias(AliasEdit::new("g", "b", vec![t("gpt-4o")]).renaming("a"), &v)
            .unwrap_err();
        assert_eq!(err.field(), Some("name"));
        assert_eq!(table.get("g", "a"), Some(&[t("gpt-4")][..]));
        assert_eq!(table.get("g", "b"), Some(&[t("mini")][..]));
    }

    #[test]
    fn test_rename_alias_to_same_name_is_plain_update() {
        let v = validator();
        let mut table = table_with(&[("g", "a", "gpt-4")]);
        table
            .upsert_alias(AliasEdit::new("g", "a", vec![t("mini")]).renaming("a"), &v)
            .unwrap();
        assert_eq!(table.get("g", "a"), Some(&[t("mini")][..]));
    }

    #[test]
    fn test_rename_missing_alias() {
        let v = validator();
        let mut table = table_with(&[("g", "a", "gpt-4")]);
        let err = table
            .upsert_alias(AliasEdit::new("g", "c", vec![t("mini")]).renaming("b"), &v)
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_remove_last_alias_drops_group() {
        let mut table = table_with(&[("g", "a", "gpt-4"), ("g", "b", "mini")]);

        table.remove_alias("g", "a").unwrap();
        assert!(table.contains_group("g"));

        let removed = table.remove_alias("g", "b").unwrap();
        assert_eq!(removed, vec![t("mini")]);
        assert!(!table.contains_group("g"));

        assert!(matches!(
            table.remove_alias("g", "b"),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_rename_group_merges_with_overwrite() {
        let mut table = table_with(&[
            ("A", "x", "gpt-4"),
            ("A", "y", "gpt-4o"),
            ("B", "x", "mini"),
            ("B", "z", "mini"),
        ]);

        let report = table.rename_group("A", "B");

        assert_eq!(report.moved, 2);
        assert_eq!(
            report.conflicts,
            vec![AliasConflict {
                group: "B".to_string(),
                alias: "x".to_string()
            }]
        );
        assert!(!table.contains_group("A"));

        let b = table.group("B").unwrap();
        assert_eq!(b.len(), 3);
        assert_eq!(table.get("B", "x"), Some(&[t("gpt-4")][..]));
        assert_eq!(table.get("B", "y"), Some(&[t("gpt-4o")][..]));
        assert_eq!(table.get("B", "z"), Some(&[t("mini")][..]));
    }

    #[test]
    fn test_rename_group_noop_cases() {
        let mut table = table_with(&[("A", "x", "gpt-4")]);

        let report = table.rename_group("A", "A");
        assert_eq!(report.moved, 0);

        let report = table.rename_group("missing", "other");
        assert_eq!(report.moved, 0);
        assert!(!table.contains_group("other"));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_rename_group_moves_case_variants() {
        let mut table = table_with(&[
            ("work", "gpt", "gpt-4"),
            ("WORK", "mini", "mini"),
            ("other", "x", "gpt-4o"),
        ]);

        let report = table.rename_group("Work", "Office");

        assert_eq!(report.moved, 2);
        assert!(report.conflicts.is_empty());
        assert!(!table.contains_group("work"));
        assert!(!table.contains_group("WORK"));
        assert_eq!(table.get("Office", "gpt"), Some(&[t("gpt-4")][..]));
        assert_eq!(table.get("Office", "mini"), Some(&[t("mini")][..]));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_rename_group_case_only_change() {
        let mut table = table_with(&[("work", "gpt", "gpt-4")]);

        let report = table.rename_group("work", "Work");

        assert_eq!(report.moved, 1);
        assert!(!table.contains_group("work"));
        assert_eq!(table.get("Work", "gpt"), Some(&[t("gpt-4")][..]));
    }

    #[test]
    fn test_serialized_shape_preserves_order() {
        let table = table_with(&[
            ("default", "zeta", "gpt-4"),
            ("default", "alpha", "mini"),
        ]);

        let json = serde_json::to_value(&table).unwrap();
        let aliases: Vec<_> = json["default"].as_object().unwrap().keys().cloned().collect();
        assert_eq!(aliases, vec!["zeta", "alpha"]);
        assert_eq!(json["default"]["zeta"][0]["providerId"], "p1");

        let back: RoutingTable = serde_json::from_value(json).unwrap();
        assert_eq!(back, table);
    }
}
