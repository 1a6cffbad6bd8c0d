//! Policy groups and their behavioral overlay settings

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::{Error, Result};

/// Stable identifier of a policy group, assigned on creation.
///
/// Routing-table entries are joined to policy groups by *name*; the id only
/// identifies the group for edits, deletion and batch updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(Uuid);

impl GroupId {
    /// Create a new random group ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the inner UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for GroupId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for GroupId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let uuid = Uuid::parse_str(s.trim())
            .map_err(|e| Error::validation("id", format!("invalid group id: {}", e)))?;
        Ok(Self(uuid))
    }
}

/// How the group's prompt text is applied to a request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptInjectionMode {
    #[default]
    Off,
    /// Insert the prompt text next to the existing prompt
    Enhance,
    /// Substitute the existing prompt with the prompt text
    Replace,
}

/// Which message receives the injected prompt
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InjectionPosition {
    #[default]
    System,
    User,
}

/// Whether tool calls are emulated for the target model.
///
/// The UI presents this as a three-state toggle; `next()` is the toggle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolCompatMode {
    /// Emulate only when the model lacks native tool support
    #[default]
    Auto,
    /// Always emulate
    Compat,
    /// Never emulate
    Native,
}

impl ToolCompatMode {
    /// Advance one step along `auto -> compat -> native -> auto`
    pub fn next(self) -> Self {
        match self {
            ToolCompatMode::Auto => ToolCompatMode::Compat,
            ToolCompatMode::Compat => ToolCompatMode::Native,
            ToolCompatMode::Native => ToolCompatMode::Auto,
        }
    }
}

macro_rules! lowercase_enum_str {
    ($ty:ty, $field:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let text = match self {
                    $(<$ty>::$variant => $text,)+
                };
                f.write_str(text)
            }
        }

        impl FromStr for $ty {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                match s.trim().to_lowercase().as_str() {
                    $($text => Ok(<$ty>::$variant),)+
                    other => Err(Error::validation(
                        $field,
                        format!("unknown value '{}'", other),
                    )),
                }
            }
        }
    };
}

lowercase_enum_str!(PromptInjectionMode, "promptInjectionMode", {
    Off => "off",
    Enhance => "enhance",
    Replace => "replace",
});

lowercase_enum_str!(InjectionPosition, "promptInjectionPosition", {
    System => "system",
    User => "user",
});

lowercase_enum_str!(ToolCompatMode, "toolCompatMode", {
    Auto => "auto",
    Compat => "compat",
    Native => "native",
});

/// Literal substitution applied to prompt text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptReplaceRule {
    pub key: String,
    pub value: String,
}

impl PromptReplaceRule {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Drop rules whose key is empty; such rules are never stored
pub fn sanitize_prompt_replace(rules: &[PromptReplaceRule]) -> Vec<PromptReplaceRule> {
    rules.iter().filter(|r| !r.key.is_empty()).cloned().collect()
}

/// A named bundle of behavioral overlays
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PolicyGroup {
    pub id: GroupId,
    pub name: String,
    pub description: String,
    pub prompt_injection_mode: PromptInjectionMode,
    pub prompt_injection_position: InjectionPosition,
    /// Expression gating injection per model; absent means always
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_injection_condition: Option<String>,
    pub prompt_text: String,
    /// Newline-separated tool names hidden from the model
    pub tool_filter: String,
    pub prompt_replace: Vec<PromptReplaceRule>,
    /// Multiplier in [0, 1] applied to the caller's temperature
    pub temperature_ratio: f32,
    pub tool_compat_mode: ToolCompatMode,
    pub disabled: bool,
    /// Reserved; stored but not enforced
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_context: Option<u32>,
}

impl PolicyGroup {
    /// A new group with a fresh id and neutral overlay settings
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Case-insensitive name comparison used for uniqueness and lookup
    pub fn is_named(&self, name: &str) -> bool {
        self.name.trim().eq_ignore_ascii_case(name.trim())
    }
}

impl Default for PolicyGroup {
    fn default() -> Self {
        Self {
            id: GroupId::new(),
            name: String::new(),
            description: String::new(),
            prompt_injection_mode: PromptInjectionMode::Off,
            prompt_injection_position: InjectionPosition::System,
            model_injection_condition: None,
            prompt_text: String::new(),
            tool_filter: String::new(),
            prompt_replace: Vec::new(),
            temperature_ratio: 1.0,
            tool_compat_mode: ToolCompatMode::Auto,
            disabled: false,
            max_context: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_compat_cycle_returns_to_start() {
        for start in [
            ToolCompatMode::Auto,
            ToolCompatMode::Compat,
            ToolCompatMode::Native,
        ] {
            assert_eq!(start.next().next().next(), start);
            assert_ne!(start.next(), start);
        }
        assert_eq!(ToolCompatMode::Auto.next(), ToolCompatMode::Compat);
        assert_eq!(ToolCompatMode::Compat.next(), ToolCompatMode::Native);
    }

    #[test]
    fn test_enum_parsing() {
        assert_eq!(
            "Enhance".parse::<PromptInjectionMode>().unwrap(),
            PromptInjectionMode::Enhance
        );
        assert_eq!(
            " user ".parse::<InjectionPosition>().unwrap(),
            InjectionPosition::User
        );
        let err = "sometimes".parse::<ToolCompatMode>().unwrap_err();
        assert_eq!(err.field(), Some("toolCompatMode"));
        assert_eq!(ToolCompatMode::Native.to_string(), "native");
    }

    #[test]
    fn test_group_defaults() {
        let group = PolicyGroup::new("work");
        assert_eq!(group.name, "work");
        assert_eq!(group.temperature_ratio, 1.0);
        assert_eq!(group.tool_compat_mode, ToolCompatMode::Auto);
        assert_eq!(group.prompt_injection_mode, PromptInjectionMode::Off);
        assert!(!group.disabled);
        assert_ne!(group.id, PolicyGroup::new("work").id);
    }

    #[test]
    fn test_is_named_ignores_case() {
        let group = PolicyGroup::new("Work");
        assert!(group.is_named("work"));
        assert!(group.is_named("WORK"));
        assert!(!group.is_named("workshop"));
    }

    #[test]
    fn test_sanitize_prompt_replace() {
        let rules = vec![
            PromptReplaceRule::new("", "dropped"),
            PromptReplaceRule::new("foo", "bar"),
            PromptReplaceRule::new(" ", "kept"),
        ];
        let clean = sanitize_prompt_replace(&rules);
        assert_eq!(clean.len(), 2);
        assert_eq!(clean[0].key, "foo");
    }

    #[test]
    fn test_group_deserializes_with_missing_fields() {
        let yaml = r#"
id: 2c5ea4c0-4067-11e9-8bad-9b1deb4d3b7d
name: coding
toolCompatMode: compat
promptReplace:
  - key: a
    value: b
"#;
        let group: PolicyGroup = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(group.name, "coding");
        assert_eq!(group.tool_compat_mode, ToolCompatMode::Compat);
        assert_eq!(group.temperature_ratio, 1.0);
        assert_eq!(group.prompt_replace, vec![PromptReplaceRule::new("a", "b")]);
        assert_eq!(
            group.id.to_string(),
            "2c5ea4c0-4067-11e9-8bad-9b1deb4d3b7d"
        );
    }
}
