//! Behavioral overlays
//!
//! An `Overlay` is the part of a policy group the proxy applies to each
//! request: temperature scaling, tool filtering, prompt substitution, prompt
//! injection and tool-call emulation. Groups without a policy get
//! `Overlay::default()`, which changes nothing.

use once_cell::sync::OnceCell;
use regex::Regex;
use serde::Serialize;
use switchyard_core::{
    GroupId, InjectionPosition, PolicyGroup, PromptInjectionMode, PromptReplaceRule,
    ToolCompatMode,
};

/// A prompt injection to perform on one request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptInjection {
    pub mode: PromptInjectionMode,
    pub position: InjectionPosition,
    pub text: String,
}

/// Overlay settings resolved for a request
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Overlay {
    /// Source policy group, `None` for the default overlay
    pub group_id: Option<GroupId>,
    pub prompt_injection_mode: PromptInjectionMode,
    pub prompt_injection_position: InjectionPosition,
    pub model_injection_condition: Option<String>,
    pub prompt_text: String,
    /// Tool names hidden from the model
    pub tool_filter: Vec<String>,
    pub prompt_replace: Vec<PromptReplaceRule>,
    pub temperature_ratio: f32,
    pub tool_compat_mode: ToolCompatMode,
    pub max_context: Option<u32>,
    /// Compiled injection condition (lazily initialized, not serialized)
    #[serde(skip)]
    condition: OnceCell<Option<Regex>>,
}

impl Default for Overlay {
    fn default() -> Self {
        Self {
            group_id: None,
            prompt_injection_mode: PromptInjectionMode::Off,
            prompt_injection_position: InjectionPosition::System,
            model_injection_condition: None,
            prompt_text: String::new(),
            tool_filter: Vec::new(),
            prompt_replace: Vec::new(),
            temperature_ratio: 1.0,
            tool_compat_mode: ToolCompatMode::Auto,
            max_context: None,
            condition: OnceCell::new(),
        }
    }
}

impl From<&PolicyGroup> for Overlay {
    fn from(group: &PolicyGroup) -> Self {
        Self {
            group_id: Some(group.id),
            prompt_injection_mode: group.prompt_injection_mode,
            prompt_injection_position: group.prompt_injection_position,
            model_injection_condition: group.model_injection_condition.clone(),
            prompt_text: group.prompt_text.clone(),
            tool_filter: parse_tool_filter(&group.tool_filter),
            prompt_replace: group.prompt_replace.clone(),
            temperature_ratio: group.temperature_ratio,
            tool_compat_mode: group.tool_compat_mode,
            max_context: group.max_context,
            condition: OnceCell::new(),
        }
    }
}

impl PartialEq for Overlay {
    fn eq(&self, other: &Self) -> bool {
        self.group_id == other.group_id
            && self.prompt_injection_mode == other.prompt_injection_mode
            && self.prompt_injection_position == other.prompt_injection_position
            && self.model_injection_condition == other.model_injection_condition
            && self.prompt_text == other.prompt_text
            && self.tool_filter == other.tool_filter
            && self.prompt_replace == other.prompt_replace
            && self.temperature_ratio == other.temperature_ratio
            && self.tool_compat_mode == other.tool_compat_mode
            && self.max_context == other.max_context
    }
}

/// One tool name per line, blanks ignored
fn parse_tool_filter(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

impl Overlay {
    /// Whether this overlay came from a policy group
    pub fn is_default(&self) -> bool {
        self.group_id.is_none()
    }

    /// Scale the caller's temperature by the group's ratio
    pub fn scale_temperature(&self, temperature: Option<f32>) -> Option<f32> {
        temperature.map(|t| {
            if self.temperature_ratio == 1.0 {
                t
            } else {
                t * self.temperature_ratio
            }
        })
    }

    /// Whether a tool is hidden by the filter
    pub fn is_tool_filtered(&self, tool_name: &str) -> bool {
        self.tool_filter.iter().any(|t| t == tool_name)
    }

    /// Drop filtered tools, keeping the order of the rest
    pub fn filter_tools<T, F>(&self, tools: Vec<T>, name_of: F) -> Vec<T>
    where
        F: Fn(&T) -> &str,
    {
        if self.tool_filter.is_empty() {
            return tools;
        }
        tools
            .into_iter()
            .filter(|tool| !self.is_tool_filtered(name_of(tool)))
            .collect()
    }

    /// Apply the literal replace rules in order
    pub fn apply_prompt_replace(&self, text: &str) -> String {
        self.prompt_replace
            .iter()
            .filter(|rule| !rule.key.is_empty())
            .fold(text.to_string(), |acc, rule| acc.replace(&rule.key, &rule.value))
    }

    /// Whether the injection condition accepts `model_id`
    ///
    /// No condition accepts every model; an invalid expression accepts none.
    pub fn condition_matches(&self, model_id: &str) -> bool {
        let Some(pattern) = self.model_injection_condition.as_deref() else {
            return true;
        };

        let regex_opt = self.condition.get_or_init(|| match Regex::new(pattern) {
            Ok(regex) => Some(regex),
            Err(e) => {
                tracing::warn!(
                    "Invalid model injection condition '{}': {}",
                    pattern,
                    e
                );
                None
            }
        });

        regex_opt.as_ref().is_some_and(|regex| regex.is_match(model_id))
    }

    /// The injection to perform for a request, if any
    ///
    /// Injection only applies to requests that carry tools, when the group
    /// has prompt text and its condition accepts the model.
    pub fn injection_for(&self, model_id: &str, has_tools: bool) -> Option<PromptInjection> {
        if self.prompt_injection_mode == PromptInjectionMode::Off
            || self.prompt_text.is_empty()
            || !has_tools
            || !self.condition_matches(model_id)
        {
            return None;
        }

        Some(PromptInjection {
            mode: self.prompt_injection_mode,
            position: self.prompt_injection_position,
            text: self.prompt_text.clone(),
        })
    }

    /// Whether tool calls should be emulated for a model
    pub fn use_tool_compat(&self, model_supports_tools: bool) -> bool {
        match self.tool_compat_mode {
            ToolCompatMode::Compat => true,
            ToolCompatMode::Native => false,
            ToolCompatMode::Auto => !model_supports_tools,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn overlay(configure: impl FnOnce(&mut PolicyGroup)) -> Overlay {
        let mut group = PolicyGroup::new("g");
        configure(&mut group);
        Overlay::from(&group)
    }

    #[test]
    fn test_default_overlay_is_neutral() {
        let o = Overlay::default();
        assert!(o.is_default());
        assert_eq!(o.scale_temperature(Some(0.7)), Some(0.7));
        assert_eq!(o.scale_temperature(None), None);
        assert_eq!(o.apply_prompt_replace("hello"), "hello");
        assert!(o.injection_for("gpt-4", true).is_none());
        assert_eq!(o.tool_compat_mode, ToolCompatMode::Auto);
        assert_eq!(o.temperature_ratio, 1.0);
    }

    #[test]
    fn test_scale_temperature() {
        let o = overlay(|g| g.temperature_ratio = 0.5);
        assert_eq!(o.scale_temperature(Some(0.8)), Some(0.4));
        assert_eq!(o.scale_temperature(None), None);
    }

    #[test]
    fn test_tool_filter_lines() {
        let o = overlay(|g| g.tool_filter = "Bash\n\n  WebFetch  \n".to_string());
        assert_eq!(o.tool_filter, vec!["Bash", "WebFetch"]);

        let tools = vec!["Read", "Bash", "WebFetch", "Edit"];
        let kept = o.filter_tools(tools, |t| *t);
        assert_eq!(kept, vec!["Read", "Edit"]);
    }

    #[test]
    fn test_prompt_replace_in_order() {
        let o = overlay(|g| {
            g.prompt_replace = vec![
                PromptReplaceRule::new("Claude Code", "the assistant"),
                PromptReplaceRule::new("assistant", "helper"),
            ]
        });
        assert_eq!(
            o.apply_prompt_replace("You are Claude Code."),
            "You are the helper."
        );
    }

    #[test]
    fn test_injection_requires_tools_and_text() {
        let o = overlay(|g| {
            g.prompt_injection_mode = PromptInjectionMode::Enhance;
            g.prompt_injection_position = InjectionPosition::User;
            g.prompt_text = "use tools carefully".to_string();
        });

        let injection = o.injection_for("gpt-4", true).unwrap();
        assert_eq!(injection.mode, PromptInjectionMode::Enhance);
        assert_eq!(injection.position, InjectionPosition::User);
        assert!(o.injection_for("gpt-4", false).is_none());

        let empty = overlay(|g| g.prompt_injection_mode = PromptInjectionMode::Replace);
        assert!(empty.injection_for("gpt-4", true).is_none());
    }

    #[test]
    fn test_injection_condition() {
        let o = overlay(|g| {
            g.prompt_injection_mode = PromptInjectionMode::Replace;
            g.prompt_text = "x".to_string();
            g.model_injection_condition = Some("^qwen".to_string());
        });
        assert!(o.injection_for("qwen3-coder", true).is_some());
        assert!(o.injection_for("gpt-4", true).is_none());

        let broken = overlay(|g| {
            g.prompt_injection_mode = PromptInjectionMode::Replace;
            g.prompt_text = "x".to_string();
            g.model_injection_condition = Some("([".to_string());
        });
        assert!(!broken.condition_matches("anything"));
        assert!(broken.injection_for("anything", true).is_none());
    }

    #[test]
    fn test_tool_compat_decision() {
        let auto = overlay(|_| {});
        assert!(auto.use_tool_compat(false));
        assert!(!auto.use_tool_compat(true));

        let compat = overlay(|g| g.tool_compat_mode = ToolCompatMode::Compat);
        assert!(compat.use_tool_compat(true));

        let native = overlay(|g| g.tool_compat_mode = ToolCompatMode::Native);
        assert!(!native.use_tool_compat(false));
    }

    #[test]
    fn test_clone_keeps_equality() {
        let o = overlay(|g| g.model_injection_condition = Some("gpt".to_string()));
        assert!(o.condition_matches("gpt-4"));
        assert_eq!(o.clone(), o);
    }
}
