//! Batch policy updates
//!
//! A `BatchFields` value is a sparse set of overlay fields: `Some` means the
//! field is included and will overwrite the attribute on every target group,
//! `None` leaves it untouched.

use serde::{Deserialize, Serialize};
use switchyard_core::policy::sanitize_prompt_replace;
use switchyard_core::{
    InjectionPosition, PolicyGroup, PromptInjectionMode, PromptReplaceRule, ToolCompatMode,
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BatchFields {
    pub prompt_injection_mode: Option<PromptInjectionMode>,
    pub prompt_injection_position: Option<InjectionPosition>,
    /// An empty string clears the condition
    pub model_injection_condition: Option<String>,
    pub prompt_text: Option<String>,
    pub tool_filter: Option<String>,
    pub prompt_replace: Option<Vec<PromptReplaceRule>>,
    pub temperature_ratio: Option<f32>,
    pub tool_compat_mode: Option<ToolCompatMode>,
}

impl BatchFields {
    /// Every overlay field, copied from `template`
    ///
    /// Used to pre-fill a batch form; callers then switch off the fields
    /// they do not want to apply.
    pub fn from_template(template: &PolicyGroup) -> Self {
        Self {
            prompt_injection_mode: Some(template.prompt_injection_mode),
            prompt_injection_position: Some(template.prompt_injection_position),
            model_injection_condition: Some(
                template.model_injection_condition.clone().unwrap_or_default(),
            ),
            prompt_text: Some(template.prompt_text.clone()),
            tool_filter: Some(template.tool_filter.clone()),
            prompt_replace: Some(template.prompt_replace.clone()),
            temperature_ratio: Some(template.temperature_ratio),
            tool_compat_mode: Some(template.tool_compat_mode),
        }
    }

    /// Fill every field not included here from `fallback`
    pub fn or(self, fallback: BatchFields) -> Self {
        Self {
            prompt_injection_mode: self.prompt_injection_mode.or(fallback.prompt_injection_mode),
            prompt_injection_position: self
                .prompt_injection_position
                .or(fallback.prompt_injection_position),
            model_injection_condition: self
                .model_injection_condition
                .or(fallback.model_injection_condition),
            prompt_text: self.prompt_text.or(fallback.prompt_text),
            tool_filter: self.tool_filter.or(fallback.tool_filter),
            prompt_replace: self.prompt_replace.or(fallback.prompt_replace),
            temperature_ratio: self.temperature_ratio.or(fallback.temperature_ratio),
            tool_compat_mode: self.tool_compat_mode.or(fallback.tool_compat_mode),
        }
    }

    /// Number of included fields
    pub fn enabled_count(&self) -> usize {
        [
            self.prompt_injection_mode.is_some(),
            self.prompt_injection_position.is_some(),
            self.model_injection_condition.is_some(),
            self.prompt_text.is_some(),
            self.tool_filter.is_some(),
            self.prompt_replace.is_some(),
            self.temperature_ratio.is_some(),
            self.tool_compat_mode.is_some(),
        ]
        .into_iter()
        .filter(|enabled| *enabled)
        .count()
    }

    pub fn is_empty(&self) -> bool {
        self.enabled_count() == 0
    }

    /// Copy with empty-key replace rules removed
    pub(crate) fn sanitized(&self) -> Self {
        let mut fields = self.clone();
        fields.prompt_replace = fields
            .prompt_replace
            .as_deref()
            .map(sanitize_prompt_replace);
        fields
    }

    /// Overwrite the included fields on `group`
    ///
    /// Each group receives its own copy of list values.
    pub fn apply_to(&self, group: &mut PolicyGroup) {
        if let Some(mode) = self.prompt_injection_mode {
            group.prompt_injection_mode = mode;
        }
        if let Some(position) = self.prompt_injection_position {
            group.prompt_injection_position = position;
        }
        if let Some(condition) = &self.model_injection_condition {
            group.model_injection_condition =
                Some(condition.trim().to_string()).filter(|c| !c.is_empty());
        }
        if let Some(text) = &self.prompt_text {
            group.prompt_text = text.clone();
        }
        if let Some(filter) = &self.tool_filter {
            group.tool_filter = filter.clone();
        }
        if let Some(rules) = &self.prompt_replace {
            group.prompt_replace = rules.clone();
        }
        if let Some(ratio) = self.temperature_ratio {
            group.temperature_ratio = ratio;
        }
        if let Some(mode) = self.tool_compat_mode {
            group.tool_compat_mode = mode;
        }
    }
}
