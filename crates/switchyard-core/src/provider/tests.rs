//! Tests for the provider directory

use super::*;

fn openai() -> ProviderEntry {
    ProviderEntry {
        id: "p1".to_string(),
        name: "OpenAI".to_string(),
        base_url: "https://api.openai.com/v1".to_string(),
        enabled: true,
        models: vec![
            ModelEntry::new("gpt-4"),
            ModelEntry {
                id: "legacy".to_string(),
                enabled: false,
                supports_tools: false,
            },
        ],
    }
}

#[test]
fn test_static_directory_lookup() {
    let directory = StaticProviderDirectory::new(vec![openai()]);

    assert_eq!(directory.len(), 1);
    assert!(directory.provider("p1").is_some());
    assert!(directory.provider("p2").is_none());

    let (provider, model) = directory.lookup(&TargetRef::new("p1", "gpt-4")).unwrap();
    assert_eq!(provider.name, "OpenAI");
    assert!(model.supports_tools);
}

#[test]
fn test_lookup_unknown_model() {
    let directory = StaticProviderDirectory::new(vec![openai()]);
    assert!(directory.lookup(&TargetRef::new("p1", "gpt-5")).is_none());
    assert!(directory.lookup(&TargetRef::new("nope", "gpt-4")).is_none());
}

#[test]
fn test_lookup_returns_disabled_models() {
    // Enabled checks belong to the caller, the directory only reports
    let directory = StaticProviderDirectory::new(vec![openai()]);
    let (_, model) = directory.lookup(&TargetRef::new("p1", "legacy")).unwrap();
    assert!(!model.enabled);
}

#[test]
fn test_provider_entry_defaults_from_yaml() {
    let yaml = r#"
id: local
base_url: http://localhost:8000/v1
models:
  - id: qwen
    supports_tools: false
"#;
    let entry: ProviderEntry = serde_yaml::from_str(yaml).unwrap();
    assert!(entry.enabled);
    assert_eq!(entry.name, "");
    let model = entry.model("qwen").unwrap();
    assert!(model.enabled);
    assert!(!model.supports_tools);
}
