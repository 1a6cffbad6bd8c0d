//! Command handlers

use anyhow::{Context, anyhow, bail};
use serde_json::json;
use switchyard_core::{GroupId, PolicyGroup, ProviderDirectory, TargetRef};
use switchyard_routing::{AliasEdit, BatchFields, KeySelector, ProxyConfigService};

use crate::{AliasCommand, BatchArgs, GroupCommand, KeyCommand, PolicyArgs};

/// Request details used to preview overlay decisions
pub struct RequestPreview {
    pub model: Option<String>,
    pub tools: bool,
    pub temperature: Option<f32>,
}

impl PolicyArgs {
    fn batch_fields(&self) -> BatchFields {
        let prompt_replace = if self.clear_replace {
            Some(Vec::new())
        } else if self.replace.is_empty() {
            None
        } else {
            Some(self.replace.clone())
        };

        BatchFields {
            prompt_injection_mode: self.injection_mode,
            prompt_injection_position: self.injection_position,
            model_injection_condition: self.condition.clone(),
            prompt_text: self.prompt_text.clone(),
            tool_filter: self.tool_filter.as_deref().map(tool_filter_lines),
            prompt_replace,
            temperature_ratio: self.temperature_ratio,
            tool_compat_mode: self.tool_compat,
        }
    }
}

/// "Bash, WebFetch" -> "Bash\nWebFetch"
fn tool_filter_lines(raw: &str) -> String {
    raw.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn parse_target(raw: &str) -> anyhow::Result<TargetRef> {
    match raw.split_once(':') {
        Some((provider, model)) if !provider.is_empty() && !model.is_empty() => {
            Ok(TargetRef::new(provider, model))
        }
        _ => bail!("invalid target '{}', expected provider:model", raw),
    }
}

/// Find a policy group by id, falling back to its name
async fn find_group(service: &ProxyConfigService, raw: &str) -> anyhow::Result<PolicyGroup> {
    if let Ok(id) = raw.parse::<GroupId>()
        && let Some(group) = service.policy_group(id).await
    {
        return Ok(group);
    }

    service
        .policy_groups()
        .await
        .into_iter()
        .find(|g| g.is_named(raw))
        .ok_or_else(|| anyhow!("no policy group '{}'", raw))
}

pub async fn group(service: &ProxyConfigService, command: GroupCommand) -> anyhow::Result<()> {
    match command {
        GroupCommand::List => {
            let active = service.active_group().await;
            let groups = service.policy_groups().await;
            if groups.is_empty() {
                println!("No policy groups");
            }
            for g in groups {
                let marker = if active.as_deref().is_some_and(|a| g.is_named(a)) {
                    "*"
                } else {
                    " "
                };
                println!(
                    "{} {:<20} {}  injection={} compat={} ratio={}{}",
                    marker,
                    g.name,
                    g.id,
                    g.prompt_injection_mode,
                    g.tool_compat_mode,
                    g.temperature_ratio,
                    if g.disabled { "  (disabled)" } else { "" }
                );
            }
        }
        GroupCommand::Add {
            name,
            description,
            policy,
        } => {
            let mut group = PolicyGroup::new(name);
            group.description = description.unwrap_or_default();
            policy.batch_fields().apply_to(&mut group);

            let created = service.create_group(group).await?;
            println!("Created group '{}' ({})", created.name, created.id);
        }
        GroupCommand::Update {
            group,
            name,
            description,
            disable,
            enable,
            policy,
        } => {
            let mut updated = find_group(service, &group).await?;
            if let Some(name) = name {
                updated.name = name;
            }
            if let Some(description) = description {
                updated.description = description;
            }
            if disable {
                updated.disabled = true;
            } else if enable {
                updated.disabled = false;
            }
            policy.batch_fields().apply_to(&mut updated);

            let result = service.update_group(updated).await?;
            println!("Updated group '{}'", result.group.name);
            if let Some(report) = result.rename {
                print_rename(&report);
            }
        }
        GroupCommand::Rename { group, new_name } => {
            let existing = find_group(service, &group).await?;
            let result = service.rename_group(existing.id, &new_name).await?;
            match result.rename {
                Some(report) => print_rename(&report),
                None => println!("Group '{}' already has that name", result.group.name),
            }
        }
        GroupCommand::Delete { group } => {
            let existing = find_group(service, &group).await?;
            let removed = service.delete_group(existing.id).await?;
            println!("Deleted group '{}'", removed.name);

            if service.routing_table().await.contains_group(&removed.name) {
                println!(
                    "Aliases under '{}' remain routable with default settings; \
                     run `switchyard group purge {}` to remove them",
                    removed.name, removed.name
                );
            }
        }
        GroupCommand::CycleCompat { group } => {
            let existing = find_group(service, &group).await?;
            let mode = service.cycle_tool_compat_mode(existing.id).await?;
            println!("Tool compat mode of '{}' is now {}", existing.name, mode);
        }
        GroupCommand::Activate { name } => {
            service.set_active(&name).await?;
            println!("Active group is now '{}'", name.trim());
        }
        GroupCommand::Deactivate => match service.clear_active().await? {
            Some(previous) => println!("Cleared active group '{}'", previous),
            None => println!("No group was active"),
        },
        GroupCommand::Active => match service.active_group().await {
            Some(name) => println!("{}", name),
            None => println!("No active group"),
        },
        GroupCommand::Purge { group } => {
            let removed = service.purge_orphaned_aliases(&group).await?;
            println!("Removed {} aliases from '{}'", removed, group);
        }
    }
    Ok(())
}

fn print_rename(report: &switchyard_routing::RenameReport) {
    println!(
        "Renamed '{}' to '{}', moved {} aliases",
        report.from, report.to, report.moved
    );
    for conflict in &report.conflicts {
        println!("  warning: {}", conflict);
    }
}

pub async fn alias(service: &ProxyConfigService, command: AliasCommand) -> anyhow::Result<()> {
    match command {
        AliasCommand::Set {
            group,
            alias,
            targets,
            rename_from,
        } => {
            let targets = targets
                .iter()
                .map(|t| parse_target(t))
                .collect::<anyhow::Result<Vec<_>>>()?;

            let mut edit = AliasEdit::new(group.as_str(), alias.as_str(), targets);
            if let Some(previous) = rename_from {
                edit = edit.renaming(previous);
            }
            service.upsert_alias(edit).await?;
            println!("Saved alias {}/{}", group.trim(), alias.trim());
        }
        AliasCommand::Remove { group, alias } => {
            service.remove_alias(&group, &alias).await?;
            println!("Removed alias {}/{}", group, alias);
        }
        AliasCommand::List { group } => {
            let table = service.routing_table().await;
            let policies = service.policy_groups().await;

            for (name, aliases) in table.groups() {
                if group.as_deref().is_some_and(|g| g != name) {
                    continue;
                }
                let orphan = !policies.iter().any(|p| p.is_named(name));
                println!("{}{}", name, if orphan { " (no policy group)" } else { "" });
                for (alias, targets) in aliases {
                    let targets: Vec<String> = targets.iter().map(|t| t.to_string()).collect();
                    println!("  {:<20} -> {}", alias, targets.join(", "));
                }
            }
        }
    }
    Ok(())
}

pub async fn batch(service: &ProxyConfigService, args: BatchArgs) -> anyhow::Result<()> {
    let mut ids = Vec::with_capacity(args.groups.len());
    for raw in &args.groups {
        ids.push(find_group(service, raw).await?.id);
    }

    let mut fields = args.policy.batch_fields();
    if let Some(template) = &args.template {
        let template = find_group(service, template)
            .await
            .context("loading batch template")?;
        fields = fields.or(BatchFields::from_template(&template));
    }

    let updated = service.batch_update(&ids, &fields).await?;
    println!(
        "Updated {} groups ({} fields each)",
        updated,
        fields.enabled_count()
    );
    Ok(())
}

pub async fn key(service: &ProxyConfigService, command: KeyCommand) -> anyhow::Result<()> {
    match command {
        KeyCommand::Issue { name } => {
            let token = service.issue_key(&name).await?;
            println!("{}", token);
            eprintln!("Store this token now; it will not be shown again.");
        }
        KeyCommand::Revoke { key } => {
            let removed = service.revoke_key(&KeySelector::from(key.as_str())).await?;
            println!("Revoked key '{}' ({})", removed.name, removed.redacted());
        }
        KeyCommand::List => {
            for (index, key) in service.keys().await.iter().enumerate() {
                println!("{:>3}  {:<20} {}", index, key.name, key.redacted());
            }
        }
        KeyCommand::Verify { token } => {
            let key = service.authenticate(&token).await?;
            println!("Accepted: '{}'", key.name);
        }
    }
    Ok(())
}

pub async fn resolve(
    service: &ProxyConfigService,
    directory: &dyn ProviderDirectory,
    group: &str,
    alias: &str,
    request: RequestPreview,
) -> anyhow::Result<()> {
    let route = service.resolve(group, alias).await?;

    let mut output = json!({ "route": route });
    if let Some(model) = &request.model {
        let supports_tools = route
            .targets
            .iter()
            .filter(|t| t.model_id == *model)
            .find_map(|t| directory.lookup(t))
            .map(|(_, entry)| entry.supports_tools)
            .unwrap_or(true);

        output["request"] = json!({
            "model": model,
            "injection": route.overlay.injection_for(model, request.tools),
            "useToolCompat": route.overlay.use_tool_compat(supports_tools),
            "temperature": route.overlay.scale_temperature(request.temperature),
        });
    }

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_target() {
        assert_eq!(
            parse_target("ollama:qwen3:8b").unwrap(),
            TargetRef::new("ollama", "qwen3:8b")
        );
        assert!(parse_target("no-model").is_err());
        assert!(parse_target(":gpt-4").is_err());
        assert!(parse_target("p1:").is_err());
    }

    #[test]
    fn test_tool_filter_lines() {
        assert_eq!(tool_filter_lines("Bash, WebFetch,,"), "Bash\nWebFetch");
        assert_eq!(tool_filter_lines(""), "");
    }

    #[test]
    fn test_policy_args_to_fields() {
        let args = PolicyArgs {
            prompt_text: Some("hi".to_string()),
            clear_replace: true,
            ..PolicyArgs::default()
        };
        let fields = args.batch_fields();
        assert_eq!(fields.enabled_count(), 2);
        assert_eq!(fields.prompt_replace, Some(Vec::new()));
    }
}
