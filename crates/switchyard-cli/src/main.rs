//! Switchyard CLI
//!
//! Command-line interface for managing the routing table, policy groups and
//! proxy keys of a local chat-completion proxy

mod commands;
mod config;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use switchyard_config_file::FileConfigStore;
use switchyard_core::{
    InjectionPosition, PromptInjectionMode, PromptReplaceRule, StaticProviderDirectory,
    ToolCompatMode,
};
use switchyard_routing::{ProxyConfigService, ServiceConfig};
use tracing::debug;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::config::Settings;

#[derive(Parser)]
#[command(name = "switchyard")]
#[command(about = "Switchyard - routing and policy configuration for a local chat proxy", long_about = None)]
struct Cli {
    /// Settings file (YAML or TOML)
    #[arg(long, short, global = true, env = "SWITCHYARD_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage policy groups and the active group
    #[command(subcommand)]
    Group(GroupCommand),
    /// Manage routing aliases
    #[command(subcommand)]
    Alias(AliasCommand),
    /// Apply policy fields to several groups at once
    Batch(BatchArgs),
    /// Manage proxy access keys
    #[command(subcommand)]
    Key(KeyCommand),
    /// Show how a request would be routed
    Resolve {
        group: String,
        alias: String,
        /// Model id the request will be sent to, for injection and tool-compat decisions
        #[arg(long)]
        model: Option<String>,
        /// Whether the request carries tools
        #[arg(long)]
        tools: bool,
        /// Caller temperature to scale
        #[arg(long)]
        temperature: Option<f32>,
    },
}

#[derive(Subcommand)]
enum GroupCommand {
    /// List policy groups
    List,
    /// Create a policy group
    Add {
        name: String,
        #[arg(long)]
        description: Option<String>,
        #[command(flatten)]
        policy: PolicyArgs,
    },
    /// Edit a policy group
    Update {
        /// Group id or name
        group: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
        /// Stop serving traffic for this group
        #[arg(long, conflicts_with = "enable")]
        disable: bool,
        #[arg(long)]
        enable: bool,
        #[command(flatten)]
        policy: PolicyArgs,
    },
    /// Rename a policy group and move its aliases
    Rename { group: String, new_name: String },
    /// Delete a policy group (its aliases stay routable)
    Delete { group: String },
    /// Advance the tool-compat mode (auto, compat, native)
    CycleCompat { group: String },
    /// Point the switch path at a group
    Activate { name: String },
    /// Clear the active group
    Deactivate,
    /// Show the active group
    Active,
    /// Remove the aliases of a group that has no policy group
    Purge { group: String },
}

#[derive(Subcommand)]
enum AliasCommand {
    /// Create or replace an alias
    Set {
        group: String,
        alias: String,
        /// Targets as provider:model, in priority order
        #[arg(required = true)]
        targets: Vec<String>,
        /// Current name when renaming the alias
        #[arg(long)]
        rename_from: Option<String>,
    },
    /// Remove an alias
    Remove { group: String, alias: String },
    /// List aliases
    List {
        #[arg(long)]
        group: Option<String>,
    },
}

#[derive(Args)]
struct BatchArgs {
    /// Target group ids or names
    #[arg(long = "group", required = true)]
    groups: Vec<String>,
    /// Copy every field from this group before applying flags
    #[arg(long)]
    template: Option<String>,
    #[command(flatten)]
    policy: PolicyArgs,
}

#[derive(Subcommand)]
enum KeyCommand {
    /// Issue a new key; the token is printed once
    Issue { name: String },
    /// Revoke a key by list index or token
    Revoke { key: String },
    /// List keys (tokens redacted)
    List,
    /// Check whether a token is accepted
    Verify { token: String },
}

/// Overlay fields shared by `group add`, `group update` and `batch`
#[derive(Args, Default)]
struct PolicyArgs {
    #[arg(long)]
    injection_mode: Option<PromptInjectionMode>,
    #[arg(long)]
    injection_position: Option<InjectionPosition>,
    /// Regular expression on the model id gating injection ("" clears)
    #[arg(long)]
    condition: Option<String>,
    #[arg(long)]
    prompt_text: Option<String>,
    /// Comma-separated tool names to hide ("" clears)
    #[arg(long)]
    tool_filter: Option<String>,
    /// Literal prompt substitution KEY=VALUE, repeatable
    #[arg(long = "replace", value_parser = parse_replace_rule)]
    replace: Vec<PromptReplaceRule>,
    /// Remove all prompt substitutions
    #[arg(long, conflicts_with = "replace")]
    clear_replace: bool,
    #[arg(long)]
    temperature_ratio: Option<f32>,
    #[arg(long)]
    tool_compat: Option<ToolCompatMode>,
}

fn parse_replace_rule(raw: &str) -> Result<PromptReplaceRule, String> {
    raw.split_once('=')
        .map(|(key, value)| PromptReplaceRule::new(key, value))
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", raw))
}

fn init_logging(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::new(level);
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings = Settings::load(cli.config.as_deref())?;
    init_logging(&settings.logging.level)?;
    debug!("Settings: {:?}", settings);

    let store = Arc::new(FileConfigStore::new(settings.store_path()).await?);
    let directory = Arc::new(StaticProviderDirectory::new(settings.providers.clone()));
    let service = ProxyConfigService::load(
        store,
        directory.clone(),
        ServiceConfig {
            switch_path: settings.switch_path.clone(),
            proxy_endpoint: settings.proxy_endpoint.clone(),
        },
    )
    .await?;

    match cli.command {
        Commands::Group(command) => commands::group(&service, command).await?,
        Commands::Alias(command) => commands::alias(&service, command).await?,
        Commands::Batch(args) => commands::batch(&service, args).await?,
        Commands::Key(command) => commands::key(&service, command).await?,
        Commands::Resolve {
            group,
            alias,
            model,
            tools,
            temperature,
        } => {
            let request = commands::RequestPreview {
                model,
                tools,
                temperature,
            };
            commands::resolve(&service, directory.as_ref(), &group, &alias, request).await?
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_replace_rule() {
        assert_eq!(
            parse_replace_rule("Claude Code=assistant").unwrap(),
            PromptReplaceRule::new("Claude Code", "assistant")
        );
        assert_eq!(
            parse_replace_rule("a=b=c").unwrap(),
            PromptReplaceRule::new("a", "b=c")
        );
        assert!(parse_replace_rule("no-separator").is_err());
    }

    #[test]
    fn test_parse_batch_command() {
        let cli = Cli::try_parse_from([
            "switchyard",
            "batch",
            "--group",
            "work",
            "--group",
            "home",
            "--prompt-text",
            "new text",
            "--tool-compat",
            "native",
        ])
        .unwrap();

        let Commands::Batch(args) = cli.command else {
            panic!("expected batch command");
        };
        assert_eq!(args.groups, vec!["work", "home"]);
        assert_eq!(args.policy.prompt_text.as_deref(), Some("new text"));
        assert_eq!(args.policy.tool_compat, Some(ToolCompatMode::Native));
    }

    #[test]
    fn test_invalid_enum_value_rejected() {
        let result = Cli::try_parse_from([
            "switchyard",
            "group",
            "add",
            "work",
            "--injection-mode",
            "sometimes",
        ]);
        assert!(result.is_err());
    }
}
