//! Switchyard Core Types and Traits
//!
//! This crate provides the fundamental types and traits used throughout Switchyard:
//! - Target references, policy groups and their overlay settings
//! - Proxy access keys
//! - The persistence channel (`ConfigStore`) and provider directory abstractions
//! - Core error types

pub mod config_store;
pub mod error;
pub mod policy;
pub mod provider;
pub mod types;

pub use config_store::{ConfigChange, ConfigStore, MemoryConfigStore};
pub use error::{AliasConflict, Error, Result};
pub use policy::{
    GroupId, InjectionPosition, PolicyGroup, PromptInjectionMode, PromptReplaceRule,
    ToolCompatMode,
};
pub use provider::{ModelEntry, ProviderDirectory, ProviderEntry, StaticProviderDirectory};
pub use types::{ProxyKey, TargetRef};
