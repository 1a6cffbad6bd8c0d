//! File-based configuration store for Switchyard
//!
//! This crate implements the `ConfigStore` trait on top of a single file.
//! Each store key is a top-level entry of the document, so the routing
//! table, policy groups, active group and proxy keys all live side by side.
//!
//! # Features
//! - YAML, TOML or JSON, chosen by file extension
//! - Atomic writes (temporary file + rename)
//! - Real-time file watching with `notify`
//!
//! # Example
//! ```no_run
//! # use switchyard_config_file::FileConfigStore;
//! # use switchyard_core::ConfigStore;
//! # use switchyard_core::config_store::keys;
//! # async fn example() -> switchyard_core::Result<()> {
//! let store = FileConfigStore::new("~/.switchyard/store.yaml").await?;
//! let groups = store.get(keys::POLICY_GROUPS).await?;
//! # Ok(())
//! # }
//! ```

mod atomic;
mod file_store;
mod format;

pub use file_store::FileConfigStore;
pub use format::DocumentFormat;
