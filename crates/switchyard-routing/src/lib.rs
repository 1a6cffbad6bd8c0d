//! Switchyard Routing Engine
//!
//! This crate provides the routing configuration core consumed by the proxy:
//! - Routing table of group aliases and their targets
//! - Policy groups, the active group pointer and batch updates
//! - Route resolution and overlay application
//! - Proxy access key registry
//! - A service that serializes mutations and persists them

pub mod batch;
pub mod keys;
pub mod overlay;
pub mod policy_book;
pub mod resolver;
pub mod routing_table;
pub mod service;
pub mod validation;

// Re-export commonly used types
pub use batch::BatchFields;
pub use keys::{KeyRegistry, KeySelector, TOKEN_PREFIX, generate_token};
pub use overlay::{Overlay, PromptInjection};
pub use policy_book::{PolicyBook, RESERVED_GROUP_NAME};
pub use resolver::{ResolvedRoute, resolve_route};
pub use routing_table::{AliasEdit, RenameReport, RoutingTable};
pub use service::{DEFAULT_PROXY_ENDPOINT, GroupUpdate, ProxyConfigService, ServiceConfig};
pub use validation::TargetValidator;
