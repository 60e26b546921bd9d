//! # CretoAI Permission Gate
//!
//! Authorization layer placed in front of action handlers. Requests carry an
//! optional permission; the gate decides whether each request may reach its
//! handler, rewriting owner-scoped entity requests and filtering protected
//! fields on the way.
//!
//! ## Features
//!
//! - **Pattern routing** with most-specific-match resolution
//! - **Five permission variants**: allow-all, action predicates, entity
//!   operation grants, owner-scoped grants and role-based access
//! - **Ownership enforcement** for owner-scoped entity permissions
//! - **Access control rules** with `required` and `filter` modes plus
//!   per-entity property allow-lists
//! - **Structured denials** (`perm/fail/...`) with diagnostics
//!
//! ## Example
//!
//! ```rust
//! use cretoai_perm::{
//!     ActionRequest, DispatcherBuilder, EntityCommand, EntityId, MemoryStore, PermConfig,
//!     PermPlugin, PermSpec, StoreHandler,
//! };
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(MemoryStore::new());
//!     let mut builder = DispatcherBuilder::new();
//!     StoreHandler::register(&mut builder, store.clone());
//!
//!     let config = PermConfig::from_json_str(r#"{"entity": true}"#)?;
//!     let plugin = PermPlugin::new(config, store)?;
//!     let dispatcher = plugin.install(builder)?;
//!
//!     let perm: PermSpec = serde_json::from_value(json!({"entity": {"foo": "cr"}}))?;
//!     let request = ActionRequest::entity(EntityCommand::Save, &EntityId::new("foo"))
//!         .with("ent", json!({"a": 1}))
//!         .with_perm(plugin.make(perm)?);
//!
//!     let saved = dispatcher.act(request).await?;
//!     assert_eq!(saved["a"], json!(1));
//!
//!     Ok(())
//! }
//! ```

pub mod acl;
pub mod classify;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod entity;
pub mod error;
pub mod handler;
pub mod permission;
pub mod plugin;
pub mod request;
pub mod router;
pub mod store;

// Re-export commonly used types
pub use acl::{AccessControlRule, AclAction, AclRegistry, Control, PropertyAllowList};
pub use classify::{classify, Grant, OperationCode, OperationSet};
pub use config::{EntityRef, PermConfig, Selection, StatusConfig};
pub use dispatch::{Dispatcher, DispatcherBuilder};
pub use engine::{DecisionEngine, Denial, DenialCode, EngineConfig, GateMetrics, Verdict};
pub use entity::{Entity, EntityCommand, EntityId};
pub use error::{PermError, Result};
pub use handler::{handler_fn, Handler, SharedHandler};
pub use permission::{PermInput, PermSpec, Permission};
pub use plugin::{PermGate, PermPlugin};
pub use request::ActionRequest;
pub use router::{Pattern, Router};
pub use store::{EntityReader, MemoryStore, StoreHandler};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
