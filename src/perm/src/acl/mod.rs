//! Declarative access controls
//!
//! Rules name roles, entity types, actions and an enforcement mode:
//!
//! - `required`: a caller holding none of the rule's roles is denied with
//!   `perm/fail/acl`
//! - `filter`: a caller lacking any of the rule's roles has the rule's
//!   filtered fields removed from queries, writes and results
//!
//! Property allow-lists restrict an entity type to a fixed set of visible
//! fields regardless of roles.

pub mod registry;
pub mod rule;
pub mod stage;

pub use registry::{AclRegistry, AllowedProperties, FieldFilter, PropertyAllowList};
pub use rule::{AccessControlRule, AclAction, Condition, Control};
pub use stage::AclStage;
