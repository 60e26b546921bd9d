//! Permission specifications
//!
//! A caller attaches a permission to its requests either in raw declarative
//! form ([`PermSpec`]) or pre-compiled ([`Permission`]). Compilation validates
//! the declaration once and produces one of five variants; compiling an
//! already compiled permission returns it unchanged.

use crate::classify::Grant;
use crate::engine::decision::{Denial, DenialCode};
use crate::entity::EntityId;
use crate::error::{PermError, Result};
use crate::router::{Pattern, Router};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Key carrying the permission tag of a declarative entry
pub const PERM_TAG: &str = "perm$";

/// Entity grant declarations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GrantTable {
    /// Patterns tagged with `perm$`, e.g. `[{"name": "foo", "perm$": "cr"}]`
    Entries(Vec<Map<String, Value>>),
    /// Canonical entity id to opspec, e.g. `{"-/-/foo": "cr"}`.
    ///
    /// Keys are registered in sorted order, so between two overlapping
    /// entries of equal specificity the lexically smaller key wins. Two keys
    /// naming the same entity (`"foo"` and `"-/-/foo"`) are rejected.
    Canon(BTreeMap<String, Grant>),
}

/// Raw declarative permission description
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PermSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow: Option<bool>,

    /// Action patterns, each tagged with `perm$`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub act: Option<Vec<Map<String, Value>>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<GrantTable>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub own: Option<GrantTable>,

    /// Owner id for `own` grants
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
}

impl PermSpec {
    pub fn allow(allow: bool) -> Self {
        Self {
            allow: Some(allow),
            ..Default::default()
        }
    }

    pub fn roles<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            roles: Some(roles.into_iter().map(Into::into).collect()),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.allow.is_none()
            && self.act.is_none()
            && self.roles.is_none()
            && self.entity.is_none()
            && self.own.is_none()
    }
}

/// Compiled, immutable permission
#[derive(Debug, Clone)]
pub enum Permission {
    /// Allow or deny everything
    AllowAll(bool),

    /// Allow actions matching a truthy pattern
    ActionPredicate(Router<bool>),

    /// Entity operations granted per entity pattern
    EntityOperation(Router<Grant>),

    /// Entity operations granted per entity pattern, scoped to an owner
    OwnedEntity { router: Router<Grant>, owner: String },

    /// Caller roles, enforced by the access control layer
    RoleBased(Vec<String>),
}

/// Input accepted by [`Permission::compile`]
#[derive(Debug, Clone)]
pub enum PermInput {
    Raw(PermSpec),
    Compiled(Arc<Permission>),
}

impl From<PermSpec> for PermInput {
    fn from(spec: PermSpec) -> Self {
        PermInput::Raw(spec)
    }
}

impl From<Arc<Permission>> for PermInput {
    fn from(permission: Arc<Permission>) -> Self {
        PermInput::Compiled(permission)
    }
}

impl From<Permission> for PermInput {
    fn from(permission: Permission) -> Self {
        PermInput::Compiled(Arc::new(permission))
    }
}

impl Permission {
    pub fn allow(allow: bool) -> Self {
        Permission::AllowAll(allow)
    }

    pub fn act(router: Router<bool>) -> Self {
        Permission::ActionPredicate(router)
    }

    pub fn entity(router: Router<Grant>) -> Self {
        Permission::EntityOperation(router)
    }

    pub fn owned(router: Router<Grant>, owner: impl Into<String>) -> Self {
        Permission::OwnedEntity {
            router,
            owner: owner.into(),
        }
    }

    pub fn roles<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Permission::RoleBased(roles.into_iter().map(Into::into).collect())
    }

    /// Compile a declarative specification.
    ///
    /// Variant precedence is `allow`, `act`, `roles`, `entity`, `own`. A
    /// specification with none of them is a `no-match` denial; an `act` or
    /// `entity` entry without a `perm$` tag is a `no-perm-defined` denial.
    pub fn compile(input: impl Into<PermInput>) -> Result<Arc<Permission>> {
        let spec = match input.into() {
            PermInput::Compiled(permission) => return Ok(permission),
            PermInput::Raw(spec) => spec,
        };

        let permission = if let Some(allow) = spec.allow {
            Permission::AllowAll(allow)
        } else if let Some(entries) = &spec.act {
            Permission::ActionPredicate(compile_act(entries)?)
        } else if let Some(roles) = &spec.roles {
            Permission::RoleBased(roles.clone())
        } else if let Some(table) = &spec.entity {
            Permission::EntityOperation(compile_grants(table)?)
        } else if let Some(table) = &spec.own {
            let owner = spec.owner.clone().ok_or_else(|| {
                PermError::InvalidSpec("'own' permission requires an 'owner'".to_string())
            })?;
            Permission::OwnedEntity {
                router: compile_grants(table)?,
                owner,
            }
        } else {
            return Err(Denial::new(DenialCode::NoMatch, Value::Null).into());
        };

        Ok(Arc::new(permission))
    }

    /// Roles carried by the permission (empty unless role based)
    pub fn caller_roles(&self) -> &[String] {
        match self {
            Permission::RoleBased(roles) => roles,
            _ => &[],
        }
    }

    /// Short variant name used in logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Permission::AllowAll(_) => "allow",
            Permission::ActionPredicate(_) => "act",
            Permission::EntityOperation(_) => "entity",
            Permission::OwnedEntity { .. } => "own",
            Permission::RoleBased(_) => "roles",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Permission::AllowAll(allow) => write!(f, "perm: allow: {}", allow),
            Permission::ActionPredicate(router) => write!(f, "perm: act: {}", router),
            Permission::EntityOperation(router) => write!(f, "perm: entity: {}", router),
            Permission::OwnedEntity { router, owner } => {
                write!(f, "perm: own: {} (owner:{})", router, owner)
            }
            Permission::RoleBased(roles) => write!(f, "perm: roles: {}", roles.join(",")),
        }
    }
}

fn compile_act(entries: &[Map<String, Value>]) -> Result<Router<bool>> {
    let mut router = Router::new();
    for entry in entries {
        let tag = entry.get(PERM_TAG).ok_or_else(|| no_perm_defined(entry))?;
        router.add(Pattern::from_map(entry), is_truthy(tag));
    }
    Ok(router)
}

fn compile_grants(table: &GrantTable) -> Result<Router<Grant>> {
    let mut router = Router::new();
    match table {
        GrantTable::Entries(entries) => {
            for entry in entries {
                let tag = entry.get(PERM_TAG).ok_or_else(|| no_perm_defined(entry))?;
                router.add(Pattern::from_map(entry), grant_from_tag(tag)?);
            }
        }
        GrantTable::Canon(grants) => {
            let mut seen: BTreeMap<String, &str> = BTreeMap::new();
            for (canon, grant) in grants {
                let entity: EntityId = canon.parse()?;
                if let Some(first) = seen.insert(entity.canon(), canon.as_str()) {
                    return Err(PermError::InvalidSpec(format!(
                        "entity grants '{}' and '{}' name the same entity",
                        first, canon
                    )));
                }
                router.add(entity.pattern(), grant.clone());
            }
        }
    }
    Ok(router)
}

fn grant_from_tag(tag: &Value) -> Result<Grant> {
    match tag {
        Value::String(spec) => Ok(Grant::parse(spec)),
        Value::Bool(true) => Ok(Grant::Wildcard),
        Value::Bool(false) | Value::Null => Ok(Grant::Codes(String::new())),
        other => Err(PermError::InvalidSpec(format!(
            "entity grant must be an opspec string, got {}",
            other
        ))),
    }
}

fn no_perm_defined(entry: &Map<String, Value>) -> PermError {
    Denial::new(DenialCode::NoPermDefined, Value::Null)
        .with_entry(Value::Object(entry.clone()))
        .into()
}

/// JSON truthiness of a permission tag
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec(value: Value) -> PermSpec {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_compile_allow() {
        let permission = Permission::compile(spec(json!({"allow": false}))).unwrap();
        assert!(matches!(*permission, Permission::AllowAll(false)));
    }

    #[test]
    fn test_compile_is_idempotent() {
        let permission = Permission::compile(spec(json!({"roles": ["admin"]}))).unwrap();
        let again = Permission::compile(permission.clone()).unwrap();
        assert!(Arc::ptr_eq(&permission, &again));
    }

    #[test]
    fn test_compile_act_requires_perm_tag() {
        let err = Permission::compile(spec(json!({"act": [{"a": 1}]}))).unwrap_err();
        let denial = err.denial().unwrap();
        assert_eq!(denial.code, DenialCode::NoPermDefined);
        assert_eq!(denial.entry, Some(json!({"a": 1})));
    }

    #[test]
    fn test_compile_act_router() {
        let permission =
            Permission::compile(spec(json!({"act": [{"a": 1, "perm$": true}, {"b": 2, "perm$": false}]})))
                .unwrap();
        let Permission::ActionPredicate(router) = &*permission else {
            panic!("expected action predicate");
        };
        assert_eq!(router.len(), 2);
        assert_eq!(router.find(json!({"a": 1, "c": 3}).as_object().unwrap()), Some(&true));
        assert_eq!(router.find(json!({"b": 2}).as_object().unwrap()), Some(&false));
    }

    #[test]
    fn test_compile_entity_canon_table() {
        let permission =
            Permission::compile(spec(json!({"entity": {"foo": "cr", "-/-/bar": "rq"}}))).unwrap();
        let Permission::EntityOperation(router) = &*permission else {
            panic!("expected entity operation");
        };
        assert_eq!(
            router.find(json!({"name": "foo"}).as_object().unwrap()),
            Some(&Grant::parse("cr"))
        );
        assert_eq!(
            router.find(json!({"name": "bar"}).as_object().unwrap()),
            Some(&Grant::parse("rq"))
        );
    }

    #[test]
    fn test_compile_rejects_duplicate_canon_keys() {
        let err = Permission::compile(spec(json!({"entity": {"foo": "cr", "-/-/foo": "d"}})))
            .unwrap_err();
        assert!(matches!(err, PermError::InvalidSpec(_)));
    }

    #[test]
    fn test_compile_own_requires_owner() {
        let err = Permission::compile(spec(json!({"own": [{"name": "foo", "perm$": "crudq"}]})))
            .unwrap_err();
        assert!(matches!(err, PermError::InvalidSpec(_)));

        let permission = Permission::compile(spec(
            json!({"own": [{"name": "foo", "perm$": "crudq"}], "owner": "o1"}),
        ))
        .unwrap();
        assert_eq!(permission.kind(), "own");
        assert_eq!(permission.to_string(), "perm: own: {name:foo} -> crudq (owner:o1)");
    }

    #[test]
    fn test_compile_empty_is_no_match() {
        let err = Permission::compile(PermSpec::default()).unwrap_err();
        assert_eq!(err.denial().unwrap().code, DenialCode::NoMatch);
    }

    #[test]
    fn test_variant_precedence() {
        let permission =
            Permission::compile(spec(json!({"allow": true, "roles": ["admin"]}))).unwrap();
        assert_eq!(permission.kind(), "allow");
        assert!(permission.caller_roles().is_empty());

        let permission = Permission::compile(spec(
            json!({"roles": ["admin"], "entity": [{"name": "foo", "perm$": "*"}]}),
        ))
        .unwrap();
        assert_eq!(permission.caller_roles().to_vec(), vec!["admin".to_string()]);
    }
}
