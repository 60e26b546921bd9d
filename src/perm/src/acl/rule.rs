//! Access control rule definitions

use crate::entity::{EntityCommand, EntityId};
use crate::error::{PermError, Result};
use crate::request::ActionRequest;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Enforcement strength of a rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Control {
    /// Silently drop data the caller may not see or set
    Filter,
    /// Deny the request outright
    Required,
}

/// Entity action verbs a rule can cover
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AclAction {
    SaveNew,
    SaveExisting,
    Load,
    List,
    Remove,
}

impl AclAction {
    /// Entity command the action is served by
    pub fn command(&self) -> EntityCommand {
        match self {
            AclAction::SaveNew | AclAction::SaveExisting => EntityCommand::Save,
            AclAction::Load => EntityCommand::Load,
            AclAction::List => EntityCommand::List,
            AclAction::Remove => EntityCommand::Remove,
        }
    }

    /// Action performed by an entity request
    pub fn of(request: &ActionRequest) -> Option<Self> {
        match request.entity_command()? {
            EntityCommand::Save if request.target_id().is_some() => Some(AclAction::SaveExisting),
            EntityCommand::Save => Some(AclAction::SaveNew),
            EntityCommand::Load => Some(AclAction::Load),
            EntityCommand::List => Some(AclAction::List),
            EntityCommand::Remove => Some(AclAction::Remove),
        }
    }
}

/// Predicate over request fields, addressed by a dotted path such as
/// `ent.region`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum Condition {
    Eq { path: String, value: Value },
    Ne { path: String, value: Value },
    Exists { path: String },
}

impl Condition {
    pub fn holds(&self, fields: &Map<String, Value>) -> bool {
        match self {
            Condition::Eq { path, value } => lookup(fields, path) == Some(value),
            Condition::Ne { path, value } => lookup(fields, path) != Some(value),
            Condition::Exists { path } => lookup(fields, path).is_some_and(|v| !v.is_null()),
        }
    }
}

fn lookup<'a>(fields: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = fields.get(segments.next()?)?;
    for segment in segments {
        current = current.get(segment)?;
    }
    Some(current)
}

/// Declarative access control rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessControlRule {
    pub name: String,

    /// Roles the rule requires
    pub roles: Vec<String>,

    /// Entity types the rule covers
    pub entities: Vec<EntityId>,

    pub control: Control,

    pub actions: Vec<AclAction>,

    /// All must hold for the rule to apply
    #[serde(default)]
    pub conditions: Vec<Condition>,

    /// Field visibility: `false` hides the field from callers failing the rule
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<BTreeMap<String, bool>>,
}

impl AccessControlRule {
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(PermError::InvalidConfig(
                "Access control rule name cannot be empty".to_string(),
            ));
        }

        if self.roles.is_empty() {
            return Err(PermError::InvalidConfig(format!(
                "Access control rule '{}' must require at least one role",
                self.name
            )));
        }

        if self.entities.is_empty() {
            return Err(PermError::InvalidConfig(format!(
                "Access control rule '{}' must cover at least one entity",
                self.name
            )));
        }

        if self.actions.is_empty() {
            return Err(PermError::InvalidConfig(format!(
                "Access control rule '{}' must cover at least one action",
                self.name
            )));
        }

        Ok(())
    }

    /// Whether the rule covers the action and all its conditions hold
    pub fn applies(&self, action: AclAction, fields: &Map<String, Value>) -> bool {
        self.actions.contains(&action)
            && self.conditions.iter().all(|condition| condition.holds(fields))
    }

    /// Whether the caller's roles satisfy the rule.
    ///
    /// `required` rules need any one of the roles; `filter` rules need all of
    /// them before filtered fields become visible.
    pub fn grants(&self, caller_roles: &[String]) -> bool {
        match self.control {
            Control::Required => self.roles.iter().any(|role| caller_roles.contains(role)),
            Control::Filter => self.roles.iter().all(|role| caller_roles.contains(role)),
        }
    }

    /// Fields hidden from callers failing a filter rule
    pub fn hidden_fields(&self) -> impl Iterator<Item = &String> {
        self.filters
            .iter()
            .flatten()
            .filter(|(_, allow)| !**allow)
            .map(|(field, _)| field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn region_rule() -> AccessControlRule {
        serde_json::from_value(json!({
            "name": "access to region attribute",
            "roles": ["foobar", "region"],
            "entities": [{"zone": null, "base": null, "name": "foobar"}],
            "control": "filter",
            "actions": ["save_new", "save_existing", "list", "load", "remove"],
            "conditions": [],
            "filters": {"region": false, "name": true}
        }))
        .unwrap()
    }

    #[test]
    fn test_rule_deserialization() {
        let rule = region_rule();
        assert!(rule.validate().is_ok());
        assert_eq!(rule.control, Control::Filter);
        assert_eq!(rule.entities[0].canon(), "-/-/foobar");
        assert_eq!(rule.hidden_fields().collect::<Vec<_>>(), vec!["region"]);
    }

    #[test]
    fn test_filter_requires_all_roles() {
        let rule = region_rule();
        assert!(rule.grants(&["foobar".to_string(), "region".to_string()]));
        assert!(!rule.grants(&["foobar".to_string()]));
    }

    #[test]
    fn test_required_needs_any_role() {
        let mut rule = region_rule();
        rule.control = Control::Required;
        assert!(rule.grants(&["region".to_string()]));
        assert!(!rule.grants(&[]));
    }

    #[test]
    fn test_conditions() {
        let mut rule = region_rule();
        rule.conditions = vec![
            Condition::Eq {
                path: "ent.region".to_string(),
                value: json!("EMEA"),
            },
            Condition::Exists {
                path: "ent.id".to_string(),
            },
        ];

        let fields = json!({"ent": {"id": "x", "region": "EMEA"}});
        assert!(rule.applies(AclAction::Load, fields.as_object().unwrap()));

        let fields = json!({"ent": {"region": "APAC"}});
        assert!(!rule.applies(AclAction::Load, fields.as_object().unwrap()));
    }

    #[test]
    fn test_validation() {
        let mut rule = region_rule();
        rule.actions.clear();
        assert!(rule.validate().is_err());

        let mut rule = region_rule();
        rule.name.clear();
        assert!(rule.validate().is_err());
    }
}
