//! Plugin configuration

use crate::acl::{AccessControlRule, AllowedProperties};
use crate::engine::DEFAULT_DENIED_STATUS;
use crate::entity::EntityId;
use crate::error::{PermError, Result};
use crate::permission::{PermSpec, Permission};
use crate::router::Pattern;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// `true` for everything, `false` for nothing, or an explicit list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Selection<T> {
    All(bool),
    Only(Vec<T>),
}

impl<T> Default for Selection<T> {
    fn default() -> Self {
        Selection::All(false)
    }
}

impl<T> Selection<T> {
    pub fn is_none(&self) -> bool {
        match self {
            Selection::All(all) => !all,
            Selection::Only(items) => items.is_empty(),
        }
    }
}

/// Entity type given as a canonical string (`zone/base/name`) or as fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityRef {
    Canon(String),
    Id(EntityId),
}

impl EntityRef {
    pub fn resolve(&self) -> Result<EntityId> {
        match self {
            EntityRef::Canon(canon) => canon.parse(),
            EntityRef::Id(id) => Ok(id.clone()),
        }
    }
}

/// Response status settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusConfig {
    /// Status carried by access denials
    pub denied: u16,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            denied: DEFAULT_DENIED_STATUS,
        }
    }
}

/// Permission plugin configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PermConfig {
    pub status: StatusConfig,

    /// Permission for callers without credentials
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anon: Option<PermSpec>,

    /// Action patterns gated for `act` permissions
    pub act: Selection<Pattern>,

    /// Entity types gated for `entity` permissions
    pub entity: Selection<EntityRef>,

    /// Entity types gated for `own` permissions
    pub own: Selection<EntityRef>,

    pub access_controls: Vec<AccessControlRule>,

    pub allowed_properties: Vec<AllowedProperties>,
}

impl PermConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading permission config from {}", path.display());
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<()> {
        if !(100..=599).contains(&self.status.denied) {
            return Err(PermError::InvalidConfig(format!(
                "status.denied must be an HTTP status code, got {}",
                self.status.denied
            )));
        }

        for rule in &self.access_controls {
            rule.validate()?;
        }

        for property in &self.allowed_properties {
            if property.fields.is_empty() {
                return Err(PermError::InvalidConfig(format!(
                    "allowedProperties for {} lists no fields",
                    property.entity
                )));
            }
        }

        self.entities(&self.entity)?;
        self.entities(&self.own)?;

        if let Some(anon) = &self.anon {
            Permission::compile(anon.clone()).map_err(|err| {
                PermError::InvalidConfig(format!("anon permission does not compile: {}", err))
            })?;
        }

        Ok(())
    }

    /// Whether any access control rule or allow-list is configured
    pub fn has_access_controls(&self) -> bool {
        !self.access_controls.is_empty() || !self.allowed_properties.is_empty()
    }

    /// Entity types selected by `entity` or `own`; `true` selects every type
    pub fn entities(&self, selection: &Selection<EntityRef>) -> Result<Vec<EntityId>> {
        match selection {
            Selection::All(true) => Ok(vec![EntityId::any()]),
            Selection::All(false) => Ok(Vec::new()),
            Selection::Only(refs) => refs.iter().map(EntityRef::resolve).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PermConfig::from_json_str("{}").unwrap();
        assert_eq!(config.status.denied, 401);
        assert!(config.anon.is_none());
        assert!(config.act.is_none());
        assert!(config.entity.is_none());
        assert!(!config.has_access_controls());
    }

    #[test]
    fn test_full_config() {
        let config = PermConfig::from_json_str(
            r#"{
                "status": {"denied": 403},
                "anon": {"allow": false},
                "act": [{"a": 1}],
                "entity": ["foo", {"base": "sys", "name": "bar"}],
                "own": true,
                "accessControls": [{
                    "name": "can delete foobar",
                    "roles": ["foobar"],
                    "entities": [{"name": "foobar"}],
                    "control": "required",
                    "actions": ["remove"]
                }],
                "allowedProperties": [{
                    "entity": {"name": "item"},
                    "fields": ["id", "name", "number"]
                }]
            }"#,
        )
        .unwrap();

        assert_eq!(config.status.denied, 403);
        assert_eq!(config.act, Selection::Only(vec![Pattern::new().with("a", 1)]));
        assert_eq!(
            config.entities(&config.entity).unwrap(),
            vec![EntityId::new("foo"), EntityId::new("bar").with_base("sys")]
        );
        assert_eq!(config.entities(&config.own).unwrap(), vec![EntityId::any()]);
        assert!(config.has_access_controls());
    }

    #[test]
    fn test_invalid_status() {
        assert!(matches!(
            PermConfig::from_json_str(r#"{"status": {"denied": 42}}"#),
            Err(PermError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_invalid_anon() {
        assert!(PermConfig::from_json_str(r#"{"anon": {}}"#).is_err());
    }

    #[test]
    fn test_invalid_entity_ref() {
        assert!(PermConfig::from_json_str(r#"{"entity": ["a/b/c/d"]}"#).is_err());
    }
}
