//! Entity identity and entity command vocabulary

use crate::error::{PermError, Result};
use crate::router::Pattern;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Entity state as carried in `ent` payloads and returned by stores
pub type Entity = Map<String, Value>;

/// Request field holding the entity payload
pub const ENT_FIELD: &str = "ent";

/// Request field holding the query object
pub const QUERY_FIELD: &str = "q";

/// Entity attribute stamped with the owner id
pub const OWNER_FIELD: &str = "owner";

/// Placeholder for an absent identity component
const ABSENT: &str = "-";

/// Entity type identity: `(zone, base, name)`
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityId {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl EntityId {
    /// Identity with only a name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            zone: None,
            base: None,
            name: Some(name.into()),
        }
    }

    /// Identity matching every entity type (`-/-/-`)
    pub fn any() -> Self {
        Self::default()
    }

    pub fn with_base(mut self, base: impl Into<String>) -> Self {
        self.base = Some(base.into());
        self
    }

    pub fn with_zone(mut self, zone: impl Into<String>) -> Self {
        self.zone = Some(zone.into());
        self
    }

    /// Canonical `zone/base/name` string, absent components rendered as `-`
    pub fn canon(&self) -> String {
        let part = |component: &Option<String>| -> String {
            match component.as_deref() {
                Some(value) if !value.is_empty() => value.to_string(),
                _ => ABSENT.to_string(),
            }
        };
        format!("{}/{}/{}", part(&self.zone), part(&self.base), part(&self.name))
    }

    /// Read the identity components from top-level request fields
    pub fn from_fields(fields: &Map<String, Value>) -> Self {
        let component = |key: &str| {
            fields
                .get(key)
                .and_then(Value::as_str)
                .filter(|value| !value.is_empty() && *value != ABSENT)
                .map(str::to_string)
        };
        Self {
            zone: component("zone"),
            base: component("base"),
            name: component("name"),
        }
    }

    /// Routing pattern constraining only the present components
    pub fn pattern(&self) -> Pattern {
        let mut pattern = Pattern::new();
        for (key, component) in self.components() {
            if let Some(value) = component {
                pattern = pattern.with(key, value.as_str());
            }
        }
        pattern
    }

    /// Write the present components into request fields
    pub fn apply(&self, fields: &mut Map<String, Value>) {
        for (key, component) in self.components() {
            if let Some(value) = component {
                fields.insert(key.to_string(), Value::String(value.clone()));
            }
        }
    }

    fn components(&self) -> [(&'static str, &Option<String>); 3] {
        [("zone", &self.zone), ("base", &self.base), ("name", &self.name)]
    }
}

impl FromStr for EntityId {
    type Err = PermError;

    /// Parse `name`, `base/name` or `zone/base/name`; `-` marks an absent part
    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split('/').collect();
        let component = |part: &str| {
            if part.is_empty() || part == ABSENT {
                None
            } else {
                Some(part.to_string())
            }
        };

        match parts.as_slice() {
            [name] => Ok(Self {
                zone: None,
                base: None,
                name: component(name),
            }),
            [base, name] => Ok(Self {
                zone: None,
                base: component(base),
                name: component(name),
            }),
            [zone, base, name] => Ok(Self {
                zone: component(zone),
                base: component(base),
                name: component(name),
            }),
            _ => Err(PermError::InvalidSpec(format!(
                "invalid canonical entity identity: {}",
                s
            ))),
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.canon())
    }
}

/// Entity commands served by the entity handlers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityCommand {
    Save,
    Load,
    List,
    Remove,
}

impl EntityCommand {
    pub const ALL: [EntityCommand; 4] = [
        EntityCommand::Save,
        EntityCommand::Load,
        EntityCommand::List,
        EntityCommand::Remove,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityCommand::Save => "save",
            EntityCommand::Load => "load",
            EntityCommand::List => "list",
            EntityCommand::Remove => "remove",
        }
    }

    pub fn parse(verb: &str) -> Option<Self> {
        match verb {
            "save" => Some(EntityCommand::Save),
            "load" => Some(EntityCommand::Load),
            "list" => Some(EntityCommand::List),
            "remove" => Some(EntityCommand::Remove),
            _ => None,
        }
    }

    /// Routing pattern `{role: "entity", cmd}` for an entity type
    pub fn pattern(&self, entity: &EntityId) -> Pattern {
        let mut pattern = Pattern::new()
            .with("role", "entity")
            .with("cmd", self.as_str());
        for (key, value) in entity.pattern().fields() {
            pattern = pattern.with(key.clone(), value.clone());
        }
        pattern
    }
}

impl fmt::Display for EntityCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
