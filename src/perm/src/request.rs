//! Action requests

use crate::classify::{classify, id_of, OperationSet};
use crate::entity::{Entity, EntityCommand, EntityId, ENT_FIELD, QUERY_FIELD};
use crate::error::{PermError, Result};
use crate::permission::{PermInput, PermSpec, PERM_TAG};
use serde_json::{Map, Value};

/// One action to perform: named fields plus an optional attached permission
#[derive(Debug, Clone, Default)]
pub struct ActionRequest {
    fields: Map<String, Value>,
    perm: Option<PermInput>,
}

impl ActionRequest {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self { fields, perm: None }
    }

    /// Build from a JSON object. A `perm$` field is lifted out and attached
    /// as a raw permission specification.
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(mut fields) = value else {
            return Err(PermError::InvalidRequest(
                "action request must be a JSON object".to_string(),
            ));
        };

        let perm = match fields.remove(PERM_TAG) {
            Some(Value::Null) | None => None,
            Some(raw) => Some(PermInput::Raw(serde_json::from_value::<PermSpec>(raw)?)),
        };

        Ok(Self { fields, perm })
    }

    /// Entity command request for an entity type
    pub fn entity(cmd: EntityCommand, entity: &EntityId) -> Self {
        let mut fields = Map::new();
        fields.insert("role".to_string(), Value::from("entity"));
        fields.insert("cmd".to_string(), Value::from(cmd.as_str()));
        entity.apply(&mut fields);
        Self::new(fields)
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    pub fn with_ent(self, ent: Entity) -> Self {
        self.with(ENT_FIELD, Value::Object(ent))
    }

    pub fn with_query(self, query: Entity) -> Self {
        self.with(QUERY_FIELD, Value::Object(query))
    }

    /// Attach a permission (raw or compiled)
    pub fn with_perm(mut self, perm: impl Into<PermInput>) -> Self {
        self.perm = Some(perm.into());
        self
    }

    pub fn perm(&self) -> Option<&PermInput> {
        self.perm.as_ref()
    }

    pub fn set_perm(&mut self, perm: Option<PermInput>) {
        self.perm = perm;
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn fields_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.fields
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Verb identifying the operation family
    pub fn cmd(&self) -> Option<&str> {
        self.fields.get("cmd").and_then(Value::as_str)
    }

    pub fn entity_command(&self) -> Option<EntityCommand> {
        if self.is_entity() {
            self.cmd().and_then(EntityCommand::parse)
        } else {
            None
        }
    }

    pub fn is_entity(&self) -> bool {
        self.fields.get("role").and_then(Value::as_str) == Some("entity")
    }

    pub fn entity_id(&self) -> EntityId {
        EntityId::from_fields(&self.fields)
    }

    pub fn ent(&self) -> Option<&Entity> {
        self.fields.get(ENT_FIELD).and_then(Value::as_object)
    }

    /// Entity payload, created empty when absent
    pub fn ent_mut(&mut self) -> &mut Entity {
        object_field(&mut self.fields, ENT_FIELD)
    }

    pub fn query(&self) -> Option<&Entity> {
        self.fields.get(QUERY_FIELD).and_then(Value::as_object)
    }

    /// Query object, created empty when absent
    pub fn query_mut(&mut self) -> &mut Entity {
        object_field(&mut self.fields, QUERY_FIELD)
    }

    /// Identifier addressed by the request: `ent.id` for saves, `q.id` otherwise
    pub fn target_id(&self) -> Option<&Value> {
        match self.cmd() {
            Some("save") => id_of(self.fields.get(ENT_FIELD)),
            _ => id_of(self.fields.get(QUERY_FIELD)),
        }
    }

    /// Operation codes this request requires
    pub fn operations(&self) -> OperationSet {
        classify(self.cmd().unwrap_or_default(), &self.fields)
    }

    /// Request fields as diagnostic arguments
    pub fn to_args(&self) -> Value {
        Value::Object(self.fields.clone())
    }
}

fn object_field<'a>(fields: &'a mut Map<String, Value>, key: &str) -> &'a mut Entity {
    let slot = fields
        .entry(key.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if !slot.is_object() {
        *slot = Value::Object(Map::new());
    }
    match slot {
        Value::Object(map) => map,
        _ => unreachable!("slot was just set to an object"),
    }
}
