//! Entity persistence boundary
//!
//! The gate needs exactly one thing from persistence: reading an existing
//! entity by id ([`EntityReader`]). [`MemoryStore`] and [`StoreHandler`]
//! provide an in-process implementation that serves `role:entity` commands.

use crate::dispatch::DispatcherBuilder;
use crate::entity::{Entity, EntityCommand, EntityId};
use crate::error::{PermError, Result};
use crate::handler::Handler;
use crate::request::ActionRequest;
use crate::router::Pattern;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Read access to stored entities
#[async_trait]
pub trait EntityReader: Send + Sync {
    /// Load an entity by id
    async fn load(&self, entity: &EntityId, id: &Value) -> Result<Option<Entity>>;
}

/// In-memory entity store keyed by canonical entity id
pub struct MemoryStore {
    entities: Arc<RwLock<HashMap<String, Vec<Entity>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            entities: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Insert or fully replace an entity, assigning an id when missing
    pub async fn save(&self, entity: &EntityId, mut ent: Entity) -> Result<Entity> {
        let id = match ent.get("id") {
            Some(id) if !id.is_null() => id.clone(),
            _ => {
                let id = Value::String(Uuid::new_v4().simple().to_string());
                ent.insert("id".to_string(), id.clone());
                id
            }
        };

        let mut entities = self.entities.write().await;
        let records = entities.entry(entity.canon()).or_default();
        match records.iter_mut().find(|record| record.get("id") == Some(&id)) {
            Some(record) => *record = ent.clone(),
            None => records.push(ent.clone()),
        }
        Ok(ent)
    }

    /// First entity matching every query field
    pub async fn find(&self, entity: &EntityId, query: &Entity) -> Option<Entity> {
        let entities = self.entities.read().await;
        entities
            .get(&entity.canon())?
            .iter()
            .find(|record| matches_query(record, query))
            .cloned()
    }

    /// Every entity matching every query field, in insertion order
    pub async fn list(&self, entity: &EntityId, query: &Entity) -> Vec<Entity> {
        let entities = self.entities.read().await;
        entities
            .get(&entity.canon())
            .map(|records| {
                records
                    .iter()
                    .filter(|record| matches_query(record, query))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Remove the first entity matching the query
    pub async fn remove(&self, entity: &EntityId, query: &Entity) -> Option<Entity> {
        let mut entities = self.entities.write().await;
        let records = entities.get_mut(&entity.canon())?;
        let index = records.iter().position(|record| matches_query(record, query))?;
        Some(records.remove(index))
    }

    pub async fn count(&self, entity: &EntityId) -> usize {
        let entities = self.entities.read().await;
        entities.get(&entity.canon()).map(Vec::len).unwrap_or(0)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EntityReader for MemoryStore {
    async fn load(&self, entity: &EntityId, id: &Value) -> Result<Option<Entity>> {
        let mut query = Entity::new();
        query.insert("id".to_string(), id.clone());
        Ok(self.find(entity, &query).await)
    }
}

fn matches_query(record: &Entity, query: &Entity) -> bool {
    query
        .iter()
        .filter(|(key, _)| !key.ends_with('$'))
        .all(|(key, expected)| record.get(key) == Some(expected))
}

/// Handler serving `role:entity` commands from a [`MemoryStore`]
pub struct StoreHandler {
    store: Arc<MemoryStore>,
}

impl StoreHandler {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }

    /// Register the store for every entity command on every entity type
    pub fn register(builder: &mut DispatcherBuilder, store: Arc<MemoryStore>) {
        let handler = Arc::new(Self::new(store));
        for cmd in EntityCommand::ALL {
            builder.add(
                Pattern::new().with("role", "entity").with("cmd", cmd.as_str()),
                handler.clone(),
            );
        }
    }
}

#[async_trait]
impl Handler for StoreHandler {
    async fn call(&self, request: ActionRequest) -> Result<Value> {
        let entity = request.entity_id();
        let query = request.query().cloned().unwrap_or_default();

        match request.entity_command() {
            Some(EntityCommand::Save) => {
                let ent = request.ent().cloned().unwrap_or_default();
                Ok(Value::Object(self.store.save(&entity, ent).await?))
            }
            Some(EntityCommand::Load) => Ok(self
                .store
                .find(&entity, &query)
                .await
                .map(Value::Object)
                .unwrap_or(Value::Null)),
            Some(EntityCommand::List) => Ok(Value::Array(
                self.store
                    .list(&entity, &query)
                    .await
                    .into_iter()
                    .map(Value::Object)
                    .collect(),
            )),
            Some(EntityCommand::Remove) => Ok(self
                .store
                .remove(&entity, &query)
                .await
                .map(Value::Object)
                .unwrap_or(Value::Null)),
            None => Err(PermError::Handler(format!(
                "not an entity command: {}",
                request.to_args()
            ))),
        }
    }
}
