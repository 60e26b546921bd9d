//! Ownership enforcement for owner-scoped entity permissions

use super::decision::{Denial, DenialCode};
use crate::entity::{EntityCommand, OWNER_FIELD};
use crate::error::Result;
use crate::request::ActionRequest;
use crate::store::EntityReader;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Result of ownership enforcement
#[derive(Debug)]
pub enum Step {
    /// Forward the (possibly rewritten) request
    Forward(ActionRequest),
    Deny(Denial),
}

/// Stamps, scopes and checks the owner attribute of entity requests.
///
/// - `save` always overwrites `ent.owner`; saves with an id also get the
///   existing-record check below.
/// - id-addressed `load`/`remove` fetch the existing record once. A missing
///   record is forwarded as-is; a record owned by someone else is denied.
/// - query-addressed `load`/`remove`/`list` are constrained to the owner.
pub struct OwnershipEnforcer {
    reader: Arc<dyn EntityReader>,
    denied_status: u16,
}

impl OwnershipEnforcer {
    pub fn new(reader: Arc<dyn EntityReader>, denied_status: u16) -> Self {
        Self {
            reader,
            denied_status,
        }
    }

    pub async fn enforce(&self, mut request: ActionRequest, owner: &str) -> Result<Step> {
        match request.entity_command() {
            Some(EntityCommand::Save) => {
                request.ent_mut().insert(OWNER_FIELD.to_string(), Value::from(owner));
                match request.target_id().cloned() {
                    Some(id) => self.check_existing(request, &id, owner).await,
                    None => Ok(Step::Forward(request)),
                }
            }
            Some(EntityCommand::Load) | Some(EntityCommand::Remove) => {
                match request.target_id().cloned() {
                    Some(id) => self.check_existing(request, &id, owner).await,
                    None => Ok(Step::Forward(scope_to_owner(request, owner))),
                }
            }
            Some(EntityCommand::List) => Ok(Step::Forward(scope_to_owner(request, owner))),
            None => {
                if request.query().is_some() {
                    request
                        .query_mut()
                        .insert(OWNER_FIELD.to_string(), Value::from(owner));
                }
                Ok(Step::Forward(request))
            }
        }
    }

    async fn check_existing(&self, request: ActionRequest, id: &Value, owner: &str) -> Result<Step> {
        let entity = request.entity_id();
        let existing = self.reader.load(&entity, id).await?;

        let Some(existing) = existing else {
            debug!("No existing {} {}, nothing to protect", entity, id);
            return Ok(Step::Forward(request));
        };

        if existing.get(OWNER_FIELD).and_then(Value::as_str) == Some(owner) {
            return Ok(Step::Forward(request));
        }

        debug!("Owner mismatch on {} {} for owner {}", entity, id, owner);
        Ok(Step::Deny(
            Denial::new(DenialCode::FailOwn, request.to_args())
                .with_owner(owner)
                .with_status(self.denied_status),
        ))
    }
}

fn scope_to_owner(mut request: ActionRequest, owner: &str) -> ActionRequest {
    request
        .query_mut()
        .insert(OWNER_FIELD.to_string(), Value::from(owner));
    request
        .ent_mut()
        .insert(OWNER_FIELD.to_string(), Value::from(owner));
    request
}
