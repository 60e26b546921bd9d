//! Access control handler stage

use super::registry::{AclRegistry, FieldFilter};
use crate::engine::decision::{Denial, DenialCode};
use crate::engine::GateMetrics;
use crate::entity::EntityCommand;
use crate::error::{PermError, Result};
use crate::handler::{Handler, SharedHandler};
use crate::permission::{PermInput, Permission};
use crate::request::ActionRequest;
use crate::store::EntityReader;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Applies access control rules around an entity handler.
///
/// Requests carrying no permission pass straight through. Otherwise the
/// caller's roles are checked against the registry: `required` failures are
/// denied, `filter` failures strip fields from the written entity and the
/// handler's result. Queries are never rewritten: a query constrained on a
/// hidden field reads nothing, and a remove addressed that way is denied.
pub struct AclStage {
    registry: Arc<AclRegistry>,
    reader: Arc<dyn EntityReader>,
    next: Option<SharedHandler>,
    metrics: Arc<GateMetrics>,
    denied_status: u16,
}

impl AclStage {
    pub fn new(
        registry: Arc<AclRegistry>,
        reader: Arc<dyn EntityReader>,
        next: Option<SharedHandler>,
        metrics: Arc<GateMetrics>,
        denied_status: u16,
    ) -> Self {
        Self {
            registry,
            reader,
            next,
            metrics,
            denied_status,
        }
    }

    async fn forward(&self, request: ActionRequest) -> Result<Value> {
        match self.next.as_ref() {
            Some(next) => next.call(request).await,
            None => Err(PermError::Handler(format!(
                "no handler behind access controls for {}",
                request.to_args()
            ))),
        }
    }

    async fn restrict_save(&self, request: &mut ActionRequest, filter: &FieldFilter) -> Result<()> {
        let existing = match request.target_id().cloned() {
            Some(id) => self.reader.load(&request.entity_id(), &id).await?,
            None => None,
        };
        let removed = filter.restrict_write(request.ent_mut(), existing.as_ref());
        if !removed.is_empty() {
            debug!("Dropped protected fields from save: {}", removed.join(","));
        }
        Ok(())
    }
}

#[async_trait]
impl Handler for AclStage {
    async fn call(&self, mut request: ActionRequest) -> Result<Value> {
        let Some(input) = request.perm().cloned() else {
            return self.forward(request).await;
        };
        let Some(next) = self.next.as_ref() else {
            self.metrics.record_denial(DenialCode::NoPrior);
            return Err(Denial::new(DenialCode::NoPrior, request.to_args()).into());
        };

        let permission = match Permission::compile(input) {
            Ok(permission) => permission,
            Err(PermError::Denied(denial)) => {
                self.metrics.record_denial(denial.code);
                return Err((*denial).with_args(request.to_args()).into());
            }
            Err(err) => return Err(err),
        };
        request.set_perm(Some(PermInput::Compiled(permission.clone())));

        let filter = match self.registry.evaluate(
            &request,
            permission.caller_roles(),
            self.denied_status,
        ) {
            Ok(filter) => filter,
            Err(denial) => {
                debug!("Denied: {}", denial);
                self.metrics.record_denial(denial.code);
                return Err(denial.into());
            }
        };

        if filter.is_empty() {
            return next.call(request).await;
        }

        let command = request.entity_command();
        let constrained = request
            .query()
            .map(|query| filter.hidden_in(query))
            .unwrap_or_default();
        if !constrained.is_empty() && command != Some(EntityCommand::Save) {
            debug!("Query references protected fields: {}", constrained.join(","));
            return match command {
                Some(EntityCommand::List) => Ok(Value::Array(Vec::new())),
                Some(EntityCommand::Load) => Ok(Value::Null),
                _ => {
                    self.metrics.record_denial(DenialCode::FailAcl);
                    Err(Denial::new(DenialCode::FailAcl, request.to_args())
                        .with_status(self.denied_status)
                        .into())
                }
            };
        }
        if command == Some(EntityCommand::Save) {
            self.restrict_save(&mut request, &filter).await?;
        }

        let mut out = next.call(request).await?;
        filter.strip_value(&mut out);
        Ok(out)
    }
}
