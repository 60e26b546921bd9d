//! Permission decision engine
//!
//! Evaluates the permission attached to a request and either forwards the
//! request to the next handler or returns a structured denial.
//!
//! ```text
//! request ─► no next handler? ──────────────────────────► deny no-prior
//!        ─► no permission attached? ────────────────────► forward
//!        ─► compile ─► decide ─► Forward ───────────────► next(request)
//!                              ─► Deny ─────────────────► denial
//!                              ─► Enforce ─► ownership ─► next(rewritten) | denial
//! ```

pub mod decision;
pub mod metrics;
pub mod ownership;

pub use decision::{Denial, DenialCode, Verdict};
pub use metrics::{GateMetrics, MetricsSnapshot};
pub use ownership::{OwnershipEnforcer, Step};

use crate::classify::{Grant, OperationSet};
use crate::error::{PermError, Result};
use crate::handler::Handler;
use crate::permission::{PermInput, Permission};
use crate::request::ActionRequest;
use crate::router::Router;
use crate::store::EntityReader;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Default status attached to access denials
pub const DEFAULT_DENIED_STATUS: u16 = 401;

/// Decision engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Status carried by access denials
    pub denied_status: u16,

    /// Whether an access control registry enforces role-based permissions
    pub acl_enabled: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            denied_status: DEFAULT_DENIED_STATUS,
            acl_enabled: false,
        }
    }
}

/// Permission decision engine
pub struct DecisionEngine {
    config: EngineConfig,
    ownership: OwnershipEnforcer,
    metrics: Arc<GateMetrics>,
}

impl DecisionEngine {
    pub fn new(config: EngineConfig, reader: Arc<dyn EntityReader>) -> Self {
        Self {
            ownership: OwnershipEnforcer::new(reader, config.denied_status),
            metrics: Arc::new(GateMetrics::new()),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<GateMetrics> {
        &self.metrics
    }

    /// Authorize a request and forward it to `next`, or deny it.
    ///
    /// Requests without an attached permission are forwarded untouched. A
    /// raw permission is compiled and re-attached in compiled form so later
    /// stages do not compile it again.
    pub async fn authorize(
        &self,
        mut request: ActionRequest,
        next: Option<&dyn Handler>,
    ) -> Result<Value> {
        let Some(next) = next else {
            return Err(self.deny(Denial::new(DenialCode::NoPrior, request.to_args())));
        };

        let Some(input) = request.perm().cloned() else {
            self.metrics.record_transparent();
            return next.call(request).await;
        };

        let permission = match Permission::compile(input) {
            Ok(permission) => permission,
            Err(PermError::Denied(denial)) => {
                return Err(self.deny((*denial).with_args(request.to_args())));
            }
            Err(err) => return Err(err),
        };
        request.set_perm(Some(PermInput::Compiled(permission.clone())));

        match self.decide(&request, &permission) {
            Verdict::Forward => {
                self.metrics.record_forward();
                next.call(request).await
            }
            Verdict::Deny(denial) => Err(self.deny(denial)),
            Verdict::Enforce { owner } => match self.ownership.enforce(request, &owner).await? {
                Step::Forward(request) => {
                    self.metrics.record_forward();
                    next.call(request).await
                }
                Step::Deny(denial) => Err(self.deny(denial)),
            },
        }
    }

    /// Synchronous decision for a compiled permission
    pub fn decide(&self, request: &ActionRequest, permission: &Permission) -> Verdict {
        debug!("Deciding {} for {}", permission.kind(), request.to_args());

        match permission {
            Permission::AllowAll(true) => Verdict::Forward,
            Permission::AllowAll(false) => Verdict::Deny(self.fail(DenialCode::FailAllow, request)),
            Permission::ActionPredicate(router) => {
                if router.find(request.fields()).copied().unwrap_or(false) {
                    Verdict::Forward
                } else {
                    Verdict::Deny(self.fail(DenialCode::FailAct, request))
                }
            }
            Permission::RoleBased(roles) => {
                if !self.config.acl_enabled {
                    warn!(
                        "Role-based permission ({}) reached the gate with no access controls configured",
                        roles.join(",")
                    );
                    self.metrics.record_role_gap();
                }
                Verdict::Forward
            }
            Permission::EntityOperation(router) => {
                let (grant, need) = self.check_operations(request, router);
                match grant {
                    Ok(_) => Verdict::Forward,
                    Err(grant) => Verdict::Deny(
                        self.fail(DenialCode::FailEntityOperation, request)
                            .with_allowed(grant)
                            .with_need(&need),
                    ),
                }
            }
            Permission::OwnedEntity { router, owner } => {
                let (grant, need) = self.check_operations(request, router);
                match grant {
                    Ok(_) => Verdict::Enforce {
                        owner: owner.clone(),
                    },
                    Err(grant) => Verdict::Deny(
                        self.fail(DenialCode::FailOwn, request)
                            .with_allowed(grant)
                            .with_need(&need),
                    ),
                }
            }
        }
    }

    /// Resolve the grant for the request and check it covers the required
    /// operations. `Ok` carries the satisfying grant, `Err` the insufficient
    /// (or missing) one.
    fn check_operations<'r>(
        &self,
        request: &ActionRequest,
        router: &'r Router<Grant>,
    ) -> (std::result::Result<&'r Grant, Option<&'r Grant>>, OperationSet) {
        let need = request.operations();
        if need.is_empty() {
            warn!(
                "No operations classified for verb {:?}; granting only on a non-empty grant",
                request.cmd()
            );
            self.metrics.record_unclassified();
        }

        let grant = router.find(request.fields());
        let outcome = match grant {
            Some(grant) if grant.satisfies(&need) => Ok(grant),
            other => Err(other),
        };
        (outcome, need)
    }

    fn fail(&self, code: DenialCode, request: &ActionRequest) -> Denial {
        Denial::new(code, request.to_args()).with_status(self.config.denied_status)
    }

    fn deny(&self, denial: Denial) -> PermError {
        debug!("Denied: {}", denial);
        self.metrics.record_denial(denial.code);
        denial.into()
    }
}
