//! Permission gate installation
//!
//! [`PermPlugin::install`] wraps the handlers of a [`DispatcherBuilder`]:
//!
//! 1. every pattern covered by access control rules or allow-lists gets an
//!    [`AclStage`] in front of its handler
//! 2. every gated pattern (`act`, `entity`, `own`) gets a [`PermGate`] in
//!    front of whatever it resolved to after step 1
//!
//! A gate pattern also wraps every more specific registered pattern it
//! covers, so a narrower handler cannot bypass the gate.

use crate::acl::{AclRegistry, AclStage, PropertyAllowList};
use crate::config::{PermConfig, Selection};
use crate::dispatch::{Dispatcher, DispatcherBuilder};
use crate::engine::{DecisionEngine, EngineConfig, GateMetrics};
use crate::entity::EntityCommand;
use crate::error::Result;
use crate::handler::{Handler, SharedHandler};
use crate::permission::{PermInput, Permission};
use crate::request::ActionRequest;
use crate::router::Pattern;
use crate::store::EntityReader;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Handler stage running the decision engine in front of a prior handler
pub struct PermGate {
    engine: Arc<DecisionEngine>,
    prior: Option<SharedHandler>,
}

impl PermGate {
    pub fn new(engine: Arc<DecisionEngine>, prior: Option<SharedHandler>) -> Self {
        Self { engine, prior }
    }
}

#[async_trait]
impl Handler for PermGate {
    async fn call(&self, request: ActionRequest) -> Result<Value> {
        self.engine.authorize(request, self.prior.as_deref()).await
    }
}

/// Configured permission plugin
pub struct PermPlugin {
    config: PermConfig,
    engine: Arc<DecisionEngine>,
    registry: Option<Arc<AclRegistry>>,
    reader: Arc<dyn EntityReader>,
    anon: Option<Arc<Permission>>,
}

impl PermPlugin {
    /// Validate the configuration and build the engine and rule registry
    pub fn new(config: PermConfig, reader: Arc<dyn EntityReader>) -> Result<Self> {
        config.validate()?;

        let registry = if config.has_access_controls() {
            let allow_list = PropertyAllowList::from_properties(&config.allowed_properties);
            Some(Arc::new(AclRegistry::new(
                config.access_controls.clone(),
                allow_list,
            )?))
        } else {
            None
        };

        let engine = Arc::new(DecisionEngine::new(
            EngineConfig {
                denied_status: config.status.denied,
                acl_enabled: registry.is_some(),
            },
            reader.clone(),
        ));

        let anon = match &config.anon {
            Some(spec) => Some(Permission::compile(spec.clone())?),
            None => None,
        };

        Ok(Self {
            config,
            engine,
            registry,
            reader,
            anon,
        })
    }

    /// Compile a permission specification for attaching to requests
    pub fn make(&self, input: impl Into<PermInput>) -> Result<Arc<Permission>> {
        Permission::compile(input)
    }

    /// Permission for callers without credentials
    pub fn anonymous(&self) -> Option<Arc<Permission>> {
        self.anon.clone()
    }

    pub fn config(&self) -> &PermConfig {
        &self.config
    }

    pub fn engine(&self) -> &Arc<DecisionEngine> {
        &self.engine
    }

    pub fn registry(&self) -> Option<&Arc<AclRegistry>> {
        self.registry.as_ref()
    }

    pub fn metrics(&self) -> &Arc<GateMetrics> {
        self.engine.metrics()
    }

    /// Wrap the builder's handlers and freeze the route table
    pub fn install(&self, mut builder: DispatcherBuilder) -> Result<Dispatcher> {
        let mut acl_stages = 0;
        if let Some(registry) = &self.registry {
            for pattern in registry.patterns() {
                let prior = resolve_prior(&builder, &pattern);
                let stage = AclStage::new(
                    registry.clone(),
                    self.reader.clone(),
                    prior,
                    self.engine.metrics().clone(),
                    self.config.status.denied,
                );
                builder.add(pattern, Arc::new(stage));
                acl_stages += 1;
            }
        }

        // Priors are resolved before any gate is added so gates never wrap
        // each other.
        let gates: Vec<(Pattern, Option<SharedHandler>)> = self
            .gate_patterns(&builder)?
            .into_iter()
            .map(|pattern| {
                let prior = resolve_prior(&builder, &pattern);
                (pattern, prior)
            })
            .collect();
        let gate_count = gates.len();
        for (pattern, prior) in gates {
            builder.add(pattern, Arc::new(PermGate::new(self.engine.clone(), prior)));
        }

        info!(
            "Permission gate installed: {} gates, {} access control stages",
            gate_count, acl_stages
        );

        Ok(builder.build())
    }

    /// Patterns to gate, each followed by the more specific registered
    /// patterns it covers
    fn gate_patterns(&self, builder: &DispatcherBuilder) -> Result<Vec<Pattern>> {
        let registered = builder.patterns();

        let mut declared: Vec<Pattern> = match &self.config.act {
            Selection::All(true) => registered.clone(),
            Selection::All(false) => Vec::new(),
            Selection::Only(patterns) => patterns.clone(),
        };

        let entities = self
            .config
            .entities(&self.config.entity)?
            .into_iter()
            .chain(self.config.entities(&self.config.own)?);
        for entity in entities {
            for cmd in EntityCommand::ALL {
                declared.push(cmd.pattern(&entity));
            }
        }

        let mut gated: Vec<Pattern> = Vec::new();
        for pattern in declared {
            let covered = registered
                .iter()
                .filter(|candidate| pattern.matches(&candidate.to_map()))
                .cloned();
            for target in std::iter::once(pattern.clone()).chain(covered) {
                if !gated.contains(&target) {
                    gated.push(target);
                }
            }
        }

        Ok(gated)
    }
}

fn resolve_prior(builder: &DispatcherBuilder, pattern: &Pattern) -> Option<SharedHandler> {
    let prior = builder.resolve(pattern);
    match &prior {
        Some(_) => debug!("Wrapping handler for {{{}}}", pattern),
        None => warn!(
            "No handler registered for {{{}}}; permission checked requests will be denied",
            pattern
        ),
    }
    prior
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityId;
    use crate::handler::handler_fn;
    use crate::permission::PermSpec;
    use crate::store::{MemoryStore, StoreHandler};
    use serde_json::json;

    fn builder(store: Arc<MemoryStore>) -> DispatcherBuilder {
        let mut builder = DispatcherBuilder::new();
        StoreHandler::register(&mut builder, store);
        builder.add(
            Pattern::new().with("a", 1),
            handler_fn(|_| async { Ok(json!("a")) }),
        );
        builder
    }

    #[test]
    fn test_gate_patterns_cover_specific_handlers() {
        let store = Arc::new(MemoryStore::new());
        let mut builder = builder(store.clone());
        builder.add(
            EntityCommand::Save.pattern(&EntityId::new("foo")),
            handler_fn(|_| async { Ok(Value::Null) }),
        );

        let config = PermConfig::from_json_str(r#"{"entity": true}"#).unwrap();
        let plugin = PermPlugin::new(config, store).unwrap();
        let gated = plugin.gate_patterns(&builder).unwrap();

        assert_eq!(gated.len(), 5);
        assert!(gated.contains(&EntityCommand::Save.pattern(&EntityId::new("foo"))));
        assert!(!gated.contains(&Pattern::new().with("a", 1)));
    }

    #[tokio::test]
    async fn test_install_gates_actions() {
        let store = Arc::new(MemoryStore::new());
        let config = PermConfig::from_json_str(r#"{"act": true}"#).unwrap();
        let plugin = PermPlugin::new(config, store.clone()).unwrap();
        let dispatcher = plugin.install(builder(store)).unwrap();

        let request = ActionRequest::from_value(json!({"a": 1})).unwrap();
        assert_eq!(
            dispatcher
                .act(request.clone().with_perm(PermSpec::allow(true)))
                .await
                .unwrap(),
            json!("a")
        );
        assert!(dispatcher
            .act(request.with_perm(PermSpec::allow(false)))
            .await
            .is_err());
        assert_eq!(plugin.metrics().snapshot().total_denied(), 1);
    }

    #[test]
    fn test_anonymous_permission() {
        let store = Arc::new(MemoryStore::new());
        let config = PermConfig::from_json_str(r#"{"anon": {"allow": false}}"#).unwrap();
        let plugin = PermPlugin::new(config, store).unwrap();

        let anon = plugin.anonymous().unwrap();
        assert!(matches!(*anon, Permission::AllowAll(false)));
        assert!(PermPlugin::new(PermConfig::default(), Arc::new(MemoryStore::new()))
            .unwrap()
            .anonymous()
            .is_none());
    }

    #[test]
    fn test_acl_enables_role_enforcement() {
        let store = Arc::new(MemoryStore::new());
        let config = PermConfig::from_json_str(
            r#"{"allowedProperties": [{"entity": {"name": "item"}, "fields": ["name"]}]}"#,
        )
        .unwrap();
        let plugin = PermPlugin::new(config, store).unwrap();

        assert!(plugin.engine().config().acl_enabled);
        assert!(plugin.registry().is_some());
    }
}
