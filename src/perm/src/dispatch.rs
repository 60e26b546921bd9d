//! Immutable action route table
//!
//! Handlers are registered against patterns on a [`DispatcherBuilder`]
//! during initialization; [`DispatcherBuilder::build`] freezes the table into
//! a cheaply cloneable [`Dispatcher`]. Nothing is registered afterwards.

use crate::error::{PermError, Result};
use crate::handler::{Handler, SharedHandler};
use crate::request::ActionRequest;
use crate::router::{Pattern, Router};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Mutable route table used during initialization
#[derive(Default)]
pub struct DispatcherBuilder {
    routes: Router<SharedHandler>,
}

impl DispatcherBuilder {
    pub fn new() -> Self {
        Self {
            routes: Router::new(),
        }
    }

    /// Register a handler, overriding any handler on the identical pattern
    pub fn add(&mut self, pattern: Pattern, handler: SharedHandler) -> &mut Self {
        debug!("Registering handler for {{{}}}", pattern);
        self.routes.set(pattern, handler);
        self
    }

    /// Handler a request shaped like `pattern` currently resolves to
    pub fn resolve(&self, pattern: &Pattern) -> Option<SharedHandler> {
        self.routes.find(&pattern.to_map()).cloned()
    }

    /// Registered patterns in resolution order
    pub fn patterns(&self) -> Vec<Pattern> {
        self.routes.iter().map(|(pattern, _)| pattern.clone()).collect()
    }

    pub fn build(self) -> Dispatcher {
        Dispatcher {
            routes: Arc::new(self.routes),
        }
    }
}

/// Frozen route table
#[derive(Clone)]
pub struct Dispatcher {
    routes: Arc<Router<SharedHandler>>,
}

impl Dispatcher {
    /// Dispatch a request to the most specific matching handler
    pub async fn act(&self, request: ActionRequest) -> Result<Value> {
        let handler = self
            .routes
            .find(request.fields())
            .cloned()
            .ok_or_else(|| {
                PermError::Handler(format!("no handler matches {}", request.to_args()))
            })?;
        handler.call(request).await
    }

    pub fn patterns(&self) -> Vec<Pattern> {
        self.routes.iter().map(|(pattern, _)| pattern.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[async_trait]
impl Handler for Dispatcher {
    async fn call(&self, request: ActionRequest) -> Result<Value> {
        self.act(request).await
    }
}
