//! Handler chain abstraction

use crate::error::Result;
use crate::request::ActionRequest;
use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

/// A stage in the action handler chain
#[async_trait]
pub trait Handler: Send + Sync {
    /// Handle the request, producing the action's result
    async fn call(&self, request: ActionRequest) -> Result<Value>;
}

/// Shared handler reference
pub type SharedHandler = Arc<dyn Handler>;

/// Handler backed by an async closure
pub struct FnHandler<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(ActionRequest) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value>> + Send,
{
    async fn call(&self, request: ActionRequest) -> Result<Value> {
        (self.f)(request).await
    }
}

/// Wrap an async closure as a shared handler
pub fn handler_fn<F, Fut>(f: F) -> SharedHandler
where
    F: Fn(ActionRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    Arc::new(FnHandler { f })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_handler_fn() {
        let handler = handler_fn(|request: ActionRequest| async move {
            Ok(json!(request.get("a").cloned()))
        });

        let request = ActionRequest::from_value(json!({"a": 1})).unwrap();
        assert_eq!(handler.call(request).await.unwrap(), json!(1));
    }
}
