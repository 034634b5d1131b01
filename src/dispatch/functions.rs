//! Function registry for function-call payloads

use crate::connection::ConnectionHandle;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Handler invoked with the `data` field of a `{function, data}` payload
#[async_trait]
pub trait FunctionHandler: Send + Sync {
    async fn call(&self, data: Value, conn: ConnectionHandle) -> anyhow::Result<()>;
}

#[async_trait]
impl<F, Fut> FunctionHandler for F
where
    F: Fn(Value, ConnectionHandle) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn call(&self, data: Value, conn: ConnectionHandle) -> anyhow::Result<()> {
        (self)(data, conn).await
    }
}

/// Name → handler table; the last registration for a name wins
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    handlers: Arc<RwLock<HashMap<String, Arc<dyn FunctionHandler>>>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register<H>(&self, name: impl Into<String>, handler: H)
    where
        H: FunctionHandler + 'static,
    {
        let name = name.into();
        let previous = self
            .handlers
            .write()
            .await
            .insert(name.clone(), Arc::new(handler));
        if previous.is_some() {
            tracing::debug!(function = %name, "Replaced registered function");
        }
    }

    pub async fn unregister(&self, name: &str) -> bool {
        self.handlers.write().await.remove(name).is_some()
    }

    pub async fn has(&self, name: &str) -> bool {
        self.handlers.read().await.contains_key(name)
    }

    pub async fn get(&self, name: &str) -> Option<Arc<dyn FunctionHandler>> {
        self.handlers.read().await.get(name).cloned()
    }

    /// Registered names, sorted
    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.handlers.read().await.keys().cloned().collect();
        names.sort();
        names
    }
}
