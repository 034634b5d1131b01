//! Ordered transforms over raw inbound text

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Transform applied to every raw inbound message before parsing
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn process(&self, raw: String) -> anyhow::Result<String>;
}

#[async_trait]
impl<F, Fut> Middleware for F
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<String>> + Send + 'static,
{
    async fn process(&self, raw: String) -> anyhow::Result<String> {
        (self)(raw).await
    }
}

/// Middleware chain, applied in registration order
#[derive(Clone, Default)]
pub struct MiddlewarePipeline {
    stages: Arc<RwLock<Vec<Arc<dyn Middleware>>>>,
}

impl MiddlewarePipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push<M>(&self, middleware: M)
    where
        M: Middleware + 'static,
    {
        self.stages.write().await.push(Arc::new(middleware));
    }

    pub async fn len(&self) -> usize {
        self.stages.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.stages.read().await.is_empty()
    }

    /// Run every stage; the first failure aborts the chain
    pub async fn run(&self, raw: String) -> anyhow::Result<String> {
        let stages = self.stages.read().await.clone();
        let mut current = raw;
        for stage in stages {
            current = stage.process(current).await?;
        }
        Ok(current)
    }
}
