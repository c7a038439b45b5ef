//! Process-wide model cache and the bounded pool model calls run on.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{OnceCell, Semaphore};

use crate::error::{RagError, Result};

/// Lazily loaded models keyed by configuration key (model name, size, path).
/// Concurrent first access for a key runs its loader exactly once.
pub struct ModelRegistry<M> {
    slots: Mutex<HashMap<String, Arc<OnceCell<Arc<M>>>>>,
}

impl<M: Send + Sync + 'static> ModelRegistry<M> {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    fn slot(&self, key: &str) -> Arc<OnceCell<Arc<M>>> {
        let mut slots = self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        slots.entry(key.to_string()).or_default().clone()
    }

    /// Return the model for `key`, loading it on the blocking pool if needed.
    /// A failed load leaves the slot empty so a later call can retry.
    pub async fn get_or_load<F>(&self, key: &str, loader: F) -> Result<Arc<M>>
    where
        F: FnOnce() -> anyhow::Result<M> + Send + 'static,
    {
        let slot = self.slot(key);
        let model = slot
            .get_or_try_init(|| async {
                tracing::info!(model = key, "Loading model");
                let loaded = tokio::task::spawn_blocking(loader)
                    .await
                    .map_err(|e| RagError::upstream("model loader", e))?
                    .map_err(|e| RagError::upstream("model loader", format!("{:#}", e)))?;
                tracing::info!(model = key, "Model loaded");
                Ok::<_, RagError>(Arc::new(loaded))
            })
            .await?;
        Ok(model.clone())
    }

    pub fn is_loaded(&self, key: &str) -> bool {
        self.slot(key).initialized()
    }
}

impl<M: Send + Sync + 'static> Default for ModelRegistry<M> {
    fn default() -> Self {
        Self::new()
    }
}

/// Bounds concurrent model work and applies a deadline to each call.
#[derive(Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
}

impl WorkerPool {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Run CPU-bound work off the async executor. If the deadline passes the
    /// caller gets a retryable error and the eventual result is discarded.
    /// The permit travels with the job, so abandoned work still counts
    /// against the pool until it actually finishes.
    pub async fn run_blocking<T, F>(
        &self,
        service: &'static str,
        timeout: Duration,
        work: F,
    ) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| RagError::upstream(service, e))?;
        let handle = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            work()
        });
        match tokio::time::timeout(timeout, handle).await {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(e))) => Err(RagError::upstream(service, format!("{:#}", e))),
            Ok(Err(join)) => Err(RagError::upstream(service, join)),
            Err(_) => {
                tracing::warn!(service, timeout_secs = timeout.as_secs(), "Model call timed out");
                Err(RagError::timeout(service, timeout))
            }
        }
    }

    /// Run an async model call (e.g. an HTTP request) under the same bound.
    pub async fn run<T, Fut>(
        &self,
        service: &'static str,
        timeout: Duration,
        call: Fut,
    ) -> Result<T>
    where
        Fut: Future<Output = Result<T>>,
    {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| RagError::upstream(service, e))?;
        match tokio::time::timeout(timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(service, timeout_secs = timeout.as_secs(), "Model call timed out");
                Err(RagError::timeout(service, timeout))
            }
        }
    }
}
