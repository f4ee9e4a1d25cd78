//! Deduplication of concurrent asynchronous operations by key.
//!
//! UI surfaces tend to fire the same load several times at once (a pull
//! to refresh while the initial load is still in flight, two views bound
//! to the same manager). The registry guarantees at most one execution
//! per key: later callers attach to the in-flight outcome instead of
//! starting a duplicate.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Outcome of a registered task.
///
/// Cancellation is deliberately a separate variant: it is not an error
/// in spirit, and callers that no longer care about the result absorb
/// it silently instead of surfacing it.
#[derive(Debug, Clone, Error)]
pub enum TaskError {
    #[error("task cancelled")]
    Cancelled,

    #[error("task failed: {0}")]
    Failed(Arc<anyhow::Error>),
}

type AnyOutcome = Result<Arc<dyn Any + Send + Sync>, TaskError>;
type SharedOutcome = Shared<BoxFuture<'static, AnyOutcome>>;

struct Inflight {
    outcome: SharedOutcome,
    /// Guards the completion-time removal against a newer task that
    /// reused the key after `cancel_all`.
    generation: u64,
}

struct RegistryInner {
    inflight: Mutex<HashMap<String, Inflight>>,
    cancel: Mutex<CancellationToken>,
    generation: Mutex<u64>,
}

/// Keyed single-flight executor for the sync engine.
///
/// At most one live execution exists per key at any instant; N
/// concurrent calls with the same key yield exactly one invocation of
/// the operation with the same outcome delivered to every caller.
pub struct TaskRegistry {
    inner: Arc<RegistryInner>,
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                inflight: Mutex::new(HashMap::new()),
                cancel: Mutex::new(CancellationToken::new()),
                generation: Mutex::new(0),
            }),
        }
    }

    /// Run `operation` under `key`, or attach to the execution already
    /// running under that key.
    ///
    /// The result is shared: every attached caller receives the same
    /// `Arc`'d payload or the same failure. The handle is removed once
    /// the operation completes, so a later call with the same key starts
    /// a fresh execution.
    pub async fn run<T, F>(&self, key: &str, operation: F) -> Result<Arc<T>, TaskError>
    where
        T: Any + Send + Sync,
        F: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let outcome = {
            let mut inflight = lock(&self.inner.inflight);
            if let Some(entry) = inflight.get(key) {
                debug!(key, "Attaching to in-flight task");
                entry.outcome.clone()
            } else {
                let entry = self.start(key, operation);
                let outcome = entry.outcome.clone();
                inflight.insert(key.to_string(), entry);
                outcome
            }
        };

        match outcome.await {
            Ok(any) => any.downcast::<T>().map_err(|_| {
                TaskError::Failed(Arc::new(anyhow::anyhow!(
                    "task key '{key}' reused with a different payload type"
                )))
            }),
            Err(e) => Err(e),
        }
    }

    fn start<T, F>(&self, key: &str, operation: F) -> Inflight
    where
        T: Any + Send + Sync,
        F: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        debug!(key, "Starting task");
        let token = lock(&self.inner.cancel).clone();
        let generation = {
            let mut current = lock(&self.inner.generation);
            *current += 1;
            *current
        };

        // The operation itself runs detached; dropping an awaiting caller
        // never kills the underlying work.
        let handle = tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => Err(TaskError::Cancelled),
                result = operation => match result {
                    Ok(value) => Ok(Arc::new(value) as Arc<dyn Any + Send + Sync>),
                    Err(e) => Err(TaskError::Failed(Arc::new(e))),
                },
            }
        });

        let inner = Arc::clone(&self.inner);
        let owned_key = key.to_string();
        let outcome = async move {
            let result = match handle.await {
                Ok(result) => result,
                Err(join_err) if join_err.is_cancelled() => Err(TaskError::Cancelled),
                Err(join_err) => Err(TaskError::Failed(Arc::new(anyhow::anyhow!(
                    "task panicked: {join_err}"
                )))),
            };

            let mut inflight = lock(&inner.inflight);
            if inflight
                .get(&owned_key)
                .map(|entry| entry.generation == generation)
                .unwrap_or(false)
            {
                inflight.remove(&owned_key);
            }

            if let Err(TaskError::Failed(ref e)) = result {
                warn!(key = %owned_key, error = %e, "Task failed");
            }
            result
        }
        .boxed()
        .shared();

        Inflight {
            outcome,
            generation,
        }
    }

    /// Signal cancellation to every tracked task and clear the registry.
    ///
    /// Used on logout/teardown so no stale background work outlives its
    /// owner. In-flight callers observe [`TaskError::Cancelled`]; the
    /// registry is immediately reusable for new work.
    pub fn cancel_all(&self) {
        let count = {
            let mut inflight = lock(&self.inner.inflight);
            let count = inflight.len();
            inflight.clear();
            count
        };

        let mut cancel = lock(&self.inner.cancel);
        cancel.cancel();
        *cancel = CancellationToken::new();

        debug!(count, "Cancelled all in-flight tasks");
    }

    /// Number of keys currently executing.
    pub fn len(&self) -> usize {
        lock(&self.inner.inflight).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_concurrent_calls_share_one_execution() {
        let registry = Arc::new(TaskRegistry::new());
        let executions = Arc::new(AtomicUsize::new(0));

        let callers: Vec<_> = (0..5)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let executions = Arc::clone(&executions);
                tokio::spawn(async move {
                    registry
                        .run("activities.load", async move {
                            executions.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(50)).await;
                            Ok(42u32)
                        })
                        .await
                })
            })
            .collect();

        for caller in callers {
            let result = caller.await.unwrap().unwrap();
            assert_eq!(*result, 42);
        }
        assert_eq!(executions.load(Ordering::SeqCst), 1);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_distinct_keys_run_independently() {
        let registry = Arc::new(TaskRegistry::new());
        let executions = Arc::new(AtomicUsize::new(0));

        let e1 = Arc::clone(&executions);
        let e2 = Arc::clone(&executions);
        let (a, b) = tokio::join!(
            registry.run("activities.load", async move {
                e1.fetch_add(1, Ordering::SeqCst);
                Ok(1u32)
            }),
            registry.run("profile.load", async move {
                e2.fetch_add(1, Ordering::SeqCst);
                Ok(2u32)
            }),
        );
        assert_eq!(*a.unwrap(), 1);
        assert_eq!(*b.unwrap(), 2);
        assert_eq!(executions.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_key_reusable_after_completion() {
        let registry = TaskRegistry::new();
        let executions = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let executions = Arc::clone(&executions);
            let result = registry
                .run("activities.refresh", async move {
                    executions.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .await;
            assert!(result.is_ok());
        }
        assert_eq!(executions.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failure_propagates_to_all_callers() {
        let registry = Arc::new(TaskRegistry::new());

        let r1 = Arc::clone(&registry);
        let first = tokio::spawn(async move {
            r1.run("activities.load", async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Err::<u32, _>(anyhow::anyhow!("server unreachable"))
            })
            .await
        });
        // Give the first caller time to start the task
        tokio::time::sleep(Duration::from_millis(10)).await;
        let second = registry
            .run("activities.load", async { Ok(99u32) })
            .await;

        assert!(matches!(first.await.unwrap(), Err(TaskError::Failed(_))));
        assert!(matches!(second, Err(TaskError::Failed(_))));
    }

    #[tokio::test]
    async fn test_cancel_all_yields_cancelled() {
        let registry = Arc::new(TaskRegistry::new());

        let r1 = Arc::clone(&registry);
        let caller = tokio::spawn(async move {
            r1.run("activities.load", async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(1u32)
            })
            .await
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(registry.len(), 1);

        registry.cancel_all();
        assert!(matches!(caller.await.unwrap(), Err(TaskError::Cancelled)));
        assert!(registry.is_empty());

        // Registry accepts new work immediately after teardown
        let result = registry.run("activities.load", async { Ok(7u32) }).await;
        assert_eq!(*result.unwrap(), 7);
    }
}
