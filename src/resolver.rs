//! Resource resolution with per-identifier single-flight acquisition
//!
//! The registry maps each [`ContentId`] to either a ready resource or the
//! shared future of its in-flight acquisition. The first caller for an
//! identifier starts the acquisition; later callers await the same future
//! instead of starting another.
//!
//! Lifecycle per identifier: `Unresolved -> Resolving -> Ready`. `Ready` is
//! terminal; there is no eviction, so every resource resolved during the life
//! of the process stays registered. A failed acquisition returns the slot to
//! `Unresolved` and the next request retries.

use crate::error::{GatewayError, Result};
use crate::metrics::GatewayMetrics;
use crate::models::ContentId;
use crate::swarm::{SwarmEngine, SwarmResource};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Lifecycle state of one identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceState {
    /// Never requested, or the last acquisition failed
    Unresolved,
    /// An acquisition is in flight
    Resolving,
    /// Resolved and registered
    Ready,
}

type Acquisition = Shared<BoxFuture<'static, Result<Arc<dyn SwarmResource>>>>;

enum Slot {
    Resolving(Acquisition),
    Ready(Arc<dyn SwarmResource>),
}

type Registry = Arc<Mutex<HashMap<ContentId, Slot>>>;

/// Resolves content identifiers into ready swarm resources
pub struct ResourceResolver {
    engine: Arc<dyn SwarmEngine>,
    trackers: Arc<[String]>,
    acquisition_timeout: Option<Duration>,
    metrics: Arc<GatewayMetrics>,
    registry: Registry,
}

impl ResourceResolver {
    /// Create a resolver
    ///
    /// # Arguments
    /// * `engine` - Swarm engine used for acquisitions
    /// * `trackers` - Tracker list handed to every acquisition
    /// * `acquisition_timeout` - Optional upper bound on one acquisition
    /// * `metrics` - Shared metrics collector
    pub fn new(
        engine: Arc<dyn SwarmEngine>,
        trackers: Vec<String>,
        acquisition_timeout: Option<Duration>,
        metrics: Arc<GatewayMetrics>,
    ) -> Self {
        ResourceResolver {
            engine,
            trackers: trackers.into(),
            acquisition_timeout,
            metrics,
            registry: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Validate `raw_id` and resolve it
    ///
    /// Invalid identifiers fail before the engine is consulted.
    pub async fn resolve(&self, raw_id: &str) -> Result<Arc<dyn SwarmResource>> {
        let id = ContentId::parse(raw_id)?;
        self.resolve_id(&id).await
    }

    /// Resolve an already validated identifier
    ///
    /// Returns immediately when the resource is ready. Otherwise waits for the
    /// in-flight acquisition, starting one if none is running.
    pub async fn resolve_id(&self, id: &ContentId) -> Result<Arc<dyn SwarmResource>> {
        let acquisition = {
            let mut registry = self.registry.lock().unwrap_or_else(|e| e.into_inner());
            match registry.get(id) {
                Some(Slot::Ready(resource)) => return Ok(Arc::clone(resource)),
                Some(Slot::Resolving(acquisition)) => {
                    debug!("Joining in-flight acquisition of {}", id);
                    acquisition.clone()
                }
                None => {
                    let acquisition = self.start_acquisition(id.clone());
                    registry.insert(id.clone(), Slot::Resolving(acquisition.clone()));
                    acquisition
                }
            }
        };
        acquisition.await
    }

    /// Current lifecycle state of `id`
    pub fn state(&self, id: &ContentId) -> ResourceState {
        let registry = self.registry.lock().unwrap_or_else(|e| e.into_inner());
        match registry.get(id) {
            Some(Slot::Ready(_)) => ResourceState::Ready,
            Some(Slot::Resolving(_)) => ResourceState::Resolving,
            None => ResourceState::Unresolved,
        }
    }

    /// Number of resources in the `Ready` state
    pub fn ready_count(&self) -> usize {
        let registry = self.registry.lock().unwrap_or_else(|e| e.into_inner());
        registry
            .values()
            .filter(|slot| matches!(slot, Slot::Ready(_)))
            .count()
    }

    /// Spawn one acquisition and return a future every waiter can share
    ///
    /// The task outlives its callers, so a client that disconnects while
    /// waiting does not cancel the acquisition. The task itself publishes the
    /// outcome: a resource moves the slot to `Ready`, a failure removes it.
    fn start_acquisition(&self, id: ContentId) -> Acquisition {
        let engine = Arc::clone(&self.engine);
        let trackers = Arc::clone(&self.trackers);
        let metrics = Arc::clone(&self.metrics);
        let registry = Arc::clone(&self.registry);
        let timeout = self.acquisition_timeout;

        let task = tokio::spawn(async move {
            metrics.record_acquisition_started();
            info!("Acquiring resource {} ({} trackers)", id, trackers.len());
            let started = Instant::now();

            // A panicking engine is an ordinary failure: the slot is still cleared below
            let attempt = AssertUnwindSafe(engine.acquire(&id, &trackers))
                .catch_unwind()
                .map(|outcome| {
                    outcome.unwrap_or_else(|panic| {
                        Err(GatewayError::InternalError(format!(
                            "swarm engine panicked while acquiring {}: {}",
                            id,
                            panic_message(panic.as_ref())
                        )))
                    })
                });

            let result = match timeout {
                Some(limit) => match tokio::time::timeout(limit, attempt).await {
                    Ok(result) => result,
                    Err(_) => Err(GatewayError::AcquisitionTimeout {
                        id: id.to_string(),
                        seconds: limit.as_secs(),
                    }),
                },
                None => attempt.await,
            };

            let elapsed = started.elapsed();
            metrics.record_acquisition_finished(result.is_ok(), elapsed);

            let mut registry = registry.lock().unwrap_or_else(|e| e.into_inner());
            match &result {
                Ok(resource) => {
                    info!(
                        "Resource {} ready: {} files in {:?}",
                        id,
                        resource.files().len(),
                        elapsed
                    );
                    registry.insert(id, Slot::Ready(Arc::clone(resource)));
                }
                Err(e) => {
                    warn!("Acquisition of {} failed after {:?}: {}", id, elapsed, e);
                    registry.remove(&id);
                }
            }
            result
        });

        task.map(|joined| {
            joined.unwrap_or_else(|e| {
                Err(GatewayError::InternalError(format!(
                    "acquisition task failed: {}",
                    e
                )))
            })
        })
        .boxed()
        .shared()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}
