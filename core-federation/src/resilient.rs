//! Timeout and retry policy at the adapter boundary.
//!
//! [`ResilientSource`] is the only place a backend failure is observed. Each
//! attempt is bounded by the configured load timeout; retryable failures are
//! retried with a doubling backoff. Once attempts are exhausted the failure is
//! logged, published as [`AggregationEvent::SourceFailed`], and the load
//! yields an empty list. [`ResilientSource::try_load`] keeps the failure
//! visible for callers that need to know a source contributed nothing.

use std::fmt;
use std::sync::Arc;

use core_async::sync::CancellationToken;
use core_async::time::{sleep, timeout};
use core_library::SourceRef;
use core_runtime::config::AggregationTuning;
use core_runtime::events::{AggregationEvent, CoreEvent, EventBus};
use tracing::{debug, warn};

use crate::adapter::{FederatedKind, SourceAdapter};
use crate::error::{FederationError, Result};

#[derive(Clone)]
pub struct ResilientSource {
    inner: Arc<dyn SourceAdapter>,
    tuning: AggregationTuning,
    events: EventBus,
}

impl ResilientSource {
    pub fn new(inner: Arc<dyn SourceAdapter>, tuning: AggregationTuning, events: EventBus) -> Self {
        Self {
            inner,
            tuning,
            events,
        }
    }

    pub fn source(&self) -> &SourceRef {
        self.inner.source()
    }

    /// `kind:instance` label used in logs and events.
    pub fn label(&self) -> String {
        let source = self.inner.source();
        format!("{}:{}", source.kind.wire_id(), source.instance_id)
    }

    /// Loads `T`, never failing: errors collapse to an empty list.
    ///
    /// Retries stop early once `cancel` fires.
    pub async fn load<T: FederatedKind>(&self, cancel: &CancellationToken) -> Vec<T> {
        self.try_load(cancel).await.unwrap_or_default()
    }

    /// Like [`load`](Self::load), but returns the final error once it has
    /// been logged and published.
    pub async fn try_load<T: FederatedKind>(&self, cancel: &CancellationToken) -> Result<Vec<T>> {
        match self.load_with_retry::<T>(cancel).await {
            Ok(items) => {
                debug!(source = %self.label(), kind = %T::KIND, count = items.len(), "Source load finished");
                Ok(items)
            }
            Err(FederationError::Cancelled) => {
                debug!(source = %self.label(), kind = %T::KIND, "Source load cancelled");
                Err(FederationError::Cancelled)
            }
            Err(err) => {
                warn!(source = %self.label(), kind = %T::KIND, error = %err, "Source load failed; contributing nothing");
                self.events
                    .emit(CoreEvent::Aggregation(AggregationEvent::SourceFailed {
                        source: self.label(),
                        kind: T::KIND,
                        message: err.to_string(),
                    }))
                    .ok();
                Err(err)
            }
        }
    }

    async fn load_with_retry<T: FederatedKind>(&self, cancel: &CancellationToken) -> Result<Vec<T>> {
        let mut backoff = self.tuning.retry_backoff;
        let mut attempt: u32 = 0;

        loop {
            let err = match self.attempt::<T>().await {
                Ok(items) => return Ok(items),
                Err(err) => err,
            };

            if !err.is_retryable() || attempt >= self.tuning.retry_attempts {
                return Err(err);
            }
            attempt += 1;
            debug!(
                source = %self.label(),
                kind = %T::KIND,
                attempt,
                backoff_ms = backoff.as_millis() as u64,
                error = %err,
                "Retrying source load"
            );

            tokio::select! {
                _ = cancel.cancelled() => return Err(FederationError::Cancelled),
                _ = sleep(backoff) => {}
            }
            backoff = backoff.saturating_mul(2);
        }
    }

    async fn attempt<T: FederatedKind>(&self) -> Result<Vec<T>> {
        let after = self.tuning.load_timeout;
        match timeout(after, T::load(self.inner.as_ref())).await {
            Ok(result) => result,
            Err(_) => Err(FederationError::Timeout {
                instance: self.label(),
                after,
            }),
        }
    }
}

impl fmt::Debug for ResilientSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResilientSource")
            .field("source", &self.label())
            .field("tuning", &self.tuning)
            .finish()
    }
}
