use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::batch::Batch;
use crate::config::FailurePolicy;
use crate::sink::Sink;
use crate::stats::DeliveryStats;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("events endpoint rejected batch: HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("failed to serialize batch: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("dispatch did not complete within {0:?}")]
    TimedOut(Duration),
}

impl DispatchError {
    /// HTTP status of the response, when there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            DispatchError::Rejected { status, .. } => Some(*status),
            DispatchError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Serializes detached batches and hands them to a [`Sink`].
pub struct Dispatcher<S> {
    sink: S,
    timeout: Duration,
    policy: FailurePolicy,
    stats: Arc<DeliveryStats>,
}

impl<S: Sink> Dispatcher<S> {
    pub fn new(sink: S, timeout: Duration, policy: FailurePolicy, stats: Arc<DeliveryStats>) -> Self {
        Self {
            sink,
            timeout,
            policy,
            stats,
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Serialize and send one batch within the dispatch timeout.
    pub async fn dispatch<T: Serialize>(&self, batch: &Batch<T>) -> Result<(), DispatchError> {
        let body = batch.to_json()?;
        debug!(events = batch.len(), bytes = body.len(), "dispatching batch");
        match tokio::time::timeout(self.timeout, self.sink.send(body)).await {
            Ok(result) => result,
            Err(_) => Err(DispatchError::TimedOut(self.timeout)),
        }
    }

    /// Dispatch, log the outcome and apply the failure policy.
    ///
    /// Returns the events that should be put back in front of the
    /// accumulating batch. Each event gets at most one extra attempt: events
    /// that were already requeued are dropped while the rest of the batch is
    /// returned. Serialization failures are never requeued.
    pub async fn deliver<T: Serialize>(&self, batch: Batch<T>) -> Option<Batch<T>> {
        let events = batch.len();
        let err = match self.dispatch(&batch).await {
            Ok(()) => {
                self.stats.record_sent(events);
                debug!(events, "batch delivered");
                return None;
            }
            Err(e) => e,
        };

        let retryable = !matches!(err, DispatchError::Serialization(_));
        match self.policy {
            FailurePolicy::Requeue if retryable => {
                let (exhausted, fresh) = batch.split_requeued();
                let dropped = exhausted.len();
                let requeued = fresh.len();
                if dropped > 0 {
                    error!(error = %err, status = ?err.status(), events = dropped, "flush failed, dropping requeued events");
                }
                if requeued > 0 {
                    warn!(error = %err, status = ?err.status(), events = requeued, "flush failed, requeueing events");
                }
                self.stats.record_failed(dropped, requeued);
                (!fresh.is_empty()).then_some(fresh)
            }
            _ => {
                error!(error = %err, status = ?err.status(), events, "flush failed, dropping batch");
                self.stats.record_failed(events, 0);
                None
            }
        }
    }
}
