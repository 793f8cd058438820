use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

use crate::envelope::{Addon, Envelope};

#[derive(Debug, Error)]
pub enum SubmitError {
    /// The batch loop did not take the event within the configured timeout,
    /// either because intake is saturated or because the loop has stopped.
    #[error("timed out after {0:?} while adding event to batch")]
    Timeout(Duration),
}

/// Entry point producers use to hand events to the batch loop.
///
/// Cheap to clone; each clone applies its own deadline per call.
pub struct SubmissionGate<T> {
    intake: mpsc::Sender<Envelope<T>>,
    addons: Arc<[Addon]>,
    timeout: Duration,
}

impl<T> Clone for SubmissionGate<T> {
    fn clone(&self) -> Self {
        Self {
            intake: self.intake.clone(),
            addons: Arc::clone(&self.addons),
            timeout: self.timeout,
        }
    }
}

impl<T> SubmissionGate<T> {
    pub fn new(intake: mpsc::Sender<Envelope<T>>, addons: Arc<[Addon]>, timeout: Duration) -> Self {
        Self {
            intake,
            addons,
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Wrap `payload` in an envelope and hand it to the batch loop.
    ///
    /// The timestamp is not validated. Payload serialization problems only
    /// show up when the batch is dispatched. A stopped loop is reported the
    /// same way as a saturated one, once the full timeout has passed.
    pub async fn submit(&self, timestamp: impl Into<String>, payload: T) -> Result<(), SubmitError> {
        let deadline = tokio::time::Instant::now() + self.timeout;
        let envelope = Envelope::build(timestamp, payload, Arc::clone(&self.addons));
        match self.intake.send_timeout(envelope, self.timeout).await {
            Ok(()) => Ok(()),
            Err(mpsc::error::SendTimeoutError::Timeout(_)) => {
                debug!(timeout = ?self.timeout, "intake saturated, rejecting event");
                Err(SubmitError::Timeout(self.timeout))
            }
            Err(mpsc::error::SendTimeoutError::Closed(_)) => {
                debug!(timeout = ?self.timeout, "batch loop stopped, rejecting event");
                tokio::time::sleep_until(deadline).await;
                Err(SubmitError::Timeout(self.timeout))
            }
        }
    }
}
