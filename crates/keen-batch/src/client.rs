use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::batch_loop::BatchLoop;
use crate::config::{Config, ConfigError};
use crate::dispatcher::Dispatcher;
use crate::envelope::Addon;
use crate::gate::{SubmissionGate, SubmitError};
use crate::scheduler::{FlushScheduler, FlushTrigger, TriggerSender, trigger_channel};
use crate::sink::{HttpSink, Sink};
use crate::stats::{DeliveryStats, StatsSnapshot};

/// Batching event client for one collection.
///
/// Construction spawns the batch loop and the flush timer on the current
/// tokio runtime. Call [`Client::shutdown`] to flush what is pending and
/// stop both; dropping the client stops them too, with the same final flush,
/// but without waiting for it.
///
/// # Panics
///
/// [`Client::new`] panics if called outside a tokio runtime.
pub struct Client<T> {
    collection: String,
    gate: SubmissionGate<T>,
    triggers: TriggerSender,
    stats: Arc<DeliveryStats>,
    cancel: CancellationToken,
    loop_task: Option<JoinHandle<()>>,
    scheduler_task: Option<JoinHandle<()>>,
}

impl<T> Client<T>
where
    T: Serialize + Send + Sync + 'static,
{
    pub fn new<S: Sink>(config: Config, sink: S) -> Result<Self, ConfigError> {
        config.validate()?;

        let Config {
            collection,
            flush_interval,
            submit_timeout,
            dispatch_timeout,
            intake_capacity,
            failure_policy,
            dispatch_mode,
            addons,
            ..
        } = config;

        let cancel = CancellationToken::new();
        let stats = Arc::new(DeliveryStats::new());
        let (intake_tx, intake_rx) = mpsc::channel(intake_capacity);
        let (triggers, trigger_rx) = trigger_channel();
        let addons: Arc<[Addon]> = addons.into();

        let dispatcher = Arc::new(Dispatcher::new(
            sink,
            dispatch_timeout,
            failure_policy,
            Arc::clone(&stats),
        ));
        let batch_loop = BatchLoop::new(
            collection.clone(),
            intake_rx,
            trigger_rx,
            dispatcher,
            dispatch_mode,
            cancel.clone(),
        );
        let loop_task = tokio::spawn(batch_loop.run());
        let scheduler_task =
            FlushScheduler::new(flush_interval, triggers.clone(), cancel.clone()).spawn();

        debug!(
            %collection,
            ?flush_interval,
            ?submit_timeout,
            addons = addons.len(),
            "client started"
        );

        Ok(Self {
            collection,
            gate: SubmissionGate::new(intake_tx, addons, submit_timeout),
            triggers,
            stats,
            cancel,
            loop_task: Some(loop_task),
            scheduler_task: Some(scheduler_task),
        })
    }

    /// Client that posts to the Keen events API described by `config`.
    pub fn with_http(config: Config) -> Result<Self, ConfigError> {
        config.validate()?;
        let sink = HttpSink::new(&config)?;
        Self::new(config, sink)
    }

    /// Queue one event. Fails with [`SubmitError::Timeout`] if the batch
    /// loop does not take it within the submit timeout.
    pub async fn submit(&self, timestamp: impl Into<String>, payload: T) -> Result<(), SubmitError> {
        self.gate.submit(timestamp, payload).await
    }

    /// A standalone submission handle, for producers that should not hold the client.
    pub fn gate(&self) -> SubmissionGate<T> {
        self.gate.clone()
    }

    /// Ask the loop to flush now instead of waiting for the timer. Coalesces
    /// with any flush that is already pending.
    pub fn flush(&self) {
        self.triggers.raise(FlushTrigger::Manual);
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Stop the timer, flush anything pending once, and wait for the loop to
    /// exit. Returns the final delivery counters.
    pub async fn shutdown(mut self) -> StatsSnapshot {
        self.cancel.cancel();
        if let Some(task) = self.scheduler_task.take()
            && let Err(e) = task.await
        {
            error!(error = %e, "flush scheduler panicked");
        }
        if let Some(task) = self.loop_task.take()
            && let Err(e) = task.await
        {
            error!(error = %e, "batch loop panicked");
        }
        self.stats.snapshot()
    }
}

impl<T> Drop for Client<T> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
