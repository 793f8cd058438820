use std::future::Future;
use std::ops::ControlFlow;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::batch::Batch;
use crate::config::DispatchMode;
use crate::dispatcher::Dispatcher;
use crate::envelope::Envelope;
use crate::scheduler::{FlushTrigger, TriggerReceiver};
use crate::sink::Sink;

type FlushTask<T> = JoinHandle<Option<Batch<T>>>;

/// Sole owner and writer of the accumulating [`Batch`].
///
/// Multiplexes intake, flush triggers, completion of the in-flight dispatch
/// and the stop signal. At most one detached batch is in flight; a trigger
/// that arrives meanwhile is remembered and honored once it completes.
pub struct BatchLoop<T, S> {
    collection: String,
    batch: Batch<T>,
    intake_rx: mpsc::Receiver<Envelope<T>>,
    trigger_rx: TriggerReceiver,
    dispatcher: Arc<Dispatcher<S>>,
    mode: DispatchMode,
    cancel: CancellationToken,
    in_flight: Option<FlushTask<T>>,
    flush_pending: bool,
}

impl<T, S> BatchLoop<T, S>
where
    T: Serialize + Send + Sync + 'static,
    S: Sink,
{
    pub fn new(
        collection: String,
        intake_rx: mpsc::Receiver<Envelope<T>>,
        trigger_rx: TriggerReceiver,
        dispatcher: Arc<Dispatcher<S>>,
        mode: DispatchMode,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            collection,
            batch: Batch::new(),
            intake_rx,
            trigger_rx,
            dispatcher,
            mode,
            cancel,
            in_flight: None,
            flush_pending: false,
        }
    }

    /// Run until cancelled or until every submission handle is gone.
    pub async fn run(mut self) {
        debug!(collection = %self.collection, mode = %self.mode, "batch loop started");
        while let ControlFlow::Continue(()) = self.tick().await {}
        debug!(collection = %self.collection, "batch loop stopped");
    }

    /// Run one iteration of the loop.
    ///
    /// Returns `ControlFlow::Break(())` once shutdown has completed.
    async fn tick(&mut self) -> ControlFlow<()> {
        tokio::select! {
            _ = self.cancel.cancelled() => {
                self.shutdown().await;
                return ControlFlow::Break(());
            }
            joined = join_in_flight(&mut self.in_flight) => {
                self.in_flight = None;
                self.finish_flush(joined);
                if std::mem::take(&mut self.flush_pending) {
                    self.flush().await;
                }
            }
            envelope = self.intake_rx.recv() => {
                match envelope {
                    Some(envelope) => self.batch.push(&self.collection, envelope),
                    None => {
                        debug!("all submission handles dropped");
                        self.shutdown().await;
                        return ControlFlow::Break(());
                    }
                }
            }
            Some(trigger) = self.trigger_rx.recv() => {
                self.drain_intake();
                if self.in_flight.is_some() {
                    debug!(?trigger, "flush in flight, deferring trigger");
                    self.flush_pending = true;
                } else {
                    if trigger == FlushTrigger::Manual {
                        debug!(events = self.batch.len(), "manual flush requested");
                    }
                    self.flush().await;
                }
            }
        }
        ControlFlow::Continue(())
    }

    /// Pull in whatever was already accepted so it makes this flush.
    /// Bounded by the queue length at entry so a busy producer cannot
    /// hold the trigger back.
    fn drain_intake(&mut self) {
        for _ in 0..self.intake_rx.len() {
            match self.intake_rx.try_recv() {
                Ok(envelope) => self.batch.push(&self.collection, envelope),
                Err(_) => break,
            }
        }
    }

    /// Detach the batch and dispatch it. Idle flushes are no-ops.
    async fn flush(&mut self) {
        if self.batch.is_empty() {
            return;
        }
        let snapshot = self.batch.take();

        match self.mode {
            DispatchMode::Inline => {
                if let Some(failed) = self.dispatcher.deliver(snapshot).await {
                    self.batch.prepend(failed);
                }
            }
            DispatchMode::Background => {
                let dispatcher = Arc::clone(&self.dispatcher);
                self.in_flight = Some(tokio::spawn(async move { dispatcher.deliver(snapshot).await }));
            }
        }
    }

    fn finish_flush(&mut self, joined: Result<Option<Batch<T>>, JoinError>) {
        match joined {
            Ok(Some(failed)) => self.batch.prepend(failed),
            Ok(None) => {}
            Err(e) => error!(error = %e, "background flush task panicked"),
        }
    }

    /// Join the in-flight dispatch, take in everything already queued, and
    /// flush what remains exactly once.
    async fn shutdown(&mut self) {
        if let Some(handle) = self.in_flight.take() {
            let joined = handle.await;
            self.finish_flush(joined);
        }

        // Further submissions time out; queued ones are still delivered.
        self.intake_rx.close();
        while let Ok(envelope) = self.intake_rx.try_recv() {
            self.batch.push(&self.collection, envelope);
        }

        if self.batch.is_empty() {
            return;
        }
        let snapshot = self.batch.take();
        if let Some(failed) = self.dispatcher.deliver(snapshot).await {
            warn!(events = failed.len(), "final flush failed, events lost");
        }
    }

    #[cfg(test)]
    pub(crate) fn batch(&self) -> &Batch<T> {
        &self.batch
    }
}

fn join_in_flight<T>(
    slot: &mut Option<FlushTask<T>>,
) -> impl Future<Output = Result<Option<Batch<T>>, JoinError>> + '_ {
    async move {
        match slot {
            Some(handle) => handle.await,
            None => std::future::pending().await,
        }
    }
}
