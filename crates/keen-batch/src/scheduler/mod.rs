use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Why a flush was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushTrigger {
    Timer,
    Manual,
}

/// Sending half of the flush trigger queue.
///
/// The queue holds a single trigger. Raising one while another is still
/// pending is a no-op, so a burst of ticks collapses into one flush.
#[derive(Debug, Clone)]
pub struct TriggerSender {
    tx: mpsc::Sender<FlushTrigger>,
}

pub type TriggerReceiver = mpsc::Receiver<FlushTrigger>;

pub fn trigger_channel() -> (TriggerSender, TriggerReceiver) {
    let (tx, rx) = mpsc::channel(1);
    (TriggerSender { tx }, rx)
}

impl TriggerSender {
    /// Returns `false` if the trigger was coalesced into a pending one or the
    /// loop has stopped.
    pub fn raise(&self, trigger: FlushTrigger) -> bool {
        match self.tx.try_send(trigger) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                trace!(?trigger, "flush already pending");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }
}

/// Periodic timer that raises [`FlushTrigger::Timer`] until cancelled.
pub struct FlushScheduler {
    period: Duration,
    triggers: TriggerSender,
    cancel: CancellationToken,
}

impl FlushScheduler {
    pub fn new(period: Duration, triggers: TriggerSender, cancel: CancellationToken) -> Self {
        Self {
            period,
            triggers,
            cancel,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// First tick fires one period after start. A slow loop delays later
    /// ticks rather than bunching them up.
    pub async fn run(self) {
        let mut interval = time::interval_at(Instant::now() + self.period, self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    debug!("flush scheduler stopped");
                    return;
                }
                _ = interval.tick() => {
                    self.triggers.raise(FlushTrigger::Timer);
                }
            }
        }
    }
}
