use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tokio::sync::Notify;

use crate::dispatcher::DispatchError;
use crate::sink::Sink;

/// Records every body it receives and accepts it.
#[derive(Clone, Default)]
pub struct RecordingSink {
    pub bodies: Arc<Mutex<Vec<serde_json::Value>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.bodies.lock().unwrap().len()
    }

    pub fn bodies(&self) -> Vec<serde_json::Value> {
        self.bodies.lock().unwrap().clone()
    }

    fn record(&self, body: &Bytes) {
        let value = serde_json::from_slice(body).expect("sink received invalid JSON");
        self.bodies.lock().unwrap().push(value);
    }
}

impl Sink for RecordingSink {
    async fn send(&self, body: Bytes) -> Result<(), DispatchError> {
        self.record(&body);
        Ok(())
    }
}

/// Records bodies and answers every request with the given status.
#[derive(Clone, Default)]
pub struct FailingSink {
    pub inner: RecordingSink,
    pub status: u16,
}

impl FailingSink {
    pub fn new(status: u16) -> Self {
        Self {
            inner: RecordingSink::new(),
            status,
        }
    }
}

impl Sink for FailingSink {
    async fn send(&self, body: Bytes) -> Result<(), DispatchError> {
        self.inner.record(&body);
        Err(DispatchError::Rejected {
            status: self.status,
            body: "internal error".into(),
        })
    }
}

/// Fails the first `failures` calls with a 503, then accepts.
#[derive(Clone, Default)]
pub struct FlakySink {
    pub inner: RecordingSink,
    pub remaining_failures: Arc<Mutex<u32>>,
}

impl FlakySink {
    pub fn new(failures: u32) -> Self {
        Self {
            inner: RecordingSink::new(),
            remaining_failures: Arc::new(Mutex::new(failures)),
        }
    }
}

impl Sink for FlakySink {
    async fn send(&self, body: Bytes) -> Result<(), DispatchError> {
        self.inner.record(&body);
        let mut remaining = self.remaining_failures.lock().unwrap();
        if *remaining > 0 {
            *remaining -= 1;
            return Err(DispatchError::Rejected {
                status: 503,
                body: String::new(),
            });
        }
        Ok(())
    }
}

/// Records bodies, then blocks each call until `release` is notified.
#[derive(Clone, Default)]
pub struct GatedSink {
    pub inner: RecordingSink,
    pub release: Arc<Notify>,
}

impl GatedSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Sink for GatedSink {
    async fn send(&self, body: Bytes) -> Result<(), DispatchError> {
        self.inner.record(&body);
        self.release.notified().await;
        Ok(())
    }
}

/// Never answers.
#[derive(Clone, Default)]
pub struct HangingSink {
    pub inner: RecordingSink,
}

impl Sink for HangingSink {
    async fn send(&self, body: Bytes) -> Result<(), DispatchError> {
        self.inner.record(&body);
        std::future::pending().await
    }
}
