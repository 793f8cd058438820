#![allow(dead_code)]

pub mod collector;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use keen_batch::{Config, Credentials, DispatchError, Sink};
use serde_json::Value;
use tokio::sync::Notify;

/// Records every body it receives and accepts it.
#[derive(Clone, Default)]
pub struct RecordingSink {
    bodies: Arc<Mutex<Vec<Value>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.bodies.lock().unwrap().len()
    }

    pub fn bodies(&self) -> Vec<Value> {
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

/// Records bodies, then holds each call until `release` is notified.
#[derive(Clone, Default)]
pub struct GatedSink {
    pub inner: RecordingSink,
    pub release: Arc<Notify>,
}

impl Sink for GatedSink {
    async fn send(&self, body: Bytes) -> Result<(), DispatchError> {
        self.inner.record(&body);
        self.release.notified().await;
        Ok(())
    }
}

pub fn config(flush_interval: Duration, submit_timeout: Duration) -> Config {
    let mut config = Config::new(Credentials::new("proj-it", "wk-it"), "pageviews");
    config.flush_interval = flush_interval;
    config.submit_timeout = submit_timeout;
    config
}

/// Payloads of every envelope for `collection` in a captured body.
pub fn payloads(body: &Value, collection: &str) -> Vec<Value> {
    body[collection]
        .as_array()
        .map(|list| list.iter().map(|e| e["event"].clone()).collect())
        .unwrap_or_default()
}
