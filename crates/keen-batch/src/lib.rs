//! Client-side batching for Keen event collection.
//!
//! Producers call [`Client::submit`]; a single batch loop owns the pending
//! events, and a periodic timer asks it to flush them to the events API as
//! one request per interval.

pub mod batch;
pub mod batch_loop;
pub mod client;
pub mod config;
pub mod dispatcher;
pub mod envelope;
pub mod gate;
pub mod scheduler;
pub mod sink;
pub mod stats;

#[cfg(test)]
mod testing;

pub use batch::Batch;
pub use client::Client;
pub use config::{Config, ConfigError, Credentials, DispatchMode, FailurePolicy};
pub use dispatcher::DispatchError;
pub use envelope::{Addon, Envelope};
pub use gate::{SubmissionGate, SubmitError};
pub use sink::{HttpSink, Sink};
pub use stats::StatsSnapshot;
