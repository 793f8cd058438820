use std::future::Future;

use bytes::Bytes;
use reqwest::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use tracing::debug;
use url::Url;

use crate::config::{Config, ConfigError};
use crate::dispatcher::DispatchError;

/// Accepts one serialized batch body.
pub trait Sink: Send + Sync + 'static {
    fn send(&self, body: Bytes) -> impl Future<Output = Result<(), DispatchError>> + Send + '_;
}

/// Posts batches to the Keen events endpoint.
pub struct HttpSink {
    client: Client,
    url: Url,
    write_key: String,
}

impl HttpSink {
    pub fn new(config: &Config) -> Result<Self, ConfigError> {
        // Another component may already have installed a provider.
        let _ = rustls::crypto::ring::default_provider().install_default();

        let client = Client::builder()
            .timeout(config.dispatch_timeout)
            .build()
            .map_err(ConfigError::HttpClient)?;

        Ok(Self {
            client,
            url: config.events_url()?,
            write_key: config.credentials.write_key.clone(),
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl Sink for HttpSink {
    async fn send(&self, body: Bytes) -> Result<(), DispatchError> {
        let mut req = self
            .client
            .post(self.url.clone())
            .header(AUTHORIZATION, &self.write_key);
        if !body.is_empty() {
            req = req.header(CONTENT_TYPE, "application/json");
        }

        let resp = req.body(body).send().await?;
        let status = resp.status();
        debug!(status = status.as_u16(), "events endpoint responded");

        if status.is_success() {
            Ok(())
        } else {
            let body = resp.text().await.unwrap_or_default();
            Err(DispatchError::Rejected {
                status: status.as_u16(),
                body,
            })
        }
    }
}
