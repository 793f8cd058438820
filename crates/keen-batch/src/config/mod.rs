use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::envelope::Addon;

const DEFAULT_BASE_URL: &str = "https://api.keen.io/3.0/projects/";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is required but not set")]
    Missing(String),

    #[error("{0} has invalid value: {1}")]
    InvalidNumeric(String, String),

    #[error("{0} must be longer than 0")]
    Zero(String),

    #[error("KEEN_BASE_URL is not a valid URL: {0}")]
    InvalidBaseUrl(String),

    #[error("KEEN_FAILURE_POLICY has invalid value: {0} (expected \"discard\" or \"requeue\")")]
    InvalidFailurePolicy(String),

    #[error("KEEN_DISPATCH_MODE has invalid value: {0} (expected \"background\" or \"inline\")")]
    InvalidDispatchMode(String),

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),
}

/// What happens to a batch the remote endpoint did not accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Log and drop the batch.
    #[default]
    Discard,
    /// Put the events back in front of the accumulating batch, once.
    Requeue,
}

impl FailurePolicy {
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        match raw {
            "" | "discard" => Ok(FailurePolicy::Discard),
            "requeue" => Ok(FailurePolicy::Requeue),
            other => Err(ConfigError::InvalidFailurePolicy(other.to_owned())),
        }
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailurePolicy::Discard => write!(f, "discard"),
            FailurePolicy::Requeue => write!(f, "requeue"),
        }
    }
}

/// Whether a flush blocks the batch loop or runs on a spawned task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchMode {
    #[default]
    Background,
    Inline,
}

impl DispatchMode {
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        match raw {
            "" | "background" => Ok(DispatchMode::Background),
            "inline" => Ok(DispatchMode::Inline),
            other => Err(ConfigError::InvalidDispatchMode(other.to_owned())),
        }
    }
}

impl fmt::Display for DispatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchMode::Background => write!(f, "background"),
            DispatchMode::Inline => write!(f, "inline"),
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub project_id: String,
    pub write_key: String,
}

impl Credentials {
    pub fn new(project_id: impl Into<String>, write_key: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            write_key: write_key.into(),
        }
    }

    fn parse(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        Ok(Self {
            project_id: required(vars, "KEEN_PROJECT_ID")?,
            write_key: required(vars, "KEEN_WRITE_KEY")?,
        })
    }
}

// The write key stays out of logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("project_id", &self.project_id)
            .field("write_key", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub credentials: Credentials,
    pub base_url: Url,
    pub collection: String,
    pub flush_interval: Duration,
    pub submit_timeout: Duration,
    pub dispatch_timeout: Duration,
    pub intake_capacity: usize,
    pub failure_policy: FailurePolicy,
    pub dispatch_mode: DispatchMode,
    pub addons: Vec<Addon>,
}

impl Config {
    /// Defaults for everything except credentials and the collection name.
    pub fn new(credentials: Credentials, collection: impl Into<String>) -> Self {
        Self {
            credentials,
            base_url: Url::parse(DEFAULT_BASE_URL).expect("default base URL is valid"),
            collection: collection.into(),
            flush_interval: Duration::from_secs(10),
            submit_timeout: Duration::from_millis(500),
            dispatch_timeout: Duration::from_secs(5),
            intake_capacity: 128,
            failure_policy: FailurePolicy::Discard,
            dispatch_mode: DispatchMode::Background,
            addons: Vec::new(),
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        let vars: HashMap<String, String> = env::vars()
            .filter(|(k, _)| k.starts_with("KEEN_"))
            .collect();
        Self::parse(&vars)
    }

    fn parse(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let credentials = Credentials::parse(vars)?;
        let collection = required(vars, "KEEN_COLLECTION")?;
        let mut config = Self::new(credentials, collection);

        if let Some(raw) = vars.get("KEEN_BASE_URL").filter(|s| !s.is_empty()) {
            config.base_url = parse_base_url(raw)?;
        }
        config.flush_interval =
            parse_duration_ms(vars, "KEEN_FLUSH_INTERVAL_MS", config.flush_interval)?;
        config.submit_timeout =
            parse_duration_ms(vars, "KEEN_SUBMIT_TIMEOUT_MS", config.submit_timeout)?;
        config.dispatch_timeout =
            parse_duration_ms(vars, "KEEN_DISPATCH_TIMEOUT_MS", config.dispatch_timeout)?;
        config.intake_capacity =
            parse_usize(vars, "KEEN_INTAKE_CAPACITY", config.intake_capacity)?;
        config.failure_policy =
            FailurePolicy::parse(vars.get("KEEN_FAILURE_POLICY").map_or("", |s| s.as_str()))?;
        config.dispatch_mode =
            DispatchMode::parse(vars.get("KEEN_DISPATCH_MODE").map_or("", |s| s.as_str()))?;

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the batch loop cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.credentials.project_id.is_empty() {
            return Err(ConfigError::Missing("KEEN_PROJECT_ID".into()));
        }
        if self.credentials.write_key.is_empty() {
            return Err(ConfigError::Missing("KEEN_WRITE_KEY".into()));
        }
        if self.collection.is_empty() {
            return Err(ConfigError::Missing("KEEN_COLLECTION".into()));
        }
        if self.flush_interval.is_zero() {
            return Err(ConfigError::Zero("flush interval".into()));
        }
        if self.submit_timeout.is_zero() {
            return Err(ConfigError::Zero("submit timeout".into()));
        }
        if self.dispatch_timeout.is_zero() {
            return Err(ConfigError::Zero("dispatch timeout".into()));
        }
        if self.intake_capacity == 0 {
            return Err(ConfigError::Zero("intake capacity".into()));
        }
        Ok(())
    }

    /// Attach an addon to every event this client sends, e.g.
    /// `attach_addon("keen:ua_parser", json!({"ua_string": "agent"}), "agent_parsed")`.
    pub fn attach_addon(
        &mut self,
        name: impl Into<String>,
        input: serde_json::Value,
        output: impl Into<String>,
    ) {
        self.addons.push(Addon {
            name: name.into(),
            input,
            output: output.into(),
        });
    }

    /// `{base_url}{project_id}/events`
    pub fn events_url(&self) -> Result<Url, ConfigError> {
        let raw = format!(
            "{}/{}/events",
            self.base_url.as_str().trim_end_matches('/'),
            self.credentials.project_id
        );
        Url::parse(&raw).map_err(|_| ConfigError::InvalidBaseUrl(raw))
    }
}

fn required(vars: &HashMap<String, String>, name: &str) -> Result<String, ConfigError> {
    vars.get(name)
        .filter(|s| !s.is_empty())
        .cloned()
        .ok_or_else(|| ConfigError::Missing(name.to_owned()))
}

fn parse_base_url(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|_| ConfigError::InvalidBaseUrl(raw.to_owned()))?;
    if url.cannot_be_a_base() {
        return Err(ConfigError::InvalidBaseUrl(raw.to_owned()));
    }
    Ok(url)
}

fn parse_duration_ms(
    vars: &HashMap<String, String>,
    name: &str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    match vars.get(name) {
        Some(val) => {
            let ms: u64 = val
                .parse()
                .map_err(|_| ConfigError::InvalidNumeric(name.to_owned(), val.clone()))?;
            if ms == 0 {
                return Err(ConfigError::Zero(name.to_owned()));
            }
            Ok(Duration::from_millis(ms))
        }
        None => Ok(default),
    }
}

fn parse_usize(
    vars: &HashMap<String, String>,
    name: &str,
    default: usize,
) -> Result<usize, ConfigError> {
    match vars.get(name) {
        Some(val) => val
            .parse()
            .map_err(|_| ConfigError::InvalidNumeric(name.to_owned(), val.clone())),
        None => Ok(default),
    }
}
