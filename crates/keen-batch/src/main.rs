use keen_batch::{Client, Config};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

/// Exceptional init failure: log and exit.
fn fatal(msg: &str, error: &dyn std::fmt::Display) -> ! {
    error!(%error, "{msg}");
    std::process::exit(1);
}

fn setup_logging() {
    use tracing_subscriber::filter::LevelFilter;
    use tracing_subscriber::prelude::*;

    let level = std::env::var("KEEN_LOG_LEVEL")
        .ok()
        .and_then(|val| {
            val.parse::<LevelFilter>().ok().or_else(|| {
                eprintln!("invalid KEEN_LOG_LEVEL: {val:?}, defaulting to WARN");
                None
            })
        })
        .unwrap_or(LevelFilter::WARN);

    tracing_subscriber::registry()
        .with(level)
        .with(tracing_microjson::JsonLayer::new(std::io::stderr).with_target(true))
        .init();
}

/// The event's own `timestamp` string if it has one, otherwise now.
fn event_timestamp(event: &Value) -> String {
    event
        .get("timestamp")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .unwrap_or_else(|| chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true))
}

/// One stdin line as an event; blank lines yield `None`.
fn parse_line(line: &str) -> Result<Option<Value>, serde_json::Error> {
    if line.trim().is_empty() {
        return Ok(None);
    }
    serde_json::from_str(line).map(Some)
}

/// Forward newline-delimited JSON events from stdin until EOF or Ctrl-C.
#[tokio::main]
async fn main() {
    setup_logging();

    let config = Config::from_env().unwrap_or_else(|e| fatal("config error", &e));
    let client: Client<Value> =
        Client::with_http(config).unwrap_or_else(|e| fatal("failed to start client", &e));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line,
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, flushing");
                break;
            }
        };
        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                error!(error = %e, "failed to read stdin");
                break;
            }
        };
        let event = match parse_line(&line) {
            Ok(Some(v)) => v,
            Ok(None) => continue,
            Err(e) => {
                warn!(error = %e, "skipping malformed event line");
                continue;
            }
        };
        let timestamp = event_timestamp(&event);
        if let Err(e) = client.submit(timestamp, event).await {
            warn!(error = %e, "dropping event");
        }
    }

    let stats = client.shutdown().await;
    info!(
        batches_sent = stats.batches_sent,
        batches_failed = stats.batches_failed,
        events_dropped = stats.events_dropped,
        "done"
    );
}
