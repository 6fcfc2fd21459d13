use gio_core::{Client, EventOptions, WireMessage};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::warn;

use crate::cli::TrackArgs;
use crate::error::CliError;

#[derive(Debug, Serialize)]
struct TrackResponseData {
    event: String,
    validated: bool,
    delivered: usize,
    dry_run: bool,
    message: WireMessage,
}

pub async fn run(args: &TrackArgs, client: &Client, dry_run: bool) -> Result<Value, CliError> {
    let data = parse_payload(&args.data)?;

    if let Err(error) = client.init().await {
        warn!(error = %error, "Schema bootstrap failed, event loader will retry");
    }

    let options = EventOptions::new()
        .with_strict(!args.lenient)
        .with_transform_before_validate(!args.no_transform)
        .with_big_int(args.big_int)
        .with_required_keys(args.required.iter().cloned());
    let poster = client.event(args.event.as_str(), options);
    let validated = poster.ready().await;

    let message = poster.batch(args.uid.as_str(), &data, args.time)?;
    let delivered = client.stop(true).await?;

    Ok(serde_json::to_value(TrackResponseData {
        event: args.event.clone(),
        validated,
        delivered,
        dry_run,
        message,
    })?)
}

fn parse_payload(raw: &str) -> Result<Map<String, Value>, CliError> {
    match serde_json::from_str::<Value>(raw)? {
        Value::Object(map) => Ok(map),
        other => Err(CliError::Command(format!(
            "`--data` must be a JSON object, got {other}"
        ))),
    }
}
