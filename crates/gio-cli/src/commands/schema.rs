use gio_core::Client;
use serde_json::Value;

use crate::cli::SchemaArgs;
use crate::error::CliError;

pub async fn run(args: &SchemaArgs, client: &Client) -> Result<Value, CliError> {
    let schema = client.fetch_schema(&args.key).await?;
    Ok(serde_json::to_value(schema.as_ref())?)
}
