mod schema;
mod track;

use std::sync::Arc;

use gio_core::{Client, ClientConfig, EventSchema, MemoryTransport};
use serde_json::Value;

use crate::cli::{Cli, Command};
use crate::error::CliError;

pub async fn run(cli: &Cli) -> Result<Value, CliError> {
    let mut config = ClientConfig::from_env()?;
    if let Some(timeout_ms) = cli.timeout_ms {
        config = config.with_timeout_ms(timeout_ms);
    }
    let client = build_client(cli, config)?;

    match &cli.command {
        Command::Track(args) => track::run(args, &client, cli.dry_run).await,
        Command::Schema(args) => schema::run(args, &client).await,
    }
}

fn build_client(cli: &Cli, config: ClientConfig) -> Result<Client, CliError> {
    if !cli.dry_run {
        return Ok(Client::new(config)?);
    }

    let schemas = match &cli.schemas {
        Some(path) => {
            let raw = std::fs::read_to_string(path)?;
            serde_json::from_str::<Vec<EventSchema>>(&raw)?
        }
        None => Vec::new(),
    };
    let transport = Arc::new(MemoryTransport::with_schemas(schemas));
    Ok(Client::with_collaborators(
        config,
        transport.clone(),
        transport,
    )?)
}
