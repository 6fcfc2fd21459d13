//! CLI argument definitions for gio.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `track` | Validate one event against its schema and send it |
//! | `schema` | Print the server-side schema of an event |
//!
//! # Global Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `--pretty` | `false` | Pretty-print JSON output |
//! | `--dry-run` | `false` | Use an in-memory transport instead of HTTP |
//! | `--schemas` | none | JSON schema list served in dry-run mode |
//! | `--timeout-ms` | config | Request timeout override |
//!
//! Connection settings come from `GIO_*` environment variables.
//!
//! # Examples
//!
//! ```bash
//! gio track --event login --uid u1 --data '{"uid":"u1","retryCount":"3"}' --required uid
//! gio schema login --pretty
//! gio track --dry-run --schemas schemas.json --event login --uid u1 --data '{"uid":"u1"}'
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// gio - send analytics events validated against their server-side schema.
#[derive(Debug, Parser)]
#[command(name = "gio", author, version, about = "Analytics event client")]
pub struct Cli {
    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    /// Do not contact any service; messages are kept in memory.
    #[arg(long, global = true, default_value_t = false)]
    pub dry_run: bool,

    /// JSON file with the event schema list served in dry-run mode.
    #[arg(long, global = true, value_name = "FILE")]
    pub schemas: Option<PathBuf>,

    /// Request timeout in milliseconds, overriding GIO_TIMEOUT_MS.
    #[arg(long, global = true)]
    pub timeout_ms: Option<u64>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Validate one event payload and send it.
    ///
    /// # Examples
    ///
    ///   gio track --event login --uid u1 --data '{"uid":"u1"}'
    ///   gio track --event login --uid u1 --data '{"uid":"u1","extra":1}' --lenient
    Track(TrackArgs),

    /// Print the schema of an event key or schema id.
    Schema(SchemaArgs),
}

/// Arguments for the `track` command.
#[derive(Debug, Args)]
pub struct TrackArgs {
    /// Event key.
    #[arg(long)]
    pub event: String,

    /// Subject (user) identifier.
    #[arg(long)]
    pub uid: String,

    /// Payload as a JSON object.
    #[arg(long)]
    pub data: String,

    /// Parameter that must be present; repeatable.
    #[arg(long = "required", value_name = "KEY")]
    pub required: Vec<String>,

    /// Drop undeclared keys and allow nulls instead of rejecting them.
    #[arg(long, default_value_t = false)]
    pub lenient: bool,

    /// Validate raw values without coercing them first.
    #[arg(long, default_value_t = false)]
    pub no_transform: bool,

    /// Keep every digit of integers beyond 64 bits.
    #[arg(long, default_value_t = false)]
    pub big_int: bool,

    /// Event time in epoch milliseconds (default: now).
    #[arg(long)]
    pub time: Option<i64>,
}

/// Arguments for the `schema` command.
#[derive(Debug, Args)]
pub struct SchemaArgs {
    /// Event key or schema id.
    pub key: String,
}
