//! Core of the gio analytics client.
//!
//! This crate contains:
//! - Event schemas and the typed parameter pipeline (validate + coerce)
//! - Lazy, retry-bounded schema loading per event key
//! - The message queue, batch dispatcher and flush timer
//! - Success/error callback fan-out per event key
//! - Transport and management contracts with HTTP and in-memory implementations
//!
//! ```text
//! EventPoster::batch ─▶ ParamsTree::apply ─▶ Client::enqueue ─▶ MessageQueue
//!                                                                   │
//!                        batch_size reached / timer tick / flush ◀──┘
//!                                          │
//!                                Dispatcher::send_batch ─▶ Transport::send
//!                                          │
//!                                 CallbackRegistry (per event key)
//! ```

pub mod callbacks;
pub mod client;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod http_client;
pub mod loader;
pub mod message;
pub mod params;
pub mod poster;
pub mod queue;
pub mod retry;
pub mod schema;
pub mod transport;

pub use callbacks::{CallbackRegistry, ErrorCallback, SuccessCallback};
pub use client::Client;
pub use config::{ClientConfig, EndpointConfig, EventOptions};
pub use dispatcher::Dispatcher;
pub use error::{ConfigError, DispatchError, SchemaError, TransportError, ValidationError};
pub use http_client::{
    HttpClient, HttpError, HttpErrorKind, HttpMethod, HttpRequest, HttpResponse,
    ReqwestHttpClient, ScriptedHttpClient,
};
pub use loader::{DefinitionLoader, LoadOutcome, LoaderSnapshot, SchemaResolver};
pub use message::{WireMessage, CSTM};
pub use params::{ParamDefinition, ParamsTree, PipelinePolicy};
pub use poster::{EventPoster, EventPosterState};
pub use queue::MessageQueue;
pub use retry::{Backoff, RetryConfig};
pub use schema::{EventAttr, EventSchema, ParamType, SchemaCache};
pub use transport::{HttpTransport, Management, MemoryTransport, Transport};
