use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::{ClientConfig, EventOptions};
use crate::dispatcher::Dispatcher;
use crate::error::{ConfigError, DispatchError, SchemaError};
use crate::loader::{ResolveFuture, SchemaResolver};
use crate::message::{WireMessage, CSTM};
use crate::poster::EventPoster;
use crate::schema::{EventSchema, SchemaCache};
use crate::transport::{HttpTransport, Management, Transport};

struct ClientInner {
    config: ClientConfig,
    management: Arc<dyn Management>,
    dispatcher: Arc<Dispatcher>,
    schemas: SchemaCache,
    initialized: AtomicBool,
    init_guard: Mutex<()>,
}

/// Owns the schema cache, the message queue and its dispatcher.
///
/// Cheap to clone; clones share all state. The flush timer is not started
/// automatically, call [`Client::start_timer`] for periodic draining.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    /// Client talking HTTP to the configured collection and management services.
    pub fn new(config: ClientConfig) -> Result<Self, ConfigError> {
        let transport = Arc::new(HttpTransport::new(config.clone()));
        Self::with_collaborators(config, transport.clone(), transport)
    }

    pub fn with_collaborators(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        management: Arc<dyn Management>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let dispatcher = Arc::new(Dispatcher::new(
            transport,
            config.batch_size,
            config.send_msg_interval(),
        ));
        Ok(Self {
            inner: Arc::new(ClientInner {
                config,
                management,
                dispatcher,
                schemas: SchemaCache::new(),
                initialized: AtomicBool::new(false),
                init_guard: Mutex::new(()),
            }),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Whether the schema cache has been populated by [`Client::init`].
    pub fn is_initialized(&self) -> bool {
        self.inner.initialized.load(Ordering::Acquire)
    }

    /// Fetches every event schema once and caches it under its id and key.
    ///
    /// Concurrent callers wait for the fetch in progress. Once it succeeds
    /// further calls return immediately.
    pub async fn init(&self) -> Result<(), SchemaError> {
        let _guard = self.inner.init_guard.lock().await;
        if self.is_initialized() {
            return Ok(());
        }

        let schemas = self.inner.management.fetch_schemas().await?;
        let count = schemas.len();
        for schema in schemas {
            self.inner.schemas.insert(schema);
        }
        self.inner.initialized.store(true, Ordering::Release);
        debug!(schemas = count, "Event schemas cached");
        Ok(())
    }

    /// Resolves `key` (an event key or schema id), bootstrapping the cache first.
    pub async fn fetch_schema(&self, key: &str) -> Result<Arc<EventSchema>, SchemaError> {
        if !self.is_initialized() {
            self.init().await?;
        }
        self.inner.schemas.get(key).ok_or_else(|| SchemaError::NotDefined {
            key: key.to_owned(),
        })
    }

    /// Cached schema for `key`, without any remote call.
    pub fn schema(&self, key: &str) -> Option<Arc<EventSchema>> {
        self.inner.schemas.get(key)
    }

    pub fn event(&self, event_key: impl Into<String>, options: EventOptions) -> EventPoster {
        EventPoster::new(self.clone(), event_key, options)
    }

    /// Builds a wire message and appends it to the queue.
    ///
    /// Reaching `batch_size` sends the oldest slice in the background.
    pub fn enqueue(
        &self,
        event_key: &str,
        event_type: Option<&str>,
        uid: Value,
        payload: Map<String, Value>,
        time: Option<i64>,
    ) -> WireMessage {
        let message = WireMessage::new(event_key, event_type, uid, payload, time);
        self.inner.dispatcher.enqueue(message.clone());
        message
    }

    /// Enqueues a custom event without schema validation.
    pub fn batch_cstm(
        &self,
        event_key: &str,
        uid: impl Into<Value>,
        payload: Map<String, Value>,
    ) -> WireMessage {
        self.enqueue(event_key, Some(CSTM), uid.into(), payload, None)
    }

    pub fn queue_len(&self) -> usize {
        self.inner.dispatcher.queue().len()
    }

    pub fn on_success<F>(&self, callback: F)
    where
        F: Fn(&str, &[WireMessage]) + Send + Sync + 'static,
    {
        self.inner.dispatcher.callbacks().on_success(callback);
    }

    pub fn on_error<F>(&self, callback: F)
    where
        F: Fn(&str, &[WireMessage], &DispatchError) + Send + Sync + 'static,
    {
        self.inner.dispatcher.callbacks().on_error(callback);
    }

    pub async fn send_batch(&self) -> Result<Option<Vec<WireMessage>>, DispatchError> {
        self.inner.dispatcher.send_batch().await
    }

    /// Drains the queue; returns how many messages were delivered.
    pub async fn flush(&self) -> Result<usize, DispatchError> {
        self.inner.dispatcher.flush().await
    }

    /// Starts the recurring drain; `false` when called outside a tokio runtime.
    pub fn start_timer(&self) -> bool {
        self.inner.dispatcher.start_timer()
    }

    pub fn stop_timer(&self) {
        self.inner.dispatcher.stop_timer();
    }

    pub fn is_timer_running(&self) -> bool {
        self.inner.dispatcher.is_timer_running()
    }

    /// Stops the timer after any in-flight tick completes, then optionally flushes.
    pub async fn stop(&self, flush: bool) -> Result<usize, DispatchError> {
        self.inner.dispatcher.stop(flush).await
    }
}

impl SchemaResolver for Client {
    fn is_initialized(&self) -> bool {
        Client::is_initialized(self)
    }

    fn resolve<'a>(&'a self, key: &'a str) -> ResolveFuture<'a> {
        Box::pin(self.fetch_schema(key))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::error::TransportError;
    use crate::schema::{EventAttr, ParamType};
    use crate::transport::MemoryTransport;

    fn client(transport: &Arc<MemoryTransport>, config: ClientConfig) -> Client {
        Client::with_collaborators(config, transport.clone(), transport.clone())
            .expect("valid config")
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let transport = Arc::new(MemoryTransport::new());
        let result = Client::with_collaborators(
            ClientConfig::new().with_batch_size(0),
            transport.clone(),
            transport,
        );

        assert!(matches!(result, Err(ConfigError::ZeroBatchSize)));
    }

    #[tokio::test]
    async fn init_caches_schemas_under_id_and_key() {
        let transport = Arc::new(MemoryTransport::with_schemas(vec![EventSchema::new(
            "12",
            "purchase",
            vec![EventAttr::new("amount", ParamType::Double)],
        )]));
        let client = client(&transport, ClientConfig::new());

        client.init().await.expect("fetched");
        client.init().await.expect("cached");

        assert!(client.is_initialized());
        assert_eq!(transport.fetch_calls(), 1);
        let by_id = client.schema("12").expect("by id");
        let by_key = client.schema("purchase").expect("by key");
        assert!(Arc::ptr_eq(&by_id, &by_key));
    }

    #[tokio::test]
    async fn failed_init_leaves_client_uninitialized() {
        let transport = Arc::new(MemoryTransport::new());
        transport.fail_next_fetch(TransportError::new("timeout"));
        let client = client(&transport, ClientConfig::new());

        assert!(matches!(client.init().await, Err(SchemaError::Fetch(_))));
        assert!(!client.is_initialized());

        client.init().await.expect("second fetch succeeds");
        assert!(client.is_initialized());
    }

    #[tokio::test]
    async fn fetch_schema_reports_unknown_keys() {
        let transport = Arc::new(MemoryTransport::new());
        let client = client(&transport, ClientConfig::new());

        assert_eq!(
            client.fetch_schema("missing").await,
            Err(SchemaError::NotDefined {
                key: String::from("missing")
            })
        );
    }

    #[tokio::test]
    async fn batch_cstm_enqueues_with_default_type() {
        let transport = Arc::new(MemoryTransport::new());
        let client = client(&transport, ClientConfig::new());

        let message = client.batch_cstm("share", "u1", Map::new());

        assert_eq!(message.t, CSTM);
        assert_eq!(message.cs1, json!("u1"));
        assert_eq!(client.queue_len(), 1);
        assert_eq!(client.flush().await, Ok(1));
        assert_eq!(transport.sent_messages(), vec![message]);
    }
}
