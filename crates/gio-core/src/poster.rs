//! Per-event-key façade over the loader, the parameter pipeline and the queue.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::runtime::Handle;
use tracing::{debug, trace};

use crate::client::Client;
use crate::config::EventOptions;
use crate::error::ValidationError;
use crate::loader::{DefinitionLoader, LoadOutcome};
use crate::message::{WireMessage, CSTM};
use crate::params::ParamsTree;
use crate::schema::EventSchema;

const MIN_READY_WAIT: Duration = Duration::from_millis(1);

struct Compiled {
    schema: Arc<EventSchema>,
    params: ParamsTree,
}

struct PosterInner {
    client: Client,
    event_key: String,
    options: EventOptions,
    loader: DefinitionLoader,
    compiled: RwLock<Option<Compiled>>,
    settled: AtomicBool,
    /// A background load task is in flight.
    loading: AtomicBool,
}

/// Observable state of an [`EventPoster`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventPosterState {
    /// Loading is finished, with or without a schema.
    pub initialized: bool,
    pub load_attempts: u32,
    pub last_load_attempt_at: Option<tokio::time::Instant>,
    /// Finished without a schema: payloads are forwarded unvalidated.
    pub degraded: bool,
}

/// Validates and enqueues events for one event key.
///
/// Cheap to clone; clones share the loader and the compiled schema.
#[derive(Clone)]
pub struct EventPoster {
    inner: Arc<PosterInner>,
}

impl EventPoster {
    pub(crate) fn new(client: Client, event_key: impl Into<String>, options: EventOptions) -> Self {
        let event_key = event_key.into();
        let loader = DefinitionLoader::new(
            event_key.clone(),
            options.max_init_attempt,
            options.init_interval,
        );
        Self {
            inner: Arc::new(PosterInner {
                client,
                event_key,
                options,
                loader,
                compiled: RwLock::new(None),
                settled: AtomicBool::new(false),
                loading: AtomicBool::new(false),
            }),
        }
    }

    pub fn event_key(&self) -> &str {
        &self.inner.event_key
    }

    pub fn options(&self) -> &EventOptions {
        &self.inner.options
    }

    /// The loaded schema, if any.
    pub fn schema(&self) -> Option<Arc<EventSchema>> {
        self.inner
            .compiled
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|compiled| Arc::clone(&compiled.schema))
    }

    /// Builds a message from `data` and hands it to the client queue.
    ///
    /// Validation runs against the schema when it has loaded; until then (and
    /// for good once loading gave up) the caller's keys are forwarded as-is.
    /// Every call also nudges the schema loader in the background.
    ///
    /// Errors are caller input errors only. Nothing is queued when one is
    /// returned; dispatch failures surface through the error callbacks.
    pub fn batch(
        &self,
        uid: impl Into<Value>,
        data: &Map<String, Value>,
        time: Option<i64>,
    ) -> Result<WireMessage, ValidationError> {
        if data.is_empty() {
            return Err(ValidationError::EmptyPayload);
        }

        let missing: Vec<String> = self
            .inner
            .options
            .required_keys
            .iter()
            .filter(|key| !data.contains_key(key.as_str()))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(ValidationError::MissingRequired { keys: missing });
        }

        let payload = {
            let compiled = self.inner.compiled.read().unwrap_or_else(|e| e.into_inner());
            match compiled.as_ref() {
                Some(compiled) => compiled.params.apply(data)?,
                None => {
                    trace!(event = %self.inner.event_key, "Forwarding payload without schema");
                    data.clone()
                }
            }
        };

        self.spawn_load();

        Ok(self
            .inner
            .client
            .enqueue(&self.inner.event_key, Some(CSTM), uid.into(), payload, time))
    }

    /// Runs one loader step, compiling the schema when it arrives.
    pub async fn init(&self) -> LoadOutcome {
        let outcome = self.inner.loader.load(&self.inner.client).await;

        if let LoadOutcome::Loaded(schema) = &outcome {
            let mut compiled = self.inner.compiled.write().unwrap_or_else(|e| e.into_inner());
            if compiled.is_none() {
                let params = ParamsTree::build(
                    schema,
                    &self.inner.options.required_keys,
                    self.inner.options.policy(),
                );
                debug!(event = %self.inner.event_key, params = params.len(), "Event schema compiled");
                *compiled = Some(Compiled {
                    schema: Arc::clone(schema),
                    params,
                });
            }
        }
        if outcome.is_done() {
            self.inner.settled.store(true, Ordering::Release);
        }
        outcome
    }

    /// Keeps loading until the outcome is final, sleeping out the throttle
    /// between attempts. Returns whether a schema is available.
    pub async fn ready(&self) -> bool {
        loop {
            let outcome = self.init().await;
            if outcome.is_done() {
                return outcome.schema().is_some();
            }
            let wait = self.inner.loader.retry_after().await.max(MIN_READY_WAIT);
            tokio::time::sleep(wait).await;
        }
    }

    pub async fn state(&self) -> EventPosterState {
        let snapshot = self.inner.loader.snapshot().await;
        EventPosterState {
            initialized: snapshot.initialized,
            load_attempts: snapshot.attempts,
            last_load_attempt_at: snapshot.last_attempt_at,
            degraded: snapshot.initialized && !snapshot.schema_loaded,
        }
    }

    fn spawn_load(&self) {
        if self.inner.settled.load(Ordering::Acquire) {
            return;
        }
        let Ok(runtime) = Handle::try_current() else {
            trace!(event = %self.inner.event_key, "No runtime, schema load deferred");
            return;
        };
        if self.inner.loading.swap(true, Ordering::AcqRel) {
            return;
        }
        let poster = self.clone();
        runtime.spawn(async move {
            poster.init().await;
            poster.inner.loading.store(false, Ordering::Release);
        });
    }
}
