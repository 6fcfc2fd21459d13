//! Retry-bounded, throttled schema loading for one event key.
//!
//! State machine:
//!
//! ```text
//! uninitialized ──attempt──▶ pending ──(interval elapsed)──▶ attempt ...
//!        │                      │
//!        │                      └─(attempts == max)──▶ done: unavailable (degraded)
//!        └─(success)──────────────────────────────────▶ done: loaded
//! ```
//!
//! Once the client-wide schema cache is populated, a single attempt decides
//! the outcome for good.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::SchemaError;
use crate::schema::EventSchema;

pub type ResolveFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Arc<EventSchema>, SchemaError>> + Send + 'a>>;

/// Source of schemas for the loader, implemented by the client.
pub trait SchemaResolver: Send + Sync {
    /// Whether the client-wide schema cache has been populated.
    fn is_initialized(&self) -> bool;

    fn resolve<'a>(&'a self, key: &'a str) -> ResolveFuture<'a>;
}

/// Result of one call to [`DefinitionLoader::load`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Not done yet; call again later.
    Pending,
    Loaded(Arc<EventSchema>),
    /// Done without a schema: the event runs in pass-through mode for good.
    Unavailable,
}

impl LoadOutcome {
    pub const fn is_done(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    pub fn schema(&self) -> Option<&Arc<EventSchema>> {
        match self {
            Self::Loaded(schema) => Some(schema),
            Self::Pending | Self::Unavailable => None,
        }
    }
}

#[derive(Debug, Default)]
struct LoaderState {
    attempts: u32,
    last_attempt_at: Option<Instant>,
    done: Option<LoadOutcome>,
}

/// Point-in-time view of a loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoaderSnapshot {
    pub attempts: u32,
    pub last_attempt_at: Option<Instant>,
    pub initialized: bool,
    pub schema_loaded: bool,
}

/// Resolves one event key to its schema at most once in steady state.
///
/// Concurrent callers serialize on the in-flight guard, so an attempt that is
/// already running is never duplicated: later callers observe its result.
#[derive(Debug)]
pub struct DefinitionLoader {
    event_key: String,
    max_init_attempt: u32,
    init_interval: Duration,
    state: Mutex<LoaderState>,
}

impl DefinitionLoader {
    pub fn new(event_key: impl Into<String>, max_init_attempt: u32, init_interval: Duration) -> Self {
        Self {
            event_key: event_key.into(),
            max_init_attempt,
            init_interval,
            state: Mutex::new(LoaderState::default()),
        }
    }

    pub fn event_key(&self) -> &str {
        &self.event_key
    }

    pub async fn load(&self, resolver: &dyn SchemaResolver) -> LoadOutcome {
        let mut state = self.state.lock().await;
        if let Some(done) = &state.done {
            return done.clone();
        }

        if resolver.is_initialized() {
            let outcome = match resolver.resolve(&self.event_key).await {
                Ok(schema) => LoadOutcome::Loaded(schema),
                Err(error) => {
                    warn!(event = %self.event_key, error = %error, "Schema unavailable, forwarding payloads unvalidated");
                    LoadOutcome::Unavailable
                }
            };
            state.attempts = state.attempts.saturating_add(1);
            state.last_attempt_at = Some(Instant::now());
            state.done = Some(outcome.clone());
            return outcome;
        }

        if state.attempts >= self.max_init_attempt {
            warn!(
                event = %self.event_key,
                attempts = state.attempts,
                "Schema load attempts exhausted, forwarding payloads unvalidated"
            );
            state.done = Some(LoadOutcome::Unavailable);
            return LoadOutcome::Unavailable;
        }

        if let Some(last) = state.last_attempt_at {
            if last.elapsed() < self.init_interval {
                return LoadOutcome::Pending;
            }
        }

        state.last_attempt_at = Some(Instant::now());
        state.attempts += 1;
        debug!(event = %self.event_key, attempt = state.attempts, "Loading event schema");

        match resolver.resolve(&self.event_key).await {
            Ok(schema) => {
                let outcome = LoadOutcome::Loaded(schema);
                state.done = Some(outcome.clone());
                outcome
            }
            Err(error) => {
                warn!(
                    event = %self.event_key,
                    attempt = state.attempts,
                    error = %error,
                    "Schema load attempt failed"
                );
                LoadOutcome::Pending
            }
        }
    }

    /// Time until the next attempt would not be throttled.
    pub async fn retry_after(&self) -> Duration {
        let state = self.state.lock().await;
        if state.done.is_some() || state.attempts >= self.max_init_attempt {
            return Duration::ZERO;
        }
        state
            .last_attempt_at
            .map(|last| self.init_interval.saturating_sub(last.elapsed()))
            .unwrap_or(Duration::ZERO)
    }

    pub async fn snapshot(&self) -> LoaderSnapshot {
        let state = self.state.lock().await;
        LoaderSnapshot {
            attempts: state.attempts,
            last_attempt_at: state.last_attempt_at,
            initialized: state.done.is_some(),
            schema_loaded: matches!(state.done, Some(LoadOutcome::Loaded(_))),
        }
    }
}
