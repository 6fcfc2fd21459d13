//! Contracts with the remote collaborators and their implementations.
//!
//! | Contract | Operation | Remote call |
//! |----------|-----------|-------------|
//! | [`Transport`] | `send(messages)` | `POST {cstm}/{project_id}/s2s/cstm?stm={now}` |
//! | [`Management`] | `fetch_schemas()` | `GET {management}/api/projects/{project_uid}/dim/events` |
//!
//! [`HttpTransport`] implements both over an [`HttpClient`] and owns the retry
//! policy. [`MemoryTransport`] implements both in memory for offline use.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::debug;

use crate::config::ClientConfig;
use crate::error::TransportError;
use crate::http_client::{HttpClient, HttpRequest, ReqwestHttpClient};
use crate::message::{now_millis, WireMessage, CSTM};
use crate::schema::EventSchema;

pub type TransportFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, TransportError>> + Send + 'a>>;

/// Delivers one slice of messages in a single logical exchange.
pub trait Transport: Send + Sync {
    fn send<'a>(&'a self, messages: &'a [WireMessage]) -> TransportFuture<'a, ()>;
}

/// Read access to the server-side event schemas.
pub trait Management: Send + Sync {
    fn fetch_schemas<'a>(&'a self) -> TransportFuture<'a, Vec<EventSchema>>;
}

/// HTTP implementation of [`Transport`] and [`Management`].
#[derive(Clone)]
pub struct HttpTransport {
    http: Arc<dyn HttpClient>,
    config: ClientConfig,
}

impl HttpTransport {
    pub fn new(config: ClientConfig) -> Self {
        Self::with_http_client(config, Arc::new(ReqwestHttpClient::new()))
    }

    pub fn with_http_client(config: ClientConfig, http: Arc<dyn HttpClient>) -> Self {
        Self { http, config }
    }

    fn send_url(&self) -> String {
        let path = format!(
            "/{}/s2s/{}",
            urlencoding::encode(&self.config.project_id),
            CSTM
        );
        self.config.cstm.url(&path)
    }

    fn schemas_url(&self) -> String {
        let path = format!(
            "/api/projects/{}/dim/events",
            urlencoding::encode(&self.config.project_uid)
        );
        self.config.management.url(&path)
    }

    /// Runs `request`, retrying as the retry policy allows, and returns the body.
    async fn execute(&self, request: HttpRequest) -> Result<String, TransportError> {
        let retry = &self.config.retry;
        let mut attempt = 0;

        loop {
            let outcome = self.http.execute(request.clone()).await;
            let should_retry = match &outcome {
                Ok(response) => !response.is_success() && retry.should_retry_status(response.status),
                Err(error) => retry.should_retry_error(error),
            };

            if should_retry && attempt + 1 < retry.max_attempts() {
                let delay = retry.delay_for_attempt(attempt);
                debug!(
                    method = %request.method,
                    url = %request.url,
                    attempt = attempt + 1,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "Retrying request"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
                continue;
            }

            return match outcome {
                Ok(response) if response.is_success() => Ok(response.body),
                Ok(response) => Err(TransportError::new(format!(
                    "Error occurred when {} {}, [{}] {}",
                    request.method, request.url, response.status, response.body
                ))
                .with_status(response.status)),
                Err(error) => Err(TransportError::new(format!(
                    "Error occurred when {} {}, {}",
                    request.method, request.url, error
                ))),
            };
        }
    }
}

impl Transport for HttpTransport {
    fn send<'a>(&'a self, messages: &'a [WireMessage]) -> TransportFuture<'a, ()> {
        Box::pin(async move {
            let body = serde_json::to_string(messages).map_err(|e| {
                TransportError::new(format!("failed to encode messages: {e}"))
            })?;
            let request = HttpRequest::post(self.send_url())
                .with_token(&self.config.token)
                .with_header("accept", "application/json")
                .with_query("stm", now_millis().to_string())
                .with_json_body(body)
                .with_timeout_ms(self.config.timeout_ms);

            self.execute(request).await.map(|_| ())
        })
    }
}

impl Management for HttpTransport {
    fn fetch_schemas<'a>(&'a self) -> TransportFuture<'a, Vec<EventSchema>> {
        Box::pin(async move {
            let request = HttpRequest::get(self.schemas_url())
                .with_token(&self.config.token)
                .with_header("accept", "application/json")
                .with_timeout_ms(self.config.timeout_ms);

            let body = self.execute(request).await?;
            serde_json::from_str(&body).map_err(|e| {
                TransportError::new(format!("invalid schema list response: {e}"))
            })
        })
    }
}

/// In-memory collaborator: serves a fixed schema list and records sent slices.
///
/// Failures can be scripted per call (`fail_next_*`) or made permanent
/// (`set_management_available(false)`).
#[derive(Debug, Default)]
pub struct MemoryTransport {
    schemas: Mutex<Vec<EventSchema>>,
    sent: Mutex<Vec<Vec<WireMessage>>>,
    send_failures: Mutex<VecDeque<TransportError>>,
    fetch_failures: Mutex<VecDeque<TransportError>>,
    management_down: AtomicBool,
    fetch_delay: Mutex<Option<Duration>>,
    send_delay: Mutex<Option<Duration>>,
    fetch_calls: AtomicUsize,
    send_calls: AtomicUsize,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_schemas(schemas: Vec<EventSchema>) -> Self {
        let transport = Self::default();
        *transport.schemas.lock().unwrap_or_else(|e| e.into_inner()) = schemas;
        transport
    }

    pub fn fail_next_send(&self, error: TransportError) {
        self.send_failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(error);
    }

    pub fn fail_next_fetch(&self, error: TransportError) {
        self.fetch_failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(error);
    }

    pub fn set_management_available(&self, available: bool) {
        self.management_down.store(!available, Ordering::SeqCst);
    }

    /// Delays every schema fetch, keeping it in flight for `delay`.
    pub fn set_fetch_delay(&self, delay: Duration) {
        *self.fetch_delay.lock().unwrap_or_else(|e| e.into_inner()) = Some(delay);
    }

    /// Delays every send, keeping the slice in flight for `delay`.
    pub fn set_send_delay(&self, delay: Duration) {
        *self.send_delay.lock().unwrap_or_else(|e| e.into_inner()) = Some(delay);
    }

    pub fn sent_batches(&self) -> Vec<Vec<WireMessage>> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn sent_messages(&self) -> Vec<WireMessage> {
        self.sent_batches().into_iter().flatten().collect()
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn send_calls(&self) -> usize {
        self.send_calls.load(Ordering::SeqCst)
    }
}

impl Transport for MemoryTransport {
    fn send<'a>(&'a self, messages: &'a [WireMessage]) -> TransportFuture<'a, ()> {
        Box::pin(async move {
            self.send_calls.fetch_add(1, Ordering::SeqCst);
            let delay = *self.send_delay.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            let failure = self
                .send_failures
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .pop_front();
            if let Some(error) = failure {
                return Err(error);
            }
            self.sent
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(messages.to_vec());
            Ok(())
        })
    }
}

impl Management for MemoryTransport {
    fn fetch_schemas<'a>(&'a self) -> TransportFuture<'a, Vec<EventSchema>> {
        Box::pin(async move {
            self.fetch_calls.fetch_add(1, Ordering::SeqCst);
            let delay = *self.fetch_delay.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            let failure = self
                .fetch_failures
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .pop_front();
            if let Some(error) = failure {
                return Err(error);
            }
            if self.management_down.load(Ordering::SeqCst) {
                return Err(TransportError::new("management service unavailable").with_status(503));
            }
            Ok(self.schemas.lock().unwrap_or_else(|e| e.into_inner()).clone())
        })
    }
}
