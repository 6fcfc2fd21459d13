use std::fmt::{Display, Formatter};

use thiserror::Error;

use crate::schema::ParamType;

/// Caller input errors raised synchronously by `EventPoster::batch`.
///
/// None of these leave a partial message in the queue.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("expect `data` to not be empty")]
    EmptyPayload,
    #[error("params `{}` are required", .keys.join(", "))]
    MissingRequired { keys: Vec<String> },
    #[error("unexpected params key `{key}`")]
    UnexpectedParam { key: String },
    #[error("expect variable `{key}` to be one type of {}, got {found}", .expected.allowed_kinds().join(", "))]
    TypeMismatch {
        key: String,
        expected: ParamType,
        found: &'static str,
    },
    #[error("expect variable `{key}` to not be null")]
    NullValue { key: String },
    #[error("expect `{key}` to be a strict integer, got a decimal number")]
    NotInteger { key: String },
}

/// Schema resolution failures. Internal to the loader; never returned from `batch`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("event {key} is not defined yet")]
    NotDefined { key: String },
    #[error("failed to fetch event schemas: {0}")]
    Fetch(#[from] TransportError),
}

/// Failure of a single network exchange with the collection or management service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError {
    message: String,
    status: Option<u16>,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn status(&self) -> Option<u16> {
        self.status
    }
}

impl Display for TransportError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for TransportError {}

/// A dequeued slice could not be delivered. The slice is not re-queued.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("failed to dispatch {messages} message(s): {source}")]
pub struct DispatchError {
    pub messages: usize,
    #[source]
    pub source: TransportError,
}

impl DispatchError {
    pub fn status(&self) -> Option<u16> {
        self.source.status()
    }
}

/// Invalid client configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("batch_size must be greater than zero")]
    ZeroBatchSize,
    #[error("send_msg_interval must be greater than zero")]
    ZeroSendInterval,
    #[error("environment variable {name} has invalid value '{value}'")]
    InvalidEnv { name: &'static str, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_required_lists_every_key() {
        let error = ValidationError::MissingRequired {
            keys: vec![String::from("uid"), String::from("plan")],
        };
        assert_eq!(error.to_string(), "params `uid, plan` are required");
    }

    #[test]
    fn type_mismatch_names_allowed_kinds() {
        let error = ValidationError::TypeMismatch {
            key: String::from("retryCount"),
            expected: ParamType::Int,
            found: "string",
        };
        assert_eq!(
            error.to_string(),
            "expect variable `retryCount` to be one type of number, bigint, got string"
        );
    }

    #[test]
    fn dispatch_error_exposes_transport_status() {
        let error = DispatchError {
            messages: 3,
            source: TransportError::new("boom").with_status(503),
        };
        assert_eq!(error.status(), Some(503));
        assert!(error.to_string().starts_with("failed to dispatch 3 message(s)"));
    }
}
