use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;

/// Event type tag for custom events.
pub const CSTM: &str = "cstm";

/// One event as transmitted to the collection service.
///
/// Field names are the wire contract and must not change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireMessage {
    /// Subject (user) identifier.
    pub cs1: Value,
    /// Epoch milliseconds.
    pub tm: i64,
    /// Event key.
    pub n: String,
    /// Validated parameter map.
    pub var: Map<String, Value>,
    /// Event type tag.
    pub t: String,
}

impl WireMessage {
    pub fn new(
        event_key: impl Into<String>,
        event_type: Option<&str>,
        uid: Value,
        payload: Map<String, Value>,
        tm: Option<i64>,
    ) -> Self {
        Self {
            cs1: uid,
            tm: tm.unwrap_or_else(now_millis),
            n: event_key.into(),
            var: payload,
            t: event_type.unwrap_or(CSTM).to_owned(),
        }
    }

    pub fn event_key(&self) -> &str {
        &self.n
    }
}

pub fn now_millis() -> i64 {
    let nanos = OffsetDateTime::now_utc().unix_timestamp_nanos();
    i64::try_from(nanos / 1_000_000).unwrap_or(i64::MAX)
}
