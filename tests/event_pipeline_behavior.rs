//! Behavior-driven tests for the event pipeline
//!
//! These tests verify HOW a payload travels from `EventPoster::batch` to the
//! queue: schema-driven coercion, caller input errors and pass-through mode.

use std::sync::Arc;

use gio_core::{
    Client, ClientConfig, EventAttr, EventOptions, EventSchema, MemoryTransport, ParamType,
    ValidationError,
};
use serde_json::{json, Map, Value};

fn data(value: Value) -> Map<String, Value> {
    value.as_object().cloned().expect("object literal")
}

fn login_schema() -> EventSchema {
    EventSchema::new(
        "101",
        "login",
        vec![
            EventAttr::new("uid", ParamType::String),
            EventAttr::new("retryCount", ParamType::Int),
        ],
    )
}

fn client_with(schemas: Vec<EventSchema>) -> (Client, Arc<MemoryTransport>) {
    let transport = Arc::new(MemoryTransport::with_schemas(schemas));
    let client = Client::with_collaborators(
        ClientConfig::new().with_batch_size(100),
        transport.clone(),
        transport.clone(),
    )
    .expect("valid config");
    (client, transport)
}

// =============================================================================
// Schema loaded: coercion and validation
// =============================================================================

#[tokio::test]
async fn when_login_payload_has_string_count_then_it_is_coerced_to_int() {
    // Given: A login schema with a required uid and an Int retryCount
    let (client, _) = client_with(vec![login_schema()]);
    let poster = client.event("login", EventOptions::new().with_required_keys(["uid"]));
    assert!(poster.ready().await, "schema should load");

    // When: The caller batches a numeric string for retryCount
    let message = poster
        .batch(42, &data(json!({"uid": "u1", "retryCount": "3"})), None)
        .expect("conforming payload");

    // Then: The wire payload carries the coerced integer
    assert_eq!(message.var, data(json!({"uid": "u1", "retryCount": 3})));
    assert_eq!(message.n, "login");
    assert_eq!(message.t, "cstm");
    assert_eq!(message.cs1, json!(42));
    assert_eq!(client.queue_len(), 1);
}

#[tokio::test]
async fn when_required_key_is_missing_then_batch_fails_without_enqueueing() {
    // Given: A loaded login poster requiring uid
    let (client, _) = client_with(vec![login_schema()]);
    let poster = client.event("login", EventOptions::new().with_required_keys(["uid"]));
    assert!(poster.ready().await);

    // When: uid is absent
    let result = poster.batch(42, &data(json!({"retryCount": 3})), None);

    // Then: The error names the missing key and the queue is untouched
    assert_eq!(
        result,
        Err(ValidationError::MissingRequired {
            keys: vec![String::from("uid")]
        })
    );
    assert_eq!(client.queue_len(), 0);
}

#[tokio::test]
async fn when_declared_key_is_absent_in_lenient_mode_then_it_is_forwarded_as_null() {
    // Given: A lenient poster
    let (client, _) = client_with(vec![login_schema()]);
    let poster = client.event("login", EventOptions::new().with_strict(false));
    assert!(poster.ready().await);

    // When: Only uid is supplied, plus an undeclared key
    let message = poster
        .batch("u1", &data(json!({"uid": "u1", "source": "web"})), None)
        .expect("lenient payload");

    // Then: Exactly the declared keys are forwarded
    assert_eq!(message.var, data(json!({"uid": "u1", "retryCount": null})));
}

#[tokio::test]
async fn when_declared_key_is_absent_under_default_options_then_it_is_rejected_as_null() {
    // Given: A poster with default (strict) options and no required keys
    let (client, _) = client_with(vec![login_schema()]);
    let poster = client.event("login", EventOptions::new());
    assert!(poster.ready().await);

    // When: retryCount is left out of the payload
    let result = poster.batch("u1", &data(json!({"uid": "u1"})), None);

    // Then: The absent key is treated as null and rejected
    assert_eq!(
        result,
        Err(ValidationError::NullValue {
            key: String::from("retryCount")
        })
    );
    assert_eq!(client.queue_len(), 0);
}

#[tokio::test]
async fn when_strict_payload_has_unknown_key_then_it_is_rejected() {
    // Given: A strict poster (the default)
    let (client, _) = client_with(vec![login_schema()]);
    let poster = client.event("login", EventOptions::new());
    assert!(poster.ready().await);

    // When: The payload carries an undeclared key
    let result = poster.batch(
        "u1",
        &data(json!({"uid": "u1", "retryCount": 1, "source": "web"})),
        None,
    );

    // Then: The key is reported
    assert_eq!(
        result,
        Err(ValidationError::UnexpectedParam {
            key: String::from("source")
        })
    );
    assert_eq!(client.queue_len(), 0);
}

#[tokio::test]
async fn when_strict_payload_has_null_value_then_it_is_rejected() {
    let (client, _) = client_with(vec![login_schema()]);
    let poster = client.event("login", EventOptions::new());
    assert!(poster.ready().await);

    let result = poster.batch("u1", &data(json!({"uid": "u1", "retryCount": null})), None);

    assert_eq!(
        result,
        Err(ValidationError::NullValue {
            key: String::from("retryCount")
        })
    );
}

#[tokio::test]
async fn when_value_cannot_be_coerced_then_type_mismatch_is_reported() {
    // Given: A lenient poster for login
    let (client, _) = client_with(vec![login_schema()]);
    let poster = client.event("login", EventOptions::new().with_strict(false));
    assert!(poster.ready().await);

    // When: retryCount is not numeric at all
    let result = poster.batch("u1", &data(json!({"uid": "u1", "retryCount": "many"})), None);

    // Then: Validation rejects the untouched string
    assert_eq!(
        result,
        Err(ValidationError::TypeMismatch {
            key: String::from("retryCount"),
            expected: ParamType::Int,
            found: "string",
        })
    );
}

#[tokio::test]
async fn when_transform_is_disabled_then_decimal_int_fails_strict_check() {
    // Given: A strict poster that validates raw values
    let (client, _) = client_with(vec![login_schema()]);
    let poster = client.event(
        "login",
        EventOptions::new().with_transform_before_validate(false),
    );
    assert!(poster.ready().await);

    // When: retryCount is a decimal number
    let result = poster.batch("u1", &data(json!({"uid": "u1", "retryCount": 2.5})), None);

    // Then: The strict integer rule fires
    assert_eq!(
        result,
        Err(ValidationError::NotInteger {
            key: String::from("retryCount")
        })
    );
}

#[tokio::test]
async fn when_big_int_is_enabled_then_every_digit_is_kept() {
    // Given: An Int attribute with arbitrary-precision coercion
    let schema = EventSchema::new("5", "order", vec![EventAttr::new("orderId", ParamType::Int)]);
    let (client, _) = client_with(vec![schema]);
    let poster = client.event("order", EventOptions::new().with_big_int(true));
    assert!(poster.ready().await);

    // When: The id does not fit in 64 bits
    let message = poster
        .batch("u1", &data(json!({"orderId": "123456789012345678901234567890"})), None)
        .expect("big integer");

    // Then: The number is forwarded intact
    assert_eq!(message.var["orderId"].to_string(), "123456789012345678901234567890");
}

#[tokio::test]
async fn when_double_attribute_gets_numeric_string_then_it_is_parsed() {
    let schema = EventSchema::new("6", "purchase", vec![EventAttr::new("amount", ParamType::Double)]);
    let (client, _) = client_with(vec![schema]);
    let poster = client.event("purchase", EventOptions::new());
    assert!(poster.ready().await);

    let message = poster
        .batch("u1", &data(json!({"amount": "19.5"})), Some(1_700_000_000_000))
        .expect("numeric amount");

    assert_eq!(message.var["amount"].as_f64(), Some(19.5));
    assert_eq!(message.tm, 1_700_000_000_000);
}

// =============================================================================
// Schema unavailable: degraded pass-through
// =============================================================================

#[tokio::test]
async fn when_management_is_down_after_all_attempts_then_payloads_pass_through() {
    // Given: A management service that never answers and a single attempt budget
    let (client, transport) = client_with(vec![login_schema()]);
    transport.set_management_available(false);
    let poster = client.event("login", EventOptions::new().with_max_init_attempt(1));

    // When: Readiness is awaited
    let ready = poster.ready().await;

    // Then: The poster is permanently degraded
    assert!(!ready);
    let state = poster.state().await;
    assert!(state.initialized);
    assert!(state.degraded);
    assert_eq!(state.load_attempts, 1);

    // And: Payloads are forwarded without validation or coercion
    let payload = data(json!({"uid": 7, "retryCount": "3", "extra": null}));
    let message = poster.batch("u1", &payload, None).expect("pass-through");
    assert_eq!(message.var, payload);

    // And: Recovery of the service does not revive loading
    transport.set_management_available(true);
    assert!(!poster.ready().await);
    assert_eq!(transport.fetch_calls(), 1);
}

#[tokio::test]
async fn when_batching_before_schema_loads_then_payload_is_forwarded_and_load_starts() {
    // Given: A fresh poster with no load attempted yet
    let (client, transport) = client_with(vec![login_schema()]);
    let poster = client.event("login", EventOptions::new());

    // When: The first batch happens immediately
    let message = poster
        .batch("u1", &data(json!({"uid": "u1", "retryCount": "3"})), None)
        .expect("forwarded");

    // Then: It is forwarded as given
    assert_eq!(message.var, data(json!({"uid": "u1", "retryCount": "3"})));

    // And: A background load compiles the schema for later calls
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
    assert_eq!(transport.fetch_calls(), 1);
    assert!(poster.schema().is_some());

    let message = poster
        .batch("u1", &data(json!({"uid": "u1", "retryCount": "4"})), None)
        .expect("validated");
    assert_eq!(message.var["retryCount"], json!(4));
}

#[tokio::test]
async fn when_payload_is_empty_then_it_is_rejected_in_any_mode() {
    let (client, transport) = client_with(Vec::new());
    transport.set_management_available(false);
    let poster = client.event("login", EventOptions::new().with_max_init_attempt(1));
    assert!(!poster.ready().await);

    assert_eq!(
        poster.batch("u1", &Map::new(), None),
        Err(ValidationError::EmptyPayload)
    );
    assert_eq!(client.queue_len(), 0);
}
