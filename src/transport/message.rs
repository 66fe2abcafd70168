use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::broker::{CreatedPubSub, MetricValue};
use crate::idgen;
use crate::utils::Error;

const PAYLOAD_INVALID_REQUEST: &str =
    r#"{"error": {"message":"Invalid request payload", "code":400}}"#;
const PAYLOAD_NOT_FOUND: &str = r#"{"error": {"code": 404, "message": "Not found"}}"#;

/// A parsed create request: the caller's bearer token and the persist flag.
#[derive(Debug)]
pub struct CreateRequest {
    pub api_access_token: String,
    pub persist: bool,
}

/// A parsed publish request. The message is kept as opaque bytes from here on.
#[derive(Debug)]
pub struct PublishRequest {
    pub api_access_token: String,
    pub pubsub_id: i64,
    pub message: Bytes,
}

/// Query parameters accepted by the subscribe endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct SubscribeQuery {
    pub access_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct CreateEnvelope {
    #[serde(default)]
    pubsub: CreateBody,
}

#[derive(Debug, Default, Deserialize)]
struct CreateBody {
    #[serde(default)]
    persist: bool,
}

#[derive(Debug, Deserialize)]
struct PublishEnvelope {
    event: PublishBody,
}

#[derive(Debug, Deserialize)]
struct PublishBody {
    message: Value,
}

#[derive(Serialize)]
struct PubSubView {
    id: String,
    token: String,
}

#[derive(Serialize)]
struct PubSubEnvelope {
    pubsub: PubSubView,
}

#[derive(Serialize)]
struct EventView {
    id: String,
}

#[derive(Serialize)]
struct EventEnvelope {
    event: EventView,
}

#[derive(Serialize)]
struct MetricView<'a> {
    name: &'a str,
    value: i64,
}

#[derive(Serialize)]
struct MetricsEnvelope<'a> {
    metrics: Vec<MetricView<'a>>,
}

#[derive(Serialize)]
struct ErrorView<'a> {
    code: u16,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<&'a Value>,
}

#[derive(Serialize)]
struct ErrorEnvelope<'a> {
    error: ErrorView<'a>,
}

/// Extracts the bearer token from the `Authorization` header. A header
/// without the `Bearer ` prefix is used verbatim; a missing header yields an
/// empty token.
pub fn access_token(headers: &HeaderMap) -> String {
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    authorization
        .strip_prefix("Bearer ")
        .unwrap_or(authorization)
        .to_string()
}

/// The subscription token: the bearer token when present, otherwise the
/// `access_token` query parameter (browser `EventSource` clients cannot set
/// headers).
pub fn subscribe_token(headers: &HeaderMap, query: &SubscribeQuery) -> String {
    let token = access_token(headers);
    if token.is_empty() {
        if let Some(query_token) = &query.access_token {
            return query_token.clone();
        }
    }
    token
}

/// Decodes a path segment into a topic id. Segments that are not well-formed
/// 11-character base-62 ids decode to -1, which no topic ever has.
pub fn pubsub_id(raw: &str) -> i64 {
    idgen::decode_string_id(raw)
}

pub fn create_request(headers: &HeaderMap, body: &[u8]) -> Option<CreateRequest> {
    let envelope: CreateEnvelope = serde_json::from_slice(body).ok()?;
    Some(CreateRequest {
        api_access_token: access_token(headers),
        persist: envelope.pubsub.persist,
    })
}

pub fn publish_request(headers: &HeaderMap, raw_id: &str, body: &[u8]) -> Option<PublishRequest> {
    let envelope: PublishEnvelope = serde_json::from_slice(body).ok()?;
    // a JSON string is carried as its raw text; any other value keeps its
    // serialized form
    let message = match envelope.event.message {
        Value::String(s) => Bytes::from(s.into_bytes()),
        other => Bytes::from(serde_json::to_vec(&other).ok()?),
    };
    Some(PublishRequest {
        api_access_token: access_token(headers),
        pubsub_id: pubsub_id(raw_id),
        message,
    })
}

pub fn created_response(created: &CreatedPubSub) -> Response {
    (
        StatusCode::CREATED,
        Json(PubSubEnvelope {
            pubsub: PubSubView {
                id: idgen::encode_string_id(created.id),
                token: String::from_utf8_lossy(&created.token).into_owned(),
            },
        }),
    )
        .into_response()
}

pub fn published_response(event_id: i64) -> Response {
    (
        StatusCode::CREATED,
        Json(EventEnvelope {
            event: EventView {
                id: idgen::encode_string_id(event_id),
            },
        }),
    )
        .into_response()
}

pub fn metrics_response(metrics: &[MetricValue]) -> Response {
    (
        StatusCode::OK,
        Json(MetricsEnvelope {
            metrics: metrics
                .iter()
                .map(|m| MetricView {
                    name: m.name,
                    value: m.value,
                })
                .collect(),
        }),
    )
        .into_response()
}

pub fn error_response(err: &Error) -> Response {
    let status = StatusCode::from_u16(err.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        Json(ErrorEnvelope {
            error: ErrorView {
                code: err.code,
                message: &err.message,
                details: err.details.as_ref(),
            },
        }),
    )
        .into_response()
}

pub fn invalid_payload() -> Response {
    (
        StatusCode::BAD_REQUEST,
        [(header::CONTENT_TYPE, "application/json")],
        PAYLOAD_INVALID_REQUEST,
    )
        .into_response()
}

pub fn not_found_response() -> Response {
    (
        StatusCode::NOT_FOUND,
        [(header::CONTENT_TYPE, "application/json")],
        PAYLOAD_NOT_FOUND,
    )
        .into_response()
}
