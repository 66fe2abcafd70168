//! The HTTP surface of the broker.
//!
//! All routes live under `/api/v1` and speak JSON, except for the subscribe
//! endpoint which upgrades into a Server-Sent Events stream. Request and
//! response shapes are owned by [`crate::transport::message`]; this module
//! only wires axum handlers to the broker.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::Router;

use crate::broker::Broker;
use crate::transport::message::{self, SubscribeQuery};
use crate::transport::sse;

pub fn build_router(broker: Arc<Broker>) -> Router {
    Router::new()
        .route("/api/v1/pubsubs", post(create_pubsub))
        .route("/api/v1/pubsubs/:id", delete(delete_pubsub))
        .route(
            "/api/v1/pubsubs/:id/events",
            post(publish_event)
                .get(subscribe_events)
                .options(preflight),
        )
        .route("/api/v1/metrics", get(get_metrics))
        .fallback(not_found)
        .with_state(broker)
}

async fn create_pubsub(
    State(broker): State<Arc<Broker>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(request) = message::create_request(&headers, &body) else {
        return message::invalid_payload();
    };

    match broker.create(&request.api_access_token, request.persist) {
        Ok(created) => message::created_response(&created),
        Err(err) => message::error_response(&err),
    }
}

async fn delete_pubsub(
    State(broker): State<Arc<Broker>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    match broker.delete(&message::access_token(&headers), message::pubsub_id(&id)) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => message::error_response(&err),
    }
}

async fn publish_event(
    State(broker): State<Arc<Broker>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(request) = message::publish_request(&headers, &id, &body) else {
        return message::invalid_payload();
    };

    match broker.publish(
        &request.api_access_token,
        request.pubsub_id,
        request.message,
    ) {
        Ok(event_id) => message::published_response(event_id),
        Err(err) => message::error_response(&err),
    }
}

async fn subscribe_events(
    State(broker): State<Arc<Broker>>,
    Path(id): Path<String>,
    Query(query): Query<SubscribeQuery>,
    headers: HeaderMap,
) -> Response {
    let pubsub_id = message::pubsub_id(&id);
    let token = message::subscribe_token(&headers, &query);

    match broker.subscribe(pubsub_id, token.as_bytes()) {
        Ok(subscription) => sse::stream_response(
            broker,
            pubsub_id,
            subscription,
            token.into_bytes(),
            &headers,
        ),
        Err(err) => message::error_response(&err),
    }
}

async fn get_metrics(State(broker): State<Arc<Broker>>, headers: HeaderMap) -> Response {
    match broker.metrics(&message::access_token(&headers)) {
        Ok(metrics) => message::metrics_response(&metrics),
        Err(err) => message::error_response(&err),
    }
}

async fn preflight(headers: HeaderMap) -> Response {
    let origin = headers
        .get(header::ORIGIN)
        .cloned()
        .unwrap_or(HeaderValue::from_static("*"));

    let mut response = StatusCode::OK.into_response();
    let response_headers = response.headers_mut();
    response_headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
    response_headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, PUT, DELETE, OPTIONS"),
    );
    response_headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("*"),
    );
    response_headers.insert(
        header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
        HeaderValue::from_static("true"),
    );
    response_headers.insert(
        header::ACCESS_CONTROL_MAX_AGE,
        HeaderValue::from_static("86400"),
    );
    response
}

async fn not_found() -> Response {
    message::not_found_response()
}
