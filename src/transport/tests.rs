use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use http_body_util::BodyExt;
use tokio::time::timeout;
use tower::ServiceExt;

use crate::broker::Broker;
use crate::config::settings::{IdGenSettings, PubSubSettings, StaticPubSubSettings};
use crate::idgen::{self, IdGenerator};
use crate::transport::{build_router, message};

const API_TOKEN: &str = "api-token";
const METRICS_TOKEN: &str = "metrics-token";
const RECV_TIMEOUT: Duration = Duration::from_secs(2);

fn settings() -> PubSubSettings {
    PubSubSettings {
        api_access_token: API_TOKEN.to_string(),
        metrics_access_token: METRICS_TOKEN.to_string(),
        max_duration_for_subscriber_to_receive_ms: 1_000,
        tick_frequency_ms: 15_000,
        static_pubsubs: Vec::new(),
    }
}

fn test_broker(cfg: &PubSubSettings) -> Arc<Broker> {
    let idgen = IdGenerator::new(&IdGenSettings {
        node: 1,
        epoch_time_in_seconds: 1_577_836_800,
        node_bits: 8,
    })
    .unwrap();
    Arc::new(Broker::new(cfg, idgen, None).unwrap())
}

fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}

async fn read_json(response: axum::response::Response) -> serde_json::Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

#[test]
fn test_access_token_extraction() {
    let mut headers = HeaderMap::new();
    assert_eq!(message::access_token(&headers), "");

    headers.insert("authorization", "Bearer secret".parse().unwrap());
    assert_eq!(message::access_token(&headers), "secret");

    headers.insert("authorization", "raw-token".parse().unwrap());
    assert_eq!(message::access_token(&headers), "raw-token");
}

#[test]
fn test_subscribe_token_falls_back_to_query_parameter() {
    let headers = HeaderMap::new();
    let query = message::SubscribeQuery {
        access_token: Some("from-query".to_string()),
    };
    assert_eq!(message::subscribe_token(&headers, &query), "from-query");

    let mut headers = HeaderMap::new();
    headers.insert("authorization", "Bearer from-header".parse().unwrap());
    assert_eq!(message::subscribe_token(&headers, &query), "from-header");
}

#[test]
fn test_pubsub_id_decoding() {
    assert_eq!(message::pubsub_id(&idgen::encode_string_id(42)), 42);
    assert_eq!(message::pubsub_id("not-base62!"), -1);
    assert_eq!(message::pubsub_id("tooshort"), -1);
    assert_eq!(message::pubsub_id(""), -1);
}

#[test]
fn test_create_request_parsing() {
    let headers = HeaderMap::new();
    assert!(message::create_request(&headers, b"").is_none());
    assert!(message::create_request(&headers, b"not json").is_none());

    let request = message::create_request(&headers, b"{}").unwrap();
    assert!(!request.persist);

    let request =
        message::create_request(&headers, br#"{"pubsub": {"persist": true}}"#).unwrap();
    assert!(request.persist);
}

#[test]
fn test_publish_request_keeps_string_messages_raw() {
    let headers = HeaderMap::new();
    let id = idgen::encode_string_id(7);

    let request =
        message::publish_request(&headers, &id, br#"{"event": {"message": "hi"}}"#).unwrap();
    assert_eq!(&request.message[..], b"hi");
    assert_eq!(request.pubsub_id, 7);

    let request = message::publish_request(
        &headers,
        &id,
        br#"{"event": {"message": {"temp": 21}}}"#,
    )
    .unwrap();
    assert_eq!(&request.message[..], br#"{"temp":21}"#);

    assert!(message::publish_request(&headers, &id, b"{}").is_none());
}

#[tokio::test]
async fn test_create_pubsub_endpoint() {
    let app = build_router(test_broker(&settings()));

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/pubsubs")
                .header("authorization", bearer(API_TOKEN))
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let parsed = read_json(response).await;
    let id = parsed["pubsub"]["id"].as_str().unwrap();
    assert!(idgen::valid_string_id(id));
    assert_eq!(parsed["pubsub"]["token"].as_str().unwrap().len(), 64);
}

#[tokio::test]
async fn test_create_pubsub_rejects_bad_token_and_payload() {
    let app = build_router(test_broker(&settings()));

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/pubsubs")
                .header("authorization", bearer("wrong"))
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let parsed = read_json(response).await;
    assert_eq!(parsed["error"]["code"], 401);
    assert_eq!(parsed["error"]["message"], "API access token mismatch");

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/pubsubs")
                .header("authorization", bearer(API_TOKEN))
                .body(Body::from("not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let parsed = read_json(response).await;
    assert_eq!(parsed["error"]["message"], "Invalid request payload");
}

#[tokio::test]
async fn test_unknown_path_returns_json_not_found() {
    let app = build_router(test_broker(&settings()));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/nothing")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let parsed = read_json(response).await;
    assert_eq!(parsed["error"]["code"], 404);
    assert_eq!(parsed["error"]["message"], "Not found");
}

#[tokio::test]
async fn test_delete_static_pubsub_endpoint() {
    let mut cfg = settings();
    cfg.static_pubsubs = vec![StaticPubSubSettings {
        id: 1,
        name: "system".to_string(),
        token: "static-token".to_string(),
    }];
    let app = build_router(test_broker(&cfg));

    let response = app
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/v1/pubsubs/{}", idgen::encode_string_id(1)))
                .header("authorization", bearer(API_TOKEN))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let parsed = read_json(response).await;
    assert_eq!(parsed["error"]["message"], "static pubsubs can't be deleted");
}

#[tokio::test]
async fn test_delete_with_malformed_id_is_noop_success() {
    let app = build_router(test_broker(&settings()));

    // a malformed id decodes to -1, which no topic has; delete of an absent
    // topic succeeds
    let response = app
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/api/v1/pubsubs/bogus")
                .header("authorization", bearer(API_TOKEN))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_publish_with_malformed_id_is_not_found() {
    let app = build_router(test_broker(&settings()));

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/pubsubs/not-a-real-id/events")
                .header("authorization", bearer(API_TOKEN))
                .body(Body::from(r#"{"event": {"message": "x"}}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = build_router(test_broker(&settings()));

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/v1/metrics")
                .header("authorization", bearer(METRICS_TOKEN))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let parsed = read_json(response).await;
    assert_eq!(parsed["metrics"].as_array().unwrap().len(), 7);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/metrics")
                .header("authorization", bearer("wrong"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_preflight_allows_origin() {
    let app = build_router(test_broker(&settings()));

    let response = app
        .oneshot(
            Request::builder()
                .method("OPTIONS")
                .uri("/api/v1/pubsubs/00000000000/events")
                .header("origin", "https://example.com")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["access-control-allow-origin"],
        "https://example.com"
    );
    assert_eq!(response.headers()["access-control-allow-credentials"], "true");
}

#[tokio::test]
async fn test_subscribe_rejects_wrong_token() {
    let broker = test_broker(&settings());
    let app = build_router(broker.clone());
    let created = broker.create(API_TOKEN, false).unwrap();

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!(
                    "/api/v1/pubsubs/{}/events?access_token=wrong",
                    idgen::encode_string_id(created.id)
                ))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_sse_stream_delivers_published_events() {
    let broker = test_broker(&settings());
    let app = build_router(broker.clone());
    let created = broker.create(API_TOKEN, false).unwrap();
    let id = idgen::encode_string_id(created.id);
    let token = String::from_utf8_lossy(&created.token).into_owned();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/v1/pubsubs/{id}/events?access_token={token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "text/event-stream");
    assert_eq!(response.headers()["cache-control"], "no-cache");
    let mut body = response.into_body();

    // the subscription is registered once the response is out; publish now
    let publish = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/api/v1/pubsubs/{id}/events"))
                .header("authorization", bearer(API_TOKEN))
                .body(Body::from(r#"{"event": {"message": "hi"}}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(publish.status(), StatusCode::CREATED);
    let parsed = read_json(publish).await;
    assert!(idgen::valid_string_id(
        parsed["event"]["id"].as_str().unwrap()
    ));

    let frame = timeout(RECV_TIMEOUT, body.frame())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(&frame.into_data().unwrap()[..], b"data: hi\n\n");
}

#[tokio::test]
async fn test_sse_stream_signals_topic_deletion() {
    let broker = test_broker(&settings());
    let app = build_router(broker.clone());
    let created = broker.create(API_TOKEN, false).unwrap();
    let id = idgen::encode_string_id(created.id);
    let token = String::from_utf8_lossy(&created.token).into_owned();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/v1/pubsubs/{id}/events?access_token={token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let mut body = response.into_body();

    let delete = app
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/v1/pubsubs/{id}"))
                .header("authorization", bearer(API_TOKEN))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(delete.status(), StatusCode::NO_CONTENT);

    let frame = timeout(RECV_TIMEOUT, body.frame())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(
        &frame.into_data().unwrap()[..],
        b"data: {\"status\": \"closed\"}\n\n"
    );

    // the stream ends after the closed frame
    let end = timeout(RECV_TIMEOUT, body.frame()).await.unwrap();
    assert!(end.is_none());
}

#[tokio::test]
async fn test_sse_stream_emits_heartbeats() {
    let mut cfg = settings();
    cfg.tick_frequency_ms = 50;
    let broker = test_broker(&cfg);
    let app = build_router(broker.clone());
    let created = broker.create(API_TOKEN, false).unwrap();

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!(
                    "/api/v1/pubsubs/{}/events?access_token={}",
                    idgen::encode_string_id(created.id),
                    String::from_utf8_lossy(&created.token)
                ))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let mut body = response.into_body();

    let frame = timeout(RECV_TIMEOUT, body.frame())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(
        &frame.into_data().unwrap()[..],
        b"data: {\"status\": \"tick\"}\n\n"
    );
}
