//! The Server-Sent Events connection driver.
//!
//! Every accepted subscription gets one driver task. The driver is the sole
//! consumer of its subscriber channel: it forwards published messages as
//! `data:` frames, writes periodic heartbeat ticks, signals topic deletion
//! with a closed frame, and unsubscribes itself (best-effort) whenever the
//! client goes away or a frame can no longer be delivered. It never tries to
//! resume after a failed frame.

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::Response;
use bytes::{Bytes, BytesMut};
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::{error, info, warn};

use crate::broker::{Broker, Subscription};
use crate::transport::message;
use crate::utils::Error;

const TICK_FRAME: &[u8] = b"data: {\"status\": \"tick\"}\n\n";
const CLOSED_FRAME: &[u8] = b"data: {\"status\": \"closed\"}\n\n";

/// Builds the streaming response for an accepted subscription and spawns its
/// driver task.
pub(crate) fn stream_response(
    broker: Arc<Broker>,
    pubsub_id: i64,
    subscription: Subscription,
    token: Vec<u8>,
    request_headers: &HeaderMap,
) -> Response {
    let origin = request_headers
        .get(header::ORIGIN)
        .cloned()
        .unwrap_or(HeaderValue::from_static("*"));

    let (frames, frames_rx) = mpsc::channel::<Bytes>(1);
    tokio::spawn(drive(broker, pubsub_id, subscription, token, frames));

    let stream = ReceiverStream::new(frames_rx).map(Ok::<_, Infallible>);
    match Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .header(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin)
        .header(header::ACCESS_CONTROL_ALLOW_HEADERS, "cache-control")
        .header(header::ACCESS_CONTROL_ALLOW_CREDENTIALS, "true")
        .body(Body::from_stream(stream))
    {
        Ok(response) => response,
        Err(_) => message::error_response(&Error::new(500, "Couldn't build the event stream")),
    }
}

/// The per-connection select loop. Failing to hand a frame to the client is
/// the flush failure of the underlying connection; the closed frames channel
/// is the client having gone away.
async fn drive(
    broker: Arc<Broker>,
    pubsub_id: i64,
    subscription: Subscription,
    token: Vec<u8>,
    frames: mpsc::Sender<Bytes>,
) {
    info!(
        id = subscription.id,
        tick_ms = subscription.tick_frequency.as_millis() as u64,
        "sse conn opened by user"
    );

    let mut events = subscription.events;
    let mut ticker = interval_at(
        Instant::now() + subscription.tick_frequency,
        subscription.tick_frequency,
    );

    loop {
        tokio::select! {
            _ = frames.closed() => {
                info!(pubsub_id, id = subscription.id, "sse conn closed by user");
                unsubscribe_quietly(&broker, pubsub_id, subscription.id, &token);
                return;
            }
            _ = ticker.tick() => {
                if frames.send(Bytes::from_static(TICK_FRAME)).await.is_err() {
                    warn!(pubsub_id, "failed to flush on tick");
                    unsubscribe_quietly(&broker, pubsub_id, subscription.id, &token);
                    return;
                }
            }
            event = events.recv() => match event {
                None => {
                    // topic deleted; no unsubscribe needed, the topic is gone
                    info!(id = subscription.id, "sse conn closed");
                    let _ = frames.send(Bytes::from_static(CLOSED_FRAME)).await;
                    return;
                }
                Some(payload) => {
                    if frames.send(data_frame(&payload)).await.is_err() {
                        error!(pubsub_id, "failed to flush on event");
                        unsubscribe_quietly(&broker, pubsub_id, subscription.id, &token);
                        return;
                    }
                }
            }
        }
    }
}

fn data_frame(payload: &[u8]) -> Bytes {
    let mut frame = BytesMut::with_capacity(payload.len() + 8);
    frame.extend_from_slice(b"data: ");
    frame.extend_from_slice(payload);
    frame.extend_from_slice(b"\n\n");
    frame.freeze()
}

fn unsubscribe_quietly(broker: &Broker, pubsub_id: i64, subscriber_id: i64, token: &[u8]) {
    if let Err(err) = broker.unsubscribe(pubsub_id, subscriber_id, token) {
        warn!(pubsub_id, id = subscriber_id, error = %err, "failed to unsubscribe from pubsub");
    }
}
