//! Broker engine
//!
//! This module contains the in-memory broker implementation responsible for:
//! - managing the topic registry and per-topic subscriber lists
//! - dispatching published messages with a bounded per-subscriber wait
//! - registering static topics and reloading persisted ones at startup
//! - mirroring every metric counter mutation onto the reserved metrics topic
//!
//! Concurrency notes:
//! - The registry is a concurrent map; registry guards are never held while a
//!   topic's subscriber lock is being acquired (the `Arc` is cloned out
//!   first), so registry and topic locks cannot deadlock against each other.
//! - Publishing snapshots the subscriber list under the read lock and hands
//!   the actual sends to a background dispatch task, so `publish` never
//!   blocks the caller on a slow subscriber.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use dashmap::DashMap;
use futures_util::future::join_all;
use rand::rngs::OsRng;
use rand::RngCore;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time;
use tracing::{debug, error, warn};

use crate::broker::metrics::{Counters, Metric};
use crate::broker::topic::{Subscriber, Topic};
use crate::config::settings::{PubSubSettings, StaticPubSubSettings};
use crate::idgen::{IdGenerator, ALPHABET};
use crate::persistence::Recorder;
use crate::utils::Error;

/// The reserved topic onto which every metric mutation is mirrored.
const METRICS_TOPIC_ID: i64 = 0;

/// Length of a generated topic token.
const TOKEN_LEN: usize = 64;

/// The central pub/sub engine: topic lifecycle, subscriber bookkeeping and
/// message fan-out.
#[derive(Debug)]
pub struct Broker {
    api_access_token: String,
    metrics_access_token: String,
    max_subscriber_wait: Duration,
    tick_frequency: Duration,
    idgen: IdGenerator,
    kv: Option<Recorder>,
    pubsubs: DashMap<i64, Arc<Topic>>,
    counters: Counters,
}

/// Result of a successful create: the new topic id and its subscription token.
#[derive(Debug)]
pub struct CreatedPubSub {
    pub id: i64,
    pub token: Vec<u8>,
}

/// Result of a successful subscribe: the subscriber id, the receiving half of
/// its message channel, and the heartbeat frequency the driver should use.
#[derive(Debug)]
pub struct Subscription {
    pub id: i64,
    pub events: mpsc::Receiver<Bytes>,
    pub tick_frequency: Duration,
}

/// A single named counter value, as reported by the metrics operation.
#[derive(Debug)]
pub struct MetricValue {
    pub name: &'static str,
    pub value: i64,
}

impl Broker {
    /// Builds the engine: registers the reserved metrics topic, every
    /// configured static topic, and reloads persisted topics when a recorder
    /// is available.
    pub fn new(
        cfg: &PubSubSettings,
        idgen: IdGenerator,
        kv: Option<Recorder>,
    ) -> Result<Self, Error> {
        let broker = Self {
            api_access_token: cfg.api_access_token.clone(),
            metrics_access_token: cfg.metrics_access_token.clone(),
            max_subscriber_wait: cfg.max_subscriber_wait(),
            tick_frequency: cfg.tick_frequency(),
            idgen,
            kv,
            pubsubs: DashMap::new(),
            counters: Counters::default(),
        };

        broker.register_static_pubsubs(&cfg.static_pubsubs)?;
        broker.register_persistent_pubsubs()?;

        Ok(broker)
    }

    /// Creates a new topic with a generated id and a random 64-character
    /// token, optionally persisting its identity first.
    pub fn create(&self, api_token: &str, persist: bool) -> Result<CreatedPubSub, Error> {
        self.authorize_api(api_token)?;

        let id = self.idgen.next();
        let token = generate_random_token().map_err(|err| {
            Error::new(500, "Couldn't generate random token")
                .with_details(json!({ "err": err.to_string() }))
        })?;

        if persist {
            let Some(kv) = &self.kv else {
                return Err(Error::new(400, "Persistent store is not available"));
            };
            // Storage first, registry second: a crash in between re-registers
            // the topic on restart instead of losing a persisted identity.
            kv.set(&id.to_be_bytes(), &token).map_err(|err| {
                Error::new(500, "Couldn't persist to store")
                    .with_details(json!({ "err": err.to_string() }))
            })?;
        }

        self.pubsubs
            .insert(id, Arc::new(Topic::new(id, token.clone(), false)));

        self.inc(Metric::Topics);
        self.inc(Metric::ActiveTopics);

        Ok(CreatedPubSub { id, token })
    }

    /// Deletes a topic, closing every subscriber channel. Deleting an absent
    /// topic succeeds; deleting a static topic fails.
    pub fn delete(&self, api_token: &str, id: i64) -> Result<(), Error> {
        self.authorize_api(api_token)?;

        let Some(topic) = self.load(id) else {
            return Ok(());
        };

        if topic.is_static {
            return Err(
                Error::new(400, "static pubsubs can't be deleted").with_details(json!({ "id": id }))
            );
        }

        if let Some(kv) = &self.kv {
            kv.delete(&id.to_be_bytes()).map_err(|_| {
                Error::new(500, "Couldn't delete the pubsub from storage")
                    .with_details(json!({ "id": id }))
            })?;
        }

        {
            // The write lock spans both the channel close and the registry
            // removal so a concurrent subscribe cannot land in between.
            let mut subscribers = topic.subscribers.write().unwrap();
            subscribers.clear();
            self.pubsubs.remove(&id);
        }

        self.dec(Metric::ActiveTopics);
        Ok(())
    }

    /// Publishes a message to every current subscriber of a topic. Delivery
    /// happens in a background dispatch task; the call returns as soon as the
    /// subscriber snapshot is taken.
    pub fn publish(&self, api_token: &str, id: i64, message: Bytes) -> Result<i64, Error> {
        self.authorize_api(api_token)?;

        let cnt = self.dispatch(id, message)?;

        self.inc(Metric::MessageReceived);
        self.inc_by(Metric::MessageSent, cnt as i64);

        Ok(self.idgen.next())
    }

    /// Registers a new subscriber on a topic and hands back the receiving
    /// half of its message channel.
    pub fn subscribe(&self, id: i64, token: &[u8]) -> Result<Subscription, Error> {
        let topic = self
            .load(id)
            .ok_or_else(|| Error::new(404, "pubsub not found").with_details(json!({ "id": id })))?;

        if !topic.verify_token(token) {
            return Err(Error::new(401, "token mismatch for the pubsub")
                .with_details(json!({ "token": String::from_utf8_lossy(token) })));
        }

        let (sender, events) = mpsc::channel(1);
        let subscriber = Subscriber {
            id: self.idgen.next(),
            sender,
        };
        let subscriber_id = subscriber.id;
        topic.subscribe(subscriber);

        self.inc(Metric::Subscribers);
        self.inc(Metric::ActiveSubscribers);

        Ok(Subscription {
            id: subscriber_id,
            events,
            tick_frequency: self.tick_frequency,
        })
    }

    /// Removes a subscriber from a topic. The subscriber's channel is left
    /// open; the driver side stops reading on its own.
    pub fn unsubscribe(&self, id: i64, subscriber_id: i64, token: &[u8]) -> Result<(), Error> {
        let topic = self
            .load(id)
            .ok_or_else(|| Error::new(404, "pubsub not found").with_details(json!({ "id": id })))?;

        if !topic.verify_token(token) {
            return Err(Error::new(401, "token mismatch for the pubsub")
                .with_details(json!({ "token": String::from_utf8_lossy(token) })));
        }

        topic.unsubscribe(subscriber_id);
        self.dec(Metric::ActiveSubscribers);
        Ok(())
    }

    /// Returns the current value of every known counter.
    pub fn metrics(&self, metrics_token: &str) -> Result<Vec<MetricValue>, Error> {
        if metrics_token != self.metrics_access_token {
            return Err(Error::new(401, "API access token mismatch")
                .with_details(json!({ "token": metrics_token })));
        }

        Ok(Metric::ALL
            .iter()
            .map(|&k| MetricValue {
                name: k.as_str(),
                value: self.counters.get(k),
            })
            .collect())
    }

    /// Flushes the persistent store, if any.
    pub fn close(&self) {
        if let Some(kv) = &self.kv {
            if let Err(err) = kv.close() {
                error!(error = %err, "failed to close the kv store");
            }
        }
    }

    fn authorize_api(&self, token: &str) -> Result<(), Error> {
        if token != self.api_access_token {
            return Err(Error::new(401, "API access token mismatch")
                .with_details(json!({ "token": token })));
        }
        Ok(())
    }

    fn load(&self, id: i64) -> Option<Arc<Topic>> {
        self.pubsubs.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    /// Snapshots the topic's subscribers and spawns the dispatch task that
    /// delivers `message` to each of them concurrently, waiting at most
    /// `max_subscriber_wait` per subscriber. A subscriber that does not accept
    /// the message in time loses this message but stays subscribed. Returns
    /// the number of attempted deliveries.
    fn dispatch(&self, id: i64, message: Bytes) -> Result<usize, Error> {
        let Some(topic) = self.load(id) else {
            return Err(Error::new(404, "pubsub not found").with_details(json!({ "id": id })));
        };

        let subscribers = topic.snapshot();
        let cnt = subscribers.len();
        if cnt == 0 {
            return Ok(0);
        }

        let wait = self.max_subscriber_wait;
        tokio::spawn(async move {
            let sends = subscribers.into_iter().map(|subscriber| {
                let message = message.clone();
                async move {
                    match time::timeout(wait, subscriber.sender.send(message)).await {
                        Ok(Ok(())) => {}
                        Ok(Err(_)) => {
                            debug!(
                                subscriber = subscriber.id,
                                "subscriber channel closed before delivery"
                            );
                        }
                        Err(_) => {
                            error!(
                                subscriber = subscriber.id,
                                timeout_ms = wait.as_millis() as u64,
                                "failed to send message to subscriber within the given timeout duration"
                            );
                        }
                    }
                }
            });
            join_all(sends).await;
        });

        Ok(cnt)
    }

    fn register_static_pubsubs(&self, statics: &[StaticPubSubSettings]) -> Result<(), Error> {
        // id 0 carries the system metric stream (do not override!)
        self.pubsubs.insert(
            METRICS_TOPIC_ID,
            Arc::new(Topic::new(
                METRICS_TOPIC_ID,
                self.metrics_access_token.clone().into_bytes(),
                true,
            )),
        );

        for ps in statics {
            if ps.id == 0 {
                return Err(Error::new(
                    500,
                    format!("id for static pubsub must be >= 1 (name: {})", ps.name),
                ));
            }
            if ps.token.is_empty() {
                return Err(Error::new(
                    500,
                    format!("token for static pubsub must be >= 1 chars (name: {})", ps.name),
                ));
            }
            self.pubsubs.insert(
                ps.id,
                Arc::new(Topic::new(ps.id, ps.token.clone().into_bytes(), true)),
            );
        }

        let total = statics.len() as i64 + 1;
        self.inc_by(Metric::Topics, total);
        self.inc_by(Metric::ActiveTopics, total);
        self.inc_by(Metric::StaticTopics, total);
        Ok(())
    }

    /// Reloads persisted topics, best-effort: a record that cannot be read or
    /// that collides with an already registered id is logged and skipped.
    fn register_persistent_pubsubs(&self) -> Result<(), Error> {
        let Some(kv) = &self.kv else {
            warn!("persistent storage is not available, skipping loads");
            return Ok(());
        };

        let keys = kv.list_keys().map_err(|err| {
            Error::new(500, "Couldn't list persisted pubsubs")
                .with_details(json!({ "err": err.to_string() }))
        })?;

        let mut cnt = 0i64;
        for key in keys {
            let Ok(raw) = <[u8; 8]>::try_from(key.as_slice()) else {
                error!(len = key.len(), "skipping persisted record with malformed key");
                continue;
            };
            let id = i64::from_be_bytes(raw);
            let token = match kv.get(&key) {
                Ok(token) => token,
                Err(err) => {
                    error!(id, error = %err, "failed to load pubsub from storage; going on with the next one");
                    continue;
                }
            };
            if self.pubsubs.contains_key(&id) {
                warn!(id, "skipping persisted pubsub that collides with a registered one");
                continue;
            }
            self.pubsubs
                .insert(id, Arc::new(Topic::new(id, token, false)));
            cnt += 1;
        }

        self.inc_by(Metric::Topics, cnt);
        self.inc_by(Metric::ActiveTopics, cnt);
        Ok(())
    }

    fn inc(&self, k: Metric) {
        self.mirror(k, 1);
        self.counters.inc(k);
    }

    fn inc_by(&self, k: Metric, val: i64) {
        self.mirror(k, val);
        self.counters.inc_by(k, val);
    }

    fn dec(&self, k: Metric) {
        self.mirror(k, -1);
        self.counters.dec(k);
    }

    /// Mirrors a counter delta onto the reserved metrics topic. Goes through
    /// the internal dispatch primitive, which touches no counters, so the
    /// mirror cannot recurse into itself. Failures are swallowed.
    fn mirror(&self, k: Metric, val: i64) {
        let message = format!(r#"{{"val": {}, "metric": "{}"}}"#, val, k.as_str());
        let _ = self.dispatch(METRICS_TOPIC_ID, Bytes::from(message));
    }
}

// independent functions

/// Generates a topic token: 64 random bytes, read as one big base-62 integer,
/// rendered as its first 64 characters.
fn generate_random_token() -> Result<Vec<u8>, rand::Error> {
    let mut raw = [0u8; TOKEN_LEN];
    OsRng.try_fill_bytes(&mut raw)?;

    let mut token = base62_of_bytes(&raw);
    token.truncate(TOKEN_LEN);
    while token.len() < TOKEN_LEN {
        token.insert(0, ALPHABET[0]);
    }
    Ok(token)
}

/// Renders a big-endian byte string as base-62 digits, most significant
/// first, by repeated division.
fn base62_of_bytes(bytes: &[u8]) -> Vec<u8> {
    let mut num = bytes.to_vec();
    let mut digits = Vec::new();
    while num.iter().any(|&b| b != 0) {
        let mut rem: u32 = 0;
        for b in num.iter_mut() {
            let acc = rem * 256 + u32::from(*b);
            *b = (acc / 62) as u8;
            rem = acc % 62;
        }
        digits.push(ALPHABET[rem as usize]);
    }
    digits.reverse();
    digits
}
