//! The `broker` module is the core of the pub/sub system.
//!
//! It contains the following main components:
//!
//! - `Broker`: The central engine that manages the topic registry, message
//!   fan-out and the optional persistence of topic identities.
//! - `Topic`: Represents a topic that consumers subscribe to.
//! - `Metric` / `Counters`: The fixed set of self-reporting counters; every
//!   mutation is mirrored as an event on the reserved metrics topic (id 0).
//!
//! The broker is responsible for routing published messages to subscribers
//! with a bounded per-subscriber delivery wait.

pub mod engine;
pub mod metrics;
pub mod topic;

pub use engine::{Broker, CreatedPubSub, MetricValue, Subscription};
