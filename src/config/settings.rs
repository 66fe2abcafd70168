use std::time::Duration;

use serde::Deserialize;

/// Top-level configuration settings for the application.
///
/// This struct aggregates all configuration parameters required to run the
/// SsePub server: network settings, identifier generation, the optional
/// key/value store and the pub/sub engine itself.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    /// Configuration for the HTTP server, such as host and port.
    pub server: ServerSettings,
    /// Configuration for the identifier generator.
    pub idgen: IdGenSettings,
    /// Configuration for the embedded key/value store.
    pub kv: KvSettings,
    /// Configuration for the pub/sub engine.
    pub pubsub: PubSubSettings,
}

/// Configuration settings for the HTTP server.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    /// The host address (e.g., "127.0.0.1" or "0.0.0.0") the server will bind to.
    pub host: String,
    /// The port number the server will listen on.
    pub port: u16,
}

/// Configuration settings for the identifier generator.
#[derive(Debug, Deserialize, Clone)]
pub struct IdGenSettings {
    /// The node identifier baked into every generated id. Zero means a random
    /// node is chosen at startup.
    pub node: u16,
    /// The generator epoch as a Unix timestamp in seconds.
    pub epoch_time_in_seconds: i64,
    /// How many of the low id bits carry the node identifier.
    pub node_bits: u8,
}

/// Configuration settings for the embedded key/value store.
#[derive(Debug, Deserialize, Clone)]
pub struct KvSettings {
    /// Whether the store is enabled. When disabled, pubsubs cannot be persisted.
    pub enabled: bool,
    /// Filesystem path of the store.
    pub dsn: String,
}

/// Configuration settings for the pub/sub engine.
#[derive(Debug, Deserialize, Clone)]
pub struct PubSubSettings {
    /// Bearer token authorizing create, delete and publish operations.
    pub api_access_token: String,
    /// Bearer token authorizing the metrics endpoint; also the subscription
    /// token of the reserved metrics pubsub (id 0).
    pub metrics_access_token: String,
    /// Upper bound, in milliseconds, on how long a publish waits for a single
    /// subscriber to accept a message before abandoning it for that message.
    pub max_duration_for_subscriber_to_receive_ms: u64,
    /// Interval, in milliseconds, between heartbeat frames on an event stream.
    pub tick_frequency_ms: u64,
    /// Pubsubs registered at startup that can never be deleted at runtime.
    pub static_pubsubs: Vec<StaticPubSubSettings>,
}

/// A single statically configured pubsub.
#[derive(Debug, Deserialize, Clone)]
pub struct StaticPubSubSettings {
    /// Topic id; must be >= 1 (id 0 is reserved for the metrics pubsub).
    pub id: i64,
    /// Human readable name, used only in startup diagnostics.
    pub name: String,
    /// Subscription token; must be non-empty.
    pub token: String,
}

impl PubSubSettings {
    pub fn max_subscriber_wait(&self) -> Duration {
        Duration::from_millis(self.max_duration_for_subscriber_to_receive_ms)
    }

    pub fn tick_frequency(&self) -> Duration {
        Duration::from_millis(self.tick_frequency_ms)
    }
}

/// Partial configuration settings loaded from files or environment.
///
/// Allows partial specification of settings. Missing values can be filled
/// using defaults.
#[derive(Debug, Deserialize)]
pub struct PartialSettings {
    pub server: Option<PartialServerSettings>,
    pub idgen: Option<PartialIdGenSettings>,
    pub kv: Option<PartialKvSettings>,
    pub pubsub: Option<PartialPubSubSettings>,
}

/// Partial server settings.
#[derive(Debug, Deserialize)]
pub struct PartialServerSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
}

/// Partial identifier generator settings.
#[derive(Debug, Deserialize)]
pub struct PartialIdGenSettings {
    pub node: Option<u16>,
    pub epoch_time_in_seconds: Option<i64>,
    pub node_bits: Option<u8>,
}

/// Partial key/value store settings.
#[derive(Debug, Deserialize)]
pub struct PartialKvSettings {
    pub enabled: Option<bool>,
    pub dsn: Option<String>,
}

/// Partial pub/sub engine settings.
#[derive(Debug, Deserialize)]
pub struct PartialPubSubSettings {
    pub api_access_token: Option<String>,
    pub metrics_access_token: Option<String>,
    pub max_duration_for_subscriber_to_receive_ms: Option<u64>,
    pub tick_frequency_ms: Option<u64>,
    pub static_pubsubs: Option<Vec<StaticPubSubSettings>>,
}

/// Provides default values for `Settings`.
///
/// Ensures the application has sensible defaults if no configuration is provided.
impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            idgen: IdGenSettings {
                node: 0,
                epoch_time_in_seconds: 1_577_836_800,
                node_bits: 8,
            },
            kv: KvSettings {
                enabled: false,
                dsn: "ssepub_db".to_string(),
            },
            pubsub: PubSubSettings {
                api_access_token: String::new(),
                metrics_access_token: String::new(),
                max_duration_for_subscriber_to_receive_ms: 5_000,
                tick_frequency_ms: 15_000,
                static_pubsubs: Vec::new(),
            },
        }
    }
}
