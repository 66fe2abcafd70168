//! The `config` module handles the application's configuration management.
//!
//! It defines the structure of the application settings, provides default
//! values, and implements the logic for loading configuration from various
//! sources, such as configuration files and environment variables.
//!
//! This module uses the `config` crate for flexible and layered configuration.

pub mod settings;

use crate::config::settings::{
    IdGenSettings, KvSettings, PartialSettings, PubSubSettings, ServerSettings,
};
use config::{Config, ConfigError, Environment, File};

pub use settings::Settings;

/// Loads application settings from file, environment, and defaults.
///
/// This function reads configuration values from:
/// 1. An optional `config/default` file (TOML/YAML/JSON).
/// 2. Environment variables with `_` separators (e.g., `SERVER_PORT`).
///
/// Missing fields are filled using default values defined in
/// `Settings::default()`.
///
/// # Errors
///
/// Returns an error if the config file cannot be parsed or deserialized.
pub fn load_config() -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(Environment::default().separator("_"));

    let config = builder.build()?;

    // Try to deserialize what is available
    let partial: PartialSettings = config.try_deserialize()?;

    // Merge with defaults
    let default = Settings::default();

    Ok(Settings {
        server: ServerSettings {
            host: partial
                .server
                .as_ref()
                .and_then(|s| s.host.clone())
                .unwrap_or(default.server.host),
            port: partial
                .server
                .as_ref()
                .and_then(|s| s.port)
                .unwrap_or(default.server.port),
        },
        idgen: IdGenSettings {
            node: partial
                .idgen
                .as_ref()
                .and_then(|i| i.node)
                .unwrap_or(default.idgen.node),
            epoch_time_in_seconds: partial
                .idgen
                .as_ref()
                .and_then(|i| i.epoch_time_in_seconds)
                .unwrap_or(default.idgen.epoch_time_in_seconds),
            node_bits: partial
                .idgen
                .as_ref()
                .and_then(|i| i.node_bits)
                .unwrap_or(default.idgen.node_bits),
        },
        kv: KvSettings {
            enabled: partial
                .kv
                .as_ref()
                .and_then(|k| k.enabled)
                .unwrap_or(default.kv.enabled),
            dsn: partial
                .kv
                .as_ref()
                .and_then(|k| k.dsn.clone())
                .unwrap_or(default.kv.dsn),
        },
        pubsub: PubSubSettings {
            api_access_token: partial
                .pubsub
                .as_ref()
                .and_then(|p| p.api_access_token.clone())
                .unwrap_or(default.pubsub.api_access_token),
            metrics_access_token: partial
                .pubsub
                .as_ref()
                .and_then(|p| p.metrics_access_token.clone())
                .unwrap_or(default.pubsub.metrics_access_token),
            max_duration_for_subscriber_to_receive_ms: partial
                .pubsub
                .as_ref()
                .and_then(|p| p.max_duration_for_subscriber_to_receive_ms)
                .unwrap_or(default.pubsub.max_duration_for_subscriber_to_receive_ms),
            tick_frequency_ms: partial
                .pubsub
                .as_ref()
                .and_then(|p| p.tick_frequency_ms)
                .unwrap_or(default.pubsub.tick_frequency_ms),
            static_pubsubs: partial
                .pubsub
                .and_then(|p| p.static_pubsubs)
                .unwrap_or(default.pubsub.static_pubsubs),
        },
    })
}

#[cfg(test)]
mod tests;
