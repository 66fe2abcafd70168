use std::time::Duration;

use super::settings::Settings;

#[test]
fn test_default_settings() {
    let settings = Settings::default();
    assert_eq!(settings.server.host, "127.0.0.1");
    assert_eq!(settings.server.port, 8080);
    assert_eq!(settings.idgen.node, 0);
    assert_eq!(settings.idgen.node_bits, 8);
    assert!(!settings.kv.enabled);
    assert_eq!(settings.kv.dsn, "ssepub_db");
    assert_eq!(
        settings.pubsub.max_duration_for_subscriber_to_receive_ms,
        5_000
    );
    assert_eq!(settings.pubsub.tick_frequency_ms, 15_000);
    assert!(settings.pubsub.static_pubsubs.is_empty());
}

#[test]
fn test_duration_helpers() {
    let settings = Settings::default();
    assert_eq!(
        settings.pubsub.max_subscriber_wait(),
        Duration::from_secs(5)
    );
    assert_eq!(settings.pubsub.tick_frequency(), Duration::from_secs(15));
}
