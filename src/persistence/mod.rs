//! The `persistence` module provides an optional embedded key/value store.
//!
//! It persists pubsub identities only — the 8-byte big-endian topic id mapped
//! to the topic's subscription token — so that pubsubs created with the
//! persist flag survive a restart. Message bodies are never stored.
//!
//! It uses `sled` as the embedded key-value store.

pub mod sled_store;

pub use sled_store::{Recorder, RecorderError};

#[cfg(test)]
mod tests;
