//! The `transport` module is responsible for handling network communication
//! with clients over HTTP, delivering subscriptions via Server-Sent Events.
//!
//! It defines the JSON request and response shapes of the API, implements the
//! axum router that forwards requests to the broker, and drives the
//! long-lived event stream connections.

pub mod http;
pub mod message;
pub mod sse;

pub use http::build_router;

#[cfg(test)]
mod tests;
