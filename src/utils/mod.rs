//! The `utils` module provides common definitions used across the `ssepub`
//! application.
//!
//! This module centralizes reusable components, such as the shared error type,
//! to promote code consistency and reduce duplication.

pub mod error;

pub use error::Error;
