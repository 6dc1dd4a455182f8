//! Server module for building the HTTP API
//!
//! This module provides a `ServerBuilder` that registers, for every
//! configured resource:
//! - a JSON listing and a single-row lookup
//! - a streamed CSV export
//! - the Basic authentication gate in front of them

pub mod builder;
pub mod exposure;
pub mod handlers;
pub mod host;
pub mod middleware;
pub mod router;

pub use builder::ServerBuilder;
pub use exposure::RestExposure;
pub use host::ServerHost;
