//! REST transport for SwiftACI
//!
//! Connects the object model in `swiftaci-core` to a live controller over
//! HTTPS, and loads connection settings from disk.

pub mod client;
pub mod config;

pub use client::RestTransport;
pub use config::ApicConfig;
