// src/lib.rs
pub mod config;
pub mod connection;
pub mod emitter;
pub mod filter;
pub mod geometry;
pub mod gesture;
pub mod landmarks;
pub mod payload;
pub mod resolver;
pub mod session;
pub mod source;

use tracing_subscriber::EnvFilter;

/// Installs the fmt subscriber. Level comes from `RUST_LOG`, default `info`.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
