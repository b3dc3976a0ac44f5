//! RPC surface: the action envelope, the dispatch table, the HTTP server,
//! and the harness-facing client facade.

pub mod actions;
pub mod client;
pub mod registry;
pub mod server;

pub use client::RdsClient;
pub use registry::{HandlerRegistry, broker_registry};
