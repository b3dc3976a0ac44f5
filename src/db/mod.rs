//! Database layer: engine clients, session brokering, and row normalization.

pub mod broker;
pub mod client;
pub mod engine;
pub mod params;
pub mod registry;
pub mod types;

pub use broker::{ConnectOutcome, ConnectRequest, SessionBroker, TransactionQuery};
pub use client::{ConnectSpec, EngineClient, TlsPolicy};
pub use engine::EngineKind;
pub use params::QueryParam;
pub use registry::ConnectionRegistry;
pub use types::{JsonRow, RowToJson};
