//! Connection/session broker for managed relational databases, exposed over
//! an MCP-style HTTP RPC surface.
//!
//! The crate ships three pieces: the broker server (a handler registry over
//! a session broker, served by axum), a process supervisor that starts and
//! stops the server binary on demand, and a reqwest client facade test
//! harnesses use to talk to it.

pub mod config;
pub mod db;
pub mod error;
pub mod iam;
pub mod rpc;
pub mod supervisor;

pub use config::{Config, InstanceConfig};
pub use db::{EngineKind, SessionBroker};
pub use error::{BrokerError, BrokerResult};
pub use iam::{AuthRequest, SigV4TokenProvider, TokenProvider};
pub use rpc::{HandlerRegistry, RdsClient};
pub use supervisor::ProcessSupervisor;
