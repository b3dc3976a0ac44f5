//! Wire types for the six RPC actions.
//!
//! Field names follow the camelCase wire contract callers already speak;
//! serde renames keep the Rust side snake_case.

use serde::{Deserialize, Serialize};

use crate::db::{EngineKind, QueryParam};

/// Parameters for `rdsConnectMySql` / `rdsConnectPostgres`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectParams {
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
    pub user: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default, rename = "useIAM")]
    pub use_iam: bool,
}

/// Parameters for `rdsExecuteQuery`. The statement travels under the wire
/// name `query`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryParams {
    pub connection_id: String,
    pub query: String,
    #[serde(default)]
    pub values: Vec<QueryParam>,
}

/// One statement of an `rdsExecuteTransaction` request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionStatement {
    pub sql: String,
    #[serde(default)]
    pub values: Vec<QueryParam>,
}

/// Parameters for `rdsExecuteTransaction`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionParams {
    pub connection_id: String,
    pub queries: Vec<TransactionStatement>,
}

/// Parameters for `rdsCloseConnection`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseParams {
    pub connection_id: String,
}

/// Response for the connect actions.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectResponse {
    pub connection_id: String,
    pub engine: EngineKind,
    pub connected: bool,
}

/// Response for `rdsCloseConnection`. Close always reports `closed: true`;
/// the message explains when the id was already gone.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseResponse {
    pub closed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// One entry of the `rdsGetInstances` catalog.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceInfo {
    pub identifier: String,
    pub engine: EngineKind,
    pub endpoint: String,
    pub port: u16,
    pub status: String,
}
