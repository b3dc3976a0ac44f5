//! Client facade used by test harnesses.
//!
//! `RdsClient` hides the broker's process lifecycle behind the six actions:
//! every remote call first makes sure the server process is up, then posts
//! the `{action, parameters}` envelope and unwraps the response by checking
//! the `error` field before trusting `result`.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::{Value as JsonValue, json};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::{BrokerError, BrokerResult};
use crate::supervisor::ProcessSupervisor;

pub struct RdsClient {
    supervisor: Arc<ProcessSupervisor>,
    http: reqwest::Client,
    base_url: String,
    /// Connection ids opened through this client, so `close()` can tear
    /// them down before stopping the server.
    open_connections: Mutex<HashSet<String>>,
}

impl RdsClient {
    pub fn new(supervisor: Arc<ProcessSupervisor>, base_url: impl Into<String>) -> Self {
        Self {
            supervisor,
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            open_connections: Mutex::new(HashSet::new()),
        }
    }

    /// Send one action through the envelope and unwrap the result.
    pub async fn execute(&self, action: &str, parameters: JsonValue) -> BrokerResult<JsonValue> {
        self.supervisor.ensure_running().await?;

        let url = format!("{}/execute", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&json!({ "action": action, "parameters": parameters }))
            .send()
            .await
            .map_err(|e| BrokerError::internal(format!("RPC request failed: {}", e)))?;

        let body: JsonValue = response
            .json()
            .await
            .map_err(|e| BrokerError::internal(format!("Invalid RPC response: {}", e)))?;

        // The error field wins; result is only trusted in its absence.
        if let Some(message) = body.get("error").and_then(JsonValue::as_str) {
            return Err(BrokerError::internal(message.to_string()));
        }
        body.get("result")
            .cloned()
            .ok_or_else(|| BrokerError::internal("RPC response has neither result nor error"))
    }

    /// List the server's configured instance catalog.
    pub async fn get_instances(&self) -> BrokerResult<JsonValue> {
        self.execute("rdsGetInstances", json!({})).await
    }

    /// Open a MySQL-family connection and track its id.
    pub async fn connect_mysql(&self, parameters: JsonValue) -> BrokerResult<JsonValue> {
        self.connect("rdsConnectMySql", parameters).await
    }

    /// Open a Postgres-family connection and track its id.
    pub async fn connect_postgres(&self, parameters: JsonValue) -> BrokerResult<JsonValue> {
        self.connect("rdsConnectPostgres", parameters).await
    }

    async fn connect(&self, action: &str, parameters: JsonValue) -> BrokerResult<JsonValue> {
        let result = self.execute(action, parameters).await?;
        if let Some(id) = result.get("connectionId").and_then(JsonValue::as_str) {
            self.open_connections.lock().await.insert(id.to_string());
        }
        Ok(result)
    }

    pub async fn execute_query(
        &self,
        connection_id: &str,
        query: &str,
        values: JsonValue,
    ) -> BrokerResult<JsonValue> {
        self.execute(
            "rdsExecuteQuery",
            json!({ "connectionId": connection_id, "query": query, "values": values }),
        )
        .await
    }

    pub async fn execute_transaction(
        &self,
        connection_id: &str,
        queries: JsonValue,
    ) -> BrokerResult<JsonValue> {
        self.execute(
            "rdsExecuteTransaction",
            json!({ "connectionId": connection_id, "queries": queries }),
        )
        .await
    }

    pub async fn close_connection(&self, connection_id: &str) -> BrokerResult<JsonValue> {
        let result = self
            .execute(
                "rdsCloseConnection",
                json!({ "connectionId": connection_id }),
            )
            .await?;
        self.open_connections.lock().await.remove(connection_id);
        Ok(result)
    }

    /// Close every tracked connection, then stop the server process.
    pub async fn close(&self) {
        let ids: Vec<String> = self.open_connections.lock().await.drain().collect();
        for id in ids {
            if let Err(err) = self
                .execute("rdsCloseConnection", json!({ "connectionId": id.clone() }))
                .await
            {
                warn!(connection_id = %id, error = %err, "Failed to close connection during teardown");
            }
        }
        self.supervisor.close().await;
        info!("RDS client closed");
    }
}
