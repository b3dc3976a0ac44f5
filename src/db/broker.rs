//! Session broker: the connect/query/transaction/close surface.
//!
//! All state lives inside the broker instance handed to the RPC layer; there
//! are no process-wide connection tables. Connections are keyed by opaque
//! ids from the registry and every operation on one id is serialized by the
//! registry's per-session mutex.

use std::sync::Arc;

use serde_json::Value as JsonValue;
use tracing::{info, warn};

use crate::db::client::{ConnectSpec, EngineClient, TlsPolicy};
use crate::db::engine::EngineKind;
use crate::db::params::QueryParam;
use crate::db::registry::ConnectionRegistry;
use crate::error::{BrokerError, BrokerResult};
use crate::iam::{AuthRequest, TokenProvider};

/// Caller-supplied connection parameters, engine decided by the action name.
#[derive(Debug, Clone)]
pub struct ConnectRequest {
    pub host: String,
    pub port: Option<u16>,
    pub user: String,
    pub password: Option<String>,
    pub database: Option<String>,
    pub use_iam: bool,
}

/// Result of a successful connect.
#[derive(Debug, Clone)]
pub struct ConnectOutcome {
    pub connection_id: String,
    pub engine: EngineKind,
}

/// One statement inside a transaction request.
#[derive(Debug, Clone)]
pub struct TransactionQuery {
    pub sql: String,
    pub values: Vec<QueryParam>,
}

pub struct SessionBroker {
    registry: ConnectionRegistry<EngineClient>,
    token_provider: Arc<dyn TokenProvider>,
    /// Require TLS on non-IAM connections.
    enforce_tls: bool,
}

impl SessionBroker {
    pub fn new(token_provider: Arc<dyn TokenProvider>, enforce_tls: bool) -> Self {
        Self {
            registry: ConnectionRegistry::new(),
            token_provider,
            enforce_tls,
        }
    }

    /// Open a new session and register it. On the IAM path the provider's
    /// token replaces the password and certificate verification is
    /// non-negotiable.
    pub async fn connect(
        &self,
        engine: EngineKind,
        req: ConnectRequest,
    ) -> BrokerResult<ConnectOutcome> {
        let port = req.port.unwrap_or_else(|| engine.default_port());

        let (password, tls) = if req.use_iam {
            let token = self
                .token_provider
                .get_auth_token(&AuthRequest {
                    hostname: req.host.clone(),
                    port,
                    username: req.user.clone(),
                    region: None,
                })
                .await?;
            (token, TlsPolicy::VerifyFull)
        } else {
            let tls = if self.enforce_tls {
                TlsPolicy::Required
            } else {
                TlsPolicy::Preferred
            };
            (req.password.unwrap_or_default(), tls)
        };

        let spec = ConnectSpec {
            engine,
            hostname: req.host.clone(),
            port,
            username: req.user.clone(),
            password,
            database: req.database.clone(),
            tls,
        };

        let client = EngineClient::connect(&spec).await?;
        let connection_id = self.registry.register(engine, client).await;
        info!(
            connection_id = %connection_id,
            engine = %engine,
            host = %req.host,
            iam = req.use_iam,
            "Database connection established"
        );

        Ok(ConnectOutcome {
            connection_id,
            engine,
        })
    }

    /// Execute one statement on an existing session.
    pub async fn query(
        &self,
        connection_id: &str,
        sql: &str,
        values: &[QueryParam],
    ) -> BrokerResult<Vec<JsonValue>> {
        let (_, client) = self.registry.lookup(connection_id).await?;
        let mut client = client.lock().await;
        client.query_json(sql, values).await
    }

    /// Execute a sequence of statements inside one engine-native transaction.
    ///
    /// Results come back 1:1 with the input order. The first failing
    /// statement rolls everything back and nothing partial is returned.
    pub async fn transaction(
        &self,
        connection_id: &str,
        queries: &[TransactionQuery],
    ) -> BrokerResult<Vec<Vec<JsonValue>>> {
        let (_, client) = self.registry.lookup(connection_id).await?;
        let mut client = client.lock().await;

        client.begin().await.map_err(BrokerError::into_transaction)?;

        let mut results = Vec::with_capacity(queries.len());
        for (idx, q) in queries.iter().enumerate() {
            match client.query_json(&q.sql, &q.values).await {
                Ok(rows) => results.push(rows),
                Err(err) => {
                    warn!(
                        connection_id = %connection_id,
                        statement = idx,
                        "Transaction statement failed, rolling back"
                    );
                    if let Err(rb_err) = client.rollback().await {
                        warn!(error = %rb_err, "Rollback failed");
                    }
                    return Err(err.into_transaction());
                }
            }
        }

        client
            .commit()
            .await
            .map_err(BrokerError::into_transaction)?;
        Ok(results)
    }

    /// Close a session. Always succeeds from the caller's perspective:
    /// returns `true` when a live session was torn down, `false` when the id
    /// was already gone.
    pub async fn close(&self, connection_id: &str) -> bool {
        match self.registry.remove(connection_id).await {
            Some(client) => {
                // Last Arc holder: lookups raced before the remove have
                // completed or hold the mutex until they finish.
                let client = Arc::try_unwrap(client);
                match client {
                    Ok(mutex) => {
                        if let Err(err) = mutex.into_inner().close().await {
                            warn!(connection_id = %connection_id, error = %err, "Error closing connection");
                        }
                    }
                    Err(shared) => {
                        // An in-flight operation still holds the handle; the
                        // driver connection drops when it finishes.
                        drop(shared);
                    }
                }
                info!(connection_id = %connection_id, "Connection closed");
                true
            }
            None => false,
        }
    }

    /// Force-close every tracked session, for server shutdown.
    pub async fn close_all(&self) {
        let drained = self.registry.drain().await;
        for (id, client) in drained {
            if let Ok(mutex) = Arc::try_unwrap(client) {
                if let Err(err) = mutex.into_inner().close().await {
                    warn!(connection_id = %id, error = %err, "Error closing connection during shutdown");
                }
            }
        }
    }

    /// Number of live sessions, for logging and tests.
    pub async fn connection_count(&self) -> usize {
        self.registry.len().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iam::StaticTokenProvider;

    fn broker() -> SessionBroker {
        SessionBroker::new(Arc::new(StaticTokenProvider::new("test-token")), false)
    }

    #[tokio::test]
    async fn test_query_unknown_id_fails_before_dispatch() {
        let b = broker();
        let err = b.query("mysql-1-nope", "SELECT 1", &[]).await.unwrap_err();
        assert!(matches!(err, BrokerError::ConnectionNotFound { .. }));
    }

    #[tokio::test]
    async fn test_transaction_unknown_id() {
        let b = broker();
        let err = b
            .transaction(
                "postgres-1-nope",
                &[TransactionQuery {
                    sql: "SELECT 1".to_string(),
                    values: vec![],
                }],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::ConnectionNotFound { .. }));
    }

    #[tokio::test]
    async fn test_close_unknown_id_reports_already_closed() {
        let b = broker();
        assert!(!b.close("mysql-2-nope").await);
        // And again: idempotent.
        assert!(!b.close("mysql-2-nope").await);
    }

    #[tokio::test]
    async fn test_connect_failure_registers_nothing() {
        let b = broker();
        let result = b
            .connect(
                EngineKind::Postgres,
                ConnectRequest {
                    host: "127.0.0.1".to_string(),
                    // Reserved port; nothing listens here.
                    port: Some(1),
                    user: "nobody".to_string(),
                    password: Some("irrelevant".to_string()),
                    database: None,
                    use_iam: false,
                },
            )
            .await;
        assert!(result.is_err());
        assert_eq!(b.connection_count().await, 0);
    }
}
