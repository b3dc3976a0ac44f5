//! Single-connection engine clients.
//!
//! Each brokered session owns exactly one driver connection. Pooling is
//! deliberately absent: callers are test harnesses that open a connection,
//! run a handful of statements, and close it, and the session lifetime must
//! match the database session lifetime exactly (temporary tables, session
//! variables, open transactions).

use serde_json::Value as JsonValue;
use sqlx::Connection;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlSslMode};
use sqlx::postgres::{PgConnectOptions, PgConnection, PgSslMode};

use crate::db::engine::EngineKind;
use crate::db::params::{QueryParam, bind_mysql_param, bind_postgres_param};
use crate::db::types::{JsonRow, RowToJson};
use crate::error::{BrokerError, BrokerResult};

/// How strictly to negotiate TLS with the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsPolicy {
    /// Use TLS when offered, fall back to plaintext otherwise.
    Preferred,
    /// Require TLS but do not verify the server certificate.
    Required,
    /// Require TLS and verify the server certificate and hostname.
    /// Mandatory whenever the password is an IAM auth token.
    VerifyFull,
}

/// Connection target for a brokered session.
#[derive(Clone)]
pub struct ConnectSpec {
    pub engine: EngineKind,
    pub hostname: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: Option<String>,
    pub tls: TlsPolicy,
}

/// One live database session, dispatched on the engine recorded at connect
/// time rather than on anything derived from the connection id.
pub enum EngineClient {
    MySql(MySqlConnection),
    Postgres(PgConnection),
}

impl EngineClient {
    /// Open a new session against the given target.
    pub async fn connect(spec: &ConnectSpec) -> BrokerResult<Self> {
        match spec.engine {
            EngineKind::MySql => {
                let ssl_mode = match spec.tls {
                    TlsPolicy::Preferred => MySqlSslMode::Preferred,
                    TlsPolicy::Required => MySqlSslMode::Required,
                    TlsPolicy::VerifyFull => MySqlSslMode::VerifyIdentity,
                };
                let mut options = MySqlConnectOptions::new()
                    .host(&spec.hostname)
                    .port(spec.port)
                    .username(&spec.username)
                    .password(&spec.password)
                    .ssl_mode(ssl_mode);
                if let Some(db) = &spec.database {
                    options = options.database(db);
                }
                let conn = MySqlConnection::connect_with(&options).await?;
                Ok(Self::MySql(conn))
            }
            EngineKind::Postgres => {
                let ssl_mode = match spec.tls {
                    TlsPolicy::Preferred => PgSslMode::Prefer,
                    TlsPolicy::Required => PgSslMode::Require,
                    TlsPolicy::VerifyFull => PgSslMode::VerifyFull,
                };
                let mut options = PgConnectOptions::new()
                    .host(&spec.hostname)
                    .port(spec.port)
                    .username(&spec.username)
                    .password(&spec.password)
                    .ssl_mode(ssl_mode);
                if let Some(db) = &spec.database {
                    options = options.database(db);
                }
                let conn = PgConnection::connect_with(&options).await?;
                Ok(Self::Postgres(conn))
            }
        }
    }

    /// Engine family this session was opened against.
    pub fn engine(&self) -> EngineKind {
        match self {
            Self::MySql(_) => EngineKind::MySql,
            Self::Postgres(_) => EngineKind::Postgres,
        }
    }

    /// Execute one statement with positional bind values and return the
    /// normalized rows. Statements that return no rows yield an empty vec.
    pub async fn query(
        &mut self,
        sql: &str,
        params: &[QueryParam],
    ) -> BrokerResult<Vec<JsonRow>> {
        match self {
            Self::MySql(conn) => {
                let mut query = sqlx::query(sql);
                for param in params {
                    query = bind_mysql_param(query, param);
                }
                let rows = query.fetch_all(conn).await?;
                Ok(rows.iter().map(|r| r.to_json_map()).collect())
            }
            Self::Postgres(conn) => {
                let mut query = sqlx::query(sql);
                for param in params {
                    query = bind_postgres_param(query, param);
                }
                let rows = query.fetch_all(conn).await?;
                Ok(rows.iter().map(|r| r.to_json_map()).collect())
            }
        }
    }

    /// Execute one statement and return the rows as JSON values, the shape
    /// the RPC envelope carries.
    pub async fn query_json(
        &mut self,
        sql: &str,
        params: &[QueryParam],
    ) -> BrokerResult<Vec<JsonValue>> {
        let rows = self.query(sql, params).await?;
        Ok(rows.into_iter().map(JsonValue::Object).collect())
    }

    /// Begin an explicit transaction using the engine's native statement.
    pub async fn begin(&mut self) -> BrokerResult<()> {
        let stmt = match self.engine() {
            EngineKind::MySql => "START TRANSACTION",
            EngineKind::Postgres => "BEGIN",
        };
        self.execute_raw(stmt).await
    }

    /// Commit the open transaction.
    pub async fn commit(&mut self) -> BrokerResult<()> {
        self.execute_raw("COMMIT").await
    }

    /// Roll back the open transaction.
    pub async fn rollback(&mut self) -> BrokerResult<()> {
        self.execute_raw("ROLLBACK").await
    }

    // Transaction control must go over the text protocol: MySQL refuses to
    // prepare START TRANSACTION / COMMIT / ROLLBACK (ER_UNSUPPORTED_PS).
    async fn execute_raw(&mut self, sql: &str) -> BrokerResult<()> {
        // Dispatched through `Executor::execute` (which returns an
        // already-boxed future) to work around rust-lang/rust#102211:
        // `RawSql::execute` is an async fn whose generator keeps the compiler
        // from proving callers' nested futures are Send.
        use sqlx::Executor as _;
        match self {
            Self::MySql(conn) => {
                (&mut *conn).execute(sqlx::raw_sql(sql)).await?;
            }
            Self::Postgres(conn) => {
                (&mut *conn).execute(sqlx::raw_sql(sql)).await?;
            }
        }
        Ok(())
    }

    /// Close the session gracefully. Errors during teardown are reported but
    /// the driver connection is consumed either way.
    pub async fn close(self) -> BrokerResult<()> {
        let result = match self {
            Self::MySql(conn) => conn.close().await,
            Self::Postgres(conn) => conn.close().await,
        };
        result.map_err(BrokerError::from)
    }
}

// Manual Debug so the password (which may be an IAM auth token) never
// reaches log output.
impl std::fmt::Debug for ConnectSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectSpec")
            .field("engine", &self.engine)
            .field("hostname", &self.hostname)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .field("tls", &self.tls)
            .finish()
    }
}

impl std::fmt::Debug for EngineClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineClient")
            .field("engine", &self.engine())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_spec_debug_shape() {
        let spec = ConnectSpec {
            engine: EngineKind::Postgres,
            hostname: "db.example".to_string(),
            port: 5432,
            username: "app".to_string(),
            password: "secret".to_string(),
            database: Some("app".to_string()),
            tls: TlsPolicy::VerifyFull,
        };
        assert_eq!(spec.engine, EngineKind::Postgres);
        assert_eq!(spec.tls, TlsPolicy::VerifyFull);
        let rendered = format!("{:?}", spec);
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("<redacted>"));
    }

    // Live query/transaction behavior is covered by the env-gated
    // integration tests in tests/broker_test.rs.
}
