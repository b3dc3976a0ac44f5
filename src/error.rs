//! Error types for the RDS MCP broker.
//!
//! This module defines all error types using `thiserror`. The taxonomy maps
//! one-to-one onto the conditions the RPC envelope reports: every variant is
//! eventually stringified into the `{error}` field at the HTTP boundary.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("Connection {connection_id} not found or closed")]
    ConnectionNotFound { connection_id: String },

    #[error("Connection failed: {message}")]
    Connection { message: String },

    #[error("Auth token generation failed: {message}")]
    Auth { message: String },

    #[error("MCP server failed to start: {message}")]
    SupervisorStart { message: String },

    #[error("Query failed: {message}")]
    Query {
        message: String,
        /// e.g., "42P01" for undefined table
        sql_state: Option<String>,
    },

    #[error("Transaction failed: {message}")]
    Transaction { message: String },

    #[error("No handler registered for action '{action}'")]
    NoSuchHandler { action: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl BrokerError {
    /// Create a connection-not-found error.
    pub fn connection_not_found(connection_id: impl Into<String>) -> Self {
        Self::ConnectionNotFound {
            connection_id: connection_id.into(),
        }
    }

    /// Create a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Create an auth error.
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    /// Create a supervisor start error.
    pub fn supervisor_start(message: impl Into<String>) -> Self {
        Self::SupervisorStart {
            message: message.into(),
        }
    }

    /// Create a query error with optional SQL state.
    pub fn query(message: impl Into<String>, sql_state: Option<String>) -> Self {
        Self::Query {
            message: message.into(),
            sql_state,
        }
    }

    /// Create a transaction error.
    pub fn transaction(message: impl Into<String>) -> Self {
        Self::Transaction {
            message: message.into(),
        }
    }

    /// Create a no-such-handler error.
    pub fn no_such_handler(action: impl Into<String>) -> Self {
        Self::NoSuchHandler {
            action: action.into(),
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Wrap an engine-reported statement failure as a transaction error,
    /// preserving the SQL state in the message when present.
    pub fn into_transaction(self) -> Self {
        match self {
            Self::Query { message, sql_state } => {
                let msg = match sql_state {
                    Some(code) => format!("{} (SQLSTATE: {})", message, code),
                    None => message,
                };
                Self::Transaction { message: msg }
            }
            Self::Transaction { .. } => self,
            other => Self::Transaction {
                message: other.to_string(),
            },
        }
    }
}

/// Convert sqlx errors into the broker taxonomy.
///
/// Engine-reported statement failures become `Query` (callers re-wrap to
/// `Transaction` inside a transaction envelope); everything at or below the
/// wire becomes `Connection`.
impl From<sqlx::Error> for BrokerError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => BrokerError::connection(msg.to_string()),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                BrokerError::query(db_err.message(), code)
            }
            sqlx::Error::Io(io_err) => BrokerError::connection(format!("I/O error: {}", io_err)),
            sqlx::Error::Tls(tls_err) => BrokerError::connection(format!("TLS error: {}", tls_err)),
            sqlx::Error::Protocol(msg) => {
                BrokerError::connection(format!("Protocol error: {}", msg))
            }
            sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut => {
                BrokerError::connection("Connection is closed")
            }
            sqlx::Error::RowNotFound => BrokerError::query("No rows returned", None),
            sqlx::Error::ColumnNotFound(col) => {
                BrokerError::query(format!("Column not found: {}", col), None)
            }
            sqlx::Error::ColumnIndexOutOfBounds { index, len } => BrokerError::internal(format!(
                "Column index {} out of bounds (len: {})",
                index, len
            )),
            sqlx::Error::ColumnDecode { index, source } => {
                BrokerError::internal(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => BrokerError::internal(format!("Decode error: {}", source)),
            sqlx::Error::WorkerCrashed => BrokerError::internal("Database worker crashed"),
            _ => BrokerError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

/// Result type alias for broker operations.
pub type BrokerResult<T> = Result<T, BrokerError>;
