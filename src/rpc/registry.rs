//! Name-to-handler dispatch table for the RPC surface.
//!
//! The registry knows nothing about parameter shapes; handlers deserialize
//! their own input and report `InvalidInput` themselves. Dispatch on an
//! unregistered name is `NoSuchHandler`.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::config::InstanceConfig;
use crate::db::{ConnectRequest, EngineKind, SessionBroker, TransactionQuery};
use crate::error::{BrokerError, BrokerResult};
use crate::rpc::actions::{
    CloseParams, CloseResponse, ConnectParams, ConnectResponse, InstanceInfo, QueryParams,
    TransactionParams,
};

type Handler = Arc<dyn Fn(JsonValue) -> BoxFuture<'static, BrokerResult<JsonValue>> + Send + Sync>;

#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Handler>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler under an action name, replacing any previous one.
    pub fn register<F>(&mut self, action: impl Into<String>, handler: F)
    where
        F: Fn(JsonValue) -> BoxFuture<'static, BrokerResult<JsonValue>> + Send + Sync + 'static,
    {
        self.handlers.insert(action.into(), Arc::new(handler));
    }

    /// Dispatch an action by name.
    pub async fn dispatch(&self, action: &str, parameters: JsonValue) -> BrokerResult<JsonValue> {
        let handler = self
            .handlers
            .get(action)
            .ok_or_else(|| BrokerError::no_such_handler(action))?;
        debug!(action = %action, "Dispatching RPC action");
        handler(parameters).await
    }

    /// Registered action names, for startup logging.
    pub fn action_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

fn parse<T: serde::de::DeserializeOwned>(params: JsonValue) -> BrokerResult<T> {
    serde_json::from_value(params).map_err(|e| BrokerError::invalid_input(e.to_string()))
}

fn to_result<T: serde::Serialize>(value: T) -> BrokerResult<JsonValue> {
    serde_json::to_value(value).map_err(|e| BrokerError::internal(e.to_string()))
}

/// Wire the six broker actions into a registry.
pub fn broker_registry(
    broker: Arc<SessionBroker>,
    instances: Vec<InstanceConfig>,
) -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();

    let catalog: Vec<InstanceInfo> = instances
        .into_iter()
        .map(|i| InstanceInfo {
            identifier: i.identifier,
            engine: i.engine,
            endpoint: i.endpoint,
            port: i.port,
            status: "available".to_string(),
        })
        .collect();
    registry.register("rdsGetInstances", move |_params| {
        let catalog = catalog.clone();
        Box::pin(async move { to_result(catalog) })
    });

    register_connect(&mut registry, "rdsConnectMySql", EngineKind::MySql, &broker);
    register_connect(
        &mut registry,
        "rdsConnectPostgres",
        EngineKind::Postgres,
        &broker,
    );

    let query_broker = Arc::clone(&broker);
    registry.register("rdsExecuteQuery", move |params| {
        let broker = Arc::clone(&query_broker);
        Box::pin(async move {
            let params: QueryParams = parse(params)?;
            let rows = broker
                .query(&params.connection_id, &params.query, &params.values)
                .await?;
            Ok(JsonValue::Array(rows))
        })
    });

    let tx_broker = Arc::clone(&broker);
    registry.register("rdsExecuteTransaction", move |params| {
        let broker = Arc::clone(&tx_broker);
        Box::pin(async move {
            let params: TransactionParams = parse(params)?;
            let queries: Vec<TransactionQuery> = params
                .queries
                .into_iter()
                .map(|q| TransactionQuery {
                    sql: q.sql,
                    values: q.values,
                })
                .collect();
            let results = broker.transaction(&params.connection_id, &queries).await?;
            Ok(JsonValue::Array(
                results.into_iter().map(JsonValue::Array).collect(),
            ))
        })
    });

    let close_broker = Arc::clone(&broker);
    registry.register("rdsCloseConnection", move |params| {
        let broker = Arc::clone(&close_broker);
        Box::pin(async move {
            let params: CloseParams = parse(params)?;
            let was_open = broker.close(&params.connection_id).await;
            to_result(CloseResponse {
                closed: true,
                message: (!was_open)
                    .then(|| format!("Connection {} was already closed", params.connection_id)),
            })
        })
    });

    registry
}

fn register_connect(
    registry: &mut HandlerRegistry,
    action: &str,
    engine: EngineKind,
    broker: &Arc<SessionBroker>,
) {
    let broker = Arc::clone(broker);
    registry.register(action, move |params| {
        let broker = Arc::clone(&broker);
        Box::pin(async move {
            let params: ConnectParams = parse(params)?;
            let outcome = broker
                .connect(
                    engine,
                    ConnectRequest {
                        host: params.host,
                        port: params.port,
                        user: params.user,
                        password: params.password,
                        database: params.database,
                        use_iam: params.use_iam,
                    },
                )
                .await?;
            to_result(ConnectResponse {
                connection_id: outcome.connection_id,
                engine: outcome.engine,
                connected: true,
            })
        })
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_unknown_action() {
        let registry = HandlerRegistry::new();
        let err = registry
            .dispatch("rdsDoesNotExist", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::NoSuchHandler { .. }));
    }

    #[tokio::test]
    async fn test_register_and_dispatch() {
        let mut registry = HandlerRegistry::new();
        registry.register("echo", |params| {
            Box::pin(async move { Ok(json!({ "echo": params })) })
        });
        let result = registry.dispatch("echo", json!(5)).await.unwrap();
        assert_eq!(result, json!({ "echo": 5 }));
    }

    #[tokio::test]
    async fn test_broker_registry_has_all_actions() {
        use crate::iam::StaticTokenProvider;

        let broker = Arc::new(SessionBroker::new(
            Arc::new(StaticTokenProvider::new("t")),
            false,
        ));
        let registry = broker_registry(broker, vec![]);
        assert_eq!(
            registry.action_names(),
            vec![
                "rdsCloseConnection",
                "rdsConnectMySql",
                "rdsConnectPostgres",
                "rdsExecuteQuery",
                "rdsExecuteTransaction",
                "rdsGetInstances",
            ]
        );
    }

    #[tokio::test]
    async fn test_invalid_params_reported_as_invalid_input() {
        use crate::iam::StaticTokenProvider;

        let broker = Arc::new(SessionBroker::new(
            Arc::new(StaticTokenProvider::new("t")),
            false,
        ));
        let registry = broker_registry(broker, vec![]);
        let err = registry
            .dispatch("rdsExecuteQuery", json!({ "query": "SELECT 1" }))
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::InvalidInput { .. }));
    }
}
