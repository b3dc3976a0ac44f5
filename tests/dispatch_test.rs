//! RPC dispatch and envelope tests. These spin the real axum router on an
//! ephemeral port; no database is needed for any of them.

use std::sync::Arc;

use serde_json::{Value as JsonValue, json};

use rds_mcp_broker::config::InstanceConfig;
use rds_mcp_broker::db::SessionBroker;
use rds_mcp_broker::iam::StaticTokenProvider;
use rds_mcp_broker::rpc::{broker_registry, server};

async fn spawn_server(instances: Vec<InstanceConfig>) -> String {
    let broker = Arc::new(SessionBroker::new(
        Arc::new(StaticTokenProvider::new("unused")),
        false,
    ));
    let registry = Arc::new(broker_registry(Arc::clone(&broker), instances));
    let app = server::router(registry, broker);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

async fn post_execute(base: &str, body: JsonValue) -> JsonValue {
    let response = reqwest::Client::new()
        .post(format!("{}/execute", base))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());
    response.json().await.unwrap()
}

#[tokio::test]
async fn unknown_action_returns_error_field() {
    let base = spawn_server(vec![]).await;
    let body = post_execute(&base, json!({ "action": "rdsDoesNotExist" })).await;

    let error = body["error"].as_str().unwrap();
    assert!(error.contains("rdsDoesNotExist"));
    assert!(body.get("result").is_none());
}

#[tokio::test]
async fn get_instances_serves_configured_catalog() {
    let instances = vec![
        InstanceConfig::parse("orders=mysql://orders.db.example:3306").unwrap(),
        InstanceConfig::parse("audit=postgres://audit.db.example").unwrap(),
    ];
    let base = spawn_server(instances).await;
    let body = post_execute(&base, json!({ "action": "rdsGetInstances" })).await;

    // The result is the catalog array itself, not a wrapper object.
    let listed = body["result"].as_array().unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0]["identifier"], "orders");
    assert_eq!(listed[0]["engine"], "mysql");
    assert_eq!(listed[0]["port"], 3306);
    assert_eq!(listed[1]["engine"], "postgres");
    assert_eq!(listed[1]["port"], 5432);
    assert_eq!(listed[1]["status"], "available");
}

#[tokio::test]
async fn close_unknown_connection_still_reports_closed() {
    let base = spawn_server(vec![]).await;
    let body = post_execute(
        &base,
        json!({
            "action": "rdsCloseConnection",
            "parameters": { "connectionId": "mysql-99-feedfacecafe" }
        }),
    )
    .await;

    assert_eq!(body["result"]["closed"], json!(true));
    let message = body["result"]["message"].as_str().unwrap();
    assert!(message.contains("already closed"));
}

#[tokio::test]
async fn query_on_unknown_connection_is_an_error_string() {
    let base = spawn_server(vec![]).await;
    let body = post_execute(
        &base,
        json!({
            "action": "rdsExecuteQuery",
            "parameters": { "connectionId": "postgres-1-0000deadbeef", "query": "SELECT 1" }
        }),
    )
    .await;

    let error = body["error"].as_str().unwrap();
    assert!(error.contains("postgres-1-0000deadbeef"));
    assert!(error.contains("not found"));
}

#[tokio::test]
async fn malformed_parameters_surface_as_invalid_input() {
    let base = spawn_server(vec![]).await;
    let body = post_execute(
        &base,
        json!({
            "action": "rdsExecuteQuery",
            "parameters": { "query": "SELECT 1" }
        }),
    )
    .await;

    let error = body["error"].as_str().unwrap();
    assert!(error.contains("Invalid input"));
}

#[tokio::test]
async fn health_endpoint_reports_ok() {
    let base = spawn_server(vec![]).await;
    let body: JsonValue = reqwest::get(format!("{}/health", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
}
