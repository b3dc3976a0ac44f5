use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use rds_mcp_broker::config::Config;
use rds_mcp_broker::db::SessionBroker;
use rds_mcp_broker::iam::{SigV4TokenProvider, SigningCredentials};
use rds_mcp_broker::rpc::{broker_registry, server};

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    if config.json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::parse();
    init_tracing(&config);

    let instances = config.parse_instances()?;
    info!(
        instances = instances.len(),
        region = %config.aws_region,
        "Starting RDS MCP broker"
    );

    let credentials = SigningCredentials {
        access_key_id: config.aws_access_key_id.clone().unwrap_or_default(),
        secret_access_key: config.aws_secret_access_key.clone().unwrap_or_default(),
        session_token: config.aws_session_token.clone(),
    };
    let token_provider = Arc::new(SigV4TokenProvider::new(credentials, &config.aws_region));

    let broker = Arc::new(SessionBroker::new(token_provider, config.rds_ssl));
    let registry = Arc::new(broker_registry(Arc::clone(&broker), instances));
    info!(actions = ?registry.action_names(), "Registered RPC actions");

    server::serve(&config.http_host, config.http_port, registry, broker).await?;
    Ok(())
}
