//! Configuration handling for the RDS MCP broker.
//!
//! This module provides configuration management via CLI arguments and
//! environment variables. The environment names mirror what the test
//! harnesses already export: `MCP_PORT`, `AWS_REGION`, `AWS_ACCESS_KEY_ID`,
//! `AWS_SECRET_ACCESS_KEY`, `AWS_SESSION_TOKEN`, `RDS_SSL`.

use crate::db::EngineKind;
use clap::Parser;
use url::Url;

pub const DEFAULT_HTTP_HOST: &str = "127.0.0.1";
pub const DEFAULT_HTTP_PORT: u16 = 8080;
pub const DEFAULT_AWS_REGION: &str = "us-east-1";

/// Line the server logs once its listener is bound. The process supervisor
/// scans the child's stdout for this marker to detect readiness.
pub const READY_MARKER: &str = "Server is running";

/// RDS MCP broker server configuration.
#[derive(Debug, Clone, Parser)]
#[command(name = "rds-mcp-broker", version, about)]
pub struct Config {
    /// Host to bind the HTTP RPC endpoint to
    #[arg(long, default_value = DEFAULT_HTTP_HOST)]
    pub http_host: String,

    /// Port to bind the HTTP RPC endpoint to
    #[arg(long, env = "MCP_PORT", default_value_t = DEFAULT_HTTP_PORT)]
    pub http_port: u16,

    /// AWS region used for IAM token signing
    #[arg(long, env = "AWS_REGION", default_value = DEFAULT_AWS_REGION)]
    pub aws_region: String,

    /// AWS access key id for IAM token signing
    #[arg(long, env = "AWS_ACCESS_KEY_ID", hide_env_values = true)]
    pub aws_access_key_id: Option<String>,

    /// AWS secret access key for IAM token signing
    #[arg(long, env = "AWS_SECRET_ACCESS_KEY", hide_env_values = true)]
    pub aws_secret_access_key: Option<String>,

    /// AWS session token, when using temporary credentials
    #[arg(long, env = "AWS_SESSION_TOKEN", hide_env_values = true)]
    pub aws_session_token: Option<String>,

    /// Require TLS on non-IAM connections (the IAM path always verifies)
    #[arg(long, env = "RDS_SSL")]
    pub rds_ssl: bool,

    /// Known database instance, repeatable: id=mysql://host:3306 or
    /// id=postgres://host:5432. Served verbatim by rdsGetInstances.
    #[arg(long = "rds-instance", value_name = "ID=ENGINE://HOST:PORT")]
    pub rds_instances: Vec<String>,

    /// Log level filter (overridden by RUST_LOG when set)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    pub json_logs: bool,
}

impl Config {
    /// Parse the configured instance catalog entries.
    pub fn parse_instances(&self) -> Result<Vec<InstanceConfig>, String> {
        self.rds_instances
            .iter()
            .map(|s| InstanceConfig::parse(s))
            .collect()
    }
}

/// One entry of the instance catalog served by `rdsGetInstances`.
#[derive(Debug, Clone)]
pub struct InstanceConfig {
    /// Instance identifier reported to callers.
    pub identifier: String,
    /// Engine family of the instance.
    pub engine: EngineKind,
    /// Endpoint hostname.
    pub endpoint: String,
    /// Endpoint port; the engine default when omitted from the URL.
    pub port: u16,
}

impl InstanceConfig {
    /// Parse an instance entry from a CLI argument.
    ///
    /// # Format
    ///
    /// `id=engine://host[:port]` where engine is `mysql` or `postgres`.
    ///
    /// # Examples
    ///
    /// ```text
    /// orders=mysql://orders.cluster.rds.example:3306
    /// audit=postgres://audit.rds.example
    /// ```
    pub fn parse(s: &str) -> Result<Self, String> {
        // Split id=url (the '=' must come before '://')
        let scheme_pos = s.find("://").unwrap_or(s.len());
        let Some(eq) = s[..scheme_pos].find('=') else {
            return Err(format!(
                "Invalid instance entry '{}': expected id=engine://host[:port]",
                s
            ));
        };
        let identifier = s[..eq].trim();
        if identifier.is_empty() {
            return Err("Instance identifier cannot be empty".to_string());
        }

        let url = Url::parse(&s[eq + 1..]).map_err(|e| format!("Invalid instance URL: {e}"))?;
        let engine = EngineKind::from_scheme(url.scheme()).ok_or_else(|| {
            format!(
                "Unknown engine '{}': expected mysql or postgres",
                url.scheme()
            )
        })?;
        let endpoint = url
            .host_str()
            .ok_or_else(|| "Instance URL has no host".to_string())?
            .to_string();
        let port = url.port().unwrap_or_else(|| engine.default_port());

        Ok(Self {
            identifier: identifier.to_string(),
            engine,
            endpoint,
            port,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_instance_full() {
        let inst = InstanceConfig::parse("orders=mysql://db.example:3307").unwrap();
        assert_eq!(inst.identifier, "orders");
        assert_eq!(inst.engine, EngineKind::MySql);
        assert_eq!(inst.endpoint, "db.example");
        assert_eq!(inst.port, 3307);
    }

    #[test]
    fn test_parse_instance_default_port() {
        let inst = InstanceConfig::parse("audit=postgres://audit.rds.example").unwrap();
        assert_eq!(inst.engine, EngineKind::Postgres);
        assert_eq!(inst.port, 5432);
    }

    #[test]
    fn test_parse_instance_missing_id() {
        assert!(InstanceConfig::parse("mysql://db.example").is_err());
    }

    #[test]
    fn test_parse_instance_unknown_engine() {
        let err = InstanceConfig::parse("x=oracle://db.example").unwrap_err();
        assert!(err.contains("oracle"));
    }

    #[test]
    fn test_parse_instance_empty_id() {
        assert!(InstanceConfig::parse("=mysql://db.example").is_err());
    }

    #[test]
    fn test_config_defaults() {
        let config = Config::parse_from(["rds-mcp-broker"]);
        assert_eq!(config.http_port, DEFAULT_HTTP_PORT);
        assert_eq!(config.http_host, DEFAULT_HTTP_HOST);
        assert!(!config.rds_ssl);
        assert!(config.rds_instances.is_empty());
    }

    #[test]
    fn test_parse_instances_collects_errors() {
        let config = Config::parse_from([
            "rds-mcp-broker",
            "--rds-instance",
            "a=mysql://h1",
            "--rds-instance",
            "bogus",
        ]);
        assert!(config.parse_instances().is_err());
    }
}
