//! Supported database engine families.

use serde::{Deserialize, Serialize};

/// Engine family of a brokered connection. Stored alongside every session
/// and matched exhaustively; nothing ever infers the engine from an id
/// string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    MySql,
    Postgres,
}

impl EngineKind {
    /// Default server port for this engine family.
    pub fn default_port(&self) -> u16 {
        match self {
            Self::MySql => 3306,
            Self::Postgres => 5432,
        }
    }

    /// Prefix used in connection ids, kept for log readability.
    pub fn id_prefix(&self) -> &'static str {
        self.as_str()
    }

    /// Wire name of this engine.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MySql => "mysql",
            Self::Postgres => "postgres",
        }
    }

    /// Map a URL scheme to an engine family.
    pub fn from_scheme(scheme: &str) -> Option<Self> {
        match scheme {
            "mysql" => Some(Self::MySql),
            "postgres" | "postgresql" => Some(Self::Postgres),
            _ => None,
        }
    }
}

impl std::fmt::Display for EngineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ports() {
        assert_eq!(EngineKind::MySql.default_port(), 3306);
        assert_eq!(EngineKind::Postgres.default_port(), 5432);
    }

    #[test]
    fn test_from_scheme() {
        assert_eq!(EngineKind::from_scheme("mysql"), Some(EngineKind::MySql));
        assert_eq!(
            EngineKind::from_scheme("postgresql"),
            Some(EngineKind::Postgres)
        );
        assert_eq!(EngineKind::from_scheme("sqlite"), None);
    }

    #[test]
    fn test_wire_serialization() {
        assert_eq!(
            serde_json::to_string(&EngineKind::Postgres).unwrap(),
            "\"postgres\""
        );
        let parsed: EngineKind = serde_json::from_str("\"mysql\"").unwrap();
        assert_eq!(parsed, EngineKind::MySql);
    }
}
