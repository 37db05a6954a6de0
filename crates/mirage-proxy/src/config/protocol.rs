//! Wire protocols an endpoint can intercept.

use serde::{Deserialize, Serialize};

/// Protocol spoken between the client under test and the upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// HTTP/1.1 API traffic
    #[default]
    Http,
    /// PostgreSQL wire protocol
    Postgres,
    /// MySQL wire protocol
    Mysql,
    /// MongoDB wire protocol
    Mongodb,
    /// Redis RESP
    Redis,
}

impl Protocol {
    /// True for every protocol whose traffic is a query rather than an HTTP request
    pub fn is_database(&self) -> bool {
        !matches!(self, Protocol::Http)
    }

    /// Get protocol name as string
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Postgres => "postgres",
            Protocol::Mysql => "mysql",
            Protocol::Mongodb => "mongodb",
            Protocol::Redis => "redis",
        }
    }

    /// Parse protocol from URL scheme
    pub fn from_scheme(scheme: &str) -> Result<Self, String> {
        match scheme.to_lowercase().as_str() {
            "http" | "https" => Ok(Protocol::Http),
            "postgres" | "postgresql" => Ok(Protocol::Postgres),
            "mysql" | "mariadb" => Ok(Protocol::Mysql),
            "mongodb" | "mongo" => Ok(Protocol::Mongodb),
            "redis" => Ok(Protocol::Redis),
            _ => Err(format!("Unsupported protocol scheme: {scheme}")),
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
