//! Proxy endpoint description.

use super::protocol::Protocol;
use serde::{Deserialize, Serialize};

/// One proxy instance: a local port forwarding to a single upstream target.
///
/// The port doubles as the endpoint id. Runtime counters are not part of
/// this struct; see [`crate::endpoint::EndpointStats`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyEndpoint {
    pub port: u16,
    #[serde(default)]
    pub protocol: Protocol,
    /// Upstream target, e.g. `http://api.internal:8080` or `db.internal:5432`
    pub upstream: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Whether the listener owning this endpoint is accepting traffic
    #[serde(default)]
    pub running: bool,
}

impl ProxyEndpoint {
    pub fn new(port: u16, protocol: Protocol, upstream: impl Into<String>) -> Self {
        Self {
            port,
            protocol,
            upstream: upstream.into(),
            name: None,
            running: false,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Upstream base URL for HTTP endpoints. A bare `host:port` target gets
    /// an `http://` scheme; a trailing slash is dropped.
    pub fn upstream_base_url(&self) -> String {
        let target = self.upstream.trim_end_matches('/');
        if target.contains("://") {
            target.to_string()
        } else {
            format!("http://{target}")
        }
    }

    /// Check the upstream target is usable by this endpoint's protocol.
    ///
    /// A target carrying a scheme must name the same protocol
    /// (`postgresql://` for a postgres endpoint, `https://` for http).
    pub fn validate(&self) -> Result<(), String> {
        let target = self.upstream.trim();
        if target.is_empty() {
            return Err("upstream target must not be empty".to_string());
        }
        if let Some((scheme, rest)) = target.split_once("://") {
            let declared = Protocol::from_scheme(scheme)?;
            if declared != self.protocol {
                return Err(format!(
                    "upstream scheme {scheme} does not match a {} endpoint",
                    self.protocol
                ));
            }
            if rest.trim_matches('/').is_empty() {
                return Err(format!("upstream {target} has no host"));
            }
        }
        Ok(())
    }

    /// Display label used in logs
    pub fn label(&self) -> String {
        match &self.name {
            Some(name) => format!("{name} (:{})", self.port),
            None => format!(":{}", self.port),
        }
    }
}
