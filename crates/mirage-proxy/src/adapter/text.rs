//! Line-oriented query adapter: one UTF-8 query per unit, JSON results.
//!
//! Used by database endpoints whose engine codec already extracted the query
//! text, and by tests.

use super::ProtocolAdapter;
use crate::config::Protocol;
use crate::error::DecodeError;
use crate::exchange::{CapturedRequest, DbQuery, DbResult, ResponseDescriptor};
use bytes::Bytes;

#[derive(Debug, Clone, Copy)]
pub struct TextQueryAdapter {
    protocol: Protocol,
}

impl TextQueryAdapter {
    pub fn new(protocol: Protocol) -> Self {
        Self { protocol }
    }
}

impl ProtocolAdapter for TextQueryAdapter {
    fn protocol(&self) -> Protocol {
        self.protocol
    }

    fn decode(&self, bytes: &[u8]) -> Result<CapturedRequest, DecodeError> {
        let text = std::str::from_utf8(bytes).map_err(|e| DecodeError::Malformed {
            protocol: self.protocol.as_str(),
            reason: format!("query is not valid UTF-8: {e}"),
        })?;
        let text = text.trim_end_matches(['\r', '\n']);
        if text.trim().is_empty() {
            return Err(DecodeError::Malformed {
                protocol: self.protocol.as_str(),
                reason: "empty query".to_string(),
            });
        }
        Ok(CapturedRequest::Query(DbQuery::new(text)))
    }

    fn encode(&self, response: &ResponseDescriptor) -> Bytes {
        let result = match response {
            ResponseDescriptor::Database(result) => result.clone(),
            ResponseDescriptor::Http(resp) => DbResult::Error {
                message: format!("unexpected HTTP response with status {}", resp.status),
                code: None,
            },
        };
        let mut line = serde_json::to_string(&result).unwrap_or_else(|_| "{}".to_string());
        line.push('\n');
        Bytes::from(line)
    }
}
