//! History records for captured exchanges.

use super::summary::summarize_body;
use super::types::{CapturedRequest, ResponseDescriptor};
use crate::classifier::Command;
use crate::config::Protocol;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Lifecycle state of an exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeStatus {
    Pending,
    Success,
    Failed,
    Mocked,
}

impl ExchangeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExchangeStatus::Pending => "pending",
            ExchangeStatus::Success => "success",
            ExchangeStatus::Failed => "failed",
            ExchangeStatus::Mocked => "mocked",
        }
    }
}

/// Who sent the traffic
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// Application name announced in the handshake or `user-agent`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
}

impl ClientInfo {
    pub fn from_address(address: impl Into<String>) -> Self {
        Self {
            address: Some(address.into()),
            ..Default::default()
        }
    }
}

/// Response as recorded in history. Bodies are stored as text or as a
/// placeholder describing what was left out.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapturedResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
    pub body: String,
    /// `http`, `json`, `rows`, `error` or `empty`
    pub kind: String,
}

impl CapturedResponse {
    pub fn from_descriptor(response: &ResponseDescriptor, limit: usize) -> Self {
        match response {
            ResponseDescriptor::Http(resp) => Self {
                status_code: Some(resp.status),
                headers: resp.headers.clone(),
                body: summarize_body(&resp.body, resp.header("content-type"), limit),
                kind: "http".to_string(),
            },
            ResponseDescriptor::Database(result) => {
                let rendered = result.to_json().to_string();
                Self {
                    status_code: None,
                    headers: HashMap::new(),
                    body: summarize_body(rendered.as_bytes(), Some("application/json"), limit),
                    kind: result.kind().to_string(),
                }
            }
        }
    }
}

/// One captured request/response pair.
///
/// Created `pending` when the pipeline starts working on a unit of traffic
/// and completed exactly once; completed records are never mutated.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InterceptedExchange {
    pub id: String,
    pub connection_id: u64,
    pub endpoint: u16,
    pub protocol: Protocol,
    pub timestamp: DateTime<Utc>,
    /// Raw request text (`METHOD url` for HTTP)
    pub request: String,
    pub command: Command,
    /// Display verb: the HTTP method or the classified command
    pub verb: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_body: Option<String>,
    pub duration_ms: u64,
    pub status: ExchangeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<CapturedResponse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub client: ClientInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mock_id: Option<String>,
}

impl InterceptedExchange {
    /// Start a pending exchange for `request`
    pub fn pending(
        endpoint: u16,
        protocol: Protocol,
        connection_id: u64,
        request: &CapturedRequest,
        client: ClientInfo,
        body_limit: usize,
    ) -> Self {
        let request_body = match request {
            CapturedRequest::Http(req) if !req.body.is_empty() => Some(summarize_body(
                &req.body,
                req.header("content-type"),
                body_limit,
            )),
            _ => None,
        };

        Self {
            id: uuid::Uuid::new_v4().to_string(),
            connection_id,
            endpoint,
            protocol,
            timestamp: Utc::now(),
            request: request.text(),
            command: request.command(),
            verb: request.verb(),
            request_body,
            duration_ms: 0,
            status: ExchangeStatus::Pending,
            response: None,
            error: None,
            client,
            mock_id: None,
        }
    }

    /// Complete with a response served from a mock
    pub fn into_mocked(mut self, mock_id: &str, response: CapturedResponse, duration_ms: u64) -> Self {
        self.status = ExchangeStatus::Mocked;
        self.mock_id = Some(mock_id.to_string());
        self.response = Some(response);
        self.duration_ms = duration_ms;
        self
    }

    /// Complete with the upstream's answer
    pub fn into_success(mut self, response: CapturedResponse, duration_ms: u64) -> Self {
        self.status = ExchangeStatus::Success;
        self.response = Some(response);
        self.duration_ms = duration_ms;
        self
    }

    /// Complete with an error
    pub fn into_failed(mut self, error: impl Into<String>, duration_ms: u64) -> Self {
        self.status = ExchangeStatus::Failed;
        self.error = Some(error.into());
        self.duration_ms = duration_ms;
        self
    }

    pub fn is_completed(&self) -> bool {
        self.status != ExchangeStatus::Pending
    }
}
