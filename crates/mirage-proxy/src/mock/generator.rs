//! Mock generation from forwarded exchanges.
//!
//! Used by auto-save (a new exact mock per unmatched request) and by the
//! replace action (overwrite a mock's response with what the upstream sent).

use super::matcher::{normalize_query, normalize_url};
use super::types::{MockDraft, MockMatcher, MockResponse};
use crate::error::MockConfigError;
use crate::exchange::{is_binary_content_type, CapturedRequest, ResponseDescriptor};
use crate::synthesizer::MOCK_HEADER;
use std::collections::HashMap;

/// Response headers never copied into a stored mock
const SKIPPED_HEADERS: &[&str] = &["connection", "transfer-encoding", "content-length", MOCK_HEADER];

/// Convert an upstream response into a mock response.
///
/// HTTP bodies must be UTF-8 text within `limit`; anything else cannot be
/// stored and yields [`MockConfigError::UnstorableBody`].
pub fn response_from_descriptor(
    response: &ResponseDescriptor,
    limit: usize,
) -> Result<MockResponse, MockConfigError> {
    match response {
        ResponseDescriptor::Http(resp) => {
            if resp.body.len() > limit {
                return Err(MockConfigError::UnstorableBody(format!(
                    "{} bytes exceeds the {} byte capture limit",
                    resp.body.len(),
                    limit
                )));
            }
            if let Some(content_type) = resp.header("content-type") {
                if is_binary_content_type(content_type) {
                    return Err(MockConfigError::UnstorableBody(format!(
                        "binary content type {content_type}"
                    )));
                }
            }
            let body = std::str::from_utf8(&resp.body)
                .map_err(|_| MockConfigError::UnstorableBody("body is not valid UTF-8".to_string()))?
                .to_string();

            let headers: HashMap<String, String> = resp
                .headers
                .iter()
                .filter(|(name, _)| !SKIPPED_HEADERS.iter().any(|s| s.eq_ignore_ascii_case(name)))
                .map(|(k, v)| (k.to_ascii_lowercase(), v.clone()))
                .collect();

            Ok(MockResponse::Http {
                status_code: resp.status,
                headers,
                body,
            })
        }
        ResponseDescriptor::Database(result) => Ok(MockResponse::from_db_result(result)),
    }
}

/// Whether a forwarded response qualifies for auto-save: HTTP below 400, or
/// any database result except an error.
pub fn is_auto_savable(response: &ResponseDescriptor) -> bool {
    !response.is_error()
}

/// Build an exact mock draft that replays `response` for `request`.
pub fn draft_from_exchange(
    request: &CapturedRequest,
    response: &ResponseDescriptor,
    limit: usize,
) -> Result<MockDraft, MockConfigError> {
    let mock_response = response_from_descriptor(response, limit)?;
    let matcher = match request {
        CapturedRequest::Http(req) => {
            MockMatcher::exact(normalize_url(&req.url, true)).with_method(req.method.as_str())
        }
        CapturedRequest::Query(query) => MockMatcher::exact(normalize_query(&query.text)),
    };
    if matcher.pattern.is_empty() {
        return Err(MockConfigError::EmptyPattern);
    }
    Ok(MockDraft::new(matcher, mock_response))
}
