//! Response synthesis from matched mocks.

use crate::exchange::{ClientInfo, DbResult, HttpResponse, ResponseDescriptor};
use crate::mock::{Mock, MockResponse, StoredMock, UsageEntry};
use chrono::Utc;
use tracing::debug;

/// Header added to every HTTP response served from a mock, carrying its id
pub const MOCK_HEADER: &str = "x-mirage-mock";

/// Build the response a mock describes. Pure.
pub fn build_response(mock: &Mock) -> ResponseDescriptor {
    match &mock.response {
        MockResponse::Http {
            status_code,
            headers,
            body,
        } => {
            let mut response = HttpResponse::new(*status_code).with_body(body.clone());
            for (name, value) in headers {
                response.headers.insert(name.clone(), value.clone());
            }
            response
                .headers
                .insert(MOCK_HEADER.to_string(), mock.id.clone());
            ResponseDescriptor::Http(response)
        }
        MockResponse::Json { data } => ResponseDescriptor::Database(DbResult::Json { data: data.clone() }),
        MockResponse::Rows { columns, rows } => ResponseDescriptor::Database(DbResult::Rows {
            columns: columns.clone(),
            rows: rows.clone(),
        }),
        MockResponse::Error { message, code } => ResponseDescriptor::Database(DbResult::Error {
            message: message.clone(),
            code: code.clone(),
        }),
        MockResponse::Empty { affected_rows } => ResponseDescriptor::Database(DbResult::Empty {
            affected_rows: *affected_rows,
        }),
    }
}

/// Serve `stored` for a request and record the usage.
pub fn serve(
    stored: &StoredMock,
    request_text: &str,
    client: &ClientInfo,
    duration_ms: u64,
) -> ResponseDescriptor {
    let response = build_response(stored.mock());
    stored.record_usage(UsageEntry {
        timestamp: Utc::now(),
        duration_ms,
        query: request_text.to_string(),
        client: client.clone(),
    });
    debug!(mock_id = stored.id(), kind = response.kind(), "Served mock response");
    response
}
