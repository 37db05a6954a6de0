//! Captured traffic: decoded requests, protocol-neutral responses, and the
//! exchange records kept in history.
//!
//! # Module Structure
//!
//! - `types` - request/response descriptors produced and consumed by adapters
//! - `record` - the immutable [`InterceptedExchange`] kept in history
//! - `summary` - placeholder text for oversized or binary payloads

mod record;
mod summary;
mod types;

pub use record::{CapturedResponse, ClientInfo, ExchangeStatus, InterceptedExchange};
pub use summary::{is_binary_content_type, summarize_body};
pub use types::{CapturedRequest, DbQuery, DbResult, HttpRequest, HttpResponse, ResponseDescriptor};
