//! Forwarding to the real upstream.
//!
//! The pipeline only sees the [`Upstream`] trait: it hands over a decoded
//! request and gets back the upstream's answer or an [`UpstreamError`].
//! Database engines plug in their own implementation; HTTP is provided by
//! [`HttpUpstream`].

mod http;

use crate::error::UpstreamError;
use crate::exchange::{CapturedRequest, ResponseDescriptor};
use async_trait::async_trait;

pub use self::http::{HttpUpstream, DEFAULT_UPSTREAM_TIMEOUT};

/// A real upstream an endpoint forwards to.
///
/// Implementations never retry; a failure is reported once and recorded.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Forward `request` unchanged and return whatever the upstream answered.
    ///
    /// An upstream that answered at all (any HTTP status, or a database error
    /// result) is `Ok`; `Err` means the upstream could not be reached or the
    /// answer could not be read.
    async fn forward(&self, request: &CapturedRequest) -> Result<ResponseDescriptor, UpstreamError>;

    /// Human-readable target, used in logs and error messages
    fn target(&self) -> &str;
}
