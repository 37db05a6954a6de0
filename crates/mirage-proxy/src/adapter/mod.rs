//! Protocol adapters: wire bytes in, [`CapturedRequest`] out, and back.
//!
//! Engine-specific database codecs live outside this crate; they implement
//! [`ProtocolAdapter`] and hand decoded units to the capture pipeline.

mod http;
mod text;

pub use self::http::{request_from_hyper, response_to_hyper, HttpAdapter};
pub use self::text::TextQueryAdapter;

use crate::config::Protocol;
use crate::error::DecodeError;
use crate::exchange::{CapturedRequest, ResponseDescriptor};
use bytes::Bytes;

/// Converts between one protocol's wire format and protocol-neutral descriptors.
pub trait ProtocolAdapter: Send + Sync {
    fn protocol(&self) -> Protocol;

    /// Decode one complete unit of client traffic
    fn decode(&self, bytes: &[u8]) -> Result<CapturedRequest, DecodeError>;

    /// Encode a response for the client
    fn encode(&self, response: &ResponseDescriptor) -> Bytes;
}
