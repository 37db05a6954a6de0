//! Mock storage and matching.
//!
//! # Module Structure
//!
//! - `types` - mock definition, matcher and response types
//! - `matcher` - compiled matchers, URL/query normalization, precedence
//! - `store` - copy-on-write per-endpoint mock list
//! - `generator` - mocks built from forwarded exchanges
//! - `analysis` - duplicate and shadowing lint

mod analysis;
mod generator;
mod matcher;
mod store;
mod types;

#[cfg(test)]
mod tests;

pub use analysis::{analyze_mocks, MockAnalysisResult, MockWarning, WarningType};
pub use generator::{draft_from_exchange, is_auto_savable, response_from_descriptor};
pub use matcher::{
    normalize_query, normalize_url, select, CachedValue, CompiledMatcher, MatchCandidate,
    MatchOptions,
};
pub use store::{MockStore, StoredMock};
pub use types::{
    MatcherKind, Mock, MockDraft, MockMatcher, MockPatch, MockResponse, MockUsage, UsageEntry,
    RECENT_USAGE_LIMIT,
};
