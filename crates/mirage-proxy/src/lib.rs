//! Mirage core: the interception pipeline and mock/diff engine of a
//! record/replay proxy for HTTP APIs and databases.
//!
//! A [`Registry`] owns every endpoint's mocks, history and counters. A
//! [`CapturePipeline`] runs each decoded unit of traffic through the health
//! filter, the mock matcher, and either the response synthesizer or the
//! upstream, and reports drift between stored mocks and real responses.

// ===== Core decision path =====
pub mod classifier;
pub mod filter;
pub mod mock;
pub mod pipeline;
pub mod synthesizer;

// ===== Traffic and history =====
pub mod adapter;
pub mod endpoint;
pub mod exchange;
pub mod forward;
pub mod history;

// ===== Drift detection =====
pub mod diff;

// ===== State, configuration and plumbing =====
pub mod config;
pub mod error;
pub mod events;
pub mod metrics;
pub mod persistence;
pub mod registry;

pub use config::{Protocol, ProxyEndpoint, Settings, SettingsPatch};
pub use error::{
    DecodeError, InvalidSettingsError, MockConfigError, PersistenceError, RegistryError,
    UpstreamError,
};
pub use pipeline::{CaptureOutcome, CapturePipeline};
pub use registry::{DriftCheck, Registry, RegistryBuilder};
