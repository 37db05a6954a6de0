//! Persistence of mocks, endpoints and settings.
//!
//! Collections are always written whole. Writes happen only on explicit
//! mutations (including auto-created and auto-replaced mocks), never per
//! captured exchange.

mod file;
mod memory;

use crate::config::{ProxyEndpoint, Settings};
use crate::error::PersistenceError;
use crate::mock::Mock;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Backing store for the registry's durable state
pub trait Persistence: Send + Sync {
    /// All mocks, across endpoints, in insertion order
    fn load_mocks(&self) -> Result<Vec<Mock>, PersistenceError>;
    fn save_mocks(&self, mocks: &[Mock]) -> Result<(), PersistenceError>;

    /// Saved settings, or `None` if nothing was saved yet
    fn load_settings(&self) -> Result<Option<Settings>, PersistenceError>;
    fn save_settings(&self, settings: &Settings) -> Result<(), PersistenceError>;

    fn load_endpoints(&self) -> Result<Vec<ProxyEndpoint>, PersistenceError>;
    fn save_endpoints(&self, endpoints: &[ProxyEndpoint]) -> Result<(), PersistenceError>;
}
