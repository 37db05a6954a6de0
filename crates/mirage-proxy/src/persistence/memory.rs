//! In-memory store, for embedding and tests.

use super::Persistence;
use crate::config::{ProxyEndpoint, Settings};
use crate::error::PersistenceError;
use crate::mock::Mock;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

#[derive(Debug, Default)]
pub struct MemoryStore {
    mocks: Mutex<Vec<Mock>>,
    settings: Mutex<Option<Settings>>,
    endpoints: Mutex<Vec<ProxyEndpoint>>,
    read_only: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// When set, every save fails with `PermissionDenied`
    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::SeqCst);
    }

    /// Number of successful saves so far
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn mocks(&self) -> Vec<Mock> {
        self.mocks.lock().clone()
    }

    fn check_writable(&self) -> Result<(), PersistenceError> {
        if self.read_only.load(Ordering::SeqCst) {
            return Err(PersistenceError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "store is read-only",
            )));
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl Persistence for MemoryStore {
    fn load_mocks(&self) -> Result<Vec<Mock>, PersistenceError> {
        Ok(self.mocks.lock().clone())
    }

    fn save_mocks(&self, mocks: &[Mock]) -> Result<(), PersistenceError> {
        self.check_writable()?;
        *self.mocks.lock() = mocks.to_vec();
        Ok(())
    }

    fn load_settings(&self) -> Result<Option<Settings>, PersistenceError> {
        Ok(self.settings.lock().clone())
    }

    fn save_settings(&self, settings: &Settings) -> Result<(), PersistenceError> {
        self.check_writable()?;
        *self.settings.lock() = Some(settings.clone());
        Ok(())
    }

    fn load_endpoints(&self) -> Result<Vec<ProxyEndpoint>, PersistenceError> {
        Ok(self.endpoints.lock().clone())
    }

    fn save_endpoints(&self, endpoints: &[ProxyEndpoint]) -> Result<(), PersistenceError> {
        self.check_writable()?;
        *self.endpoints.lock() = endpoints.to_vec();
        Ok(())
    }
}
