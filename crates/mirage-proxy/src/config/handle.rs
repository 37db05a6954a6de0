//! Hot-reloadable settings handle.

use super::{Settings, SettingsPatch};
use crate::error::InvalidSettingsError;
use parking_lot::{Mutex, RwLock};
use std::convert::Infallible;
use std::sync::Arc;
use tracing::info;

/// Shared, atomically swappable settings.
///
/// Readers take an `Arc<Settings>` snapshot and keep it for the whole
/// exchange, so a concurrent update is either fully visible or not at all.
pub struct SettingsHandle {
    current: RwLock<Arc<Settings>>,
    /// Serializes read-modify-write updates
    update_lock: Mutex<()>,
}

impl SettingsHandle {
    pub fn new(settings: Settings) -> Self {
        Self {
            current: RwLock::new(Arc::new(settings)),
            update_lock: Mutex::new(()),
        }
    }

    /// Current settings snapshot
    pub fn snapshot(&self) -> Arc<Settings> {
        Arc::clone(&self.current.read())
    }

    /// Replace the settings wholesale after validating them
    pub fn replace(&self, settings: Settings) -> Result<Arc<Settings>, InvalidSettingsError> {
        settings.validate()?;
        let _guard = self.update_lock.lock();
        let next = Arc::new(settings);
        *self.current.write() = Arc::clone(&next);
        info!("Settings replaced");
        Ok(next)
    }

    /// Apply a partial update. On error the previous settings are retained.
    pub fn update(&self, patch: &SettingsPatch) -> Result<Arc<Settings>, InvalidSettingsError> {
        self.update_with(patch, |_| Ok::<(), Infallible>(()))
            .map_err(|e| match e {
                UpdateError::Invalid(e) => e,
                UpdateError::Commit(never) => match never {},
            })
    }

    /// Apply a partial update, running `commit` on the validated settings before
    /// they are published. If `commit` fails nothing changes.
    pub(crate) fn update_with<E>(
        &self,
        patch: &SettingsPatch,
        commit: impl FnOnce(&Settings) -> Result<(), E>,
    ) -> Result<Arc<Settings>, UpdateError<E>> {
        let _guard = self.update_lock.lock();
        let current = self.snapshot();
        let next = current.apply(patch).map_err(UpdateError::Invalid)?;
        commit(&next).map_err(UpdateError::Commit)?;
        let next = Arc::new(next);
        *self.current.write() = Arc::clone(&next);
        info!(?patch, "Settings updated");
        Ok(next)
    }
}

impl Default for SettingsHandle {
    fn default() -> Self {
        Self::new(Settings::default())
    }
}

/// Failure of [`SettingsHandle::update_with`].
#[derive(Debug)]
pub(crate) enum UpdateError<E> {
    Invalid(InvalidSettingsError),
    Commit(E),
}
