//! File-backed store: JSON for mocks and endpoints, YAML for settings.

use super::Persistence;
use crate::config::{ProxyEndpoint, Settings};
use crate::error::PersistenceError;
use crate::mock::Mock;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const MOCKS_FILE: &str = "mocks.json";
const ENDPOINTS_FILE: &str = "endpoints.json";
const SETTINGS_FILE: &str = "settings.yaml";

/// Stores each collection in its own file under one directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open (creating if needed) a store rooted at `dir`
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, PersistenceError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Write to a sibling temp file and rename it over the target, so a
    /// crash never leaves a half-written collection behind.
    fn write_atomic(&self, name: &str, contents: &str) -> Result<(), PersistenceError> {
        let target = self.path(name);
        let tmp = self.path(&format!(".{name}.tmp"));
        fs::write(&tmp, contents)?;
        fs::rename(&tmp, &target)?;
        Ok(())
    }

    fn read_json<T: DeserializeOwned + Default>(&self, name: &str) -> Result<T, PersistenceError> {
        let path = self.path(name);
        if !path.exists() {
            debug!("{:?} does not exist, starting fresh", path);
            return Ok(T::default());
        }
        let json = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

impl Persistence for FileStore {
    fn load_mocks(&self) -> Result<Vec<Mock>, PersistenceError> {
        let mocks: Vec<Mock> = self.read_json(MOCKS_FILE)?;
        info!("Loaded {} mocks from {:?}", mocks.len(), self.dir);
        Ok(mocks)
    }

    fn save_mocks(&self, mocks: &[Mock]) -> Result<(), PersistenceError> {
        let json = serde_json::to_string_pretty(mocks)?;
        self.write_atomic(MOCKS_FILE, &json)?;
        debug!("Saved {} mocks to {:?}", mocks.len(), self.dir);
        Ok(())
    }

    fn load_settings(&self) -> Result<Option<Settings>, PersistenceError> {
        let path = self.path(SETTINGS_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let yaml = fs::read_to_string(&path)?;
        Ok(Some(serde_yaml::from_str(&yaml)?))
    }

    fn save_settings(&self, settings: &Settings) -> Result<(), PersistenceError> {
        let yaml = serde_yaml::to_string(settings)?;
        self.write_atomic(SETTINGS_FILE, &yaml)
    }

    fn load_endpoints(&self) -> Result<Vec<ProxyEndpoint>, PersistenceError> {
        self.read_json(ENDPOINTS_FILE)
    }

    fn save_endpoints(&self, endpoints: &[ProxyEndpoint]) -> Result<(), PersistenceError> {
        let json = serde_json::to_string_pretty(endpoints)?;
        self.write_atomic(ENDPOINTS_FILE, &json)
    }
}
