//! Per-endpoint mock storage.
//!
//! The mock list is copy-on-write: lookups clone an `Arc` to the current
//! list and never block edits, while edits build a new list under an edit
//! lock, commit it (persistence), and only then publish it.

use super::matcher::{self, CompiledMatcher, MatchCandidate, MatchOptions};
use super::types::{Mock, MockUsage, UsageEntry};
use crate::config::Protocol;
use crate::error::MockConfigError;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

/// A validated mock together with its compiled matcher.
///
/// Usage counters live behind their own lock so that serving a mock never
/// contends with edits; an edit carries the same counters over.
#[derive(Debug)]
pub struct StoredMock {
    mock: Mock,
    matcher: CompiledMatcher,
    usage: Arc<Mutex<MockUsage>>,
}

impl StoredMock {
    /// Validate `mock` and compile its matcher.
    pub fn compile(mock: Mock) -> Result<Self, MockConfigError> {
        let usage = Arc::new(Mutex::new(mock.usage.clone()));
        Self::with_usage(mock, usage)
    }

    /// Compile `mock` sharing an existing usage record
    pub(crate) fn with_usage(
        mock: Mock,
        usage: Arc<Mutex<MockUsage>>,
    ) -> Result<Self, MockConfigError> {
        let matcher = CompiledMatcher::compile(&mock.matcher, mock.protocol)?;
        mock.response.validate(mock.protocol)?;
        Ok(Self {
            mock,
            matcher,
            usage,
        })
    }

    /// Recompile after an edit, keeping the usage counters
    pub fn edited(&self, mock: Mock) -> Result<Self, MockConfigError> {
        Self::with_usage(mock, Arc::clone(&self.usage))
    }

    pub fn id(&self) -> &str {
        &self.mock.id
    }

    pub fn is_enabled(&self) -> bool {
        self.mock.enabled
    }

    pub fn protocol(&self) -> Protocol {
        self.mock.protocol
    }

    /// Definition as last saved. Usage fields may be stale; see [`Self::snapshot`].
    pub fn mock(&self) -> &Mock {
        &self.mock
    }

    pub fn matcher(&self) -> &CompiledMatcher {
        &self.matcher
    }

    /// Definition with current usage counters
    pub fn snapshot(&self) -> Mock {
        let mut mock = self.mock.clone();
        mock.usage = self.usage.lock().clone();
        mock
    }

    pub fn usage(&self) -> MockUsage {
        self.usage.lock().clone()
    }

    pub fn record_usage(&self, entry: UsageEntry) {
        self.usage.lock().record(entry);
    }
}

/// Copy-on-write list of the mocks of one endpoint, in insertion order.
#[derive(Debug, Default)]
pub struct MockStore {
    mocks: RwLock<Arc<Vec<Arc<StoredMock>>>>,
    edit_lock: Mutex<()>,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from already validated entries
    pub fn from_entries(entries: Vec<Arc<StoredMock>>) -> Self {
        Self {
            mocks: RwLock::new(Arc::new(entries)),
            edit_lock: Mutex::new(()),
        }
    }

    /// Current list. Later edits do not affect a snapshot already taken.
    pub fn snapshot(&self) -> Arc<Vec<Arc<StoredMock>>> {
        Arc::clone(&self.mocks.read())
    }

    pub fn len(&self) -> usize {
        self.mocks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.mocks.read().is_empty()
    }

    pub fn get(&self, id: &str) -> Option<Arc<StoredMock>> {
        self.snapshot().iter().find(|m| m.id() == id).cloned()
    }

    /// Best enabled mock for `candidate`, if any
    pub fn find_match(
        &self,
        candidate: &MatchCandidate<'_>,
        options: &MatchOptions,
    ) -> Option<Arc<StoredMock>> {
        matcher::select(&self.snapshot(), candidate, options)
    }

    /// Edit the list.
    ///
    /// `change` works on a private copy; `commit` sees the resulting list and
    /// may veto it (typically by failing to persist it). The new list is
    /// published only if both succeed.
    pub fn edit<R, E>(
        &self,
        change: impl FnOnce(&mut Vec<Arc<StoredMock>>) -> Result<R, E>,
        commit: impl FnOnce(&[Arc<StoredMock>]) -> Result<(), E>,
    ) -> Result<R, E> {
        let _guard = self.edit_lock.lock();
        let mut next: Vec<Arc<StoredMock>> = self.snapshot().as_ref().clone();
        let out = change(&mut next)?;
        commit(&next)?;
        *self.mocks.write() = Arc::new(next);
        Ok(out)
    }

    /// Drop every mock, returning what was removed
    pub fn clear(&self) -> Vec<Arc<StoredMock>> {
        let _guard = self.edit_lock.lock();
        let previous = std::mem::replace(&mut *self.mocks.write(), Arc::new(Vec::new()));
        previous.as_ref().clone()
    }
}
