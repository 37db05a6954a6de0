//! Configuration types for Mirage.
//!
//! Process-wide [`Settings`] are loaded from YAML, validated, and published
//! through a [`SettingsHandle`] so that every captured exchange reads one
//! consistent snapshot. Endpoint descriptions live in [`endpoint`].

mod endpoint;
mod handle;
mod protocol;

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::InvalidSettingsError;

pub use endpoint::ProxyEndpoint;
pub use handle::SettingsHandle;
pub(crate) use handle::UpdateError;
pub use protocol::Protocol;

/// Upper bound accepted for `maxRequestHistory`.
pub const MAX_HISTORY_LIMIT: i64 = 1_000_000;

fn default_true() -> bool {
    true
}

fn default_max_request_history() -> usize {
    1000
}

fn default_max_captured_body_bytes() -> usize {
    1024 * 1024
}

/// Process-wide settings, hot-reloadable.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Drop liveness probes (`SELECT 1`, `ping`, ...) before they reach history
    #[serde(default = "default_true")]
    pub filter_health_checks: bool,
    /// Per-endpoint history capacity
    #[serde(default = "default_max_request_history")]
    pub max_request_history: usize,
    /// Create an exact mock from every successful forwarded exchange with no mock
    #[serde(default)]
    pub auto_save_requests_as_mocks: bool,
    /// Overwrite a mock's response as soon as the upstream is seen to disagree
    #[serde(default)]
    pub auto_replace_mocks_on_difference: bool,
    /// When false every exchange is forwarded, even if a mock matches
    #[serde(default = "default_true")]
    pub pattern_matching_enabled: bool,
    /// Whether HTTP mocks compare the query string (sorted) or only the path
    #[serde(default = "default_true")]
    pub match_query_string: bool,
    /// Bodies above this size are recorded as a placeholder
    #[serde(default = "default_max_captured_body_bytes")]
    pub max_captured_body_bytes: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            filter_health_checks: true,
            max_request_history: default_max_request_history(),
            auto_save_requests_as_mocks: false,
            auto_replace_mocks_on_difference: false,
            pattern_matching_enabled: true,
            match_query_string: true,
            max_captured_body_bytes: default_max_captured_body_bytes(),
        }
    }
}

/// Partial settings update. Absent fields keep their current value.
///
/// Numeric limits are signed so that a negative value coming from a UI or a
/// config file is reported as an [`InvalidSettingsError`] instead of a parse
/// failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_health_checks: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_request_history: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_save_requests_as_mocks: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_replace_mocks_on_difference: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern_matching_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_query_string: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_captured_body_bytes: Option<i64>,
}

impl Settings {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let contents = std::fs::read_to_string(path)?;
        let settings: Settings = serde_yaml::from_str(&contents)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), InvalidSettingsError> {
        check_history_limit(self.max_request_history as i64)?;
        check_body_limit(self.max_captured_body_bytes as i64)?;
        Ok(())
    }

    /// Produce the settings that result from applying `patch`.
    /// `self` is left untouched when the patch is rejected.
    pub fn apply(&self, patch: &SettingsPatch) -> Result<Settings, InvalidSettingsError> {
        let mut next = self.clone();
        if let Some(v) = patch.filter_health_checks {
            next.filter_health_checks = v;
        }
        if let Some(limit) = patch.max_request_history {
            check_history_limit(limit)?;
            next.max_request_history = limit as usize;
        }
        if let Some(v) = patch.auto_save_requests_as_mocks {
            next.auto_save_requests_as_mocks = v;
        }
        if let Some(v) = patch.auto_replace_mocks_on_difference {
            next.auto_replace_mocks_on_difference = v;
        }
        if let Some(v) = patch.pattern_matching_enabled {
            next.pattern_matching_enabled = v;
        }
        if let Some(v) = patch.match_query_string {
            next.match_query_string = v;
        }
        if let Some(limit) = patch.max_captured_body_bytes {
            check_body_limit(limit)?;
            next.max_captured_body_bytes = limit as usize;
        }
        Ok(next)
    }
}

fn check_history_limit(value: i64) -> Result<(), InvalidSettingsError> {
    if !(1..=MAX_HISTORY_LIMIT).contains(&value) {
        return Err(InvalidSettingsError::HistoryLimit {
            value,
            max: MAX_HISTORY_LIMIT,
        });
    }
    Ok(())
}

fn check_body_limit(value: i64) -> Result<(), InvalidSettingsError> {
    if value < 1 {
        return Err(InvalidSettingsError::CapturedBodyLimit(value));
    }
    Ok(())
}
