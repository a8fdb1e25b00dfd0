use crate::core::{CuraError, Result};
use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_URL_PREFIX: &str = "http://";

/// Runtime settings
///
/// Every field has a default, so a JSON file only needs the keys it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CuraConfig {
    /// Issues per changelog page
    pub page_size: usize,

    /// Result counts above this are flagged as large queries
    pub large_query_threshold: usize,

    /// Days a visited page stays in the session history
    pub history_ttl_days: i64,

    /// Seconds between history sweeps
    pub sweep_interval_secs: u64,

    /// Prepended to submitted links that lack a scheme
    pub url_prefix: String,

    /// Values an inbound email stands for before the first audit note
    pub email_project: String,
    pub email_issue_type: String,
    pub email_disposition: String,

    /// File name offered by the changelog export
    pub export_filename: String,
}

impl Default for CuraConfig {
    fn default() -> Self {
        Self {
            page_size: 50,
            large_query_threshold: 200,
            history_ttl_days: 1,
            sweep_interval_secs: 3600,
            url_prefix: DEFAULT_URL_PREFIX.to_string(),
            email_project: "ledsSuite".to_string(),
            email_issue_type: "Incident".to_string(),
            email_disposition: "In Support".to_string(),
            export_filename: "issue_changelog.xls".to_string(),
        }
    }
}

impl CuraConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the changelog page size
    pub fn page_size(mut self, size: usize) -> Self {
        self.page_size = size;
        self
    }

    /// Set the large-query threshold
    pub fn large_query_threshold(mut self, threshold: usize) -> Self {
        self.large_query_threshold = threshold;
        self
    }

    /// Set how long visited pages stay in history
    pub fn history_ttl_days(mut self, days: i64) -> Self {
        self.history_ttl_days = days;
        self
    }

    /// Set the history sweep interval
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval_secs = interval.as_secs();
        self
    }

    pub fn url_prefix(mut self, prefix: &str) -> Self {
        self.url_prefix = prefix.to_string();
        self
    }

    /// Set the project, type and disposition assumed for inbound email
    pub fn email_defaults(mut self, project: &str, issue_type: &str, disposition: &str) -> Self {
        self.email_project = project.to_string();
        self.email_issue_type = issue_type.to_string();
        self.email_disposition = disposition.to_string();
        self
    }

    pub fn export_filename(mut self, filename: &str) -> Self {
        self.export_filename = filename.to_string();
        self
    }

    pub fn sweep_interval_duration(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Fails when the day count is outside what `chrono` can represent.
    pub fn history_ttl(&self) -> Result<TimeDelta> {
        TimeDelta::try_days(self.history_ttl_days).ok_or_else(|| {
            CuraError::MalformedInput(format!(
                "history_ttl_days {} is out of range",
                self.history_ttl_days
            ))
        })
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&json)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(CuraError::MalformedInput("page_size must be > 0".into()));
        }

        if self.history_ttl_days <= 0 {
            return Err(CuraError::MalformedInput(
                "history_ttl_days must be > 0".into(),
            ));
        }
        self.history_ttl()?;

        if self.sweep_interval_secs == 0 {
            return Err(CuraError::MalformedInput(
                "sweep_interval_secs must be > 0".into(),
            ));
        }

        Ok(())
    }
}
