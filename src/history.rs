//! Per-session navigation history.
//!
//! Every page a session visits remembers the page it was reached from and
//! the form data last posted from it, so a "back" link can restore both.
//! Entries expire a fixed number of days after they were last touched and
//! are removed by a periodic sweep.

use crate::best_effort::{ErrorLogSink, non_fatal_logged};
use crate::core::{CuraError, Result};
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, oneshot};
use tokio::task::JoinHandle;
use tracing::{Level, event};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageEntry {
    /// Page this one was reached from; empty when unknown
    pub referrer: String,
    /// Form data last submitted from this page
    pub post_data: BTreeMap<String, String>,
    pub expires: NaiveDate,
}

impl PageEntry {
    fn new(expires: NaiveDate) -> Self {
        Self {
            referrer: String::new(),
            post_data: BTreeMap::new(),
            expires,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionHistory {
    pages: BTreeMap<String, PageEntry>,
}

impl SessionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(&self, path: &str) -> Option<&PageEntry> {
        self.pages.get(path)
    }

    pub fn pages(&self) -> impl Iterator<Item = (&str, &PageEntry)> {
        self.pages.iter().map(|(path, entry)| (path.as_str(), entry))
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Drops pages expiring on or before `today`; returns how many.
    pub fn sweep(&mut self, today: NaiveDate) -> usize {
        let before = self.pages.len();
        self.pages.retain(|_, entry| entry.expires > today);
        before - self.pages.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// The parts of a request history recording looks at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Visit {
    /// Full path including the query string
    pub path: String,
    pub host: String,
    pub referrer: Option<String>,
    pub method: Method,
    pub post_data: BTreeMap<String, String>,
    /// Signed-in user, for the error log
    pub user: Option<String>,
}

impl Visit {
    pub fn get(path: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            host: host.into(),
            referrer: None,
            method: Method::Get,
            post_data: BTreeMap::new(),
            user: None,
        }
    }

    pub fn post(
        path: impl Into<String>,
        host: impl Into<String>,
        data: impl IntoIterator<Item = (String, String)>,
    ) -> Self {
        Self {
            method: Method::Post,
            post_data: data.into_iter().collect(),
            ..Self::get(path, host)
        }
    }

    pub fn referrer(mut self, referrer: impl Into<String>) -> Self {
        self.referrer = Some(referrer.into());
        self
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Referring path on this host; empty for other hosts or none.
    pub fn last_page(&self) -> String {
        let Some(referrer) = self.referrer.as_deref() else {
            return String::new();
        };
        let tail = if self.host.is_empty() {
            referrer
        } else {
            referrer
                .rsplit_once(self.host.as_str())
                .map_or(referrer, |(_, tail)| tail)
        };
        let tail = tail.trim();
        if tail.to_ascii_lowercase().starts_with("http") {
            return String::new();
        }
        tail.to_string()
    }
}

/// Applies one visit to `history`. Returns whether anything changed.
///
/// Only paths ending in `/` are pages; assets and downloads are ignored.
pub fn record_visit(
    history: &mut SessionHistory,
    visit: &Visit,
    today: NaiveDate,
    ttl: chrono::Duration,
) -> bool {
    let current = visit.path.as_str();
    if !current.ends_with('/') {
        return false;
    }

    let expires = today.checked_add_signed(ttl).unwrap_or(NaiveDate::MAX);
    let last = visit.last_page();
    let mut changed = false;

    if !last.is_empty() && last != current {
        // never link back to the page that links here
        let loops = history
            .page(&last)
            .is_some_and(|entry| entry.referrer == current);
        if !loops {
            history.pages.insert(
                current.to_string(),
                PageEntry {
                    referrer: last.clone(),
                    ..PageEntry::new(expires)
                },
            );
            changed = true;
        }
    }

    if visit.method == Method::Post && !last.is_empty() {
        let entry = history
            .pages
            .entry(last)
            .or_insert_with(|| PageEntry::new(expires));
        entry.post_data = visit.post_data.clone();
        entry.expires = expires;
        changed = true;
    }

    if changed {
        history
            .pages
            .entry(current.to_string())
            .or_insert_with(|| PageEntry::new(expires))
            .expires = expires;
    }

    changed
}

/// Histories of every live session.
#[derive(Debug)]
pub struct HistoryStore {
    sessions: RwLock<HashMap<Uuid, SessionHistory>>,
    ttl: chrono::Duration,
    error_log: Option<Arc<dyn ErrorLogSink>>,
}

impl HistoryStore {
    pub fn new(ttl: chrono::Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl,
            error_log: None,
        }
    }

    /// Failed recordings are also written to `sink`.
    pub fn with_error_log(mut self, sink: Arc<dyn ErrorLogSink>) -> Self {
        self.error_log = Some(sink);
        self
    }

    pub async fn open_session(&self) -> Uuid {
        let key = Uuid::new_v4();
        self.sessions
            .write()
            .await
            .insert(key, SessionHistory::new());
        key
    }

    pub async fn history(&self, session: Uuid) -> Option<SessionHistory> {
        self.sessions.read().await.get(&session).cloned()
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Records `visit` for `session` as of `today`.
    pub async fn try_record(&self, session: Uuid, visit: &Visit, today: NaiveDate) -> Result<bool> {
        let mut sessions = self.sessions.write().await;
        let history = sessions
            .get_mut(&session)
            .ok_or_else(|| CuraError::not_found("session", session))?;
        Ok(record_visit(history, visit, today, self.ttl))
    }

    /// Records `visit` without ever failing the caller.
    pub async fn record(&self, session: Uuid, visit: &Visit) {
        let today = Local::now().date_naive();
        non_fatal_logged(
            "history",
            self.error_log.as_deref(),
            &visit.path,
            visit.user.as_deref(),
            self.try_record(session, visit, today),
        )
        .await;
    }

    /// Removes expired pages across all sessions; returns how many.
    pub async fn sweep(&self, today: NaiveDate) -> usize {
        let mut sessions = self.sessions.write().await;
        let removed: usize = sessions
            .values_mut()
            .map(|history| history.sweep(today))
            .sum();
        event!(Level::DEBUG, removed, sessions = sessions.len(), "History swept");
        removed
    }
}

/// Background task sweeping a [`HistoryStore`]. Stops when dropped.
pub struct HistorySweeper {
    stop_tx: Option<oneshot::Sender<()>>,
    join_handle: Option<JoinHandle<()>>,
}

impl HistorySweeper {
    pub async fn stop(mut self) -> Result<()> {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }

        if let Some(join_handle) = self.join_handle.take() {
            join_handle
                .await
                .map_err(|err| CuraError::ExecutionError(format!("history sweeper join: {}", err)))?;
        }
        Ok(())
    }
}

impl Drop for HistorySweeper {
    fn drop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(join_handle) = self.join_handle.take() {
            join_handle.abort();
        }
    }
}

/// Sweeps `store` every `interval` until stopped.
pub fn spawn_sweeper(store: Arc<HistoryStore>, interval: Duration) -> HistorySweeper {
    let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

    let join_handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // the first tick completes immediately
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = &mut stop_rx => {
                    break;
                }
                _ = ticker.tick() => {
                    store.sweep(Local::now().date_naive()).await;
                }
            }
        }
    });

    HistorySweeper {
        stop_tx: Some(stop_tx),
        join_handle: Some(join_handle),
    }
}
