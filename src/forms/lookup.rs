use crate::core::{CuraError, RecordId, Result};
use crate::storage::RecordStore;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Resolves a raw submitted identifier to a stored record of `kind`.
#[async_trait]
pub trait ForeignLookup: Send + Sync {
    /// Fails with `NotFound` when nothing matches.
    async fn resolve(&self, kind: &str, raw: &str) -> Result<RecordId>;
}

/// Looks raw ids up in a record store.
pub struct StoreLookup<S: RecordStore> {
    store: Arc<S>,
}

impl<S: RecordStore> StoreLookup<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<S: RecordStore> ForeignLookup for StoreLookup<S> {
    async fn resolve(&self, kind: &str, raw: &str) -> Result<RecordId> {
        let id = parse_id(kind, raw)?;
        if self.store.exists(kind, id).await? {
            Ok(id)
        } else {
            Err(CuraError::not_found(kind, raw.trim()))
        }
    }
}

/// Fixed set of known ids per kind.
#[derive(Debug, Clone, Default)]
pub struct StaticLookup {
    known: BTreeMap<String, BTreeSet<RecordId>>,
}

impl StaticLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, kind: impl Into<String>, ids: impl IntoIterator<Item = u64>) -> Self {
        self.known
            .entry(kind.into())
            .or_default()
            .extend(ids.into_iter().map(RecordId));
        self
    }
}

#[async_trait]
impl ForeignLookup for StaticLookup {
    async fn resolve(&self, kind: &str, raw: &str) -> Result<RecordId> {
        let id = parse_id(kind, raw)?;
        match self.known.get(kind) {
            Some(ids) if ids.contains(&id) => Ok(id),
            _ => Err(CuraError::not_found(kind, raw.trim())),
        }
    }
}

fn parse_id(kind: &str, raw: &str) -> Result<RecordId> {
    raw.trim()
        .parse::<u64>()
        .map(RecordId)
        .map_err(|_| CuraError::not_found(kind, raw.trim()))
}
