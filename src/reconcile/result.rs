use crate::core::{FieldMap, RecordId, StoredRecord, Value};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// A row to be created; `id` is known only after commit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreatedRecord {
    pub id: Option<RecordId>,
    pub fields: FieldMap,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Edit {
    pub before: StoredRecord,
    pub after: StoredRecord,
}

impl Edit {
    pub fn id(&self) -> RecordId {
        self.after.id
    }

    /// `(field, old, new)` for every field whose value differs.
    pub fn changed_fields(&self) -> Vec<(&str, &Value, &Value)> {
        self.after
            .fields
            .iter()
            .filter_map(|(name, new)| {
                let old = self.before.get(name);
                (old != new).then_some((name.as_str(), old, new))
            })
            .collect()
    }
}

/// Identity of the child that owns a set of dependent results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ChildKey {
    Existing(RecordId),
    /// Position in the owning result's `creations`
    Created(usize),
}

impl fmt::Display for ChildKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChildKey::Existing(id) => write!(f, "#{}", id),
            ChildKey::Created(slot) => write!(f, "new:{}", slot),
        }
    }
}

impl Serialize for ChildKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReconciliationResult {
    pub kind: String,
    /// Ascending id
    pub deletions: Vec<StoredRecord>,
    pub creations: Vec<CreatedRecord>,
    pub edits: Vec<Edit>,
    /// Only children whose dependents change appear here
    pub dependents: BTreeMap<ChildKey, Vec<ReconciliationResult>>,
}

impl ReconciliationResult {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            ..Self::default()
        }
    }

    /// True when nothing at any depth would change.
    pub fn is_empty(&self) -> bool {
        self.deletions.is_empty()
            && self.creations.is_empty()
            && self.edits.is_empty()
            && self
                .dependents
                .values()
                .flatten()
                .all(ReconciliationResult::is_empty)
    }

    /// Deletions, creations and edits at every depth.
    pub fn change_count(&self) -> usize {
        self.deletions.len()
            + self.creations.len()
            + self.edits.len()
            + self
                .dependents
                .values()
                .flatten()
                .map(ReconciliationResult::change_count)
                .sum::<usize>()
    }

    pub fn dependents_of(&self, key: ChildKey) -> &[ReconciliationResult] {
        self.dependents.get(&key).map(Vec::as_slice).unwrap_or(&[])
    }
}
