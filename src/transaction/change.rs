// ============================================================================
// Transaction Change Tracking
// ============================================================================
//
// Each Change is an applied record mutation together with what is needed to
// reverse it. Storage writes happen immediately; the change log is replayed
// backwards on ROLLBACK and simply dropped on COMMIT.
//
// ============================================================================

use crate::core::{FieldMap, RecordId, StoredRecord};

/// A single reversible record mutation
#[derive(Debug, Clone)]
pub enum Change {
    /// A record was inserted under a fresh id
    InsertRecord { kind: String, id: RecordId },

    /// A record's fields were replaced
    UpdateRecord {
        kind: String,
        id: RecordId,
        old_fields: FieldMap,
        new_fields: FieldMap,
    },

    /// A record was removed (directly or by cascade)
    DeleteRecord { kind: String, record: StoredRecord },
}

impl Change {
    /// Entity kind affected by this change
    pub fn kind(&self) -> &str {
        match self {
            Change::InsertRecord { kind, .. } => kind,
            Change::UpdateRecord { kind, .. } => kind,
            Change::DeleteRecord { kind, .. } => kind,
        }
    }

    pub fn record_id(&self) -> RecordId {
        match self {
            Change::InsertRecord { id, .. } => *id,
            Change::UpdateRecord { id, .. } => *id,
            Change::DeleteRecord { record, .. } => record.id,
        }
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, Change::DeleteRecord { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_kind_and_id() {
        let change = Change::InsertRecord {
            kind: "phone_number".to_string(),
            id: RecordId(3),
        };
        assert_eq!(change.kind(), "phone_number");
        assert_eq!(change.record_id(), RecordId(3));
        assert!(!change.is_delete());

        let delete = Change::DeleteRecord {
            kind: "address".to_string(),
            record: StoredRecord::new(RecordId(8), FieldMap::new()),
        };
        assert!(delete.is_delete());
        assert_eq!(delete.record_id(), RecordId(8));
    }
}
