use async_trait::async_trait;
use super::EntityCatalog;
use crate::core::{FieldMap, RecordId, Result, StoredRecord};
use crate::transaction::TransactionId;

/// Record storage as seen by the reconciler and the form layer.
///
/// Reads return records in ascending id order. Writes take the id of an open
/// transaction; `rollback` must restore every record written under it.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Kinds and relations this store holds
    fn catalog(&self) -> &EntityCatalog;

    /// Records of `kind` equal to every criterion
    async fn find(&self, kind: &str, criteria: &FieldMap) -> Result<Vec<StoredRecord>>;

    async fn get(&self, kind: &str, id: RecordId) -> Result<Option<StoredRecord>>;

    async fn exists(&self, kind: &str, id: RecordId) -> Result<bool> {
        Ok(self.get(kind, id).await?.is_some())
    }

    async fn begin(&self) -> Result<TransactionId>;

    async fn insert(&self, txn: TransactionId, kind: &str, fields: FieldMap) -> Result<RecordId>;

    async fn update(
        &self,
        txn: TransactionId,
        kind: &str,
        id: RecordId,
        fields: FieldMap,
    ) -> Result<()>;

    /// Deletes the record and everything that references it through a
    /// registered foreign key. Returns the number of records removed.
    async fn delete(&self, txn: TransactionId, kind: &str, id: RecordId) -> Result<usize>;

    async fn commit(&self, txn: TransactionId) -> Result<()>;

    async fn rollback(&self, txn: TransactionId) -> Result<()>;
}
