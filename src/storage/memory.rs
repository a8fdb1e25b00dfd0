use super::{EntityCatalog, RecordStore, Table};
use crate::core::{CuraError, DataType, FieldMap, RecordId, Result, StoredRecord, Value};
use crate::transaction::{Change, TransactionId, TransactionManager};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{Level, event};

/// Reference `RecordStore`: one locked table per entity kind, writes logged
/// to the transaction's undo log.
pub struct InMemoryStorage {
    catalog: EntityCatalog,
    /// Tables with individual locks
    tables: HashMap<String, Arc<RwLock<Table>>>,
    transactions: TransactionManager,
}

impl InMemoryStorage {
    /// Creates an empty table for every kind in the catalog. Foreign-key
    /// fields are indexed.
    pub fn new(catalog: EntityCatalog) -> Result<Self> {
        let mut tables = HashMap::new();
        for name in catalog.list_tables() {
            let mut table = Table::new(catalog.get_table(name)?.clone());
            for fk in catalog.foreign_keys().iter().filter(|fk| fk.child_kind == name) {
                table.create_index(&fk.field)?;
            }
            tables.insert(name.to_string(), Arc::new(RwLock::new(table)));
        }

        Ok(Self {
            catalog,
            tables,
            transactions: TransactionManager::new(),
        })
    }

    pub fn get_table(&self, name: &str) -> Result<Arc<RwLock<Table>>> {
        self.tables
            .get(name)
            .cloned()
            .ok_or_else(|| CuraError::MalformedInput(format!("Unknown entity kind '{}'", name)))
    }

    pub async fn row_count(&self, kind: &str) -> Result<usize> {
        let table_handle = self.get_table(kind)?;
        let table = table_handle.read().await;
        Ok(table.row_count())
    }

    pub async fn scan(&self, kind: &str) -> Result<Vec<StoredRecord>> {
        let table_handle = self.get_table(kind)?;
        let table = table_handle.read().await;
        Ok(table.scan())
    }

    /// Inserts outside any transaction, keeping the given id. Used to seed
    /// lookup rows and to load snapshots.
    pub async fn restore_record(&self, kind: &str, record: StoredRecord) -> Result<()> {
        let table_handle = self.get_table(kind)?;
        let mut table = table_handle.write().await;
        table.restore(record)
    }

    /// Inserts outside any transaction.
    pub async fn seed(&self, kind: &str, fields: FieldMap) -> Result<RecordId> {
        self.check_references(kind, &fields).await?;
        let table_handle = self.get_table(kind)?;
        let mut table = table_handle.write().await;
        table.insert(fields)
    }

    async fn ensure_active(&self, txn: TransactionId) -> Result<()> {
        if !self.transactions.is_active(txn).await {
            return Err(CuraError::ExecutionError(format!(
                "Transaction {} is not active",
                txn
            )));
        }
        Ok(())
    }

    /// Every `Ref` value must point at an existing record of the declared kind.
    async fn check_references(&self, kind: &str, fields: &FieldMap) -> Result<()> {
        let schema = self.catalog.get_table(kind)?.schema().clone();
        for (name, value) in fields {
            let Value::Ref(target) = value else { continue };
            let Some(DataType::Ref(target_kind)) = schema.get_field(name).map(|f| &f.data_type)
            else {
                continue;
            };
            let table_handle = self.get_table(target_kind)?;
            if !table_handle.read().await.contains(*target) {
                return Err(CuraError::not_found(target_kind.clone(), target));
            }
        }
        Ok(())
    }

    /// Replays an undo log (newest change first).
    async fn undo(&self, changes: Vec<Change>) -> Result<()> {
        for change in changes {
            let table_handle = self.get_table(change.kind())?;
            let mut table = table_handle.write().await;
            match change {
                Change::InsertRecord { id, .. } => {
                    table.delete(id);
                }
                Change::UpdateRecord { id, old_fields, .. } => {
                    table.update(id, old_fields)?;
                }
                Change::DeleteRecord { record, .. } => {
                    table.restore(record)?;
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for InMemoryStorage {
    fn catalog(&self) -> &EntityCatalog {
        &self.catalog
    }

    async fn find(&self, kind: &str, criteria: &FieldMap) -> Result<Vec<StoredRecord>> {
        let table_handle = self.get_table(kind)?;
        let table = table_handle.read().await;
        Ok(table.find(criteria))
    }

    async fn get(&self, kind: &str, id: RecordId) -> Result<Option<StoredRecord>> {
        let table_handle = self.get_table(kind)?;
        let table = table_handle.read().await;
        Ok(table.get(id))
    }

    async fn begin(&self) -> Result<TransactionId> {
        self.transactions.begin().await
    }

    async fn insert(&self, txn: TransactionId, kind: &str, fields: FieldMap) -> Result<RecordId> {
        self.ensure_active(txn).await?;
        self.check_references(kind, &fields).await?;

        let id = {
            let table_handle = self.get_table(kind)?;
            let mut table = table_handle.write().await;
            table.insert(fields)?
        };
        self.transactions
            .record_change(txn, Change::InsertRecord { kind: kind.to_string(), id })
            .await?;
        event!(Level::TRACE, %txn, kind, %id, "record inserted");
        Ok(id)
    }

    async fn update(
        &self,
        txn: TransactionId,
        kind: &str,
        id: RecordId,
        fields: FieldMap,
    ) -> Result<()> {
        self.ensure_active(txn).await?;
        self.check_references(kind, &fields).await?;

        let old_fields = {
            let table_handle = self.get_table(kind)?;
            let mut table = table_handle.write().await;
            table.update(id, fields.clone())?
        };
        self.transactions
            .record_change(
                txn,
                Change::UpdateRecord {
                    kind: kind.to_string(),
                    id,
                    old_fields,
                    new_fields: fields,
                },
            )
            .await?;
        event!(Level::TRACE, %txn, kind, %id, "record updated");
        Ok(())
    }

    async fn delete(&self, txn: TransactionId, kind: &str, id: RecordId) -> Result<usize> {
        self.ensure_active(txn).await?;
        if !self.get_table(kind)?.read().await.contains(id) {
            return Err(CuraError::not_found(kind.to_string(), id));
        }

        let mut pending = vec![(kind.to_string(), id)];
        let mut removed = 0;

        while let Some((kind, id)) = pending.pop() {
            let record = {
                let table_handle = self.get_table(&kind)?;
                let mut table = table_handle.write().await;
                table.delete(id)
            };
            let Some(record) = record else { continue };
            removed += 1;
            self.transactions
                .record_change(txn, Change::DeleteRecord { kind: kind.clone(), record })
                .await?;

            for fk in self.catalog.dependents_of(&kind) {
                let scope = FieldMap::from([(fk.field.clone(), Value::Ref(id))]);
                let children = self.get_table(&fk.child_kind)?.read().await.find(&scope);
                pending.extend(children.into_iter().map(|c| (fk.child_kind.clone(), c.id)));
            }
        }

        event!(Level::TRACE, %txn, kind, %id, removed, "record deleted");
        Ok(removed)
    }

    async fn commit(&self, txn: TransactionId) -> Result<()> {
        self.transactions.commit(txn).await
    }

    async fn rollback(&self, txn: TransactionId) -> Result<()> {
        let undo = self.transactions.rollback(txn).await?;
        self.undo(undo).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{FieldDef, ForeignKey};
    use crate::storage::TableSchema;

    fn storage() -> InMemoryStorage {
        let catalog = EntityCatalog::new()
            .with_table(TableSchema::new("install", vec![FieldDef::new("name", DataType::Text)]))
            .unwrap()
            .with_table(TableSchema::new(
                "install_interface",
                vec![
                    FieldDef::new("name", DataType::Text),
                    FieldDef::new("install", DataType::Ref("install".into())).not_null(),
                ],
            ))
            .unwrap()
            .with_foreign_key(ForeignKey::new("install_interface", "install", "install"))
            .unwrap();
        InMemoryStorage::new(catalog).unwrap()
    }

    fn named(name: &str) -> FieldMap {
        FieldMap::from([("name".to_string(), Value::from(name))])
    }

    fn interface(name: &str, install: RecordId) -> FieldMap {
        let mut fields = named(name);
        fields.insert("install".into(), Value::Ref(install));
        fields
    }

    #[tokio::test]
    async fn test_rollback_restores_every_write() {
        let store = storage();
        let install = store.seed("install", named("Main")).await.unwrap();
        let kept = store.seed("install_interface", interface("HL7", install)).await.unwrap();

        let txn = store.begin().await.unwrap();
        store.insert(txn, "install_interface", interface("ADT", install)).await.unwrap();
        store
            .update(txn, "install_interface", kept, interface("HL7 v2", install))
            .await
            .unwrap();
        store.rollback(txn).await.unwrap();

        let rows = store.scan("install_interface").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("name"), &Value::from("HL7"));
    }

    #[tokio::test]
    async fn test_delete_cascades_and_undoes() {
        let store = storage();
        let install = store.seed("install", named("Main")).await.unwrap();
        store.seed("install_interface", interface("HL7", install)).await.unwrap();
        store.seed("install_interface", interface("ADT", install)).await.unwrap();

        let txn = store.begin().await.unwrap();
        let removed = store.delete(txn, "install", install).await.unwrap();
        assert_eq!(removed, 3);
        assert_eq!(store.row_count("install_interface").await.unwrap(), 0);

        store.rollback(txn).await.unwrap();
        assert_eq!(store.row_count("install").await.unwrap(), 1);
        assert_eq!(store.row_count("install_interface").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_dangling_reference_rejected() {
        let store = storage();
        let txn = store.begin().await.unwrap();
        let err = store
            .insert(txn, "install_interface", interface("HL7", RecordId(99)))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_write_requires_open_transaction() {
        let store = storage();
        let txn = store.begin().await.unwrap();
        store.commit(txn).await.unwrap();
        assert!(store.insert(txn, "install", named("Late")).await.is_err());
    }
}
