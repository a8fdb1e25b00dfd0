use std::collections::HashMap;
use std::sync::Arc;
use crate::core::{CuraError, ForeignKey, Result};
use super::TableSchema;

/// Entity kinds and the owning relations between them.
/// Immutable once built; clones share the maps.
#[derive(Clone, Debug, Default)]
pub struct EntityCatalog {
    tables: Arc<HashMap<String, TableSchema>>,
    foreign_keys: Arc<Vec<ForeignKey>>,
}

impl EntityCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a new catalog with the kind added (copy-on-write)
    pub fn with_table(self, schema: TableSchema) -> Result<Self> {
        let name = schema.name().to_string();

        if self.tables.contains_key(&name) {
            return Err(CuraError::ExecutionError(format!(
                "Entity kind '{}' already registered",
                name
            )));
        }

        let mut new_tables = (*self.tables).clone();
        new_tables.insert(name, schema);

        Ok(Self {
            tables: Arc::new(new_tables),
            foreign_keys: self.foreign_keys,
        })
    }

    /// Registers an owning relation. Deleting a parent cascades along it.
    pub fn with_foreign_key(self, fk: ForeignKey) -> Result<Self> {
        let child = self.get_table(&fk.child_kind)?;
        if !child.schema().has_field(&fk.field) {
            return Err(CuraError::MalformedInput(format!(
                "Field '{}' not found in '{}'",
                fk.field, fk.child_kind
            )));
        }
        self.get_table(&fk.parent_kind)?;

        let mut new_fks = (*self.foreign_keys).clone();
        if !new_fks.contains(&fk) {
            new_fks.push(fk);
        }

        Ok(Self {
            tables: self.tables,
            foreign_keys: Arc::new(new_fks),
        })
    }

    pub fn get_table(&self, name: &str) -> Result<&TableSchema> {
        self.tables.get(name).ok_or_else(|| {
            CuraError::MalformedInput(format!("Unknown entity kind '{}'", name))
        })
    }

    pub fn table_exists(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub fn list_tables(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tables.keys().map(|s| s.as_str()).collect();
        names.sort();
        names
    }

    pub fn foreign_keys(&self) -> &[ForeignKey] {
        &self.foreign_keys
    }

    /// Relations whose parent side is `kind`.
    pub fn dependents_of(&self, kind: &str) -> impl Iterator<Item = &ForeignKey> {
        self.foreign_keys
            .iter()
            .filter(move |fk| fk.parent_kind == kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{DataType, FieldDef};

    fn catalog() -> EntityCatalog {
        EntityCatalog::new()
            .with_table(TableSchema::new("install", vec![FieldDef::new("name", DataType::Text)]))
            .unwrap()
            .with_table(TableSchema::new(
                "install_server",
                vec![
                    FieldDef::new("server_name", DataType::Text),
                    FieldDef::new("install", DataType::Ref("install".into())),
                ],
            ))
            .unwrap()
    }

    #[test]
    fn test_duplicate_kind_rejected() {
        let err = catalog()
            .with_table(TableSchema::new("install", vec![]))
            .unwrap_err();
        assert!(matches!(err, CuraError::ExecutionError(_)));
    }

    #[test]
    fn test_foreign_key_requires_declared_field() {
        let catalog = catalog()
            .with_foreign_key(ForeignKey::new("install_server", "install", "install"))
            .unwrap();
        assert_eq!(catalog.dependents_of("install").count(), 1);
        assert_eq!(catalog.dependents_of("install_server").count(), 0);

        let err = catalog
            .with_foreign_key(ForeignKey::new("install_server", "organization", "install"))
            .unwrap_err();
        assert!(matches!(err, CuraError::MalformedInput(_)));
    }
}
