use crate::core::{CuraError, FieldDef, FieldMap, RecordId, Result, Schema, StoredRecord, Value};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table {
    schema: TableSchema,
    rows: BTreeMap<RecordId, FieldMap>,
    next_id: u64,
    #[serde(skip)]
    indexes: HashMap<String, HashMap<Value, Vec<RecordId>>>,
}

impl Table {
    pub fn new(schema: TableSchema) -> Self {
        let indexed = schema.indexes.clone();
        let mut table = Self {
            schema,
            rows: BTreeMap::new(),
            next_id: 1,
            indexes: HashMap::new(),
        };
        for field in indexed {
            table.indexes.insert(field, HashMap::new());
        }
        table
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub fn insert(&mut self, fields: FieldMap) -> Result<RecordId> {
        self.validate_fields(&fields)?;

        let id = RecordId(self.next_id);
        self.next_id += 1;

        self.update_indexes(id, &fields);
        self.rows.insert(id, fields);
        Ok(id)
    }

    /// Re-inserts a record under its original id (snapshot load, undo of a delete).
    pub fn restore(&mut self, record: StoredRecord) -> Result<()> {
        self.validate_fields(&record.fields)?;
        if self.rows.contains_key(&record.id) {
            return Err(CuraError::ExecutionError(format!(
                "Record {} already exists in '{}'",
                record.id, self.schema.name
            )));
        }
        self.next_id = self.next_id.max(record.id.0 + 1);
        self.update_indexes(record.id, &record.fields);
        self.rows.insert(record.id, record.fields);
        Ok(())
    }

    /// Replaces the record's fields and returns the previous ones.
    pub fn update(&mut self, id: RecordId, fields: FieldMap) -> Result<FieldMap> {
        self.validate_fields(&fields)?;

        let Some(old) = self.rows.remove(&id) else {
            return Err(CuraError::not_found(self.schema.name.clone(), id));
        };
        self.remove_from_indexes(id, &old);
        self.update_indexes(id, &fields);
        self.rows.insert(id, fields);
        Ok(old)
    }

    pub fn delete(&mut self, id: RecordId) -> Option<StoredRecord> {
        let fields = self.rows.remove(&id)?;
        self.remove_from_indexes(id, &fields);
        Some(StoredRecord::new(id, fields))
    }

    pub fn get(&self, id: RecordId) -> Option<StoredRecord> {
        self.rows
            .get(&id)
            .map(|fields| StoredRecord::new(id, fields.clone()))
    }

    pub fn contains(&self, id: RecordId) -> bool {
        self.rows.contains_key(&id)
    }

    /// All records, ascending id.
    pub fn scan(&self) -> Vec<StoredRecord> {
        self.rows
            .iter()
            .map(|(id, fields)| StoredRecord::new(*id, fields.clone()))
            .collect()
    }

    /// Records equal on every criterion, ascending id.
    pub fn find(&self, criteria: &FieldMap) -> Vec<StoredRecord> {
        if let Some(candidates) = self.index_candidates(criteria) {
            let mut ids = candidates;
            ids.sort();
            return ids
                .into_iter()
                .filter_map(|id| self.get(id))
                .filter(|record| record.matches(criteria))
                .collect();
        }

        self.rows
            .iter()
            .filter(|(_, fields)| {
                criteria
                    .iter()
                    .all(|(name, expected)| fields.get(name).unwrap_or(&Value::Null) == expected)
            })
            .map(|(id, fields)| StoredRecord::new(*id, fields.clone()))
            .collect()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn create_index(&mut self, field: &str) -> Result<()> {
        if self.indexes.contains_key(field) {
            return Ok(());
        }
        if !self.schema.schema().has_field(field) {
            return Err(CuraError::MalformedInput(format!(
                "Field '{}' not found in '{}'",
                field, self.schema.name
            )));
        }
        let mut index: HashMap<Value, Vec<RecordId>> = HashMap::new();
        for (id, fields) in &self.rows {
            let value = fields.get(field).cloned().unwrap_or(Value::Null);
            index.entry(value).or_default().push(*id);
        }
        self.indexes.insert(field.to_string(), index);
        if !self.schema.is_indexed(field) {
            self.schema.indexes.push(field.to_string());
        }
        Ok(())
    }

    /// Rebuilds indexes after deserialization (they are not persisted).
    pub(crate) fn rebuild_indexes(&mut self) -> Result<()> {
        self.indexes.clear();
        for field in self.schema.indexes.clone() {
            self.create_index(&field)?;
        }
        Ok(())
    }

    fn index_candidates(&self, criteria: &FieldMap) -> Option<Vec<RecordId>> {
        criteria.iter().find_map(|(field, value)| {
            let index = self.indexes.get(field)?;
            Some(index.get(value).cloned().unwrap_or_default())
        })
    }

    fn validate_fields(&self, fields: &FieldMap) -> Result<()> {
        self.schema.schema().validate(&self.schema.name, fields)
    }

    fn update_indexes(&mut self, id: RecordId, fields: &FieldMap) {
        for (field, index) in &mut self.indexes {
            let value = fields.get(field).cloned().unwrap_or(Value::Null);
            index.entry(value).or_default().push(id);
        }
    }

    fn remove_from_indexes(&mut self, id: RecordId, fields: &FieldMap) {
        for (field, index) in &mut self.indexes {
            let value = fields.get(field).unwrap_or(&Value::Null);
            if let Some(ids) = index.get_mut(value) {
                ids.retain(|&x| x != id);
            }
        }
    }
}

/// Schema of one entity kind plus its reconciliation defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSchema {
    name: String,
    schema: Schema,
    /// Fields that identify "the same row, renamed" when a dependent of this
    /// kind is reconciled without an explicit edit key.
    pub edit_key: Option<Vec<String>>,
    pub indexes: Vec<String>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>, fields: Vec<FieldDef>) -> Self {
        Self {
            name: name.into(),
            schema: Schema::new(fields),
            edit_key: None,
            indexes: Vec::new(),
        }
    }

    pub fn with_edit_key(mut self, fields: &[&str]) -> Self {
        self.edit_key = Some(fields.iter().map(|f| f.to_string()).collect());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn is_indexed(&self, field: &str) -> bool {
        self.indexes.iter().any(|idx| idx == field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DataType;

    fn phone_table() -> Table {
        let mut table = Table::new(TableSchema::new(
            "phone_number",
            vec![
                FieldDef::new("number", DataType::Text).not_null(),
                FieldDef::new("organization", DataType::Ref("organization".into())),
            ],
        ));
        table.create_index("organization").unwrap();
        table
    }

    fn phone(number: &str, org: u64) -> FieldMap {
        FieldMap::from([
            ("number".to_string(), Value::from(number)),
            ("organization".to_string(), Value::Ref(RecordId(org))),
        ])
    }

    #[test]
    fn test_find_scoped_by_index() {
        let mut table = phone_table();
        let a = table.insert(phone("555-1111", 7)).unwrap();
        table.insert(phone("555-2222", 8)).unwrap();
        let c = table.insert(phone("555-3333", 7)).unwrap();

        let scope = FieldMap::from([("organization".to_string(), Value::Ref(RecordId(7)))]);
        let ids: Vec<RecordId> = table.find(&scope).into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![a, c]);
    }

    #[test]
    fn test_update_moves_index_entry() {
        let mut table = phone_table();
        let id = table.insert(phone("555-1111", 7)).unwrap();
        let old = table.update(id, phone("555-1111", 8)).unwrap();
        assert_eq!(old.get("organization"), Some(&Value::Ref(RecordId(7))));

        let scope7 = FieldMap::from([("organization".to_string(), Value::Ref(RecordId(7)))]);
        let scope8 = FieldMap::from([("organization".to_string(), Value::Ref(RecordId(8)))]);
        assert!(table.find(&scope7).is_empty());
        assert_eq!(table.find(&scope8).len(), 1);
    }

    #[test]
    fn test_restore_keeps_id_and_advances_counter() {
        let mut table = phone_table();
        table
            .restore(StoredRecord::new(RecordId(10), phone("555-1111", 7)))
            .unwrap();
        let next = table.insert(phone("555-2222", 7)).unwrap();
        assert_eq!(next, RecordId(11));
        assert!(table
            .restore(StoredRecord::new(RecordId(10), phone("x", 7)))
            .is_err());
    }

    #[test]
    fn test_not_null_enforced() {
        let mut table = phone_table();
        let mut fields = phone("", 7);
        fields.insert("number".into(), Value::Null);
        assert!(table.insert(fields).is_err());
    }

    #[test]
    fn test_index_matches_equal_numbers() {
        let mut table = Table::new(TableSchema::new(
            "install_equipment",
            vec![FieldDef::new("quantity", DataType::Float)],
        ));
        table.create_index("quantity").unwrap();
        let two = table
            .insert(FieldMap::from([("quantity".to_string(), Value::Integer(2))]))
            .unwrap();
        table
            .insert(FieldMap::from([("quantity".to_string(), Value::Float(2.5))]))
            .unwrap();

        let scope = FieldMap::from([("quantity".to_string(), Value::Float(2.0))]);
        let ids: Vec<RecordId> = table.find(&scope).into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![two]);
    }
}
