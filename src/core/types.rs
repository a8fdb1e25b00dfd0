use super::{CuraError, DataType, Result, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Stable integer key of a persisted record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub u64);

impl RecordId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Field name to value, ordered by name so two maps compare and print stably.
pub type FieldMap = BTreeMap<String, Value>;

static NULL: Value = Value::Null;

/// A row already in storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: RecordId,
    pub fields: FieldMap,
}

impl StoredRecord {
    pub fn new(id: RecordId, fields: FieldMap) -> Self {
        Self { id, fields }
    }

    /// Missing fields read as `Null`.
    pub fn get(&self, field: &str) -> &Value {
        self.fields.get(field).unwrap_or(&NULL)
    }

    /// True when every criterion equals the stored value exactly.
    pub fn matches(&self, criteria: &FieldMap) -> bool {
        criteria
            .iter()
            .all(|(field, expected)| self.get(field) == expected)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: true,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn validate(&self, value: &Value) -> Result<()> {
        if matches!(value, Value::Null) {
            if !self.nullable {
                return Err(CuraError::MalformedInput(format!(
                    "Field '{}' cannot be NULL",
                    self.name
                )));
            }
            return Ok(());
        }

        if !self.data_type.is_compatible(value) {
            return Err(CuraError::TypeMismatch(format!(
                "Field '{}' expects type {}, got {}",
                self.name,
                self.data_type,
                value.type_name()
            )));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Schema {
    fields: Vec<FieldDef>,
}

impl Schema {
    pub fn new(fields: Vec<FieldDef>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    pub fn get_field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.get_field(name).is_some()
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Checks every present value; absent nullable fields are allowed.
    pub fn validate(&self, kind: &str, values: &FieldMap) -> Result<()> {
        for name in values.keys() {
            if !self.has_field(name) {
                return Err(CuraError::MalformedInput(format!(
                    "Field '{}' is not declared by '{}'",
                    name, kind
                )));
            }
        }
        for field in &self.fields {
            field.validate(values.get(&field.name).unwrap_or(&NULL))?;
        }
        Ok(())
    }
}

/// Owning relation: records of `child_kind` point at `parent_kind` through `field`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub child_kind: String,
    pub field: String,
    pub parent_kind: String,
}

impl ForeignKey {
    pub fn new(
        child_kind: impl Into<String>,
        field: impl Into<String>,
        parent_kind: impl Into<String>,
    ) -> Self {
        Self {
            child_kind: child_kind.into(),
            field: field.into(),
            parent_kind: parent_kind.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn phone(number: &str) -> StoredRecord {
        let mut fields = FieldMap::new();
        fields.insert("number".into(), Value::from(number));
        fields.insert("organization".into(), Value::Ref(RecordId(7)));
        StoredRecord::new(RecordId(1), fields)
    }

    #[test]
    fn test_record_matches_exact_fields() {
        let record = phone("555-1111");
        let mut criteria = FieldMap::new();
        criteria.insert("number".into(), "555-1111".into());
        assert!(record.matches(&criteria));

        criteria.insert("extension".into(), Value::Null);
        assert!(record.matches(&criteria), "missing field reads as NULL");

        criteria.insert("number".into(), "555-2222".into());
        assert!(!record.matches(&criteria));
    }

    #[test]
    fn test_schema_rejects_undeclared_field() {
        let schema = Schema::new(vec![
            FieldDef::new("number", DataType::Text).not_null(),
            FieldDef::new("organization", DataType::Ref("organization".into())),
        ]);
        let record = phone("555-1111");
        assert!(schema.validate("phone_number", &record.fields).is_ok());

        let mut extra = record.fields.clone();
        extra.insert("fax".into(), "1".into());
        assert!(matches!(
            schema.validate("phone_number", &extra),
            Err(CuraError::MalformedInput(_))
        ));

        let mut wrong = record.fields.clone();
        wrong.insert("number".into(), Value::Integer(5551111));
        assert!(matches!(
            schema.validate("phone_number", &wrong),
            Err(CuraError::TypeMismatch(_))
        ));
    }
}
