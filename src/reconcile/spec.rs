use crate::core::{FieldMap, RecordId, Value};
use serde::{Deserialize, Serialize};

/// One desired child row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChildSpec {
    /// Position among the submitted sub-form rows
    #[serde(default)]
    pub index: Option<u32>,
    pub fields: FieldMap,
    #[serde(default)]
    pub dependents: Vec<DependentSpec>,
    /// Dependent groups this child owns. A declared group with no specs
    /// still reconciles, deleting whatever the child currently owns there.
    #[serde(default)]
    pub declared: Vec<DependentGroup>,
}

impl ChildSpec {
    pub fn new(fields: FieldMap) -> Self {
        Self {
            fields,
            ..Self::default()
        }
    }

    pub fn at(mut self, index: u32) -> Self {
        self.index = Some(index);
        self
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    pub fn with_dependent(mut self, dependent: DependentSpec) -> Self {
        self.declare(dependent.group());
        self.dependents.push(dependent);
        self
    }

    pub fn declare(&mut self, group: DependentGroup) {
        if !self.declared.contains(&group) {
            self.declared.push(group);
        }
    }

    pub fn has_dependents(&self) -> bool {
        !self.dependents.is_empty() || !self.declared.is_empty()
    }
}

/// A grandchild row, owned by a child that may not be persisted yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependentSpec {
    pub kind: String,
    /// Field on `kind` pointing back at the owning child
    pub fkey_field: String,
    pub fields: FieldMap,
}

impl DependentSpec {
    pub fn new(kind: impl Into<String>, fkey_field: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            fkey_field: fkey_field.into(),
            fields: FieldMap::new(),
        }
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    pub fn group(&self) -> DependentGroup {
        DependentGroup::new(self.kind.clone(), self.fkey_field.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DependentGroup {
    pub kind: String,
    pub fkey_field: String,
}

impl DependentGroup {
    pub fn new(kind: impl Into<String>, fkey_field: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            fkey_field: fkey_field.into(),
        }
    }
}

/// A reconciliation call: make the rows of `kind` owned by `parent` look
/// like `specs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileRequest {
    pub kind: String,
    pub fkey_field: String,
    pub parent: RecordId,
    pub specs: Vec<ChildSpec>,
    /// Fields that identify a row to edit in place when no row matches a
    /// spec exactly
    #[serde(default)]
    pub edit_key: Option<Vec<String>>,
}

impl ReconcileRequest {
    pub fn new(
        kind: impl Into<String>,
        fkey_field: impl Into<String>,
        parent: RecordId,
        specs: Vec<ChildSpec>,
    ) -> Self {
        Self {
            kind: kind.into(),
            fkey_field: fkey_field.into(),
            parent,
            specs,
            edit_key: None,
        }
    }

    pub fn with_edit_key(mut self, fields: &[&str]) -> Self {
        self.edit_key = Some(fields.iter().map(|f| f.to_string()).collect());
        self
    }
}
