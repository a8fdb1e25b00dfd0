//! User-facing rendering of people, values and records.
//!
//! Callers that produce display text take a `&dyn DisplayFormat` instead of
//! relying on how the underlying types print themselves.

use crate::core::{FieldMap, Value};

pub trait DisplayFormat: Send + Sync {
    /// Name as shown in reports
    fn person_name(&self, first: Option<&str>, last: Option<&str>) -> String;

    fn value(&self, value: &Value) -> String;

    /// One-line summary of a child record of `kind`
    fn record(&self, kind: &str, fields: &FieldMap) -> String;
}

/// `"Last, First"` names; records summarized by their plain field values.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultDisplay;

impl DisplayFormat for DefaultDisplay {
    fn person_name(&self, first: Option<&str>, last: Option<&str>) -> String {
        format!("{}, {}", last.unwrap_or(""), first.unwrap_or(""))
    }

    fn value(&self, value: &Value) -> String {
        match value {
            Value::Null => String::new(),
            Value::Boolean(true) => "Yes".to_string(),
            Value::Boolean(false) => "No".to_string(),
            Value::Text(s) => s.clone(),
            other => other.to_string(),
        }
    }

    fn record(&self, _kind: &str, fields: &FieldMap) -> String {
        fields
            .values()
            .filter(|value| !matches!(value, Value::Null | Value::Ref(_) | Value::Boolean(_)))
            .map(|value| self.value(value))
            .filter(|text| !text.trim().is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}
