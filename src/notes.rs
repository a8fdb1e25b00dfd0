//! System audit notes.
//!
//! When a form changes a record, the change is recorded as a note whose
//! grey `<span>` lists one line per changed field and per added or removed
//! collection item. The issue changelog reads these lines back.

use crate::core::{FieldMap, Value};
use crate::display::DisplayFormat;
use crate::reconcile::ReconciliationResult;
use std::collections::BTreeMap;

pub const SPAN_OPEN: &str = r#"<span style="color:#888; font-style:italic;">"#;
pub const SPAN_CLOSE: &str = "</span>";

/// Collection items added and removed, grouped under the label used in the
/// note.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionChanges {
    pub added: BTreeMap<String, Vec<String>>,
    pub removed: BTreeMap<String, Vec<String>>,
}

impl CollectionChanges {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, label: &str, item: impl Into<String>) {
        self.added.entry(label.to_string()).or_default().push(item.into());
    }

    pub fn remove(&mut self, label: &str, item: impl Into<String>) {
        self.removed
            .entry(label.to_string())
            .or_default()
            .push(item.into());
    }

    pub fn merge(&mut self, other: CollectionChanges) {
        for (label, items) in other.added {
            self.added.entry(label).or_default().extend(items);
        }
        for (label, items) in other.removed {
            self.removed.entry(label).or_default().extend(items);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.added.values().all(Vec::is_empty) && self.removed.values().all(Vec::is_empty)
    }
}

/// Displayed value, or `None` for anything blank.
fn shown(value: Option<&Value>, display: &dyn DisplayFormat) -> Option<String> {
    match value? {
        Value::Null | Value::Boolean(false) | Value::Integer(0) => None,
        other => Some(display.value(other)).filter(|text| !text.is_empty()),
    }
}

/// Builds the audit note for a record going from `old` to `new`.
///
/// Fields are compared in name order. Fields listed in `append_after` are
/// not reported as changes; their new text is appended below the span
/// instead. Returns `None` when nothing changed.
pub fn differences_note(
    old: &FieldMap,
    new: &FieldMap,
    collections: &CollectionChanges,
    append_after: &[&str],
    display: &dyn DisplayFormat,
) -> Option<String> {
    let mut lines = Vec::new();
    let mut changed = false;

    for field in old.keys() {
        let before = shown(old.get(field), display);
        let after = shown(new.get(field), display);
        if before == after {
            continue;
        }

        if append_after.contains(&field.as_str()) {
            changed |= after.is_some();
            continue;
        }

        let mut line = format!("Changed {}", field);
        if let Some(before) = &before {
            line.push_str(&format!(" from \"{}\"", before));
        }
        line.push_str(&format!(" to \"{}\"", after.unwrap_or_default()));
        lines.push(line);
        changed = true;
    }

    for (label, items) in &collections.added {
        for item in items {
            lines.push(format!("Added {} \"{}\"", label, item));
            changed = true;
        }
    }
    for (label, items) in &collections.removed {
        for item in items {
            lines.push(format!("Removed {} \"{}\"", label, item));
            changed = true;
        }
    }

    if !changed {
        return None;
    }

    let extra: Vec<String> = append_after
        .iter()
        .filter_map(|field| {
            let after = shown(new.get(*field), display)?;
            let after = after.trim();
            let before = shown(old.get(*field), display).unwrap_or_default();
            (!after.is_empty() && after != before.trim()).then(|| after.to_string())
        })
        .collect();
    let mut extra = extra.join("\n\n");
    if !extra.trim().is_empty() && !lines.is_empty() {
        extra = format!("\n\n{}", extra.trim());
    }

    Some(format!(
        "{}{}{}{}",
        SPAN_OPEN,
        lines.join("\n"),
        SPAN_CLOSE,
        extra
    ))
}

/// Added and removed items of one reconciled collection, under `label`.
/// An edit whose text changes counts as a removal plus an addition.
pub fn collection_changes(
    result: &ReconciliationResult,
    label: &str,
    display: &dyn DisplayFormat,
) -> CollectionChanges {
    let mut changes = CollectionChanges::new();

    for created in &result.creations {
        changes.add(label, display.record(&result.kind, &created.fields));
    }
    for deleted in &result.deletions {
        changes.remove(label, display.record(&result.kind, &deleted.fields));
    }
    for edit in &result.edits {
        let before = display.record(&result.kind, &edit.before.fields);
        let after = display.record(&result.kind, &edit.after.fields);
        if before != after {
            changes.remove(label, before);
            changes.add(label, after);
        }
    }

    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{RecordId, StoredRecord};
    use crate::display::DefaultDisplay;
    use crate::reconcile::CreatedRecord;

    fn fields(pairs: &[(&str, Value)]) -> FieldMap {
        pairs
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect()
    }

    #[test]
    fn test_changed_lines() {
        let old = fields(&[
            ("title", Value::from("Printer")),
            ("tickets", Value::Null),
            ("name", Value::from("same")),
        ]);
        let new = fields(&[
            ("title", Value::from("Printer on fire")),
            ("tickets", Value::from("1234")),
            ("name", Value::from("same")),
        ]);

        let note =
            differences_note(&old, &new, &CollectionChanges::new(), &[], &DefaultDisplay).unwrap();
        assert_eq!(
            note,
            format!(
                "{}Changed tickets to \"1234\"\nChanged title from \"Printer\" to \"Printer on fire\"{}",
                SPAN_OPEN, SPAN_CLOSE
            )
        );
    }

    #[test]
    fn test_nothing_changed() {
        let old = fields(&[("title", Value::from("x"))]);
        assert_eq!(
            differences_note(&old, &old, &CollectionChanges::new(), &[], &DefaultDisplay),
            None
        );
    }

    #[test]
    fn test_appended_field_and_collections() {
        let old = fields(&[("description", Value::Null)]);
        let new = fields(&[("description", Value::from(" free text "))]);
        let mut collections = CollectionChanges::new();
        collections.add("phone", "555-2222");
        collections.remove("phone", "555-1111");

        let note =
            differences_note(&old, &new, &collections, &["description"], &DefaultDisplay).unwrap();
        assert_eq!(
            note,
            format!(
                "{}Added phone \"555-2222\"\nRemoved phone \"555-1111\"{}\n\nfree text",
                SPAN_OPEN, SPAN_CLOSE
            )
        );

        // only the appended field changed
        let note = differences_note(
            &old,
            &new,
            &CollectionChanges::new(),
            &["description"],
            &DefaultDisplay,
        )
        .unwrap();
        assert_eq!(note, format!("{}{}free text", SPAN_OPEN, SPAN_CLOSE));
    }

    #[test]
    fn test_collection_changes_from_result() {
        let mut result = ReconciliationResult::new("phone_number");
        result.creations.push(CreatedRecord {
            id: None,
            fields: fields(&[("number", Value::from("555-2222"))]),
        });
        result.deletions.push(StoredRecord {
            id: RecordId(1),
            fields: fields(&[("number", Value::from("555-1111"))]),
        });

        let changes = collection_changes(&result, "phone", &DefaultDisplay);
        assert_eq!(changes.added["phone"], vec!["555-2222"]);
        assert_eq!(changes.removed["phone"], vec!["555-1111"]);
        assert!(!changes.is_empty());
    }
}
