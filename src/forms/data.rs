use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A submitted value: one string, or several for multi-selects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FormValue {
    Single(String),
    List(Vec<String>),
}

/// Flat submission keyed `"<form>_<field>_<index>"`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FormData {
    entries: BTreeMap<String, FormValue>,
}

impl FormData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries
            .insert(key.into(), FormValue::Single(value.into()));
    }

    pub fn insert_list<I, V>(&mut self, key: impl Into<String>, values: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        let values = values.into_iter().map(Into::into).collect();
        self.entries.insert(key.into(), FormValue::List(values));
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Single value; for a list, its last element.
    pub fn get(&self, key: &str) -> Option<&str> {
        match self.entries.get(key)? {
            FormValue::Single(value) => Some(value),
            FormValue::List(values) => values.last().map(String::as_str),
        }
    }

    /// Every value under `key`; a single value reads as a one-element list.
    pub fn get_list(&self, key: &str) -> Vec<&str> {
        match self.entries.get(key) {
            Some(FormValue::Single(value)) => vec![value.as_str()],
            Some(FormValue::List(values)) => values.iter().map(String::as_str).collect(),
            None => Vec::new(),
        }
    }

    /// Distinct numeric suffixes of `<form>_<anchor>_<index>` keys, ascending.
    pub fn indices(&self, form: &str, anchor: &str) -> Vec<u32> {
        let prefix = field_key(form, anchor, "");
        let found: BTreeSet<u32> = self
            .entries
            .keys()
            .filter_map(|key| key.strip_prefix(&prefix))
            .filter(|suffix| !suffix.is_empty() && suffix.bytes().all(|b| b.is_ascii_digit()))
            .filter_map(|suffix| suffix.parse().ok())
            .collect();
        found.into_iter().collect()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FormData {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut data = FormData::new();
        for (key, value) in iter {
            data.insert(key, value);
        }
        data
    }
}

/// `"<form>_<field>_<index>"`
pub fn field_key(form: &str, field: &str, index: impl std::fmt::Display) -> String {
    format!("{}_{}_{}", form, field, index)
}
