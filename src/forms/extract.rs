use super::data::field_key;
use super::rules::{FieldRule, FieldSpec, REQUIRED_MESSAGE};
use super::{FormData, ForeignLookup};
use crate::config::DEFAULT_URL_PREFIX;
use crate::core::{CuraError, FieldMap, Result, ValidationErrors, Value};
use crate::reconcile::{ChildSpec, DependentGroup, DependentSpec};
use tracing::{Level, event};

/// A multi-select whose every value becomes one dependent row.
#[derive(Debug, Clone)]
pub struct DependentField {
    /// Form field carrying the list
    pub field: String,
    pub kind: String,
    pub fkey_field: String,
    /// Field of the dependent row that receives each value
    pub target_field: String,
    /// Kind the submitted values refer to
    pub target_kind: String,
}

impl DependentField {
    pub fn group(&self) -> DependentGroup {
        DependentGroup::new(self.kind.clone(), self.fkey_field.clone())
    }
}

/// Turns a dynamic sub-form submission into ordered child specs.
#[derive(Debug, Clone)]
pub struct SpecExtractor {
    form_name: String,
    anchor: String,
    fields: Vec<FieldSpec>,
    dependents: Vec<DependentField>,
    row_requires: Option<String>,
    url_prefix: String,
}

impl SpecExtractor {
    pub fn new(form_name: impl Into<String>, anchor: impl Into<String>) -> Self {
        Self {
            form_name: form_name.into(),
            anchor: anchor.into(),
            fields: Vec::new(),
            dependents: Vec::new(),
            row_requires: None,
            url_prefix: DEFAULT_URL_PREFIX.to_string(),
        }
    }

    pub fn field(mut self, name: impl Into<String>, rule: FieldRule) -> Self {
        self.fields.push(FieldSpec::new(name, rule));
        self
    }

    pub fn required(mut self, name: impl Into<String>, rule: FieldRule) -> Self {
        self.fields.push(FieldSpec::new(name, rule).required());
        self
    }

    /// Rows where this field is empty are dropped rather than rejected.
    pub fn row_requires(mut self, name: impl Into<String>) -> Self {
        self.row_requires = Some(name.into());
        self
    }

    pub fn dependent_list(mut self, dependent: DependentField) -> Self {
        self.dependents.push(dependent);
        self
    }

    pub fn url_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.url_prefix = prefix.into();
        self
    }

    pub fn form_name(&self) -> &str {
        &self.form_name
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn indices(&self, form: &FormData) -> Vec<u32> {
        form.indices(&self.form_name, &self.anchor)
    }

    /// Per-field messages, keyed by the submitted field name.
    pub fn validate(&self, form: &FormData) -> ValidationErrors {
        let mut errors = ValidationErrors::new();

        for index in self.live_rows(form) {
            for field in &self.fields {
                let key = field_key(&self.form_name, &field.name, index);
                let raw = form.get(&key).map(str::trim).unwrap_or("");

                if field.required && raw.is_empty() && field.rule != FieldRule::Checkbox {
                    errors.add(key, REQUIRED_MESSAGE);
                    continue;
                }
                if let Err(message) = field.rule.parse(Some(raw), &self.url_prefix) {
                    errors.add(key, message);
                }
            }
        }
        errors
    }

    /// Validates, then builds one spec per live row. References resolve
    /// through `lookup`; an unknown id fails with `NotFound`.
    pub async fn extract(
        &self,
        form: &FormData,
        lookup: &dyn ForeignLookup,
    ) -> Result<Vec<ChildSpec>> {
        self.validate(form).into_result()?;

        let mut specs = Vec::new();
        for index in self.live_rows(form) {
            let mut fields = FieldMap::new();
            for field in &self.fields {
                let key = field_key(&self.form_name, &field.name, index);
                let value = field
                    .rule
                    .parse(form.get(&key), &self.url_prefix)
                    .map_err(|message| {
                        CuraError::MalformedInput(format!("{}: {}", key, message))
                    })?;
                let value = match (&field.rule, value) {
                    (FieldRule::Reference(kind), Value::Text(raw)) => {
                        Value::Ref(lookup.resolve(kind, &raw).await?)
                    }
                    (_, value) => value,
                };
                fields.insert(field.name.clone(), value);
            }

            let mut spec = ChildSpec::new(fields).at(index);
            for dependent in &self.dependents {
                spec.declare(dependent.group());
                let key = field_key(&self.form_name, &dependent.field, index);
                for raw in form.get_list(&key) {
                    if raw.trim().is_empty() {
                        continue;
                    }
                    let target = lookup.resolve(&dependent.target_kind, raw).await?;
                    spec.dependents.push(
                        DependentSpec::new(dependent.kind.clone(), dependent.fkey_field.clone())
                            .with(dependent.target_field.clone(), target),
                    );
                }
            }
            specs.push(spec);
        }

        event!(
            Level::DEBUG,
            form = %self.form_name,
            rows = specs.len(),
            "sub-form specs extracted"
        );
        Ok(specs)
    }

    /// Indices whose row has any content and a value in the row-requiring field.
    fn live_rows(&self, form: &FormData) -> Vec<u32> {
        self.indices(form)
            .into_iter()
            .filter(|&index| {
                let filled = |name: &str| {
                    form.get_list(&field_key(&self.form_name, name, index))
                        .iter()
                        .any(|raw| !raw.trim().is_empty())
                };
                let any_content = self
                    .fields
                    .iter()
                    .filter(|f| f.rule != FieldRule::Checkbox)
                    .any(|f| filled(&f.name))
                    || self.dependents.iter().any(|d| filled(&d.field));
                let anchored = self.row_requires.as_deref().is_none_or(filled);
                any_content && anchored
            })
            .collect()
    }
}
