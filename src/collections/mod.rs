//! The CRM's repeated sub-forms, each bound to the entity kind it edits.
//!
//! A [`Collection`] knows how its form is named and laid out, which kind
//! and foreign key its rows live under, and which fields identify a row to
//! edit in place. `save` runs extraction and reconciliation in one go.

pub mod kinds;

use crate::core::{CuraError, FieldMap, RecordId, Result, ValidationErrors, Value};
use crate::forms::rules::is_checked;
use crate::forms::{
    DependentField, FieldRule, ForeignLookup, FormData, SpecExtractor, StoreLookup, field_key,
};
use crate::reconcile::{ChildSpec, ReconcileRequest, ReconciliationResult, Reconciler};
use crate::storage::RecordStore;
use kinds::*;
use tracing::{Level, event};

pub use kinds::cura_catalog;

pub const NO_PRIMARY_EMAIL: &str = "There needs to be at least one primary email address.";
pub const MANY_PRIMARY_EMAILS: &str = "There can only be one primary email address.";

/// Owner of a contact-style collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactOwner {
    Organization,
    Person,
}

impl ContactOwner {
    /// Kind name, which is also the foreign-key field on the child
    pub fn kind(&self) -> &'static str {
        match self {
            ContactOwner::Organization => ORGANIZATION,
            ContactOwner::Person => PERSON,
        }
    }
}

#[derive(Debug, Clone)]
enum Source {
    /// `<form>_<field>_<index>` rows
    SubForm(SpecExtractor),
    /// One plain list parameter; every id is one row holding `field`
    IdList {
        param: String,
        field: String,
        target_kind: String,
    },
}

#[derive(Debug, Clone)]
pub struct Collection {
    /// Label used in audit notes
    label: String,
    kind: String,
    fkey_field: String,
    edit_key: Option<Vec<String>>,
    source: Source,
    single_primary: bool,
}

impl Collection {
    fn sub_form(label: &str, kind: &str, fkey_field: &str, extractor: SpecExtractor) -> Self {
        Self {
            label: label.to_string(),
            kind: kind.to_string(),
            fkey_field: fkey_field.to_string(),
            edit_key: None,
            source: Source::SubForm(extractor),
            single_primary: false,
        }
    }

    fn id_list(label: &str, kind: &str, param: &str, field: &str, target_kind: &str) -> Self {
        Self {
            label: label.to_string(),
            kind: kind.to_string(),
            fkey_field: "install".to_string(),
            edit_key: None,
            source: Source::IdList {
                param: param.to_string(),
                field: field.to_string(),
                target_kind: target_kind.to_string(),
            },
            single_primary: false,
        }
    }

    fn edit_key(mut self, fields: &[&str]) -> Self {
        self.edit_key = Some(fields.iter().map(|f| f.to_string()).collect());
        self
    }

    pub fn phone_numbers(owner: ContactOwner) -> Self {
        let extractor = SpecExtractor::new("AddPhoneNumberForm", "type")
            .required("type", FieldRule::Reference(PHONE_TYPE.into()))
            .field("number", FieldRule::Text)
            .row_requires("number");
        Self::sub_form("phone number", PHONE_NUMBER, owner.kind(), extractor)
    }

    pub fn addresses(owner: ContactOwner) -> Self {
        let extractor = SpecExtractor::new("AddAddressForm", "address")
            .field("address", FieldRule::Text)
            .field("city", FieldRule::Text)
            .field("state_province", FieldRule::Text)
            .field("zip", FieldRule::Text);
        Self::sub_form("address", ADDRESS, owner.kind(), extractor)
    }

    /// Exactly one submitted address must be primary.
    pub fn email_addresses(owner: ContactOwner) -> Self {
        let extractor = SpecExtractor::new("AddEmailAddressForm", "email")
            .required("email", FieldRule::Email)
            .field("is_primary", FieldRule::Checkbox)
            .row_requires("email");
        Self {
            single_primary: true,
            ..Self::sub_form("email address", EMAIL_ADDRESS, owner.kind(), extractor)
        }
    }

    pub fn key_contacts() -> Self {
        let extractor = SpecExtractor::new("EditInstallKeyContactsForm", "person")
            .required("person", FieldRule::Reference(PERSON.into()));
        Self::sub_form("key contact", INSTALL_KEY_CONTACT, "install", extractor)
    }

    /// Rows without a server name are skipped; `monitor_link` gains a scheme.
    pub fn servers() -> Self {
        let mut extractor = SpecExtractor::new("AddInstallServerForm", "server_name")
            .required("server_name", FieldRule::Text)
            .field(
                "install_database_group",
                FieldRule::Reference(INSTALL_DATABASE_GROUP.into()),
            )
            .field("monitor_link", FieldRule::Url)
            .row_requires("server_name");
        for name in SERVER_TEXT_FIELDS {
            extractor = extractor.field(name, FieldRule::Text);
        }
        Self::sub_form("server", INSTALL_SERVER, "install", extractor).edit_key(&["server_name"])
    }

    pub fn equipment() -> Self {
        let extractor = SpecExtractor::new("AddInstallEquipmentForm", "name")
            .required("name", FieldRule::Text)
            .field("model_number", FieldRule::Text)
            .field("quantity", FieldRule::Integer)
            .required(
                "item_type",
                FieldRule::Reference(INSTALL_EQUIPMENT_TYPE.into()),
            )
            .field("location", FieldRule::Text)
            .field("information", FieldRule::Text);
        Self::sub_form("equipment", INSTALL_EQUIPMENT, "install", extractor).edit_key(&["name"])
    }

    /// Each interface carries its contact links as dependents.
    pub fn interfaces() -> Self {
        let extractor = SpecExtractor::new("AddInstallInterfaceForm", "name")
            .required("name", FieldRule::Text)
            .field("username", FieldRule::Text)
            .field("password", FieldRule::Text)
            .field("url", FieldRule::Text)
            .field("wiki_link", FieldRule::Text)
            .field("description", FieldRule::Text)
            .field("information", FieldRule::Text)
            .dependent_list(DependentField {
                field: "contacts".into(),
                kind: INSTALL_INTERFACES_CONTACT.into(),
                fkey_field: "install_interface".into(),
                target_field: "contact".into(),
                target_kind: PERSON.into(),
            });
        Self::sub_form("interface", INSTALL_INTERFACE, "install", extractor).edit_key(&["name"])
    }

    pub fn install_contacts() -> Self {
        Self::id_list("install contact", INSTALL_CONTACT, "install_contacts", "person", PERSON)
    }

    pub fn install_modules() -> Self {
        Self::id_list(
            "install module",
            INSTALLS_INSTALL_MODULE,
            "install_modules",
            "install_module",
            INSTALL_MODULE,
        )
    }

    /// Scheme given to link fields that lack one.
    pub fn url_prefix(mut self, prefix: &str) -> Self {
        self.source = match self.source {
            Source::SubForm(extractor) => Source::SubForm(extractor.url_prefix(prefix)),
            other => other,
        };
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn fkey_field(&self) -> &str {
        &self.fkey_field
    }

    /// Per-field messages plus form-level ones under `__all__`.
    pub fn validate(&self, form: &FormData) -> ValidationErrors {
        let Source::SubForm(extractor) = &self.source else {
            return ValidationErrors::new();
        };

        let mut errors = extractor.validate(form);
        if self.single_primary {
            let name = extractor.form_name();
            let rows: Vec<u32> = extractor
                .indices(form)
                .into_iter()
                .filter(|&i| form.get(&field_key(name, "email", i)).is_some_and(|v| !v.trim().is_empty()))
                .collect();
            let primaries = rows
                .iter()
                .filter(|&&i| form.get(&field_key(name, "is_primary", i)).is_some_and(is_checked))
                .count();

            if !rows.is_empty() && primaries == 0 {
                errors.add_non_field(NO_PRIMARY_EMAIL);
            } else if primaries > 1 {
                errors.add_non_field(MANY_PRIMARY_EMAILS);
            }
        }
        errors
    }

    /// Child specs the submission asks for.
    pub async fn specs(&self, form: &FormData, lookup: &dyn ForeignLookup) -> Result<Vec<ChildSpec>> {
        self.validate(form).into_result()?;

        match &self.source {
            Source::SubForm(extractor) => extractor.extract(form, lookup).await,
            Source::IdList {
                param,
                field,
                target_kind,
            } => {
                let mut specs = Vec::new();
                for raw in form.get_list(param) {
                    if raw.trim().is_empty() {
                        continue;
                    }
                    let id = lookup.resolve(target_kind, raw).await?;
                    specs.push(ChildSpec::new(FieldMap::new()).with(field.clone(), Value::Ref(id)));
                }
                Ok(specs)
            }
        }
    }

    pub fn request(&self, parent: RecordId, specs: Vec<ChildSpec>) -> ReconcileRequest {
        let mut request = ReconcileRequest::new(&self.kind, &self.fkey_field, parent, specs);
        request.edit_key = self.edit_key.clone();
        request
    }

    /// Extracts specs from `form` and reconciles them under `parent`.
    /// Nothing is written unless `commit` is set.
    pub async fn save<S: RecordStore + 'static>(
        &self,
        reconciler: &Reconciler<S>,
        parent: RecordId,
        form: &FormData,
        commit: bool,
    ) -> Result<ReconciliationResult> {
        let lookup = StoreLookup::new(reconciler.store().clone());
        let specs = self.specs(form, &lookup).await?;
        event!(
            Level::DEBUG,
            collection = %self.label,
            %parent,
            specs = specs.len(),
            "saving collection"
        );
        reconciler.reconcile(self.request(parent, specs), commit).await
    }
}

/// Every collection editable from an install page.
pub fn install_collections() -> Vec<Collection> {
    vec![
        Collection::key_contacts(),
        Collection::servers(),
        Collection::equipment(),
        Collection::interfaces(),
        Collection::install_contacts(),
        Collection::install_modules(),
    ]
}

/// Every collection editable from a person or organization page.
pub fn contact_collections(owner: ContactOwner) -> Vec<Collection> {
    vec![
        Collection::phone_numbers(owner),
        Collection::addresses(owner),
        Collection::email_addresses(owner),
    ]
}

/// The collection editing `kind`, looked up across both page layouts.
pub fn collection_for_kind(kind: &str, owner: ContactOwner) -> Result<Collection> {
    contact_collections(owner)
        .into_iter()
        .chain(install_collections())
        .find(|collection| collection.kind() == kind)
        .ok_or_else(|| CuraError::not_found("collection", kind))
}
