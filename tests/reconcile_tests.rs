/// Reconciliation tests
///
/// Sub-form submissions reconciled against stored collections through the
/// CRM collection adapters.
/// Run with: cargo test --test reconcile_tests

use async_trait::async_trait;
use cura::collections::kinds::{
    INSTALL, INSTALL_INTERFACE, INSTALL_INTERFACES_CONTACT, INSTALL_SERVER, ORGANIZATION, PERSON,
    PHONE_NUMBER, PHONE_TYPE,
};
use cura::collections::{
    Collection, ContactOwner, collection_for_kind, contact_collections, cura_catalog,
    install_collections,
};
use cura::forms::{FormData, field_key};
use cura::reconcile::ChildKey;
use cura::storage::{EntityCatalog, InMemoryStorage, RecordStore, StoreSnapshot};
use cura::transaction::TransactionId;
use cura::{CuraError, FieldMap, RecordId, Reconciler, Result, StoredRecord, Value};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

const PHONE_FORM: &str = "AddPhoneNumberForm";

struct Fixture {
    store: Arc<InMemoryStorage>,
    org: RecordId,
    home: RecordId,
    work: RecordId,
}

async fn fixture() -> Fixture {
    let store = Arc::new(InMemoryStorage::new(cura_catalog().unwrap()).unwrap());
    let org = RecordId(7);
    store
        .restore_record(
            ORGANIZATION,
            StoredRecord::new(org, FieldMap::from([("name".into(), "Org".into())])),
        )
        .await
        .unwrap();
    let home = store
        .seed(PHONE_TYPE, FieldMap::from([("type".into(), "Home".into())]))
        .await
        .unwrap();
    let work = store
        .seed(PHONE_TYPE, FieldMap::from([("type".into(), "Work".into())]))
        .await
        .unwrap();
    Fixture {
        store,
        org,
        home,
        work,
    }
}

async fn seed_phone(fixture: &Fixture, phone_type: RecordId, number: &str) -> RecordId {
    fixture
        .store
        .seed(
            PHONE_NUMBER,
            FieldMap::from([
                ("number".into(), number.into()),
                ("type".into(), Value::Ref(phone_type)),
                ("organization".into(), Value::Ref(fixture.org)),
            ]),
        )
        .await
        .unwrap()
}

fn phone_form(rows: &[(RecordId, &str)]) -> FormData {
    let mut form = FormData::new();
    for (i, (phone_type, number)) in rows.iter().enumerate() {
        form.insert(field_key(PHONE_FORM, "type", i), phone_type.to_string());
        form.insert(field_key(PHONE_FORM, "number", i), *number);
    }
    form
}

#[tokio::test]
async fn test_phone_collection_adds_missing_row_once() {
    let fixture = fixture().await;
    seed_phone(&fixture, fixture.home, "555-1111").await;

    let reconciler = Reconciler::new(fixture.store.clone());
    let phones = Collection::phone_numbers(ContactOwner::Organization);
    let form = phone_form(&[(fixture.home, "555-1111"), (fixture.work, "555-2222")]);

    let result = phones
        .save(&reconciler, fixture.org, &form, true)
        .await
        .unwrap();
    assert_eq!(result.deletions.len(), 0);
    assert_eq!(result.edits.len(), 0);
    assert_eq!(result.creations.len(), 1);
    let created = &result.creations[0];
    assert!(created.id.is_some());
    assert_eq!(created.fields.get("number"), Some(&Value::from("555-2222")));
    assert_eq!(created.fields.get("type"), Some(&Value::Ref(fixture.work)));
    assert_eq!(
        created.fields.get("organization"),
        Some(&Value::Ref(fixture.org))
    );

    // Same submission again changes nothing
    let again = phones
        .save(&reconciler, fixture.org, &form, true)
        .await
        .unwrap();
    assert!(again.is_empty());
    assert_eq!(fixture.store.row_count(PHONE_NUMBER).await.unwrap(), 2);
}

#[tokio::test]
async fn test_empty_submission_deletes_every_row() {
    let fixture = fixture().await;
    let first = seed_phone(&fixture, fixture.home, "555-1111").await;
    let second = seed_phone(&fixture, fixture.work, "555-2222").await;

    let reconciler = Reconciler::new(fixture.store.clone());
    let result = Collection::phone_numbers(ContactOwner::Organization)
        .save(&reconciler, fixture.org, &FormData::new(), true)
        .await
        .unwrap();

    let deleted: Vec<RecordId> = result.deletions.iter().map(|r| r.id).collect();
    assert_eq!(deleted, vec![first, second]);
    assert!(result.creations.is_empty());
    assert!(result.edits.is_empty());
    assert_eq!(fixture.store.row_count(PHONE_NUMBER).await.unwrap(), 0);
}

#[tokio::test]
async fn test_preview_leaves_store_untouched() {
    let fixture = fixture().await;
    seed_phone(&fixture, fixture.home, "555-1111").await;

    let reconciler = Reconciler::new(fixture.store.clone());
    let form = phone_form(&[(fixture.work, "555-9999")]);
    let result = Collection::phone_numbers(ContactOwner::Organization)
        .save(&reconciler, fixture.org, &form, false)
        .await
        .unwrap();

    assert_eq!(result.deletions.len(), 1);
    assert_eq!(result.creations.len(), 1);
    assert_eq!(result.creations[0].id, None);

    let stored = fixture.store.scan(PHONE_NUMBER).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].get("number"), &Value::from("555-1111"));
}

#[tokio::test]
async fn test_unknown_phone_type_is_not_found() {
    let fixture = fixture().await;
    let reconciler = Reconciler::new(fixture.store.clone());
    let form = phone_form(&[(RecordId(99), "555-0000")]);

    let err = Collection::phone_numbers(ContactOwner::Organization)
        .save(&reconciler, fixture.org, &form, true)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(fixture.store.row_count(PHONE_NUMBER).await.unwrap(), 0);
}

#[tokio::test]
async fn test_new_interface_gets_id_before_its_contacts() {
    let store = Arc::new(InMemoryStorage::new(cura_catalog().unwrap()).unwrap());
    let install = store
        .seed(INSTALL, FieldMap::from([("name".into(), "Main".into())]))
        .await
        .unwrap();
    let ada = store
        .seed(PERSON, FieldMap::from([("first_name".into(), "Ada".into())]))
        .await
        .unwrap();
    let bob = store
        .seed(PERSON, FieldMap::from([("first_name".into(), "Bob".into())]))
        .await
        .unwrap();

    let mut form = FormData::new()
        .with("AddInstallInterfaceForm_name_0", "HL7")
        .with("AddInstallInterfaceForm_url_0", "hl7.local");
    form.insert_list(
        "AddInstallInterfaceForm_contacts_0",
        [ada.to_string(), bob.to_string()],
    );

    let reconciler = Reconciler::new(store.clone());
    let interfaces = Collection::interfaces();
    let result = interfaces
        .save(&reconciler, install, &form, true)
        .await
        .unwrap();

    let interface_id = result.creations[0].id.unwrap();
    let contacts = result.dependents_of(ChildKey::Created(0));
    assert_eq!(contacts.len(), 1);
    assert_eq!(contacts[0].kind, INSTALL_INTERFACES_CONTACT);
    assert_eq!(contacts[0].creations.len(), 2);
    for created in &contacts[0].creations {
        assert_eq!(
            created.fields.get("install_interface"),
            Some(&Value::Ref(interface_id))
        );
    }

    // Renaming the url edits the interface in place and keeps its contacts
    let mut renamed = FormData::new()
        .with("AddInstallInterfaceForm_name_0", "HL7")
        .with("AddInstallInterfaceForm_url_0", "hl7.internal");
    renamed.insert_list("AddInstallInterfaceForm_contacts_0", [ada.to_string()]);
    let result = interfaces
        .save(&reconciler, install, &renamed, true)
        .await
        .unwrap();

    assert_eq!(result.edits.len(), 1);
    assert_eq!(result.edits[0].id(), interface_id);
    let contacts = result.dependents_of(ChildKey::Existing(interface_id));
    assert_eq!(contacts[0].deletions.len(), 1);
    assert_eq!(contacts[0].deletions[0].get("contact"), &Value::Ref(bob));
    assert_eq!(store.row_count(INSTALL_INTERFACE).await.unwrap(), 1);
    assert_eq!(store.row_count(INSTALL_INTERFACES_CONTACT).await.unwrap(), 1);
}

/// Delegates to an `InMemoryStorage` but refuses inserts past a limit.
struct FailingStore {
    inner: InMemoryStorage,
    inserts_left: AtomicUsize,
}

#[async_trait]
impl RecordStore for FailingStore {
    fn catalog(&self) -> &EntityCatalog {
        self.inner.catalog()
    }

    async fn find(&self, kind: &str, criteria: &FieldMap) -> Result<Vec<StoredRecord>> {
        self.inner.find(kind, criteria).await
    }

    async fn get(&self, kind: &str, id: RecordId) -> Result<Option<StoredRecord>> {
        self.inner.get(kind, id).await
    }

    async fn begin(&self) -> Result<TransactionId> {
        self.inner.begin().await
    }

    async fn insert(&self, txn: TransactionId, kind: &str, fields: FieldMap) -> Result<RecordId> {
        let left = self.inserts_left.load(Ordering::SeqCst);
        if left == 0 {
            return Err(CuraError::ExecutionError("insert refused".into()));
        }
        self.inserts_left.store(left - 1, Ordering::SeqCst);
        self.inner.insert(txn, kind, fields).await
    }

    async fn update(
        &self,
        txn: TransactionId,
        kind: &str,
        id: RecordId,
        fields: FieldMap,
    ) -> Result<()> {
        self.inner.update(txn, kind, id, fields).await
    }

    async fn delete(&self, txn: TransactionId, kind: &str, id: RecordId) -> Result<usize> {
        self.inner.delete(txn, kind, id).await
    }

    async fn commit(&self, txn: TransactionId) -> Result<()> {
        self.inner.commit(txn).await
    }

    async fn rollback(&self, txn: TransactionId) -> Result<()> {
        self.inner.rollback(txn).await
    }
}

#[tokio::test]
async fn test_failed_write_rolls_back_everything() {
    let fixture = fixture().await;
    seed_phone(&fixture, fixture.home, "555-1111").await;
    seed_phone(&fixture, fixture.work, "555-2222").await;
    let snapshot = fixture.store.snapshot().await.unwrap();

    let inner = InMemoryStorage::new(cura_catalog().unwrap()).unwrap();
    inner.load_snapshot(snapshot).await.unwrap();
    let store = Arc::new(FailingStore {
        inner,
        inserts_left: AtomicUsize::new(1),
    });

    let reconciler = Reconciler::new(store.clone());
    let form = phone_form(&[(fixture.home, "555-3333"), (fixture.work, "555-4444")]);
    let err = Collection::phone_numbers(ContactOwner::Organization)
        .save(&reconciler, fixture.org, &form, true)
        .await
        .unwrap_err();
    assert!(matches!(err, CuraError::ExecutionError(_)));

    let numbers: Vec<Value> = store
        .inner
        .scan(PHONE_NUMBER)
        .await
        .unwrap()
        .into_iter()
        .map(|record| record.get("number").clone())
        .collect();
    assert_eq!(numbers, vec![Value::from("555-1111"), Value::from("555-2222")]);
}

#[tokio::test]
async fn test_snapshot_round_trip_keeps_ids() {
    let fixture = fixture().await;
    let phone = seed_phone(&fixture, fixture.home, "555-1111").await;

    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("store.json");
    fixture.store.snapshot().await.unwrap().save_json(&path).unwrap();

    let restored = InMemoryStorage::new(cura_catalog().unwrap()).unwrap();
    restored
        .load_snapshot(StoreSnapshot::load_json(&path).unwrap())
        .await
        .unwrap();
    assert!(restored.exists(ORGANIZATION, fixture.org).await.unwrap());
    assert!(restored.exists(PHONE_NUMBER, phone).await.unwrap());

    // New rows continue after the restored ids
    let next = restored
        .seed(PHONE_TYPE, FieldMap::from([("type".into(), "Cell".into())]))
        .await
        .unwrap();
    assert_eq!(next, RecordId(fixture.work.0 + 1));
}

async fn seed_server(store: &InMemoryStorage, install: RecordId, name: &str, alias: &str) -> RecordId {
    store
        .seed(
            INSTALL_SERVER,
            FieldMap::from([
                ("server_name".into(), name.into()),
                ("alias".into(), alias.into()),
                ("install".into(), Value::Ref(install)),
            ]),
        )
        .await
        .unwrap()
}

#[tokio::test]
async fn test_mixed_submission_partitions_existing_rows() {
    let store = Arc::new(InMemoryStorage::new(cura_catalog().unwrap()).unwrap());
    let install = store
        .seed(INSTALL, FieldMap::from([("name".into(), "Main".into())]))
        .await
        .unwrap();
    let db1 = seed_server(&store, install, "db1", "primary").await;
    let db2 = seed_server(&store, install, "db2", "replica").await;
    let db2_copy = seed_server(&store, install, "db2", "stale").await;
    let db3 = seed_server(&store, install, "db3", "old").await;
    let existing = BTreeSet::from([db1, db2, db2_copy, db3]);

    let form = FormData::new()
        .with("AddInstallServerForm_server_name_0", "db1")
        .with("AddInstallServerForm_alias_0", "primary")
        .with("AddInstallServerForm_server_name_1", "db2")
        .with("AddInstallServerForm_alias_1", "standby")
        .with("AddInstallServerForm_server_name_2", "db4")
        .with("AddInstallServerForm_alias_2", "new");

    let reconciler = Reconciler::new(store.clone());
    let result = collection_for_kind(INSTALL_SERVER, ContactOwner::Organization)
        .unwrap()
        .save(&reconciler, install, &form, true)
        .await
        .unwrap();

    let edited: BTreeSet<RecordId> = result.edits.iter().map(|edit| edit.id()).collect();
    let deleted: BTreeSet<RecordId> = result.deletions.iter().map(|r| r.id).collect();
    let created: BTreeSet<RecordId> = result.creations.iter().filter_map(|c| c.id).collect();
    let stored: BTreeSet<RecordId> = store
        .scan(INSTALL_SERVER)
        .await
        .unwrap()
        .into_iter()
        .map(|record| record.id)
        .collect();
    let kept: BTreeSet<RecordId> = stored.difference(&created).copied().collect();
    let kept: BTreeSet<RecordId> = kept.difference(&edited).copied().collect();

    assert_eq!(edited, BTreeSet::from([db2]));
    assert_eq!(deleted, BTreeSet::from([db2_copy, db3]));
    assert_eq!(kept, BTreeSet::from([db1]));
    assert_eq!(created.len(), 1);

    // Kept, edited and deleted rows cover the old rows exactly once
    assert!(kept.is_disjoint(&edited));
    assert!(kept.is_disjoint(&deleted));
    assert!(edited.is_disjoint(&deleted));
    let covered: BTreeSet<RecordId> = kept
        .iter()
        .chain(&edited)
        .chain(&deleted)
        .copied()
        .collect();
    assert_eq!(covered, existing);
    assert!(created.is_disjoint(&existing));

    let db2_row = store.get(INSTALL_SERVER, db2).await.unwrap().unwrap();
    assert_eq!(db2_row.get("alias"), &Value::from("standby"));
}

#[tokio::test]
async fn test_page_collections_hang_off_their_parent() {
    let catalog = cura_catalog().unwrap();
    for collection in install_collections() {
        assert!(catalog.table_exists(collection.kind()), "{}", collection.kind());
        assert_eq!(collection.fkey_field(), "install");
    }
    for owner in [ContactOwner::Organization, ContactOwner::Person] {
        for collection in contact_collections(owner) {
            assert!(catalog.table_exists(collection.kind()), "{}", collection.kind());
            assert_eq!(collection.fkey_field(), owner.kind());
            let found = collection_for_kind(collection.kind(), owner).unwrap();
            assert_eq!(found.label(), collection.label());
        }
    }

    let fixture = fixture().await;
    let reconciler = Reconciler::new(fixture.store.clone());
    let form = phone_form(&[(fixture.home, "555-1111")]);
    let result = collection_for_kind(PHONE_NUMBER, ContactOwner::Organization)
        .unwrap()
        .save(&reconciler, fixture.org, &form, true)
        .await
        .unwrap();
    assert_eq!(result.creations.len(), 1);
}
