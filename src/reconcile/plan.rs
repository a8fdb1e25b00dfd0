// ============================================================================
// Reconciliation Planning
// ============================================================================
//
// A plan is an arena of nodes built breadth-first from the root request.
// Each node reconciles one collection under one parent; a node's parent is
// either an existing record or a creation slot of an earlier node, so a
// parent always gets its id before any of its dependents are written.
//
// Planning reads the store but never writes to it.
//
// ============================================================================

use super::{
    ChildKey, ChildSpec, CreatedRecord, DependentGroup, DependentSpec, Edit, ReconcileRequest,
    ReconciliationResult,
};
use crate::core::{CuraError, DataType, FieldMap, RecordId, Result, Schema, StoredRecord, Value};
use crate::storage::{EntityCatalog, RecordStore};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

pub type NodeKey = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParentRef {
    Existing(RecordId),
    Created { node: NodeKey, slot: usize },
}

#[derive(Debug, Clone)]
pub struct PlanNode {
    pub kind: String,
    pub fkey_field: String,
    pub parent: ParentRef,
    /// Owning node and the child within it; `None` for the root
    pub owner: Option<(NodeKey, ChildKey)>,
    pub deletions: Vec<StoredRecord>,
    pub edits: Vec<Edit>,
    pub creations: Vec<CreatedRecord>,
}

impl PlanNode {
    pub fn has_changes(&self) -> bool {
        !(self.deletions.is_empty() && self.edits.is_empty() && self.creations.is_empty())
    }
}

#[derive(Debug, Clone)]
pub struct ReconciliationPlan {
    nodes: Vec<PlanNode>,
}

impl ReconciliationPlan {
    pub fn root(&self) -> &PlanNode {
        &self.nodes[0]
    }

    pub fn nodes(&self) -> &[PlanNode] {
        &self.nodes
    }

    pub(crate) fn nodes_mut(&mut self) -> &mut [PlanNode] {
        &mut self.nodes
    }

    pub fn is_empty(&self) -> bool {
        !self.nodes.iter().any(PlanNode::has_changes)
    }

    /// Folds the arena back into a nested result. Dependent results with no
    /// changes are dropped.
    pub fn into_result(self) -> ReconciliationResult {
        let mut results: Vec<Option<ReconciliationResult>> = Vec::with_capacity(self.nodes.len());
        let mut owners = Vec::with_capacity(self.nodes.len());

        for node in self.nodes {
            owners.push(node.owner);
            results.push(Some(ReconciliationResult {
                kind: node.kind,
                deletions: node.deletions,
                creations: node.creations,
                edits: node.edits,
                dependents: BTreeMap::new(),
            }));
        }

        // Owners always precede their dependents
        for key in (1..results.len()).rev() {
            let Some(result) = results[key].take() else { continue };
            let Some((owner, child)) = owners[key] else { continue };
            if result.is_empty() {
                continue;
            }
            if let Some(parent) = results[owner].as_mut() {
                parent.dependents.entry(child).or_default().insert(0, result);
            }
        }

        results
            .into_iter()
            .next()
            .flatten()
            .unwrap_or_default()
    }
}

struct PendingNode {
    kind: String,
    fkey_field: String,
    parent: ParentRef,
    owner: Option<(NodeKey, ChildKey)>,
    specs: Vec<ChildSpec>,
    edit_key: Option<Vec<String>>,
}

enum SpecOutcome {
    Pending,
    Unchanged(Vec<RecordId>),
    Edited(RecordId),
    Created(usize),
}

pub(crate) async fn build_plan<S>(store: &S, request: ReconcileRequest) -> Result<ReconciliationPlan>
where
    S: RecordStore + ?Sized,
{
    let parent_kind = parent_kind_of(store.catalog(), &request.kind, &request.fkey_field)?;
    if !store.exists(&parent_kind, request.parent).await? {
        return Err(CuraError::not_found(parent_kind, request.parent));
    }

    let mut queue = VecDeque::from([PendingNode {
        kind: request.kind,
        fkey_field: request.fkey_field,
        parent: ParentRef::Existing(request.parent),
        owner: None,
        specs: request.specs,
        edit_key: request.edit_key,
    }]);
    let mut nodes = Vec::new();

    while let Some(pending) = queue.pop_front() {
        let key = nodes.len();
        let (node, children) = plan_node(store, key, pending).await?;
        nodes.push(node);
        queue.extend(children);
    }

    Ok(ReconciliationPlan { nodes })
}

async fn plan_node<S>(
    store: &S,
    key: NodeKey,
    pending: PendingNode,
) -> Result<(PlanNode, Vec<PendingNode>)>
where
    S: RecordStore + ?Sized,
{
    let PendingNode {
        kind,
        fkey_field,
        parent,
        owner,
        mut specs,
        edit_key,
    } = pending;

    let schema = store.catalog().get_table(&kind)?.schema().clone();
    if let Some(key_fields) = &edit_key {
        if let Some(undeclared) = key_fields.iter().find(|f| !schema.has_field(f)) {
            return Err(CuraError::MalformedInput(format!(
                "Edit key field '{}' is not declared by '{}'",
                undeclared, kind
            )));
        }
    }
    for spec in &mut specs {
        prepare_fields(store, &kind, &fkey_field, &schema, &mut spec.fields).await?;
    }

    let existing = match parent {
        ParentRef::Existing(id) => {
            let scope = FieldMap::from([(fkey_field.clone(), Value::Ref(id))]);
            store.find(&kind, &scope).await?
        }
        ParentRef::Created { .. } => Vec::new(),
    };

    let mut keep = BTreeSet::new();
    let mut outcomes: Vec<SpecOutcome> = specs.iter().map(|_| SpecOutcome::Pending).collect();

    // Unchanged: full equality on every spec field
    for (spec, outcome) in specs.iter().zip(outcomes.iter_mut()) {
        let matched: Vec<RecordId> = existing
            .iter()
            .filter(|record| record.matches(&spec.fields))
            .map(|record| record.id)
            .collect();
        if !matched.is_empty() {
            keep.extend(matched.iter().copied());
            *outcome = SpecOutcome::Unchanged(matched);
        }
    }

    // Edits: equality on the edit key only, lowest id wins
    let mut edits = Vec::new();
    if let Some(key_fields) = &edit_key {
        for (spec, outcome) in specs.iter().zip(outcomes.iter_mut()) {
            if !matches!(outcome, SpecOutcome::Pending) {
                continue;
            }
            let criteria: FieldMap = key_fields
                .iter()
                .map(|f| (f.clone(), spec.fields.get(f).cloned().unwrap_or(Value::Null)))
                .collect();
            let Some(target) = existing
                .iter()
                .find(|record| !keep.contains(&record.id) && record.matches(&criteria))
            else {
                continue;
            };

            let mut after = target.clone();
            after.fields.extend(spec.fields.clone());
            keep.insert(target.id);
            *outcome = SpecOutcome::Edited(target.id);
            edits.push(Edit {
                before: target.clone(),
                after,
            });
        }
    }

    let deletions: Vec<StoredRecord> = existing
        .into_iter()
        .filter(|record| !keep.contains(&record.id))
        .collect();

    let mut creations = Vec::new();
    for (spec, outcome) in specs.iter().zip(outcomes.iter_mut()) {
        if !matches!(outcome, SpecOutcome::Pending) {
            continue;
        }
        let mut fields = spec.fields.clone();
        if let ParentRef::Existing(id) = parent {
            fields.insert(fkey_field.clone(), Value::Ref(id));
        }
        *outcome = SpecOutcome::Created(creations.len());
        creations.push(CreatedRecord { id: None, fields });
    }

    let mut children = Vec::new();
    let mut seen = BTreeSet::new();
    for (spec, outcome) in specs.into_iter().zip(outcomes) {
        if !spec.has_dependents() {
            continue;
        }
        let groups = group_dependents(store.catalog(), &kind, spec.dependents, spec.declared)?;

        let owners: Vec<(ChildKey, ParentRef)> = match outcome {
            SpecOutcome::Unchanged(ids) => ids
                .into_iter()
                .map(|id| (ChildKey::Existing(id), ParentRef::Existing(id)))
                .collect(),
            SpecOutcome::Edited(id) => vec![(ChildKey::Existing(id), ParentRef::Existing(id))],
            SpecOutcome::Created(slot) => {
                vec![(ChildKey::Created(slot), ParentRef::Created { node: key, slot })]
            }
            SpecOutcome::Pending => Vec::new(),
        };

        for (child, parent) in owners {
            if !seen.insert(child) {
                continue;
            }
            for (group, dependent_specs) in &groups {
                let edit_key = store.catalog().get_table(&group.kind)?.edit_key.clone();
                children.push(PendingNode {
                    kind: group.kind.clone(),
                    fkey_field: group.fkey_field.clone(),
                    parent,
                    owner: Some((key, child)),
                    specs: dependent_specs.clone(),
                    edit_key,
                });
            }
        }
    }

    let node = PlanNode {
        kind,
        fkey_field,
        parent,
        owner,
        deletions,
        edits,
        creations,
    };
    Ok((node, children))
}

/// The kind `fkey_field` on `kind` points at.
fn parent_kind_of(catalog: &EntityCatalog, kind: &str, fkey_field: &str) -> Result<String> {
    let schema = catalog.get_table(kind)?.schema();
    match schema.get_field(fkey_field).map(|f| &f.data_type) {
        Some(DataType::Ref(parent_kind)) => Ok(parent_kind.clone()),
        Some(other) => Err(CuraError::MalformedInput(format!(
            "Field '{}' on '{}' is {}, not a reference",
            fkey_field, kind, other
        ))),
        None => Err(CuraError::MalformedInput(format!(
            "Field '{}' is not declared by '{}'",
            fkey_field, kind
        ))),
    }
}

/// Resolves reference fields and checks a child's fields against the kind's schema.
async fn prepare_fields<S>(
    store: &S,
    kind: &str,
    fkey_field: &str,
    schema: &Schema,
    fields: &mut FieldMap,
) -> Result<()>
where
    S: RecordStore + ?Sized,
{
    if fields.contains_key(fkey_field) {
        return Err(CuraError::MalformedInput(format!(
            "Spec for '{}' sets its own foreign key '{}'",
            kind, fkey_field
        )));
    }

    for (name, value) in fields.iter_mut() {
        let Some(field) = schema.get_field(name) else {
            return Err(CuraError::MalformedInput(format!(
                "Field '{}' is not declared by '{}'",
                name, kind
            )));
        };
        let DataType::Ref(target_kind) = &field.data_type else {
            continue;
        };

        let target = match &*value {
            Value::Null => continue,
            Value::Ref(id) => *id,
            Value::Integer(_) | Value::Text(_) => match value.as_i64() {
                Some(raw) if raw >= 0 => RecordId(raw as u64),
                _ => return Err(CuraError::not_found(target_kind.clone(), &*value)),
            },
            other => {
                return Err(CuraError::TypeMismatch(format!(
                    "Field '{}' expects a reference to {}, got {}",
                    name,
                    target_kind,
                    other.type_name()
                )));
            }
        };
        if !store.exists(target_kind, target).await? {
            return Err(CuraError::not_found(target_kind.clone(), target));
        }
        *value = Value::Ref(target);
    }

    let mut with_parent = fields.clone();
    with_parent.insert(fkey_field.to_string(), Value::Ref(RecordId(0)));
    schema.validate(kind, &with_parent)
}

/// Splits a child's dependents into groups keyed by kind, checking that each
/// group points back at `owner_kind` and that its specs share one field set.
fn group_dependents(
    catalog: &EntityCatalog,
    owner_kind: &str,
    dependents: Vec<DependentSpec>,
    declared: Vec<DependentGroup>,
) -> Result<Vec<(DependentGroup, Vec<ChildSpec>)>> {
    let mut groups: BTreeMap<String, (DependentGroup, Vec<ChildSpec>)> = BTreeMap::new();

    let mut register = |group: DependentGroup| -> Result<()> {
        match groups.get(&group.kind) {
            Some((known, _)) if known.fkey_field != group.fkey_field => {
                Err(CuraError::MalformedInput(format!(
                    "Dependents of kind '{}' use both '{}' and '{}' as foreign key",
                    group.kind, known.fkey_field, group.fkey_field
                )))
            }
            Some(_) => Ok(()),
            None => {
                let target = parent_kind_of(catalog, &group.kind, &group.fkey_field)?;
                if target != owner_kind {
                    return Err(CuraError::MalformedInput(format!(
                        "Field '{}' on '{}' points at '{}', not '{}'",
                        group.fkey_field, group.kind, target, owner_kind
                    )));
                }
                groups.insert(group.kind.clone(), (group, Vec::new()));
                Ok(())
            }
        }
    };

    for group in declared {
        register(group)?;
    }
    for dependent in &dependents {
        register(dependent.group())?;
    }

    for dependent in dependents {
        if let Some((_, specs)) = groups.get_mut(&dependent.kind) {
            if let Some(first) = specs.first() {
                if !first.fields.keys().eq(dependent.fields.keys()) {
                    return Err(CuraError::MalformedInput(format!(
                        "Dependents of kind '{}' carry different field sets",
                        dependent.kind
                    )));
                }
            }
            specs.push(ChildSpec::new(dependent.fields));
        }
    }

    Ok(groups.into_values().collect())
}
