use super::plan::{ParentRef, PlanNode, build_plan};
use super::{ReconcileRequest, ReconciliationPlan, ReconciliationResult};
use crate::core::{CuraError, RecordId, Result, Value};
use crate::storage::RecordStore;
use crate::transaction::TransactionId;
use std::sync::Arc;
use tracing::{Instrument, Level, event, info_span};

/// Diffs submitted child specs against stored rows and optionally applies
/// the difference in one transaction.
pub struct Reconciler<S: RecordStore> {
    store: Arc<S>,
}

impl<S: RecordStore> Clone for Reconciler<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: RecordStore> Reconciler<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Computes what would change. Reads the store, never writes it.
    pub async fn plan(&self, request: ReconcileRequest) -> Result<ReconciliationPlan> {
        build_plan(self.store.as_ref(), request).await
    }

    /// Applies a plan atomically and fills in the ids of created records.
    /// On any failure every write made so far is rolled back.
    pub async fn apply(&self, plan: &mut ReconciliationPlan) -> Result<()> {
        let txn = self.store.begin().await?;

        match self.apply_in(txn, plan).await {
            Ok(()) => self.store.commit(txn).await,
            Err(err) => {
                if let Err(rollback_err) = self.store.rollback(txn).await {
                    event!(Level::ERROR, %txn, error = %rollback_err, "reconcile rollback failed");
                }
                event!(Level::WARN, %txn, error = %err, "reconcile aborted");
                Err(err)
            }
        }
    }

    /// Plans and, when `commit` is set, applies.
    pub async fn reconcile(
        &self,
        request: ReconcileRequest,
        commit: bool,
    ) -> Result<ReconciliationResult> {
        let span = info_span!(
            "reconcile",
            kind = %request.kind,
            parent = %request.parent,
            commit
        );

        async move {
            let mut plan = self.plan(request).await?;
            if commit && !plan.is_empty() {
                self.apply(&mut plan).await?;
            }

            let result = plan.into_result();
            event!(
                Level::DEBUG,
                deletions = result.deletions.len(),
                creations = result.creations.len(),
                edits = result.edits.len(),
                total_changes = result.change_count(),
                "reconcile planned"
            );
            Ok(result)
        }
        .instrument(span)
        .await
    }

    // Root: deletions, edits, creations. Then the same three phases across
    // all dependent nodes in arena order.
    async fn apply_in(&self, txn: TransactionId, plan: &mut ReconciliationPlan) -> Result<()> {
        let nodes = plan.nodes_mut();
        let Some((root, dependents)) = nodes.split_first_mut() else {
            return Ok(());
        };

        self.delete_all(txn, root).await?;
        self.edit_all(txn, root).await?;
        self.create_all(txn, root, None).await?;

        for node in dependents.iter() {
            self.delete_all(txn, node).await?;
        }
        for node in dependents.iter() {
            self.edit_all(txn, node).await?;
        }
        for key in 1..nodes.len() {
            let parent_id = match nodes[key].parent {
                ParentRef::Existing(id) => id,
                ParentRef::Created { node, slot } => created_id(nodes, node, slot)?,
            };
            self.create_all(txn, &mut nodes[key], Some(parent_id)).await?;
        }
        Ok(())
    }

    async fn delete_all(&self, txn: TransactionId, node: &PlanNode) -> Result<()> {
        for record in &node.deletions {
            self.store.delete(txn, &node.kind, record.id).await?;
        }
        Ok(())
    }

    async fn edit_all(&self, txn: TransactionId, node: &PlanNode) -> Result<()> {
        for edit in &node.edits {
            self.store
                .update(txn, &node.kind, edit.after.id, edit.after.fields.clone())
                .await?;
        }
        Ok(())
    }

    async fn create_all(
        &self,
        txn: TransactionId,
        node: &mut PlanNode,
        parent_id: Option<RecordId>,
    ) -> Result<()> {
        for creation in &mut node.creations {
            if let Some(parent_id) = parent_id {
                creation
                    .fields
                    .insert(node.fkey_field.clone(), Value::Ref(parent_id));
            }
            let id = self
                .store
                .insert(txn, &node.kind, creation.fields.clone())
                .await?;
            creation.id = Some(id);
        }
        Ok(())
    }
}

fn created_id(nodes: &[PlanNode], node: usize, slot: usize) -> Result<RecordId> {
    nodes
        .get(node)
        .and_then(|n| n.creations.get(slot))
        .and_then(|c| c.id)
        .ok_or_else(|| {
            CuraError::ExecutionError(format!(
                "Parent slot {} of plan node {} has no id yet",
                slot, node
            ))
        })
}
