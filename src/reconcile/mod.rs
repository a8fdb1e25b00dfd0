// ============================================================================
// Dynamic Relation Reconciler
// ============================================================================
//
// Given a parent record and the child rows a sub-form says it should own,
// works out which stored rows stay, which are edited in place, which are
// deleted and which are created, recursing into dependent collections.
//
// ============================================================================

pub mod plan;
pub mod reconciler;
pub mod result;
pub mod spec;

pub use plan::{NodeKey, ParentRef, PlanNode, ReconciliationPlan};
pub use reconciler::Reconciler;
pub use result::{ChildKey, CreatedRecord, Edit, ReconciliationResult};
pub use spec::{ChildSpec, DependentGroup, DependentSpec, ReconcileRequest};
