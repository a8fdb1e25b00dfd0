// ============================================================================
// Cura Library
// ============================================================================
//
// Dynamic sub-form reconciliation and the issue changelog for the Cura CRM.
//
// ============================================================================

pub mod best_effort;
pub mod changelog;
pub mod collections;
pub mod config;
pub mod core;
pub mod display;
pub mod expression;
pub mod forms;
pub mod history;
pub mod notes;
pub mod reconcile;
pub mod storage;
pub mod transaction;

// Re-export main types for convenience
pub use config::CuraConfig;
pub use core::{CuraError, FieldMap, RecordId, Result, StoredRecord, ValidationErrors, Value};
pub use display::{DefaultDisplay, DisplayFormat};
pub use reconcile::{ChildSpec, DependentSpec, ReconcileRequest, ReconciliationResult, Reconciler};
pub use storage::{EntityCatalog, InMemoryStorage, RecordStore, StoreSnapshot};
