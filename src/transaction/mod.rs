// ============================================================================
// Transaction Management Module
// ============================================================================
//
// All-or-nothing grouping of record writes. Writes are applied to storage
// immediately and logged as reversible Changes (Command Pattern); ROLLBACK
// replays the log backwards.
//
// ============================================================================

pub mod change;
pub mod manager;
pub mod state;

pub use change::Change;
pub use manager::{TransactionInfo, TransactionManager};
pub use state::{Transaction, TransactionId, TransactionState};
