// ============================================================================
// Transaction Manager
// ============================================================================

use super::{Change, Transaction, TransactionId, TransactionState};
use crate::core::{CuraError, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{Level, event};

/// Tracks open transactions and their undo logs.
///
/// There is no isolation between transactions: writes are visible as soon as
/// they are applied, and two transactions touching the same rows simply race.
pub struct TransactionManager {
    transactions: Arc<RwLock<HashMap<TransactionId, Transaction>>>,
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionManager {
    pub fn new() -> Self {
        Self {
            transactions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn begin(&self) -> Result<TransactionId> {
        let transaction_id = TransactionId::new();
        let mut transactions = self.transactions.write().await;
        transactions.insert(transaction_id, Transaction::new(transaction_id));
        event!(Level::DEBUG, txn = %transaction_id, "transaction started");
        Ok(transaction_id)
    }

    pub async fn record_change(&self, txn_id: TransactionId, change: Change) -> Result<()> {
        let mut transactions = self.transactions.write().await;
        let transaction = transactions
            .get_mut(&txn_id)
            .ok_or_else(|| CuraError::ExecutionError(format!("Transaction {} not found", txn_id)))?;
        transaction.record_change(change)
    }

    pub async fn commit(&self, txn_id: TransactionId) -> Result<()> {
        let mut transactions = self.transactions.write().await;
        let transaction = transactions
            .get_mut(&txn_id)
            .ok_or_else(|| CuraError::ExecutionError(format!("Transaction {} not found", txn_id)))?;

        if transaction.state() != TransactionState::Active {
            return Err(CuraError::ExecutionError("Transaction not active".into()));
        }

        let change_count = transaction.change_count();
        transaction.commit()?;
        transactions.remove(&txn_id);
        event!(Level::DEBUG, txn = %txn_id, change_count, "transaction committed");
        Ok(())
    }

    /// Closes the transaction and returns its undo log (newest first) for the
    /// storage layer to replay. Unknown ids yield an empty log.
    pub async fn rollback(&self, txn_id: TransactionId) -> Result<Vec<Change>> {
        let mut transactions = self.transactions.write().await;

        let Some(mut transaction) = transactions.remove(&txn_id) else {
            return Ok(Vec::new());
        };
        let undo = transaction.rollback()?;
        event!(Level::DEBUG, txn = %txn_id, undo = undo.len(), "transaction rolled back");
        Ok(undo)
    }

    pub async fn is_active(&self, txn_id: TransactionId) -> bool {
        self.transactions.read().await.contains_key(&txn_id)
    }

    pub async fn get_transaction_info(
        &self,
        txn_id: TransactionId,
    ) -> Result<Option<TransactionInfo>> {
        let transactions = self.transactions.read().await;
        Ok(transactions.get(&txn_id).map(|txn| TransactionInfo {
            id: txn.id(),
            state: txn.state(),
            change_count: txn.change_count(),
            duration: txn.duration(),
        }))
    }
}

pub struct TransactionInfo {
    pub id: TransactionId,
    pub state: TransactionState,
    pub change_count: usize,
    pub duration: std::time::Duration,
}
