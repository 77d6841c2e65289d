// Pending Pool - transactions accepted locally but not yet in any block

use crate::tx::{SignedTransaction, TransactionId};
use std::collections::{HashMap, VecDeque};

/// Arrival-ordered set of pending transactions, keyed by id
#[derive(Clone, Debug, Default)]
pub struct PendingPool {
    entries: HashMap<TransactionId, SignedTransaction>,
    order: VecDeque<TransactionId>,
}

impl PendingPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a transaction; returns false if its id is already pending
    pub fn insert(&mut self, tx: SignedTransaction) -> bool {
        if self.entries.contains_key(tx.id()) {
            return false;
        }
        self.order.push_back(tx.id().clone());
        self.entries.insert(tx.id().clone(), tx);
        true
    }

    /// Remove a transaction once it has been executed
    pub fn remove(&mut self, id: &TransactionId) -> Option<SignedTransaction> {
        let tx = self.entries.remove(id)?;
        self.order.retain(|pending| pending != id);
        Some(tx)
    }

    pub fn contains(&self, id: &TransactionId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drain every pending transaction in arrival order
    ///
    /// Used by the proposer: the taken entries leave the pool in the same
    /// critical section that reads them.
    pub fn take_all(&mut self) -> Vec<SignedTransaction> {
        let mut taken = Vec::with_capacity(self.entries.len());
        for id in self.order.drain(..) {
            if let Some(tx) = self.entries.remove(&id) {
                taken.push(tx);
            }
        }
        taken
    }
}
