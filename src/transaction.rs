//! Transactions and the pending-transaction pool.

use std::{
    collections::BTreeMap,
    fmt::{self, Display},
};

use crate::peer::PeerId;

/// Unique identifier of a [`Transaction`] within one simulation.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TxnId(pub(crate) u64);

impl TxnId {
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl From<u64> for TxnId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// A payment of `amount` coins from `sender` to `receiver`.
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub id: TxnId,
    pub sender: PeerId,
    pub receiver: PeerId,
    pub amount: f64,
}

impl Transaction {
    pub fn new(
        id: TxnId,
        sender: PeerId,
        receiver: PeerId,
        amount: f64,
    ) -> Self {
        Self { id, sender, receiver, amount }
    }
}

/// Canonical text form, which is what block hashes are computed over.
impl Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} pays {} {:.6} coins",
            self.id, self.sender, self.receiver, self.amount
        )
    }
}

/// Pending transactions of a single peer, deduplicated by [`TxnId`].
///
/// Iteration yields the newest (highest id) transaction first.
#[derive(Debug, Clone, Default)]
pub struct TxPool {
    txns: BTreeMap<TxnId, Transaction>,
}

impl TxPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `txn` unless a transaction with the same id is already pooled.
    /// Returns true if the pool changed.
    pub fn insert(&mut self, txn: Transaction) -> bool {
        if self.txns.contains_key(&txn.id) {
            return false;
        }
        self.txns.insert(txn.id, txn);
        true
    }

    pub fn remove(&mut self, id: TxnId) -> Option<Transaction> {
        self.txns.remove(&id)
    }

    #[inline]
    pub fn contains(&self, id: TxnId) -> bool {
        self.txns.contains_key(&id)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.txns.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.txns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Transaction> {
        self.txns.values().rev()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn txn(id: u64, amount: f64) -> Transaction {
        Transaction::new(id.into(), 0.into(), 1.into(), amount)
    }

    #[test]
    fn display_matches_hashing_format() {
        assert_eq!(txn(7, 2.5).to_string(), "7: 0 pays 1 2.500000 coins");
    }

    #[test]
    fn pool_deduplicates_by_id() {
        let mut pool = TxPool::new();

        assert!(pool.insert(txn(1, 1.0)));
        assert!(!pool.insert(txn(1, 9.0)));
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.iter().next().unwrap().amount, 1.0);
    }

    #[test]
    fn pool_iterates_newest_first() {
        let mut pool = TxPool::new();
        for id in [3, 1, 2] {
            pool.insert(txn(id, 1.0));
        }

        let ids: Vec<_> = pool.iter().map(|t| t.id.get()).collect();
        assert_eq!(ids, vec![3, 2, 1]);
    }
}
