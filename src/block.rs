use std::{
    cell::OnceCell,
    fmt::{self, Display},
};

use crate::{
    hash::digest, peer::PeerId, simulation::SimTime, transaction::Transaction,
};

/// Content-addressed identity of a [`Block`], as a hex SHA-256 digest.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockHash(String);

impl BlockHash {
    /// The well-known hash of every peer's genesis block.
    pub const GENESIS: &'static str = "genesis";

    pub fn genesis() -> Self {
        Self(Self::GENESIS.to_string())
    }

    #[inline]
    pub fn is_genesis(&self) -> bool {
        self.0 == Self::GENESIS
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for BlockHash {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for BlockHash {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Representation of a mined block of transactions.
///
/// Fields are fixed at construction. The header hash is computed on first
/// access and cached, so it is never recomputed for the same instance.
#[derive(Debug, Clone)]
pub struct Block {
    txns: Vec<Transaction>,
    /// `None` only for the genesis block.
    miner: Option<PeerId>,
    height: u64,
    parent: BlockHash,
    timestamp: SimTime,
    hash: OnceCell<BlockHash>,
}

impl Block {
    pub fn new(
        txns: Vec<Transaction>,
        miner: PeerId,
        height: u64,
        parent: BlockHash,
        timestamp: SimTime,
    ) -> Self {
        Block {
            txns,
            miner: Some(miner),
            height,
            parent,
            timestamp,
            hash: OnceCell::new(),
        }
    }

    /// The genesis block: height 0, no miner, and its own hash as parent.
    pub fn genesis() -> Self {
        let hash = OnceCell::from(BlockHash::genesis());
        Block {
            txns: vec![],
            miner: None,
            height: 0,
            parent: BlockHash::genesis(),
            timestamp: 0.0,
            hash,
        }
    }

    #[inline]
    pub fn is_genesis(&self) -> bool {
        self.hash().is_genesis()
    }

    #[inline]
    pub fn txns(&self) -> &[Transaction] {
        &self.txns
    }

    #[inline]
    pub fn miner(&self) -> Option<PeerId> {
        self.miner
    }

    #[inline]
    pub fn height(&self) -> u64 {
        self.height
    }

    #[inline]
    pub fn parent(&self) -> &BlockHash {
        &self.parent
    }

    #[inline]
    pub fn timestamp(&self) -> SimTime {
        self.timestamp
    }

    /// Returns the header hash, computing it on first use.
    pub fn hash(&self) -> &BlockHash {
        self.hash.get_or_init(|| {
            let body: String = self.txns.iter().map(|t| t.to_string()).collect();
            let miner = self.miner.map_or(-1, |m| m.get() as i64);

            let header = format!(
                "{}{}{}{}{:.6}",
                digest(&body),
                miner,
                self.height,
                self.parent,
                self.timestamp
            );
            BlockHash(digest(&header))
        })
    }
}

impl PartialEq for Block {
    fn eq(&self, other: &Self) -> bool {
        self.hash() == other.hash()
    }
}

impl Eq for Block {}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(miner: usize, timestamp: SimTime) -> Block {
        let txn = Transaction::new(0.into(), 0.into(), 1.into(), 5.0);
        Block::new(vec![txn], miner.into(), 1, BlockHash::genesis(), timestamp)
    }

    #[test]
    fn identical_fields_identical_hash() {
        assert_eq!(block(2, 1.5).hash(), block(2, 1.5).hash());
        assert_ne!(block(2, 1.5).hash(), block(3, 1.5).hash());
        assert_ne!(block(2, 1.5).hash(), block(2, 1.25).hash());
    }

    #[test]
    fn hash_is_cached() {
        let b = block(1, 0.0);
        let first = b.hash() as *const BlockHash;
        let second = b.hash() as *const BlockHash;

        assert_eq!(first, second);
        assert_eq!(b.hash().as_str().len(), 64);
    }

    #[test]
    fn genesis_block() {
        let g = Block::genesis();

        assert!(g.is_genesis());
        assert_eq!(g.height(), 0);
        assert_eq!(g.miner(), None);
        assert_eq!(g.hash().as_str(), BlockHash::GENESIS);
        assert_eq!(g.parent(), g.hash());
    }
}
