use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

use thiserror::Error;

use crate::{
    block::{Block, BlockHash},
    config::SimConfig,
    peer::PeerId,
    simulation::SimTime,
    transaction::TxPool,
};

/// Balance rules every block is validated against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LedgerParams {
    pub num_peers: usize,
    pub initial_balance: f64,
    pub mining_reward: f64,
}

impl LedgerParams {
    pub fn from_config(config: &SimConfig, num_peers: usize) -> Self {
        Self {
            num_peers,
            initial_balance: config.initial_balance,
            mining_reward: config.mining_reward,
        }
    }
}

/// Progress of fetching a block whose hash was announced to us.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum RequestState {
    /// No GET in flight.
    #[default]
    Idle,
    /// A GET was sent to `suppliers[0]`, which has until `deadline` to
    /// answer. The remaining suppliers are asked in order after that.
    AwaitingResponse {
        suppliers: VecDeque<PeerId>,
        deadline: SimTime,
    },
}

static IDLE: RequestState = RequestState::Idle;

/// Outcome of a successful [`Blockchain::insert`].
#[derive(Debug, Clone, PartialEq)]
pub enum Insertion {
    /// The hash was already known; nothing changed.
    Duplicate,
    /// The block's ancestry is incomplete, so it was set aside until its
    /// parent arrives.
    Buffered,
    /// The block was linked into the tree.
    Accepted {
        /// True if the preferred leaf moved.
        leaf_changed: bool,
        /// Previously buffered blocks that were linked as a consequence,
        /// in the order they were released.
        released: Vec<BlockHash>,
    },
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationError {
    #[error("parent block {0} is not part of the chain")]
    ParentNotFound(BlockHash),
    #[error("ancestor {0} is not connected to the genesis block")]
    OrphanAncestor(BlockHash),
    #[error("transaction references unknown peer {0}")]
    UnknownPeer(PeerId),
    #[error("peer {peer} ends with negative balance {balance}")]
    NegativeBalance { peer: PeerId, balance: f64 },
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum BlockInsertionError {
    #[error("block rejected")]
    Rejected(#[from] ValidationError),
    #[error("block descends from rejected block {0}")]
    RejectedAncestor(BlockHash),
}

/// One peer's view of the block tree.
///
/// Holds every accepted block across all branches, the frontier of leaf
/// blocks and the preferred (highest) leaf, along with buffered orphans and
/// the per-hash fetch state used by the owning peer.
#[derive(Debug, Clone)]
pub struct Blockchain {
    params: LedgerParams,
    blocks: HashMap<BlockHash, Block>,
    parent_of: HashMap<BlockHash, BlockHash>,
    children_of: HashMap<BlockHash, Vec<BlockHash>>,
    leaf_blocks: BTreeSet<BlockHash>,
    current_leaf: BlockHash,
    orphans: BTreeMap<BlockHash, Block>,
    rejected: HashSet<BlockHash>,
    first_seen: HashMap<BlockHash, SimTime>,
    requests: HashMap<BlockHash, RequestState>,
    revealed: HashSet<BlockHash>,
}

impl Blockchain {
    /// Creates an empty ledger. The genesis block must be inserted before
    /// any other block can be linked.
    pub fn new(params: LedgerParams) -> Self {
        Blockchain {
            params,
            blocks: HashMap::new(),
            parent_of: HashMap::new(),
            children_of: HashMap::new(),
            leaf_blocks: BTreeSet::new(),
            current_leaf: BlockHash::genesis(),
            orphans: BTreeMap::new(),
            rejected: HashSet::new(),
            first_seen: HashMap::new(),
            requests: HashMap::new(),
            revealed: HashSet::new(),
        }
    }

    /// Creates a ledger which already holds the genesis block.
    pub fn with_genesis(params: LedgerParams) -> Self {
        let mut chain = Self::new(params);
        chain.insert_genesis(0.0);
        chain
    }

    /// Inserts the genesis block and marks it public.
    pub fn insert_genesis(&mut self, arrival: SimTime) {
        let mut pool = TxPool::new();
        let inserted = self.insert(Block::genesis(), arrival, &mut pool);
        debug_assert!(inserted.is_ok(), "genesis rejected: {:?}", inserted);
        self.revealed.insert(BlockHash::genesis());
    }

    #[inline]
    pub fn params(&self) -> &LedgerParams {
        &self.params
    }

    /// Returns true iff `hash` names an accepted block.
    #[inline]
    pub fn contains(&self, hash: &BlockHash) -> bool {
        self.blocks.contains_key(hash)
    }

    /// Returns true iff `hash` was seen before, whether it was accepted,
    /// buffered as an orphan, or rejected.
    pub fn knows(&self, hash: &BlockHash) -> bool {
        self.blocks.contains_key(hash)
            || self.orphans.contains_key(hash)
            || self.rejected.contains(hash)
    }

    #[inline]
    pub fn is_orphan(&self, hash: &BlockHash) -> bool {
        self.orphans.contains_key(hash)
    }

    /// Returns the accepted block with the given hash.
    #[inline]
    pub fn get(&self, hash: &BlockHash) -> Option<&Block> {
        self.blocks.get(hash)
    }

    /// Returns the block with the given hash, whether accepted or buffered.
    pub fn lookup(&self, hash: &BlockHash) -> Option<&Block> {
        self.blocks.get(hash).or_else(|| self.orphans.get(hash))
    }

    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.blocks.values()
    }

    #[inline]
    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    pub fn num_orphans(&self) -> usize {
        self.orphans.len()
    }

    pub fn parent_of(&self, hash: &BlockHash) -> Option<&BlockHash> {
        self.parent_of.get(hash)
    }

    pub fn children(&self, hash: &BlockHash) -> &[BlockHash] {
        self.children_of.get(hash).map_or(&[], |c| c.as_slice())
    }

    /// Hashes of every block with no known child.
    pub fn leaf_blocks(&self) -> &BTreeSet<BlockHash> {
        &self.leaf_blocks
    }

    /// Hash of the tip of the preferred chain.
    #[inline]
    pub fn current_leaf(&self) -> &BlockHash {
        &self.current_leaf
    }

    /// Height of the tip of the preferred chain.
    pub fn current_height(&self) -> u64 {
        self.blocks.get(&self.current_leaf).map_or(0, Block::height)
    }

    /// Number of blocks on the preferred chain, genesis included.
    pub fn longest_chain_height(&self) -> u64 {
        self.current_height() + 1
    }

    /// Simulated time at which `hash` first reached this ledger.
    pub fn first_seen(&self, hash: &BlockHash) -> Option<SimTime> {
        self.first_seen.get(hash).copied()
    }

    /// Blocks on the preferred chain in order from the block after genesis
    /// to the current leaf.
    pub fn current_chain(&self) -> Vec<&Block> {
        let mut chain = vec![];

        let mut curr = &self.current_leaf;
        while !curr.is_genesis() {
            let Some(block) = self.blocks.get(curr) else { break };
            chain.push(block);
            curr = block.parent();
        }

        chain.reverse();
        chain
    }

    /// Tab-separated record of every accepted block except genesis, ordered
    /// by hash: hash, parent, `Malicious` or `Honest`, first-seen time and
    /// height.
    pub fn dump<F>(&self, is_malicious: F) -> String
    where
        F: Fn(&Block) -> bool,
    {
        let mut blocks: Vec<_> =
            self.blocks.values().filter(|b| !b.is_genesis()).collect();
        blocks.sort_by(|a, b| a.hash().cmp(b.hash()));

        let mut out = String::new();
        for block in blocks {
            let class = if is_malicious(block) { "Malicious" } else { "Honest" };
            let seen = self.first_seen(block.hash()).unwrap_or_default();
            out.push_str(&format!(
                "{}\t{}\t{}\t{:.6}\t{}\n",
                block.hash(),
                block.parent(),
                class,
                seen,
                block.height()
            ));
        }

        out
    }

    /// Checks that `block` extends an accepted block and that replaying the
    /// chain it completes leaves no peer with a negative balance.
    pub fn validate(&self, block: &Block) -> Result<(), ValidationError> {
        use ValidationError::*;

        if !self.blocks.contains_key(block.parent()) {
            return Err(ParentNotFound(block.parent().clone()));
        }

        let balances = self.replay(block)?;
        match balances.iter().enumerate().find(|(_, &b)| b < 0.0) {
            Some((peer, &balance)) => {
                Err(NegativeBalance { peer: peer.into(), balance })
            }
            None => Ok(()),
        }
    }

    /// Balance of every peer at the tip of the preferred chain.
    pub fn balances(&self) -> Vec<f64> {
        match self.blocks.get(&self.current_leaf) {
            // The preferred chain is connected by construction
            Some(leaf) => self.replay(leaf).unwrap_or_else(|_| {
                vec![self.params.initial_balance; self.params.num_peers]
            }),
            None => vec![self.params.initial_balance; self.params.num_peers],
        }
    }

    /// Balance of `peer` at the tip of the preferred chain.
    pub fn peer_balance(&self, peer: PeerId) -> f64 {
        self.balances()
            .get(peer.get())
            .copied()
            .unwrap_or(self.params.initial_balance)
    }

    /// Replays `tip` and all its ancestors down to (excluding) genesis.
    fn replay(&self, tip: &Block) -> Result<Vec<f64>, ValidationError> {
        use ValidationError::*;

        let LedgerParams { num_peers, initial_balance, mining_reward } =
            self.params;
        let mut balances = vec![initial_balance; num_peers];

        let mut curr = tip;
        loop {
            for txn in curr.txns() {
                *balances
                    .get_mut(txn.sender.get())
                    .ok_or(UnknownPeer(txn.sender))? -= txn.amount;
                *balances
                    .get_mut(txn.receiver.get())
                    .ok_or(UnknownPeer(txn.receiver))? += txn.amount;
            }
            if let Some(miner) = curr.miner() {
                *balances.get_mut(miner.get()).ok_or(UnknownPeer(miner))? +=
                    mining_reward;
            }

            let parent = curr.parent();
            if curr.is_genesis() || parent.is_genesis() {
                break;
            }
            curr = self
                .blocks
                .get(parent)
                .ok_or_else(|| OrphanAncestor(parent.clone()))?;
        }

        Ok(balances)
    }

    /// Adds `block` to the tree, keeping `pool` consistent with the
    /// preferred chain.
    ///
    /// Known hashes are ignored. Blocks whose parent is not yet accepted are
    /// buffered and linked once the parent is inserted; the hashes released
    /// this way are reported in [`Insertion::Accepted`].
    pub fn insert(
        &mut self,
        block: Block,
        arrival: SimTime,
        pool: &mut TxPool,
    ) -> Result<Insertion, BlockInsertionError> {
        let hash = block.hash().clone();
        if self.knows(&hash) {
            return Ok(Insertion::Duplicate);
        }
        self.first_seen.entry(hash.clone()).or_insert(arrival);

        if !block.is_genesis() && !self.blocks.contains_key(block.parent()) {
            if self.rejected.contains(block.parent()) {
                let parent = block.parent().clone();
                self.rejected.insert(hash);
                return Err(BlockInsertionError::RejectedAncestor(parent));
            }
            self.orphans.insert(hash, block);
            return Ok(Insertion::Buffered);
        }

        let old_leaf = self.current_leaf.clone();
        if let Err(e) = self.link(block, pool) {
            self.reject_orphans_below(hash);
            return Err(e);
        }

        let mut released = vec![];
        let mut worklist = VecDeque::from([hash]);
        while let Some(parent) = worklist.pop_front() {
            for child in self.orphans_of(&parent) {
                let Some(block) = self.orphans.remove(&child) else {
                    continue;
                };
                match self.link(block, pool) {
                    Ok(()) => {
                        released.push(child.clone());
                        worklist.push_back(child);
                    }
                    Err(_) => self.reject_orphans_below(child),
                }
            }
        }

        Ok(Insertion::Accepted {
            leaf_changed: old_leaf != self.current_leaf,
            released,
        })
    }

    /// Buffered blocks whose parent is `parent`.
    fn orphans_of(&self, parent: &BlockHash) -> Vec<BlockHash> {
        self.orphans
            .iter()
            .filter(|(_, block)| block.parent() == parent)
            .map(|(hash, _)| hash.clone())
            .collect()
    }

    /// Drops every buffered descendant of the rejected block `root`.
    fn reject_orphans_below(&mut self, root: BlockHash) {
        let mut worklist = vec![root];
        while let Some(parent) = worklist.pop() {
            for child in self.orphans_of(&parent) {
                self.orphans.remove(&child);
                self.rejected.insert(child.clone());
                worklist.push(child);
            }
        }
    }

    /// Validates and links a block whose parent is accepted, then updates
    /// the preferred leaf.
    fn link(
        &mut self,
        block: Block,
        pool: &mut TxPool,
    ) -> Result<(), BlockInsertionError> {
        let hash = block.hash().clone();

        if !block.is_genesis() {
            if let Err(e) = self.validate(&block) {
                self.rejected.insert(hash);
                return Err(e.into());
            }

            let parent = block.parent().clone();
            self.leaf_blocks.remove(&parent);
            self.children_of.entry(parent.clone()).or_default().push(hash.clone());
            self.parent_of.insert(hash.clone(), parent);
        }

        let prev_leaf = self.current_leaf.clone();
        if &self.current_leaf == block.parent() {
            self.current_leaf = hash.clone();
        }
        self.leaf_blocks.insert(hash.clone());
        self.blocks.insert(hash.clone(), block);

        // Only a strictly higher leaf displaces the current one
        let mut max_height = self.current_height();
        for leaf in &self.leaf_blocks {
            let height = self.blocks.get(leaf).map_or(0, Block::height);
            if height > max_height {
                max_height = height;
                self.current_leaf = leaf.clone();
            }
        }

        if prev_leaf != self.current_leaf {
            let new_leaf = self.current_leaf.clone();
            self.reconcile(prev_leaf, new_leaf, pool);
        }
        if self.current_leaf == hash {
            if let Some(block) = self.blocks.get(&hash) {
                for txn in block.txns() {
                    pool.remove(txn.id);
                }
            }
        }

        Ok(())
    }

    /// Moves the pool from the chain ending at `old` to the chain ending at
    /// `new`: transactions only on the abandoned side go back to the pool,
    /// transactions on the adopted side leave it.
    fn reconcile(&self, old: BlockHash, new: BlockHash, pool: &mut TxPool) {
        let (Some(mut old), Some(mut new)) =
            (self.blocks.get(&old), self.blocks.get(&new))
        else {
            return;
        };

        while old.height() > new.height() {
            self.restore(old, pool);
            let Some(parent) = self.blocks.get(old.parent()) else { return };
            old = parent;
        }
        while new.height() > old.height() {
            self.consume(new, pool);
            let Some(parent) = self.blocks.get(new.parent()) else { return };
            new = parent;
        }
        while old.hash() != new.hash() {
            self.restore(old, pool);
            self.consume(new, pool);
            match (self.blocks.get(old.parent()), self.blocks.get(new.parent()))
            {
                (Some(o), Some(n)) => {
                    old = o;
                    new = n;
                }
                _ => return,
            }
        }
    }

    fn restore(&self, block: &Block, pool: &mut TxPool) {
        for txn in block.txns() {
            pool.insert(txn.clone());
        }
    }

    fn consume(&self, block: &Block, pool: &mut TxPool) {
        for txn in block.txns() {
            pool.remove(txn.id);
        }
    }

    /// Fetch state of `hash`.
    pub fn request(&self, hash: &BlockHash) -> &RequestState {
        self.requests.get(hash).unwrap_or(&IDLE)
    }

    pub fn request_mut(&mut self, hash: &BlockHash) -> &mut RequestState {
        self.requests.entry(hash.clone()).or_default()
    }

    pub fn clear_request(&mut self, hash: &BlockHash) {
        self.requests.remove(hash);
    }

    /// Returns true if `hash` is known to have reached honest peers.
    #[inline]
    pub fn is_revealed(&self, hash: &BlockHash) -> bool {
        self.revealed.contains(hash)
    }

    pub fn reveal(&mut self, hash: BlockHash) {
        self.revealed.insert(hash);
    }
}
