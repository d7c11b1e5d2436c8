/*!
Peers and the protocol they run

Every [`Peer`] owns its own [`Blockchain`] and transaction pool. Peers never
touch each other's state: all interaction goes through events scheduled on
the [`Context`] passed to each handler.

Honest peers mine on their preferred chain, relay transactions and announce
blocks by hash, fetching unknown blocks with GET requests that are retried
on other announcers after a timeout. Malicious peers collude over a private
overlay: the ring leader mines a withheld chain and releases it when the
public chain catches up, and with the eclipse attack enabled its colluders
refuse to serve blocks to honest peers. With the countermeasure enabled,
honest peers keep a [`TrustRecord`] per neighbour and delay or refuse
exchanges with neighbours that failed them before.
*/

pub mod trust;

pub use trust::{Admission, TrustRecord};

use std::{
    collections::{BTreeMap, BTreeSet, HashSet, VecDeque},
    fmt::{self, Display},
};

use rand::Rng;
use tracing::{debug, info, trace};

use crate::{
    block::{Block, BlockHash},
    blockchain::{Blockchain, Insertion, LedgerParams, RequestState},
    config::TrustParams,
    event::{Event, EventKind},
    simulation::{Context, SimTime},
    transaction::{Transaction, TxPool, TxnId},
    utils::uniform,
};

/// Index of a [`Peer`] within its simulation.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PeerId(pub(crate) usize);

impl PeerId {
    pub fn get(&self) -> usize {
        self.0
    }
}

impl From<usize> for PeerId {
    fn from(value: usize) -> Self {
        Self(value)
    }
}

impl Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// Candidate block being mined, with the leaf it extends.
#[derive(Debug, Clone)]
struct MiningTask {
    candidate: Block,
    parent: BlockHash,
}

/// A participant of the simulated network.
#[derive(Debug, Clone)]
pub struct Peer {
    id: PeerId,
    malicious: bool,
    hashing_power: f64,
    neighbours: BTreeSet<PeerId>,
    colluders: BTreeSet<PeerId>,
    chain: Blockchain,
    pool: TxPool,
    seen_txns: HashSet<TxnId>,
    seen_broadcasts: HashSet<u64>,
    trust: BTreeMap<PeerId, TrustRecord>,
    trust_params: TrustParams,
    mining: Option<MiningTask>,
    /// Last public block the ring leader built its withheld chain on.
    selfish_anchor: BlockHash,
}

impl Peer {
    pub fn new(
        id: PeerId,
        malicious: bool,
        hashing_power: f64,
        ledger: LedgerParams,
        trust_params: TrustParams,
    ) -> Self {
        Peer {
            id,
            malicious,
            hashing_power,
            neighbours: BTreeSet::new(),
            colluders: BTreeSet::new(),
            chain: Blockchain::new(ledger),
            pool: TxPool::new(),
            seen_txns: HashSet::new(),
            seen_broadcasts: HashSet::new(),
            trust: BTreeMap::new(),
            trust_params,
            mining: None,
            selfish_anchor: BlockHash::genesis(),
        }
    }

    /// Adds a public link to `other`.
    pub(crate) fn connect(&mut self, other: PeerId) {
        if other == self.id {
            return;
        }
        self.neighbours.insert(other);
        self.trust
            .entry(other)
            .or_insert_with(|| TrustRecord::new(&self.trust_params));
    }

    /// Adds an overlay link to the colluder `other`.
    pub(crate) fn collude(&mut self, other: PeerId) {
        if other != self.id {
            self.colluders.insert(other);
        }
    }

    #[inline]
    pub fn id(&self) -> PeerId {
        self.id
    }

    #[inline]
    pub fn is_malicious(&self) -> bool {
        self.malicious
    }

    #[inline]
    pub fn hashing_power(&self) -> f64 {
        self.hashing_power
    }

    pub fn neighbours(&self) -> &BTreeSet<PeerId> {
        &self.neighbours
    }

    pub fn colluders(&self) -> &BTreeSet<PeerId> {
        &self.colluders
    }

    #[inline]
    pub fn chain(&self) -> &Blockchain {
        &self.chain
    }

    #[inline]
    pub fn pool(&self) -> &TxPool {
        &self.pool
    }

    pub fn has_seen(&self, txn: TxnId) -> bool {
        self.seen_txns.contains(&txn)
    }

    /// Trust records of public neighbours.
    pub fn trust(&self) -> &BTreeMap<PeerId, TrustRecord> {
        &self.trust
    }

    pub fn trust_of(&self, neighbour: PeerId) -> Option<&TrustRecord> {
        self.trust.get(&neighbour)
    }

    pub fn selfish_anchor(&self) -> &BlockHash {
        &self.selfish_anchor
    }

    /// Hash of the block currently being mined, if any.
    pub fn mining_candidate(&self) -> Option<&BlockHash> {
        self.mining.as_ref().map(|task| task.candidate.hash())
    }

    /// Public neighbours first reached through the overlay, then the rest.
    fn recipients(&self, except: Option<PeerId>) -> Vec<PeerId> {
        self.colluders
            .iter()
            .chain(self.neighbours.difference(&self.colluders))
            .copied()
            .filter(|&p| Some(p) != except)
            .collect()
    }

    fn is_leader(&self, ctx: &Context<'_>) -> bool {
        ctx.roster().is_ring_leader(self.id)
    }

    fn max_trust_delay(ctx: &Context<'_>) -> SimTime {
        ctx.config().trust.max_delay_factor * ctx.config().get_timeout
    }

    fn guarded(&self, ctx: &Context<'_>) -> bool {
        ctx.config().countermeasure && !self.malicious
    }

    fn schedule_send(
        &self,
        ctx: &mut Context<'_>,
        time: SimTime,
        target: PeerId,
        kind: EventKind,
    ) {
        let overlay = self.colluders.contains(&target);
        ctx.schedule(Event::new(time, self.id, Some(target), kind, overlay));
    }

    /// Inserts the genesis block into this peer's ledger.
    pub fn create_genesis_block(&mut self, now: SimTime) {
        self.chain.insert_genesis(now);
    }

    /// Pays a random amount of this peer's balance to a random other peer
    /// and floods the transaction to all neighbours.
    pub fn generate_transaction(&mut self, ctx: &mut Context<'_>) {
        let balance = self.chain.peer_balance(self.id);
        let num_peers = ctx.roster().len();
        if balance <= 0.0 || num_peers < 2 {
            return;
        }

        let mut receiver = ctx.rng().gen_range(0..num_peers - 1);
        if receiver >= self.id.get() {
            receiver += 1;
        }
        let amount = if balance > 1.0 {
            uniform(1.0, balance, ctx.rng())
        } else {
            balance
        };

        let txn =
            Transaction::new(ctx.next_txn_id(), self.id, receiver.into(), amount);
        trace!(peer = %self.id, txn = %txn, "created transaction");

        self.seen_txns.insert(txn.id);
        self.pool.insert(txn.clone());
        for target in self.recipients(None) {
            self.send_transaction(ctx, &txn, target);
        }
    }

    fn send_transaction(
        &self,
        ctx: &mut Context<'_>,
        txn: &Transaction,
        target: PeerId,
    ) {
        let now = ctx.now();
        self.schedule_send(
            ctx,
            now,
            target,
            EventKind::TransactionSend(txn.clone()),
        );
    }

    /// Pools a transaction not seen before and relays it to every
    /// neighbour except `sender`.
    pub fn receive_transaction(
        &mut self,
        ctx: &mut Context<'_>,
        txn: Transaction,
        sender: PeerId,
    ) {
        if txn.amount <= 0.0 || !self.seen_txns.insert(txn.id) {
            return;
        }

        self.pool.insert(txn.clone());
        for target in self.recipients(Some(sender)) {
            self.send_transaction(ctx, &txn, target);
        }
    }

    /// Assembles a candidate block on the current leaf and returns its hash.
    /// Returns `None` if this peer does not mine.
    pub fn start_mining(&mut self, ctx: &mut Context<'_>) -> Option<BlockHash> {
        if self.hashing_power <= 0.0 || (self.malicious && !self.is_leader(ctx))
        {
            return None;
        }

        let max_txns = ctx.config().max_txns_per_block;
        let mut balances = self.chain.balances();
        let mut txns = vec![];
        for txn in self.pool.iter() {
            if txns.len() >= max_txns {
                break;
            }
            let Some(balance) = balances.get_mut(txn.sender.get()) else {
                continue;
            };
            if *balance < txn.amount {
                continue;
            }
            *balance -= txn.amount;
            txns.push(txn.clone());
        }

        let parent = self.chain.current_leaf().clone();
        let height = self.chain.current_height() + 1;
        let candidate =
            Block::new(txns, self.id, height, parent.clone(), ctx.now());
        let hash = candidate.hash().clone();

        trace!(peer = %self.id, hash = %hash, height, "started mining");
        self.mining = Some(MiningTask { candidate, parent });
        Some(hash)
    }

    /// Publishes the candidate identified by `hash` unless the work went
    /// stale in the meantime.
    pub fn end_mining(&mut self, ctx: &mut Context<'_>, hash: BlockHash) {
        let fresh = matches!(
            &self.mining,
            Some(task) if task.candidate.hash() == &hash
                && self.chain.current_leaf() == &task.parent
        );
        if !fresh {
            trace!(peer = %self.id, hash = %hash, "discarded stale mining result");
            return;
        }
        let Some(MiningTask { candidate, parent }) = self.mining.take() else {
            return;
        };
        let height = candidate.height();

        let released =
            match self.chain.insert(candidate, ctx.now(), &mut self.pool) {
                Ok(Insertion::Accepted { released, .. }) => released,
                Ok(_) => vec![],
                Err(e) => {
                    debug!(peer = %self.id, hash = %hash, error = %e, "mined invalid block");
                    return;
                }
            };
        info!(peer = %self.id, hash = %hash, height, time = ctx.now(), "mined block");

        let leader = self.is_leader(ctx);
        for target in self.colluders.clone() {
            self.send_hash(ctx, hash.clone(), target);
        }
        if !leader {
            let public: Vec<_> =
                self.neighbours.difference(&self.colluders).copied().collect();
            for target in public {
                self.send_hash(ctx, hash.clone(), target);
            }
        }
        self.announce_released(ctx, released);

        if leader {
            if self.chain.is_revealed(&parent) {
                self.selfish_anchor = parent;
            }
            let now = ctx.now();
            ctx.schedule(Event::local(now, self.id, EventKind::MiningStart));
        }
    }

    /// Announces `hash` to `target`. A malicious peer announcing to an
    /// honest one makes the block public.
    pub fn send_hash(
        &mut self,
        ctx: &mut Context<'_>,
        hash: BlockHash,
        target: PeerId,
    ) {
        if self.malicious && !ctx.roster().is_malicious(target) {
            self.chain.reveal(hash.clone());
        }
        let now = ctx.now();
        self.schedule_send(ctx, now, target, EventKind::HashSend(hash));
    }

    /// Relays a newly accepted block to neighbours except `except`.
    /// Malicious peers keep ring leader blocks off the public network.
    fn announce(
        &mut self,
        ctx: &mut Context<'_>,
        hash: &BlockHash,
        except: Option<PeerId>,
    ) {
        let leader_block = self.is_leader_block(ctx, hash);
        let withhold = self.malicious && leader_block;

        for target in self.recipients(except) {
            if withhold && !self.colluders.contains(&target) {
                continue;
            }
            self.send_hash(ctx, hash.clone(), target);
        }
        if self.malicious && !leader_block {
            // Honest blocks are public already
            self.chain.reveal(hash.clone());
        }
    }

    fn announce_released(
        &mut self,
        ctx: &mut Context<'_>,
        released: Vec<BlockHash>,
    ) {
        for hash in released {
            self.announce(ctx, &hash, None);
        }
    }

    fn is_leader_block(&self, ctx: &Context<'_>, hash: &BlockHash) -> bool {
        self.chain
            .lookup(hash)
            .and_then(Block::miner)
            .is_some_and(|miner| ctx.roster().is_ring_leader(miner))
    }

    /// Handles an announcement of `hash` by `sender`, requesting the block
    /// if it is unknown and no request is outstanding.
    pub fn receive_hash(
        &mut self,
        ctx: &mut Context<'_>,
        hash: BlockHash,
        sender: PeerId,
    ) {
        if self.chain.knows(&hash) {
            return;
        }

        if let RequestState::AwaitingResponse { suppliers, .. } =
            self.chain.request_mut(&hash)
        {
            if !suppliers.contains(&sender) {
                suppliers.push_back(sender);
            }
            return;
        }

        self.request_block(ctx, hash, VecDeque::from([sender]));
    }

    /// Sends a GET for `hash` to the first admissible supplier, or gives up
    /// once none is left.
    fn request_block(
        &mut self,
        ctx: &mut Context<'_>,
        hash: BlockHash,
        mut suppliers: VecDeque<PeerId>,
    ) {
        let now = ctx.now();
        let guarded = self.guarded(ctx);
        let max_delay = Self::max_trust_delay(ctx);

        while let Some(&supplier) = suppliers.front() {
            let delay = if guarded {
                let record = self
                    .trust
                    .entry(supplier)
                    .or_insert_with(|| TrustRecord::new(&self.trust_params));
                match record.admit(&self.trust_params, max_delay) {
                    Admission::Admitted { delay } => delay,
                    Admission::Refused => {
                        debug!(peer = %self.id, supplier = %supplier, "refused to request from banned neighbour");
                        suppliers.pop_front();
                        continue;
                    }
                }
            } else {
                0.0
            };

            let send_at = now + delay;
            let deadline = send_at + ctx.config().get_timeout;
            *self.chain.request_mut(&hash) =
                RequestState::AwaitingResponse { suppliers, deadline };
            trace!(peer = %self.id, hash = %hash, supplier = %supplier, "requesting block");
            self.schedule_send(ctx, send_at, supplier, EventKind::GetSend(hash));
            return;
        }

        trace!(peer = %self.id, hash = %hash, "no supplier left");
        self.chain.clear_request(&hash);
    }

    /// Handles the deadline of a GET sent to `supplier`, moving on to the
    /// next candidate supplier if the block still has not arrived.
    pub fn handle_timeout(
        &mut self,
        ctx: &mut Context<'_>,
        hash: BlockHash,
        supplier: Option<PeerId>,
    ) {
        if self.chain.knows(&hash) {
            return;
        }
        let RequestState::AwaitingResponse { suppliers, deadline } =
            self.chain.request(&hash)
        else {
            return;
        };
        if suppliers.front() != supplier.as_ref() || ctx.now() < *deadline {
            trace!(peer = %self.id, hash = %hash, "ignored stale timeout");
            return;
        }

        let mut suppliers = suppliers.clone();
        let Some(failed) = suppliers.pop_front() else { return };
        debug!(peer = %self.id, hash = %hash, supplier = %failed, "request timed out");

        if self.guarded(ctx) {
            self.trust
                .entry(failed)
                .or_insert_with(|| TrustRecord::new(&self.trust_params))
                .record_failure(&self.trust_params);
        }

        self.request_block(ctx, hash, suppliers);
    }

    /// Serves a GET for `hash` from `requester`.
    pub fn receive_get(
        &mut self,
        ctx: &mut Context<'_>,
        hash: BlockHash,
        requester: PeerId,
    ) {
        let Some(block) = self.chain.lookup(&hash) else {
            return;
        };

        if ctx.config().eclipse_attack
            && self.malicious
            && !ctx.roster().is_malicious(requester)
        {
            let leader_block = block
                .miner()
                .is_some_and(|miner| ctx.roster().is_ring_leader(miner));
            if !leader_block || !self.chain.is_revealed(&hash) {
                debug!(peer = %self.id, hash = %hash, requester = %requester, "withheld block");
                return;
            }
        }

        let block = block.clone();
        self.send_block(ctx, block, requester);
    }

    /// Sends `block` to `target`, subject to the countermeasure.
    pub fn send_block(
        &mut self,
        ctx: &mut Context<'_>,
        block: Block,
        target: PeerId,
    ) {
        let now = ctx.now();

        if self.guarded(ctx) {
            let max_delay = Self::max_trust_delay(ctx);
            let record = self
                .trust
                .entry(target)
                .or_insert_with(|| TrustRecord::new(&self.trust_params));
            match record.admit(&self.trust_params, max_delay) {
                Admission::Admitted { delay } => {
                    ctx.schedule(Event::new(
                        now + delay,
                        self.id,
                        Some(target),
                        EventKind::BlockSend(block),
                        false,
                    ));
                }
                Admission::Refused => {
                    debug!(peer = %self.id, target = %target, "refused to serve banned neighbour");
                }
            }
            return;
        }

        if self.malicious && !ctx.roster().is_malicious(target) {
            self.chain.reveal(block.hash().clone());
        }
        self.schedule_send(ctx, now, target, EventKind::BlockSend(block));
    }

    /// Accepts a block sent by `sender`, relays it, and reacts to any
    /// change of the preferred chain.
    pub fn receive_block(
        &mut self,
        ctx: &mut Context<'_>,
        block: Block,
        sender: PeerId,
    ) {
        let hash = block.hash().clone();
        if self.chain.knows(&hash) {
            return;
        }
        self.chain.clear_request(&hash);

        if self.guarded(ctx) {
            self.trust
                .entry(sender)
                .or_insert_with(|| TrustRecord::new(&self.trust_params))
                .record_success(&self.trust_params);
        }

        let from_leader =
            block.miner().is_some_and(|m| ctx.roster().is_ring_leader(m));
        let (leaf_changed, released) =
            match self.chain.insert(block, ctx.now(), &mut self.pool) {
                Ok(Insertion::Accepted { leaf_changed, released }) => {
                    (leaf_changed, released)
                }
                Ok(Insertion::Buffered) => {
                    trace!(peer = %self.id, hash = %hash, "buffered orphan block");
                    (false, vec![])
                }
                Ok(Insertion::Duplicate) => return,
                Err(e) => {
                    debug!(peer = %self.id, hash = %hash, error = %e, "rejected block");
                    return;
                }
            };
        trace!(peer = %self.id, hash = %hash, sender = %sender, "received block");

        self.announce(ctx, &hash, Some(sender));
        self.announce_released(ctx, released);

        if self.malicious && !self.is_leader(ctx) {
            return;
        }
        if leaf_changed {
            let now = ctx.now();
            ctx.schedule(Event::local(now, self.id, EventKind::MiningStart));
        }
        if !from_leader {
            self.broadcast_private_chain(ctx, &hash);
        }
    }

    /// Ring leader only: releases the withheld chain if the public chain
    /// has caught up with it or is one block behind.
    pub fn broadcast_private_chain(
        &mut self,
        ctx: &mut Context<'_>,
        received: &BlockHash,
    ) {
        if !self.is_leader(ctx) {
            return;
        }
        let Some(block) = self.chain.get(received) else {
            return;
        };
        let anchor_height =
            self.chain.get(&self.selfish_anchor).map_or(0, Block::height);
        if block.height() <= anchor_height {
            return;
        }

        let (mut public, mut private) = (0, 0);
        for block in self.chain.blocks() {
            if self.chain.is_revealed(block.hash()) {
                public = public.max(block.height());
            } else {
                private = private.max(block.height());
            }
        }

        if public == private || private == public + 1 {
            let broadcast = ctx.next_broadcast_id();
            info!(peer = %self.id, public, private, broadcast, "releasing private chain");
            self.receive_private_message(ctx, broadcast, self.id);
        }
    }

    /// Forwards a release broadcast over the overlay and announces every
    /// unrevealed block on this peer's preferred chain to its honest
    /// neighbours, oldest first.
    pub fn receive_private_message(
        &mut self,
        ctx: &mut Context<'_>,
        broadcast: u64,
        sender: PeerId,
    ) {
        if !self.seen_broadcasts.insert(broadcast) {
            return;
        }

        let now = ctx.now();
        for target in self.colluders.clone() {
            if target != sender {
                ctx.schedule(Event::new(
                    now,
                    self.id,
                    Some(target),
                    EventKind::PrivateMessageSend(broadcast),
                    true,
                ));
            }
        }

        let mut withheld = vec![];
        let mut curr = self.chain.current_leaf().clone();
        while !self.chain.is_revealed(&curr) {
            let Some(block) = self.chain.get(&curr) else { break };
            withheld.push(curr.clone());
            curr = block.parent().clone();
        }
        withheld.reverse();

        let honest: Vec<_> = self
            .neighbours
            .iter()
            .copied()
            .filter(|&n| n != sender && !ctx.roster().is_malicious(n))
            .collect();
        for hash in withheld {
            for &target in &honest {
                self.send_hash(ctx, hash.clone(), target);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        config::SimConfig,
        power_dist::PowerDistribution,
        simulation::{Simulation, SimulationBuilder},
    };

    use super::*;

    /// Three peers where 1 is the ring leader and 2 its colluder.
    fn colluding_network(power: Vec<f64>) -> Simulation {
        let mut sim = SimulationBuilder::new()
            .peers(3)
            .malicious([1, 2])
            .hashing_power(PowerDistribution::SetValues(power))
            .build_simulation()
            .unwrap();
        sim.genesis();
        sim
    }

    fn block_on(parent: &Block, miner: usize, timestamp: SimTime) -> Block {
        Block::new(
            vec![],
            PeerId(miner),
            parent.height() + 1,
            parent.hash().clone(),
            timestamp,
        )
    }

    /// Stores `block` in the ledger of `peer` without announcing it.
    fn give(sim: &mut Simulation, peer: usize, block: &Block) {
        sim.with_peer(PeerId(peer), |p, _| {
            p.chain.insert(block.clone(), 0.0, &mut p.pool).unwrap();
        });
    }

    fn queued_from(
        sim: &Simulation,
        source: usize,
        target: usize,
    ) -> Vec<&EventKind> {
        sim.queued()
            .filter(|e| e.source == PeerId(source))
            .filter(|e| e.target == Some(PeerId(target)))
            .map(|e| &e.kind)
            .collect()
    }

    fn hashes_sent(
        sim: &Simulation,
        source: usize,
        target: usize,
    ) -> Vec<BlockHash> {
        queued_from(sim, source, target)
            .into_iter()
            .filter_map(|kind| match kind {
                EventKind::HashSend(hash) => Some(hash.clone()),
                _ => None,
            })
            .collect()
    }

    fn blocks_sent(
        sim: &Simulation,
        source: usize,
        target: usize,
    ) -> Vec<BlockHash> {
        queued_from(sim, source, target)
            .into_iter()
            .filter_map(|kind| match kind {
                EventKind::BlockSend(block) => Some(block.hash().clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn colluder_withholds_from_honest_requesters() {
        let mut sim = colluding_network(vec![0.0; 3]);
        let genesis = Block::genesis();
        let honest = block_on(&genesis, 0, 1.0);
        let hidden = block_on(&genesis, 1, 2.0);
        let public = block_on(&genesis, 1, 3.0);
        for block in [&honest, &hidden, &public] {
            give(&mut sim, 2, block);
        }
        sim.with_peer(PeerId(2), |p, _| p.chain.reveal(public.hash().clone()));

        for block in [&honest, &hidden, &public] {
            let hash = block.hash().clone();
            sim.with_peer(PeerId(2), |p, ctx| {
                p.receive_get(ctx, hash.clone(), PeerId(0));
                p.receive_get(ctx, hash, PeerId(1));
            });
        }

        // Only the ring leader's public block reaches the honest peer
        assert_eq!(blocks_sent(&sim, 2, 0), vec![public.hash().clone()]);
        assert_eq!(
            blocks_sent(&sim, 2, 1),
            vec![
                honest.hash().clone(),
                hidden.hash().clone(),
                public.hash().clone()
            ]
        );
    }

    #[test]
    fn colluder_serves_everyone_without_eclipse() {
        let mut sim = SimulationBuilder::new()
            .peers(3)
            .malicious([1, 2])
            .eclipse_attack(false)
            .hashing_power(PowerDistribution::SetValues(vec![0.0; 3]))
            .build_simulation()
            .unwrap();
        sim.genesis();
        let hidden = block_on(&Block::genesis(), 1, 1.0);
        give(&mut sim, 2, &hidden);

        let hash = hidden.hash().clone();
        sim.with_peer(PeerId(2), |p, ctx| p.receive_get(ctx, hash, PeerId(0)));

        assert_eq!(blocks_sent(&sim, 2, 0), vec![hidden.hash().clone()]);
        let p2 = sim.peer(PeerId(2)).unwrap();
        assert!(p2.chain().is_revealed(hidden.hash()));
    }

    #[test]
    fn candidate_skips_overdrafts_and_is_capped() {
        let config = SimConfig {
            initial_balance: 10.0,
            max_txns_per_block: 2,
            ..SimConfig::default()
        };
        let mut sim = SimulationBuilder::new()
            .peers(3)
            .config(config)
            .hashing_power(PowerDistribution::SetValues(vec![1.0, 0.0, 0.0]))
            .build_simulation()
            .unwrap();
        sim.genesis();

        // Pool iterates newest first: 3, 2, 1, 0
        let txns = [
            Transaction::new(TxnId(0), PeerId(0), PeerId(1), 1.0),
            Transaction::new(TxnId(1), PeerId(2), PeerId(0), 3.0),
            Transaction::new(TxnId(2), PeerId(1), PeerId(0), 5.0),
            Transaction::new(TxnId(3), PeerId(1), PeerId(2), 8.0),
        ];
        let picked = sim.with_peer(PeerId(0), |p, ctx| {
            for txn in &txns {
                p.pool.insert(txn.clone());
            }
            p.start_mining(ctx).unwrap();
            p.mining
                .as_ref()
                .map(|task| {
                    let txns = task.candidate.txns().iter();
                    txns.map(|t| t.id).collect::<Vec<_>>()
                })
                .unwrap_or_default()
        });

        // Peer 1 can't afford 5 after spending 8, and the cap stops at two
        assert_eq!(picked, vec![TxnId(3), TxnId(1)]);
        let p0 = sim.peer(PeerId(0)).unwrap();
        assert_eq!(p0.pool().len(), 4);
    }

    #[test]
    fn idle_peers_do_not_mine() {
        let mut sim = colluding_network(vec![0.0, 1.0, 1.0]);

        // No hashing power, and a colluder that is not the ring leader
        for id in [0, 2] {
            let started =
                sim.with_peer(PeerId(id), |p, ctx| p.start_mining(ctx));
            assert!(started.is_none());
        }
        let started = sim.with_peer(PeerId(1), |p, ctx| p.start_mining(ctx));
        assert!(started.is_some());
    }

    #[test]
    fn ring_leader_keeps_mined_blocks_private() {
        let mut sim = colluding_network(vec![1.0, 1.0, 0.0]);

        let hash = sim.with_peer(PeerId(1), |p, ctx| {
            let hash = p.start_mining(ctx).unwrap();
            p.end_mining(ctx, hash.clone());
            hash
        });

        assert_eq!(hashes_sent(&sim, 1, 2), vec![hash.clone()]);
        assert!(hashes_sent(&sim, 1, 0).is_empty());
        let rearmed = sim.queued().any(|e| {
            e.source == PeerId(1)
                && e.time == 0.0
                && matches!(e.kind, EventKind::MiningStart)
        });
        assert!(rearmed);

        let leader = sim.peer(PeerId(1)).unwrap();
        assert_eq!(leader.chain().current_leaf(), &hash);
        assert!(!leader.chain().is_revealed(&hash));
        assert!(leader.selfish_anchor().is_genesis());
        assert!(leader.mining_candidate().is_none());
    }

    #[test]
    fn honest_miner_announces_to_all_neighbours() {
        let mut sim = colluding_network(vec![1.0, 1.0, 0.0]);

        let hash = sim.with_peer(PeerId(0), |p, ctx| {
            let hash = p.start_mining(ctx).unwrap();
            p.end_mining(ctx, hash.clone());
            hash
        });

        assert_eq!(hashes_sent(&sim, 0, 1), vec![hash.clone()]);
        assert_eq!(hashes_sent(&sim, 0, 2), vec![hash]);
        let rearmed =
            sim.queued().any(|e| matches!(e.kind, EventKind::MiningStart));
        assert!(!rearmed);
    }

    #[test]
    fn equal_heights_release_withheld_block() {
        let mut sim = colluding_network(vec![0.0; 3]);
        let genesis = Block::genesis();
        let private = block_on(&genesis, 1, 1.0);
        give(&mut sim, 1, &private);

        // The honest block ties the public chain with the private one
        let honest = block_on(&genesis, 0, 2.0);
        sim.with_peer(PeerId(1), |p, ctx| {
            p.receive_block(ctx, honest.clone(), PeerId(0));
        });

        assert_eq!(hashes_sent(&sim, 1, 0), vec![private.hash().clone()]);
        assert_eq!(hashes_sent(&sim, 1, 2), vec![honest.hash().clone()]);
        let leader = sim.peer(PeerId(1)).unwrap();
        assert_eq!(leader.chain().current_leaf(), private.hash());
        assert!(leader.chain().is_revealed(private.hash()));
        assert!(leader.chain().is_revealed(honest.hash()));
    }

    #[test]
    fn lead_of_two_stays_withheld() {
        let mut sim = colluding_network(vec![0.0; 3]);
        let genesis = Block::genesis();
        let l1 = block_on(&genesis, 1, 1.0);
        let l2 = block_on(&l1, 1, 2.0);
        let l3 = block_on(&l2, 1, 3.0);
        for block in [&l1, &l2, &l3] {
            give(&mut sim, 1, block);
        }

        let honest = block_on(&genesis, 0, 4.0);
        sim.with_peer(PeerId(1), |p, ctx| {
            p.receive_block(ctx, honest, PeerId(0));
        });

        assert!(hashes_sent(&sim, 1, 0).is_empty());
        let leader = sim.peer(PeerId(1)).unwrap();
        assert!(!leader.chain().is_revealed(l1.hash()));
        assert!(!leader.chain().is_revealed(l3.hash()));
    }
}
