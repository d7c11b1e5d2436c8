/*!
Building and running simulations

A [`Simulation`] owns every [`Peer`] of one network together with the event
queue and random number generator driving it. Running it pops events in
time order and hands each one to the peer it concerns through a
[`Context`], until the horizon is reached. After the horizon the ring
leader flushes its withheld chain and only block propagation is allowed to
finish, so that the final ledgers can be compared.

# Examples

```
use p2p_mining_sim::prelude::*;

let output = SimulationBuilder::new()
    .peers(4)
    .topology(StaticTopology::ring(4))
    .horizon(3_000.0)
    .seed(7)
    .build_simulation()
    .unwrap()
    .run();

assert_eq!(output.peers.len(), 4);
```
*/

use std::{collections::BTreeMap, num::NonZeroUsize};

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
#[cfg(feature = "rayon")]
use rayon::prelude::*;
use tracing::{debug, info, trace};

use crate::{
    config::SimConfig,
    event::{Event, EventKind},
    peer::{Peer, PeerId},
    power_dist::PowerValue,
    results::ResultsBuilder,
    scheduler::EventQueue,
    timing::latency,
    transaction::TxnId,
    utils::exponential,
};

pub mod builder;

pub use builder::{SimulationBuildError, SimulationBuilder};

/// Simulated time, in seconds.
pub type SimTime = f64;

/// Public attributes of every peer, fixed for the whole run.
#[derive(Debug, Clone, PartialEq)]
pub struct Roster {
    malicious: Vec<bool>,
    fast: Vec<bool>,
    ring_leader: Option<PeerId>,
}

impl Roster {
    pub fn new(
        malicious: Vec<bool>,
        fast: Vec<bool>,
        ring_leader: Option<PeerId>,
    ) -> Self {
        Self { malicious, fast, ring_leader }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.malicious.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.malicious.is_empty()
    }

    pub fn is_malicious(&self, peer: PeerId) -> bool {
        self.malicious.get(peer.get()).copied().unwrap_or(false)
    }

    pub fn is_fast(&self, peer: PeerId) -> bool {
        self.fast.get(peer.get()).copied().unwrap_or(false)
    }

    #[inline]
    pub fn ring_leader(&self) -> Option<PeerId> {
        self.ring_leader
    }

    pub fn is_ring_leader(&self, peer: PeerId) -> bool {
        self.ring_leader == Some(peer)
    }

    pub fn malicious_count(&self) -> usize {
        self.malicious.iter().filter(|&&m| m).count()
    }
}

/// Issues transaction and private broadcast ids unique within one run.
#[derive(Debug, Clone, Default)]
struct IdGenerator {
    next_txn: u64,
    next_broadcast: u64,
}

/// Everything a [`Peer`] handler may use besides the peer itself.
#[derive(Debug)]
pub struct Context<'a> {
    now: SimTime,
    config: &'a SimConfig,
    roster: &'a Roster,
    queue: &'a mut EventQueue,
    rng: &'a mut ChaCha8Rng,
    ids: &'a mut IdGenerator,
}

impl<'a> Context<'a> {
    #[inline]
    pub fn now(&self) -> SimTime {
        self.now
    }

    #[inline]
    pub fn config(&self) -> &SimConfig {
        self.config
    }

    #[inline]
    pub fn roster(&self) -> &Roster {
        self.roster
    }

    pub fn rng(&mut self) -> &mut ChaCha8Rng {
        self.rng
    }

    pub fn schedule(&mut self, event: Event) {
        self.queue.push(event);
    }

    pub fn next_txn_id(&mut self) -> TxnId {
        let id = self.ids.next_txn;
        self.ids.next_txn += 1;
        id.into()
    }

    pub fn next_broadcast_id(&mut self) -> u64 {
        let id = self.ids.next_broadcast;
        self.ids.next_broadcast += 1;
        id
    }
}

/// Counters collected while events are dispatched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimulationStats {
    pub processed: u64,
    pub by_kind: BTreeMap<&'static str, u64>,
    /// Events dropped after the horizon.
    pub discarded: u64,
}

impl SimulationStats {
    fn record(&mut self, kind: &EventKind) {
        self.processed += 1;
        *self.by_kind.entry(kind.name()).or_default() += 1;
    }

    pub fn count(&self, kind: &str) -> u64 {
        self.by_kind.get(kind).copied().unwrap_or_default()
    }
}

/// A single simulated network.
#[derive(Debug)]
pub struct Simulation {
    config: SimConfig,
    roster: Roster,
    peers: Vec<Peer>,
    queue: EventQueue,
    rng: ChaCha8Rng,
    ids: IdGenerator,
    now: SimTime,
    horizon: SimTime,
    seed: u64,
    power: Vec<PowerValue>,
    stats: SimulationStats,
}

/// Contains the output data from a simulation.
#[derive(Debug)]
pub struct SimulationOutput {
    pub config: SimConfig,
    pub roster: Roster,
    pub peers: Vec<Peer>,
    pub horizon: SimTime,
    pub seed: u64,
    pub power: Vec<PowerValue>,
    pub stats: SimulationStats,
}

impl SimulationOutput {
    pub fn peer(&self, id: PeerId) -> Option<&Peer> {
        self.peers.get(id.get())
    }

    /// The peer whose ledger results are reported from: the ring leader
    /// if there is one, otherwise peer 0.
    pub fn observer(&self) -> Option<&Peer> {
        let id = self.roster.ring_leader().unwrap_or(PeerId(0));
        self.peer(id)
    }
}

impl Simulation {
    pub fn builder() -> SimulationBuilder {
        SimulationBuilder::new()
    }

    pub(crate) fn new(
        config: SimConfig,
        roster: Roster,
        peers: Vec<Peer>,
        horizon: SimTime,
        seed: u64,
        power: Vec<PowerValue>,
    ) -> Self {
        Simulation {
            config,
            roster,
            peers,
            queue: EventQueue::new(),
            rng: ChaCha8Rng::seed_from_u64(seed),
            ids: IdGenerator::default(),
            now: 0.0,
            horizon,
            seed,
            power,
            stats: SimulationStats::default(),
        }
    }

    #[inline]
    pub fn now(&self) -> SimTime {
        self.now
    }

    #[inline]
    pub fn horizon(&self) -> SimTime {
        self.horizon
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn peer(&self, id: PeerId) -> Option<&Peer> {
        self.peers.get(id.get())
    }

    pub fn peers(&self) -> &[Peer] {
        &self.peers
    }

    pub fn stats(&self) -> &SimulationStats {
        &self.stats
    }

    /// Events waiting to be dispatched, earliest first.
    pub fn queued(&self) -> impl Iterator<Item = &Event> {
        self.queue.iter()
    }

    /// Adds an event to the queue. Events in the past are dispatched next,
    /// without moving the clock backwards.
    pub fn schedule(&mut self, event: Event) {
        self.queue.push(event);
    }

    /// Runs `f` on peer `id` with a context at the current time, as if an
    /// event for it had just been dispatched.
    #[cfg(test)]
    pub(crate) fn with_peer<F, T>(&mut self, id: PeerId, f: F) -> T
    where
        F: FnOnce(&mut Peer, &mut Context<'_>) -> T,
    {
        let mut ctx = Context {
            now: self.now,
            config: &self.config,
            roster: &self.roster,
            queue: &mut self.queue,
            rng: &mut self.rng,
            ids: &mut self.ids,
        };
        f(&mut self.peers[id.get()], &mut ctx)
    }

    /// Inserts the genesis block into every peer's ledger.
    pub fn genesis(&mut self) {
        for peer in self.peers.iter_mut() {
            peer.create_genesis_block(self.now);
        }
    }

    /// Schedules the first transaction of every peer and the first mining
    /// attempt of every peer that mines.
    pub fn bootstrap(&mut self) {
        for i in 0..self.peers.len() {
            let id = PeerId(i);
            let delay = exponential(self.config.mean_txn_interval, &mut self.rng);
            self.queue.push(Event::local(
                self.now + delay,
                id,
                EventKind::CreateTransaction,
            ));
        }

        for peer in self.peers.iter() {
            let id = peer.id();
            if !peer.is_malicious() || self.roster.is_ring_leader(id) {
                self.queue
                    .push(Event::local(self.now, id, EventKind::MiningStart));
            }
        }
    }

    /// Dispatches the earliest queued event. Returns false if the queue was
    /// empty.
    pub fn step(&mut self) -> bool {
        match self.queue.pop() {
            Some(event) => {
                self.dispatch(event);
                true
            }
            None => false,
        }
    }

    /// Dispatches events until the queue is empty or the next event lies
    /// beyond `horizon`.
    pub fn run_until(&mut self, horizon: SimTime) {
        while self.queue.peek_time().is_some_and(|time| time <= horizon) {
            self.step();
        }
    }

    /// Ends the run: the ring leader releases whatever it still withholds,
    /// then queued block propagation is allowed to complete while
    /// transaction and mining activity is dropped.
    pub fn finish(&mut self) {
        self.now = self.now.max(self.horizon);
        info!(time = self.now, pending = self.queue.len(), "draining events");

        if let Some(leader) = self.roster.ring_leader() {
            let mut ctx = Context {
                now: self.now,
                config: &self.config,
                roster: &self.roster,
                queue: &mut self.queue,
                rng: &mut self.rng,
                ids: &mut self.ids,
            };
            let broadcast = ctx.next_broadcast_id();
            if let Some(peer) = self.peers.get_mut(leader.get()) {
                peer.receive_private_message(&mut ctx, broadcast, leader);
            }
        }

        while let Some(event) = self.queue.pop() {
            if !event.kind.is_protocol() {
                self.stats.discarded += 1;
                continue;
            }
            self.dispatch(event);
        }
    }

    /// Executes the configured simulation.
    pub fn run(mut self) -> SimulationOutput {
        info!(
            peers = self.peers.len(),
            horizon = self.horizon,
            seed = self.seed,
            "starting simulation"
        );

        self.genesis();
        self.bootstrap();
        self.run_until(self.horizon);
        self.finish();

        debug!(processed = self.stats.processed, "simulation finished");
        self.into_output()
    }

    pub fn into_output(self) -> SimulationOutput {
        let Simulation { config, roster, peers, horizon, seed, power, stats, .. } =
            self;
        SimulationOutput { config, roster, peers, horizon, seed, power, stats }
    }

    fn dispatch(&mut self, event: Event) {
        let Event { time, source, target, kind, overlay } = event;
        self.now = self.now.max(time);
        self.stats.record(&kind);
        trace!(time = self.now, source = %source, kind = kind.name(), "dispatch");

        let now = self.now;
        let config = &self.config;
        let roster = &self.roster;
        let peers = &mut self.peers;
        let mut ctx = Context {
            now,
            config,
            roster,
            queue: &mut self.queue,
            rng: &mut self.rng,
            ids: &mut self.ids,
        };

        // Delivers a message sent over the link `source -> target`
        let deliver = |ctx: &mut Context<'_>, size: u64, kind: EventKind| {
            let Some(target) = target else { return };
            let delay = latency(
                size,
                roster.is_fast(source),
                roster.is_fast(target),
                overlay,
                &config.link,
                ctx.rng(),
            );
            ctx.schedule(Event::new(now + delay, source, Some(target), kind, overlay));
        };

        match kind {
            EventKind::CreateTransaction => {
                if let Some(peer) = peers.get_mut(source.get()) {
                    peer.generate_transaction(&mut ctx);
                }
                let delay = exponential(config.mean_txn_interval, ctx.rng());
                ctx.schedule(Event::local(
                    now + delay,
                    source,
                    EventKind::CreateTransaction,
                ));
            }
            EventKind::TransactionSend(txn) => deliver(
                &mut ctx,
                config.txn_size,
                EventKind::TransactionReceive(txn),
            ),
            EventKind::TransactionReceive(txn) => {
                if let Some(peer) = target.and_then(|t| peers.get_mut(t.get())) {
                    peer.receive_transaction(&mut ctx, txn, source);
                }
            }
            EventKind::MiningStart => {
                let Some(peer) = peers.get_mut(source.get()) else { return };
                let Some(hash) = peer.start_mining(&mut ctx) else { return };

                let mean = config.mean_block_interval / peer.hashing_power();
                let delay = exponential(mean, ctx.rng());
                ctx.schedule(Event::local(
                    now + delay,
                    source,
                    EventKind::MiningEnd(hash),
                ));
            }
            EventKind::MiningEnd(hash) => {
                if let Some(peer) = peers.get_mut(source.get()) {
                    peer.end_mining(&mut ctx, hash);
                }
            }
            EventKind::BlockSend(block) => deliver(
                &mut ctx,
                config.block_size,
                EventKind::BlockReceive(block),
            ),
            EventKind::BlockReceive(block) => {
                if let Some(peer) = target.and_then(|t| peers.get_mut(t.get())) {
                    peer.receive_block(&mut ctx, block, source);
                }
            }
            EventKind::GetSend(hash) => {
                deliver(
                    &mut ctx,
                    config.get_size,
                    EventKind::GetReceive(hash.clone()),
                );
                ctx.schedule(Event::new(
                    now + config.get_timeout,
                    source,
                    target,
                    EventKind::Timeout(hash),
                    false,
                ));
            }
            EventKind::GetReceive(hash) => {
                if let Some(peer) = target.and_then(|t| peers.get_mut(t.get())) {
                    peer.receive_get(&mut ctx, hash, source);
                }
            }
            EventKind::HashSend(hash) => deliver(
                &mut ctx,
                config.hash_size,
                EventKind::HashReceive(hash),
            ),
            EventKind::HashReceive(hash) => {
                if let Some(peer) = target.and_then(|t| peers.get_mut(t.get())) {
                    peer.receive_hash(&mut ctx, hash, source);
                }
            }
            EventKind::Timeout(hash) => {
                if let Some(peer) = peers.get_mut(source.get()) {
                    peer.handle_timeout(&mut ctx, hash, target);
                }
            }
            EventKind::PrivateMessageSend(broadcast) => deliver(
                &mut ctx,
                config.private_message_size,
                EventKind::PrivateMessageReceive(broadcast),
            ),
            EventKind::PrivateMessageReceive(broadcast) => {
                if let Some(peer) = target.and_then(|t| peers.get_mut(t.get())) {
                    peer.receive_private_message(&mut ctx, broadcast, source);
                }
            }
        }
    }
}

/// Container for a group of simulations sharing one network description.
/// Simulations should be run using this struct's `run_all` method.
#[derive(Debug)]
pub struct SimulationGroup {
    sims: Vec<Simulation>,
    repeat_all: NonZeroUsize,
}

impl SimulationGroup {
    pub fn builder() -> SimulationBuilder {
        SimulationBuilder::new()
    }

    pub(crate) fn new(sims: Vec<Simulation>, repeat_all: NonZeroUsize) -> Self {
        Self { sims, repeat_all }
    }

    pub fn len(&self) -> usize {
        self.sims.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sims.is_empty()
    }

    /// Runs every simulation, in parallel when the `rayon` feature is on.
    /// Outputs keep the order in which the simulations were built.
    pub fn run_all(self) -> ResultsBuilder {
        let SimulationGroup { sims, repeat_all } = self;

        #[cfg(feature = "rayon")]
        let outputs: Vec<_> = sims.into_par_iter().map(Simulation::run).collect();
        #[cfg(not(feature = "rayon"))]
        let outputs: Vec<_> = sims.into_iter().map(Simulation::run).collect();

        ResultsBuilder::new(outputs, repeat_all)
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        block::{Block, BlockHash},
        power_dist::PowerDistribution,
    };

    use super::*;

    fn idle(peers: usize) -> Simulation {
        SimulationBuilder::new()
            .peers(peers)
            .hashing_power(PowerDistribution::SetValues(vec![0.0; peers]))
            .build_simulation()
            .unwrap()
    }

    #[test]
    fn finish_discards_activity_after_horizon() {
        let mut sim = idle(2);
        sim.genesis();
        sim.schedule(Event::local(1e5, PeerId(0), EventKind::CreateTransaction));
        sim.schedule(Event::local(1e5, PeerId(1), EventKind::MiningStart));

        sim.run_until(sim.horizon());
        assert_eq!(sim.queued().count(), 2);

        sim.finish();
        assert_eq!(sim.stats().discarded, 2);
        assert_eq!(sim.stats().processed, 0);
        assert_eq!(sim.now(), sim.horizon());
    }

    #[test]
    fn stale_mining_result_is_discarded() {
        let mut sim = SimulationBuilder::new()
            .peers(2)
            .hashing_power(PowerDistribution::SetValues(vec![1.0, 0.0]))
            .build_simulation()
            .unwrap();
        sim.genesis();
        sim.schedule(Event::local(0.0, PeerId(0), EventKind::MiningStart));
        assert!(sim.step());

        let stale = sim.peers[0].mining_candidate().cloned().unwrap();

        // A competing block moves the leaf, and mining restarts on it
        let block =
            Block::new(vec![], PeerId(1), 1, BlockHash::genesis(), 0.0);
        sim.schedule(Event::new(
            0.0,
            PeerId(1),
            Some(PeerId(0)),
            EventKind::BlockReceive(block.clone()),
            false,
        ));
        assert!(sim.step());
        assert!(sim.step());
        assert_ne!(sim.peers[0].mining_candidate(), Some(&stale));

        sim.schedule(Event::local(
            0.0,
            PeerId(0),
            EventKind::MiningEnd(stale.clone()),
        ));
        assert!(sim.step());

        let chain = sim.peers[0].chain();
        assert!(!chain.contains(&stale));
        assert_eq!(chain.current_leaf(), block.hash());
        assert_eq!(sim.stats().count("MiningEnd"), 1);
    }

    #[test]
    fn group_outputs_keep_build_order() {
        let outputs = SimulationBuilder::new()
            .peers(3)
            .horizon(600.0)
            .seed(5)
            .repeat_all(2)
            .build()
            .unwrap()
            .run_all()
            .data();

        let seeds: Vec<_> = outputs.iter().map(|o| o.seed).collect();
        assert_eq!(seeds, vec![5, 6]);
        assert!(outputs.iter().all(|o| o.stats.processed > 0));
    }
}
