use std::{collections::BTreeSet, num::NonZeroUsize};

use crate::{
    blockchain::LedgerParams,
    config::SimConfig,
    peer::{Peer, PeerId},
    power_dist::{PowerDistribution, PowerDistributionError},
    topology::{Edge, StaticTopology, Topology, TopologyError},
};

use super::{Roster, SimTime, Simulation, SimulationGroup};

/// Builds a [`Simulation`] or a [`SimulationGroup`].
#[derive(Debug, Default)]
pub struct SimulationBuilder {
    peers: Option<usize>,
    malicious: BTreeSet<PeerId>,
    ring_leader: Option<PeerId>,
    fast_peers: Option<BTreeSet<PeerId>>,
    topology: Option<Box<dyn Topology>>,
    horizon: Option<SimTime>,
    seed: u64,
    repeat_all: Option<usize>,
    config: SimConfig,
    power_dists: Vec<PowerDistribution>,
}

#[derive(Debug, thiserror::Error)]
pub enum SimulationBuildError {
    #[error("the network must contain at least one peer")]
    NoPeersGiven,
    #[error("simulation horizon must be positive, got {0}")]
    BadHorizon(SimTime),
    #[error("peer {0} is not part of the network")]
    UnknownPeer(PeerId),
    #[error("ring leader {0} is not malicious")]
    RingLeaderNotMalicious(PeerId),
    #[error("mean intervals must be positive")]
    NonPositiveInterval,
    #[error("cannot repeat a simulation 0 times")]
    RepeatZero,
    #[error(transparent)]
    BadTopology(#[from] TopologyError),
    #[error(transparent)]
    BadPowerDistribution(#[from] PowerDistributionError),
}

/// Validated network shared by every simulation of a group.
#[derive(Debug)]
struct Network {
    roster: Roster,
    public: Vec<Edge>,
    overlay: Vec<Edge>,
}

impl SimulationBuilder {
    /// Horizon used when none is given: ten mean block intervals.
    pub const DEFAULT_HORIZON: SimTime = 6_000.0;

    /// Creates a new [`SimulationBuilder`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of peers in the network.
    pub fn peers(mut self, num: usize) -> Self {
        self.peers = Some(num);

        self
    }

    /// Marks the given peers as malicious colluders.
    pub fn malicious<I>(mut self, peers: I) -> Self
    where
        I: IntoIterator<Item = usize>,
    {
        self.malicious.extend(peers.into_iter().map(PeerId::from));

        self
    }

    /// Sets the malicious peer that mines the withheld chain. Defaults to
    /// the lowest malicious peer.
    pub fn ring_leader(mut self, peer: usize) -> Self {
        self.ring_leader = Some(peer.into());

        self
    }

    /// Peers with fast links. Defaults to the malicious peers.
    pub fn fast_peers<I>(mut self, peers: I) -> Self
    where
        I: IntoIterator<Item = usize>,
    {
        self.fast_peers = Some(peers.into_iter().map(PeerId::from).collect());

        self
    }

    /// Sets the network topology ([`StaticTopology::complete`] otherwise).
    pub fn topology<T: Topology + 'static>(mut self, topology: T) -> Self {
        self.topology = Some(Box::new(topology));

        self
    }

    /// Simulated time after which no new transactions or blocks are
    /// created.
    pub fn horizon(mut self, horizon: SimTime) -> Self {
        self.horizon = Some(horizon);

        self
    }

    /// Seed of the first simulation. Repeated runs use consecutive seeds.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;

        self
    }

    /// Each hashing power distribution will be simulated `num` times.
    pub fn repeat_all(mut self, num: usize) -> Self {
        self.repeat_all = Some(num);

        self
    }

    /// Replaces every tunable constant.
    pub fn config(mut self, config: SimConfig) -> Self {
        self.config = config;

        self
    }

    pub fn countermeasure(mut self, enabled: bool) -> Self {
        self.config.countermeasure = enabled;

        self
    }

    pub fn eclipse_attack(mut self, enabled: bool) -> Self {
        self.config.eclipse_attack = enabled;

        self
    }

    /// Adds a hashing power distribution to simulate. Each distribution
    /// added yields its own set of runs in a [`SimulationGroup`].
    pub fn hashing_power(mut self, dist: PowerDistribution) -> Self {
        self.power_dists.push(dist);

        self
    }

    /// Creates a single [`Simulation`] using the first hashing power
    /// distribution.
    pub fn build_simulation(self) -> Result<Simulation, SimulationBuildError> {
        let network = self.network()?;
        let dist = self.power_dists.first().cloned().unwrap_or_default();

        self.simulation(&network, &dist, self.seed)
    }

    /// Creates a [`SimulationGroup`] from the specified parameters.
    pub fn build(self) -> Result<SimulationGroup, SimulationBuildError> {
        let network = self.network()?;
        let repeat_all = NonZeroUsize::new(self.repeat_all.unwrap_or(1))
            .ok_or(SimulationBuildError::RepeatZero)?;

        let dists = if self.power_dists.is_empty() {
            vec![PowerDistribution::default()]
        } else {
            self.power_dists.clone()
        };

        let mut sims = vec![];
        for dist in &dists {
            for _ in 0..repeat_all.get() {
                let seed = self.seed.wrapping_add(sims.len() as u64);
                sims.push(self.simulation(&network, dist, seed)?);
            }
        }

        Ok(SimulationGroup::new(sims, repeat_all))
    }

    fn network(&self) -> Result<Network, SimulationBuildError> {
        use SimulationBuildError::*;

        let n = match self.peers {
            None | Some(0) => return Err(NoPeersGiven),
            Some(n) => n,
        };
        if let Some(horizon) = self.horizon {
            if horizon.is_nan() || horizon <= 0.0 {
                return Err(BadHorizon(horizon));
            }
        }
        if !(self.config.mean_block_interval > 0.0
            && self.config.mean_txn_interval > 0.0
            && self.config.get_timeout > 0.0)
        {
            return Err(NonPositiveInterval);
        }

        let fast = self.fast_peers.as_ref().unwrap_or(&self.malicious);
        let ids = self.malicious.iter().chain(fast).chain(&self.ring_leader);
        if let Some(&id) = ids.into_iter().find(|id| id.get() >= n) {
            return Err(UnknownPeer(id));
        }

        let ring_leader = self.ring_leader.or(self.malicious.first().copied());
        if let Some(leader) = ring_leader {
            if !self.malicious.contains(&leader) {
                return Err(RingLeaderNotMalicious(leader));
            }
        }

        let roster = Roster::new(
            (0..n).map(|i| self.malicious.contains(&PeerId(i))).collect(),
            (0..n).map(|i| fast.contains(&PeerId(i))).collect(),
            ring_leader,
        );

        let default_topology;
        let topology: &dyn Topology = match &self.topology {
            Some(topology) => topology.as_ref(),
            None => {
                default_topology = StaticTopology::complete(n);
                &default_topology
            }
        };
        let public = topology.public_edges(n)?;
        let overlay = topology.overlay_edges(n, &self.malicious)?;
        let edges = public.iter().chain(&overlay);
        if let Some(&(a, b)) =
            edges.into_iter().find(|(a, b)| a.get() >= n || b.get() >= n)
        {
            return Err(BadTopology(TopologyError::UnknownPeer(a, b)));
        }

        Ok(Network { roster, public, overlay })
    }

    fn simulation(
        &self,
        network: &Network,
        dist: &PowerDistribution,
        seed: u64,
    ) -> Result<Simulation, SimulationBuildError> {
        let Network { roster, public, overlay } = network;

        let power = dist.values(roster)?;
        let ledger = LedgerParams::from_config(&self.config, roster.len());
        let mut peers: Vec<_> = power
            .iter()
            .enumerate()
            .map(|(i, &p)| {
                let id = PeerId(i);
                Peer::new(
                    id,
                    roster.is_malicious(id),
                    p,
                    ledger,
                    self.config.trust,
                )
            })
            .collect();

        for &(a, b) in public {
            peers[a.get()].connect(b);
            peers[b.get()].connect(a);
        }
        for &(a, b) in overlay {
            peers[a.get()].collude(b);
            peers[b.get()].collude(a);
        }

        Ok(Simulation::new(
            self.config.clone(),
            roster.clone(),
            peers,
            self.horizon.unwrap_or(Self::DEFAULT_HORIZON),
            seed,
            power,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn example_build() {
        SimulationBuilder::new()
            .peers(3)
            .build_simulation()
            .expect("valid simulation build");
    }

    #[test]
    fn group_has_one_run_per_repeat_and_distribution() {
        let group = SimulationBuilder::new()
            .peers(4)
            .malicious([1, 2])
            .repeat_all(3)
            .hashing_power(PowerDistribution::Colluding)
            .hashing_power(PowerDistribution::Equal)
            .build()
            .unwrap();

        assert_eq!(group.len(), 6);
    }

    #[test]
    fn links_are_symmetric() {
        let sim = SimulationBuilder::new()
            .peers(4)
            .malicious([1, 3])
            .topology(StaticTopology::ring(4))
            .build_simulation()
            .unwrap();

        let p0 = sim.peer(0.into()).unwrap();
        assert_eq!(
            p0.neighbours().iter().map(PeerId::get).collect::<Vec<_>>(),
            vec![1, 3]
        );
        assert!(p0.colluders().is_empty());

        let p1 = sim.peer(1.into()).unwrap();
        assert!(p1.colluders().contains(&3.into()));
        assert!(sim.roster().is_ring_leader(1.into()));
        assert!(sim.roster().is_fast(3.into()));
        assert!(!sim.roster().is_fast(0.into()));
    }

    #[test]
    fn build_errors() {
        use SimulationBuildError::*;

        assert!(matches!(
            SimulationBuilder::new().build_simulation(),
            Err(NoPeersGiven)
        ));
        assert!(matches!(
            SimulationBuilder::new().peers(2).horizon(0.0).build_simulation(),
            Err(BadHorizon(_))
        ));
        assert!(matches!(
            SimulationBuilder::new().peers(2).malicious([5]).build_simulation(),
            Err(UnknownPeer(_))
        ));
        assert!(matches!(
            SimulationBuilder::new()
                .peers(3)
                .malicious([1])
                .ring_leader(2)
                .build_simulation(),
            Err(RingLeaderNotMalicious(_))
        ));
        assert!(matches!(
            SimulationBuilder::new().peers(2).repeat_all(0).build(),
            Err(RepeatZero)
        ));
        assert!(matches!(
            SimulationBuilder::new()
                .peers(3)
                .topology(StaticTopology::new([(0, 3)]))
                .build_simulation(),
            Err(BadTopology(_))
        ));
    }

    /// Hands out an edge to a peer that is not in the network.
    #[derive(Debug, Clone)]
    struct OutOfRange;

    impl Topology for OutOfRange {
        fn public_edges(&self, _: usize) -> Result<Vec<Edge>, TopologyError> {
            Ok(vec![(PeerId(0), PeerId(7))])
        }

        fn overlay_edges(
            &self,
            _: usize,
            _: &BTreeSet<PeerId>,
        ) -> Result<Vec<Edge>, TopologyError> {
            Ok(vec![])
        }
    }

    #[test]
    fn custom_topology_edges_are_range_checked() {
        let result = SimulationBuilder::new()
            .peers(3)
            .topology(OutOfRange)
            .build_simulation();

        assert!(matches!(
            result,
            Err(SimulationBuildError::BadTopology(TopologyError::UnknownPeer(
                a, b
            ))) if a == PeerId(0) && b == PeerId(7)
        ));
    }
}
