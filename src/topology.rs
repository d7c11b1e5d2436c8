/*!
Network topologies

A [`Topology`] decides who talks to whom: the public peer-to-peer graph that
every peer uses, and the overlay that links colluding malicious peers.
Generating random graphs is left to the caller; [`StaticTopology`] wraps
explicit edge lists and checks them against the network size.

```
use p2p_mining_sim::prelude::*;

let topology = StaticTopology::ring(4).with_overlay([(1, 3)]);
let edges = topology.public_edges(4).unwrap();

assert_eq!(edges.len(), 4);
```
*/

use std::{collections::BTreeSet, fmt::Debug};

use dyn_clone::DynClone;

use crate::peer::PeerId;

/// An undirected link between two peers.
pub type Edge = (PeerId, PeerId);

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum TopologyError {
    #[error("edge ({0}, {1}) references a peer outside the network")]
    UnknownPeer(PeerId, PeerId),
    #[error("peer {0} cannot link to itself")]
    SelfLoop(PeerId),
    #[error("overlay edge ({0}, {1}) touches an honest peer")]
    HonestOverlayPeer(PeerId, PeerId),
    #[error("peer {0} has no public neighbours")]
    Isolated(PeerId),
}

/// Source of the public and overlay graphs of a simulation.
pub trait Topology: Debug + DynClone + Send + Sync {
    /// Links of the public network over `num_peers` peers.
    fn public_edges(&self, num_peers: usize)
        -> Result<Vec<Edge>, TopologyError>;

    /// Links of the colluders' overlay. Both ends of every edge must be in
    /// `malicious`.
    fn overlay_edges(
        &self,
        num_peers: usize,
        malicious: &BTreeSet<PeerId>,
    ) -> Result<Vec<Edge>, TopologyError>;
}

dyn_clone::clone_trait_object!(Topology);

/// Topology given by explicit edge lists.
///
/// Without an explicit overlay, every pair of malicious peers is linked.
#[derive(Debug, Clone, Default)]
pub struct StaticTopology {
    public: Vec<(usize, usize)>,
    overlay: Option<Vec<(usize, usize)>>,
}

impl StaticTopology {
    pub fn new<I>(public: I) -> Self
    where
        I: IntoIterator<Item = (usize, usize)>,
    {
        Self { public: public.into_iter().collect(), overlay: None }
    }

    /// Peers `0..num_peers` connected in a cycle.
    pub fn ring(num_peers: usize) -> Self {
        let public = match num_peers {
            0 | 1 => vec![],
            2 => vec![(0, 1)],
            n => (0..n).map(|i| (i, (i + 1) % n)).collect(),
        };
        Self { public, overlay: None }
    }

    /// Every pair of peers `0..num_peers` connected.
    pub fn complete(num_peers: usize) -> Self {
        let public = (0..num_peers)
            .flat_map(|i| (i + 1..num_peers).map(move |j| (i, j)))
            .collect();
        Self { public, overlay: None }
    }

    /// Replaces the default overlay clique with the given edges.
    pub fn with_overlay<I>(mut self, overlay: I) -> Self
    where
        I: IntoIterator<Item = (usize, usize)>,
    {
        self.overlay = Some(overlay.into_iter().collect());
        self
    }

    fn check(
        edges: &[(usize, usize)],
        num_peers: usize,
    ) -> Result<Vec<Edge>, TopologyError> {
        use TopologyError::*;

        edges
            .iter()
            .map(|&(a, b)| {
                if a >= num_peers || b >= num_peers {
                    Err(UnknownPeer(a.into(), b.into()))
                } else if a == b {
                    Err(SelfLoop(a.into()))
                } else {
                    Ok((a.into(), b.into()))
                }
            })
            .collect()
    }
}

impl Topology for StaticTopology {
    fn public_edges(
        &self,
        num_peers: usize,
    ) -> Result<Vec<Edge>, TopologyError> {
        let edges = Self::check(&self.public, num_peers)?;

        if num_peers > 1 {
            let linked: BTreeSet<_> =
                edges.iter().flat_map(|&(a, b)| [a, b]).collect();
            if let Some(id) = (0..num_peers)
                .map(PeerId::from)
                .find(|id| !linked.contains(id))
            {
                return Err(TopologyError::Isolated(id));
            }
        }

        Ok(edges)
    }

    fn overlay_edges(
        &self,
        num_peers: usize,
        malicious: &BTreeSet<PeerId>,
    ) -> Result<Vec<Edge>, TopologyError> {
        let Some(overlay) = &self.overlay else {
            let members: Vec<_> = malicious.iter().copied().collect();
            return Ok(members
                .iter()
                .enumerate()
                .flat_map(|(i, &a)| members[i + 1..].iter().map(move |&b| (a, b)))
                .collect());
        };

        let edges = Self::check(overlay, num_peers)?;
        if let Some(&(a, b)) = edges
            .iter()
            .find(|(a, b)| !malicious.contains(a) || !malicious.contains(b))
        {
            return Err(TopologyError::HonestOverlayPeer(a, b));
        }

        Ok(edges)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(edges: Vec<Edge>) -> Vec<(usize, usize)> {
        edges.into_iter().map(|(a, b)| (a.get(), b.get())).collect()
    }

    #[test]
    fn ring_and_complete() {
        assert_eq!(
            ids(StaticTopology::ring(3).public_edges(3).unwrap()),
            vec![(0, 1), (1, 2), (2, 0)]
        );
        assert_eq!(StaticTopology::complete(4).public_edges(4).unwrap().len(), 6);
    }

    #[test]
    fn rejects_bad_edges() {
        let topology = StaticTopology::new([(0, 1), (1, 5)]);
        assert!(matches!(
            topology.public_edges(3),
            Err(TopologyError::UnknownPeer(..))
        ));

        let topology = StaticTopology::new([(0, 1), (2, 2)]);
        assert!(matches!(
            topology.public_edges(3),
            Err(TopologyError::SelfLoop(_))
        ));

        let topology = StaticTopology::new([(0, 1)]);
        assert_eq!(
            topology.public_edges(3),
            Err(TopologyError::Isolated(2.into()))
        );
    }

    #[test]
    fn overlay_defaults_to_clique() {
        let malicious: BTreeSet<PeerId> =
            [1, 3, 4].into_iter().map(PeerId::from).collect();
        let topology = StaticTopology::complete(5);

        assert_eq!(
            ids(topology.overlay_edges(5, &malicious).unwrap()),
            vec![(1, 3), (1, 4), (3, 4)]
        );

        let topology = topology.with_overlay([(1, 2)]);
        assert!(matches!(
            topology.overlay_edges(5, &malicious),
            Err(TopologyError::HonestOverlayPeer(..))
        ));
    }
}
