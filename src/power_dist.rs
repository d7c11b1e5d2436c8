//! Describing distributions of hashing power

use crate::{peer::PeerId, simulation::Roster};

/// Numeric type used to represent hashing power.
pub type PowerValue = f64;

/// Determines how hashing power is distributed between peers during a
/// simulation.
///
/// Hashing power scales a peer's mean block interval: a peer with power `p`
/// finds blocks after `mean_block_interval / p` seconds on average. Values
/// need not sum to 1.
#[derive(Debug, Default, Clone, PartialEq)]
pub enum PowerDistribution {
    /// The ring leader mines with the combined power of all malicious
    /// peers, `m / n`, while every other peer gets `1 / n`.
    #[default]
    Colluding,
    /// Every peer gets `1 / n`.
    Equal,
    /// The given peer gets the given power, every other peer `1 / n`.
    SetPeer(PeerId, PowerValue),
    /// Use the given values, indexed by peer.
    SetValues(Vec<PowerValue>),
}

#[derive(Debug, thiserror::Error)]
pub enum PowerDistributionError {
    #[error("power value {0} is not in the range 0.0..=1.0")]
    BadPowerValue(PowerValue),
    #[error("cannot set power for unknown peer {0}")]
    UnknownPeer(PeerId),
    #[error("power distribution size {0} does not match peer count {1}")]
    WrongNumPeers(usize, usize),
    #[error("cannot create a distribution for zero peers")]
    ZeroPeersGiven,
}

impl PowerDistribution {
    /// Checks that this distribution can be applied to `roster`.
    pub fn validate(&self, roster: &Roster) -> Result<(), PowerDistributionError> {
        use PowerDistributionError::*;

        let num_peers = roster.len();
        if num_peers == 0 {
            return Err(ZeroPeersGiven);
        }

        let bad = |x: &PowerValue| x.is_nan() || !(0.0..=1.0).contains(x);
        match self {
            Self::Colluding | Self::Equal => Ok(()),
            Self::SetPeer(peer, power) => {
                if peer.get() >= num_peers {
                    return Err(UnknownPeer(*peer));
                }
                if bad(power) {
                    return Err(BadPowerValue(*power));
                }
                Ok(())
            }
            Self::SetValues(dist) => {
                if dist.len() != num_peers {
                    return Err(WrongNumPeers(dist.len(), num_peers));
                }
                match dist.iter().find(|x| bad(x)) {
                    Some(&val) => Err(BadPowerValue(val)),
                    None => Ok(()),
                }
            }
        }
    }

    /// Returns the power of every peer of `roster`, indexed by peer.
    pub fn values(
        &self,
        roster: &Roster,
    ) -> Result<Vec<PowerValue>, PowerDistributionError> {
        self.validate(roster)?;

        let n = roster.len();
        let share = 1.0 / n as PowerValue;
        let mut values = vec![share; n];

        match self {
            Self::Equal => (),
            Self::Colluding => {
                if let Some(leader) = roster.ring_leader() {
                    values[leader.get()] =
                        roster.malicious_count() as PowerValue * share;
                }
            }
            Self::SetPeer(peer, power) => values[peer.get()] = *power,
            Self::SetValues(dist) => values.clone_from(dist),
        }

        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roster(malicious: &[bool], leader: Option<usize>) -> Roster {
        Roster::new(
            malicious.to_vec(),
            malicious.to_vec(),
            leader.map(PeerId::from),
        )
    }

    #[test]
    fn power_dist_equal_power() {
        let r = roster(&[false; 4], None);
        assert_eq!(
            PowerDistribution::Equal.values(&r).unwrap(),
            vec![0.25, 0.25, 0.25, 0.25]
        )
    }

    #[test]
    fn ring_leader_pools_malicious_power() {
        let r = roster(&[false, true, true, false], Some(1));
        assert_eq!(
            PowerDistribution::Colluding.values(&r).unwrap(),
            vec![0.25, 0.5, 0.25, 0.25]
        );

        // Without a leader nobody pools power
        let r = roster(&[false, false], None);
        assert_eq!(
            PowerDistribution::Colluding.values(&r).unwrap(),
            vec![0.5, 0.5]
        );
    }

    #[test]
    fn invalid_distributions() {
        let r = roster(&[false; 3], None);

        assert!(matches!(
            PowerDistribution::SetPeer(7.into(), 0.5).values(&r),
            Err(PowerDistributionError::UnknownPeer(_))
        ));
        assert!(matches!(
            PowerDistribution::SetValues(vec![0.5, 1.5, 0.1]).values(&r),
            Err(PowerDistributionError::BadPowerValue(_))
        ));
        assert!(matches!(
            PowerDistribution::SetValues(vec![0.5]).values(&r),
            Err(PowerDistributionError::WrongNumPeers(1, 3))
        ));
    }
}
