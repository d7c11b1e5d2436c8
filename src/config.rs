//! Tunable constants of the network, ledger and countermeasure models.
//!
//! All sizes are in bits and all times in simulated seconds unless noted
//! otherwise.

use crate::simulation::SimTime;

/// Parameters of the whole simulated network.
#[derive(Debug, Clone, PartialEq)]
pub struct SimConfig {
    /// Coins credited to the miner of every block.
    pub mining_reward: f64,
    /// Balance every peer starts with.
    pub initial_balance: f64,
    /// Mean time between blocks for a miner holding all hashing power.
    pub mean_block_interval: SimTime,
    /// Mean time between two transactions created by the same peer.
    pub mean_txn_interval: SimTime,
    /// Upper bound on the transactions packed into one block.
    pub max_txns_per_block: usize,
    /// How long a peer waits for a requested block before asking the next
    /// candidate supplier.
    pub get_timeout: SimTime,
    pub txn_size: u64,
    pub block_size: u64,
    pub hash_size: u64,
    pub get_size: u64,
    pub private_message_size: u64,
    /// Colluding peers refuse to serve blocks to honest requesters.
    pub eclipse_attack: bool,
    /// Honest peers gate requests and replies on neighbour trust scores.
    pub countermeasure: bool,
    pub link: LinkParams,
    pub trust: TrustParams,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            mining_reward: 50.0,
            initial_balance: 0.0,
            mean_block_interval: 600.0,
            mean_txn_interval: 10.0,
            max_txns_per_block: 999,
            get_timeout: 20.0,
            txn_size: 8_000,
            block_size: 8_000_000,
            hash_size: 512,
            get_size: 560,
            private_message_size: 512,
            eclipse_attack: true,
            countermeasure: false,
            link: LinkParams::default(),
            trust: TrustParams::default(),
        }
    }
}

/// Link speeds and delays fed to [`latency`](crate::timing::latency).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkParams {
    /// Bits per second between two fast peers.
    pub fast_link_speed: f64,
    /// Bits per second on any link touching a slow peer.
    pub slow_link_speed: f64,
    /// Propagation delay bounds on the public network, in milliseconds.
    pub min_propagation_ms: f64,
    pub max_propagation_ms: f64,
    /// Propagation delay bounds on the colluders' overlay, in milliseconds.
    pub min_overlay_propagation_ms: f64,
    pub max_overlay_propagation_ms: f64,
    /// Mean queuing delay is this many bits divided by the link speed.
    pub queuing_factor: f64,
}

impl Default for LinkParams {
    fn default() -> Self {
        Self {
            fast_link_speed: 100e6,
            slow_link_speed: 5e6,
            min_propagation_ms: 10.0,
            max_propagation_ms: 500.0,
            min_overlay_propagation_ms: 1.0,
            max_overlay_propagation_ms: 10.0,
            queuing_factor: 96e3,
        }
    }
}

/// Trust score bookkeeping used by the countermeasure.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrustParams {
    pub max_score: f64,
    /// Scores at or below this value get the neighbour refused.
    pub ban_threshold: f64,
    /// Refusals tolerated before a neighbour's record is reset.
    pub max_bans: u32,
    pub failure_penalty: f64,
    pub success_reward: f64,
    /// Largest admission delay, as a multiple of the GET timeout.
    pub max_delay_factor: f64,
}

impl Default for TrustParams {
    fn default() -> Self {
        Self {
            max_score: 100.0,
            ban_threshold: 20.0,
            max_bans: 5,
            failure_penalty: 10.0,
            success_reward: 1.0,
            max_delay_factor: 20.0,
        }
    }
}
