/*!
Discrete-event simulator of a peer-to-peer blockchain network.

Every peer keeps its own ledger, mines on its preferred chain and gossips
transactions and blocks to its neighbours over links with simulated
latency. A group of colluding peers may run a selfish mining attack,
optionally combined with an eclipse attack that withholds blocks from
honest peers, and honest peers may defend themselves with per-neighbour
trust scores.

```
use p2p_mining_sim::prelude::*;

let output = SimulationBuilder::new()
    .peers(5)
    .malicious([3, 4])
    .eclipse_attack(true)
    .countermeasure(true)
    .horizon(2_400.0)
    .build_simulation()
    .unwrap()
    .run();

let ratios = ChainRatios::from_output(&output).unwrap();
assert!(ratios.malicious_in_chain <= ratios.chain_length);
```
*/

pub mod block;
pub mod blockchain;
pub mod config;
pub mod event;
pub mod hash;
pub mod peer;
pub mod power_dist;
pub mod prelude;
pub mod results;
pub mod scheduler;
pub mod simulation;
pub mod timing;
pub mod topology;
pub mod transaction;

pub(crate) mod utils;
