/*!
Re-export of common values and datatypes used for running and analyzing
simulations. Must be imported manually.

```
use p2p_mining_sim::prelude::*;
```
*/

use crate::{
    block, blockchain, config, event, peer, power_dist, results, simulation,
    topology, transaction,
};

pub use block::{Block, BlockHash};

pub use blockchain::{
    BlockInsertionError, Blockchain, Insertion, LedgerParams, RequestState,
    ValidationError,
};

pub use config::{LinkParams, SimConfig, TrustParams};

pub use event::{Event, EventKind};

pub use peer::{Admission, Peer, PeerId, TrustRecord};

pub use power_dist::{PowerDistribution, PowerDistributionError, PowerValue};

pub use results::{
    Average, ChainDump, ChainRatios, Format, ResultsBuilder, ResultsTable,
    TrustReport,
};

pub use simulation::{
    Roster, SimTime, Simulation, SimulationBuildError, SimulationBuilder,
    SimulationGroup, SimulationOutput, SimulationStats,
};

pub use topology::{StaticTopology, Topology, TopologyError};

pub use transaction::{Transaction, TxPool, TxnId};
