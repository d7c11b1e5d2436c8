//! Events exchanged between peers and the simulation loop.

use crate::{
    block::{Block, BlockHash},
    peer::PeerId,
    simulation::SimTime,
    transaction::Transaction,
};

/// What happens when an [`Event`] is dispatched, along with the payload
/// that kind of event needs.
#[derive(Debug, Clone)]
pub enum EventKind {
    CreateTransaction,
    TransactionSend(Transaction),
    TransactionReceive(Transaction),
    MiningStart,
    /// Carries the hash of the candidate that was being mined.
    MiningEnd(BlockHash),
    BlockSend(Block),
    BlockReceive(Block),
    GetSend(BlockHash),
    GetReceive(BlockHash),
    HashSend(BlockHash),
    HashReceive(BlockHash),
    /// Deadline of a GET. The guarded supplier is the event's target.
    Timeout(BlockHash),
    PrivateMessageSend(u64),
    PrivateMessageReceive(u64),
}

impl EventKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateTransaction => "CreateTransaction",
            Self::TransactionSend(_) => "TransactionSend",
            Self::TransactionReceive(_) => "TransactionReceive",
            Self::MiningStart => "MiningStart",
            Self::MiningEnd(_) => "MiningEnd",
            Self::BlockSend(_) => "BlockSend",
            Self::BlockReceive(_) => "BlockReceive",
            Self::GetSend(_) => "GetSend",
            Self::GetReceive(_) => "GetReceive",
            Self::HashSend(_) => "HashSend",
            Self::HashReceive(_) => "HashReceive",
            Self::Timeout(_) => "Timeout",
            Self::PrivateMessageSend(_) => "PrivateMessageSend",
            Self::PrivateMessageReceive(_) => "PrivateMessageReceive",
        }
    }

    /// Returns true for events that only move existing blocks around.
    /// These are the only events processed after the horizon.
    pub fn is_protocol(&self) -> bool {
        !matches!(
            self,
            Self::CreateTransaction
                | Self::TransactionSend(_)
                | Self::TransactionReceive(_)
                | Self::MiningStart
                | Self::MiningEnd(_)
        )
    }
}

/// A scheduled occurrence in simulated time.
#[derive(Debug, Clone)]
pub struct Event {
    pub time: SimTime,
    pub source: PeerId,
    pub target: Option<PeerId>,
    pub kind: EventKind,
    /// Message travels over the colluders' overlay network.
    pub overlay: bool,
}

impl Event {
    pub fn new(
        time: SimTime,
        source: PeerId,
        target: Option<PeerId>,
        kind: EventKind,
        overlay: bool,
    ) -> Self {
        Self { time, source, target, kind, overlay }
    }

    /// An event that only concerns `source`.
    pub fn local(time: SimTime, source: PeerId, kind: EventKind) -> Self {
        Self::new(time, source, None, kind, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_events() {
        let hash = BlockHash::genesis();

        assert!(EventKind::HashSend(hash.clone()).is_protocol());
        assert!(EventKind::Timeout(hash.clone()).is_protocol());
        assert!(EventKind::PrivateMessageReceive(3).is_protocol());
        assert!(EventKind::BlockReceive(Block::genesis()).is_protocol());

        assert!(!EventKind::MiningStart.is_protocol());
        assert!(!EventKind::MiningEnd(hash).is_protocol());
        assert!(!EventKind::CreateTransaction.is_protocol());
    }
}
