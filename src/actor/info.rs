use std::net::SocketAddr;

use crate::common::{Id, Node, RingPosition};

use super::Actor;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
/// Counters of lookups started by this node, client and maintenance alike.
pub struct LookupStatistics {
    pub started: u64,
    pub succeeded: u64,
    pub failed: u64,
    /// Sum of hops of succeeded lookups.
    pub hops: u64,
}

impl LookupStatistics {
    /// Average hops per succeeded lookup.
    pub fn average_hops(&self) -> f64 {
        if self.succeeded == 0 {
            return 0.0;
        }

        self.hops as f64 / self.succeeded as f64
    }
}

/// Information and statistics about this Chord node.
#[derive(Debug, Clone)]
pub struct Info {
    id: Id,
    local_addr: SocketAddr,
    bits: usize,
    position: RingPosition,
    successor: Option<Node>,
    predecessor: Option<Node>,
    joined: bool,
    bootstrap_failure: bool,
    stabilization_cycles: u64,
    live_wedges: usize,
    locations: usize,
    outstanding_rpcs: usize,
    lookups: LookupStatistics,
}

impl Info {
    /// This Node's [Id]
    pub fn id(&self) -> &Id {
        &self.id
    }
    /// This node's id and address, as other nodes should address it.
    pub fn node(&self) -> Node {
        Node::new(self.id, self.local_addr)
    }
    /// Local address that this node is listening on.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
    /// Width of the ring in bits.
    pub fn bits(&self) -> usize {
        self.bits
    }
    /// This node's position on the ring.
    pub fn position(&self) -> RingPosition {
        self.position
    }
    /// Immediate successor, `None` if this node knows no other node.
    pub fn successor(&self) -> Option<Node> {
        self.successor
    }
    /// Immediate predecessor, `None` if this node knows no other node.
    pub fn predecessor(&self) -> Option<Node> {
        self.predecessor
    }
    /// Returns `true` once the join procedure finished successfully,
    /// or if this node started a new ring.
    pub fn joined(&self) -> bool {
        self.joined
    }
    /// Returns `true` if the last join gave up on its bootstrap node.
    pub fn bootstrap_failure(&self) -> bool {
        self.bootstrap_failure
    }
    /// Stabilization cycles started so far.
    pub fn stabilization_cycles(&self) -> u64 {
        self.stabilization_cycles
    }
    /// Live wedges beyond wedge 0 on both sides.
    pub fn live_wedges(&self) -> usize {
        self.live_wedges
    }
    /// Number of remote nodes this node keeps a location for.
    pub fn locations(&self) -> usize {
        self.locations
    }
    /// Remote calls issued and not completed yet.
    pub fn outstanding_rpcs(&self) -> usize {
        self.outstanding_rpcs
    }
    pub fn lookups(&self) -> &LookupStatistics {
        &self.lookups
    }
}

impl From<&Actor> for Info {
    fn from(actor: &Actor) -> Self {
        Self {
            id: *actor.id(),
            local_addr: actor.local_addr(),
            bits: actor.routing_table().ring().bits(),
            position: actor.routing_table().position(),
            successor: actor.successor(),
            predecessor: actor.predecessor(),
            joined: matches!(actor.join_status(), Some(Ok(_))),
            bootstrap_failure: actor.bootstrap_failure(),
            stabilization_cycles: actor.stabilization_cycles(),
            live_wedges: actor.routing_table().live_wedges(),
            locations: actor.locations().len(),
            outstanding_rpcs: actor.outstanding_rpcs(),
            lookups: *actor.lookup_statistics(),
        }
    }
}
