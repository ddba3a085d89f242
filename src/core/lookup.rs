//! Iterative find-predecessor / find-successor.
//!
//! A [Lookup] never performs I/O, it tells the caller which node to ask next
//! through [LookupStep], and is advanced with the answers.

use std::net::SocketAddr;

use tracing::{debug, trace};

use crate::common::{Failure, Id, Node, Ring, RingPosition};

/// Extra hops allowed on top of the ring width before a lookup gives up.
pub const HOP_MARGIN: usize = 4;

/// Addresses visited by a lookup, starting with the node it started from.
pub type Route = Vec<SocketAddr>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupKind {
    /// Resolve the node immediately preceding the target.
    Predecessor,
    /// Resolve the node at or immediately following the target.
    Successor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// A node's answer to "what is the closest node you know preceding the target".
pub struct ClosestReply {
    /// Closest preceding node known to the responder, the responder itself if none.
    pub node: Node,
    /// The responder's immediate successor, the responder itself if it knows none.
    pub successor: Node,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupResponse {
    pub target: RingPosition,
    /// Last node strictly before the target.
    pub predecessor: Node,
    /// First node at or after the target.
    pub successor: Node,
    pub route: Route,
}

impl LookupResponse {
    /// Number of hops taken from the origin.
    pub fn hops(&self) -> usize {
        self.route.len().saturating_sub(1)
    }

    /// The node this lookup resolved, according to its [LookupKind].
    pub fn node(&self, kind: LookupKind) -> Node {
        match kind {
            LookupKind::Predecessor => self.predecessor,
            LookupKind::Successor => self.successor,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupStep {
    /// Ask `node` for its closest preceding node of the target.
    FindClosest(Node),
    /// Ask `node` for its immediate successor.
    GetSuccessor(Node),
    /// Ask a hinted `node` for its immediate predecessor, to confirm it owns the target.
    GetPredecessor(Node),
    Done(LookupResponse),
    Failed(Failure),
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Walking,
    Hinted { hint: Node },
    Confirming { predecessor: Node },
}

#[derive(Debug)]
pub struct Lookup {
    ring: Ring,
    me: Id,
    kind: LookupKind,
    target: RingPosition,
    current: Node,
    route: Route,
    hops: usize,
    phase: Phase,
    hint_tried: bool,
}

impl Lookup {
    /// Create a lookup for `target`, starting at `origin`. `me` is the node running it,
    /// whose own answers are trusted to jump anywhere on the ring.
    pub fn new(ring: Ring, me: Id, kind: LookupKind, target: RingPosition, origin: Node) -> Self {
        trace!(?kind, %target, ?origin, "New lookup");

        Lookup {
            ring,
            me,
            kind,
            target,
            current: origin,
            route: vec![origin.address],
            hops: 0,
            phase: Phase::Walking,
            hint_tried: false,
        }
    }

    // === Getters ===

    pub fn kind(&self) -> LookupKind {
        self.kind
    }

    pub fn target(&self) -> RingPosition {
        self.target
    }

    /// The node currently being asked.
    pub fn current(&self) -> &Node {
        &self.current
    }

    pub fn hops(&self) -> usize {
        self.hops
    }

    pub fn route(&self) -> &[SocketAddr] {
        &self.route
    }

    /// Maximum number of hops before giving up with [Failure::ProtocolError].
    pub fn budget(&self) -> usize {
        self.ring.bits() + HOP_MARGIN
    }

    /// Returns true if a hint may still replace the walk: only once, before the
    /// first hop, while this node is the one being asked.
    pub fn can_try_hint(&self) -> bool {
        matches!(self.phase, Phase::Walking)
            && !self.hint_tried
            && self.hops == 0
            && self.current.id == self.me
    }

    // === Public Methods ===

    pub fn start(&self) -> LookupStep {
        LookupStep::FindClosest(self.current)
    }

    /// Advance with the [current](Self::current) node's answer.
    pub fn on_closest(&mut self, reply: ClosestReply) -> LookupStep {
        if !matches!(self.phase, Phase::Walking) {
            return LookupStep::Failed(Failure::ProtocolError);
        }

        let current = self.current;
        let current_position = self.ring.position(&current.id);
        let successor_position = self.ring.position(&reply.successor.id);

        if self
            .ring
            .between_right_incl(current_position, self.target, successor_position)
            || reply.node.id == current.id
        {
            return self.found(current, reply.successor);
        }

        let next_position = self.ring.position(&reply.node.id);

        if current.id != self.me && !self.ring.between(current_position, next_position, self.target)
        {
            debug!(
                target = %self.target,
                ?current,
                next = ?reply.node,
                "Lookup reply does not make progress toward the target"
            );

            return LookupStep::Failed(Failure::ProtocolError);
        }

        self.hops += 1;

        if self.hops > self.budget() {
            debug!(target = %self.target, hops = self.hops, "Lookup exceeded its hop budget");

            return LookupStep::Failed(Failure::ProtocolError);
        }

        self.current = reply.node;
        self.route.push(reply.node.address);

        LookupStep::FindClosest(reply.node)
    }

    /// Try to resolve the target in one hop through `hint`, the successor a past
    /// lookup found for it.
    pub fn try_hint(&mut self, hint: Node) -> LookupStep {
        if !self.can_try_hint() {
            return LookupStep::FindClosest(self.current);
        }

        self.hint_tried = true;
        self.phase = Phase::Hinted { hint };

        LookupStep::GetPredecessor(hint)
    }

    /// Advance with the hinted node's immediate predecessor.
    ///
    /// The hint is confirmed if the target lies in `(predecessor, hint]`, otherwise
    /// the lookup walks from where it started as if no hint existed.
    pub fn on_hint_predecessor(&mut self, predecessor: Node) -> LookupStep {
        let Phase::Hinted { hint } = self.phase else {
            return LookupStep::Failed(Failure::ProtocolError);
        };

        self.phase = Phase::Walking;

        let confirmed = predecessor.id != hint.id
            && self.ring.between_right_incl(
                self.ring.position(&predecessor.id),
                self.target,
                self.ring.position(&hint.id),
            );

        if !confirmed {
            trace!(target = %self.target, ?hint, ?predecessor, "Stale lookup hint");

            return LookupStep::FindClosest(self.current);
        }

        self.hops += 1;
        self.route.push(hint.address);

        self.done(predecessor, hint)
    }

    /// The hinted node did not answer, walk instead.
    pub fn on_hint_failed(&mut self) -> LookupStep {
        match self.phase {
            Phase::Hinted { .. } => {
                self.phase = Phase::Walking;

                LookupStep::FindClosest(self.current)
            }
            _ => LookupStep::Failed(Failure::ProtocolError),
        }
    }

    /// Advance with the resolved predecessor's current successor.
    pub fn on_successor(&mut self, successor: Node) -> LookupStep {
        match self.phase {
            Phase::Confirming { predecessor } => self.done(predecessor, successor),
            Phase::Walking | Phase::Hinted { .. } => LookupStep::Failed(Failure::ProtocolError),
        }
    }

    // === Private Methods ===

    fn found(&mut self, predecessor: Node, successor: Node) -> LookupStep {
        match self.kind {
            LookupKind::Predecessor => self.done(predecessor, successor),
            LookupKind::Successor => {
                self.phase = Phase::Confirming { predecessor };

                LookupStep::GetSuccessor(predecessor)
            }
        }
    }

    fn done(&mut self, predecessor: Node, successor: Node) -> LookupStep {
        LookupStep::Done(LookupResponse {
            target: self.target,
            predecessor,
            successor,
            route: std::mem::take(&mut self.route),
        })
    }
}
