//! Bidirectional finger table made of successor and predecessor wedges.
//!
//! Wedge `i` of the successor side covers positions whose clockwise distance from
//! this node has bit length `i`, i.e. `[me + 2^(i-1), me + 2^i)`. The predecessor
//! side mirrors it counter-clockwise. Wedge 0 of both sides holds only this node.

use std::fmt::{self, Display, Formatter};
use std::num::NonZeroUsize;

use tracing::debug;

use crate::common::{bit_length, HintCache, Id, Ring, RingPosition, DEFAULT_HINT_CAPACITY, NBIT};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// Which half of the routing table.
pub enum Side {
    Successor,
    Predecessor,
}

impl Display for Side {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Side::Successor => write!(f, "successor"),
            Side::Predecessor => write!(f, "predecessor"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// One finger table segment.
pub struct Wedge {
    /// Inclusive start of the interval.
    pub start: RingPosition,
    /// Exclusive end of the interval.
    pub end: RingPosition,
    /// Closest known node inside the interval: lowest on the successor side,
    /// highest on the predecessor side.
    pub first: Option<Id>,
    pub alive: bool,
}

impl Wedge {
    const EMPTY: Wedge = Wedge {
        start: RingPosition(0),
        end: RingPosition(0),
        first: None,
        alive: false,
    };

    /// Returns the `first` node if this wedge is alive.
    pub fn live(&self) -> Option<Id> {
        if self.alive {
            self.first
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Local answer to "where should a lookup go next", see [RoutingTable::lookup_any_local].
pub enum LocalHop {
    /// Successor a past lookup found for this exact target, worth confirming
    /// before walking.
    Hint(Id),
    /// Closest preceding live node, this node itself if none.
    Preceding(Id),
}

impl LocalHop {
    pub fn id(&self) -> Id {
        match self {
            LocalHop::Hint(id) | LocalHop::Preceding(id) => *id,
        }
    }
}

#[derive(Debug)]
/// Wedges on both sides of this node, plus the hints learned from past lookups.
pub struct RoutingTable {
    ring: Ring,
    id: Id,
    position: RingPosition,
    successors: [Wedge; NBIT + 1],
    predecessors: [Wedge; NBIT + 1],
    hints: HintCache,
}

impl RoutingTable {
    /// Create a new [RoutingTable] for the node `id` on `ring`.
    pub fn new(ring: Ring, id: Id) -> Self {
        Self::with_hint_capacity(ring, id, DEFAULT_HINT_CAPACITY)
    }

    pub fn with_hint_capacity(ring: Ring, id: Id, hint_capacity: usize) -> Self {
        let position = ring.position(&id);

        let mut successors = [Wedge::EMPTY; NBIT + 1];
        let mut predecessors = [Wedge::EMPTY; NBIT + 1];

        for index in 0..=ring.bits() {
            let (start, end) = Self::succ_interval(&ring, position, index);
            successors[index].start = start;
            successors[index].end = end;

            let (start, end) = Self::pred_interval(&ring, position, index);
            predecessors[index].start = start;
            predecessors[index].end = end;
        }

        for wedges in [&mut successors, &mut predecessors] {
            wedges[0].first = Some(id);
            wedges[0].alive = true;
        }

        RoutingTable {
            ring,
            id,
            position,
            successors,
            predecessors,
            hints: HintCache::new(NonZeroUsize::new(hint_capacity).unwrap_or(NonZeroUsize::MIN)),
        }
    }

    // === Getters ===

    /// Returns the [Id] of this node.
    pub fn id(&self) -> &Id {
        &self.id
    }

    pub fn ring(&self) -> &Ring {
        &self.ring
    }

    pub fn position(&self) -> RingPosition {
        self.position
    }

    /// Wedges `0..=bits` of one side.
    pub fn wedges(&self, side: Side) -> &[Wedge] {
        &self.side(side)[..=self.ring.bits()]
    }

    pub fn wedge(&self, side: Side, index: usize) -> Option<&Wedge> {
        self.wedges(side).get(index)
    }

    /// Immediate successor: the first node of the lowest live successor wedge.
    pub fn successor(&self) -> Option<Id> {
        self.nearest(Side::Successor)
    }

    /// Immediate predecessor: the first node of the lowest live predecessor wedge.
    pub fn predecessor(&self) -> Option<Id> {
        self.nearest(Side::Predecessor)
    }

    pub fn hints(&self) -> &HintCache {
        &self.hints
    }

    /// Number of live wedges beyond wedge 0 on both sides.
    pub fn live_wedges(&self) -> usize {
        [Side::Successor, Side::Predecessor]
            .iter()
            .map(|side| {
                self.wedges(*side)
                    .iter()
                    .skip(1)
                    .filter(|w| w.live().is_some())
                    .count()
            })
            .sum()
    }

    /// Distinct live nodes referenced by either side, excluding this node.
    pub fn nodes(&self) -> Vec<Id> {
        let mut nodes = Vec::new();

        for side in [Side::Successor, Side::Predecessor] {
            for wedge in self.wedges(side).iter().skip(1) {
                if let Some(id) = wedge.live() {
                    if !nodes.contains(&id) {
                        nodes.push(id);
                    }
                }
            }
        }

        nodes
    }

    // === Public Methods ===

    /// Which wedge of `side` the `target` falls into.
    pub fn wedge_index(&self, side: Side, target: RingPosition) -> usize {
        let distance = match side {
            Side::Successor => self.ring.distance(self.position, target),
            Side::Predecessor => self.ring.distance(target, self.position),
        };

        bit_length(distance)
    }

    /// Offer `candidate` to successor wedge `index`, returns `true` if it was installed.
    pub fn notice_successor(&mut self, index: usize, candidate: Id) -> bool {
        self.notice_at(Side::Successor, index, candidate)
    }

    /// Offer `candidate` to predecessor wedge `index`, returns `true` if it was installed.
    pub fn notice_predecessor(&mut self, index: usize, candidate: Id) -> bool {
        self.notice_at(Side::Predecessor, index, candidate)
    }

    /// Offer `candidate` to the wedge it falls into on `side`.
    pub fn notice_side(&mut self, side: Side, candidate: Id) -> bool {
        let index = self.wedge_index(side, self.ring.position(&candidate));
        self.notice_at(side, index, candidate)
    }

    /// Offer `candidate` to the wedges it falls into on both sides.
    pub fn notice(&mut self, candidate: Id) -> bool {
        let successor = self.notice_side(Side::Successor, candidate);
        let predecessor = self.notice_side(Side::Predecessor, candidate);

        successor || predecessor
    }

    /// Mark a wedge as not alive, it will be repaired by stabilization.
    pub fn set_wedge_dead(&mut self, side: Side, index: usize) {
        if index == 0 || index > self.ring.bits() {
            return;
        }

        let wedge = &mut self.side_mut(side)[index];
        if wedge.alive {
            debug!(?side, index, first = ?wedge.first, "Wedge marked dead");
        }
        wedge.alive = false;
    }

    /// Mark every wedge pointing at `id` as dead, and drop hints leading to it.
    pub fn set_node_dead(&mut self, id: &Id) {
        for side in [Side::Successor, Side::Predecessor] {
            for index in 1..=self.ring.bits() {
                if self.side(side)[index].first.as_ref() == Some(id) {
                    self.set_wedge_dead(side, index);
                }
            }
        }

        self.hints.forget(id);
    }

    /// Remember the successor a lookup found for `target`.
    pub fn remember(&mut self, target: RingPosition, successor: Id) {
        if successor != self.id {
            self.hints.insert(target, successor);
        }
    }

    /// Any known node that is a plausible answer for `target`.
    ///
    /// Prefers a live hint from a past lookup, and falls back to the closest
    /// preceding live wedge entry (possibly this node itself). A hint lies at or
    /// after `target`, so it is not a next hop to walk through.
    pub fn lookup_any_local(
        &mut self,
        target: RingPosition,
        is_alive: impl Fn(&Id) -> bool,
    ) -> LocalHop {
        if let Some(hint) = self.hints.get(&target) {
            if hint != self.id && is_alive(&hint) {
                return LocalHop::Hint(hint);
            }
        }

        LocalHop::Preceding(self.closest_preceding(target))
    }

    /// The live entry of the successor wedge containing `target`, if it is at or
    /// after `target`.
    pub fn lookup_close_local(&self, target: RingPosition) -> Option<Id> {
        let index = self.wedge_index(Side::Successor, target);
        let wedge = &self.successors[index];

        let first = wedge.live()?;

        if self
            .ring
            .between_left_incl(target, self.ring.position(&first), wedge.end)
        {
            Some(first)
        } else {
            None
        }
    }

    /// Live node closest to `target` from below, strictly between this node and `target`.
    ///
    /// Returns this node's id if none is known.
    pub fn closest_preceding(&self, target: RingPosition) -> Id {
        let mut best = self.id;
        // Targeting our own position, everything else precedes it.
        let mut best_distance = match self.ring.distance(self.position, target) {
            0 => self.ring.size(),
            distance => distance,
        };

        for id in self.nodes() {
            let position = self.ring.position(&id);

            if self.ring.between(self.position, position, target) {
                let distance = self.ring.distance(position, target);
                if distance < best_distance {
                    best = id;
                    best_distance = distance;
                }
            }
        }

        best
    }

    /// Live node closest to `target` at or after it, this node included.
    pub fn closest_succeeding(&self, target: RingPosition) -> Id {
        let mut best = self.id;
        let mut best_distance = self.ring.distance(target, self.position);

        for id in self.nodes() {
            let distance = self.ring.distance(target, self.ring.position(&id));
            if distance < best_distance {
                best = id;
                best_distance = distance;
            }
        }

        best
    }

    // === Private Methods ===

    fn notice_at(&mut self, side: Side, index: usize, candidate: Id) -> bool {
        if index == 0 || index > self.ring.bits() || candidate == self.id {
            return false;
        }

        let ring = self.ring;
        let position = ring.position(&candidate);
        let wedge = &mut self.side_mut(side)[index];

        if !ring.between_left_incl(wedge.start, position, wedge.end) {
            return false;
        }

        if let Some(current) = wedge.live() {
            if current == candidate {
                return false;
            }

            let current_position = ring.position(&current);
            let closer = match side {
                Side::Successor => ring.closer_succeeding(wedge.start, position, current_position),
                Side::Predecessor => {
                    let near = ring.sub(wedge.end, 1);
                    ring.closer_preceding(near, position, current_position)
                }
            };

            if !closer {
                return false;
            }
        }

        debug!(?side, index, ?candidate, replaced = ?wedge.first, "Wedge updated");

        wedge.first = Some(candidate);
        wedge.alive = true;

        true
    }

    fn nearest(&self, side: Side) -> Option<Id> {
        self.wedges(side).iter().skip(1).find_map(|w| w.live())
    }

    fn side(&self, side: Side) -> &[Wedge; NBIT + 1] {
        match side {
            Side::Successor => &self.successors,
            Side::Predecessor => &self.predecessors,
        }
    }

    fn side_mut(&mut self, side: Side) -> &mut [Wedge; NBIT + 1] {
        match side {
            Side::Successor => &mut self.successors,
            Side::Predecessor => &mut self.predecessors,
        }
    }

    fn succ_interval(ring: &Ring, position: RingPosition, index: usize) -> (RingPosition, RingPosition) {
        if index == 0 {
            return (position, ring.add(position, 1));
        }

        (
            ring.add(position, 1 << (index - 1)),
            ring.add(position, 1 << index),
        )
    }

    fn pred_interval(ring: &Ring, position: RingPosition, index: usize) -> (RingPosition, RingPosition) {
        if index == 0 {
            return (position, ring.add(position, 1));
        }

        (
            ring.add(ring.sub(position, 1 << index), 1),
            ring.add(ring.sub(position, 1 << (index - 1)), 1),
        )
    }
}
