//! Periodic wedge verification and repair.

use std::time::{Duration, Instant};

use crate::common::{Id, RingPosition, RoutingTable, Side};

/// Default period between two stabilization cycles.
pub const DEFAULT_STABILIZE_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// One unit of work in a stabilization cycle.
pub enum Probe {
    /// Ask a live wedge entry for its neighbour on our side: its predecessor on the
    /// successor side, its successor on the predecessor side.
    Neighbor { side: Side, index: usize, node: Id },
    /// Look up the node closest to the near edge of a wedge that is not alive.
    Repair {
        side: Side,
        index: usize,
        target: RingPosition,
    },
}

#[derive(Debug)]
pub struct Stabilizer {
    period: Duration,
    last_cycle: Instant,
    cycles: u64,
}

impl Stabilizer {
    pub fn new(period: Duration) -> Self {
        Self::new_at(period, Instant::now())
    }

    /// First cycle will be due one `period` after `now`.
    pub fn new_at(period: Duration, now: Instant) -> Self {
        Stabilizer {
            period,
            last_cycle: now,
            cycles: 0,
        }
    }

    // === Getters ===

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Number of cycles started so far.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    // === Public Methods ===

    pub fn is_due(&self) -> bool {
        self.is_due_at(Instant::now())
    }

    pub fn is_due_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_cycle) >= self.period
    }

    /// Start a new cycle at `now` and return its probes.
    pub fn start_cycle_at(&mut self, now: Instant, routing_table: &RoutingTable) -> Vec<Probe> {
        self.last_cycle = now;
        self.cycles += 1;

        plan(routing_table)
    }
}

/// Probes for every wedge index on both sides of `routing_table`, innermost first.
pub fn plan(routing_table: &RoutingTable) -> Vec<Probe> {
    let bits = routing_table.ring().bits();
    let mut probes = Vec::with_capacity(bits * 2);

    for index in 1..=bits {
        for side in [Side::Successor, Side::Predecessor] {
            let Some(wedge) = routing_table.wedge(side, index) else {
                continue;
            };

            let probe = match wedge.live() {
                Some(node) => Probe::Neighbor { side, index, node },
                None => Probe::Repair {
                    side,
                    index,
                    target: repair_target(routing_table, side, index),
                },
            };

            probes.push(probe);
        }
    }

    probes
}

/// Lookup target used to fill wedge `index` of `side`: the successor of its start on the
/// successor side, the predecessor of its end on the predecessor side.
pub fn repair_target(routing_table: &RoutingTable, side: Side, index: usize) -> RingPosition {
    match routing_table.wedge(side, index) {
        Some(wedge) => match side {
            Side::Successor => wedge.start,
            Side::Predecessor => wedge.end,
        },
        None => routing_table.position(),
    }
}
