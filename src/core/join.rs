//! One-shot procedure populating the routing table from a bootstrap node.

use tracing::debug;

use crate::common::{Failure, Id, Node, RingPosition, RoutingTable, Side};
use crate::core::lookup::LookupKind;
use crate::core::stabilization::repair_target;

/// Attempts per remote lookup before giving up on it.
pub const MAX_RETRY: u8 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinTask {
    /// Look up our own position through the bootstrap node.
    Seed {
        bootstrap: Node,
        target: RingPosition,
    },
    /// Fill wedge `index` of `side`.
    Populate {
        side: Side,
        index: usize,
        target: RingPosition,
    },
}

impl JoinTask {
    pub fn kind(&self) -> LookupKind {
        match self {
            JoinTask::Seed { .. } => LookupKind::Successor,
            JoinTask::Populate {
                side: Side::Successor,
                ..
            } => LookupKind::Successor,
            JoinTask::Populate {
                side: Side::Predecessor,
                ..
            } => LookupKind::Predecessor,
        }
    }

    pub fn target(&self) -> RingPosition {
        match self {
            JoinTask::Seed { target, .. } => *target,
            JoinTask::Populate { target, .. } => *target,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Summary of a finished join.
pub struct JoinReport {
    /// `None` for the first node of a ring, which has nobody to join.
    pub bootstrap: Option<Node>,
    /// Attempts it took to reach the ring through the bootstrap node.
    pub seed_attempts: u8,
    pub successor: Option<Id>,
    pub predecessor: Option<Id>,
    /// Live wedges beyond wedge 0, both sides.
    pub live_wedges: usize,
    /// Wedges whose population lookups all failed, left to stabilization.
    pub unfilled: Vec<(Side, usize)>,
}

impl JoinReport {
    /// Report of a node starting a new ring on its own.
    pub fn alone() -> Self {
        JoinReport {
            bootstrap: None,
            seed_attempts: 0,
            successor: None,
            predecessor: None,
            live_wedges: 0,
            unfilled: Vec::new(),
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum JoinError {
    /// The bootstrap node could not be used to reach the ring.
    #[error("Bootstrap failed after {attempts} attempts, last failure: {last}")]
    BootstrapFailed { attempts: u8, last: Failure },

    /// The node was shut down before the join finished.
    #[error("Chord node was shutdown before joining")]
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinProgress {
    /// Start lookups for these tasks.
    Run(Vec<JoinTask>),
    /// Waiting for other tasks of the current wedge index.
    Pending,
    Done(JoinReport),
    Failed(JoinError),
}

#[derive(Debug)]
enum Phase {
    Seeding,
    Populating {
        index: usize,
        pending: Vec<(JoinTask, u8)>,
    },
    Finished,
}

#[derive(Debug)]
pub struct Join {
    bootstrap: Node,
    target: RingPosition,
    seed_attempts: u8,
    seeded: bool,
    phase: Phase,
    unfilled: Vec<(Side, usize)>,
}

impl Join {
    /// Join the ring `bootstrap` belongs to, at position `me`.
    pub fn new(bootstrap: Node, me: RingPosition) -> Self {
        Join {
            bootstrap,
            target: me,
            seed_attempts: 0,
            seeded: false,
            phase: Phase::Seeding,
            unfilled: Vec::new(),
        }
    }

    // === Getters ===

    pub fn bootstrap(&self) -> &Node {
        &self.bootstrap
    }

    pub fn seed_attempts(&self) -> u8 {
        self.seed_attempts
    }

    /// Returns true once the seed lookup succeeded.
    pub fn seeded(&self) -> bool {
        self.seeded
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.phase, Phase::Finished)
    }

    // === Public Methods ===

    pub fn start(&mut self) -> JoinTask {
        self.seed_attempts = 1;

        self.seed()
    }

    /// Advance with the outcome of a task's lookup.
    pub fn on_result(
        &mut self,
        task: JoinTask,
        result: Result<(), Failure>,
        routing_table: &RoutingTable,
    ) -> JoinProgress {
        match task {
            JoinTask::Seed { .. } => self.on_seed(result, routing_table),
            JoinTask::Populate { side, index, .. } => {
                self.on_populate(task, side, index, result, routing_table)
            }
        }
    }

    // === Private Methods ===

    fn seed(&self) -> JoinTask {
        JoinTask::Seed {
            bootstrap: self.bootstrap,
            target: self.target,
        }
    }

    fn on_seed(&mut self, result: Result<(), Failure>, routing_table: &RoutingTable) -> JoinProgress {
        if !matches!(self.phase, Phase::Seeding) {
            return JoinProgress::Pending;
        }

        match result {
            Ok(()) => {
                self.seeded = true;

                debug!(
                    bootstrap = ?self.bootstrap,
                    attempts = self.seed_attempts,
                    successor = ?routing_table.successor(),
                    predecessor = ?routing_table.predecessor(),
                    "Seeded routing table"
                );

                self.populate_index(1, routing_table)
            }
            Err(failure) if self.seed_attempts < MAX_RETRY => {
                debug!(attempt = self.seed_attempts, ?failure, "Retrying bootstrap");
                self.seed_attempts += 1;

                JoinProgress::Run(vec![self.seed()])
            }
            Err(failure) => {
                self.phase = Phase::Finished;

                JoinProgress::Failed(JoinError::BootstrapFailed {
                    attempts: self.seed_attempts,
                    last: failure,
                })
            }
        }
    }

    fn on_populate(
        &mut self,
        task: JoinTask,
        side: Side,
        index: usize,
        result: Result<(), Failure>,
        routing_table: &RoutingTable,
    ) -> JoinProgress {
        let Phase::Populating {
            index: current,
            pending,
        } = &mut self.phase
        else {
            return JoinProgress::Pending;
        };

        let Some(position) = pending.iter().position(|(t, _)| *t == task) else {
            return JoinProgress::Pending;
        };

        match result {
            Ok(()) => {
                pending.swap_remove(position);
            }
            Err(failure) => {
                let attempts = &mut pending[position].1;

                if *attempts < MAX_RETRY {
                    *attempts += 1;
                    return JoinProgress::Run(vec![task]);
                }

                debug!(?side, index, ?failure, "Giving up on populating wedge");

                pending.swap_remove(position);
                self.unfilled.push((side, index));
            }
        }

        if !pending.is_empty() {
            return JoinProgress::Pending;
        }

        let next = *current + 1;
        self.populate_index(next, routing_table)
    }

    fn populate_index(&mut self, index: usize, routing_table: &RoutingTable) -> JoinProgress {
        if index > routing_table.ring().bits() {
            self.phase = Phase::Finished;

            return JoinProgress::Done(JoinReport {
                bootstrap: Some(self.bootstrap),
                seed_attempts: self.seed_attempts,
                successor: routing_table.successor(),
                predecessor: routing_table.predecessor(),
                live_wedges: routing_table.live_wedges(),
                unfilled: std::mem::take(&mut self.unfilled),
            });
        }

        let tasks = [Side::Successor, Side::Predecessor]
            .into_iter()
            .map(|side| JoinTask::Populate {
                side,
                index,
                target: repair_target(routing_table, side, index),
            })
            .collect::<Vec<_>>();

        self.phase = Phase::Populating {
            index,
            pending: tasks.iter().map(|task| (*task, 1)).collect(),
        };

        JoinProgress::Run(tasks)
    }
}
