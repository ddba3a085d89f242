//! Deterministic in-memory rings, for tests and simulations.

use std::collections::{HashMap, HashSet, VecDeque};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::trace;

use crate::actor::transport::{ConnectionId, Transport, TransportEvent};
use crate::actor::{Actor, Config, QueryId, QueryOutcome};
use crate::common::{Message, MessageType, RequestSpecific, Ring, RingPosition};
use crate::core::join::{JoinError, JoinReport};
use crate::Result;

/// Rounds of ticks at a single instant before giving up on the ring going quiet.
const MAX_ROUNDS: usize = 1000;

#[derive(Debug, Default)]
struct Hub {
    inboxes: HashMap<SocketAddr, VecDeque<(SocketAddr, Message)>>,
    down: HashSet<SocketAddr>,
}

#[derive(Debug, Clone, Default)]
/// Shared medium connecting [MemoryTransport]s, delivering messages instantly.
pub struct MemoryNetwork {
    hub: Arc<Mutex<Hub>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a new host at `address`.
    pub fn transport(&self, address: SocketAddr) -> MemoryTransport {
        self.hub().inboxes.entry(address).or_default();

        MemoryTransport {
            network: self.clone(),
            address,
            next_connection: 0,
            connections: HashMap::new(),
            events: VecDeque::new(),
        }
    }

    /// Silently drop everything sent to or from `address` while down.
    pub fn set_down(&self, address: SocketAddr, down: bool) {
        let mut hub = self.hub();

        if down {
            hub.down.insert(address);
        } else {
            hub.down.remove(&address);
        }
    }

    pub fn is_down(&self, address: &SocketAddr) -> bool {
        self.hub().down.contains(address)
    }

    fn hub(&self) -> MutexGuard<'_, Hub> {
        self.hub.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn deliver(&self, from: SocketAddr, to: SocketAddr, message: Message) {
        let mut hub = self.hub();

        if hub.down.contains(&from) || hub.down.contains(&to) {
            trace!(?from, ?to, "Dropped message of a down host");
            return;
        }

        if let Some(inbox) = hub.inboxes.get_mut(&to) {
            inbox.push_back((from, message));
        }
    }
}

#[derive(Debug)]
/// [Transport] over a [MemoryNetwork].
///
/// Connecting succeeds for any attached host, down or not, and fails right away
/// for addresses nobody is attached to.
pub struct MemoryTransport {
    network: MemoryNetwork,
    address: SocketAddr,
    next_connection: ConnectionId,
    connections: HashMap<ConnectionId, SocketAddr>,
    events: VecDeque<TransportEvent>,
}

impl Transport for MemoryTransport {
    fn local_addr(&self) -> SocketAddr {
        self.address
    }

    fn connect(&mut self, address: SocketAddr) {
        if !self.network.hub().inboxes.contains_key(&address) {
            self.events
                .push_back(TransportEvent::ConnectFailed { address });
            return;
        }

        let connection = self.next_connection;
        self.next_connection += 1;

        self.connections.insert(connection, address);
        self.events
            .push_back(TransportEvent::Connected { address, connection });
    }

    fn send(&mut self, connection: ConnectionId, transaction_id: u32, request: RequestSpecific) {
        if let Some(to) = self.connections.get(&connection) {
            self.network.deliver(
                self.address,
                *to,
                Message {
                    transaction_id,
                    message_type: MessageType::Request(request),
                },
            );
        }
    }

    fn reply(&mut self, to: SocketAddr, transaction_id: u32, message: MessageType) {
        self.network.deliver(
            self.address,
            to,
            Message {
                transaction_id,
                message_type: message,
            },
        );
    }

    fn poll(&mut self) -> Option<TransportEvent> {
        if let Some(event) = self.events.pop_front() {
            return Some(event);
        }

        let (from, message) = {
            let mut hub = self.network.hub();

            if hub.down.contains(&self.address) {
                if let Some(inbox) = hub.inboxes.get_mut(&self.address) {
                    inbox.clear();
                }
                return None;
            }

            hub.inboxes.get_mut(&self.address)?.pop_front()?
        };

        let transaction_id = message.transaction_id;

        Some(match message.message_type {
            MessageType::Request(request) => TransportEvent::Request {
                from,
                transaction_id,
                request,
            },
            MessageType::Response(response) => TransportEvent::Response {
                from,
                transaction_id,
                response,
            },
            MessageType::Error(error) => TransportEvent::Error {
                from,
                transaction_id,
                error,
            },
        })
    }
}

#[derive(Debug)]
/// A ring of [Actor]s over a [MemoryNetwork], driven by a virtual clock.
///
/// Nodes are placed at explicit positions, and time only moves through
/// [Testnet::run_for], which makes failure detection and stabilization
/// reproducible.
pub struct Testnet {
    ring: Ring,
    network: MemoryNetwork,
    clock: Instant,
    nodes: Vec<Actor>,
    failed: HashSet<usize>,
    joins: HashMap<usize, Result<JoinReport, JoinError>>,
    outcomes: HashMap<(usize, QueryId), QueryOutcome>,
}

impl Testnet {
    /// Granularity of the virtual clock.
    pub const STEP: Duration = Duration::from_millis(100);

    /// Create an empty ring `bits` wide.
    pub fn new(bits: u8) -> Result<Self> {
        Ok(Testnet {
            ring: Ring::new(bits)?,
            network: MemoryNetwork::new(),
            clock: Instant::now(),
            nodes: Vec::new(),
            failed: HashSet::new(),
            joins: HashMap::new(),
            outcomes: HashMap::new(),
        })
    }

    // === Getters ===

    pub fn ring(&self) -> &Ring {
        &self.ring
    }

    pub fn network(&self) -> &MemoryNetwork {
        &self.network
    }

    /// Current virtual time.
    pub fn now(&self) -> Instant {
        self.clock
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Panics if `index` is out of bounds.
    pub fn node(&self, index: usize) -> &Actor {
        &self.nodes[index]
    }

    pub fn node_mut(&mut self, index: usize) -> &mut Actor {
        &mut self.nodes[index]
    }

    /// Outcome of the last join of node `index`, once finished.
    pub fn join_outcome(&self, index: usize) -> Option<&Result<JoinReport, JoinError>> {
        self.joins.get(&index)
    }

    // === Public Methods ===

    /// Add a node at `position`, alone until it joins. Returns its index.
    pub fn add_node(&mut self, position: u32) -> Result<usize> {
        self.add_node_with(position, Config::default())
    }

    /// Same as [Self::add_node], with custom timeouts and periods.
    ///
    /// The `bits`, `id` and `transport` of `config` are overridden.
    pub fn add_node_with(&mut self, position: u32, mut config: Config) -> Result<usize> {
        let index = self.nodes.len();
        let address = Self::address(index);

        config.bits = self.ring.bits() as u8;
        config.id = Some(self.ring.id_at(RingPosition(position)));
        config.transport = Some(Box::new(self.network.transport(address)));

        let actor = Actor::new_at(config, self.clock)?;
        self.nodes.push(actor);

        Ok(index)
    }

    /// Start joining node `index` through node `bootstrap`.
    pub fn join(&mut self, index: usize, bootstrap: usize) {
        let bootstrap = self.nodes[bootstrap].node();

        self.joins.remove(&index);
        self.nodes[index].join(bootstrap);
    }

    /// Start joining node `index` through whatever is at `address`.
    pub fn join_address(&mut self, index: usize, address: SocketAddr) {
        self.joins.remove(&index);
        self.nodes[index].join(crate::common::Node::from_address(address));
    }

    /// Start a lookup on node `index`, collect its outcome with [Self::outcome].
    pub fn find_successor(&mut self, index: usize, target: RingPosition) -> QueryId {
        self.nodes[index].find_successor(target)
    }

    /// Start a lookup on node `index`, collect its outcome with [Self::outcome].
    pub fn find_predecessor(&mut self, index: usize, target: RingPosition) -> QueryId {
        self.nodes[index].find_predecessor(target)
    }

    /// Take the outcome of a finished query.
    pub fn outcome(&mut self, index: usize, query: QueryId) -> Option<QueryOutcome> {
        self.outcomes.remove(&(index, query))
    }

    /// Crash node `index`: it stops ticking and the network drops its traffic.
    pub fn fail(&mut self, index: usize) {
        self.failed.insert(index);
        self.network.set_down(Self::address(index), true);
    }

    /// Advance the virtual clock by `duration`, letting the ring settle at every step.
    pub fn run_for(&mut self, duration: Duration) {
        let end = self.clock + duration;

        self.settle();

        while self.clock < end {
            self.clock = (self.clock + Self::STEP).min(end);
            self.settle();
        }
    }

    // === Private Methods ===

    fn address(index: usize) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 10_000 + index as u16))
    }

    /// Tick every live node until none has anything left to handle.
    fn settle(&mut self) {
        for _ in 0..MAX_ROUNDS {
            let mut handled = 0;

            for (index, node) in self.nodes.iter_mut().enumerate() {
                if self.failed.contains(&index) {
                    continue;
                }

                let report = node.tick_at(self.clock);
                handled += report.handled;

                for (query, outcome) in report.done_queries {
                    self.outcomes.insert((index, query), outcome);
                }

                if let Some(join) = report.join {
                    self.joins.insert(index, join);
                }
            }

            if handled == 0 {
                return;
            }
        }

        trace!("Ring did not settle");
    }
}
