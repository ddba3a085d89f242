//! Actor implementation - I/O orchestration layer for the Chord node.

pub(crate) mod config;
mod handle_request;
mod handle_response;
mod info;
pub mod locations;
pub mod transport;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::common::{
    Failure, Id, LocalHop, Node, RequestSpecific, RequestTypeSpecific, Ring, RingPosition,
    Role, RoutingTable, Side,
};
use crate::core::join::{Join, JoinError, JoinProgress, JoinReport, JoinTask};
use crate::core::lookup::{ClosestReply, Lookup, LookupKind, LookupResponse, LookupStep};
use crate::core::stabilization::{Probe, Stabilizer};
use crate::Result;

use locations::LocationRegistry;
use transport::{Transport, TransportEvent, UdpTransport};

pub use config::Config;
pub use info::{Info, LookupStatistics};

/// Default timeout of remote calls.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

/// Handle of a query started on an [Actor], reported back in [TickReport::done_queries].
pub type QueryId = u64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryOutcome {
    /// Outcome of [Actor::find_successor] or [Actor::find_predecessor].
    Lookup(Result<LookupResponse, Failure>),
    /// Outcome of [Actor::get_successor] or [Actor::get_predecessor].
    Neighbor(Result<Node, Failure>),
}

#[derive(Debug, Clone, Copy)]
/// Why a remote call was made.
pub(crate) enum Purpose {
    Lookup(QueryId),
    Neighbor(QueryId),
    Probe(Probe),
    Notify,
    Alert,
}

#[derive(Debug, Clone, Copy)]
enum LookupPurpose {
    Client,
    Join(JoinTask),
    Repair { side: Side, index: usize },
}

#[derive(Debug)]
struct PendingLookup {
    lookup: Lookup,
    purpose: LookupPurpose,
}

#[derive(Debug)]
/// Internal Actor called in the Chord thread loop, useful to create your own actor setup.
///
/// Nothing here blocks: operations start work and return a [QueryId], and
/// [Actor::tick] advances it and reports what finished.
pub struct Actor {
    me: Node,
    transport: Box<dyn Transport>,
    routing_table: RoutingTable,
    locations: LocationRegistry<Purpose>,
    stabilizer: Stabilizer,
    /// Time of the last tick, used to stamp remote calls.
    now: Instant,

    next_query: QueryId,
    lookups: HashMap<QueryId, PendingLookup>,

    join: Option<Join>,
    join_status: Option<Result<JoinReport, JoinError>>,
    bootstrap_failure: bool,

    statistics: LookupStatistics,

    // Reported by the next tick.
    done_queries: Vec<(QueryId, QueryOutcome)>,
    join_outcome: Option<Result<JoinReport, JoinError>>,
}

impl Actor {
    /// Creates a new Actor, and starts joining [Config::bootstrap] if any.
    pub fn new(config: Config) -> Result<Self> {
        Self::new_at(config, Instant::now())
    }

    /// Same as [Self::new], with the stabilization clock starting at `now`.
    pub fn new_at(config: Config, now: Instant) -> Result<Self> {
        let ring = Ring::new(config.bits)?;

        let transport: Box<dyn Transport> = match config.transport {
            Some(transport) => transport,
            None => Box::new(UdpTransport::bind(config.bind_address, config.port)?),
        };

        let address = transport.local_addr();
        // A wildcard address says nothing about where this node is reachable.
        let id = config.id.unwrap_or_else(|| {
            if address.ip().is_unspecified() {
                Id::random()
            } else {
                Id::from_address(address)
            }
        });

        info!(?id, position = %ring.position(&id), ?address, "Chord node listening");

        let mut actor = Actor {
            me: Node::new(id, address),
            transport,
            routing_table: RoutingTable::with_hint_capacity(ring, id, config.hint_capacity),
            locations: LocationRegistry::new(config.request_timeout),
            stabilizer: Stabilizer::new_at(config.stabilize_interval, now),
            now,

            next_query: 0,
            lookups: HashMap::new(),

            join: None,
            join_status: None,
            bootstrap_failure: false,

            statistics: LookupStatistics::default(),

            done_queries: Vec::new(),
            join_outcome: None,
        };

        match config.bootstrap {
            Some(bootstrap) => {
                actor.join(bootstrap);
            }
            None => actor.join_status = Some(Ok(JoinReport::alone())),
        }

        Ok(actor)
    }

    // === Getters ===

    /// Returns the node's Id
    pub fn id(&self) -> &Id {
        &self.me.id
    }

    /// Returns this node's id and address.
    pub fn node(&self) -> Node {
        self.me
    }

    /// Returns the address the transport is listening to.
    #[inline]
    pub fn local_addr(&self) -> SocketAddr {
        self.me.address
    }

    pub fn routing_table(&self) -> &RoutingTable {
        &self.routing_table
    }

    /// Immediate successor, `None` if no other node is known.
    pub fn successor(&self) -> Option<Node> {
        self.routing_table
            .successor()
            .and_then(|id| self.node_of(&id))
    }

    /// Immediate predecessor, `None` if no other node is known.
    pub fn predecessor(&self) -> Option<Node> {
        self.routing_table
            .predecessor()
            .and_then(|id| self.node_of(&id))
    }

    /// Outcome of the last join, `None` while a join is in progress.
    pub fn join_status(&self) -> Option<&Result<JoinReport, JoinError>> {
        self.join_status.as_ref()
    }

    pub fn is_joining(&self) -> bool {
        self.join.is_some()
    }

    /// Returns `true` if the last join gave up on its bootstrap node.
    pub fn bootstrap_failure(&self) -> bool {
        self.bootstrap_failure
    }

    pub fn stabilization_cycles(&self) -> u64 {
        self.stabilizer.cycles()
    }

    /// Remote calls issued and not completed yet.
    pub fn outstanding_rpcs(&self) -> usize {
        self.locations.outstanding()
    }

    pub fn lookup_statistics(&self) -> &LookupStatistics {
        &self.statistics
    }

    pub(crate) fn locations(&self) -> &LocationRegistry<Purpose> {
        &self.locations
    }

    /// Returns a thread safe and lightweight summary of this node's
    /// information and statistics.
    pub fn info(&self) -> Info {
        Info::from(self)
    }

    // === Public Methods ===

    /// Handles pending messages, expires calls and runs stabilization when due.
    ///
    /// Call periodically; delays degrade lookup latency and failure detection.
    pub fn tick(&mut self) -> TickReport {
        self.tick_at(Instant::now())
    }

    /// Same as [Self::tick] at an explicit instant.
    pub fn tick_at(&mut self, now: Instant) -> TickReport {
        self.now = now;

        let mut handled = 0;

        while let Some(event) = self.transport.poll() {
            handled += 1;

            match event {
                TransportEvent::Request {
                    from,
                    transaction_id,
                    request,
                } => self.handle_request(from, transaction_id, request),
                event => self
                    .locations
                    .on_event(event, self.transport.as_mut(), now),
            }
        }

        self.locations.expire(now);
        self.process_completions();

        if self.join.is_none() && self.stabilizer.is_due_at(now) {
            self.stabilize();
            self.process_completions();
        }

        TickReport {
            done_queries: std::mem::take(&mut self.done_queries),
            join: self.join_outcome.take(),
            handled,
        }
    }

    /// Start resolving the first node at or after `target`.
    pub fn find_successor(&mut self, target: RingPosition) -> QueryId {
        let query = self.start_lookup(LookupKind::Successor, target, LookupPurpose::Client, self.me);
        self.process_completions();
        query
    }

    /// Start resolving the last node strictly before `target`.
    pub fn find_predecessor(&mut self, target: RingPosition) -> QueryId {
        let query =
            self.start_lookup(LookupKind::Predecessor, target, LookupPurpose::Client, self.me);
        self.process_completions();
        query
    }

    /// Ask `node` for its immediate successor.
    pub fn get_successor(&mut self, node: Node) -> QueryId {
        self.neighbor_query(node, RequestTypeSpecific::GetSuccessor)
    }

    /// Ask `node` for its immediate predecessor.
    pub fn get_predecessor(&mut self, node: Node) -> QueryId {
        self.neighbor_query(node, RequestTypeSpecific::GetPredecessor)
    }

    /// Join the ring `bootstrap` belongs to.
    ///
    /// Returns `false` without doing anything if a join is already in progress,
    /// its outcome will be reported in [TickReport::join].
    pub fn join(&mut self, bootstrap: Node) -> bool {
        if self.join.is_some() {
            debug!(?bootstrap, "Join already in progress");
            return false;
        }

        info!(?bootstrap, "Joining the ring");

        if bootstrap.id != self.me.id {
            self.locations.resolve(bootstrap, bootstrap.id);
        }

        let mut join = Join::new(bootstrap, self.routing_table.position());
        let task = join.start();

        self.join = Some(join);
        self.join_status = None;
        self.bootstrap_failure = false;

        self.run_join_task(task);
        self.process_completions();

        true
    }

    /// Start a stabilization cycle now, regardless of the period.
    pub fn stabilize_now(&mut self) {
        self.stabilize();
        self.process_completions();
    }

    // === Private Methods ===

    /// Increments self.next_query and returns the previous value.
    fn query_id(&mut self) -> QueryId {
        let query = self.next_query;
        self.next_query = self.next_query.wrapping_add(1);
        query
    }

    /// Address of a node we know about, this node included.
    fn node_of(&self, id: &Id) -> Option<Node> {
        if *id == self.me.id {
            return Some(self.me);
        }

        self.locations.get(id).map(|location| location.node())
    }

    fn successor_node(&self) -> Node {
        self.successor().unwrap_or(self.me)
    }

    fn predecessor_node(&self) -> Node {
        self.predecessor().unwrap_or(self.me)
    }

    fn call(&mut self, id: Id, request_type: RequestTypeSpecific, purpose: Purpose) {
        let request = RequestSpecific {
            requester_id: self.me.id,
            request_type,
        };

        self.locations
            .invoke(id, request, purpose, self.transport.as_mut(), self.now);
    }

    fn process_completions(&mut self) {
        loop {
            let completions = self.locations.drain_completions();

            if completions.is_empty() {
                break;
            }

            for completion in completions {
                self.handle_completion(completion);
            }
        }
    }

    fn neighbor_query(&mut self, node: Node, request_type: RequestTypeSpecific) -> QueryId {
        let query = self.query_id();

        if node.id == self.me.id {
            let neighbor = match request_type {
                RequestTypeSpecific::GetPredecessor => self.predecessor_node(),
                _ => self.successor_node(),
            };

            self.done_queries
                .push((query, QueryOutcome::Neighbor(Ok(neighbor))));

            return query;
        }

        self.locations.resolve(node, self.me.id);
        self.call(node.id, request_type, Purpose::Neighbor(query));
        self.process_completions();

        query
    }

    fn start_lookup(
        &mut self,
        kind: LookupKind,
        target: RingPosition,
        purpose: LookupPurpose,
        origin: Node,
    ) -> QueryId {
        let query = self.query_id();

        let lookup = Lookup::new(*self.routing_table.ring(), self.me.id, kind, target, origin);
        let step = lookup.start();

        self.lookups.insert(query, PendingLookup { lookup, purpose });
        self.statistics.started += 1;

        self.advance(query, step);

        query
    }

    /// Drive a lookup until it needs a remote answer or finishes.
    fn advance(&mut self, query: QueryId, mut step: LookupStep) {
        loop {
            step = match step {
                LookupStep::FindClosest(node) => {
                    let Some(target) = self.lookups.get(&query).map(|p| p.lookup.target()) else {
                        return;
                    };

                    if node.id != self.me.id {
                        self.call(
                            node.id,
                            RequestTypeSpecific::FindClosestPredecessor { target },
                            Purpose::Lookup(query),
                        );
                        return;
                    }

                    match self.local_step(query, target) {
                        Some(step) => step,
                        None => return,
                    }
                }
                LookupStep::GetSuccessor(node) => {
                    if node.id != self.me.id {
                        self.call(
                            node.id,
                            RequestTypeSpecific::GetSuccessor,
                            Purpose::Lookup(query),
                        );
                        return;
                    }

                    let successor = self.successor_node();

                    match self.lookups.get_mut(&query) {
                        Some(pending) => pending.lookup.on_successor(successor),
                        None => return,
                    }
                }
                LookupStep::GetPredecessor(node) => {
                    self.call(
                        node.id,
                        RequestTypeSpecific::GetPredecessor,
                        Purpose::Lookup(query),
                    );
                    return;
                }
                LookupStep::Done(response) => {
                    self.finish_lookup(query, Ok(response));
                    return;
                }
                LookupStep::Failed(failure) => {
                    self.finish_lookup(query, Err(failure));
                    return;
                }
            }
        }
    }

    /// This node's own answer to a lookup step.
    ///
    /// A live hint for the target is confirmed with its owner before walking, unless
    /// the target falls between this node and its successor anyway.
    fn local_step(&mut self, query: QueryId, target: RingPosition) -> Option<LookupStep> {
        let ring = *self.routing_table.ring();
        let successor = self.successor_node();

        let resolved_here = ring.between_right_incl(
            self.routing_table.position(),
            target,
            ring.position(&successor.id),
        );

        let locations = &self.locations;
        let hop = self
            .routing_table
            .lookup_any_local(target, |id| locations.is_alive(id));

        let (hint, next) = match hop {
            LocalHop::Hint(hint) if !resolved_here => (
                self.node_of(&hint),
                self.routing_table.closest_preceding(target),
            ),
            LocalHop::Hint(_) => (None, self.routing_table.closest_preceding(target)),
            LocalHop::Preceding(next) => (None, next),
        };

        let reply = ClosestReply {
            node: self.node_of(&next).unwrap_or(self.me),
            successor,
        };

        let lookup = &mut self.lookups.get_mut(&query)?.lookup;

        Some(match hint {
            Some(hint) if lookup.can_try_hint() => lookup.try_hint(hint),
            _ => lookup.on_closest(reply),
        })
    }

    fn finish_lookup(&mut self, query: QueryId, result: Result<LookupResponse, Failure>) {
        let Some(PendingLookup { lookup, purpose }) = self.lookups.remove(&query) else {
            return;
        };

        match &result {
            Ok(response) => {
                self.statistics.succeeded += 1;
                self.statistics.hops += response.hops() as u64;

                self.routing_table
                    .remember(response.target, response.successor.id);

                debug!(
                    target = %response.target,
                    kind = ?lookup.kind(),
                    node = ?response.node(lookup.kind()),
                    hops = response.hops(),
                    "Lookup done"
                );
            }
            Err(failure) => {
                self.statistics.failed += 1;

                debug!(target = %lookup.target(), kind = ?lookup.kind(), ?failure, "Lookup failed");
            }
        }

        match purpose {
            LookupPurpose::Client => self
                .done_queries
                .push((query, QueryOutcome::Lookup(result))),
            LookupPurpose::Join(task) => self.on_join_result(task, lookup.kind(), result),
            LookupPurpose::Repair { side, index } => {
                if let Ok(response) = result {
                    let node = response.node(lookup.kind());

                    debug!(?side, index, ?node, "Wedge repair lookup done");

                    self.offer(side, node.id);
                }
            }
        }
    }

    /// Offer a known live node to one side of the routing table.
    fn offer(&mut self, side: Side, id: Id) {
        if id != self.me.id && self.locations.is_alive(&id) {
            self.routing_table.notice_side(side, id);
        }
    }

    // === Join ===

    fn run_join_task(&mut self, task: JoinTask) {
        let origin = match task {
            JoinTask::Seed { bootstrap, .. } => bootstrap,
            JoinTask::Populate { .. } => self.me,
        };

        self.start_lookup(task.kind(), task.target(), LookupPurpose::Join(task), origin);
    }

    fn on_join_result(
        &mut self,
        task: JoinTask,
        kind: LookupKind,
        result: Result<LookupResponse, Failure>,
    ) {
        let outcome = match result {
            Ok(response) => {
                match task {
                    JoinTask::Seed { .. } => {
                        for side in [Side::Successor, Side::Predecessor] {
                            self.offer(side, response.successor.id);
                            self.offer(side, response.predecessor.id);
                        }
                    }
                    JoinTask::Populate { side, .. } => self.offer(side, response.node(kind).id),
                }

                Ok(())
            }
            Err(failure) => Err(failure),
        };

        let Some(join) = self.join.as_mut() else {
            return;
        };

        let was_seeded = join.seeded();
        let progress = join.on_result(task, outcome, &self.routing_table);
        let newly_seeded = !was_seeded && join.seeded();

        if newly_seeded {
            self.notify_neighbors();
        }

        match progress {
            JoinProgress::Run(tasks) => {
                for task in tasks {
                    self.run_join_task(task);
                }
            }
            JoinProgress::Pending => {}
            JoinProgress::Done(report) => {
                info!(
                    successor = ?report.successor,
                    predecessor = ?report.predecessor,
                    live_wedges = report.live_wedges,
                    unfilled = report.unfilled.len(),
                    "Joined the ring"
                );

                self.join = None;
                self.join_status = Some(Ok(report.clone()));
                self.join_outcome = Some(Ok(report));
            }
            JoinProgress::Failed(error) => {
                warn!(%error, "Could not join the ring");

                self.join = None;
                self.bootstrap_failure = true;
                self.join_status = Some(Err(error.clone()));
                self.join_outcome = Some(Err(error));
            }
        }
    }

    // === Stabilization ===

    /// Tell our neighbours we exist, so they can adopt us.
    fn notify_neighbors(&mut self) {
        let me = self.me;

        if let Some(successor) = self.routing_table.successor() {
            self.call(
                successor,
                RequestTypeSpecific::Notify {
                    role: Role::Predecessor,
                    node: me,
                },
                Purpose::Notify,
            );
        }

        if let Some(predecessor) = self.routing_table.predecessor() {
            self.call(
                predecessor,
                RequestTypeSpecific::Notify {
                    role: Role::Successor,
                    node: me,
                },
                Purpose::Notify,
            );
        }
    }

    fn stabilize(&mut self) {
        let probes = self
            .stabilizer
            .start_cycle_at(self.now, &self.routing_table);

        debug!(
            cycle = self.stabilizer.cycles(),
            live_wedges = self.routing_table.live_wedges(),
            "Stabilization cycle"
        );

        self.notify_neighbors();

        for probe in probes {
            match probe {
                Probe::Neighbor { side, node, .. } => {
                    let request_type = match side {
                        Side::Successor => RequestTypeSpecific::GetPredecessor,
                        Side::Predecessor => RequestTypeSpecific::GetSuccessor,
                    };

                    self.call(node, request_type, Purpose::Probe(probe));
                }
                Probe::Repair {
                    side,
                    index,
                    target,
                } => {
                    let kind = match side {
                        Side::Successor => LookupKind::Successor,
                        Side::Predecessor => LookupKind::Predecessor,
                    };

                    self.start_lookup(kind, target, LookupPurpose::Repair { side, index }, self.me);
                }
            }
        }
    }
}

/// Results from a single [`Actor::tick`] call.
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    /// Queries that finished since the previous tick.
    pub done_queries: Vec<(QueryId, QueryOutcome)>,
    /// Outcome of a join that finished since the previous tick.
    pub join: Option<Result<JoinReport, JoinError>>,
    /// Transport events handled during this tick.
    pub handled: usize,
}

#[cfg(test)]
mod test {
    use std::net::SocketAddr;

    use crate::common::{ErrorSpecific, MessageType, ResponseSpecific, Status, Wedge};
    use crate::testnet::{MemoryNetwork, MemoryTransport};

    use super::transport::ConnectionId;
    use super::*;

    const BITS: u8 = 8;

    fn address(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    /// A node at `position`, answering by hand over the memory network.
    struct Peer {
        node: Node,
        transport: MemoryTransport,
        connection: ConnectionId,
    }

    impl Peer {
        fn new(network: &MemoryNetwork, ring: &Ring, position: u32, actor: &Actor) -> Self {
            let node = Node::new(
                ring.id_at(RingPosition(position)),
                address(20_000 + position as u16),
            );
            let mut transport = network.transport(node.address);

            transport.connect(actor.local_addr());
            let Some(TransportEvent::Connected { connection, .. }) = transport.poll() else {
                panic!("could not connect to the actor");
            };

            Peer {
                node,
                transport,
                connection,
            }
        }

        /// Send a request to the actor and return its answer.
        fn ask(
            &mut self,
            actor: &mut Actor,
            now: Instant,
            request_type: RequestTypeSpecific,
        ) -> MessageType {
            self.transport.send(
                self.connection,
                7,
                RequestSpecific {
                    requester_id: self.node.id,
                    request_type,
                },
            );
            actor.tick_at(now);

            match self.transport.poll() {
                Some(TransportEvent::Response {
                    transaction_id: 7,
                    response,
                    ..
                }) => MessageType::Response(response),
                Some(TransportEvent::Error {
                    transaction_id: 7,
                    error,
                    ..
                }) => MessageType::Error(error),
                other => panic!("expected an answer, got {other:?}"),
            }
        }

        fn notify(&mut self, actor: &mut Actor, now: Instant, role: Role, node: Node) {
            let answer = self.ask(actor, now, RequestTypeSpecific::Notify { role, node });
            assert!(matches!(
                answer,
                MessageType::Response(ResponseSpecific::Ack { .. })
            ));
        }

        /// Requests received from the actor so far.
        fn requests(&mut self) -> Vec<(SocketAddr, u32, RequestTypeSpecific)> {
            let mut requests = Vec::new();

            while let Some(event) = self.transport.poll() {
                if let TransportEvent::Request {
                    from,
                    transaction_id,
                    request,
                } = event
                {
                    requests.push((from, transaction_id, request.request_type));
                }
            }

            requests
        }
    }

    fn setup() -> (MemoryNetwork, Ring, Actor, Instant) {
        let network = MemoryNetwork::new();
        let ring = Ring::new(BITS).unwrap();
        let now = Instant::now();

        let actor = Actor::new_at(
            Config {
                bits: BITS,
                id: Some(ring.id_at(RingPosition(0))),
                transport: Some(Box::new(network.transport(address(10_000)))),
                ..Default::default()
            },
            now,
        )
        .unwrap();

        (network, ring, actor, now)
    }

    fn live(actor: &Actor, side: Side, id: &Id) -> bool {
        let table = actor.routing_table();
        let index = table.wedge_index(side, table.ring().position(id));

        table.wedge(side, index).and_then(Wedge::live) == Some(*id)
    }

    #[test]
    fn notify_fills_the_side_matching_the_role() {
        let (network, ring, mut actor, now) = setup();

        let mut predecessor = Peer::new(&network, &ring, 100, &actor);
        let mut successor = Peer::new(&network, &ring, 200, &actor);

        let node = predecessor.node;
        predecessor.notify(&mut actor, now, Role::Predecessor, node);

        assert!(live(&actor, Side::Predecessor, &node.id));
        assert!(!live(&actor, Side::Successor, &node.id));
        assert_eq!(actor.predecessor(), Some(node));
        assert_eq!(actor.successor(), None);

        let node = successor.node;
        successor.notify(&mut actor, now, Role::Successor, node);

        assert!(live(&actor, Side::Successor, &node.id));
        assert!(!live(&actor, Side::Predecessor, &node.id));
        assert_eq!(actor.successor(), Some(node));
    }

    #[test]
    fn notify_ignores_nodes_known_dead() {
        let (network, ring, mut actor, now) = setup();
        let mut peer = Peer::new(&network, &ring, 100, &actor);

        // Nobody is attached at this address.
        let dead = Node::new(ring.id_at(RingPosition(60)), address(30_000));

        let query = actor.get_successor(dead);
        let report = actor.tick_at(now);
        assert_eq!(
            report.done_queries,
            vec![(query, QueryOutcome::Neighbor(Err(Failure::Unreachable)))]
        );
        assert!(!actor.locations().is_alive(&dead.id));

        peer.notify(&mut actor, now, Role::Successor, dead);

        assert!(!actor.routing_table().nodes().contains(&dead.id));
        assert_eq!(actor.successor(), None);

        // A live node reported the same way is adopted.
        let other = Peer::new(&network, &ring, 30, &actor);
        peer.notify(&mut actor, now, Role::Successor, other.node);

        assert!(live(&actor, Side::Successor, &other.node.id));
    }

    #[test]
    fn find_closest_successor_answer() {
        let (network, ring, mut actor, now) = setup();

        let mut near = Peer::new(&network, &ring, 100, &actor);
        let mut far = Peer::new(&network, &ring, 200, &actor);

        let node = near.node;
        near.notify(&mut actor, now, Role::Successor, node);
        let node = far.node;
        far.notify(&mut actor, now, Role::Successor, node);

        let answer = near.ask(
            &mut actor,
            now,
            RequestTypeSpecific::FindClosestSuccessor {
                target: RingPosition(150),
            },
        );

        assert_eq!(
            answer,
            MessageType::Response(ResponseSpecific::FindClosest {
                responder_id: *actor.id(),
                node: far.node,
                successor: near.node,
            })
        );

        // Past the last known node, the ring wraps back to this node.
        let answer = near.ask(
            &mut actor,
            now,
            RequestTypeSpecific::FindClosestSuccessor {
                target: RingPosition(201),
            },
        );

        assert_eq!(
            answer,
            MessageType::Response(ResponseSpecific::FindClosest {
                responder_id: *actor.id(),
                node: actor.node(),
                successor: near.node,
            })
        );
    }

    #[test]
    fn targets_outside_the_ring_are_rejected() {
        let (network, ring, mut actor, now) = setup();
        let mut peer = Peer::new(&network, &ring, 100, &actor);

        for request_type in [
            RequestTypeSpecific::FindClosestPredecessor {
                target: RingPosition(256),
            },
            RequestTypeSpecific::FindClosestSuccessor {
                target: RingPosition(u32::MAX),
            },
        ] {
            match peer.ask(&mut actor, now, request_type) {
                MessageType::Error(ErrorSpecific { status, .. }) => {
                    assert_eq!(status, Status::ProtocolError)
                }
                other => panic!("expected an error, got {other:?}"),
            }
        }

        // The last position is still inside.
        let answer = peer.ask(
            &mut actor,
            now,
            RequestTypeSpecific::FindClosestPredecessor {
                target: RingPosition(255),
            },
        );
        assert!(matches!(
            answer,
            MessageType::Response(ResponseSpecific::FindClosest { .. })
        ));
    }

    #[test]
    fn alert_introduces_a_candidate() {
        let (network, ring, mut actor, now) = setup();
        let mut peer = Peer::new(&network, &ring, 100, &actor);
        let candidate = Peer::new(&network, &ring, 30, &actor);

        let answer = peer.ask(
            &mut actor,
            now,
            RequestTypeSpecific::Alert {
                candidate: candidate.node,
            },
        );

        assert!(matches!(
            answer,
            MessageType::Response(ResponseSpecific::Ack { .. })
        ));
        assert!(live(&actor, Side::Successor, &candidate.node.id));
        assert_eq!(actor.successor(), Some(candidate.node));

        // Nobody can reach a wildcard address another node reports.
        let wildcard = Node::new(
            ring.id_at(RingPosition(20)),
            SocketAddr::from(([0, 0, 0, 0], 30_000)),
        );
        peer.ask(
            &mut actor,
            now,
            RequestTypeSpecific::Alert {
                candidate: wildcard,
            },
        );

        assert!(actor.locations().get(&wildcard.id).is_none());
        assert_eq!(actor.successor(), Some(candidate.node));
    }

    #[test]
    fn stale_predecessor_gets_alerted() {
        let (network, ring, mut actor, now) = setup();

        let mut closer = Peer::new(&network, &ring, 60, &actor);
        let mut further = Peer::new(&network, &ring, 100, &actor);

        let node = closer.node;
        closer.notify(&mut actor, now, Role::Successor, node);
        let node = further.node;
        further.notify(&mut actor, now, Role::Successor, node);

        actor.stabilize_now();
        actor.tick_at(now);

        let asked = further
            .requests()
            .into_iter()
            .find(|(_, _, request)| *request == RequestTypeSpecific::GetPredecessor);
        let Some((from, transaction_id, _)) = asked else {
            panic!("successor wedge entry was not asked for its predecessor");
        };

        // Still pointing back at the actor, unaware of the node in between.
        further.transport.reply(
            from,
            transaction_id,
            MessageType::Response(ResponseSpecific::Neighbor {
                responder_id: further.node.id,
                node: actor.node(),
            }),
        );
        actor.tick_at(now);

        let alerts = further
            .requests()
            .into_iter()
            .filter_map(|(_, _, request)| match request {
                RequestTypeSpecific::Alert { candidate } => Some(candidate),
                _ => None,
            })
            .collect::<Vec<_>>();

        assert_eq!(alerts, vec![closer.node]);
    }

    #[test]
    fn accurate_predecessor_is_left_alone() {
        let (network, ring, mut actor, now) = setup();

        let mut closer = Peer::new(&network, &ring, 60, &actor);
        let mut further = Peer::new(&network, &ring, 100, &actor);

        let node = closer.node;
        closer.notify(&mut actor, now, Role::Successor, node);
        let node = further.node;
        further.notify(&mut actor, now, Role::Successor, node);

        actor.stabilize_now();
        actor.tick_at(now);

        for (from, transaction_id, request) in further.requests() {
            if request == RequestTypeSpecific::GetPredecessor {
                further.transport.reply(
                    from,
                    transaction_id,
                    MessageType::Response(ResponseSpecific::Neighbor {
                        responder_id: further.node.id,
                        node: closer.node,
                    }),
                );
            }
        }
        actor.tick_at(now);

        assert!(!further
            .requests()
            .iter()
            .any(|(_, _, request)| matches!(request, RequestTypeSpecific::Alert { .. })));
    }
}
