//! Per peer connection, liveness and latency state, and remote call dispatch.

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::common::{
    ErrorSpecific, Failure, Id, Node, RequestSpecific, RequestTypeSpecific, ResponseSpecific,
    Status,
};

use super::transport::{ConnectionId, Transport, TransportEvent};

#[derive(Debug)]
/// Registry record of a remote node.
pub struct Location {
    id: Id,
    address: SocketAddr,
    /// Who told us about `address`, the node itself if `source == id`.
    source: Id,
    connection: Option<ConnectionId>,
    /// Deadline of the pending connection attempt, if any.
    connecting: Option<Instant>,
    /// Calls waiting for the connection, in arrival order.
    queue: VecDeque<u32>,
    alive: bool,
    latency_sum: Duration,
    latency_count: u32,
    outstanding: usize,
}

impl Location {
    fn new(node: Node, source: Id) -> Self {
        Location {
            id: node.id,
            address: node.address,
            source,
            connection: None,
            connecting: None,
            queue: VecDeque::new(),
            alive: true,
            latency_sum: Duration::ZERO,
            latency_count: 0,
            outstanding: 0,
        }
    }

    // === Getters ===

    pub fn id(&self) -> &Id {
        &self.id
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    pub fn node(&self) -> Node {
        Node::new(self.id, self.address)
    }

    pub fn source(&self) -> &Id {
        &self.source
    }

    /// Returns true if the address was reported by the node itself.
    pub fn is_self_vouched(&self) -> bool {
        self.source == self.id
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    pub fn is_connecting(&self) -> bool {
        self.connecting.is_some()
    }

    /// Calls issued and not completed yet, queued or in flight.
    pub fn outstanding(&self) -> usize {
        self.outstanding
    }

    /// Rolling average round trip of successful calls.
    pub fn average_latency(&self) -> Option<Duration> {
        if self.latency_count == 0 {
            return None;
        }

        Some(self.latency_sum / self.latency_count)
    }
}

#[derive(Debug)]
/// Result of a remote call, produced exactly once per [LocationRegistry::invoke].
pub struct Completion<T> {
    pub token: T,
    pub id: Id,
    pub request: RequestTypeSpecific,
    pub result: Result<ResponseSpecific, Failure>,
}

#[derive(Debug)]
struct Call<T> {
    id: Id,
    token: T,
    request: RequestSpecific,
    /// Set once handed to the transport.
    sent_at: Option<Instant>,
}

#[derive(Debug)]
/// Maps node identities to [Location]s and owns every remote call.
///
/// `T` is an opaque token handed back in the call's [Completion].
pub struct LocationRegistry<T> {
    request_timeout: Duration,
    locations: HashMap<Id, Location>,
    calls: HashMap<u32, Call<T>>,
    next_tid: u32,
    completions: VecDeque<Completion<T>>,
}

impl<T> LocationRegistry<T> {
    pub fn new(request_timeout: Duration) -> Self {
        LocationRegistry {
            request_timeout,
            locations: HashMap::new(),
            calls: HashMap::new(),
            next_tid: 0,
            completions: VecDeque::new(),
        }
    }

    // === Getters ===

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub fn get(&self, id: &Id) -> Option<&Location> {
        self.locations.get(id)
    }

    /// Unknown nodes are not alive.
    pub fn is_alive(&self, id: &Id) -> bool {
        self.locations.get(id).is_some_and(|location| location.alive)
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    /// Outstanding calls across all locations.
    pub fn outstanding(&self) -> usize {
        self.calls.len()
    }

    pub fn locations(&self) -> impl Iterator<Item = &Location> {
        self.locations.values()
    }

    // === Public Methods ===

    /// Get or create the [Location] of `node`, as reported by `source`.
    ///
    /// A conflicting address replaces the known one if the report comes from the node
    /// itself, or if the known one is not alive or was not vouched for by the node.
    /// An unspecified address never replaces a known one.
    pub fn resolve(&mut self, node: Node, source: Id) -> &Location {
        let location = self
            .locations
            .entry(node.id)
            .or_insert_with(|| Location::new(node, source));

        if location.address != node.address {
            let self_vouched = source == node.id;

            if node.address.ip().is_unspecified() {
                trace!(id = ?node.id, reported = ?node.address, "Ignored unspecified address");
            } else if self_vouched || !location.alive || !location.is_self_vouched() {
                debug!(
                    id = ?node.id,
                    old = ?location.address,
                    new = ?node.address,
                    ?source,
                    "Location address updated"
                );

                location.address = node.address;
                location.source = source;
                location.connection = None;
            } else {
                trace!(id = ?node.id, reported = ?node.address, ?source, "Ignored address report");
            }
        } else if source == node.id {
            location.source = source;
        }

        location
    }

    /// Mark a node alive after hearing from it directly.
    pub fn mark_alive(&mut self, id: &Id) {
        if let Some(location) = self.locations.get_mut(id) {
            if !location.alive {
                debug!(?id, "Location alive again");
            }
            location.alive = true;
        }
    }

    /// Call `request` on node `id`. The outcome is reported once through
    /// [Self::drain_completions].
    pub fn invoke(
        &mut self,
        id: Id,
        request: RequestSpecific,
        token: T,
        transport: &mut dyn Transport,
        now: Instant,
    ) -> u32 {
        let tid = self.tid();

        let Some(location) = self.locations.get_mut(&id) else {
            self.completions.push_back(Completion {
                token,
                id,
                request: request.request_type,
                result: Err(Failure::Unreachable),
            });

            return tid;
        };

        location.outstanding += 1;

        let mut call = Call {
            id,
            token,
            request,
            sent_at: None,
        };

        match location.connection {
            Some(connection) => {
                transport.send(connection, tid, call.request.clone());
                call.sent_at = Some(now);
            }
            None => {
                location.queue.push_back(tid);

                if location.connecting.is_none() {
                    location.connecting = Some(now + self.request_timeout);
                    transport.connect(location.address);
                }
            }
        }

        self.calls.insert(tid, call);

        tid
    }

    /// Feed a transport event other than an incoming request.
    pub fn on_event(&mut self, event: TransportEvent, transport: &mut dyn Transport, now: Instant) {
        match event {
            TransportEvent::Connected {
                address,
                connection,
            } => self.on_connected(address, connection, transport, now),
            TransportEvent::ConnectFailed { address } => {
                let ids = self
                    .locations
                    .values()
                    .filter(|location| location.address == address && location.is_connecting())
                    .map(|location| location.id)
                    .collect::<Vec<_>>();

                for id in ids {
                    debug!(?id, ?address, "Connection failed");
                    self.fail_queue(&id, Failure::Unreachable);
                }
            }
            TransportEvent::Response {
                from,
                transaction_id,
                response,
            } => {
                let responder_id = response.responder_id();

                let Some(call) = self.take_answered(transaction_id, from) else {
                    return;
                };

                let result = if call.id == responder_id {
                    Ok(response)
                } else {
                    debug!(expected = ?call.id, ?responder_id, "Response from an unexpected node");
                    Err(Failure::ProtocolError)
                };

                self.complete_answered(call, result, now);
            }
            TransportEvent::Error {
                from,
                transaction_id,
                error,
            } => {
                let Some(call) = self.take_answered(transaction_id, from) else {
                    return;
                };

                let ErrorSpecific {
                    status,
                    description,
                } = error;

                debug!(id = ?call.id, %status, description, "Remote call failed");

                let failure = match status {
                    Status::Timeout => Failure::Timeout,
                    Status::Unreachable => Failure::Unreachable,
                    Status::Ok | Status::ProtocolError => Failure::ProtocolError,
                };

                self.complete_answered(call, Err(failure), now);
            }
            TransportEvent::Request { .. } => {}
        }
    }

    /// Fail calls past their deadline, and queues of connections that never resolved.
    pub fn expire(&mut self, now: Instant) {
        let stale_connections = self
            .locations
            .values()
            .filter(|location| location.connecting.is_some_and(|deadline| deadline <= now))
            .map(|location| location.id)
            .collect::<Vec<_>>();

        for id in stale_connections {
            debug!(?id, "Connection attempt timed out");
            self.fail_queue(&id, Failure::Unreachable);
        }

        let timeout = self.request_timeout;
        let expired = self
            .calls
            .iter()
            .filter(|(_, call)| call.sent_at.is_some_and(|sent_at| now >= sent_at + timeout))
            .map(|(tid, _)| *tid)
            .collect::<Vec<_>>();

        for tid in expired {
            if let Some(call) = self.calls.remove(&tid) {
                if let Some(location) = self.locations.get_mut(&call.id) {
                    location.alive = false;
                }

                debug!(id = ?call.id, request = call.request.request_type.name(), "Request timed out");

                self.complete(call, Err(Failure::Timeout));
            }
        }
    }

    /// Forget a location, failing its queued and in flight calls.
    pub fn remove(&mut self, id: &Id) {
        let tids = self
            .calls
            .iter()
            .filter(|(_, call)| call.id == *id)
            .map(|(tid, _)| *tid)
            .collect::<Vec<_>>();

        for tid in tids {
            if let Some(call) = self.calls.remove(&tid) {
                self.complete(call, Err(Failure::Unreachable));
            }
        }

        self.locations.remove(id);
    }

    pub fn drain_completions(&mut self) -> Vec<Completion<T>> {
        self.completions.drain(..).collect()
    }

    // === Private Methods ===

    /// Increments self.next_tid and returns the previous value.
    fn tid(&mut self) -> u32 {
        let tid = self.next_tid;
        self.next_tid = self.next_tid.wrapping_add(1);
        tid
    }

    fn on_connected(
        &mut self,
        address: SocketAddr,
        connection: ConnectionId,
        transport: &mut dyn Transport,
        now: Instant,
    ) {
        for location in self.locations.values_mut() {
            if location.address != address || location.connecting.is_none() {
                continue;
            }

            location.connecting = None;
            location.connection = Some(connection);

            trace!(id = ?location.id, queued = location.queue.len(), "Connected");

            while let Some(tid) = location.queue.pop_front() {
                if let Some(call) = self.calls.get_mut(&tid) {
                    transport.send(connection, tid, call.request.clone());
                    call.sent_at = Some(now);
                }
            }
        }
    }

    fn fail_queue(&mut self, id: &Id, failure: Failure) {
        let Some(location) = self.locations.get_mut(id) else {
            return;
        };

        location.connecting = None;
        location.alive = false;

        let queued = location.queue.drain(..).collect::<Vec<_>>();

        for tid in queued {
            if let Some(call) = self.calls.remove(&tid) {
                self.complete(call, Err(failure));
            }
        }
    }

    /// Remove the in flight call answered by `from`, ignoring late or misdirected answers.
    fn take_answered(&mut self, transaction_id: u32, from: SocketAddr) -> Option<Call<T>> {
        let call = self.calls.get(&transaction_id)?;

        let expected = self.locations.get(&call.id).map(|location| location.address);

        if call.sent_at.is_none() || expected != Some(from) {
            trace!(
                context = "socket_validation",
                transaction_id,
                ?from,
                "Unexpected response id or wrong address"
            );
            return None;
        }

        self.calls.remove(&transaction_id)
    }

    fn complete_answered(
        &mut self,
        call: Call<T>,
        result: Result<ResponseSpecific, Failure>,
        now: Instant,
    ) {
        if let Some(location) = self.locations.get_mut(&call.id) {
            location.alive = true;

            if result.is_ok() {
                if let Some(sent_at) = call.sent_at {
                    location.latency_sum += now.saturating_duration_since(sent_at);
                    location.latency_count += 1;
                }
            }
        }

        self.complete(call, result);
    }

    fn complete(&mut self, call: Call<T>, result: Result<ResponseSpecific, Failure>) {
        if let Some(location) = self.locations.get_mut(&call.id) {
            location.outstanding = location.outstanding.saturating_sub(1);
        }

        self.completions.push_back(Completion {
            token: call.token,
            id: call.id,
            request: call.request.request_type,
            result,
        });
    }
}

#[cfg(test)]
mod test {
    use std::collections::VecDeque;

    use crate::common::{MessageType, RingPosition};

    use super::*;

    #[derive(Debug, Default)]
    struct Recorder {
        connects: Vec<SocketAddr>,
        sent: Vec<(ConnectionId, u32)>,
        events: VecDeque<TransportEvent>,
    }

    impl Transport for Recorder {
        fn local_addr(&self) -> SocketAddr {
            SocketAddr::from(([127, 0, 0, 1], 1))
        }

        fn connect(&mut self, address: SocketAddr) {
            self.connects.push(address);
        }

        fn send(&mut self, connection: ConnectionId, transaction_id: u32, _: RequestSpecific) {
            self.sent.push((connection, transaction_id));
        }

        fn reply(&mut self, _: SocketAddr, _: u32, _: MessageType) {}

        fn poll(&mut self) -> Option<TransportEvent> {
            self.events.pop_front()
        }
    }

    const TIMEOUT: Duration = Duration::from_secs(2);

    fn node(port: u16) -> Node {
        Node::new(Id::random(), SocketAddr::from(([10, 0, 0, 1], port)))
    }

    fn request() -> RequestSpecific {
        RequestSpecific {
            requester_id: Id::random(),
            request_type: RequestTypeSpecific::FindClosestPredecessor {
                target: RingPosition(9),
            },
        }
    }

    fn setup() -> (LocationRegistry<usize>, Recorder, Node, Instant) {
        let mut registry = LocationRegistry::new(TIMEOUT);
        let peer = node(1000);
        registry.resolve(peer, peer.id);

        (registry, Recorder::default(), peer, Instant::now())
    }

    #[test]
    fn queued_calls_flush_in_order() {
        let (mut registry, mut transport, peer, now) = setup();

        let tids = (0..3)
            .map(|token| registry.invoke(peer.id, request(), token, &mut transport, now))
            .collect::<Vec<_>>();

        // One connection attempt for all three calls.
        assert_eq!(transport.connects, vec![peer.address]);
        assert!(transport.sent.is_empty());
        assert_eq!(registry.get(&peer.id).unwrap().outstanding(), 3);

        registry.on_event(
            TransportEvent::Connected {
                address: peer.address,
                connection: 7,
            },
            &mut transport,
            now,
        );

        assert_eq!(
            transport.sent,
            tids.iter().map(|tid| (7, *tid)).collect::<Vec<_>>()
        );

        // Once connected, calls go straight out.
        let tid = registry.invoke(peer.id, request(), 3, &mut transport, now);
        assert_eq!(transport.sent.last(), Some(&(7, tid)));
        assert_eq!(transport.connects.len(), 1);
    }

    #[test]
    fn outstanding_returns_to_zero() {
        let (mut registry, mut transport, peer, now) = setup();

        let answered = registry.invoke(peer.id, request(), 0, &mut transport, now);
        let failed = registry.invoke(peer.id, request(), 1, &mut transport, now);
        let _timed_out = registry.invoke(peer.id, request(), 2, &mut transport, now);

        registry.on_event(
            TransportEvent::Connected {
                address: peer.address,
                connection: 1,
            },
            &mut transport,
            now,
        );

        registry.on_event(
            TransportEvent::Response {
                from: peer.address,
                transaction_id: answered,
                response: ResponseSpecific::Ack {
                    responder_id: peer.id,
                },
            },
            &mut transport,
            now + Duration::from_millis(40),
        );
        registry.on_event(
            TransportEvent::Error {
                from: peer.address,
                transaction_id: failed,
                error: ErrorSpecific {
                    status: Status::ProtocolError,
                    description: "nope".to_string(),
                },
            },
            &mut transport,
            now,
        );

        assert_eq!(registry.outstanding(), 1);

        registry.expire(now + TIMEOUT);

        let mut completions = registry.drain_completions();
        completions.sort_by_key(|completion| completion.token);

        assert!(completions[0].result.is_ok());
        assert_eq!(completions[1].result, Err(Failure::ProtocolError));
        assert_eq!(completions[2].result, Err(Failure::Timeout));
        assert_eq!(completions.len(), 3);

        let location = registry.get(&peer.id).unwrap();
        assert_eq!(location.outstanding(), 0);
        assert_eq!(registry.outstanding(), 0);
        assert!(!location.is_alive());
        assert_eq!(location.average_latency(), Some(Duration::from_millis(40)));
    }

    #[test]
    fn late_response_is_ignored() {
        let (mut registry, mut transport, peer, now) = setup();

        registry.on_event(
            TransportEvent::Connected {
                address: peer.address,
                connection: 1,
            },
            &mut transport,
            now,
        );
        // Not connecting anymore, nothing to flush.
        assert!(!registry.get(&peer.id).unwrap().is_connected());

        let tid = registry.invoke(peer.id, request(), 0, &mut transport, now);
        registry.on_event(
            TransportEvent::Connected {
                address: peer.address,
                connection: 1,
            },
            &mut transport,
            now,
        );

        registry.expire(now + TIMEOUT);
        assert_eq!(registry.drain_completions().len(), 1);

        registry.on_event(
            TransportEvent::Response {
                from: peer.address,
                transaction_id: tid,
                response: ResponseSpecific::Ack {
                    responder_id: peer.id,
                },
            },
            &mut transport,
            now + TIMEOUT,
        );

        assert!(registry.drain_completions().is_empty());
        assert!(!registry.is_alive(&peer.id));
    }

    #[test]
    fn response_from_wrong_address_is_ignored() {
        let (mut registry, mut transport, peer, now) = setup();

        let tid = registry.invoke(peer.id, request(), 0, &mut transport, now);
        registry.on_event(
            TransportEvent::Connected {
                address: peer.address,
                connection: 1,
            },
            &mut transport,
            now,
        );

        registry.on_event(
            TransportEvent::Response {
                from: SocketAddr::from(([10, 0, 0, 2], 1000)),
                transaction_id: tid,
                response: ResponseSpecific::Ack {
                    responder_id: peer.id,
                },
            },
            &mut transport,
            now,
        );

        assert!(registry.drain_completions().is_empty());
        assert_eq!(registry.outstanding(), 1);
    }

    #[test]
    fn failed_connection_flushes_queue() {
        let (mut registry, mut transport, peer, now) = setup();

        registry.invoke(peer.id, request(), 0, &mut transport, now);
        registry.invoke(peer.id, request(), 1, &mut transport, now);

        registry.on_event(
            TransportEvent::ConnectFailed {
                address: peer.address,
            },
            &mut transport,
            now,
        );

        let completions = registry.drain_completions();
        assert_eq!(completions.len(), 2);
        assert_eq!(completions[0].token, 0);
        assert_eq!(completions[1].token, 1);
        assert!(completions
            .iter()
            .all(|c| c.result == Err(Failure::Unreachable)));

        assert_eq!(registry.outstanding(), 0);
        assert!(!registry.is_alive(&peer.id));
    }

    #[test]
    fn connect_deadline() {
        let (mut registry, mut transport, peer, now) = setup();

        registry.invoke(peer.id, request(), 0, &mut transport, now);

        registry.expire(now + TIMEOUT / 2);
        assert!(registry.drain_completions().is_empty());

        registry.expire(now + TIMEOUT);
        let completions = registry.drain_completions();
        assert_eq!(completions.len(), 1);
        assert_eq!(completions[0].result, Err(Failure::Unreachable));
        assert_eq!(registry.outstanding(), 0);
    }

    #[test]
    fn remove_fails_everything() {
        let (mut registry, mut transport, peer, now) = setup();

        registry.invoke(peer.id, request(), 0, &mut transport, now);
        registry.on_event(
            TransportEvent::Connected {
                address: peer.address,
                connection: 1,
            },
            &mut transport,
            now,
        );
        registry.invoke(peer.id, request(), 1, &mut transport, now);

        registry.remove(&peer.id);

        let completions = registry.drain_completions();
        assert_eq!(completions.len(), 2);
        assert!(completions
            .iter()
            .all(|c| c.result == Err(Failure::Unreachable)));
        assert!(registry.get(&peer.id).is_none());
        assert_eq!(registry.outstanding(), 0);
    }

    #[test]
    fn unknown_node_is_unreachable() {
        let mut registry = LocationRegistry::new(TIMEOUT);
        let mut transport = Recorder::default();

        registry.invoke(Id::random(), request(), 0, &mut transport, Instant::now());

        let completions = registry.drain_completions();
        assert_eq!(completions[0].result, Err(Failure::Unreachable));
        assert_eq!(registry.outstanding(), 0);
    }

    #[test]
    fn address_attribution() {
        let mut registry = LocationRegistry::<()>::new(TIMEOUT);

        let peer = node(1000);
        let moved = Node::new(peer.id, SocketAddr::from(([10, 0, 0, 9], 1000)));
        let gossip = Node::new(peer.id, SocketAddr::from(([10, 0, 0, 66], 1000)));
        let third_party = Id::random();

        // Third party report, then overwritten by another third party.
        registry.resolve(peer, third_party);
        registry.resolve(moved, third_party);
        assert_eq!(registry.get(&peer.id).unwrap().address(), moved.address);

        // Self vouched report wins, and cannot be overwritten by gossip while alive.
        registry.resolve(peer, peer.id);
        registry.resolve(gossip, third_party);
        let location = registry.get(&peer.id).unwrap();
        assert_eq!(location.address(), peer.address);
        assert!(location.is_self_vouched());
    }

    #[test]
    fn unspecified_address_never_replaces_a_known_one() {
        let mut registry = LocationRegistry::<()>::new(TIMEOUT);

        let peer = node(1000);
        let wildcard = Node::new(peer.id, SocketAddr::from(([0, 0, 0, 0], 1000)));

        registry.resolve(peer, peer.id);
        registry.resolve(wildcard, peer.id);

        assert_eq!(registry.get(&peer.id).unwrap().address(), peer.address);
    }
}
