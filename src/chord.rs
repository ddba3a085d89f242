//! Chord node.

use std::collections::HashMap;
use std::net::IpAddr;
use std::thread;
use std::time::Duration;

use flume::{Receiver, RecvTimeoutError, Sender};
use tracing::debug;

use crate::actor::transport::Transport;
use crate::actor::{Actor, Config, Info, QueryId, QueryOutcome};
use crate::common::{Failure, Id, Node, RingPosition};
use crate::core::join::{JoinError, JoinReport};
use crate::core::lookup::LookupResponse;
use crate::Result;

/// How long the actor thread waits for a command before ticking anyway.
const TICK_INTERVAL: Duration = Duration::from_millis(2);

#[derive(Debug, Clone)]
/// Chord node, running its [Actor] on a dedicated thread.
///
/// Cloning is cheap, all clones talk to the same thread, which stops once
/// every clone is dropped or [Chord::shutdown] is called.
pub struct Chord(pub(crate) Sender<ActorMessage>);

#[derive(Debug, Default)]
/// Chord node builder
pub struct ChordBuilder(Config);

impl ChordBuilder {
    /// Set the ring width in bits.
    pub fn bits(&mut self, bits: u8) -> &mut Self {
        self.0.bits = bits;

        self
    }

    /// Set an explicit node [Id] instead of deriving it from the local address.
    pub fn id(&mut self, id: Id) -> &mut Self {
        self.0.id = Some(id);

        self
    }

    /// Join the ring `bootstrap` belongs to once started.
    pub fn bootstrap(&mut self, bootstrap: Node) -> &mut Self {
        self.0.bootstrap = Some(bootstrap);

        self
    }

    /// Set an explicit port to listen on.
    pub fn port(&mut self, port: u16) -> &mut Self {
        self.0.port = Some(port);

        self
    }

    /// Set the address to bind the UDP socket to.
    pub fn bind_address(&mut self, bind_address: IpAddr) -> &mut Self {
        self.0.bind_address = Some(bind_address);

        self
    }

    /// Set the remote call timeout.
    pub fn request_timeout(&mut self, request_timeout: Duration) -> &mut Self {
        self.0.request_timeout = request_timeout;

        self
    }

    /// Set the period between stabilization cycles.
    pub fn stabilize_interval(&mut self, stabilize_interval: Duration) -> &mut Self {
        self.0.stabilize_interval = stabilize_interval;

        self
    }

    /// Set the maximum number of lookup hints remembered.
    pub fn hint_capacity(&mut self, hint_capacity: usize) -> &mut Self {
        self.0.hint_capacity = hint_capacity;

        self
    }

    /// Use a custom [Transport] instead of UDP.
    pub fn transport(&mut self, transport: Box<dyn Transport>) -> &mut Self {
        self.0.transport = Some(transport);

        self
    }

    /// Create a Chord node with the configured options.
    ///
    /// The builder is reset to its defaults.
    pub fn build(&mut self) -> Result<Chord> {
        Chord::new(std::mem::take(&mut self.0))
    }
}

impl Chord {
    /// Returns a builder to edit settings before creating a Chord node.
    pub fn builder() -> ChordBuilder {
        ChordBuilder::default()
    }

    /// Create a new Chord node with the given [Config].
    ///
    /// Binds the transport, then runs the node on its own thread.
    pub fn new(config: Config) -> Result<Self> {
        let (sender, receiver) = flume::unbounded();

        let actor = Actor::new(config)?;

        thread::Builder::new()
            .name("Chord actor thread".to_string())
            .spawn(move || run(actor, receiver))?;

        Ok(Chord(sender))
    }

    // === Getters ===

    /// Information and statistics about this node.
    pub fn info(&self) -> Result<Info, ChordWasShutdown> {
        let (sender, receiver) = flume::bounded::<Info>(1);

        self.0
            .send(ActorMessage::Info(sender))
            .map_err(|_| ChordWasShutdown)?;

        receiver.recv().map_err(|_| ChordWasShutdown)
    }

    // === Public Methods ===

    /// Find the first node at or after `target`.
    pub fn find_successor(&self, target: RingPosition) -> Result<LookupResponse, LookupError> {
        let (sender, receiver) = flume::bounded(1);

        self.0
            .send(ActorMessage::FindSuccessor(target, sender))
            .map_err(|_| ChordWasShutdown)?;

        Ok(receiver.recv().map_err(|_| ChordWasShutdown)??)
    }

    /// Find the last node strictly before `target`.
    pub fn find_predecessor(&self, target: RingPosition) -> Result<LookupResponse, LookupError> {
        let (sender, receiver) = flume::bounded(1);

        self.0
            .send(ActorMessage::FindPredecessor(target, sender))
            .map_err(|_| ChordWasShutdown)?;

        Ok(receiver.recv().map_err(|_| ChordWasShutdown)??)
    }

    /// Ask `node` for its immediate successor.
    pub fn get_successor(&self, node: Node) -> Result<Node, LookupError> {
        let (sender, receiver) = flume::bounded(1);

        self.0
            .send(ActorMessage::GetSuccessor(node, sender))
            .map_err(|_| ChordWasShutdown)?;

        Ok(receiver.recv().map_err(|_| ChordWasShutdown)??)
    }

    /// Ask `node` for its immediate predecessor.
    pub fn get_predecessor(&self, node: Node) -> Result<Node, LookupError> {
        let (sender, receiver) = flume::bounded(1);

        self.0
            .send(ActorMessage::GetPredecessor(node, sender))
            .map_err(|_| ChordWasShutdown)?;

        Ok(receiver.recv().map_err(|_| ChordWasShutdown)??)
    }

    /// Join the ring `bootstrap` belongs to, and block until done.
    ///
    /// If a join is already in progress, waits for that one instead.
    pub fn join(&self, bootstrap: Node) -> Result<JoinReport, JoinError> {
        let (sender, receiver) = flume::bounded(1);

        self.0
            .send(ActorMessage::Join(bootstrap, sender))
            .map_err(|_| JoinError::Shutdown)?;

        receiver.recv().map_err(|_| JoinError::Shutdown)?
    }

    /// Wait until the current join, if any, is done and return its outcome.
    pub fn joined(&self) -> Result<JoinReport, JoinError> {
        let (sender, receiver) = flume::bounded(1);

        self.0
            .send(ActorMessage::Joined(sender))
            .map_err(|_| JoinError::Shutdown)?;

        receiver.recv().map_err(|_| JoinError::Shutdown)?
    }

    /// Start a stabilization cycle now.
    pub fn stabilize(&self) -> Result<(), ChordWasShutdown> {
        let (sender, receiver) = flume::bounded(1);

        self.0
            .send(ActorMessage::Stabilize(sender))
            .map_err(|_| ChordWasShutdown)?;

        receiver.recv().map_err(|_| ChordWasShutdown)
    }

    /// Shutdown the actor thread loop.
    pub fn shutdown(&mut self) {
        let (sender, receiver) = flume::bounded::<()>(1);

        let _ = self.0.send(ActorMessage::Shutdown(sender));
        let _ = receiver.recv();
    }
}

fn run(mut actor: Actor, receiver: Receiver<ActorMessage>) {
    let mut lookup_senders: HashMap<QueryId, Sender<Result<LookupResponse, Failure>>> =
        HashMap::new();
    let mut neighbor_senders: HashMap<QueryId, Sender<Result<Node, Failure>>> = HashMap::new();
    let mut join_senders: Vec<Sender<Result<JoinReport, JoinError>>> = Vec::new();

    loop {
        match receiver.recv_timeout(TICK_INTERVAL) {
            Ok(actor_message) => match actor_message {
                ActorMessage::Shutdown(sender) => {
                    drop(receiver);
                    let _ = sender.send(());
                    break;
                }
                ActorMessage::Info(sender) => {
                    let _ = sender.send(actor.info());
                }
                ActorMessage::FindSuccessor(target, sender) => {
                    let query = actor.find_successor(target);
                    lookup_senders.insert(query, sender);
                }
                ActorMessage::FindPredecessor(target, sender) => {
                    let query = actor.find_predecessor(target);
                    lookup_senders.insert(query, sender);
                }
                ActorMessage::GetSuccessor(node, sender) => {
                    let query = actor.get_successor(node);
                    neighbor_senders.insert(query, sender);
                }
                ActorMessage::GetPredecessor(node, sender) => {
                    let query = actor.get_predecessor(node);
                    neighbor_senders.insert(query, sender);
                }
                ActorMessage::Join(bootstrap, sender) => {
                    actor.join(bootstrap);
                    join_senders.push(sender);
                }
                ActorMessage::Joined(sender) => match actor.join_status() {
                    Some(status) if !actor.is_joining() => {
                        let _ = sender.send(status.clone());
                    }
                    _ => join_senders.push(sender),
                },
                ActorMessage::Stabilize(sender) => {
                    actor.stabilize_now();
                    let _ = sender.send(());
                }
            },
            Err(RecvTimeoutError::Disconnected) => {
                // Node was dropped, kill this thread.
                debug!("Chord actor thread was shutdown after Drop.");
                break;
            }
            Err(RecvTimeoutError::Timeout) => {
                // No op
            }
        }

        let report = actor.tick();

        for (query, outcome) in report.done_queries {
            match outcome {
                QueryOutcome::Lookup(result) => {
                    if let Some(sender) = lookup_senders.remove(&query) {
                        let _ = sender.send(result);
                    }
                }
                QueryOutcome::Neighbor(result) => {
                    if let Some(sender) = neighbor_senders.remove(&query) {
                        let _ = sender.send(result);
                    }
                }
            }
        }

        if let Some(outcome) = report.join {
            for sender in join_senders.drain(..) {
                let _ = sender.send(outcome.clone());
            }
        }
    }

    for sender in join_senders {
        let _ = sender.send(Err(JoinError::Shutdown));
    }
}

#[derive(Debug)]
pub(crate) enum ActorMessage {
    Info(Sender<Info>),
    FindSuccessor(RingPosition, Sender<Result<LookupResponse, Failure>>),
    FindPredecessor(RingPosition, Sender<Result<LookupResponse, Failure>>),
    GetSuccessor(Node, Sender<Result<Node, Failure>>),
    GetPredecessor(Node, Sender<Result<Node, Failure>>),
    Join(Node, Sender<Result<JoinReport, JoinError>>),
    Joined(Sender<Result<JoinReport, JoinError>>),
    Stabilize(Sender<()>),
    Shutdown(Sender<()>),
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Chord node was shutdown")]
/// The node's actor thread is no longer running.
pub struct ChordWasShutdown;

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
/// Chord lookup and neighbour query errors.
pub enum LookupError {
    #[error(transparent)]
    Failure(#[from] Failure),

    #[error(transparent)]
    Shutdown(#[from] ChordWasShutdown),
}

#[cfg(test)]
mod test {
    use std::net::{Ipv4Addr, SocketAddr};

    use super::*;

    fn node(bootstrap: Option<Node>) -> Chord {
        let mut builder = Chord::builder();
        builder.bits(16).bind_address(Ipv4Addr::LOCALHOST.into()).port(0);

        if let Some(bootstrap) = bootstrap {
            builder.bootstrap(bootstrap);
        }

        builder.build().unwrap()
    }

    fn as_node(chord: &Chord) -> Node {
        let info = chord.info().unwrap();
        Node::new(*info.id(), info.local_addr())
    }

    #[test]
    fn shutdown() {
        let mut chord = node(None);

        let mut clone = chord.clone();

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));

            clone.shutdown();
        });

        handle.join().unwrap();

        assert_eq!(chord.info().unwrap_err(), ChordWasShutdown);
        assert_eq!(
            chord.find_successor(RingPosition(1)).unwrap_err(),
            LookupError::Shutdown(ChordWasShutdown)
        );

        chord.shutdown();
    }

    #[test]
    fn lone_node() {
        let chord = node(None);
        let me = as_node(&chord);

        let report = chord.joined().unwrap();
        assert_eq!(report, JoinReport::alone());

        let response = chord.find_successor(RingPosition(42)).unwrap();
        assert_eq!(response.successor, me);
        assert_eq!(response.predecessor, me);
        assert_eq!(response.hops(), 0);

        assert_eq!(chord.get_successor(me).unwrap(), me);
    }

    #[test]
    fn join_over_udp() {
        let first = node(None);
        let first_node = as_node(&first);

        let second = node(Some(first_node));
        let report = second.joined().unwrap();

        assert_eq!(report.bootstrap, Some(first_node));
        assert_eq!(report.successor, Some(first_node.id));
        assert_eq!(report.predecessor, Some(first_node.id));

        let second_node = as_node(&second);

        // The bootstrap node was notified of its new neighbour.
        assert_eq!(first.get_successor(first_node).unwrap(), second_node);
        assert_eq!(second.get_predecessor(first_node).unwrap(), second_node);

        let info = second.info().unwrap();
        let target = info.position();

        let response = first.find_successor(target).unwrap();
        assert_eq!(response.successor, second_node);
        assert_eq!(response.predecessor, first_node);
    }

    #[test]
    fn unreachable_bootstrap() {
        let ghost = Node::from_address("127.0.0.1:1".parse().unwrap());

        let chord = Chord::builder()
            .bits(8)
            .bind_address(Ipv4Addr::LOCALHOST.into())
            .port(0)
            .request_timeout(Duration::from_millis(50))
            .build()
            .unwrap();

        match chord.join(ghost) {
            Err(JoinError::BootstrapFailed { attempts, .. }) => assert_eq!(attempts, 5),
            other => panic!("unexpected {other:?}"),
        }

        let info = chord.info().unwrap();
        assert!(info.bootstrap_failure());
        assert!(!info.joined());
        assert_eq!(info.outstanding_rpcs(), 0);
    }

    #[test]
    fn join_nodes_bound_to_unspecified_address() {
        let first = Chord::builder().build().unwrap();
        let first_info = first.info().unwrap();
        assert!(first_info.local_addr().ip().is_unspecified());

        let bootstrap = Node::new(
            *first_info.id(),
            SocketAddr::from((Ipv4Addr::LOCALHOST, first_info.local_addr().port())),
        );

        let second = Chord::builder().bootstrap(bootstrap).build().unwrap();
        let report = second.joined().unwrap();
        assert_eq!(report.successor, Some(bootstrap.id));

        let second_info = second.info().unwrap();
        assert_ne!(second_info.id(), first_info.id());

        // Both know each other at the address their packets come from.
        assert_eq!(second_info.successor(), Some(bootstrap));

        let predecessor = first.info().unwrap().predecessor().unwrap();
        assert_eq!(predecessor.id, *second_info.id());
        assert_eq!(
            predecessor.address,
            SocketAddr::from((Ipv4Addr::LOCALHOST, second_info.local_addr().port()))
        );

        let response = second.find_successor(first_info.position()).unwrap();
        assert_eq!(response.successor, bootstrap);

        let response = first.find_successor(second_info.position()).unwrap();
        assert_eq!(response.successor, predecessor);
    }
}
