//! Boundary between the actor and whatever carries its messages.

pub(crate) mod udp;

use std::fmt::Debug;
use std::net::SocketAddr;

use crate::common::{ErrorSpecific, MessageType, RequestSpecific, ResponseSpecific};

pub use udp::{UdpTransport, DEFAULT_PORT};

/// Handle of an established connection, as returned by [TransportEvent::Connected].
pub type ConnectionId = u64;

#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A [Transport::connect] attempt succeeded.
    Connected {
        address: SocketAddr,
        connection: ConnectionId,
    },
    /// A [Transport::connect] attempt failed.
    ConnectFailed { address: SocketAddr },
    /// A remote node is asking us something, answer with [Transport::reply].
    Request {
        from: SocketAddr,
        transaction_id: u32,
        request: RequestSpecific,
    },
    Response {
        from: SocketAddr,
        transaction_id: u32,
        response: ResponseSpecific,
    },
    Error {
        from: SocketAddr,
        transaction_id: u32,
        error: ErrorSpecific,
    },
}

/// Asynchronous, non-blocking message transport.
///
/// None of these methods may block: outcomes of [Transport::connect] and incoming
/// messages are reported through [Transport::poll]. Timeouts are not the transport's
/// concern, unanswered requests are expired by the caller.
pub trait Transport: Debug + Send {
    /// Address other nodes can reach this transport at.
    fn local_addr(&self) -> SocketAddr;

    /// Start connecting to `address`.
    fn connect(&mut self, address: SocketAddr);

    /// Send a request over an established connection.
    fn send(&mut self, connection: ConnectionId, transaction_id: u32, request: RequestSpecific);

    /// Answer a request received from `to`, with a response or an error.
    fn reply(&mut self, to: SocketAddr, transaction_id: u32, message: MessageType);

    /// Next pending event if any.
    fn poll(&mut self) -> Option<TransportEvent>;
}
