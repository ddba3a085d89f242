//! UDP transport sending bencoded ring messages.

use std::collections::{HashMap, VecDeque};
use std::io::ErrorKind;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};

use tracing::{debug, trace, warn};

use crate::common::{Message, MessageType, RequestSpecific};

use super::{ConnectionId, Transport, TransportEvent};

const MTU: usize = 2048;

pub const DEFAULT_PORT: u16 = 7481;

/// A non-blocking [UdpSocket] wrapper that formats ring messages.
///
/// UDP is connectionless, so [Transport::connect] resolves immediately and a
/// connection is just a remembered address.
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
    local_addr: SocketAddr,
    next_connection: ConnectionId,
    connections: HashMap<ConnectionId, SocketAddr>,
    events: VecDeque<TransportEvent>,
}

impl UdpTransport {
    /// Bind to `port` on `bind_address`, or to [DEFAULT_PORT] falling back to any
    /// free port if `port` is `None`.
    pub fn bind(bind_address: Option<IpAddr>, port: Option<u16>) -> Result<Self, std::io::Error> {
        let bind_address = bind_address.unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));

        let socket = if let Some(port) = port {
            UdpSocket::bind(SocketAddr::new(bind_address, port))?
        } else {
            match UdpSocket::bind(SocketAddr::new(bind_address, DEFAULT_PORT)) {
                Ok(socket) => Ok(socket),
                Err(_) => UdpSocket::bind(SocketAddr::new(bind_address, 0)),
            }?
        };

        let local_addr = socket.local_addr()?;

        socket.set_nonblocking(true)?;

        Ok(UdpTransport {
            socket,
            local_addr,
            next_connection: 0,
            connections: HashMap::new(),
            events: VecDeque::new(),
        })
    }

    // === Private Methods ===

    fn send_message(&mut self, address: SocketAddr, message: Message) {
        trace!(context = "socket_message_sending", ?message, ?address);

        let result = message
            .to_bytes()
            .map_err(crate::Error::from)
            .and_then(|bytes| Ok(self.socket.send_to(&bytes, address)?));

        if let Err(error) = result {
            debug!(?error, ?address, "Error sending message");
        }
    }

    fn recv_from(&mut self) -> Option<TransportEvent> {
        let mut buf = [0u8; MTU];

        let (amount, from) = match self.socket.recv_from(&mut buf) {
            Ok(received) => received,
            Err(error) => {
                if error.kind() != ErrorKind::WouldBlock {
                    warn!("IO error {error}");
                }
                return None;
            }
        };

        if from.port() == 0 {
            trace!(context = "socket_validation", "Message from port 0");
            return None;
        }

        let bytes = &buf[..amount];

        let message = match Message::from_bytes(bytes) {
            Ok(message) => message,
            Err(error) => {
                trace!(
                    context = "socket_error",
                    ?error,
                    ?from,
                    message = ?String::from_utf8_lossy(bytes),
                    "Received invalid Bencode message."
                );
                return None;
            }
        };

        trace!(context = "socket_message_receiving", ?message, ?from);

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

impl Transport for UdpTransport {
    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn connect(&mut self, address: SocketAddr) {
        let connection = self.next_connection;
        self.next_connection = self.next_connection.wrapping_add(1);

        self.connections.insert(connection, address);
        self.events
            .push_back(TransportEvent::Connected { address, connection });
    }

    fn send(&mut self, connection: ConnectionId, transaction_id: u32, request: RequestSpecific) {
        let Some(address) = self.connections.get(&connection).copied() else {
            debug!(connection, "Sending on unknown connection");
            return;
        };

        self.send_message(
            address,
            Message {
                transaction_id,
                message_type: MessageType::Request(request),
            },
        );
    }

    fn reply(&mut self, to: SocketAddr, transaction_id: u32, message: MessageType) {
        self.send_message(
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

        self.recv_from()
    }
}

#[cfg(test)]
mod test {
    use std::thread;
    use std::time::Duration;

    use crate::common::{Id, RequestTypeSpecific, ResponseSpecific, RingPosition};

    use super::*;

    fn transport() -> UdpTransport {
        UdpTransport::bind(Some(Ipv4Addr::LOCALHOST.into()), Some(0)).unwrap()
    }

    fn poll_until(transport: &mut UdpTransport) -> TransportEvent {
        for _ in 0..1000 {
            if let Some(event) = transport.poll() {
                return event;
            }
            thread::sleep(Duration::from_millis(1));
        }

        panic!("no event received");
    }

    #[test]
    fn request_response() {
        let mut server = transport();
        let mut client = transport();

        client.connect(server.local_addr());

        let connection = match poll_until(&mut client) {
            TransportEvent::Connected {
                address,
                connection,
            } => {
                assert_eq!(address, server.local_addr());
                connection
            }
            other => panic!("unexpected {other:?}"),
        };

        let request = RequestSpecific {
            requester_id: Id::random(),
            request_type: RequestTypeSpecific::FindClosestSuccessor {
                target: RingPosition(42),
            },
        };

        client.send(connection, 120, request.clone());

        let from = match poll_until(&mut server) {
            TransportEvent::Request {
                from,
                transaction_id,
                request: received,
            } => {
                assert_eq!(transaction_id, 120);
                assert_eq!(received, request);
                from
            }
            other => panic!("unexpected {other:?}"),
        };

        assert_eq!(from, client.local_addr());

        let responder_id = Id::random();
        server.reply(
            from,
            120,
            MessageType::Response(ResponseSpecific::Ack { responder_id }),
        );

        match poll_until(&mut client) {
            TransportEvent::Response {
                from,
                transaction_id,
                response,
            } => {
                assert_eq!(from, server.local_addr());
                assert_eq!(transaction_id, 120);
                assert_eq!(response, ResponseSpecific::Ack { responder_id });
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn ignore_garbage() {
        let mut server = transport();
        let client = UdpSocket::bind("127.0.0.1:0").unwrap();

        client.send_to(b"not bencode", server.local_addr()).unwrap();
        thread::sleep(Duration::from_millis(20));

        assert!(server.poll().is_none());
    }
}
