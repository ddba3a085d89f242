//! Struct and implementation of a ring member entry
use std::net::SocketAddr;

use crate::common::{Id, Ring, RingPosition};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// A ring member: its identity and the transport address it listens on.
pub struct Node {
    pub id: Id,
    pub address: SocketAddr,
}

impl Node {
    /// Creates a new Node from an id and socket address.
    pub fn new(id: Id, address: SocketAddr) -> Node {
        Node { id, address }
    }

    /// Node identified by the hash of its address, see [Id::from_address].
    pub fn from_address(address: SocketAddr) -> Node {
        Node {
            id: Id::from_address(address),
            address,
        }
    }

    // === Getters ===

    pub fn id(&self) -> &Id {
        &self.id
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    /// Position of this node on the given ring.
    pub fn position(&self, ring: &Ring) -> RingPosition {
        ring.position(&self.id)
    }
}
