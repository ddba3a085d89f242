use std::net::IpAddr;
use std::time::Duration;

use crate::common::{Id, Node, DEFAULT_HINT_CAPACITY, NBIT};
use crate::core::stabilization::DEFAULT_STABILIZE_INTERVAL;

use super::transport::Transport;
use super::DEFAULT_REQUEST_TIMEOUT;

#[derive(Debug)]
/// Chord node configurations
pub struct Config {
    /// Width of the ring in bits, between 1 and [NBIT].
    ///
    /// All nodes of a ring must agree on it.
    ///
    /// Defaults to [NBIT]
    pub bits: u8,
    /// Explicit node [Id].
    ///
    /// Defaults to None, where the id is derived from the bound local address
    /// with [Id::from_address], or random if bound to an unspecified address.
    pub id: Option<Id>,
    /// A node already in the ring to join through.
    ///
    /// Defaults to None, where this node starts a new ring on its own.
    pub bootstrap: Option<Node>,
    /// Explicit port to listen on.
    ///
    /// Defaults to None
    pub port: Option<u16>,
    /// Address to bind the UDP socket to.
    ///
    /// Defaults to None, binding to all interfaces.
    pub bind_address: Option<IpAddr>,
    /// Remote call timeout duration.
    ///
    /// Also bounds how long a connection attempt may take before its queued
    /// calls fail as unreachable.
    ///
    /// Defaults to [DEFAULT_REQUEST_TIMEOUT]
    pub request_timeout: Duration,
    /// Period between two stabilization cycles.
    ///
    /// Defaults to [DEFAULT_STABILIZE_INTERVAL]
    pub stabilize_interval: Duration,
    /// Maximum number of lookup hints remembered.
    ///
    /// Defaults to [DEFAULT_HINT_CAPACITY]
    pub hint_capacity: usize,
    /// Custom message transport.
    ///
    /// Defaults to None, where a UDP transport is bound according to
    /// [Self::bind_address] and [Self::port].
    pub transport: Option<Box<dyn Transport>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bits: NBIT as u8,
            id: None,
            bootstrap: None,
            port: None,
            bind_address: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            stabilize_interval: DEFAULT_STABILIZE_INTERVAL,
            hint_capacity: DEFAULT_HINT_CAPACITY,
            transport: None,
        }
    }
}
