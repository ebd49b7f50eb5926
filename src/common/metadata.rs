//! Metadata - per-connection context used for logging
//!
//! Nothing here influences how bytes flow; it only names things.

use super::Address;

/// Transport family of an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Network {
    #[default]
    Tcp,
    Unix,
}

impl std::fmt::Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Network::Tcp => write!(f, "tcp"),
            Network::Unix => write!(f, "unix"),
        }
    }
}

/// Relay direction within a connection pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// inbound → outbound
    Upstream,
    /// outbound → inbound
    Downstream,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Upstream => write!(f, "inbound -> outbound"),
            Direction::Downstream => write!(f, "outbound -> inbound"),
        }
    }
}

/// I/O operation a deadline applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Read,
    Write,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::Read => write!(f, "read"),
            Operation::Write => write!(f, "write"),
        }
    }
}

/// Context of one accepted connection
#[derive(Debug, Clone)]
pub struct Metadata {
    /// Connection number assigned by the accept loop
    pub id: u64,
    /// Peer address of the accepted connection
    pub source: Address,
    /// Outbound peer the connection is bridged to
    pub destination: Address,
}

impl Metadata {
    /// Create new metadata with required fields
    pub fn new(destination: Address) -> Self {
        Self {
            id: 0,
            source: Address::unspecified(),
            destination,
        }
    }

    /// Builder: set connection id
    pub fn with_id(mut self, id: u64) -> Self {
        self.id = id;
        self
    }

    /// Builder: set source address
    pub fn with_source(mut self, source: Address) -> Self {
        self.source = source;
        self
    }
}
