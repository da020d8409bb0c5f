//! Struct and implementation of the Node entry in the Kademlia routing table
use std::{
    net::{Ipv4Addr, SocketAddr, SocketAddrV4},
    time::Instant,
};

use crate::common::Id;

/// How much we trust a node to still be reachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeQuality {
    /// Responded to one of our requests recently.
    Good,
    /// Contacted us, or stopped answering for a while.
    Questionable,
    /// Failed too many requests in a row, about to be evicted.
    Bad,
    /// Only heard about from other nodes.
    Unknown,
}

impl NodeQuality {
    /// Rank used to decide which copy of a node is better known.
    pub(crate) fn rank(&self) -> u8 {
        match self {
            NodeQuality::Good => 3,
            NodeQuality::Questionable => 2,
            NodeQuality::Unknown => 1,
            NodeQuality::Bad => 0,
        }
    }
}

#[derive(Debug, Clone)]
/// Node entry in Kademlia routing table
pub struct Node {
    id: Id,
    address: SocketAddr,
    quality: NodeQuality,
    last_seen: Instant,
    pending_pings: u8,
    pub(crate) last_ping: Option<Instant>,
}

impl Node {
    /// Creates a new Node from an id and socket address, as an [NodeQuality::Unknown] contact.
    pub fn new(id: Id, address: SocketAddr) -> Node {
        Node {
            id,
            address,
            quality: NodeQuality::Unknown,
            last_seen: Instant::now(),
            pending_pings: 0,
            last_ping: None,
        }
    }

    /// Creates a node with a random Id and address, for testing.
    pub fn random() -> Node {
        Node::new(
            Id::random(),
            SocketAddrV4::new(Ipv4Addr::from(rand::random::<u32>()), rand::random()).into(),
        )
    }

    // === Options ===

    pub fn with_quality(mut self, quality: NodeQuality) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_last_seen(mut self, last_seen: Instant) -> Self {
        self.last_seen = last_seen;
        self
    }

    // === Getters ===

    pub fn id(&self) -> &Id {
        &self.id
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    pub fn quality(&self) -> NodeQuality {
        self.quality
    }

    pub fn last_seen(&self) -> Instant {
        self.last_seen
    }

    /// Consecutive requests this node failed to answer.
    pub fn pending_pings(&self) -> u8 {
        self.pending_pings
    }

    pub fn is_good(&self) -> bool {
        self.quality == NodeQuality::Good
    }

    // === Mutations, owned by the routing table ===

    pub(crate) fn set_address(&mut self, address: SocketAddr) {
        self.address = address;
    }

    pub(crate) fn touch(&mut self, now: Instant) {
        self.last_seen = now;
    }

    pub(crate) fn mark_responded(&mut self, now: Instant) {
        self.quality = NodeQuality::Good;
        self.pending_pings = 0;
        self.last_seen = now;
        self.last_ping = None;
    }

    /// Count a failed request, returns the new number of consecutive failures.
    pub(crate) fn mark_timeout(&mut self, threshold: u8) -> u8 {
        self.pending_pings = self.pending_pings.saturating_add(1);

        if self.pending_pings >= threshold {
            self.quality = NodeQuality::Bad;
        } else if self.quality == NodeQuality::Good {
            self.quality = NodeQuality::Questionable;
        }

        self.pending_pings
    }

    /// Demote after a missed refresh, never upgrades.
    pub(crate) fn demote_to_questionable(&mut self) {
        if self.quality == NodeQuality::Good {
            self.quality = NodeQuality::Questionable;
        }
    }

    pub(crate) fn upgrade_quality(&mut self, quality: NodeQuality) {
        if quality.rank() > self.quality.rank() {
            self.quality = quality;
        }
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.address == other.address
    }
}
