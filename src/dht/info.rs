use std::net::SocketAddr;

use crate::common::{AddressFamily, Id};

use super::Dht;

/// Information and statistics about this node.
#[derive(Debug, Clone)]
pub struct Info {
    id: Id,
    local_addrs: Vec<SocketAddr>,
    routing_table_v4: usize,
    routing_table_v6: usize,
    jobs: usize,
    searches: usize,
    distributes: usize,
    stored_items: usize,
}

impl Info {
    /// This Node's [Id]
    pub fn id(&self) -> &Id {
        &self.id
    }

    /// Addresses of the bound endpoints.
    pub fn local_addrs(&self) -> &[SocketAddr] {
        &self.local_addrs
    }

    /// Number of nodes in the routing table of that family.
    pub fn routing_table_size(&self, family: AddressFamily) -> usize {
        match family {
            AddressFamily::V4 => self.routing_table_v4,
            AddressFamily::V6 => self.routing_table_v6,
        }
    }

    /// Outstanding requests.
    pub fn jobs(&self) -> usize {
        self.jobs
    }

    pub fn searches(&self) -> usize {
        self.searches
    }

    pub fn distributes(&self) -> usize {
        self.distributes
    }

    /// Items in the local store.
    pub fn stored_items(&self) -> usize {
        self.stored_items
    }
}

impl From<&Dht> for Info {
    fn from(dht: &Dht) -> Self {
        Self {
            id: *dht.id(),
            local_addrs: dht.local_addrs(),
            routing_table_v4: dht.routing_table(AddressFamily::V4).size(),
            routing_table_v6: dht.routing_table(AddressFamily::V6).size(),
            jobs: dht.jobs.len(),
            searches: dht.searches.len(),
            distributes: dht.distributes.len(),
            stored_items: dht.server.storage().len(),
        }
    }
}
