//! Local networks of [Dht] nodes over a [MemoryNetwork].

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use crate::common::Id;
use crate::transport::MemoryNetwork;
use crate::Dht;

/// Simulated time between two rounds of [Testnet::pulse_until].
pub const PULSE_STEP: Duration = Duration::from_millis(10);

#[derive(Debug)]
/// Create a testnet of Dht nodes to run tests against instead of the real mainline network.
///
/// Every node knows all the nodes created before it, and bootstraps
/// from the first one.
pub struct Testnet {
    pub network: MemoryNetwork,
    pub bootstrap: Vec<SocketAddr>,
    pub nodes: Vec<Dht>,
}

impl Testnet {
    /// Create `count` nodes, their routing tables seeded as of `now`.
    pub fn new(count: usize, now: Instant) -> Testnet {
        let network = MemoryNetwork::new();

        let mut nodes: Vec<Dht> = Vec::with_capacity(count);
        let mut addresses: Vec<(Id, SocketAddr)> = Vec::with_capacity(count);
        let mut bootstrap = Vec::new();

        for _ in 0..count {
            let mut node = Dht::create(Id::random());
            let handle = node.bind(network.bind_v4());

            for (id, address) in &addresses {
                node.add_node(*id, *address, now);
            }
            node.bootstrap(bootstrap.clone());

            if let Some(address) = node.local_addr(handle) {
                if bootstrap.is_empty() {
                    bootstrap.push(address);
                }
                addresses.push((*node.id(), address));
            }

            nodes.push(node);
        }

        Testnet {
            network,
            bootstrap,
            nodes,
        }
    }

    /// Address of the node at `index`.
    pub fn address(&self, index: usize) -> Option<SocketAddr> {
        self.nodes
            .get(index)
            .and_then(|node| node.local_addrs().first().copied())
    }

    /// Pulse every node once at `now`.
    pub fn pulse_all(&mut self, now: Instant) {
        for node in self.nodes.iter_mut() {
            node.pulse(now);
        }
    }

    /// Pulse every node repeatedly, advancing time by [PULSE_STEP], until
    /// `done` holds or `limit` rounds ran.
    ///
    /// Returns the simulated time reached and whether `done` held.
    pub fn pulse_until(
        &mut self,
        start: Instant,
        limit: usize,
        mut done: impl FnMut(&Testnet) -> bool,
    ) -> (Instant, bool) {
        let mut now = start;

        for _ in 0..limit {
            self.pulse_all(now);

            if done(self) {
                return (now, true);
            }

            now += PULSE_STEP;
        }

        (now, done(self))
    }
}
