//! Kademlia routing table, one per address family.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use tracing::{debug, info, trace};

use crate::common::{ClosestNodes, Id, Node, NodeQuality, MAX_DISTANCE};

/// K = the maximum size of a k-bucket.
pub const MAX_BUCKET_SIZE_K: usize = 8;
/// Consecutive failed requests before a node is evicted.
pub const MAX_FAILED_PINGS: u8 = 3;
/// A bucket that didn't change for this long gets a refresh lookup.
pub const BUCKET_REFRESH_INTERVAL: Duration = Duration::from_secs(15 * 60);
/// A node not heard from for this long is questionable and gets pinged.
pub const NODE_LIVENESS_WINDOW: Duration = Duration::from_secs(15 * 60);
/// Minimum delay between two verification pings to the same node.
pub const PING_BACKOFF: Duration = Duration::from_secs(60);

/// The address family a [RoutingTable] is responsible for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressFamily {
    V4,
    V6,
}

impl AddressFamily {
    pub fn of(address: &SocketAddr) -> Self {
        match address {
            SocketAddr::V4(_) => AddressFamily::V4,
            SocketAddr::V6(_) => AddressFamily::V6,
        }
    }
}

/// Result of [RoutingTable::insert].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// New node added to its bucket.
    Inserted,
    /// Node was already known. Direct contact refreshes its address and
    /// last_seen, hearsay leaves it untouched.
    Updated,
    /// Node took the place of a less known node, which was dropped.
    Replaced(Id),
    /// Node was not added.
    Rejected(Rejection),
}

/// Why a node was not added to the routing table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Bucket is full and can't split, the node is kept as a replacement candidate.
    BucketFull,
    /// Never add our own Id.
    OwnId,
    /// Address belongs to the other family's table.
    WrongFamily,
}

/// Work the routing table wants done, see [RoutingTable::tick].
#[derive(Debug, Default)]
pub struct MaintenanceDecisions {
    /// Random ids inside the ranges of buckets due for a refresh.
    pub refresh_targets: Vec<Id>,
    /// Nodes overdue for a liveness check.
    pub nodes_to_ping: Vec<Node>,
}

#[derive(Debug, Clone)]
/// Kademlia routing table
pub struct RoutingTable {
    id: Id,
    family: AddressFamily,
    /// Bucket `i` holds ids sharing exactly `i` leading bits with `id`,
    /// except the last one that holds every id sharing at least that many bits.
    buckets: Vec<KBucket>,
}

impl RoutingTable {
    /// Create a new [RoutingTable] with a given id.
    pub fn new(id: Id, family: AddressFamily) -> Self {
        RoutingTable {
            id,
            family,
            buckets: vec![KBucket::default()],
        }
    }

    // === Getters ===

    /// Returns the [Id] of this node, where the distance is measured from.
    pub fn id(&self) -> &Id {
        &self.id
    }

    pub fn family(&self) -> AddressFamily {
        self.family
    }

    pub fn buckets_count(&self) -> usize {
        self.buckets.len()
    }

    /// Returns `true` if this routing table is empty.
    pub fn is_empty(&self) -> bool {
        self.buckets.iter().all(|bucket| bucket.is_empty())
    }

    /// Return the number of nodes in this routing table.
    pub fn size(&self) -> usize {
        self.buckets.iter().map(|bucket| bucket.nodes.len()).sum()
    }

    /// Returns an iterator over the nodes in this routing table.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.buckets.iter().flat_map(|bucket| bucket.nodes.iter())
    }

    pub fn find(&self, id: &Id) -> Option<&Node> {
        self.buckets[self.bucket_index(id)].get(id)
    }

    pub fn find_by_address(&self, address: &SocketAddr) -> Option<&Node> {
        self.nodes().find(|node| node.address() == *address)
    }

    // === Public Methods ===

    /// Insert a contacted node, see [InsertOutcome].
    ///
    /// An [NodeQuality::Unknown] node only tells us it exists: it never
    /// changes the address or freshness of a node already in the table.
    pub fn insert(&mut self, mut node: Node, now: Instant) -> InsertOutcome {
        if node.id() == &self.id {
            return InsertOutcome::Rejected(Rejection::OwnId);
        }

        if AddressFamily::of(&node.address()) != self.family {
            return InsertOutcome::Rejected(Rejection::WrongFamily);
        }

        node.touch(now);

        loop {
            let index = self.bucket_index(node.id());
            let splittable =
                index == self.buckets.len() - 1 && self.buckets.len() < MAX_DISTANCE as usize;

            let bucket = &mut self.buckets[index];

            if let Some(existing) = bucket.get_mut(node.id()) {
                if node.quality().rank() < NodeQuality::Questionable.rank() {
                    return InsertOutcome::Updated;
                }

                existing.set_address(node.address());
                existing.touch(now);
                existing.upgrade_quality(node.quality());

                bucket.move_to_back(node.id());
                bucket.last_changed = Some(now);

                return InsertOutcome::Updated;
            }

            if !bucket.is_full() {
                bucket.remove_replacement(node.id());
                bucket.nodes.push(node);
                bucket.last_changed = Some(now);

                return InsertOutcome::Inserted;
            }

            if splittable {
                self.split(now);
                continue;
            }

            // Hearsay nodes make room for nodes we actually talked to.
            if let Some(position) = bucket.nodes.iter().position(|existing| {
                existing.quality() == NodeQuality::Unknown
                    && node.quality().rank() > NodeQuality::Unknown.rank()
            }) {
                let evicted = bucket.nodes.remove(position);
                bucket.nodes.push(node);
                bucket.last_changed = Some(now);

                return InsertOutcome::Replaced(*evicted.id());
            }

            bucket.add_replacement(node);

            return InsertOutcome::Rejected(Rejection::BucketFull);
        }
    }

    /// Promote a node to [NodeQuality::Good] after a successful round trip.
    ///
    /// Returns `false` if the node is not in the table.
    pub fn mark_responded(&mut self, id: &Id, now: Instant) -> bool {
        let index = self.bucket_index(id);
        let bucket = &mut self.buckets[index];

        match bucket.get_mut(id) {
            Some(node) => {
                node.mark_responded(now);
                bucket.move_to_back(id);
                bucket.last_changed = Some(now);
                true
            }
            None => false,
        }
    }

    /// Count a failed request to a node, evicting it after [MAX_FAILED_PINGS].
    ///
    /// Returns `true` if the node got evicted.
    pub fn mark_timeout(&mut self, id: &Id) -> bool {
        let index = self.bucket_index(id);
        let bucket = &mut self.buckets[index];

        let failures = match bucket.get_mut(id) {
            Some(node) => node.mark_timeout(MAX_FAILED_PINGS),
            None => return false,
        };

        if failures < MAX_FAILED_PINGS {
            trace!(?id, failures, "Node failed to respond");
            return false;
        }

        bucket.remove(id);
        let replacement = bucket.promote_replacement();

        debug!(?id, ?replacement, "Evicted unresponsive node");

        true
    }

    /// Remove a node from this routing table.
    pub fn remove(&mut self, id: &Id) -> Option<Node> {
        let index = self.bucket_index(id);
        self.buckets[index].remove(id)
    }

    /// Return up to `n` nodes closest to the target, closest first.
    pub fn nearest(&self, target: &Id, n: usize) -> Vec<Node> {
        let mut closest = ClosestNodes::new(*target, n);

        for node in self.nodes() {
            closest.add(node.clone());
        }

        closest.into_iter().collect()
    }

    /// Periodic maintenance, see [MaintenanceDecisions].
    pub fn tick(&mut self, now: Instant) -> MaintenanceDecisions {
        let mut decisions = MaintenanceDecisions::default();
        let last = self.buckets.len() - 1;

        for (index, bucket) in self.buckets.iter_mut().enumerate() {
            let last_changed = *bucket.last_changed.get_or_insert(now);

            if now.saturating_duration_since(last_changed) >= BUCKET_REFRESH_INTERVAL {
                bucket.last_changed = Some(now);
                decisions
                    .refresh_targets
                    .push(self.id.random_with_prefix(index as u8, index != last));
            }

            for node in bucket.nodes.iter_mut() {
                if now.saturating_duration_since(node.last_seen()) < NODE_LIVENESS_WINDOW {
                    continue;
                }

                node.demote_to_questionable();

                let ping_due = node
                    .last_ping
                    .map(|pinged_at| now.saturating_duration_since(pinged_at) >= PING_BACKOFF)
                    .unwrap_or(true);

                if ping_due {
                    node.last_ping = Some(now);
                    decisions.nodes_to_ping.push(node.clone());
                }
            }
        }

        decisions
    }

    // === Private Methods ===

    fn bucket_index(&self, id: &Id) -> usize {
        (self.id.common_prefix_len(id) as usize).min(self.buckets.len() - 1)
    }

    /// Split the last bucket, moving nodes sharing more bits with us into a new bucket.
    fn split(&mut self, now: Instant) {
        let depth = self.buckets.len() - 1;
        let own_id = self.id;

        let mut next = KBucket {
            last_changed: Some(now),
            ..Default::default()
        };

        if let Some(last) = self.buckets.last_mut() {
            let (stay, moving): (Vec<Node>, Vec<Node>) = last
                .nodes
                .drain(..)
                .partition(|node| own_id.common_prefix_len(node.id()) as usize == depth);
            last.nodes = stay;
            next.nodes = moving;

            let (stay, moving): (VecDeque<Node>, VecDeque<Node>) = last
                .replacements
                .drain(..)
                .partition(|node| own_id.common_prefix_len(node.id()) as usize == depth);
            last.replacements = stay;
            next.replacements = moving;
        }

        info!(family = ?self.family, buckets = depth + 2, "Split the routing table's last bucket");

        self.buckets.push(next);
    }
}

/// The IPv4 and IPv6 routing tables of one node, sharing its [Id].
#[derive(Debug, Clone)]
pub struct RoutingTables {
    v4: RoutingTable,
    v6: RoutingTable,
}

impl RoutingTables {
    pub fn new(id: Id) -> Self {
        Self {
            v4: RoutingTable::new(id, AddressFamily::V4),
            v6: RoutingTable::new(id, AddressFamily::V6),
        }
    }

    pub fn id(&self) -> &Id {
        self.v4.id()
    }

    pub fn get(&self, family: AddressFamily) -> &RoutingTable {
        match family {
            AddressFamily::V4 => &self.v4,
            AddressFamily::V6 => &self.v6,
        }
    }

    pub fn get_mut(&mut self, family: AddressFamily) -> &mut RoutingTable {
        match family {
            AddressFamily::V4 => &mut self.v4,
            AddressFamily::V6 => &mut self.v6,
        }
    }

    /// Table responsible for this address.
    pub fn for_address(&mut self, address: &SocketAddr) -> &mut RoutingTable {
        self.get_mut(AddressFamily::of(address))
    }

    pub fn size(&self) -> usize {
        self.v4.size() + self.v6.size()
    }

    pub fn is_empty(&self) -> bool {
        self.v4.is_empty() && self.v6.is_empty()
    }

    /// Up to `n` nodes from each family, closest first.
    pub fn nearest(&self, target: &Id, n: usize) -> Vec<Node> {
        let mut nodes = self.v4.nearest(target, n);
        nodes.extend(self.v6.nearest(target, n));
        nodes.sort_by_key(|node| node.id().distance(target));

        nodes
    }
}

/// Kbuckets are similar to LRU caches that checks and evicts unresponsive nodes,
/// without dropping any responsive nodes in the process.
#[derive(Debug, Clone, Default)]
pub struct KBucket {
    /// Nodes in the k-bucket, sorted by the least recently seen.
    nodes: Vec<Node>,
    /// Candidates waiting for a slot, most recent last.
    replacements: VecDeque<Node>,
    /// Unset until the first change or [RoutingTable::tick].
    last_changed: Option<Instant>,
}

impl KBucket {
    // === Getters ===

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.nodes.len() >= MAX_BUCKET_SIZE_K
    }

    fn get(&self, id: &Id) -> Option<&Node> {
        self.nodes.iter().find(|node| node.id() == id)
    }

    fn get_mut(&mut self, id: &Id) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|node| node.id() == id)
    }

    // === Private Methods ===

    fn move_to_back(&mut self, id: &Id) {
        if let Some(position) = self.nodes.iter().position(|node| node.id() == id) {
            let node = self.nodes.remove(position);
            self.nodes.push(node);
        }
    }

    fn remove(&mut self, id: &Id) -> Option<Node> {
        let position = self.nodes.iter().position(|node| node.id() == id)?;
        Some(self.nodes.remove(position))
    }

    fn add_replacement(&mut self, node: Node) {
        self.remove_replacement(node.id());

        if self.replacements.len() >= MAX_BUCKET_SIZE_K {
            self.replacements.pop_front();
        }

        self.replacements.push_back(node);
    }

    fn remove_replacement(&mut self, id: &Id) {
        self.replacements.retain(|node| node.id() != id);
    }

    fn promote_replacement(&mut self) -> Option<Id> {
        if self.is_full() {
            return None;
        }

        let node = self.replacements.pop_back()?;
        let id = *node.id();
        self.nodes.push(node);

        Some(id)
    }
}
