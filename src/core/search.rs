//! Iterative lookup of the nodes closest to a target.

use std::collections::{HashMap, HashSet};
use std::fmt::{self, Debug, Formatter};

use tracing::{debug, trace};

use crate::common::{closer, ClosestNodes, Id, Node, StorageItem, MAX_BUCKET_SIZE_K};
use crate::core::DistributeId;

/// Concurrent queries per round.
pub const ALPHA: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
/// Handle of a running search.
pub struct SearchId(pub(crate) u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchKind {
    /// `find_node` queries.
    Nodes,
    /// `get` queries, collecting write tokens and the first valid value.
    Value,
}

#[derive(Debug, Clone, PartialEq)]
/// A node that answered a `get`, with the token it issued us.
pub struct Responder {
    pub node: Node,
    pub token: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub target: Id,
    /// Nodes that responded, closest first, at most K.
    pub closest: Vec<Node>,
    /// Responders to `get` queries among [Self::closest].
    pub responders: Vec<Responder>,
    pub value: Option<StorageItem>,
}

pub(crate) type SearchCallback = Box<dyn FnOnce(SearchResult)>;

pub(crate) enum SearchOwner {
    User(SearchCallback),
    Distribute(DistributeId),
    /// Bucket refresh.
    Refresh,
    /// Lookup of our own id after contacting bootstrap nodes.
    Bootstrap,
}

impl Debug for SearchOwner {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            SearchOwner::User(_) => write!(f, "User"),
            SearchOwner::Distribute(id) => write!(f, "Distribute({})", id.0),
            SearchOwner::Refresh => write!(f, "Refresh"),
            SearchOwner::Bootstrap => write!(f, "Bootstrap"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Batches of up to [ALPHA] queries, as long as each batch gets closer.
    Rounds,
    /// One last batch to every unqueried node among the K closest.
    FinalSweep { sent: bool },
    Done,
}

#[derive(Debug)]
pub(crate) struct Search {
    pub id: SearchId,
    pub owner: SearchOwner,
    kind: SearchKind,
    own_id: Id,
    /// Closest known candidates, queried or not.
    shortlist: ClosestNodes,
    /// Closest nodes that actually responded.
    responded: ClosestNodes,
    queried: HashSet<Id>,
    failed: HashSet<Id>,
    outstanding: HashSet<Id>,
    tokens: HashMap<Id, Vec<u8>>,
    value: Option<StorageItem>,
    /// Closest node known when the current round was sent.
    best_before_round: Option<Id>,
    phase: Phase,
}

impl Search {
    pub fn new(
        id: SearchId,
        own_id: Id,
        target: Id,
        kind: SearchKind,
        seeds: Vec<Node>,
        owner: SearchOwner,
    ) -> Self {
        let mut search = Self {
            id,
            owner,
            kind,
            own_id,
            shortlist: ClosestNodes::new(target, MAX_BUCKET_SIZE_K),
            responded: ClosestNodes::new(target, MAX_BUCKET_SIZE_K),
            queried: HashSet::new(),
            failed: HashSet::new(),
            outstanding: HashSet::new(),
            tokens: HashMap::new(),
            value: None,
            best_before_round: None,
            phase: Phase::Rounds,
        };

        for node in seeds {
            search.add_candidate(node);
        }

        trace!(?target, ?kind, seeds = search.shortlist.len(), "New search");

        search
    }

    // === Getters ===

    pub fn target(&self) -> Id {
        self.shortlist.target()
    }

    pub fn kind(&self) -> SearchKind {
        self.kind
    }

    /// Live shortlist, closest first.
    pub fn closest(&self) -> &[Node] {
        self.shortlist.nodes()
    }

    pub fn is_done(&self) -> bool {
        self.phase == Phase::Done
    }

    // === Public Methods ===

    /// Nodes to query now, each one at most once per search.
    pub fn next_queries(&mut self) -> Vec<Node> {
        match self.phase {
            Phase::Done => Vec::new(),
            Phase::Rounds => {
                if !self.outstanding.is_empty() {
                    return Vec::new();
                }

                let batch: Vec<Node> = self.unqueried().take(ALPHA).cloned().collect();

                if batch.is_empty() {
                    self.finish("shortlist exhausted");
                    return batch;
                }

                self.best_before_round = self.shortlist.closest_id().copied();
                self.mark_queried(&batch);

                batch
            }
            Phase::FinalSweep { sent: false } => {
                let batch: Vec<Node> = self.unqueried().cloned().collect();

                self.phase = Phase::FinalSweep { sent: true };
                self.mark_queried(&batch);

                if batch.is_empty() && self.outstanding.is_empty() {
                    self.finish("no closer nodes");
                }

                batch
            }
            Phase::FinalSweep { sent: true } => Vec::new(),
        }
    }

    /// A queried node answered, `responder` carries the id it answered with.
    pub fn on_response(
        &mut self,
        queried: &Id,
        responder: Node,
        nodes: &[Node],
        token: Option<Vec<u8>>,
        value: Option<StorageItem>,
    ) {
        if !self.outstanding.remove(queried) {
            return;
        }

        if let Some(token) = token {
            self.tokens.insert(*responder.id(), token);
        }

        if self.value.is_none() && value.as_ref().map(|v| v.target()) == Some(&self.target()) {
            self.value = value;
        }

        if responder.id() != &self.own_id {
            self.responded.add(responder);
        }

        for node in nodes {
            self.add_candidate(node.clone());
        }

        self.after_reply();
    }

    /// A queried node failed to answer, it won't be queried again.
    pub fn on_failure(&mut self, id: &Id) {
        if !self.outstanding.remove(id) {
            return;
        }

        self.failed.insert(*id);
        self.shortlist.remove(id);

        self.after_reply();
    }

    pub fn into_result(self) -> (SearchOwner, SearchResult) {
        let responders = self
            .responded
            .nodes()
            .iter()
            .filter_map(|node| {
                self.tokens.get(node.id()).map(|token| Responder {
                    node: node.clone(),
                    token: token.clone(),
                })
            })
            .collect();

        let result = SearchResult {
            target: self.responded.target(),
            closest: self.responded.nodes().to_vec(),
            responders,
            value: self.value,
        };

        (self.owner, result)
    }

    // === Private Methods ===

    fn add_candidate(&mut self, node: Node) {
        if node.id() == &self.own_id || self.failed.contains(node.id()) {
            return;
        }

        self.shortlist.add(node);
    }

    fn unqueried(&self) -> impl Iterator<Item = &Node> {
        self.shortlist
            .nodes()
            .iter()
            .filter(|node| !self.queried.contains(node.id()))
    }

    fn mark_queried(&mut self, batch: &[Node]) {
        for node in batch {
            self.queried.insert(*node.id());
            self.outstanding.insert(*node.id());
        }
    }

    fn after_reply(&mut self) {
        if !self.outstanding.is_empty() {
            return;
        }

        match self.phase {
            Phase::Rounds => {
                let improved = match (self.shortlist.closest_id(), &self.best_before_round) {
                    (Some(now), Some(before)) => closer(now, before, &self.target()),
                    (Some(_), None) => true,
                    (None, _) => false,
                };

                if !improved {
                    self.phase = Phase::FinalSweep { sent: false };
                }
            }
            Phase::FinalSweep { sent: true } => self.finish("final sweep answered"),
            _ => {}
        }
    }

    fn finish(&mut self, reason: &'static str) {
        self.phase = Phase::Done;
        let target = self.target();

        debug!(
            search = self.id.0,
            ?target,
            kind = ?self.kind,
            queried = self.queried.len(),
            responded = self.responded.len(),
            reason,
            "Search done"
        );
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn search(target: Id, seeds: Vec<Node>) -> Search {
        Search::new(
            SearchId(0),
            Id::random(),
            target,
            SearchKind::Nodes,
            seeds,
            SearchOwner::Refresh,
        )
    }

    #[test]
    fn empty_seeds_finish_immediately() {
        let mut search = search(Id::random(), Vec::new());

        assert!(search.next_queries().is_empty());
        assert!(search.is_done());

        let (_, result) = search.into_result();
        assert!(result.closest.is_empty());
    }

    #[test]
    fn queries_alpha_closest_first() {
        let target = Id::random();
        let seeds: Vec<Node> = (0..8).map(|_| Node::random()).collect();

        let mut search = search(target, seeds);

        let batch = search.next_queries();
        assert_eq!(batch.len(), ALPHA);
        assert_eq!(batch, search.closest()[..ALPHA].to_vec());

        // Strict rounds
        assert!(search.next_queries().is_empty());
    }

    #[test]
    fn no_progress_leads_to_final_sweep() {
        let target = Id::random();
        let seeds: Vec<Node> = (0..6).map(|_| Node::random()).collect();

        let mut search = search(target, seeds);

        let round = search.next_queries();
        for node in &round {
            search.on_response(node.id(), node.clone(), &[], None, None);
        }

        let sweep = search.next_queries();
        assert_eq!(sweep.len(), 3);
        assert!(sweep.iter().all(|node| !round.contains(node)));

        for node in &sweep[..2] {
            search.on_response(node.id(), node.clone(), &[], None, None);
        }
        assert!(!search.is_done());

        search.on_failure(sweep[2].id());
        assert!(search.is_done());

        let (_, result) = search.into_result();
        assert_eq!(result.closest.len(), 5);
        assert!(!result.closest.contains(&sweep[2]));
    }

    #[test]
    fn closer_nodes_start_another_round() {
        let target = Id::random();
        let far = Node::new(target.random_with_prefix(1, true), Node::random().address());
        let closer = Node::new(target.random_with_prefix(40, true), Node::random().address());

        let mut search = search(target, vec![far.clone()]);

        assert_eq!(search.next_queries(), vec![far.clone()]);
        let far_id = *far.id();
        search.on_response(&far_id, far, &[closer.clone()], None, None);

        assert_eq!(search.next_queries(), vec![closer.clone()]);
        search.on_response(closer.id(), closer.clone(), &[], None, None);

        // No progress, nothing left to sweep.
        assert!(search.next_queries().is_empty());
        assert!(search.is_done());

        let (_, result) = search.into_result();
        assert_eq!(result.closest.first(), Some(&closer));
    }

    #[test]
    fn collects_tokens_and_first_value() {
        let target = Id::random();
        let node = Node::random();

        let mut search = Search::new(
            SearchId(0),
            Id::random(),
            target,
            SearchKind::Value,
            vec![node.clone()],
            SearchOwner::Refresh,
        );

        search.next_queries();
        search.on_response(node.id(), node.clone(), &[], Some(vec![1, 2, 3, 4]), None);

        let (_, result) = search.into_result();
        assert_eq!(
            result.responders,
            vec![Responder {
                node,
                token: vec![1, 2, 3, 4]
            }]
        );
        assert_eq!(result.value, None);
    }

    #[test]
    fn own_id_is_never_queried() {
        let own = Node::random();
        let target = Id::random();

        let mut search = Search::new(
            SearchId(0),
            *own.id(),
            target,
            SearchKind::Nodes,
            vec![own],
            SearchOwner::Refresh,
        );

        assert!(search.next_queries().is_empty());
        assert!(search.is_done());
    }
}
