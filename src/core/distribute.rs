//! Push an item to the nodes closest to its target.

use std::collections::HashSet;
use std::fmt::{self, Debug, Formatter};

use tracing::debug;

use crate::common::{Id, Node, StorageItem, MAX_BUCKET_SIZE_K};
use crate::core::{JobError, SearchResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
/// Handle of a running distribute.
pub struct DistributeId(pub(crate) u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Outcome of a distribute that reached at least one node.
pub struct DistributeReport {
    pub target: Id,
    /// Nodes a `put` was attempted against.
    pub attempted: usize,
    /// Nodes that accepted the `put`.
    pub stored: usize,
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistributeError {
    #[error("No nodes close to the target responded")]
    NoClosestNodes,
}

pub(crate) type DistributeCallback = Box<dyn FnOnce(Result<DistributeReport, DistributeError>)>;

#[derive(Debug, Clone, PartialEq)]
/// Requests a distribute wants sent.
pub(crate) enum DistributeAction {
    Put { node: Node, token: Vec<u8> },
    /// Fetch a fresh token from a prior holder first.
    Get { node: Node },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Searching,
    Storing,
    Done,
}

pub(crate) struct Distribute {
    pub id: DistributeId,
    item: StorageItem,
    callback: Option<DistributeCallback>,
    phase: Phase,
    targeted: HashSet<Id>,
    outstanding: usize,
    attempted: usize,
    stored: Vec<Node>,
}

impl Debug for Distribute {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Distribute")
            .field("id", &self.id)
            .field("target", self.item.target())
            .field("phase", &self.phase)
            .field("outstanding", &self.outstanding)
            .field("attempted", &self.attempted)
            .field("stored", &self.stored.len())
            .finish()
    }
}

impl Distribute {
    pub fn new(id: DistributeId, item: StorageItem, callback: DistributeCallback) -> Self {
        Self {
            id,
            item,
            callback: Some(callback),
            phase: Phase::Searching,
            targeted: HashSet::new(),
            outstanding: 0,
            attempted: 0,
            stored: Vec::new(),
        }
    }

    // === Getters ===

    pub fn item(&self) -> &StorageItem {
        &self.item
    }

    pub fn target(&self) -> &Id {
        self.item.target()
    }

    pub fn is_done(&self) -> bool {
        self.phase == Phase::Done
    }

    // === Public Methods ===

    /// The value search finished, put to the closest responders and every prior holder.
    pub fn on_search_done(
        &mut self,
        result: SearchResult,
        prior_holders: &[Node],
    ) -> Vec<DistributeAction> {
        let mut actions = Vec::new();

        for responder in result.responders.into_iter().take(MAX_BUCKET_SIZE_K) {
            if self.targeted.insert(*responder.node.id()) {
                actions.push(DistributeAction::Put {
                    node: responder.node,
                    token: responder.token,
                });
            }
        }

        for holder in prior_holders {
            if self.targeted.insert(*holder.id()) {
                actions.push(DistributeAction::Get {
                    node: holder.clone(),
                });
            }
        }

        self.attempted = self.targeted.len();
        self.outstanding = actions.len();
        self.phase = Phase::Storing;

        if self.outstanding == 0 {
            self.phase = Phase::Done;
        }

        actions
    }

    /// A prior holder answered the `get`, follow up with the `put`.
    pub fn on_token(
        &mut self,
        node: Node,
        token: Result<Vec<u8>, JobError>,
    ) -> Option<DistributeAction> {
        match token {
            Ok(token) => Some(DistributeAction::Put { node, token }),
            Err(error) => {
                self.on_put(node, Err(error));
                None
            }
        }
    }

    pub fn on_put(&mut self, node: Node, result: Result<(), JobError>) {
        self.outstanding = self.outstanding.saturating_sub(1);

        match result {
            Ok(()) => self.stored.push(node),
            Err(error) => {
                let target = self.target();
                debug!(?target, node = ?node.id(), ?error, "Put failed");
            }
        }

        if self.outstanding == 0 && self.phase == Phase::Storing {
            self.phase = Phase::Done;
        }
    }

    /// Notify the caller, once.
    pub fn finish(&mut self) {
        self.phase = Phase::Done;

        let outcome = if self.attempted == 0 {
            Err(DistributeError::NoClosestNodes)
        } else {
            Ok(DistributeReport {
                target: *self.target(),
                attempted: self.attempted,
                stored: self.stored.len(),
            })
        };

        let target = self.target();
        debug!(?target, ?outcome, "Distribute done");

        if let Some(callback) = self.callback.take() {
            callback(outcome);
        }
    }
}

#[cfg(test)]
mod test {
    use std::{cell::RefCell, rc::Rc};

    use super::*;
    use crate::core::Responder;

    type Outcome = Rc<RefCell<Option<Result<DistributeReport, DistributeError>>>>;

    fn distribute() -> (Distribute, Outcome) {
        let outcome: Outcome = Rc::new(RefCell::new(None));
        let captured = outcome.clone();

        let distribute = Distribute::new(
            DistributeId(0),
            StorageItem::immutable(&b"hello"[..]),
            Box::new(move |result| {
                *captured.borrow_mut() = Some(result);
            }),
        );

        (distribute, outcome)
    }

    fn result(target: Id, responders: &[Node]) -> SearchResult {
        SearchResult {
            target,
            closest: responders.to_vec(),
            responders: responders
                .iter()
                .map(|node| Responder {
                    node: node.clone(),
                    token: vec![0; 4],
                })
                .collect(),
            value: None,
        }
    }

    #[test]
    fn puts_to_responders_and_prior_holders() {
        let (mut distribute, outcome) = distribute();
        let target = *distribute.target();

        let responders = vec![Node::random(), Node::random()];
        let holder = Node::random();

        let actions = distribute.on_search_done(
            result(target, &responders),
            &[holder.clone(), responders[0].clone()],
        );

        assert_eq!(actions.len(), 3);
        assert!(matches!(&actions[2], DistributeAction::Get { node } if node == &holder));

        distribute.on_put(responders[0].clone(), Ok(()));
        distribute.on_put(responders[1].clone(), Err(JobError::Timeout));

        let put = distribute.on_token(holder.clone(), Ok(vec![1; 4]));
        assert_eq!(
            put,
            Some(DistributeAction::Put {
                node: holder.clone(),
                token: vec![1; 4]
            })
        );
        assert!(!distribute.is_done());

        distribute.on_put(holder, Ok(()));
        assert!(distribute.is_done());

        distribute.finish();

        assert_eq!(
            outcome.borrow().clone(),
            Some(Ok(DistributeReport {
                target,
                attempted: 3,
                stored: 2
            }))
        );
    }

    #[test]
    fn nothing_to_attempt() {
        let (mut distribute, outcome) = distribute();
        let target = *distribute.target();

        assert!(distribute.on_search_done(result(target, &[]), &[]).is_empty());
        assert!(distribute.is_done());

        distribute.finish();

        assert_eq!(
            outcome.borrow().clone(),
            Some(Err(DistributeError::NoClosestNodes))
        );
    }
}
