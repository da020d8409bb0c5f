use std::vec::IntoIter;

use crate::common::{closer, Id, Node};

/// Nodes sorted by their distance to a target, without duplicate ids,
/// keeping at most `capacity` nodes.
#[derive(Debug, Clone)]
pub struct ClosestNodes {
    target: Id,
    capacity: usize,
    nodes: Vec<Node>,
}

impl ClosestNodes {
    pub fn new(target: Id, capacity: usize) -> Self {
        Self {
            target,
            capacity,
            nodes: Vec::with_capacity(capacity + 1),
        }
    }

    // === Getters ===

    pub fn target(&self) -> Id {
        self.target
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Id of the closest node, if any.
    pub fn closest_id(&self) -> Option<&Id> {
        self.nodes.first().map(|n| n.id())
    }

    pub fn contains(&self, id: &Id) -> bool {
        self.nodes.iter().any(|n| n.id() == id)
    }

    // === Public Methods ===

    /// Insert a node in its sorted position, returns `true` if it was kept.
    pub fn add(&mut self, node: Node) -> bool {
        if self.contains(node.id()) {
            return false;
        }

        let position = self
            .nodes
            .iter()
            .position(|existing| closer(node.id(), existing.id(), &self.target))
            .unwrap_or(self.nodes.len());

        if position >= self.capacity {
            return false;
        }

        self.nodes.insert(position, node);
        self.nodes.truncate(self.capacity);

        true
    }

    pub fn remove(&mut self, id: &Id) {
        self.nodes.retain(|n| n.id() != id)
    }
}

impl IntoIterator for ClosestNodes {
    type Item = Node;
    type IntoIter = IntoIter<Node>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.into_iter()
    }
}

impl<'a> IntoIterator for &'a ClosestNodes {
    type Item = &'a Node;
    type IntoIter = std::slice::Iter<'a, Node>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add() {
        let target = Id::random();

        let mut closest_nodes = ClosestNodes::new(target, 20);

        for _ in 0..10 {
            let node = Node::random();
            closest_nodes.add(node.clone());
            closest_nodes.add(node);
        }

        assert_eq!(closest_nodes.nodes().len(), 10);

        let distances = closest_nodes
            .nodes()
            .iter()
            .map(|n| n.id().distance(&target))
            .collect::<Vec<_>>();

        let mut sorted = distances.clone();
        sorted.sort();

        assert_eq!(sorted, distances);
    }

    #[test]
    fn keeps_only_the_closest() {
        let target = Id::random();
        let mut closest_nodes = ClosestNodes::new(target, 8);

        let mut all = Vec::new();
        for _ in 0..50 {
            let node = Node::random();
            all.push(*node.id());
            closest_nodes.add(node);
        }

        all.sort_by_key(|id| id.distance(&target));

        let kept: Vec<Id> = closest_nodes.nodes().iter().map(|n| *n.id()).collect();

        assert_eq!(kept, all[..8].to_vec());
    }

    #[test]
    fn remove() {
        let mut closest_nodes = ClosestNodes::new(Id::random(), 8);
        let node = Node::random();

        closest_nodes.add(node.clone());
        assert!(closest_nodes.contains(node.id()));

        closest_nodes.remove(node.id());
        assert!(closest_nodes.is_empty());
    }
}
