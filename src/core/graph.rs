//! Layer 4: Node registry
//!
//! `NodeArena` owns every node of one history: its kind, its parent/child
//! ownership edges and the dependency matrix derived from those edges. Edge
//! mutations always go through the arena so both stay in sync.

use std::collections::{BTreeMap, BTreeSet};

use super::domain::NodeKind;
use super::error::OperationError;
use super::identity::{NodeId, NodeIdAllocator};
use super::matrix::{DependencyMatrix, MatrixSlice};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GraphNode {
    id: NodeId,
    kind: NodeKind,
    parents: BTreeSet<NodeId>,
    children: BTreeSet<NodeId>,
}

impl GraphNode {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn parents(&self) -> &BTreeSet<NodeId> {
        &self.parents
    }

    pub fn children(&self) -> &BTreeSet<NodeId> {
        &self.children
    }

    pub fn is_linked(&self) -> bool {
        !self.parents.is_empty() || !self.children.is_empty()
    }
}

#[derive(Clone, Debug, Default)]
pub struct NodeArena {
    nodes: BTreeMap<NodeId, GraphNode>,
    ids: NodeIdAllocator,
    matrix: DependencyMatrix,
}

impl NodeArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate and register a fresh node with no edges.
    pub fn create(&mut self, kind: NodeKind) -> NodeId {
        let id = self.ids.allocate();
        self.register(id, kind);
        id
    }

    /// Register a node under a known identifier (used when loading).
    pub fn create_with_id(&mut self, id: NodeId, kind: NodeKind) -> Result<(), OperationError> {
        if self.nodes.contains_key(&id) {
            return Err(OperationError::DuplicateNode { id });
        }
        self.ids.reserve(id);
        self.register(id, kind);
        Ok(())
    }

    fn register(&mut self, id: NodeId, kind: NodeKind) {
        self.nodes.insert(
            id,
            GraphNode {
                id,
                kind,
                parents: BTreeSet::new(),
                children: BTreeSet::new(),
            },
        );
        self.matrix.insert(id);
    }

    pub fn get(&self, id: NodeId) -> Option<&GraphNode> {
        self.nodes.get(&id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn kind(&self, id: NodeId) -> Option<NodeKind> {
        self.nodes.get(&id).map(|node| node.kind)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.values()
    }

    pub fn next_id(&self) -> u32 {
        self.ids.peek()
    }

    /// Keep allocation monotonic when a snapshot with a lower watermark is
    /// restored over this arena.
    pub(crate) fn advance_ids(&mut self, next: u32) {
        self.ids.advance_to(next);
    }

    pub fn expect_kind(&self, id: NodeId, expected: NodeKind) -> Result<(), OperationError> {
        match self.kind(id) {
            None => Err(OperationError::UnknownNode { id }),
            Some(actual) if actual != expected => Err(OperationError::WrongKind {
                id,
                expected,
                actual,
            }),
            Some(_) => Ok(()),
        }
    }

    pub fn parents(&self, id: NodeId) -> Vec<NodeId> {
        self.nodes
            .get(&id)
            .map(|node| node.parents.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.nodes
            .get(&id)
            .map(|node| node.children.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn has_edge(&self, child: NodeId, parent: NodeId) -> bool {
        self.nodes
            .get(&child)
            .is_some_and(|node| node.parents.contains(&parent))
    }

    /// Make `child` depend on `parent`. Linking twice is a no-op.
    pub fn add_parent(&mut self, child: NodeId, parent: NodeId) -> Result<(), OperationError> {
        if child == parent {
            return Err(OperationError::SelfEdge { id: child });
        }
        self.require(child)?;
        self.require(parent)?;
        if self.has_edge(child, parent) {
            return Ok(());
        }
        if self.matrix.depends_on(parent, child) {
            return Err(OperationError::Cycle { child, parent });
        }
        if let Some(node) = self.nodes.get_mut(&child) {
            node.parents.insert(parent);
        }
        if let Some(node) = self.nodes.get_mut(&parent) {
            node.children.insert(child);
        }
        self.matrix.add_edge(child, parent);
        Ok(())
    }

    pub fn remove_parent(&mut self, child: NodeId, parent: NodeId) -> Result<(), OperationError> {
        if !self.has_edge(child, parent) {
            return Err(OperationError::MissingEdge { child, parent });
        }
        if let Some(node) = self.nodes.get_mut(&child) {
            node.parents.remove(&parent);
        }
        if let Some(node) = self.nodes.get_mut(&parent) {
            node.children.remove(&child);
        }
        let nodes = &self.nodes;
        self.matrix.remove_edge(child, |id| {
            nodes
                .get(&id)
                .map(|node| node.parents.iter().copied().collect())
                .unwrap_or_default()
        });
        Ok(())
    }

    /// Sever every edge of `id`, in both directions.
    pub fn unlink_all(&mut self, id: NodeId) -> Result<(), OperationError> {
        for parent in self.parents(id) {
            self.remove_parent(id, parent)?;
        }
        for child in self.children(id) {
            self.remove_parent(child, id)?;
        }
        Ok(())
    }

    /// Unregister a node. Edges must have been severed first.
    pub fn remove(&mut self, id: NodeId) -> Result<NodeKind, OperationError> {
        let node = self.nodes.get(&id).ok_or(OperationError::UnknownNode { id })?;
        if node.is_linked() {
            return Err(OperationError::StillLinked {
                id,
                parents: node.parents.len(),
                children: node.children.len(),
            });
        }
        let kind = node.kind;
        if self
            .nodes
            .values()
            .any(|node| node.parents.contains(&id) || node.children.contains(&id))
        {
            return Err(OperationError::Dangling { id });
        }
        self.nodes.remove(&id);
        self.matrix.remove(id);
        Ok(kind)
    }

    pub fn depends_on(&self, a: NodeId, b: NodeId) -> bool {
        self.matrix.depends_on(a, b)
    }

    pub fn matrix(&self) -> &DependencyMatrix {
        &self.matrix
    }

    pub fn slice(&self, ids: &[NodeId]) -> MatrixSlice {
        self.matrix.slice(ids)
    }

    /// Every `(child, parent)` edge, ordered.
    pub fn edges(&self) -> Vec<(NodeId, NodeId)> {
        self.nodes
            .values()
            .flat_map(|node| node.parents.iter().map(move |parent| (node.id, *parent)))
            .collect()
    }

    fn require(&self, id: NodeId) -> Result<(), OperationError> {
        if self.contains(id) {
            Ok(())
        } else {
            Err(OperationError::UnknownNode { id })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edges_are_symmetric() {
        let mut arena = NodeArena::new();
        let stage = arena.create(NodeKind::Stage);
        let cmd = arena.create(NodeKind::Command);
        arena.add_parent(cmd, stage).unwrap();
        assert_eq!(arena.parents(cmd), vec![stage]);
        assert_eq!(arena.children(stage), vec![cmd]);
        assert!(arena.depends_on(cmd, stage));
        arena.remove_parent(cmd, stage).unwrap();
        assert!(arena.children(stage).is_empty());
        assert!(!arena.depends_on(cmd, stage));
    }

    #[test]
    fn cycles_and_self_edges_are_rejected() {
        let mut arena = NodeArena::new();
        let a = arena.create(NodeKind::Command);
        let b = arena.create(NodeKind::Command);
        let c = arena.create(NodeKind::Command);
        arena.add_parent(b, a).unwrap();
        arena.add_parent(c, b).unwrap();
        assert_eq!(
            arena.add_parent(a, c),
            Err(OperationError::Cycle { child: a, parent: c })
        );
        assert_eq!(arena.add_parent(a, a), Err(OperationError::SelfEdge { id: a }));
        assert!(!arena.has_edge(a, c));
    }

    #[test]
    fn remove_requires_severed_edges() {
        let mut arena = NodeArena::new();
        let a = arena.create(NodeKind::Command);
        let b = arena.create(NodeKind::Command);
        arena.add_parent(b, a).unwrap();
        assert!(matches!(
            arena.remove(a),
            Err(OperationError::StillLinked { children: 1, .. })
        ));
        arena.unlink_all(a).unwrap();
        assert_eq!(arena.remove(a), Ok(NodeKind::Command));
        assert!(!arena.contains(a));
        // Identifiers are never reused.
        let c = arena.create(NodeKind::Command);
        assert!(c > b);
    }

    #[test]
    fn missing_edge_is_an_error() {
        let mut arena = NodeArena::new();
        let a = arena.create(NodeKind::Stage);
        let b = arena.create(NodeKind::Command);
        assert_eq!(
            arena.remove_parent(b, a),
            Err(OperationError::MissingEdge { child: b, parent: a })
        );
    }
}
