//! Layer 3: Transitive dependency matrix
//!
//! Row `a` holds every node `a` depends on, itself included. The closure is
//! maintained incrementally: adding an edge ORs rows into every dependent,
//! removing one re-derives the affected rows from their remaining parents.

use std::collections::{BTreeMap, BTreeSet};

use super::identity::NodeId;

const WORD_BITS: usize = 64;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct BitRow(Vec<u64>);

impl BitRow {
    fn single(bit: usize) -> Self {
        let mut row = BitRow::default();
        row.set(bit);
        row
    }

    fn get(&self, bit: usize) -> bool {
        self.0
            .get(bit / WORD_BITS)
            .is_some_and(|word| word & (1u64 << (bit % WORD_BITS)) != 0)
    }

    fn set(&mut self, bit: usize) {
        let word = bit / WORD_BITS;
        if self.0.len() <= word {
            self.0.resize(word + 1, 0);
        }
        self.0[word] |= 1u64 << (bit % WORD_BITS);
    }

    fn clear(&mut self, bit: usize) {
        if let Some(word) = self.0.get_mut(bit / WORD_BITS) {
            *word &= !(1u64 << (bit % WORD_BITS));
        }
    }

    fn union_with(&mut self, other: &BitRow) {
        if self.0.len() < other.0.len() {
            self.0.resize(other.0.len(), 0);
        }
        for (dst, src) in self.0.iter_mut().zip(&other.0) {
            *dst |= *src;
        }
    }

    fn ones(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().enumerate().flat_map(|(index, word)| {
            (0..WORD_BITS)
                .filter(move |bit| word & (1u64 << bit) != 0)
                .map(move |bit| index * WORD_BITS + bit)
        })
    }
}

/// Square "row depends on column" relation over registry nodes.
///
/// Rows exist for every slot ever allocated; removed nodes keep an empty row.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DependencyMatrix {
    rows: Vec<BitRow>,
}

impl DependencyMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the row for a fresh node: it depends only on itself.
    pub fn insert(&mut self, id: NodeId) {
        let index = id.index();
        if self.rows.len() <= index {
            self.rows.resize(index + 1, BitRow::default());
        }
        self.rows[index] = BitRow::single(index);
    }

    /// Drop the row of a removed node and any column bit left behind.
    pub fn remove(&mut self, id: NodeId) {
        let index = id.index();
        if let Some(row) = self.rows.get_mut(index) {
            *row = BitRow::default();
        }
        for row in &mut self.rows {
            row.clear(index);
        }
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.rows
            .get(id.index())
            .is_some_and(|row| row.get(id.index()))
    }

    /// O(1) lookup: does `a` (transitively) depend on `b`?
    pub fn depends_on(&self, a: NodeId, b: NodeId) -> bool {
        self.rows
            .get(a.index())
            .is_some_and(|row| row.get(b.index()))
    }

    /// Record that `child` depends on `parent`.
    ///
    /// The child row becomes `child | parent`; every node depending on the
    /// child receives the same union so multi-hop chains stay closed.
    pub fn add_edge(&mut self, child: NodeId, parent: NodeId) {
        let (c, p) = (child.index(), parent.index());
        let Some(parent_row) = self.rows.get(p).cloned() else {
            return;
        };
        let Some(child_row) = self.rows.get_mut(c) else {
            return;
        };
        child_row.union_with(&parent_row);
        let updated = child_row.clone();
        for (index, row) in self.rows.iter_mut().enumerate() {
            if index != c && row.get(c) {
                row.union_with(&updated);
            }
        }
    }

    /// Re-derive the closure after an edge into `child` was removed.
    ///
    /// `parents_of` must already reflect the removal. Rows are rebuilt from
    /// the remaining direct parents, child first, then every dependent of the
    /// child in topological order. Subtraction is not enough: another path
    /// may still establish the same dependency.
    pub fn remove_edge<F>(&mut self, child: NodeId, parents_of: F)
    where
        F: Fn(NodeId) -> Vec<NodeId>,
    {
        let affected: BTreeSet<usize> = self
            .rows
            .iter()
            .enumerate()
            .filter(|(_, row)| row.get(child.index()))
            .map(|(index, _)| index)
            .collect();

        for index in topological(&affected, &parents_of) {
            let mut row = BitRow::single(index);
            for parent in parents_of(NodeId::new(index as u32)) {
                if let Some(parent_row) = self.rows.get(parent.index()) {
                    row.union_with(parent_row);
                }
            }
            self.rows[index] = row;
        }
    }

    /// Nodes `id` depends on (itself included), ascending.
    pub fn dependencies(&self, id: NodeId) -> Vec<NodeId> {
        self.rows
            .get(id.index())
            .map(|row| row.ones().map(|bit| NodeId::new(bit as u32)).collect())
            .unwrap_or_default()
    }

    /// Nodes that depend on `id` (itself included), ascending.
    pub fn dependents(&self, id: NodeId) -> Vec<NodeId> {
        self.rows
            .iter()
            .enumerate()
            .filter(|(_, row)| row.get(id.index()))
            .map(|(index, _)| NodeId::new(index as u32))
            .collect()
    }

    /// Restrict the relation to `ids` (e.g. the nodes of one case).
    pub fn slice(&self, ids: &[NodeId]) -> MatrixSlice {
        let cells = ids
            .iter()
            .map(|a| ids.iter().map(|b| self.depends_on(*a, *b)).collect())
            .collect();
        MatrixSlice {
            ids: ids.to_vec(),
            cells,
        }
    }
}

/// Dense view of the relation over a subset of nodes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MatrixSlice {
    pub ids: Vec<NodeId>,
    pub cells: Vec<Vec<bool>>,
}

impl MatrixSlice {
    pub fn depends_on(&self, a: NodeId, b: NodeId) -> Option<bool> {
        let row = self.ids.iter().position(|id| *id == a)?;
        let col = self.ids.iter().position(|id| *id == b)?;
        Some(self.cells[row][col])
    }
}

/// Order `nodes` so that parents inside the set come before their children.
fn topological<F>(nodes: &BTreeSet<usize>, parents_of: &F) -> Vec<usize>
where
    F: Fn(NodeId) -> Vec<NodeId>,
{
    let mut pending: BTreeMap<usize, usize> = BTreeMap::new();
    let mut children: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for &node in nodes {
        let inside: Vec<usize> = parents_of(NodeId::new(node as u32))
            .into_iter()
            .map(NodeId::index)
            .filter(|parent| nodes.contains(parent))
            .collect();
        pending.insert(node, inside.len());
        for parent in inside {
            children.entry(parent).or_default().push(node);
        }
    }

    let mut ready: BTreeSet<usize> = pending
        .iter()
        .filter(|(_, count)| **count == 0)
        .map(|(node, _)| *node)
        .collect();
    let mut order = Vec::with_capacity(nodes.len());
    while let Some(node) = ready.pop_first() {
        order.push(node);
        for child in children.get(&node).into_iter().flatten() {
            if let Some(count) = pending.get_mut(child) {
                *count -= 1;
                if *count == 0 {
                    ready.insert(*child);
                }
            }
        }
    }
    order
}
