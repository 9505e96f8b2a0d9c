//! Layer 0: Identity atoms
//!
//! NodeId: registry-scoped node identifier
//! NodeIdAllocator: monotonic source of fresh identifiers

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Identifier of a node inside one `History` registry.
///
/// Identifiers are assigned monotonically and never reused, even after the
/// node is removed or an undo rolls the registry back.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(u32);

impl NodeId {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub fn get(self) -> u32 {
        self.0
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Accepts `12` or `#12`.
impl FromStr for NodeId {
    type Err = std::num::ParseIntError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();
        raw.strip_prefix('#').unwrap_or(raw).parse().map(NodeId)
    }
}

impl From<u32> for NodeId {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NodeIdAllocator {
    next: u32,
}

impl NodeIdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume allocation after `next - 1`.
    pub fn starting_at(next: u32) -> Self {
        Self { next }
    }

    pub fn allocate(&mut self) -> NodeId {
        let id = NodeId(self.next);
        self.next += 1;
        id
    }

    /// Make sure `id` will never be handed out again.
    pub fn reserve(&mut self, id: NodeId) {
        if id.0 >= self.next {
            self.next = id.0 + 1;
        }
    }

    pub fn peek(&self) -> u32 {
        self.next
    }

    /// Never move backwards: keeps identifiers unique across restores.
    pub fn advance_to(&mut self, next: u32) {
        self.next = self.next.max(next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocator_is_monotonic() {
        let mut alloc = NodeIdAllocator::new();
        let a = alloc.allocate();
        let b = alloc.allocate();
        assert!(a < b);
        alloc.reserve(NodeId::new(10));
        assert_eq!(alloc.allocate(), NodeId::new(11));
        alloc.advance_to(3);
        assert_eq!(alloc.peek(), 12);
    }

    #[test]
    fn node_id_display() {
        assert_eq!(NodeId::new(7).to_string(), "#7");
        assert_eq!(format!("{:?}", NodeId::new(7)), "NodeId(7)");
        assert_eq!("#7".parse::<NodeId>().unwrap(), NodeId::new(7));
        assert_eq!(" 12".parse::<NodeId>().unwrap(), NodeId::new(12));
        assert!("x".parse::<NodeId>().is_err());
    }
}
