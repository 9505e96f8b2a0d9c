//! Layer 2: Keyword storage tree
//!
//! A command's storage maps keyword names to values. Values nest (lists,
//! keyword blocks) and may reference other commands by node id; every such
//! reference is a dependency of the owning command.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::identity::NodeId;

/// Keyword storage, kept in insertion order so rendered text is stable.
pub type Keywords = IndexMap<String, Value>;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
    List(Vec<Value>),
    Block(Keywords),
    Ref(NodeId),
}

impl Value {
    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    pub fn block<K, I>(items: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Value::Block(items.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Short name of the variant, used in diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Bool(_) => "bool",
            Value::Text(_) => "str",
            Value::List(_) => "list",
            Value::Block(_) => "block",
            Value::Ref(_) => "reference",
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_ref_id(&self) -> Option<NodeId> {
        match self {
            Value::Ref(id) => Some(*id),
            _ => None,
        }
    }

    /// Visit this value and every nested value, depth first.
    pub fn walk<F: FnMut(&Value)>(&self, f: &mut F) {
        f(self);
        match self {
            Value::List(items) => {
                for item in items {
                    item.walk(&mut *f);
                }
            }
            Value::Block(block) => {
                for item in block.values() {
                    item.walk(&mut *f);
                }
            }
            _ => {}
        }
    }

    /// All referenced nodes, first occurrence order, no duplicates.
    pub fn refs(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.walk(&mut |value| {
            if let Value::Ref(id) = value
                && !out.contains(id)
            {
                out.push(*id);
            }
        });
        out
    }

    /// Rewrite references through `map`. Returns true when anything changed.
    pub fn remap_refs(&mut self, map: &BTreeMap<NodeId, NodeId>) -> bool {
        match self {
            Value::Ref(id) => match map.get(id) {
                Some(new) if new != id => {
                    *id = *new;
                    true
                }
                _ => false,
            },
            Value::List(items) => items
                .iter_mut()
                .fold(false, |changed, item| item.remap_refs(map) || changed),
            Value::Block(block) => remap_keywords(block, map),
            _ => false,
        }
    }
}

/// Every node referenced anywhere in `storage`, first occurrence order.
pub fn keyword_refs(storage: &Keywords) -> Vec<NodeId> {
    let mut out = Vec::new();
    for value in storage.values() {
        for id in value.refs() {
            if !out.contains(&id) {
                out.push(id);
            }
        }
    }
    out
}

pub fn remap_keywords(storage: &mut Keywords, map: &BTreeMap<NodeId, NodeId>) -> bool {
    storage
        .values_mut()
        .fold(false, |changed, value| value.remap_refs(map) || changed)
}

/// Look up a nested keyword, descending through blocks (`["AFFE", "TOUT"]`).
///
/// Lists of blocks are searched in order; the first hit wins.
pub fn lookup<'a>(storage: &'a Keywords, path: &[&str]) -> Option<&'a Value> {
    let (head, rest) = path.split_first()?;
    let value = storage.get(*head)?;
    if rest.is_empty() {
        return Some(value);
    }
    match value {
        Value::Block(block) => lookup(block, rest),
        Value::List(items) => items.iter().find_map(|item| match item {
            Value::Block(block) => lookup(block, rest),
            _ => None,
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u32) -> NodeId {
        NodeId::new(n)
    }

    fn sample() -> Keywords {
        let mut storage = Keywords::new();
        storage.insert("MAILLAGE".into(), Value::Ref(id(3)));
        storage.insert(
            "AFFE".into(),
            Value::List(vec![
                Value::block([("TOUT", Value::text("OUI")), ("MATER", Value::Ref(id(5)))]),
                Value::block([("GROUP_MA", Value::text("top")), ("MATER", Value::Ref(id(3)))]),
            ]),
        );
        storage
    }

    #[test]
    fn refs_walk_the_whole_tree_without_duplicates() {
        assert_eq!(keyword_refs(&sample()), vec![id(3), id(5)]);
    }

    #[test]
    fn remap_rewrites_nested_references() {
        let mut storage = sample();
        let map = BTreeMap::from([(id(3), id(30))]);
        assert!(remap_keywords(&mut storage, &map));
        assert_eq!(keyword_refs(&storage), vec![id(30), id(5)]);
        assert!(!remap_keywords(&mut storage, &map));
    }

    #[test]
    fn lookup_descends_blocks_and_lists() {
        let storage = sample();
        assert_eq!(
            lookup(&storage, &["AFFE", "GROUP_MA"]),
            Some(&Value::text("top"))
        );
        assert_eq!(lookup(&storage, &["AFFE", "MISSING"]), None);
        assert_eq!(lookup(&storage, &[]), None);
    }

    #[test]
    fn serde_uses_tagged_variants() {
        let json = serde_json::to_string(&Value::Ref(id(2))).unwrap();
        assert_eq!(json, r#"{"ref":2}"#);
        let back: Value = serde_json::from_str(r#"{"list":[{"int":1},{"float":2.5}]}"#).unwrap();
        assert_eq!(back, Value::List(vec![Value::Int(1), Value::Float(2.5)]));
    }
}
