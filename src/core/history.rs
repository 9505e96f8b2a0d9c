//! Layer 8: History
//!
//! `History` is the root container of a study. It owns the node registry,
//! every case, stage and command record, the external services and the
//! change listeners. All mutations go through it.
//!
//! Ownership edges run from parent to child; a child depends on its parents:
//! - every case sits under the history root
//! - a stage sits under every case listing it
//! - stage `n + 1` sits under stage `n` for every case listing them in order
//! - a command sits under its stage, a comment under its command
//! - a text dataset sits under its stage
//! - a command sits under every command it references

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::catalog::{CatalogError, CommandCatalog, StaticCatalog};
use crate::convert::{SimpleConverter, StudyConverter};

use super::case::Case;
use super::command::{Command, CommandBody, Comment};
use super::domain::{CaseKind, NodeKind, Validity};
use super::error::OperationError;
use super::graph::NodeArena;
use super::identity::NodeId;
use super::stage::{Stage, StageContent};
use super::value::Value;

mod cases;
mod commands;
mod stages;

pub const CURRENT_CASE_NAME: &str = "CurrentCase";

/// External collaborators consulted by the history.
#[derive(Clone, Debug)]
pub struct Services {
    pub catalog: Arc<dyn CommandCatalog>,
    pub converter: Arc<dyn StudyConverter>,
}

impl Services {
    pub fn new(catalog: Arc<dyn CommandCatalog>, converter: Arc<dyn StudyConverter>) -> Self {
        Self { catalog, converter }
    }

    /// Embedded catalog and the keyword-call converter.
    pub fn builtin() -> Result<Self, CatalogError> {
        Ok(Self::new(
            Arc::new(StaticCatalog::builtin()?),
            Arc::new(SimpleConverter),
        ))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Created,
    Removed,
    Modified,
    Linked,
    Unlinked,
    /// The whole history was replaced (undo, redo, reload).
    Reset,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ChangeEvent {
    pub node: NodeId,
    pub kind: ChangeKind,
}

pub type Listener = Arc<dyn Fn(&ChangeEvent) + Send + Sync>;

#[derive(Clone)]
struct Subscription {
    id: SubscriptionId,
    node: Option<NodeId>,
    callback: Listener,
}

/// One validity problem with its explanation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Problem {
    pub node: NodeId,
    pub flag: Validity,
    pub message: String,
}

#[derive(Clone)]
pub struct History {
    pub(crate) arena: NodeArena,
    pub(crate) root: NodeId,
    pub(crate) current: NodeId,
    pub(crate) case_order: Vec<NodeId>,
    pub(crate) cases: BTreeMap<NodeId, Case>,
    pub(crate) stages: BTreeMap<NodeId, Stage>,
    pub(crate) commands: BTreeMap<NodeId, Command>,
    pub(crate) comments: BTreeMap<NodeId, Comment>,
    pub(crate) aster_version: String,
    services: Services,
    subscriptions: Vec<Subscription>,
    next_subscription: u64,
}

impl fmt::Debug for History {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("History")
            .field("root", &self.root)
            .field("current", &self.current)
            .field("cases", &self.case_order)
            .field("stages", &self.stages.len())
            .field("commands", &self.commands.len())
            .field("nodes", &self.arena.len())
            .finish_non_exhaustive()
    }
}

impl History {
    /// Empty history with one current case and no stage.
    pub fn new(services: Services) -> Self {
        let mut arena = NodeArena::new();
        let root = arena.create(NodeKind::History);
        let current = arena.create(NodeKind::Case);
        let linked = arena.add_parent(current, root);
        debug_assert!(linked.is_ok(), "fresh case links under the root");
        let mut history = Self::bare(services, arena, root, current);
        history.case_order.push(current);
        history
            .cases
            .insert(current, Case::new(current, CURRENT_CASE_NAME, CaseKind::Current));
        history
    }

    /// Registry without any record; the caller fills it in.
    pub(crate) fn bare(services: Services, arena: NodeArena, root: NodeId, current: NodeId) -> Self {
        Self {
            arena,
            root,
            current,
            case_order: Vec::new(),
            cases: BTreeMap::new(),
            stages: BTreeMap::new(),
            commands: BTreeMap::new(),
            comments: BTreeMap::new(),
            aster_version: String::new(),
            services,
            subscriptions: Vec::new(),
            next_subscription: 0,
        }
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn aster_version(&self) -> &str {
        &self.aster_version
    }

    pub fn set_aster_version(&mut self, version: impl Into<String>) {
        self.aster_version = version.into();
        self.emit(self.root, ChangeKind::Modified);
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn current_case(&self) -> NodeId {
        self.current
    }

    /// The full node registry.
    pub fn nodes(&self) -> &NodeArena {
        &self.arena
    }

    pub fn depends_on(&self, a: NodeId, b: NodeId) -> bool {
        self.arena.depends_on(a, b)
    }

    pub fn case(&self, id: NodeId) -> Result<&Case, OperationError> {
        self.arena.expect_kind(id, NodeKind::Case)?;
        self.cases.get(&id).ok_or(OperationError::UnknownNode { id })
    }

    /// Cases in creation order.
    pub fn cases(&self) -> impl Iterator<Item = &Case> {
        self.case_order.iter().filter_map(|id| self.cases.get(id))
    }

    pub fn run_cases(&self) -> impl Iterator<Item = &Case> {
        self.cases().filter(|case| case.kind() == CaseKind::Run)
    }

    pub fn case_by_name(&self, name: &str) -> Option<NodeId> {
        self.cases()
            .find(|case| case.name() == name)
            .map(Case::id)
    }

    pub fn stage(&self, id: NodeId) -> Result<&Stage, OperationError> {
        self.arena.expect_kind(id, NodeKind::Stage)?;
        self.stages.get(&id).ok_or(OperationError::UnknownNode { id })
    }

    pub fn command(&self, id: NodeId) -> Result<&Command, OperationError> {
        match self.commands.get(&id) {
            Some(command) => Ok(command),
            None => match self.arena.kind(id) {
                Some(actual) => Err(OperationError::WrongKind {
                    id,
                    expected: NodeKind::Command,
                    actual,
                }),
                None => Err(OperationError::UnknownNode { id }),
            },
        }
    }

    pub fn comment(&self, id: NodeId) -> Result<&Comment, OperationError> {
        self.arena.expect_kind(id, NodeKind::Comment)?;
        self.comments.get(&id).ok_or(OperationError::UnknownNode { id })
    }

    /// Cases listing `stage`, in case order.
    pub fn cases_using(&self, stage: NodeId) -> Vec<NodeId> {
        self.cases()
            .filter(|case| case.stages().contains(&stage))
            .map(Case::id)
            .collect()
    }

    pub fn is_shared(&self, stage: NodeId) -> bool {
        self.cases_using(stage).len() > 1
    }

    /// Case providing the naming scope of `stage`: the current case when it
    /// lists the stage, else the first case that does.
    pub(crate) fn owning_case(&self, stage: NodeId) -> Option<NodeId> {
        let users = self.cases_using(stage);
        if users.contains(&self.current) {
            Some(self.current)
        } else {
            users.first().copied()
        }
    }

    /// Stages whose commands `stage` may reference, `stage` included.
    pub(crate) fn visible_stages(&self, stage: NodeId) -> Vec<NodeId> {
        let Some(case) = self.owning_case(stage).and_then(|id| self.cases.get(&id)) else {
            return vec![stage];
        };
        match case.stage_index(stage) {
            Some(index) => case.stages()[..=index].to_vec(),
            None => vec![stage],
        }
    }

    pub fn subscribe<F>(&mut self, node: Option<NodeId>, callback: F) -> SubscriptionId
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.subscriptions.push(Subscription {
            id,
            node,
            callback: Arc::new(callback),
        });
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|sub| sub.id != id);
        self.subscriptions.len() != before
    }

    pub(crate) fn emit(&self, node: NodeId, kind: ChangeKind) {
        let event = ChangeEvent { node, kind };
        for sub in &self.subscriptions {
            if sub.node.is_none_or(|watched| watched == node) {
                (sub.callback)(&event);
            }
        }
    }

    pub(crate) fn link(&mut self, child: NodeId, parent: NodeId) -> Result<(), OperationError> {
        if self.arena.has_edge(child, parent) {
            return Ok(());
        }
        self.arena.add_parent(child, parent)?;
        self.emit(child, ChangeKind::Linked);
        Ok(())
    }

    pub(crate) fn unlink(&mut self, child: NodeId, parent: NodeId) -> Result<(), OperationError> {
        self.arena.remove_parent(child, parent)?;
        self.emit(child, ChangeKind::Unlinked);
        Ok(())
    }

    /// Sever every edge of `id`, then unregister it.
    pub(crate) fn destroy_node(&mut self, id: NodeId) -> Result<(), OperationError> {
        for parent in self.arena.parents(id) {
            self.unlink(id, parent)?;
        }
        for child in self.arena.children(id) {
            self.unlink(child, id)?;
        }
        self.arena.remove(id)?;
        self.emit(id, ChangeKind::Removed);
        Ok(())
    }

    /// Copy of the history without listeners, for undo snapshots.
    pub(crate) fn snapshot(&self) -> History {
        let mut copy = self.clone();
        copy.subscriptions.clear();
        copy
    }

    /// Replace the content by `snapshot`, keeping listeners and never
    /// handing out an identifier twice.
    pub(crate) fn restore(&mut self, snapshot: &History) {
        let watermark = self.arena.next_id();
        let subscriptions = std::mem::take(&mut self.subscriptions);
        let next_subscription = self.next_subscription;
        *self = snapshot.clone();
        self.subscriptions = subscriptions;
        self.next_subscription = next_subscription;
        self.arena.advance_ids(watermark);
        self.emit(self.root, ChangeKind::Reset);
    }

    /// Re-derive every ownership edge from the records. Used after loading,
    /// when records were registered without edges.
    pub(crate) fn rebuild_edges(&mut self) -> Result<(), OperationError> {
        for case in self.case_order.clone() {
            self.link(case, self.root)?;
            let stages = self.case(case)?.stages().to_vec();
            for (index, stage) in stages.iter().enumerate() {
                self.link(*stage, case)?;
                if index > 0 {
                    self.link(*stage, stages[index - 1])?;
                }
            }
        }
        let stages: Vec<(NodeId, StageContent)> = self
            .stages
            .values()
            .map(|stage| (stage.id, stage.content.clone()))
            .collect();
        for (stage, content) in stages {
            match content {
                StageContent::Text { dataset, .. } => self.link(dataset, stage)?,
                StageContent::Graphical { items } => {
                    for item in items {
                        self.link(item, stage)?;
                        let (refs, comment) = {
                            let command = self.command(item)?;
                            (command.refs(), command.comment)
                        };
                        for target in refs {
                            if self.arena.contains(target) {
                                self.link(item, target)?;
                            }
                        }
                        if let Some(comment) = comment {
                            self.link(comment, item)?;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Result type of a referenced item, if it can be known.
    pub(crate) fn result_type_of(&self, id: NodeId) -> Option<String> {
        let command = self.commands.get(&id)?;
        match &command.body {
            CommandBody::Operator { title, storage } => self
                .services
                .catalog
                .result_type(title, storage, super::domain::ConversionLevel::BestEffort)
                .ok()
                .flatten(),
            CommandBody::Variable { value } => self.value_type(value),
        }
    }

    pub(crate) fn value_type(&self, value: &Value) -> Option<String> {
        match value {
            Value::Int(_) => Some("int".into()),
            Value::Float(_) => Some("float".into()),
            Value::Bool(_) => Some("bool".into()),
            Value::Text(_) => Some("str".into()),
            Value::List(_) => Some("list".into()),
            Value::Block(_) => None,
            Value::Ref(target) => self.result_type_of(*target),
        }
    }
}

/// Distinct ids, first occurrence order.
pub(crate) fn distinct(ids: impl IntoIterator<Item = NodeId>) -> Vec<NodeId> {
    let mut seen = BTreeSet::new();
    ids.into_iter().filter(|id| seen.insert(*id)).collect()
}
