//! Layer 7: Cases
//!
//! A case is an ordered list of stages. The current case is editable; run
//! cases are frozen snapshots that share stages with it by identity.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::domain::{CaseKind, RunState};
use super::identity::NodeId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMessage {
    pub severity: Severity,
    #[serde(default)]
    pub stage: Option<String>,
    pub text: String,
}

/// Execution metadata attached to a run case.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    pub state: RunState,
    #[serde(default)]
    pub messages: Vec<RunMessage>,
    #[serde(default)]
    pub log: Option<PathBuf>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub finished_at: Option<OffsetDateTime>,
}

impl RunRecord {
    pub fn pending() -> Self {
        Self {
            state: RunState::WAITING,
            messages: Vec::new(),
            log: None,
            finished_at: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Case {
    pub(crate) id: NodeId,
    pub(crate) name: String,
    pub(crate) kind: CaseKind,
    pub(crate) stages: Vec<NodeId>,
    pub(crate) created_at: OffsetDateTime,
    pub(crate) description: String,
    pub(crate) origin: Option<NodeId>,
    pub(crate) run: Option<RunRecord>,
}

impl Case {
    pub(crate) fn new(id: NodeId, name: &str, kind: CaseKind) -> Self {
        Self {
            id,
            name: name.to_string(),
            kind,
            stages: Vec::new(),
            created_at: OffsetDateTime::now_utc(),
            description: String::new(),
            origin: None,
            run: None,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> CaseKind {
        self.kind
    }

    pub fn is_current(&self) -> bool {
        self.kind == CaseKind::Current
    }

    pub fn stages(&self) -> &[NodeId] {
        &self.stages
    }

    pub fn stage_index(&self, stage: NodeId) -> Option<usize> {
        self.stages.iter().position(|id| *id == stage)
    }

    pub fn created_at(&self) -> OffsetDateTime {
        self.created_at
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Case this run case was created from.
    pub fn origin(&self) -> Option<NodeId> {
        self.origin
    }

    pub fn run(&self) -> Option<&RunRecord> {
        self.run.as_ref()
    }

    pub fn run_state(&self) -> RunState {
        self.run.as_ref().map(|run| run.state).unwrap_or_default()
    }
}
