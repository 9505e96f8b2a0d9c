//! Execution engine handoff.
//!
//! The history hands a `RunRequest` to an `Engine` and forgets about it. The
//! engine either completes immediately or reports back later through
//! `History::notify_run_finished`.

mod export;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::core::{NodeId, RunMessage, RunState};

pub use export::{ExportEngine, export_request};

/// Source text of one stage of the case being run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageScript {
    pub name: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRequest {
    pub case: NodeId,
    pub case_name: String,
    pub stages: Vec<StageScript>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub state: RunState,
    #[serde(default)]
    pub messages: Vec<RunMessage>,
    #[serde(default)]
    pub log: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    /// Accepted; completion will be notified later.
    Pending,
    Finished(RunOutcome),
}

pub trait Engine {
    /// Failures are reported as a finished outcome carrying `RunState::ERROR`.
    fn submit(&mut self, request: RunRequest) -> Submission;
}
