//! Serializable views of the study, built by handlers and printed either as
//! JSON or through `render`.

use std::path::PathBuf;

use serde::Serialize;
use time::format_description::well_known::Rfc3339;

use crate::Result;
use crate::core::{
    CaseKind, ConversionLevel, FileAttr, History, NodeId, NodeKind, Problem, RunMessage, StageMode,
    Validity,
};
use crate::persist::RecoveryReport;

#[derive(Debug, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub(super) enum Output {
    Initialized {
        path: PathBuf,
        aster_version: String,
    },
    Status(StatusView),
    Check(CheckView),
    Cases {
        cases: Vec<CaseView>,
    },
    Stage(StageView),
    Text {
        stage: NodeId,
        text: String,
    },
    Depends {
        a: NodeId,
        b: NodeId,
        depends: bool,
    },
    Created {
        kind: NodeKind,
        id: NodeId,
        name: String,
    },
    Updated {
        id: NodeId,
        message: String,
    },
    Removed {
        id: NodeId,
    },
    ResultType {
        command: NodeId,
        result_type: Option<String>,
    },
    Run(RunView),
    Recovered(RecoveryReport),
}

#[derive(Debug, Serialize)]
pub(super) struct StatusView {
    pub path: PathBuf,
    pub aster_version: String,
    pub current: CaseView,
    pub run_cases: usize,
    pub nodes: usize,
    pub validity: Vec<&'static str>,
}

#[derive(Debug, Serialize)]
pub(super) struct CaseView {
    pub id: NodeId,
    pub name: String,
    pub kind: CaseKind,
    pub created_at: String,
    pub origin: Option<NodeId>,
    pub run_state: Option<String>,
    pub stages: Vec<StageSummary>,
}

#[derive(Debug, Serialize)]
pub(super) struct StageSummary {
    pub id: NodeId,
    pub index: usize,
    pub name: String,
    pub mode: StageMode,
    pub shared: bool,
    pub items: usize,
    pub validity: Vec<&'static str>,
}

#[derive(Debug, Serialize)]
pub(super) struct StageView {
    pub stage: StageSummary,
    pub commands: Vec<CommandView>,
    pub handles: Vec<HandleView>,
}

#[derive(Debug, Serialize)]
pub(super) struct CommandView {
    pub id: NodeId,
    pub kind: NodeKind,
    pub name: String,
    pub title: String,
    pub active: bool,
    pub result_type: Option<String>,
    pub validity: Vec<&'static str>,
    pub comment: Option<String>,
}

#[derive(Debug, Serialize)]
pub(super) struct HandleView {
    pub handle: u32,
    pub filename: Option<PathBuf>,
    pub attrs: Vec<FileAttr>,
    pub merged: Option<FileAttr>,
    pub exists: bool,
    pub embedded: bool,
}

#[derive(Debug, Serialize)]
pub(super) struct CheckView {
    pub case: NodeId,
    pub name: String,
    pub validity: Vec<&'static str>,
    pub problems: Vec<Problem>,
}

#[derive(Debug, Serialize)]
pub(super) struct RunView {
    pub case: NodeId,
    pub name: String,
    pub state: String,
    pub finished: bool,
    pub messages: Vec<RunMessage>,
}

fn labels(flags: Validity) -> Vec<&'static str> {
    flags.labels().collect()
}

pub(super) fn case_view(history: &History, case: NodeId) -> Result<CaseView> {
    let record = history.case(case)?;
    let mut stages = Vec::with_capacity(record.stages().len());
    for (index, stage) in record.stages().iter().enumerate() {
        stages.push(stage_summary(history, *stage, index)?);
    }
    Ok(CaseView {
        id: record.id(),
        name: record.name().to_string(),
        kind: record.kind(),
        created_at: record
            .created_at()
            .format(&Rfc3339)
            .unwrap_or_else(|_| record.created_at().to_string()),
        origin: record.origin(),
        run_state: record.run().map(|run| run.state.to_string()),
        stages,
    })
}

pub(super) fn stage_summary(history: &History, stage: NodeId, index: usize) -> Result<StageSummary> {
    let record = history.stage(stage)?;
    Ok(StageSummary {
        id: stage,
        index,
        name: record.name().to_string(),
        mode: record.mode(),
        shared: history.is_shared(stage),
        items: record.items().len(),
        validity: labels(history.check_stage(stage)?),
    })
}

pub(super) fn stage_view(history: &History, stage: NodeId, index: usize) -> Result<StageView> {
    let summary = stage_summary(history, stage, index)?;
    let mut commands = Vec::new();
    for id in history.stage(stage)?.items() {
        commands.push(command_view(history, *id)?);
    }
    let handles = history
        .handle2info(stage)?
        .into_iter()
        .map(|(handle, info)| HandleView {
            handle,
            merged: info.merged_attr(),
            filename: info.filename,
            attrs: info.attrs,
            exists: info.exists,
            embedded: info.embedded,
        })
        .collect();
    Ok(StageView {
        stage: summary,
        commands,
        handles,
    })
}

pub(super) fn command_view(history: &History, id: NodeId) -> Result<CommandView> {
    let command = history.command(id)?;
    let comment = match command.comment() {
        Some(comment) => Some(history.comment(comment)?.content().to_string()),
        None => None,
    };
    Ok(CommandView {
        id,
        kind: command.kind(),
        name: command.name().to_string(),
        title: command.title().to_string(),
        active: command.is_active(),
        // Under-specified commands simply show no type here.
        result_type: history
            .gettype(id, ConversionLevel::BestEffort)
            .ok()
            .flatten(),
        validity: labels(history.check_command(id, true)?),
        comment,
    })
}

pub(super) fn check_view(history: &History, case: NodeId) -> Result<CheckView> {
    Ok(CheckView {
        case,
        name: history.case(case)?.name().to_string(),
        validity: labels(history.check_case(case)?),
        problems: history.problems(case)?,
    })
}

pub(super) fn run_view(history: &History, case: NodeId) -> Result<RunView> {
    let record = history.case(case)?;
    let state = record.run_state();
    Ok(RunView {
        case,
        name: record.name().to_string(),
        state: state.to_string(),
        finished: state.is_finished(),
        messages: record
            .run()
            .map(|run| run.messages.clone())
            .unwrap_or_default(),
    })
}

pub(super) fn status_view(history: &History, path: PathBuf) -> Result<StatusView> {
    let current = history.current_case();
    Ok(StatusView {
        path,
        aster_version: history.aster_version().to_string(),
        current: case_view(history, current)?,
        run_cases: history.run_cases().count(),
        nodes: history.nodes().len(),
        validity: labels(history.check_case(current)?),
    })
}
