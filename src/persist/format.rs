//! JSON study document, current and legacy layouts.
//!
//! A document without `format_version` is legacy: stages carry text only,
//! cases carry no kind (the last one is current) and there is no root,
//! watermark or edge list. A document whose `aster` marker names a solver
//! older than `STRUCTURED_ASTER_MAJOR` is read the same way when it has no
//! root and text-only stages, whatever its `format_version`.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::core::{
    Case, CaseKind, Command, CommandBody, Comment, FileAttr, FileInfo, History, Keywords, NodeArena,
    NodeId, NodeKind, RecoveryError, RunRecord, Services, Stage, StageContent, Value,
};

pub const FORMAT_VERSION: u32 = 1;

/// First solver major version whose studies are written structured.
pub const STRUCTURED_ASTER_MAJOR: u32 = 14;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct StudyDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format_version: Option<u32>,
    #[serde(default)]
    pub aster: String,
    pub history: HistoryDocument,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct HistoryDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_uid: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<NodeId>,
    pub cases: Vec<CaseDocument>,
    pub stages: Vec<StageDocument>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edges: Option<Vec<[NodeId; 2]>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct CaseDocument {
    pub uid: NodeId,
    pub name: String,
    #[serde(default)]
    pub kind: Option<CaseKind>,
    pub stages: Vec<NodeId>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub origin: Option<NodeId>,
    #[serde(default)]
    pub run: Option<RunRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct StageDocument {
    pub uid: NodeId,
    pub name: String,
    #[serde(default)]
    pub commands: Vec<CommandDocument>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub dataset_uid: Option<NodeId>,
    #[serde(default)]
    pub files: Vec<FileDocument>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct CommandDocument {
    pub uid: NodeId,
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub title: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<Keywords>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default = "active_default")]
    pub active: bool,
    #[serde(default)]
    pub comment: Option<CommentDocument>,
}

fn active_default() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct CommentDocument {
    pub uid: NodeId,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct FileDocument {
    pub handle: u32,
    pub filename: PathBuf,
    #[serde(default)]
    pub attr: Option<FileAttr>,
    #[serde(default)]
    pub embedded: bool,
}

impl StudyDocument {
    pub fn is_legacy(&self) -> bool {
        self.format_version.is_none() || (self.predates_structured_stages() && self.is_text_only())
    }

    fn predates_structured_stages(&self) -> bool {
        aster_major(&self.aster).is_some_and(|major| major < STRUCTURED_ASTER_MAJOR)
    }

    fn is_text_only(&self) -> bool {
        self.history.root.is_none()
            && self
                .history
                .stages
                .iter()
                .all(|stage| stage.commands.is_empty() && stage.text.is_some())
    }
}

/// Major number of a version marker such as `13.4` or `12`. Named
/// versions (`stable`, `testing`) have none.
fn aster_major(version: &str) -> Option<u32> {
    version.trim().split('.').next()?.parse().ok()
}

pub(crate) fn encode(history: &History) -> StudyDocument {
    let cases = history
        .cases()
        .map(|case| CaseDocument {
            uid: case.id(),
            name: case.name().to_string(),
            kind: Some(case.kind()),
            stages: case.stages().to_vec(),
            created_at: Some(case.created_at()),
            description: case.description().to_string(),
            origin: case.origin(),
            run: case.run().cloned(),
        })
        .collect();
    let stages = history
        .stages
        .values()
        .map(|stage| encode_stage(history, stage))
        .collect();
    let edges = history
        .nodes()
        .edges()
        .into_iter()
        .map(|(child, parent)| [child, parent])
        .collect();
    StudyDocument {
        format_version: Some(FORMAT_VERSION),
        aster: history.aster_version().to_string(),
        history: HistoryDocument {
            next_uid: Some(history.nodes().next_id()),
            root: Some(history.root()),
            current: Some(history.current_case()),
            cases,
            stages,
            edges: Some(edges),
        },
    }
}

fn encode_stage(history: &History, stage: &Stage) -> StageDocument {
    let (commands, text, dataset_uid) = match stage.content() {
        StageContent::Text { dataset, text } => (Vec::new(), Some(text.clone()), Some(*dataset)),
        StageContent::Graphical { items } => {
            let commands = items
                .iter()
                .filter_map(|item| history.commands.get(item))
                .map(|command| encode_command(history, command))
                .collect();
            (commands, None, None)
        }
    };
    StageDocument {
        uid: stage.id(),
        name: stage.name().to_string(),
        commands,
        text,
        dataset_uid,
        files: stage
            .files()
            .iter()
            .map(|(handle, info)| FileDocument {
                handle: *handle,
                filename: info.filename.clone(),
                attr: info.attr,
                embedded: info.embedded,
            })
            .collect(),
    }
}

fn encode_command(history: &History, command: &Command) -> CommandDocument {
    let (title, storage, value) = match command.body() {
        CommandBody::Operator { title, storage } => (title.clone(), Some(storage.clone()), None),
        CommandBody::Variable { value } => (String::new(), None, Some(value.clone())),
    };
    CommandDocument {
        uid: command.id(),
        kind: command.kind(),
        title,
        name: command.name().to_string(),
        storage,
        value,
        active: command.is_active(),
        comment: command
            .comment()
            .and_then(|id| history.comments.get(&id))
            .map(|comment| CommentDocument {
                uid: comment.id(),
                content: comment.content().to_string(),
            }),
    }
}

/// Build a history from a document. Nothing is returned unless the whole
/// document is consistent.
pub(crate) fn decode(document: &StudyDocument, services: Services) -> Result<History, RecoveryError> {
    if document.is_legacy() {
        tracing::debug!(
            aster = %document.aster,
            format_version = ?document.format_version,
            "reading legacy layout"
        );
        return decode_legacy(document, services);
    }
    if let Some(version) = document.format_version
        && version != FORMAT_VERSION
    {
        return Err(RecoveryError::new(format!("unsupported format version {version}")));
    }
    let doc = &document.history;
    let root = doc.root.ok_or_else(|| RecoveryError::new("missing history root"))?;
    let current = doc
        .current
        .ok_or_else(|| RecoveryError::new("missing current case"))?;

    let mut arena = NodeArena::new();
    register(&mut arena, root, NodeKind::History)?;
    for case in &doc.cases {
        register(&mut arena, case.uid, NodeKind::Case)?;
    }
    for stage in &doc.stages {
        register(&mut arena, stage.uid, NodeKind::Stage)?;
        if let Some(dataset) = stage.dataset_uid {
            register(&mut arena, dataset, NodeKind::TextDataSet)?;
        }
        for command in &stage.commands {
            if !matches!(command.kind, NodeKind::Command | NodeKind::Variable) {
                return Err(RecoveryError::new(format!(
                    "item {} of stage {} is a {}",
                    command.uid, stage.uid, command.kind
                )));
            }
            register(&mut arena, command.uid, command.kind)?;
            if let Some(comment) = &command.comment {
                register(&mut arena, comment.uid, NodeKind::Comment)?;
            }
        }
    }

    let mut history = History::bare(services, arena, root, current);
    history.aster_version = document.aster.clone();
    let currents: Vec<NodeId> = doc
        .cases
        .iter()
        .filter(|case| case.kind == Some(CaseKind::Current))
        .map(|case| case.uid)
        .collect();
    if currents != [current] {
        return Err(RecoveryError::new(format!(
            "expected {current} as the only current case, found {currents:?}"
        )));
    }
    for case in &doc.cases {
        let kind = case
            .kind
            .ok_or_else(|| RecoveryError::new(format!("case {} has no kind", case.uid)))?;
        insert_case(&mut history, case, kind)?;
    }
    for stage in &doc.stages {
        let content = match (&stage.text, stage.dataset_uid) {
            (Some(text), Some(dataset)) if stage.commands.is_empty() => StageContent::Text {
                dataset,
                text: text.clone(),
            },
            (None, None) => StageContent::Graphical {
                items: stage.commands.iter().map(|c| c.uid).collect(),
            },
            _ => {
                return Err(RecoveryError::new(format!(
                    "stage {} mixes text and commands",
                    stage.uid
                )));
            }
        };
        insert_stage(&mut history, stage, content);
        for command in &stage.commands {
            insert_command(&mut history, stage.uid, command)?;
        }
    }
    check_stage_usage(&history, doc)?;
    check_references(&history)?;
    history
        .rebuild_edges()
        .map_err(|err| RecoveryError::new(err.to_string()))?;

    if let Some(stored) = &doc.edges {
        let stored: BTreeSet<(NodeId, NodeId)> = stored.iter().map(|[c, p]| (*c, *p)).collect();
        let derived: BTreeSet<(NodeId, NodeId)> = history.nodes().edges().into_iter().collect();
        if stored != derived {
            let missing = derived.difference(&stored).count();
            let extra = stored.difference(&derived).count();
            return Err(RecoveryError::new(format!(
                "stored edges disagree with the structure ({missing} missing, {extra} unexpected)"
            )));
        }
    }
    history.arena.advance_ids(doc.next_uid.unwrap_or(0));
    Ok(history)
}

/// Legacy stages are loaded as text and converted where possible.
fn decode_legacy(document: &StudyDocument, services: Services) -> Result<History, RecoveryError> {
    let doc = &document.history;
    let last = doc
        .cases
        .last()
        .ok_or_else(|| RecoveryError::new("legacy study has no case"))?;
    let current = last.uid;

    let mut arena = NodeArena::new();
    for case in &doc.cases {
        register(&mut arena, case.uid, NodeKind::Case)?;
    }
    for stage in &doc.stages {
        register(&mut arena, stage.uid, NodeKind::Stage)?;
    }
    let root = arena.create(NodeKind::History);
    let datasets: BTreeMap<NodeId, NodeId> = doc
        .stages
        .iter()
        .map(|stage| (stage.uid, arena.create(NodeKind::TextDataSet)))
        .collect();

    let mut history = History::bare(services, arena, root, current);
    history.aster_version = document.aster.clone();
    for case in &doc.cases {
        let kind = if case.uid == current {
            CaseKind::Current
        } else {
            CaseKind::Run
        };
        insert_case(&mut history, case, kind)?;
    }
    for stage in &doc.stages {
        if !stage.commands.is_empty() {
            return Err(RecoveryError::new(format!(
                "legacy stage {} carries structured commands",
                stage.uid
            )));
        }
        let text = stage
            .text
            .clone()
            .ok_or_else(|| RecoveryError::new(format!("legacy stage {} has no text", stage.uid)))?;
        let dataset = datasets
            .get(&stage.uid)
            .copied()
            .ok_or_else(|| RecoveryError::new(format!("no dataset for stage {}", stage.uid)))?;
        insert_stage(&mut history, stage, StageContent::Text { dataset, text });
    }
    check_stage_usage(&history, doc)?;
    history
        .rebuild_edges()
        .map_err(|err| RecoveryError::new(err.to_string()))?;

    let mut converted = 0;
    let order: Vec<NodeId> = history
        .case_order
        .iter()
        .filter_map(|case| history.cases.get(case))
        .flat_map(|case| case.stages().iter().copied())
        .collect();
    let mut seen = BTreeSet::new();
    for stage in order {
        if !seen.insert(stage) {
            continue;
        }
        match history.convert_to_graphical(stage) {
            Ok(()) => converted += 1,
            Err(err) => {
                tracing::warn!(stage = %stage, error = %err, "legacy stage kept in text mode");
            }
        }
    }
    tracing::info!(
        stages = doc.stages.len(),
        converted,
        aster = %document.aster,
        "legacy study converted"
    );
    Ok(history)
}

fn register(arena: &mut NodeArena, id: NodeId, kind: NodeKind) -> Result<(), RecoveryError> {
    arena
        .create_with_id(id, kind)
        .map_err(|err| RecoveryError::new(err.to_string()))
}

fn insert_case(history: &mut History, doc: &CaseDocument, kind: CaseKind) -> Result<(), RecoveryError> {
    let distinct: BTreeSet<NodeId> = doc.stages.iter().copied().collect();
    if distinct.len() != doc.stages.len() {
        return Err(RecoveryError::new(format!(
            "case {} lists a stage twice",
            doc.uid
        )));
    }
    let mut case = Case::new(doc.uid, &doc.name, kind);
    case.stages = doc.stages.clone();
    if let Some(created_at) = doc.created_at {
        case.created_at = created_at;
    }
    case.description = doc.description.clone();
    case.origin = doc.origin;
    case.run = doc.run.clone();
    history.cases.insert(doc.uid, case);
    history.case_order.push(doc.uid);
    Ok(())
}

fn insert_stage(history: &mut History, doc: &StageDocument, content: StageContent) {
    let mut stage = Stage::new(doc.uid, &doc.name);
    stage.content = content;
    stage.files = doc
        .files
        .iter()
        .map(|file| {
            (
                file.handle,
                FileInfo {
                    filename: file.filename.clone(),
                    attr: file.attr,
                    embedded: file.embedded,
                },
            )
        })
        .collect();
    history.stages.insert(doc.uid, stage);
}

fn insert_command(history: &mut History, stage: NodeId, doc: &CommandDocument) -> Result<(), RecoveryError> {
    let body = match doc.kind {
        NodeKind::Variable => CommandBody::Variable {
            value: doc.value.clone().ok_or_else(|| {
                RecoveryError::new(format!("variable {} has no value", doc.uid))
            })?,
        },
        _ => {
            if doc.title.is_empty() {
                return Err(RecoveryError::new(format!("command {} has no title", doc.uid)));
            }
            CommandBody::Operator {
                title: doc.title.clone(),
                storage: doc.storage.clone().unwrap_or_default(),
            }
        }
    };
    let mut command = Command {
        id: doc.uid,
        stage,
        name: doc.name.clone(),
        body,
        active: doc.active,
        comment: None,
    };
    if let Some(comment) = &doc.comment {
        history
            .comments
            .insert(comment.uid, Comment::new(comment.uid, doc.uid, &comment.content));
        command.comment = Some(comment.uid);
    }
    history.commands.insert(doc.uid, command);
    Ok(())
}

/// Every case stage exists and every stage belongs to some case.
fn check_stage_usage(history: &History, doc: &HistoryDocument) -> Result<(), RecoveryError> {
    let mut used = BTreeSet::new();
    for case in &doc.cases {
        for stage in &case.stages {
            if !history.stages.contains_key(stage) {
                return Err(RecoveryError::new(format!(
                    "case {} lists unknown stage {stage}",
                    case.uid
                )));
            }
            used.insert(*stage);
        }
    }
    if let Some(orphan) = history.stages.keys().find(|id| !used.contains(id)) {
        return Err(RecoveryError::new(format!("stage {orphan} belongs to no case")));
    }
    Ok(())
}

/// References point at commands, or at nothing (a broken dependency).
fn check_references(history: &History) -> Result<(), RecoveryError> {
    for command in history.commands.values() {
        for target in command.refs() {
            if let Some(kind) = history.nodes().kind(target)
                && !matches!(kind, NodeKind::Command | NodeKind::Variable)
            {
                return Err(RecoveryError::new(format!(
                    "command {} references {target}, a {kind}",
                    command.id()
                )));
            }
        }
    }
    Ok(())
}
