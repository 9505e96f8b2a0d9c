//! Cases: copy-on-write forking, run cases and execution handoff.

use std::collections::BTreeMap;

use time::OffsetDateTime;

use super::{ChangeKind, History, Problem, distinct};
use crate::core::case::{Case, RunRecord};
use crate::core::command::{CommandBody, Comment};
use crate::core::domain::{CaseKind, CopyOnWrite, NodeKind, RunState, Validity};
use crate::core::error::{CoreError, OperationError};
use crate::core::identity::NodeId;
use crate::core::matrix::MatrixSlice;
use crate::core::stage::{Stage, StageContent};
use crate::core::value::remap_keywords;
use crate::engine::{Engine, RunOutcome, RunRequest, StageScript, Submission};

impl History {
    pub fn rename_case(&mut self, case: NodeId, name: &str) -> Result<(), OperationError> {
        self.case_mut(case)?.name = name.to_string();
        self.emit(case, ChangeKind::Modified);
        Ok(())
    }

    pub fn set_case_description(&mut self, case: NodeId, text: &str) -> Result<(), OperationError> {
        self.case_mut(case)?.description = text.to_string();
        self.emit(case, ChangeKind::Modified);
        Ok(())
    }

    /// Stage at `index` of the current case, ready to be edited.
    ///
    /// A stage shared with another case is either refused or forked: the
    /// stage and every later stage still shared are cloned into the current
    /// case, and later stages it owns alone are re-pointed to the clones.
    pub fn writable_stage(
        &mut self,
        case: NodeId,
        index: usize,
        policy: CopyOnWrite,
    ) -> Result<NodeId, OperationError> {
        self.ensure_current(case)?;
        let stage = self.stage_at(case, index)?;
        if !self.is_shared(stage) {
            return Ok(stage);
        }
        match policy {
            CopyOnWrite::Refuse => Err(OperationError::SharedStage { stage }),
            CopyOnWrite::Fork => {
                let stages = self.fork_suffix(case, index)?;
                Ok(stages[index])
            }
        }
    }

    /// Fork every stage of the current case that `other` also uses.
    pub fn copy_shared_stages_from(&mut self, case: NodeId, other: NodeId) -> Result<(), OperationError> {
        self.ensure_current(case)?;
        let theirs = self.case(other)?.stages().to_vec();
        let first_shared = self
            .case(case)?
            .stages()
            .iter()
            .position(|stage| theirs.contains(stage));
        if let Some(index) = first_shared {
            self.fork_suffix(case, index)?;
        }
        Ok(())
    }

    /// New run case sharing the stages at `reusable` with the current case
    /// and holding fresh copies of the others. `reusable` must be a prefix
    /// `0..k` of the current stages.
    pub fn create_run_case(
        &mut self,
        reusable: &[usize],
        name: Option<&str>,
    ) -> Result<NodeId, OperationError> {
        let stages = self.case(self.current)?.stages().to_vec();
        let mut sorted = reusable.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        if let Some(&index) = sorted.iter().find(|&&index| index >= stages.len()) {
            return Err(OperationError::OutOfRange {
                what: "stage",
                index,
                len: stages.len(),
            });
        }
        if sorted.iter().enumerate().any(|(pos, &index)| pos != index) {
            return Err(OperationError::NonPrefixReuse {
                indices: reusable.to_vec(),
            });
        }
        let keep = sorted.len();
        let name = match name {
            Some(name) => name.to_string(),
            None => self.next_run_name(),
        };

        let id = self.arena.create(NodeKind::Case);
        self.emit(id, ChangeKind::Created);
        let mut case = Case::new(id, &name, CaseKind::Run);
        case.origin = Some(self.current);
        self.cases.insert(id, case);
        self.case_order.push(id);
        self.link(id, self.root)?;

        let mut map = BTreeMap::new();
        let mut list = stages[..keep].to_vec();
        for stage in &stages[keep..] {
            list.push(self.clone_stage(*stage, &mut map)?);
        }
        self.relink_case(id, list)?;
        tracing::info!(
            case = %id,
            name = %name,
            reused = keep,
            copied = stages.len() - keep,
            "run case created"
        );
        Ok(id)
    }

    pub fn remove_run_case(&mut self, case: NodeId) -> Result<(), OperationError> {
        self.ensure_run(case)?;
        self.relink_case(case, Vec::new())?;
        self.destroy_node(case)?;
        self.cases.remove(&case);
        self.case_order.retain(|id| *id != case);
        tracing::info!(case = %case, "run case removed");
        Ok(())
    }

    /// Make the current case share every stage of a run case, dropping its
    /// own stages. Further edits fork from there.
    pub fn checkout_run_case(&mut self, case: NodeId) -> Result<(), OperationError> {
        self.ensure_run(case)?;
        let stages = self.case(case)?.stages().to_vec();
        self.relink_case(self.current, stages)?;
        tracing::info!(case = %case, "run case checked out");
        Ok(())
    }

    /// Command texts of a case, in stage order.
    pub fn run_request(&self, case: NodeId) -> Result<RunRequest, CoreError> {
        let record = self.case(case)?;
        let mut stages = Vec::with_capacity(record.stages().len());
        for stage in record.stages() {
            stages.push(StageScript {
                name: self.stage(*stage)?.name().to_string(),
                text: self.stage_text(*stage, false)?,
            });
        }
        Ok(RunRequest {
            case,
            case_name: record.name().to_string(),
            stages,
        })
    }

    /// Hand a run case to an engine. The stage structure is not touched;
    /// only the run record changes.
    pub fn run_case(&mut self, case: NodeId, engine: &mut dyn Engine) -> Result<Submission, CoreError> {
        self.ensure_run(case)?;
        let request = self.run_request(case)?;
        self.case_mut(case)?.run = Some(RunRecord {
            state: RunState::RUNNING,
            ..RunRecord::pending()
        });
        self.emit(case, ChangeKind::Modified);
        tracing::info!(case = %case, stages = request.stages.len(), "run submitted");
        let submission = engine.submit(request);
        if let Submission::Finished(outcome) = &submission {
            self.notify_run_finished(case, outcome.clone())?;
        }
        Ok(submission)
    }

    pub fn notify_run_finished(&mut self, case: NodeId, outcome: RunOutcome) -> Result<(), OperationError> {
        self.ensure_run(case)?;
        let state = outcome.state;
        self.case_mut(case)?.run = Some(RunRecord {
            state: outcome.state,
            messages: outcome.messages,
            log: outcome.log,
            finished_at: Some(OffsetDateTime::now_utc()),
        });
        self.emit(case, ChangeKind::Modified);
        tracing::info!(case = %case, state = %state, "run finished");
        Ok(())
    }

    pub fn check_case(&self, case: NodeId) -> Result<Validity, OperationError> {
        let mut flags = Validity::NOTHING;
        for stage in self.case(case)?.stages() {
            flags |= self.check_stage(*stage)?;
        }
        Ok(flags)
    }

    pub fn problems(&self, case: NodeId) -> Result<Vec<Problem>, OperationError> {
        let mut problems = Vec::new();
        for stage in self.case(case)?.stages() {
            problems.extend(self.stage_problems(*stage)?);
        }
        Ok(problems)
    }

    /// Dependency matrix restricted to the nodes of one case.
    pub fn case_matrix(&self, case: NodeId) -> Result<MatrixSlice, OperationError> {
        let record = self.case(case)?;
        let mut ids = vec![case];
        for stage in record.stages() {
            ids.push(*stage);
            ids.extend_from_slice(self.stage(*stage)?.items());
        }
        Ok(self.arena.slice(&ids))
    }

    pub(crate) fn case_mut(&mut self, case: NodeId) -> Result<&mut Case, OperationError> {
        self.arena.expect_kind(case, NodeKind::Case)?;
        self.cases
            .get_mut(&case)
            .ok_or(OperationError::UnknownNode { id: case })
    }

    pub(crate) fn ensure_current(&self, case: NodeId) -> Result<(), OperationError> {
        self.case(case)?;
        if case == self.current {
            Ok(())
        } else {
            Err(OperationError::FrozenCase { case })
        }
    }

    fn ensure_run(&self, case: NodeId) -> Result<(), OperationError> {
        match self.case(case)?.kind() {
            CaseKind::Run => Ok(()),
            CaseKind::Current => Err(OperationError::NotRunCase { case }),
        }
    }

    fn next_run_name(&self) -> String {
        let mut n = self.run_cases().count() + 1;
        loop {
            let name = format!("RunCase_{n}");
            if self.case_by_name(&name).is_none() {
                return name;
            }
            n += 1;
        }
    }

    /// Replace the stage list of a case and bring every edge in line: case
    /// and chain edges are added for the new list, edges no case needs any
    /// more are removed, and stages no case lists are destroyed.
    pub(crate) fn relink_case(&mut self, case: NodeId, stages: Vec<NodeId>) -> Result<(), OperationError> {
        let old = std::mem::replace(&mut self.case_mut(case)?.stages, stages.clone());
        for (index, stage) in stages.iter().enumerate() {
            self.link(*stage, case)?;
            if index > 0 {
                self.link(*stage, stages[index - 1])?;
            }
        }
        for pair in old.windows(2) {
            let (prev, next) = (pair[0], pair[1]);
            if !self.chain_in_use(prev, next) && self.arena.has_edge(next, prev) {
                self.unlink(next, prev)?;
            }
        }
        for stage in old.iter().rev() {
            if stages.contains(stage) {
                continue;
            }
            if self.arena.has_edge(*stage, case) {
                self.unlink(*stage, case)?;
            }
            if self.cases_using(*stage).is_empty() {
                self.destroy_stage(*stage)?;
            }
        }
        self.emit(case, ChangeKind::Modified);
        Ok(())
    }

    fn chain_in_use(&self, prev: NodeId, next: NodeId) -> bool {
        self.cases.values().any(|case| {
            case.stages()
                .windows(2)
                .any(|pair| pair[0] == prev && pair[1] == next)
        })
    }

    /// Fork stage `from` of `case` and the shared stages after it.
    fn fork_suffix(&mut self, case: NodeId, from: usize) -> Result<Vec<NodeId>, OperationError> {
        let stages = self.case(case)?.stages().to_vec();
        let mut map = BTreeMap::new();
        let mut list = stages[..from].to_vec();
        let mut forked = 0;
        for (index, stage) in stages.iter().enumerate().skip(from) {
            if index == from || self.is_shared(*stage) {
                list.push(self.clone_stage(*stage, &mut map)?);
                forked += 1;
            } else {
                self.remap_stage(*stage, &map)?;
                list.push(*stage);
            }
        }
        self.relink_case(case, list.clone())?;
        tracing::info!(case = %case, from, forked, "shared stages forked");
        Ok(list)
    }

    /// Deep copy of a stage under fresh identifiers. References to commands
    /// already copied (found in `map`) point to the copies; `map` is
    /// extended with the stage and its items.
    fn clone_stage(
        &mut self,
        source: NodeId,
        map: &mut BTreeMap<NodeId, NodeId>,
    ) -> Result<NodeId, OperationError> {
        let original = self.stage(source)?.clone();
        let id = self.arena.create(NodeKind::Stage);
        self.emit(id, ChangeKind::Created);
        let mut stage = Stage::new(id, &original.name);
        stage.files = original.files.clone();
        self.stages.insert(id, stage);
        map.insert(source, id);
        match original.content {
            StageContent::Text { text, .. } => {
                let dataset = self.arena.create(NodeKind::TextDataSet);
                self.emit(dataset, ChangeKind::Created);
                self.link(dataset, id)?;
                self.stage_mut(id)?.content = StageContent::Text { dataset, text };
            }
            StageContent::Graphical { items } => {
                for item in items {
                    let copy = self.clone_command(item, id, map)?;
                    self.stage_items_mut(id)?.push(copy);
                }
            }
        }
        Ok(id)
    }

    fn clone_command(
        &mut self,
        source: NodeId,
        stage: NodeId,
        map: &mut BTreeMap<NodeId, NodeId>,
    ) -> Result<NodeId, OperationError> {
        let original = self.command(source)?.clone();
        let id = self.arena.create(original.kind());
        self.emit(id, ChangeKind::Created);
        map.insert(source, id);
        let mut copy = original.clone();
        copy.id = id;
        copy.stage = stage;
        copy.comment = None;
        match copy.body_mut() {
            CommandBody::Operator { storage, .. } => {
                remap_keywords(storage, map);
            }
            CommandBody::Variable { value } => {
                value.remap_refs(map);
            }
        }
        self.link(id, stage)?;
        for target in distinct(copy.refs()) {
            if self.arena.contains(target) {
                self.link(id, target)?;
            }
        }
        if let Some(comment) = original.comment.and_then(|c| self.comments.get(&c)) {
            let content = comment.content.clone();
            let new_comment = self.arena.create(NodeKind::Comment);
            self.emit(new_comment, ChangeKind::Created);
            self.link(new_comment, id)?;
            self.comments
                .insert(new_comment, Comment::new(new_comment, id, &content));
            copy.comment = Some(new_comment);
        }
        self.commands.insert(id, copy);
        Ok(id)
    }

    /// Point the references of an unshared stage at forked copies.
    fn remap_stage(&mut self, stage: NodeId, map: &BTreeMap<NodeId, NodeId>) -> Result<(), OperationError> {
        let items = self.stage(stage)?.items().to_vec();
        for item in items {
            let Some(command) = self.commands.get_mut(&item) else {
                continue;
            };
            let old = command.refs();
            let changed = match command.body_mut() {
                CommandBody::Operator { storage, .. } => remap_keywords(storage, map),
                CommandBody::Variable { value } => value.remap_refs(map),
            };
            if changed {
                let new = distinct(self.commands.get(&item).map(|c| c.refs()).unwrap_or_default());
                self.sync_ref_edges(item, &old, &new)?;
                self.emit(item, ChangeKind::Modified);
            }
        }
        Ok(())
    }
}
