//! Stage items: creation, storage, validity and typing.

use std::collections::{BTreeMap, BTreeSet};

use super::{ChangeKind, History, Problem, distinct};
use crate::core::command::{Command, CommandBody, Comment, UNNAMED, is_valid_name};
use crate::core::domain::{ConversionLevel, NodeKind, Validity};
use crate::core::error::{CoreError, OperationError};
use crate::core::identity::NodeId;
use crate::core::value::{Keywords, Value, keyword_refs};

impl History {
    /// Append a command to a graphical stage of the current case.
    pub fn add_command(
        &mut self,
        stage: NodeId,
        title: &str,
        name: Option<&str>,
    ) -> Result<NodeId, OperationError> {
        self.ensure_editable(stage)?;
        if let Some(name) = name {
            check_name(name)?;
        }
        let id = self.arena.create(NodeKind::Command);
        self.emit(id, ChangeKind::Created);
        self.link(id, stage)?;
        self.commands.insert(
            id,
            Command::operator(id, stage, title, name.unwrap_or(UNNAMED)),
        );
        self.stage_items_mut(stage)?.push(id);
        self.emit(stage, ChangeKind::Modified);
        tracing::debug!(stage = %stage, command = %id, title, "command added");
        Ok(id)
    }

    /// Append `name = value` to a graphical stage of the current case.
    pub fn add_variable(
        &mut self,
        stage: NodeId,
        name: &str,
        value: Value,
    ) -> Result<NodeId, OperationError> {
        self.ensure_editable(stage)?;
        check_name(name)?;
        let refs = distinct(value.refs());
        self.check_refs(stage, None, &refs, &[])?;
        let id = self.arena.create(NodeKind::Variable);
        self.emit(id, ChangeKind::Created);
        self.link(id, stage)?;
        for target in &refs {
            self.link(id, *target)?;
        }
        self.commands
            .insert(id, Command::variable(id, stage, name, value));
        self.stage_items_mut(stage)?.push(id);
        self.emit(stage, ChangeKind::Modified);
        Ok(id)
    }

    /// Replace the keyword storage of a command wholesale.
    ///
    /// Every command referenced by the new storage becomes a parent of the
    /// command. References must point to commands of the same stage or of an
    /// earlier stage of the current case and must not close a cycle. The
    /// stage is then reordered so that dependencies come first.
    pub fn init_command(&mut self, id: NodeId, storage: Keywords) -> Result<(), OperationError> {
        let (stage, old_refs) = {
            let command = self.command(id)?;
            if command.is_variable() {
                return Err(OperationError::WrongKind {
                    id,
                    expected: NodeKind::Command,
                    actual: NodeKind::Variable,
                });
            }
            (command.stage, command.refs())
        };
        self.ensure_editable(stage)?;
        let new_refs = distinct(keyword_refs(&storage));
        self.check_refs(stage, Some(id), &new_refs, &old_refs)?;
        if let Some(CommandBody::Operator { storage: slot, .. }) =
            self.commands.get_mut(&id).map(Command::body_mut)
        {
            *slot = storage;
        }
        self.sync_ref_edges(id, &old_refs, &new_refs)?;
        self.reorder_stage(stage)?;
        self.emit(id, ChangeKind::Modified);
        Ok(())
    }

    /// Replace the value of a variable.
    pub fn set_variable(&mut self, id: NodeId, value: Value) -> Result<(), OperationError> {
        let (stage, old_refs) = {
            let command = self.command(id)?;
            if !command.is_variable() {
                return Err(OperationError::WrongKind {
                    id,
                    expected: NodeKind::Variable,
                    actual: NodeKind::Command,
                });
            }
            (command.stage, command.refs())
        };
        self.ensure_editable(stage)?;
        let new_refs = distinct(value.refs());
        self.check_refs(stage, Some(id), &new_refs, &old_refs)?;
        if let Some(CommandBody::Variable { value: slot }) =
            self.commands.get_mut(&id).map(Command::body_mut)
        {
            *slot = value;
        }
        self.sync_ref_edges(id, &old_refs, &new_refs)?;
        self.reorder_stage(stage)?;
        self.emit(id, ChangeKind::Modified);
        Ok(())
    }

    /// Delete a command. Commands referencing it keep a dangling reference
    /// and report a broken dependency.
    pub fn remove_command(&mut self, id: NodeId) -> Result<(), OperationError> {
        let stage = self.command(id)?.stage;
        self.ensure_editable(stage)?;
        self.destroy_command(id)?;
        self.stage_items_mut(stage)?.retain(|item| *item != id);
        self.emit(stage, ChangeKind::Modified);
        tracing::debug!(stage = %stage, command = %id, "command removed");
        Ok(())
    }

    pub fn rename_command(&mut self, id: NodeId, name: &str) -> Result<(), OperationError> {
        let stage = self.command(id)?.stage;
        self.ensure_editable(stage)?;
        check_name(name)?;
        if let Some(command) = self.commands.get_mut(&id) {
            command.name = name.to_string();
        }
        self.emit(id, ChangeKind::Modified);
        Ok(())
    }

    pub fn set_active(&mut self, id: NodeId, active: bool) -> Result<(), OperationError> {
        let stage = self.command(id)?.stage;
        self.ensure_editable(stage)?;
        if let Some(command) = self.commands.get_mut(&id) {
            command.active = active;
        }
        self.emit(id, ChangeKind::Modified);
        Ok(())
    }

    /// Set or clear the comment attached to a command. Blank content
    /// clears it.
    pub fn set_comment(&mut self, id: NodeId, content: Option<&str>) -> Result<(), OperationError> {
        let stage = self.command(id)?.stage;
        self.ensure_editable(stage)?;
        match content.filter(|text| !text.trim().is_empty()) {
            None => {
                if let Some(comment) = self.commands.get_mut(&id).and_then(|c| c.comment.take()) {
                    self.destroy_node(comment)?;
                    self.comments.remove(&comment);
                }
            }
            Some(text) => {
                let comment = self.comment_for_edit(id)?;
                if let Some(record) = self.comments.get_mut(&comment) {
                    record.content = text.to_string();
                }
                self.emit(comment, ChangeKind::Modified);
            }
        }
        self.emit(id, ChangeKind::Modified);
        Ok(())
    }

    pub fn append_comment_text(&mut self, id: NodeId, text: &str) -> Result<(), OperationError> {
        self.edit_comment(id, |draft| draft.append_text(text))
    }

    pub fn append_comment_line(&mut self, id: NodeId, line: &str) -> Result<(), OperationError> {
        self.edit_comment(id, |draft| draft.append_line(line))
    }

    /// Apply `edit` to a copy of the current comment and store the result.
    fn edit_comment(&mut self, id: NodeId, edit: impl FnOnce(&mut Comment)) -> Result<(), OperationError> {
        let command = self.command(id)?;
        let mut draft = command
            .comment
            .and_then(|comment| self.comments.get(&comment))
            .cloned()
            .unwrap_or_else(|| Comment::new(id, id, ""));
        edit(&mut draft);
        self.set_comment(id, Some(draft.content()))
    }

    /// Item at `index` of a graphical stage.
    pub fn command_at(&self, stage: NodeId, index: usize) -> Result<NodeId, OperationError> {
        let items = self.stage(stage)?.items();
        items.get(index).copied().ok_or(OperationError::OutOfRange {
            what: "command",
            index,
            len: items.len(),
        })
    }

    /// First item of a stage bound to `name`.
    pub fn command_by_name(&self, stage: NodeId, name: &str) -> Result<NodeId, OperationError> {
        self.stage(stage)?
            .items()
            .iter()
            .copied()
            .find(|id| self.commands.get(id).is_some_and(|c| c.name == name))
            .ok_or_else(|| OperationError::NoSuchName {
                stage,
                name: name.to_string(),
            })
    }

    /// Validity flags of one item. With `safe == false`, a failure to infer
    /// the result type is reported as a syntax problem.
    pub fn check_command(&self, id: NodeId, safe: bool) -> Result<Validity, OperationError> {
        let command = self.command(id)?;
        Ok(self
            .command_issues(command, safe)
            .into_iter()
            .fold(Validity::NOTHING, |acc, (flag, _)| acc | flag))
    }

    pub fn command_problems(&self, id: NodeId, safe: bool) -> Result<Vec<Problem>, OperationError> {
        let command = self.command(id)?;
        Ok(self
            .command_issues(command, safe)
            .into_iter()
            .map(|(flag, message)| Problem {
                node: id,
                flag,
                message,
            })
            .collect())
    }

    /// Result type of an item. Comments have none.
    pub fn gettype(&self, id: NodeId, level: ConversionLevel) -> Result<Option<String>, CoreError> {
        if self.comments.contains_key(&id) {
            return Ok(None);
        }
        let command = self.command(id)?;
        match &command.body {
            CommandBody::Operator { title, storage } => Ok(self
                .services()
                .catalog
                .result_type(title, storage, level)?),
            CommandBody::Variable { value } => Ok(self.value_type(value)),
        }
    }

    pub(crate) fn command_issues(&self, command: &Command, safe: bool) -> Vec<(Validity, String)> {
        let mut issues = Vec::new();
        if command.active
            && let CommandBody::Operator { title, storage } = &command.body
        {
            let catalog = &self.services().catalog;
            let types = |target: NodeId| self.result_type_of(target);
            for problem in catalog.validate(title, storage, &types) {
                issues.push((Validity::SYNTAXIC, problem));
            }
            if !safe
                && let Err(err) = catalog.result_type(title, storage, ConversionLevel::Strict)
            {
                issues.push((Validity::SYNTAXIC, err.to_string()));
            }
        }
        for target in distinct(command.refs()) {
            if !self.commands.contains_key(&target) {
                issues.push((
                    Validity::DEPENDENCY,
                    format!("references deleted command {target}"),
                ));
            }
        }
        if command.is_named() {
            let clash = self.stages.get(&command.stage).is_some_and(|stage| {
                stage.items().iter().any(|other| {
                    *other != command.id
                        && self
                            .commands
                            .get(other)
                            .is_some_and(|o| o.name == command.name)
                })
            });
            if clash {
                issues.push((
                    Validity::NAMING,
                    format!("name `{}` is bound more than once in the stage", command.name),
                ));
            }
        }
        issues
    }

    /// Refuse references that are unknown, invisible from `stage` or that
    /// would close a cycle. Dangling references already held are tolerated.
    fn check_refs(
        &self,
        stage: NodeId,
        owner: Option<NodeId>,
        refs: &[NodeId],
        held: &[NodeId],
    ) -> Result<(), OperationError> {
        let visible = self.visible_stages(stage);
        for &target in refs {
            if owner == Some(target) {
                return Err(OperationError::SelfEdge { id: target });
            }
            let Some(referenced) = self.commands.get(&target) else {
                if held.contains(&target) && !self.arena.contains(target) {
                    continue;
                }
                return Err(match self.arena.kind(target) {
                    Some(actual) => OperationError::WrongKind {
                        id: target,
                        expected: NodeKind::Command,
                        actual,
                    },
                    None => OperationError::UnknownNode { id: target },
                });
            };
            if !visible.contains(&referenced.stage) {
                return Err(OperationError::Invisible { stage, target });
            }
            if let Some(owner) = owner
                && self.arena.depends_on(target, owner)
            {
                return Err(OperationError::Cycle {
                    child: owner,
                    parent: target,
                });
            }
        }
        Ok(())
    }

    pub(crate) fn sync_ref_edges(
        &mut self,
        id: NodeId,
        old: &[NodeId],
        new: &[NodeId],
    ) -> Result<(), OperationError> {
        for target in old {
            if !new.contains(target) && self.arena.has_edge(id, *target) {
                self.unlink(id, *target)?;
            }
        }
        for target in new {
            if self.arena.contains(*target) {
                self.link(id, *target)?;
            }
        }
        Ok(())
    }

    /// Stable topological reorder: dependencies first, ties in the
    /// existing order.
    pub(crate) fn reorder_stage(&mut self, stage: NodeId) -> Result<(), OperationError> {
        let items = self.stage(stage)?.items().to_vec();
        let position: BTreeMap<NodeId, usize> =
            items.iter().enumerate().map(|(i, id)| (*id, i)).collect();
        let deps: Vec<BTreeSet<usize>> = items
            .iter()
            .map(|id| {
                self.commands
                    .get(id)
                    .map(|command| {
                        command
                            .refs()
                            .iter()
                            .filter_map(|target| position.get(target).copied())
                            .filter(|pos| items[*pos] != *id)
                            .collect()
                    })
                    .unwrap_or_default()
            })
            .collect();
        let mut indegree: Vec<usize> = deps.iter().map(BTreeSet::len).collect();
        let mut ready: BTreeSet<usize> = (0..items.len()).filter(|i| indegree[*i] == 0).collect();
        let mut order = Vec::with_capacity(items.len());
        while let Some(next) = ready.pop_first() {
            order.push(items[next]);
            for (index, dep) in deps.iter().enumerate() {
                if dep.contains(&next) {
                    indegree[index] -= 1;
                    if indegree[index] == 0 {
                        ready.insert(index);
                    }
                }
            }
        }
        if order.len() != items.len() || order == items {
            return Ok(());
        }
        *self.stage_items_mut(stage)? = order;
        self.emit(stage, ChangeKind::Modified);
        Ok(())
    }

    /// Unregister a command and its comment. The caller updates the stage.
    pub(crate) fn destroy_command(&mut self, id: NodeId) -> Result<(), OperationError> {
        if let Some(comment) = self.commands.get(&id).and_then(|c| c.comment) {
            self.destroy_node(comment)?;
            self.comments.remove(&comment);
        }
        let dependents: Vec<NodeId> = self
            .arena
            .children(id)
            .into_iter()
            .filter(|child| self.commands.contains_key(child))
            .collect();
        self.destroy_node(id)?;
        self.commands.remove(&id);
        for dependent in dependents {
            self.emit(dependent, ChangeKind::Modified);
        }
        Ok(())
    }

    fn comment_for_edit(&mut self, id: NodeId) -> Result<NodeId, OperationError> {
        if let Some(comment) = self.command(id)?.comment {
            return Ok(comment);
        }
        let comment = self.arena.create(NodeKind::Comment);
        self.emit(comment, ChangeKind::Created);
        self.link(comment, id)?;
        self.comments.insert(comment, Comment::new(comment, id, ""));
        if let Some(command) = self.commands.get_mut(&id) {
            command.comment = Some(comment);
        }
        Ok(comment)
    }
}

fn check_name(name: &str) -> Result<(), OperationError> {
    if is_valid_name(name) {
        Ok(())
    } else {
        Err(OperationError::InvalidName {
            name: name.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use crate::core::domain::{ConversionLevel, Validity};
    use crate::core::error::{CoreError, OperationError};
    use crate::core::value::Value;

    #[test]
    fn references_become_dependencies() {
        let (history, stage, mesh, model) = mesh_and_model();
        assert!(history.depends_on(model, mesh));
        assert!(!history.depends_on(mesh, model));
        assert!(history.depends_on(model, stage));
        assert_eq!(history.check_command(model, true).unwrap(), Validity::NOTHING);
    }

    #[test]
    fn deleting_a_referenced_command_breaks_dependencies() {
        let (mut history, stage, mesh, model) = mesh_and_model();
        history.remove_command(mesh).unwrap();
        assert!(!history.depends_on(model, mesh));
        assert!(history.check_command(model, true).unwrap().contains(Validity::DEPENDENCY));
        assert!(history.check_stage(stage).unwrap().contains(Validity::DEPENDENCY));
        assert_eq!(history.stage(stage).unwrap().items(), &[model]);
    }

    #[test]
    fn cycles_are_refused_and_storage_kept() {
        let (mut history, _, mesh, model) = mesh_and_model();
        let err = history
            .init_command(mesh, kw(&[("UNITE", Value::Ref(model))]))
            .unwrap_err();
        assert_eq!(
            err,
            OperationError::Cycle {
                child: mesh,
                parent: model
            }
        );
        assert_eq!(
            history.command(mesh).unwrap().storage().unwrap()["UNITE"],
            Value::Int(20)
        );
        let err = history
            .init_command(mesh, kw(&[("UNITE", Value::Ref(mesh))]))
            .unwrap_err();
        assert_eq!(err, OperationError::SelfEdge { id: mesh });
    }

    #[test]
    fn forward_reference_reorders_stage() {
        let mut history = history();
        let case = history.current_case();
        let stage = history.create_stage(case, "s").unwrap();
        let model = history.add_command(stage, "AFFE_MODELE", Some("model")).unwrap();
        let debut = history.add_command(stage, "DEBUT", None).unwrap();
        let mesh = history.add_command(stage, "LIRE_MAILLAGE", Some("mesh")).unwrap();
        history
            .init_command(model, kw(&[("MAILLAGE", Value::Ref(mesh))]))
            .unwrap();
        assert_eq!(history.stage(stage).unwrap().items(), &[debut, mesh, model]);
    }

    #[test]
    fn duplicate_names_are_naming_conflicts() {
        let (mut history, stage, mesh, _) = mesh_and_model();
        let other = history
            .add_command(stage, "LIRE_MAILLAGE", Some("mesh"))
            .unwrap();
        assert!(history.check_command(other, true).unwrap().contains(Validity::NAMING));
        assert!(history.check_command(mesh, true).unwrap().contains(Validity::NAMING));
        history.rename_command(other, "mesh2").unwrap();
        assert!(history.check_command(mesh, true).unwrap().is_ok());
    }

    #[test]
    fn syntax_problems_skip_inactive_commands() {
        let (mut history, stage, _, _) = mesh_and_model();
        let broken = history.add_command(stage, "AFFE_MODELE", None).unwrap();
        assert_eq!(history.check_command(broken, true).unwrap(), Validity::SYNTAXIC);
        history.set_active(broken, false).unwrap();
        assert_eq!(history.check_command(broken, true).unwrap(), Validity::NOTHING);
    }

    #[test]
    fn gettype_honours_conversion_level() {
        let (mut history, stage, mesh, _) = mesh_and_model();
        assert_eq!(
            history.gettype(mesh, ConversionLevel::Strict).unwrap().as_deref(),
            Some("maillage_sdaster")
        );
        let field = history.add_command(stage, "CREA_CHAMP", Some("field")).unwrap();
        assert!(matches!(
            history.gettype(field, ConversionLevel::Strict),
            Err(CoreError::TypeInference(_))
        ));
        assert_eq!(
            history
                .gettype(field, ConversionLevel::BestEffort)
                .unwrap()
                .as_deref(),
            Some("cham_no_sdaster")
        );
        // unsafe check folds the type failure into the syntax flag
        history
            .init_command(
                field,
                kw(&[("OPERATION", Value::text("AFFE")), ("TYPE_CHAM", Value::text("BOGUS"))]),
            )
            .unwrap();
        assert!(history.check_command(field, false).unwrap().contains(Validity::SYNTAXIC));
    }

    #[test]
    fn variables_are_typed_and_referencable() {
        let (mut history, stage, _, _) = mesh_and_model();
        let young = history
            .add_variable(stage, "young", Value::Float(2.1e11))
            .unwrap();
        let steel = history.add_command(stage, "DEFI_MATERIAU", Some("steel")).unwrap();
        history
            .init_command(
                steel,
                kw(&[(
                    "ELAS",
                    Value::block([("E", Value::Ref(young)), ("NU", Value::Float(0.3))]),
                )]),
            )
            .unwrap();
        assert!(history.depends_on(steel, young));
        assert_eq!(history.check_command(steel, true).unwrap(), Validity::NOTHING);
        assert_eq!(
            history.gettype(young, ConversionLevel::Strict).unwrap().as_deref(),
            Some("float")
        );
    }

    #[test]
    fn comments_are_children_of_their_command() {
        let (mut history, _, mesh, _) = mesh_and_model();
        history.append_comment_line(mesh, "read the mesh").unwrap();
        history.append_comment_line(mesh, "from MED").unwrap();
        let comment = history.command(mesh).unwrap().comment().unwrap();
        assert_eq!(history.comment(comment).unwrap().content(), "read the mesh\nfrom MED");
        assert!(history.depends_on(comment, mesh));
        assert_eq!(
            history.gettype(comment, ConversionLevel::Strict).unwrap(),
            None
        );
        history.set_comment(mesh, None).unwrap();
        assert!(!history.nodes().contains(comment));
    }

    #[test]
    fn blank_comments_leave_no_node() {
        let (mut history, _, mesh, _) = mesh_and_model();
        let before = history.nodes().len();
        history.append_comment_text(mesh, "").unwrap();
        history.append_comment_line(mesh, "").unwrap();
        history.append_comment_text(mesh, "\n").unwrap();
        assert_eq!(history.command(mesh).unwrap().comment(), None);
        assert_eq!(history.nodes().len(), before);

        history.append_comment_text(mesh, "read").unwrap();
        history.append_comment_text(mesh, " the mesh").unwrap();
        let comment = history.command(mesh).unwrap().comment().unwrap();
        assert_eq!(history.comment(comment).unwrap().content(), "read the mesh");
        history.set_comment(mesh, Some("  ")).unwrap();
        assert!(!history.nodes().contains(comment));
    }

    #[test]
    fn names_must_be_identifiers() {
        let (mut history, stage, mesh, model) = mesh_and_model();
        for bad in ["True", "False", "_F", "my mesh", "2d", ""] {
            assert_eq!(
                history.rename_command(mesh, bad),
                Err(OperationError::InvalidName { name: bad.to_string() })
            );
            assert_eq!(
                history.add_command(stage, "LIRE_MAILLAGE", Some(bad)),
                Err(OperationError::InvalidName { name: bad.to_string() })
            );
            assert_eq!(
                history.add_variable(stage, bad, Value::Int(1)),
                Err(OperationError::InvalidName { name: bad.to_string() })
            );
        }
        assert_eq!(history.command(mesh).unwrap().name(), "mesh");
        assert_eq!(history.stage(stage).unwrap().items(), &[mesh, model]);
        history.rename_command(mesh, "mesh_2").unwrap();
        history.add_command(stage, "FIN", None).unwrap();
    }

    #[test]
    fn lookup_by_name_and_index() {
        let (history, stage, mesh, model) = mesh_and_model();
        assert_eq!(history.command_by_name(stage, "model").unwrap(), model);
        assert_eq!(history.command_at(stage, 0).unwrap(), mesh);
        assert!(matches!(
            history.command_at(stage, 5),
            Err(OperationError::OutOfRange { len: 2, .. })
        ));
        assert!(matches!(
            history.command_by_name(stage, "nope"),
            Err(OperationError::NoSuchName { .. })
        ));
    }
}
