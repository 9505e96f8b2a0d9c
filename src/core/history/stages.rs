//! Stages: creation, edit guards, mode switching, files and validity.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use indexmap::IndexMap;

use super::{ChangeKind, History, Problem, distinct};
use crate::convert::{Expr, Statement, StatementBody};
use crate::core::command::{Command, CommandBody, Comment, UNNAMED, is_valid_name};
use crate::core::domain::{FileAttr, NodeKind, Validity};
use crate::core::error::{ConversionError, CoreError, OperationError};
use crate::core::identity::NodeId;
use crate::core::stage::{FileInfo, HandleInfo, Stage, StageContent, StageMode};
use crate::core::value::{Keywords, Value};

impl History {
    /// Append an empty graphical stage to the current case.
    pub fn create_stage(&mut self, case: NodeId, name: &str) -> Result<NodeId, OperationError> {
        self.ensure_current(case)?;
        let id = self.arena.create(NodeKind::Stage);
        self.emit(id, ChangeKind::Created);
        self.stages.insert(id, Stage::new(id, name));
        let mut stages = self.case(case)?.stages().to_vec();
        stages.push(id);
        self.relink_case(case, stages)?;
        tracing::debug!(case = %case, stage = %id, name, "stage created");
        Ok(id)
    }

    /// Append a stage built from command text. The stage is converted to
    /// graphical mode when possible and stays in text mode otherwise.
    pub fn text2stage(&mut self, case: NodeId, text: &str, name: &str) -> Result<NodeId, OperationError> {
        let id = self.create_stage(case, name)?;
        let dataset = self.arena.create(NodeKind::TextDataSet);
        self.emit(dataset, ChangeKind::Created);
        self.link(dataset, id)?;
        self.stage_mut(id)?.content = StageContent::Text {
            dataset,
            text: text.to_string(),
        };
        if let Err(err) = self.use_graphical_mode(id) {
            tracing::warn!(stage = %id, error = %err, "stage kept in text mode");
        }
        Ok(id)
    }

    /// Append a stage read from a command file, named after the file.
    pub fn import_stage(&mut self, case: NodeId, path: &Path) -> Result<NodeId, CoreError> {
        let text = std::fs::read_to_string(path).map_err(|err| {
            ConversionError::new(format!("cannot read {}: {err}", path.display()))
        })?;
        let name = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("imported");
        Ok(self.text2stage(case, &text, name)?)
    }

    /// Drop the stage at `index` and every later stage from the current
    /// case. Stages no case uses any more are destroyed.
    pub fn remove_stage(&mut self, case: NodeId, index: usize) -> Result<(), OperationError> {
        self.ensure_current(case)?;
        let stages = self.case(case)?.stages().to_vec();
        if index >= stages.len() {
            return Err(OperationError::OutOfRange {
                what: "stage",
                index,
                len: stages.len(),
            });
        }
        self.relink_case(case, stages[..index].to_vec())?;
        tracing::debug!(case = %case, index, removed = stages.len() - index, "stages removed");
        Ok(())
    }

    pub fn stage_at(&self, case: NodeId, index: usize) -> Result<NodeId, OperationError> {
        let stages = self.case(case)?.stages();
        stages.get(index).copied().ok_or(OperationError::OutOfRange {
            what: "stage",
            index,
            len: stages.len(),
        })
    }

    pub fn stage_by_name(&self, case: NodeId, name: &str) -> Option<NodeId> {
        self.cases
            .get(&case)?
            .stages()
            .iter()
            .copied()
            .find(|id| self.stages.get(id).is_some_and(|s| s.name() == name))
    }

    pub fn rename_stage(&mut self, stage: NodeId, name: &str) -> Result<(), OperationError> {
        self.ensure_owned(stage)?;
        self.stage_mut(stage)?.name = name.to_string();
        self.emit(stage, ChangeKind::Modified);
        Ok(())
    }

    /// Replace the text of a text-mode stage.
    pub fn set_stage_text(&mut self, stage: NodeId, text: &str) -> Result<(), OperationError> {
        self.ensure_owned(stage)?;
        match &mut self.stage_mut(stage)?.content {
            StageContent::Text { text: slot, .. } => *slot = text.to_string(),
            StageContent::Graphical { .. } => return Err(OperationError::GraphicalMode { stage }),
        }
        self.emit(stage, ChangeKind::Modified);
        Ok(())
    }

    /// Graphical → text. The commands are rendered, then replaced by a
    /// single text dataset. Nothing changes on failure.
    pub fn use_text_mode(&mut self, stage: NodeId) -> Result<(), CoreError> {
        self.ensure_owned(stage)?;
        let items = match &self.stage(stage)?.content {
            StageContent::Text { .. } => return Ok(()),
            StageContent::Graphical { items } => items.clone(),
        };
        let by: Vec<NodeId> = distinct(items.iter().flat_map(|item| {
            self.arena
                .children(*item)
                .into_iter()
                .filter(|child| self.commands.get(child).is_some_and(|c| c.stage != stage))
        }));
        if !by.is_empty() {
            return Err(OperationError::ReferencedLater { stage, by }.into());
        }
        let text = self.render_stage(stage, false)?;
        for item in items.iter().rev() {
            self.destroy_command(*item)?;
        }
        let dataset = self.arena.create(NodeKind::TextDataSet);
        self.emit(dataset, ChangeKind::Created);
        self.link(dataset, stage)?;
        self.stage_mut(stage)?.content = StageContent::Text { dataset, text };
        self.emit(stage, ChangeKind::Modified);
        tracing::info!(stage = %stage, "stage switched to text mode");
        Ok(())
    }

    /// Text → graphical. The text is parsed and every name resolved before
    /// anything is touched; on failure the stage stays in text mode.
    pub fn use_graphical_mode(&mut self, stage: NodeId) -> Result<(), CoreError> {
        self.ensure_owned(stage)?;
        self.convert_to_graphical(stage)
    }

    /// Text → graphical without edit guards, for loading frozen stages.
    pub(crate) fn convert_to_graphical(&mut self, stage: NodeId) -> Result<(), CoreError> {
        let (dataset, text) = match &self.stage(stage)?.content {
            StageContent::Graphical { .. } => return Ok(()),
            StageContent::Text { dataset, text } => (*dataset, text.clone()),
        };
        let statements = self.services().converter.parse(&text)?;
        let outer = self.outer_scope(stage);
        check_names(&statements, &outer)?;

        self.destroy_node(dataset)?;
        self.stage_mut(stage)?.content = StageContent::Graphical { items: Vec::new() };
        let mut scope = outer;
        for statement in &statements {
            let id = self.build_item(stage, statement, &scope)?;
            if let Some(name) = &statement.name {
                scope.insert(name.clone(), id);
            }
        }
        self.emit(stage, ChangeKind::Modified);
        tracing::info!(stage = %stage, items = statements.len(), "stage switched to graphical mode");
        Ok(())
    }

    /// Command text of a stage in either mode (study2comm).
    pub fn stage_text(&self, stage: NodeId, sort: bool) -> Result<String, CoreError> {
        self.stage(stage)?;
        Ok(self.render_stage(stage, sort)?)
    }

    /// Keyword storage from `KW=value, ...` source. Names resolve to the
    /// commands visible from `stage`, its own commands included.
    pub fn parse_keywords(&self, stage: NodeId, source: &str) -> Result<Keywords, CoreError> {
        let statement = self.parse_single(&format!("KEYWORDS({source})"))?;
        let StatementBody::Call { keywords, .. } = &statement.body else {
            return Err(ConversionError::new("expected a keyword list").into());
        };
        let scope = self.inner_scope(stage)?;
        let mut storage = Keywords::new();
        for (keyword, expr) in keywords {
            storage.insert(keyword.clone(), expr_value(expr, &scope, statement.line)?);
        }
        Ok(storage)
    }

    /// A single value expression, resolved like `parse_keywords`.
    pub fn parse_value(&self, stage: NodeId, source: &str) -> Result<Value, CoreError> {
        let statement = self.parse_single(&format!("value = {source}"))?;
        let StatementBody::Assign(expr) = &statement.body else {
            return Err(ConversionError::new("expected a value").into());
        };
        let scope = self.inner_scope(stage)?;
        Ok(expr_value(expr, &scope, statement.line)?)
    }

    fn parse_single(&self, source: &str) -> Result<Statement, ConversionError> {
        let mut statements = self.services().converter.parse(source)?;
        match statements.len() {
            1 => Ok(statements.remove(0)),
            n => Err(ConversionError::new(format!("expected one statement, found {n}"))),
        }
    }

    fn inner_scope(&self, stage: NodeId) -> Result<BTreeMap<String, NodeId>, OperationError> {
        let mut scope = self.outer_scope(stage);
        for item in self.stage(stage)?.items() {
            if let Some(command) = self.commands.get(item)
                && command.is_named()
            {
                scope.insert(command.name.clone(), *item);
            }
        }
        Ok(scope)
    }

    /// Aggregated validity of the stage. Text stages are not checked.
    pub fn check_stage(&self, stage: NodeId) -> Result<Validity, OperationError> {
        let mut flags = Validity::NOTHING;
        for item in self.stage(stage)?.items() {
            flags |= self.check_command(*item, true)?;
        }
        Ok(flags)
    }

    pub fn stage_problems(&self, stage: NodeId) -> Result<Vec<Problem>, OperationError> {
        let mut problems = Vec::new();
        for item in self.stage(stage)?.items() {
            problems.extend(self.command_problems(*item, true)?);
        }
        Ok(problems)
    }

    /// Per file handle: attached file and the direction contributed by
    /// every active command using it, in command order.
    pub fn handle2info(&self, stage: NodeId) -> Result<BTreeMap<u32, HandleInfo>, OperationError> {
        let record = self.stage(stage)?;
        let mut out: BTreeMap<u32, HandleInfo> = BTreeMap::new();
        match &record.content {
            StageContent::Graphical { items } => {
                for item in items {
                    let Some(command) = self.commands.get(item) else {
                        continue;
                    };
                    if !command.active {
                        continue;
                    }
                    if let CommandBody::Operator { title, storage } = &command.body {
                        for (unit, attr) in self.services().catalog.file_units(title, storage) {
                            out.entry(unit).or_default().attrs.push(attr);
                        }
                    }
                }
            }
            StageContent::Text { .. } => {
                for (handle, info) in &record.files {
                    if let Some(attr) = info.attr {
                        out.entry(*handle).or_default().attrs.push(attr);
                    }
                }
            }
        }
        for (handle, info) in &record.files {
            let entry = out.entry(*handle).or_default();
            entry.filename = Some(info.filename.clone());
            entry.exists = info.filename.exists();
            entry.embedded = info.embedded;
        }
        Ok(out)
    }

    pub fn attach_file(
        &mut self,
        stage: NodeId,
        handle: u32,
        filename: impl Into<PathBuf>,
        attr: Option<FileAttr>,
        embedded: bool,
    ) -> Result<(), OperationError> {
        self.ensure_owned(stage)?;
        let filename = filename.into();
        tracing::debug!(stage = %stage, handle, file = %filename.display(), "file attached");
        self.stage_mut(stage)?.files.insert(
            handle,
            FileInfo {
                filename,
                attr,
                embedded,
            },
        );
        self.emit(stage, ChangeKind::Modified);
        Ok(())
    }

    pub fn detach_file(&mut self, stage: NodeId, handle: u32) -> Result<Option<FileInfo>, OperationError> {
        self.ensure_owned(stage)?;
        let removed = self.stage_mut(stage)?.files.remove(&handle);
        if removed.is_some() {
            self.emit(stage, ChangeKind::Modified);
        }
        Ok(removed)
    }

    /// The stage may be changed: it belongs to the current case alone.
    pub(crate) fn ensure_owned(&self, stage: NodeId) -> Result<(), OperationError> {
        self.stage(stage)?;
        let users = self.cases_using(stage);
        if !users.contains(&self.current) {
            return Err(OperationError::FrozenCase {
                case: users.first().copied().unwrap_or(self.current),
            });
        }
        if users.len() > 1 {
            return Err(OperationError::SharedStage { stage });
        }
        Ok(())
    }

    /// Owned and in graphical mode.
    pub(crate) fn ensure_editable(&self, stage: NodeId) -> Result<(), OperationError> {
        self.ensure_owned(stage)?;
        match self.stage(stage)?.mode() {
            StageMode::Graphical => Ok(()),
            StageMode::Text => Err(OperationError::TextMode { stage }),
        }
    }

    pub(crate) fn stage_mut(&mut self, id: NodeId) -> Result<&mut Stage, OperationError> {
        self.stages
            .get_mut(&id)
            .ok_or(OperationError::UnknownNode { id })
    }

    pub(crate) fn stage_items_mut(&mut self, stage: NodeId) -> Result<&mut Vec<NodeId>, OperationError> {
        self.stage_mut(stage)?
            .items_mut()
            .ok_or(OperationError::TextMode { stage })
    }

    /// Unregister a stage with everything it owns. The caller has already
    /// removed it from every case.
    pub(crate) fn destroy_stage(&mut self, stage: NodeId) -> Result<(), OperationError> {
        let content = self.stage(stage)?.content.clone();
        match content {
            StageContent::Graphical { items } => {
                for item in items.iter().rev() {
                    self.destroy_command(*item)?;
                }
            }
            StageContent::Text { dataset, .. } => self.destroy_node(dataset)?,
        }
        self.destroy_node(stage)?;
        self.stages.remove(&stage);
        tracing::debug!(stage = %stage, "stage destroyed");
        Ok(())
    }

    /// Names bound by earlier stages of the owning case, later ones
    /// shadowing earlier ones.
    fn outer_scope(&self, stage: NodeId) -> BTreeMap<String, NodeId> {
        let mut scope = BTreeMap::new();
        for earlier in self.visible_stages(stage) {
            if earlier == stage {
                break;
            }
            let Some(record) = self.stages.get(&earlier) else {
                continue;
            };
            for item in record.items() {
                if let Some(command) = self.commands.get(item)
                    && command.is_named()
                {
                    scope.insert(command.name.clone(), *item);
                }
            }
        }
        scope
    }

    fn build_item(
        &mut self,
        stage: NodeId,
        statement: &Statement,
        scope: &BTreeMap<String, NodeId>,
    ) -> Result<NodeId, CoreError> {
        let name = statement.name.as_deref().unwrap_or(UNNAMED);
        let (kind, body) = match &statement.body {
            StatementBody::Call { title, keywords } => {
                let mut storage = Keywords::new();
                for (keyword, expr) in keywords {
                    storage.insert(keyword.clone(), expr_value(expr, scope, statement.line)?);
                }
                (
                    NodeKind::Command,
                    CommandBody::Operator {
                        title: title.clone(),
                        storage,
                    },
                )
            }
            StatementBody::Assign(expr) => (
                NodeKind::Variable,
                CommandBody::Variable {
                    value: expr_value(expr, scope, statement.line)?,
                },
            ),
        };
        let id = self.arena.create(kind);
        self.emit(id, ChangeKind::Created);
        self.link(id, stage)?;
        let command = Command {
            id,
            stage,
            name: name.to_string(),
            body,
            active: statement.active,
            comment: None,
        };
        for target in distinct(command.refs()) {
            self.link(id, target)?;
        }
        self.commands.insert(id, command);
        if let Some(text) = statement.comment.as_ref().filter(|text| !text.trim().is_empty()) {
            let comment = self.arena.create(NodeKind::Comment);
            self.emit(comment, ChangeKind::Created);
            self.link(comment, id)?;
            self.comments.insert(comment, Comment::new(comment, id, text));
            if let Some(command) = self.commands.get_mut(&id) {
                command.comment = Some(comment);
            }
        }
        self.stage_items_mut(stage)?.push(id);
        Ok(id)
    }

    fn render_stage(&self, stage: NodeId, sort: bool) -> Result<String, ConversionError> {
        let record = self
            .stages
            .get(&stage)
            .ok_or_else(|| ConversionError::new(format!("unknown stage {stage}")))?;
        match &record.content {
            StageContent::Text { text, .. } => Ok(text.clone()),
            StageContent::Graphical { items } => {
                self.check_bindings(stage, items)?;
                let statements = items
                    .iter()
                    .filter_map(|item| self.commands.get(item))
                    .map(|command| self.to_statement(command))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(self.services().converter.render(&statements, sort))
            }
        }
    }

    /// Replay the scope the parser will build from the rendered text: each
    /// reference must still name its own target there.
    fn check_bindings(&self, stage: NodeId, items: &[NodeId]) -> Result<(), ConversionError> {
        let mut scope = self.outer_scope(stage);
        for item in items {
            let Some(command) = self.commands.get(item) else {
                continue;
            };
            for target in distinct(command.refs()) {
                let Some(referenced) = self.commands.get(&target).filter(|c| c.is_named()) else {
                    continue;
                };
                match scope.get(&referenced.name) {
                    Some(bound) if *bound == target => {}
                    Some(bound) => {
                        return Err(ConversionError::new(format!(
                            "`{}` references {target} but `{}` names {bound} at that point",
                            command.name, referenced.name
                        )));
                    }
                    None => {
                        return Err(ConversionError::new(format!(
                            "`{}` references {target} before `{}` is bound",
                            command.name, referenced.name
                        )));
                    }
                }
            }
            if command.is_named() {
                scope.insert(command.name.clone(), *item);
            }
        }
        Ok(())
    }

    fn to_statement(&self, command: &Command) -> Result<Statement, ConversionError> {
        if command.is_named() && !is_valid_name(&command.name) {
            return Err(ConversionError::new(format!(
                "`{}` is not a valid command name",
                command.name
            )));
        }
        let name = command.is_named().then(|| command.name.clone());
        let body = match &command.body {
            CommandBody::Operator { title, storage } => {
                let mut keywords = IndexMap::new();
                for (keyword, value) in storage {
                    keywords.insert(keyword.clone(), self.value_expr(value, command)?);
                }
                StatementBody::Call {
                    title: title.clone(),
                    keywords,
                }
            }
            CommandBody::Variable { value } => StatementBody::Assign(self.value_expr(value, command)?),
        };
        Ok(Statement {
            name,
            body,
            active: command.active,
            comment: command
                .comment
                .and_then(|id| self.comments.get(&id))
                .map(|comment| comment.content.clone()),
            line: 0,
        })
    }

    fn value_expr(&self, value: &Value, owner: &Command) -> Result<Expr, ConversionError> {
        Ok(match value {
            Value::Int(v) => Expr::Int(*v),
            Value::Float(v) => Expr::Float(*v),
            Value::Bool(v) => Expr::Bool(*v),
            Value::Text(v) => Expr::Text(v.clone()),
            Value::List(items) => Expr::List(
                items
                    .iter()
                    .map(|item| self.value_expr(item, owner))
                    .collect::<Result<_, _>>()?,
            ),
            Value::Block(block) => {
                let mut out = IndexMap::new();
                for (keyword, item) in block {
                    out.insert(keyword.clone(), self.value_expr(item, owner)?);
                }
                Expr::Block(out)
            }
            Value::Ref(target) => match self.commands.get(target) {
                Some(referenced) if referenced.is_named() => Expr::Name(referenced.name.clone()),
                Some(_) => {
                    return Err(ConversionError::new(format!(
                        "`{}` references unnamed command {target}",
                        owner.name
                    )));
                }
                None => {
                    return Err(ConversionError::new(format!(
                        "`{}` references deleted command {target}",
                        owner.name
                    )));
                }
            },
        })
    }
}

/// Every name used by a statement must be bound by an earlier statement or
/// by an earlier stage.
fn check_names(statements: &[Statement], outer: &BTreeMap<String, NodeId>) -> Result<(), ConversionError> {
    let mut bound: BTreeSet<&str> = outer.keys().map(String::as_str).collect();
    for statement in statements {
        if let Some(name) = statement.name.as_deref().filter(|name| !is_valid_name(name)) {
            return Err(located(statement.line, format!("`{name}` cannot be assigned")));
        }
        for name in statement.names() {
            if !bound.contains(name) {
                return Err(located(statement.line, format!("unknown name `{name}`")));
            }
        }
        if let Some(name) = &statement.name {
            bound.insert(name);
        }
    }
    Ok(())
}

fn located(line: usize, reason: String) -> ConversionError {
    if line == 0 {
        ConversionError::new(reason)
    } else {
        ConversionError::at_line(line, reason)
    }
}

fn expr_value(expr: &Expr, scope: &BTreeMap<String, NodeId>, line: usize) -> Result<Value, ConversionError> {
    Ok(match expr {
        Expr::Int(v) => Value::Int(*v),
        Expr::Float(v) => Value::Float(*v),
        Expr::Bool(v) => Value::Bool(*v),
        Expr::Text(v) => Value::Text(v.clone()),
        Expr::List(items) => Value::List(
            items
                .iter()
                .map(|item| expr_value(item, scope, line))
                .collect::<Result<_, _>>()?,
        ),
        Expr::Block(block) => {
            let mut out = Keywords::new();
            for (keyword, item) in block {
                out.insert(keyword.clone(), expr_value(item, scope, line)?);
            }
            Value::Block(out)
        }
        Expr::Name(name) => match scope.get(name) {
            Some(id) => Value::Ref(*id),
            None => return Err(located(line, format!("unknown name `{name}`"))),
        },
    })
}
