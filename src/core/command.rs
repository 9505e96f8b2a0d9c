//! Layer 5: Stage items
//!
//! Command: one operator invocation with keyword storage
//! Variable: `name = <expr>` assignment, referencable like a command
//! Comment: free text attached to a command

use super::domain::NodeKind;
use super::identity::NodeId;
use super::value::{Keywords, Value, keyword_refs};

/// Name used for items that produce no named result.
pub const UNNAMED: &str = "_";

/// Title reported for variables, which have no operator.
pub const VARIABLE_TITLE: &str = "VARIABLE";

/// Identifiers the command language reads as literals or block markers.
const RESERVED: [&str; 3] = ["True", "False", "_F"];

/// True when `name` can be bound by `name = ...` and read back unchanged.
pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !RESERVED.contains(&name)
}

#[derive(Clone, Debug, PartialEq)]
pub enum CommandBody {
    Operator { title: String, storage: Keywords },
    Variable { value: Value },
}

#[derive(Clone, Debug, PartialEq)]
pub struct Command {
    pub(crate) id: NodeId,
    pub(crate) stage: NodeId,
    pub(crate) name: String,
    pub(crate) body: CommandBody,
    pub(crate) active: bool,
    pub(crate) comment: Option<NodeId>,
}

impl Command {
    pub(crate) fn operator(id: NodeId, stage: NodeId, title: &str, name: &str) -> Self {
        Self {
            id,
            stage,
            name: name.to_string(),
            body: CommandBody::Operator {
                title: title.to_string(),
                storage: Keywords::new(),
            },
            active: true,
            comment: None,
        }
    }

    pub(crate) fn variable(id: NodeId, stage: NodeId, name: &str, value: Value) -> Self {
        Self {
            id,
            stage,
            name: name.to_string(),
            body: CommandBody::Variable { value },
            active: true,
            comment: None,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn stage(&self) -> NodeId {
        self.stage
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> NodeKind {
        match self.body {
            CommandBody::Operator { .. } => NodeKind::Command,
            CommandBody::Variable { .. } => NodeKind::Variable,
        }
    }

    pub fn title(&self) -> &str {
        match &self.body {
            CommandBody::Operator { title, .. } => title,
            CommandBody::Variable { .. } => VARIABLE_TITLE,
        }
    }

    pub fn body(&self) -> &CommandBody {
        &self.body
    }

    pub fn storage(&self) -> Option<&Keywords> {
        match &self.body {
            CommandBody::Operator { storage, .. } => Some(storage),
            CommandBody::Variable { .. } => None,
        }
    }

    pub fn value(&self) -> Option<&Value> {
        match &self.body {
            CommandBody::Variable { value } => Some(value),
            CommandBody::Operator { .. } => None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_variable(&self) -> bool {
        matches!(self.body, CommandBody::Variable { .. })
    }

    pub fn comment(&self) -> Option<NodeId> {
        self.comment
    }

    /// True when the item binds a result name (`name = ...`).
    pub fn is_named(&self) -> bool {
        !self.name.is_empty() && self.name != UNNAMED
    }

    /// Commands referenced anywhere in the storage tree.
    pub fn refs(&self) -> Vec<NodeId> {
        match &self.body {
            CommandBody::Operator { storage, .. } => keyword_refs(storage),
            CommandBody::Variable { value } => value.refs(),
        }
    }

    pub(crate) fn body_mut(&mut self) -> &mut CommandBody {
        &mut self.body
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Comment {
    pub(crate) id: NodeId,
    pub(crate) owner: NodeId,
    pub(crate) content: String,
}

impl Comment {
    pub(crate) fn new(id: NodeId, owner: NodeId, content: &str) -> Self {
        Self {
            id,
            owner,
            content: content.to_string(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn owner(&self) -> NodeId {
        self.owner
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub(crate) fn append_text(&mut self, text: &str) {
        self.content.push_str(text);
    }

    pub(crate) fn append_line(&mut self, line: &str) {
        if !self.content.is_empty() {
            self.content.push('\n');
        }
        self.content.push_str(line);
    }
}
