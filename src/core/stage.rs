//! Layer 6: Stages
//!
//! A stage is one phase of a study. It is either graphical (an ordered list
//! of items) or text (a single opaque dataset), never both.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::domain::FileAttr;
use super::identity::NodeId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageMode {
    Graphical,
    Text,
}

impl fmt::Display for StageMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageMode::Graphical => f.write_str("graphical"),
            StageMode::Text => f.write_str("text"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StageContent {
    Graphical { items: Vec<NodeId> },
    Text { dataset: NodeId, text: String },
}

/// File attached by the user to a logical unit of a stage.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub filename: PathBuf,
    /// Declared direction; commands may contribute more.
    #[serde(default)]
    pub attr: Option<FileAttr>,
    #[serde(default)]
    pub embedded: bool,
}

/// Aggregated view of one file handle.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct HandleInfo {
    pub filename: Option<PathBuf>,
    /// One entry per contributing active command, in command order.
    pub attrs: Vec<FileAttr>,
    pub exists: bool,
    pub embedded: bool,
}

impl HandleInfo {
    /// Combined direction of every contribution.
    pub fn merged_attr(&self) -> Option<FileAttr> {
        let input = self.attrs.iter().any(FileAttr::is_input);
        let output = self.attrs.iter().any(FileAttr::is_output);
        match (input, output) {
            (true, true) => Some(FileAttr::InOut),
            (true, false) => Some(FileAttr::In),
            (false, true) => Some(FileAttr::Out),
            (false, false) => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Stage {
    pub(crate) id: NodeId,
    pub(crate) name: String,
    pub(crate) content: StageContent,
    pub(crate) files: BTreeMap<u32, FileInfo>,
}

impl Stage {
    pub(crate) fn new(id: NodeId, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            content: StageContent::Graphical { items: Vec::new() },
            files: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> StageMode {
        match self.content {
            StageContent::Graphical { .. } => StageMode::Graphical,
            StageContent::Text { .. } => StageMode::Text,
        }
    }

    pub fn content(&self) -> &StageContent {
        &self.content
    }

    /// Items of a graphical stage; empty in text mode.
    pub fn items(&self) -> &[NodeId] {
        match &self.content {
            StageContent::Graphical { items } => items,
            StageContent::Text { .. } => &[],
        }
    }

    /// Raw text of a text-mode stage.
    pub fn text(&self) -> Option<&str> {
        match &self.content {
            StageContent::Text { text, .. } => Some(text),
            StageContent::Graphical { .. } => None,
        }
    }

    pub fn files(&self) -> &BTreeMap<u32, FileInfo> {
        &self.files
    }

    pub(crate) fn items_mut(&mut self) -> Option<&mut Vec<NodeId>> {
        match &mut self.content {
            StageContent::Graphical { items } => Some(items),
            StageContent::Text { .. } => None,
        }
    }
}
