use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::FileAttr;

/// Expected shape of a keyword value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum KeywordKind {
    #[default]
    Any,
    Int,
    Float,
    Str,
    Bool,
    /// Result of another command.
    Ref,
    /// Nested keyword block (`_F(...)`).
    Block,
}

impl KeywordKind {
    /// Result types of variables accepted in place of a literal.
    pub(crate) fn accepts_variable_type(self, ty: &str) -> bool {
        match self {
            KeywordKind::Any => true,
            KeywordKind::Int => ty == "int",
            KeywordKind::Float => ty == "float" || ty == "int",
            KeywordKind::Str => ty == "str",
            KeywordKind::Bool => ty == "bool",
            KeywordKind::Ref | KeywordKind::Block => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct KeywordSchema {
    pub kind: KeywordKind,
    pub required: bool,
    /// Accepted result types for `ref` keywords; empty accepts any.
    pub types: Vec<String>,
    /// Allowed values for `str` keywords; empty accepts any.
    pub into: Vec<String>,
    /// Marks an `int` keyword as a logical file unit.
    pub file: Option<FileAttr>,
    /// Sub-keywords of a `block` keyword.
    pub keywords: BTreeMap<String, KeywordSchema>,
    /// Accept a list of values instead of a single one.
    pub many: bool,
}

/// How the result type of a command is derived from its storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResultRule {
    Fixed(String),
    Conditional {
        keyword: String,
        cases: BTreeMap<String, String>,
        #[serde(default)]
        default: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandSchema {
    pub name: String,
    #[serde(default)]
    pub result: Option<ResultRule>,
    #[serde(default)]
    pub keywords: BTreeMap<String, KeywordSchema>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct CatalogFile {
    #[serde(default, rename = "command")]
    pub commands: Vec<CommandSchema>,
}
