#![forbid(unsafe_code)]

pub mod catalog;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod convert;
pub mod core;
pub mod engine;
pub mod error;
mod paths;
pub mod persist;
pub mod telemetry;

pub use error::Error;
pub type Result<T> = std::result::Result<T, Error>;

// Re-export core types at crate root for convenience
pub use crate::core::{
    Case, CaseKind, ChangeEvent, ChangeKind, Command, CommandBody, Comment, ConversionLevel,
    CopyOnWrite, FileAttr, History, Keywords, NodeId, NodeKind, Problem, RunState, Services,
    Stage, StageMode, UndoStack, Validity, Value,
};
