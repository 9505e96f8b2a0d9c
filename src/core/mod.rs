//! Core study model (Layers 0-9)
//!
//! Module hierarchy follows type dependency order:
//! - identity: NodeId, NodeIdAllocator (Layer 0)
//! - domain: NodeKind, FileAttr, Validity, RunState (Layer 1)
//! - value: Value, Keywords (Layer 2)
//! - matrix: DependencyMatrix (Layer 3)
//! - graph: NodeArena (Layer 4)
//! - command: Command, Comment (Layer 5)
//! - stage: Stage, FileInfo, HandleInfo (Layer 6)
//! - case: Case, RunRecord (Layer 7)
//! - history: History (Layer 8)
//! - undo: UndoStack (Layer 9)

pub mod case;
pub mod command;
pub mod domain;
pub mod error;
pub mod graph;
pub mod history;
pub mod identity;
pub mod matrix;
pub mod stage;
pub mod undo;
pub mod value;

pub use case::{Case, RunMessage, RunRecord, Severity};
pub use command::{Command, CommandBody, Comment, UNNAMED, VARIABLE_TITLE};
pub use domain::{CaseKind, ConversionLevel, CopyOnWrite, FileAttr, NodeKind, RunState, Validity};
pub use error::{ConversionError, CoreError, OperationError, RecoveryError, TypeInferenceError};
pub use graph::{GraphNode, NodeArena};
pub use history::{
    CURRENT_CASE_NAME, ChangeEvent, ChangeKind, History, Listener, Problem, Services,
    SubscriptionId,
};
pub use identity::{NodeId, NodeIdAllocator};
pub use matrix::{DependencyMatrix, MatrixSlice};
pub use stage::{FileInfo, HandleInfo, Stage, StageContent, StageMode};
pub use undo::UndoStack;
pub use value::{Keywords, Value, keyword_refs, lookup, remap_keywords};
