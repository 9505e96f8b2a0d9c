//! Layer 1: Domain enums and flag sets
//!
//! NodeKind: closed set of node kinds in the registry
//! FileAttr: direction of a file handle (in, out, inout)
//! Validity: combinable validity problems of commands/stages/cases
//! RunState: combinable completion state reported by an execution engine

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Kind tag of a registry node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    History,
    Case,
    Stage,
    Command,
    Variable,
    Comment,
    TextDataSet,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::History => "history",
            Self::Case => "case",
            Self::Stage => "stage",
            Self::Command => "command",
            Self::Variable => "variable",
            Self::Comment => "comment",
            Self::TextDataSet => "text_dataset",
        }
    }

    /// Kinds that may appear in a stage's command sequence.
    pub fn is_stage_item(&self) -> bool {
        matches!(self, Self::Command | Self::Variable)
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of a file attached to a logical unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FileAttr {
    In,
    Out,
    InOut,
}

impl FileAttr {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::In => "in",
            Self::Out => "out",
            Self::InOut => "inout",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "in" => Some(Self::In),
            "out" => Some(Self::Out),
            "inout" | "in_out" => Some(Self::InOut),
            _ => None,
        }
    }

    /// Legacy documents store the direction as a bit mask.
    pub fn from_legacy(bits: u64) -> Option<Self> {
        match bits {
            1 => Some(Self::In),
            2 => Some(Self::Out),
            3 => Some(Self::InOut),
            _ => None,
        }
    }

    pub fn is_input(&self) -> bool {
        matches!(self, Self::In | Self::InOut)
    }

    pub fn is_output(&self) -> bool {
        matches!(self, Self::Out | Self::InOut)
    }
}

impl fmt::Display for FileAttr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for FileAttr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for FileAttr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Name(String),
            Bits(u64),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Name(name) => FileAttr::parse(&name).ok_or_else(|| {
                serde::de::Error::custom(format!("unknown file attribute `{name}`"))
            }),
            Repr::Bits(bits) => FileAttr::from_legacy(bits).ok_or_else(|| {
                serde::de::Error::custom(format!("unknown legacy file attribute {bits}"))
            }),
        }
    }
}

/// Validity problems, combinable with `|`.
///
/// An empty set means the item is fully well-formed.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Validity(u8);

impl Validity {
    pub const NOTHING: Validity = Validity(0);
    pub const SYNTAXIC: Validity = Validity(1);
    pub const DEPENDENCY: Validity = Validity(1 << 1);
    pub const NAMING: Validity = Validity(1 << 2);
    pub const ALL: Validity = Validity(0b111);

    /// Declaration order, used for rendering.
    const LABELS: [(Validity, &'static str); 3] = [
        (Validity::SYNTAXIC, "Syntax problem"),
        (Validity::DEPENDENCY, "Broken dependencies"),
        (Validity::NAMING, "Naming conflict"),
    ];

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn from_bits_truncate(bits: u8) -> Self {
        Self(bits & Self::ALL.0)
    }

    pub fn is_ok(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, other: Validity) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Validity) {
        self.0 |= other.0;
    }

    pub fn labels(self) -> impl Iterator<Item = &'static str> {
        Self::LABELS
            .into_iter()
            .filter(move |(flag, _)| self.contains(*flag))
            .map(|(_, label)| label)
    }
}

impl BitOr for Validity {
    type Output = Validity;

    fn bitor(self, rhs: Self) -> Self::Output {
        Validity(self.0 | rhs.0)
    }
}

impl BitOrAssign for Validity {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for Validity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_ok() {
            return f.write_str("Validity(Nothing)");
        }
        write!(f, "Validity({self})")
    }
}

impl fmt::Display for Validity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let labels: Vec<&str> = self.labels().collect();
        f.write_str(&labels.join("; "))
    }
}

/// Completion state of a case execution, combinable with `|`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunState(u8);

impl RunState {
    pub const WAITING: RunState = RunState(1);
    pub const RUNNING: RunState = RunState(1 << 1);
    pub const SUCCESS: RunState = RunState(1 << 2);
    pub const WARN: RunState = RunState(1 << 3);
    pub const ERROR: RunState = RunState(1 << 4);
    pub const INTERRUPTED: RunState = RunState(1 << 5);

    const LABELS: [(RunState, &'static str); 6] = [
        (RunState::WAITING, "Waiting"),
        (RunState::RUNNING, "Running"),
        (RunState::SUCCESS, "Success"),
        (RunState::WARN, "Warn"),
        (RunState::ERROR, "Error"),
        (RunState::INTERRUPTED, "Interrupted"),
    ];

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn from_bits_truncate(bits: u8) -> Self {
        Self(bits & 0b11_1111)
    }

    pub fn contains(self, other: RunState) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True once the engine reported a terminal state.
    pub fn is_finished(self) -> bool {
        self.0 & (Self::SUCCESS.0 | Self::ERROR.0 | Self::INTERRUPTED.0) != 0
    }

    pub fn is_pending(self) -> bool {
        !self.is_finished() && self.0 & (Self::WAITING.0 | Self::RUNNING.0) != 0
    }
}

impl BitOr for RunState {
    type Output = RunState;

    fn bitor(self, rhs: Self) -> Self::Output {
        RunState(self.0 | rhs.0)
    }
}

impl BitOrAssign for RunState {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RunState({self})")
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let labels: Vec<&str> = Self::LABELS
            .into_iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, label)| label)
            .collect();
        if labels.is_empty() {
            return f.write_str("None");
        }
        f.write_str(&labels.join("|"))
    }
}

/// How hard `gettype` tries when the result type is under-specified.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum ConversionLevel {
    /// Fail with a type inference error.
    #[default]
    Strict,
    /// Fall back to the default or first candidate type.
    BestEffort,
}

/// Role of a case in the history.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseKind {
    Current,
    Run,
}

/// What to do when a stage about to be edited is shared with another case.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CopyOnWrite {
    /// Clone the stage (and the shared suffix) into the editing case.
    Fork,
    /// Reject the edit.
    Refuse,
}
