//! Layer 9: Undo/redo over whole-history snapshots
//!
//! Each committed edit stores a listener-free copy of the history. Undo and
//! redo restore a copy in place; identifiers handed out in between are never
//! reused.

use std::collections::VecDeque;

use super::history::History;

const INITIAL_LABEL: &str = "initial state";

#[derive(Debug)]
struct Entry {
    label: String,
    snapshot: History,
}

/// Linear undo history with a bounded number of states.
#[derive(Debug)]
pub struct UndoStack {
    entries: VecDeque<Entry>,
    cursor: usize,
    limit: usize,
}

impl UndoStack {
    /// Start recording from the current state of `history`. `limit` bounds
    /// the number of stored states and is at least one.
    pub fn new(history: &History, limit: usize) -> Self {
        let mut entries = VecDeque::new();
        entries.push_back(Entry {
            label: INITIAL_LABEL.to_string(),
            snapshot: history.snapshot(),
        });
        Self {
            entries,
            cursor: 0,
            limit: limit.max(1),
        }
    }

    /// Record the state reached by an edit. Any redo branch is dropped.
    pub fn commit(&mut self, history: &History, label: impl Into<String>) {
        self.entries.truncate(self.cursor + 1);
        self.entries.push_back(Entry {
            label: label.into(),
            snapshot: history.snapshot(),
        });
        while self.entries.len() > self.limit {
            self.entries.pop_front();
        }
        self.cursor = self.entries.len() - 1;
    }

    /// Step back one edit. Returns the label of the undone edit.
    pub fn undo(&mut self, history: &mut History) -> Option<String> {
        if !self.can_undo() {
            return None;
        }
        let label = self.entries[self.cursor].label.clone();
        self.cursor -= 1;
        history.restore(&self.entries[self.cursor].snapshot);
        tracing::debug!(edit = %label, "undo");
        Some(label)
    }

    /// Re-apply the last undone edit. Returns its label.
    pub fn redo(&mut self, history: &mut History) -> Option<String> {
        if !self.can_redo() {
            return None;
        }
        self.cursor += 1;
        let entry = &self.entries[self.cursor];
        history.restore(&entry.snapshot);
        tracing::debug!(edit = %entry.label, "redo");
        Some(entry.label.clone())
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor + 1 < self.entries.len()
    }

    /// Labels of the undoable edits, oldest first.
    pub fn labels(&self) -> Vec<&str> {
        self.entries
            .iter()
            .take(self.cursor + 1)
            .skip(1)
            .map(|entry| entry.label.as_str())
            .collect()
    }
}
