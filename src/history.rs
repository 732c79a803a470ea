//! Bounded undo/redo stacks of executed actions.
//!
//! The log only holds records. Executing the reversal and persisting the
//! change belong to the organizer, which mutates the log inside a store
//! transaction.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::ActionRecord;

pub const DEFAULT_CAPACITY: usize = 20;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionLog {
    /// Oldest first; the back is the next action to undo.
    undo: VecDeque<ActionRecord>,
    /// Reversals of undone actions, newest at the back.
    redo: VecDeque<ActionRecord>,
    capacity: usize,
}

impl Default for ActionLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl ActionLog {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            undo: VecDeque::new(),
            redo: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        while self.undo.len() > self.capacity {
            self.undo.pop_front();
        }
        while self.redo.len() > self.capacity {
            self.redo.pop_front();
        }
    }

    /// Record a fresh action. Clears the redo stack.
    ///
    /// Returns what was displaced so a rollback can put it back.
    pub fn record(&mut self, action: ActionRecord) -> Displaced {
        let redo = std::mem::take(&mut self.redo);
        let dropped = self.push_undo(action);
        Displaced { dropped, redo }
    }

    /// Put a previously displaced state back, undoing [`ActionLog::record`].
    pub fn unrecord(&mut self, id: Uuid, displaced: Displaced) {
        if self.undo.back().map(|r| r.id) == Some(id) {
            self.undo.pop_back();
        }
        if let Some(dropped) = displaced.dropped {
            self.undo.push_front(dropped);
        }
        self.redo = displaced.redo;
    }

    pub fn peek_undo(&self) -> Option<&ActionRecord> {
        self.undo.back()
    }

    pub fn peek_redo(&self) -> Option<&ActionRecord> {
        self.redo.back()
    }

    pub fn pop_undo(&mut self) -> Option<ActionRecord> {
        self.undo.pop_back()
    }

    pub fn pop_redo(&mut self) -> Option<ActionRecord> {
        self.redo.pop_back()
    }

    /// Push onto the undo stack without touching redo. Returns the entry
    /// dropped off the far end, if any.
    pub fn push_undo(&mut self, action: ActionRecord) -> Option<ActionRecord> {
        self.undo.push_back(action);
        if self.undo.len() > self.capacity {
            self.undo.pop_front()
        } else {
            None
        }
    }

    pub fn push_redo(&mut self, action: ActionRecord) -> Option<ActionRecord> {
        self.redo.push_back(action);
        if self.redo.len() > self.capacity {
            self.redo.pop_front()
        } else {
            None
        }
    }

    /// Take back the newest undo entry if it is `id`, restoring `dropped` at
    /// the far end.
    pub fn retract_undo(&mut self, id: Uuid, dropped: Option<ActionRecord>) {
        if self.undo.back().map(|r| r.id) == Some(id) {
            self.undo.pop_back();
            if let Some(dropped) = dropped {
                self.undo.push_front(dropped);
            }
        }
    }

    pub fn retract_redo(&mut self, id: Uuid, dropped: Option<ActionRecord>) {
        if self.redo.back().map(|r| r.id) == Some(id) {
            self.redo.pop_back();
            if let Some(dropped) = dropped {
                self.redo.push_front(dropped);
            }
        }
    }

    /// Undo entries, newest first.
    pub fn undo_entries(&self) -> impl Iterator<Item = &ActionRecord> {
        self.undo.iter().rev()
    }

    /// Redo entries, newest first.
    pub fn redo_entries(&self) -> impl Iterator<Item = &ActionRecord> {
        self.redo.iter().rev()
    }

    pub fn undo_len(&self) -> usize {
        self.undo.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo.len()
    }
}

/// Entries removed by [`ActionLog::record`].
#[derive(Debug, Clone, Default)]
pub struct Displaced {
    dropped: Option<ActionRecord>,
    redo: VecDeque<ActionRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ActionType;
    use chrono::Utc;
    use std::path::PathBuf;

    fn action(n: usize) -> ActionRecord {
        ActionRecord {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            action_type: ActionType::Move,
            file_id: None,
            source_path: PathBuf::from(format!("/a/{}", n)),
            destination_path: PathBuf::from(format!("/b/{}", n)),
            source_root: PathBuf::from("/a"),
            destination_root: PathBuf::from("/b"),
            rule_id: None,
        }
    }

    #[test]
    fn record_clears_redo_and_caps_undo() {
        let mut log = ActionLog::with_capacity(2);
        log.push_redo(action(0));
        log.record(action(1));
        assert_eq!(log.redo_len(), 0);

        let second = action(2);
        let third = action(3);
        log.record(second.clone());
        log.record(third.clone());
        assert_eq!(log.undo_len(), 2);
        let newest_first: Vec<_> = log.undo_entries().map(|r| r.id).collect();
        assert_eq!(newest_first, vec![third.id, second.id]);
    }

    #[test]
    fn unrecord_restores_previous_stacks() {
        let mut log = ActionLog::with_capacity(1);
        let first = action(1);
        log.record(first.clone());
        let pending_redo = action(9);
        log.push_redo(pending_redo.clone());
        let before = log.clone();

        let next = action(2);
        let displaced = log.record(next.clone());
        assert_eq!(log.peek_undo().map(|r| r.id), Some(next.id));
        log.unrecord(next.id, displaced);
        assert_eq!(log, before);
    }

    #[test]
    fn retract_only_pops_matching_entry() {
        let mut log = ActionLog::default();
        let a = action(1);
        let b = action(2);
        log.push_undo(a.clone());
        let dropped = log.push_undo(b.clone());
        log.retract_undo(a.id, dropped.clone());
        assert_eq!(log.undo_len(), 2);
        log.retract_undo(b.id, dropped);
        assert_eq!(log.peek_undo().map(|r| r.id), Some(a.id));
    }

    #[test]
    fn capacity_round_trips_through_serde() {
        let mut log = ActionLog::with_capacity(5);
        log.record(action(1));
        let json = serde_json::to_string(&log).unwrap();
        let back: ActionLog = serde_json::from_str(&json).unwrap();
        assert_eq!(back, log);
        assert_eq!(back.capacity(), 5);
    }
}
