//! The command engine: live snapshot, undo/redo stacks and transactions.
//!
//! ## Transactions
//!
//! While a transaction is open, dispatched commands still run against the
//! live snapshot (callers see their effect immediately) but are parked in
//! a buffer instead of the history. Closing the outermost transaction wraps
//! the buffer into one [`BatchCommand`], so a whole transaction is undone
//! in a single step. Rolling back undoes the buffer in reverse and closes
//! every nesting level at once.

use std::collections::VecDeque;
use std::sync::Arc;

use cadenza_score::Score;

use crate::command::{BatchCommand, Command};
use crate::{CoreError, CoreResult};

/// Default number of undo steps kept.
pub const DEFAULT_UNDO_LIMIT: usize = 100;

/// Owns the document and its edit history.
#[derive(Debug)]
pub struct CommandEngine {
    /// Current snapshot
    state: Arc<Score>,
    /// Executed commands, oldest first
    history: VecDeque<Box<dyn Command>>,
    /// Undone commands, most recent last
    redo_stack: Vec<Box<dyn Command>>,
    /// Maximum number of undo steps
    max_size: usize,
    /// Commands dispatched inside the open transaction
    transaction: Vec<Box<dyn Command>>,
    /// Nesting level of `begin_transaction` calls
    depth: usize,
}

impl CommandEngine {
    /// Creates an engine with the default undo limit.
    pub fn new(score: impl Into<Arc<Score>>) -> Self {
        Self::with_limit(score, DEFAULT_UNDO_LIMIT)
    }

    /// Creates an engine keeping at most `max_size` undo steps.
    pub fn with_limit(score: impl Into<Arc<Score>>, max_size: usize) -> Self {
        Self {
            state: score.into(),
            history: VecDeque::new(),
            redo_stack: Vec::new(),
            max_size: max_size.max(1),
            transaction: Vec::new(),
            depth: 0,
        }
    }

    // ==================== State ====================

    /// The current snapshot.
    pub fn state(&self) -> &Arc<Score> {
        &self.state
    }

    /// Replaces the snapshot without touching history. Structurally invalid
    /// scores are refused.
    pub fn set_state(&mut self, score: impl Into<Arc<Score>>) -> CoreResult<()> {
        let score = score.into();
        if let Err(e) = score.validate() {
            tracing::warn!("Refusing invalid score: {}", e);
            return Err(CoreError::InvalidState(e));
        }
        self.state = score;
        Ok(())
    }

    // ==================== Dispatch, undo, redo ====================

    /// Executes `command` against the live snapshot.
    ///
    /// Returns `Ok(true)` if the snapshot changed and `Ok(false)` if the
    /// command was a no-op (no-ops are not recorded). On error the snapshot
    /// is left as it was and the command is dropped.
    pub fn dispatch(&mut self, mut command: Box<dyn Command>) -> CoreResult<bool> {
        tracing::debug!("Dispatching {}", command.label());
        let next = match command.execute(&self.state) {
            Ok(next) => next,
            Err(e) => {
                tracing::warn!("Command '{}' failed: {}", command.label(), e);
                return Err(CoreError::CommandFailed {
                    label: command.label().to_string(),
                    reason: e.to_string(),
                });
            }
        };

        if Arc::ptr_eq(&next, &self.state) {
            tracing::debug!("{} changed nothing", command.label());
            return Ok(false);
        }
        if let Err(e) = next.validate() {
            tracing::warn!(
                "Command '{}' produced an invalid score: {}",
                command.label(),
                e
            );
            return Err(CoreError::InvalidState(e));
        }

        self.state = next;
        self.redo_stack.clear();
        if self.depth > 0 {
            self.transaction.push(command);
        } else {
            self.record(command);
        }
        Ok(true)
    }

    /// Reverses the most recent history entry. Returns `Ok(false)` when
    /// there is nothing to undo.
    pub fn undo(&mut self) -> CoreResult<bool> {
        if self.depth > 0 {
            tracing::warn!("Undo requested inside an open transaction");
            return Err(CoreError::TransactionOpen);
        }
        let Some(mut command) = self.history.pop_back() else {
            return Ok(false);
        };

        tracing::debug!("Undoing {}", command.label());
        match Self::checked(command.undo(&self.state), command.as_ref()) {
            Ok(previous) => {
                self.state = previous;
                self.redo_stack.push(command);
                Ok(true)
            }
            Err(e) => {
                self.history.push_back(command);
                Err(e)
            }
        }
    }

    /// Re-applies the most recently undone command. Returns `Ok(false)`
    /// when there is nothing to redo.
    pub fn redo(&mut self) -> CoreResult<bool> {
        if self.depth > 0 {
            tracing::warn!("Redo requested inside an open transaction");
            return Err(CoreError::TransactionOpen);
        }
        let Some(mut command) = self.redo_stack.pop() else {
            return Ok(false);
        };

        tracing::debug!("Redoing {}", command.label());
        match Self::checked(command.execute(&self.state), command.as_ref()) {
            Ok(next) => {
                self.state = next;
                self.history.push_back(command);
                Ok(true)
            }
            Err(e) => {
                self.redo_stack.push(command);
                Err(e)
            }
        }
    }

    fn checked(result: CoreResult<Arc<Score>>, command: &dyn Command) -> CoreResult<Arc<Score>> {
        let score = result.map_err(|e| {
            tracing::warn!("Command '{}' failed: {}", command.label(), e);
            CoreError::CommandFailed {
                label: command.label().to_string(),
                reason: e.to_string(),
            }
        })?;
        score.validate().map_err(|e| {
            tracing::warn!("Command '{}' produced an invalid score: {}", command.label(), e);
            CoreError::InvalidState(e)
        })?;
        Ok(score)
    }

    fn record(&mut self, command: Box<dyn Command>) {
        self.history.push_back(command);
        while self.history.len() > self.max_size {
            self.history.pop_front();
        }
    }

    // ==================== Transactions ====================

    /// Opens a (possibly nested) transaction.
    pub fn begin_transaction(&mut self) {
        self.depth += 1;
        tracing::debug!("Transaction depth {}", self.depth);
    }

    /// Closes one nesting level. When the outermost level closes, the
    /// buffered commands become one history entry labelled `label`.
    ///
    /// Returns true if a history entry was created.
    pub fn commit_transaction(&mut self, label: Option<&str>) -> bool {
        if self.depth == 0 {
            return false;
        }
        self.depth -= 1;
        if self.depth > 0 || self.transaction.is_empty() {
            return false;
        }

        let commands = std::mem::take(&mut self.transaction);
        let batch = BatchCommand::with_label(label.unwrap_or("Transaction"), commands);
        tracing::info!("Committed '{}' ({} commands)", batch.label(), batch.len());
        self.record(Box::new(batch));
        self.redo_stack.clear();
        true
    }

    /// Undoes every buffered command in reverse order and closes all
    /// nesting levels. A buffered command that fails to undo is logged and
    /// skipped.
    ///
    /// Returns the number of commands rolled back.
    pub fn rollback_transaction(&mut self) -> usize {
        let commands = std::mem::take(&mut self.transaction);
        let count = commands.len();
        for mut command in commands.into_iter().rev() {
            match command.undo(&self.state) {
                Ok(previous) => self.state = previous,
                Err(e) => tracing::warn!("Rollback of '{}' failed: {}", command.label(), e),
            }
        }
        self.depth = 0;
        tracing::info!("Rolled back {} commands", count);
        count
    }

    pub fn in_transaction(&self) -> bool {
        self.depth > 0
    }

    pub fn transaction_depth(&self) -> usize {
        self.depth
    }

    // ==================== History queries ====================

    pub fn can_undo(&self) -> bool {
        !self.history.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_count(&self) -> usize {
        self.history.len()
    }

    pub fn redo_count(&self) -> usize {
        self.redo_stack.len()
    }

    /// Labels of the undoable commands, oldest first.
    pub fn history_labels(&self) -> Vec<&str> {
        self.history.iter().map(|c| c.label()).collect()
    }

    /// Drops all undo and redo entries.
    pub fn clear_history(&mut self) {
        self.history.clear();
        self.redo_stack.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::fixtures::melody;
    use crate::commands::{
        AddEventCommand, AddMeasureCommand, ApplyTupletCommand, DeleteEventCommand,
        SetGrandStaffCommand,
    };
    use cadenza_score::{Duration, ScoreEvent, TupletRatio};

    /// Leaves the score without staves.
    #[derive(Debug)]
    struct DropStaves;

    impl Command for DropStaves {
        fn label(&self) -> &str {
            "Drop Staves"
        }

        fn execute(&mut self, score: &Arc<Score>) -> CoreResult<Arc<Score>> {
            Ok(cadenza_score::mutate::update_score(score, |s| {
                s.staves.clear()
            }))
        }

        fn undo(&mut self, score: &Arc<Score>) -> CoreResult<Arc<Score>> {
            Ok(Arc::clone(score))
        }
    }

    fn add_rest() -> Box<dyn Command> {
        Box::new(AddEventCommand::new(
            0,
            1,
            ScoreEvent::rest(Duration::Quarter, false),
            None,
        ))
    }

    #[test]
    fn test_dispatch_undo_redo() {
        let original = melody();
        let mut engine = CommandEngine::new(Arc::clone(&original));

        assert!(engine.dispatch(add_rest()).unwrap());
        assert_eq!(engine.state().staves[0].measures[1].events.len(), 3);
        assert!(engine.can_undo());

        assert!(engine.undo().unwrap());
        assert_eq!(**engine.state(), *original);
        assert!(engine.can_redo());

        assert!(engine.redo().unwrap());
        assert_eq!(engine.state().staves[0].measures[1].events.len(), 3);
        assert!(!engine.can_redo());
    }

    #[test]
    fn test_empty_stacks_are_noops() {
        let mut engine = CommandEngine::new(melody());
        assert!(!engine.undo().unwrap());
        assert!(!engine.redo().unwrap());
    }

    #[test]
    fn test_new_dispatch_clears_redo() {
        let mut engine = CommandEngine::new(melody());
        engine.dispatch(add_rest()).unwrap();
        engine.undo().unwrap();
        assert_eq!(engine.redo_count(), 1);
        engine.dispatch(add_rest()).unwrap();
        assert_eq!(engine.redo_count(), 0);
    }

    #[test]
    fn test_noop_is_not_recorded() {
        let mut engine = CommandEngine::new(melody());
        engine.dispatch(Box::new(SetGrandStaffCommand::new())).unwrap();
        let before = Arc::clone(engine.state());

        assert!(!engine.dispatch(Box::new(SetGrandStaffCommand::new())).unwrap());
        assert!(Arc::ptr_eq(&before, engine.state()));
        assert_eq!(engine.undo_count(), 1);
    }

    #[test]
    fn test_invalid_result_is_rejected() {
        let original = melody();
        let mut engine = CommandEngine::new(Arc::clone(&original));
        let result = engine.dispatch(Box::new(DropStaves));
        assert!(matches!(result, Err(CoreError::InvalidState(_))));
        assert!(Arc::ptr_eq(&original, engine.state()));
        assert!(!engine.can_undo());
    }

    #[test]
    fn test_failing_command_leaves_state() {
        let original = melody();
        let mut engine = CommandEngine::new(Arc::clone(&original));
        let command = ApplyTupletCommand::new(0, 0, 0, 3, TupletRatio::new(0, 2));
        assert!(matches!(
            engine.dispatch(Box::new(command)),
            Err(CoreError::CommandFailed { .. })
        ));
        assert!(Arc::ptr_eq(&original, engine.state()));
    }

    #[test]
    fn test_deleting_a_tuplet_member_is_rejected() {
        let mut engine = CommandEngine::new(melody());
        let apply = ApplyTupletCommand::new(0, 0, 0, 3, TupletRatio::TRIPLET);
        assert!(engine.dispatch(Box::new(apply)).unwrap());
        let grouped = Arc::clone(engine.state());

        let middle = grouped.staves[0].measures[0].events[1].id.clone();
        let result = engine.dispatch(Box::new(DeleteEventCommand::new(0, 0, middle)));
        assert!(matches!(result, Err(CoreError::InvalidState(_))));
        assert!(Arc::ptr_eq(&grouped, engine.state()));
        assert_eq!(engine.undo_count(), 1);

        let outside = grouped.staves[0].measures[0].events[3].id.clone();
        assert!(engine.dispatch(Box::new(DeleteEventCommand::new(0, 0, outside))).unwrap());
    }

    #[test]
    fn test_set_state_validates() {
        let mut engine = CommandEngine::new(melody());
        let mut broken = Score::default();
        broken.staves.clear();
        assert!(engine.set_state(broken).is_err());
        assert_eq!(engine.state().staves.len(), 1);

        engine.set_state(Score::default()).unwrap();
        assert_eq!(engine.state().measure_count(), 1);
    }

    #[test]
    fn test_transaction_is_one_undo_step() {
        let original = melody();
        let mut engine = CommandEngine::new(Arc::clone(&original));

        engine.begin_transaction();
        engine.dispatch(Box::new(AddMeasureCommand::new())).unwrap();
        engine.dispatch(add_rest()).unwrap();
        assert_eq!(engine.state().measure_count(), 3);
        assert!(!engine.can_undo());

        assert!(engine.commit_transaction(Some("Append")));
        assert_eq!(engine.history_labels(), vec!["Append"]);

        engine.undo().unwrap();
        assert_eq!(**engine.state(), *original);
    }

    #[test]
    fn test_nested_commit_waits_for_outermost() {
        let mut engine = CommandEngine::new(melody());
        engine.begin_transaction();
        engine.begin_transaction();
        engine.dispatch(add_rest()).unwrap();

        assert!(!engine.commit_transaction(None));
        assert!(engine.in_transaction());
        assert!(engine.commit_transaction(None));
        assert!(!engine.in_transaction());
        assert_eq!(engine.undo_count(), 1);
        assert!(!engine.commit_transaction(None));
    }

    #[test]
    fn test_rollback_restores_and_resets_depth() {
        let original = melody();
        let mut engine = CommandEngine::new(Arc::clone(&original));
        let first = original.staves[0].measures[0].events[0].id.clone();

        engine.begin_transaction();
        engine.begin_transaction();
        engine.dispatch(Box::new(DeleteEventCommand::new(0, 0, first))).unwrap();
        engine.dispatch(add_rest()).unwrap();

        assert_eq!(engine.rollback_transaction(), 2);
        assert_eq!(engine.transaction_depth(), 0);
        assert_eq!(**engine.state(), *original);
        assert!(!engine.can_undo());
    }

    #[test]
    fn test_undo_refused_inside_transaction() {
        let mut engine = CommandEngine::new(melody());
        engine.dispatch(add_rest()).unwrap();
        engine.begin_transaction();
        assert!(matches!(engine.undo(), Err(CoreError::TransactionOpen)));
        engine.commit_transaction(None);
        assert!(engine.undo().unwrap());
    }

    #[test]
    fn test_history_is_bounded() {
        let mut engine = CommandEngine::with_limit(melody(), 2);
        for _ in 0..3 {
            engine.dispatch(add_rest()).unwrap();
        }
        assert_eq!(engine.undo_count(), 2);
        engine.undo().unwrap();
        engine.undo().unwrap();
        assert!(!engine.undo().unwrap());
        assert_eq!(engine.state().staves[0].measures[1].events.len(), 3);
    }

    mod properties {
        use std::sync::Arc;

        use proptest::prelude::*;

        use crate::commands::ChromaticTransposeCommand;
        use crate::commands::fixtures::{melody, target};
        use crate::engine::CommandEngine;

        proptest! {
            #[test]
            fn prop_undo_all_then_redo_all(
                ops in proptest::collection::vec((0usize..4, -12i32..12), 1..20)
            ) {
                let original = melody();
                let mut engine = CommandEngine::new(Arc::clone(&original));
                let mut recorded = 0;
                for (event, semitones) in ops {
                    let note = target(engine.state(), 0, 0, event);
                    let command = ChromaticTransposeCommand::new(vec![note], semitones);
                    if engine.dispatch(Box::new(command)).unwrap() {
                        recorded += 1;
                    }
                }
                let edited = Arc::clone(engine.state());
                prop_assert_eq!(engine.undo_count(), recorded);

                while engine.undo().unwrap() {}
                prop_assert_eq!(engine.state(), &original);
                while engine.redo().unwrap() {}
                prop_assert_eq!(engine.state(), &edited);
            }
        }
    }
}
