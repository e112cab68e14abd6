//! Undo/redo history of reversible commands
//!
//! A command is a pair of actions over some state `S`: one that applies an
//! edit and one that reverts it. Commands run immediately when executed and
//! are then recorded. A composite command groups every command executed
//! between `begin_composite` and the matching `end_composite` into a single
//! history entry; composites nest, and only the outermost one commits.

use std::rc::Rc;

use workflow_graph::GraphError;

use crate::error::CommandError;

/// A recorded edit over the state `S`
pub type Action<S> = Rc<dyn Fn(&mut S) -> Result<(), GraphError>>;

struct Command<S> {
    execute: Vec<Action<S>>,
    /// `None` for irreversible commands
    undo: Option<Vec<Action<S>>>,
}

impl<S> Command<S> {
    fn new() -> Self {
        Self {
            execute: Vec::new(),
            undo: Some(Vec::new()),
        }
    }

    fn redo(&self, state: &mut S) -> Result<(), GraphError> {
        for action in &self.execute {
            action(state)?;
        }
        Ok(())
    }

    fn undo(&self, state: &mut S) -> Result<(), GraphError> {
        if let Some(undo) = &self.undo {
            for action in undo.iter().rev() {
                action(state)?;
            }
        }
        Ok(())
    }
}

/// Undo/redo stack of reversible commands
pub struct CommandExecutor<S> {
    history: Vec<Command<S>>,
    /// Number of history entries currently applied
    current: usize,
    composite: Option<Command<S>>,
    depth: usize,
    limit: Option<usize>,
}

impl<S> Default for CommandExecutor<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> CommandExecutor<S> {
    /// Create an executor with unbounded history
    pub fn new() -> Self {
        Self {
            history: Vec::new(),
            current: 0,
            composite: None,
            depth: 0,
            limit: None,
        }
    }

    /// Create an executor keeping at most `limit` history entries
    pub fn with_limit(limit: Option<usize>) -> Self {
        Self {
            limit: limit.map(|limit| limit.max(1)),
            ..Self::new()
        }
    }

    /// Run an action and record it together with its inverse.
    pub fn execute(
        &mut self,
        state: &mut S,
        command: impl Fn(&mut S) -> Result<(), GraphError> + 'static,
        undo: impl Fn(&mut S) -> Result<(), GraphError> + 'static,
    ) -> Result<(), CommandError> {
        self.record(state, Rc::new(command), Some(Rc::new(undo)))
    }

    /// Run an action that cannot be undone.
    ///
    /// Committing it clears the whole history, including the redo stack.
    pub fn execute_irreversible(
        &mut self,
        state: &mut S,
        command: impl Fn(&mut S) -> Result<(), GraphError> + 'static,
    ) -> Result<(), CommandError> {
        self.record(state, Rc::new(command), None)
    }

    fn record(
        &mut self,
        state: &mut S,
        command: Action<S>,
        undo: Option<Action<S>>,
    ) -> Result<(), CommandError> {
        command(state)?;
        match &mut self.composite {
            Some(composite) => {
                composite.execute.push(command);
                match (&mut composite.undo, undo) {
                    (Some(actions), Some(undo)) => actions.push(undo),
                    (slot, _) => *slot = None,
                }
                Ok(())
            }
            None => {
                self.push(Command {
                    execute: vec![command],
                    undo: undo.map(|undo| vec![undo]),
                });
                Ok(())
            }
        }
    }

    fn push(&mut self, command: Command<S>) {
        if command.undo.is_none() {
            log::trace!("Irreversible command committed, clearing history");
            self.history.clear();
            self.current = 0;
            return;
        }

        self.history.truncate(self.current);
        self.history.push(command);
        if let Some(limit) = self.limit {
            if self.history.len() > limit {
                let excess = self.history.len() - limit;
                self.history.drain(..excess);
            }
        }
        self.current = self.history.len();
    }

    /// Open a composite command. Calls may nest.
    pub fn begin_composite(&mut self) {
        if self.depth == 0 {
            self.composite = Some(Command::new());
        }
        self.depth += 1;
    }

    /// Close a composite command.
    ///
    /// Only the outermost call commits the accumulated actions as a single
    /// history entry, truncating any redo history.
    pub fn end_composite(&mut self) -> Result<(), CommandError> {
        if self.depth == 0 {
            return Err(CommandError::NoComposite);
        }
        self.depth -= 1;
        if self.depth == 0 {
            if let Some(composite) = self.composite.take() {
                if !composite.execute.is_empty() || composite.undo.is_none() {
                    self.push(composite);
                }
            }
        }
        Ok(())
    }

    /// Whether a composite command is open
    pub fn in_composite(&self) -> bool {
        self.depth > 0
    }

    /// Revert the last command. Returns `false` if there was nothing to undo.
    pub fn undo(&mut self, state: &mut S) -> Result<bool, CommandError> {
        self.undo_internal(state, true)
    }

    /// Revert the last command and discard it together with the redo history.
    pub fn undo_discard(&mut self, state: &mut S) -> Result<bool, CommandError> {
        self.undo_internal(state, false)
    }

    fn undo_internal(&mut self, state: &mut S, allow_redo: bool) -> Result<bool, CommandError> {
        if self.in_composite() {
            return Err(CommandError::CompositeInProgress("undo"));
        }
        if self.current == 0 {
            return Ok(false);
        }

        self.current -= 1;
        self.history[self.current].undo(state)?;
        if !allow_redo {
            self.history.truncate(self.current);
        }
        log::trace!("Undo: {} of {} commands applied", self.current, self.history.len());
        Ok(true)
    }

    /// Re-apply the next undone command. Returns `false` if there was none.
    pub fn redo(&mut self, state: &mut S) -> Result<bool, CommandError> {
        if self.in_composite() {
            return Err(CommandError::CompositeInProgress("redo"));
        }
        if self.current >= self.history.len() {
            return Ok(false);
        }

        self.history[self.current].redo(state)?;
        self.current += 1;
        log::trace!("Redo: {} of {} commands applied", self.current, self.history.len());
        Ok(true)
    }

    pub fn can_undo(&self) -> bool {
        !self.in_composite() && self.current > 0
    }

    pub fn can_redo(&self) -> bool {
        !self.in_composite() && self.current < self.history.len()
    }

    /// Number of recorded commands, applied or undone
    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Drop all recorded commands
    pub fn clear(&mut self) -> Result<(), CommandError> {
        if self.in_composite() {
            return Err(CommandError::CompositeInProgress("clear"));
        }
        self.history.clear();
        self.current = 0;
        Ok(())
    }
}
