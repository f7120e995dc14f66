//! Transaction nesting state shared by every driver.
//!
//! Only the outermost `begin` and the matching final `commit`/`rollback`
//! touch the native transaction. Everything in between moves a counter.
//!
//! A rollback at depth > 1 only decrements the counter: nested levels share
//! the single native transaction and cannot be undone on their own.

use crate::error::{DbError, DbResult};

/// What a depth change requires from the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Crossed 0→1 or 1→0: issue the native command.
    Native,
    /// Stayed inside an open native transaction.
    Nested,
}

#[derive(Debug, Default, Clone)]
pub struct TransactionDepth {
    depth: u32,
}

impl TransactionDepth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn is_active(&self) -> bool {
        self.depth > 0
    }

    /// Record a `begin`.
    pub fn enter(&mut self) -> DbResult<Transition> {
        self.depth = self
            .depth
            .checked_add(1)
            .ok_or_else(|| DbError::illegal_state("transaction nesting depth overflow"))?;
        Ok(if self.depth == 1 {
            Transition::Native
        } else {
            Transition::Nested
        })
    }

    /// Undo an `enter` whose native BEGIN failed.
    pub fn revert_enter(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    /// Record a `commit` or `rollback`.
    ///
    /// Returns `None` at depth 0; the caller treats that as a no-op.
    pub fn leave(&mut self) -> Option<Transition> {
        if self.depth == 0 {
            return None;
        }
        self.depth -= 1;
        Some(if self.depth == 0 {
            Transition::Native
        } else {
            Transition::Nested
        })
    }

    /// Undo a `leave` whose native COMMIT or ROLLBACK failed; the native
    /// transaction is still open.
    pub fn revert_leave(&mut self) {
        self.depth = self.depth.saturating_add(1);
    }

    /// Forget all levels, e.g. after the native connection went away.
    pub fn reset(&mut self) -> u32 {
        std::mem::take(&mut self.depth)
    }
}
