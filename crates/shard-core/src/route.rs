//! Per-execution route target cell consulted by rewrite decorators.

use parking_lot::RwLock;

use crate::error::ShardingError;

/// One selected physical shard target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteTarget {
    pub database_index: usize,
    pub table_index: usize,
}

impl RouteTarget {
    pub fn new(database_index: usize, table_index: usize) -> Self {
        Self {
            database_index,
            table_index,
        }
    }
}

/// Mutable single-writer cell holding the currently selected physical target
/// for one statement's rendering passes.
///
/// Every decorator of a statement shares one instance (behind `Arc`) and only
/// reads it; the execution driver mutates it between sequential render
/// passes. The unset state is explicit so that a render attempted before
/// target selection fails with [`ShardingError::RouteIndexUnset`] instead of
/// silently defaulting to index 0. Never shared across statements.
#[derive(Debug, Default)]
pub struct RouteResult {
    current: RwLock<Option<RouteTarget>>,
}

impl RouteResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Selects the target for the next render pass.
    pub fn set_target(&self, target: RouteTarget) {
        *self.current.write() = Some(target);
    }

    /// Returns the cell to the unset state (between statements, or after the
    /// last render pass).
    pub fn clear(&self) {
        *self.current.write() = None;
    }

    pub fn is_set(&self) -> bool {
        self.current.read().is_some()
    }

    pub fn current(&self) -> Result<RouteTarget, ShardingError> {
        self.current.read().ok_or(ShardingError::RouteIndexUnset)
    }

    pub fn current_table_index(&self) -> Result<usize, ShardingError> {
        Ok(self.current()?.table_index)
    }

    pub fn current_database_index(&self) -> Result<usize, ShardingError> {
        Ok(self.current()?.database_index)
    }
}
