//! Shard-aware rendering wrapper for table-name nodes.

use std::sync::Arc;

use shard_core::{
    error::ShardingError,
    route::RouteResult,
    sharding::{ShardingRuleType, ShardingTable},
};

use crate::ast::{Restore, RestoreCtx, TableName, Visitor};

/// Wraps one original table-name node and overrides only its textual
/// rendering; identity, traversal and text round-tripping stay with the
/// wrapped node.
///
/// Render output is deferred to the shared [`RouteResult`]: the execution
/// driver selects a physical index between passes, and each pass re-renders
/// this decorator against the then-current index without re-analysis.
#[derive(Debug, Clone)]
pub struct TableNameDecorator {
    origin: TableName,
    sharding: Arc<ShardingTable>,
    route: Arc<RouteResult>,
}

impl TableNameDecorator {
    /// Partition-name hints are incompatible with shard rewriting, so a
    /// partitioned table reference refuses decoration outright.
    pub fn new(
        origin: TableName,
        sharding: Arc<ShardingTable>,
        route: Arc<RouteResult>,
    ) -> Result<Self, ShardingError> {
        if !origin.partition_names.is_empty() {
            return Err(ShardingError::UnsupportedPartitionSyntax(
                origin.name.clone(),
            ));
        }
        Ok(Self {
            origin,
            sharding,
            route,
        })
    }

    pub fn origin(&self) -> &TableName {
        &self.origin
    }

    /// Removes the decoration, handing back the untouched original node.
    pub fn into_inner(self) -> TableName {
        self.origin
    }

    pub fn sharding(&self) -> &Arc<ShardingTable> {
        &self.sharding
    }

    pub fn text(&self) -> &str {
        self.origin.text()
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.origin.set_text(text);
    }

    /// Visits pass through to the original node; decoration only affects
    /// rendering.
    pub fn accept<V: Visitor + ?Sized>(&self, visitor: &mut V) {
        self.origin.accept(visitor);
    }
}

impl Restore for TableNameDecorator {
    fn restore(&self, ctx: &mut RestoreCtx) -> Result<(), ShardingError> {
        let table_index = self.route.current_table_index()?;

        match self.sharding.rule_type() {
            // Global and mycat-style rules express the partition through the
            // database qualifier and keep the table name untouched.
            ShardingRuleType::Global | ShardingRuleType::MycatShard => {
                let database = self.sharding.database_name_by_index(table_index)?;
                ctx.write_name(database);
                ctx.write_plain(".");
                ctx.write_name(&self.origin.name);
            }
            // Kingshard-style rules suffix the table name and keep whatever
            // schema qualifier the statement already carried.
            ShardingRuleType::KingshardShard => {
                if let Some(schema) = &self.origin.schema {
                    ctx.write_name(schema);
                    ctx.write_plain(".");
                }
                ctx.write_name(
                    &self
                        .sharding
                        .physical_table_name_for(&self.origin.name, table_index),
                );
            }
        }

        for hint in &self.origin.index_hints {
            ctx.write_plain(" ");
            hint.restore(ctx)?;
        }
        Ok(())
    }
}
