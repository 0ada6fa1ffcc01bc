//! Per-scope table discovery accumulated during statement analysis.

use std::sync::Arc;

use shard_core::{config::ShardingRule, error::ShardingError, sharding::ShardingTable};

use crate::ast::{TableExpr, TableName, TableSource};

/// One discovered table reference: the original node, its alias and its
/// resolved sharding table (if any).
#[derive(Debug, Clone)]
pub struct TableLookupEntry {
    pub table: TableName,
    pub alias: Option<String>,
    pub sharding: Option<Arc<ShardingTable>>,
    /// Left-to-right appearance order in the source statement.
    pub position: usize,
}

/// Ordered sequence of table references discovered in one scope. Condition
/// rewriting and routing-index computation read it after analysis.
#[derive(Debug, Default)]
pub struct TableLookup {
    entries: Vec<TableLookupEntry>,
}

impl TableLookup {
    /// Registers a plain table source, resolving it against the sharding
    /// configuration.
    pub fn add_table(
        &mut self,
        source: &TableSource,
        rule: &ShardingRule,
    ) -> Result<(), ShardingError> {
        let name = match &source.source {
            TableExpr::Name(name) => name,
            TableExpr::Decorated(_) | TableExpr::Subquery(_) => {
                return Err(ShardingError::InvalidTableSource(
                    "only plain table names can be registered in the lookup",
                ))
            }
        };
        let sharding = rule.table(&name.name);
        self.entries.push(TableLookupEntry {
            table: name.clone(),
            alias: source.alias.clone(),
            sharding,
            position: self.entries.len(),
        });
        Ok(())
    }

    pub fn entries(&self) -> &[TableLookupEntry] {
        &self.entries
    }

    /// Entries that resolved to a sharding rule.
    pub fn sharded(&self) -> impl Iterator<Item = &TableLookupEntry> {
        self.entries.iter().filter(|e| e.sharding.is_some())
    }

    pub fn first_sharded(&self) -> Option<&TableLookupEntry> {
        self.sharded().next()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Analysis scope for one statement or sub-query. Scopes form a stack: the
/// explainer pushes on sub-query entry and pops on exit.
#[derive(Debug, Default)]
pub struct ExplainContext {
    lookup: TableLookup,
}

impl ExplainContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table_lookup(&self) -> &TableLookup {
        &self.lookup
    }

    pub(crate) fn table_lookup_mut(&mut self) -> &mut TableLookup {
        &mut self.lookup
    }
}
