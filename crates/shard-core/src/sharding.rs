//! Logical-to-physical sharding table model.

use std::{str::FromStr, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{error::ShardingError, strategy::ShardingStrategy};

/// Naming/qualification convention governing how a logical table maps to
/// physical schema and table names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShardingRuleType {
    /// Unsharded table replicated to every backend; qualified with the shared
    /// physical database, table name left untouched.
    Global,
    /// Partitioning expressed through per-index physical databases; the table
    /// name itself is never suffixed.
    MycatShard,
    /// Partitioning expressed through a numeric table-name suffix
    /// (`orders` + index 7 → `orders_0007`); schema qualifier preserved.
    KingshardShard,
}

impl ShardingRuleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShardingRuleType::Global => "global",
            ShardingRuleType::MycatShard => "mycat_shard",
            ShardingRuleType::KingshardShard => "kingshard_shard",
        }
    }
}

impl FromStr for ShardingRuleType {
    type Err = ShardingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "global" => Ok(ShardingRuleType::Global),
            "mycat_shard" => Ok(ShardingRuleType::MycatShard),
            "kingshard_shard" => Ok(ShardingRuleType::KingshardShard),
            other => Err(ShardingError::InvalidStrategyConfig(format!(
                "unknown sharding rule type '{other}'"
            ))),
        }
    }
}

/// Static description of one logical table: its rule type, physical layout
/// and the strategy that computes indexes for DML/DQL predicates.
///
/// Immutable after configuration load; shared read-only (behind `Arc`) by all
/// concurrent statement analyses.
#[derive(Debug, Clone)]
pub struct ShardingTable {
    name: String,
    rule_type: ShardingRuleType,
    databases: Vec<String>,
    table_count: usize,
    strategy: Arc<dyn ShardingStrategy>,
}

impl ShardingTable {
    pub fn new(
        name: impl Into<String>,
        rule_type: ShardingRuleType,
        databases: Vec<String>,
        table_count: usize,
        strategy: Arc<dyn ShardingStrategy>,
    ) -> Result<Self, ShardingError> {
        let name = name.into();
        if databases.is_empty() {
            return Err(ShardingError::InvalidStrategyConfig(format!(
                "table '{name}' declares no physical databases"
            )));
        }
        if table_count == 0 {
            return Err(ShardingError::InvalidStrategyConfig(format!(
                "table '{name}' declares zero physical partitions"
            )));
        }
        Ok(Self {
            name,
            rule_type,
            databases,
            table_count,
            strategy,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rule_type(&self) -> ShardingRuleType {
        self.rule_type
    }

    pub fn databases(&self) -> &[String] {
        &self.databases
    }

    pub fn table_count(&self) -> usize {
        self.table_count
    }

    pub fn strategy(&self) -> &Arc<dyn ShardingStrategy> {
        &self.strategy
    }

    /// False for `Global` tables, which live whole on every backend.
    pub fn is_sharded(&self) -> bool {
        self.rule_type != ShardingRuleType::Global
    }

    /// Physical database name serving the given physical index. A `Global`
    /// table with a single shared database serves it for every index.
    pub fn database_name_by_index(&self, index: usize) -> Result<&str, ShardingError> {
        if let Some(db) = self.databases.get(index) {
            return Ok(db);
        }
        if self.rule_type == ShardingRuleType::Global {
            if let Some(db) = self.databases.first() {
                return Ok(db);
            }
        }
        Err(ShardingError::ShardIndexOutOfRange {
            table: self.name.clone(),
            index,
        })
    }

    /// Physical table name for the given index under this rule type. Only the
    /// kingshard convention suffixes the logical name.
    pub fn physical_table_name(&self, index: usize) -> String {
        self.physical_table_name_for(&self.name, index)
    }

    /// Like [`physical_table_name`](Self::physical_table_name), but applied to
    /// an arbitrary base name, e.g. the spelling a statement actually used.
    pub fn physical_table_name_for(&self, base: &str, index: usize) -> String {
        match self.rule_type {
            ShardingRuleType::KingshardShard => format!("{base}_{index:04}"),
            ShardingRuleType::Global | ShardingRuleType::MycatShard => base.to_owned(),
        }
    }
}
