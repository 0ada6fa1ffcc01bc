//! Declarative configuration and the copy-on-write settings snapshot.
//!
//! The surrounding proxy loads (and reloads) configuration; this module only
//! compiles the declarative form into immutable runtime state and hands out
//! consistent snapshots. A reload replaces the whole snapshot atomically so
//! in-flight analyses keep reading the rule set they started with.

use std::{collections::HashMap, sync::Arc};

use anyhow::{bail, Context, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    sharding::{ShardingRuleType, ShardingTable},
    strategy::{Properties, StrategyRegistry},
};

/// One physical backend endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSource {
    pub name: String,
    pub address: String,
}

/// Logical table name → sharding table mapping for one snapshot.
#[derive(Debug, Default)]
pub struct ShardingRule {
    tables: HashMap<String, Arc<ShardingTable>>,
}

impl ShardingRule {
    /// Inserts a table, returning the previous entry under the same logical
    /// name if any.
    pub fn insert(&mut self, table: ShardingTable) -> Option<Arc<ShardingTable>> {
        self.tables
            .insert(table.name().to_owned(), Arc::new(table))
    }

    pub fn table(&self, name: &str) -> Option<Arc<ShardingTable>> {
        self.tables.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// One immutable configuration snapshot.
#[derive(Debug, Default)]
pub struct Settings {
    pub data_sources: HashMap<String, DataSource>,
    pub sharding_rule: Arc<ShardingRule>,
}

/// Declarative strategy reference inside a table definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub name: String,
    #[serde(default)]
    pub properties: Properties,
}

/// Declarative definition of one logical table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableConfig {
    pub name: String,
    pub rule_type: ShardingRuleType,
    pub databases: Vec<String>,
    #[serde(default = "default_table_count")]
    pub table_count: usize,
    pub strategy: StrategyConfig,
}

fn default_table_count() -> usize {
    1
}

/// Top-level declarative configuration document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsConfig {
    #[serde(default)]
    pub data_sources: Vec<DataSource>,
    #[serde(default)]
    pub tables: Vec<TableConfig>,
}

impl SettingsConfig {
    /// Compiles the declarative form into a runtime snapshot, resolving each
    /// table's strategy through the registry.
    pub fn build(&self, registry: &StrategyRegistry) -> Result<Settings> {
        let mut data_sources = HashMap::new();
        for source in &self.data_sources {
            if data_sources
                .insert(source.name.clone(), source.clone())
                .is_some()
            {
                bail!("duplicate data source '{}'", source.name);
            }
        }

        let mut rule = ShardingRule::default();
        for table in &self.tables {
            let strategy = registry
                .create(&table.strategy.name, &table.strategy.properties)
                .with_context(|| format!("building strategy for table '{}'", table.name))?;
            let sharding_table = ShardingTable::new(
                table.name.clone(),
                table.rule_type,
                table.databases.clone(),
                table.table_count,
                strategy,
            )
            .with_context(|| format!("building sharding table '{}'", table.name))?;
            if rule.insert(sharding_table).is_some() {
                bail!("duplicate sharding table '{}'", table.name);
            }
        }

        debug!(
            tables = rule.len(),
            data_sources = data_sources.len(),
            "compiled sharding settings"
        );
        Ok(Settings {
            data_sources,
            sharding_rule: Arc::new(rule),
        })
    }
}

/// Process-wide settings cell. Readers clone an `Arc` snapshot; a reload
/// swaps the whole snapshot in one write, never mutating fields in place.
#[derive(Debug, Default)]
pub struct SettingsHandle {
    inner: RwLock<Arc<Settings>>,
}

impl SettingsHandle {
    pub fn new(settings: Settings) -> Self {
        Self {
            inner: RwLock::new(Arc::new(settings)),
        }
    }

    pub fn current(&self) -> Arc<Settings> {
        self.inner.read().clone()
    }

    pub fn replace(&self, settings: Settings) {
        *self.inner.write() = Arc::new(settings);
    }
}
