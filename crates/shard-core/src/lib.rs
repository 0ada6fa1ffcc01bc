//! Sharding data model for the Shard Bridge SQL middleware.
//!
//! This crate owns everything the statement analyzer reads but never parses:
//! the per-table sharding rules and their copy-on-write configuration
//! snapshot, the pluggable sharding-key strategy registry, the per-execution
//! route target cell consulted at render time, and the shared error taxonomy.
//! The syntax-tree analysis and rewrite machinery lives in `shard-rewrite`.

pub mod config;
pub mod error;
pub mod route;
pub mod sharding;
pub mod strategy;

pub use config::{DataSource, Settings, SettingsConfig, SettingsHandle, ShardingRule};
pub use error::ShardingError;
pub use route::{RouteResult, RouteTarget};
pub use sharding::{ShardingRuleType, ShardingTable};
pub use strategy::{Properties, ShardKey, ShardingStrategy, StrategyFactory, StrategyRegistry};
