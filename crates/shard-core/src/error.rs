//! Error taxonomy shared by the sharding model and the rewrite engine.

use thiserror::Error;

/// Reasons a statement cannot be sharded (or a rendering pass cannot proceed).
///
/// Every variant is non-retryable: the engine never retries internally, and a
/// failed analysis leaves the partially rewritten tree unusable. Callers must
/// discard it rather than execute it.
#[derive(Debug, Error)]
pub enum ShardingError {
    /// A mandatory clause is missing from the statement.
    #[error("select statement is missing mandatory clause: {0}")]
    MalformedQuery(&'static str),

    /// The join tree is not the supported binary shape (nesting on one side).
    #[error("join shape is not shardable: only binary joins with nesting on one side are supported")]
    UnsupportedJoinShape,

    /// Syntax that cannot be resolved statically across shards.
    #[error("unsupported sharding syntax: {0}")]
    UnsupportedShardingSyntax(String),

    /// Partitioned-table syntax is incompatible with shard rewriting.
    #[error("table '{0}' uses partition syntax, which cannot be sharded")]
    UnsupportedPartitionSyntax(String),

    #[error("unsupported table source: {0}")]
    UnsupportedTableSource(&'static str),

    #[error("invalid table source: {0}")]
    InvalidTableSource(&'static str),

    /// Sub-queries are disabled by configuration (max depth zero).
    #[error("sub-queries are not supported")]
    SubqueriesNotSupported,

    /// The statement nests sub-queries deeper than the configured maximum.
    #[error("sub-query nesting exceeds the configured maximum of {max}")]
    SubqueryDepthExceeded { max: u32 },

    /// Rendering was attempted before the execution driver selected a target.
    /// A sequencing bug in the caller, not a user-facing query error.
    #[error("no route target selected before rendering")]
    RouteIndexUnset,

    /// Declarative strategy configuration is missing or malformed.
    #[error("invalid sharding strategy configuration: {0}")]
    InvalidStrategyConfig(String),

    /// No factory is registered under the requested strategy name.
    #[error("unknown sharding strategy '{0}'")]
    UnknownStrategy(String),

    /// A computed physical index has no matching physical database.
    #[error("physical index {index} is out of range for table '{table}'")]
    ShardIndexOutOfRange { table: String, index: usize },
}

impl ShardingError {
    /// True for internal invariant violations, as opposed to statement
    /// rejections that should be reported back to the client.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            ShardingError::RouteIndexUnset | ShardingError::ShardIndexOutOfRange { .. }
        )
    }
}
