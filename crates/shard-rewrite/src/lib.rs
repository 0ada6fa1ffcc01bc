//! Statement analysis and rewrite decoration for the Shard Bridge SQL
//! middleware.
//!
//! A parsed SELECT goes through the [`explain::SqlExplain`] driver once: the
//! explainer validates the statement shape for shardability, registers every
//! table reference in the per-scope lookup and lets the injected
//! [`rewrite::Rewriter`] attach [`decorator::TableNameDecorator`] wrappers to
//! sharded table names. The decorated tree then renders once per physical
//! target by mutating the shared route cell between passes, with no
//! re-parsing and no re-analysis.

pub mod ast;
pub mod decorator;
pub mod explain;
pub mod lookup;
pub mod parser;
pub mod render;
pub mod rewrite;

pub use ast::{render_sql, Restore, RestoreCtx, RestoreFlags, SelectStmt};
pub use decorator::TableNameDecorator;
pub use explain::{SqlExplain, SqlExplainOptions};
pub use lookup::{ExplainContext, TableLookup, TableLookupEntry};
pub use parser::parse_select;
pub use render::render_targets;
pub use rewrite::{Rewriter, ShardingRewriter, TableRewrite};
