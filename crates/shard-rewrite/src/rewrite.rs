//! Rewriter contract and the default decorator-attaching implementation.

use std::sync::Arc;

use shard_core::{config::ShardingRule, error::ShardingError, route::RouteResult};
use tracing::debug;

use crate::{
    ast::{Expr, LogicOp, TableExpr, TableName},
    decorator::TableNameDecorator,
    lookup::ExplainContext,
};

/// Outcome of a table-reference rewrite decision.
#[derive(Debug)]
pub enum TableRewrite {
    Unchanged,
    Replace(TableExpr),
}

impl TableRewrite {
    pub fn is_rewritten(&self) -> bool {
        matches!(self, TableRewrite::Replace(_))
    }
}

/// Rewriting policy invoked by the explainer. The explainer only guarantees
/// when and with which context these hooks run; the policy decides what (if
/// anything) changes.
pub trait Rewriter {
    fn rewrite_table(
        &self,
        name: &TableName,
        context: &ExplainContext,
    ) -> Result<TableRewrite, ShardingError>;

    /// `Ok(None)` leaves the condition untouched; the `combinator` names the
    /// logical shape the replacement must keep (a single top-level AND for
    /// WHERE and ON clauses).
    fn rewrite_condition(
        &self,
        expr: &Expr,
        context: &ExplainContext,
        combinator: LogicOp,
    ) -> Result<Option<Expr>, ShardingError>;
}

/// Default rewriter: every table reference that resolves to a sharding rule
/// gets exactly one render-time decorator bound to the shared route result;
/// unsharded tables and conditions pass through unchanged.
#[derive(Debug, Clone)]
pub struct ShardingRewriter {
    rule: Arc<ShardingRule>,
    route: Arc<RouteResult>,
}

impl ShardingRewriter {
    pub fn new(rule: Arc<ShardingRule>, route: Arc<RouteResult>) -> Self {
        Self { rule, route }
    }

    /// The route cell shared with every decorator this rewriter attaches.
    pub fn route(&self) -> &Arc<RouteResult> {
        &self.route
    }
}

impl Rewriter for ShardingRewriter {
    fn rewrite_table(
        &self,
        name: &TableName,
        _context: &ExplainContext,
    ) -> Result<TableRewrite, ShardingError> {
        let Some(sharding) = self.rule.table(&name.name) else {
            return Ok(TableRewrite::Unchanged);
        };
        debug!(table = %name.name, rule_type = sharding.rule_type().as_str(), "attaching shard decorator");
        let decorator = TableNameDecorator::new(name.clone(), sharding, Arc::clone(&self.route))?;
        Ok(TableRewrite::Replace(TableExpr::Decorated(decorator)))
    }

    fn rewrite_condition(
        &self,
        _expr: &Expr,
        _context: &ExplainContext,
        _combinator: LogicOp,
    ) -> Result<Option<Expr>, ShardingError> {
        Ok(None)
    }
}
