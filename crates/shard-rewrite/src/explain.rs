//! Statement shape validation and rewrite driving.
//!
//! The explainer walks FROM/JOIN/WHERE/ON clauses of a parsed statement,
//! enforces the cross-shard-safety restrictions (join shape, USING-clause
//! qualification, sub-query depth), registers every discovered table in the
//! current scope's lookup and invokes the injected [`Rewriter`] on each table
//! reference and condition. One instance analyzes one top-level statement.

use std::sync::Arc;

use shard_core::{config::ShardingRule, error::ShardingError};
use tracing::debug;

use crate::{
    ast::{ColumnName, Expr, Join, JoinSide, LogicOp, SelectStmt, TableExpr, TableSource},
    lookup::ExplainContext,
    rewrite::{Rewriter, TableRewrite},
};

/// Knobs bounding what the explainer accepts.
#[derive(Debug, Clone, Copy)]
pub struct SqlExplainOptions {
    /// Maximum aggregate sub-query nesting across the whole statement; zero
    /// disables sub-queries entirely.
    pub max_subquery_depth: u32,
}

impl Default for SqlExplainOptions {
    fn default() -> Self {
        Self {
            max_subquery_depth: 5,
        }
    }
}

/// Per-statement analysis driver. Owns the scope stack and the monotonic
/// statement-wide sub-query depth counter.
#[derive(Debug)]
pub struct SqlExplain {
    rule: Arc<ShardingRule>,
    options: SqlExplainOptions,
    contexts: Vec<ExplainContext>,
    subquery_depth: u32,
}

impl SqlExplain {
    pub fn new(rule: Arc<ShardingRule>) -> Self {
        Self::with_options(rule, SqlExplainOptions::default())
    }

    pub fn with_options(rule: Arc<ShardingRule>, options: SqlExplainOptions) -> Self {
        Self {
            rule,
            options,
            contexts: vec![ExplainContext::new()],
            subquery_depth: 0,
        }
    }

    /// Current scope. The stack is seeded with the root scope and
    /// `pop_context` never removes it.
    pub fn current_context(&self) -> &ExplainContext {
        self.contexts.last().expect("context stack is never empty")
    }

    fn current_context_mut(&mut self) -> &mut ExplainContext {
        self.contexts
            .last_mut()
            .expect("context stack is never empty")
    }

    /// Aggregate sub-query depth consumed so far. Monotonic for the lifetime
    /// of one statement's analysis; never reset by scope exits.
    pub fn subquery_depth(&self) -> u32 {
        self.subquery_depth
    }

    fn push_context(&mut self) {
        self.contexts.push(ExplainContext::new());
    }

    fn pop_context(&mut self) {
        if self.contexts.len() > 1 {
            self.contexts.pop();
        }
    }

    /// Full analysis of one SELECT: table references first, WHERE second.
    pub fn explain_select(
        &mut self,
        stmt: &mut SelectStmt,
        rewriter: &dyn Rewriter,
    ) -> Result<(), ShardingError> {
        self.explain_tables(stmt, rewriter)?;
        self.explain_where(stmt, rewriter)
    }

    pub fn explain_tables(
        &mut self,
        stmt: &mut SelectStmt,
        rewriter: &dyn Rewriter,
    ) -> Result<(), ShardingError> {
        let from = stmt
            .from
            .as_mut()
            .ok_or(ShardingError::MalformedQuery("FROM"))?;
        let join = from
            .table_refs
            .as_mut()
            .ok_or(ShardingError::MalformedQuery("table references"))?;
        self.explain_join(join, rewriter)
    }

    fn explain_join(
        &mut self,
        join: &mut Join,
        rewriter: &dyn Rewriter,
    ) -> Result<(), ShardingError> {
        check_using_clause(&join.using)?;

        // Nesting is permitted on the left side unconditionally, and on the
        // right side only under a simple left table; anything else would
        // require combinatorial shard-target enumeration.
        let mut left_is_simple = true;
        if let Some(left) = join.left.as_mut() {
            left_is_simple = left.is_simple_table();
            self.explain_join_side(left, rewriter, true)?;
        }
        if let Some(right) = join.right.as_mut() {
            self.explain_join_side(right, rewriter, left_is_simple)?;
        }

        if let Some(on) = join.on.as_ref() {
            if let Some(rewritten) = self.explain_condition(on, rewriter, LogicOp::And)? {
                join.on = Some(rewritten);
            }
        }
        Ok(())
    }

    fn explain_join_side(
        &mut self,
        side: &mut JoinSide,
        rewriter: &dyn Rewriter,
        allow_nested_join: bool,
    ) -> Result<(), ShardingError> {
        match side {
            JoinSide::Table(source) => self.rewrite_table_source(source, rewriter),
            JoinSide::Join(nested) => {
                if allow_nested_join {
                    self.explain_join(nested, rewriter)
                } else {
                    Err(ShardingError::UnsupportedJoinShape)
                }
            }
        }
    }

    fn rewrite_table_source(
        &mut self,
        source: &mut TableSource,
        rewriter: &dyn Rewriter,
    ) -> Result<(), ShardingError> {
        match &source.source {
            TableExpr::Name(_) => {}
            TableExpr::Subquery(_) => return self.explain_subquery_source(source, rewriter),
            TableExpr::Decorated(_) => {
                return Err(ShardingError::UnsupportedTableSource(
                    "table reference is already decorated",
                ))
            }
        }

        // Sub-query scopes keep their own lookups out of the routing phase;
        // only top-level references participate in target computation.
        if self.subquery_depth == 0 {
            let rule = Arc::clone(&self.rule);
            self.current_context_mut()
                .table_lookup_mut()
                .add_table(source, &rule)?;
        }

        let rewrite = {
            let TableExpr::Name(name) = &source.source else {
                return Err(ShardingError::InvalidTableSource(
                    "expected a plain table name",
                ));
            };
            rewriter.rewrite_table(name, self.current_context())?
        };
        if let TableRewrite::Replace(new_node) = rewrite {
            source.source = new_node;
        }
        Ok(())
    }

    fn explain_subquery_source(
        &mut self,
        source: &mut TableSource,
        rewriter: &dyn Rewriter,
    ) -> Result<(), ShardingError> {
        if self.options.max_subquery_depth == 0 {
            return Err(ShardingError::SubqueriesNotSupported);
        }
        self.subquery_depth += 1;
        if self.subquery_depth > self.options.max_subquery_depth {
            return Err(ShardingError::SubqueryDepthExceeded {
                max: self.options.max_subquery_depth,
            });
        }

        let TableExpr::Subquery(stmt) = &mut source.source else {
            return Err(ShardingError::InvalidTableSource("expected a sub-query"));
        };
        debug!(depth = self.subquery_depth, "descending into sub-query");

        self.push_context();
        let result = self.explain_subquery(stmt, rewriter);
        self.pop_context();
        result
    }

    fn explain_subquery(
        &mut self,
        stmt: &mut SelectStmt,
        rewriter: &dyn Rewriter,
    ) -> Result<(), ShardingError> {
        self.explain_tables(stmt, rewriter)?;
        self.explain_where(stmt, rewriter)
    }

    /// Rewrites an existing WHERE clause as a single top-level AND-combined
    /// predicate. The replacement is committed on success; an unchanged
    /// rewrite is a no-op.
    pub fn explain_where(
        &mut self,
        stmt: &mut SelectStmt,
        rewriter: &dyn Rewriter,
    ) -> Result<(), ShardingError> {
        if let Some(where_clause) = stmt.where_clause.as_ref() {
            if let Some(rewritten) = self.explain_condition(where_clause, rewriter, LogicOp::And)? {
                stmt.where_clause = Some(rewritten);
            }
        }
        Ok(())
    }

    fn explain_condition(
        &mut self,
        expr: &Expr,
        rewriter: &dyn Rewriter,
        combinator: LogicOp,
    ) -> Result<Option<Expr>, ShardingError> {
        rewriter.rewrite_condition(expr, self.current_context(), combinator)
    }
}

/// USING columns must stay unqualified: a schema or table qualifier cannot be
/// resolved statically once both sides are rewritten per shard.
fn check_using_clause(using: &[ColumnName]) -> Result<(), ShardingError> {
    for column in using {
        if column.schema.is_some() {
            return Err(ShardingError::UnsupportedShardingSyntax(format!(
                "JOIN USING column '{}' must not carry a schema qualifier",
                column.name
            )));
        }
        if column.table.is_some() {
            return Err(ShardingError::UnsupportedShardingSyntax(format!(
                "JOIN USING column '{}' must not carry a table qualifier",
                column.name
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{SelectField, TableName, TableRefsClause, Value};

    /// Rewriter that records invocation order and rewrites nothing.
    #[derive(Default)]
    struct Recording {
        tables: std::cell::RefCell<Vec<String>>,
        conditions: std::cell::RefCell<usize>,
    }

    impl Rewriter for Recording {
        fn rewrite_table(
            &self,
            name: &TableName,
            _context: &ExplainContext,
        ) -> Result<TableRewrite, ShardingError> {
            self.tables.borrow_mut().push(name.name.clone());
            Ok(TableRewrite::Unchanged)
        }

        fn rewrite_condition(
            &self,
            _expr: &Expr,
            _context: &ExplainContext,
            _combinator: LogicOp,
        ) -> Result<Option<Expr>, ShardingError> {
            *self.conditions.borrow_mut() += 1;
            Ok(None)
        }
    }

    /// Rewriter that replaces any WHERE/ON condition with `1 = 1`.
    struct ConstantFolder;

    impl Rewriter for ConstantFolder {
        fn rewrite_table(
            &self,
            _name: &TableName,
            _context: &ExplainContext,
        ) -> Result<TableRewrite, ShardingError> {
            Ok(TableRewrite::Unchanged)
        }

        fn rewrite_condition(
            &self,
            _expr: &Expr,
            _context: &ExplainContext,
            _combinator: LogicOp,
        ) -> Result<Option<Expr>, ShardingError> {
            Ok(Some(Expr::eq(
                Expr::Literal(Value::Number(1)),
                Expr::Literal(Value::Number(1)),
            )))
        }
    }

    fn table_side(name: &str) -> JoinSide {
        JoinSide::Table(TableSource::named(TableName::new(None, name), None))
    }

    fn select_from(join: Join) -> SelectStmt {
        SelectStmt {
            fields: vec![SelectField::Wildcard],
            from: Some(TableRefsClause {
                table_refs: Some(join),
            }),
            where_clause: None,
        }
    }

    fn subquery_side(inner: SelectStmt) -> JoinSide {
        JoinSide::Table(TableSource {
            source: TableExpr::Subquery(Box::new(inner)),
            alias: Some("sq".into()),
        })
    }

    fn nested_selects(depth: u32) -> SelectStmt {
        let mut stmt = select_from(Join {
            left: Some(table_side("leaf")),
            ..Join::default()
        });
        for _ in 0..depth {
            stmt = select_from(Join {
                left: Some(subquery_side(stmt)),
                ..Join::default()
            });
        }
        stmt
    }

    fn explainer() -> SqlExplain {
        SqlExplain::new(Arc::new(ShardingRule::default()))
    }

    #[test]
    fn missing_from_clause_is_malformed() {
        let mut stmt = SelectStmt::default();
        let err = explainer()
            .explain_tables(&mut stmt, &Recording::default())
            .unwrap_err();
        assert!(matches!(err, ShardingError::MalformedQuery("FROM")));

        stmt.from = Some(TableRefsClause { table_refs: None });
        let err = explainer()
            .explain_tables(&mut stmt, &Recording::default())
            .unwrap_err();
        assert!(matches!(err, ShardingError::MalformedQuery(_)));
    }

    #[test]
    fn both_join_sides_are_visited_left_to_right() {
        let rewriter = Recording::default();
        let mut stmt = select_from(Join {
            left: Some(table_side("orders")),
            right: Some(table_side("items")),
            using: vec![ColumnName::new("order_id")],
            ..Join::default()
        });

        let mut explain = explainer();
        explain.explain_select(&mut stmt, &rewriter).unwrap();

        assert_eq!(*rewriter.tables.borrow(), vec!["orders", "items"]);
        let lookup = explain.current_context().table_lookup();
        assert_eq!(lookup.len(), 2);
        assert_eq!(lookup.entries()[0].table.name, "orders");
        assert_eq!(lookup.entries()[1].table.name, "items");
    }

    #[test]
    fn qualified_using_columns_are_rejected() {
        for column in [
            ColumnName {
                schema: Some("shop".into()),
                table: None,
                name: "order_id".into(),
            },
            ColumnName::qualified("orders", "order_id"),
        ] {
            let mut stmt = select_from(Join {
                left: Some(table_side("orders")),
                right: Some(table_side("items")),
                using: vec![column],
                ..Join::default()
            });
            let err = explainer()
                .explain_select(&mut stmt, &Recording::default())
                .unwrap_err();
            assert!(matches!(err, ShardingError::UnsupportedShardingSyntax(_)));
        }
    }

    #[test]
    fn left_deep_nesting_is_accepted() {
        let inner = Join {
            left: Some(table_side("t1")),
            right: Some(table_side("t2")),
            ..Join::default()
        };
        let rewriter = Recording::default();
        let mut stmt = select_from(Join {
            left: Some(JoinSide::Join(Box::new(inner))),
            right: Some(table_side("t3")),
            ..Join::default()
        });
        explainer().explain_select(&mut stmt, &rewriter).unwrap();
        assert_eq!(*rewriter.tables.borrow(), vec!["t1", "t2", "t3"]);
    }

    #[test]
    fn right_nesting_is_accepted_only_under_a_simple_left_table() {
        let nested = || {
            JoinSide::Join(Box::new(Join {
                left: Some(table_side("t2")),
                right: Some(table_side("t3")),
                ..Join::default()
            }))
        };

        // Simple left table: right-side nesting is legal.
        let mut accepted = select_from(Join {
            left: Some(table_side("t1")),
            right: Some(nested()),
            ..Join::default()
        });
        explainer()
            .explain_select(&mut accepted, &Recording::default())
            .unwrap();

        // Complex left side: right-side nesting would need combinatorial
        // target enumeration, so it is rejected.
        let mut rejected = select_from(Join {
            left: Some(JoinSide::Join(Box::new(Join {
                left: Some(table_side("t0")),
                right: Some(table_side("t1")),
                ..Join::default()
            }))),
            right: Some(nested()),
            ..Join::default()
        });
        let err = explainer()
            .explain_select(&mut rejected, &Recording::default())
            .unwrap_err();
        assert!(matches!(err, ShardingError::UnsupportedJoinShape));
    }

    #[test]
    fn on_condition_is_rewritten_in_place() {
        let mut stmt = select_from(Join {
            left: Some(table_side("orders")),
            right: Some(table_side("items")),
            on: Some(Expr::eq(
                Expr::Column(ColumnName::qualified("orders", "id")),
                Expr::Column(ColumnName::qualified("items", "order_id")),
            )),
            ..Join::default()
        });
        explainer()
            .explain_select(&mut stmt, &ConstantFolder)
            .unwrap();

        let join = stmt.from.unwrap().table_refs.unwrap();
        assert_eq!(
            join.on,
            Some(Expr::eq(
                Expr::Literal(Value::Number(1)),
                Expr::Literal(Value::Number(1)),
            ))
        );
    }

    #[test]
    fn where_clause_is_replaced_on_success() {
        let mut stmt = select_from(Join {
            left: Some(table_side("orders")),
            ..Join::default()
        });
        stmt.where_clause = Some(Expr::eq(
            Expr::Column(ColumnName::new("id")),
            Expr::Literal(Value::Number(42)),
        ));

        explainer()
            .explain_select(&mut stmt, &ConstantFolder)
            .unwrap();
        assert_eq!(
            stmt.where_clause,
            Some(Expr::eq(
                Expr::Literal(Value::Number(1)),
                Expr::Literal(Value::Number(1)),
            ))
        );
    }

    #[test]
    fn unchanged_where_rewrite_is_a_noop() {
        let original = Expr::eq(
            Expr::Column(ColumnName::new("id")),
            Expr::Literal(Value::Number(42)),
        );
        let mut stmt = select_from(Join {
            left: Some(table_side("orders")),
            ..Join::default()
        });
        stmt.where_clause = Some(original.clone());

        let rewriter = Recording::default();
        explainer().explain_select(&mut stmt, &rewriter).unwrap();
        assert_eq!(stmt.where_clause, Some(original));
        assert_eq!(*rewriter.conditions.borrow(), 1);
    }

    #[test]
    fn depth_at_the_maximum_succeeds_and_beyond_fails() {
        let rewriter = Recording::default();

        let mut at_max = nested_selects(2);
        let mut explain = SqlExplain::with_options(
            Arc::new(ShardingRule::default()),
            SqlExplainOptions {
                max_subquery_depth: 2,
            },
        );
        explain.explain_select(&mut at_max, &rewriter).unwrap();
        assert_eq!(explain.subquery_depth(), 2);

        let mut beyond = nested_selects(3);
        let mut explain = SqlExplain::with_options(
            Arc::new(ShardingRule::default()),
            SqlExplainOptions {
                max_subquery_depth: 2,
            },
        );
        let err = explain.explain_select(&mut beyond, &rewriter).unwrap_err();
        assert!(matches!(
            err,
            ShardingError::SubqueryDepthExceeded { max: 2 }
        ));
    }

    #[test]
    fn depth_is_aggregate_across_sibling_subqueries() {
        // Two sibling sub-queries consume two units of depth even though
        // neither nests beyond level one.
        let mut stmt = select_from(Join {
            left: Some(subquery_side(nested_selects(0))),
            right: Some(subquery_side(nested_selects(0))),
            ..Join::default()
        });
        let mut explain = SqlExplain::with_options(
            Arc::new(ShardingRule::default()),
            SqlExplainOptions {
                max_subquery_depth: 1,
            },
        );
        let err = explain
            .explain_select(&mut stmt, &Recording::default())
            .unwrap_err();
        assert!(matches!(err, ShardingError::SubqueryDepthExceeded { .. }));
    }

    #[test]
    fn zero_max_depth_disables_subqueries() {
        let mut stmt = nested_selects(1);
        let mut explain = SqlExplain::with_options(
            Arc::new(ShardingRule::default()),
            SqlExplainOptions {
                max_subquery_depth: 0,
            },
        );
        let err = explain
            .explain_select(&mut stmt, &Recording::default())
            .unwrap_err();
        assert!(matches!(err, ShardingError::SubqueriesNotSupported));
    }

    #[test]
    fn subquery_tables_stay_out_of_the_top_level_lookup() {
        let mut stmt = select_from(Join {
            left: Some(table_side("outer_table")),
            right: Some(subquery_side(nested_selects(0))),
            ..Join::default()
        });
        let mut explain = explainer();
        explain
            .explain_select(&mut stmt, &Recording::default())
            .unwrap();

        let lookup = explain.current_context().table_lookup();
        assert_eq!(lookup.len(), 1);
        assert_eq!(lookup.entries()[0].table.name, "outer_table");
    }
}
