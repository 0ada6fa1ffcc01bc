//! Front-end adapter lowering `sqlparser` output into the analyzer's node
//! model.
//!
//! The engine itself is parser-agnostic; this adapter covers the statement
//! subset the explainer accepts (plain SELECT bodies, explicit JOINs with
//! ON/USING, comparison and AND/OR predicate trees, derived-table
//! sub-queries) and rejects everything else with a descriptive error instead
//! of silently dropping clauses.

use anyhow::{bail, Context, Result};
use sqlparser::{ast as sql, dialect::MySqlDialect, parser::Parser};

use crate::ast::{
    BinaryOp, ColumnName, Expr, Join, JoinSide, JoinType, LogicOp, SelectField, SelectStmt,
    TableExpr, TableName, TableRefsClause, TableSource, Value,
};

/// Parses one SELECT statement (MySQL dialect) into the analyzer node model.
pub fn parse_select(sql_text: &str) -> Result<SelectStmt> {
    let statements =
        Parser::parse_sql(&MySqlDialect {}, sql_text).context("failed to parse SQL")?;
    let statement = match statements.as_slice() {
        [statement] => statement,
        other => bail!("expected exactly one statement, got {}", other.len()),
    };
    let sql::Statement::Query(query) = statement else {
        bail!("only SELECT statements are supported, got {statement}");
    };
    lower_query(query)
}

fn lower_query(query: &sql::Query) -> Result<SelectStmt> {
    if query.with.is_some() {
        bail!("WITH clauses are not supported");
    }
    if !query.order_by.is_empty() {
        bail!("ORDER BY belongs to the result merger, not the sharding analyzer");
    }
    if query.limit.is_some() || query.offset.is_some() {
        bail!("LIMIT/OFFSET belong to the result merger, not the sharding analyzer");
    }
    let sql::SetExpr::Select(select) = query.body.as_ref() else {
        bail!("only plain SELECT bodies are supported, got {}", query.body);
    };
    lower_select(select)
}

fn lower_select(select: &sql::Select) -> Result<SelectStmt> {
    if select.distinct.is_some() {
        bail!("SELECT DISTINCT is not supported");
    }
    if select.having.is_some() {
        bail!("HAVING is not supported");
    }
    if !select.group_by.is_empty() {
        bail!("GROUP BY belongs to the result merger, not the sharding analyzer");
    }

    let fields = select
        .projection
        .iter()
        .map(lower_select_item)
        .collect::<Result<Vec<_>>>()?;

    let from = match select.from.as_slice() {
        [] => None,
        [table_with_joins] => Some(TableRefsClause {
            table_refs: Some(lower_table_with_joins(table_with_joins)?),
        }),
        _ => bail!("comma-separated FROM lists are not supported; use explicit JOINs"),
    };

    let where_clause = select.selection.as_ref().map(lower_expr).transpose()?;

    Ok(SelectStmt {
        fields,
        from,
        where_clause,
    })
}

fn lower_select_item(item: &sql::SelectItem) -> Result<SelectField> {
    match item {
        sql::SelectItem::Wildcard(_) => Ok(SelectField::Wildcard),
        sql::SelectItem::UnnamedExpr(expr) => Ok(SelectField::Expr {
            expr: lower_expr(expr)?,
            alias: None,
        }),
        sql::SelectItem::ExprWithAlias { expr, alias } => Ok(SelectField::Expr {
            expr: lower_expr(expr)?,
            alias: Some(alias.value.clone()),
        }),
        other => bail!("unsupported projection item: {other}"),
    }
}

/// Multi-join FROM clauses lower left-deep, which is exactly the nesting
/// shape the explainer accepts.
fn lower_table_with_joins(table_with_joins: &sql::TableWithJoins) -> Result<Join> {
    let mut current = Join {
        left: Some(JoinSide::Table(lower_table_factor(
            &table_with_joins.relation,
        )?)),
        ..Join::default()
    };

    for join in &table_with_joins.joins {
        let right = JoinSide::Table(lower_table_factor(&join.relation)?);
        let (join_type, constraint) = match &join.join_operator {
            sql::JoinOperator::Inner(constraint) => (JoinType::Inner, constraint),
            sql::JoinOperator::LeftOuter(constraint) => (JoinType::Left, constraint),
            sql::JoinOperator::RightOuter(constraint) => (JoinType::Right, constraint),
            other => bail!("unsupported join operator: {other:?}"),
        };

        let mut next = if current.right.is_none() {
            let mut join = current;
            join.join_type = join_type;
            join.right = Some(right);
            join
        } else {
            Join {
                join_type,
                left: Some(JoinSide::Join(Box::new(current))),
                right: Some(right),
                ..Join::default()
            }
        };

        match constraint {
            sql::JoinConstraint::On(expr) => next.on = Some(lower_expr(expr)?),
            sql::JoinConstraint::Using(columns) => {
                next.using = columns
                    .iter()
                    .map(|ident| ColumnName::new(ident.value.clone()))
                    .collect();
            }
            sql::JoinConstraint::None => {}
            sql::JoinConstraint::Natural => bail!("NATURAL JOIN is not supported"),
        }
        current = next;
    }

    Ok(current)
}

fn lower_table_factor(factor: &sql::TableFactor) -> Result<TableSource> {
    match factor {
        sql::TableFactor::Table { name, alias, .. } => Ok(TableSource {
            source: TableExpr::Name(lower_object_name(name)?),
            alias: lower_alias(alias),
        }),
        sql::TableFactor::Derived {
            subquery, alias, ..
        } => Ok(TableSource {
            source: TableExpr::Subquery(Box::new(lower_query(subquery)?)),
            alias: lower_alias(alias),
        }),
        other => bail!("unsupported table factor: {other}"),
    }
}

fn lower_object_name(name: &sql::ObjectName) -> Result<TableName> {
    match name.0.as_slice() {
        [table] => Ok(TableName::new(None, table.value.clone())),
        [schema, table] => Ok(TableName::new(
            Some(schema.value.clone()),
            table.value.clone(),
        )),
        _ => bail!("unsupported table name qualification: {name}"),
    }
}

fn lower_alias(alias: &Option<sql::TableAlias>) -> Option<String> {
    alias.as_ref().map(|alias| alias.name.value.clone())
}

fn lower_expr(expr: &sql::Expr) -> Result<Expr> {
    match expr {
        sql::Expr::Identifier(ident) => Ok(Expr::Column(ColumnName::new(ident.value.clone()))),
        sql::Expr::CompoundIdentifier(parts) => match parts.as_slice() {
            [table, column] => Ok(Expr::Column(ColumnName::qualified(
                table.value.clone(),
                column.value.clone(),
            ))),
            [schema, table, column] => Ok(Expr::Column(ColumnName {
                schema: Some(schema.value.clone()),
                table: Some(table.value.clone()),
                name: column.value.clone(),
            })),
            _ => bail!("unsupported column reference: {expr}"),
        },
        sql::Expr::Nested(inner) => lower_expr(inner),
        sql::Expr::Value(value) => lower_value(value),
        sql::Expr::BinaryOp { left, op, right } => lower_binary(left, op, right),
        other => bail!("unsupported expression: {other}"),
    }
}

fn lower_binary(left: &sql::Expr, op: &sql::BinaryOperator, right: &sql::Expr) -> Result<Expr> {
    let binary_op = match op {
        sql::BinaryOperator::Eq => BinaryOp::Eq,
        sql::BinaryOperator::NotEq => BinaryOp::NotEq,
        sql::BinaryOperator::Lt => BinaryOp::Lt,
        sql::BinaryOperator::LtEq => BinaryOp::LtEq,
        sql::BinaryOperator::Gt => BinaryOp::Gt,
        sql::BinaryOperator::GtEq => BinaryOp::GtEq,
        sql::BinaryOperator::And | sql::BinaryOperator::Or => {
            let logic = if matches!(op, sql::BinaryOperator::And) {
                LogicOp::And
            } else {
                LogicOp::Or
            };
            let mut operands = Vec::new();
            collect_logic(left, logic, &mut operands)?;
            collect_logic(right, logic, &mut operands)?;
            return Ok(Expr::Logical {
                op: logic,
                operands,
            });
        }
        other => bail!("unsupported binary operator: {other}"),
    };
    Ok(Expr::Binary {
        left: Box::new(lower_expr(left)?),
        op: binary_op,
        right: Box::new(lower_expr(right)?),
    })
}

/// Flattens chains of the same logical operator into one multi-operand node.
fn collect_logic(expr: &sql::Expr, op: LogicOp, out: &mut Vec<Expr>) -> Result<()> {
    if let sql::Expr::BinaryOp {
        left,
        op: inner,
        right,
    } = expr
    {
        let same = matches!(
            (inner, op),
            (sql::BinaryOperator::And, LogicOp::And) | (sql::BinaryOperator::Or, LogicOp::Or)
        );
        if same {
            collect_logic(left, op, out)?;
            collect_logic(right, op, out)?;
            return Ok(());
        }
    }
    out.push(lower_expr(expr)?);
    Ok(())
}

fn lower_value(value: &sql::Value) -> Result<Expr> {
    match value {
        sql::Value::Number(text, _) => Ok(Expr::Literal(Value::Number(
            text.parse()
                .with_context(|| format!("unsupported numeric literal '{text}'"))?,
        ))),
        sql::Value::SingleQuotedString(text) => Ok(Expr::Literal(Value::Text(text.clone()))),
        sql::Value::Null => Ok(Expr::Literal(Value::Null)),
        other => bail!("unsupported literal: {other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::render_sql;

    #[test]
    fn lowers_a_single_table_select() {
        let stmt = parse_select("SELECT * FROM orders").unwrap();
        assert_eq!(render_sql(&stmt).unwrap(), "SELECT * FROM orders");

        let join = stmt.from.unwrap().table_refs.unwrap();
        assert!(matches!(join.left, Some(JoinSide::Table(_))));
        assert!(join.right.is_none());
    }

    #[test]
    fn lowers_join_on_with_aliases() {
        let stmt =
            parse_select("SELECT * FROM orders o JOIN items i ON o.id = i.order_id").unwrap();
        assert_eq!(
            render_sql(&stmt).unwrap(),
            "SELECT * FROM orders o JOIN items i ON o.id = i.order_id"
        );
    }

    #[test]
    fn lowers_join_using_without_qualifiers() {
        let stmt = parse_select("SELECT * FROM orders JOIN items USING (order_id)").unwrap();
        let join = stmt.from.unwrap().table_refs.unwrap();
        assert_eq!(join.using.len(), 1);
        assert_eq!(join.using[0], ColumnName::new("order_id"));
        assert!(join.on.is_none());
    }

    #[test]
    fn multi_joins_lower_left_deep() {
        let stmt = parse_select("SELECT * FROM t1 JOIN t2 ON t1.a = t2.a JOIN t3 ON t2.b = t3.b")
            .unwrap();
        let join = stmt.from.unwrap().table_refs.unwrap();
        assert!(matches!(join.left, Some(JoinSide::Join(_))));
        assert!(matches!(join.right, Some(JoinSide::Table(_))));
    }

    #[test]
    fn lowers_where_trees_with_flattened_logic() {
        let stmt =
            parse_select("SELECT id FROM orders WHERE a = 1 AND b = 'x' AND (c = 2 OR c = 3)")
                .unwrap();
        let Some(Expr::Logical { op, operands }) = stmt.where_clause else {
            panic!("expected a logical WHERE tree");
        };
        assert_eq!(op, LogicOp::And);
        assert_eq!(operands.len(), 3);
    }

    #[test]
    fn lowers_subquery_table_factors() {
        let stmt =
            parse_select("SELECT * FROM (SELECT id FROM orders WHERE uid = 7) sq").unwrap();
        let join = stmt.from.unwrap().table_refs.unwrap();
        let Some(JoinSide::Table(source)) = join.left else {
            panic!("expected a table source");
        };
        assert!(matches!(source.source, TableExpr::Subquery(_)));
        assert_eq!(source.alias.as_deref(), Some("sq"));
    }

    #[test]
    fn lowers_schema_qualified_names_and_projections() {
        let stmt = parse_select("SELECT o.id AS order_id FROM shop.orders o").unwrap();
        assert_eq!(
            render_sql(&stmt).unwrap(),
            "SELECT o.id AS order_id FROM shop.orders o"
        );
    }

    #[test]
    fn merger_only_clauses_are_rejected() {
        for sql_text in [
            "SELECT * FROM orders ORDER BY id",
            "SELECT * FROM orders LIMIT 10",
            "SELECT a, COUNT(1) FROM orders GROUP BY a",
            "SELECT * FROM orders, items",
            "INSERT INTO orders VALUES (1)",
        ] {
            assert!(parse_select(sql_text).is_err(), "should reject: {sql_text}");
        }
    }
}
