//! Syntax-tree node model shared by the explainer and the rewrite decorators.
//!
//! The parser front-end lowers statements into these closed tagged-variant
//! types; every decision point in the engine matches exhaustively on the
//! explicit kind discriminants. Rendering goes through the [`Restore`]
//! contract so a decorated node can override its own textual output without
//! the rest of the tree noticing.

use shard_core::error::ShardingError;

use crate::decorator::TableNameDecorator;

/// Rendering options. Names are emitted bare by default; MySQL-style
/// backquoting is opt-in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreFlags {
    pub quote_names: bool,
}

/// Output buffer for one render pass.
#[derive(Debug)]
pub struct RestoreCtx {
    flags: RestoreFlags,
    out: String,
}

impl RestoreCtx {
    pub fn new(flags: RestoreFlags) -> Self {
        Self {
            flags,
            out: String::new(),
        }
    }

    pub fn write_plain(&mut self, text: &str) {
        self.out.push_str(text);
    }

    pub fn write_name(&mut self, name: &str) {
        if self.flags.quote_names {
            self.out.push('`');
            self.out.push_str(name);
            self.out.push('`');
        } else {
            self.out.push_str(name);
        }
    }

    pub fn finish(self) -> String {
        self.out
    }
}

/// Textual rendering contract implemented by every node.
pub trait Restore {
    fn restore(&self, ctx: &mut RestoreCtx) -> Result<(), ShardingError>;
}

/// Renders a node into a fresh buffer with default flags.
pub fn render_sql<N: Restore + ?Sized>(node: &N) -> Result<String, ShardingError> {
    let mut ctx = RestoreCtx::new(RestoreFlags::default());
    node.restore(&mut ctx)?;
    Ok(ctx.finish())
}

/// Read-only tree walker. Decorators forward visits to their wrapped node,
/// so a walker never observes decoration.
pub trait Visitor {
    fn visit_table_name(&mut self, _name: &TableName) {}
    fn visit_column(&mut self, _column: &ColumnName) {}
}

/// Possibly-qualified column reference (predicates, USING clauses).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnName {
    pub schema: Option<String>,
    pub table: Option<String>,
    pub name: String,
}

impl ColumnName {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            schema: None,
            table: None,
            name: name.into(),
        }
    }

    pub fn qualified(table: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: None,
            table: Some(table.into()),
            name: name.into(),
        }
    }

    pub fn accept<V: Visitor + ?Sized>(&self, visitor: &mut V) {
        visitor.visit_column(self);
    }
}

impl Restore for ColumnName {
    fn restore(&self, ctx: &mut RestoreCtx) -> Result<(), ShardingError> {
        if let Some(schema) = &self.schema {
            ctx.write_name(schema);
            ctx.write_plain(".");
        }
        if let Some(table) = &self.table {
            ctx.write_name(table);
            ctx.write_plain(".");
        }
        ctx.write_name(&self.name);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexHintType {
    Use,
    Ignore,
    Force,
}

impl IndexHintType {
    fn keyword(&self) -> &'static str {
        match self {
            IndexHintType::Use => "USE INDEX",
            IndexHintType::Ignore => "IGNORE INDEX",
            IndexHintType::Force => "FORCE INDEX",
        }
    }
}

/// MySQL index hint attached to a table reference; re-emitted verbatim after
/// a rewritten table name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexHint {
    pub hint_type: IndexHintType,
    pub index_names: Vec<String>,
}

impl Restore for IndexHint {
    fn restore(&self, ctx: &mut RestoreCtx) -> Result<(), ShardingError> {
        ctx.write_plain(self.hint_type.keyword());
        ctx.write_plain(" (");
        for (i, name) in self.index_names.iter().enumerate() {
            if i > 0 {
                ctx.write_plain(", ");
            }
            ctx.write_name(name);
        }
        ctx.write_plain(")");
        Ok(())
    }
}

/// Table-name node as produced by the parser: optional schema qualifier,
/// index hints and (unsupported for sharding) partition names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableName {
    pub schema: Option<String>,
    pub name: String,
    pub index_hints: Vec<IndexHint>,
    pub partition_names: Vec<String>,
    text: String,
}

impl TableName {
    pub fn new(schema: Option<String>, name: impl Into<String>) -> Self {
        let name = name.into();
        let text = match &schema {
            Some(schema) => format!("{schema}.{name}"),
            None => name.clone(),
        };
        Self {
            schema,
            name,
            index_hints: Vec::new(),
            partition_names: Vec::new(),
            text,
        }
    }

    /// Original statement text backing this node.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    pub fn accept<V: Visitor + ?Sized>(&self, visitor: &mut V) {
        visitor.visit_table_name(self);
    }
}

impl Restore for TableName {
    fn restore(&self, ctx: &mut RestoreCtx) -> Result<(), ShardingError> {
        if let Some(schema) = &self.schema {
            ctx.write_name(schema);
            ctx.write_plain(".");
        }
        ctx.write_name(&self.name);
        if !self.partition_names.is_empty() {
            ctx.write_plain(" PARTITION (");
            for (i, partition) in self.partition_names.iter().enumerate() {
                if i > 0 {
                    ctx.write_plain(", ");
                }
                ctx.write_name(partition);
            }
            ctx.write_plain(")");
        }
        for hint in &self.index_hints {
            ctx.write_plain(" ");
            hint.restore(ctx)?;
        }
        Ok(())
    }
}

/// Literal values appearing in predicates.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(i64),
    Text(String),
    Null,
}

impl Restore for Value {
    fn restore(&self, ctx: &mut RestoreCtx) -> Result<(), ShardingError> {
        match self {
            Value::Number(n) => ctx.write_plain(&n.to_string()),
            Value::Text(s) => {
                ctx.write_plain("'");
                ctx.write_plain(&s.replace('\'', "''"));
                ctx.write_plain("'");
            }
            Value::Null => ctx.write_plain("NULL"),
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl BinaryOp {
    fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Eq => "=",
            BinaryOp::NotEq => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
        }
    }
}

/// Combinator for multi-operand logical expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicOp {
    And,
    Or,
}

impl LogicOp {
    fn keyword(&self) -> &'static str {
        match self {
            LogicOp::And => "AND",
            LogicOp::Or => "OR",
        }
    }
}

/// AND/OR-combinable condition expression (WHERE and ON clauses).
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Column(ColumnName),
    Literal(Value),
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
    Logical {
        op: LogicOp,
        operands: Vec<Expr>,
    },
}

impl Expr {
    pub fn eq(left: Expr, right: Expr) -> Expr {
        Expr::Binary {
            left: Box::new(left),
            op: BinaryOp::Eq,
            right: Box::new(right),
        }
    }

    /// Normalizes a list of predicates into a single top-level AND. Nested
    /// top-level ANDs are flattened; an empty list yields `None`.
    pub fn and_combine(exprs: Vec<Expr>) -> Option<Expr> {
        let mut operands = Vec::with_capacity(exprs.len());
        for expr in exprs {
            match expr {
                Expr::Logical {
                    op: LogicOp::And,
                    operands: inner,
                } => operands.extend(inner),
                other => operands.push(other),
            }
        }
        match operands.len() {
            0 => None,
            1 => operands.into_iter().next(),
            _ => Some(Expr::Logical {
                op: LogicOp::And,
                operands,
            }),
        }
    }

    pub fn accept<V: Visitor + ?Sized>(&self, visitor: &mut V) {
        match self {
            Expr::Column(column) => column.accept(visitor),
            Expr::Literal(_) => {}
            Expr::Binary { left, right, .. } => {
                left.accept(visitor);
                right.accept(visitor);
            }
            Expr::Logical { operands, .. } => {
                for operand in operands {
                    operand.accept(visitor);
                }
            }
        }
    }

    /// True when this operand needs parentheses inside a parent combinator.
    fn needs_parens_in(&self, parent: LogicOp) -> bool {
        matches!(self, Expr::Logical { op, .. } if *op != parent)
    }
}

impl Restore for Expr {
    fn restore(&self, ctx: &mut RestoreCtx) -> Result<(), ShardingError> {
        match self {
            Expr::Column(column) => column.restore(ctx),
            Expr::Literal(value) => value.restore(ctx),
            Expr::Binary { left, op, right } => {
                left.restore(ctx)?;
                ctx.write_plain(" ");
                ctx.write_plain(op.symbol());
                ctx.write_plain(" ");
                right.restore(ctx)
            }
            Expr::Logical { op, operands } => {
                for (i, operand) in operands.iter().enumerate() {
                    if i > 0 {
                        ctx.write_plain(" ");
                        ctx.write_plain(op.keyword());
                        ctx.write_plain(" ");
                    }
                    if operand.needs_parens_in(*op) {
                        ctx.write_plain("(");
                        operand.restore(ctx)?;
                        ctx.write_plain(")");
                    } else {
                        operand.restore(ctx)?;
                    }
                }
                Ok(())
            }
        }
    }
}

/// One projected field.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectField {
    Wildcard,
    Expr { expr: Expr, alias: Option<String> },
}

impl Restore for SelectField {
    fn restore(&self, ctx: &mut RestoreCtx) -> Result<(), ShardingError> {
        match self {
            SelectField::Wildcard => {
                ctx.write_plain("*");
                Ok(())
            }
            SelectField::Expr { expr, alias } => {
                expr.restore(ctx)?;
                if let Some(alias) = alias {
                    ctx.write_plain(" AS ");
                    ctx.write_name(alias);
                }
                Ok(())
            }
        }
    }
}

/// The child of a table source: a plain name, a shard-decorated name, or a
/// bounded sub-query.
#[derive(Debug, Clone)]
pub enum TableExpr {
    Name(TableName),
    Decorated(TableNameDecorator),
    Subquery(Box<SelectStmt>),
}

impl Restore for TableExpr {
    fn restore(&self, ctx: &mut RestoreCtx) -> Result<(), ShardingError> {
        match self {
            TableExpr::Name(name) => name.restore(ctx),
            TableExpr::Decorated(decorator) => decorator.restore(ctx),
            TableExpr::Subquery(stmt) => {
                ctx.write_plain("(");
                stmt.restore(ctx)?;
                ctx.write_plain(")");
                Ok(())
            }
        }
    }
}

/// Table source with optional alias.
#[derive(Debug, Clone)]
pub struct TableSource {
    pub source: TableExpr,
    pub alias: Option<String>,
}

impl TableSource {
    pub fn named(name: TableName, alias: Option<String>) -> Self {
        Self {
            source: TableExpr::Name(name),
            alias,
        }
    }
}

impl Restore for TableSource {
    fn restore(&self, ctx: &mut RestoreCtx) -> Result<(), ShardingError> {
        self.source.restore(ctx)?;
        if let Some(alias) = &self.alias {
            ctx.write_plain(" ");
            ctx.write_name(alias);
        }
        Ok(())
    }
}

/// One side of a join: a simple table source or a nested join.
#[derive(Debug, Clone)]
pub enum JoinSide {
    Table(TableSource),
    Join(Box<Join>),
}

impl JoinSide {
    pub fn is_simple_table(&self) -> bool {
        matches!(self, JoinSide::Table(_))
    }
}

impl Restore for JoinSide {
    fn restore(&self, ctx: &mut RestoreCtx) -> Result<(), ShardingError> {
        match self {
            JoinSide::Table(source) => source.restore(ctx),
            JoinSide::Join(join) => join.restore(ctx),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JoinType {
    #[default]
    Inner,
    Left,
    Right,
}

impl JoinType {
    fn keyword(&self) -> &'static str {
        match self {
            JoinType::Inner => "JOIN",
            JoinType::Left => "LEFT JOIN",
            JoinType::Right => "RIGHT JOIN",
        }
    }
}

/// Binary join tree. A FROM clause with a single table is a join with only
/// the left side populated.
#[derive(Debug, Clone, Default)]
pub struct Join {
    pub join_type: JoinType,
    pub left: Option<JoinSide>,
    pub right: Option<JoinSide>,
    pub on: Option<Expr>,
    pub using: Vec<ColumnName>,
}

impl Restore for Join {
    fn restore(&self, ctx: &mut RestoreCtx) -> Result<(), ShardingError> {
        if let Some(left) = &self.left {
            left.restore(ctx)?;
        }
        if let Some(right) = &self.right {
            ctx.write_plain(" ");
            ctx.write_plain(self.join_type.keyword());
            ctx.write_plain(" ");
            right.restore(ctx)?;
        }
        if let Some(on) = &self.on {
            ctx.write_plain(" ON ");
            on.restore(ctx)?;
        }
        if !self.using.is_empty() {
            ctx.write_plain(" USING (");
            for (i, column) in self.using.iter().enumerate() {
                if i > 0 {
                    ctx.write_plain(", ");
                }
                column.restore(ctx)?;
            }
            ctx.write_plain(")");
        }
        Ok(())
    }
}

/// FROM clause wrapper: present clause with an absent join tree is a
/// distinct malformation from a missing clause.
#[derive(Debug, Clone, Default)]
pub struct TableRefsClause {
    pub table_refs: Option<Join>,
}

/// SELECT statement shape covered by the analyzer.
#[derive(Debug, Clone, Default)]
pub struct SelectStmt {
    pub fields: Vec<SelectField>,
    pub from: Option<TableRefsClause>,
    pub where_clause: Option<Expr>,
}

impl SelectStmt {
    pub fn accept<V: Visitor + ?Sized>(&self, visitor: &mut V) {
        if let Some(from) = &self.from {
            if let Some(join) = &from.table_refs {
                accept_join(join, visitor);
            }
        }
        if let Some(where_clause) = &self.where_clause {
            where_clause.accept(visitor);
        }
    }
}

fn accept_join<V: Visitor + ?Sized>(join: &Join, visitor: &mut V) {
    for side in [&join.left, &join.right].into_iter().flatten() {
        match side {
            JoinSide::Table(source) => match &source.source {
                TableExpr::Name(name) => name.accept(visitor),
                TableExpr::Decorated(decorator) => decorator.accept(visitor),
                TableExpr::Subquery(stmt) => stmt.accept(visitor),
            },
            JoinSide::Join(nested) => accept_join(nested, visitor),
        }
    }
    if let Some(on) = &join.on {
        on.accept(visitor);
    }
    for column in &join.using {
        column.accept(visitor);
    }
}

impl Restore for SelectStmt {
    fn restore(&self, ctx: &mut RestoreCtx) -> Result<(), ShardingError> {
        ctx.write_plain("SELECT ");
        if self.fields.is_empty() {
            ctx.write_plain("*");
        } else {
            for (i, field) in self.fields.iter().enumerate() {
                if i > 0 {
                    ctx.write_plain(", ");
                }
                field.restore(ctx)?;
            }
        }
        if let Some(from) = &self.from {
            if let Some(join) = &from.table_refs {
                ctx.write_plain(" FROM ");
                join.restore(ctx)?;
            }
        }
        if let Some(where_clause) = &self.where_clause {
            ctx.write_plain(" WHERE ");
            where_clause.restore(ctx)?;
        }
        Ok(())
    }
}
