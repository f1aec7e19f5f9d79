//! Fluent SELECT composition (spec.md §4.5). A `QueryBuilder` never
//! executes on its own; it only renders SQL text that a [`crate::database`]
//! facade or [`crate::model`] layer hands to a connection.

mod predicate;

pub use predicate::{Connector, Predicate};

use crate::driver::DriverKind;
use crate::value::Value;

#[derive(Debug, Clone)]
enum WhereClause {
    Predicate {
        field: String,
        op: Predicate,
        value: WhereValue,
        connector: Connector,
    },
    Column {
        left: String,
        op: Predicate,
        right: String,
        connector: Connector,
    },
    Raw {
        sql: String,
        connector: Connector,
    },
    Group {
        clauses: Vec<WhereClause>,
        connector: Connector,
    },
}

#[derive(Debug, Clone)]
enum WhereValue {
    Single(Value),
    List(Vec<Value>),
    Range(Value, Value),
    None,
}

/// A fluent, chainable SELECT builder. Every mutator takes and returns
/// `Self` (design note §9, "Chained mutation"), so `where_group`'s closure
/// receives and must return ownership of its sub-builder rather than
/// copying its clauses.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    table: String,
    dialect: DriverKind,
    distinct: bool,
    select: Vec<String>,
    joins: Vec<String>,
    wheres: Vec<WhereClause>,
    group_by: Vec<String>,
    having: Option<String>,
    order_by: Vec<(String, bool)>,
    limit: Option<u64>,
    offset: Option<u64>,
    with_trashed: bool,
    only_trashed: bool,
    soft_delete_column: Option<&'static str>,
}

impl QueryBuilder {
    pub fn new(table: impl Into<String>, dialect: DriverKind) -> Self {
        Self {
            table: table.into(),
            dialect,
            distinct: false,
            select: Vec::new(),
            joins: Vec::new(),
            wheres: Vec::new(),
            group_by: Vec::new(),
            having: None,
            order_by: Vec::new(),
            limit: None,
            offset: None,
            with_trashed: false,
            only_trashed: false,
            soft_delete_column: None,
        }
    }

    /// Enables soft-delete gating against `column` (spec.md §4.5): rows
    /// whose column is non-null are excluded unless `with_trashed` was
    /// called, and `only_trashed` inverts the filter.
    pub fn soft_deletes(mut self, column: &'static str) -> Self {
        self.soft_delete_column = Some(column);
        self
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    pub fn select(mut self, fields: &[&str]) -> Self {
        self.select.extend(fields.iter().map(|f| f.to_string()));
        self
    }

    pub fn select_raw(mut self, expr: impl Into<String>) -> Self {
        self.select.push(expr.into());
        self
    }

    pub fn join(mut self, clause: impl Into<String>) -> Self {
        self.joins.push(clause.into());
        self
    }

    pub fn group_by(mut self, fields: &[&str]) -> Self {
        self.group_by.extend(fields.iter().map(|f| f.to_string()));
        self
    }

    pub fn having(mut self, raw: impl Into<String>) -> Self {
        self.having = Some(raw.into());
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, desc: bool) -> Self {
        self.order_by.push((field.into(), desc));
        self
    }

    pub fn order_by_asc(self, field: impl Into<String>) -> Self {
        self.order_by(field, false)
    }

    pub fn order_by_desc(self, field: impl Into<String>) -> Self {
        self.order_by(field, true)
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn with_trashed(mut self) -> Self {
        self.with_trashed = true;
        self
    }

    pub fn only_trashed(mut self) -> Self {
        self.only_trashed = true;
        self
    }

    fn push(&mut self, clause: WhereClause) {
        self.wheres.push(clause);
    }

    /// `where_(field, value)` — equality shorthand (spec.md §4.5).
    pub fn where_(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(WhereClause::Predicate {
            field: field.into(),
            op: Predicate::Eq,
            value: WhereValue::Single(value.into()),
            connector: Connector::And,
        });
        self
    }

    pub fn or_where(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(WhereClause::Predicate {
            field: field.into(),
            op: Predicate::Eq,
            value: WhereValue::Single(value.into()),
            connector: Connector::Or,
        });
        self
    }

    /// `where(field, op, value)` — `op` is a string operator resolved via
    /// [`Predicate::parse`]; unknown operators are treated as `=`.
    pub fn where_op(mut self, field: impl Into<String>, op: &str, value: impl Into<Value>) -> Self {
        let op = Predicate::parse(op).unwrap_or(Predicate::Eq);
        self.push(WhereClause::Predicate {
            field: field.into(),
            op,
            value: WhereValue::Single(value.into()),
            connector: Connector::And,
        });
        self
    }

    pub fn or_where_op(mut self, field: impl Into<String>, op: &str, value: impl Into<Value>) -> Self {
        let op = Predicate::parse(op).unwrap_or(Predicate::Eq);
        self.push(WhereClause::Predicate {
            field: field.into(),
            op,
            value: WhereValue::Single(value.into()),
            connector: Connector::Or,
        });
        self
    }

    fn where_list(mut self, field: impl Into<String>, op: Predicate, values: Vec<Value>, connector: Connector) -> Self {
        self.push(WhereClause::Predicate {
            field: field.into(),
            op,
            value: WhereValue::List(values),
            connector,
        });
        self
    }

    pub fn where_in(self, field: impl Into<String>, values: Vec<Value>) -> Self {
        self.where_list(field, Predicate::In, values, Connector::And)
    }

    pub fn where_not_in(self, field: impl Into<String>, values: Vec<Value>) -> Self {
        self.where_list(field, Predicate::NotIn, values, Connector::And)
    }

    pub fn or_where_in(self, field: impl Into<String>, values: Vec<Value>) -> Self {
        self.where_list(field, Predicate::In, values, Connector::Or)
    }

    pub fn where_between(mut self, field: impl Into<String>, low: impl Into<Value>, high: impl Into<Value>) -> Self {
        self.push(WhereClause::Predicate {
            field: field.into(),
            op: Predicate::Between,
            value: WhereValue::Range(low.into(), high.into()),
            connector: Connector::And,
        });
        self
    }

    pub fn where_null(mut self, field: impl Into<String>) -> Self {
        self.push(WhereClause::Predicate {
            field: field.into(),
            op: Predicate::IsNull,
            value: WhereValue::None,
            connector: Connector::And,
        });
        self
    }

    pub fn where_not_null(mut self, field: impl Into<String>) -> Self {
        self.push(WhereClause::Predicate {
            field: field.into(),
            op: Predicate::IsNotNull,
            value: WhereValue::None,
            connector: Connector::And,
        });
        self
    }

    pub fn where_like(self, field: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.where_list_scalar(field, Predicate::Like, pattern.into())
    }

    pub fn where_not_like(self, field: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.where_list_scalar(field, Predicate::NotLike, pattern.into())
    }

    fn where_list_scalar(mut self, field: impl Into<String>, op: Predicate, value: String) -> Self {
        self.push(WhereClause::Predicate {
            field: field.into(),
            op,
            value: WhereValue::Single(Value::Text(value)),
            connector: Connector::And,
        });
        self
    }

    /// Compares two columns without quoting either side as a value literal
    /// (spec.md §4.5, `whereColumn`).
    pub fn where_column(mut self, left: impl Into<String>, op: &str, right: impl Into<String>) -> Self {
        let op = Predicate::parse(op).unwrap_or(Predicate::Eq);
        self.push(WhereClause::Column {
            left: left.into(),
            op,
            right: right.into(),
            connector: Connector::And,
        });
        self
    }

    /// Appends a pre-built raw SQL fragment verbatim. Bypasses escaping
    /// deliberately (design note §9); callers must pre-validate.
    pub fn where_raw(mut self, sql: impl Into<String>) -> Self {
        self.push(WhereClause::Raw {
            sql: sql.into(),
            connector: Connector::And,
        });
        self
    }

    /// Appends a raw fragment with positional `?` placeholders, each
    /// substituted in order with a dialect-escaped literal. Still an
    /// explicit raw hook (design note §9); the placeholders are rendered
    /// as literals rather than threaded to the driver's bind path.
    pub fn where_raw_bound(mut self, fragment: &str, values: &[Value]) -> Self {
        let mut rendered = String::with_capacity(fragment.len());
        let mut values = values.iter();
        for ch in fragment.chars() {
            if ch == '?' {
                if let Some(value) = values.next() {
                    rendered.push_str(&value.render_literal(self.dialect));
                    continue;
                }
            }
            rendered.push(ch);
        }
        self.push(WhereClause::Raw {
            sql: rendered,
            connector: Connector::And,
        });
        self
    }

    pub fn where_in_subquery(mut self, field: impl Into<String>, sub: QueryBuilder) -> Self {
        self.push(WhereClause::Raw {
            sql: format!("{} IN ({})", field.into(), sub.to_sql()),
            connector: Connector::And,
        });
        self
    }

    pub fn where_not_in_subquery(mut self, field: impl Into<String>, sub: QueryBuilder) -> Self {
        self.push(WhereClause::Raw {
            sql: format!("{} NOT IN ({})", field.into(), sub.to_sql()),
            connector: Connector::And,
        });
        self
    }

    pub fn where_exists(mut self, sub: QueryBuilder) -> Self {
        self.push(WhereClause::Raw {
            sql: format!("EXISTS ({})", sub.to_sql()),
            connector: Connector::And,
        });
        self
    }

    pub fn where_not_exists(mut self, sub: QueryBuilder) -> Self {
        self.push(WhereClause::Raw {
            sql: format!("NOT EXISTS ({})", sub.to_sql()),
            connector: Connector::And,
        });
        self
    }

    /// Captures a closure-built sub-builder's where-clauses, wraps them in
    /// parentheses, and attaches the group to the parent with `connector`.
    fn group(mut self, connector: Connector, f: impl FnOnce(QueryBuilder) -> QueryBuilder) -> Self {
        let sub = f(QueryBuilder::new(&self.table, self.dialect));
        if !sub.wheres.is_empty() {
            self.push(WhereClause::Group {
                clauses: sub.wheres,
                connector,
            });
        }
        self
    }

    pub fn where_group(self, f: impl FnOnce(QueryBuilder) -> QueryBuilder) -> Self {
        self.group(Connector::And, f)
    }

    pub fn or_where_group(self, f: impl FnOnce(QueryBuilder) -> QueryBuilder) -> Self {
        self.group(Connector::Or, f)
    }

    fn render_value(&self, value: &WhereValue) -> String {
        match value {
            WhereValue::Single(v) => v.render_literal(self.dialect),
            WhereValue::List(values) => {
                let rendered: Vec<String> = values.iter().map(|v| v.render_literal(self.dialect)).collect();
                format!("({})", rendered.join(", "))
            }
            WhereValue::Range(lo, hi) => {
                format!("{} AND {}", lo.render_literal(self.dialect), hi.render_literal(self.dialect))
            }
            WhereValue::None => String::new(),
        }
    }

    fn render_clause(&self, clause: &WhereClause) -> (String, Connector) {
        match clause {
            WhereClause::Predicate { field, op, value, connector } => {
                let rendered = match op {
                    Predicate::IsNull | Predicate::IsNotNull => format!("{field} {}", op.sql_operator()),
                    Predicate::Between => format!("{field} BETWEEN {}", self.render_value(value)),
                    _ => format!("{field} {} {}", op.sql_operator(), self.render_value(value)),
                };
                (rendered, *connector)
            }
            WhereClause::Column { left, op, right, connector } => {
                (format!("{left} {} {right}", op.sql_operator()), *connector)
            }
            WhereClause::Raw { sql, connector } => (sql.clone(), *connector),
            WhereClause::Group { clauses, connector } => {
                let inner = self.render_clause_list(clauses);
                (format!("({inner})"), *connector)
            }
        }
    }

    fn render_clause_list(&self, clauses: &[WhereClause]) -> String {
        let mut out = String::new();
        for (i, clause) in clauses.iter().enumerate() {
            let (sql, connector) = self.render_clause(clause);
            if i > 0 {
                out.push(' ');
                out.push_str(connector.keyword());
                out.push(' ');
            }
            out.push_str(&sql);
        }
        out
    }

    /// All where-clauses, including the soft-delete gate, in fixed render
    /// order (spec.md §4.5).
    fn effective_wheres(&self) -> Vec<WhereClause> {
        let mut wheres = self.wheres.clone();
        if let Some(column) = self.soft_delete_column {
            if self.only_trashed {
                wheres.push(WhereClause::Predicate {
                    field: column.to_string(),
                    op: Predicate::IsNotNull,
                    value: WhereValue::None,
                    connector: Connector::And,
                });
            } else if !self.with_trashed {
                wheres.push(WhereClause::Predicate {
                    field: column.to_string(),
                    op: Predicate::IsNull,
                    value: WhereValue::None,
                    connector: Connector::And,
                });
            }
        }
        wheres
    }

    fn render_select_list(&self) -> String {
        if self.select.is_empty() {
            "*".to_string()
        } else {
            self.select.join(", ")
        }
    }

    /// Renders `SELECT [DISTINCT] <cols> FROM <table> <joins> [WHERE ...]
    /// [GROUP BY ...] [HAVING ...] [ORDER BY ...] [LIMIT n] [OFFSET n]`.
    /// Idempotent: two successive calls produce byte-identical strings
    /// (spec.md §8).
    pub fn to_sql(&self) -> String {
        let mut sql = String::from("SELECT ");
        if self.distinct {
            sql.push_str("DISTINCT ");
        }
        sql.push_str(&self.render_select_list());
        sql.push_str(" FROM ");
        sql.push_str(&self.table);
        for join in &self.joins {
            sql.push(' ');
            sql.push_str(join);
        }

        let wheres = self.effective_wheres();
        if !wheres.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.render_clause_list(&wheres));
        }

        if !self.group_by.is_empty() {
            sql.push_str(" GROUP BY ");
            sql.push_str(&self.group_by.join(", "));
        }

        if let Some(having) = &self.having {
            sql.push_str(" HAVING ");
            sql.push_str(having);
        }

        if !self.order_by.is_empty() {
            sql.push_str(" ORDER BY ");
            let rendered: Vec<String> = self
                .order_by
                .iter()
                .map(|(field, desc)| format!("{field} {}", if *desc { "DESC" } else { "ASC" }))
                .collect();
            sql.push_str(&rendered.join(", "));
        }

        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        if let Some(offset) = self.offset {
            sql.push_str(&format!(" OFFSET {offset}"));
        }

        sql
    }

    /// Same WHERE/JOIN composition as [`QueryBuilder::to_sql`] but drops
    /// `ORDER BY`/`LIMIT`/`OFFSET` and selects `COUNT(*)` (spec.md §4.5).
    pub fn to_count_sql(&self) -> String {
        let mut sql = String::from("SELECT COUNT(*) FROM ");
        sql.push_str(&self.table);
        for join in &self.joins {
            sql.push(' ');
            sql.push_str(join);
        }
        let wheres = self.effective_wheres();
        if !wheres.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.render_clause_list(&wheres));
        }
        if !self.group_by.is_empty() {
            sql.push_str(" GROUP BY ");
            sql.push_str(&self.group_by.join(", "));
        }
        sql
    }

    /// Renders just the WHERE clause body (no leading `WHERE` keyword, no
    /// `GROUP BY`/`ORDER BY`/`LIMIT`), for callers composing `UPDATE`/
    /// `DELETE` statements that share this builder's filter (spec.md
    /// §4.5, `updateWhere`/`deleteWhere`).
    pub fn where_clause(&self) -> Option<String> {
        let wheres = self.effective_wheres();
        if wheres.is_empty() {
            None
        } else {
            Some(self.render_clause_list(&wheres))
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn dialect(&self) -> DriverKind {
        self.dialect
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_the_spec_example_verbatim() {
        let sql = QueryBuilder::new("users", DriverKind::Sqlite)
            .select(&["name", "email", "age"])
            .where_raw_bound("age > ?", &[Value::Int(25)])
            .order_by_desc("age")
            .limit(3)
            .to_sql();
        assert_eq!(sql, "SELECT name, email, age FROM users WHERE age > 25 ORDER BY age DESC LIMIT 3");
    }

    #[test]
    fn to_sql_is_idempotent() {
        let qb = QueryBuilder::new("users", DriverKind::Sqlite).where_("id", 1);
        assert_eq!(qb.to_sql(), qb.to_sql());
    }

    #[test]
    fn where_group_wraps_in_parens_with_correct_connector() {
        let sql = QueryBuilder::new("users", DriverKind::Sqlite)
            .where_("status", "active")
            .or_where_group(|q| q.where_("role", "admin").where_("role", "auditor"))
            .to_sql();
        assert_eq!(
            sql,
            "SELECT * FROM users WHERE status = 'active' OR (role = 'admin' AND role = 'auditor')"
        );
    }

    #[test]
    fn soft_delete_gating_is_suppressed_by_with_trashed() {
        let gated = QueryBuilder::new("posts", DriverKind::Sqlite).soft_deletes("deleted_at").to_sql();
        assert!(gated.contains("deleted_at IS NULL"));

        let trashed = QueryBuilder::new("posts", DriverKind::Sqlite)
            .soft_deletes("deleted_at")
            .with_trashed()
            .to_sql();
        assert!(!trashed.contains("deleted_at"));

        let only = QueryBuilder::new("posts", DriverKind::Sqlite)
            .soft_deletes("deleted_at")
            .only_trashed()
            .to_sql();
        assert!(only.contains("deleted_at IS NOT NULL"));
    }

    #[test]
    fn count_sql_drops_order_and_limit() {
        let qb = QueryBuilder::new("users", DriverKind::Sqlite)
            .where_("active", true)
            .order_by_desc("id")
            .limit(10);
        assert_eq!(qb.to_count_sql(), "SELECT COUNT(*) FROM users WHERE active = 1");
    }

    #[test]
    fn where_in_renders_value_list() {
        let sql = QueryBuilder::new("users", DriverKind::Sqlite)
            .where_in("id", vec![Value::Int(1), Value::Int(2), Value::Int(3)])
            .to_sql();
        assert_eq!(sql, "SELECT * FROM users WHERE id IN (1, 2, 3)");
    }
}
