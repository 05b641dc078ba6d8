//! Dialect-specific SQL formatting.
//!
//! Every function here is pure string assembly. Absent inputs render as
//! empty strings instead of failing, so callers can pass optional clauses
//! straight through.

pub mod sqlite;
pub mod sqlserver;

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::WeaveError;
use crate::template::Template;
use crate::value::Value;

pub use sqlite::SqliteFormatter;
pub use sqlserver::SqlServerFormatter;

/// Supported SQL dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// Bracket identifiers, `OFFSET .. FETCH` pagination.
    SqlServer,
    /// Double-quote identifiers, `LIMIT .. OFFSET` pagination.
    #[default]
    Sqlite,
}

impl Dialect {
    pub fn formatter(&self) -> &'static dyn SqlFormatter {
        match self {
            Dialect::SqlServer => &SqlServerFormatter,
            Dialect::Sqlite => &SqliteFormatter,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Dialect::SqlServer => "sqlserver",
            Dialect::Sqlite => "sqlite",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Dialect {
    type Err = WeaveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sqlserver" | "mssql" | "tsql" => Ok(Dialect::SqlServer),
            "sqlite" => Ok(Dialect::Sqlite),
            other => Err(WeaveError::Config(format!(
                "Unknown dialect '{}'. Expected: sqlserver or sqlite",
                other
            ))),
        }
    }
}

/// Sort direction of an ordering operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Ascending => "ASC",
            SortDirection::Descending => "DESC",
        }
    }

    /// Interpret a raw request value; `None` for values that name no direction.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Text(s) => s.parse().ok(),
            Value::Int(0) | Value::UInt(0) => Some(SortDirection::Ascending),
            Value::Int(1) | Value::UInt(1) => Some(SortDirection::Descending),
            _ => None,
        }
    }
}

impl FromStr for SortDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Ok(SortDirection::Ascending),
            "desc" | "descending" => Ok(SortDirection::Descending),
            other => Err(format!("'{}' is not a sort direction (asc or desc)", other)),
        }
    }
}

/// Join `items` with `separator` behind `prefix`; empty input gives `""`.
fn clause(prefix: &str, items: &[String], separator: &str) -> String {
    if items.is_empty() {
        String::new()
    } else {
        format!("{}{}", prefix, items.join(separator))
    }
}

/// Dialect-specific SQL rendering.
///
/// Implementors supply identifier quoting and pagination; the clause
/// assembly is shared.
pub trait SqlFormatter: Send + Sync {
    fn dialect(&self) -> Dialect;

    /// Opening and closing identifier delimiters.
    fn identifier_quotes(&self) -> (&'static str, &'static str);

    /// Render pagination for two already-formatted variable references.
    fn format_pagination(&self, skip: &str, take: &str) -> String;

    /// Prefix of a variable reference.
    fn variable_marker(&self) -> &'static str {
        "@"
    }

    /// Quote an identifier. `None` and `""` give an empty delimiter pair.
    ///
    /// A closing delimiter inside the name is doubled.
    fn format_identifier(&self, name: Option<&str>) -> String {
        let (open, close) = self.identifier_quotes();
        let name = name.unwrap_or_default();
        if name.contains(close) {
            format!("{}{}{}", open, name.replace(close, &close.repeat(2)), close)
        } else {
            format!("{}{}{}", open, name, close)
        }
    }

    /// Reference a bound variable. `None` gives the bare marker.
    fn format_variable(&self, name: Option<&str>) -> String {
        format!("{}{}", self.variable_marker(), name.unwrap_or_default())
    }

    fn format_filter_operation(&self, template: &Template, variables: &[String]) -> String {
        template.render(variables)
    }

    /// `WHERE a AND b`, or `""`.
    fn format_filter_operations(&self, operations: &[String]) -> String {
        clause("WHERE ", operations, " AND ")
    }

    /// Slot 0 gets the direction (ascending when absent), slots 1.. the variables.
    fn format_order_operation(
        &self,
        template: &Template,
        variables: &[String],
        direction: Option<SortDirection>,
    ) -> String {
        let mut args = Vec::with_capacity(variables.len() + 1);
        args.push(direction.unwrap_or_default().as_sql());
        args.extend(variables.iter().map(String::as_str));
        template.render(&args)
    }

    /// `ORDER BY a, b`, or `""`.
    fn format_order_operations(&self, operations: &[String]) -> String {
        clause("ORDER BY ", operations, ", ")
    }

    /// `<column> = <rendered template>`.
    fn format_update_operation(
        &self,
        column: Option<&str>,
        template: &Template,
        variables: &[String],
    ) -> String {
        format!(
            "{} = {}",
            self.format_identifier(column),
            template.render(variables)
        )
    }

    /// `SET a, b`, or `""`.
    fn format_update_operations(&self, operations: &[String]) -> String {
        clause("SET ", operations, ", ")
    }

    fn format_insert_column(&self, column: Option<&str>) -> String {
        self.format_identifier(column)
    }

    /// `(a, b)`, or `""`.
    fn format_insert_columns(&self, columns: &[String]) -> String {
        if columns.is_empty() {
            String::new()
        } else {
            format!("({})", columns.join(", "))
        }
    }

    fn format_insert_operation(&self, template: &Template, variables: &[String]) -> String {
        template.render(variables)
    }

    /// One row's values list `(x, y)`, or `""`.
    fn format_insert_operations(&self, operations: &[String]) -> String {
        if operations.is_empty() {
            String::new()
        } else {
            format!("({})", operations.join(", "))
        }
    }

    /// `(x, y), (z, w)`, or `""`.
    fn format_multiple_insert_values_lists(&self, lists: &[String]) -> String {
        let lists: Vec<String> = lists.iter().filter(|l| !l.is_empty()).cloned().collect();
        clause("", &lists, ", ")
    }

    /// Base slots: `{0}` filters, `{1}` order, `{2}` pagination.
    fn format_get_query(
        &self,
        base: &Template,
        filters: Option<&str>,
        order: Option<&str>,
        pagination: Option<&str>,
    ) -> String {
        base.render(&[
            filters.unwrap_or_default(),
            order.unwrap_or_default(),
            pagination.unwrap_or_default(),
        ])
    }

    /// Base slots: `{0}` filters.
    fn format_delete_query(&self, base: &Template, filters: Option<&str>) -> String {
        base.render(&[filters.unwrap_or_default()])
    }

    /// Base slots: `{0}` set list, `{1}` filters.
    fn format_update_query(
        &self,
        base: &Template,
        updates: Option<&str>,
        filters: Option<&str>,
    ) -> String {
        base.render(&[updates.unwrap_or_default(), filters.unwrap_or_default()])
    }

    /// Base slots: `{0}` column list, `{1}` values lists.
    fn format_insert_query(
        &self,
        base: &Template,
        columns: Option<&str>,
        values: Option<&str>,
    ) -> String {
        base.render(&[columns.unwrap_or_default(), values.unwrap_or_default()])
    }
}
