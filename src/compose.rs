//! Operation composition.
//!
//! Turns caller requests ([`QueryOperation`]) into formatted SQL fragments:
//! each request is looked up by name in an [`OperationTable`], its
//! parameters are validated and bound into a [`BindVariable`] (usually a
//! [`QueryContext`](crate::context::QueryContext)), and the operation's
//! template is rendered with the bound variable references.
//!
//! Requests naming an operation the table does not have, or one of another
//! kind, are skipped without error.

use std::collections::HashMap;

use tracing::debug;

pub use crate::context::BindVariable;
use crate::error::{WeaveError, WeaveResult};
use crate::formatter::{Dialect, SortDirection, SqlFormatter};
use crate::metadata::{
    DIRECTION_PARAMETER, Operation, OperationKind, OperationTable, ParameterMetadata,
};
use crate::template::Template;
use crate::value::{DbType, Value};

/// A caller's request for one named operation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOperation {
    pub name: String,
    /// Supplied parameter values by name. May be partial.
    pub parameters: HashMap<String, Value>,
}

impl QueryOperation {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: HashMap::new(),
        }
    }

    /// Supply a parameter value.
    pub fn with(mut self, parameter: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(parameter.into(), value.into());
        self
    }
}

/// An accepted request after binding, handed to the per-operation formatter.
#[derive(Debug)]
pub struct BoundOperation<'t> {
    pub operation: &'t Operation,
    /// Marker-prefixed variable references in parameter order.
    pub variables: Vec<String>,
    /// Only set for ordering operations.
    pub direction: Option<SortDirection>,
}

enum Resolved<'t> {
    Bind(&'t ParameterMetadata, Value),
    Direction(SortDirection),
}

/// Resolve every parameter of `operation` against `request`.
fn resolve<'t>(
    operation: &'t Operation,
    request: &QueryOperation,
) -> WeaveResult<Vec<Resolved<'t>>> {
    let metadata = operation.metadata();
    let mut resolved = Vec::with_capacity(metadata.parameters().len());

    for parameter in metadata.parameters() {
        if operation.kind() == OperationKind::Order && parameter.name() == DIRECTION_PARAMETER {
            let direction = match request.parameters.get(DIRECTION_PARAMETER) {
                None | Some(Value::Null) => SortDirection::Ascending,
                Some(raw) => SortDirection::from_value(raw).ok_or_else(|| {
                    WeaveError::InvalidParameter {
                        parameter: DIRECTION_PARAMETER.to_string(),
                        operation: metadata.name().to_string(),
                        message: format!("{} is not asc or desc", raw),
                    }
                })?,
            };
            resolved.push(Resolved::Direction(direction));
            continue;
        }

        let value = match request.parameters.get(parameter.name()) {
            Some(value) => value.clone(),
            None => parameter
                .fallback()
                .ok_or_else(|| WeaveError::required(parameter.name(), metadata.name()))?,
        };
        resolved.push(Resolved::Bind(parameter, value));
    }

    Ok(resolved)
}

/// Match and validate requests without binding anything.
fn accept<'t>(
    table: &'t OperationTable,
    kind: OperationKind,
    requests: &[QueryOperation],
) -> WeaveResult<Vec<(&'t Operation, Vec<Resolved<'t>>)>> {
    let mut accepted = Vec::with_capacity(requests.len());
    for request in requests {
        let Some(operation) = table.get(&request.name).filter(|op| op.kind() == kind) else {
            debug!(
                table = table.name(),
                operation = %request.name,
                %kind,
                "skipping unmatched operation"
            );
            continue;
        };
        accepted.push((operation, resolve(operation, request)?));
    }
    Ok(accepted)
}

/// Compose `requests` into one formatted fragment per accepted request.
///
/// Every request is validated before any variable is bound, so an error
/// leaves `binder` untouched. `on_accept` sees each accepted operation with
/// its position among the accepted requests, before it is formatted.
pub fn compose_operations<'t, B, F>(
    binder: &mut B,
    formatter: &dyn SqlFormatter,
    table: &'t OperationTable,
    kind: OperationKind,
    requests: &[QueryOperation],
    mut format: F,
    mut on_accept: Option<&mut dyn FnMut(&Operation, usize)>,
) -> WeaveResult<Vec<String>>
where
    B: BindVariable + ?Sized,
    F: FnMut(&BoundOperation<'t>) -> String,
{
    let accepted = accept(table, kind, requests)?;
    let mut fragments = Vec::with_capacity(accepted.len());

    for (ordinal, (operation, resolved)) in accepted.into_iter().enumerate() {
        let mut variables = Vec::with_capacity(resolved.len());
        let mut direction = None;
        for item in resolved {
            match item {
                Resolved::Bind(parameter, value) => {
                    let bound =
                        binder.add_variable(parameter.name(), value, parameter.db_type(), true);
                    variables.push(formatter.format_variable(Some(&bound)));
                }
                Resolved::Direction(d) => direction = Some(d),
            }
        }

        if let Some(callback) = on_accept.as_deref_mut() {
            callback(operation, ordinal);
        }

        fragments.push(format(&BoundOperation {
            operation,
            variables,
            direction,
        }));
    }

    debug!(
        table = table.name(),
        %kind,
        requested = requests.len(),
        accepted = fragments.len(),
        "composed operations"
    );
    Ok(fragments)
}

/// Skip/take window for a get query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub skip: i64,
    pub take: i64,
}

/// Column list and values lists of an insert.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InsertClause {
    pub columns: String,
    pub values: String,
}

/// Composes whole clauses and statements for one dialect.
#[derive(Clone, Copy)]
pub struct Composer {
    formatter: &'static dyn SqlFormatter,
}

impl Composer {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            formatter: dialect.formatter(),
        }
    }

    /// Use a formatter that has no [`Dialect`] variant.
    pub fn with_formatter(formatter: &'static dyn SqlFormatter) -> Self {
        Self { formatter }
    }

    pub fn formatter(&self) -> &'static dyn SqlFormatter {
        self.formatter
    }

    /// Check requests of one kind without binding anything.
    pub fn validate(
        &self,
        table: &OperationTable,
        kind: OperationKind,
        requests: &[QueryOperation],
    ) -> WeaveResult<()> {
        accept(table, kind, requests).map(|_| ())
    }

    /// `WHERE ...` from filter requests, or `""` when none match.
    pub fn filters<B: BindVariable + ?Sized>(
        &self,
        binder: &mut B,
        table: &OperationTable,
        requests: &[QueryOperation],
    ) -> WeaveResult<String> {
        let f = self.formatter;
        let fragments = compose_operations(
            binder,
            f,
            table,
            OperationKind::Filter,
            requests,
            |bound| {
                f.format_filter_operation(bound.operation.metadata().template(), &bound.variables)
            },
            None,
        )?;
        Ok(f.format_filter_operations(&fragments))
    }

    /// `ORDER BY ...` from order requests, or `""` when none match.
    pub fn order<B: BindVariable + ?Sized>(
        &self,
        binder: &mut B,
        table: &OperationTable,
        requests: &[QueryOperation],
    ) -> WeaveResult<String> {
        let f = self.formatter;
        let fragments = compose_operations(
            binder,
            f,
            table,
            OperationKind::Order,
            requests,
            |bound| {
                f.format_order_operation(
                    bound.operation.metadata().template(),
                    &bound.variables,
                    bound.direction,
                )
            },
            None,
        )?;
        Ok(f.format_order_operations(&fragments))
    }

    /// `SET ...` from merge requests, or `""` when none match.
    pub fn updates<B: BindVariable + ?Sized>(
        &self,
        binder: &mut B,
        table: &OperationTable,
        requests: &[QueryOperation],
    ) -> WeaveResult<String> {
        let f = self.formatter;
        let fragments = compose_operations(
            binder,
            f,
            table,
            OperationKind::Merge,
            requests,
            |bound| {
                f.format_update_operation(
                    bound.operation.as_merge().map(|m| m.referenced_column()),
                    bound.operation.metadata().template(),
                    &bound.variables,
                )
            },
            None,
        )?;
        Ok(f.format_update_operations(&fragments))
    }

    /// Column list and values lists for one or more rows of merge requests.
    ///
    /// Every row must request each required merge operation of the table and
    /// produce the same columns as the first row.
    pub fn insert<B: BindVariable + ?Sized>(
        &self,
        binder: &mut B,
        table: &OperationTable,
        rows: &[Vec<QueryOperation>],
    ) -> WeaveResult<InsertClause> {
        let f = self.formatter;

        let mut first_columns: Option<Vec<&str>> = None;
        for (index, row) in rows.iter().enumerate() {
            for required in table.required_merges() {
                let name = required.operation().name();
                if !row.iter().any(|request| request.name == name) {
                    return Err(WeaveError::RequiredOperation {
                        operation: name.to_string(),
                        table: table.name().to_string(),
                    });
                }
            }

            let accepted = accept(table, OperationKind::Merge, row)?;
            let columns: Vec<&str> = accepted
                .iter()
                .filter_map(|(op, _)| op.as_merge().map(|m| m.referenced_column()))
                .collect();
            for (i, column) in columns.iter().enumerate() {
                if columns[..i].contains(column) {
                    return Err(WeaveError::DuplicateColumn {
                        row: index,
                        column: column.to_string(),
                    });
                }
            }
            match &first_columns {
                None => first_columns = Some(columns),
                Some(first) if *first != columns => {
                    return Err(WeaveError::ColumnMismatch { row: index });
                }
                Some(_) => {}
            }
        }

        let mut columns = Vec::new();
        let mut lists = Vec::with_capacity(rows.len());
        for (index, row) in rows.iter().enumerate() {
            let mut row_columns = Vec::new();
            let mut collect = |operation: &Operation, _ordinal: usize| {
                if let Some(merge) = operation.as_merge() {
                    row_columns.push(f.format_insert_column(Some(merge.referenced_column())));
                }
            };
            let values = compose_operations(
                binder,
                f,
                table,
                OperationKind::Merge,
                row,
                |bound| {
                    f.format_insert_operation(
                        bound.operation.metadata().template(),
                        &bound.variables,
                    )
                },
                Some(&mut collect),
            )?;
            if index == 0 {
                columns = row_columns;
            }
            lists.push(f.format_insert_operations(&values));
        }

        Ok(InsertClause {
            columns: f.format_insert_columns(&columns),
            values: f.format_multiple_insert_values_lists(&lists),
        })
    }

    /// Bind `skip`/`take` and render the dialect's pagination clause.
    pub fn pagination<B: BindVariable + ?Sized>(&self, binder: &mut B, page: Page) -> String {
        let f = self.formatter;
        let skip = binder.add_variable("skip", Value::Int(page.skip), DbType::Int64, true);
        let take = binder.add_variable("take", Value::Int(page.take), DbType::Int64, true);
        f.format_pagination(&f.format_variable(Some(&skip)), &f.format_variable(Some(&take)))
    }

    /// Fill a get statement: `{0}` filters, `{1}` order, `{2}` pagination.
    pub fn get_query<B: BindVariable + ?Sized>(
        &self,
        binder: &mut B,
        table: &OperationTable,
        base: &Template,
        filters: &[QueryOperation],
        order: &[QueryOperation],
        page: Option<Page>,
    ) -> WeaveResult<String> {
        self.validate(table, OperationKind::Order, order)?;
        let filters = self.filters(binder, table, filters)?;
        let order = self.order(binder, table, order)?;
        let pagination = page.map(|page| self.pagination(binder, page));
        Ok(self.formatter.format_get_query(
            base,
            Some(&filters),
            Some(&order),
            pagination.as_deref(),
        ))
    }

    /// Fill a delete statement: `{0}` filters.
    pub fn delete_query<B: BindVariable + ?Sized>(
        &self,
        binder: &mut B,
        table: &OperationTable,
        base: &Template,
        filters: &[QueryOperation],
    ) -> WeaveResult<String> {
        let filters = self.filters(binder, table, filters)?;
        Ok(self.formatter.format_delete_query(base, Some(&filters)))
    }

    /// Fill an update statement: `{0}` set list, `{1}` filters.
    pub fn update_query<B: BindVariable + ?Sized>(
        &self,
        binder: &mut B,
        table: &OperationTable,
        base: &Template,
        updates: &[QueryOperation],
        filters: &[QueryOperation],
    ) -> WeaveResult<String> {
        self.validate(table, OperationKind::Filter, filters)?;
        let updates = self.updates(binder, table, updates)?;
        let filters = self.filters(binder, table, filters)?;
        Ok(self
            .formatter
            .format_update_query(base, Some(&updates), Some(&filters)))
    }

    /// Fill an insert statement: `{0}` columns, `{1}` values lists.
    pub fn insert_query<B: BindVariable + ?Sized>(
        &self,
        binder: &mut B,
        table: &OperationTable,
        base: &Template,
        rows: &[Vec<QueryOperation>],
    ) -> WeaveResult<String> {
        let clause = self.insert(binder, table, rows)?;
        Ok(self
            .formatter
            .format_insert_query(base, Some(&clause.columns), Some(&clause.values)))
    }
}
