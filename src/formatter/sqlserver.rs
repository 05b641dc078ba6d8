use super::{Dialect, SqlFormatter};

/// SQL Server formatter: `[name]` identifiers, `OFFSET .. FETCH` pagination.
pub struct SqlServerFormatter;

impl SqlFormatter for SqlServerFormatter {
    fn dialect(&self) -> Dialect {
        Dialect::SqlServer
    }

    fn identifier_quotes(&self) -> (&'static str, &'static str) {
        ("[", "]")
    }

    fn format_pagination(&self, skip: &str, take: &str) -> String {
        // T-SQL only accepts this after an ORDER BY; the base statement owns that.
        format!("OFFSET {} ROWS FETCH NEXT {} ROWS ONLY", skip, take)
    }
}
