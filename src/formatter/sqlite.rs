use super::{Dialect, SqlFormatter};

/// SQLite formatter: `"name"` identifiers, `LIMIT .. OFFSET` pagination.
pub struct SqliteFormatter;

impl SqlFormatter for SqliteFormatter {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn identifier_quotes(&self) -> (&'static str, &'static str) {
        ("\"", "\"")
    }

    fn format_pagination(&self, skip: &str, take: &str) -> String {
        format!("LIMIT {} OFFSET {}", take, skip)
    }
}
