//! # sqlweave
//!
//! > **Declare operations once. Compose them per request.**
//!
//! sqlweave builds parameterized SQL from named operation templates and runs
//! the result as one batched transaction.
//!
//! ## Quick Example
//!
//! ```rust
//! use sqlweave::prelude::*;
//!
//! let table = OperationTable::new("Genres")
//!     .with(Operation::filter(
//!         "NameEquals",
//!         "[Name] = {0}",
//!         vec![ParameterMetadata::of::<String>("name")],
//!     ))?
//!     .with(Operation::order("ByName", "[Name] {0}", vec![]))?;
//!
//! let base = Template::parse("SELECT * FROM [Genres] {0} {1} {2};")?;
//! let mut params = ParameterSet::new();
//! let sql = Composer::new(Dialect::SqlServer).get_query(
//!     &mut params,
//!     &table,
//!     &base,
//!     &[QueryOperation::new("NameEquals").with("name", "Rock")],
//!     &[QueryOperation::new("ByName").with("direction", "desc")],
//!     None,
//! )?;
//! assert_eq!(sql, "SELECT * FROM [Genres] WHERE [Name] = @name_1 ORDER BY [Name] DESC ;");
//! # Ok::<(), sqlweave::WeaveError>(())
//! ```
//!
//! ## Pieces
//!
//! | Module      | Role                                              |
//! |-------------|---------------------------------------------------|
//! | `template`  | `{n}` slot templates                              |
//! | `metadata`  | Operation declarations and name-keyed tables      |
//! | `formatter` | Dialect rendering (`[x]`/`OFFSET`, `"x"`/`LIMIT`) |
//! | `compose`   | Requests to clauses, binding variables            |
//! | `context`   | Statement batching and transactions               |
//! | `sqlite`    | Embedded SQLite connection                        |

pub mod compose;
pub mod config;
pub mod context;
pub mod error;
pub mod formatter;
pub mod metadata;
pub mod parser;
pub mod sqlite;
pub mod template;
pub mod value;

pub use error::{WeaveError, WeaveResult};

pub mod prelude {
    pub use crate::compose::{Composer, InsertClause, Page, QueryOperation, compose_operations};
    pub use crate::config::{StatementKind, WeaveConfig};
    pub use crate::context::{
        BindVariable, Connection, ContextState, ParameterSet, QueryContext, ResultReader,
        ResultSet,
    };
    pub use crate::error::*;
    pub use crate::formatter::{Dialect, SortDirection, SqlFormatter};
    pub use crate::metadata::{
        DIRECTION_PARAMETER, MergeOperationMetadata, Operation, OperationKind,
        OperationMetadata, OperationTable, ParameterMetadata,
    };
    pub use crate::parser::{parse_request, parse_requests};
    pub use crate::sqlite::{SqliteConfig, SqliteConnection};
    pub use crate::template::Template;
    pub use crate::value::{DbType, Value};
}

/// Parse a request expression such as `NameEquals(name='Rock')`.
///
/// # Example
///
/// ```
/// use sqlweave::parse;
///
/// let request = parse("NameEquals(name='Rock')").unwrap();
/// assert_eq!(request.name, "NameEquals");
/// ```
pub fn parse(input: &str) -> WeaveResult<compose::QueryOperation> {
    parser::parse_request(input)
}
