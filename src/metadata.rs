//! Declarative operation metadata.
//!
//! An [`OperationTable`] holds the named operations a caller may request for
//! one logical entity, e.g. "everything you can filter, sort, insert or
//! update on Genres". Each entry is an [`Operation`]:
//!
//! | Kind     | Used for                 | Extras                                 |
//! |----------|--------------------------|----------------------------------------|
//! | `Filter` | `WHERE` predicates       | none                                   |
//! | `Order`  | `ORDER BY` terms         | reserved `direction` parameter, slot 0 |
//! | `Merge`  | `INSERT` and `SET` items | referenced column, required flag       |

use std::collections::BTreeMap;

use crate::error::{WeaveError, WeaveResult};
use crate::template::Template;
use crate::value::{DbType, Value};

/// Name of the parameter every ordering operation carries implicitly.
pub const DIRECTION_PARAMETER: &str = "direction";

/// One declared parameter of an operation.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterMetadata {
    name: String,
    db_type: DbType,
    has_default: bool,
    default_value: Option<Value>,
}

impl ParameterMetadata {
    /// A mandatory parameter whose declared type comes from the host type `T`.
    pub fn of<T: ?Sized + 'static>(name: impl Into<String>) -> Self {
        Self::declare(name, DbType::of::<T>(), false, None)
    }

    /// Declare a parameter.
    ///
    /// The parameter has a default when `has_default` is set *or* a default
    /// value is given. A flag-only default binds `NULL`.
    pub fn declare(
        name: impl Into<String>,
        db_type: DbType,
        has_default: bool,
        default_value: Option<Value>,
    ) -> Self {
        Self {
            name: name.into(),
            db_type,
            has_default: has_default || default_value.is_some(),
            default_value,
        }
    }

    /// Give this parameter a default value.
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.has_default = true;
        self.default_value = Some(value.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn db_type(&self) -> DbType {
        self.db_type
    }

    pub fn has_default(&self) -> bool {
        self.has_default
    }

    pub fn default_value(&self) -> Option<&Value> {
        self.default_value.as_ref()
    }

    /// The value bound when a request leaves this parameter out.
    pub(crate) fn fallback(&self) -> Option<Value> {
        self.has_default
            .then(|| self.default_value.clone().unwrap_or(Value::Null))
    }
}

/// A named SQL template and its parameters.
///
/// Invariant: the template uses exactly the slots `0..parameters.len()`.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationMetadata {
    name: String,
    template: Template,
    parameters: Vec<ParameterMetadata>,
}

impl OperationMetadata {
    pub fn new(
        name: impl Into<String>,
        template: &str,
        parameters: Vec<ParameterMetadata>,
    ) -> WeaveResult<Self> {
        let metadata = Self {
            name: name.into(),
            template: Template::parse(template)?,
            parameters,
        };
        metadata.check_slots()?;
        Ok(metadata)
    }

    fn check_slots(&self) -> WeaveResult<()> {
        let expected = self.parameters.len();
        let slots = self.template.slot_indices();
        if slots.len() != expected || slots.last().is_some_and(|last| *last + 1 != expected) {
            return Err(WeaveError::SlotMismatch {
                operation: self.name.clone(),
                parameters: expected,
                slots: slots.len(),
            });
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn template(&self) -> &Template {
        &self.template
    }

    pub fn parameters(&self) -> &[ParameterMetadata] {
        &self.parameters
    }
}

/// Operation metadata for inserts and updates.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOperationMetadata {
    operation: OperationMetadata,
    referenced_column: String,
    is_required: bool,
}

impl MergeOperationMetadata {
    pub fn new(
        operation: OperationMetadata,
        referenced_column: impl Into<String>,
        is_required: bool,
    ) -> Self {
        Self {
            operation,
            referenced_column: referenced_column.into(),
            is_required,
        }
    }

    pub fn operation(&self) -> &OperationMetadata {
        &self.operation
    }

    /// Column the operation's value is written to.
    pub fn referenced_column(&self) -> &str {
        &self.referenced_column
    }

    /// Whether every inserted row must supply this operation.
    pub fn is_required(&self) -> bool {
        self.is_required
    }
}

/// Which composer an operation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Filter,
    Order,
    Merge,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationKind::Filter => write!(f, "filter"),
            OperationKind::Order => write!(f, "order"),
            OperationKind::Merge => write!(f, "merge"),
        }
    }
}

/// An entry of an [`OperationTable`].
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Filter(OperationMetadata),
    /// Parameters end with the reserved [`DIRECTION_PARAMETER`], which renders
    /// into slot 0; declared parameters fill slots 1 and up.
    Order(OperationMetadata),
    Merge(MergeOperationMetadata),
}

impl Operation {
    /// A `WHERE` predicate.
    pub fn filter(
        name: impl Into<String>,
        template: &str,
        parameters: Vec<ParameterMetadata>,
    ) -> WeaveResult<Self> {
        OperationMetadata::new(name, template, parameters).map(Operation::Filter)
    }

    /// An `ORDER BY` term. `{0}` is the direction; declared parameters start at `{1}`.
    ///
    /// ```
    /// use sqlweave::metadata::{Operation, DIRECTION_PARAMETER};
    ///
    /// let op = Operation::order("ByName", "[Name] {0}", vec![]).unwrap();
    /// assert_eq!(op.metadata().parameters()[0].name(), DIRECTION_PARAMETER);
    /// ```
    pub fn order(
        name: impl Into<String>,
        template: &str,
        mut parameters: Vec<ParameterMetadata>,
    ) -> WeaveResult<Self> {
        let name = name.into();
        if parameters.iter().any(|p| p.name() == DIRECTION_PARAMETER) {
            return Err(WeaveError::Config(format!(
                "order operation '{}' cannot declare the reserved parameter '{}'",
                name, DIRECTION_PARAMETER
            )));
        }
        parameters.push(ParameterMetadata::declare(
            DIRECTION_PARAMETER,
            DbType::String,
            true,
            None,
        ));
        OperationMetadata::new(name, template, parameters).map(Operation::Order)
    }

    /// A value written to `referenced_column` on insert or update.
    pub fn merge(
        name: impl Into<String>,
        template: &str,
        parameters: Vec<ParameterMetadata>,
        referenced_column: impl Into<String>,
        is_required: bool,
    ) -> WeaveResult<Self> {
        let operation = OperationMetadata::new(name, template, parameters)?;
        Ok(Operation::Merge(MergeOperationMetadata::new(
            operation,
            referenced_column,
            is_required,
        )))
    }

    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::Filter(_) => OperationKind::Filter,
            Operation::Order(_) => OperationKind::Order,
            Operation::Merge(_) => OperationKind::Merge,
        }
    }

    pub fn name(&self) -> &str {
        self.metadata().name()
    }

    pub fn metadata(&self) -> &OperationMetadata {
        match self {
            Operation::Filter(metadata) | Operation::Order(metadata) => metadata,
            Operation::Merge(merge) => merge.operation(),
        }
    }

    pub fn as_merge(&self) -> Option<&MergeOperationMetadata> {
        match self {
            Operation::Merge(merge) => Some(merge),
            _ => None,
        }
    }
}

/// Name-keyed operations for one logical entity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OperationTable {
    name: String,
    operations: BTreeMap<String, Operation>,
}

impl OperationTable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            operations: BTreeMap::new(),
        }
    }

    /// Add an operation; names are unique within a table.
    pub fn insert(&mut self, operation: Operation) -> WeaveResult<()> {
        if self.operations.contains_key(operation.name()) {
            return Err(WeaveError::DuplicateOperation(operation.name().to_string()));
        }
        self.operations
            .insert(operation.name().to_string(), operation);
        Ok(())
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, operation: WeaveResult<Operation>) -> WeaveResult<Self> {
        self.insert(operation?)?;
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self, name: &str) -> Option<&Operation> {
        self.operations.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Operation> {
        self.operations.values()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Merge operations every inserted row has to supply.
    pub fn required_merges(&self) -> impl Iterator<Item = &MergeOperationMetadata> {
        self.iter()
            .filter_map(Operation::as_merge)
            .filter(|merge| merge.is_required())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_or_semantics() {
        let flag_only = ParameterMetadata::declare("p", DbType::Int32, true, None);
        assert!(flag_only.has_default());
        assert_eq!(flag_only.fallback(), Some(Value::Null));

        let value_only = ParameterMetadata::declare("p", DbType::Int32, false, Some(Value::Int(3)));
        assert!(value_only.has_default());
        assert_eq!(value_only.fallback(), Some(Value::Int(3)));

        let mandatory = ParameterMetadata::of::<i32>("p");
        assert!(!mandatory.has_default());
        assert_eq!(mandatory.db_type(), DbType::Int32);
        assert_eq!(mandatory.fallback(), None);
    }

    #[test]
    fn test_slot_mismatch() {
        let err = Operation::filter("NameEquals", "[Name] = {0}", vec![]).unwrap_err();
        assert!(matches!(
            err,
            WeaveError::SlotMismatch { parameters: 0, slots: 1, .. }
        ));

        // A gap in slot numbering is a mismatch even when the count lines up.
        let err = Operation::filter(
            "Gap",
            "{0} = {2}",
            vec![ParameterMetadata::of::<i32>("a"), ParameterMetadata::of::<i32>("b")],
        )
        .unwrap_err();
        assert!(matches!(err, WeaveError::SlotMismatch { .. }));
    }

    #[test]
    fn test_order_appends_direction() {
        let op = Operation::order(
            "ByDistance",
            "ABS([Score] - {1}) {0}",
            vec![ParameterMetadata::of::<f64>("target")],
        )
        .unwrap();
        let names: Vec<&str> = op.metadata().parameters().iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["target", DIRECTION_PARAMETER]);
        assert_eq!(op.kind(), OperationKind::Order);

        // Without a {0} slot the direction has nowhere to go.
        assert!(Operation::order("ByName", "[Name]", vec![]).is_err());
    }

    #[test]
    fn test_order_rejects_declared_direction() {
        let err = Operation::order(
            "ByOffset",
            "[Score] + {1} {0}",
            vec![ParameterMetadata::of::<i32>(DIRECTION_PARAMETER)],
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Configuration error: order operation 'ByOffset' cannot declare the reserved parameter 'direction'"
        );

        // Filters have no direction, so the name is free there.
        let filter = Operation::filter(
            "Heading",
            "[Heading] = {0}",
            vec![ParameterMetadata::of::<String>(DIRECTION_PARAMETER)],
        );
        assert!(filter.is_ok());
    }

    #[test]
    fn test_table_rejects_duplicates() {
        let table = OperationTable::new("Genres")
            .with(Operation::filter("Any", "1 = 1", vec![]))
            .unwrap();
        let err = table
            .with(Operation::filter("Any", "1 = 0", vec![]))
            .unwrap_err();
        assert!(matches!(err, WeaveError::DuplicateOperation(name) if name == "Any"));
    }

    #[test]
    fn test_required_merges() {
        let table = OperationTable::new("Genres")
            .with(Operation::merge(
                "Name",
                "{0}",
                vec![ParameterMetadata::of::<String>("value")],
                "Name",
                true,
            ))
            .and_then(|t| {
                t.with(Operation::merge(
                    "Note",
                    "{0}",
                    vec![ParameterMetadata::of::<String>("value")],
                    "Note",
                    false,
                ))
            })
            .unwrap();
        let required: Vec<&str> = table.required_merges().map(|m| m.referenced_column()).collect();
        assert_eq!(required, vec!["Name"]);
    }
}
