//! Bound parameters and collision-safe naming.

use tracing::trace;

use crate::value::{DbType, Value};

/// Something that accepts bound variables and reports the name it used.
pub trait BindVariable {
    /// Register `value` under `name`.
    ///
    /// With `unique`, a per-owner counter suffix is appended so repeated
    /// registrations of one base name never collide. Returns the bound name,
    /// without the dialect's variable marker.
    fn add_variable(&mut self, name: &str, value: Value, db_type: DbType, unique: bool) -> String;
}

/// A value registered for the next batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundParameter {
    pub name: String,
    pub value: Value,
    pub db_type: DbType,
}

/// Ordered bound parameters plus the unique-name counter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSet {
    parameters: Vec<BoundParameter>,
    counter: u64,
}

impl Default for ParameterSet {
    fn default() -> Self {
        Self {
            parameters: Vec::new(),
            counter: 1,
        }
    }
}

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&BoundParameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &BoundParameter> {
        self.parameters.iter()
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// The suffix the next unique registration will get.
    pub fn next_suffix(&self) -> u64 {
        self.counter
    }

    /// Drop the bound values, keeping the counter.
    pub(crate) fn clear(&mut self) {
        self.parameters.clear();
    }

    /// Start numbering from 1 again. Only valid once nothing is bound.
    pub(crate) fn reset_counter(&mut self) {
        debug_assert!(self.parameters.is_empty());
        self.counter = 1;
    }

    fn insert(&mut self, parameter: BoundParameter) {
        match self.parameters.iter_mut().find(|p| p.name == parameter.name) {
            Some(existing) => *existing = parameter,
            None => self.parameters.push(parameter),
        }
    }
}

impl BindVariable for ParameterSet {
    fn add_variable(&mut self, name: &str, value: Value, db_type: DbType, unique: bool) -> String {
        let bound = if unique {
            let suffix = self.counter;
            self.counter += 1;
            format!("{}_{}", name, suffix)
        } else {
            name.to_string()
        };
        trace!(name = %bound, %db_type, "bound variable");
        self.insert(BoundParameter {
            name: bound.clone(),
            value,
            db_type,
        });
        bound
    }
}

impl<'a> IntoIterator for &'a ParameterSet {
    type Item = &'a BoundParameter;
    type IntoIter = std::slice::Iter<'a, BoundParameter>;

    fn into_iter(self) -> Self::IntoIter {
        self.parameters.iter()
    }
}
