//! Result-shape and parameter metadata exposed to callers.
//!
//! `ResultMetadata` may be unavailable at prepare time (driver-dependent)
//! and is then resolved lazily from the live result set at first execution.
//! Once resolved it never changes for the life of the prepared query.

use serde::{Deserialize, Serialize};

use crate::driver::ParameterDescriptor;
use crate::value::{DataKind, Value};

/// A single column of the result shape.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    /// Source column name.
    pub name: String,
    /// Optional alias the column is exposed under.
    pub alias: Option<String>,
    /// Declared kind of the column.
    pub kind: DataKind,
    /// 1-based position within the result set.
    pub position: u32,
}

impl ColumnDescriptor {
    /// Creates a descriptor at the given 1-based position.
    pub fn new(name: impl Into<String>, kind: DataKind, position: u32) -> Self {
        Self {
            name: name.into(),
            alias: None,
            kind,
            position,
        }
    }

    /// Sets the exposed alias.
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// The name this column answers to: alias when present, source name
    /// otherwise.
    pub fn exposed_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

/// Ordered column list describing the shape of a result set.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultMetadata {
    columns: Vec<ColumnDescriptor>,
}

impl ResultMetadata {
    /// Builds metadata from an ordered column list.
    pub fn new(columns: Vec<ColumnDescriptor>) -> Self {
        Self { columns }
    }

    /// Number of columns.
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// All columns in positional order.
    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    /// Looks up a column by 1-based position.
    pub fn column(&self, position: u32) -> Option<&ColumnDescriptor> {
        position
            .checked_sub(1)
            .and_then(|i| self.columns.get(i as usize))
    }

    /// Looks up a column by exposed name.
    pub fn column_by_name(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.exposed_name() == name)
    }
}

/// One row of a result set, values in column order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResultRow {
    values: Vec<Value>,
}

impl ResultRow {
    /// Builds a row from values in column order.
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    /// Value at the given 1-based column position.
    pub fn value(&self, position: u32) -> Option<&Value> {
        position
            .checked_sub(1)
            .and_then(|i| self.values.get(i as usize))
    }

    /// All values in column order.
    pub fn values(&self) -> &[Value] {
        &self.values
    }
}

impl From<Vec<Value>> for ResultRow {
    fn from(values: Vec<Value>) -> Self {
        Self::new(values)
    }
}

/// Caller-facing view over one driver-reported parameter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParameterMetadata {
    descriptor: ParameterDescriptor,
}

impl ParameterMetadata {
    pub(crate) fn new(descriptor: ParameterDescriptor) -> Self {
        Self { descriptor }
    }

    /// Parameter name, when the driver reports one.
    pub fn name(&self) -> Option<&str> {
        self.descriptor.name.as_deref()
    }

    /// 1-based parameter position.
    pub fn position(&self) -> u32 {
        self.descriptor.position
    }

    /// Declared kind.
    pub fn kind(&self) -> DataKind {
        self.descriptor.kind
    }

    /// Whether values flow into this parameter.
    pub fn is_input_mode(&self) -> bool {
        self.descriptor.input
    }

    /// Whether values flow out of this parameter.
    pub fn is_output_mode(&self) -> bool {
        self.descriptor.output
    }
}
