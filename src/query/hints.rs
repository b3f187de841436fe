//! Caller-declared hints and the frozen per-query configuration.
//!
//! Everything a caller wants to say about a query before preparation
//! (driver properties, parameter hints, custom fields, column hints, the
//! projection list, the row cap) accumulates in a [`QueryConfigBuilder`]
//! and freezes into an immutable [`QueryConfig`] handed to the preparer.
//! Nothing here touches a driver.

use crate::driver::ColumnSpec;
use crate::error::{QuarryError, Result};
use crate::value::{DataKind, Value};

/// Caller-declared metadata about one statement parameter.
#[derive(Clone, Debug, PartialEq)]
pub struct ParameterHint {
    name: Option<String>,
    position: i32,
    kind: DataKind,
    input: bool,
    output: bool,
    default_value: Value,
}

impl ParameterHint {
    /// Creates an input-mode hint of the given kind, unnamed and
    /// unpositioned.
    pub fn input(kind: DataKind) -> Self {
        Self {
            name: None,
            position: 0,
            kind,
            input: true,
            output: false,
            default_value: Value::Null,
        }
    }

    /// Creates an output-mode hint of the given kind.
    pub fn output(kind: DataKind) -> Self {
        Self {
            input: false,
            output: true,
            ..Self::input(kind)
        }
    }

    /// Names the parameter.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Positions the parameter (1-based). A non-positive position means
    /// "unordered": the parameter is addressed by name.
    pub fn with_position(mut self, position: i32) -> Self {
        self.position = position;
        self
    }

    /// Sets the default input value.
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default_value = value.into();
        self
    }

    /// Marks the hint as flowing both ways.
    pub fn and_output(mut self) -> Self {
        self.output = true;
        self
    }

    /// Parameter name, if declared.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Declared position; non-positive means unordered.
    pub fn position(&self) -> i32 {
        self.position
    }

    /// Declared kind.
    pub fn kind(&self) -> DataKind {
        self.kind
    }

    /// Whether values flow into the parameter.
    pub fn is_input_mode(&self) -> bool {
        self.input
    }

    /// Whether values flow out of the parameter.
    pub fn is_output_mode(&self) -> bool {
        self.output
    }

    /// The declared default input value.
    pub fn default_value(&self) -> &Value {
        &self.default_value
    }
}

/// Caller-declared hint about how one result column should be exposed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnHint {
    name: String,
    alias: Option<String>,
    kind: DataKind,
    native_type: Option<String>,
    position: u32,
}

impl ColumnHint {
    /// Creates a hint for the named source column with no overrides.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: None,
            kind: DataKind::Any,
            native_type: None,
            position: 0,
        }
    }

    /// Sets the alias the column is exposed under.
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Declares the column's kind. `Any` means no override.
    pub fn with_kind(mut self, kind: DataKind) -> Self {
        self.kind = kind;
        self
    }

    /// Records the driver-native type name.
    pub fn with_native_type(mut self, native: impl Into<String>) -> Self {
        self.native_type = Some(native.into());
        self
    }

    /// Pins the column to a 1-based position; zero leaves it unpinned.
    pub fn with_position(mut self, position: u32) -> Self {
        self.position = position;
        self
    }

    /// Source column name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Translates into the driver-facing spec: `Any` becomes "no
    /// override", an unpinned position becomes `None`.
    pub(crate) fn driver_spec(&self) -> ColumnSpec {
        ColumnSpec {
            name: self.name.clone(),
            alias: self.alias.clone(),
            kind: match self.kind {
                DataKind::Any => None,
                kind => Some(kind),
            },
            native_type: self.native_type.clone(),
            position: (self.position > 0).then_some(self.position),
        }
    }
}

/// A caller-synthesized column, not part of the driver's native schema.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CustomField {
    name: String,
    kind: DataKind,
}

impl CustomField {
    /// The field name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The declared kind.
    pub fn kind(&self) -> DataKind {
        self.kind
    }
}

/// Immutable per-query configuration, frozen before preparation.
#[derive(Clone, Debug, Default)]
pub struct QueryConfig {
    properties: Vec<(String, String)>,
    parameter_hints: Vec<ParameterHint>,
    custom_fields: Vec<CustomField>,
    result_hints: Vec<ColumnHint>,
    projection: Vec<String>,
    row_limit: u32,
}

impl QueryConfig {
    /// Starts building a configuration.
    pub fn builder() -> QueryConfigBuilder {
        QueryConfigBuilder::default()
    }

    /// Accumulated driver properties, in declaration order, duplicates
    /// preserved.
    pub fn properties(&self) -> &[(String, String)] {
        &self.properties
    }

    /// Declared parameter hints, in declaration order.
    pub fn parameter_hints(&self) -> &[ParameterHint] {
        &self.parameter_hints
    }

    /// Declared custom fields, in declaration order.
    pub fn custom_fields(&self) -> &[CustomField] {
        &self.custom_fields
    }

    /// Declared column hints.
    pub fn result_hints(&self) -> &[ColumnHint] {
        &self.result_hints
    }

    /// Projected field names; empty means "project everything".
    pub fn projection(&self) -> &[String] {
        &self.projection
    }

    /// The query's row-fetch cap; zero means unlimited.
    pub fn row_limit(&self) -> u32 {
        self.row_limit
    }
}

/// Mutable accumulator for [`QueryConfig`].
#[derive(Debug, Default)]
pub struct QueryConfigBuilder {
    config: QueryConfig,
}

impl QueryConfigBuilder {
    /// Adds a driver property. Duplicate names are kept in order;
    /// last-wins semantics are the driver's business.
    pub fn add_property(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.config.properties.push((name.into(), value.into()));
    }

    /// Replaces the parameter hints.
    pub fn set_parameter_hints(&mut self, hints: Vec<ParameterHint>) {
        self.config.parameter_hints = hints;
    }

    /// Declares a custom field. The name must be non-empty and unique
    /// within this query; insertion order is preserved because drivers may
    /// expose fields positionally.
    pub fn declare_custom_field(&mut self, name: impl Into<String>, kind: DataKind) -> Result<()> {
        let name = name.into();
        if name.is_empty() {
            return Err(QuarryError::EmptyCustomFieldName);
        }
        if self.config.custom_fields.iter().any(|f| f.name == name) {
            return Err(QuarryError::DuplicateCustomField { name });
        }
        self.config.custom_fields.push(CustomField { name, kind });
        Ok(())
    }

    /// Replaces the column hints.
    pub fn set_result_hints(&mut self, hints: Vec<ColumnHint>) {
        self.config.result_hints = hints;
    }

    /// Replaces the projection list. An empty list means "project
    /// everything" and clears any earlier list.
    pub fn set_result_projection(&mut self, fields: Vec<String>) {
        self.config.projection = fields;
    }

    /// Sets the query's row-fetch cap; zero means unlimited.
    pub fn set_row_limit(&mut self, limit: u32) {
        self.config.row_limit = limit;
    }

    /// Freezes the configuration.
    pub fn finish(self) -> QueryConfig {
        self.config
    }
}
