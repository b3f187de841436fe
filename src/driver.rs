//! Data-source driver boundary.
//!
//! The coordinator never talks to a concrete data source; it drives these
//! traits. A driver supplies a statement per query, reports its capabilities
//! (named parameters, named or multiple result sets), and hands back result
//! sets and metadata on request. All calls are blocking from the driver's
//! point of view; the execution coordinator decides where they run.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::{QuarryError, Result};
use crate::metadata::{ColumnDescriptor, ResultMetadata, ResultRow};
use crate::query::hints::ParameterHint;
use crate::value::{DataKind, Value};

/// How a result set is addressed on the driver statement.
///
/// Name takes priority over number; `Default` means "the only (or primary)
/// result set the driver exposes".
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResultSetRef {
    /// The driver's default result set.
    Default,
    /// A result set addressed by name.
    Named(String),
    /// A result set addressed by 1-based number.
    Numbered(u32),
}

impl std::fmt::Display for ResultSetRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResultSetRef::Default => f.write_str("default"),
            ResultSetRef::Named(name) => write!(f, "'{name}'"),
            ResultSetRef::Numbered(number) => write!(f, "#{number}"),
        }
    }
}

/// Driver-facing column hint, translated from a caller [`crate::query::hints::ColumnHint`].
///
/// A `kind` of `None` means the caller declared no type override.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnSpec {
    /// Source column name.
    pub name: String,
    /// Alias to expose the column under.
    pub alias: Option<String>,
    /// Declared kind override, if any.
    pub kind: Option<DataKind>,
    /// Driver-native type name, passed through untouched.
    pub native_type: Option<String>,
    /// 1-based position, when the caller pinned one.
    pub position: Option<u32>,
}

/// One parameter as reported by the driver's own metadata.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParameterDescriptor {
    /// Parameter name, when the driver knows one.
    pub name: Option<String>,
    /// 1-based position in the statement's parameter list.
    pub position: u32,
    /// Declared kind.
    pub kind: DataKind,
    /// Whether values flow into the parameter.
    pub input: bool,
    /// Whether values flow out of the parameter.
    pub output: bool,
}

/// Connection-level driver surface: the factory for statements.
pub trait DriverConnection: Send + Sync {
    /// Prepares a statement for the given query text and type tag.
    fn prepare_statement(&self, text: &str, query_type: &str) -> Result<Box<dyn DriverStatement>>;
}

/// A prepared driver statement.
///
/// The coordinator owns exactly one of these per prepared query and releases
/// it exactly once, through [`DriverStatement::close`].
pub trait DriverStatement: Send {
    /// Pushes a custom property onto the statement.
    fn set_property(&mut self, name: &str, value: &str) -> Result<()>;

    /// Registers a parameter hint. All hints are registered before any
    /// column-level declarations are applied.
    fn add_parameter_hint(&mut self, hint: &ParameterHint) -> Result<()>;

    /// Binds a parameter value by name.
    fn set_parameter_by_name(&mut self, name: &str, value: &Value) -> Result<()>;

    /// Binds a parameter value by 1-based position.
    fn set_parameter_by_position(&mut self, position: u32, value: &Value) -> Result<()>;

    /// Declares a caller-synthesized column on the addressed result set.
    fn declare_custom_column(
        &mut self,
        result_set: &ResultSetRef,
        name: &str,
        kind: DataKind,
    ) -> Result<()>;

    /// Applies a column hint to the addressed result set.
    fn add_column_hint(&mut self, result_set: &ResultSetRef, hint: &ColumnSpec) -> Result<()>;

    /// Restricts the addressed result set to the named columns.
    fn set_columns_projection(&mut self, result_set: &ResultSetRef, fields: &[String])
        -> Result<()>;

    /// Caps the number of rows the driver will fetch. Zero means no cap.
    fn set_max_rows(&mut self, limit: u32) -> Result<()>;

    /// Whether parameters can be bound by name.
    fn supports_named_parameters(&self) -> bool;

    /// Whether result sets can be addressed by name.
    fn supports_named_results(&self) -> bool;

    /// Whether the statement can expose more than one result set.
    fn supports_multiple_result_sets(&self) -> bool;

    /// Resolves the generic date kind to the concrete temporal kind this
    /// driver expects for the given query type.
    fn effective_date_kind(&self, _query_type: &str) -> DataKind {
        DataKind::Timestamp
    }

    /// Result metadata for the addressed result set, when the driver can
    /// supply it at this point in the statement's life.
    fn metadata(&mut self, result_set: &ResultSetRef) -> Result<Option<ResultMetadata>>;

    /// Hands back the addressed result set. Only valid after `execute`.
    fn result_set(&mut self, result_set: &ResultSetRef) -> Result<Box<dyn DriverResultSet>>;

    /// The driver's own view of the statement's parameters.
    fn parameter_metadata(&self) -> Result<Vec<ParameterDescriptor>>;

    /// Reads a parameter value back by 1-based position.
    fn parameter_value_by_index(&mut self, index: u32) -> Result<Value>;

    /// Reads a parameter value back by name.
    fn parameter_value_by_name(&mut self, name: &str) -> Result<Value>;

    /// Runs the statement against the data source. Blocking; never
    /// interrupted by the coordinator.
    fn execute(&mut self) -> Result<()>;

    /// Releases the statement handle.
    fn close(&mut self) -> Result<()>;
}

/// A live driver result set.
pub trait DriverResultSet: Send {
    /// Result metadata, when available from the live result.
    fn metadata(&mut self) -> Result<Option<ResultMetadata>>;

    /// Fetches the next row, `None` at end of data.
    fn fetch(&mut self) -> Result<Option<ResultRow>>;

    /// Releases the result set.
    fn close(&mut self) -> Result<()>;
}

#[derive(Clone, Default)]
struct MemoryOptions {
    named_parameters: bool,
    named_results: bool,
    multiple_result_sets: bool,
    metadata_at_prepare: bool,
    columns: Vec<ColumnDescriptor>,
    rows: Vec<ResultRow>,
    execute_delay: Option<Duration>,
    execute_error: Option<String>,
    named_bind_failures: Vec<String>,
    result_set_error: bool,
    result_metadata_missing: bool,
    parameters: Vec<ParameterDescriptor>,
    output_values: HashMap<String, Value>,
}

/// Shared, append-only log of driver calls, for assertions on ordering.
pub type CallLog = Arc<Mutex<Vec<String>>>;

/// In-memory driver used for tests or prototyping.
///
/// Behavior is scripted through `with_*` builders; every statement created
/// by the driver records its calls into a shared log so callers can assert
/// on ordering and cleanup.
#[derive(Clone, Default)]
pub struct MemoryDriver {
    options: MemoryOptions,
    log: CallLog,
}

impl MemoryDriver {
    /// Creates a driver with no capabilities, no columns, and no rows.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables named-parameter support.
    pub fn with_named_parameters(mut self) -> Self {
        self.options.named_parameters = true;
        self
    }

    /// Enables named-result-set support.
    pub fn with_named_results(mut self) -> Self {
        self.options.named_results = true;
        self
    }

    /// Enables multiple-result-set support.
    pub fn with_multiple_result_sets(mut self) -> Self {
        self.options.multiple_result_sets = true;
        self
    }

    /// Makes statement metadata available before execution.
    pub fn with_metadata_at_prepare(mut self) -> Self {
        self.options.metadata_at_prepare = true;
        self
    }

    /// Seeds the result shape.
    pub fn with_columns(mut self, columns: Vec<ColumnDescriptor>) -> Self {
        self.options.columns = columns;
        self
    }

    /// Seeds the rows every result set will produce.
    pub fn with_rows(mut self, rows: Vec<ResultRow>) -> Self {
        self.options.rows = rows;
        self
    }

    /// Makes `execute` sleep before returning, to exercise cancellation.
    pub fn with_execute_delay(mut self, delay: Duration) -> Self {
        self.options.execute_delay = Some(delay);
        self
    }

    /// Makes `execute` fail with the given message.
    pub fn with_execute_error(mut self, message: impl Into<String>) -> Self {
        self.options.execute_error = Some(message.into());
        self
    }

    /// Makes name-based binding fail for the given parameter name.
    pub fn with_named_bind_failure(mut self, name: impl Into<String>) -> Self {
        self.options.named_bind_failures.push(name.into());
        self
    }

    /// Makes result-set retrieval fail after execution.
    pub fn with_result_set_error(mut self) -> Self {
        self.options.result_set_error = true;
        self
    }

    /// Makes the live result set report no metadata.
    pub fn with_result_metadata_missing(mut self) -> Self {
        self.options.result_metadata_missing = true;
        self
    }

    /// Seeds the driver's parameter metadata.
    pub fn with_parameters(mut self, parameters: Vec<ParameterDescriptor>) -> Self {
        self.options.parameters = parameters;
        self
    }

    /// Seeds a value readable back through the output-parameter surface.
    /// The key is the parameter name or its decimal position.
    pub fn with_output_value(mut self, key: impl Into<String>, value: Value) -> Self {
        self.options.output_values.insert(key.into(), value);
        self
    }

    /// Snapshot of every call recorded so far, across all statements.
    pub fn calls(&self) -> Vec<String> {
        self.log.lock().clone()
    }

    /// Number of recorded calls matching `entry` exactly.
    pub fn call_count(&self, entry: &str) -> usize {
        self.log.lock().iter().filter(|c| *c == entry).count()
    }
}

impl DriverConnection for MemoryDriver {
    fn prepare_statement(&self, text: &str, query_type: &str) -> Result<Box<dyn DriverStatement>> {
        self.log
            .lock()
            .push(format!("prepare {query_type}:{text}"));
        Ok(Box::new(MemoryStatement {
            options: self.options.clone(),
            log: Arc::clone(&self.log),
            columns: self.options.columns.clone(),
            executed: false,
            closed: false,
        }))
    }
}

struct MemoryStatement {
    options: MemoryOptions,
    log: CallLog,
    columns: Vec<ColumnDescriptor>,
    executed: bool,
    closed: bool,
}

impl MemoryStatement {
    fn record(&self, entry: String) {
        self.log.lock().push(entry);
    }

    fn current_metadata(&self) -> ResultMetadata {
        ResultMetadata::new(self.columns.clone())
    }
}

impl DriverStatement for MemoryStatement {
    fn set_property(&mut self, name: &str, value: &str) -> Result<()> {
        self.record(format!("set_property {name}={value}"));
        Ok(())
    }

    fn add_parameter_hint(&mut self, hint: &ParameterHint) -> Result<()> {
        self.record(format!(
            "add_parameter_hint {}",
            hint.name().unwrap_or("<unnamed>")
        ));
        Ok(())
    }

    fn set_parameter_by_name(&mut self, name: &str, value: &Value) -> Result<()> {
        if self.options.named_bind_failures.iter().any(|n| n == name) {
            self.record(format!("set_parameter_by_name {name} (rejected)"));
            return Err(QuarryError::driver(format!("unknown parameter '{name}'")));
        }
        self.record(format!("set_parameter_by_name {name}={value}"));
        Ok(())
    }

    fn set_parameter_by_position(&mut self, position: u32, value: &Value) -> Result<()> {
        self.record(format!("set_parameter_by_position {position}={value}"));
        Ok(())
    }

    fn declare_custom_column(
        &mut self,
        result_set: &ResultSetRef,
        name: &str,
        kind: DataKind,
    ) -> Result<()> {
        self.record(format!("declare_custom_column {result_set} {name} {kind}"));
        let position = self.columns.len() as u32 + 1;
        self.columns
            .push(ColumnDescriptor::new(name, kind, position));
        Ok(())
    }

    fn add_column_hint(&mut self, result_set: &ResultSetRef, hint: &ColumnSpec) -> Result<()> {
        self.record(format!("add_column_hint {result_set} {}", hint.name));
        if let Some(column) = self.columns.iter_mut().find(|c| c.name == hint.name) {
            if let Some(kind) = hint.kind {
                column.kind = kind;
            }
            if let Some(alias) = &hint.alias {
                column.alias = Some(alias.clone());
            }
        }
        Ok(())
    }

    fn set_columns_projection(
        &mut self,
        result_set: &ResultSetRef,
        fields: &[String],
    ) -> Result<()> {
        self.record(format!(
            "set_columns_projection {result_set} [{}]",
            fields.join(",")
        ));
        Ok(())
    }

    fn set_max_rows(&mut self, limit: u32) -> Result<()> {
        self.record(format!("set_max_rows {limit}"));
        Ok(())
    }

    fn supports_named_parameters(&self) -> bool {
        self.options.named_parameters
    }

    fn supports_named_results(&self) -> bool {
        self.options.named_results
    }

    fn supports_multiple_result_sets(&self) -> bool {
        self.options.multiple_result_sets
    }

    fn metadata(&mut self, result_set: &ResultSetRef) -> Result<Option<ResultMetadata>> {
        self.record(format!("metadata {result_set}"));
        if self.options.metadata_at_prepare || self.executed {
            Ok(Some(self.current_metadata()))
        } else {
            Ok(None)
        }
    }

    fn result_set(&mut self, result_set: &ResultSetRef) -> Result<Box<dyn DriverResultSet>> {
        self.record(format!("result_set {result_set}"));
        if self.options.result_set_error {
            return Err(QuarryError::driver("result set unavailable"));
        }
        let metadata = if self.options.result_metadata_missing {
            None
        } else {
            Some(self.current_metadata())
        };
        Ok(Box::new(MemoryResultSet {
            metadata,
            rows: self.options.rows.clone().into_iter(),
            log: Arc::clone(&self.log),
        }))
    }

    fn parameter_metadata(&self) -> Result<Vec<ParameterDescriptor>> {
        Ok(self.options.parameters.clone())
    }

    fn parameter_value_by_index(&mut self, index: u32) -> Result<Value> {
        self.record(format!("parameter_value #{index}"));
        self.options
            .output_values
            .get(&index.to_string())
            .cloned()
            .ok_or_else(|| QuarryError::driver(format!("no value at parameter {index}")))
    }

    fn parameter_value_by_name(&mut self, name: &str) -> Result<Value> {
        self.record(format!("parameter_value {name}"));
        self.options
            .output_values
            .get(name)
            .cloned()
            .ok_or_else(|| QuarryError::driver(format!("no value for parameter '{name}'")))
    }

    fn execute(&mut self) -> Result<()> {
        self.record("execute".to_owned());
        if let Some(delay) = self.options.execute_delay {
            std::thread::sleep(delay);
        }
        if let Some(message) = &self.options.execute_error {
            return Err(QuarryError::driver(message.clone()));
        }
        self.executed = true;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            self.record("close".to_owned());
        }
        Ok(())
    }
}

struct MemoryResultSet {
    metadata: Option<ResultMetadata>,
    rows: std::vec::IntoIter<ResultRow>,
    log: CallLog,
}

impl DriverResultSet for MemoryResultSet {
    fn metadata(&mut self) -> Result<Option<ResultMetadata>> {
        Ok(self.metadata.clone())
    }

    fn fetch(&mut self) -> Result<Option<ResultRow>> {
        Ok(self.rows.next())
    }

    fn close(&mut self) -> Result<()> {
        self.log.lock().push("result_set_close".to_owned());
        Ok(())
    }
}
