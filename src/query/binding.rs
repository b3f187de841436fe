//! Parameter binder: turns declared hints into concrete bindings and
//! replays them onto the driver statement.
//!
//! Bindings are registered with the driver before any column-level
//! declarations, because some drivers partially execute the statement to
//! produce metadata and can only do so once parameters are in place.

use tracing::trace;

use crate::driver::DriverStatement;
use crate::error::{QuarryError, Result};
use crate::query::hints::ParameterHint;
use crate::value::{self, DataKind, Value};

/// A resolved (name-or-position, value) pair produced from an input-mode
/// hint after type coercion.
#[derive(Clone, Debug, PartialEq)]
pub struct ParameterBinding {
    name: Option<String>,
    position: i32,
    value: Value,
}

impl ParameterBinding {
    /// The bound value.
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Identity used in error context: the name when present, `#position`
    /// otherwise.
    fn identity(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("#{}", self.position),
        }
    }
}

/// Registers every hint with the driver and resolves input-mode hints into
/// bindings, applying the full binding sequence once.
///
/// Returns the bindings so each later execution can replay them.
pub(crate) fn register_parameters(
    statement: &mut dyn DriverStatement,
    hints: &[ParameterHint],
    query_type: &str,
) -> Result<Vec<ParameterBinding>> {
    let mut bindings = Vec::new();
    for hint in hints {
        statement.add_parameter_hint(hint)?;
        if !hint.is_input_mode() {
            continue;
        }
        let mut kind = hint.kind();
        if kind == DataKind::Date {
            // A generic date resolves to whatever concrete temporal kind
            // the driver expects for this query type.
            kind = statement.effective_date_kind(query_type);
        }
        let value = match kind {
            DataKind::Blob | DataKind::Clob => hint.default_value().clone(),
            kind => value::coerce(hint.default_value(), kind)?,
        };
        bindings.push(ParameterBinding {
            name: hint.name().map(str::to_owned),
            position: hint.position(),
            value,
        });
    }
    apply_bindings(statement, &bindings)?;
    Ok(bindings)
}

/// Replays the full binding sequence onto the statement. Idempotent with
/// respect to the driver's parameter slots; called again on every execute.
pub(crate) fn apply_bindings(
    statement: &mut dyn DriverStatement,
    bindings: &[ParameterBinding],
) -> Result<()> {
    for binding in bindings {
        apply_one(statement, binding).map_err(|source| QuarryError::ParameterBind {
            parameter: binding.identity(),
            source: Box::new(source),
        })?;
    }
    Ok(())
}

fn apply_one(statement: &mut dyn DriverStatement, binding: &ParameterBinding) -> Result<()> {
    if binding.position <= 0 || statement.supports_named_parameters() {
        let name = binding.name.as_deref().unwrap_or("");
        match statement.set_parameter_by_name(name, &binding.value) {
            Ok(()) => Ok(()),
            Err(_) if binding.position > 0 => {
                trace!(
                    parameter = name,
                    position = binding.position,
                    "name bind failed, retrying by position"
                );
                statement.set_parameter_by_position(binding.position as u32, &binding.value)
            }
            Err(err) => Err(err),
        }
    } else {
        statement.set_parameter_by_position(binding.position as u32, &binding.value)
    }
}
