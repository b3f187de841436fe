//! Query preparation: an ordered pipeline of discrete steps over a shared
//! preparation context.
//!
//! The order is load-bearing. Properties land first; parameter definitions
//! must reach the driver before any column-level declaration because some
//! drivers partially execute to produce metadata and need parameters in
//! place to do so; custom fields precede column hints (hints may target
//! them); the projection comes last because it needs both. A metadata probe
//! closes the pipeline and is allowed to fail; the row shape can still be
//! resolved from the live result at first execution.

use tracing::{debug, trace};

use crate::driver::{DriverStatement, ResultSetRef};
use crate::error::{QuarryError, Result};
use crate::metadata::ResultMetadata;
use crate::query::binding::{self, ParameterBinding};
use crate::query::definition::QueryDefinition;
use crate::query::hints::QueryConfig;
use crate::session::DataSetDesign;

/// Shared state the prepare steps read and write.
pub(crate) struct PrepareContext<'a> {
    pub statement: &'a mut dyn DriverStatement,
    pub config: &'a QueryConfig,
    pub definition: &'a QueryDefinition,
    pub design: Option<&'a DataSetDesign>,
    /// Effective row-fetch cap for this query.
    pub row_limit: u32,
    /// Result-set addressing, resolved mid-pipeline.
    pub addressing: ResultSetRef,
    /// Bindings produced by parameter registration, replayed at each
    /// execution.
    pub bindings: Vec<ParameterBinding>,
    /// Result metadata, when the driver could supply it this early.
    pub metadata: Option<ResultMetadata>,
}

trait PrepareStep {
    fn name(&self) -> &'static str;
    fn apply(&self, ctx: &mut PrepareContext<'_>) -> Result<()>;
}

/// Runs the full prepare pipeline in order.
pub(crate) fn run(ctx: &mut PrepareContext<'_>) -> Result<()> {
    let steps: [&dyn PrepareStep; 8] = [
        &ApplyProperties,
        &RegisterParameters,
        &ResolveAddressing,
        &DeclareCustomFields,
        &ApplyColumnHints,
        &ApplyProjection,
        &ApplyRowLimit,
        &ProbeMetadata,
    ];
    for step in steps {
        trace!(step = step.name(), "prepare step");
        step.apply(ctx)?;
    }
    Ok(())
}

/// Resolves how the primary result set is addressed: by name when the
/// design names one and the driver can, else by number when the design
/// numbers one and the driver can, else the default result set.
///
/// Recomputed at execution time as well, because the cache manager's
/// current design may change between prepare and execute.
pub(crate) fn resolve_addressing(
    design: Option<&DataSetDesign>,
    statement: &dyn DriverStatement,
) -> ResultSetRef {
    if let Some(design) = design {
        if let Some(name) = &design.primary_result_set_name {
            if statement.supports_named_results() {
                return ResultSetRef::Named(name.clone());
            }
        }
        if design.primary_result_set_number > 0 && statement.supports_multiple_result_sets() {
            return ResultSetRef::Numbered(design.primary_result_set_number);
        }
    }
    ResultSetRef::Default
}

struct ApplyProperties;

impl PrepareStep for ApplyProperties {
    fn name(&self) -> &'static str {
        "properties"
    }

    fn apply(&self, ctx: &mut PrepareContext<'_>) -> Result<()> {
        for (name, value) in ctx.config.properties() {
            ctx.statement.set_property(name, value)?;
        }
        Ok(())
    }
}

struct RegisterParameters;

impl PrepareStep for RegisterParameters {
    fn name(&self) -> &'static str {
        "parameters"
    }

    fn apply(&self, ctx: &mut PrepareContext<'_>) -> Result<()> {
        ctx.bindings = binding::register_parameters(
            ctx.statement,
            ctx.config.parameter_hints(),
            ctx.definition.query_type(),
        )?;
        Ok(())
    }
}

struct ResolveAddressing;

impl PrepareStep for ResolveAddressing {
    fn name(&self) -> &'static str {
        "addressing"
    }

    fn apply(&self, ctx: &mut PrepareContext<'_>) -> Result<()> {
        ctx.addressing = resolve_addressing(ctx.design, ctx.statement);
        Ok(())
    }
}

struct DeclareCustomFields;

impl PrepareStep for DeclareCustomFields {
    fn name(&self) -> &'static str {
        "custom fields"
    }

    fn apply(&self, ctx: &mut PrepareContext<'_>) -> Result<()> {
        for field in ctx.config.custom_fields() {
            ctx.statement
                .declare_custom_column(&ctx.addressing, field.name(), field.kind())?;
        }
        Ok(())
    }
}

struct ApplyColumnHints;

impl PrepareStep for ApplyColumnHints {
    fn name(&self) -> &'static str {
        "column hints"
    }

    fn apply(&self, ctx: &mut PrepareContext<'_>) -> Result<()> {
        for hint in ctx.config.result_hints() {
            ctx.statement
                .add_column_hint(&ctx.addressing, &hint.driver_spec())?;
        }
        Ok(())
    }
}

struct ApplyProjection;

impl PrepareStep for ApplyProjection {
    fn name(&self) -> &'static str {
        "projection"
    }

    fn apply(&self, ctx: &mut PrepareContext<'_>) -> Result<()> {
        if ctx.config.projection().is_empty() {
            // Project everything: the driver's natural column set stands.
            return Ok(());
        }
        ctx.statement
            .set_columns_projection(&ctx.addressing, ctx.config.projection())
    }
}

struct ApplyRowLimit;

impl PrepareStep for ApplyRowLimit {
    fn name(&self) -> &'static str {
        "row limit"
    }

    fn apply(&self, ctx: &mut PrepareContext<'_>) -> Result<()> {
        ctx.statement.set_max_rows(ctx.row_limit)
    }
}

struct ProbeMetadata;

impl PrepareStep for ProbeMetadata {
    fn name(&self) -> &'static str {
        "metadata probe"
    }

    fn apply(&self, ctx: &mut PrepareContext<'_>) -> Result<()> {
        match statement_metadata(ctx.statement, &ctx.addressing) {
            Ok(metadata) => ctx.metadata = metadata,
            Err(err) => {
                debug!(error = %err, "metadata not available at prepare time");
                ctx.metadata = None;
            }
        }
        Ok(())
    }
}

/// Reads result metadata from the statement, falling back to the default
/// result set when the addressed one reports none. Failures against a
/// named or numbered result set carry the addressed identity.
fn statement_metadata(
    statement: &mut dyn DriverStatement,
    addressing: &ResultSetRef,
) -> Result<Option<ResultMetadata>> {
    match addressing {
        ResultSetRef::Default => statement.metadata(&ResultSetRef::Default),
        addressed => {
            let metadata =
                statement
                    .metadata(addressed)
                    .map_err(|source| QuarryError::ResultSetRetrieval {
                        result_set: addressed.to_string(),
                        source: Box::new(source),
                    })?;
            match metadata {
                Some(metadata) => Ok(Some(metadata)),
                None => statement.metadata(&ResultSetRef::Default),
            }
        }
    }
}
