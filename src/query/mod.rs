//! The data-source query: the state machine tying configuration,
//! preparation, execution, and result delivery together.
//!
//! Lifecycle: unprepared → prepared → executing → prepared (re-executable)
//! → closed. Preparation is single-use; the driver statement handle is
//! owned by the prepared query and released exactly once, either by an
//! explicit close or by the cancellation cleanup path.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::driver::{DriverConnection, DriverResultSet, DriverStatement, ResultSetRef};
use crate::error::{QuarryError, Result};
use crate::metadata::{ParameterMetadata, ResultMetadata};
use crate::session::{EventHandler, Session, StopSignal};
use crate::value::Value;

mod binding;
pub mod definition;
mod execute;
pub mod hints;
mod prepare;
pub mod result;

pub use binding::ParameterBinding;

use definition::QueryDefinition;
use execute::{ExecutionOutcome, SharedStatement};
use hints::QueryConfig;
use result::ResultIterator;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum QueryState {
    Unprepared,
    Prepared,
    Executing,
    Closed,
}

/// A query against one data-source driver.
///
/// Built from an immutable definition and configuration; `prepare` turns it
/// into an executable query. Single-owner: not safe for concurrent use by
/// multiple callers without external synchronization.
pub struct DataSourceQuery {
    connection: Arc<dyn DriverConnection>,
    definition: QueryDefinition,
    config: QueryConfig,
    session: Session,
    state: QueryState,
    statement: Option<SharedStatement>,
    bindings: Vec<ParameterBinding>,
    metadata: Option<ResultMetadata>,
}

impl DataSourceQuery {
    /// Creates an unprepared query.
    pub fn new(
        connection: Arc<dyn DriverConnection>,
        definition: QueryDefinition,
        config: QueryConfig,
        session: Session,
    ) -> Self {
        Self {
            connection,
            definition,
            config,
            session,
            state: QueryState::Unprepared,
            statement: None,
            bindings: Vec::new(),
            metadata: None,
        }
    }

    /// The logical definition this query runs.
    pub fn definition(&self) -> &QueryDefinition {
        &self.definition
    }

    /// Prepares the query: creates the driver statement and runs the
    /// ordered setup pipeline against it.
    ///
    /// Single-use: a second call, or a call on a closed query, fails with
    /// [`QuarryError::AlreadyPrepared`]. Returns the executable view.
    pub fn prepare(&mut self) -> Result<PreparedQuery<'_>> {
        if self.state != QueryState::Unprepared {
            return Err(QuarryError::AlreadyPrepared);
        }
        let mut statement = self
            .connection
            .prepare_statement(self.definition.text(), self.definition.query_type())?;
        let row_limit = if self.config.row_limit() > 0 {
            self.config.row_limit()
        } else {
            self.session.options().default_row_limit
        };
        let design = self.session.cache_manager().current_design().cloned();
        let mut ctx = prepare::PrepareContext {
            statement: statement.as_mut(),
            config: &self.config,
            definition: &self.definition,
            design: design.as_ref(),
            row_limit,
            addressing: ResultSetRef::Default,
            bindings: Vec::new(),
            metadata: None,
        };
        let pipeline = prepare::run(&mut ctx);
        let bindings = std::mem::take(&mut ctx.bindings);
        let metadata = ctx.metadata.take();
        drop(ctx);
        if let Err(err) = pipeline {
            // The statement never became owned by a prepared query;
            // release it here.
            let _ = statement.close();
            return Err(err);
        }
        self.bindings = bindings;
        self.metadata = metadata;
        self.statement = Some(Arc::new(Mutex::new(statement)));
        self.state = QueryState::Prepared;
        debug!(
            query_type = self.definition.query_type(),
            metadata_resolved = self.metadata.is_some(),
            "query prepared"
        );
        Ok(PreparedQuery { query: self })
    }

    /// Releases the driver statement handle. Idempotent; a no-op when the
    /// handle is already gone (never prepared, already closed, or detached
    /// by a cancelled execution).
    pub fn close(&mut self) -> Result<()> {
        let released = self.statement.take();
        self.state = QueryState::Closed;
        match released {
            Some(statement) => statement.lock().close(),
            None => Ok(()),
        }
    }
}

/// Executable view over a prepared [`DataSourceQuery`].
pub struct PreparedQuery<'a> {
    query: &'a mut DataSourceQuery,
}

impl std::fmt::Debug for PreparedQuery<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreparedQuery").finish_non_exhaustive()
    }
}

impl PreparedQuery<'_> {
    /// Result metadata, when it could be resolved by now. `None` until the
    /// driver supplies it, at prepare time or at first execution.
    pub fn result_metadata(&self) -> Option<&ResultMetadata> {
        self.query.metadata.as_ref()
    }

    /// Executes the prepared statement.
    ///
    /// Replays the parameter bindings, runs the driver's execute step off
    /// this task while polling `stop`, and on success hands back the
    /// iterator built by result-strategy selection. A raised stop signal
    /// yields the inert empty iterator instead of an error; the detached
    /// statement is then closed by a cleanup task once the driver call
    /// returns, and this query is closed.
    pub async fn execute(
        &mut self,
        event_handler: &dyn EventHandler,
        stop: &StopSignal,
    ) -> Result<ResultIterator> {
        if self.query.statement.is_none() {
            return Err(QuarryError::NotPrepared);
        }
        self.query.state = QueryState::Executing;
        let outcome = self.execute_inner(event_handler, stop).await;
        // Cancellation transitions to closed inside; everything else
        // returns the query to the re-executable prepared state.
        if self.query.state == QueryState::Executing {
            self.query.state = QueryState::Prepared;
        }
        outcome
    }

    async fn execute_inner(
        &mut self,
        event_handler: &dyn EventHandler,
        stop: &StopSignal,
    ) -> Result<ResultIterator> {
        let statement = match &self.query.statement {
            Some(statement) => Arc::clone(statement),
            None => return Err(QuarryError::NotPrepared),
        };

        {
            let mut stmt = statement.lock();
            binding::apply_bindings(stmt.as_mut(), &self.query.bindings)?;
            let cache = self.query.session.cache_manager();
            if cache.save_to_cache() {
                let design_limit = cache
                    .current_design()
                    .map(|design| design.row_fetch_limit)
                    .unwrap_or(0);
                if let Some(cap) = execute::cache_row_cap(design_limit, cache.cache_row_limit()) {
                    stmt.set_max_rows(cap)?;
                }
            }
        }

        let outcome = execute::run(
            Arc::clone(&statement),
            stop,
            self.query.session.options().cancel_poll_interval,
        )
        .await?;
        if outcome == ExecutionOutcome::Cancelled {
            // The cleanup task owns the handle now; release our reference
            // so the statement is closed exactly once, by that task.
            self.query.statement = None;
            self.query.state = QueryState::Closed;
            debug!("execution cancelled, returning empty iterator");
            return Ok(ResultIterator::Empty);
        }

        let design = self.query.session.cache_manager().current_design().cloned();
        let (result, metadata) = {
            let mut stmt = statement.lock();
            let addressing = prepare::resolve_addressing(design.as_ref(), stmt.as_ref());
            let mut result = retrieve_result_set(stmt.as_mut(), &addressing)?;
            let metadata = match &self.query.metadata {
                Some(metadata) => metadata.clone(),
                None => match result.metadata()? {
                    Some(metadata) => {
                        // Resolved from the live result; immutable from
                        // here on.
                        self.query.metadata = Some(metadata.clone());
                        metadata
                    }
                    None => return Err(QuarryError::MetadataUnavailable),
                },
            };
            (result, metadata)
        };

        result::select_strategy(
            result,
            metadata,
            &self.query.session,
            self.query.definition.shape(),
            event_handler,
        )
    }

    /// The driver's view of the statement's parameters, wrapped for the
    /// caller. `None` when the driver reports none.
    pub fn parameter_metadata(&self) -> Result<Option<Vec<ParameterMetadata>>> {
        let statement = self
            .query
            .statement
            .as_ref()
            .ok_or(QuarryError::NotPrepared)?;
        let descriptors = statement.lock().parameter_metadata()?;
        if descriptors.is_empty() {
            return Ok(None);
        }
        Ok(Some(
            descriptors.into_iter().map(ParameterMetadata::new).collect(),
        ))
    }

    /// Reads an output parameter by its 1-based *output* index, counted
    /// over output-mode parameters only.
    pub fn output_parameter_by_index(&self, index: i64) -> Result<Value> {
        let statement = self
            .query
            .statement
            .as_ref()
            .ok_or(QuarryError::NotPrepared)?;
        let overall = self.output_index_to_overall(index)?;
        statement.lock().parameter_value_by_index(overall)
    }

    /// Reads an output parameter by name. The name must belong to an
    /// output-mode parameter.
    pub fn output_parameter_by_name(&self, name: &str) -> Result<Value> {
        let statement = self
            .query
            .statement
            .as_ref()
            .ok_or(QuarryError::NotPrepared)?;
        let mut valid = false;
        if let Some(parameters) = self.parameter_metadata()? {
            for parameter in parameters {
                if parameter.name() == Some(name) {
                    valid = parameter.is_output_mode();
                    break;
                }
            }
        }
        if !valid {
            return Err(QuarryError::InvalidOutputParameterName {
                name: name.to_owned(),
            });
        }
        statement.lock().parameter_value_by_name(name)
    }

    /// Maps an output-parameter ordinal onto the overall parameter
    /// ordinal, skipping input-only parameters.
    fn output_index_to_overall(&self, index: i64) -> Result<u32> {
        if index <= 0 {
            return Err(QuarryError::InvalidOutputParameterIndex { index });
        }
        let mut overall = 0u32;
        let mut outputs_seen = 0i64;
        if let Some(parameters) = self.parameter_metadata()? {
            for parameter in parameters {
                overall += 1;
                if parameter.is_output_mode() {
                    outputs_seen += 1;
                    if outputs_seen == index {
                        break;
                    }
                }
            }
        }
        if outputs_seen < index {
            return Err(QuarryError::OutputParameterOutOfBounds { index });
        }
        Ok(overall)
    }

    /// Releases the underlying driver statement.
    pub fn close(self) -> Result<()> {
        self.query.close()
    }
}

/// Retrieves the addressed result set; failures against a named or
/// numbered result set carry the addressed identity.
fn retrieve_result_set(
    statement: &mut dyn DriverStatement,
    addressing: &ResultSetRef,
) -> Result<Box<dyn DriverResultSet>> {
    match addressing {
        ResultSetRef::Default => statement.result_set(addressing),
        addressed => {
            statement
                .result_set(addressed)
                .map_err(|source| QuarryError::ResultSetRetrieval {
                    result_set: addressed.to_string(),
                    source: Box::new(source),
                })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{MemoryDriver, ParameterDescriptor};
    use crate::session::{ExecutionMode, MemoryCacheManager};
    use crate::value::DataKind;

    fn session() -> Session {
        Session::new(
            ExecutionMode::Generation,
            Arc::new(MemoryCacheManager::new()),
        )
    }

    fn query_on(driver: MemoryDriver, config: QueryConfig) -> DataSourceQuery {
        DataSourceQuery::new(
            Arc::new(driver),
            QueryDefinition::new("select 1", "sql"),
            config,
            session(),
        )
    }

    #[test]
    fn prepare_twice_fails_with_already_prepared() {
        let mut query = query_on(MemoryDriver::new(), QueryConfig::default());
        query.prepare().unwrap();
        assert!(matches!(
            query.prepare().unwrap_err(),
            QuarryError::AlreadyPrepared
        ));
    }

    #[test]
    fn prepare_after_close_fails_with_already_prepared() {
        let mut query = query_on(MemoryDriver::new(), QueryConfig::default());
        query.prepare().unwrap();
        query.close().unwrap();
        assert!(matches!(
            query.prepare().unwrap_err(),
            QuarryError::AlreadyPrepared
        ));
    }

    #[test]
    fn close_is_idempotent_and_releases_once() {
        let driver = MemoryDriver::new();
        let mut query = query_on(driver.clone(), QueryConfig::default());
        query.prepare().unwrap();
        query.close().unwrap();
        query.close().unwrap();
        assert_eq!(driver.call_count("close"), 1);
    }

    #[test]
    fn custom_field_kind_round_trips_through_metadata() {
        let driver = MemoryDriver::new().with_metadata_at_prepare();
        let mut builder = QueryConfig::builder();
        builder
            .declare_custom_field("calc", DataKind::Float)
            .unwrap();
        let mut query = query_on(driver, builder.finish());
        let prepared = query.prepare().unwrap();
        let metadata = prepared.result_metadata().unwrap();
        assert_eq!(
            metadata.column_by_name("calc").unwrap().kind,
            DataKind::Float
        );
    }

    fn output_driver() -> MemoryDriver {
        MemoryDriver::new()
            .with_parameters(vec![
                ParameterDescriptor {
                    name: Some("in1".to_owned()),
                    position: 1,
                    kind: DataKind::Integer,
                    input: true,
                    output: false,
                },
                ParameterDescriptor {
                    name: Some("out1".to_owned()),
                    position: 2,
                    kind: DataKind::String,
                    input: false,
                    output: true,
                },
                ParameterDescriptor {
                    name: Some("out2".to_owned()),
                    position: 3,
                    kind: DataKind::String,
                    input: false,
                    output: true,
                },
            ])
            .with_output_value("2", Value::from("first"))
            .with_output_value("3", Value::from("second"))
            .with_output_value("out2", Value::from("second"))
    }

    #[test]
    fn output_index_skips_input_only_parameters() {
        let mut query = query_on(output_driver(), QueryConfig::default());
        let prepared = query.prepare().unwrap();
        assert_eq!(
            prepared.output_parameter_by_index(1).unwrap(),
            Value::from("first")
        );
        assert_eq!(
            prepared.output_parameter_by_index(2).unwrap(),
            Value::from("second")
        );
    }

    #[test]
    fn output_index_bounds_are_enforced() {
        let mut query = query_on(output_driver(), QueryConfig::default());
        let prepared = query.prepare().unwrap();
        assert!(matches!(
            prepared.output_parameter_by_index(0).unwrap_err(),
            QuarryError::InvalidOutputParameterIndex { index: 0 }
        ));
        assert!(matches!(
            prepared.output_parameter_by_index(3).unwrap_err(),
            QuarryError::OutputParameterOutOfBounds { index: 3 }
        ));
    }

    #[test]
    fn output_name_must_be_output_mode() {
        let mut query = query_on(output_driver(), QueryConfig::default());
        let prepared = query.prepare().unwrap();
        assert_eq!(
            prepared.output_parameter_by_name("out2").unwrap(),
            Value::from("second")
        );
        assert!(matches!(
            prepared.output_parameter_by_name("in1").unwrap_err(),
            QuarryError::InvalidOutputParameterName { name } if name == "in1"
        ));
        assert!(matches!(
            prepared.output_parameter_by_name("missing").unwrap_err(),
            QuarryError::InvalidOutputParameterName { .. }
        ));
    }

    #[test]
    fn parameter_metadata_is_none_when_driver_reports_none() {
        let mut query = query_on(MemoryDriver::new(), QueryConfig::default());
        let prepared = query.prepare().unwrap();
        assert!(prepared.parameter_metadata().unwrap().is_none());
    }
}
