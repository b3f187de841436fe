//! Query execution coordinator for pluggable data-source drivers.
//!
//! `quarry` sits between a report/query caller and a data-source driver:
//! it freezes the caller's hints into a per-query configuration, runs the
//! ordered preparation pipeline against the driver statement, binds input
//! parameters by name or position with type coercion, executes the driver
//! call off the caller's task while honoring a cooperative stop signal,
//! and picks the result-delivery strategy (cached, pass-through, or
//! general streaming) backing the returned iterator.
//!
//! The driver itself, the cache store, and the event handler are external
//! collaborators reached through the traits in [`driver`] and [`session`].

pub mod driver;
pub mod error;
pub mod metadata;
pub mod query;
pub mod session;
pub mod value;

pub use error::{QuarryError, Result};
pub use query::definition::{QueryDefinition, QueryShape};
pub use query::hints::{ColumnHint, CustomField, ParameterHint, QueryConfig, QueryConfigBuilder};
pub use query::result::ResultIterator;
pub use query::{DataSourceQuery, PreparedQuery};
pub use session::{ExecutionMode, Session, SessionOptions, StopSignal};
pub use value::{DataKind, Value};
