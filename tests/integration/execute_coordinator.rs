use std::sync::Arc;
use std::time::Duration;

use quarry::driver::MemoryDriver;
use quarry::metadata::{ColumnDescriptor, ResultRow};
use quarry::session::{CountingEventHandler, DataSetDesign, MemoryCacheManager};
use quarry::{
    DataKind, DataSourceQuery, ExecutionMode, ParameterHint, QuarryError, QueryConfig,
    QueryDefinition, ResultIterator, Session, SessionOptions, StopSignal, Value,
};

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}

fn seeded_driver() -> MemoryDriver {
    MemoryDriver::new()
        .with_columns(vec![ColumnDescriptor::new("n", DataKind::Integer, 1)])
        .with_rows(vec![
            ResultRow::from(vec![Value::Int(1)]),
            ResultRow::from(vec![Value::Int(2)]),
        ])
}

fn query_on(driver: &MemoryDriver, cache: MemoryCacheManager) -> DataSourceQuery {
    DataSourceQuery::new(
        Arc::new(driver.clone()),
        QueryDefinition::new("select n from t", "sql"),
        QueryConfig::default(),
        Session::new(ExecutionMode::Generation, Arc::new(cache))
            .with_options(SessionOptions::responsive()),
    )
}

async fn wait_for_call(driver: &MemoryDriver, entry: &str) {
    for _ in 0..200 {
        if driver.call_count(entry) == 1 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("call '{entry}' never recorded: {:?}", driver.calls());
}

#[tokio::test]
async fn successful_execution_streams_rows() {
    init_tracing();
    let driver = seeded_driver();
    let mut query = query_on(&driver, MemoryCacheManager::new());
    let mut prepared = query.prepare().unwrap();

    let mut iterator = prepared
        .execute(&CountingEventHandler::new(), &StopSignal::new())
        .await
        .unwrap();

    assert!(iterator.next().unwrap());
    assert_eq!(iterator.current().unwrap().value(1), Some(&Value::Int(1)));
    assert!(iterator.next().unwrap());
    assert!(!iterator.next().unwrap());
    assert_eq!(iterator.row_count(), 2);
    iterator.close().unwrap();
}

#[tokio::test]
async fn driver_error_propagates_exactly() {
    let driver = seeded_driver().with_execute_error("syntax error near 'from'");
    let mut query = query_on(&driver, MemoryCacheManager::new());
    let mut prepared = query.prepare().unwrap();

    let err = prepared
        .execute(&CountingEventHandler::new(), &StopSignal::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        QuarryError::Driver { message } if message == "syntax error near 'from'"
    ));
}

#[tokio::test]
async fn raised_stop_signal_yields_the_empty_iterator() {
    init_tracing();
    let driver = seeded_driver().with_execute_delay(Duration::from_millis(100));
    let mut query = query_on(&driver, MemoryCacheManager::new());
    let mut prepared = query.prepare().unwrap();

    let stop = StopSignal::new();
    stop.stop();
    let mut iterator = prepared
        .execute(&CountingEventHandler::new(), &stop)
        .await
        .unwrap();

    assert!(matches!(iterator, ResultIterator::Empty));
    assert!(!iterator.next().unwrap());
    assert!(iterator.current().is_none());
    assert_eq!(iterator.row_count(), 0);
}

#[tokio::test]
async fn cancelled_statement_is_closed_once_by_the_cleanup_task() {
    let driver = seeded_driver().with_execute_delay(Duration::from_millis(50));
    let mut query = query_on(&driver, MemoryCacheManager::new());
    let mut prepared = query.prepare().unwrap();

    let stop = StopSignal::new();
    stop.stop();
    prepared
        .execute(&CountingEventHandler::new(), &stop)
        .await
        .unwrap();

    // The in-flight driver call is never aborted: it finishes on its own
    // and only then is the statement released.
    wait_for_call(&driver, "close").await;

    // An explicit close after cancellation is a no-op.
    prepared.close().unwrap();
    assert_eq!(driver.call_count("close"), 1);
}

#[tokio::test]
async fn bindings_replay_on_every_execution() {
    let driver = seeded_driver();
    let mut query = DataSourceQuery::new(
        Arc::new(driver.clone()),
        QueryDefinition::new("select n from t where n > ?", "sql"),
        {
            let mut builder = QueryConfig::builder();
            builder.set_parameter_hints(vec![ParameterHint::input(DataKind::Integer)
                .with_name("min")
                .with_default("5")]);
            builder.finish()
        },
        Session::new(
            ExecutionMode::Generation,
            Arc::new(MemoryCacheManager::new()),
        ),
    );
    let mut prepared = query.prepare().unwrap();

    let handler = CountingEventHandler::new();
    let stop = StopSignal::new();
    prepared.execute(&handler, &stop).await.unwrap();
    prepared.execute(&handler, &stop).await.unwrap();

    // Once at registration, once per execution.
    assert_eq!(driver.call_count("set_parameter_by_name min=5"), 3);
}

#[tokio::test]
async fn metadata_still_missing_after_execution_is_fatal() {
    let driver = MemoryDriver::new().with_result_metadata_missing();
    let mut query = query_on(&driver, MemoryCacheManager::new());
    let mut prepared = query.prepare().unwrap();

    let err = prepared
        .execute(&CountingEventHandler::new(), &StopSignal::new())
        .await
        .unwrap_err();

    assert!(matches!(err, QuarryError::MetadataUnavailable));
}

#[tokio::test]
async fn metadata_resolves_lazily_from_the_live_result() {
    let driver = seeded_driver();
    let mut query = query_on(&driver, MemoryCacheManager::new());
    let mut prepared = query.prepare().unwrap();
    assert!(prepared.result_metadata().is_none());

    prepared
        .execute(&CountingEventHandler::new(), &StopSignal::new())
        .await
        .unwrap();

    let metadata = prepared.result_metadata().unwrap();
    assert_eq!(metadata.column(1).unwrap().kind, DataKind::Integer);
}

#[tokio::test]
async fn result_set_retrieval_failure_names_the_result_set() {
    let driver = seeded_driver().with_named_results().with_result_set_error();
    let cache = MemoryCacheManager::new()
        .with_design(DataSetDesign::new("orders").with_primary_result_name("main"));
    let mut query = query_on(&driver, cache);
    let mut prepared = query.prepare().unwrap();

    let err = prepared
        .execute(&CountingEventHandler::new(), &StopSignal::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        QuarryError::ResultSetRetrieval { result_set, .. } if result_set == "'main'"
    ));
}

#[tokio::test]
async fn caching_lowers_the_row_cap_to_the_design_limit() {
    let driver = seeded_driver();
    let cache = MemoryCacheManager::new()
        .with_save_to_cache()
        .with_row_limit(10)
        .with_design(DataSetDesign::new("orders").with_row_fetch_limit(5));
    let mut query = query_on(&driver, cache);
    let mut prepared = query.prepare().unwrap();

    prepared
        .execute(&CountingEventHandler::new(), &StopSignal::new())
        .await
        .unwrap();

    assert_eq!(driver.call_count("set_max_rows 5"), 1);
}

#[tokio::test]
async fn caching_applies_the_cache_cap_without_a_design_limit() {
    let driver = seeded_driver();
    let cache = MemoryCacheManager::new()
        .with_save_to_cache()
        .with_row_limit(10)
        .with_design(DataSetDesign::new("orders"));
    let mut query = query_on(&driver, cache);
    let mut prepared = query.prepare().unwrap();

    prepared
        .execute(&CountingEventHandler::new(), &StopSignal::new())
        .await
        .unwrap();

    assert_eq!(driver.call_count("set_max_rows 10"), 1);
}
