use std::sync::Arc;

use quarry::driver::MemoryDriver;
use quarry::metadata::{ColumnDescriptor, ResultRow};
use quarry::session::{CountingEventHandler, MemoryCacheManager};
use quarry::{
    DataKind, DataSourceQuery, ExecutionMode, QueryConfig, QueryDefinition, QueryShape,
    ResultIterator, Session, StopSignal, Value,
};

fn seeded_driver() -> MemoryDriver {
    MemoryDriver::new()
        .with_columns(vec![ColumnDescriptor::new("n", DataKind::Integer, 1)])
        .with_rows(vec![
            ResultRow::from(vec![Value::Int(10)]),
            ResultRow::from(vec![Value::Int(20)]),
            ResultRow::from(vec![Value::Int(30)]),
        ])
}

fn query_in_mode(
    driver: &MemoryDriver,
    cache: Arc<MemoryCacheManager>,
    mode: ExecutionMode,
    shape: QueryShape,
) -> DataSourceQuery {
    DataSourceQuery::new(
        Arc::new(driver.clone()),
        QueryDefinition::new("select n from t", "sql").with_shape(shape),
        QueryConfig::default(),
        Session::new(mode, cache),
    )
}

#[tokio::test]
async fn caching_request_builds_the_cached_iterator() {
    let driver = seeded_driver();
    let cache = Arc::new(MemoryCacheManager::new().with_save_to_cache());
    let mut query = query_in_mode(
        &driver,
        cache.clone(),
        ExecutionMode::DirectPresentation,
        QueryShape::default(),
    );
    let mut prepared = query.prepare().unwrap();
    let handler = CountingEventHandler::new();

    let mut iterator = prepared.execute(&handler, &StopSignal::new()).await.unwrap();

    // Caching wins even though the simple-strategy predicate would hold.
    assert!(matches!(iterator, ResultIterator::Cached(_)));
    assert_eq!(handler.notifications(), 0);

    while iterator.next().unwrap() {}
    assert_eq!(iterator.row_count(), 3);
    assert_eq!(cache.cached_rows().len(), 3);
    assert_eq!(cache.finished_count(), Some(3));

    // The live driver result stays reachable for cleanup.
    iterator.close().unwrap();
    assert_eq!(driver.call_count("result_set_close"), 1);
}

#[tokio::test]
async fn simple_direct_presentation_notifies_before_execute_returns() {
    let driver = seeded_driver();
    let mut query = query_in_mode(
        &driver,
        Arc::new(MemoryCacheManager::new()),
        ExecutionMode::DirectPresentation,
        QueryShape::default(),
    );
    let mut prepared = query.prepare().unwrap();
    let handler = CountingEventHandler::new();

    let iterator = prepared.execute(&handler, &StopSignal::new()).await.unwrap();

    assert!(matches!(iterator, ResultIterator::PassThrough(_)));
    assert_eq!(handler.notifications(), 1);
}

#[tokio::test]
async fn aggregating_shape_disqualifies_the_pass_through() {
    let driver = seeded_driver();
    let mut query = query_in_mode(
        &driver,
        Arc::new(MemoryCacheManager::new()),
        ExecutionMode::DirectPresentation,
        QueryShape {
            aggregating: true,
            ..QueryShape::default()
        },
    );
    let mut prepared = query.prepare().unwrap();
    let handler = CountingEventHandler::new();

    let iterator = prepared.execute(&handler, &StopSignal::new()).await.unwrap();

    assert!(matches!(iterator, ResultIterator::General(_)));
    assert_eq!(handler.notifications(), 0);
}

#[tokio::test]
async fn generation_mode_uses_the_general_iterator() {
    let driver = seeded_driver();
    let mut query = query_in_mode(
        &driver,
        Arc::new(MemoryCacheManager::new()),
        ExecutionMode::Generation,
        QueryShape::default(),
    );
    let mut prepared = query.prepare().unwrap();

    let mut iterator = prepared
        .execute(&CountingEventHandler::new(), &StopSignal::new())
        .await
        .unwrap();

    assert!(matches!(iterator, ResultIterator::General(_)));
    assert!(iterator.next().unwrap());
    assert_eq!(iterator.current().unwrap().value(1), Some(&Value::Int(10)));
}

#[tokio::test]
async fn custom_field_kind_survives_to_execution_metadata() {
    let driver = seeded_driver();
    let mut builder = QueryConfig::builder();
    builder
        .declare_custom_field("derived", DataKind::Decimal)
        .unwrap();
    let mut query = DataSourceQuery::new(
        Arc::new(driver.clone()),
        QueryDefinition::new("select n from t", "sql"),
        builder.finish(),
        Session::new(
            ExecutionMode::Generation,
            Arc::new(MemoryCacheManager::new()),
        ),
    );
    let mut prepared = query.prepare().unwrap();

    let iterator = prepared
        .execute(&CountingEventHandler::new(), &StopSignal::new())
        .await
        .unwrap();

    let metadata = iterator.metadata().unwrap();
    assert_eq!(
        metadata.column_by_name("derived").unwrap().kind,
        DataKind::Decimal
    );
}
