use std::sync::Arc;

use quarry::driver::MemoryDriver;
use quarry::session::{DataSetDesign, MemoryCacheManager};
use quarry::{
    ColumnHint, DataKind, DataSourceQuery, ExecutionMode, ParameterHint, QueryConfig,
    QueryDefinition, Session, SessionOptions,
};

fn query_with(
    driver: &MemoryDriver,
    config: QueryConfig,
    cache: MemoryCacheManager,
) -> DataSourceQuery {
    DataSourceQuery::new(
        Arc::new(driver.clone()),
        QueryDefinition::new("select id, total from orders", "sql"),
        config,
        Session::new(ExecutionMode::Generation, Arc::new(cache)),
    )
}

#[test]
fn setup_calls_reach_the_driver_in_pipeline_order() {
    let driver = MemoryDriver::new();
    let mut builder = QueryConfig::builder();
    builder.add_property("fetch_size", "256");
    builder.set_parameter_hints(vec![ParameterHint::input(DataKind::Integer)
        .with_name("min_total")
        .with_default("100")]);
    builder
        .declare_custom_field("discounted", DataKind::Float)
        .unwrap();
    builder.set_result_hints(vec![
        ColumnHint::new("total").with_kind(DataKind::Float),
        ColumnHint::new("discounted"),
    ]);
    builder.set_result_projection(vec!["id".to_owned(), "discounted".to_owned()]);
    builder.set_row_limit(7);

    let mut query = query_with(&driver, builder.finish(), MemoryCacheManager::new());
    query.prepare().unwrap();

    let calls = driver.calls();
    let order: Vec<usize> = [
        "set_property fetch_size=256",
        "add_parameter_hint min_total",
        "set_parameter_by_name min_total=100",
        "declare_custom_column default discounted float",
        "add_column_hint default total",
        "set_columns_projection default [id,discounted]",
        "set_max_rows 7",
    ]
    .iter()
    .map(|entry| {
        calls
            .iter()
            .position(|c| c == entry)
            .unwrap_or_else(|| panic!("missing call '{entry}' in {calls:?}"))
    })
    .collect();
    assert!(
        order.windows(2).all(|pair| pair[0] < pair[1]),
        "calls out of order: {calls:?}"
    );
}

#[test]
fn named_addressing_applies_to_column_declarations() {
    let driver = MemoryDriver::new()
        .with_named_results()
        .with_multiple_result_sets();
    let cache = MemoryCacheManager::new().with_design(
        DataSetDesign::new("orders")
            .with_primary_result_name("main")
            .with_primary_result_number(2),
    );
    let mut builder = QueryConfig::builder();
    builder
        .declare_custom_field("calc", DataKind::Integer)
        .unwrap();
    builder.set_result_projection(vec!["calc".to_owned()]);

    let mut query = query_with(&driver, builder.finish(), cache);
    query.prepare().unwrap();

    assert_eq!(
        driver.call_count("declare_custom_column 'main' calc integer"),
        1
    );
    assert_eq!(driver.call_count("set_columns_projection 'main' [calc]"), 1);
}

#[test]
fn numbered_addressing_is_the_fallback_from_names() {
    let driver = MemoryDriver::new().with_multiple_result_sets();
    let cache = MemoryCacheManager::new().with_design(
        DataSetDesign::new("orders")
            .with_primary_result_name("main")
            .with_primary_result_number(2),
    );
    let mut builder = QueryConfig::builder();
    builder
        .declare_custom_field("calc", DataKind::Integer)
        .unwrap();

    let mut query = query_with(&driver, builder.finish(), cache);
    query.prepare().unwrap();

    assert_eq!(driver.call_count("declare_custom_column #2 calc integer"), 1);
}

#[test]
fn metadata_available_at_prepare_is_exposed_immediately() {
    let driver = MemoryDriver::new().with_metadata_at_prepare();
    let mut query = query_with(&driver, QueryConfig::default(), MemoryCacheManager::new());
    let prepared = query.prepare().unwrap();
    assert!(prepared.result_metadata().is_some());
}

#[test]
fn metadata_unavailable_at_prepare_is_swallowed() {
    let driver = MemoryDriver::new();
    let mut query = query_with(&driver, QueryConfig::default(), MemoryCacheManager::new());
    let prepared = query.prepare().unwrap();
    assert!(prepared.result_metadata().is_none());
}

#[test]
fn session_default_row_limit_applies_when_query_has_none() {
    let driver = MemoryDriver::new();
    let mut query = DataSourceQuery::new(
        Arc::new(driver.clone()),
        QueryDefinition::new("select 1", "sql"),
        QueryConfig::default(),
        Session::new(
            ExecutionMode::Generation,
            Arc::new(MemoryCacheManager::new()),
        )
        .with_options(SessionOptions {
            default_row_limit: 500,
            ..SessionOptions::default()
        }),
    );
    query.prepare().unwrap();
    assert_eq!(driver.call_count("set_max_rows 500"), 1);
}
