//! 跨分区查询流水线集成测试
//!
//! 测试范围:
//! - 并行查询与费用/诊断汇总
//! - 自适应页大小
//! - TOP/OFFSET/LIMIT/DISTINCT 组件链
//! - ORDER BY 多路归并
//! - 聚合
//! - 分区拆分恢复与失败重放
//! - 取消

mod common;

use common::assertions::{assert_charge_eq, assert_count, assert_no_duplicates};
use common::fixtures::*;
use common::{test_config, three_ranges, two_ranges, MockDataSource, MockResolver};

use crossquery::core::{Element, FetchFailure, PipelineError};
use crossquery::query::{
    AggregateOperator, DistinctType, PartitionKeyRange, QueryInfo, QueryPlan, QueryRange, SortOrder,
};

/// 三个分区各写入若干文档
fn seed_three_ranges(source: &MockDataSource) {
    seed_docs(source, &[("10", 1), ("20", 2), ("30", 3)]);
    seed_docs(source, &[("60", 4), ("70", 5)]);
    seed_docs(source, &[("B0", 6), ("C0", 7), ("D0", 8), ("E0", 9)]);
}

#[tokio::test]
async fn test_parallel_query_returns_every_document() {
    let source = MockDataSource::new();
    seed_three_ranges(&source);
    let resolver = MockResolver::new(three_ranges());

    let mut pipeline = create_pipeline(&test_config(), Some(parallel_plan()), &source, &resolver, None)
        .await
        .expect("Failed to create pipeline");
    let items = drain_all(&mut pipeline).await;

    // 并行查询按分区范围顺序输出
    assert_eq!(
        ids(&items),
        vec!["10", "20", "30", "60", "70", "B0", "C0", "D0", "E0"]
    );
    assert!(!pipeline.has_more_results());
}

#[tokio::test]
async fn test_parallel_query_reports_charges_and_diagnostics() {
    let source = MockDataSource::new();
    seed_three_ranges(&source);
    let resolver = MockResolver::new(three_ranges());

    let mut pipeline = create_pipeline(&test_config(), Some(parallel_plan()), &source, &resolver, None)
        .await
        .expect("Failed to create pipeline");

    let first = pipeline.next_page().await.expect("Failed to fetch first page");
    // 第一次 drain 并发预取了全部三个分区
    assert_count(&first.diagnostics, 3, "诊断记录");
    assert_charge_eq(first.request_charge, 3.0 * source.charge_per_page());
    assert_eq!(first.response_length_bytes, 9 * 64);
    assert!(first.continuation_token.is_some());

    let mut total_charge = first.request_charge;
    while pipeline.has_more_results() {
        let page = pipeline.next_page().await.expect("Failed to fetch next page");
        total_charge += page.request_charge;
    }
    assert_charge_eq(
        total_charge,
        source.request_count() as f64 * source.charge_per_page(),
    );
}

#[tokio::test]
async fn test_page_size_grows_up_to_max_item_count() {
    let source = MockDataSource::new();
    source.set_page_limit(10);
    let keys = sequential_keys("1", 40);
    for (i, key) in keys.iter().enumerate() {
        source.insert(key, doc(key, i as i64));
    }
    let resolver = MockResolver::new(vec![PartitionKeyRange::new("0", "", "FF")]);

    let mut pipeline = create_pipeline(&test_config(), Some(parallel_plan()), &source, &resolver, None)
        .await
        .expect("Failed to create pipeline");
    let items = drain_all(&mut pipeline).await;
    assert_count(&items, 40, "文档");

    let sizes: Vec<usize> = source.requests().iter().map(|r| r.page_size).collect();
    assert_eq!(sizes, vec![50, 80, 100, 100]);
}

#[tokio::test]
async fn test_top_stops_fetching_once_satisfied() {
    let source = MockDataSource::new();
    source.set_page_limit(3);
    let keys = sequential_keys("1", 10);
    for (i, key) in keys.iter().enumerate() {
        source.insert(key, doc(key, i as i64));
    }
    let resolver = MockResolver::new(vec![PartitionKeyRange::new("0", "", "FF")]);

    let mut pipeline = create_pipeline(&test_config(), Some(top_plan(5)), &source, &resolver, None)
        .await
        .expect("Failed to create pipeline");

    let first = pipeline.next_page().await.expect("Failed to fetch first page");
    assert_count(&first.items, 3, "第一页文档");
    assert!(pipeline.has_more_results());

    let second = pipeline.next_page().await.expect("Failed to fetch second page");
    assert_count(&second.items, 2, "第二页文档");
    assert!(!pipeline.has_more_results());
    assert!(second.continuation_token.is_none());
    assert!(second.disallow_continuation_reason.is_none());
    assert_eq!(source.request_count(), 2);
}

#[tokio::test]
async fn test_order_by_ascending_merges_ranges() {
    let source = MockDataSource::new();
    seed_order_by_rows(&source, &[("10", 1), ("11", 4), ("12", 7)]);
    seed_order_by_rows(&source, &[("90", 2), ("91", 3), ("92", 8)]);
    let resolver = MockResolver::new(two_ranges());

    let mut pipeline = create_pipeline(
        &test_config(),
        Some(order_by_plan(SortOrder::Ascending)),
        &source,
        &resolver,
        None,
    )
    .await
    .expect("Failed to create pipeline");
    let items = drain_all(&mut pipeline).await;

    assert_eq!(ids(&items), vec!["10", "90", "91", "11", "12", "92"]);
    // 输出的是 payload，而不是改写后的包装行
    assert_eq!(items[0], doc("10", 1));
}

#[tokio::test]
async fn test_order_by_descending_merges_ranges() {
    let source = MockDataSource::new();
    seed_order_by_rows(&source, &[("10", 9), ("11", 7), ("12", 4), ("13", 1)]);
    seed_order_by_rows(&source, &[("90", 8), ("91", 5), ("92", 2)]);
    let resolver = MockResolver::new(two_ranges());

    let mut pipeline = create_pipeline(
        &test_config(),
        Some(order_by_plan(SortOrder::Descending)),
        &source,
        &resolver,
        None,
    )
    .await
    .expect("Failed to create pipeline");
    let items = drain_all(&mut pipeline).await;

    let values: Vec<Element> = items.iter().filter_map(|i| i.get("v").cloned()).collect();
    let expected: Vec<Element> = [9, 8, 7, 5, 4, 2, 1].iter().map(|v| Element::integer(*v)).collect();
    assert_eq!(values, expected);
}

#[tokio::test]
async fn test_order_by_ties_prefer_lower_range() {
    let source = MockDataSource::new();
    source.set_page_limit(2);
    seed_order_by_rows(&source, &[("10", 1), ("11", 2), ("12", 2), ("13", 2), ("14", 5)]);
    seed_order_by_rows(&source, &[("90", 2), ("91", 2), ("92", 3), ("93", 6)]);
    let resolver = MockResolver::new(two_ranges());
    let config = crossquery::PipelineConfig {
        max_item_count: 3,
        ..test_config()
    };

    let mut pipeline = create_pipeline(
        &config,
        Some(order_by_plan(SortOrder::Ascending)),
        &source,
        &resolver,
        None,
    )
    .await
    .expect("Failed to create pipeline");

    let mut pages = Vec::new();
    while pipeline.has_more_results() {
        let page = pipeline.next_page().await.expect("Failed to fetch next page");
        assert!(page.items.len() <= 3);
        pages.extend(page.items);
    }
    assert_eq!(
        ids(&pages),
        vec!["10", "11", "12", "13", "90", "91", "92", "14", "93"]
    );
}

#[tokio::test]
async fn test_select_value_count_across_ranges() {
    let source = MockDataSource::new();
    source.insert("10", Element::wrap_item(Some(Element::integer(4))));
    source.insert("60", Element::wrap_item(Some(Element::integer(5))));
    source.insert("B0", Element::wrap_item(Some(Element::integer(6))));
    let resolver = MockResolver::new(three_ranges());

    let mut pipeline = create_pipeline(
        &test_config(),
        Some(value_aggregate_plan(AggregateOperator::Count)),
        &source,
        &resolver,
        None,
    )
    .await
    .expect("Failed to create pipeline");

    let page = pipeline.next_page().await.expect("Failed to fetch aggregate");
    assert_eq!(page.items, vec![Element::integer(15)]);
    assert!(!pipeline.has_more_results());
    assert!(page.continuation_token.is_none());
    assert_charge_eq(page.request_charge, 3.0 * source.charge_per_page());
}

#[tokio::test]
async fn test_select_value_sum_over_empty_collection_is_empty() {
    let source = MockDataSource::new();
    let resolver = MockResolver::new(two_ranges());

    let mut pipeline = create_pipeline(
        &test_config(),
        Some(value_aggregate_plan(AggregateOperator::Sum)),
        &source,
        &resolver,
        None,
    )
    .await
    .expect("Failed to create pipeline");
    let items = drain_all(&mut pipeline).await;
    assert!(items.is_empty());
}

#[tokio::test]
async fn test_split_is_recovered_from_backend_token() {
    let source = MockDataSource::new();
    source.set_page_limit(4);
    let left = sequential_keys("1", 16);
    for (i, key) in left.iter().enumerate() {
        source.insert(key, doc(key, i as i64));
    }
    seed_docs(&source, &[("90", 100), ("91", 101)]);
    let resolver = MockResolver::new(two_ranges());

    let mut pipeline = create_pipeline(&test_config(), Some(parallel_plan()), &source, &resolver, None)
        .await
        .expect("Failed to create pipeline");
    let first = pipeline.next_page().await.expect("Failed to fetch first page");
    assert_eq!(ids(&first.items), vec!["100", "101", "102", "103"]);

    // 分区 0 在第二次拉取时已拆分
    source.fail_once("0", Some("103"), FetchFailure::partition_range_gone("split"));
    resolver.set_ranges(vec![
        PartitionKeyRange::new("2", "", "108"),
        PartitionKeyRange::new("3", "108", "80"),
        PartitionKeyRange::new("1", "80", "FF"),
    ]);

    let mut all = first.items;
    all.extend(drain_all(&mut pipeline).await);
    let all_ids = ids(&all);
    assert_no_duplicates(&all_ids);
    assert_count(&all_ids, 18, "文档");

    let child_requests = source.requests_for("2");
    assert_eq!(child_requests[0].continuation.as_deref(), Some("103"));
    let sibling_requests = source.requests_for("3");
    assert_eq!(sibling_requests[0].continuation.as_deref(), Some("103"));
}

#[tokio::test]
async fn test_non_split_failure_is_surfaced() {
    let source = MockDataSource::new();
    seed_docs(&source, &[("10", 1), ("90", 2)]);
    source.fail_once("1", None, FetchFailure::new(429, "Request rate too large"));
    let resolver = MockResolver::new(two_ranges());

    let mut pipeline = create_pipeline(&test_config(), Some(parallel_plan()), &source, &resolver, None)
        .await
        .expect("Failed to create pipeline");

    // 失败在拉取时被缓存，排到该分区时才返回
    let first = pipeline.next_page().await.expect("Failed to fetch first page");
    assert_eq!(ids(&first.items), vec!["10"]);

    let err = pipeline.next_page().await.expect_err("Failure should be surfaced");
    assert!(matches!(err, PipelineError::Fetch(ref f) if f.is_throttled()));
    assert!(!err.requires_restart());
}

#[tokio::test]
async fn test_gone_without_new_ranges_is_surfaced() {
    let source = MockDataSource::new();
    seed_docs(&source, &[("10", 1)]);
    source.fail_once("0", None, FetchFailure::partition_range_gone("gone"));
    let resolver = MockResolver::new(vec![PartitionKeyRange::new("0", "", "FF")]);

    let mut pipeline = create_pipeline(&test_config(), Some(parallel_plan()), &source, &resolver, None)
        .await
        .expect("Failed to create pipeline");
    let err = pipeline.next_page().await.expect_err("Failure should be surfaced");
    assert!(matches!(err, PipelineError::Fetch(ref f) if f.is_partition_gone()));
}

#[tokio::test]
async fn test_cancellation_stops_next_page() {
    let source = MockDataSource::new();
    seed_three_ranges(&source);
    let resolver = MockResolver::new(three_ranges());

    let mut pipeline = create_pipeline(&test_config(), Some(parallel_plan()), &source, &resolver, None)
        .await
        .expect("Failed to create pipeline");
    pipeline.cancellation_token().cancel();

    let err = pipeline.next_page().await.expect_err("Cancelled pipeline should fail");
    assert!(err.is_cancelled());
    assert_eq!(source.request_count(), 0);
}

#[tokio::test]
async fn test_stop_keeps_buffered_pages() {
    let source = MockDataSource::new();
    seed_three_ranges(&source);
    let resolver = MockResolver::new(three_ranges());

    let mut pipeline = create_pipeline(&test_config(), Some(parallel_plan()), &source, &resolver, None)
        .await
        .expect("Failed to create pipeline");
    let first = pipeline.next_page().await.expect("Failed to fetch first page");
    assert_eq!(ids(&first.items), vec!["10", "20", "30"]);
    assert_eq!(source.request_count(), 3);
    pipeline.stop();

    // 分区 1 和 2 的页已在预取时缓存，停止后仍可取出
    assert!(pipeline.has_more_results());
    let second = pipeline.next_page().await.expect("Failed to fetch buffered page");
    assert_eq!(ids(&second.items), vec!["60", "70"]);
    assert!(second.continuation_token.is_none());
    assert!(second.disallow_continuation_reason.is_some());

    let rest = drain_all(&mut pipeline).await;
    assert_eq!(ids(&rest), vec!["B0", "C0", "D0", "E0"]);
    assert!(!pipeline.has_more_results());
    assert_eq!(source.request_count(), 3);
}

#[tokio::test]
async fn test_stop_before_first_page_fetches_nothing() {
    let source = MockDataSource::new();
    seed_three_ranges(&source);
    let resolver = MockResolver::new(three_ranges());

    let mut pipeline = create_pipeline(&test_config(), Some(parallel_plan()), &source, &resolver, None)
        .await
        .expect("Failed to create pipeline");
    pipeline.stop();

    assert!(!pipeline.has_more_results());
    let page = pipeline.next_page().await.expect("Failed to drain stopped pipeline");
    assert!(page.items.is_empty());
    assert!(page.continuation_token.is_none());
    assert_eq!(source.request_count(), 0);
}

#[tokio::test]
async fn test_query_ranges_limit_target_partitions() {
    let source = MockDataSource::new();
    seed_docs(&source, &[("10", 1), ("90", 2)]);
    let resolver = MockResolver::new(two_ranges());
    let mut plan = parallel_plan();
    plan.query_ranges = vec![QueryRange {
        min: "90".to_string(),
        max: "90".to_string(),
        is_min_inclusive: true,
        is_max_inclusive: true,
    }];

    let mut pipeline = create_pipeline(&test_config(), Some(plan), &source, &resolver, None)
        .await
        .expect("Failed to create pipeline");
    let items = drain_all(&mut pipeline).await;

    assert_eq!(ids(&items), vec!["90"]);
    assert!(source.requests_for("0").is_empty());
}

#[tokio::test]
async fn test_unordered_distinct_across_ranges() {
    let source = MockDataSource::new();
    for (key, value) in [("10", 1), ("11", 2), ("12", 1), ("13", 3), ("90", 2), ("91", 4)] {
        source.insert(key, Element::integer(value));
    }
    let resolver = MockResolver::new(two_ranges());
    let plan = QueryPlan::new(QueryInfo {
        distinct_type: DistinctType::Unordered,
        ..Default::default()
    });

    let mut pipeline = create_pipeline(&test_config(), Some(plan), &source, &resolver, None)
        .await
        .expect("Failed to create pipeline");

    let first = pipeline.next_page().await.expect("Failed to fetch first page");
    // 无序去重需要记住所有见过的值，无法续传
    if pipeline.has_more_results() {
        assert!(first.continuation_token.is_none());
        assert!(first.disallow_continuation_reason.is_some());
    }
    let mut items = first.items;
    items.extend(drain_all(&mut pipeline).await);

    let expected: Vec<Element> = [1, 2, 3, 4].iter().map(|v| Element::integer(*v)).collect();
    assert_eq!(items, expected);
}

#[tokio::test]
async fn test_offset_limit_window() {
    let source = MockDataSource::new();
    source.set_page_limit(3);
    let keys = sequential_keys("1", 10);
    for (i, key) in keys.iter().enumerate() {
        source.insert(key, doc(key, i as i64));
    }
    let resolver = MockResolver::new(vec![PartitionKeyRange::new("0", "", "FF")]);
    let plan = QueryPlan::new(QueryInfo {
        offset: Some(2),
        limit: Some(3),
        ..Default::default()
    });

    let mut pipeline = create_pipeline(&test_config(), Some(plan), &source, &resolver, None)
        .await
        .expect("Failed to create pipeline");
    let items = drain_all(&mut pipeline).await;

    assert_eq!(ids(&items), vec!["102", "103", "104"]);
}

#[tokio::test]
async fn test_missing_plan_is_rejected() {
    let source = MockDataSource::new();
    let resolver = MockResolver::new(two_ranges());

    let result = create_pipeline(&test_config(), None, &source, &resolver, None).await;
    common::assertions::assert_err_with(result, "查询计划");
}

#[tokio::test]
async fn test_order_by_with_aggregate_is_rejected() {
    let source = MockDataSource::new();
    let resolver = MockResolver::new(two_ranges());
    let plan = QueryPlan::new(QueryInfo {
        order_by: vec![SortOrder::Ascending],
        aggregates: vec![AggregateOperator::Sum],
        has_select_value: true,
        ..Default::default()
    });

    let result = create_pipeline(&test_config(), Some(plan), &source, &resolver, None).await;
    let err = tokio_test::assert_err!(result);
    assert!(matches!(
        err,
        PipelineError::Query(crossquery::core::QueryError::UnsupportedQueryShape(_))
    ));
}
